//! Global request pacing shared by every worker
//!
//! The limiter keeps the time of the next free request slot. Each caller
//! reserves a slot under the lock, moves the slot forward by the interval,
//! then sleeps outside the lock until its reserved time. Reservations are
//! handed out in lock order (tokio's mutex is FIFO), so no caller starves and
//! no two reserved slots are closer than the interval.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum-spacing rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter allowing one request per `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Waits until the caller may issue a request
    pub async fn acquire(&self) {
        let slot = self.reserve().await;
        tokio::time::sleep_until(slot).await;
    }

    /// Reserves the next free slot and returns its start time
    async fn reserve(&self) -> Instant {
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();

        let slot = match *next_slot {
            Some(at) if at > now => at,
            _ => now,
        };
        *next_slot = Some(slot + self.interval);

        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire().await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_acquires_are_spaced() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_never_burst() {
        let interval = Duration::from_millis(200);
        let limiter = Arc::new(RateLimiter::new(interval));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap());
        }
        times.sort();

        for pair in times.windows(2) {
            assert!(
                pair[1] - pair[0] >= interval,
                "requests {:?} apart, expected at least {:?}",
                pair[1] - pair[0],
                interval
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_limiter_does_not_accumulate_credit() {
        let interval = Duration::from_millis(100);
        let limiter = RateLimiter::new(interval);

        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;

        // The long idle period must not allow two back-to-back requests
        assert!(start.elapsed() >= interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_never_waits() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let start = Instant::now();

        for _ in 0..5 {
            limiter.acquire().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
