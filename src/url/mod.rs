//! URL handling for catalog-harvest
//!
//! Listing page URLs come from a template with a `{}` placeholder; item links
//! found on a page are resolved against that page's URL.

use crate::UrlError;
use url::Url;

/// Placeholder replaced by the page number in a URL template
pub const PAGE_PLACEHOLDER: &str = "{}";

/// Builds the URL of a listing page from the template
///
/// # Examples
///
/// ```
/// use catalog_harvest::url::page_url;
///
/// let url = page_url("https://books.toscrape.com/catalogue/page-{}.html", 3).unwrap();
/// assert_eq!(url.as_str(), "https://books.toscrape.com/catalogue/page-3.html");
/// ```
pub fn page_url(template: &str, page_number: u32) -> Result<Url, UrlError> {
    if !template.contains(PAGE_PLACEHOLDER) {
        return Err(UrlError::MissingPlaceholder(template.to_string()));
    }

    let raw = template.replace(PAGE_PLACEHOLDER, &page_number.to_string());
    let url = Url::parse(&raw).map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;
    ensure_http(url)
}

/// Resolves an href found on a page to an absolute http(s) URL
///
/// Rejects empty hrefs, fragment-only anchors and non-HTTP schemes
/// (`javascript:`, `mailto:`, `data:` and the like).
pub fn resolve_url(base: &Url, href: &str) -> Result<Url, UrlError> {
    let href = href.trim();

    if href.is_empty() {
        return Err(UrlError::Malformed("empty link".to_string()));
    }

    if href.starts_with('#') {
        return Err(UrlError::Malformed(format!("fragment-only link '{}'", href)));
    }

    let url = base
        .join(href)
        .map_err(|e| UrlError::Parse(format!("{}: {}", href, e)))?;
    ensure_http(url)
}

fn ensure_http(url: Url) -> Result<Url, UrlError> {
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::InvalidScheme(other.to_string())),
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    Ok(url)
}
