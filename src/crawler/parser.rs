//! HTML parser for listing and detail pages
//!
//! This module turns page markup into:
//! - `RawRecord`s, one per item container on a listing page
//! - a "has more pages" signal from the pagination control
//! - `DetailFields` from an item's own page
//!
//! Nothing here judges field contents; a missing element becomes `None` and
//! the validator decides what that means.

use crate::config::SelectorConfig;
use crate::record::RawRecord;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

/// Errors that make a whole page unusable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("body is not HTML")]
    NotHtml,

    #[error("invalid selector '{0}'")]
    InvalidSelector(String),
}

/// Compiled selectors for listing pages
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    item: Selector,
    title: Selector,
    title_attribute: Option<String>,
    price: Selector,
    availability: Selector,
    rating: Selector,
    rating_class: String,
    rating_marker: Option<Selector>,
    link: Selector,
    next: Selector,
}

impl ListingSelectors {
    /// Compiles every listing selector, failing on the first bad one
    pub fn from_config(config: &SelectorConfig) -> Result<Self, ParseError> {
        Ok(Self {
            item: compile(&config.item)?,
            title: compile(&config.title)?,
            title_attribute: config.title_attribute.clone(),
            price: compile(&config.price)?,
            availability: compile(&config.availability)?,
            rating: compile(&format!(".{}", config.rating_class))?,
            rating_class: config.rating_class.clone(),
            rating_marker: config.rating_marker.as_deref().map(compile).transpose()?,
            link: compile(&config.link)?,
            next: compile(&config.next)?,
        })
    }
}

/// Compiled selectors for item detail pages
#[derive(Debug, Clone)]
pub struct DetailSelectors {
    title: Selector,
    availability: Selector,
}

impl DetailSelectors {
    pub fn from_config(config: &SelectorConfig) -> Result<Self, ParseError> {
        Ok(Self {
            title: compile(&config.detail_title)?,
            availability: compile(&config.detail_availability)?,
        })
    }
}

fn compile(selector: &str) -> Result<Selector, ParseError> {
    Selector::parse(selector).map_err(|_| ParseError::InvalidSelector(selector.to_string()))
}

/// Items and pagination signal extracted from one listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedListing {
    /// Item records in document order
    pub records: Vec<RawRecord>,

    /// True when the page carries a "next" pagination control
    pub has_more_pages: bool,
}

/// Fields found on an item's own page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailFields {
    pub title: Option<String>,
    pub availability_text: Option<String>,
}

/// Parses a listing page into raw records and a pagination signal
///
/// An empty body yields no records and no next page. A non-empty body with no
/// markup at all is `ParseError::NotHtml`.
///
/// # Example
///
/// ```
/// use catalog_harvest::config::SelectorConfig;
/// use catalog_harvest::crawler::{parse_listing, ListingSelectors};
///
/// let selectors = ListingSelectors::from_config(&SelectorConfig::default()).unwrap();
/// let html = r#"<article class="product_pod">
///     <h3><a href="a_1/index.html" title="A">A</a></h3>
///     <p class="price_color">£1.00</p>
/// </article>"#;
/// let parsed = parse_listing(html, &selectors).unwrap();
/// assert_eq!(parsed.records.len(), 1);
/// assert!(!parsed.has_more_pages);
/// ```
pub fn parse_listing(html: &str, selectors: &ListingSelectors) -> Result<ParsedListing, ParseError> {
    if html.trim().is_empty() {
        return Ok(ParsedListing::default());
    }

    ensure_markup(html)?;

    let document = Html::parse_document(html);

    let records = document
        .select(&selectors.item)
        .map(|item| extract_item(&item, selectors))
        .collect();

    let has_more_pages = document.select(&selectors.next).next().is_some();

    Ok(ParsedListing {
        records,
        has_more_pages,
    })
}

/// Parses an item's detail page
pub fn parse_detail(html: &str, selectors: &DetailSelectors) -> Result<DetailFields, ParseError> {
    if html.trim().is_empty() {
        return Ok(DetailFields::default());
    }

    ensure_markup(html)?;

    let document = Html::parse_document(html);
    let root = document.root_element();

    Ok(DetailFields {
        title: first_text(&root, &selectors.title),
        availability_text: first_text(&root, &selectors.availability),
    })
}

fn ensure_markup(body: &str) -> Result<(), ParseError> {
    if body.contains('<') {
        Ok(())
    } else {
        Err(ParseError::NotHtml)
    }
}

/// Extracts one item container; absent elements stay `None`
fn extract_item(item: &ElementRef, selectors: &ListingSelectors) -> RawRecord {
    let title = item.select(&selectors.title).next().map(|element| {
        selectors
            .title_attribute
            .as_deref()
            .and_then(|attr| element.value().attr(attr))
            .map(String::from)
            .unwrap_or_else(|| element.text().collect())
    });

    let detail_url = item
        .select(&selectors.link)
        .next()
        .and_then(|element| element.value().attr("href"))
        .map(String::from);

    RawRecord {
        title,
        price_text: first_text(item, &selectors.price),
        availability_text: first_text(item, &selectors.availability),
        rating_text: extract_rating(item, selectors),
        detail_url,
    }
}

/// Reads the rating indicator
///
/// With a marker selector the indicator is the number of markers; otherwise
/// it is the rating element's remaining classes (`star-rating Three` → `Three`).
fn extract_rating(item: &ElementRef, selectors: &ListingSelectors) -> Option<String> {
    let element = item.select(&selectors.rating).next()?;

    if let Some(marker) = &selectors.rating_marker {
        return Some(element.select(marker).count().to_string());
    }

    let classes: Vec<&str> = element
        .value()
        .classes()
        .filter(|class| *class != selectors.rating_class)
        .collect();

    Some(classes.join(" "))
}

fn first_text(scope: &ElementRef, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(|element| element.text().collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_selectors() -> ListingSelectors {
        ListingSelectors::from_config(&SelectorConfig::default()).unwrap()
    }

    fn listing_item(title: &str, price: &str, rating: &str, stock: &str) -> String {
        format!(
            r#"<article class="product_pod">
                <div class="image_container"><a href="{slug}/index.html"><img src="x.jpg" alt="{title}"></a></div>
                <p class="star-rating {rating}"><i class="icon-star"></i></p>
                <h3><a href="{slug}/index.html" title="{title}">{short}</a></h3>
                <div class="product_price">
                    <p class="price_color">{price}</p>
                    <p class="instock availability"><i class="icon-ok"></i>
                        {stock}
                    </p>
                </div>
            </article>"#,
            slug = title.to_lowercase().replace(' ', "-"),
            title = title,
            short = &title[..title.len().min(8)],
            rating = rating,
            price = price,
            stock = stock,
        )
    }

    fn listing_page(items: &[String], next: bool) -> String {
        let pager = if next {
            r#"<ul class="pager"><li class="current">Page 1 of 3</li><li class="next"><a href="page-2.html">next</a></li></ul>"#
        } else {
            r#"<ul class="pager"><li class="previous"><a href="page-1.html">previous</a></li></ul>"#
        };
        format!(
            "<html><body><ol class=\"row\">{}</ol>{}</body></html>",
            items.join("\n"),
            pager
        )
    }

    #[test]
    fn test_extracts_all_fields() {
        let html = listing_page(
            &[listing_item("A Light in the Attic", "£51.77", "Three", "In stock")],
            true,
        );
        let parsed = parse_listing(&html, &default_selectors()).unwrap();

        assert_eq!(parsed.records.len(), 1);
        let record = &parsed.records[0];
        assert_eq!(record.title.as_deref(), Some("A Light in the Attic"));
        assert_eq!(record.price_text.as_deref(), Some("£51.77"));
        assert_eq!(
            record.availability_text.as_deref().map(str::trim),
            Some("In stock")
        );
        assert_eq!(record.rating_text.as_deref(), Some("Three"));
        assert_eq!(
            record.detail_url.as_deref(),
            Some("a-light-in-the-attic/index.html")
        );
        assert!(parsed.has_more_pages);
    }

    #[test]
    fn test_items_in_document_order() {
        let html = listing_page(
            &[
                listing_item("First Book", "£1.00", "One", "In stock"),
                listing_item("Second Book", "£2.00", "Two", "In stock"),
                listing_item("Third Book", "£3.00", "Five", "In stock"),
            ],
            false,
        );
        let parsed = parse_listing(&html, &default_selectors()).unwrap();

        let titles: Vec<_> = parsed
            .records
            .iter()
            .map(|r| r.title.clone().unwrap())
            .collect();
        assert_eq!(titles, vec!["First Book", "Second Book", "Third Book"]);
        assert!(!parsed.has_more_pages);
    }

    #[test]
    fn test_title_falls_back_to_text() {
        let html = r#"<article class="product_pod"><h3><a href="x.html">  Short title </a></h3></article>"#;
        let parsed = parse_listing(html, &default_selectors()).unwrap();
        assert_eq!(parsed.records[0].title.as_deref(), Some("  Short title "));
    }

    #[test]
    fn test_missing_fields_are_none() {
        let html = r#"<html><body><article class="product_pod"><h3>No link here</h3></article></body></html>"#;
        let parsed = parse_listing(html, &default_selectors()).unwrap();

        assert_eq!(parsed.records.len(), 1);
        let record = &parsed.records[0];
        assert_eq!(record.title, None);
        assert_eq!(record.price_text, None);
        assert_eq!(record.availability_text, None);
        assert_eq!(record.rating_text, None);
        assert_eq!(record.detail_url, None);
    }

    #[test]
    fn test_no_items_is_empty_not_error() {
        let html = "<html><body><p>Nothing for sale today.</p></body></html>";
        let parsed = parse_listing(html, &default_selectors()).unwrap();
        assert!(parsed.records.is_empty());
        assert!(!parsed.has_more_pages);
    }

    #[test]
    fn test_empty_body_is_empty_not_error() {
        let parsed = parse_listing("  \n ", &default_selectors()).unwrap();
        assert_eq!(parsed, ParsedListing::default());
    }

    #[test]
    fn test_non_html_body_is_error() {
        let result = parse_listing(r#"{"items": []}"#, &default_selectors());
        assert_eq!(result, Err(ParseError::NotHtml));
    }

    #[test]
    fn test_rating_marker_count() {
        let config = SelectorConfig {
            rating_class: "stars".to_string(),
            rating_marker: Some("i.filled".to_string()),
            ..SelectorConfig::default()
        };
        let selectors = ListingSelectors::from_config(&config).unwrap();
        let html = r#"<article class="product_pod">
            <div class="stars"><i class="filled"></i><i class="filled"></i><i class="empty"></i></div>
        </article>"#;

        let parsed = parse_listing(html, &selectors).unwrap();
        assert_eq!(parsed.records[0].rating_text.as_deref(), Some("2"));
    }

    #[test]
    fn test_invalid_selector() {
        let config = SelectorConfig {
            next: "li.next[".to_string(),
            ..SelectorConfig::default()
        };
        assert!(matches!(
            ListingSelectors::from_config(&config),
            Err(ParseError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_parse_detail() {
        let html = r#"<html><body><div class="product_main">
            <h1>A Light in the Attic: The Complete Edition</h1>
            <p class="price_color">£51.77</p>
            <p class="instock availability">
                <i class="icon-ok"></i>
                In stock (22 available)
            </p>
        </div></body></html>"#;
        let selectors = DetailSelectors::from_config(&SelectorConfig::default()).unwrap();
        let detail = parse_detail(html, &selectors).unwrap();

        assert_eq!(
            detail.title.as_deref(),
            Some("A Light in the Attic: The Complete Edition")
        );
        assert_eq!(
            detail.availability_text.as_deref().map(str::trim),
            Some("In stock (22 available)")
        );
    }

    #[test]
    fn test_parse_detail_missing_fields() {
        let selectors = DetailSelectors::from_config(&SelectorConfig::default()).unwrap();
        let detail = parse_detail("<html><body></body></html>", &selectors).unwrap();
        assert_eq!(detail, DetailFields::default());
    }
}
