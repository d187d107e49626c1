//! Adapter for sources that render listings as HTML cards
//!
//! Search pages are addressed with a query string:
//!
//! ```text
//! {base}/search?location=downtown&type=apartment&page=2
//! ```
//!
//! Every element carrying a `data-listing` attribute is one listing card.
//! Inside a card:
//!
//! | Selector | Field |
//! |----------|-------|
//! | `.listing-title` | title (required) |
//! | `a.listing-link[href]` | detail URL (required) |
//! | `.listing-price` | price text |
//! | `.listing-beds`, `.listing-baths` | room counts |
//! | `.listing-area` | area text, unit from `data-unit` or the text suffix |
//! | `img[src]` | images, in document order |

use crate::adapters::{ListingCandidate, ParseError, SourceAdapter};
use scraper::{ElementRef, Html, Selector};
use serde_json::json;
use url::Url;

/// Compiled selectors for one parse
struct CardSelectors {
    card: Selector,
    title: Selector,
    link: Selector,
    price: Selector,
    beds: Selector,
    baths: Selector,
    area: Selector,
    image: Selector,
}

impl CardSelectors {
    fn compile() -> Result<Self, ParseError> {
        Ok(Self {
            card: compile("[data-listing]")?,
            title: compile(".listing-title")?,
            link: compile("a.listing-link[href]")?,
            price: compile(".listing-price")?,
            beds: compile(".listing-beds")?,
            baths: compile(".listing-baths")?,
            area: compile(".listing-area")?,
            image: compile("img[src]")?,
        })
    }
}

fn compile(css: &'static str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|_| ParseError::Selector(css))
}

/// Card-grid HTML adapter
#[derive(Debug, Clone)]
pub struct CardGridAdapter {
    name: String,
    base_url: Url,
}

impl CardGridAdapter {
    /// Creates an adapter for the source `name` served from `base_url`
    pub fn new(name: impl Into<String>, base_url: Url) -> Self {
        Self {
            name: name.into(),
            base_url,
        }
    }

    fn parse_card(
        &self,
        card: ElementRef<'_>,
        selectors: &CardSelectors,
        page_url: &Url,
    ) -> Result<ListingCandidate, ParseError> {
        let title = first_text(card, &selectors.title).ok_or(ParseError::MissingField("title"))?;

        let href = card
            .select(&selectors.link)
            .next()
            .and_then(|link| link.value().attr("href"))
            .ok_or(ParseError::MissingField("link"))?;
        let url = page_url
            .join(href.trim())
            .map_err(|_| ParseError::InvalidUrl(href.to_string()))?;

        let area_element = card.select(&selectors.area).next();
        let area = area_element.map(element_text).filter(|s| !s.is_empty());
        let area_unit = area_element
            .and_then(|e| e.value().attr("data-unit"))
            .map(str::to_string);

        let images = card
            .select(&selectors.image)
            .filter_map(|img| img.value().attr("src"))
            .filter_map(|src| page_url.join(src.trim()).ok())
            .map(|u| u.to_string())
            .collect();

        let mut extra = serde_json::Map::new();
        if let Some(id) = card.value().attr("data-listing").filter(|id| !id.is_empty()) {
            extra.insert("listing_id".to_string(), json!(id));
        }

        Ok(ListingCandidate {
            title,
            url: url.to_string(),
            price: first_text(card, &selectors.price),
            area,
            area_unit,
            bedrooms: first_text(card, &selectors.beds),
            bathrooms: first_text(card, &selectors.baths),
            images,
            extra,
        })
    }
}

impl SourceAdapter for CardGridAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn search_url(&self, location: &str, property_type: &str, page: u32) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("search");
        }
        url.query_pairs_mut()
            .clear()
            .append_pair("location", location)
            .append_pair("type", property_type)
            .append_pair("page", &page.to_string());
        url
    }

    fn parse_page(&self, html: &str, page_url: &Url) -> Vec<Result<ListingCandidate, ParseError>> {
        let selectors = match CardSelectors::compile() {
            Ok(selectors) => selectors,
            Err(e) => return vec![Err(e)],
        };

        let document = Html::parse_document(html);
        document
            .select(&selectors.card)
            .map(|card| self.parse_card(card, &selectors, page_url))
            .collect()
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(card: ElementRef<'_>, selector: &Selector) -> Option<String> {
    card.select(selector)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty())
}
