//! Source adapters and the shared pagination cursor
//!
//! Each external listing source gets one adapter. An adapter only knows two
//! source-specific things: how to build a search page URL and how to pull
//! listing candidates out of a page. Everything else (fetching, delays,
//! page budgets, cancellation, normalization) is shared and lives in
//! `ListingPager` and `normalize`.
//!
//! # Components
//!
//! - `SourceAdapter`: the per-source trait
//! - `AdapterRegistry`: name → adapter lookup built from the service config
//! - `ListingPager`: pull-based page cursor that yields normalized listings
//! - `CardGridAdapter`, `JsonLdAdapter`: the two shipped adapters

mod card_grid;
mod json_ld;
mod normalize;
mod pager;
mod registry;

pub use card_grid::CardGridAdapter;
pub use json_ld::JsonLdAdapter;
pub use normalize::{is_square_meters, normalize, parse_area, parse_count, parse_price, SQ_FT_PER_SQ_M};
pub use pager::{ListingPager, PagerState, ScrapeTarget};
pub use registry::AdapterRegistry;

use serde::Serialize;
use thiserror::Error;
use url::Url;

/// Source-specific half of a scraper
pub trait SourceAdapter: Send + Sync {
    /// Name tenants use to enable this source
    fn name(&self) -> &str;

    /// Builds the URL of one search results page (pages are 1-based)
    fn search_url(&self, location: &str, property_type: &str, page: u32) -> Url;

    /// Extracts listing candidates from a fetched page
    ///
    /// An empty vector means the page had no listings, which ends pagination.
    /// A candidate that cannot be read is returned as an error so the caller
    /// can log it and keep the rest of the page.
    ///
    /// # Arguments
    ///
    /// * `html` - The page body
    /// * `page_url` - The final URL of the page, used to resolve relative links
    fn parse_page(&self, html: &str, page_url: &Url) -> Vec<Result<ListingCandidate, ParseError>>;
}

/// A listing as read from a page, before normalization
///
/// Values are kept as the text the source published.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingCandidate {
    pub title: String,

    /// Absolute URL of the listing detail page
    pub url: String,

    pub price: Option<String>,
    pub area: Option<String>,

    /// Unit published next to the area, if the source gives it separately
    pub area_unit: Option<String>,

    pub bedrooms: Option<String>,
    pub bathrooms: Option<String>,
    pub images: Vec<String>,

    /// Source-specific fields carried into the result metadata
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A normalized listing ready to be stored as a result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewListing {
    pub title: String,
    pub price: f64,
    pub location: String,
    pub property_type: String,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,

    /// Square feet
    pub area: Option<f64>,
    pub images: Vec<String>,
    pub source_url: String,
    pub metadata: serde_json::Value,
}

/// Errors for a single listing candidate
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("Listing is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Listing link is not a valid URL: {0}")]
    InvalidUrl(String),

    #[error("Malformed structured data: {0}")]
    MalformedData(String),

    #[error("Selector failed to compile: {0}")]
    Selector(&'static str),
}
