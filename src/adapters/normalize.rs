//! Conversion of raw listing candidates into canonical listings
//!
//! Sources publish prices, sizes and room counts as free text. These helpers
//! turn that text into numbers with a few fixed rules:
//!
//! - prices keep only digits and `.`; anything unparseable becomes 0
//! - areas are stored in square feet; square-meter values are multiplied by
//!   10.764
//! - bedroom and bathroom counts are the first integer in the text, or None

use crate::adapters::{ListingCandidate, NewListing};
use serde_json::{json, Value};

/// Square feet in one square meter
pub const SQ_FT_PER_SQ_M: f64 = 10.764;

/// Unit spellings treated as square meters, lowercase with spaces and dots
/// removed and without a plural `s`
const SQUARE_METER_UNITS: &[&str] = &[
    "sqm",
    "sqmt",
    "sqmeter",
    "sqmetre",
    "squaremeter",
    "squaremetre",
    "m2",
    "m²",
    "mtk",
];

/// Builds the canonical listing for a candidate found on `page`
pub fn normalize(
    candidate: ListingCandidate,
    source: &str,
    location: &str,
    property_type: &str,
    page: u32,
) -> NewListing {
    let price = candidate.price.as_deref().map(parse_price).unwrap_or(0.0);
    let area = candidate
        .area
        .as_deref()
        .and_then(|raw| parse_area(raw, candidate.area_unit.as_deref()));

    let mut metadata = candidate.extra;
    metadata.insert("source".to_string(), json!(source));
    metadata.insert("page".to_string(), json!(page));
    if let Some(raw_price) = &candidate.price {
        metadata.insert("raw_price".to_string(), json!(raw_price));
    }

    NewListing {
        title: candidate.title,
        price,
        location: location.to_string(),
        property_type: property_type.to_string(),
        bedrooms: candidate.bedrooms.as_deref().and_then(parse_count),
        bathrooms: candidate.bathrooms.as_deref().and_then(parse_count),
        area,
        images: candidate.images,
        source_url: candidate.url,
        metadata: Value::Object(metadata),
    }
}

/// Parses a published price, defaulting to 0
///
/// # Example
///
/// ```
/// use listing_harvest::adapters::parse_price;
///
/// assert_eq!(parse_price("$1,250,000"), 1_250_000.0);
/// assert_eq!(parse_price("Price on request"), 0.0);
/// ```
pub fn parse_price(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().unwrap_or(0.0)
}

/// Parses a published floor area into square feet
///
/// The unit is taken from `unit` when the source publishes it separately,
/// otherwise from the text following the number.
pub fn parse_area(raw: &str, unit: Option<&str>) -> Option<f64> {
    let (value, rest) = leading_number(raw)?;
    let unit = unit.unwrap_or(rest);

    if is_square_meters(unit) {
        Some(value * SQ_FT_PER_SQ_M)
    } else {
        Some(value)
    }
}

/// Returns true if `unit` names square meters
///
/// Only the start of the text counts: the first word, or the first two words
/// joined, so trailing punctuation and remarks such as `sqm, furnished` or
/// `sq.m (approx)` are ignored.
pub fn is_square_meters(unit: &str) -> bool {
    let unit = unit.to_lowercase();
    let head = unit
        .split(|c: char| matches!(c, ',' | ';' | ':' | '(' | ')' | '/' | '|'))
        .next()
        .unwrap_or("");
    let words: Vec<&str> = head
        .split(|c: char| c.is_whitespace() || c == '.')
        .filter(|w| !w.is_empty())
        .take(2)
        .collect();

    let mut candidates = Vec::with_capacity(2);
    if let Some(first) = words.first() {
        candidates.push(first.to_string());
    }
    if words.len() == 2 {
        candidates.push(words.concat());
    }

    candidates.iter().any(|candidate| {
        let singular = match candidate.strip_suffix('s') {
            Some(stem) if stem.len() >= 3 => stem,
            _ => candidate.as_str(),
        };
        SQUARE_METER_UNITS.contains(&singular)
    })
}

/// Parses the first integer in a room count
pub fn parse_count(raw: &str) -> Option<u32> {
    let digits: String = raw
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Splits off the first number in `raw`, returning it and the text after it
///
/// Thousands separators (`,`) inside the number are ignored.
fn leading_number(raw: &str) -> Option<(f64, &str)> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let tail = &raw[start..];
    let end = tail
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(tail.len());

    let number: String = tail[..end].chars().filter(|c| *c != ',').collect();
    let value = number.trim_end_matches('.').parse().ok()?;
    Some((value, &tail[end..]))
}
