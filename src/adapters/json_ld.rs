//! Adapter for sources that publish schema.org listing data
//!
//! Search pages are addressed by path:
//!
//! ```text
//! {base}/{location}/{property-type}?page=2
//! ```
//!
//! Listings are read from `<script type="application/ld+json">` blocks holding
//! an `ItemList`. Each `itemListElement` is either the listing itself or a
//! `ListItem` wrapping it in `item`.

use crate::adapters::{ListingCandidate, ParseError, SourceAdapter};
use scraper::{Html, Selector};
use serde_json::{json, Value};
use url::Url;

/// JSON-LD `ItemList` adapter
#[derive(Debug, Clone)]
pub struct JsonLdAdapter {
    name: String,
    base_url: Url,
}

impl JsonLdAdapter {
    /// Creates an adapter for the source `name` served from `base_url`
    pub fn new(name: impl Into<String>, base_url: Url) -> Self {
        Self {
            name: name.into(),
            base_url,
        }
    }
}

impl SourceAdapter for JsonLdAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn search_url(&self, location: &str, property_type: &str, page: u32) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(location).push(property_type);
        }
        url.query_pairs_mut()
            .clear()
            .append_pair("page", &page.to_string());
        url
    }

    fn parse_page(&self, html: &str, page_url: &Url) -> Vec<Result<ListingCandidate, ParseError>> {
        let selector = match Selector::parse(r#"script[type="application/ld+json"]"#) {
            Ok(selector) => selector,
            Err(_) => return vec![Err(ParseError::Selector("script[type=application/ld+json]"))],
        };

        let document = Html::parse_document(html);
        let mut candidates = Vec::new();

        for script in document.select(&selector) {
            let text = script.text().collect::<String>();
            let data: Value = match serde_json::from_str(text.trim()) {
                Ok(data) => data,
                Err(e) => {
                    candidates.push(Err(ParseError::MalformedData(e.to_string())));
                    continue;
                }
            };

            for list in item_lists(&data) {
                let Some(elements) = list.get("itemListElement").and_then(Value::as_array) else {
                    continue;
                };
                for element in elements {
                    let item = element.get("item").unwrap_or(element);
                    candidates.push(parse_item(item, page_url));
                }
            }
        }

        candidates
    }
}

/// Finds `ItemList` objects at the top level, in an array or in `@graph`
fn item_lists(data: &Value) -> Vec<&Value> {
    match data {
        Value::Array(values) => values.iter().flat_map(item_lists).collect(),
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                return item_lists(graph);
            }
            if map.get("@type").and_then(Value::as_str) == Some("ItemList") {
                vec![data]
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

fn parse_item(item: &Value, page_url: &Url) -> Result<ListingCandidate, ParseError> {
    if !item.is_object() {
        return Err(ParseError::MalformedData(
            "itemListElement entry is not an object".to_string(),
        ));
    }

    let title = item
        .get("name")
        .and_then(scalar_text)
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::MissingField("name"))?;

    let href = item
        .get("url")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingField("url"))?;
    let url = page_url
        .join(href.trim())
        .map_err(|_| ParseError::InvalidUrl(href.to_string()))?;

    let offer = item.get("offers").and_then(|offers| match offers {
        Value::Array(all) => all.first(),
        single => Some(single),
    });
    let price = offer
        .and_then(|offer| offer.get("price"))
        .and_then(scalar_text);

    let floor_size = item.get("floorSize");
    let area = floor_size.and_then(|size| match size {
        Value::Object(_) => size.get("value").and_then(scalar_text),
        other => scalar_text(other),
    });
    let area_unit = floor_size.and_then(|size| {
        size.get("unitCode")
            .or_else(|| size.get("unitText"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    let bedrooms = item
        .get("numberOfBedrooms")
        .or_else(|| item.get("numberOfRooms"))
        .and_then(scalar_text);
    let bathrooms = item
        .get("numberOfBathroomsTotal")
        .or_else(|| item.get("numberOfFullBathrooms"))
        .and_then(scalar_text);

    let images = match item.get("image") {
        Some(Value::String(src)) => vec![src.as_str()],
        Some(Value::Array(all)) => all.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
    .into_iter()
    .filter_map(|src| page_url.join(src.trim()).ok())
    .map(|u| u.to_string())
    .collect();

    let mut extra = serde_json::Map::new();
    if let Some(kind) = item.get("@type").and_then(Value::as_str) {
        extra.insert("schema_type".to_string(), json!(kind));
    }
    if let Some(currency) = offer
        .and_then(|offer| offer.get("priceCurrency"))
        .and_then(Value::as_str)
    {
        extra.insert("currency".to_string(), json!(currency));
    }

    Ok(ListingCandidate {
        title,
        url: url.to_string(),
        price,
        area,
        area_unit,
        bedrooms,
        bathrooms,
        images,
        extra,
    })
}

/// Reads a string or number as text
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
