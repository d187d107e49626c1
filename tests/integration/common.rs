//! Shared setup for the integration tests

use listing_harvest::config::{parse_config, ScrapeSettings};
use listing_harvest::storage::{share, SqliteStorage};
use listing_harvest::HarvestService;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Builds a service config pointing both sources at the mock server
pub fn service_config(base_url: &str) -> String {
    format!(
        r#"
[service]
database-path = ":memory:"
tick-seconds = 1
max-concurrent-jobs = 4

[fetch]
requests-per-window = 1000
window-seconds = 1
timeout-seconds = 5
connect-timeout-seconds = 2
backoff-base-ms = 1
backoff-max-ms = 5
user-agents = ["HarvestTest/1.0"]

[[source]]
name = "harborview"
kind = "card-grid"
base-url = "{base}/harborview"

[[source]]
name = "openhouse"
kind = "json-ld"
base-url = "{base}/openhouse"
"#,
        base = base_url
    )
}

/// Creates a service backed by an in-memory store
pub fn service(server: &MockServer) -> HarvestService {
    let config = parse_config(&service_config(&server.uri())).expect("Invalid test config");
    let storage = SqliteStorage::new_in_memory().expect("Failed to open in-memory store");
    HarvestService::from_config(&config, share(storage)).expect("Failed to build service")
}

/// Settings for one location and property type with no delays
pub fn settings(sources: &[&str]) -> ScrapeSettings {
    ScrapeSettings {
        sources: sources.iter().map(|s| s.to_string()).collect(),
        locations: ["downtown".to_string()].into_iter().collect(),
        property_types: ["apartment".to_string()].into_iter().collect(),
        max_pages_per_source: 5,
        request_delay_ms: 0,
        max_retries: 0,
        auto_scrape_enabled: true,
        ..Default::default()
    }
}

/// Renders a card-grid search page with `count` listings
pub fn card_page(page: u32, count: usize) -> String {
    let cards: String = (0..count)
        .map(|i| {
            format!(
                r#"<article data-listing="hv-{page}-{i}">
                     <h2 class="listing-title">Harbor flat {page}-{i}</h2>
                     <a class="listing-link" href="/harborview/listing/{page}-{i}">View</a>
                     <span class="listing-price">$2,{i}00</span>
                     <span class="listing-beds">{beds} beds</span>
                     <span class="listing-area" data-unit="sq.m">50</span>
                     <img src="/img/{page}-{i}.jpg">
                   </article>"#,
                page = page,
                i = i,
                beds = i + 1
            )
        })
        .collect();
    format!("<html><body><div class=\"grid\">{}</div></body></html>", cards)
}

/// Renders a JSON-LD search page with `count` listings
pub fn json_ld_page(page: u32, count: usize) -> String {
    let items: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{
                    "@type": "ListItem",
                    "position": {position},
                    "item": {{
                        "@type": "Apartment",
                        "name": "Open house {page}-{i}",
                        "url": "https://openhouse.example.org/homes/{page}-{i}",
                        "offers": {{ "price": "{price}", "priceCurrency": "USD" }},
                        "numberOfBedrooms": 3,
                        "floorSize": {{ "value": 1200, "unitCode": "FTK" }}
                    }}
                }}"#,
                position = i + 1,
                page = page,
                i = i,
                price = 300_000 + i * 1_000
            )
        })
        .collect();

    format!(
        r#"<html><head><script type="application/ld+json">
        {{ "@context": "https://schema.org", "@type": "ItemList", "itemListElement": [{}] }}
        </script></head><body></body></html>"#,
        items.join(",")
    )
}

pub fn empty_page() -> String {
    "<html><body><p>No results</p></body></html>".to_string()
}

/// Mounts a card-grid search page for downtown apartments
pub async fn mount_card_page(server: &MockServer, page: u32, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/harborview/search"))
        .and(query_param("location", "downtown"))
        .and(query_param("type", "apartment"))
        .and(query_param("page", page.to_string()))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Mounts a JSON-LD search page for downtown apartments
pub async fn mount_json_ld_page(server: &MockServer, page: u32, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/openhouse/downtown/apartment"))
        .and(query_param("page", page.to_string()))
        .respond_with(response)
        .mount(server)
        .await;
}

pub fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}
