//! Manual job runs through the service facade

use crate::common::{
    card_page, empty_page, html, json_ld_page, mount_card_page, mount_json_ld_page, service,
    settings,
};
use listing_harvest::storage::{JobFilter, JobRecord, Pagination};
use listing_harvest::{HarvestService, JobStatus};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Polls until the job reaches a terminal status
async fn wait_for_job(service: &HarvestService, job_id: i64) -> JobRecord {
    for _ in 0..500 {
        let job = service.get_job(job_id).expect("Failed to load job");
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Job {} did not reach a terminal status", job_id);
}

#[tokio::test]
async fn test_card_grid_job_end_to_end() {
    let server = MockServer::start().await;
    mount_card_page(&server, 1, html(card_page(1, 3))).await;
    mount_card_page(&server, 2, html(card_page(2, 2))).await;
    mount_card_page(&server, 3, html(empty_page())).await;

    let service = service(&server);
    let configuration = service
        .create_configuration("acme", settings(&["harborview"]))
        .unwrap();

    let job = service
        .trigger_job(configuration.id, "harborview", "downtown", "apartment")
        .unwrap();
    let job = wait_for_job(&service, job.id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.items_scraped, 5);
    assert!(job.error_message.is_none());

    let results = service
        .get_job_results(job.id, Pagination::default())
        .unwrap();
    assert_eq!(results.len(), 5);

    let first = &results[0];
    assert_eq!(first.title, "Harbor flat 1-0");
    assert_eq!(first.price, 2_000.0);
    assert_eq!(first.bedrooms, Some(1));
    assert_eq!(first.location, "downtown");
    assert_eq!(first.property_type, "apartment");
    assert!(first.source_url.ends_with("/harborview/listing/1-0"));
    assert_eq!(first.images.len(), 1);
    // 50 square meters, stored in square feet
    let area = first.area.unwrap();
    assert!((area - 538.2).abs() < 0.01);
    assert_eq!(first.metadata["source"], "harborview");
    assert_eq!(first.metadata["listing_id"], "hv-1-0");

    let second_page = service
        .get_job_results(job.id, Pagination::page(2, 3))
        .unwrap();
    assert_eq!(second_page.len(), 2);
    assert_eq!(second_page[0].metadata["page"], 2);
}

#[tokio::test]
async fn test_json_ld_job_end_to_end() {
    let server = MockServer::start().await;
    mount_json_ld_page(&server, 1, html(json_ld_page(1, 2))).await;
    mount_json_ld_page(&server, 2, html(empty_page())).await;

    let service = service(&server);
    let configuration = service
        .create_configuration("acme", settings(&["openhouse"]))
        .unwrap();

    let job = service
        .trigger_job(configuration.id, "openhouse", "downtown", "apartment")
        .unwrap();
    let job = wait_for_job(&service, job.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.items_scraped, 2);

    let results = service
        .get_job_results(job.id, Pagination::default())
        .unwrap();
    assert_eq!(results[0].title, "Open house 1-0");
    assert_eq!(results[0].price, 300_000.0);
    assert_eq!(results[0].bedrooms, Some(3));
    assert_eq!(results[0].area, Some(1_200.0));
    assert_eq!(results[0].source_url, "https://openhouse.example.org/homes/1-0");
    assert_eq!(results[0].metadata["currency"], "USD");
}

#[tokio::test]
async fn test_failure_mid_pagination_keeps_earlier_results() {
    let server = MockServer::start().await;
    mount_card_page(&server, 1, html(card_page(1, 2))).await;
    mount_card_page(&server, 2, ResponseTemplate::new(503)).await;

    let service = service(&server);
    let configuration = service
        .create_configuration("acme", settings(&["harborview"]))
        .unwrap();

    let job = service
        .trigger_job(configuration.id, "harborview", "downtown", "apartment")
        .unwrap();
    let job = wait_for_job(&service, job.id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.as_deref().unwrap_or_default().contains("503"));
    assert_eq!(job.items_scraped, 2);
    assert_eq!(
        service
            .get_job_results(job.id, Pagination::default())
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let server = MockServer::start().await;
    // First two attempts fail; the mock below then takes over
    Mock::given(method("GET"))
        .and(path("/harborview/search"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_card_page(&server, 1, html(card_page(1, 1))).await;
    mount_card_page(&server, 2, html(empty_page())).await;

    let service = service(&server);
    let mut retrying = settings(&["harborview"]);
    retrying.max_retries = 2;
    let configuration = service.create_configuration("acme", retrying).unwrap();

    let job = service
        .trigger_job(configuration.id, "harborview", "downtown", "apartment")
        .unwrap();
    let job = wait_for_job(&service, job.id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.items_scraped, 1);

    let requests = server.received_requests().await.unwrap();
    // Three attempts for page 1, one for the empty page 2
    assert_eq!(requests.len(), 4);
}

#[tokio::test]
async fn test_unsupported_source_does_not_block_others() {
    let server = MockServer::start().await;
    mount_card_page(&server, 1, html(card_page(1, 1))).await;
    mount_card_page(&server, 2, html(empty_page())).await;

    let service = service(&server);
    let configuration = service
        .create_configuration("acme", settings(&["harborview", "unknown-site"]))
        .unwrap();

    let good = service
        .trigger_job(configuration.id, "harborview", "downtown", "apartment")
        .unwrap();
    let bad = service
        .trigger_job(configuration.id, "unknown-site", "downtown", "apartment")
        .unwrap();

    let good = wait_for_job(&service, good.id).await;
    let bad = wait_for_job(&service, bad.id).await;

    assert_eq!(good.status, JobStatus::Completed);
    assert_eq!(bad.status, JobStatus::Failed);
    assert!(bad.error_message.unwrap().contains("unknown-site"));

    let failed = service
        .list_jobs(&JobFilter {
            status: Some(JobStatus::Failed),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, bad.id);

    let stats = service.get_stats(configuration.id).unwrap();
    assert_eq!(stats.total_jobs, 2);
    assert_eq!(stats.completed_jobs, 1);
    assert_eq!(stats.failed_jobs, 1);
    assert_eq!(stats.success_rate, 50.0);
}

#[tokio::test]
async fn test_cancel_running_job() {
    let server = MockServer::start().await;
    mount_card_page(
        &server,
        1,
        html(card_page(1, 1)).set_delay(Duration::from_secs(5)),
    )
    .await;

    let service = service(&server);
    let configuration = service
        .create_configuration("acme", settings(&["harborview"]))
        .unwrap();

    let job = service
        .trigger_job(configuration.id, "harborview", "downtown", "apartment")
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(service.cancel_job(job.id));

    let job = wait_for_job(&service, job.id).await;
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.items_scraped, 0);
}
