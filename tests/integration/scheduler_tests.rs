//! Scheduled runs driven through explicit ticks

use crate::common::{
    card_page, empty_page, html, json_ld_page, mount_card_page, mount_json_ld_page, service,
    settings,
};
use chrono::{Duration, SubsecRound, Utc};
use listing_harvest::storage::JobFilter;
use listing_harvest::{JobStatus, SettingsPatch};
use wiremock::MockServer;

async fn mount_both_sources(server: &MockServer) {
    mount_card_page(server, 1, html(card_page(1, 2))).await;
    mount_card_page(server, 2, html(empty_page())).await;
    mount_json_ld_page(server, 1, html(json_ld_page(1, 3))).await;
    mount_json_ld_page(server, 2, html(empty_page())).await;
}

#[tokio::test]
async fn test_due_configuration_runs_every_source() {
    let server = MockServer::start().await;
    mount_both_sources(&server).await;

    let service = service(&server);
    let configuration = service
        .create_configuration("acme", settings(&["harborview", "openhouse"]))
        .unwrap();

    let report = service.scheduler().tick(Utc::now()).await.unwrap();
    assert_eq!(report.configurations_run, 1);
    assert_eq!(report.jobs_created, 2);
    assert_eq!(report.jobs_completed, 2);

    let jobs = service
        .list_jobs(&JobFilter {
            configuration_id: Some(configuration.id),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|job| job.status == JobStatus::Completed));

    let stats = service.get_stats(configuration.id).unwrap();
    assert_eq!(stats.total_items, 5);
    assert_eq!(stats.source_distribution.get("harborview"), Some(&1));
    assert_eq!(stats.source_distribution.get("openhouse"), Some(&1));
}

#[tokio::test]
async fn test_disabled_configuration_never_runs() {
    let server = MockServer::start().await;
    mount_both_sources(&server).await;

    let service = service(&server);
    let mut manual_only = settings(&["harborview"]);
    manual_only.auto_scrape_enabled = false;
    service.create_configuration("acme", manual_only).unwrap();

    assert_eq!(service.scheduler().bootstrap().unwrap(), 0);
    let report = service
        .scheduler()
        .tick(Utc::now() + Duration::days(30))
        .await
        .unwrap();

    assert_eq!(report.jobs_created, 0);
    assert!(service.list_jobs(&JobFilter::default()).unwrap().is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_configuration_runs_again_after_interval() {
    let server = MockServer::start().await;
    mount_both_sources(&server).await;

    let service = service(&server);
    let configuration = service
        .create_configuration("acme", settings(&["harborview"]))
        .unwrap();
    assert_eq!(configuration.settings.auto_scrape_interval_hours, 24);

    // The store keeps microsecond precision
    let start = Utc::now().trunc_subsecs(6);
    let first = service.scheduler().tick(start).await.unwrap();
    assert_eq!(first.jobs_created, 1);

    let record = service.get_configuration(configuration.id).unwrap();
    assert_eq!(record.last_run_at, Some(start));
    assert_eq!(record.next_run_at, Some(start + Duration::hours(24)));

    let early = service
        .scheduler()
        .tick(start + Duration::hours(23))
        .await
        .unwrap();
    assert_eq!(early.configurations_run, 0);

    let due = service
        .scheduler()
        .tick(start + Duration::hours(24))
        .await
        .unwrap();
    assert_eq!(due.configurations_run, 1);
    assert_eq!(due.jobs_completed, 1);

    let jobs = service.list_jobs(&JobFilter::default()).unwrap();
    assert_eq!(jobs.len(), 2);
}

#[tokio::test]
async fn test_disabling_auto_scrape_unschedules() {
    let server = MockServer::start().await;
    mount_both_sources(&server).await;

    let service = service(&server);
    let configuration = service
        .create_configuration("acme", settings(&["harborview"]))
        .unwrap();
    service
        .update_configuration(
            configuration.id,
            SettingsPatch {
                auto_scrape_enabled: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

    let report = service.scheduler().tick(Utc::now()).await.unwrap();
    assert_eq!(report.configurations_run, 0);
    assert!(service.list_jobs(&JobFilter::default()).unwrap().is_empty());
}

#[tokio::test]
async fn test_bootstrap_restores_schedule() {
    let server = MockServer::start().await;
    mount_both_sources(&server).await;

    let service = service(&server);
    let configuration = service
        .create_configuration("acme", settings(&["openhouse"]))
        .unwrap();

    // Forget the in-memory schedule, as after a restart
    service
        .scheduler()
        .unschedule_configuration(configuration.id);
    assert!(service.scheduler().scheduled().is_empty());

    assert_eq!(service.scheduler().bootstrap().unwrap(), 1);
    let report = service.scheduler().tick(Utc::now()).await.unwrap();
    assert_eq!(report.jobs_completed, 1);
}
