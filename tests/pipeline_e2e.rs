// tests/pipeline_e2e.rs
mod common;

use chrono::NaiveDate;
use common::{CapturedLogs, RecordingChannel, RecordingSummarizer};
use lettre::transport::stub::AsyncStubTransport;
use repo_sentinel::ingest::providers::github::GithubClient;
use repo_sentinel::jobs::DigestJob;
use repo_sentinel::notify::email::EmailChannel;
use repo_sentinel::{
    DeliveryOutcome, DeliveryStatus, InMemoryRegistry, NotificationFanout, ReportSynthesizer,
    DRY_RUN_SENTINEL,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
}

async fn github() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octocat/Hello-World"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"full_name": "octocat/Hello-World"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octocat/Hello-World/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octocat/Hello-World/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"number": 1, "title": "Bug one", "closed_at": "2024-01-02T08:00:00Z"},
            {"number": 2, "title": "Bug two", "closed_at": "2024-01-01T08:00:00Z"},
            {"number": 3, "title": "Feature", "closed_at": "2024-01-02T09:00:00Z", "pull_request": {}}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn dry_run_cycle_delivers_by_email_only() {
    let (logs, _guard) = CapturedLogs::install();
    let server = github().await;
    let dir = tempfile::tempdir().unwrap();
    let backend = RecordingSummarizer::with_replies(Vec::<String>::new());

    let email = EmailChannel::with_transport(
        AsyncStubTransport::new_ok(),
        "bot@example.test".parse().unwrap(),
        vec!["dev@example.test".parse().unwrap()],
    );
    let fanout = NotificationFanout::new()
        .with_channel(Box::new(email))
        .with_unconfigured("slack");

    let job = DigestJob::new(
        "github_progress",
        Arc::new(InMemoryRegistry::with_repositories(["octocat/Hello-World"])),
        Arc::new(
            GithubClient::new(None, Duration::from_secs(2))
                .unwrap()
                .with_base_url(server.uri()),
        ),
        Arc::new(ReportSynthesizer::new(backend.clone(), dir.path()).with_dry_run(true)),
        Arc::new(fanout),
    );

    let summary = job.run_cycle(today()).await;
    assert_eq!(summary.fetched, 1);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.reports, 1);
    assert_eq!(
        summary.deliveries,
        vec![DeliveryOutcome {
            channel: "email",
            status: DeliveryStatus::Sent
        }]
    );
    assert_eq!(backend.call_count(), 0);
    assert_eq!(logs.count("WARN", "channel not configured"), 1);
    assert_eq!(logs.count("WARN", "fetch failed"), 0);

    let raw = std::fs::read_to_string(
        dir.path()
            .join("octocat_Hello-World/2024-01-01_to_2024-01-02.md"),
    )
    .unwrap();
    assert!(raw.contains("- Bug one #1"));
    assert!(raw.contains("- Bug two #2"));
    assert!(raw.contains("- Feature #3"));
}

#[tokio::test]
async fn failed_subscriptions_are_excluded_from_delivery() {
    let (logs, _guard) = CapturedLogs::install();
    let server = github().await;
    let dir = tempfile::tempdir().unwrap();
    let (channel, seen) = RecordingChannel::new("email", false);

    let job = DigestJob::new(
        "github_progress",
        Arc::new(InMemoryRegistry::with_repositories([
            "octocat/Hello-World",
            "octocat/missing",
            "not-a-repo",
        ])),
        Arc::new(
            GithubClient::new(None, Duration::from_secs(2))
                .unwrap()
                .with_base_url(server.uri()),
        ),
        Arc::new(
            ReportSynthesizer::new(RecordingSummarizer::with_replies(Vec::<String>::new()), dir.path())
                .with_dry_run(true),
        ),
        Arc::new(NotificationFanout::new().with_channel(Box::new(channel))),
    )
    .with_max_concurrency(2);

    let summary = job.run_cycle(today()).await;
    assert_eq!(summary.subscriptions, 3);
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.failed.len(), 2);
    assert_eq!(logs.count("WARN", "fetch failed"), 2);
    assert_eq!(logs.count("WARN", "octocat/missing"), 1);
    assert_eq!(logs.count("INFO", "cycle complete"), 1);
    let delivered = seen.lock();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].target, "octocat/Hello-World");
    assert_eq!(delivered[0].body, DRY_RUN_SENTINEL);
}
