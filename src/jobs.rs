// src/jobs.rs
//! One scheduled cycle: registry snapshot -> parallel fetch -> synthesis -> fan-out.
use anyhow::Result;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::sync::Arc;

use crate::ingest::fetch_all;
use crate::ingest::types::{DateRange, SourceClient, SourceKind, Subscription};
use crate::notify::{DeliveryOutcome, NotificationFanout};
use crate::registry::SubscriptionRegistry;
use crate::report::ReportSynthesizer;
use crate::scheduler::Job;

/// What a single cycle did. Logged at the end of every run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    pub subscriptions: usize,
    pub fetched: usize,
    pub failed: Vec<String>,
    pub reports: usize,
    pub synthesis_failures: Vec<String>,
    pub deliveries: Vec<DeliveryOutcome>,
}

pub struct DigestJob {
    name: String,
    kind: SourceKind,
    registry: Arc<dyn SubscriptionRegistry>,
    client: Arc<dyn SourceClient>,
    synthesizer: Arc<ReportSynthesizer>,
    fanout: Arc<NotificationFanout>,
    days: u32,
    max_concurrency: usize,
    fallback: Option<Subscription>,
}

impl DigestJob {
    pub fn new(
        name: impl Into<String>,
        registry: Arc<dyn SubscriptionRegistry>,
        client: Arc<dyn SourceClient>,
        synthesizer: Arc<ReportSynthesizer>,
        fanout: Arc<NotificationFanout>,
    ) -> Self {
        let kind = client.kind();
        Self {
            name: name.into(),
            kind,
            registry,
            client,
            synthesizer,
            fanout,
            days: 1,
            max_concurrency: 4,
            fallback: None,
        }
    }

    /// Length of the reporting window ending today.
    pub fn with_days(mut self, days: u32) -> Self {
        self.days = days.max(1);
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    /// Used when the registry has no entry at all for this source. An
    /// entry that is explicitly disabled suppresses it.
    pub fn with_fallback(mut self, sub: Subscription) -> Self {
        self.fallback = Some(sub);
        self
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Registry snapshot plus fallback. The registry may touch the disk, so
    /// the read happens on the blocking pool.
    async fn subscriptions(&self) -> Vec<Subscription> {
        let registry = self.registry.clone();
        let kind = self.kind;
        let read = tokio::task::spawn_blocking(move || {
            (registry.list_by_source(kind), registry.source_enabled(kind))
        })
        .await;
        let (mut subs, enabled) = match read {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(job = %self.name, error = %e, "registry read aborted");
                return Vec::new();
            }
        };
        match (enabled, &self.fallback) {
            (Some(false), _) => {
                tracing::info!(job = %self.name, kind = %kind, "source disabled in registry");
                subs.clear();
            }
            (None, Some(fb)) if subs.is_empty() => subs.push(fb.clone()),
            _ => {}
        }
        subs
    }

    pub async fn run_cycle(&self, today: NaiveDate) -> CycleSummary {
        let range = DateRange::last_days(today, self.days);

        let subs = self.subscriptions().await;
        let mut summary = CycleSummary {
            subscriptions: subs.len(),
            ..CycleSummary::default()
        };
        if subs.is_empty() {
            tracing::info!(job = %self.name, kind = %self.kind, "no subscriptions; nothing to do");
            return summary;
        }

        tracing::info!(job = %self.name, count = subs.len(), range = %range, "fetching subscriptions");
        let fan_in = fetch_all(self.client.clone(), subs, range, self.max_concurrency).await;
        summary.fetched = fan_in.fetched.len();
        summary.failed = fan_in.failed.iter().map(|(s, _)| s.target.clone()).collect();

        for (sub, data) in &fan_in.fetched {
            let reports = match self.synthesizer.synthesize(data, &sub.target, &range).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(job = %self.name, subscription = %sub.target, error = %format!("{e:#}"), "report synthesis failed");
                    summary.synthesis_failures.push(sub.target.clone());
                    continue;
                }
            };
            for report in &reports {
                summary.reports += 1;
                summary.deliveries.extend(self.fanout.deliver(report).await);
            }
        }

        tracing::info!(
            job = %self.name,
            fetched = summary.fetched,
            failed = summary.failed.len(),
            reports = summary.reports,
            synthesis_failures = summary.synthesis_failures.len(),
            deliveries = summary.deliveries.len(),
            "cycle complete"
        );
        summary
    }
}

#[async_trait::async_trait]
impl Job for DigestJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<()> {
        self.run_cycle(Local::now().date_naive()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{FetchResult, NewsDigest, RawData, RepoActivity, RepoMeta};
    use crate::llm::DisabledSummarizer;
    use crate::registry::{InMemoryRegistry, NewsEntry, RegistryFile};

    struct Scripted;

    #[async_trait::async_trait]
    impl SourceClient for Scripted {
        fn kind(&self) -> SourceKind {
            SourceKind::Repository
        }
        async fn fetch(&self, sub: &Subscription, _range: &DateRange) -> FetchResult {
            if sub.target.starts_with("bad/") {
                return FetchResult::failed(sub, "HTTP 404");
            }
            FetchResult::Fetched {
                subscription: sub.clone(),
                data: RawData::Repository(RepoActivity {
                    meta: RepoMeta {
                        full_name: sub.target.clone(),
                        ..RepoMeta::default()
                    },
                    ..RepoActivity::default()
                }),
            }
        }
    }

    struct News;

    #[async_trait::async_trait]
    impl SourceClient for News {
        fn kind(&self) -> SourceKind {
            SourceKind::NewsFeed
        }
        async fn fetch(&self, sub: &Subscription, _range: &DateRange) -> FetchResult {
            FetchResult::Fetched {
                subscription: sub.clone(),
                data: RawData::News(NewsDigest::default()),
            }
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    fn synth(dir: &std::path::Path, dry_run: bool) -> Arc<ReportSynthesizer> {
        Arc::new(ReportSynthesizer::new(Arc::new(DisabledSummarizer), dir).with_dry_run(dry_run))
    }

    #[tokio::test]
    async fn failed_fetches_are_excluded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(InMemoryRegistry::with_repositories([
            "a/one", "bad/two", "c/three", "bad/four",
        ]));
        let job = DigestJob::new(
            "repos",
            registry,
            Arc::new(Scripted),
            synth(dir.path(), true),
            Arc::new(NotificationFanout::new()),
        );
        let s = job.run_cycle(today()).await;
        assert_eq!(s.subscriptions, 4);
        assert_eq!(s.fetched, 2);
        assert_eq!(s.failed.len(), 2);
        assert_eq!(s.reports, 2);
    }

    #[tokio::test]
    async fn synthesis_failure_skips_only_that_subscription() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(InMemoryRegistry::with_repositories(["a/one", "b/two"]));
        // Not dry: the disabled backend errors on every call.
        let job = DigestJob::new(
            "repos",
            registry,
            Arc::new(Scripted),
            synth(dir.path(), false),
            Arc::new(NotificationFanout::new()),
        );
        let s = job.run_cycle(today()).await;
        assert_eq!(s.fetched, 2);
        assert_eq!(s.synthesis_failures, vec!["a/one".to_string(), "b/two".to_string()]);
        assert_eq!(s.reports, 0);
        assert!(job.run().await.is_ok());
    }

    #[tokio::test]
    async fn empty_registry_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let job = DigestJob::new(
            "repos",
            Arc::new(InMemoryRegistry::default()),
            Arc::new(Scripted),
            synth(dir.path(), true),
            Arc::new(NotificationFanout::new()),
        );
        let s = job.run_cycle(today()).await;
        assert_eq!(s.subscriptions, 0);
        assert_eq!(s.fetched, 0);
    }

    #[tokio::test]
    async fn news_job_uses_fallback_subscription() {
        let dir = tempfile::tempdir().unwrap();
        let job = DigestJob::new(
            "news",
            Arc::new(InMemoryRegistry::default()),
            Arc::new(News),
            synth(dir.path(), true),
            Arc::new(NotificationFanout::new()),
        )
        .with_fallback(Subscription::news_feed("hacker_news", Vec::new()));
        assert_eq!(job.kind(), SourceKind::NewsFeed);
        let s = job.run_cycle(today()).await;
        assert_eq!(s.subscriptions, 1);
        assert_eq!(s.reports, 1);
    }

    fn news_registry(enabled: bool) -> Arc<InMemoryRegistry> {
        Arc::new(InMemoryRegistry::new(RegistryFile {
            github: Vec::new(),
            hacker_news: Some(NewsEntry {
                enabled,
                keywords: vec!["rust".into()],
            }),
        }))
    }

    #[tokio::test]
    async fn disabled_registry_entry_suppresses_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let job = DigestJob::new(
            "news",
            news_registry(false),
            Arc::new(News),
            synth(dir.path(), true),
            Arc::new(NotificationFanout::new()),
        )
        .with_fallback(Subscription::news_feed("hacker_news", Vec::new()));
        let s = job.run_cycle(today()).await;
        assert_eq!(s.subscriptions, 0);
        assert_eq!(s.reports, 0);
    }

    #[tokio::test]
    async fn enabled_registry_entry_runs_without_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let registry = news_registry(true);
        let job = DigestJob::new(
            "news",
            registry.clone(),
            Arc::new(News),
            synth(dir.path(), true),
            Arc::new(NotificationFanout::new()),
        );
        let s = job.run_cycle(today()).await;
        assert_eq!(s.subscriptions, 1);
        assert_eq!(s.reports, 1);

        // Turning it off between cycles is seen on the next run.
        registry.replace(RegistryFile {
            github: Vec::new(),
            hacker_news: Some(NewsEntry::default()),
        });
        assert_eq!(job.run_cycle(today()).await.subscriptions, 0);
    }
}
