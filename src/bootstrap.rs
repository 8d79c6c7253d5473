// src/bootstrap.rs
//! Wires [`Settings`] into clients, jobs and a ready-to-run scheduler.
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::ingest::providers::github::GithubClient;
use crate::ingest::providers::hacker_news::HackerNewsClient;
use crate::ingest::types::Subscription;
use crate::jobs::DigestJob;
use crate::llm::{DisabledSummarizer, DynSummarizer, OpenAiSummarizer};
use crate::notify::email::EmailChannel;
use crate::notify::slack::SlackNotifier;
use crate::notify::NotificationFanout;
use crate::registry::{FileRegistry, NEWS_FEED_TARGET};
use crate::report::ReportSynthesizer;
use crate::scheduler::{Schedule, Scheduler};

/// Email and Slack, each either live or recorded as unconfigured.
pub fn build_fanout(settings: &Settings) -> NotificationFanout {
    let timeout = Duration::from_secs(settings.http.timeout_secs.max(1));
    let mut fanout = NotificationFanout::new();

    fanout = match &settings.email {
        Some(email) => match EmailChannel::from_settings(email, timeout) {
            Ok(ch) => fanout.with_channel(Box::new(ch)),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "email settings unusable");
                fanout.with_unconfigured("email")
            }
        },
        None => fanout.with_unconfigured("email"),
    };

    match &settings.slack_webhook_url {
        Some(url) => fanout.with_channel(Box::new(
            SlackNotifier::new(url.clone()).with_timeout(timeout),
        )),
        None => fanout.with_unconfigured("slack"),
    }
}

/// OpenAI-compatible backend, or a disabled one when no key is available.
pub fn build_summarizer(settings: &Settings) -> Result<DynSummarizer> {
    let llm = &settings.llm;
    if llm.api_key.trim().is_empty() {
        tracing::warn!("no llm api key configured; only dry runs can produce reports");
        return Ok(Arc::new(DisabledSummarizer));
    }
    let backend = OpenAiSummarizer::new(
        llm.api_key.clone(),
        llm.model.clone(),
        Duration::from_secs(llm.timeout_secs.max(1)),
    )?
    .with_base_url(llm.base_url.clone())
    .with_temperature(llm.temperature);
    Ok(Arc::new(backend))
}

/// Every long-lived component of one process, built from settings.
pub struct Pipeline {
    pub registry: Arc<FileRegistry>,
    pub synthesizer: Arc<ReportSynthesizer>,
    pub fanout: Arc<NotificationFanout>,
    pub repo_job: Arc<DigestJob>,
    pub repo_schedule: Schedule,
    pub news_job: Arc<DigestJob>,
    pub news_schedule: Schedule,
}

impl Pipeline {
    /// Validates settings first; a bad schedule is fatal.
    pub fn build(settings: &Settings, dry_run: bool) -> Result<Self> {
        settings.validate()?;
        let timeout = Duration::from_secs(settings.http.timeout_secs.max(1));
        let concurrency = settings.http.max_concurrency;

        let registry = Arc::new(FileRegistry::new(settings.subscriptions_file.clone()));
        let synthesizer = Arc::new(
            ReportSynthesizer::new(build_summarizer(settings)?, settings.output_dir.clone())
                .with_dry_run(dry_run || settings.llm.dry_run),
        );
        let fanout = Arc::new(build_fanout(settings));

        let github = GithubClient::new(settings.github.token.clone(), timeout)?
            .with_base_url(settings.github.base_url.clone());
        let repo_job = Arc::new(
            DigestJob::new(
                "github_progress",
                registry.clone(),
                Arc::new(github),
                synthesizer.clone(),
                fanout.clone(),
            )
            .with_days(settings.github.frequency_days)
            .with_max_concurrency(concurrency),
        );
        let repo_schedule = Schedule::every_days(
            settings.github.frequency_days,
            &settings.github.execution_time,
        )?;

        // Always scheduled: the registry can switch the digest on or off
        // between cycles. Config only supplies the default subscription.
        let hn = HackerNewsClient::new(settings.hacker_news.top_n, timeout)?
            .with_base_url(settings.hacker_news.base_url.clone())
            .with_max_concurrency(concurrency);
        let mut news_job = DigestJob::new(
            "hacker_news_digest",
            registry.clone(),
            Arc::new(hn),
            synthesizer.clone(),
            fanout.clone(),
        )
        .with_max_concurrency(concurrency);
        if settings.hacker_news.enabled {
            news_job = news_job.with_fallback(Subscription::news_feed(
                NEWS_FEED_TARGET,
                settings.hacker_news.keywords.clone(),
            ));
        }
        let news_schedule = Schedule::daily_at(&settings.hacker_news.execution_times)?;

        tracing::info!(
            channels = ?fanout.channel_names(),
            unconfigured = ?fanout.unconfigured(),
            dry_run = synthesizer.is_dry_run(),
            news_default = settings.hacker_news.enabled,
            "pipeline ready"
        );

        Ok(Self {
            registry,
            synthesizer,
            fanout,
            repo_job,
            repo_schedule,
            news_job: Arc::new(news_job),
            news_schedule,
        })
    }

    pub fn scheduler(&self) -> Scheduler {
        let mut s = Scheduler::new();
        s.register(self.repo_schedule.clone(), self.repo_job.clone());
        s.register(self.news_schedule.clone(), self.news_job.clone());
        s
    }
}
