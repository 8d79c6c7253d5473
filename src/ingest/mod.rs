// src/ingest/mod.rs
pub mod providers;
pub mod types;

use crate::ingest::types::{DateRange, FetchResult, RawData, SourceClient, Subscription};
use metrics::{counter, histogram};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Normalize text: decode HTML entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Case-insensitive substring match of `text` against any keyword.
/// Blank keywords never match.
pub fn matches_any_keyword<S: AsRef<str>>(text: &str, keywords: &[S]) -> bool {
    let hay = text.to_lowercase();
    keywords.iter().any(|k| {
        let k = k.as_ref().trim();
        !k.is_empty() && hay.contains(&k.to_lowercase())
    })
}

/// Settled outcome of one fan-out: successes and failures, each tagged with
/// the subscription that produced it.
#[derive(Debug, Default)]
pub struct FanIn {
    pub fetched: Vec<(Subscription, RawData)>,
    pub failed: Vec<(Subscription, String)>,
}

impl FanIn {
    fn push(&mut self, result: FetchResult) {
        match result {
            FetchResult::Fetched { subscription, data } => self.fetched.push((subscription, data)),
            FetchResult::Failed {
                subscription,
                cause,
            } => self.failed.push((subscription, cause)),
        }
    }
}

/// Fetch every subscription concurrently (at most `max_concurrency` in
/// flight) and wait for all of them to settle. One warning is logged per
/// failed subscription; failures never abort the batch.
pub async fn fetch_all(
    client: Arc<dyn SourceClient>,
    subscriptions: Vec<Subscription>,
    range: DateRange,
    max_concurrency: usize,
) -> FanIn {
    crate::telemetry::ensure_metrics_described();

    let kind = client.kind().as_str();
    let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut handles = Vec::with_capacity(subscriptions.len());

    for sub in subscriptions {
        let client = Arc::clone(&client);
        let permits = Arc::clone(&permits);
        let task_sub = sub.clone();
        let handle = tokio::spawn(async move {
            // Only errors if the semaphore was closed, which never happens here.
            let _permit = match permits.acquire_owned().await {
                Ok(p) => p,
                Err(e) => return FetchResult::failed(&task_sub, format!("fetch not started: {e}")),
            };
            let t0 = std::time::Instant::now();
            let out = client.fetch(&task_sub, &range).await;
            histogram!("sentinel_fetch_ms", "kind" => kind)
                .record(t0.elapsed().as_secs_f64() * 1_000.0);
            out
        });
        handles.push((sub, handle));
    }

    let mut fan_in = FanIn::default();
    for (sub, handle) in handles {
        let result = match handle.await {
            Ok(r) => r,
            Err(e) => FetchResult::failed(&sub, format!("fetch task aborted: {e}")),
        };
        counter!("sentinel_fetch_total", "kind" => kind).increment(1);
        if let FetchResult::Failed { subscription, cause } = &result {
            counter!("sentinel_fetch_failures_total", "kind" => kind).increment(1);
            tracing::warn!(subscription = %subscription.target, kind, cause = %cause, "fetch failed");
        }
        fan_in.push(result);
    }

    fan_in
}
