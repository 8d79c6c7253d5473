// src/ingest/providers/hacker_news.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::get_json;
use crate::ingest::types::{
    DateRange, FetchResult, NewsDigest, RawData, SourceClient, SourceError, SourceKind, Story,
    Subscription,
};
use crate::ingest::{matches_any_keyword, normalize_text};

pub const DEFAULT_HN_API: &str = "https://hacker-news.firebaseio.com/v0";
pub const DEFAULT_TOP_N: usize = 30;
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

const USER_AGENT: &str = concat!("repo-sentinel/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct Item {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    by: Option<String>,
    #[serde(default)]
    descendants: Option<i64>,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    dead: bool,
}

/// Keep stories whose title contains any keyword (case-insensitive).
/// Returns the input unchanged when there are no keywords.
pub fn filter_by_keywords(stories: &[Story], keywords: &[String]) -> Vec<Story> {
    if keywords.iter().all(|k| k.trim().is_empty()) {
        return stories.to_vec();
    }
    stories
        .iter()
        .filter(|s| matches_any_keyword(&s.title, keywords))
        .cloned()
        .collect()
}

/// Client for the Hacker News Firebase API.
#[derive(Clone)]
pub struct HackerNewsClient {
    http: reqwest::Client,
    base_url: String,
    top_n: usize,
    max_concurrency: usize,
}

impl HackerNewsClient {
    pub fn new(top_n: usize, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(4).min(timeout))
            .timeout(timeout)
            .build()
            .context("building hacker news http client")?;
        Ok(Self {
            http,
            base_url: DEFAULT_HN_API.to_string(),
            top_n: top_n.max(1),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        })
    }

    /// Upper bound on item lookups in flight at once.
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn top_story_ids(&self) -> Result<Vec<u64>, SourceError> {
        let url = format!("{}/topstories.json", self.base_url);
        let mut ids: Vec<u64> = get_json(self.http.get(&url), &url).await?;
        ids.truncate(self.top_n);
        Ok(ids)
    }

    /// `Ok(None)` for deleted, dead or title-less items.
    async fn story(&self, id: u64) -> Result<Option<Story>, SourceError> {
        let url = format!("{}/item/{}.json", self.base_url, id);
        let item: Option<Item> = get_json(self.http.get(&url), &url).await?;
        let Some(item) = item else {
            return Ok(None);
        };
        if item.deleted || item.dead {
            return Ok(None);
        }
        let title = normalize_text(item.title.as_deref().unwrap_or_default());
        if title.is_empty() {
            return Ok(None);
        }
        Ok(Some(Story {
            id: item.id,
            title,
            url: item.url,
            score: item.score,
            by: item.by,
            comments: item.descendants,
        }))
    }

    /// Top-N stories in rank order. At most `max_concurrency` item lookups
    /// are in flight; the first failed lookup fails the whole call and
    /// aborts the rest.
    pub async fn top_stories(&self) -> Result<Vec<Story>, SourceError> {
        let ids = self.top_story_ids().await?;
        let permits = Arc::new(Semaphore::new(self.max_concurrency));

        let mut lookups = JoinSet::new();
        for (rank, id) in ids.iter().copied().enumerate() {
            let this = self.clone();
            let permits = permits.clone();
            lookups.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (rank, this.story(id).await)
            });
        }

        let mut slots: Vec<Option<Story>> = vec![None; ids.len()];
        while let Some(joined) = lookups.join_next().await {
            let (rank, story) = joined.map_err(|e| SourceError::Decode {
                url: self.base_url.clone(),
                reason: format!("item lookup aborted: {e}"),
            })?;
            // Returning early drops `lookups`, which aborts whatever is left.
            slots[rank] = story?;
        }
        Ok(slots.into_iter().flatten().collect())
    }
}

#[async_trait]
impl SourceClient for HackerNewsClient {
    fn kind(&self) -> SourceKind {
        SourceKind::NewsFeed
    }

    async fn fetch(&self, subscription: &Subscription, _range: &DateRange) -> FetchResult {
        let stories = match self.top_stories().await {
            Ok(s) => s,
            Err(e) => return FetchResult::failed(subscription, e),
        };
        let filtered = if subscription.keywords.iter().any(|k| !k.trim().is_empty()) {
            Some(filter_by_keywords(&stories, &subscription.keywords))
        } else {
            None
        };
        tracing::debug!(
            feed = %subscription.target,
            stories = stories.len(),
            filtered = filtered.as_ref().map(Vec::len).unwrap_or(0),
            "hacker news stories fetched"
        );
        FetchResult::Fetched {
            subscription: subscription.clone(),
            data: RawData::News(NewsDigest { stories, filtered }),
        }
    }
}
