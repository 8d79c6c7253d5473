// src/ingest/types.rs
use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which upstream a subscription is polled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Repository,
    NewsFeed,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Repository => "repository",
            SourceKind::NewsFeed => "news_feed",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One monitored target. Immutable for the duration of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub kind: SourceKind,
    /// "owner/name" for repositories, a feed label for news.
    pub target: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Subscription {
    pub fn repository(target: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Repository,
            target: target.into(),
            keywords: Vec::new(),
        }
    }

    pub fn news_feed(target: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            kind: SourceKind::NewsFeed,
            target: target.into(),
            keywords,
        }
    }
}

/// Inclusive calendar range `[since, until]` covered by one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

impl DateRange {
    /// The `days` days leading up to and including `today`.
    pub fn last_days(today: NaiveDate, days: u32) -> Self {
        Self {
            since: today - ChronoDuration::days(i64::from(days)),
            until: today,
        }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.since <= day && day <= self.until
    }

    pub fn days(&self) -> i64 {
        (self.until - self.since).num_days()
    }

    /// File-name friendly form, e.g. `2024-01-01_to_2024-01-02`.
    pub fn label(&self) -> String {
        format!("{}_to_{}", self.since, self.until)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.since, self.until)
    }
}

// ---- Repository payload ----

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMeta {
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
    /// First line of the commit message.
    pub message: String,
    pub author: Option<String>,
}

/// An issue or pull request; the repository API serves both from one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub number: u64,
    pub title: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoActivity {
    pub meta: RepoMeta,
    pub commits: Vec<CommitSummary>,
    pub issues: Vec<WorkItem>,
    pub pull_requests: Vec<WorkItem>,
}

// ---- News-feed payload ----

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub id: u64,
    pub title: String,
    pub url: Option<String>,
    pub score: Option<i64>,
    pub by: Option<String>,
    pub comments: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsDigest {
    /// Top-N stories in rank order.
    pub stories: Vec<Story>,
    /// Keyword-matched subset; `None` when the subscription has no keywords.
    pub filtered: Option<Vec<Story>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawData {
    Repository(RepoActivity),
    News(NewsDigest),
}

/// Per-subscription outcome of one fetch. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Fetched {
        subscription: Subscription,
        data: RawData,
    },
    Failed {
        subscription: Subscription,
        cause: String,
    },
}

impl FetchResult {
    pub fn failed(subscription: &Subscription, cause: impl fmt::Display) -> Self {
        FetchResult::Failed {
            subscription: subscription.clone(),
            cause: cause.to_string(),
        }
    }

    pub fn subscription(&self) -> &Subscription {
        match self {
            FetchResult::Fetched { subscription, .. } | FetchResult::Failed { subscription, .. } => {
                subscription
            }
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FetchResult::Failed { .. })
    }
}

/// Failure taxonomy below the fetch boundary. Converted into
/// [`FetchResult::Failed`] before it leaves a [`SourceClient`].
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("malformed target identifier: {0:?}")]
    MalformedTarget(String),
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// One external source. Implementations are stateless apart from their HTTP
/// session and must be safe to call concurrently.
#[async_trait::async_trait]
pub trait SourceClient: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Pure read against the upstream; every failure lands in the result.
    async fn fetch(&self, subscription: &Subscription, range: &DateRange) -> FetchResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_days_is_inclusive_of_today() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let r = DateRange::last_days(today, 7);
        assert_eq!(r.since, NaiveDate::from_ymd_opt(2024, 3, 3).unwrap());
        assert_eq!(r.days(), 7);
        assert!(r.contains(today));
        assert!(!r.contains(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()));
        assert_eq!(r.label(), "2024-03-03_to_2024-03-10");
    }

    #[test]
    fn failed_result_keeps_subscription_and_cause() {
        let sub = Subscription::repository("a/b");
        let r = FetchResult::failed(&sub, SourceError::MalformedTarget("x".into()));
        assert!(r.is_failure());
        assert_eq!(r.subscription(), &sub);
        match r {
            FetchResult::Failed { cause, .. } => assert!(cause.contains("malformed target")),
            _ => unreachable!(),
        }
    }
}
