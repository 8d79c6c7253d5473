// src/ingest/providers/github.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use super::get_json;
use crate::ingest::types::{
    CommitSummary, DateRange, FetchResult, RawData, RepoActivity, RepoMeta, SourceClient,
    SourceError, SourceKind, Subscription, WorkItem,
};

pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("repo-sentinel/", env!("CARGO_PKG_VERSION"));
const PER_PAGE: &str = "100";

/// `owner/name` coordinates of one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Accepts `owner/name` and `https://github.com/owner/name[.git][/]`.
    pub fn parse(target: &str) -> Result<Self, SourceError> {
        static RE_SEGMENT: once_cell::sync::OnceCell<regex::Regex> =
            once_cell::sync::OnceCell::new();
        let re = RE_SEGMENT.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap());

        let mut s = target.trim();
        for prefix in ["https://github.com/", "http://github.com/", "github.com/"] {
            if let Some(rest) = s.strip_prefix(prefix) {
                s = rest;
                break;
            }
        }
        let s = s.trim_end_matches('/');
        let s = s.strip_suffix(".git").unwrap_or(s);

        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if re.is_match(owner) && re.is_match(name) => {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(SourceError::MalformedTarget(target.to_string())),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: String,
    commit: ApiCommitBody,
}

#[derive(Debug, Deserialize)]
struct ApiCommitBody {
    message: String,
    #[serde(default)]
    author: Option<ApiAuthor>,
}

#[derive(Debug, Deserialize)]
struct ApiAuthor {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiIssue {
    number: u64,
    title: String,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    closed_at: Option<DateTime<Utc>>,
    /// Present only when the "issue" is really a pull request.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

/// Read-only client for the GitHub REST API.
#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(token: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(4).min(timeout))
            .timeout(timeout)
            .build()
            .context("building github http client")?;
        Ok(Self {
            http,
            base_url: DEFAULT_GITHUB_API.to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let req = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn metadata(&self, repo: &RepoRef) -> Result<RepoMeta, SourceError> {
        let url = format!("{}/repos/{}", self.base_url, repo.full_name());
        get_json(self.get(&url), &url).await
    }

    async fn commits(
        &self,
        repo: &RepoRef,
        range: &DateRange,
    ) -> Result<Vec<CommitSummary>, SourceError> {
        let url = format!("{}/repos/{}/commits", self.base_url, repo.full_name());
        let (since, until) = iso_bounds(range);
        let req = self
            .get(&url)
            .query(&[("since", since.as_str()), ("until", until.as_str()), ("per_page", PER_PAGE)]);
        let items: Vec<ApiCommit> = get_json(req, &url).await?;
        Ok(items
            .into_iter()
            .map(|c| CommitSummary {
                sha: c.sha,
                message: c.commit.message.lines().next().unwrap_or_default().to_string(),
                author: c.commit.author.and_then(|a| a.name),
            })
            .collect())
    }

    /// Issues and pull requests closed inside `range`, split by kind.
    async fn closed_work(
        &self,
        repo: &RepoRef,
        range: &DateRange,
    ) -> Result<(Vec<WorkItem>, Vec<WorkItem>), SourceError> {
        let url = format!("{}/repos/{}/issues", self.base_url, repo.full_name());
        let (since, _) = iso_bounds(range);
        let req = self.get(&url).query(&[
            ("state", "closed"),
            ("since", since.as_str()),
            ("per_page", PER_PAGE),
        ]);
        let items: Vec<ApiIssue> = get_json(req, &url).await?;

        let mut issues = Vec::new();
        let mut pulls = Vec::new();
        for it in items {
            let in_range = it
                .closed_at
                .map(|ts| range.contains(ts.date_naive()))
                .unwrap_or(false);
            if !in_range {
                continue;
            }
            let item = WorkItem {
                number: it.number,
                title: it.title,
                url: it.html_url,
            };
            if it.pull_request.is_some() {
                pulls.push(item);
            } else {
                issues.push(item);
            }
        }
        Ok((issues, pulls))
    }

    /// All three calls must succeed; partial data is discarded otherwise.
    pub async fn fetch_activity(
        &self,
        repo: &RepoRef,
        range: &DateRange,
    ) -> Result<RepoActivity, SourceError> {
        let (meta, commits, (issues, pull_requests)) = tokio::try_join!(
            self.metadata(repo),
            self.commits(repo, range),
            self.closed_work(repo, range),
        )?;
        Ok(RepoActivity {
            meta,
            commits,
            issues,
            pull_requests,
        })
    }
}

fn iso_bounds(range: &DateRange) -> (String, String) {
    (
        format!("{}T00:00:00Z", range.since),
        format!("{}T23:59:59Z", range.until),
    )
}

#[async_trait]
impl SourceClient for GithubClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Repository
    }

    async fn fetch(&self, subscription: &Subscription, range: &DateRange) -> FetchResult {
        let repo = match RepoRef::parse(&subscription.target) {
            Ok(r) => r,
            Err(e) => return FetchResult::failed(subscription, e),
        };
        match self.fetch_activity(&repo, range).await {
            Ok(activity) => {
                tracing::debug!(
                    repo = %repo.full_name(),
                    commits = activity.commits.len(),
                    issues = activity.issues.len(),
                    pull_requests = activity.pull_requests.len(),
                    "github activity fetched"
                );
                FetchResult::Fetched {
                    subscription: subscription.clone(),
                    data: RawData::Repository(activity),
                }
            }
            Err(e) => FetchResult::failed(subscription, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn parses_plain_and_url_targets() {
        let plain = RepoRef::parse("octocat/Hello-World").unwrap();
        assert_eq!(plain.full_name(), "octocat/Hello-World");

        let url = RepoRef::parse("https://github.com/rust-lang/rust.git/").unwrap();
        assert_eq!(url.owner, "rust-lang");
        assert_eq!(url.name, "rust");
    }

    #[test]
    fn rejects_malformed_targets() {
        for bad in ["", "octocat", "a/b/c", "owner/ na me", "https://gitlab.com/a/b"] {
            assert!(
                matches!(RepoRef::parse(bad), Err(SourceError::MalformedTarget(_))),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn iso_bounds_cover_whole_days() {
        let range = DateRange {
            since: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            until: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        };
        let (s, u) = iso_bounds(&range);
        assert_eq!(s, "2024-01-01T00:00:00Z");
        assert_eq!(u, "2024-01-02T23:59:59Z");
    }

    #[tokio::test]
    async fn malformed_target_is_a_failed_result_not_an_error() {
        let client = GithubClient::new(None, Duration::from_secs(1))
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let sub = Subscription::repository("not a repo");
        let range = DateRange::last_days(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 1);
        match client.fetch(&sub, &range).await {
            FetchResult::Failed { cause, .. } => {
                assert!(!cause.is_empty());
                assert!(cause.contains("malformed target identifier"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
