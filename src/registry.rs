// src/registry.rs
//! Subscription storage consumed read-only by the pipeline.
//!
//! The scheduler asks for a fresh snapshot at the start of every job, so
//! edits made between cycles (CLI, hand edits of the file) take effect on
//! the next run without a restart.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::ingest::types::{SourceKind, Subscription};

/// Target label used for the news-feed subscription.
pub const NEWS_FEED_TARGET: &str = "hacker_news";

pub trait SubscriptionRegistry: Send + Sync {
    /// Ordered snapshot of active subscriptions for one source.
    fn list_by_source(&self, kind: SourceKind) -> Vec<Subscription>;

    /// Explicit on/off switch for a source, `None` when the registry says
    /// nothing about it.
    fn source_enabled(&self, _kind: SourceKind) -> Option<bool> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsEntry {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// On-disk document: `{"github": [...], "hacker_news": {...}}`.
/// A missing `hacker_news` entry leaves the decision to configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub github: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hacker_news: Option<NewsEntry>,
}

impl RegistryFile {
    fn subscriptions(&self, kind: SourceKind) -> Vec<Subscription> {
        match (kind, &self.hacker_news) {
            (SourceKind::Repository, _) => clean_list(self.github.clone())
                .into_iter()
                .map(Subscription::repository)
                .collect(),
            (SourceKind::NewsFeed, Some(news)) if news.enabled => vec![Subscription::news_feed(
                NEWS_FEED_TARGET,
                clean_list(news.keywords.clone()),
            )],
            (SourceKind::NewsFeed, _) => Vec::new(),
        }
    }

    fn source_enabled(&self, kind: SourceKind) -> Option<bool> {
        match kind {
            SourceKind::Repository => None,
            SourceKind::NewsFeed => self.hacker_news.as_ref().map(|n| n.enabled),
        }
    }

    /// Keywords of the news entry, empty when there is none.
    pub fn news_keywords(&self) -> Vec<String> {
        self.hacker_news
            .as_ref()
            .map(|n| n.keywords.clone())
            .unwrap_or_default()
    }
}

/// Trim, drop blanks, dedup; keeps first-seen order.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && seen.insert(t.to_string()) {
            out.push(t.to_string());
        }
    }
    out
}

/// JSON-file backed registry. Every read goes back to disk; a missing or
/// corrupt file reads as an empty registry. Mutations refuse to replace a
/// file they cannot parse.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file contents, or an empty document when missing/corrupt.
    pub fn load(&self) -> RegistryFile {
        match fs::read_to_string(&self.path) {
            Ok(s) => match serde_json::from_str(&s) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "subscriptions file is not valid JSON; using an empty registry"
                    );
                    RegistryFile::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "subscriptions file not found; using an empty registry");
                RegistryFile::default()
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read subscriptions file; using an empty registry");
                RegistryFile::default()
            }
        }
    }

    /// Like [`load`](Self::load) but a present, unreadable file is an error.
    fn load_for_update(&self) -> Result<RegistryFile> {
        match fs::read_to_string(&self.path) {
            Ok(s) => serde_json::from_str(&s).with_context(|| {
                format!(
                    "{} is not a valid subscriptions file; fix or remove it first",
                    self.path.display()
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RegistryFile::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    fn save(&self, doc: &RegistryFile) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(doc).context("serializing subscriptions")?;
        let mut f = fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        f.write_all(json.as_bytes())?;
        f.write_all(b"\n")?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    /// Returns `false` if the repository was already subscribed.
    pub fn add_repository(&self, target: &str) -> Result<bool> {
        let target = target.trim();
        anyhow::ensure!(!target.is_empty(), "empty repository identifier");
        let mut doc = self.load_for_update()?;
        if doc.github.iter().any(|r| r.trim() == target) {
            return Ok(false);
        }
        doc.github.push(target.to_string());
        self.save(&doc)?;
        tracing::info!(repo = target, "added repository subscription");
        Ok(true)
    }

    /// Returns `false` if the repository was not subscribed.
    pub fn remove_repository(&self, target: &str) -> Result<bool> {
        let target = target.trim();
        let mut doc = self.load_for_update()?;
        let before = doc.github.len();
        doc.github.retain(|r| r.trim() != target);
        if doc.github.len() == before {
            return Ok(false);
        }
        self.save(&doc)?;
        tracing::info!(repo = target, "removed repository subscription");
        Ok(true)
    }

    pub fn set_news(&self, enabled: bool, keywords: Vec<String>) -> Result<()> {
        let mut doc = self.load_for_update()?;
        let keywords = clean_list(keywords);
        doc.hacker_news = Some(NewsEntry {
            enabled,
            keywords: keywords.clone(),
        });
        self.save(&doc)?;
        tracing::info!(enabled, keywords = ?keywords, "updated news subscription");
        Ok(())
    }
}

impl SubscriptionRegistry for FileRegistry {
    fn list_by_source(&self, kind: SourceKind) -> Vec<Subscription> {
        self.load().subscriptions(kind)
    }

    fn source_enabled(&self, kind: SourceKind) -> Option<bool> {
        self.load().source_enabled(kind)
    }
}

/// Process-local registry; used in tests and wherever no file is wanted.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    doc: RwLock<RegistryFile>,
}

impl InMemoryRegistry {
    pub fn new(doc: RegistryFile) -> Self {
        Self {
            doc: RwLock::new(doc),
        }
    }

    pub fn with_repositories<I, S>(repos: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(RegistryFile {
            github: repos.into_iter().map(Into::into).collect(),
            hacker_news: None,
        })
    }

    pub fn replace(&self, doc: RegistryFile) {
        match self.doc.write() {
            Ok(mut g) => *g = doc,
            Err(poisoned) => *poisoned.into_inner() = doc,
        }
    }
}

impl SubscriptionRegistry for InMemoryRegistry {
    fn list_by_source(&self, kind: SourceKind) -> Vec<Subscription> {
        match self.doc.read() {
            Ok(g) => g.subscriptions(kind),
            Err(poisoned) => poisoned.into_inner().subscriptions(kind),
        }
    }

    fn source_enabled(&self, kind: SourceKind) -> Option<bool> {
        match self.doc.read() {
            Ok(g) => g.source_enabled(kind),
            Err(poisoned) => poisoned.into_inner().source_enabled(kind),
        }
    }
}
