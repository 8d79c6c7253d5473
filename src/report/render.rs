// src/report/render.rs
use std::fmt::Write as _;

use crate::ingest::types::{DateRange, NewsDigest, RawData, RepoActivity, Story, WorkItem};

/// One Markdown document ready to be summarized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDoc {
    /// Report target shown to readers (repository name or digest title).
    pub target: String,
    pub markdown: String,
}

pub const NEWS_UNFILTERED_TITLE: &str = "Hacker News Daily Trends - Unfiltered";
pub const NEWS_FILTERED_TITLE: &str = "Hacker News Daily Trends - Filtered";

/// Render raw data into section-per-category Markdown. Repository data
/// yields one document; news data yields the unfiltered digest plus the
/// filtered one when keywords were applied.
pub fn render(raw: &RawData, target: &str, range: &DateRange) -> Vec<RenderedDoc> {
    match raw {
        RawData::Repository(activity) => vec![RenderedDoc {
            target: target.to_string(),
            markdown: render_repository(activity, target, range),
        }],
        RawData::News(digest) => render_news(digest, range),
    }
}

fn render_repository(a: &RepoActivity, target: &str, range: &DateRange) -> String {
    let name = if a.meta.full_name.is_empty() {
        target
    } else {
        a.meta.full_name.as_str()
    };
    let days = range.days().max(1);

    let mut out = String::new();
    let _ = writeln!(out, "# Progress for {name} ({range})\n");
    if let Some(desc) = a.meta.description.as_deref().filter(|d| !d.trim().is_empty()) {
        let _ = writeln!(out, "{}\n", desc.trim());
    }
    let _ = writeln!(
        out,
        "Stars: {} | Forks: {} | Open issues: {}",
        a.meta.stargazers_count, a.meta.forks_count, a.meta.open_issues_count
    );

    let _ = writeln!(out, "\n## Commits in the Last {days} Days");
    if a.commits.is_empty() {
        out.push_str("- None\n");
    }
    for c in &a.commits {
        let short = c.sha.get(..7).unwrap_or(&c.sha);
        match &c.author {
            Some(author) => {
                let _ = writeln!(out, "- {} ({short}) by {author}", c.message);
            }
            None => {
                let _ = writeln!(out, "- {} ({short})", c.message);
            }
        }
    }

    let _ = writeln!(out, "\n## Issues Closed in the Last {days} Days");
    push_work_items(&mut out, &a.issues);
    let _ = writeln!(out, "\n## Pull Requests Merged in the Last {days} Days");
    push_work_items(&mut out, &a.pull_requests);
    out
}

fn push_work_items(out: &mut String, items: &[WorkItem]) {
    if items.is_empty() {
        out.push_str("- None\n");
    }
    for it in items {
        let _ = writeln!(out, "- {} #{}", it.title, it.number);
    }
}

fn render_news(digest: &NewsDigest, range: &DateRange) -> Vec<RenderedDoc> {
    let mut docs = vec![RenderedDoc {
        target: NEWS_UNFILTERED_TITLE.to_string(),
        markdown: render_stories(NEWS_UNFILTERED_TITLE, &digest.stories, range),
    }];
    if let Some(filtered) = &digest.filtered {
        docs.push(RenderedDoc {
            target: NEWS_FILTERED_TITLE.to_string(),
            markdown: render_stories(NEWS_FILTERED_TITLE, filtered, range),
        });
    }
    docs
}

fn render_stories(title: &str, stories: &[Story], range: &DateRange) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {title} ({})\n", range.until);
    if stories.is_empty() {
        out.push_str("No stories matched.\n");
    }
    for s in stories {
        let _ = writeln!(out, "## {}", s.title);
        let _ = writeln!(out, "- URL: {}", s.url.as_deref().unwrap_or("N/A"));
        let _ = writeln!(out, "- Score: {}", opt(s.score));
        let _ = writeln!(out, "- Author: {}", s.by.as_deref().unwrap_or("N/A"));
        let _ = writeln!(out, "- Comments: {}\n", opt(s.comments));
    }
    out
}

fn opt(v: Option<i64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| "N/A".to_string())
}

/// File-system safe name for a report target.
pub fn slug(target: &str) -> String {
    target
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
