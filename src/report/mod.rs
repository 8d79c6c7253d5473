// src/report/mod.rs
//! Report synthesis: rendered Markdown -> two-stage summarization -> Report.
pub mod render;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ingest::types::{DateRange, RawData};
use crate::llm::{ChatMessage, DynSummarizer};
use render::{slug, RenderedDoc};

/// Body returned instead of a generated report when running dry.
pub const DRY_RUN_SENTINEL: &str = "DRY RUN";

/// Placeholder for the stage-one answer in persisted dry-run payloads.
const OUTLINE_PLACEHOLDER: &str = "<outline produced by the first request>";

/// Finished report. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub target: String,
    pub since: chrono::NaiveDate,
    pub until: chrono::NaiveDate,
    pub body: String,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    pub fn range(&self) -> DateRange {
        DateRange {
            since: self.since,
            until: self.until,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.body == DRY_RUN_SENTINEL
    }
}

const SYSTEM_PROMPT: &str = "You are a senior technical analyst and project manager. \
You read raw activity logs from software projects and technology news feeds and turn them \
into clear, well-structured progress reports. Be accurate about technical details while \
keeping the report readable for non-specialists. Write in English and format output as Markdown.";

fn outline_prompt(doc: &RenderedDoc, range: &DateRange) -> String {
    format!(
        "Task: write a progress report for {target} covering {range}.\n\n\
First produce a short outline of the report; we will expand it afterwards.\n\n\
Input:\n```\n{markdown}\n```\n\n\
Outline format:\n\
1. Summary\n\
2. Detailed analysis\n   2.1 New features\n   2.2 Major improvements\n   2.3 Fixes\n   2.4 Other changes\n\
3. Impact assessment\n\
4. Outlook\n\
5. Conclusion\n\n\
List only the key points for each part.",
        target = doc.target,
        range = range,
        markdown = doc.markdown.trim_end(),
    )
}

const EXPAND_PROMPT: &str = "Good. Now expand the outline above into the full report. \
Explain why each change matters, connect it to the project's direction, keep technical \
statements precise, and offer constructive observations where useful. If a section has no \
relevant updates, say so briefly. Return the complete report as Markdown.";

/// Stage one: system + user(outline request over the rendered input).
pub fn outline_messages(doc: &RenderedDoc, range: &DateRange) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(outline_prompt(doc, range)),
    ]
}

/// Stage two: the stage-one conversation, the outline echoed as the
/// assistant turn, and the expansion instruction.
pub fn expand_messages(doc: &RenderedDoc, range: &DateRange, outline: &str) -> Vec<ChatMessage> {
    let mut msgs = outline_messages(doc, range);
    msgs.push(ChatMessage::assistant(outline));
    msgs.push(ChatMessage::user(EXPAND_PROMPT));
    msgs
}

pub struct ReportSynthesizer {
    backend: DynSummarizer,
    output_dir: PathBuf,
    dry_run: bool,
}

impl ReportSynthesizer {
    pub fn new(backend: DynSummarizer, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            output_dir: output_dir.into(),
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render `raw` and synthesize one report per rendered document.
    /// Any backend failure aborts the whole call; the caller decides what
    /// to do with the subscription.
    pub async fn synthesize(
        &self,
        raw: &RawData,
        target: &str,
        range: &DateRange,
    ) -> Result<Vec<Report>> {
        let docs = render::render(raw, target, range);
        let mut reports = Vec::with_capacity(docs.len());
        for doc in &docs {
            reports.push(self.synthesize_doc(doc, range).await?);
        }
        Ok(reports)
    }

    async fn synthesize_doc(&self, doc: &RenderedDoc, range: &DateRange) -> Result<Report> {
        let dir = self.output_dir.join(slug(&doc.target));
        let raw_path = dir.join(format!("{}.md", range.label()));
        write_artifact(&raw_path, &doc.markdown).await;

        let outline_req = outline_messages(doc, range);

        let body = if self.dry_run {
            let expand_req = expand_messages(doc, range, OUTLINE_PLACEHOLDER);
            if let Err(e) = self
                .persist_prompts(doc, range, &outline_req, &expand_req)
                .await
            {
                tracing::warn!(target_name = %doc.target, error = %format!("{e:#}"), "cannot persist dry-run prompts");
            }
            tracing::info!(target_name = %doc.target, "dry run: prompts saved, backend not called");
            DRY_RUN_SENTINEL.to_string()
        } else {
            tracing::info!(target_name = %doc.target, backend = self.backend.name(), "requesting report outline");
            let outline = self
                .backend
                .complete(&outline_req)
                .await
                .with_context(|| format!("outline generation for {}", doc.target))?;
            tracing::debug!(target_name = %doc.target, outline_len = outline.len(), "outline received");

            let expand_req = expand_messages(doc, range, &outline);
            let body = self
                .backend
                .complete(&expand_req)
                .await
                .with_context(|| format!("report expansion for {}", doc.target))?;

            let report_path = dir.join(format!("{}_report.md", range.label()));
            write_artifact(&report_path, &body).await;
            body
        };

        Ok(Report {
            target: doc.target.clone(),
            since: range.since,
            until: range.until,
            body,
            generated_at: Utc::now(),
        })
    }

    async fn persist_prompts(
        &self,
        doc: &RenderedDoc,
        range: &DateRange,
        outline_req: &[ChatMessage],
        expand_req: &[ChatMessage],
    ) -> Result<()> {
        let dir = self.output_dir.join("prompts");
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
        let stem = format!("{}_{}", slug(&doc.target), range.label());
        for (suffix, payload) in [("outline", outline_req), ("expand", expand_req)] {
            let path = dir.join(format!("{stem}_{suffix}.txt"));
            let json = serde_json::to_string_pretty(payload).context("serializing prompt")?;
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
        }
        Ok(())
    }
}

/// Best-effort write of a side-effect artifact; failures are only logged.
async fn write_artifact(path: &Path, content: &str) {
    if let Some(dir) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            tracing::warn!(path = %dir.display(), error = %e, "cannot create artifact dir");
            return;
        }
    }
    match tokio::fs::write(path, content).await {
        Ok(()) => tracing::debug!(path = %path.display(), "artifact written"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot write artifact"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use chrono::NaiveDate;

    fn doc() -> RenderedDoc {
        RenderedDoc {
            target: "octocat/Hello-World".into(),
            markdown: "# Progress\n- item #1\n".into(),
        }
    }

    fn range() -> DateRange {
        DateRange::last_days(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 1)
    }

    #[test]
    fn outline_stage_grounds_on_rendered_markdown() {
        let msgs = outline_messages(&doc(), &range());
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::System);
        assert!(msgs[1].content.contains("- item #1"));
        assert!(msgs[1].content.contains("2024-01-01 to 2024-01-02"));
    }

    #[test]
    fn expansion_stage_echoes_outline_as_assistant() {
        let msgs = expand_messages(&doc(), &range(), "1. Summary");
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[1], outline_messages(&doc(), &range())[1]);
        assert_eq!(msgs[2], ChatMessage::assistant("1. Summary"));
        assert_eq!(msgs[3].role, Role::User);
    }
}
