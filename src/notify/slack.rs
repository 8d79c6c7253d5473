use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;

use super::{headline, Channel};
use crate::report::Report;

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+(.+?)[ \t]*#*[ \t]*$").unwrap());
static RE_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*|__(.+?)__").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").unwrap());

/// Markdown -> Slack mrkdwn: headings and bold become `*emphasis*`,
/// links become `<url|text>`. Everything else passes through.
pub fn to_mrkdwn(md: &str) -> String {
    let out = RE_BOLD.replace_all(md, |c: &regex::Captures| {
        let inner = c.get(1).or_else(|| c.get(2)).map(|m| m.as_str()).unwrap_or_default();
        format!("*{inner}*")
    });
    let out = RE_HEADING.replace_all(&out, "*$1*");
    RE_LINK.replace_all(&out, "<$2|$1>").into_owned()
}

pub fn format_message(report: &Report) -> String {
    format!("*{}*\n\n{}", headline(report), to_mrkdwn(&report.body))
}

/// Incoming-webhook channel: POSTs `{"text": ...}`.
pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
    timeout: Duration,
}

impl SlackNotifier {
    pub fn new(url: String) -> Self {
        Self {
            webhook_url: url,
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl Channel for SlackNotifier {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, report: &Report) -> Result<()> {
        let body = serde_json::json!({ "text": format_message(report) });

        self.client
            .post(&self.webhook_url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(())
    }
}
