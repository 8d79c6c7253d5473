// src/notify/mod.rs
pub mod email;
pub mod slack;

use anyhow::Result;
use metrics::counter;
use serde::Serialize;
use std::fmt;

use crate::report::Report;

/// One notification transport.
#[async_trait::async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, report: &Report) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed { cause: String },
}

/// Per-channel result of one delivery. Observability only; never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub channel: &'static str,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self.status, DeliveryStatus::Sent)
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            DeliveryStatus::Sent => write!(f, "{}: sent", self.channel),
            DeliveryStatus::Failed { cause } => write!(f, "{}: failed ({cause})", self.channel),
        }
    }
}

/// Delivers a report to every configured channel, isolating failures.
#[derive(Default)]
pub struct NotificationFanout {
    channels: Vec<Box<dyn Channel>>,
    unconfigured: Vec<&'static str>,
}

impl NotificationFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: Box<dyn Channel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Record a known channel kind that has no usable configuration.
    pub fn with_unconfigured(mut self, name: &'static str) -> Self {
        self.unconfigured.push(name);
        self
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn unconfigured(&self) -> &[&'static str] {
        &self.unconfigured
    }

    /// Attempt every configured channel. Always returns exactly one outcome
    /// per configured channel; unconfigured ones only produce a warning.
    pub async fn deliver(&self, report: &Report) -> Vec<DeliveryOutcome> {
        crate::telemetry::ensure_metrics_described();

        for name in &self.unconfigured {
            tracing::warn!(channel = *name, report = %report.target, "channel not configured; skipping");
        }

        let mut outcomes = Vec::with_capacity(self.channels.len());
        for ch in &self.channels {
            let status = match ch.send(report).await {
                Ok(()) => {
                    tracing::info!(channel = ch.name(), report = %report.target, "notification sent");
                    DeliveryStatus::Sent
                }
                Err(e) => {
                    let cause = format!("{e:#}");
                    tracing::error!(channel = ch.name(), report = %report.target, error = %cause, "notification failed");
                    DeliveryStatus::Failed { cause }
                }
            };
            let label = match &status {
                DeliveryStatus::Sent => "sent",
                DeliveryStatus::Failed { .. } => "failed",
            };
            counter!("sentinel_deliveries_total", "channel" => ch.name(), "status" => label)
                .increment(1);
            outcomes.push(DeliveryOutcome {
                channel: ch.name(),
                status,
            });
        }
        outcomes
    }
}

/// Subject / header line shared by all channels.
pub fn headline(report: &Report) -> String {
    format!("[Sentinel] {} progress report", report.target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::{NaiveDate, Utc};

    struct Fixed(&'static str, bool);

    #[async_trait::async_trait]
    impl Channel for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }
        async fn send(&self, _report: &Report) -> Result<()> {
            if self.1 {
                Ok(())
            } else {
                Err(anyhow!("boom"))
            }
        }
    }

    fn report() -> Report {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        Report {
            target: "a/b".into(),
            since: d,
            until: d,
            body: "# hi".into(),
            generated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn one_outcome_per_configured_channel() {
        let fanout = NotificationFanout::new()
            .with_channel(Box::new(Fixed("email", false)))
            .with_channel(Box::new(Fixed("slack", true)))
            .with_unconfigured("other");
        let out = fanout.deliver(&report()).await;
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0].status,
            DeliveryStatus::Failed {
                cause: "boom".into()
            }
        );
        assert!(out[1].is_sent());
    }

    #[tokio::test]
    async fn no_channels_means_no_outcomes() {
        let out = NotificationFanout::new().deliver(&report()).await;
        assert!(out.is_empty());
    }

    #[test]
    fn outcome_serializes_flat() {
        let o = DeliveryOutcome {
            channel: "email",
            status: DeliveryStatus::Sent,
        };
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(v, serde_json::json!({"channel": "email", "status": "sent"}));
        assert_eq!(o.to_string(), "email: sent");
    }
}
