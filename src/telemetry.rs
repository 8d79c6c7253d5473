// src/telemetry.rs
//! Tracing subscriber and Prometheus recorder setup.
use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "repo_sentinel=info,warn";

pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sentinel_job_runs_total", "Scheduled job executions.");
        describe_counter!(
            "sentinel_job_errors_total",
            "Job executions that returned an error or panicked."
        );
        describe_counter!("sentinel_fetch_total", "Subscription fetch attempts.");
        describe_counter!(
            "sentinel_fetch_failures_total",
            "Subscription fetches that produced a failure result."
        );
        describe_histogram!("sentinel_fetch_ms", "Per-subscription fetch time in milliseconds.");
        describe_counter!(
            "sentinel_deliveries_total",
            "Notification attempts by channel and status."
        );
        describe_gauge!(
            "sentinel_last_cycle_ts",
            "Unix ts when a job last completed a cycle."
        );
    });
}

/// Install the global subscriber. `RUST_LOG` wins over the default filter;
/// `LOG_FORMAT=json` switches to line-delimited JSON.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let (json_layer, compact_layer) = if json {
        (Some(fmt::layer().json()), None)
    } else {
        (None, Some(fmt::layer().compact()))
    };

    // A second init (tests, embedding) is harmless.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(compact_layer)
        .try_init();
}

/// Expose `/metrics` on `METRICS_ADDR` when set. Must run inside a Tokio runtime.
pub fn init_metrics_from_env() -> Result<Option<SocketAddr>> {
    let Ok(raw) = std::env::var("METRICS_ADDR") else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let addr: SocketAddr = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid METRICS_ADDR {raw:?}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("prometheus: install exporter")?;
    ensure_metrics_described();
    Ok(Some(addr))
}
