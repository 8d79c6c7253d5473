//! repo-sentinel: scheduled repository and news digests.
//! Boots configuration, tracing and metrics, then runs the scheduler
//! until SIGINT/SIGTERM, or performs a one-off registry command.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;

use repo_sentinel::bootstrap::Pipeline;
use repo_sentinel::ingest::providers::github::RepoRef;
use repo_sentinel::{telemetry, FileRegistry, Settings};

#[derive(Parser)]
#[command(name = "repo-sentinel", version, about)]
struct Cli {
    /// JSON or TOML configuration file (default: $SENTINEL_CONFIG, config.json, config.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until interrupted.
    Run {
        /// Assemble prompts but never call the summarization backend.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run every enabled job once and exit.
    Once {
        #[arg(long)]
        dry_run: bool,
    },
    /// Add a repository ("owner/name" or a github.com URL).
    Subscribe { target: String },
    /// Remove a repository.
    Unsubscribe { target: String },
    /// Show current subscriptions.
    List,
    /// Enable or disable the Hacker News digest.
    News {
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
        /// Comma-separated title keywords; keeps the current list when omitted.
        #[arg(long, value_delimiter = ',')]
        keywords: Option<Vec<String>>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present; no-op otherwise.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::load_default()?,
    };

    match cli.command.unwrap_or(Command::Run { dry_run: false }) {
        Command::Run { dry_run } => run_daemon(&settings, dry_run).await,
        Command::Once { dry_run } => {
            let pipeline = Pipeline::build(&settings, dry_run)?;
            pipeline.scheduler().run_startup().await;
            Ok(())
        }
        Command::Subscribe { target } => {
            let repo = RepoRef::parse(&target)?;
            let registry = FileRegistry::new(&settings.subscriptions_file);
            if registry.add_repository(&repo.full_name())? {
                println!("subscribed to {}", repo.full_name());
            } else {
                println!("already subscribed to {}", repo.full_name());
            }
            Ok(())
        }
        Command::Unsubscribe { target } => {
            let name = RepoRef::parse(&target)
                .map(|r| r.full_name())
                .unwrap_or_else(|_| target.trim().to_string());
            let registry = FileRegistry::new(&settings.subscriptions_file);
            if registry.remove_repository(&name)? {
                println!("unsubscribed from {name}");
            } else {
                println!("{name} was not subscribed");
            }
            Ok(())
        }
        Command::List => {
            let doc = FileRegistry::new(&settings.subscriptions_file).load();
            println!("repositories:");
            if doc.github.is_empty() {
                println!("  (none)");
            }
            for repo in &doc.github {
                println!("  {repo}");
            }
            let state = match doc.hacker_news.as_ref().map(|n| n.enabled) {
                Some(true) => "enabled",
                Some(false) => "disabled",
                None => "per config",
            };
            let keywords = doc.news_keywords();
            println!(
                "hacker news: {state} (keywords: {})",
                if keywords.is_empty() {
                    "none".to_string()
                } else {
                    keywords.join(", ")
                }
            );
            Ok(())
        }
        Command::News {
            enable,
            disable,
            keywords,
        } => {
            if !enable && !disable {
                bail!("pass --enable or --disable");
            }
            let registry = FileRegistry::new(&settings.subscriptions_file);
            let keywords = keywords.unwrap_or_else(|| registry.load().news_keywords());
            registry.set_news(enable, keywords)?;
            println!("hacker news digest {}", if enable { "enabled" } else { "disabled" });
            Ok(())
        }
    }
}

async fn run_daemon(settings: &Settings, dry_run: bool) -> Result<()> {
    if let Some(addr) = telemetry::init_metrics_from_env()? {
        tracing::info!(%addr, "prometheus exporter listening");
    }
    let pipeline = Pipeline::build(settings, dry_run)?;
    let shutdown = shutdown_signal()?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sentinel starting");
    let reason = pipeline.scheduler().run_until(shutdown).await;
    tracing::info!(reason, "shutting down");
    Ok(())
}

/// Handlers are installed before the first job runs so a signal received
/// mid-job is seen at the next tick boundary.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut interrupt = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => "interrupt",
            _ = terminate.recv() => "terminate",
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "interrupt",
            Err(e) => {
                tracing::error!(error = %e, "ctrl-c handler failed");
                std::future::pending().await
            }
        }
    })
}
