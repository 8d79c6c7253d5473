// src/config/settings.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

pub const ENV_CONFIG_PATH: &str = "SENTINEL_CONFIG";

fn default_subscriptions_file() -> PathBuf {
    PathBuf::from("subscriptions.json")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("daily_progress")
}
fn default_frequency_days() -> u32 {
    1
}
fn default_execution_time() -> String {
    "08:00".to_string()
}
fn default_github_api() -> String {
    crate::ingest::providers::github::DEFAULT_GITHUB_API.to_string()
}
fn default_news_times() -> String {
    "09:00".to_string()
}
fn default_top_n() -> usize {
    crate::ingest::providers::hacker_news::DEFAULT_TOP_N
}
fn default_hn_api() -> String {
    crate::ingest::providers::hacker_news::DEFAULT_HN_API.to_string()
}
fn default_smtp_port() -> u16 {
    465
}
fn default_model() -> String {
    crate::llm::DEFAULT_MODEL.to_string()
}
fn default_llm_base_url() -> String {
    crate::llm::DEFAULT_OPENAI_BASE_URL.to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_http_timeout() -> u64 {
    10
}
fn default_max_concurrency() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubSettings {
    /// Falls back to `GITHUB_TOKEN`; anonymous access when neither is set.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_frequency_days")]
    pub frequency_days: u32,
    /// 24h `HH:MM`.
    #[serde(default = "default_execution_time")]
    pub execution_time: String,
    #[serde(default = "default_github_api")]
    pub base_url: String,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            token: None,
            frequency_days: default_frequency_days(),
            execution_time: default_execution_time(),
            base_url: default_github_api(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HackerNewsSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Comma-separated 24h `HH:MM` list, e.g. `"09:00, 18:00"`.
    #[serde(default = "default_news_times")]
    pub execution_times: String,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_hn_api")]
    pub base_url: String,
}

impl Default for HackerNewsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            execution_times: default_news_times(),
            top_n: default_top_n(),
            keywords: Vec::new(),
            base_url: default_hn_api(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub from: String,
    /// "ENV" or empty: read from `SMTP_PASSWORD`.
    #[serde(default)]
    pub password: String,
    /// Comma-separated recipient list.
    pub to: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_llm_base_url(),
            api_key: default_api_key(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_subscriptions_file")]
    pub subscriptions_file: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub github: GithubSettings,
    #[serde(default)]
    pub hacker_news: HackerNewsSettings,
    #[serde(default)]
    pub email: Option<EmailSettings>,
    #[serde(default)]
    pub slack_webhook_url: Option<String>,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub http: HttpSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            subscriptions_file: default_subscriptions_file(),
            output_dir: default_output_dir(),
            github: GithubSettings::default(),
            hacker_news: HackerNewsSettings::default(),
            email: None,
            slack_webhook_url: None,
            llm: LlmSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

impl Settings {
    /// Load from an explicit path (JSON or TOML by extension), then apply
    /// environment overrides and sanitize.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg: Settings = match ext.as_str() {
            "toml" => toml::from_str(&data)
                .with_context(|| format!("parsing TOML config {}", path.display()))?,
            _ => serde_json::from_str(&data)
                .with_context(|| format!("parsing JSON config {}", path.display()))?,
        };
        Ok(cfg.finish())
    }

    /// Resolve the config file:
    /// 1) $SENTINEL_CONFIG
    /// 2) config.json
    /// 3) config.toml
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load(&pb);
            }
            bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
        }
        for candidate in ["config.json", "config.toml"] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load(&pb);
            }
        }
        tracing::warn!("no config file found; using built-in defaults");
        Ok(Settings::default().finish())
    }

    /// Environment overrides + sanitization shared by every load path.
    fn finish(mut self) -> Self {
        if let Ok(tok) = env::var("GITHUB_TOKEN") {
            if !tok.trim().is_empty() {
                self.github.token = Some(tok);
            }
        }

        if self.llm.api_key.trim().is_empty() || self.llm.api_key.trim().eq_ignore_ascii_case("env") {
            self.llm.api_key = env::var("OPENAI_API_KEY").unwrap_or_default();
        }

        if let Some(email) = self.email.as_mut() {
            if email.password.trim().is_empty() || email.password.trim().eq_ignore_ascii_case("env") {
                email.password = env::var("SMTP_PASSWORD").unwrap_or_default();
            }
        }

        if let Ok(url) = env::var("SLACK_WEBHOOK_URL") {
            if !url.trim().is_empty() {
                self.slack_webhook_url = Some(url);
            }
        }
        if self
            .slack_webhook_url
            .as_deref()
            .is_some_and(|u| u.trim().is_empty())
        {
            self.slack_webhook_url = None;
        }

        self.hacker_news.top_n = self.hacker_news.top_n.clamp(1, 500);
        self.http.max_concurrency = self.http.max_concurrency.max(1);
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            self.llm.temperature = default_temperature();
        }
        self
    }

    /// Startup validation of the scheduling inputs. A failure here is fatal.
    pub fn validate(&self) -> Result<()> {
        if self.github.frequency_days < 1 {
            return Err(anyhow!("github.frequency_days must be >= 1"));
        }
        crate::scheduler::parse_time_of_day(&self.github.execution_time)
            .context("github.execution_time")?;
        crate::scheduler::parse_times_of_day(&self.hacker_news.execution_times)
            .context("hacker_news.execution_times")?;
        Ok(())
    }
}
