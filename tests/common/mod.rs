// tests/common/mod.rs
// Shared test doubles for integration tests.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use repo_sentinel::llm::{ChatMessage, Summarizer};
use repo_sentinel::notify::Channel;
use repo_sentinel::report::Report;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

/// Answers each call with the next scripted reply and records the request.
#[derive(Default)]
pub struct RecordingSummarizer {
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
    replies: Mutex<Vec<String>>,
}

impl RecordingSummarizer {
    pub fn with_replies<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut r: Vec<String> = replies.into_iter().map(Into::into).collect();
        r.reverse();
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(r),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Summarizer for RecordingSummarizer {
    fn complete<'a>(
        &'a self,
        messages: &'a [ChatMessage],
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.lock().push(messages.to_vec());
            self.replies
                .lock()
                .pop()
                .ok_or_else(|| anyhow!("no scripted reply left"))
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Channel that records delivered reports and optionally fails.
pub struct RecordingChannel {
    pub name: &'static str,
    pub fail: bool,
    pub seen: Arc<Mutex<Vec<Report>>>,
}

impl RecordingChannel {
    pub fn new(name: &'static str, fail: bool) -> (Self, Arc<Mutex<Vec<Report>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                name,
                fail,
                seen: seen.clone(),
            },
            seen,
        )
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(&self, report: &Report) -> Result<()> {
        self.seen.lock().push(report.clone());
        if self.fail {
            return Err(anyhow!("{} transport down", self.name));
        }
        Ok(())
    }
}

/// Formatted log output of the current thread while the guard is held.
/// Pair with the default current-thread test runtime so spawned tasks log
/// here as well.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let logs = Self::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    /// Lines at `level` (e.g. "WARN") whose text contains `message`.
    pub fn count(&self, level: &str, message: &str) -> usize {
        let text = String::from_utf8_lossy(&self.0.lock()).into_owned();
        text.lines()
            .filter(|l| l.contains(level) && l.contains(message))
            .count()
    }
}
