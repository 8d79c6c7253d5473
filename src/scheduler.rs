// src/scheduler.rs
//! Time-of-day triggers and the single control loop that drives jobs.
use anyhow::{anyhow, bail, Result};
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use metrics::{counter, gauge};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

/// Poll period of the control loop.
pub const TICK: Duration = Duration::from_secs(1);

/// Strict 24h `HH:MM`.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    let well_formed = s.len() == 5 && s.as_bytes()[2] == b':';
    if !well_formed {
        bail!("invalid time of day {s:?}, expected HH:MM");
    }
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| anyhow!("invalid time of day {s:?}: {e}"))
}

/// Comma-separated `HH:MM` list; sorted, duplicates dropped, never empty.
pub fn parse_times_of_day(list: &str) -> Result<Vec<NaiveTime>> {
    let mut times = list
        .split(',')
        .filter(|p| !p.trim().is_empty())
        .map(parse_time_of_day)
        .collect::<Result<Vec<_>>>()?;
    times.sort();
    times.dedup();
    if times.is_empty() {
        bail!("no times of day given");
    }
    Ok(times)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Every `days` days at `at`.
    EveryDays { days: u32, at: NaiveTime },
    /// Every day at each of `times`.
    Daily { times: Vec<NaiveTime> },
}

impl Schedule {
    pub fn every_days(days: u32, at: &str) -> Result<Self> {
        if days < 1 {
            bail!("interval must be at least one day, got {days}");
        }
        Ok(Self::EveryDays {
            days,
            at: parse_time_of_day(at)?,
        })
    }

    pub fn daily_at(times: &str) -> Result<Self> {
        Ok(Self::Daily {
            times: parse_times_of_day(times)?,
        })
    }

    /// First due instant strictly after the job was (re)armed at `now`.
    ///
    /// A one-day interval still fires today when `at` is later than `now`;
    /// longer intervals always count whole days from today's date.
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        match self {
            Self::EveryDays { days, at } => {
                let mut next = (now.date() + ChronoDuration::days(i64::from(*days))).and_time(*at);
                if *days == 1 && *at > now.time() {
                    next -= ChronoDuration::days(1);
                }
                next
            }
            Self::Daily { times } => times
                .iter()
                .map(|t| {
                    if *t > now.time() {
                        now.date().and_time(*t)
                    } else {
                        (now.date() + ChronoDuration::days(1)).and_time(*t)
                    }
                })
                .min()
                .unwrap_or(now + ChronoDuration::days(1)),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EveryDays { days: 1, at } => write!(f, "daily at {}", at.format("%H:%M")),
            Self::EveryDays { days, at } => {
                write!(f, "every {days} days at {}", at.format("%H:%M"))
            }
            Self::Daily { times } => {
                let list: Vec<String> = times.iter().map(|t| t.format("%H:%M").to_string()).collect();
                write!(f, "daily at {}", list.join(", "))
            }
        }
    }
}

/// A zero-argument unit of work driven by the scheduler.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self) -> Result<()>;
}

struct Entry {
    schedule: Schedule,
    job: Arc<dyn Job>,
    next_due: NaiveDateTime,
}

#[derive(Default)]
pub struct Scheduler {
    entries: Vec<Entry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schedule: Schedule, job: Arc<dyn Job>) {
        self.register_at(schedule, job, Local::now().naive_local());
    }

    /// Register with an explicit arming instant.
    pub fn register_at(&mut self, schedule: Schedule, job: Arc<dyn Job>, now: NaiveDateTime) {
        let next_due = schedule.next_after(now);
        tracing::info!(job = job.name(), schedule = %schedule, next_due = %next_due, "job registered");
        self.entries.push(Entry {
            schedule,
            job,
            next_due,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (job name, next due instant) in registration order.
    pub fn next_due(&self) -> Vec<(String, NaiveDateTime)> {
        self.entries
            .iter()
            .map(|e| (e.job.name().to_string(), e.next_due))
            .collect()
    }

    /// Run every job once, in registration order, regardless of schedule.
    pub async fn run_startup(&self) {
        self.startup_until(&mut std::future::pending::<()>()).await;
    }

    async fn startup_until<S, R>(&self, shutdown: &mut S) -> Option<R>
    where
        S: Future<Output = R> + Unpin,
    {
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                if let Some(reason) = ready_now(shutdown).await {
                    tracing::info!(skipped = self.entries.len() - i, "shutdown requested during startup run");
                    return Some(reason);
                }
            }
            run_job(e.job.clone()).await;
        }
        None
    }

    /// Run every job due at `now` sequentially and re-arm it. Returns the
    /// number of jobs that ran.
    pub async fn tick_at(&mut self, now: NaiveDateTime) -> usize {
        self.tick_until(now, &mut std::future::pending::<()>()).await.0
    }

    /// As [`tick_at`](Self::tick_at), but stops before the next due job
    /// once `shutdown` has resolved. Skipped jobs keep their due instant.
    async fn tick_until<S, R>(&mut self, now: NaiveDateTime, shutdown: &mut S) -> (usize, Option<R>)
    where
        S: Future<Output = R> + Unpin,
    {
        let mut ran = 0;
        for e in &mut self.entries {
            if e.next_due > now {
                continue;
            }
            if ran > 0 {
                if let Some(reason) = ready_now(shutdown).await {
                    tracing::info!(next = e.job.name(), "shutdown requested; remaining due jobs skipped");
                    return (ran, Some(reason));
                }
            }
            run_job(e.job.clone()).await;
            ran += 1;
            e.next_due = e.schedule.next_after(now);
            tracing::debug!(job = e.job.name(), next_due = %e.next_due, "job re-armed");
        }
        (ran, None)
    }

    /// Startup run, then poll every [`TICK`] until `shutdown` resolves.
    /// The shutdown future is only observed between jobs, so an in-flight
    /// job always completes. Returns the shutdown future's output.
    pub async fn run_until<F, R>(&mut self, shutdown: F) -> R
    where
        F: Future<Output = R>,
    {
        tokio::pin!(shutdown);
        if let Some(reason) = self.startup_until(&mut shutdown).await {
            return reason;
        }

        let mut ticker = time::interval(TICK);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                reason = &mut shutdown => return reason,
                _ = ticker.tick() => {
                    let now = Local::now().naive_local();
                    if let (_, Some(reason)) = self.tick_until(now, &mut shutdown).await {
                        return reason;
                    }
                }
            }
        }
    }

    pub async fn run_forever(&mut self) {
        self.run_until(std::future::pending::<()>()).await
    }
}

/// `Some` only if `f` is already complete; never waits.
async fn ready_now<S: Future + Unpin>(f: &mut S) -> Option<S::Output> {
    tokio::select! {
        biased;
        out = f => Some(out),
        _ = std::future::ready(()) => None,
    }
}

/// Runs on its own task so a panic is contained to this invocation.
async fn run_job(job: Arc<dyn Job>) -> bool {
    crate::telemetry::ensure_metrics_described();
    let name = job.name().to_string();
    counter!("sentinel_job_runs_total", "job" => name.clone()).increment(1);
    tracing::info!(job = %name, "job started");

    let started = std::time::Instant::now();
    let handle = tokio::spawn(async move { job.run().await });
    let ok = match handle.await {
        Ok(Ok(())) => {
            tracing::info!(job = %name, elapsed_ms = started.elapsed().as_millis() as u64, "job finished");
            gauge!("sentinel_last_cycle_ts", "job" => name.clone())
                .set(chrono::Utc::now().timestamp() as f64);
            true
        }
        Ok(Err(e)) => {
            tracing::error!(job = %name, error = %format!("{e:#}"), "job failed");
            false
        }
        Err(e) => {
            tracing::error!(job = %name, error = %e, "job panicked");
            false
        }
    };
    if !ok {
        counter!("sentinel_job_errors_total", "job" => name).increment(1);
    }
    ok
}
