// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod registry;
pub mod telemetry;

// Fetch -> synthesize -> notify pipeline
pub mod ingest;
pub mod llm;
pub mod notify;
pub mod report;

// Scheduling and wiring
pub mod bootstrap;
pub mod jobs;
pub mod scheduler;

// ---- Re-exports for stable public API ----
pub use crate::config::Settings;
pub use crate::ingest::types::{DateRange, FetchResult, RawData, SourceClient, SourceKind, Subscription};
pub use crate::notify::{Channel, DeliveryOutcome, DeliveryStatus, NotificationFanout};
pub use crate::registry::{FileRegistry, InMemoryRegistry, SubscriptionRegistry};
pub use crate::report::{Report, ReportSynthesizer, DRY_RUN_SENTINEL};
pub use crate::scheduler::{Job, Schedule, Scheduler};
