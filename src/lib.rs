//! # vitalwatch
//!
//! A monitoring engine for remote vital-sign sensors. Each patient is one
//! network-addressable pulse oximeter; the engine polls every committed
//! patient independently at a fixed interval, parses the returned markup
//! payload, runs a per-patient connectivity state machine, raises SpO2
//! threshold alerts, and periodically persists a time-ordered log of
//! readings for later review.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  ┌───────────┐  tickets   ┌────────┐  HTTP GET   sensors     │
//! │  │ registry  │───────────▶│ poller │────────────▶ ───────    │
//! │  │ (patients)│◀───────────│        │◀──────────── ───────    │
//! │  └─────┬─────┘  outcomes  └───┬────┘  payload → parse        │
//! │        │ snapshot             │ qualifying reading           │
//! │        ▼                      ▼                              │
//! │  ┌───────────┐          ┌───────────┐                        │
//! │  │   store   │          │   alert   │──▶ AlertSink           │
//! │  │ (flush)   │          │(dispatch) │                        │
//! │  └───────────┘          └───────────┘                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`registry`]**: the single owner of patient identity — add, commit,
//!   reset, remove, and the application of poll completions
//! - **[`patient`]**: the per-sensor state machine, including poll-staleness
//!   tracking and address scheme normalization
//! - **[`poller`]**: the fixed-period scheduler and the HTTP fetch path with
//!   transport/application/parse error classification
//! - **[`parse`]**: extraction of `spo2`/`heartrate` integers from the raw
//!   sensor payload
//! - **[`alert`]**: SpO2 threshold evaluation and offloaded delivery through
//!   the [`AlertSink`] trait
//! - **[`store`]**: the append-only, timestamp-keyed vitals log and its
//!   background flush worker
//! - **[`settings`]**: the saved patient roster round trip
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use vitalwatch::{MonitorRegistry, PollScheduler};
//!
//! # tokio_test::block_on(async {
//! let registry = Arc::new(MonitorRegistry::new());
//! registry.add_committed("P1", "192.0.2.5");
//!
//! let (_scheduler, _outcomes) = PollScheduler::new(
//!     registry.clone(),
//!     Duration::from_secs(2),
//!     Duration::from_millis(1500),
//! ).unwrap();
//! # });
//! ```

pub mod alert;
pub mod config;
pub mod error;
pub mod events;
pub mod parse;
pub mod patient;
pub mod poller;
pub mod registry;
pub mod settings;
pub mod store;

// Re-export main types for convenience
pub use alert::{Alert, AlertDispatcher, AlertSink, ChannelSink, LogSink};
pub use config::MonitorConfig;
pub use error::{ParseError, PollError, StoreError};
pub use events::MonitorEvent;
pub use parse::VitalsReading;
pub use patient::{Patient, PatientId, PatientStatus, PollApplied, PollTicket};
pub use poller::{PollOutcome, PollScheduler};
pub use registry::{MonitorRegistry, PatientSnapshot};
pub use store::{LogEntry, NamedHistory, VitalsLog};
