//! # nudge-core
//!
//! Session state machine and metrics engine behind the nudge daemon.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. Callers pass `now` into every entry point.
//! - **Not thread-safe**: The daemon wraps the machine in a `Mutex`.
//! - **Never fails on input**: Precondition misses are no-ops and malformed
//!   signals are normalized. Only config loading and export return errors.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use nudge_core::{NudgeConfig, SessionStateMachine};
//!
//! let mut machine = SessionStateMachine::new(NudgeConfig::default());
//! let transition = machine.declare_task("Q4 report", chrono::Utc::now());
//! ```

pub mod broadcast;
pub mod classifier;
pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod machine;
pub mod metrics;
pub mod prompts;
pub mod types;
pub mod window;

pub use broadcast::{Broadcaster, DeliveryError, Observer};
pub use classifier::classify;
pub use config::{load_config, nudge_dir, NudgeConfig, StallThresholds, TimingConfig};
pub use error::{NudgeError, Result};
pub use events::{Event, EventDetail, EventLog, EVENT_LOG_CAPACITY};
pub use export::{events_to_csv, events_to_json, ExportFormat};
pub use machine::{RevertTicket, SessionStateMachine, Transition};
pub use metrics::{MetricsSummary, StallShare};
pub use prompts::{FixedRandom, PromptBank, RandomSource, SequenceRandom, ThreadRandom};
pub use types::{InterventionOutcome, SessionSnapshot, SessionStatus, StallKind};
pub use window::SlidingWindowCounter;

pub use nudge_daemon_protocol::Tone;
