//! Shared domain types.

use chrono::{DateTime, Utc};
use nudge_daemon_protocol::Tone;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Active,
    Stall,
    Restart,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Active => "active",
            SessionStatus::Stall => "stall",
            SessionStatus::Restart => "restart",
        }
    }
}

/// The pattern under which task engagement broke down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StallKind {
    TabLoop,
    DwellFreeze,
    ScrollLoop,
}

impl StallKind {
    pub const ALL: [StallKind; 3] = [
        StallKind::TabLoop,
        StallKind::DwellFreeze,
        StallKind::ScrollLoop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StallKind::TabLoop => "tab-loop",
            StallKind::DwellFreeze => "dwell-freeze",
            StallKind::ScrollLoop => "scroll-loop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterventionOutcome {
    Pending,
    Accepted,
    TimedOut,
}

/// Read-only view of the session handed to observers and clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub task_name: String,
    pub status: SessionStatus,
    pub stall_kind: Option<StallKind>,
    pub stall_started_at: Option<DateTime<Utc>>,
    pub last_typing_at: Option<DateTime<Utc>>,
    pub last_restart_latency_secs: Option<u32>,
    pub tone: Tone,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_intervention_outcome: Option<InterventionOutcome>,
    pub recent_switch_count: usize,
    pub scroll_since_typing: f64,
    pub current_prompt: Option<String>,
    pub revision: u64,
}

impl SessionSnapshot {
    pub fn has_task(&self) -> bool {
        !self.task_name.is_empty()
    }
}
