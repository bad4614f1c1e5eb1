//! Event records and the bounded event log.
//!
//! Events are immutable once appended. The log keeps the newest
//! [`EVENT_LOG_CAPACITY`] entries in insertion order and evicts from the head.

use chrono::{DateTime, Utc};
use nudge_daemon_protocol::Tone;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::types::{SessionStatus, StallKind};

pub const EVENT_LOG_CAPACITY: usize = 300;

/// Kind-specific payload of an [`Event`]. Serialized inline with a `kind` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDetail {
    TaskStarted,
    StallDetected {
        stall_kind: StallKind,
        prompt: String,
        tone: Tone,
    },
    TaskRestarted {
        stall_kind: StallKind,
        resumed_within_goal: bool,
        restart_latency_secs: u32,
    },
    InterventionResponse {
        stall_kind: Option<StallKind>,
        accepted: bool,
    },
    ToneChanged {
        tone: Tone,
    },
    TabActivated {
        switch_count: usize,
    },
}

impl EventDetail {
    pub fn kind(&self) -> &'static str {
        match self {
            EventDetail::TaskStarted => "task_started",
            EventDetail::StallDetected { .. } => "stall_detected",
            EventDetail::TaskRestarted { .. } => "task_restarted",
            EventDetail::InterventionResponse { .. } => "intervention_response",
            EventDetail::ToneChanged { .. } => "tone_changed",
            EventDetail::TabActivated { .. } => "tab_activated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub recorded_at: DateTime<Utc>,
    /// Task at the time of the event; `None` when no task was declared.
    pub task_name: Option<String>,
    /// Session status after the mutation that produced the event.
    pub status: SessionStatus,
    #[serde(flatten)]
    pub detail: EventDetail,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        self.detail.kind()
    }
}

#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: VecDeque::with_capacity(EVENT_LOG_CAPACITY),
        }
    }

    pub fn append(&mut self, event: Event) {
        self.events.push_back(event);
        while self.events.len() > EVENT_LOG_CAPACITY {
            self.events.pop_front();
        }
    }

    /// Seeds the log from persisted events (oldest first), keeping the newest.
    pub fn replace_all(&mut self, events: Vec<Event>) {
        self.events.clear();
        for event in events {
            self.append(event);
        }
    }

    /// Copy of every retained event, oldest first.
    pub fn all(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }

    /// Copy of the newest `n` events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Event> {
        let skip = self.events.len().saturating_sub(n);
        self.events.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn tab_event(index: usize) -> Event {
        Event {
            recorded_at: Utc.timestamp_opt(1_760_000_000, 0).unwrap()
                + Duration::seconds(index as i64),
            task_name: Some("Q4 report".to_string()),
            status: SessionStatus::Active,
            detail: EventDetail::TabActivated {
                switch_count: index,
            },
        }
    }

    fn switch_count(event: &Event) -> usize {
        match event.detail {
            EventDetail::TabActivated { switch_count } => switch_count,
            _ => panic!("unexpected event kind {}", event.kind()),
        }
    }

    #[test]
    fn append_keeps_insertion_order() {
        let mut log = EventLog::new();
        for index in 0..5 {
            log.append(tab_event(index));
        }
        let counts: Vec<usize> = log.all().iter().map(switch_count).collect();
        assert_eq!(counts, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn overflow_evicts_oldest_first() {
        let mut log = EventLog::new();
        for index in 0..=EVENT_LOG_CAPACITY {
            log.append(tab_event(index));
        }

        assert_eq!(log.len(), EVENT_LOG_CAPACITY);
        let all = log.all();
        assert_eq!(switch_count(&all[0]), 1);
        assert_eq!(switch_count(&all[EVENT_LOG_CAPACITY - 1]), EVENT_LOG_CAPACITY);
        assert!(all.windows(2).all(|pair| switch_count(&pair[0]) < switch_count(&pair[1])));
    }

    #[test]
    fn log_never_exceeds_capacity() {
        let mut log = EventLog::new();
        for index in 0..1_000 {
            log.append(tab_event(index));
            assert!(log.len() <= EVENT_LOG_CAPACITY);
        }
    }

    #[test]
    fn recent_returns_newest_in_order() {
        let mut log = EventLog::new();
        for index in 0..20 {
            log.append(tab_event(index));
        }
        let counts: Vec<usize> = log.recent(3).iter().map(switch_count).collect();
        assert_eq!(counts, vec![17, 18, 19]);
        assert_eq!(log.recent(100).len(), 20);
    }

    #[test]
    fn reads_are_copies() {
        let mut log = EventLog::new();
        log.append(tab_event(1));

        let mut copy = log.all();
        copy[0].task_name = Some("tampered".to_string());
        copy.clear();

        assert_eq!(log.len(), 1);
        assert_eq!(log.all()[0].task_name.as_deref(), Some("Q4 report"));
    }

    #[test]
    fn replace_all_keeps_newest() {
        let mut log = EventLog::new();
        log.append(tab_event(9_999));
        log.replace_all((0..350).map(tab_event).collect());

        assert_eq!(log.len(), EVENT_LOG_CAPACITY);
        assert_eq!(switch_count(&log.all()[0]), 50);
    }

    #[test]
    fn event_serializes_flat_with_kind_tag() {
        let event = Event {
            recorded_at: Utc.timestamp_opt(1_760_000_000, 0).unwrap(),
            task_name: Some("Q4 report".to_string()),
            status: SessionStatus::Stall,
            detail: EventDetail::StallDetected {
                stall_kind: StallKind::DwellFreeze,
                prompt: "Write ugly first draft.".to_string(),
                tone: Tone::Gentle,
            },
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "stall_detected");
        assert_eq!(value["stall_kind"], "dwell-freeze");
        assert_eq!(value["status"], "stall");
        assert_eq!(value["tone"], "gentle");

        let parsed: Event = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn task_started_carries_no_extra_fields() {
        let event = Event {
            recorded_at: Utc.timestamp_opt(1_760_000_000, 0).unwrap(),
            task_name: None,
            status: SessionStatus::Active,
            detail: EventDetail::TaskStarted,
        };
        let value = serde_json::to_value(&event).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["recorded_at", "task_name", "status", "kind"]);
    }
}
