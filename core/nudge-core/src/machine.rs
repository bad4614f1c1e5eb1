//! Session state machine.
//!
//! Owns the single session record and the event log. Every entry point takes
//! the current time explicitly, mutates the session to completion, and returns
//! a [`Transition`] describing what happened. The caller decides what to do
//! with it (fan out the snapshot, persist appended events, schedule the
//! restart revert).
//!
//! ```text
//!   idle ──declare──▶ active ──classify──▶ stall ──typing/accept──▶ restart
//!                       ▲                                              │
//!                       └──────────── revert ticket (2.5s) ────────────┘
//! ```
//!
//! Preconditions that fail (no task, already stalled, cooling down) are
//! silent no-ops: the transition carries the unchanged snapshot, no events,
//! and `notify = false`.

use chrono::{DateTime, Duration, Utc};
use nudge_daemon_protocol::Tone;
use tracing::{debug, info};

use crate::classifier::classify;
use crate::config::NudgeConfig;
use crate::events::{Event, EventDetail, EventLog};
use crate::metrics::MetricsSummary;
use crate::prompts::{PromptBank, RandomSource, ThreadRandom};
use crate::types::{InterventionOutcome, SessionSnapshot, SessionStatus, StallKind};
use crate::window::SlidingWindowCounter;

/// Scheduled return from `restart` to `active`.
///
/// Keyed to the session revision at scheduling time; redeeming a ticket after
/// any newer transition is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevertTicket {
    pub revision: u64,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub snapshot: SessionSnapshot,
    /// Events appended by this entry point, oldest first.
    pub appended: Vec<Event>,
    /// Status, task name, stall kind or restart latency changed.
    pub notify: bool,
    pub revert: Option<RevertTicket>,
}

#[derive(Debug, Clone, Default)]
struct Session {
    task_name: String,
    status: SessionStatus,
    stall_kind: Option<StallKind>,
    stall_started_at: Option<DateTime<Utc>>,
    last_typing_at: Option<DateTime<Utc>>,
    last_restart_latency_secs: Option<u32>,
    tone: Tone,
    cooldown_until: Option<DateTime<Utc>>,
    last_intervention_outcome: Option<InterventionOutcome>,
    recent_switches: SlidingWindowCounter,
    scroll_since_typing: f64,
    current_prompt: Option<String>,
    revision: u64,
}

/// The fields whose change triggers an observer notification.
#[derive(Debug, PartialEq, Eq)]
struct Observed {
    status: SessionStatus,
    task_name: String,
    stall_kind: Option<StallKind>,
    last_restart_latency_secs: Option<u32>,
}

pub struct SessionStateMachine {
    session: Session,
    log: EventLog,
    config: NudgeConfig,
    prompts: PromptBank,
    random: Box<dyn RandomSource>,
    pending_events: Vec<Event>,
    pending_revert: Option<RevertTicket>,
}

impl SessionStateMachine {
    pub fn new(config: NudgeConfig) -> Self {
        Self::with_random(config, Box::new(ThreadRandom))
    }

    pub fn with_random(config: NudgeConfig, random: Box<dyn RandomSource>) -> Self {
        let session = Session {
            tone: config.default_tone,
            ..Session::default()
        };
        Self {
            session,
            log: EventLog::new(),
            config,
            prompts: PromptBank::default(),
            random,
            pending_events: Vec::new(),
            pending_revert: None,
        }
    }

    pub fn config(&self) -> &NudgeConfig {
        &self.config
    }

    pub fn prompts(&self) -> &PromptBank {
        &self.prompts
    }

    pub fn tone(&self) -> Tone {
        self.session.tone
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    /// Seeds the event log from persistence. The session is not touched.
    pub fn restore_events(&mut self, events: Vec<Event>) {
        self.log.replace_all(events);
    }

    pub fn reset_event_log(&mut self) -> usize {
        let cleared = self.log.len();
        self.log.clear();
        info!(cleared, "Event log reset");
        cleared
    }

    pub fn metrics(&self) -> MetricsSummary {
        MetricsSummary::from_log(&self.log)
    }

    pub fn snapshot(&mut self, now: DateTime<Utc>) -> SessionSnapshot {
        let window_ms = self.config.thresholds.tab_switch_window_ms;
        let recent_switch_count = self.session.recent_switches.count_recent(now, window_ms);
        let session = &self.session;
        SessionSnapshot {
            task_name: session.task_name.clone(),
            status: session.status,
            stall_kind: session.stall_kind,
            stall_started_at: session.stall_started_at,
            last_typing_at: session.last_typing_at,
            last_restart_latency_secs: session.last_restart_latency_secs,
            tone: session.tone,
            cooldown_until: session.cooldown_until,
            last_intervention_outcome: session.last_intervention_outcome,
            recent_switch_count,
            scroll_since_typing: session.scroll_since_typing,
            current_prompt: session.current_prompt.clone(),
            revision: session.revision,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Entry points
    // ─────────────────────────────────────────────────────────────────────

    pub fn declare_task(&mut self, name: &str, now: DateTime<Utc>) -> Transition {
        let before = self.observed();
        let name = name.trim();
        if name.is_empty() {
            debug!("Ignoring declare_task with blank name");
            return self.finish(before, now);
        }

        let revision = self.session.revision.wrapping_add(1);
        self.session = Session {
            task_name: name.to_string(),
            status: SessionStatus::Active,
            last_typing_at: Some(now),
            tone: self.session.tone,
            revision,
            ..Session::default()
        };
        self.record(now, EventDetail::TaskStarted);
        info!(task_name = %name, "Task declared");

        self.finish(before, now)
    }

    pub fn report_activity(
        &mut self,
        typing: bool,
        scroll_delta: f64,
        now: DateTime<Utc>,
    ) -> Transition {
        let before = self.observed();
        if !self.has_task() {
            return self.finish(before, now);
        }

        if typing {
            self.session.last_typing_at = Some(now);
            self.session.scroll_since_typing = 0.0;
            if self.session.status == SessionStatus::Stall {
                self.handle_restart(now);
            } else if self.session.status != SessionStatus::Active {
                self.transition_to(SessionStatus::Active);
            }
            return self.finish(before, now);
        }

        self.session.scroll_since_typing += normalize_delta(scroll_delta);
        let idle_ms = self.idle_ms(now);
        let switch_count = self
            .session
            .recent_switches
            .count_recent(now, self.config.thresholds.tab_switch_window_ms);

        if let Some(kind) = classify(
            idle_ms,
            self.session.scroll_since_typing,
            switch_count,
            &self.config.thresholds,
        ) {
            self.trigger_stall(kind, now);
        }

        self.finish(before, now)
    }

    pub fn report_tab_switch(&mut self, now: DateTime<Utc>) -> Transition {
        let before = self.observed();
        if !self.has_task() {
            return self.finish(before, now);
        }

        self.session.recent_switches.record(now);
        let switch_count = self
            .session
            .recent_switches
            .count_recent(now, self.config.thresholds.tab_switch_window_ms);
        self.record(now, EventDetail::TabActivated { switch_count });
        debug!(switch_count, "Tab switch recorded");

        self.finish(before, now)
    }

    /// Explicit "I'm continuing" from the user. Always treated as typing.
    pub fn acknowledge_continue(&mut self, now: DateTime<Utc>) -> Transition {
        self.report_activity(true, 0.0, now)
    }

    /// Explicit acceptance of the current prompt.
    pub fn accept_prompt(&mut self, now: DateTime<Utc>) -> Transition {
        let before = self.observed();
        if !self.has_task() || self.session.status != SessionStatus::Stall {
            return self.finish(before, now);
        }

        if self.session.last_intervention_outcome == Some(InterventionOutcome::Pending) {
            self.session.last_intervention_outcome = Some(InterventionOutcome::Accepted);
            let stall_kind = self.session.stall_kind;
            self.record(
                now,
                EventDetail::InterventionResponse {
                    stall_kind,
                    accepted: true,
                },
            );
        }

        self.session.recent_switches.clear();
        self.session.last_typing_at = Some(now);
        self.handle_restart(now);

        self.finish(before, now)
    }

    pub fn set_tone(&mut self, tone: Tone, now: DateTime<Utc>) -> Transition {
        let before = self.observed();
        self.session.tone = tone;
        self.record(now, EventDetail::ToneChanged { tone });
        info!(tone = tone.as_str(), "Tone changed");
        self.finish(before, now)
    }

    /// Redeems a revert ticket handed out by restart handling.
    pub fn complete_restart(&mut self, ticket: RevertTicket, now: DateTime<Utc>) -> Transition {
        let before = self.observed();
        if self.session.status == SessionStatus::Restart && self.session.revision == ticket.revision
        {
            self.transition_to(SessionStatus::Active);
            debug!(revision = ticket.revision, "Restart reverted to active");
        } else {
            debug!(
                ticket_revision = ticket.revision,
                revision = self.session.revision,
                status = self.session.status.as_str(),
                "Stale restart revert ignored"
            );
        }
        self.finish(before, now)
    }

    /// Marks an unanswered intervention as timed out. Status is unchanged.
    pub fn check_intervention_timeout(&mut self, now: DateTime<Utc>) -> Transition {
        let before = self.observed();
        let timeout = millis(self.config.timing.intervention_timeout_ms);

        let expired = self.session.status == SessionStatus::Stall
            && self.session.last_intervention_outcome == Some(InterventionOutcome::Pending)
            && self
                .session
                .stall_started_at
                .is_some_and(|started| now.signed_duration_since(started) > timeout);

        if expired {
            self.session.last_intervention_outcome = Some(InterventionOutcome::TimedOut);
            let stall_kind = self.session.stall_kind;
            self.record(
                now,
                EventDetail::InterventionResponse {
                    stall_kind,
                    accepted: false,
                },
            );
            info!(stall_kind = ?stall_kind, "Intervention timed out");
        }

        self.finish(before, now)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internal transitions
    // ─────────────────────────────────────────────────────────────────────

    fn trigger_stall(&mut self, kind: StallKind, now: DateTime<Utc>) {
        if !self.has_task() || self.session.status == SessionStatus::Stall {
            return;
        }
        if self.in_cooldown(now) {
            debug!(stall_kind = kind.as_str(), "Stall suppressed by cooldown");
            return;
        }

        let tone = self.session.tone;
        let prompt = self.prompts.choose(tone, kind, self.random.as_mut());

        self.session.stall_kind = Some(kind);
        self.session.stall_started_at = Some(now);
        self.session.current_prompt = Some(prompt.clone());
        self.session.last_intervention_outcome = Some(InterventionOutcome::Pending);
        self.transition_to(SessionStatus::Stall);

        info!(stall_kind = kind.as_str(), prompt = %prompt, "Stall detected");
        self.record(
            now,
            EventDetail::StallDetected {
                stall_kind: kind,
                prompt,
                tone,
            },
        );
    }

    fn handle_restart(&mut self, now: DateTime<Utc>) {
        let (Some(started), Some(kind)) = (self.session.stall_started_at, self.session.stall_kind)
        else {
            return;
        };

        let elapsed_ms = now.signed_duration_since(started).num_milliseconds().max(0);
        let latency_secs = u32::try_from((elapsed_ms + 500) / 1000)
            .unwrap_or(u32::MAX)
            .max(1);
        let resumed_within_goal = latency_secs <= self.config.timing.resume_goal_secs;

        self.session.stall_started_at = None;
        self.session.stall_kind = None;
        self.session.current_prompt = None;
        self.session.last_restart_latency_secs = Some(latency_secs);
        self.session.scroll_since_typing = 0.0;
        self.session.recent_switches.clear();
        if let Some(until) = now.checked_add_signed(millis(self.config.timing.cooldown_ms)) {
            self.extend_cooldown(until);
        }
        self.transition_to(SessionStatus::Restart);

        info!(
            stall_kind = kind.as_str(),
            latency_secs, resumed_within_goal, "Task restarted"
        );
        self.record(
            now,
            EventDetail::TaskRestarted {
                stall_kind: kind,
                resumed_within_goal,
                restart_latency_secs: latency_secs,
            },
        );

        let due_at = now
            .checked_add_signed(millis(self.config.timing.restart_revert_ms))
            .unwrap_or(now);
        self.pending_revert = Some(RevertTicket {
            revision: self.session.revision,
            due_at,
        });
    }

    fn transition_to(&mut self, next: SessionStatus) {
        if self.session.status != next {
            self.session.status = next;
            self.session.revision = self.session.revision.wrapping_add(1);
        }
    }

    fn extend_cooldown(&mut self, until: DateTime<Utc>) {
        let next = match self.session.cooldown_until {
            Some(current) if current > until => current,
            _ => until,
        };
        self.session.cooldown_until = Some(next);
    }

    fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.session
            .cooldown_until
            .is_some_and(|until| now < until)
    }

    fn has_task(&self) -> bool {
        !self.session.task_name.is_empty()
    }

    fn idle_ms(&self, now: DateTime<Utc>) -> u64 {
        match self.session.last_typing_at {
            Some(last) => {
                u64::try_from(now.signed_duration_since(last).num_milliseconds()).unwrap_or(0)
            }
            None => u64::MAX,
        }
    }

    fn record(&mut self, now: DateTime<Utc>, detail: EventDetail) {
        let task_name = if self.session.task_name.is_empty() {
            None
        } else {
            Some(self.session.task_name.clone())
        };
        let event = Event {
            recorded_at: now,
            task_name,
            status: self.session.status,
            detail,
        };
        self.log.append(event.clone());
        self.pending_events.push(event);
    }

    fn observed(&self) -> Observed {
        Observed {
            status: self.session.status,
            task_name: self.session.task_name.clone(),
            stall_kind: self.session.stall_kind,
            last_restart_latency_secs: self.session.last_restart_latency_secs,
        }
    }

    fn finish(&mut self, before: Observed, now: DateTime<Utc>) -> Transition {
        let notify = self.observed() != before;
        Transition {
            snapshot: self.snapshot(now),
            appended: std::mem::take(&mut self.pending_events),
            notify,
            revert: self.pending_revert.take(),
        }
    }
}

fn normalize_delta(delta: f64) -> f64 {
    if delta.is_finite() {
        delta.abs()
    } else {
        0.0
    }
}

fn millis(value: u64) -> Duration {
    Duration::milliseconds(i64::try_from(value).unwrap_or(i64::MAX))
}
