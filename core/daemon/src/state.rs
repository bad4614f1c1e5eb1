//! In-memory state managed by the daemon.
//!
//! The session state machine is the single writer. Every request locks it,
//! runs one entry point to completion, and persists the appended events while
//! still holding the lock so SQLite sees them in log order. Observers are
//! notified after the lock is released.

use chrono::Utc;
use nudge_core::{
    Broadcaster, Event, MetricsSummary, NudgeConfig, Observer, PromptBank, RevertTicket,
    SessionSnapshot, SessionStateMachine, Tone, Transition,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::db::Db;
use crate::scheduler;

pub struct SharedState {
    db: Db,
    machine: Mutex<SessionStateMachine>,
    broadcaster: Mutex<Broadcaster>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateView {
    pub session: SessionSnapshot,
    pub prompts: PromptBank,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsView {
    #[serde(flatten)]
    pub metrics: MetricsSummary,
    pub tone: Tone,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthView {
    pub event_log_len: usize,
    pub stored_events: Option<usize>,
    pub observers: usize,
    pub intervention_poll_ms: u64,
}

impl SharedState {
    pub fn new(db: Db, config: NudgeConfig) -> Self {
        Self::with_machine(db, SessionStateMachine::new(config))
    }

    pub fn with_machine(db: Db, mut machine: SessionStateMachine) -> Self {
        match db.list_events() {
            Ok(events) => {
                tracing::info!(events = events.len(), "Restored event log from database");
                machine.restore_events(events);
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to restore event log; starting empty");
            }
        }

        Self {
            db,
            machine: Mutex::new(machine),
            broadcaster: Mutex::new(Broadcaster::new()),
        }
    }

    pub fn register_observer(&self, observer: Box<dyn Observer>) {
        self.lock_broadcaster().register(observer);
    }

    /// Hands the current snapshot to `ack`, then registers `observer`.
    ///
    /// The broadcaster stays locked throughout, so no broadcast can land
    /// between the acknowledgement and the registration.
    pub fn attach_observer<F>(&self, observer: Box<dyn Observer>, ack: F) -> Result<(), String>
    where
        F: FnOnce(&SessionSnapshot) -> Result<(), String>,
    {
        let mut broadcaster = self.lock_broadcaster();
        let snapshot = self.snapshot();
        ack(&snapshot)?;
        broadcaster.register(observer);
        Ok(())
    }

    pub fn declare_task(self: &Arc<Self>, task_name: &str) -> SessionSnapshot {
        self.apply(|machine, now| machine.declare_task(task_name, now))
    }

    pub fn report_activity(self: &Arc<Self>, typing: bool, scroll_delta: f64) -> SessionSnapshot {
        self.apply(|machine, now| machine.report_activity(typing, scroll_delta, now))
    }

    pub fn report_tab_switch(self: &Arc<Self>) -> SessionSnapshot {
        self.apply(|machine, now| machine.report_tab_switch(now))
    }

    pub fn acknowledge_continue(self: &Arc<Self>) -> SessionSnapshot {
        self.apply(|machine, now| machine.acknowledge_continue(now))
    }

    pub fn accept_prompt(self: &Arc<Self>) -> SessionSnapshot {
        self.apply(|machine, now| machine.accept_prompt(now))
    }

    pub fn set_tone(self: &Arc<Self>, tone: Tone) -> SessionSnapshot {
        self.apply(|machine, now| machine.set_tone(tone, now))
    }

    pub fn complete_restart(self: &Arc<Self>, ticket: RevertTicket) -> SessionSnapshot {
        self.apply(|machine, now| machine.complete_restart(ticket, now))
    }

    pub fn check_intervention_timeout(self: &Arc<Self>) -> SessionSnapshot {
        self.apply(|machine, now| machine.check_intervention_timeout(now))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock_machine().snapshot(Utc::now())
    }

    pub fn state_view(&self) -> StateView {
        let mut machine = self.lock_machine();
        StateView {
            session: machine.snapshot(Utc::now()),
            prompts: machine.prompts().clone(),
        }
    }

    pub fn metrics_view(&self) -> MetricsView {
        let machine = self.lock_machine();
        MetricsView {
            metrics: machine.metrics(),
            tone: machine.tone(),
        }
    }

    pub fn export_events(&self) -> Vec<Event> {
        self.lock_machine().event_log().all()
    }

    /// Clears the in-memory log and the stored events. Returns how many
    /// in-memory events were dropped.
    pub fn reset_event_log(&self) -> usize {
        let mut machine = self.lock_machine();
        let cleared = machine.reset_event_log();
        if let Err(err) = self.db.clear_events() {
            tracing::warn!(error = %err, "Failed to clear stored events");
        }
        cleared
    }

    pub fn health_view(&self) -> HealthView {
        let (event_log_len, intervention_poll_ms) = {
            let machine = self.lock_machine();
            (
                machine.event_log().len(),
                machine.config().timing.intervention_poll_ms,
            )
        };
        let stored_events = match self.db.count_events() {
            Ok(count) => Some(count),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to count stored events");
                None
            }
        };
        HealthView {
            event_log_len,
            stored_events,
            observers: self.lock_broadcaster().len(),
            intervention_poll_ms,
        }
    }

    fn apply<F>(self: &Arc<Self>, op: F) -> SessionSnapshot
    where
        F: FnOnce(&mut SessionStateMachine, chrono::DateTime<Utc>) -> Transition,
    {
        let transition = {
            let mut machine = self.lock_machine();
            let transition = op(&mut machine, Utc::now());
            if let Err(err) = self.db.insert_events(&transition.appended) {
                tracing::warn!(
                    error = %err,
                    events = transition.appended.len(),
                    "Failed to persist events"
                );
            }
            transition
        };

        if let Some(ticket) = transition.revert {
            scheduler::spawn_restart_revert(Arc::clone(self), ticket);
        }

        if transition.notify {
            let delivered = self.lock_broadcaster().fan_out(&transition.snapshot);
            tracing::debug!(
                status = transition.snapshot.status.as_str(),
                revision = transition.snapshot.revision,
                delivered,
                "Snapshot broadcast"
            );
        }

        transition.snapshot
    }

    fn lock_machine(&self) -> MutexGuard<'_, SessionStateMachine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_broadcaster(&self) -> MutexGuard<'_, Broadcaster> {
        self.broadcaster
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
