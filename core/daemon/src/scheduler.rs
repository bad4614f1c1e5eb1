//! Background timers: the restart revert and the intervention timeout poller.
//!
//! Both re-enter the state machine through [`SharedState`] and rely on its
//! guards, so a timer that fires late or after a newer transition is harmless.

use chrono::Utc;
use nudge_core::RevertTicket;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::state::SharedState;

pub fn spawn_restart_revert(state: Arc<SharedState>, ticket: RevertTicket) {
    thread::spawn(move || {
        let wait = ticket
            .due_at
            .signed_duration_since(Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        thread::sleep(wait);
        let snapshot = state.complete_restart(ticket);
        tracing::debug!(
            ticket_revision = ticket.revision,
            status = snapshot.status.as_str(),
            "Restart revert fired"
        );
    });
}

pub fn spawn_intervention_poller(state: Arc<SharedState>, interval: Duration) {
    thread::spawn(move || loop {
        thread::sleep(interval);
        state.check_intervention_timeout();
    });
}
