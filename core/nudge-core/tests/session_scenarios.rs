//! End-to-end session scenarios driven through the public API.

use chrono::{DateTime, TimeZone, Utc};
use nudge_core::{
    events_to_csv, EventDetail, FixedRandom, NudgeConfig, SessionStateMachine, SessionStatus,
    StallKind, Tone, EVENT_LOG_CAPACITY,
};

fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_760_000_000_000 + ms).unwrap()
}

fn machine() -> SessionStateMachine {
    SessionStateMachine::with_random(NudgeConfig::default(), Box::new(FixedRandom(0)))
}

#[test]
fn report_writing_session() {
    let mut machine = machine();

    machine.declare_task("Q4 report", at(0));
    let stall = machine.report_activity(false, 0.0, at(16_000));
    assert_eq!(stall.snapshot.status, SessionStatus::Stall);
    assert_eq!(stall.snapshot.stall_kind, Some(StallKind::DwellFreeze));

    let restart = machine.acknowledge_continue(at(32_000));
    assert_eq!(restart.snapshot.status, SessionStatus::Restart);
    assert_eq!(restart.snapshot.last_restart_latency_secs, Some(16));
    assert_eq!(restart.snapshot.cooldown_until, Some(at(44_000)));

    let ticket = restart.revert.expect("restart schedules a revert");
    let settled = machine.complete_restart(ticket, ticket.due_at);
    assert_eq!(settled.snapshot.status, SessionStatus::Active);

    // Four rapid switches during the cooldown do not stall.
    for step in 0..4 {
        machine.report_tab_switch(at(35_000 + step * 500));
    }
    let quiet = machine.report_activity(false, 0.0, at(37_000));
    assert_eq!(quiet.snapshot.status, SessionStatus::Active);

    let kinds: Vec<&str> = machine.event_log().iter().map(|event| event.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            "task_started",
            "stall_detected",
            "task_restarted",
            "tab_activated",
            "tab_activated",
            "tab_activated",
            "tab_activated",
        ]
    );

    let metrics = machine.metrics();
    assert_eq!(metrics.median_restart_latency_secs, Some(16));
    assert_eq!(metrics.stall_counts[&StallKind::DwellFreeze], 1);
    assert_eq!(metrics.acceptance_rate, None);
    assert_eq!(metrics.timeline[0].kind(), "tab_activated");
}

#[test]
fn tab_loop_then_accept_then_timeout_elsewhere() {
    let mut machine = machine();
    machine.set_tone(Tone::Firm, at(0));
    machine.declare_task("Slides", at(0));

    for step in 0..4 {
        machine.report_tab_switch(at(1_000 + step * 200));
    }
    let stall = machine.report_activity(false, 0.0, at(2_000));
    assert_eq!(stall.snapshot.stall_kind, Some(StallKind::TabLoop));
    assert_eq!(stall.snapshot.tone, Tone::Firm);

    let accepted = machine.accept_prompt(at(5_000));
    assert_eq!(accepted.snapshot.status, SessionStatus::Restart);
    assert_eq!(accepted.snapshot.recent_switch_count, 0);

    // Typing ends the restart; the next stall is left unanswered.
    machine.report_activity(true, 0.0, at(6_000));
    let second = machine.report_activity(false, 2_500.0, at(17_500));
    assert_eq!(second.snapshot.stall_kind, Some(StallKind::ScrollLoop));
    let timed_out = machine.check_intervention_timeout(at(48_000));
    assert_eq!(timed_out.appended.len(), 1);

    let metrics = machine.metrics();
    assert_eq!(metrics.interventions_total, 2);
    assert_eq!(metrics.acceptance_rate, Some(0.5));
    assert_eq!(metrics.stall_counts[&StallKind::TabLoop], 1);
    assert_eq!(metrics.stall_counts[&StallKind::ScrollLoop], 1);
    assert_eq!(metrics.stall_counts[&StallKind::DwellFreeze], 0);
}

#[test]
fn every_transition_reports_its_own_events() {
    let mut machine = machine();
    let mut appended = 0;

    appended += machine.declare_task("Q4 report", at(0)).appended.len();
    appended += machine.report_tab_switch(at(10)).appended.len();
    appended += machine.report_activity(false, 0.0, at(16_000)).appended.len();
    appended += machine.accept_prompt(at(17_000)).appended.len();
    appended += machine.set_tone(Tone::Gentle, at(18_000)).appended.len();

    assert_eq!(appended, machine.event_log().len());
}

#[test]
fn long_sessions_keep_only_recent_events() {
    let mut machine = machine();
    machine.declare_task("Q4 report", at(0));
    for step in 0..400 {
        machine.report_tab_switch(at(step * 60_000));
    }

    let log = machine.event_log();
    assert_eq!(log.len(), EVENT_LOG_CAPACITY);
    assert!(log.iter().all(|event| event.kind() == "tab_activated"));
    match &log.all()[EVENT_LOG_CAPACITY - 1].detail {
        EventDetail::TabActivated { switch_count } => assert_eq!(*switch_count, 1),
        other => panic!("unexpected detail {other:?}"),
    }
}

#[test]
fn restored_events_feed_metrics_and_export() {
    let mut source = machine();
    source.declare_task("Q4 report", at(0));
    source.report_activity(false, 0.0, at(16_000));
    source.acknowledge_continue(at(21_000));
    let persisted = source.event_log().all();

    let mut restored = machine();
    restored.restore_events(persisted);
    assert_eq!(restored.snapshot(at(30_000)).status, SessionStatus::Idle);
    assert_eq!(restored.metrics().median_restart_latency_secs, Some(5));

    let csv = events_to_csv(&restored.event_log().all()).unwrap();
    let header = csv.lines().next().unwrap();
    assert!(header.starts_with("recorded_at,task_name,status,kind"));
    assert!(header.contains("restart_latency_secs"));
    assert_eq!(csv.lines().count(), 4);
}
