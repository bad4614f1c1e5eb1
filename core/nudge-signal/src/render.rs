//! Plain-text rendering of daemon payloads for the terminal.

use chrono::{DateTime, Utc};
use nudge_core::{Event, EventDetail, MetricsSummary, SessionSnapshot, SessionStatus, Tone};
use std::fmt::Write as _;

const EMPTY: &str = "-";

pub fn snapshot(snapshot: &SessionSnapshot, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let task = if snapshot.has_task() {
        snapshot.task_name.as_str()
    } else {
        "(none declared)"
    };
    let _ = writeln!(out, "Task:      {}", task);

    let mut status = snapshot.status.as_str().to_string();
    if snapshot.status == SessionStatus::Stall {
        if let Some(kind) = snapshot.stall_kind {
            let _ = write!(status, " ({}", kind.as_str());
            if let Some(started) = snapshot.stall_started_at {
                let _ = write!(status, ", {}s", seconds_between(started, now));
            }
            status.push(')');
        }
    }
    let _ = writeln!(out, "Status:    {}", status);

    if let Some(prompt) = &snapshot.current_prompt {
        let _ = writeln!(out, "Prompt:    {}", prompt);
    }
    let _ = writeln!(out, "Tone:      {}", snapshot.tone.as_str());
    let _ = writeln!(
        out,
        "Restart:   {}",
        snapshot
            .last_restart_latency_secs
            .map(|secs| format!("{}s", secs))
            .unwrap_or_else(|| EMPTY.to_string())
    );
    match snapshot.cooldown_until {
        Some(until) if until > now => {
            let _ = writeln!(out, "Cooldown:  {}s remaining", seconds_between(now, until));
        }
        _ => {
            let _ = writeln!(out, "Cooldown:  {}", EMPTY);
        }
    }
    let _ = write!(out, "Switches:  {}", snapshot.recent_switch_count);
    out
}

pub fn metrics(summary: &MetricsSummary, tone: Option<Tone>) -> String {
    let mut out = String::new();

    let median = summary
        .median_restart_latency_secs
        .map(|secs| format!("{}s", secs))
        .unwrap_or_else(|| EMPTY.to_string());
    let _ = writeln!(out, "Median restart latency: {}", median);

    let acceptance = match summary.acceptance_rate {
        Some(rate) => format!(
            "{}% of {} interventions",
            (rate * 100.0).round() as u32,
            summary.interventions_total
        ),
        None => EMPTY.to_string(),
    };
    let _ = writeln!(out, "Acceptance rate:        {}", acceptance);
    if let Some(tone) = tone {
        let _ = writeln!(out, "Tone:                   {}", tone.as_str());
    }

    let _ = writeln!(out, "Stalls:");
    for share in &summary.stall_breakdown {
        let _ = writeln!(
            out,
            "  {:<13} {:>3}  {:>3}%",
            share.kind.as_str(),
            share.count,
            share.percent
        );
    }

    let _ = write!(out, "Recent:");
    if summary.timeline.is_empty() {
        let _ = write!(out, " {}", EMPTY);
    }
    for event in &summary.timeline {
        let _ = write!(out, "\n  {}", timeline_line(event));
    }
    out
}

pub fn timeline_line(event: &Event) -> String {
    let time = event.recorded_at.format("%H:%M:%S");
    let detail = match &event.detail {
        EventDetail::TaskStarted => event
            .task_name
            .as_deref()
            .map(|name| format!("\"{}\"", name))
            .unwrap_or_default(),
        EventDetail::StallDetected { stall_kind, .. } => stall_kind.as_str().to_string(),
        EventDetail::TaskRestarted {
            restart_latency_secs,
            resumed_within_goal,
            ..
        } => {
            let goal = if *resumed_within_goal {
                "within goal"
            } else {
                "over goal"
            };
            format!("{}s, {}", restart_latency_secs, goal)
        }
        EventDetail::InterventionResponse { accepted, .. } => {
            if *accepted { "accepted" } else { "timed out" }.to_string()
        }
        EventDetail::ToneChanged { tone } => tone.as_str().to_string(),
        EventDetail::TabActivated { switch_count } => format!("{} in window", switch_count),
    };

    if detail.is_empty() {
        format!("{}  {}", time, event.kind())
    } else {
        format!("{}  {:<21} {}", time, event.kind(), detail)
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    to.signed_duration_since(from).num_seconds().max(0)
}
