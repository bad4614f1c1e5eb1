//! Event log export as JSON or CSV.

use serde_json::{Map, Value};
use std::str::FromStr;

use crate::error::{NudgeError, Result};
use crate::events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn render(&self, events: &[Event]) -> Result<String> {
        match self {
            ExportFormat::Json => events_to_json(events),
            ExportFormat::Csv => events_to_csv(events),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = NudgeError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(NudgeError::Export(format!("unknown format '{other}'"))),
        }
    }
}

pub fn events_to_json(events: &[Event]) -> Result<String> {
    Ok(serde_json::to_string_pretty(events)?)
}

/// Renders events as CSV.
///
/// The header is the union of every event's keys in first-seen order. Fields
/// an event lacks are left empty. Every non-empty value is double-quoted with
/// embedded quotes doubled; nested values are written as compact JSON.
pub fn events_to_csv(events: &[Event]) -> Result<String> {
    let rows = events
        .iter()
        .map(|event| match serde_json::to_value(event)? {
            Value::Object(map) => Ok(map),
            other => Err(NudgeError::Export(format!(
                "event serialized to non-object: {other}"
            ))),
        })
        .collect::<Result<Vec<Map<String, Value>>>>()?;

    let mut header: Vec<&str> = Vec::new();
    for row in &rows {
        for key in row.keys() {
            if !header.contains(&key.as_str()) {
                header.push(key);
            }
        }
    }

    if header.is_empty() {
        return Ok(String::new());
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(header.join(","));
    for row in &rows {
        let cells: Vec<String> = header
            .iter()
            .map(|key| row.get(*key).map(csv_cell).unwrap_or_default())
            .collect();
        lines.push(cells.join(","));
    }

    Ok(lines.join("\n"))
}

fn csv_cell(value: &Value) -> String {
    let raw = match value {
        Value::Null => return String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    if raw.is_empty() {
        return raw;
    }
    format!("\"{}\"", raw.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventDetail;
    use crate::types::{SessionStatus, StallKind};
    use chrono::{TimeZone, Utc};
    use nudge_daemon_protocol::Tone;

    fn event(detail: EventDetail, task_name: Option<&str>) -> Event {
        Event {
            recorded_at: Utc.timestamp_opt(1_760_000_000, 0).unwrap(),
            task_name: task_name.map(str::to_string),
            status: SessionStatus::Active,
            detail,
        }
    }

    #[test]
    fn empty_export_is_empty() {
        assert_eq!(events_to_csv(&[]).unwrap(), "");
        assert_eq!(events_to_json(&[]).unwrap(), "[]");
    }

    #[test]
    fn header_is_union_in_first_seen_order() {
        let events = vec![
            event(EventDetail::TaskStarted, Some("Q4 report")),
            event(EventDetail::TabActivated { switch_count: 2 }, Some("Q4 report")),
            event(EventDetail::ToneChanged { tone: Tone::Firm }, None),
        ];
        let csv = events_to_csv(&events).unwrap();
        let header = csv.lines().next().unwrap();
        assert_eq!(
            header,
            "recorded_at,task_name,status,kind,switch_count,tone"
        );
    }

    #[test]
    fn missing_fields_are_empty_and_values_quoted() {
        let events = vec![
            event(EventDetail::TaskStarted, Some("Q4 report")),
            event(EventDetail::TabActivated { switch_count: 2 }, None),
        ];
        let csv = events_to_csv(&events).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "\"2025-10-09T08:53:20Z\",\"Q4 report\",\"active\",\"task_started\","
        );
        assert_eq!(
            lines[2],
            "\"2025-10-09T08:53:20Z\",,\"active\",\"tab_activated\",\"2\""
        );
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        let events = vec![event(
            EventDetail::StallDetected {
                stall_kind: StallKind::DwellFreeze,
                prompt: "Say \"done\", then type".to_string(),
                tone: Tone::Gentle,
            },
            Some("Q4 report"),
        )];
        let csv = events_to_csv(&events).unwrap();
        assert!(csv.contains("\"Say \"\"done\"\", then type\""));
    }

    #[test]
    fn nested_values_render_as_compact_json() {
        let value = serde_json::json!({"a": [1, 2]});
        assert_eq!(csv_cell(&value), "\"{\"\"a\"\":[1,2]}\"");
        assert_eq!(csv_cell(&Value::Null), "");
        assert_eq!(csv_cell(&Value::String(String::new())), "");
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!(" json ".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
