//! Summary metrics derived from the event log.
//!
//! Nothing here is cached. Every call walks the full log, so the summary is
//! always consistent with whatever the log holds at that moment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::events::{Event, EventDetail, EventLog};
use crate::types::StallKind;

pub const TIMELINE_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StallShare {
    pub kind: StallKind,
    pub count: usize,
    /// Share of all stalls, rounded to the nearest whole percent.
    pub percent: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub median_restart_latency_secs: Option<u32>,
    /// Accepted responses over all responses, in `0.0..=1.0`.
    pub acceptance_rate: Option<f64>,
    pub interventions_total: usize,
    /// Every stall kind, including those never detected.
    pub stall_counts: BTreeMap<StallKind, usize>,
    pub stall_breakdown: Vec<StallShare>,
    /// The most recent events, newest first.
    pub timeline: Vec<Event>,
}

impl MetricsSummary {
    pub fn from_log(log: &EventLog) -> Self {
        let mut latencies = Vec::new();
        let mut accepted = 0usize;
        let mut responses = 0usize;
        let mut stall_counts: BTreeMap<StallKind, usize> =
            StallKind::ALL.iter().map(|kind| (*kind, 0)).collect();

        for event in log.iter() {
            match &event.detail {
                EventDetail::TaskRestarted {
                    restart_latency_secs,
                    ..
                } => latencies.push(*restart_latency_secs),
                EventDetail::InterventionResponse { accepted: yes, .. } => {
                    responses += 1;
                    if *yes {
                        accepted += 1;
                    }
                }
                EventDetail::StallDetected { stall_kind, .. } => {
                    *stall_counts.entry(*stall_kind).or_default() += 1;
                }
                _ => {}
            }
        }

        let acceptance_rate = if responses == 0 {
            None
        } else {
            Some(accepted as f64 / responses as f64)
        };

        Self {
            median_restart_latency_secs: lower_median(&mut latencies),
            acceptance_rate,
            interventions_total: responses,
            stall_breakdown: breakdown(&stall_counts),
            stall_counts,
            timeline: log.iter().rev().take(TIMELINE_LEN).cloned().collect(),
        }
    }
}

/// Median that picks the lower of the two middle values for even lengths.
fn lower_median(values: &mut [u32]) -> Option<u32> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    Some(values[(values.len() - 1) / 2])
}

fn breakdown(counts: &BTreeMap<StallKind, usize>) -> Vec<StallShare> {
    let total: usize = counts.values().sum();
    counts
        .iter()
        .map(|(kind, count)| {
            let percent = if total == 0 {
                0
            } else {
                u32::try_from((count * 100 + total / 2) / total).unwrap_or(100)
            };
            StallShare {
                kind: *kind,
                count: *count,
                percent,
            }
        })
        .collect()
}
