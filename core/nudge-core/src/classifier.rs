//! Stall classification.
//!
//! A single pure decision function. Rules are checked in priority order and
//! the first match wins:
//!
//! 1. tab switching at or above the threshold → `tab-loop`
//! 2. idle longer than the idle threshold → `dwell-freeze`
//! 3. scrolled further than the distance threshold *and* idle longer than the
//!    secondary idle threshold → `scroll-loop`
//!
//! Tab switching preempts everything else. Scrolling alone never stalls.

use crate::config::StallThresholds;
use crate::types::StallKind;

pub fn classify(
    idle_ms: u64,
    scroll_accum: f64,
    recent_switch_count: usize,
    thresholds: &StallThresholds,
) -> Option<StallKind> {
    let switch_threshold = usize::try_from(thresholds.tab_switch_threshold).unwrap_or(usize::MAX);
    if recent_switch_count >= switch_threshold {
        return Some(StallKind::TabLoop);
    }

    if idle_ms > thresholds.idle_ms {
        return Some(StallKind::DwellFreeze);
    }

    if scroll_accum > thresholds.scroll_distance_px && idle_ms > thresholds.scroll_idle_ms {
        return Some(StallKind::ScrollLoop);
    }

    None
}
