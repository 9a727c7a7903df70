//! Zone crossing counters
//!
//! Monotonic lifetime entry/exit counters per zone plus derived occupancy.
//! Detection noise can produce an exit with no matching entry; such an exit
//! is dropped (and logged) instead of recorded, which keeps both identities
//! `current == entries - exits` and `current >= 0` true at all times.

use crate::domain::zone::ZoneKind;
use crate::services::track_store::CrossingEvent;
use serde::Serialize;
use tracing::{info, warn};

/// Counter snapshot, serialized into engine snapshots and audit records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ObjectCounts {
    pub gate_entries: u64,
    pub gate_exits: u64,
    pub anchor_entries: u64,
    pub anchor_exits: u64,
    /// Unique tracks ever observed
    pub total_detected: u64,
    /// Members of tickets that reached `checked`
    pub total_passed: u64,
    pub current_in_gate: u64,
    pub current_in_anchor: u64,
}

/// Maintains the monotonic counters; decremented only by the audited reset
pub struct CrossingCounter {
    counts: ObjectCounts,
}

impl CrossingCounter {
    pub fn new() -> Self {
        Self { counts: ObjectCounts::default() }
    }

    /// Record a crossing; returns false when a spurious exit was dropped
    pub fn apply(&mut self, event: &CrossingEvent) -> bool {
        let (entries, exits, current) = match event.zone {
            ZoneKind::GateArea => (
                &mut self.counts.gate_entries,
                &mut self.counts.gate_exits,
                &mut self.counts.current_in_gate,
            ),
            ZoneKind::GuardAnchor => (
                &mut self.counts.anchor_entries,
                &mut self.counts.anchor_exits,
                &mut self.counts.current_in_anchor,
            ),
        };

        if event.entered {
            *entries += 1;
            *current += 1;
            true
        } else if *current == 0 {
            warn!(
                zone = %event.zone.as_str(),
                track_id = %event.track_id,
                "exit_without_entry_dropped"
            );
            false
        } else {
            *exits += 1;
            *current -= 1;
            true
        }
    }

    pub fn record_detected(&mut self, n: u64) {
        self.counts.total_detected += n;
    }

    pub fn record_passed(&mut self, n: u64) {
        self.counts.total_passed += n;
    }

    pub fn counts(&self) -> ObjectCounts {
        self.counts
    }

    /// Zero all counters atomically; returns the prior values for the audit
    pub fn reset(&mut self) -> ObjectCounts {
        let prior = self.counts;
        self.counts = ObjectCounts::default();
        info!(
            gate_entries = %prior.gate_entries,
            gate_exits = %prior.gate_exits,
            anchor_entries = %prior.anchor_entries,
            anchor_exits = %prior.anchor_exits,
            "counters_reset"
        );
        prior
    }
}

impl Default for CrossingCounter {
    fn default() -> Self {
        Self::new()
    }
}
