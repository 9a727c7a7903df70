//! Guard registry and assignment queue ordering
//!
//! The queue is recomputed from the waiting tickets each assignment round.
//! The sort key folds in the wait-escalation bucket, so tickets crossing the
//! warning/critical thresholds move toward the head without any explicit
//! reordering step, and a ticket returned after a failed assignment keeps
//! its original `ready_at` and therefore its seniority.

use crate::domain::ticket::Ticket;
use crate::domain::types::GuardId;
use crate::domain::zone::ExaminationMode;
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use tracing::debug;

/// Guard acceptance and cool-down timing (milliseconds)
#[derive(Debug, Clone)]
pub struct AssignPolicy {
    /// How long a guard must remain active after assignment to accept
    pub accept_delay_ms: u64,
    /// Reassignment cool-down after a failed acceptance
    pub cooldown_ms: u64,
}

/// Queue ordering policy
#[derive(Debug, Clone, Default)]
pub struct QueuePolicy {
    pub warning_wait_ms: u64,
    pub critical_wait_ms: u64,
    /// Examination-mode priority classes, highest first; empty = no preference
    pub mode_priority: Vec<ExaminationMode>,
}

impl QueuePolicy {
    /// Escalation bucket for a given wait: 2 critical, 1 warning, 0 normal
    fn wait_bucket(&self, wait_ms: u64) -> u8 {
        if self.critical_wait_ms > 0 && wait_ms >= self.critical_wait_ms {
            2
        } else if self.warning_wait_ms > 0 && wait_ms >= self.warning_wait_ms {
            1
        } else {
            0
        }
    }

    /// Priority class rank within a bucket; lower is better
    fn class_rank(&self, mode: ExaminationMode) -> usize {
        if self.mode_priority.is_empty() {
            return 0;
        }
        self.mode_priority.iter().position(|m| *m == mode).unwrap_or(self.mode_priority.len())
    }
}

/// Order waiting tickets for assignment
///
/// Key: escalation bucket (desc), mode priority class, ascending `ready_at`,
/// then ticket id for a strict deterministic tie-break. The sort is stable
/// and never starves normal-priority tickets when nothing has escalated.
pub fn build_queue<'a>(
    waiting: impl Iterator<Item = &'a Ticket>,
    policy: &QueuePolicy,
    now: u64,
) -> Vec<String> {
    let mut entries: Vec<(Reverse<u8>, usize, u64, String)> = waiting
        .map(|t| {
            (
                Reverse(policy.wait_bucket(t.wait_ms(now))),
                policy.class_rank(t.mode),
                t.ready_at.unwrap_or(u64::MAX),
                t.id.clone(),
            )
        })
        .collect();
    entries.sort();
    entries.into_iter().map(|(_, _, _, id)| id).collect()
}

/// A guard known to the engine
#[derive(Debug, Clone)]
pub struct Guard {
    pub id: GuardId,
    pub is_active: bool,
    pub active_since: Option<u64>,
    pub current_ticket: Option<String>,
    pub cooldown_until: Option<u64>,
}

impl Guard {
    fn new(id: GuardId) -> Self {
        Self { id, is_active: false, active_since: None, current_ticket: None, cooldown_until: None }
    }
}

/// Registry of guards driven by the external presence signal
pub struct GuardRegistry {
    guards: FxHashMap<GuardId, Guard>,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self { guards: FxHashMap::default() }
    }

    /// Apply a presence transition; creates the guard on first sight
    pub fn set_presence(&mut self, guard_id: GuardId, is_active: bool, now: u64) {
        let guard =
            self.guards.entry(guard_id.clone()).or_insert_with(|| Guard::new(guard_id.clone()));
        if is_active && !guard.is_active {
            guard.active_since = Some(now);
        } else if !is_active {
            guard.active_since = None;
        }
        guard.is_active = is_active;
        debug!(guard_id = %guard_id, is_active = %is_active, "guard_presence");
    }

    /// Active guards with no held ticket and no running cool-down, by id
    pub fn idle(&self, now: u64) -> Vec<GuardId> {
        let mut idle: Vec<GuardId> = self
            .guards
            .values()
            .filter(|g| {
                g.is_active
                    && g.current_ticket.is_none()
                    && g.cooldown_until.map(|until| now >= until).unwrap_or(true)
            })
            .map(|g| g.id.clone())
            .collect();
        idle.sort();
        idle
    }

    pub fn get(&self, guard_id: &GuardId) -> Option<&Guard> {
        self.guards.get(guard_id)
    }

    pub fn is_active(&self, guard_id: &GuardId) -> bool {
        self.guards.get(guard_id).map(|g| g.is_active).unwrap_or(false)
    }

    /// Record that a guard now holds a ticket
    pub fn hold(&mut self, guard_id: &GuardId, ticket_id: &str) {
        if let Some(guard) = self.guards.get_mut(guard_id) {
            guard.current_ticket = Some(ticket_id.to_string());
        }
    }

    /// Free whichever guard holds the given ticket
    pub fn release_ticket(&mut self, ticket_id: &str) {
        for guard in self.guards.values_mut() {
            if guard.current_ticket.as_deref() == Some(ticket_id) {
                guard.current_ticket = None;
            }
        }
    }

    /// Failed acceptance: drop the held ticket and start the cool-down
    pub fn start_cooldown(&mut self, guard_id: &GuardId, until: u64) {
        if let Some(guard) = self.guards.get_mut(guard_id) {
            guard.current_ticket = None;
            guard.cooldown_until = Some(until);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Guard> {
        self.guards.values()
    }

    pub fn active_count(&self) -> usize {
        self.guards.values().filter(|g| g.is_active).count()
    }
}

impl Default for GuardRegistry {
    fn default() -> Self {
        Self::new()
    }
}
