//! Ticket lifecycle management
//!
//! Owns the live ticket set, the track-to-ticket index that enforces the
//! one-open-ticket-per-track invariant, the batch coalescing window, and the
//! bounded history of terminal tickets.

use crate::domain::ticket::{
    Ticket, TicketStatus, REASON_CHECK_TIMEOUT, REASON_VERIFY_TIMEOUT, REASON_WAIT_TIMEOUT,
};
use crate::domain::types::{EngineError, TrackId};
use crate::domain::zone::ExaminationMode;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Per-state SLA timeouts (milliseconds)
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    pub wait_ms: u64,
    pub check_ms: u64,
    pub verify_ms: u64,
    /// Confirmation delay before a `verify` ticket is auto-confirmed
    pub verify_confirm_ms: u64,
}

/// Result of routing a gate entry to a ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// A fresh ticket was opened for the track
    Created(String),
    /// The track joined the forming batch ticket
    Joined(String),
    /// The track already belongs to an open ticket
    AlreadyTicketed(String),
}

/// An open batch ticket still accepting members
struct FormingWindow {
    ticket_id: String,
    closes_at: u64,
}

/// Outcome of a cancel request
#[derive(Debug, Clone, Copy)]
pub struct CancelOutcome {
    pub status: TicketStatus,
    /// False when the ticket was already terminal (idempotent no-op)
    pub transitioned: bool,
}

pub struct TicketManager {
    active: FxHashMap<String, Ticket>,
    ticket_by_track: FxHashMap<TrackId, String>,
    forming: Option<FormingWindow>,
    history: VecDeque<Ticket>,
    history_cap: usize,
}

impl TicketManager {
    pub fn new(history_cap: usize) -> Self {
        Self {
            active: FxHashMap::default(),
            ticket_by_track: FxHashMap::default(),
            forming: None,
            history: VecDeque::with_capacity(history_cap.min(64)),
            history_cap,
        }
    }

    /// Route a gate-area entry to a ticket per the examination mode
    ///
    /// Sequential mode opens one ticket per track, immediately ready. Batch
    /// mode coalesces entries arriving within the window into one ticket;
    /// once the window closes a late arrival starts a new ticket.
    pub fn admit_entry(
        &mut self,
        track_id: TrackId,
        mode: ExaminationMode,
        coalesce_window_ms: u64,
        now: u64,
    ) -> EntryOutcome {
        if let Some(id) = self.ticket_by_track.get(&track_id) {
            return EntryOutcome::AlreadyTicketed(id.clone());
        }

        if mode == ExaminationMode::Batch {
            if let Some(forming) = &self.forming {
                let joinable = now < forming.closes_at
                    && self
                        .active
                        .get(&forming.ticket_id)
                        .map(|t| t.status == TicketStatus::Waiting)
                        .unwrap_or(false);
                if joinable {
                    let id = forming.ticket_id.clone();
                    if let Some(ticket) = self.active.get_mut(&id) {
                        ticket.add_member(track_id, now);
                    }
                    self.ticket_by_track.insert(track_id, id.clone());
                    debug!(track_id = %track_id, ticket_id = %id, "ticket_member_joined");
                    return EntryOutcome::Joined(id);
                }
                // Stale window (expired or ticket no longer waiting)
                self.forming = None;
            }
        }

        let mut ticket = Ticket::new(track_id, mode, now);
        match mode {
            ExaminationMode::Sequential => ticket.mark_ready(now),
            ExaminationMode::Batch => {
                self.forming = Some(FormingWindow {
                    ticket_id: ticket.id.clone(),
                    closes_at: now + coalesce_window_ms,
                });
            }
        }

        let id = ticket.id.clone();
        info!(
            track_id = %track_id,
            ticket_id = %id,
            mode = %mode.as_str(),
            "ticket_created"
        );
        self.ticket_by_track.insert(track_id, id.clone());
        self.active.insert(id.clone(), ticket);
        EntryOutcome::Created(id)
    }

    /// Close the coalescing window once it has elapsed
    ///
    /// The ticket becomes ready at the window close time, not at the time
    /// the close was observed, so queue ordering stays frame-rate-independent.
    pub fn close_expired_window(&mut self, now: u64) -> Option<String> {
        if self.forming.as_ref().map(|f| now < f.closes_at).unwrap_or(true) {
            return None;
        }
        let FormingWindow { ticket_id, closes_at } = self.forming.take()?;

        let ticket = self.active.get_mut(&ticket_id)?;
        if ticket.status != TicketStatus::Waiting {
            return None;
        }
        ticket.mark_ready(closes_at);
        debug!(ticket_id = %ticket_id, members = %ticket.members.len(), "ticket_ready");
        Some(ticket_id)
    }

    /// Cancel a ticket by id; idempotent on terminal tickets
    pub fn cancel(
        &mut self,
        ticket_id: &str,
        reason: &str,
        now: u64,
    ) -> Result<CancelOutcome, EngineError> {
        if let Some(ticket) = self.active.get_mut(ticket_id) {
            let status = ticket.cancel(reason, now);
            return Ok(CancelOutcome { status, transitioned: true });
        }
        if let Some(ticket) = self.history.iter().find(|t| t.id == ticket_id) {
            return Ok(CancelOutcome { status: ticket.status, transitioned: false });
        }
        Err(EngineError::UnknownTicket(ticket_id.to_string()))
    }

    /// Remove a terminal ticket from live state, retaining it in history
    pub fn retire(&mut self, ticket_id: &str) -> Option<Ticket> {
        let ticket = self.active.remove(ticket_id)?;
        self.ticket_by_track.retain(|_, id| id.as_str() != ticket_id);
        if self.forming.as_ref().is_some_and(|f| f.ticket_id == ticket_id) {
            self.forming = None;
        }

        if self.history.len() >= self.history_cap {
            self.history.pop_front();
        }
        self.history.push_back(ticket.clone());
        Some(ticket)
    }

    /// Escalate every ticket whose current state has outlived its timeout
    ///
    /// Returns the escalated ids for finalization by the caller.
    pub fn escalation_scan(&mut self, now: u64, policy: &TimeoutPolicy) -> Vec<String> {
        let mut escalated = Vec::new();

        for ticket in self.active.values_mut() {
            let breach = match ticket.status {
                TicketStatus::Waiting | TicketStatus::Assigning => ticket
                    .ready_at
                    .is_some_and(|ready| now.saturating_sub(ready) > policy.wait_ms)
                    .then_some(REASON_WAIT_TIMEOUT),
                TicketStatus::InCheck | TicketStatus::InBatch => (now
                    .saturating_sub(ticket.state_entered_at)
                    > policy.check_ms)
                    .then_some(REASON_CHECK_TIMEOUT),
                TicketStatus::Verify => (now.saturating_sub(ticket.state_entered_at)
                    > policy.verify_ms)
                    .then_some(REASON_VERIFY_TIMEOUT),
                TicketStatus::Checked | TicketStatus::Escalated | TicketStatus::Cancelled => None,
            };

            if let Some(reason) = breach {
                info!(
                    ticket_id = %ticket.id,
                    status = %ticket.status.as_str(),
                    reason = %reason,
                    "ticket_escalated"
                );
                ticket.escalate(reason, now);
                escalated.push(ticket.id.clone());
            }
        }

        escalated.sort();
        escalated
    }

    pub fn get(&self, ticket_id: &str) -> Option<&Ticket> {
        self.active.get(ticket_id)
    }

    pub fn get_mut(&mut self, ticket_id: &str) -> Option<&mut Ticket> {
        self.active.get_mut(ticket_id)
    }

    /// The open ticket a track belongs to, if any
    pub fn ticket_for_track(&self, track_id: TrackId) -> Option<&str> {
        self.ticket_by_track.get(&track_id).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ticket> {
        self.active.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Ticket> {
        self.active.values_mut()
    }

    /// Waiting tickets whose member set is final (queue candidates)
    pub fn waiting_ready(&self) -> impl Iterator<Item = &Ticket> {
        self.active
            .values()
            .filter(|t| t.status == TicketStatus::Waiting && t.ready_at.is_some())
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn history_count(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TicketManager {
        TicketManager::new(16)
    }

    #[test]
    fn test_sequential_entries_never_group() {
        let mut mgr = manager();

        let a = mgr.admit_entry(TrackId(1), ExaminationMode::Sequential, 1500, 1000);
        let b = mgr.admit_entry(TrackId(2), ExaminationMode::Sequential, 1500, 1001);

        let (EntryOutcome::Created(id_a), EntryOutcome::Created(id_b)) = (a, b) else {
            panic!("expected two created tickets");
        };
        assert_ne!(id_a, id_b);
        assert!(mgr.get(&id_a).unwrap().ready_at.is_some());
        assert_eq!(mgr.active_count(), 2);
    }

    #[test]
    fn test_batch_coalesces_within_window() {
        let mut mgr = manager();

        let first = mgr.admit_entry(TrackId(1), ExaminationMode::Batch, 1500, 1000);
        let EntryOutcome::Created(id) = first else { panic!("expected created") };

        assert_eq!(
            mgr.admit_entry(TrackId(2), ExaminationMode::Batch, 1500, 1400),
            EntryOutcome::Joined(id.clone())
        );
        assert_eq!(
            mgr.admit_entry(TrackId(3), ExaminationMode::Batch, 1500, 2400),
            EntryOutcome::Joined(id.clone())
        );

        let ticket = mgr.get(&id).unwrap();
        assert_eq!(ticket.members.as_slice(), &[TrackId(1), TrackId(2), TrackId(3)]);
        assert!(ticket.ready_at.is_none());
    }

    #[test]
    fn test_late_arrival_starts_new_ticket() {
        let mut mgr = manager();

        let EntryOutcome::Created(first) =
            mgr.admit_entry(TrackId(1), ExaminationMode::Batch, 1500, 1000)
        else {
            panic!("expected created")
        };

        // Window closed at 2500; arrival at 3000 opens a new ticket
        let outcome = mgr.admit_entry(TrackId(2), ExaminationMode::Batch, 1500, 3000);
        let EntryOutcome::Created(second) = outcome else { panic!("expected created") };
        assert_ne!(first, second);
    }

    #[test]
    fn test_track_joins_at_most_one_open_ticket() {
        let mut mgr = manager();

        let EntryOutcome::Created(id) =
            mgr.admit_entry(TrackId(1), ExaminationMode::Sequential, 1500, 1000)
        else {
            panic!("expected created")
        };

        assert_eq!(
            mgr.admit_entry(TrackId(1), ExaminationMode::Sequential, 1500, 1100),
            EntryOutcome::AlreadyTicketed(id)
        );
        assert_eq!(mgr.active_count(), 1);
    }

    #[test]
    fn test_close_expired_window_stamps_ready_at_close_time() {
        let mut mgr = manager();

        let EntryOutcome::Created(id) =
            mgr.admit_entry(TrackId(1), ExaminationMode::Batch, 1500, 1000)
        else {
            panic!("expected created")
        };

        assert!(mgr.close_expired_window(2000).is_none());
        assert_eq!(mgr.close_expired_window(2600), Some(id.clone()));
        assert_eq!(mgr.get(&id).unwrap().ready_at, Some(2500));
    }

    #[test]
    fn test_cancel_unknown_ticket_is_an_error() {
        let mut mgr = manager();
        let err = mgr.cancel("no-such-ticket", "why", 1000).unwrap_err();
        assert!(matches!(err, EngineError::UnknownTicket(_)));
    }

    #[test]
    fn test_cancel_twice_is_idempotent() {
        let mut mgr = manager();
        let EntryOutcome::Created(id) =
            mgr.admit_entry(TrackId(1), ExaminationMode::Sequential, 1500, 1000)
        else {
            panic!("expected created")
        };

        let first = mgr.cancel(&id, "operator_request", 2000).unwrap();
        assert_eq!(first.status, TicketStatus::Cancelled);
        assert!(first.transitioned);
        mgr.retire(&id);

        let second = mgr.cancel(&id, "operator_request", 3000).unwrap();
        assert_eq!(second.status, TicketStatus::Cancelled);
        assert!(!second.transitioned);
    }

    #[test]
    fn test_retire_frees_track_index() {
        let mut mgr = manager();
        let EntryOutcome::Created(id) =
            mgr.admit_entry(TrackId(1), ExaminationMode::Sequential, 1500, 1000)
        else {
            panic!("expected created")
        };

        mgr.cancel(&id, "gone", 2000).unwrap();
        mgr.retire(&id);

        assert!(mgr.ticket_for_track(TrackId(1)).is_none());
        // The track can now open a fresh ticket
        assert!(matches!(
            mgr.admit_entry(TrackId(1), ExaminationMode::Sequential, 1500, 3000),
            EntryOutcome::Created(_)
        ));
    }

    #[test]
    fn test_escalation_scan_uses_per_state_timeouts() {
        let policy = TimeoutPolicy {
            wait_ms: 10_000,
            check_ms: 20_000,
            verify_ms: 5_000,
            verify_confirm_ms: 2_000,
        };
        let mut mgr = manager();

        let EntryOutcome::Created(id) =
            mgr.admit_entry(TrackId(1), ExaminationMode::Sequential, 1500, 1000)
        else {
            panic!("expected created")
        };

        // Within wait timeout: nothing escalates
        assert!(mgr.escalation_scan(10_000, &policy).is_empty());

        // Past it: the ticket escalates with the wait reason
        let escalated = mgr.escalation_scan(12_000, &policy);
        assert_eq!(escalated, vec![id.clone()]);
        let ticket = mgr.get(&id).unwrap();
        assert_eq!(ticket.status, TicketStatus::Escalated);
        assert_eq!(ticket.escalated_reason.as_deref(), Some(REASON_WAIT_TIMEOUT));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut mgr = TicketManager::new(2);

        for i in 0..4 {
            let EntryOutcome::Created(id) =
                mgr.admit_entry(TrackId(i), ExaminationMode::Sequential, 1500, 1000 + i as u64)
            else {
                panic!("expected created")
            };
            mgr.cancel(&id, "gone", 2000).unwrap();
            mgr.retire(&id);
        }

        assert_eq!(mgr.history_count(), 2);
        assert_eq!(mgr.active_count(), 0);
    }
}
