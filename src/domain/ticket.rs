//! Ticket data model - the unit of work for one security check

use crate::domain::types::{GestureFlags, GuardId, TrackId};
use crate::domain::zone::ExaminationMode;
use smallvec::{smallvec, SmallVec};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Machine-readable escalation/cancellation reason codes
pub const REASON_WAIT_TIMEOUT: &str = "wait_timeout";
pub const REASON_CHECK_TIMEOUT: &str = "check_timeout";
pub const REASON_VERIFY_TIMEOUT: &str = "verify_timeout";
pub const REASON_INVARIANT_VIOLATION: &str = "invariant_violation";
pub const REASON_MEMBERS_LEFT: &str = "members_left";

/// Ticket status state machine
///
/// `waiting -> assigning -> (in_check | in_batch) -> verify -> checked`,
/// with `escalated` and `cancelled` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    Waiting,
    Assigning,
    InCheck,
    InBatch,
    Verify,
    Checked,
    Escalated,
    Cancelled,
}

impl TicketStatus {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Waiting => "waiting",
            TicketStatus::Assigning => "assigning",
            TicketStatus::InCheck => "in_check",
            TicketStatus::InBatch => "in_batch",
            TicketStatus::Verify => "verify",
            TicketStatus::Checked => "checked",
            TicketStatus::Escalated => "escalated",
            TicketStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses admit no further mutation
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Checked | TicketStatus::Escalated | TicketStatus::Cancelled)
    }

    /// Active examination states where gesture signals are accumulated
    #[inline]
    pub fn is_examining(&self) -> bool {
        matches!(self, TicketStatus::InCheck | TicketStatus::InBatch)
    }
}

/// Single person or coalesced group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketKind {
    Single,
    Group,
}

impl TicketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketKind::Single => "single",
            TicketKind::Group => "group",
        }
    }
}

/// Event types recorded on a ticket's audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketEventType {
    Created,
    MemberJoined,
    Ready,
    Assigned,
    AssignFailed,
    Accepted,
    Signal,
    CheckComplete,
    Confirmed,
    Escalated,
    Cancelled,
}

impl TicketEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketEventType::Created => "created",
            TicketEventType::MemberJoined => "member_joined",
            TicketEventType::Ready => "ready",
            TicketEventType::Assigned => "assigned",
            TicketEventType::AssignFailed => "assign_failed",
            TicketEventType::Accepted => "accepted",
            TicketEventType::Signal => "signal",
            TicketEventType::CheckComplete => "check_complete",
            TicketEventType::Confirmed => "confirmed",
            TicketEventType::Escalated => "escalated",
            TicketEventType::Cancelled => "cancelled",
        }
    }
}

/// A single event in a ticket's audit trail
#[derive(Debug, Clone)]
pub struct TicketEvent {
    pub t: TicketEventType,
    pub ts: u64,
    pub extra: Option<String>,
}

impl TicketEvent {
    pub fn new(event_type: TicketEventType, ts: u64) -> Self {
        Self { t: event_type, ts, extra: None }
    }

    pub fn with_extra(mut self, extra: &str) -> Self {
        self.extra = Some(extra.to_string());
        self
    }

    fn to_json_value(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("t".to_string(), serde_json::Value::String(self.t.as_str().to_string()));
        obj.insert("ts".to_string(), serde_json::Value::Number(self.ts.into()));
        if let Some(x) = &self.extra {
            obj.insert("x".to_string(), serde_json::Value::String(x.clone()));
        }
        serde_json::Value::Object(obj)
    }
}

/// Body-check sub-state: gesture sub-signals latched for the examination window
///
/// A signal that has been observed once stays true so transient detection
/// dropouts never regress the completion score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BodyCheck {
    pub hand_to_torso: bool,
    pub reach_gesture: bool,
    pub proximity: bool,
}

impl BodyCheck {
    /// Latch any newly true sub-signals; returns whether anything changed
    pub fn observe(&mut self, flags: GestureFlags) -> bool {
        let before = *self;
        self.hand_to_torso |= flags.hand_to_torso;
        self.reach_gesture |= flags.reach_gesture;
        self.proximity |= flags.proximity;
        *self != before
    }
}

/// The unit of work representing one person or group undergoing a check
#[derive(Debug, Clone)]
pub struct Ticket {
    pub id: String,
    pub members: SmallVec<[TrackId; 4]>,
    pub kind: TicketKind,
    pub mode: ExaminationMode,
    pub status: TicketStatus,
    pub created_at: u64,
    pub ready_at: Option<u64>,
    pub assigned_guard: Option<GuardId>,
    pub body_check: BodyCheck,
    pub escalated_reason: Option<String>,
    pub cancel_reason: Option<String>,
    /// When the current status was entered (epoch ms), for timeout accounting
    pub state_entered_at: u64,
    pub events: Vec<TicketEvent>,
}

impl Ticket {
    /// Create a new waiting ticket for a single entrant
    pub fn new(track_id: TrackId, mode: ExaminationMode, now: u64) -> Self {
        let mut ticket = Self {
            id: new_uuid_v7(),
            members: smallvec![track_id],
            kind: TicketKind::Single,
            mode,
            status: TicketStatus::Waiting,
            created_at: now,
            ready_at: None,
            assigned_guard: None,
            body_check: BodyCheck::default(),
            escalated_reason: None,
            cancel_reason: None,
            state_entered_at: now,
            events: Vec::with_capacity(8),
        };
        ticket.push_event(TicketEvent::new(TicketEventType::Created, now));
        ticket
    }

    pub fn push_event(&mut self, event: TicketEvent) {
        self.events.push(event);
    }

    pub fn is_member(&self, track_id: TrackId) -> bool {
        self.members.contains(&track_id)
    }

    /// Join a late entrant within the coalescing window (batch mode only)
    pub fn add_member(&mut self, track_id: TrackId, now: u64) {
        self.members.push(track_id);
        self.kind = TicketKind::Group;
        self.push_event(
            TicketEvent::new(TicketEventType::MemberJoined, now)
                .with_extra(&format!("track={track_id}")),
        );
    }

    /// Stamp `ready_at` once the member set is final
    pub fn mark_ready(&mut self, now: u64) {
        if self.ready_at.is_none() {
            self.ready_at = Some(now);
            self.push_event(TicketEvent::new(TicketEventType::Ready, now));
        }
    }

    fn enter(&mut self, status: TicketStatus, now: u64) {
        self.status = status;
        self.state_entered_at = now;
    }

    /// Selected for an idle guard; the guard has not accepted yet
    pub fn assign(&mut self, guard: GuardId, now: u64) {
        self.push_event(
            TicketEvent::new(TicketEventType::Assigned, now).with_extra(&format!("guard={guard}")),
        );
        self.assigned_guard = Some(guard);
        self.enter(TicketStatus::Assigning, now);
    }

    /// The guard became unavailable before accepting; back to the queue
    pub fn assignment_failed(&mut self, now: u64) {
        if let Some(guard) = self.assigned_guard.take() {
            self.push_event(
                TicketEvent::new(TicketEventType::AssignFailed, now)
                    .with_extra(&format!("guard={guard}")),
            );
        }
        self.enter(TicketStatus::Waiting, now);
    }

    /// Guard accepted; examination starts in the mode-dependent state
    pub fn accept(&mut self, now: u64) {
        let next = match self.mode {
            ExaminationMode::Sequential => TicketStatus::InCheck,
            ExaminationMode::Batch => TicketStatus::InBatch,
        };
        self.push_event(TicketEvent::new(TicketEventType::Accepted, now));
        self.enter(next, now);
    }

    /// Body check scored complete; move to the confirmation window
    pub fn complete_check(&mut self, now: u64) {
        self.push_event(TicketEvent::new(TicketEventType::CheckComplete, now));
        self.enter(TicketStatus::Verify, now);
    }

    /// Confirmation succeeded
    pub fn confirm(&mut self, now: u64) {
        self.push_event(TicketEvent::new(TicketEventType::Confirmed, now));
        self.enter(TicketStatus::Checked, now);
    }

    /// Escalate with a machine-readable reason; no-op on terminal tickets
    pub fn escalate(&mut self, reason: &str, now: u64) {
        if self.status.is_terminal() {
            return;
        }
        self.escalated_reason = Some(reason.to_string());
        self.push_event(TicketEvent::new(TicketEventType::Escalated, now).with_extra(reason));
        self.enter(TicketStatus::Escalated, now);
    }

    /// Cancel with a reason; idempotent on terminal tickets
    ///
    /// Returns the resulting status so a repeated cancel reports the same
    /// terminal state it found.
    pub fn cancel(&mut self, reason: &str, now: u64) -> TicketStatus {
        if self.status.is_terminal() {
            return self.status;
        }
        self.cancel_reason = Some(reason.to_string());
        self.push_event(TicketEvent::new(TicketEventType::Cancelled, now).with_extra(reason));
        self.enter(TicketStatus::Cancelled, now);
        self.status
    }

    /// Elapsed wait since the ticket became ready (for queue escalation)
    pub fn wait_ms(&self, now: u64) -> u64 {
        self.ready_at.map(|r| now.saturating_sub(r)).unwrap_or(0)
    }

    /// Convert to short-key JSON string (without site)
    pub fn to_json(&self) -> String {
        self.to_json_with_site_opt(None)
    }

    /// Convert to short-key JSON string with site_id included
    pub fn to_json_with_site(&self, site_id: &str) -> String {
        self.to_json_with_site_opt(Some(site_id))
    }

    fn to_json_with_site_opt(&self, site_id: Option<&str>) -> String {
        let mut obj = serde_json::Map::new();

        if let Some(site) = site_id {
            obj.insert("site".to_string(), serde_json::Value::String(site.to_string()));
        }

        obj.insert("tkid".to_string(), serde_json::Value::String(self.id.clone()));
        let members: Vec<i64> = self.members.iter().map(|t| t.0).collect();
        obj.insert("members".to_string(), serde_json::json!(members));
        obj.insert("kind".to_string(), serde_json::Value::String(self.kind.as_str().to_string()));
        obj.insert("mode".to_string(), serde_json::Value::String(self.mode.as_str().to_string()));
        obj.insert(
            "status".to_string(),
            serde_json::Value::String(self.status.as_str().to_string()),
        );
        obj.insert("t0".to_string(), serde_json::Value::Number(self.created_at.into()));
        if let Some(ready) = self.ready_at {
            obj.insert("ready".to_string(), serde_json::Value::Number(ready.into()));
        }
        if let Some(guard) = &self.assigned_guard {
            obj.insert("guard".to_string(), serde_json::Value::String(guard.0.clone()));
        }
        if let Some(reason) = &self.escalated_reason {
            obj.insert("esc".to_string(), serde_json::Value::String(reason.clone()));
        }
        if let Some(reason) = &self.cancel_reason {
            obj.insert("cancel".to_string(), serde_json::Value::String(reason.clone()));
        }

        let events: Vec<serde_json::Value> =
            self.events.iter().map(|e| e.to_json_value()).collect();
        obj.insert("ev".to_string(), serde_json::Value::Array(events));

        serde_json::Value::Object(obj).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ticket() {
        let ticket = Ticket::new(TrackId(100), ExaminationMode::Sequential, 1000);

        assert!(!ticket.id.is_empty());
        assert_eq!(ticket.members.as_slice(), &[TrackId(100)]);
        assert_eq!(ticket.kind, TicketKind::Single);
        assert_eq!(ticket.status, TicketStatus::Waiting);
        assert!(ticket.ready_at.is_none());
        assert!(ticket.assigned_guard.is_none());
        assert_eq!(ticket.events.len(), 1);
        assert_eq!(ticket.events[0].t, TicketEventType::Created);
    }

    #[test]
    fn test_add_member_promotes_to_group() {
        let mut ticket = Ticket::new(TrackId(1), ExaminationMode::Batch, 1000);
        ticket.add_member(TrackId(2), 1100);
        ticket.add_member(TrackId(3), 1200);

        assert_eq!(ticket.members.as_slice(), &[TrackId(1), TrackId(2), TrackId(3)]);
        assert_eq!(ticket.kind, TicketKind::Group);
    }

    #[test]
    fn test_accept_is_mode_dependent() {
        let mut seq = Ticket::new(TrackId(1), ExaminationMode::Sequential, 0);
        seq.assign(GuardId::from("g1"), 100);
        seq.accept(200);
        assert_eq!(seq.status, TicketStatus::InCheck);

        let mut batch = Ticket::new(TrackId(2), ExaminationMode::Batch, 0);
        batch.assign(GuardId::from("g1"), 100);
        batch.accept(200);
        assert_eq!(batch.status, TicketStatus::InBatch);
    }

    #[test]
    fn test_assignment_failed_clears_guard() {
        let mut ticket = Ticket::new(TrackId(1), ExaminationMode::Sequential, 0);
        ticket.mark_ready(50);
        ticket.assign(GuardId::from("g1"), 100);
        assert_eq!(ticket.status, TicketStatus::Assigning);

        ticket.assignment_failed(200);
        assert_eq!(ticket.status, TicketStatus::Waiting);
        assert!(ticket.assigned_guard.is_none());
        // ready_at survives so the ticket keeps its queue seniority
        assert_eq!(ticket.ready_at, Some(50));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut ticket = Ticket::new(TrackId(1), ExaminationMode::Sequential, 0);
        let first = ticket.cancel("operator_request", 100);
        assert_eq!(first, TicketStatus::Cancelled);

        let events_before = ticket.events.len();
        let second = ticket.cancel("operator_request", 200);
        assert_eq!(second, TicketStatus::Cancelled);
        assert_eq!(ticket.events.len(), events_before);
        assert_eq!(ticket.cancel_reason.as_deref(), Some("operator_request"));
    }

    #[test]
    fn test_escalate_terminal_is_noop() {
        let mut ticket = Ticket::new(TrackId(1), ExaminationMode::Sequential, 0);
        ticket.cancel("gone", 100);
        ticket.escalate(REASON_WAIT_TIMEOUT, 200);
        assert_eq!(ticket.status, TicketStatus::Cancelled);
        assert!(ticket.escalated_reason.is_none());
    }

    #[test]
    fn test_body_check_latches() {
        let mut check = BodyCheck::default();
        let changed = check.observe(GestureFlags { hand_to_torso: true, ..Default::default() });
        assert!(changed);
        assert!(check.hand_to_torso);

        // A later frame without the signal must not clear it
        let changed = check.observe(GestureFlags::default());
        assert!(!changed);
        assert!(check.hand_to_torso);
    }

    #[test]
    fn test_ticket_to_json() {
        let mut ticket = Ticket::new(TrackId(100), ExaminationMode::Batch, 1736012340000);
        ticket.add_member(TrackId(101), 1736012340500);
        ticket.mark_ready(1736012341000);
        ticket.assign(GuardId::from("g7"), 1736012342000);
        ticket.accept(1736012343000);
        ticket.complete_check(1736012350000);
        ticket.confirm(1736012352000);

        let json = ticket.to_json_with_site("lobby");
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["site"], "lobby");
        assert_eq!(parsed["members"], serde_json::json!([100, 101]));
        assert_eq!(parsed["kind"], "group");
        assert_eq!(parsed["mode"], "batch");
        assert_eq!(parsed["status"], "checked");
        assert_eq!(parsed["guard"], "g7");
        assert_eq!(parsed["ready"], 1736012341000_u64);

        let events = parsed["ev"].as_array().unwrap();
        assert_eq!(events[0]["t"], "created");
        assert_eq!(events.last().unwrap()["t"], "confirmed");
    }

    #[test]
    fn test_uuid_v7_generation() {
        let a = new_uuid_v7();
        let b = new_uuid_v7();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
