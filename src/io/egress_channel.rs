//! Typed channel for snapshot and event egress
//!
//! Provides a non-blocking way to hand engine output to the MQTT publisher.
//! Uses bounded mpsc channels with `try_send`, so a slow or absent consumer
//! can never block the single-writer engine loop. Also holds the shared
//! snapshot slot the control API reads point-in-time copies from.

use crate::domain::ticket::{epoch_ms, Ticket};
use crate::infra::metrics::{MetricsSummary, METRICS_NUM_BUCKETS};
use crate::services::crossing::ObjectCounts;
use crate::services::ticket_queue::Guard;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Messages that can be sent to the MQTT publisher
#[derive(Debug)]
pub enum EgressMessage {
    /// Per-frame engine snapshot
    Snapshot(SnapshotPayload),
    /// Ticket lifecycle event (created, assigned, escalated, ...)
    TicketEvent(TicketEventPayload),
    /// Zone crossing event
    CrossingEvent(CrossingEventPayload),
    /// Periodic metrics snapshot
    Metrics(MetricsPayload),
}

/// Read view of one ticket inside a snapshot
#[derive(Debug, Clone, Serialize)]
pub struct TicketView {
    pub members: Vec<i64>,
    pub kind: String,
    pub mode: String,
    pub status: String,
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
    /// Body-check completion score in [0,1]
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}

impl TicketView {
    pub fn from_ticket(ticket: &Ticket, score: f64) -> Self {
        Self {
            members: ticket.members.iter().map(|t| t.0).collect(),
            kind: ticket.kind.as_str().to_string(),
            mode: ticket.mode.as_str().to_string(),
            status: ticket.status.as_str().to_string(),
            created_at: ticket.created_at,
            ready_at: ticket.ready_at,
            guard: ticket.assigned_guard.as_ref().map(|g| g.0.clone()),
            score,
            escalated_reason: ticket.escalated_reason.clone(),
            cancel_reason: ticket.cancel_reason.clone(),
        }
    }
}

/// Read view of one guard inside a snapshot
#[derive(Debug, Clone, Serialize)]
pub struct GuardView {
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_since: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_ticket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<u64>,
}

impl GuardView {
    pub fn from_guard(guard: &Guard) -> Self {
        Self {
            is_active: guard.is_active,
            active_since: guard.active_since,
            current_ticket: guard.current_ticket.clone(),
            cooldown_until: guard.cooldown_until,
        }
    }
}

/// Aggregate statistics inside a snapshot
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatisticsView {
    pub active_tracks: usize,
    pub open_tickets: usize,
    pub queue_depth: usize,
    pub guards_active: usize,
    pub tickets_created: u64,
    pub tickets_checked: u64,
    pub tickets_escalated: u64,
    pub tickets_cancelled: u64,
}

/// Point-in-time engine state for external consumption
///
/// Uses BTreeMaps so serialized output is deterministically ordered.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SnapshotPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    pub ts: u64,
    /// Waiting ticket ids in assignment order
    pub queue: Vec<String>,
    pub tickets: BTreeMap<String, TicketView>,
    pub guards: BTreeMap<String, GuardView>,
    pub statistics: StatisticsView,
    pub object_counts: ObjectCounts,
}

/// Shared slot holding the latest snapshot for control-API reads
///
/// The engine stores a fresh Arc; readers clone it and never hold the lock
/// across IO.
pub struct SnapshotSlot {
    inner: RwLock<Arc<SnapshotPayload>>,
}

impl SnapshotSlot {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Arc::new(SnapshotPayload::default())) }
    }

    pub fn store(&self, snapshot: SnapshotPayload) {
        *self.inner.write() = Arc::new(snapshot);
    }

    pub fn load(&self) -> Arc<SnapshotPayload> {
        self.inner.read().clone()
    }
}

impl Default for SnapshotSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload for ticket lifecycle events
#[derive(Debug, Clone, Serialize)]
pub struct TicketEventPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    /// Timestamp (epoch ms)
    pub ts: u64,
    /// Event type: created, ready, assigned, accepted, check_complete,
    /// checked, escalated, cancelled, counter_reset
    pub t: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tkid: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload for zone crossing events
#[derive(Debug, Clone, Serialize)]
pub struct CrossingEventPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    pub ts: u64,
    /// "entry" or "exit"
    pub t: String,
    /// "gate_area" or "guard_anchor"
    pub zone: String,
    pub tid: i64,
    /// Occupancy of the zone after the event
    pub current: u64,
}

/// Payload for metrics snapshots
#[derive(Debug, Serialize)]
pub struct MetricsPayload {
    pub site: String,
    pub ts: u64,
    pub frames_total: u64,
    pub frames_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    /// Frame processing latency histogram buckets (Prometheus-style exponential)
    pub lat_buckets: [u64; METRICS_NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub commands_received: u64,
    pub commands_dropped: u64,
    pub crossings_recorded: u64,
    pub crossings_clamped: u64,
    pub tickets_created: u64,
    pub tickets_checked: u64,
    pub tickets_escalated: u64,
    pub tickets_cancelled: u64,
    pub open_tickets: usize,
    pub active_tracks: usize,
}

impl MetricsPayload {
    pub fn from_summary(summary: MetricsSummary, site: String) -> Self {
        Self {
            site,
            ts: epoch_ms(),
            frames_total: summary.frames_total,
            frames_per_sec: summary.frames_per_sec,
            avg_latency_us: summary.avg_latency_us,
            max_latency_us: summary.max_latency_us,
            lat_buckets: summary.lat_buckets,
            lat_p50_us: summary.lat_p50_us,
            lat_p95_us: summary.lat_p95_us,
            lat_p99_us: summary.lat_p99_us,
            commands_received: summary.commands_received,
            commands_dropped: summary.commands_dropped,
            crossings_recorded: summary.crossings_recorded,
            crossings_clamped: summary.crossings_clamped,
            tickets_created: summary.tickets_created,
            tickets_checked: summary.tickets_checked,
            tickets_escalated: summary.tickets_escalated,
            tickets_cancelled: summary.tickets_cancelled,
            open_tickets: summary.open_tickets,
            active_tracks: summary.active_tracks,
        }
    }
}

/// Sender handle for egress messages
///
/// Clone this to share across multiple producers.
/// Non-blocking - if the channel is full, messages are dropped.
#[derive(Clone)]
pub struct EgressSender {
    tx: mpsc::Sender<EgressMessage>,
    site_id: String,
}

impl EgressSender {
    pub fn new(tx: mpsc::Sender<EgressMessage>, site_id: String) -> Self {
        Self { tx, site_id }
    }

    /// Send a snapshot; returns false if it was dropped
    pub fn send_snapshot(&self, mut payload: SnapshotPayload) -> bool {
        payload.site = Some(self.site_id.clone());
        self.tx.try_send(EgressMessage::Snapshot(payload)).is_ok()
    }

    /// Send a ticket lifecycle event
    pub fn send_ticket_event(&self, mut payload: TicketEventPayload) {
        payload.site = Some(self.site_id.clone());
        let _ = self.tx.try_send(EgressMessage::TicketEvent(payload));
    }

    /// Send a zone crossing event
    pub fn send_crossing_event(&self, mut payload: CrossingEventPayload) {
        payload.site = Some(self.site_id.clone());
        let _ = self.tx.try_send(EgressMessage::CrossingEvent(payload));
    }

    /// Send a metrics snapshot
    pub fn send_metrics(&self, summary: MetricsSummary) {
        let payload = MetricsPayload::from_summary(summary, self.site_id.clone());
        let _ = self.tx.try_send(EgressMessage::Metrics(payload));
    }
}

/// Create a new egress channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
/// Buffer size determines how many messages can be queued.
pub fn create_egress_channel(
    buffer_size: usize,
    site_id: String,
) -> (EgressSender, mpsc::Receiver<EgressMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EgressSender::new(tx, site_id), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_slot_swaps_atomically() {
        let slot = SnapshotSlot::new();
        assert_eq!(slot.load().ts, 0);

        let old = slot.load();
        slot.store(SnapshotPayload { ts: 42, ..Default::default() });

        // Readers holding the old Arc keep a consistent view
        assert_eq!(old.ts, 0);
        assert_eq!(slot.load().ts, 42);
    }

    #[test]
    fn test_sender_injects_site() {
        let (sender, mut rx) = create_egress_channel(4, "lobby".to_string());
        assert!(sender.send_snapshot(SnapshotPayload::default()));

        let Some(EgressMessage::Snapshot(payload)) = rx.try_recv().ok() else {
            panic!("expected snapshot message");
        };
        assert_eq!(payload.site.as_deref(), Some("lobby"));
    }

    #[test]
    fn test_full_channel_drops_instead_of_blocking() {
        let (sender, _rx) = create_egress_channel(1, "lobby".to_string());
        assert!(sender.send_snapshot(SnapshotPayload::default()));
        assert!(!sender.send_snapshot(SnapshotPayload::default()));
    }
}
