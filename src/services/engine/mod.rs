//! Ticket & queue engine - single-writer orchestration
//!
//! The Engine is the one owner of all mutable checkpoint state and
//! coordinates:
//! - Track occupancy (zone crossings derived from detection frames)
//! - Lifetime entry/exit counters for the gate area and guard anchor
//! - Ticket lifecycle (creation, coalescing, examination, termination)
//! - Guard assignment and the waiting queue
//! - SLA escalation on a fixed tick
//! - Snapshot publication for external consumers
//!
//! Every mutation flows through one command channel consumed here, so no
//! two state changes are ever concurrent and frame ordering is
//! deterministic. Handlers are synchronous and take the current time as an
//! argument; tests drive them directly with a synthetic clock.

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::ticket::epoch_ms;
use crate::domain::types::{EngineCommand, EngineError};
use crate::domain::zone::ZoneSet;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::audit::AuditLog;
use crate::io::egress_channel::{
    EgressSender, GuardView, SnapshotPayload, SnapshotSlot, StatisticsView, TicketView,
};
use crate::services::body_check::BodyCheckPolicy;
use crate::services::crossing::CrossingCounter;
use crate::services::ticket_manager::{TicketManager, TimeoutPolicy};
use crate::services::ticket_queue::{build_queue, AssignPolicy, GuardRegistry, QueuePolicy};
use crate::services::track_store::TrackStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

/// Running totals of ticket outcomes since engine start
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TicketTotals {
    pub created: u64,
    pub checked: u64,
    pub escalated: u64,
    pub cancelled: u64,
}

/// Central checkpoint state owner and command processor
pub struct Engine {
    /// Active zone configuration (replaced atomically by updates)
    pub(crate) zones: ZoneSet,
    /// Per-track debounced occupancy
    pub(crate) tracks: TrackStore,
    /// Monotonic crossing counters
    pub(crate) counter: CrossingCounter,
    /// Live tickets, coalescing window, history
    pub(crate) tickets: TicketManager,
    /// Guards known from the presence feed
    pub(crate) guards: GuardRegistry,
    pub(crate) queue_policy: QueuePolicy,
    pub(crate) assign_policy: AssignPolicy,
    pub(crate) timeouts: TimeoutPolicy,
    pub(crate) scorer: BodyCheckPolicy,
    pub(crate) coalesce_window_ms: u64,
    tick_interval_ms: u64,
    site_id: String,
    pub(crate) totals: TicketTotals,
    /// Durable audit output
    pub(crate) audit: AuditLog,
    /// Metrics collector
    pub(crate) metrics: Arc<Metrics>,
    /// Snapshot/event egress (optional)
    pub(crate) egress: Option<EgressSender>,
    /// Latest snapshot for control-API reads
    pub(crate) snapshot_slot: Arc<SnapshotSlot>,
}

impl Engine {
    /// Create a new Engine from configuration and shared dependencies
    pub fn new(
        config: &Config,
        metrics: Arc<Metrics>,
        egress: Option<EgressSender>,
        snapshot_slot: Arc<SnapshotSlot>,
    ) -> Self {
        Self {
            zones: config.zones().clone(),
            tracks: TrackStore::new(config.debounce_frames(), config.track_grace_ms()),
            counter: CrossingCounter::new(),
            tickets: TicketManager::new(config.history_cap()),
            guards: GuardRegistry::new(),
            queue_policy: QueuePolicy {
                warning_wait_ms: config.warning_wait_ms(),
                critical_wait_ms: config.critical_wait_ms(),
                mode_priority: config.mode_priority().to_vec(),
            },
            assign_policy: AssignPolicy {
                accept_delay_ms: config.accept_delay_ms(),
                cooldown_ms: config.cooldown_ms(),
            },
            timeouts: TimeoutPolicy {
                wait_ms: config.wait_timeout_ms(),
                check_ms: config.check_timeout_ms(),
                verify_ms: config.verify_timeout_ms(),
                verify_confirm_ms: config.verify_confirm_ms(),
            },
            scorer: BodyCheckPolicy::new(
                config.body_hand_weight(),
                config.body_reach_weight(),
                config.body_proximity_weight(),
                config.body_sequential_threshold(),
                config.body_batch_threshold(),
            ),
            coalesce_window_ms: config.coalesce_window_ms(),
            tick_interval_ms: config.tick_interval_ms(),
            site_id: config.site_id().to_string(),
            totals: TicketTotals::default(),
            audit: AuditLog::new(config.audit_file(), config.site_id()),
            metrics,
            egress,
            snapshot_slot,
        }
    }

    /// Start the engine, consuming commands from the channel
    ///
    /// The escalation tick runs at its own cadence, independent of frame
    /// rate, and is serialized with command processing by this loop.
    pub async fn run(&mut self, mut cmd_rx: mpsc::Receiver<EngineCommand>) {
        let mut tick_interval = interval(Duration::from_millis(self.tick_interval_ms.max(10)));

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.dispatch(cmd),
                        None => break, // Channel closed
                    }
                }
                _ = tick_interval.tick() => {
                    self.tick(epoch_ms());
                }
            }
        }
    }

    /// Process a single command, dispatching to the appropriate handler
    pub fn dispatch(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Frame(frame) => {
                let process_start = Instant::now();
                self.handle_frame(frame);
                let latency_us = process_start.elapsed().as_micros() as u64;
                self.metrics.record_frame_processed(latency_us);
            }
            EngineCommand::GuardPresence { guard_id, is_active } => {
                self.handle_guard_presence(guard_id, is_active, epoch_ms());
            }
            EngineCommand::Cancel { ticket_id, reason, resp } => {
                let result = self.handle_cancel(&ticket_id, &reason, epoch_ms());
                let _ = resp.send(result);
            }
            EngineCommand::UpdateZones { zones, resp } => {
                let result = self.handle_update_zones(zones, epoch_ms());
                let _ = resp.send(result);
            }
            EngineCommand::ResetCounters { resp } => {
                self.handle_reset_counters(epoch_ms());
                let _ = resp.send(());
            }
        }
    }

    /// Build a point-in-time snapshot of all externally visible state
    pub fn snapshot(&self, now: u64) -> SnapshotPayload {
        let queue = build_queue(self.tickets.waiting_ready(), &self.queue_policy, now);

        let tickets: BTreeMap<String, TicketView> = self
            .tickets
            .iter()
            .map(|t| (t.id.clone(), TicketView::from_ticket(t, self.scorer.score(&t.body_check))))
            .collect();

        let guards: BTreeMap<String, GuardView> =
            self.guards.iter().map(|g| (g.id.0.clone(), GuardView::from_guard(g))).collect();

        let statistics = StatisticsView {
            active_tracks: self.tracks.len(),
            open_tickets: self.tickets.active_count(),
            queue_depth: queue.len(),
            guards_active: self.guards.active_count(),
            tickets_created: self.totals.created,
            tickets_checked: self.totals.checked,
            tickets_escalated: self.totals.escalated,
            tickets_cancelled: self.totals.cancelled,
        };

        SnapshotPayload {
            site: Some(self.site_id.clone()),
            ts: now,
            queue,
            tickets,
            guards,
            statistics,
            object_counts: self.counter.counts(),
        }
    }

    /// Store the latest snapshot and hand it to the egress channel
    ///
    /// Readers get their own Arc; a slow egress consumer only costs a
    /// dropped message, never a blocked writer.
    pub(crate) fn publish_snapshot(&mut self, now: u64) {
        let snapshot = self.snapshot(now);
        if let Some(sender) = &self.egress {
            if !sender.send_snapshot(snapshot.clone()) {
                self.metrics.record_snapshot_dropped();
            }
        }
        self.snapshot_slot.store(snapshot);
    }

    /// Cancel a ticket directly (test and integration convenience)
    pub fn cancel_ticket(
        &mut self,
        ticket_id: &str,
        reason: &str,
        now: u64,
    ) -> Result<crate::domain::ticket::TicketStatus, EngineError> {
        self.handle_cancel(ticket_id, reason, now)
    }

    /// Current active track count
    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Current open (non-terminal) ticket count
    pub fn open_tickets(&self) -> usize {
        self.tickets.active_count()
    }
}
