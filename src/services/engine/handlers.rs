//! Command handlers for the Engine
//!
//! Each handler mutates checkpoint state for one command kind. All handlers
//! are synchronous, never block, and take the current time explicitly so
//! tests can drive a simulated clock.

use super::Engine;
use crate::domain::ticket::{
    TicketEvent, TicketEventType, TicketStatus, REASON_INVARIANT_VIOLATION, REASON_MEMBERS_LEFT,
};
use crate::domain::types::{DetectionFrame, EngineError, GuardId, TrackId};
use crate::domain::zone::{ZoneKind, ZoneSet};
use crate::io::egress_channel::{CrossingEventPayload, TicketEventPayload};
use crate::services::ticket_manager::EntryOutcome;
use crate::services::track_store::CrossingEvent;
use tracing::{debug, info, warn};

impl Engine {
    /// Ingest one detection frame
    ///
    /// Frame timestamps are the engine's clock on this path; the feed
    /// contract guarantees they increase monotonically.
    pub(crate) fn handle_frame(&mut self, frame: DetectionFrame) {
        let now = frame.frame_ts;

        let zones = if self.zones.enabled { Some(&self.zones) } else { None };
        let (events, new_tracks) = self.tracks.observe_frame(&frame, zones);

        if new_tracks > 0 {
            self.counter.record_detected(new_tracks);
        }

        for event in &events {
            self.apply_crossing(event);
        }

        if self.zones.enabled {
            self.route_gestures(&frame, now);

            if let Some(ticket_id) = self.tickets.close_expired_window(now) {
                self.emit_ticket_event("ready", &ticket_id, now);
            }

            self.run_assignment(now);
        }

        self.publish_snapshot(now);
    }

    /// Apply a guard presence transition from the external feed
    pub(crate) fn handle_guard_presence(&mut self, guard_id: GuardId, is_active: bool, now: u64) {
        info!(guard_id = %guard_id, is_active = %is_active, "guard_presence_changed");
        self.guards.set_presence(guard_id, is_active, now);

        if is_active {
            // Fresh capacity: try to assign the queue head
            self.run_assignment(now);
        } else {
            // A ticket mid-assignment under this guard fails immediately
            self.process_assigning(now);
        }

        self.publish_snapshot(now);
    }

    /// Cancel a ticket on external request
    ///
    /// Unknown ids fail the request; cancelling an already-terminal ticket
    /// is an idempotent no-op reporting the existing terminal status.
    pub(crate) fn handle_cancel(
        &mut self,
        ticket_id: &str,
        reason: &str,
        now: u64,
    ) -> Result<TicketStatus, EngineError> {
        if reason.trim().is_empty() {
            return Err(EngineError::EmptyReason);
        }

        let outcome = self.tickets.cancel(ticket_id, reason, now)?;
        if outcome.transitioned {
            info!(ticket_id = %ticket_id, reason = %reason, "ticket_cancelled");
            self.finalize_ticket(ticket_id, now);
            // The freed guard (if any) can take the next ticket
            self.run_assignment(now);
            self.publish_snapshot(now);
        } else {
            debug!(ticket_id = %ticket_id, status = %outcome.status.as_str(), "cancel_noop_terminal");
        }
        Ok(outcome.status)
    }

    /// Atomically replace the active zone configuration
    ///
    /// In-flight tickets created under the prior configuration are left
    /// untouched; track membership converges to the new rectangles through
    /// the normal debounce path on subsequent frames.
    pub(crate) fn handle_update_zones(
        &mut self,
        zones: ZoneSet,
        now: u64,
    ) -> Result<(), EngineError> {
        zones.validate()?;

        info!(
            enabled = %zones.enabled,
            examination_mode = %zones.examination_mode.as_str(),
            "zones_updated"
        );
        self.zones = zones;
        self.publish_snapshot(now);
        Ok(())
    }

    /// Zero all counters atomically; tickets, queue and guards are unaffected
    pub(crate) fn handle_reset_counters(&mut self, now: u64) {
        let prior = self.counter.reset();
        self.audit.write_counter_reset(&prior, now);

        if let Some(sender) = &self.egress {
            sender.send_ticket_event(TicketEventPayload {
                site: None,
                ts: now,
                t: "counter_reset".to_string(),
                tkid: None,
                members: Vec::new(),
                guard: None,
                reason: None,
            });
        }

        self.publish_snapshot(now);
    }

    /// Fixed escalation/housekeeping tick, independent of frame cadence
    pub(crate) fn tick(&mut self, now: u64) {
        // Lost tracks are force-exited so occupancy cannot stay stuck
        let expired = self.tracks.expire(now);
        for event in &expired {
            self.apply_crossing(event);
        }

        if let Some(ticket_id) = self.tickets.close_expired_window(now) {
            self.emit_ticket_event("ready", &ticket_id, now);
        }

        self.process_assigning(now);
        self.process_verify(now);

        let escalated = self.tickets.escalation_scan(now, &self.timeouts);
        for ticket_id in escalated {
            self.finalize_ticket(&ticket_id, now);
        }

        self.run_assignment(now);
        self.publish_snapshot(now);
    }

    /// Record a crossing on the counters and route it to ticket bookkeeping
    fn apply_crossing(&mut self, event: &CrossingEvent) {
        debug!(
            zone = %event.zone.as_str(),
            track_id = %event.track_id,
            entered = %event.entered,
            "zone_crossing"
        );

        if self.counter.apply(event) {
            self.metrics.record_crossing();
            if let Some(sender) = &self.egress {
                let counts = self.counter.counts();
                let current = match event.zone {
                    ZoneKind::GateArea => counts.current_in_gate,
                    ZoneKind::GuardAnchor => counts.current_in_anchor,
                };
                sender.send_crossing_event(CrossingEventPayload {
                    site: None,
                    ts: event.ts,
                    t: if event.entered { "entry" } else { "exit" }.to_string(),
                    zone: event.zone.as_str().to_string(),
                    tid: event.track_id.0,
                    current,
                });
            }
        } else {
            self.metrics.record_crossing_clamped();
        }

        match (event.zone, event.entered) {
            (ZoneKind::GateArea, true) => self.on_gate_entry(event.track_id, event.ts),
            (ZoneKind::GateArea, false) => self.on_gate_exit(event.track_id, event.ts),
            // Anchor crossings feed counters only; guard activity is driven
            // by the explicit presence signal
            (ZoneKind::GuardAnchor, _) => {}
        }
    }

    /// A track entered the gate area: open or join a ticket
    fn on_gate_entry(&mut self, track_id: TrackId, now: u64) {
        let mode = self.zones.examination_mode;
        match self.tickets.admit_entry(track_id, mode, self.coalesce_window_ms, now) {
            EntryOutcome::Created(ticket_id) => {
                self.totals.created += 1;
                self.metrics.record_ticket_created();
                self.emit_ticket_event("created", &ticket_id, now);
            }
            EntryOutcome::Joined(ticket_id) => {
                self.emit_ticket_event("member_joined", &ticket_id, now);
            }
            EntryOutcome::AlreadyTicketed(ticket_id) => {
                debug!(track_id = %track_id, ticket_id = %ticket_id, "entry_already_ticketed");
            }
        }
    }

    /// A track left the gate area: a waiting ticket whose members are all
    /// gone is cancelled rather than left to time out
    fn on_gate_exit(&mut self, track_id: TrackId, now: u64) {
        let Some(ticket_id) = self.tickets.ticket_for_track(track_id).map(str::to_string) else {
            return;
        };
        let Some(ticket) = self.tickets.get(&ticket_id) else {
            return;
        };
        if ticket.status != TicketStatus::Waiting {
            return;
        }

        let all_left = ticket.members.iter().all(|m| !self.tracks.is_in_gate(*m));
        if !all_left {
            return;
        }

        info!(ticket_id = %ticket_id, "ticket_members_left_gate");
        if let Some(ticket) = self.tickets.get_mut(&ticket_id) {
            ticket.cancel(REASON_MEMBERS_LEFT, now);
        }
        self.finalize_ticket(&ticket_id, now);
    }

    /// Route gesture sub-signals to tickets under active examination
    fn route_gestures(&mut self, frame: &DetectionFrame, now: u64) {
        for det in &frame.detections {
            let flags = det.gestures;
            if !(flags.hand_to_torso || flags.reach_gesture || flags.proximity) {
                continue;
            }

            let Some(ticket_id) = self.tickets.ticket_for_track(det.track_id).map(str::to_string)
            else {
                continue;
            };

            let mut completed = false;
            if let Some(ticket) = self.tickets.get_mut(&ticket_id) {
                if !ticket.status.is_examining() {
                    continue;
                }
                if ticket.body_check.observe(flags) {
                    let check = ticket.body_check;
                    ticket.push_event(TicketEvent::new(TicketEventType::Signal, now).with_extra(
                        &format!(
                            "hand={},reach={},prox={}",
                            check.hand_to_torso, check.reach_gesture, check.proximity
                        ),
                    ));
                }
                if self.scorer.completed(&ticket.body_check, ticket.mode) {
                    ticket.complete_check(now);
                    completed = true;
                }
            }

            if completed {
                info!(ticket_id = %ticket_id, "body_check_complete");
                self.emit_ticket_event("check_complete", &ticket_id, now);
            }
        }
    }

    /// Drive tickets through the `assigning` state
    ///
    /// A guard that stayed active through the acceptance delay accepts; a
    /// guard that went inactive fails the assignment, returning the ticket
    /// to the queue (it keeps its seniority) and starting the cool-down.
    pub(crate) fn process_assigning(&mut self, now: u64) {
        let assigning: Vec<(String, Option<GuardId>)> = self
            .tickets
            .iter()
            .filter(|t| t.status == TicketStatus::Assigning)
            .map(|t| (t.id.clone(), t.assigned_guard.clone()))
            .collect();

        for (ticket_id, guard) in assigning {
            let Some(guard_id) = guard else {
                // Assigning without a guard cannot happen through normal
                // transitions; route it to escalated instead of crashing
                warn!(ticket_id = %ticket_id, "assigning_without_guard");
                if let Some(ticket) = self.tickets.get_mut(&ticket_id) {
                    ticket.escalate(REASON_INVARIANT_VIOLATION, now);
                }
                self.finalize_ticket(&ticket_id, now);
                continue;
            };

            if !self.guards.is_active(&guard_id) {
                info!(ticket_id = %ticket_id, guard_id = %guard_id, "assignment_failed");
                if let Some(ticket) = self.tickets.get_mut(&ticket_id) {
                    ticket.assignment_failed(now);
                }
                self.guards.start_cooldown(&guard_id, now + self.assign_policy.cooldown_ms);
                self.emit_ticket_event("assign_failed", &ticket_id, now);
                continue;
            }

            let accepted = self
                .tickets
                .get(&ticket_id)
                .map(|t| now.saturating_sub(t.state_entered_at) >= self.assign_policy.accept_delay_ms)
                .unwrap_or(false);
            if accepted {
                if let Some(ticket) = self.tickets.get_mut(&ticket_id) {
                    ticket.accept(now);
                }
                info!(ticket_id = %ticket_id, guard_id = %guard_id, "ticket_accepted");
                self.emit_ticket_event("accepted", &ticket_id, now);
            }
        }
    }

    /// Auto-confirm `verify` tickets whose guard stayed active through the
    /// confirmation window
    pub(crate) fn process_verify(&mut self, now: u64) {
        let confirmable: Vec<String> = self
            .tickets
            .iter()
            .filter(|t| t.status == TicketStatus::Verify)
            .filter(|t| now.saturating_sub(t.state_entered_at) >= self.timeouts.verify_confirm_ms)
            .filter(|t| {
                t.assigned_guard.as_ref().map(|g| self.guards.is_active(g)).unwrap_or(false)
            })
            .map(|t| t.id.clone())
            .collect();

        for ticket_id in confirmable {
            if let Some(ticket) = self.tickets.get_mut(&ticket_id) {
                ticket.confirm(now);
            }
            info!(ticket_id = %ticket_id, "ticket_checked");
            self.finalize_ticket(&ticket_id, now);
        }
    }

    /// Assign queue-head tickets to idle guards
    pub(crate) fn run_assignment(&mut self, now: u64) {
        let idle = self.guards.idle(now);
        if idle.is_empty() {
            return;
        }

        let queue = crate::services::ticket_queue::build_queue(
            self.tickets.waiting_ready(),
            &self.queue_policy,
            now,
        );
        let mut queue_iter = queue.into_iter();

        for guard_id in idle {
            let Some(ticket_id) = queue_iter.next() else { break };
            if let Some(ticket) = self.tickets.get_mut(&ticket_id) {
                ticket.assign(guard_id.clone(), now);
            }
            self.guards.hold(&guard_id, &ticket_id);
            info!(ticket_id = %ticket_id, guard_id = %guard_id, "ticket_assigned");
            self.emit_ticket_event("assigned", &ticket_id, now);
        }
    }

    /// Move a terminal ticket out of live state: free its guard, audit it,
    /// publish the terminal event, and bump totals
    pub(crate) fn finalize_ticket(&mut self, ticket_id: &str, now: u64) {
        // Every caller passes a terminal ticket; anything else is routed to
        // escalated so the transition stays total
        if let Some(ticket) = self.tickets.get_mut(ticket_id) {
            if !ticket.status.is_terminal() {
                warn!(ticket_id = %ticket_id, status = %ticket.status.as_str(), "finalize_non_terminal");
                ticket.escalate(REASON_INVARIANT_VIOLATION, now);
            }
        }

        let Some(ticket) = self.tickets.retire(ticket_id) else {
            return;
        };
        self.guards.release_ticket(ticket_id);

        match ticket.status {
            TicketStatus::Checked => {
                self.totals.checked += 1;
                self.metrics.record_ticket_checked();
                self.counter.record_passed(ticket.members.len() as u64);
            }
            TicketStatus::Escalated => {
                self.totals.escalated += 1;
                self.metrics.record_ticket_escalated();
            }
            TicketStatus::Cancelled => {
                self.totals.cancelled += 1;
                self.metrics.record_ticket_cancelled();
            }
            _ => {}
        }

        self.audit.write_ticket(&ticket);

        if let Some(sender) = &self.egress {
            sender.send_ticket_event(TicketEventPayload {
                site: None,
                ts: now,
                t: ticket.status.as_str().to_string(),
                tkid: Some(ticket.id.clone()),
                members: ticket.members.iter().map(|t| t.0).collect(),
                guard: ticket.assigned_guard.as_ref().map(|g| g.0.clone()),
                reason: ticket.escalated_reason.clone().or_else(|| ticket.cancel_reason.clone()),
            });
        }

        info!(
            ticket_id = %ticket.id,
            status = %ticket.status.as_str(),
            members = %ticket.members.len(),
            "ticket_closed"
        );
    }

    /// Publish a ticket lifecycle event for a live ticket
    fn emit_ticket_event(&self, kind: &str, ticket_id: &str, now: u64) {
        let Some(sender) = &self.egress else { return };
        let Some(ticket) = self.tickets.get(ticket_id) else { return };

        sender.send_ticket_event(TicketEventPayload {
            site: None,
            ts: now,
            t: kind.to_string(),
            tkid: Some(ticket.id.clone()),
            members: ticket.members.iter().map(|t| t.0).collect(),
            guard: ticket.assigned_guard.as_ref().map(|g| g.0.clone()),
            reason: ticket.escalated_reason.clone().or_else(|| ticket.cancel_reason.clone()),
        });
    }
}
