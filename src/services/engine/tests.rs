//! Tests for the Engine module
//!
//! All tests drive the synchronous handlers directly with synthetic
//! timestamps, so no test depends on wall-clock time or sleeping.

use super::*;
use crate::domain::ticket::{
    TicketStatus, REASON_CHECK_TIMEOUT, REASON_MEMBERS_LEFT, REASON_VERIFY_TIMEOUT,
    REASON_WAIT_TIMEOUT,
};
use crate::domain::types::{Detection, DetectionFrame, GestureFlags, GuardId, TrackId};
use crate::domain::zone::{ExaminationMode, Point, Zone};
use crate::infra::config::Config;

/// Test harness that owns the temp dir backing the audit file
struct TestEngine {
    engine: Engine,
    audit_path: std::path::PathBuf,
    #[allow(dead_code)]
    audit_dir: tempfile::TempDir,
}

impl TestEngine {
    /// Full audit file contents (empty string if nothing was written yet)
    fn audit_contents(&self) -> String {
        std::fs::read_to_string(&self.audit_path).unwrap_or_default()
    }
}

impl std::ops::Deref for TestEngine {
    type Target = Engine;
    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

impl std::ops::DerefMut for TestEngine {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.engine
    }
}

fn create_engine_with_config(config: Config) -> TestEngine {
    let audit_dir = tempfile::tempdir().unwrap();
    let audit_path = audit_dir.path().join("tickets.jsonl");
    let config = config.with_audit_file(audit_path.to_str().unwrap());

    let metrics = Arc::new(Metrics::new());
    let slot = Arc::new(SnapshotSlot::new());
    let engine = Engine::new(&config, metrics, None, slot);
    TestEngine { engine, audit_path, audit_dir }
}

/// Fast-reacting config: flips confirmed on the first frame, long grace so
/// tracks only die when a test wants them to
fn fast_config() -> Config {
    Config::default()
        .with_debounce_frames(1)
        .with_track_grace_ms(1_000_000)
        .with_accept_delay_ms(100)
        .with_verify_confirm_ms(100)
}

/// Centroid positions relative to the default zone set
const IN_GATE: (f64, f64) = (0.5, 0.5);
const IN_ANCHOR: (f64, f64) = (0.85, 0.5);
const OUTSIDE: (f64, f64) = (0.05, 0.05);

fn detection(track_id: i64, (x, y): (f64, f64)) -> Detection {
    Detection {
        track_id: TrackId(track_id),
        class_name: "person".to_string(),
        confidence: 0.9,
        centroid: Point { x, y },
        gestures: GestureFlags::default(),
    }
}

fn detection_with_gestures(track_id: i64, pos: (f64, f64), gestures: GestureFlags) -> Detection {
    Detection { gestures, ..detection(track_id, pos) }
}

fn frame(ts: u64, detections: Vec<Detection>) -> DetectionFrame {
    DetectionFrame { frame_ts: ts, received_at: Instant::now(), detections }
}

fn all_gestures() -> GestureFlags {
    GestureFlags { hand_to_torso: true, reach_gesture: true, proximity: true }
}

/// The single open ticket's id, for tests that create exactly one
fn sole_ticket_id(engine: &Engine) -> String {
    let mut ids: Vec<String> = engine.tickets.iter().map(|t| t.id.clone()).collect();
    assert_eq!(ids.len(), 1, "expected exactly one open ticket");
    ids.remove(0)
}

#[test]
fn test_gate_entry_creates_waiting_ticket() {
    let mut engine = create_engine_with_config(fast_config());

    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));

    let id = sole_ticket_id(&engine);
    let ticket = engine.tickets.get(&id).unwrap();
    assert_eq!(ticket.status, TicketStatus::Waiting);
    assert_eq!(ticket.members.as_slice(), &[TrackId(1)]);
    assert_eq!(ticket.ready_at, Some(1000));

    let snapshot = engine.snapshot(1000);
    assert_eq!(snapshot.queue, vec![id]);
    assert_eq!(snapshot.object_counts.gate_entries, 1);
    assert_eq!(snapshot.object_counts.current_in_gate, 1);
}

#[test]
fn test_debounce_rejects_single_frame_anchor_flicker() {
    // Default debounce requires 3 consecutive frames
    let mut engine =
        create_engine_with_config(Config::default().with_track_grace_ms(1_000_000));

    engine.handle_frame(frame(1000, vec![detection(9, IN_ANCHOR)]));
    engine.handle_frame(frame(1100, vec![detection(9, OUTSIDE)]));
    engine.handle_frame(frame(1200, vec![detection(9, OUTSIDE)]));

    assert_eq!(engine.counter.counts().anchor_entries, 0);
    assert_eq!(engine.counter.counts().current_in_anchor, 0);
}

#[test]
fn test_sustained_membership_counts_once() {
    let mut engine =
        create_engine_with_config(Config::default().with_track_grace_ms(1_000_000));

    for i in 0..5 {
        engine.handle_frame(frame(1000 + i * 100, vec![detection(9, IN_ANCHOR)]));
    }

    let counts = engine.counter.counts();
    assert_eq!(counts.anchor_entries, 1);
    assert_eq!(counts.current_in_anchor, 1);
}

#[test]
fn test_occupancy_identity_holds_across_sequence() {
    let mut engine = create_engine_with_config(fast_config());

    let frames = vec![
        frame(1000, vec![detection(1, IN_GATE)]),
        frame(1100, vec![detection(1, IN_GATE), detection(2, IN_GATE)]),
        frame(1200, vec![detection(1, OUTSIDE), detection(2, IN_GATE)]),
        frame(1300, vec![detection(2, OUTSIDE)]),
        frame(1400, vec![detection(3, IN_GATE)]),
    ];

    for f in frames {
        let ts = f.frame_ts;
        engine.handle_frame(f);
        let counts = engine.snapshot(ts).object_counts;
        assert_eq!(counts.current_in_gate, counts.gate_entries - counts.gate_exits);
    }

    let counts = engine.counter.counts();
    assert_eq!(counts.gate_entries, 3);
    assert_eq!(counts.gate_exits, 2);
    assert_eq!(counts.current_in_gate, 1);
    assert_eq!(counts.total_detected, 3);
}

#[test]
fn test_track_grace_expiry_force_exits() {
    let mut engine = create_engine_with_config(
        Config::default().with_debounce_frames(1).with_track_grace_ms(2000),
    );

    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));
    assert_eq!(engine.counter.counts().current_in_gate, 1);

    // Still within grace: nothing changes
    engine.tick(2500);
    assert_eq!(engine.counter.counts().current_in_gate, 1);

    // Past grace: forced exit keeps occupancy exact
    engine.tick(3500);
    let counts = engine.counter.counts();
    assert_eq!(counts.gate_exits, 1);
    assert_eq!(counts.current_in_gate, 0);
    assert_eq!(engine.active_tracks(), 0);
}

#[test]
fn test_track_has_at_most_one_open_ticket() {
    let mut engine = create_engine_with_config(fast_config());

    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));
    // Repeated frames inside do not open more tickets
    engine.handle_frame(frame(1100, vec![detection(1, IN_GATE)]));
    engine.handle_frame(frame(1200, vec![detection(1, IN_GATE)]));
    assert_eq!(engine.open_tickets(), 1);

    // Leaving cancels the waiting ticket; re-entering opens a fresh one
    engine.handle_frame(frame(1300, vec![detection(1, OUTSIDE)]));
    assert_eq!(engine.open_tickets(), 0);
    assert_eq!(engine.totals.cancelled, 1);

    engine.handle_frame(frame(1400, vec![detection(1, IN_GATE)]));
    assert_eq!(engine.open_tickets(), 1);
    assert_eq!(engine.totals.created, 2);
}

#[test]
fn test_waiting_ticket_cancelled_when_members_leave() {
    let mut engine = create_engine_with_config(fast_config());

    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));
    let id = sole_ticket_id(&engine);

    engine.handle_frame(frame(1500, vec![detection(1, OUTSIDE)]));

    assert!(engine.tickets.get(&id).is_none());
    let outcome = engine.cancel_ticket(&id, "late request", 2000).unwrap();
    assert_eq!(outcome, TicketStatus::Cancelled);

    // The auto-cancel recorded the machine-readable reason in the audit
    let snapshot = engine.snapshot(2000);
    assert_eq!(snapshot.statistics.tickets_cancelled, 1);
    assert!(engine.audit_contents().contains(REASON_MEMBERS_LEFT));
}

#[test]
fn test_batch_mode_coalesces_three_tracks_into_one_ticket() {
    let config = fast_config()
        .with_examination_mode(ExaminationMode::Batch)
        .with_coalesce_window_ms(1500);
    let mut engine = create_engine_with_config(config);

    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));
    engine.handle_frame(frame(1200, vec![detection(1, IN_GATE), detection(2, IN_GATE)]));
    engine.handle_frame(frame(
        1400,
        vec![detection(1, IN_GATE), detection(2, IN_GATE), detection(3, IN_GATE)],
    ));

    let id = sole_ticket_id(&engine);
    let ticket = engine.tickets.get(&id).unwrap();
    assert_eq!(ticket.members.as_slice(), &[TrackId(1), TrackId(2), TrackId(3)]);
    assert!(ticket.ready_at.is_none());

    // Window closes at 2500; one guard becomes idle and takes the ticket
    engine.tick(2600);
    engine.handle_guard_presence(GuardId::from("g1"), true, 2700);

    let ticket = engine.tickets.get(&id).unwrap();
    assert_eq!(ticket.status, TicketStatus::Assigning);
    assert_eq!(ticket.assigned_guard, Some(GuardId::from("g1")));
    assert_eq!(ticket.ready_at, Some(2500));
    assert_eq!(engine.open_tickets(), 1);
}

#[test]
fn test_batch_late_arrival_gets_new_ticket() {
    let config = fast_config()
        .with_examination_mode(ExaminationMode::Batch)
        .with_coalesce_window_ms(1500);
    let mut engine = create_engine_with_config(config);

    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));
    // After the window closed at 2500
    engine.handle_frame(frame(3000, vec![detection(1, IN_GATE), detection(2, IN_GATE)]));

    assert_eq!(engine.open_tickets(), 2);
}

#[test]
fn test_wait_timeout_escalates_with_reason() {
    let config = fast_config().with_wait_timeout_ms(5000);
    let mut engine = create_engine_with_config(config);

    engine.handle_frame(frame(1000, vec![detection(4, IN_GATE)]));
    let id = sole_ticket_id(&engine);

    // Person keeps standing in the gate; no guard ever shows up
    for i in 1..=5 {
        engine.handle_frame(frame(1000 + i * 1000, vec![detection(4, IN_GATE)]));
    }

    engine.tick(6200);

    assert!(engine.tickets.get(&id).is_none());
    assert_eq!(engine.totals.escalated, 1);
    assert!(engine.audit_contents().contains(REASON_WAIT_TIMEOUT));

    // Idempotent cancel on the escalated ticket reports the terminal state
    let status = engine.cancel_ticket(&id, "too late", 6500).unwrap();
    assert_eq!(status, TicketStatus::Escalated);
}

#[test]
fn test_cancel_is_idempotent_and_unknown_fails() {
    let mut engine = create_engine_with_config(fast_config());

    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));
    let id = sole_ticket_id(&engine);

    let first = engine.cancel_ticket(&id, "operator_request", 2000).unwrap();
    assert_eq!(first, TicketStatus::Cancelled);
    assert_eq!(engine.open_tickets(), 0);

    let second = engine.cancel_ticket(&id, "operator_request", 3000).unwrap();
    assert_eq!(second, TicketStatus::Cancelled);
    assert_eq!(engine.totals.cancelled, 1);

    let err = engine.cancel_ticket("bogus-id", "whatever", 3000).unwrap_err();
    assert!(matches!(err, EngineError::UnknownTicket(_)));

    let err = engine.cancel_ticket(&id, "  ", 3000).unwrap_err();
    assert!(matches!(err, EngineError::EmptyReason));
}

#[test]
fn test_fifo_assignment_order() {
    let mut engine = create_engine_with_config(fast_config());

    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));
    engine.handle_frame(frame(2000, vec![detection(1, IN_GATE), detection(2, IN_GATE)]));
    assert_eq!(engine.open_tickets(), 2);

    engine.handle_guard_presence(GuardId::from("g1"), true, 3000);

    // The older ticket (track 1, ready at 1000) is assigned first
    let assigned: Vec<TrackId> = engine
        .tickets
        .iter()
        .filter(|t| t.status == TicketStatus::Assigning)
        .flat_map(|t| t.members.iter().copied())
        .collect();
    assert_eq!(assigned, vec![TrackId(1)]);

    let waiting: Vec<TrackId> = engine
        .tickets
        .iter()
        .filter(|t| t.status == TicketStatus::Waiting)
        .flat_map(|t| t.members.iter().copied())
        .collect();
    assert_eq!(waiting, vec![TrackId(2)]);
}

#[test]
fn test_critical_wait_beats_preferred_priority_class() {
    // Batch is the preferred class, but an old sequential ticket past the
    // critical threshold must be assigned first
    let config = fast_config()
        .with_mode_priority(vec![ExaminationMode::Batch, ExaminationMode::Sequential])
        .with_coalesce_window_ms(500);
    let mut engine = create_engine_with_config(config);

    // Sequential ticket, ready at 1000
    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));

    // Switch to batch mode; track 2 arrives much later
    let mut zones = engine.zones.clone();
    zones.examination_mode = ExaminationMode::Batch;
    engine.handle_update_zones(zones, 2000).unwrap();

    engine.handle_frame(frame(50_000, vec![detection(1, IN_GATE), detection(2, IN_GATE)]));
    engine.tick(50_600); // closes the batch window at 50_500

    // Sequential ticket has waited 49_600ms >= 45_000 critical threshold
    engine.handle_guard_presence(GuardId::from("g1"), true, 50_700);

    let assigning: Vec<&crate::domain::ticket::Ticket> =
        engine.tickets.iter().filter(|t| t.status == TicketStatus::Assigning).collect();
    assert_eq!(assigning.len(), 1);
    assert_eq!(assigning[0].mode, ExaminationMode::Sequential);
    assert_eq!(assigning[0].members.as_slice(), &[TrackId(1)]);
}

#[test]
fn test_full_lifecycle_reaches_checked() {
    let mut engine = create_engine_with_config(fast_config());

    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));
    let id = sole_ticket_id(&engine);

    engine.handle_guard_presence(GuardId::from("g1"), true, 1100);
    assert_eq!(engine.tickets.get(&id).unwrap().status, TicketStatus::Assigning);

    // Guard stays active through the acceptance delay
    engine.tick(1300);
    assert_eq!(engine.tickets.get(&id).unwrap().status, TicketStatus::InCheck);

    // All gesture signals arrive in one frame
    engine.handle_frame(frame(
        1400,
        vec![detection_with_gestures(1, IN_GATE, all_gestures())],
    ));
    assert_eq!(engine.tickets.get(&id).unwrap().status, TicketStatus::Verify);

    // Confirmation window passes with the guard still active
    engine.tick(1600);

    assert!(engine.tickets.get(&id).is_none());
    assert_eq!(engine.totals.checked, 1);
    assert_eq!(engine.counter.counts().total_passed, 1);

    // Guard is free again
    let snapshot = engine.snapshot(1700);
    assert!(snapshot.guards["g1"].current_ticket.is_none());
}

#[test]
fn test_gesture_signals_latch_across_frames() {
    let mut engine = create_engine_with_config(fast_config());

    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));
    let id = sole_ticket_id(&engine);
    engine.handle_guard_presence(GuardId::from("g1"), true, 1100);
    engine.tick(1300);

    // Signals arrive one at a time, with a signal-free frame in between
    engine.handle_frame(frame(
        1400,
        vec![detection_with_gestures(
            1,
            IN_GATE,
            GestureFlags { hand_to_torso: true, ..Default::default() },
        )],
    ));
    engine.handle_frame(frame(1500, vec![detection(1, IN_GATE)]));
    engine.handle_frame(frame(
        1600,
        vec![detection_with_gestures(
            1,
            IN_GATE,
            GestureFlags { reach_gesture: true, ..Default::default() },
        )],
    ));
    assert_eq!(engine.tickets.get(&id).unwrap().status, TicketStatus::InCheck);

    engine.handle_frame(frame(
        1700,
        vec![detection_with_gestures(
            1,
            IN_GATE,
            GestureFlags { proximity: true, ..Default::default() },
        )],
    ));
    assert_eq!(engine.tickets.get(&id).unwrap().status, TicketStatus::Verify);
}

#[test]
fn test_failed_assignment_returns_to_queue_with_cooldown() {
    let mut engine = create_engine_with_config(fast_config());

    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));
    let id = sole_ticket_id(&engine);

    engine.handle_guard_presence(GuardId::from("g1"), true, 1100);
    assert_eq!(engine.tickets.get(&id).unwrap().status, TicketStatus::Assigning);

    // Guard walks away before accepting
    engine.handle_guard_presence(GuardId::from("g1"), false, 1150);

    let ticket = engine.tickets.get(&id).unwrap();
    assert_eq!(ticket.status, TicketStatus::Waiting);
    assert!(ticket.assigned_guard.is_none());
    // Seniority preserved for the next assignment round
    assert_eq!(ticket.ready_at, Some(1000));

    // The returning guard is in cool-down, so nothing is assigned yet
    engine.handle_guard_presence(GuardId::from("g1"), true, 1200);
    assert_eq!(engine.tickets.get(&id).unwrap().status, TicketStatus::Waiting);

    // A different guard picks it up immediately
    engine.handle_guard_presence(GuardId::from("g2"), true, 1300);
    let ticket = engine.tickets.get(&id).unwrap();
    assert_eq!(ticket.status, TicketStatus::Assigning);
    assert_eq!(ticket.assigned_guard, Some(GuardId::from("g2")));

    // After the cool-down, g1 is assignable again
    engine.handle_frame(frame(7000, vec![detection(1, IN_GATE), detection(2, IN_GATE)]));
    engine.tick(7200);
    let assigned_guards: Vec<_> = engine
        .tickets
        .iter()
        .filter_map(|t| t.assigned_guard.clone())
        .collect();
    assert!(assigned_guards.contains(&GuardId::from("g1")));
}

#[test]
fn test_check_timeout_escalates() {
    let config = fast_config().with_check_timeout_ms(2000);
    let mut engine = create_engine_with_config(config);

    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));
    let id = sole_ticket_id(&engine);
    engine.handle_guard_presence(GuardId::from("g1"), true, 1100);
    engine.tick(1300);
    assert_eq!(engine.tickets.get(&id).unwrap().status, TicketStatus::InCheck);

    // No gestures ever complete; the check times out
    engine.tick(3500);

    assert!(engine.tickets.get(&id).is_none());
    assert_eq!(engine.totals.escalated, 1);
    assert!(engine.audit_contents().contains(REASON_CHECK_TIMEOUT));
}

#[test]
fn test_verify_timeout_when_guard_leaves() {
    let config = fast_config().with_verify_confirm_ms(5000).with_verify_timeout_ms(1000);
    let mut engine = create_engine_with_config(config);

    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));
    let id = sole_ticket_id(&engine);
    engine.handle_guard_presence(GuardId::from("g1"), true, 1100);
    engine.tick(1300);
    engine.handle_frame(frame(
        1400,
        vec![detection_with_gestures(1, IN_GATE, all_gestures())],
    ));
    assert_eq!(engine.tickets.get(&id).unwrap().status, TicketStatus::Verify);

    // Guard disappears, so confirmation never happens and verify times out
    engine.handle_guard_presence(GuardId::from("g1"), false, 1500);
    engine.tick(2600);

    assert!(engine.tickets.get(&id).is_none());
    assert_eq!(engine.totals.escalated, 1);
    assert!(engine.audit_contents().contains(REASON_VERIFY_TIMEOUT));
}

#[test]
fn test_counter_reset_leaves_tickets_and_queue_intact() {
    let mut engine = create_engine_with_config(fast_config());

    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE), detection(2, IN_GATE)]));
    engine.handle_guard_presence(GuardId::from("g1"), true, 1100);
    engine.tick(1300);

    let open_before = engine.open_tickets();
    let queue_before = engine.snapshot(1400).queue;
    assert!(engine.counter.counts().gate_entries > 0);

    engine.handle_reset_counters(1500);

    assert_eq!(engine.counter.counts(), crate::services::crossing::ObjectCounts::default());
    assert_eq!(engine.open_tickets(), open_before);
    assert_eq!(engine.snapshot(1600).queue, queue_before);
    // Ticket states were untouched
    assert!(engine.tickets.iter().any(|t| t.status == TicketStatus::InCheck));
}

#[test]
fn test_invalid_zone_update_leaves_state_unchanged() {
    let mut engine = create_engine_with_config(fast_config());
    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));

    let zones_before = engine.zones.clone();
    let mut bad = zones_before.clone();
    bad.gate_area = Zone { x: 0.9, y: 0.9, width: 0.5, height: 0.5 };

    let err = engine.handle_update_zones(bad, 2000).unwrap_err();
    assert!(matches!(err, EngineError::InvalidZones(_)));

    assert_eq!(engine.zones.gate_area, zones_before.gate_area);
    assert_eq!(engine.open_tickets(), 1);
}

#[test]
fn test_zone_update_preserves_in_flight_tickets() {
    let mut engine = create_engine_with_config(fast_config());
    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));
    let id = sole_ticket_id(&engine);

    let mut zones = engine.zones.clone();
    zones.gate_area = Zone { x: 0.1, y: 0.1, width: 0.2, height: 0.2 };
    engine.handle_update_zones(zones, 2000).unwrap();

    assert!(engine.tickets.get(&id).is_some());
    assert_eq!(engine.tickets.get(&id).unwrap().status, TicketStatus::Waiting);
}

#[test]
fn test_disabled_zones_produce_no_crossings_or_tickets() {
    let mut zones = crate::domain::zone::ZoneSet::default();
    zones.enabled = false;
    let mut engine = create_engine_with_config(fast_config().with_zones(zones));

    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE), detection(2, IN_ANCHOR)]));

    assert_eq!(engine.open_tickets(), 0);
    let counts = engine.counter.counts();
    assert_eq!(counts.gate_entries, 0);
    assert_eq!(counts.anchor_entries, 0);
    // Liveness is still tracked
    assert_eq!(engine.active_tracks(), 2);
}

#[test]
fn test_every_ticket_eventually_terminal() {
    // Aggressive timeouts so everything breaches quickly
    let config = fast_config()
        .with_wait_timeout_ms(1000)
        .with_check_timeout_ms(1000)
        .with_verify_timeout_ms(1000)
        .with_verify_confirm_ms(10_000);
    let mut engine = create_engine_with_config(config);

    // A waiting ticket with no guard, an in-check ticket, and a verify ticket
    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));
    engine.handle_guard_presence(GuardId::from("g1"), true, 1000);
    engine.tick(1200);
    engine.handle_frame(frame(
        1300,
        vec![detection_with_gestures(1, IN_GATE, all_gestures()), detection(2, IN_GATE)],
    ));
    engine.handle_frame(frame(1400, vec![detection(3, IN_GATE)]));
    assert!(engine.open_tickets() >= 2);

    // Advance simulated time well past every timeout
    let mut now = 2000;
    for _ in 0..10 {
        now += 1000;
        engine.tick(now);
    }

    assert_eq!(engine.open_tickets(), 0);
    let totals = engine.totals;
    assert_eq!(totals.created, totals.checked + totals.escalated + totals.cancelled);
}

#[test]
fn test_snapshot_is_point_in_time_copy() {
    let mut engine = create_engine_with_config(fast_config());
    engine.handle_frame(frame(1000, vec![detection(1, IN_GATE)]));

    let slot = engine.snapshot_slot.clone();
    let before = slot.load();

    engine.handle_frame(frame(2000, vec![detection(2, IN_GATE)]));

    // The earlier Arc still shows the old state; the slot has the new one
    assert_eq!(before.tickets.len(), 1);
    assert_eq!(slot.load().tickets.len(), 2);
}
