//! Track state store - per-track zone occupancy derived from centroids
//!
//! Membership flips are debounced: a zone transition only counts after the
//! new raw state has been observed for `debounce_frames` consecutive frames,
//! so single-frame detection flicker never produces a crossing. Tracks that
//! stop being detected keep their membership until the grace period expires,
//! at which point they are force-exited from every zone they occupy.

use crate::domain::types::{DetectionFrame, TrackId};
use crate::domain::zone::{Point, ZoneKind, ZoneSet};
use rustc_hash::FxHashMap;
use tracing::debug;

/// A zone crossing detected for one track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossingEvent {
    pub zone: ZoneKind,
    pub track_id: TrackId,
    pub entered: bool,
    pub ts: u64,
}

/// Debounced membership state for one zone
#[derive(Debug, Clone, Copy, Default)]
struct ZoneOccupancy {
    confirmed: bool,
    candidate: bool,
    streak: u32,
}

impl ZoneOccupancy {
    /// Feed one raw observation; returns the new confirmed state on a flip
    fn observe(&mut self, raw: bool, debounce_frames: u32) -> Option<bool> {
        if raw == self.confirmed {
            self.candidate = raw;
            self.streak = 0;
            return None;
        }
        if self.candidate == raw {
            self.streak += 1;
        } else {
            self.candidate = raw;
            self.streak = 1;
        }
        if self.streak >= debounce_frames {
            self.confirmed = raw;
            self.streak = 0;
            return Some(raw);
        }
        None
    }
}

/// One tracked object
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub centroid: Point,
    pub last_seen_ms: u64,
    gate: ZoneOccupancy,
    anchor: ZoneOccupancy,
}

impl Track {
    fn new(id: TrackId, centroid: Point, now: u64) -> Self {
        Self {
            id,
            centroid,
            last_seen_ms: now,
            gate: ZoneOccupancy::default(),
            anchor: ZoneOccupancy::default(),
        }
    }

    pub fn in_gate(&self) -> bool {
        self.gate.confirmed
    }

    pub fn in_anchor(&self) -> bool {
        self.anchor.confirmed
    }
}

/// Per-track occupancy store
pub struct TrackStore {
    tracks: FxHashMap<TrackId, Track>,
    debounce_frames: u32,
    grace_ms: u64,
}

impl TrackStore {
    pub fn new(debounce_frames: u32, grace_ms: u64) -> Self {
        Self { tracks: FxHashMap::default(), debounce_frames: debounce_frames.max(1), grace_ms }
    }

    /// Ingest one frame's detections
    ///
    /// With `zones = None` (zone set disabled) only track liveness is
    /// refreshed; no membership is evaluated and no events are emitted.
    /// Returns the crossing events plus the number of previously unseen
    /// tracks in this frame.
    pub fn observe_frame(
        &mut self,
        frame: &DetectionFrame,
        zones: Option<&ZoneSet>,
    ) -> (Vec<CrossingEvent>, u64) {
        let mut events = Vec::new();
        let mut new_tracks = 0u64;
        let now = frame.frame_ts;

        for det in &frame.detections {
            let track = self.tracks.entry(det.track_id).or_insert_with(|| {
                new_tracks += 1;
                debug!(track_id = %det.track_id, "track_created");
                Track::new(det.track_id, det.centroid, now)
            });
            track.centroid = det.centroid;
            track.last_seen_ms = now;

            let Some(zones) = zones else { continue };

            let raw_gate = zones.gate_area.contains(det.centroid);
            if let Some(entered) = track.gate.observe(raw_gate, self.debounce_frames) {
                events.push(CrossingEvent {
                    zone: ZoneKind::GateArea,
                    track_id: det.track_id,
                    entered,
                    ts: now,
                });
            }

            let raw_anchor = zones.guard_anchor.contains(det.centroid);
            if let Some(entered) = track.anchor.observe(raw_anchor, self.debounce_frames) {
                events.push(CrossingEvent {
                    zone: ZoneKind::GuardAnchor,
                    track_id: det.track_id,
                    entered,
                    ts: now,
                });
            }
        }

        (events, new_tracks)
    }

    /// Drop tracks unseen for the grace period, force-exiting occupied zones
    /// so occupancy counts cannot stay stuck on lost tracks.
    pub fn expire(&mut self, now: u64) -> Vec<CrossingEvent> {
        let grace_ms = self.grace_ms;
        let mut events = Vec::new();

        self.tracks.retain(|id, track| {
            if now.saturating_sub(track.last_seen_ms) <= grace_ms {
                return true;
            }
            if track.gate.confirmed {
                events.push(CrossingEvent {
                    zone: ZoneKind::GateArea,
                    track_id: *id,
                    entered: false,
                    ts: now,
                });
            }
            if track.anchor.confirmed {
                events.push(CrossingEvent {
                    zone: ZoneKind::GuardAnchor,
                    track_id: *id,
                    entered: false,
                    ts: now,
                });
            }
            debug!(track_id = %id, "track_expired");
            false
        });

        // Deterministic event order regardless of map iteration
        events.sort_by_key(|e| (e.track_id, e.zone != ZoneKind::GateArea));
        events
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// Confirmed gate membership; unknown tracks count as outside
    pub fn is_in_gate(&self, id: TrackId) -> bool {
        self.tracks.get(&id).map(|t| t.in_gate()).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
