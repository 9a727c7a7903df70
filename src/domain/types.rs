//! Shared types for the gatecheck engine

use crate::domain::ticket::TicketStatus;
use crate::domain::zone::{Point, ZoneConfigError, ZoneSet};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::oneshot;

/// Newtype wrapper for track IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TrackId(pub i64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for guard IDs to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct GuardId(pub String);

impl std::fmt::Display for GuardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GuardId {
    fn from(s: &str) -> Self {
        GuardId(s.to_string())
    }
}

/// Detector message structure for parsing
#[derive(Debug, Deserialize)]
pub struct DetectorMessage {
    pub frames: Vec<WireFrame>,
}

#[derive(Debug, Deserialize)]
pub struct WireFrame {
    /// Timestamp - can be ISO 8601 string or epoch milliseconds integer
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub time: TimestampValue,
    #[serde(default)]
    pub detections: Vec<WireDetection>,
}

/// Timestamp that can be either ISO 8601 string or epoch milliseconds
#[derive(Debug, Clone, Default)]
pub enum TimestampValue {
    #[default]
    None,
    IsoString(String),
    EpochMs(u64),
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<TimestampValue, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct TimestampVisitor;

    impl<'de> Visitor<'de> for TimestampVisitor {
        type Value = TimestampValue;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer timestamp")
        }

        fn visit_str<E>(self, value: &str) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::IsoString(value.to_string()))
        }

        fn visit_string<E>(self, value: String) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::IsoString(value))
        }

        fn visit_u64<E>(self, value: u64) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::EpochMs(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            let epoch_ms = u64::try_from(value).unwrap_or(0);
            Ok(TimestampValue::EpochMs(epoch_ms))
        }
    }

    deserializer.deserialize_any(TimestampVisitor)
}

/// One detection within a wire frame
#[derive(Debug, Deserialize)]
pub struct WireDetection {
    pub track_id: i64,
    #[serde(rename = "class")]
    pub class_name: String,
    #[serde(default)]
    pub confidence: f64,
    pub bbox: WireBBox,
    #[serde(default)]
    pub gestures: Option<WireGestures>,
}

/// Axis-aligned bounding box in normalized [0,1] frame coordinates
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WireBBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl WireBBox {
    /// Box centroid, used for zone containment tests
    pub fn centroid(&self) -> Point {
        Point { x: self.x + self.w / 2.0, y: self.y + self.h / 2.0 }
    }
}

/// Body-check gesture sub-signals supplied by the detection layer
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct WireGestures {
    #[serde(default)]
    pub hand_to_torso: bool,
    #[serde(default)]
    pub reach: bool,
    #[serde(default)]
    pub proximity: bool,
}

/// Guard presence transition from the guard-presence feed
#[derive(Debug, Deserialize)]
pub struct WireGuardPresence {
    pub guard_id: String,
    pub is_active: bool,
}

/// Latched gesture flags carried on a parsed detection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GestureFlags {
    pub hand_to_torso: bool,
    pub reach_gesture: bool,
    pub proximity: bool,
}

impl From<WireGestures> for GestureFlags {
    fn from(w: WireGestures) -> Self {
        Self { hand_to_torso: w.hand_to_torso, reach_gesture: w.reach, proximity: w.proximity }
    }
}

/// Parsed detection for internal processing
#[derive(Debug, Clone)]
pub struct Detection {
    pub track_id: TrackId,
    pub class_name: String,
    pub confidence: f64,
    pub centroid: Point,
    pub gestures: GestureFlags,
}

/// One detector frame, parsed and timestamped
#[derive(Debug, Clone)]
pub struct DetectionFrame {
    /// Frame timestamp (epoch ms), monotonically increasing per the feed contract
    pub frame_ts: u64,
    pub received_at: Instant,
    pub detections: Vec<Detection>,
}

/// Typed failure of an external request; never fatal to the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown ticket {0}")]
    UnknownTicket(String),
    #[error("invalid zone configuration: {0}")]
    InvalidZones(#[from] ZoneConfigError),
    #[error("reason must not be empty")]
    EmptyReason,
}

/// Commands consumed by the engine's single-writer loop
///
/// Control variants carry oneshot responders so callers get a
/// per-request result without sharing engine state.
#[derive(Debug)]
pub enum EngineCommand {
    Frame(DetectionFrame),
    GuardPresence {
        guard_id: GuardId,
        is_active: bool,
    },
    Cancel {
        ticket_id: String,
        reason: String,
        resp: oneshot::Sender<Result<TicketStatus, EngineError>>,
    },
    UpdateZones {
        zones: ZoneSet,
        resp: oneshot::Sender<Result<(), EngineError>>,
    },
    ResetCounters {
        resp: oneshot::Sender<()>,
    },
}
