//! Zone model - normalized rectangles for the gate area and guard anchor

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A point in normalized [0,1] frame coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// The two monitored zones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    GateArea,
    GuardAnchor,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::GateArea => "gate_area",
            ZoneKind::GuardAnchor => "guard_anchor",
        }
    }
}

/// Axis-aligned rectangle in normalized [0,1] coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Zone {
    /// Point-in-rectangle containment test
    ///
    /// Centroids on the left/top edge are inside, right/bottom edge outside,
    /// so adjacent zones never both claim a point.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.x + self.width && p.y >= self.y && p.y < self.y + self.height
    }

    fn validate(&self, name: &'static str) -> Result<(), ZoneConfigError> {
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        if !in_range(self.x)
            || !in_range(self.y)
            || !in_range(self.x + self.width)
            || !in_range(self.y + self.height)
        {
            return Err(ZoneConfigError::OutOfRange { zone: name });
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(ZoneConfigError::Degenerate { zone: name });
        }
        Ok(())
    }
}

/// Rejected zone configuration updates
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ZoneConfigError {
    #[error("zone {zone} has coordinates outside [0,1]")]
    OutOfRange { zone: &'static str },
    #[error("zone {zone} has zero or negative area")]
    Degenerate { zone: &'static str },
}

/// Examination policy for concurrently arriving tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExaminationMode {
    Sequential,
    Batch,
}

impl ExaminationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExaminationMode::Sequential => "sequential",
            ExaminationMode::Batch => "batch",
        }
    }
}

/// The active zone configuration
///
/// Immutable once installed; replaced atomically by the zone-update
/// operation after validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneSet {
    pub gate_area: Zone,
    pub guard_anchor: Zone,
    pub enabled: bool,
    pub examination_mode: ExaminationMode,
}

impl ZoneSet {
    pub fn validate(&self) -> Result<(), ZoneConfigError> {
        self.gate_area.validate("gate_area")?;
        self.guard_anchor.validate("guard_anchor")?;
        Ok(())
    }

    pub fn zone(&self, kind: ZoneKind) -> &Zone {
        match kind {
            ZoneKind::GateArea => &self.gate_area,
            ZoneKind::GuardAnchor => &self.guard_anchor,
        }
    }
}

impl Default for ZoneSet {
    fn default() -> Self {
        Self {
            gate_area: Zone { x: 0.35, y: 0.3, width: 0.3, height: 0.4 },
            guard_anchor: Zone { x: 0.75, y: 0.3, width: 0.2, height: 0.4 },
            enabled: true,
            examination_mode: ExaminationMode::Sequential,
        }
    }
}
