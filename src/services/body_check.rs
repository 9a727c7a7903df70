//! Body-check completion scoring
//!
//! Combines the latched gesture sub-signals on a ticket into a completion
//! score. The score is a weighted sum normalized by the total weight, so it
//! is monotonic in the signals and bounded to [0,1] for any configuration.

use crate::domain::ticket::BodyCheck;
use crate::domain::zone::ExaminationMode;

/// Tolerance for float threshold comparison
const SCORE_EPSILON: f64 = 1e-9;

/// Scoring weights and per-mode completion thresholds
#[derive(Debug, Clone)]
pub struct BodyCheckPolicy {
    hand_weight: f64,
    reach_weight: f64,
    proximity_weight: f64,
    sequential_threshold: f64,
    batch_threshold: f64,
}

impl BodyCheckPolicy {
    pub fn new(
        hand_weight: f64,
        reach_weight: f64,
        proximity_weight: f64,
        sequential_threshold: f64,
        batch_threshold: f64,
    ) -> Self {
        Self { hand_weight, reach_weight, proximity_weight, sequential_threshold, batch_threshold }
    }

    /// Completion score in [0,1]
    pub fn score(&self, check: &BodyCheck) -> f64 {
        let total = self.hand_weight + self.reach_weight + self.proximity_weight;
        if total <= 0.0 {
            return 0.0;
        }
        let mut sum = 0.0;
        if check.hand_to_torso {
            sum += self.hand_weight;
        }
        if check.reach_gesture {
            sum += self.reach_weight;
        }
        if check.proximity {
            sum += self.proximity_weight;
        }
        sum / total
    }

    /// Whether the check counts as complete under the given examination mode
    ///
    /// Batch mode may tolerate partial checks via a lower threshold.
    pub fn completed(&self, check: &BodyCheck, mode: ExaminationMode) -> bool {
        let threshold = match mode {
            ExaminationMode::Sequential => self.sequential_threshold,
            ExaminationMode::Batch => self.batch_threshold,
        };
        self.score(check) + SCORE_EPSILON >= threshold
    }
}

impl Default for BodyCheckPolicy {
    fn default() -> Self {
        Self {
            hand_weight: 0.4,
            reach_weight: 0.4,
            proximity_weight: 0.2,
            sequential_threshold: 1.0,
            batch_threshold: 0.75,
        }
    }
}
