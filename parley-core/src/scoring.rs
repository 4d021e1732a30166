//! Turn scoring and running-total arithmetic
//!
//! The running total is a cumulative mean updated incrementally from the
//! number of turns completed before the current one. Keep the incremental
//! form: rounding at each step is part of the observable result.

use serde::{Deserialize, Serialize};

/// One turn's four-axis judgment, each in 0..=100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreDimensions {
    pub communication: u8,
    pub accuracy: u8,
    pub scenario_fit: u8,
    pub fluency: u8,
}

impl ScoreDimensions {
    /// Build from raw values, clamping each to 100.
    pub fn new(communication: u8, accuracy: u8, scenario_fit: u8, fluency: u8) -> Self {
        Self {
            communication: communication.min(100),
            accuracy: accuracy.min(100),
            scenario_fit: scenario_fit.min(100),
            fluency: fluency.min(100),
        }
    }

    /// Same score on every axis.
    pub fn uniform(score: u8) -> Self {
        Self::new(score, score, score, score)
    }

    /// Mean of the four dimensions.
    pub fn raw_score(&self) -> f64 {
        let sum = u32::from(self.communication)
            + u32::from(self.accuracy)
            + u32::from(self.scenario_fit)
            + u32::from(self.fluency);
        f64::from(sum) / 4.0
    }
}

/// Score of a single turn after any penalty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TurnScore {
    pub raw: f64,
    pub final_score: f64,
    pub penalized: bool,
}

impl TurnScore {
    /// Score `dimensions`, deducting `penalty` (floored at 0) when `penalized`.
    pub fn compute(dimensions: &ScoreDimensions, penalized: bool, penalty: u32) -> Self {
        let raw = dimensions.raw_score();
        Self {
            raw,
            final_score: final_turn_score(raw, penalized, penalty),
            penalized,
        }
    }
}

/// `max(0, raw - penalty)` when penalized, else `raw`.
pub fn final_turn_score(raw: f64, penalized: bool, penalty: u32) -> f64 {
    if penalized {
        (raw - f64::from(penalty)).max(0.0)
    } else {
        raw
    }
}

/// Fold one more turn into the running total.
///
/// `completed_turns` counts turns finished before this one, so the first
/// turn's score becomes the total exactly (after rounding).
pub fn next_running_total(old_total: u32, completed_turns: u32, final_score: f64) -> u32 {
    let n = f64::from(completed_turns);
    let total = (f64::from(old_total) * n + final_score) / (n + 1.0);
    total.round().clamp(0.0, 100.0) as u32
}

pub fn is_passing(total: u32, pass_score: u32) -> bool {
    total >= pass_score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_score_is_mean_of_dimensions() {
        let dims = ScoreDimensions::new(80, 70, 90, 61);
        assert_eq!(dims.raw_score(), 75.25);
    }

    #[test]
    fn new_clamps_each_dimension() {
        let dims = ScoreDimensions::new(255, 100, 101, 0);
        assert_eq!(dims, ScoreDimensions::new(100, 100, 100, 0));
    }

    #[test]
    fn penalty_subtracts_fifteen() {
        let dims = ScoreDimensions::uniform(70);
        let score = TurnScore::compute(&dims, true, 15);
        assert_eq!(score.raw, 70.0);
        assert_eq!(score.final_score, 55.0);
        assert!(score.penalized);

        let clean = TurnScore::compute(&dims, false, 15);
        assert_eq!(clean.final_score, 70.0);
    }

    #[test]
    fn penalty_never_goes_negative() {
        let score = TurnScore::compute(&ScoreDimensions::uniform(10), true, 15);
        assert_eq!(score.final_score, 0.0);
        assert_eq!(final_turn_score(0.0, true, 15), 0.0);
    }

    #[test]
    fn first_turn_becomes_total() {
        assert_eq!(next_running_total(0, 0, 83.0), 83);
        assert_eq!(next_running_total(0, 0, 82.5), 83);
        assert_eq!(next_running_total(0, 0, 82.25), 82);
    }

    #[test]
    fn incremental_mean_over_five_turns() {
        // 90 -> 90 -> 80 -> 82 -> 77 -> 81 (plain mean would be 80)
        let scores = [90.0, 70.0, 85.0, 60.0, 95.0];
        let mut totals = Vec::new();
        let mut total = 0;
        for (i, score) in scores.iter().enumerate() {
            total = next_running_total(total, i as u32, *score);
            totals.push(total);
        }
        assert_eq!(totals, vec![90, 80, 82, 77, 81]);
    }

    #[test]
    fn uniform_turns_keep_total_steady() {
        let mut total = 0;
        for i in 0..5 {
            total = next_running_total(total, i, 74.0);
        }
        assert_eq!(total, 74);
    }

    #[test]
    fn incremental_form_keeps_step_rounding() {
        // 81, then 80 => (81 + 80) / 2 = 80.5 -> 81
        let total = next_running_total(next_running_total(0, 0, 81.0), 1, 80.0);
        assert_eq!(total, 81);
        // Rounded total feeds the next step: 81 * 2 + 78 = 240 / 3 = 80
        assert_eq!(next_running_total(total, 2, 78.0), 80);
    }

    #[test]
    fn pass_boundary() {
        assert!(!is_passing(79, 80));
        assert!(is_passing(80, 80));
        assert!(is_passing(100, 80));
    }
}
