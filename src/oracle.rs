use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

const DECAY: f64 = -0.5;
const FACTOR: f64 = 19.0 / 81.0;
const MIN_STABILITY: f64 = 0.1;
const MAX_INTERVAL_DAYS: f64 = 36_500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Grade {
    /// Wire representation 1..=4; anything else is a validation error.
    pub fn from_u8(value: u8) -> EngineResult<Self> {
        match value {
            1 => Ok(Grade::Again),
            2 => Ok(Grade::Hard),
            3 => Ok(Grade::Good),
            4 => Ok(Grade::Easy),
            other => Err(EngineError::Validation(format!(
                "grade {other} outside 1..=4"
            ))),
        }
    }

    pub fn is_success(self) -> bool {
        self != Grade::Again
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SchedulingUpdate {
    pub stability: f64,
    pub difficulty: f64,
    pub interval_days: f64,
}

/// Pluggable spaced-repetition formula. Implementations must be pure and
/// synchronous, grow stability on Good/Easy and shrink it on Again.
pub trait SchedulingOracle: Send + Sync {
    fn update(
        &self,
        stability: f64,
        difficulty: f64,
        elapsed_days: f64,
        grade: Grade,
    ) -> EngineResult<SchedulingUpdate>;

    /// Probability of recall after `elapsed_days` at the given stability.
    fn retrievability(&self, stability: f64, elapsed_days: f64) -> f64;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsrsParams {
    pub w: [f64; 17],
}

impl Default for FsrsParams {
    fn default() -> Self {
        Self {
            w: [
                0.4, 0.6, 2.4, 5.8, // w0-w3: initial stability per grade
                4.93, 0.94, 0.86, 0.01, 1.49, // w4-w8
                0.14, 0.94, 2.18, 0.05, 0.34, // w9-w13
                1.26, 0.29, 2.61, // w14-w16
            ],
        }
    }
}

/// Default oracle: FSRS-style power-curve scheduler. A fresh record is
/// encoded as zero stability, which routes through the first-review path.
#[derive(Debug, Clone)]
pub struct FsrsOracle {
    params: FsrsParams,
    desired_retention: f64,
}

impl FsrsOracle {
    pub fn new(params: FsrsParams, desired_retention: f64) -> Self {
        Self {
            params,
            desired_retention: desired_retention.clamp(0.5, 0.99),
        }
    }
}

impl Default for FsrsOracle {
    fn default() -> Self {
        Self::new(FsrsParams::default(), 0.9)
    }
}

impl SchedulingOracle for FsrsOracle {
    fn update(
        &self,
        stability: f64,
        difficulty: f64,
        elapsed_days: f64,
        grade: Grade,
    ) -> EngineResult<SchedulingUpdate> {
        if elapsed_days < 0.0 {
            return Err(EngineError::Oracle(format!(
                "negative elapsed days: {elapsed_days}"
            )));
        }
        if !stability.is_finite() || !difficulty.is_finite() || !elapsed_days.is_finite() {
            return Err(EngineError::Oracle("non-finite scheduling input".into()));
        }

        let w = &self.params.w;
        let rating = grade as i32;

        if stability <= 0.0 {
            // First review of this node
            let init_s = initial_stability(w, rating);
            let init_d = initial_difficulty(w, rating);
            let interval = next_interval(init_s, self.desired_retention);
            return Ok(SchedulingUpdate {
                stability: init_s,
                difficulty: init_d,
                interval_days: interval,
            });
        }

        let r = self.retrievability(stability, elapsed_days);
        let new_difficulty = next_difficulty(w, difficulty, rating);
        let new_stability = if grade == Grade::Again {
            next_forget_stability(w, difficulty, stability, r)
        } else {
            next_recall_stability(w, difficulty, stability, r, rating)
        };
        let interval = next_interval(new_stability, self.desired_retention);

        Ok(SchedulingUpdate {
            stability: new_stability,
            difficulty: new_difficulty,
            interval_days: interval,
        })
    }

    fn retrievability(&self, stability: f64, elapsed_days: f64) -> f64 {
        if stability <= 0.0 {
            return 0.0;
        }
        let safe_elapsed = elapsed_days.max(0.0);
        (1.0 + FACTOR * safe_elapsed / stability).powf(DECAY)
    }
}

fn initial_stability(w: &[f64; 17], rating: i32) -> f64 {
    w[(rating - 1) as usize].max(MIN_STABILITY)
}

fn initial_difficulty(w: &[f64; 17], rating: i32) -> f64 {
    let d = w[4] - (rating - 3) as f64 * w[5];
    d.clamp(1.0, 10.0)
}

fn next_difficulty(w: &[f64; 17], d: f64, rating: i32) -> f64 {
    let delta = -(rating - 3) as f64;
    let d_new = d + w[6] * delta;
    // Mean reversion toward the initial Good difficulty
    let d_mean = w[7] * (w[4] - 3.0 * w[5]) + (1.0 - w[7]) * d_new;
    d_mean.clamp(1.0, 10.0)
}

fn next_recall_stability(w: &[f64; 17], d: f64, s: f64, r: f64, rating: i32) -> f64 {
    let hard_penalty = if rating == 2 { w[15] } else { 1.0 };
    let easy_bonus = if rating == 4 { w[16] } else { 1.0 };

    let new_s = s
        * (1.0
            + w[8].exp()
                * (11.0 - d)
                * s.powf(-w[9])
                * ((1.0 - r) * w[10]).exp_m1()
                * hard_penalty
                * easy_bonus);
    new_s.max(MIN_STABILITY)
}

fn next_forget_stability(w: &[f64; 17], d: f64, s: f64, r: f64) -> f64 {
    let new_s = w[11] * d.powf(-w[12]) * ((s + 1.0).powf(w[13]) - 1.0) * ((1.0 - r) * w[14]).exp();
    new_s.clamp(MIN_STABILITY, s)
}

fn next_interval(stability: f64, desired_retention: f64) -> f64 {
    let safe_retention = desired_retention.clamp(0.0001, 0.9999);
    let interval = stability / FACTOR * (safe_retention.powf(1.0 / DECAY) - 1.0);
    interval.clamp(1.0, MAX_INTERVAL_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_review_good_seeds_state() {
        let oracle = FsrsOracle::default();
        let upd = oracle.update(0.0, 0.0, 0.0, Grade::Good).unwrap();
        assert!(upd.stability > 0.0);
        assert!((1.0..=10.0).contains(&upd.difficulty));
        assert!(upd.interval_days >= 1.0);
    }

    #[test]
    fn stability_grows_on_good_and_easy() {
        let oracle = FsrsOracle::default();
        for grade in [Grade::Good, Grade::Easy] {
            let upd = oracle.update(2.0, 5.0, 3.0, grade).unwrap();
            assert!(
                upd.stability > 2.0,
                "{grade:?} should grow stability, got {}",
                upd.stability
            );
        }
    }

    #[test]
    fn stability_shrinks_on_again() {
        let oracle = FsrsOracle::default();
        let upd = oracle.update(10.0, 5.0, 5.0, Grade::Again).unwrap();
        assert!(upd.stability < 10.0);
        assert!(upd.stability >= MIN_STABILITY);
    }

    #[test]
    fn easy_outschedules_hard() {
        let oracle = FsrsOracle::default();
        let hard = oracle.update(2.0, 5.0, 3.0, Grade::Hard).unwrap();
        let easy = oracle.update(2.0, 5.0, 3.0, Grade::Easy).unwrap();
        assert!(easy.interval_days > hard.interval_days);
    }

    #[test]
    fn negative_elapsed_is_rejected() {
        let oracle = FsrsOracle::default();
        let err = oracle.update(2.0, 5.0, -1.0, Grade::Good).unwrap_err();
        assert!(matches!(err, EngineError::Oracle(_)));
    }

    #[test]
    fn retrievability_decays_monotonically() {
        let oracle = FsrsOracle::default();
        let r0 = oracle.retrievability(10.0, 0.0);
        let r5 = oracle.retrievability(10.0, 5.0);
        let r10 = oracle.retrievability(10.0, 10.0);
        assert!((r0 - 1.0).abs() < 1e-3);
        assert!(r0 > r5);
        assert!(r5 > r10);
    }

    #[test]
    fn grade_codes_roundtrip() {
        assert_eq!(Grade::from_u8(1).unwrap(), Grade::Again);
        assert_eq!(Grade::from_u8(4).unwrap(), Grade::Easy);
        assert!(matches!(
            Grade::from_u8(0),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            Grade::from_u8(5),
            Err(EngineError::Validation(_))
        ));
    }
}
