//! Recall signal micro-model: maps observed recall behaviour to a grade
//! and a mastery delta, and maps energy to a progressive-disclosure
//! visibility state. Everything here is pure.

use serde::{Deserialize, Serialize};

use crate::config::{SignalParams, VisibilityParams};
use crate::oracle::Grade;

/// Difficulty hint assumed when neither graph metadata nor review history
/// provides one (mid-scale on 1..10).
pub const DEFAULT_DIFFICULTY_HINT: f64 = 5.0;

/// Derive (grade, mastery delta) from a recall attempt.
///
/// `observed_ms` is the latency to a correct-enough response,
/// `struggle_count` the number of hesitation/hint events during the
/// attempt, `difficulty_hint` the item difficulty on the oracle's 1..10
/// scale. Delta is in [-1, 1], non-increasing in latency and struggle
/// count; fast struggle-free recall of harder items earns more.
pub fn grade_from_latency(
    observed_ms: i64,
    struggle_count: u32,
    difficulty_hint: f64,
    params: &SignalParams,
) -> (Grade, f64) {
    let difficulty_scale = difficulty_scale(difficulty_hint);

    if struggle_count >= params.struggle_fail {
        // Heavy struggle counts as a failed recall regardless of latency.
        let delta = -(0.2 + 0.05 * f64::from(struggle_count.min(8)));
        return (Grade::Again, delta.max(-1.0));
    }

    // Struggle events push the attempt into slower latency bands.
    let effective_ms =
        observed_ms.max(0) + i64::from(struggle_count) * params.struggle_penalty_ms;
    let grade = if effective_ms < params.easy_ms {
        Grade::Easy
    } else if effective_ms < params.good_ms {
        Grade::Good
    } else if effective_ms < params.hard_ms {
        Grade::Hard
    } else {
        Grade::Again
    };

    if grade == Grade::Again {
        return (grade, -0.2);
    }

    let rt_factor = 1.0 - (observed_ms.max(0) as f64 / params.max_latency_ms as f64).min(1.0);
    let struggle_factor = 1.0 - (f64::from(struggle_count) / f64::from(params.struggle_fail)).min(1.0);
    let quality = 0.5 + 0.3 * rt_factor + 0.2 * struggle_factor;
    let delta = (quality * difficulty_scale * params.success_gain).clamp(0.0, 1.0);

    (grade, delta)
}

fn difficulty_scale(difficulty_hint: f64) -> f64 {
    let norm = (difficulty_hint.clamp(1.0, 10.0) - 1.0) / 9.0;
    0.5 + 0.5 * norm
}

/// Progressive-disclosure tier for rendering. Derived from energy on every
/// read; never persisted as ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Visibility {
    /// Full text shown.
    Visible,
    /// Partially masked. `hint` is the band index (0 = lightest masking),
    /// `coverage` the fraction of the text concealed.
    Obscured { hint: u8, coverage: f64 },
    /// Full recall required.
    Hidden,
}

/// Deterministic step function from energy to visibility tier.
pub fn visibility_from_energy(energy: f64, params: &VisibilityParams) -> Visibility {
    let e = energy.clamp(0.0, 1.0);
    if e < params.visible_below {
        return Visibility::Visible;
    }
    if e >= params.hidden_above {
        return Visibility::Hidden;
    }

    let bands = params.bands.max(1);
    let span = params.hidden_above - params.visible_below;
    let position = (e - params.visible_below) / span;
    let band = ((position * f64::from(bands)) as u8).min(bands - 1);
    Visibility::Obscured {
        hint: band,
        coverage: band_coverage(band, params),
    }
}

fn band_coverage(band: u8, params: &VisibilityParams) -> f64 {
    // No obscured band reaches 0% or 100% coverage
    f64::from(u16::from(band) + 1) / f64::from(u16::from(params.bands.max(1)) + 1)
}

/// One discrete de-obscure step after a detected struggle. Presentation
/// override only; persisted energy is untouched by construction.
pub fn regress_one_step(visibility: Visibility, params: &VisibilityParams) -> Visibility {
    match visibility {
        Visibility::Hidden => {
            let top = params.bands.max(1) - 1;
            Visibility::Obscured {
                hint: top,
                coverage: band_coverage(top, params),
            }
        }
        Visibility::Obscured { hint: 0, .. } => Visibility::Visible,
        Visibility::Obscured { hint, .. } => Visibility::Obscured {
            hint: hint - 1,
            coverage: band_coverage(hint - 1, params),
        },
        Visibility::Visible => Visibility::Visible,
    }
}
