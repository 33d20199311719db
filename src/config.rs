use serde::{Deserialize, Serialize};

use crate::scheduler::SessionMode;

const DEFAULT_DECAY: f64 = 0.5;
const DEFAULT_EPSILON: f64 = 0.01;
const DEFAULT_MAX_HOPS: u32 = 3;
const DEFAULT_MAX_VISITED: usize = 512;
const DEFAULT_DESIRED_RETENTION: f64 = 0.9;

/// Bounds for the propagation walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationParams {
    /// Geometric attenuation applied per hop, in (0, 1).
    pub decay: f64,
    /// Carried deltas below this magnitude stop the branch.
    pub epsilon: f64,
    /// Maximum hop distance from the reviewed node.
    pub max_hops: u32,
    /// Hard ceiling on visited nodes, independent of graph size.
    pub max_visited: usize,
}

impl Default for PropagationParams {
    fn default() -> Self {
        Self {
            decay: DEFAULT_DECAY,
            epsilon: DEFAULT_EPSILON,
            max_hops: DEFAULT_MAX_HOPS,
            max_visited: DEFAULT_MAX_VISITED,
        }
    }
}

/// Thresholds for the progressive-disclosure mapping.
///
/// Energy below `visible_below` renders fully visible text; energy at or
/// above `hidden_above` requires full recall. The span in between is cut
/// into `bands` discrete obscuring steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilityParams {
    pub visible_below: f64,
    pub hidden_above: f64,
    pub bands: u8,
}

impl Default for VisibilityParams {
    fn default() -> Self {
        Self {
            visible_below: 0.25,
            hidden_above: 0.90,
            bands: 8,
        }
    }
}

/// Latency banding and struggle handling for grade derivation.
/// All latencies in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalParams {
    pub easy_ms: i64,
    pub good_ms: i64,
    pub hard_ms: i64,
    /// Each struggle event is counted as this much extra latency when banding.
    pub struggle_penalty_ms: i64,
    /// At this many struggle events the attempt counts as a failed recall.
    pub struggle_fail: u32,
    /// Latency at which the response-time factor bottoms out.
    pub max_latency_ms: i64,
    /// Scales the positive delta of a successful recall so energy accrues
    /// over several reviews rather than saturating on the first.
    pub success_gain: f64,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            easy_ms: 2_500,
            good_ms: 6_000,
            hard_ms: 12_000,
            struggle_penalty_ms: 3_000,
            struggle_fail: 3,
            max_latency_ms: 30_000,
            success_gain: 0.4,
        }
    }
}

/// Weight triple for session scoring: `w_due * overdue_days +
/// w_need * (1 - energy) + w_yield * importance`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub w_due: f64,
    pub w_need: f64,
    pub w_yield: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerParams {
    pub balanced: ScoreWeights,
    pub high_yield: ScoreWeights,
    pub foundational: ScoreWeights,
    /// A due node is demoted while any Dependency source sits below this energy.
    pub dependency_gate: f64,
    /// Importance assumed when the graph carries no hint for a node.
    pub default_importance: f64,
}

impl SchedulerParams {
    pub fn weights_for(&self, mode: SessionMode) -> ScoreWeights {
        match mode {
            SessionMode::Balanced => self.balanced,
            SessionMode::HighYield => self.high_yield,
            SessionMode::Foundational => self.foundational,
        }
    }
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            balanced: ScoreWeights {
                w_due: 1.0,
                w_need: 1.0,
                w_yield: 1.0,
            },
            high_yield: ScoreWeights {
                w_due: 0.5,
                w_need: 0.5,
                w_yield: 3.0,
            },
            foundational: ScoreWeights {
                w_due: 2.0,
                w_need: 2.5,
                w_yield: 0.25,
            },
            dependency_gate: 0.6,
            default_importance: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub propagation: PropagationParams,
    pub visibility: VisibilityParams,
    pub signal: SignalParams,
    pub scheduler: SchedulerParams,
    pub oracle: OracleParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleParams {
    /// Recall probability the default oracle schedules toward.
    pub desired_retention: f64,
}

impl Default for OracleParams {
    fn default() -> Self {
        Self {
            desired_retention: DEFAULT_DESIRED_RETENTION,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by environment where present. Unparsable values
    /// fall back silently, matching the rest of the process bootstrap.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_f64("HIFZ_PROPAGATION_DECAY") {
            config.propagation.decay = v;
        }
        if let Some(v) = env_f64("HIFZ_PROPAGATION_EPSILON") {
            config.propagation.epsilon = v;
        }
        if let Some(v) = env_u32("HIFZ_PROPAGATION_MAX_HOPS") {
            config.propagation.max_hops = v;
        }
        if let Some(v) = env_u32("HIFZ_PROPAGATION_MAX_VISITED") {
            config.propagation.max_visited = v as usize;
        }
        if let Some(v) = env_f64("HIFZ_DESIRED_RETENTION") {
            config.oracle.desired_retention = v.clamp(0.5, 0.99);
        }
        if let Some(v) = env_f64("HIFZ_DEPENDENCY_GATE") {
            config.scheduler.dependency_gate = v.clamp(0.0, 1.0);
        }
        config
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse::<f64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse::<u32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert!(config.propagation.decay > 0.0 && config.propagation.decay < 1.0);
        assert!(config.propagation.epsilon > 0.0);
        assert!(config.visibility.bands >= 6);
        assert!(config.visibility.visible_below < config.visibility.hidden_above);
    }

    #[test]
    fn mode_weights_differ() {
        let params = SchedulerParams::default();
        let high_yield = params.weights_for(SessionMode::HighYield);
        let foundational = params.weights_for(SessionMode::Foundational);
        assert!(high_yield.w_yield > foundational.w_yield);
        assert!(foundational.w_need > high_yield.w_need);
    }
}
