use std::fmt;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-10;

/// Maximum iterations for gamma sampling to prevent infinite loops
const MAX_GAMMA_ITERATIONS: usize = 1000;

/// Maximum recursion depth for gamma sampling
const MAX_GAMMA_RECURSION: usize = 10;

/// Arena index of a node. Ids are assigned densely at ingestion in
/// canonical content order (chapter, verse, word), so ordering by id is
/// ordering by position in the corpus.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    RootMorpheme,
    Lemma,
    WordInstance,
    Verse,
    Chapter,
    /// Composite node pairing a content node with a learning axis.
    Knowledge,
}

/// A named skill dimension. Knowledge nodes are scheduled independently
/// per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Memorization,
    Translation,
    Tajweed,
    Meaning,
}

impl Axis {
    pub fn as_str(self) -> &'static str {
        match self {
            Axis::Memorization => "memorization",
            Axis::Translation => "translation",
            Axis::Tajweed => "tajweed",
            Axis::Meaning => "meaning",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "memorization" => Some(Axis::Memorization),
            "translation" => Some(Axis::Translation),
            "tajweed" => Some(Axis::Tajweed),
            "meaning" => Some(Axis::Meaning),
            _ => None,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content or knowledge node. Immutable after ingestion; removed only
/// by rebuilding the whole graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Present on Knowledge nodes only.
    pub axis: Option<Axis>,
    /// The content node a Knowledge node is studied against.
    pub content: Option<NodeId>,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Target should not be studied before source is mastered. A
    /// scheduling gate, never a propagation path.
    Dependency,
    /// Source and target share a latent skill; mastery diffuses along it.
    Knowledge,
}

/// Edge weight as a distribution descriptor rather than a bare scalar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EdgeWeight {
    Constant { value: f64 },
    Normal { mean: f64, std_dev: f64 },
    Beta { alpha: f64, beta: f64 },
}

impl EdgeWeight {
    /// Deterministic realisation: the distribution mean, clamped to [0, 1]
    /// so a hop can never amplify a delta.
    pub fn mean(&self) -> f64 {
        let raw = match *self {
            EdgeWeight::Constant { value } => value,
            EdgeWeight::Normal { mean, .. } => mean,
            EdgeWeight::Beta { alpha, beta } => {
                let sum = alpha + beta;
                if sum > EPSILON {
                    alpha / sum
                } else {
                    0.5
                }
            }
        };
        raw.clamp(0.0, 1.0)
    }

    /// Stochastic realisation, clamped to [0, 1].
    pub fn sample(&self, rng: &mut ChaCha8Rng) -> f64 {
        let raw = match *self {
            EdgeWeight::Constant { value } => value,
            EdgeWeight::Normal { mean, std_dev } => mean + std_dev * sample_standard_normal(rng),
            EdgeWeight::Beta { alpha, beta } => sample_beta(rng, alpha, beta),
        };
        raw.clamp(0.0, 1.0)
    }
}

/// Standard normal via the Box-Muller transform.
fn sample_standard_normal(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(EPSILON);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Beta(alpha, beta) = Gamma(alpha) / (Gamma(alpha) + Gamma(beta)).
fn sample_beta(rng: &mut ChaCha8Rng, alpha: f64, beta: f64) -> f64 {
    let a = alpha.max(EPSILON);
    let b = beta.max(EPSILON);

    let x = sample_gamma(rng, a, 0);
    let y = sample_gamma(rng, b, 0);

    let sum = x + y;
    if sum > 0.0 && sum.is_finite() {
        x / sum
    } else {
        0.5
    }
}

/// Gamma sampling via the Marsaglia-Tsang method (unit scale).
fn sample_gamma(rng: &mut ChaCha8Rng, shape: f64, depth: usize) -> f64 {
    if shape <= 0.0 {
        return 0.0;
    }
    if depth >= MAX_GAMMA_RECURSION {
        return shape;
    }

    // Handle shape < 1 using the boost transformation
    if shape < 1.0 {
        let u: f64 = rng.gen::<f64>().max(EPSILON);
        return sample_gamma(rng, 1.0 + shape, depth + 1) * u.powf(1.0 / shape);
    }

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();

    for _ in 0..MAX_GAMMA_ITERATIONS {
        let x = sample_standard_normal(rng);
        let v_term = 1.0 + c * x;
        if v_term <= 0.0 {
            continue;
        }

        let v = v_term.powi(3);
        let u: f64 = rng.gen();
        let x2 = x * x;

        if u < 1.0 - 0.0331 * x2 * x2 {
            return d * v;
        }
        if u.ln() < 0.5 * x2 + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }

    shape
}

/// Directed, typed edge. Immutable; keyed by (source, target).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    pub weight: EdgeWeight,
}
