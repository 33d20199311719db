//! Diffuses the mastery delta of a review outward along Knowledge edges.
//!
//! The walk is breadth-first and bounded three ways: a hop ceiling, a
//! minimum carried delta, and a hard visited ceiling independent of graph
//! size. Neighbor records are updated one at a time, so a concurrent
//! reader may observe a partially propagated event; that window is part
//! of the contract, not a bug.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PropagationParams;
use crate::error::{EngineError, EngineResult};
use crate::graph::{EdgeKind, EdgeWeight, GraphSource, NodeId};
use crate::store::{MemoryState, MemoryStore};

/// How edge-weight distributions are realised during a walk. Fixed at
/// construction so a given engine is either fully reproducible or fully
/// stochastic, never a per-call mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightStrategy {
    /// Use each distribution's mean.
    Deterministic,
    /// Draw from each distribution with a seeded ChaCha8 stream.
    Sampled { seed: u64 },
}

/// One neighbor touched by a propagation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationDetail {
    pub target: NodeId,
    /// Delta actually applied after clamping inputs, before energy clamp.
    pub delta: f64,
    /// Node chain from the reviewed source to this target.
    pub path: Vec<NodeId>,
    pub reason: String,
}

/// Immutable audit record of one triggering review. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationEvent {
    pub id: Uuid,
    pub learner: String,
    pub source: NodeId,
    pub occurred_at: DateTime<Utc>,
    /// The walk hit its visited ceiling and stopped early.
    pub truncated: bool,
    /// False when some neighbor update could not be applied.
    pub complete: bool,
    pub details: Vec<PropagationDetail>,
}

impl PropagationEvent {
    pub fn touched(&self) -> usize {
        self.details.len()
    }
}

/// Append-only in-memory event log, readable for mastery auditing.
#[derive(Debug, Default)]
pub struct PropagationLog {
    events: RwLock<Vec<PropagationEvent>>,
}

impl PropagationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, event: PropagationEvent) {
        self.events.write().push(event);
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn for_learner(&self, learner: &str) -> Vec<PropagationEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.learner == learner)
            .cloned()
            .collect()
    }

    pub fn recent(&self, count: usize) -> Vec<PropagationEvent> {
        let events = self.events.read();
        events.iter().rev().take(count).cloned().collect()
    }
}

pub struct PropagationEngine {
    graph: Arc<dyn GraphSource>,
    store: Arc<dyn MemoryStore>,
    params: PropagationParams,
    log: Arc<PropagationLog>,
    /// Present only under the Sampled strategy.
    rng: Option<Mutex<ChaCha8Rng>>,
}

impl PropagationEngine {
    pub fn new(
        graph: Arc<dyn GraphSource>,
        store: Arc<dyn MemoryStore>,
        params: PropagationParams,
        strategy: WeightStrategy,
        log: Arc<PropagationLog>,
    ) -> Self {
        let rng = match strategy {
            WeightStrategy::Deterministic => None,
            WeightStrategy::Sampled { seed } => Some(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        };
        Self {
            graph,
            store,
            params,
            log,
            rng,
        }
    }

    pub fn log(&self) -> &Arc<PropagationLog> {
        &self.log
    }

    fn realise_weight(&self, weight: &EdgeWeight) -> f64 {
        match &self.rng {
            None => weight.mean(),
            Some(rng) => weight.sample(&mut *rng.lock()),
        }
    }

    /// Fan `raw_delta` out from `source` along Knowledge edges. Not
    /// idempotent: each call is an independent event, and invoking it
    /// exactly once per review is the caller's responsibility.
    pub fn propagate(
        &self,
        learner: &str,
        source: NodeId,
        raw_delta: f64,
        now: DateTime<Utc>,
    ) -> EngineResult<PropagationEvent> {
        if !self.graph.node_exists(source) {
            return Err(EngineError::NotFound(format!(
                "propagation source {source} not in graph"
            )));
        }

        let mut event = PropagationEvent {
            id: Uuid::new_v4(),
            learner: learner.to_string(),
            source,
            occurred_at: now,
            truncated: false,
            complete: true,
            details: Vec::new(),
        };

        let mut visited: HashSet<NodeId> = HashSet::new();
        visited.insert(source);
        // (node, delta carried into it, hop, path from source)
        let mut queue: VecDeque<(NodeId, f64, u32, Vec<NodeId>)> = VecDeque::new();
        queue.push_back((source, raw_delta, 0, vec![source]));

        'walk: while let Some((node, carried, hop, path)) = queue.pop_front() {
            if hop >= self.params.max_hops {
                continue;
            }
            for edge in self.graph.edges_from(node) {
                if edge.kind != EdgeKind::Knowledge {
                    // Dependency edges gate scheduling, they carry nothing
                    continue;
                }
                if visited.contains(&edge.target) {
                    continue;
                }

                let weight = self.realise_weight(&edge.weight);
                let applied = carried * weight * self.params.decay;
                if applied.abs() < self.params.epsilon {
                    continue;
                }

                visited.insert(edge.target);
                if visited.len() > self.params.max_visited {
                    let bounds = EngineError::PropagationBounds {
                        visited: visited.len() - 1,
                    };
                    tracing::warn!(
                        learner,
                        source = %source,
                        error = %bounds,
                        "propagation truncated"
                    );
                    event.truncated = true;
                    break 'walk;
                }

                let mut target_path = path.clone();
                target_path.push(edge.target);

                match self.apply_to_target(learner, edge.target, applied, now) {
                    Ok(()) => {
                        event.details.push(PropagationDetail {
                            target: edge.target,
                            delta: applied,
                            path: target_path.clone(),
                            reason: format!(
                                "knowledge edge {node} -> {} (w {weight:.3}, hop {})",
                                edge.target,
                                hop + 1
                            ),
                        });
                        queue.push_back((edge.target, applied, hop + 1, target_path));
                    }
                    Err(err) => {
                        tracing::warn!(
                            learner,
                            target = %edge.target,
                            error = %err,
                            "neighbor update skipped"
                        );
                        event.complete = false;
                    }
                }
            }
        }

        tracing::debug!(
            learner,
            source = %source,
            touched = event.touched(),
            truncated = event.truncated,
            "propagation event recorded"
        );
        self.log.append(event.clone());
        Ok(event)
    }

    /// One neighbor, one lock acquisition: the walk never holds a
    /// store-wide transaction.
    fn apply_to_target(
        &self,
        learner: &str,
        target: NodeId,
        delta: f64,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let node = self
            .graph
            .node(target)
            .ok_or_else(|| EngineError::NotFound(format!("target {target} not in graph")))?;

        let mut state = self
            .store
            .get(learner, target)
            .unwrap_or_else(|| MemoryState::fresh(learner, target, node.axis, now));
        state.apply_energy_delta(delta);
        self.store.upsert(state);
        Ok(())
    }
}
