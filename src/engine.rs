//! Orchestration: one entry point composing the recall signal model, the
//! scheduling oracle, the memory state store and the propagation engine.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::graph::{Axis, GraphSource, NodeId};
use crate::oracle::{FsrsOracle, FsrsParams, Grade, SchedulingOracle};
use crate::propagation::{PropagationEngine, PropagationLog, WeightStrategy};
use crate::scheduler::{SessionMode, SessionPlan, SessionScheduler};
use crate::signal::{self, Visibility, DEFAULT_DIFFICULTY_HINT};
use crate::store::{LearnerCounts, MemoryState, MemoryStore};

const MS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationSummary {
    pub event: Uuid,
    pub touched: usize,
    pub truncated: bool,
    pub complete: bool,
}

/// Result of one processed review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub grade: Grade,
    pub delta: f64,
    pub new_energy: f64,
    pub new_due_at: DateTime<Utc>,
    pub propagation: PropagationSummary,
}

pub struct ReviewEngine {
    graph: Arc<dyn GraphSource>,
    store: Arc<dyn MemoryStore>,
    oracle: Box<dyn SchedulingOracle>,
    propagation: PropagationEngine,
    scheduler: SessionScheduler,
    /// Latest plan per learner, fully replaced on every build.
    sessions: DashMap<String, SessionPlan>,
    config: EngineConfig,
}

impl ReviewEngine {
    /// Engine with the default FSRS oracle and deterministic edge weights.
    pub fn new(
        graph: Arc<dyn GraphSource>,
        store: Arc<dyn MemoryStore>,
        config: EngineConfig,
    ) -> Self {
        let oracle = Box::new(FsrsOracle::new(
            FsrsParams::default(),
            config.oracle.desired_retention,
        ));
        Self::with_parts(graph, store, oracle, WeightStrategy::Deterministic, config)
    }

    pub fn with_parts(
        graph: Arc<dyn GraphSource>,
        store: Arc<dyn MemoryStore>,
        oracle: Box<dyn SchedulingOracle>,
        strategy: WeightStrategy,
        config: EngineConfig,
    ) -> Self {
        let log = Arc::new(PropagationLog::new());
        let propagation = PropagationEngine::new(
            Arc::clone(&graph),
            Arc::clone(&store),
            config.propagation.clone(),
            strategy,
            log,
        );
        let scheduler = SessionScheduler::new(
            Arc::clone(&graph),
            Arc::clone(&store),
            config.scheduler.clone(),
        );
        Self {
            graph,
            store,
            oracle,
            propagation,
            scheduler,
            sessions: DashMap::new(),
            config,
        }
    }

    pub fn process_review(
        &self,
        learner: &str,
        node: NodeId,
        observed_ms: i64,
        struggle_count: u32,
    ) -> EngineResult<ReviewOutcome> {
        self.process_review_at(learner, node, observed_ms, struggle_count, Utc::now())
    }

    /// Full review pipeline: signal → oracle → store → propagation.
    ///
    /// Validation and NotFound reject the review with no state change.
    /// Once the review record is persisted, a propagation failure flags
    /// the outcome instead of rolling the review back.
    pub fn process_review_at(
        &self,
        learner: &str,
        node: NodeId,
        observed_ms: i64,
        struggle_count: u32,
        now: DateTime<Utc>,
    ) -> EngineResult<ReviewOutcome> {
        if observed_ms < 0 {
            return Err(EngineError::Validation(format!(
                "negative latency: {observed_ms} ms"
            )));
        }
        if !self.graph.node_exists(node) {
            return Err(EngineError::NotFound(format!("node {node} not in graph")));
        }

        let mut state = self
            .store
            .get(learner, node)
            .unwrap_or_else(|| MemoryState::fresh(learner, node, self.node_axis(node), now));

        let elapsed_days = match state.last_reviewed {
            Some(last) => (now - last).num_milliseconds() as f64 / MS_PER_DAY,
            None => 0.0,
        };
        if elapsed_days < 0.0 {
            return Err(EngineError::Validation(format!(
                "review at {now} predates last review of {node}"
            )));
        }

        let difficulty_hint = self
            .graph
            .metadata(node, "difficulty")
            .unwrap_or(if state.stability > 0.0 {
                state.difficulty
            } else {
                DEFAULT_DIFFICULTY_HINT
            });
        let (grade, delta) =
            signal::grade_from_latency(observed_ms, struggle_count, difficulty_hint, &self.config.signal);

        // Oracle rejection leaves the stored record untouched
        let update = self
            .oracle
            .update(state.stability, state.difficulty, elapsed_days, grade)?;

        state.stability = update.stability;
        state.difficulty = update.difficulty;
        state.last_reviewed = Some(now);
        state.due_at = now + Duration::milliseconds((update.interval_days * MS_PER_DAY) as i64);
        state.review_count += 1;
        state.apply_energy_delta(delta);

        let new_energy = state.energy;
        let new_due_at = state.due_at;
        self.store.upsert(state);

        tracing::info!(
            learner,
            node = %node,
            ?grade,
            delta,
            interval_days = update.interval_days,
            "review recorded"
        );

        // The review is already persisted; propagation trouble is flagged,
        // never rolled back into the review itself.
        let propagation = match self.propagation.propagate(learner, node, delta, now) {
            Ok(event) => PropagationSummary {
                event: event.id,
                touched: event.touched(),
                truncated: event.truncated,
                complete: event.complete,
            },
            Err(err) => {
                tracing::warn!(learner, node = %node, error = %err, "propagation failed");
                PropagationSummary {
                    event: Uuid::nil(),
                    touched: 0,
                    truncated: false,
                    complete: false,
                }
            }
        };

        Ok(ReviewOutcome {
            grade,
            delta,
            new_energy,
            new_due_at,
            propagation,
        })
    }

    pub fn build_session(
        &self,
        learner: &str,
        mode: SessionMode,
        axis_filter: Option<&[Axis]>,
        limit: usize,
        backfill: bool,
    ) -> SessionPlan {
        self.build_session_at(learner, mode, axis_filter, limit, backfill, Utc::now())
    }

    pub fn build_session_at(
        &self,
        learner: &str,
        mode: SessionMode,
        axis_filter: Option<&[Axis]>,
        limit: usize,
        backfill: bool,
        now: DateTime<Utc>,
    ) -> SessionPlan {
        let plan = self
            .scheduler
            .build_session(learner, mode, axis_filter, limit, backfill, now);
        self.sessions.insert(learner.to_string(), plan.clone());
        plan
    }

    /// The learner's most recently built plan, if any.
    pub fn current_session(&self, learner: &str) -> Option<SessionPlan> {
        self.sessions.get(learner).map(|plan| plan.value().clone())
    }

    /// Current presentation tier, recomputed from stored energy. An
    /// untracked node is fully visible.
    pub fn visibility(&self, learner: &str, node: NodeId) -> Visibility {
        let energy = self
            .store
            .get(learner, node)
            .map(|s| s.energy)
            .unwrap_or(0.0);
        signal::visibility_from_energy(energy, &self.config.visibility)
    }

    /// One de-obscure step for a struggling learner. Presentation-only;
    /// persisted energy is not consulted again, let alone mutated.
    pub fn regress_visibility(&self, current: Visibility) -> Visibility {
        signal::regress_one_step(current, &self.config.visibility)
    }

    /// Recall probability of a tracked node right now, for tooling.
    pub fn retrievability(&self, learner: &str, node: NodeId) -> Option<f64> {
        self.retrievability_at(learner, node, Utc::now())
    }

    pub fn retrievability_at(
        &self,
        learner: &str,
        node: NodeId,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        let state = self.store.get(learner, node)?;
        let elapsed_days = state
            .last_reviewed
            .map(|last| ((now - last).num_milliseconds() as f64 / MS_PER_DAY).max(0.0))
            .unwrap_or(0.0);
        Some(self.oracle.retrievability(state.stability, elapsed_days))
    }

    pub fn counts(&self, learner: &str) -> LearnerCounts {
        self.counts_at(learner, Utc::now())
    }

    pub fn counts_at(&self, learner: &str, now: DateTime<Utc>) -> LearnerCounts {
        self.store.counts(learner, now, &self.config.visibility)
    }

    /// Drop all progress on one node.
    pub fn reset(&self, learner: &str, node: NodeId) -> bool {
        self.store.remove(learner, node)
    }

    /// Append-only audit log of every propagation event.
    pub fn propagation_log(&self) -> &Arc<PropagationLog> {
        self.propagation.log()
    }

    fn node_axis(&self, node: NodeId) -> Option<Axis> {
        self.graph.node(node).and_then(|n| n.axis)
    }
}
