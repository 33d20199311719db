//! Turns due memory records into an ordered study session.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SchedulerParams;
use crate::graph::{Axis, GraphSource, NodeId};
use crate::store::{MemoryState, MemoryStore};

const MS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    Balanced,
    /// Upweights importance: review what pays off most.
    HighYield,
    /// Upweights need and overdueness: shore up weak foundations.
    Foundational,
}

/// Where a session entry came from. Backfilled entries are never merged
/// silently with genuinely due ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntryOrigin {
    Due { overdue_days: f64 },
    Backfill { goal: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub node: NodeId,
    pub score: f64,
    pub origin: EntryOrigin,
}

impl SessionEntry {
    pub fn is_backfill(&self) -> bool {
        matches!(self.origin, EntryOrigin::Backfill { .. })
    }
}

/// Ordered study list, fully rebuilt on every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPlan {
    pub learner: String,
    pub mode: SessionMode,
    pub built_at: DateTime<Utc>,
    pub entries: Vec<SessionEntry>,
}

impl SessionPlan {
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.entries.iter().map(|e| e.node).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct SessionScheduler {
    graph: Arc<dyn GraphSource>,
    store: Arc<dyn MemoryStore>,
    params: SchedulerParams,
}

impl SessionScheduler {
    pub fn new(
        graph: Arc<dyn GraphSource>,
        store: Arc<dyn MemoryStore>,
        params: SchedulerParams,
    ) -> Self {
        Self {
            graph,
            store,
            params,
        }
    }

    /// Build the next study session. Read-only and freely retryable:
    /// identical inputs with no intervening review yield an identical
    /// plan.
    pub fn build_session(
        &self,
        learner: &str,
        mode: SessionMode,
        axis_filter: Option<&[Axis]>,
        limit: usize,
        backfill: bool,
        now: DateTime<Utc>,
    ) -> SessionPlan {
        let mut plan = SessionPlan {
            learner: learner.to_string(),
            mode,
            built_at: now,
            entries: Vec::new(),
        };
        if limit == 0 {
            return plan;
        }

        let due = self.store.get_due(learner, now, usize::MAX, axis_filter);
        let due_nodes: HashSet<NodeId> = due.iter().map(|r| r.node).collect();
        let weights = self.params.weights_for(mode);

        let mut scored: Vec<SessionEntry> = Vec::with_capacity(due.len());
        for record in &due {
            if self.is_gated(learner, record.node) {
                tracing::debug!(learner, node = %record.node, "demoted by dependency gate");
                continue;
            }
            let overdue_days = overdue_days(record, now);
            let need = 1.0 - record.energy;
            let importance = self.importance(record.node);
            let score =
                weights.w_due * overdue_days + weights.w_need * need + weights.w_yield * importance;
            scored.push(SessionEntry {
                node: record.node,
                score,
                origin: EntryOrigin::Due { overdue_days },
            });
        }

        // Highest score first; canonical content order breaks ties so the
        // plan is reproducible.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.node.cmp(&b.node))
        });
        scored.truncate(limit);
        plan.entries = scored;

        if backfill && plan.entries.len() < limit {
            self.backfill(&mut plan, &due_nodes, axis_filter, limit);
        }

        if plan.is_empty() {
            tracing::debug!(learner, ?axis_filter, "session build produced no entries");
        }
        plan
    }

    /// Not-yet-due goal members, in curated priority order, appended until
    /// the limit is met. Each entry is explicitly marked as backfill.
    fn backfill(
        &self,
        plan: &mut SessionPlan,
        due_nodes: &HashSet<NodeId>,
        axis_filter: Option<&[Axis]>,
        limit: usize,
    ) {
        let mut in_plan: HashSet<NodeId> = plan.entries.iter().map(|e| e.node).collect();

        for goal in self.graph.goals() {
            for member in &goal.members {
                if plan.entries.len() >= limit {
                    return;
                }
                if in_plan.contains(member) || due_nodes.contains(member) {
                    continue;
                }
                if let Some(filter) = axis_filter {
                    match self.graph.node(*member).and_then(|n| n.axis) {
                        Some(axis) if filter.contains(&axis) => {}
                        _ => continue,
                    }
                }
                in_plan.insert(*member);
                plan.entries.push(SessionEntry {
                    node: *member,
                    score: 0.0,
                    origin: EntryOrigin::Backfill {
                        goal: goal.id.clone(),
                    },
                });
            }
        }
    }

    /// A node is gated while any of its Dependency sources sits below the
    /// mastery threshold.
    fn is_gated(&self, learner: &str, node: NodeId) -> bool {
        self.graph.dependencies_of(node).iter().any(|source| {
            let energy = self
                .store
                .get(learner, *source)
                .map(|s| s.energy)
                .unwrap_or(0.0);
            energy < self.params.dependency_gate
        })
    }

    fn importance(&self, node: NodeId) -> f64 {
        self.graph
            .metadata(node, "importance")
            .unwrap_or(self.params.default_importance)
    }
}

fn overdue_days(record: &MemoryState, now: DateTime<Utc>) -> f64 {
    ((now - record.due_at).num_milliseconds() as f64 / MS_PER_DAY).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeKind, EdgeWeight, Goal, InMemoryGraph, NodeKind};
    use crate::store::InMemoryMemoryStore;
    use chrono::{Duration, TimeZone};

    fn ts() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    struct Fixture {
        graph: InMemoryGraph,
        store: Arc<InMemoryMemoryStore>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                graph: InMemoryGraph::new(),
                store: Arc::new(InMemoryMemoryStore::new()),
            }
        }

        fn knowledge_node(&mut self, axis: Axis, label: &str) -> NodeId {
            let content = self.graph.add_node(NodeKind::Verse, format!("c-{label}"));
            self.graph.add_knowledge(content, axis, label).unwrap()
        }

        fn track(&self, node: NodeId, axis: Axis, energy: f64, due_days_ago: i64) {
            let due = ts() - Duration::days(due_days_ago);
            let mut state = MemoryState::fresh("amina", node, Some(axis), due);
            state.energy = energy;
            self.store.upsert(state);
        }

        fn scheduler(self) -> SessionScheduler {
            SessionScheduler::new(
                Arc::new(self.graph),
                self.store.clone(),
                SchedulerParams::default(),
            )
        }
    }

    #[test]
    fn ranks_by_score_and_truncates() {
        let mut fx = Fixture::new();
        let fresh = fx.knowledge_node(Axis::Memorization, "fresh");
        let weak = fx.knowledge_node(Axis::Memorization, "weak");
        let overdue = fx.knowledge_node(Axis::Memorization, "overdue");
        fx.track(fresh, Axis::Memorization, 0.9, 0);
        fx.track(weak, Axis::Memorization, 0.1, 0);
        fx.track(overdue, Axis::Memorization, 0.5, 10);

        let scheduler = fx.scheduler();
        let plan = scheduler.build_session("amina", SessionMode::Balanced, None, 2, false, ts());

        assert_eq!(plan.entries.len(), 2);
        // Ten days overdue dominates under balanced weights
        assert_eq!(plan.entries[0].node, overdue);
        assert_eq!(plan.entries[1].node, weak);
    }

    #[test]
    fn mode_swaps_the_whole_weight_triple() {
        let mut fx = Fixture::new();
        let important = fx.knowledge_node(Axis::Memorization, "important");
        let weak = fx.knowledge_node(Axis::Memorization, "weak");
        fx.graph.set_metadata(important, "importance", 1.0);
        fx.graph.set_metadata(weak, "importance", 0.0);
        fx.track(important, Axis::Memorization, 0.8, 0);
        fx.track(weak, Axis::Memorization, 0.05, 0);

        let scheduler = fx.scheduler();
        let high_yield =
            scheduler.build_session("amina", SessionMode::HighYield, None, 2, false, ts());
        let foundational =
            scheduler.build_session("amina", SessionMode::Foundational, None, 2, false, ts());

        assert_eq!(high_yield.entries[0].node, important);
        assert_eq!(foundational.entries[0].node, weak);
    }

    #[test]
    fn ties_break_by_canonical_order() {
        let mut fx = Fixture::new();
        let first = fx.knowledge_node(Axis::Memorization, "first");
        let second = fx.knowledge_node(Axis::Memorization, "second");
        fx.track(second, Axis::Memorization, 0.5, 0);
        fx.track(first, Axis::Memorization, 0.5, 0);

        let scheduler = fx.scheduler();
        let plan = scheduler.build_session("amina", SessionMode::Balanced, None, 10, false, ts());
        assert_eq!(plan.node_ids(), vec![first, second]);
    }

    #[test]
    fn axis_filter_excludes_other_axes() {
        let mut fx = Fixture::new();
        let memorize = fx.knowledge_node(Axis::Memorization, "memorize");
        let translate = fx.knowledge_node(Axis::Translation, "translate");
        fx.track(memorize, Axis::Memorization, 0.2, 1);
        fx.track(translate, Axis::Translation, 0.2, 1);

        let scheduler = fx.scheduler();
        let plan = scheduler.build_session(
            "amina",
            SessionMode::Balanced,
            Some(&[Axis::Memorization]),
            10,
            false,
            ts(),
        );
        assert_eq!(plan.node_ids(), vec![memorize]);
    }

    #[test]
    fn dependency_gate_demotes_unready_nodes() {
        let mut fx = Fixture::new();
        let basics = fx.knowledge_node(Axis::Memorization, "basics");
        let advanced = fx.knowledge_node(Axis::Memorization, "advanced");
        fx.graph
            .add_edge(
                basics,
                advanced,
                EdgeKind::Dependency,
                EdgeWeight::Constant { value: 1.0 },
            )
            .unwrap();
        fx.track(basics, Axis::Memorization, 0.2, 0);
        fx.track(advanced, Axis::Memorization, 0.2, 0);

        let scheduler = fx.scheduler();
        let plan = scheduler.build_session("amina", SessionMode::Balanced, None, 10, false, ts());
        assert_eq!(plan.node_ids(), vec![basics]);
    }

    #[test]
    fn backfill_is_explicit_and_distinguishable() {
        let mut fx = Fixture::new();
        let due_node = fx.knowledge_node(Axis::Memorization, "due");
        let extra = fx.knowledge_node(Axis::Memorization, "extra");
        fx.graph
            .add_goal(Goal {
                id: "daily".into(),
                name: "Daily".into(),
                members: vec![extra],
            })
            .unwrap();
        fx.track(due_node, Axis::Memorization, 0.2, 1);

        let scheduler = fx.scheduler();
        let without =
            scheduler.build_session("amina", SessionMode::Balanced, None, 5, false, ts());
        assert_eq!(without.entries.len(), 1);

        let with = scheduler.build_session("amina", SessionMode::Balanced, None, 5, true, ts());
        assert_eq!(with.entries.len(), 2);
        assert!(!with.entries[0].is_backfill());
        assert!(with.entries[1].is_backfill());
        assert_eq!(with.entries[1].node, extra);
    }

    #[test]
    fn build_is_idempotent_without_intervening_reviews() {
        let mut fx = Fixture::new();
        let a = fx.knowledge_node(Axis::Memorization, "a");
        let b = fx.knowledge_node(Axis::Memorization, "b");
        fx.track(a, Axis::Memorization, 0.4, 2);
        fx.track(b, Axis::Memorization, 0.7, 1);

        let scheduler = fx.scheduler();
        let first = scheduler.build_session("amina", SessionMode::Balanced, None, 10, false, ts());
        let second = scheduler.build_session("amina", SessionMode::Balanced, None, 10, false, ts());
        assert_eq!(first.node_ids(), second.node_ids());
    }

    #[test]
    fn empty_filter_result_is_an_empty_session() {
        let mut fx = Fixture::new();
        let translate = fx.knowledge_node(Axis::Translation, "translate");
        fx.track(translate, Axis::Translation, 0.2, 1);

        let scheduler = fx.scheduler();
        let plan = scheduler.build_session(
            "amina",
            SessionMode::Balanced,
            Some(&[Axis::Tajweed]),
            10,
            false,
            ts(),
        );
        assert!(plan.is_empty());
    }
}
