use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::VisibilityParams;
use crate::graph::{Axis, NodeId};
use crate::signal::{visibility_from_energy, Visibility};

/// Scheduling and mastery record for one (learner, node) pair. Created on
/// first exposure, mutated by every review and every inbound propagation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryState {
    pub learner: String,
    pub node: NodeId,
    pub axis: Option<Axis>,
    /// Oracle stability; zero until the first review.
    pub stability: f64,
    /// Oracle difficulty on its 1..10 scale; zero until the first review.
    pub difficulty: f64,
    /// The engine's own mastery estimate, always clamped to [0, 1].
    pub energy: f64,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub due_at: DateTime<Utc>,
    pub review_count: u32,
}

impl MemoryState {
    /// Record for a node the learner has never reviewed: near-zero energy,
    /// due immediately. The store never fabricates these; callers do.
    pub fn fresh(
        learner: impl Into<String>,
        node: NodeId,
        axis: Option<Axis>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            learner: learner.into(),
            node,
            axis,
            stability: 0.0,
            difficulty: 0.0,
            energy: 0.0,
            last_reviewed: None,
            due_at: now,
            review_count: 0,
        }
    }

    /// Additive energy update, clamped to keep the [0, 1] invariant under
    /// any delta.
    pub fn apply_energy_delta(&mut self, delta: f64) {
        self.energy = (self.energy + delta).clamp(0.0, 1.0);
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }
}

/// Per-learner tier tallies for operational tooling.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LearnerCounts {
    pub tracked: usize,
    pub due: usize,
    pub visible: usize,
    pub obscured: usize,
    pub hidden: usize,
}

/// Durable keyed store for MemoryState. A missing record means "never
/// reviewed"; implementations must not invent defaults.
pub trait MemoryStore: Send + Sync {
    fn get(&self, learner: &str, node: NodeId) -> Option<MemoryState>;

    fn upsert(&self, state: MemoryState);

    /// Records due strictly before or at `before`, ordered by due-at
    /// ascending with ties broken by node id. When `axis_filter` is
    /// present only records on a listed axis are returned.
    fn get_due(
        &self,
        learner: &str,
        before: DateTime<Utc>,
        limit: usize,
        axis_filter: Option<&[Axis]>,
    ) -> Vec<MemoryState>;

    /// Drop the record entirely (progress reset). Returns whether one
    /// existed.
    fn remove(&self, learner: &str, node: NodeId) -> bool;

    fn counts(
        &self,
        learner: &str,
        now: DateTime<Utc>,
        visibility: &VisibilityParams,
    ) -> LearnerCounts;
}

#[derive(Debug, Default)]
struct LearnerShard {
    records: HashMap<NodeId, MemoryState>,
    /// (due-at micros, node) kept in sync with `records`; makes get_due an
    /// ordered scan instead of a full sort.
    due_index: BTreeSet<(i64, NodeId)>,
}

impl LearnerShard {
    fn upsert(&mut self, state: MemoryState) {
        if let Some(prev) = self.records.get(&state.node) {
            self.due_index
                .remove(&(prev.due_at.timestamp_micros(), prev.node));
        }
        self.due_index
            .insert((state.due_at.timestamp_micros(), state.node));
        self.records.insert(state.node, state);
    }

    fn remove(&mut self, node: NodeId) -> bool {
        match self.records.remove(&node) {
            Some(prev) => {
                self.due_index
                    .remove(&(prev.due_at.timestamp_micros(), prev.node));
                true
            }
            None => false,
        }
    }
}

/// In-memory store sharded by learner: one learner's mutations never
/// contend with another's, and there is no store-wide lock.
#[derive(Debug, Default)]
pub struct InMemoryMemoryStore {
    shards: DashMap<String, LearnerShard>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryStore for InMemoryMemoryStore {
    fn get(&self, learner: &str, node: NodeId) -> Option<MemoryState> {
        self.shards
            .get(learner)
            .and_then(|shard| shard.records.get(&node).cloned())
    }

    fn upsert(&self, state: MemoryState) {
        self.shards
            .entry(state.learner.clone())
            .or_default()
            .upsert(state);
    }

    fn get_due(
        &self,
        learner: &str,
        before: DateTime<Utc>,
        limit: usize,
        axis_filter: Option<&[Axis]>,
    ) -> Vec<MemoryState> {
        let Some(shard) = self.shards.get(learner) else {
            return Vec::new();
        };
        let cutoff = before.timestamp_micros();

        let mut out = Vec::new();
        for &(due_micros, node) in shard.due_index.iter() {
            if due_micros > cutoff || out.len() >= limit {
                break;
            }
            let Some(record) = shard.records.get(&node) else {
                continue;
            };
            if let Some(filter) = axis_filter {
                match record.axis {
                    Some(axis) if filter.contains(&axis) => {}
                    _ => continue,
                }
            }
            out.push(record.clone());
        }
        out
    }

    fn remove(&self, learner: &str, node: NodeId) -> bool {
        self.shards
            .get_mut(learner)
            .map(|mut shard| shard.remove(node))
            .unwrap_or(false)
    }

    fn counts(
        &self,
        learner: &str,
        now: DateTime<Utc>,
        visibility: &VisibilityParams,
    ) -> LearnerCounts {
        let Some(shard) = self.shards.get(learner) else {
            return LearnerCounts::default();
        };

        let mut counts = LearnerCounts {
            tracked: shard.records.len(),
            ..Default::default()
        };
        for record in shard.records.values() {
            if record.is_due(now) {
                counts.due += 1;
            }
            match visibility_from_energy(record.energy, visibility) {
                Visibility::Visible => counts.visible += 1,
                Visibility::Obscured { .. } => counts.obscured += 1,
                Visibility::Hidden => counts.hidden += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(learner: &str, node: u32, due_secs: i64, axis: Option<Axis>) -> MemoryState {
        let mut state = MemoryState::fresh(learner, NodeId(node), axis, ts(due_secs));
        state.energy = 0.3;
        state
    }

    #[test]
    fn missing_record_is_none() {
        let store = InMemoryMemoryStore::new();
        assert!(store.get("amina", NodeId(0)).is_none());
    }

    #[test]
    fn upsert_then_get() {
        let store = InMemoryMemoryStore::new();
        store.upsert(record("amina", 1, 0, Some(Axis::Memorization)));
        let state = store.get("amina", NodeId(1)).unwrap();
        assert_eq!(state.node, NodeId(1));
        assert_eq!(state.axis, Some(Axis::Memorization));
    }

    #[test]
    fn learners_are_isolated() {
        let store = InMemoryMemoryStore::new();
        store.upsert(record("amina", 1, 0, None));
        assert!(store.get("bilal", NodeId(1)).is_none());
    }

    #[test]
    fn get_due_orders_by_due_then_node() {
        let store = InMemoryMemoryStore::new();
        store.upsert(record("amina", 3, 10, Some(Axis::Memorization)));
        store.upsert(record("amina", 1, 10, Some(Axis::Memorization)));
        store.upsert(record("amina", 2, 5, Some(Axis::Memorization)));
        store.upsert(record("amina", 4, 99_999, Some(Axis::Memorization)));

        let due = store.get_due("amina", ts(60), 10, None);
        let nodes: Vec<NodeId> = due.iter().map(|s| s.node).collect();
        assert_eq!(nodes, vec![NodeId(2), NodeId(1), NodeId(3)]);
    }

    #[test]
    fn get_due_prefix_is_stable() {
        let store = InMemoryMemoryStore::new();
        for i in 0..20 {
            store.upsert(record("amina", i, i64::from(i % 7), None));
        }
        let first = store.get_due("amina", ts(100), 5, None);
        let second = store.get_due("amina", ts(100), 10, None);
        let first_nodes: Vec<NodeId> = first.iter().map(|s| s.node).collect();
        let prefix: Vec<NodeId> = second.iter().take(5).map(|s| s.node).collect();
        assert_eq!(first_nodes, prefix);
    }

    #[test]
    fn axis_filter_excludes_other_axes() {
        let store = InMemoryMemoryStore::new();
        store.upsert(record("amina", 1, 0, Some(Axis::Memorization)));
        store.upsert(record("amina", 2, 0, Some(Axis::Translation)));
        store.upsert(record("amina", 3, 0, None));

        let due = store.get_due("amina", ts(60), 10, Some(&[Axis::Memorization]));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].node, NodeId(1));
    }

    #[test]
    fn upsert_moves_due_index_entry() {
        let store = InMemoryMemoryStore::new();
        store.upsert(record("amina", 1, 0, None));

        let mut state = store.get("amina", NodeId(1)).unwrap();
        state.due_at = ts(1_000_000);
        store.upsert(state);

        assert!(store.get_due("amina", ts(60), 10, None).is_empty());
        let later = store.get_due("amina", ts(2_000_000), 10, None);
        assert_eq!(later.len(), 1);
    }

    #[test]
    fn energy_clamps_on_adversarial_delta() {
        let mut state = record("amina", 1, 0, None);
        state.apply_energy_delta(50.0);
        assert_eq!(state.energy, 1.0);
        state.apply_energy_delta(-99.0);
        assert_eq!(state.energy, 0.0);
    }

    #[test]
    fn remove_clears_record_and_index() {
        let store = InMemoryMemoryStore::new();
        store.upsert(record("amina", 1, 0, None));
        assert!(store.remove("amina", NodeId(1)));
        assert!(!store.remove("amina", NodeId(1)));
        assert!(store.get("amina", NodeId(1)).is_none());
        assert!(store.get_due("amina", ts(60), 10, None).is_empty());
    }

    #[test]
    fn counts_tally_tiers() {
        let store = InMemoryMemoryStore::new();
        let visibility = VisibilityParams::default();

        let mut low = record("amina", 1, 0, None);
        low.energy = 0.1;
        let mut mid = record("amina", 2, 0, None);
        mid.energy = 0.5;
        let mut high = record("amina", 3, 1_000_000, None);
        high.energy = 0.95;
        for state in [low, mid, high] {
            store.upsert(state);
        }

        let counts = store.counts("amina", ts(60), &visibility);
        assert_eq!(counts.tracked, 3);
        assert_eq!(counts.due, 2);
        assert_eq!(counts.visible, 1);
        assert_eq!(counts.obscured, 1);
        assert_eq!(counts.hidden, 1);
    }
}
