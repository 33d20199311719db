//! Adaptive spaced-repetition engine over a fixed text corpus modeled as
//! a knowledge graph.
//!
//! Given a learner, the engine decides what to review next, updates
//! mastery after every response, and diffuses the consequences of that
//! response to related graph nodes (shared roots, lemmas, repeated
//! phrases).
//!
//! - [`graph`] - content nodes, typed weighted edges, goals
//! - [`store`] - per-(learner, node) memory state
//! - [`oracle`] - pluggable stability/difficulty scheduling
//! - [`signal`] - latency/struggle → grade and delta; energy → visibility
//! - [`propagation`] - bounded diffusion of mastery changes
//! - [`scheduler`] - due-item ranking into ordered sessions
//! - [`engine`] - the composed review pipeline

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod logging;
pub mod oracle;
pub mod propagation;
pub mod scheduler;
pub mod signal;
pub mod store;

pub use config::EngineConfig;
pub use engine::{PropagationSummary, ReviewEngine, ReviewOutcome};
pub use error::{EngineError, EngineResult};
pub use graph::{Axis, Edge, EdgeKind, EdgeWeight, Goal, GraphSource, InMemoryGraph, Node, NodeId, NodeKind};
pub use oracle::{FsrsOracle, FsrsParams, Grade, SchedulingOracle, SchedulingUpdate};
pub use propagation::{
    PropagationDetail, PropagationEngine, PropagationEvent, PropagationLog, WeightStrategy,
};
pub use scheduler::{EntryOrigin, SessionEntry, SessionMode, SessionPlan};
pub use signal::{grade_from_latency, regress_one_step, visibility_from_energy, Visibility};
pub use store::{InMemoryMemoryStore, LearnerCounts, MemoryState, MemoryStore};
