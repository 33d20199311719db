pub mod model;
pub mod store;

pub use model::{Axis, Edge, EdgeKind, EdgeWeight, Node, NodeId, NodeKind};
pub use store::{Goal, GraphSource, InMemoryGraph};
