//! Minimal reflective value graph decorated by the archetype override engine.
//!
//! Nodes live in an arena owned by [`Graph`]; "pointers" are [`NodeId`]
//! indices into that arena and are never invalidated while the graph lives,
//! so external side tables can safely key off them. Raw mutations return
//! change records ([`ValueChange`], [`ItemChange`]) instead of firing
//! callbacks; whoever owns the graph consumes them.

pub mod graph;
pub mod index;
pub mod policy;

pub use graph::{
    ChangeKind, Content, Graph, GraphError, ItemChange, Node, NodeId, ParentLink, ValueChange,
};
pub use index::ItemIndex;
pub use policy::NodePolicy;

/// Scalar payload type used throughout the graph.
pub type Json = serde_json::Value;
