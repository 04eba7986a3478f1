//! Override tracking and stable item identity for prototype-derived graphs.
//!
//! A derived graph shares structure with a base graph. Every member or
//! collection entry of the derived graph is either *inherited* (its value
//! follows the base) or *overridden* (pinned locally). Collection entries
//! carry a stable [`ItemId`] assigned at creation and kept for the entry's
//! lifetime, so overrides and deletion tombstones stay meaningful while
//! positions shift.
//!
//! The engine lives in [`PrototypeGraph`]: it owns the value graph (an
//! [`archetype_graph::Graph`] arena), mediates every mutation, and keeps the
//! side tables — identity registries, override flags, base links, deletion
//! tombstones — consistent across base→derived propagation, reset-to-base,
//! and undo-style restore flows.

pub mod engine;
pub mod error;
pub mod identifiers;
pub mod item_id;
pub mod overrides;

pub use archetype_graph::{Graph, ItemIndex, Json, NodeId, NodePolicy};
pub use engine::{OverrideChange, PrototypeGraph};
pub use error::OverrideError;
pub use identifiers::ItemIdentifiers;
pub use item_id::ItemId;
pub use overrides::OverrideState;
