use crate::item_id::ItemId;
use archetype_graph::{GraphError, ItemIndex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OverrideError {
    /// Identity metadata was expected on a collection node and is absent.
    /// Indicates a programming error upstream: the collection was never
    /// marked identifiable, or the query addressed the wrong node.
    #[error("collection has no item identifiers")]
    MissingItemIds,
    #[error("unknown item id {0}")]
    UnknownItemId(ItemId),
    #[error("no item occupies index {0}")]
    UnknownIndex(ItemIndex),
    #[error("an item was added to a collection without a predictable insertion point")]
    UnpredictableInsertionPoint,
    #[error(transparent)]
    Graph(#[from] GraphError),
}
