//! The change interceptor: every engine-mediated mutation lands here after
//! the raw graph operation, and the returned change record drives identity
//! and override bookkeeping.

use super::{EntryTable, OverrideChange, PrototypeGraph};
use crate::error::OverrideError;
use crate::item_id::ItemId;
use crate::overrides::OverrideState;
use archetype_graph::{ChangeKind, ItemChange, ItemIndex, Json, NodeId, ParentLink, ValueChange};
use log::trace;

impl PrototypeGraph {
    // ----- mediated mutation surface --------------------------------------

    /// Replaces the value of a node (member or item), then intercepts.
    pub fn set(&mut self, node: NodeId, value: Json) -> Result<(), OverrideError> {
        let orphans = self.descendants_of(node);
        let change = self.graph_mut().set_value(node, value);
        self.unlink_orphans(orphans);
        self.after_value_changed(&change)
    }

    pub fn insert_item(
        &mut self,
        node: NodeId,
        index: usize,
        value: Json,
    ) -> Result<(), OverrideError> {
        self.insert_item_at(node, ItemIndex::Ordinal(index), value)
    }

    pub fn push_item(&mut self, node: NodeId, value: Json) -> Result<ItemIndex, OverrideError> {
        let index = ItemIndex::Ordinal(self.graph().item_count(node));
        self.insert_item_at(node, index.clone(), value)?;
        Ok(index)
    }

    pub fn insert_entry(
        &mut self,
        node: NodeId,
        key: &str,
        value: Json,
    ) -> Result<(), OverrideError> {
        self.insert_item_at(node, ItemIndex::Key(key.to_owned()), value)
    }

    pub fn update_item(
        &mut self,
        node: NodeId,
        index: usize,
        value: Json,
    ) -> Result<(), OverrideError> {
        self.update_item_at(node, &ItemIndex::Ordinal(index), value)
    }

    pub fn update_entry(
        &mut self,
        node: NodeId,
        key: &str,
        value: Json,
    ) -> Result<(), OverrideError> {
        self.update_item_at(node, &ItemIndex::Key(key.to_owned()), value)
    }

    pub fn remove_item(&mut self, node: NodeId, index: usize) -> Result<(), OverrideError> {
        self.remove_item_at(node, &ItemIndex::Ordinal(index))
    }

    pub fn remove_entry(&mut self, node: NodeId, key: &str) -> Result<(), OverrideError> {
        self.remove_item_at(node, &ItemIndex::Key(key.to_owned()))
    }

    /// Re-inserts a previously deleted value under the id it used to carry,
    /// so overrides keyed by that id stay meaningful, then clears its
    /// deletion marks. Appends when no index is supplied.
    pub fn restore_item(
        &mut self,
        node: NodeId,
        value: Json,
        index: Option<usize>,
        id: ItemId,
    ) -> Result<ItemIndex, OverrideError> {
        let target = ItemIndex::Ordinal(index.unwrap_or_else(|| self.graph().item_count(node)));
        self.set_restoring_id(Some(id));
        let result = self.insert_item_at(node, target.clone(), value);
        self.set_restoring_id(None);
        result?;
        self.clear_deletion_marks(node, id);
        Ok(target)
    }

    pub fn restore_key(
        &mut self,
        node: NodeId,
        value: Json,
        key: &str,
        id: ItemId,
    ) -> Result<(), OverrideError> {
        self.set_restoring_id(Some(id));
        let result = self.insert_item_at(node, ItemIndex::Key(key.to_owned()), value);
        self.set_restoring_id(None);
        result?;
        self.clear_deletion_marks(node, id);
        Ok(())
    }

    /// Removes an item without recording an overridden deletion: the entry
    /// is discarded, not marked as a divergence from the base.
    pub fn remove_and_discard(
        &mut self,
        node: NodeId,
        index: &ItemIndex,
    ) -> Result<(), OverrideError> {
        let id = self.try_index_to_id(node, index).unwrap_or(ItemId::EMPTY);
        let result = self.with_discarding(|g| g.remove_item_at(node, index));
        result?;
        if !id.is_empty() {
            let state = self.collection_state_mut(node);
            state.items.remove(&id);
            state.keys.remove(&id);
            if let Some(ids) = state.ids.as_mut() {
                ids.unmark_deleted(id);
            }
            state.disconnected.remove(&id);
        }
        Ok(())
    }

    // ----- shared mediation paths -----------------------------------------

    pub(crate) fn insert_item_at(
        &mut self,
        node: NodeId,
        index: ItemIndex,
        value: Json,
    ) -> Result<(), OverrideError> {
        // The registry must describe the pre-mutation state, or the fresh
        // entry would be registered twice.
        self.attach_identifiers(node);
        let change = self.graph_mut().insert_item(node, index, value)?;
        self.after_item_changed(&change)
    }

    pub(crate) fn update_item_at(
        &mut self,
        node: NodeId,
        index: &ItemIndex,
        value: Json,
    ) -> Result<(), OverrideError> {
        self.attach_identifiers(node);
        let orphans = match self.graph().item_node(node, index) {
            Some(child) => self.descendants_of(child),
            None => Vec::new(),
        };
        let change = self.graph_mut().update_item(node, index, value)?;
        self.unlink_orphans(orphans);
        self.after_item_changed(&change)
    }

    pub(crate) fn remove_item_at(
        &mut self,
        node: NodeId,
        index: &ItemIndex,
    ) -> Result<(), OverrideError> {
        self.attach_identifiers(node);
        let orphans = match self.graph().item_node(node, index) {
            Some(child) => self.subtree_of(child),
            None => Vec::new(),
        };
        let change = self.graph_mut().remove_item(node, index)?;
        self.unlink_orphans(orphans);
        self.after_item_changed(&change)
    }

    fn clear_deletion_marks(&mut self, node: NodeId, id: ItemId) {
        let state = self.collection_state_mut(node);
        if let Some(ids) = state.ids.as_mut() {
            ids.unmark_deleted(id);
        }
        state.disconnected.remove(&id);
    }

    // ----- interception ---------------------------------------------------

    fn after_value_changed(&mut self, change: &ValueChange) -> Result<(), OverrideError> {
        let node = change.node;
        // The value (and anything nested in it) was rebuilt; regenerate
        // structural metadata before anything reads it.
        self.refresh_identifiers_after_replace(node);

        let policy = self.graph().node(node).policy();
        let marking = policy.identifiable_content
            && self.propagate_from_base()
            && !self.suppressing()
            && self.base(node).is_some();
        if marking {
            match self.graph().node(node).link().clone() {
                ParentLink::Item { parent } => {
                    // Direct write through an item node: the divergence is
                    // recorded on the parent collection, keyed by the
                    // item's stable id.
                    if let Some(index) = self.graph().index_of_child(parent, node) {
                        if let Some(id) = self.try_index_to_id(parent, &index) {
                            trace!("marking item {id} of {parent:?} overridden after direct write");
                            self.write_entry_override(parent, id, index, true, EntryTable::Items);
                        }
                    }
                }
                _ => {
                    if policy.overridable {
                        trace!("marking {node:?} overridden after direct write");
                        let ev = OverrideChange {
                            node,
                            index: ItemIndex::Empty,
                            item_id: ItemId::EMPTY,
                            previous: self.member_state(node),
                            current: OverrideState::New,
                        };
                        self.emit_changing(&ev);
                        self.member_overrides.insert(node, OverrideState::New);
                        self.emit_changed(&ev);
                    }
                }
            }
        }
        self.propagate(node)
    }

    fn after_item_changed(&mut self, change: &ItemChange) -> Result<(), OverrideError> {
        let node = change.collection;
        if self.graph().node(node).policy().identifiable_items {
            // Backfill metadata nested in the value that just landed.
            match change.kind {
                ChangeKind::Add => {
                    if let Some(child) = self.graph().item_node(node, &change.index) {
                        self.attach_identifiers_recursively(child);
                    }
                }
                ChangeKind::Update => {
                    // The item's value was rebuilt in place; its nested
                    // registries are stale.
                    if let Some(child) = self.graph().item_node(node, &change.index) {
                        self.refresh_identifiers_after_replace(child);
                    }
                }
                ChangeKind::Remove => {}
            }

            let overriding = self.propagate_from_base()
                && !self.suppressing()
                && self.base(node).is_some();

            match change.kind {
                ChangeKind::Update => {
                    // Same id keeps occupying the index.
                    if overriding {
                        let id = self.index_to_id(node, &change.index)?;
                        self.write_entry_override(
                            node,
                            id,
                            change.index.clone(),
                            true,
                            EntryTable::Items,
                        );
                    }
                }
                ChangeKind::Add => {
                    if change.index.is_empty() {
                        return Err(OverrideError::UnpredictableInsertionPoint);
                    }
                    let id = self.take_restoring_id().unwrap_or_else(ItemId::generate);
                    trace!("assigning {id} to {} of {node:?}", change.index);
                    self.identifiers_mut(node)?.insert(&change.index, id)?;
                    if overriding {
                        self.write_entry_override(
                            node,
                            id,
                            change.index.clone(),
                            true,
                            EntryTable::Items,
                        );
                    }
                }
                ChangeKind::Remove => {
                    let id = self.identifiers_mut(node)?.remove(&change.index)?;
                    trace!("retiring {id} from {} of {node:?}", change.index);
                    if !self.is_discarding() {
                        // A removal diverges from the base only when the
                        // base actually knows the removed id.
                        let base_has = self
                            .base(node)
                            .and_then(|b| self.item_identifiers(b))
                            .is_some_and(|ids| ids.contains_id(id));
                        self.override_deleted_item(node, overriding && base_has, id)?;
                    }
                }
            }
        }
        self.propagate(node)
    }
}
