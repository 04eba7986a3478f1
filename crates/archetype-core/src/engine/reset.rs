//! Reset-to-base and bulk override clearing.

use super::{EntryTable, OverrideChange, PrototypeGraph};
use crate::error::OverrideError;
use crate::item_id::ItemId;
use crate::overrides::OverrideState;
use archetype_graph::{ItemIndex, NodeId};
use log::debug;

impl PrototypeGraph {
    /// Clears every override below `node` (flags, item and key entries,
    /// tombstones), then reconciles the subtree so all values re-follow the
    /// base. Runs under the `ResettingOverride` guard so none of the writes
    /// are interpreted as fresh overrides. Subtrees with no base are left
    /// alone: there is nothing to inherit.
    pub fn reset_override_recursively(&mut self, node: NodeId) -> Result<(), OverrideError> {
        debug!("resetting overrides below {node:?}");
        self.with_resetting_override(|g| {
            g.clear_overrides_from(node, true);
            g.with_updating_from_base(|g| g.reconcile(node))
        })
    }

    /// Clears every override below `root` without touching values. Unlike
    /// reset, this also walks subtrees that have no base; it is the bulk
    /// "detach from archetype" operation.
    pub fn clear_all_overrides(&mut self, root: NodeId) {
        debug!("clearing all overrides below {root:?}");
        self.clear_overrides_from(root, false);
    }

    fn clear_overrides_from(&mut self, node: NodeId, stop_at_unbased: bool) {
        if stop_at_unbased && self.base(node).is_none() {
            return;
        }
        self.clear_node_overrides(node);
        for child in self.graph().children(node) {
            self.clear_overrides_from(child, stop_at_unbased);
        }
    }

    fn clear_node_overrides(&mut self, node: NodeId) {
        if self.member_state(node).is_new() {
            let change = OverrideChange {
                node,
                index: ItemIndex::Empty,
                item_id: ItemId::EMPTY,
                previous: OverrideState::New,
                current: OverrideState::Base,
            };
            self.emit_changing(&change);
            self.member_overrides.remove(&node);
            self.emit_changed(&change);
        }
        let mut entries: Vec<(ItemId, EntryTable)> = Vec::new();
        if let Some(state) = self.collection_state(node) {
            entries.extend(
                state
                    .items
                    .iter()
                    .filter(|(_, st)| st.is_new())
                    .map(|(id, _)| (*id, EntryTable::Items)),
            );
            entries.extend(
                state
                    .keys
                    .iter()
                    .filter(|(_, st)| st.is_new())
                    .map(|(id, _)| (*id, EntryTable::Keys)),
            );
        }
        for (id, table) in entries {
            let index = self.try_id_to_index(node, id).unwrap_or(ItemIndex::Empty);
            self.write_entry_override(node, id, index, false, table);
        }
        if let Some(state) = self.collections.get_mut(&node) {
            if let Some(ids) = state.ids.as_mut() {
                ids.clear_deleted();
            }
            state.disconnected.clear();
        }
    }
}
