//! The override engine.
//!
//! [`PrototypeGraph`] owns the value graph and every side table attached to
//! it. All mutations flow through the engine: it performs the raw graph
//! operation, consumes the returned change record (the interceptor), keeps
//! identity and override state consistent, and propagates base-side changes
//! into derived counterparts. Re-entrancy is controlled by two scoped guard
//! counters rather than flags mutated ad hoc, so a `?` exit can never leave
//! the engine wedged in a suppressed state.

mod events;
mod intercept;
mod reconcile;
mod reset;

pub use events::OverrideChange;

use crate::error::OverrideError;
use crate::identifiers::ItemIdentifiers;
use crate::item_id::ItemId;
use crate::overrides::{CollectionOverrides, OverrideState};
use archetype_graph::{Content, Graph, ItemIndex, Json, NodeId, NodePolicy, ParentLink};
use log::debug;
use std::collections::{BTreeMap, HashMap};

type Listener = Box<dyn FnMut(&OverrideChange) + Send + Sync>;

/// Which per-entry override table a collection mutation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryTable {
    Items,
    Keys,
}

pub struct PrototypeGraph {
    graph: Graph,
    member_overrides: HashMap<NodeId, OverrideState>,
    collections: HashMap<NodeId, CollectionOverrides>,
    bases: HashMap<NodeId, NodeId>,
    derivations: HashMap<NodeId, Vec<NodeId>>,
    propagate_from_base: bool,
    resetting_override: u32,
    updating_from_base: u32,
    restoring_id: Option<ItemId>,
    discarding: u32,
    next_listener_id: u64,
    changing_listeners: BTreeMap<u64, Listener>,
    changed_listeners: BTreeMap<u64, Listener>,
}

impl Default for PrototypeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PrototypeGraph {
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
            member_overrides: HashMap::new(),
            collections: HashMap::new(),
            bases: HashMap::new(),
            derivations: HashMap::new(),
            propagate_from_base: true,
            resetting_override: 0,
            updating_from_base: 0,
            restoring_id: None,
            discarding: 0,
            next_listener_id: 1,
            changing_listeners: BTreeMap::new(),
            changed_listeners: BTreeMap::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    // ----- construction ---------------------------------------------------

    pub fn insert_root(&mut self) -> NodeId {
        self.graph.insert_root()
    }

    pub fn insert_member(
        &mut self,
        object: NodeId,
        name: &str,
        value: Json,
    ) -> Result<NodeId, OverrideError> {
        self.insert_member_with_policy(object, name, value, NodePolicy::default())
    }

    pub fn insert_member_with_policy(
        &mut self,
        object: NodeId,
        name: &str,
        value: Json,
        policy: NodePolicy,
    ) -> Result<NodeId, OverrideError> {
        let member = self
            .graph
            .insert_member_with_policy(object, name, value, policy)?;
        self.attach_identifiers_recursively(member);
        Ok(member)
    }

    // ----- derivation & base links ---------------------------------------

    /// Deep-clones `base_root` into a new derived root. Every node in the
    /// clone is linked to its source, and identifiable collections copy the
    /// base's item identifiers verbatim: a freshly derived entry is
    /// inherited, so its id must match the base's.
    pub fn derive(&mut self, base_root: NodeId) -> NodeId {
        self.attach_identifiers_recursively(base_root);
        let derived = self.graph.clone_subtree(base_root);
        self.link_to_base(derived, base_root);
        debug!("derived {derived:?} from {base_root:?}");
        derived
    }

    /// Stores or clears the non-owning base association of a node, keeping
    /// the reverse derivation table in sync.
    pub fn set_base(&mut self, node: NodeId, base: Option<NodeId>) {
        if let Some(old) = self.bases.remove(&node) {
            if let Some(list) = self.derivations.get_mut(&old) {
                list.retain(|&d| d != node);
            }
        }
        if let Some(base) = base {
            self.bases.insert(node, base);
            self.derivations.entry(base).or_default().push(node);
        }
    }

    pub fn base(&self, node: NodeId) -> Option<NodeId> {
        self.bases.get(&node).copied()
    }

    /// Session-wide switch for base→derived propagation. While off, base
    /// changes are not copied down and derived-side edits are not marked as
    /// overrides.
    pub fn propagate_from_base(&self) -> bool {
        self.propagate_from_base
    }

    pub fn set_propagate_from_base(&mut self, enabled: bool) {
        self.propagate_from_base = enabled;
    }

    // ----- member overrides -----------------------------------------------

    /// Explicitly pins (`true`) or releases (`false`) a member. Silently
    /// ignored for members policy-marked non-overridable; no events fire in
    /// that case.
    pub fn override_content(&mut self, node: NodeId, is_overridden: bool) {
        if !self.graph.node(node).policy().overridable {
            return;
        }
        let change = OverrideChange {
            node,
            index: ItemIndex::Empty,
            item_id: ItemId::EMPTY,
            previous: self.member_state(node),
            current: OverrideState::from_overridden(is_overridden),
        };
        self.emit_changing(&change);
        if is_overridden {
            self.member_overrides.insert(node, OverrideState::New);
        } else {
            self.member_overrides.remove(&node);
        }
        self.emit_changed(&change);
    }

    pub(crate) fn member_state(&self, node: NodeId) -> OverrideState {
        self.member_overrides.get(&node).copied().unwrap_or_default()
    }

    pub fn is_overridden(&self, node: NodeId) -> bool {
        self.member_state(node).is_new()
    }

    /// A node is inherited when it has a base and is not overridden; with
    /// no base there is nothing to inherit from.
    pub fn is_inherited(&self, node: NodeId) -> bool {
        self.base(node).is_some() && !self.is_overridden(node)
    }

    // ----- item & key overrides -------------------------------------------

    pub fn override_item(
        &mut self,
        node: NodeId,
        is_overridden: bool,
        index: &ItemIndex,
    ) -> Result<(), OverrideError> {
        let id = self.index_to_id(node, index)?;
        self.write_entry_override(node, id, index.clone(), is_overridden, EntryTable::Items);
        Ok(())
    }

    pub fn override_key(
        &mut self,
        node: NodeId,
        is_overridden: bool,
        index: &ItemIndex,
    ) -> Result<(), OverrideError> {
        let id = self.index_to_id(node, index)?;
        self.write_entry_override(node, id, index.clone(), is_overridden, EntryTable::Keys);
        Ok(())
    }

    pub(crate) fn write_entry_override(
        &mut self,
        node: NodeId,
        id: ItemId,
        index: ItemIndex,
        is_overridden: bool,
        table: EntryTable,
    ) {
        let previous = match (self.collections.get(&node), table) {
            (Some(state), EntryTable::Items) => state.item_state(id),
            (Some(state), EntryTable::Keys) => state.key_state(id),
            (None, _) => OverrideState::Base,
        };
        let change = OverrideChange {
            node,
            index,
            item_id: id,
            previous,
            current: OverrideState::from_overridden(is_overridden),
        };
        self.emit_changing(&change);
        let state = self.collections.entry(node).or_default();
        let map = match table {
            EntryTable::Items => &mut state.items,
            EntryTable::Keys => &mut state.keys,
        };
        if is_overridden {
            map.insert(id, OverrideState::New);
        } else {
            map.remove(&id);
        }
        self.emit_changed(&change);
    }

    /// Records or clears an overridden deletion: both the override entry and
    /// the tombstone in the identity registry, together.
    pub fn override_deleted_item(
        &mut self,
        node: NodeId,
        is_overridden: bool,
        deleted_id: ItemId,
    ) -> Result<(), OverrideError> {
        let previous = match self.collections.get(&node) {
            Some(state) if state.ids.is_some() => state.item_state(deleted_id),
            _ => return Err(OverrideError::MissingItemIds),
        };
        let index = self
            .try_id_to_index(node, deleted_id)
            .unwrap_or(ItemIndex::Empty);
        let change = OverrideChange {
            node,
            index,
            item_id: deleted_id,
            previous,
            current: OverrideState::from_overridden(is_overridden),
        };
        self.emit_changing(&change);
        if let Some(state) = self.collections.get_mut(&node) {
            if let Some(ids) = state.ids.as_mut() {
                if is_overridden {
                    state.items.insert(deleted_id, OverrideState::New);
                    ids.mark_deleted(deleted_id);
                } else {
                    state.items.remove(&deleted_id);
                    ids.unmark_deleted(deleted_id);
                }
            }
        }
        self.emit_changed(&change);
        Ok(())
    }

    /// Drops `deleted_id` from the live tombstone set (so the id can be
    /// re-inserted) while remembering the deletion in the transient ledger,
    /// so `is_item_deleted` keeps answering for undo machinery.
    pub fn disconnect_overridden_deleted_item(
        &mut self,
        node: NodeId,
        deleted_id: ItemId,
    ) -> Result<(), OverrideError> {
        let Some(state) = self.collections.get_mut(&node) else {
            return Err(OverrideError::MissingItemIds);
        };
        let Some(ids) = state.ids.as_mut() else {
            return Err(OverrideError::MissingItemIds);
        };
        ids.unmark_deleted(deleted_id);
        state.disconnected.insert(deleted_id);
        Ok(())
    }

    // ----- queries --------------------------------------------------------

    pub fn is_item_overridden(&self, node: NodeId, index: &ItemIndex) -> bool {
        self.try_index_to_id(node, index)
            .and_then(|id| self.collections.get(&node).map(|s| s.item_state(id)))
            .is_some_and(OverrideState::is_new)
    }

    pub fn is_key_overridden(&self, node: NodeId, index: &ItemIndex) -> bool {
        self.try_index_to_id(node, index)
            .and_then(|id| self.collections.get(&node).map(|s| s.key_state(id)))
            .is_some_and(OverrideState::is_new)
    }

    /// Whether `id` is tombstoned on this collection, answering from the
    /// transient disconnect ledger first. Errs when the collection has no
    /// identity metadata at all and the ledger does not know the id.
    pub fn is_item_deleted(&self, node: NodeId, id: ItemId) -> Result<bool, OverrideError> {
        if let Some(state) = self.collections.get(&node) {
            if state.disconnected.contains(&id) {
                return Ok(true);
            }
            if let Some(ids) = state.ids.as_ref() {
                return Ok(ids.is_deleted(id));
            }
        }
        Err(OverrideError::MissingItemIds)
    }

    pub fn is_item_overridden_deleted(&self, node: NodeId, id: ItemId) -> bool {
        let Some(state) = self.collections.get(&node) else {
            return false;
        };
        let deleted = state.disconnected.contains(&id)
            || state.ids.as_ref().is_some_and(|ids| ids.is_deleted(id));
        deleted && state.item_state(id).is_new()
    }

    /// Positions of currently-overridden, non-deleted items. Empty when the
    /// node has no base: with nothing to inherit from, override state is
    /// irrelevant.
    pub fn overridden_item_indices(&self, node: NodeId) -> Vec<ItemIndex> {
        self.overridden_indices(node, EntryTable::Items)
    }

    pub fn overridden_key_indices(&self, node: NodeId) -> Vec<ItemIndex> {
        self.overridden_indices(node, EntryTable::Keys)
    }

    fn overridden_indices(&self, node: NodeId, table: EntryTable) -> Vec<ItemIndex> {
        if self.base(node).is_none() {
            return Vec::new();
        }
        let Some(state) = self.collections.get(&node) else {
            return Vec::new();
        };
        let Some(ids) = state.ids.as_ref() else {
            return Vec::new();
        };
        let map = match table {
            EntryTable::Items => &state.items,
            EntryTable::Keys => &state.keys,
        };
        let mut out: Vec<ItemIndex> = map
            .iter()
            .filter(|(id, st)| st.is_new() && !ids.is_deleted(**id))
            .filter_map(|(id, _)| ids.try_id_to_index(*id))
            .collect();
        out.sort();
        out
    }

    // ----- identity mapping -----------------------------------------------

    pub fn index_to_id(&self, node: NodeId, index: &ItemIndex) -> Result<ItemId, OverrideError> {
        if index.is_empty() {
            return Ok(ItemId::EMPTY);
        }
        self.identifiers(node)?.index_to_id(index)
    }

    pub fn id_to_index(&self, node: NodeId, id: ItemId) -> Result<ItemIndex, OverrideError> {
        if id.is_empty() {
            return Ok(ItemIndex::Empty);
        }
        self.identifiers(node)?.id_to_index(id)
    }

    pub fn try_index_to_id(&self, node: NodeId, index: &ItemIndex) -> Option<ItemId> {
        if index.is_empty() {
            return Some(ItemId::EMPTY);
        }
        self.collections
            .get(&node)?
            .ids
            .as_ref()?
            .try_index_to_id(index)
    }

    pub fn try_id_to_index(&self, node: NodeId, id: ItemId) -> Option<ItemIndex> {
        if id.is_empty() {
            return Some(ItemIndex::Empty);
        }
        self.collections
            .get(&node)?
            .ids
            .as_ref()?
            .try_id_to_index(id)
    }

    /// Read access to a collection's identity registry, if it has one.
    pub fn item_identifiers(&self, node: NodeId) -> Option<&ItemIdentifiers> {
        self.collections.get(&node).and_then(|s| s.ids.as_ref())
    }

    pub(crate) fn identifiers(&self, node: NodeId) -> Result<&ItemIdentifiers, OverrideError> {
        self.item_identifiers(node)
            .ok_or(OverrideError::MissingItemIds)
    }

    pub(crate) fn identifiers_mut(
        &mut self,
        node: NodeId,
    ) -> Result<&mut ItemIdentifiers, OverrideError> {
        self.collections
            .get_mut(&node)
            .and_then(|s| s.ids.as_mut())
            .ok_or(OverrideError::MissingItemIds)
    }

    pub(crate) fn collection_state(&self, node: NodeId) -> Option<&CollectionOverrides> {
        self.collections.get(&node)
    }

    pub(crate) fn collection_state_mut(&mut self, node: NodeId) -> &mut CollectionOverrides {
        self.collections.entry(node).or_default()
    }

    // ----- identity metadata lifecycle ------------------------------------

    /// Generates identity metadata for an identifiable collection node that
    /// does not have it yet. No-op for scalars, objects, and collections
    /// policy-marked non-identifiable.
    pub(crate) fn attach_identifiers(&mut self, node: NodeId) {
        if !self.graph.node(node).policy().identifiable_items {
            return;
        }
        if self
            .collections
            .get(&node)
            .is_some_and(|state| state.ids.is_some())
        {
            return;
        }
        let fresh = match self.graph.node(node).content() {
            Content::List(items) => ItemIdentifiers::fresh_ordered(items.len()),
            Content::Map(entries) => ItemIdentifiers::fresh_keyed(entries.keys().cloned()),
            _ => return,
        };
        self.collections.entry(node).or_default().ids = Some(fresh);
    }

    pub(crate) fn attach_identifiers_recursively(&mut self, node: NodeId) {
        self.attach_identifiers(node);
        for child in self.graph.children(node) {
            self.attach_identifiers_recursively(child);
        }
    }

    /// The node's value was swapped wholesale: its registry (and anything
    /// below) is stale and must be regenerated for the new content.
    pub(crate) fn refresh_identifiers_after_replace(&mut self, node: NodeId) {
        if let Some(state) = self.collections.get_mut(&node) {
            state.ids = None;
        }
        self.attach_identifiers_recursively(node);
    }

    // ----- traversal helpers ----------------------------------------------

    /// `node` plus every node reachable below it.
    pub(crate) fn subtree_of(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = vec![node];
        let mut cursor = 0;
        while cursor < out.len() {
            let next = out[cursor];
            out.extend(self.graph.children(next));
            cursor += 1;
        }
        out
    }

    /// Every node strictly below `node`.
    pub(crate) fn descendants_of(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        for child in self.graph.children(node) {
            out.extend(self.subtree_of(child));
        }
        out
    }

    /// Clears base links of nodes orphaned by a structural replacement, so
    /// stale derivation entries stop pointing into discarded subtrees.
    pub(crate) fn unlink_orphans(&mut self, orphans: Vec<NodeId>) {
        for orphan in orphans {
            self.set_base(orphan, None);
        }
    }

    // ----- re-entrancy guards ---------------------------------------------

    pub(crate) fn with_updating_from_base<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.updating_from_base += 1;
        let result = f(self);
        self.updating_from_base -= 1;
        result
    }

    pub(crate) fn with_resetting_override<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.resetting_override += 1;
        let result = f(self);
        self.resetting_override -= 1;
        result
    }

    /// True while a propagation or reset pass is writing values; the
    /// interceptor must not interpret those writes as local overrides.
    pub(crate) fn suppressing(&self) -> bool {
        self.updating_from_base > 0 || self.resetting_override > 0
    }

    pub(crate) fn take_restoring_id(&mut self) -> Option<ItemId> {
        self.restoring_id.take()
    }

    pub(crate) fn set_restoring_id(&mut self, id: Option<ItemId>) {
        self.restoring_id = id;
    }

    pub(crate) fn is_discarding(&self) -> bool {
        self.discarding > 0
    }

    pub(crate) fn with_discarding<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.discarding += 1;
        let result = f(self);
        self.discarding -= 1;
        result
    }

    /// Item nodes are pinned either through their own member flag or through
    /// the per-item override recorded on their parent collection.
    pub(crate) fn is_pinned(&self, node: NodeId) -> bool {
        if self.is_overridden(node) {
            return true;
        }
        if let ParentLink::Item { parent } = self.graph.node(node).link() {
            let parent = *parent;
            if let Some(index) = self.graph.index_of_child(parent, node) {
                if let Some(id) = self.try_index_to_id(parent, &index) {
                    if let Some(state) = self.collections.get(&parent) {
                        return state.item_state(id).is_new();
                    }
                }
            }
        }
        false
    }

    pub(crate) fn derivations_of(&self, node: NodeId) -> Vec<NodeId> {
        self.derivations.get(&node).cloned().unwrap_or_default()
    }
}
