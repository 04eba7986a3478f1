//! Base→derived propagation.
//!
//! After the interceptor finishes on a node, every derived counterpart is
//! reconciled: non-overridden values re-follow the base, missing base items
//! are brought in under their base ids, and inherited items the base no
//! longer has are dropped. All writes run under the `UpdatingFromBase`
//! guard so they are never mistaken for local overrides.

use super::PrototypeGraph;
use crate::error::OverrideError;
use crate::item_id::ItemId;
use archetype_graph::{Content, ItemIndex, NodeId};
use log::{debug, trace};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Value,
    Object,
    List,
    Map,
}

impl PrototypeGraph {
    fn shape_of(&self, node: NodeId) -> Shape {
        match self.graph().node(node).content() {
            Content::Value(_) => Shape::Value,
            Content::Object(_) => Shape::Object,
            Content::List(_) => Shape::List,
            Content::Map(_) => Shape::Map,
        }
    }

    /// Reconciles every derived counterpart of `node`, unless propagation is
    /// disabled for this session.
    pub(crate) fn propagate(&mut self, node: NodeId) -> Result<(), OverrideError> {
        if !self.propagate_from_base() {
            return Ok(());
        }
        let derived = self.derivations_of(node);
        if derived.is_empty() {
            return Ok(());
        }
        debug!("propagating {node:?} into {} derived node(s)", derived.len());
        self.with_updating_from_base(|g| {
            for d in derived {
                g.reconcile(d)?;
            }
            Ok(())
        })
    }

    /// Makes `derived` follow its base again wherever it is not pinned.
    pub(crate) fn reconcile(&mut self, derived: NodeId) -> Result<(), OverrideError> {
        let Some(base) = self.base(derived) else {
            return Ok(());
        };
        let policy = self.graph().node(derived).policy();
        // Non-overridable and opaque members are never reconciled; a pinned
        // node keeps its whole subtree.
        if !policy.overridable || !policy.identifiable_content || self.is_pinned(derived) {
            return Ok(());
        }
        match (self.shape_of(derived), self.shape_of(base)) {
            (Shape::Object, Shape::Object) => {
                for (name, member_b) in self.graph().members(base) {
                    if let Some(member_d) = self.graph().member(derived, &name) {
                        if self.base(member_d) != Some(member_b) {
                            self.set_base(member_d, Some(member_b));
                        }
                        self.reconcile(member_d)?;
                    }
                }
                Ok(())
            }
            (Shape::List, Shape::List) | (Shape::Map, Shape::Map) => {
                self.reconcile_collection(derived, base)
            }
            _ => self.reconcile_value(derived, base),
        }
    }

    /// Copies the base value down wholesale when it differs, rebuilding the
    /// derived subtree and re-linking it to the base.
    fn reconcile_value(&mut self, derived: NodeId, base: NodeId) -> Result<(), OverrideError> {
        let base_view = self.graph().retrieve(base);
        if self.graph().retrieve(derived) == base_view {
            return Ok(());
        }
        trace!("copying base value of {base:?} into {derived:?}");
        let orphans = self.descendants_of(derived);
        self.graph_mut().set_value(derived, base_view);
        self.unlink_orphans(orphans);
        self.link_to_base(derived, base);
        Ok(())
    }

    fn reconcile_collection(&mut self, derived: NodeId, base: NodeId) -> Result<(), OverrideError> {
        // Collections without identity metadata reconcile by value.
        if !self.graph().node(derived).policy().identifiable_items
            || !self.graph().node(base).policy().identifiable_items
        {
            return self.reconcile_value(derived, base);
        }
        self.attach_identifiers(base);
        self.attach_identifiers(derived);

        // Snapshot both sides up front; the mediated operations below shift
        // live positions as they go.
        let base_entries: Vec<(ItemIndex, ItemId)> = self
            .graph()
            .indices(base)
            .into_iter()
            .filter_map(|ix| self.try_index_to_id(base, &ix).map(|id| (ix, id)))
            .collect();
        let base_ids: HashSet<ItemId> = base_entries.iter().map(|(_, id)| *id).collect();
        let derived_live = self.identifiers(derived)?.live_ids();

        // Inherited items the base no longer has are dropped; overridden
        // additions stay.
        for id in derived_live {
            if base_ids.contains(&id) {
                continue;
            }
            if self
                .collection_state(derived)
                .is_some_and(|s| s.item_state(id).is_new())
            {
                continue;
            }
            if let Some(index) = self.try_id_to_index(derived, id) {
                trace!("dropping inherited item {id} absent from base");
                self.remove_item_at(derived, &index)?;
            }
        }

        // Base items this collection lacks come in under their base id,
        // unless tombstoned here or their key slot is occupied locally.
        for (base_index, id) in &base_entries {
            let blocked = self.collection_state(derived).is_some_and(|s| {
                s.disconnected.contains(id)
                    || s.ids.as_ref().is_some_and(|ids| ids.is_deleted(*id))
            });
            if blocked || self.try_id_to_index(derived, *id).is_some() {
                continue;
            }
            if matches!(base_index, ItemIndex::Key(_))
                && self.graph().item_node(derived, base_index).is_some()
            {
                continue;
            }
            let Some(value) = self.graph().retrieve_item(base, base_index) else {
                continue;
            };
            let target = match base_index {
                ItemIndex::Ordinal(i) => {
                    ItemIndex::Ordinal((*i).min(self.graph().item_count(derived)))
                }
                other => other.clone(),
            };
            trace!("bringing in base item {id} at {target}");
            self.set_restoring_id(Some(*id));
            let result = self.insert_item_at(derived, target, value);
            self.set_restoring_id(None);
            result?;
        }

        // Matched ids: link the item pair and recurse.
        for (base_index, id) in &base_entries {
            let Some(derived_index) = self.try_id_to_index(derived, *id) else {
                continue;
            };
            let (Some(item_b), Some(item_d)) = (
                self.graph().item_node(base, base_index),
                self.graph().item_node(derived, &derived_index),
            ) else {
                continue;
            };
            if self.base(item_d) != Some(item_b) {
                self.set_base(item_d, Some(item_b));
            }
            self.reconcile(item_d)?;
        }
        Ok(())
    }

    /// Recursively associates a freshly copied subtree with its base:
    /// members match by name, list items positionally (the copy preserves
    /// order), map items by key. Identifiable collections adopt the base's
    /// registry verbatim so inherited entries keep base-compatible ids.
    pub(crate) fn link_to_base(&mut self, derived: NodeId, base: NodeId) {
        self.set_base(derived, Some(base));
        self.adopt_base_identifiers(derived, base);
        match (self.shape_of(derived), self.shape_of(base)) {
            (Shape::Object, Shape::Object) => {
                for (name, member_b) in self.graph().members(base) {
                    if let Some(member_d) = self.graph().member(derived, &name) {
                        self.link_to_base(member_d, member_b);
                    }
                }
            }
            (Shape::List, Shape::List) => {
                let base_children = self.graph().children(base);
                let derived_children = self.graph().children(derived);
                for (d, b) in derived_children.into_iter().zip(base_children) {
                    self.link_to_base(d, b);
                }
            }
            (Shape::Map, Shape::Map) => {
                for index in self.graph().indices(base) {
                    let (Some(item_b), Some(item_d)) = (
                        self.graph().item_node(base, &index),
                        self.graph().item_node(derived, &index),
                    ) else {
                        continue;
                    };
                    self.link_to_base(item_d, item_b);
                }
            }
            _ => {}
        }
    }

    fn adopt_base_identifiers(&mut self, derived: NodeId, base: NodeId) {
        self.attach_identifiers(base);
        match self.item_identifiers(base).cloned() {
            Some(base_ids) => self.collection_state_mut(derived).ids = Some(base_ids),
            None => {
                // The base side carries no registry here; a stale one on the
                // derived side would map into discarded content.
                if let Some(state) = self.collections.get_mut(&derived) {
                    state.ids = None;
                }
            }
        }
    }
}
