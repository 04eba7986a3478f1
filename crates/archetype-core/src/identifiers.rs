//! Identity registry attached to collection-valued nodes.

use crate::error::OverrideError;
use crate::item_id::ItemId;
use archetype_graph::ItemIndex;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Position ↔ id table for one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum Slots {
    /// Ordered collections: the id at position `i` lives at slot `i`.
    Ordered(Vec<ItemId>),
    /// Keyed collections: ids are addressed by key, positions never shift.
    Keyed(IndexMap<String, ItemId>),
}

/// Identity registry for one collection-valued node.
///
/// Invariant: a bijection between currently-present positions and a subset
/// of known ids, plus a disjoint set of ids tombstoned as deleted (they
/// existed in the base and were intentionally removed here). The pair
/// `ItemId::EMPTY ↔ ItemIndex::Empty` is resolved without a lookup and is
/// never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemIdentifiers {
    slots: Slots,
    deleted: HashSet<ItemId>,
}

impl ItemIdentifiers {
    pub fn ordered() -> Self {
        Self {
            slots: Slots::Ordered(Vec::new()),
            deleted: HashSet::new(),
        }
    }

    pub fn keyed() -> Self {
        Self {
            slots: Slots::Keyed(IndexMap::new()),
            deleted: HashSet::new(),
        }
    }

    /// Ordered registry with a fresh id for each of `len` existing entries.
    pub fn fresh_ordered(len: usize) -> Self {
        Self {
            slots: Slots::Ordered((0..len).map(|_| ItemId::generate()).collect()),
            deleted: HashSet::new(),
        }
    }

    /// Keyed registry with a fresh id for each existing key.
    pub fn fresh_keyed<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            slots: Slots::Keyed(keys.into_iter().map(|k| (k, ItemId::generate())).collect()),
            deleted: HashSet::new(),
        }
    }

    pub fn is_keyed(&self) -> bool {
        matches!(self.slots, Slots::Keyed(_))
    }

    /// Number of currently-present entries (tombstones excluded).
    pub fn len(&self) -> usize {
        match &self.slots {
            Slots::Ordered(slots) => slots.len(),
            Slots::Keyed(slots) => slots.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn deleted_len(&self) -> usize {
        self.deleted.len()
    }

    /// Registers `id` at `index`. Ordered inserts shift subsequent
    /// positions up; an ordered insert requires a resolvable ordinal.
    pub fn insert(&mut self, index: &ItemIndex, id: ItemId) -> Result<(), OverrideError> {
        match (&mut self.slots, index) {
            (Slots::Ordered(slots), ItemIndex::Ordinal(i)) => {
                if *i > slots.len() {
                    return Err(OverrideError::UnknownIndex(index.clone()));
                }
                slots.insert(*i, id);
                Ok(())
            }
            (Slots::Ordered(_), _) => Err(OverrideError::UnpredictableInsertionPoint),
            (Slots::Keyed(slots), ItemIndex::Key(k)) => {
                slots.insert(k.clone(), id);
                Ok(())
            }
            (Slots::Keyed(_), other) => Err(OverrideError::UnknownIndex(other.clone())),
        }
    }

    /// Retires the id at `index` and returns it. Ordered removals shift
    /// subsequent positions down; keyed removals leave a hole (remaining
    /// keys are untouched).
    pub fn remove(&mut self, index: &ItemIndex) -> Result<ItemId, OverrideError> {
        match (&mut self.slots, index) {
            (Slots::Ordered(slots), ItemIndex::Ordinal(i)) => {
                if *i >= slots.len() {
                    return Err(OverrideError::UnknownIndex(index.clone()));
                }
                Ok(slots.remove(*i))
            }
            (Slots::Keyed(slots), ItemIndex::Key(k)) => slots
                .shift_remove(k)
                .ok_or_else(|| OverrideError::UnknownIndex(index.clone())),
            (_, other) => Err(OverrideError::UnknownIndex(other.clone())),
        }
    }

    pub fn index_to_id(&self, index: &ItemIndex) -> Result<ItemId, OverrideError> {
        self.try_index_to_id(index)
            .ok_or_else(|| OverrideError::UnknownIndex(index.clone()))
    }

    pub fn try_index_to_id(&self, index: &ItemIndex) -> Option<ItemId> {
        match (&self.slots, index) {
            (_, ItemIndex::Empty) => Some(ItemId::EMPTY),
            (Slots::Ordered(slots), ItemIndex::Ordinal(i)) => slots.get(*i).copied(),
            (Slots::Keyed(slots), ItemIndex::Key(k)) => slots.get(k).copied(),
            _ => None,
        }
    }

    pub fn id_to_index(&self, id: ItemId) -> Result<ItemIndex, OverrideError> {
        self.try_id_to_index(id)
            .ok_or(OverrideError::UnknownItemId(id))
    }

    pub fn try_id_to_index(&self, id: ItemId) -> Option<ItemIndex> {
        if id.is_empty() {
            return Some(ItemIndex::Empty);
        }
        match &self.slots {
            Slots::Ordered(slots) => slots
                .iter()
                .position(|&slot| slot == id)
                .map(ItemIndex::Ordinal),
            Slots::Keyed(slots) => slots
                .iter()
                .find(|(_, &slot)| slot == id)
                .map(|(k, _)| ItemIndex::Key(k.clone())),
        }
    }

    pub fn contains_id(&self, id: ItemId) -> bool {
        if id.is_empty() {
            return false;
        }
        match &self.slots {
            Slots::Ordered(slots) => slots.contains(&id),
            Slots::Keyed(slots) => slots.values().any(|&slot| slot == id),
        }
    }

    pub fn mark_deleted(&mut self, id: ItemId) {
        if !id.is_empty() {
            self.deleted.insert(id);
        }
    }

    /// Returns whether the id was actually tombstoned.
    pub fn unmark_deleted(&mut self, id: ItemId) -> bool {
        self.deleted.remove(&id)
    }

    pub fn is_deleted(&self, id: ItemId) -> bool {
        self.deleted.contains(&id)
    }

    pub fn deleted_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.deleted.iter().copied()
    }

    pub fn clear_deleted(&mut self) {
        self.deleted.clear();
    }

    /// Ids of currently-present entries, in position order.
    pub fn live_ids(&self) -> Vec<ItemId> {
        match &self.slots {
            Slots::Ordered(slots) => slots.clone(),
            Slots::Keyed(slots) => slots.values().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_inserts_shift_positions() {
        let mut ids = ItemIdentifiers::ordered();
        let (a, b, c) = (ItemId::generate(), ItemId::generate(), ItemId::generate());
        ids.insert(&ItemIndex::Ordinal(0), a).expect("insert a");
        ids.insert(&ItemIndex::Ordinal(1), c).expect("insert c");
        ids.insert(&ItemIndex::Ordinal(1), b).expect("insert b between");
        assert_eq!(ids.try_index_to_id(&ItemIndex::Ordinal(0)), Some(a));
        assert_eq!(ids.try_index_to_id(&ItemIndex::Ordinal(1)), Some(b));
        assert_eq!(ids.try_index_to_id(&ItemIndex::Ordinal(2)), Some(c));
        assert_eq!(ids.try_id_to_index(c), Some(ItemIndex::Ordinal(2)));
    }

    #[test]
    fn ordered_removal_shifts_down() {
        let mut ids = ItemIdentifiers::ordered();
        let (a, b, c) = (ItemId::generate(), ItemId::generate(), ItemId::generate());
        for (i, id) in [a, b, c].into_iter().enumerate() {
            ids.insert(&ItemIndex::Ordinal(i), id).expect("insert");
        }
        let removed = ids.remove(&ItemIndex::Ordinal(1)).expect("remove");
        assert_eq!(removed, b);
        assert_eq!(ids.try_id_to_index(c), Some(ItemIndex::Ordinal(1)));
        assert_eq!(ids.try_id_to_index(b), None);
    }

    #[test]
    fn keyed_removal_leaves_other_keys_alone() {
        let mut ids = ItemIdentifiers::keyed();
        let (a, b) = (ItemId::generate(), ItemId::generate());
        ids.insert(&ItemIndex::Key("x".into()), a).expect("insert x");
        ids.insert(&ItemIndex::Key("y".into()), b).expect("insert y");
        ids.remove(&ItemIndex::Key("x".into())).expect("remove x");
        assert_eq!(ids.try_id_to_index(b), Some(ItemIndex::Key("y".into())));
    }

    #[test]
    fn empty_sentinel_bypasses_the_table() {
        let ids = ItemIdentifiers::ordered();
        assert_eq!(ids.try_index_to_id(&ItemIndex::Empty), Some(ItemId::EMPTY));
        assert_eq!(ids.try_id_to_index(ItemId::EMPTY), Some(ItemIndex::Empty));
        assert!(!ids.contains_id(ItemId::EMPTY));
    }

    #[test]
    fn ordered_insert_without_ordinal_fails_loudly() {
        let mut ids = ItemIdentifiers::ordered();
        let err = ids
            .insert(&ItemIndex::Empty, ItemId::generate())
            .expect_err("empty index must be rejected");
        assert!(matches!(err, OverrideError::UnpredictableInsertionPoint));
    }

    #[test]
    fn tombstones_are_separate_from_presence() {
        let mut ids = ItemIdentifiers::ordered();
        let a = ItemId::generate();
        ids.insert(&ItemIndex::Ordinal(0), a).expect("insert");
        ids.remove(&ItemIndex::Ordinal(0)).expect("remove");
        assert!(!ids.is_deleted(a));
        ids.mark_deleted(a);
        assert!(ids.is_deleted(a));
        assert!(ids.unmark_deleted(a));
        assert!(!ids.is_deleted(a));
    }
}
