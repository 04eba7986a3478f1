//! Override state attached to members and collection entries.

use crate::identifiers::ItemIdentifiers;
use crate::item_id::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Whether a member or item follows its base or is pinned locally.
///
/// Absence of a recorded state reads as `Base`; only `New` entries are
/// stored in the side tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrideState {
    #[default]
    Base,
    New,
}

impl OverrideState {
    pub fn is_new(self) -> bool {
        matches!(self, OverrideState::New)
    }

    pub fn from_overridden(overridden: bool) -> Self {
        if overridden {
            OverrideState::New
        } else {
            OverrideState::Base
        }
    }
}

/// Override bookkeeping for one collection-valued node.
///
/// `ids == None` means identity metadata has not been generated — either
/// the collection is policy-marked non-identifiable or it has not been
/// attached yet. `disconnected` is the transient ledger: ids whose
/// overridden-deletion was disconnected from the registry but must still
/// answer "was deleted" for undo machinery.
#[derive(Debug, Clone, Default)]
pub(crate) struct CollectionOverrides {
    pub(crate) ids: Option<ItemIdentifiers>,
    pub(crate) items: HashMap<ItemId, OverrideState>,
    pub(crate) keys: HashMap<ItemId, OverrideState>,
    pub(crate) disconnected: HashSet<ItemId>,
}

impl CollectionOverrides {
    pub(crate) fn item_state(&self, id: ItemId) -> OverrideState {
        self.items.get(&id).copied().unwrap_or_default()
    }

    pub(crate) fn key_state(&self, id: ItemId) -> OverrideState {
        self.keys.get(&id).copied().unwrap_or_default()
    }
}
