use rand::Rng;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Stable, position-independent identifier of a collection entry.
///
/// Assigned when the entry first appears in an identifiable collection and
/// retained for the entry's lifetime. `EMPTY` is reserved: it pairs with
/// [`ItemIndex::Empty`](archetype_graph::ItemIndex) to represent
/// non-indexable content and never identifies a real entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u128);

impl ItemId {
    pub const EMPTY: ItemId = ItemId(0);

    /// Generates a fresh random id; never returns `EMPTY`.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let raw: u128 = rng.gen();
            if raw != 0 {
                return ItemId(raw);
            }
        }
    }

    pub const fn from_raw(raw: u128) -> Self {
        ItemId(raw)
    }

    pub const fn raw(self) -> u128 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl Serialize for ItemId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let raw = u128::from_str_radix(&text, 16).map_err(D::Error::custom)?;
        Ok(ItemId(raw))
    }
}
