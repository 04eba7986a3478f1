use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of an entry inside a collection-valued node.
///
/// `Empty` is the reserved "no index" sentinel used for non-indexable
/// content; it never addresses a real entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemIndex {
    Empty,
    Ordinal(usize),
    Key(String),
}

impl ItemIndex {
    pub fn is_empty(&self) -> bool {
        matches!(self, ItemIndex::Empty)
    }

    /// Numeric position, when this index addresses an ordered collection.
    pub fn ordinal(&self) -> Option<usize> {
        match self {
            ItemIndex::Ordinal(i) => Some(*i),
            _ => None,
        }
    }

    /// String key, when this index addresses a keyed collection.
    pub fn key(&self) -> Option<&str> {
        match self {
            ItemIndex::Key(k) => Some(k),
            _ => None,
        }
    }
}

impl fmt::Display for ItemIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemIndex::Empty => write!(f, "(empty)"),
            ItemIndex::Ordinal(i) => write!(f, "[{i}]"),
            ItemIndex::Key(k) => write!(f, "[{k:?}]"),
        }
    }
}

impl From<usize> for ItemIndex {
    fn from(i: usize) -> Self {
        ItemIndex::Ordinal(i)
    }
}

impl From<&str> for ItemIndex {
    fn from(k: &str) -> Self {
        ItemIndex::Key(k.to_owned())
    }
}

impl From<String> for ItemIndex {
    fn from(k: String) -> Self {
        ItemIndex::Key(k)
    }
}
