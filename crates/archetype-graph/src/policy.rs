/// Per-node policy attributes supplied by the graph owner.
///
/// These are declarative facts about a member or collection, not runtime
/// state; the override engine consults them and never mutates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePolicy {
    /// Member nodes refuse override toggling when false.
    pub overridable: bool,
    /// Collection-valued nodes get item identifiers only when true.
    pub identifiable_items: bool,
    /// When false, the member's content is opaque and never participates
    /// in base/derived override semantics.
    pub identifiable_content: bool,
}

impl Default for NodePolicy {
    fn default() -> Self {
        Self {
            overridable: true,
            identifiable_items: true,
            identifiable_content: true,
        }
    }
}

impl NodePolicy {
    pub fn non_overridable() -> Self {
        Self {
            overridable: false,
            ..Self::default()
        }
    }

    pub fn non_identifiable_items() -> Self {
        Self {
            identifiable_items: false,
            ..Self::default()
        }
    }

    pub fn opaque_content() -> Self {
        Self {
            identifiable_content: false,
            ..Self::default()
        }
    }
}
