use super::PrototypeGraph;
use crate::item_id::ItemId;
use crate::overrides::OverrideState;
use archetype_graph::{ItemIndex, NodeId};

/// Payload of the override-changing / override-changed notifications.
///
/// Member-level changes carry `ItemIndex::Empty` and `ItemId::EMPTY`;
/// item- and key-level changes carry the affected position and id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideChange {
    pub node: NodeId,
    pub index: ItemIndex,
    pub item_id: ItemId,
    pub previous: OverrideState,
    pub current: OverrideState,
}

impl PrototypeGraph {
    /// Registers a listener invoked just before an override state mutation.
    pub fn on_override_changing<F>(&mut self, listener: F) -> u64
    where
        F: FnMut(&OverrideChange) + Send + Sync + 'static,
    {
        let id = self.next_listener_id;
        self.next_listener_id = self.next_listener_id.saturating_add(1);
        self.changing_listeners.insert(id, Box::new(listener));
        id
    }

    pub fn off_override_changing(&mut self, listener_id: u64) -> bool {
        self.changing_listeners.remove(&listener_id).is_some()
    }

    /// Registers a listener invoked just after an override state mutation.
    pub fn on_override_changed<F>(&mut self, listener: F) -> u64
    where
        F: FnMut(&OverrideChange) + Send + Sync + 'static,
    {
        let id = self.next_listener_id;
        self.next_listener_id = self.next_listener_id.saturating_add(1);
        self.changed_listeners.insert(id, Box::new(listener));
        id
    }

    pub fn off_override_changed(&mut self, listener_id: u64) -> bool {
        self.changed_listeners.remove(&listener_id).is_some()
    }

    pub(crate) fn emit_changing(&mut self, change: &OverrideChange) {
        for listener in self.changing_listeners.values_mut() {
            listener(change);
        }
    }

    pub(crate) fn emit_changed(&mut self, change: &OverrideChange) {
        for listener in self.changed_listeners.values_mut() {
            listener(change);
        }
    }
}
