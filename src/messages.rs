use serde_json::Value;

use crate::snapshot::Snapshot;

/// Everything the dispatch loop reacts to, delivered over one channel
#[derive(Clone, Debug, PartialEq)]
pub enum TrackerMessage {
    /// One field from the state stream; only refreshes the cache
    StateUpdate(StateUpdate),
    /// One state change event from the hub
    StateChanged(StateChanged),
    ProbeDue(/* observable entity id */ String),
    Sweep,
}

/// A single field of an entity's state as published by the hub
#[derive(Clone, Debug, PartialEq)]
pub struct StateUpdate {
    pub entity_id: String,
    pub field: StateField,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StateField {
    State(String),
    Attribute(String, Value),
}

/// A hub `state_changed` event. `None` means the entity did not exist on that
/// side of the change.
#[derive(Clone, Debug, PartialEq)]
pub struct StateChanged {
    pub entity_id: String,
    pub old: Option<Snapshot>,
    pub new: Option<Snapshot>,
    /// Replayed by the broker from a retained message, not a live change
    pub retained: bool,
}

/// A triggering device changed; `old` is its full state before the change
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceChanged {
    pub entity_id: String,
    pub old: Snapshot,
    pub new: Snapshot,
}
