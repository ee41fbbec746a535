use std::collections::HashMap;

use crate::messages::{DeviceChanged, StateChanged, StateField, StateUpdate};
use crate::snapshot::{Snapshot, StateStore, split_entity};

#[derive(Debug, Default)]
struct CachedEntity {
    snapshot: Snapshot,
    has_state: bool,
}

/// Local mirror of the hub's entity states.
///
/// State change events replace an entity's snapshot wholesale and, for the
/// watched domain, become one change notification each. State stream fields
/// only fill in the mirror so observables are known before they next change.
#[derive(Debug)]
pub struct StateCache {
    watched_domain: String,
    entities: HashMap<String, CachedEntity>,
}

impl StateCache {
    pub fn new(watched_domain: &str) -> Self {
        StateCache {
            watched_domain: watched_domain.to_string(),
            entities: HashMap::new(),
        }
    }

    /// Apply one field from the state stream. Never notifies.
    pub fn seed(&mut self, update: StateUpdate) {
        let entity = self.entities.entry(update.entity_id).or_default();
        match update.field {
            StateField::State(state) => {
                entity.has_state = true;
                entity.snapshot.state = state;
            }
            StateField::Attribute(name, value) => {
                entity.snapshot.attributes.insert(name, value);
            }
        }
    }

    /// Apply a hub state change event, returning the device notification it
    /// carries if it is a live change in the watched domain.
    pub fn apply(&mut self, event: StateChanged) -> Option<DeviceChanged> {
        match &event.new {
            Some(snapshot) => {
                self.entities.insert(
                    event.entity_id.clone(),
                    CachedEntity {
                        snapshot: snapshot.clone(),
                        has_state: true,
                    },
                );
            }
            None => {
                self.entities.remove(&event.entity_id);
            }
        }

        if event.retained {
            return None;
        }
        let watched = matches!(
            split_entity(&event.entity_id),
            Some((domain, _)) if domain == self.watched_domain
        );
        watched.then(|| DeviceChanged {
            entity_id: event.entity_id,
            old: event.old.unwrap_or_default(),
            new: event.new.unwrap_or_default(),
        })
    }
}

impl StateStore for StateCache {
    fn full_state(&self, entity_id: &str) -> Option<Snapshot> {
        self.entities
            .get(entity_id)
            .filter(|entity| entity.has_state)
            .map(|entity| entity.snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn state(entity_id: &str, state: &str) -> StateUpdate {
        StateUpdate {
            entity_id: entity_id.to_string(),
            field: StateField::State(state.to_string()),
        }
    }

    fn attribute(entity_id: &str, name: &str, value: serde_json::Value) -> StateUpdate {
        StateUpdate {
            entity_id: entity_id.to_string(),
            field: StateField::Attribute(name.to_string(), value),
        }
    }

    fn dimmer(state: &str, sent: u32) -> Snapshot {
        Snapshot::new(state)
            .with_attribute("product_name", json!("HS-WD200+ Wall Dimmer"))
            .with_attribute("sentCnt", json!(sent))
    }

    fn changed(entity_id: &str, old: Option<Snapshot>, new: Option<Snapshot>) -> StateChanged {
        StateChanged {
            entity_id: entity_id.to_string(),
            old,
            new,
            retained: false,
        }
    }

    #[test]
    fn test_one_notification_per_event() {
        let mut cache = StateCache::new("zwave");

        let change = cache
            .apply(changed(
                "zwave.hall",
                Some(dimmer("initializing", 10)),
                Some(dimmer("ready", 11)),
            ))
            .unwrap();
        assert_eq!(change.entity_id, "zwave.hall");
        assert_eq!(change.old, dimmer("initializing", 10));
        assert_eq!(change.new, dimmer("ready", 11));
        assert_eq!(cache.full_state("zwave.hall"), Some(dimmer("ready", 11)));
    }

    #[test]
    fn test_events_replace_snapshots() {
        let mut cache = StateCache::new("zwave");
        cache.seed(state("light.hall", "on"));
        cache.seed(attribute("light.hall", "brightness", json!(99)));

        let off = Snapshot::new("off");
        assert_eq!(cache.apply(changed("light.hall", None, Some(off.clone()))), None);
        assert_eq!(cache.full_state("light.hall"), Some(off.clone()));

        assert_eq!(cache.apply(changed("light.hall", Some(off), None)), None);
        assert_eq!(cache.full_state("light.hall"), None);
    }

    #[test]
    fn test_retained_events_only_seed() {
        let mut cache = StateCache::new("zwave");
        let mut event = changed("zwave.hall", Some(dimmer("ready", 10)), Some(dimmer("ready", 11)));
        event.retained = true;

        assert_eq!(cache.apply(event), None);
        assert_eq!(cache.full_state("zwave.hall"), Some(dimmer("ready", 11)));
    }

    #[test]
    fn test_state_stream_never_notifies() {
        let mut cache = StateCache::new("zwave");
        cache.seed(attribute("light.hall", "brightness", json!(99)));
        // no discrete state seen yet
        assert_eq!(cache.full_state("light.hall"), None);

        cache.seed(state("light.hall", "on"));
        assert_eq!(
            cache.full_state("light.hall"),
            Some(Snapshot::new("on").with_attribute("brightness", json!(99)))
        );
        assert_eq!(cache.full_state("light.porch"), None);

        cache.seed(state("zwave.hall", "ready"));
        assert_eq!(cache.full_state("zwave.hall"), Some(Snapshot::new("ready")));
    }
}
