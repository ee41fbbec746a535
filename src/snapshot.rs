use std::collections::BTreeMap;

use serde_derive::Deserialize;
use serde_json::Value;

/// Full state of an entity: the discrete state plus all of its attributes.
///
/// Equality is structural: same state, same attribute keys and values.
/// Deserializes from the hub's state objects; timestamps and context are
/// dropped.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Snapshot {
    pub state: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl Snapshot {
    #[cfg(test)]
    pub fn new(state: &str) -> Self {
        Snapshot {
            state: state.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    #[cfg(test)]
    pub fn with_attribute(mut self, name: &str, value: Value) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    /// String-valued attribute, `None` when missing or not a string
    pub fn text_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }
}

/// Read access to the current state of hub entities
pub trait StateStore {
    fn full_state(&self, entity_id: &str) -> Option<Snapshot>;
}

/// Split `domain.object_id` into its two parts
pub fn split_entity(entity_id: &str) -> Option<(&str, &str)> {
    entity_id
        .split_once('.')
        .filter(|(domain, object_id)| !domain.is_empty() && !object_id.is_empty())
}

/// Maps a triggering device's entity id onto the observable entity it controls
#[derive(Clone, Debug)]
pub struct EntityPairing {
    source_domain: String,
    target_domain: String,
}

impl EntityPairing {
    pub fn new(source_domain: &str, target_domain: &str) -> Self {
        EntityPairing {
            source_domain: source_domain.to_string(),
            target_domain: target_domain.to_string(),
        }
    }

    /// `zwave.office_dimmer` becomes `light.office_dimmer`
    pub fn observable_for(&self, device_id: &str) -> Option<String> {
        match split_entity(device_id) {
            Some((domain, object_id)) if domain == self.source_domain => {
                Some(format!("{}.{}", self.target_domain, object_id))
            }
            _ => None,
        }
    }

    /// Pair the device with its observable and fetch the observable's state
    pub fn resolve(&self, device_id: &str, store: &impl StateStore) -> Option<(String, Snapshot)> {
        let observable = self.observable_for(device_id)?;
        let snapshot = store.full_state(&observable)?;
        Some((observable, snapshot))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    impl StateStore for HashMap<String, Snapshot> {
        fn full_state(&self, entity_id: &str) -> Option<Snapshot> {
            self.get(entity_id).cloned()
        }
    }

    #[test]
    fn test_snapshot_equality_ignores_insert_order() {
        let a = Snapshot::new("on")
            .with_attribute("brightness", json!(128))
            .with_attribute("friendly_name", json!("Office"));
        let b = Snapshot::new("on")
            .with_attribute("friendly_name", json!("Office"))
            .with_attribute("brightness", json!(128));
        assert_eq!(a, b);

        assert_ne!(a, b.clone().with_attribute("brightness", json!(129)));
        assert_ne!(a, Snapshot { state: "off".to_string(), ..a.clone() });
        assert_ne!(a, Snapshot::default());
    }

    #[test]
    fn test_text_attribute() {
        let snapshot = Snapshot::new("ready")
            .with_attribute("product_name", json!("HS-WD200+ Wall Dimmer"))
            .with_attribute("node_id", json!(7));
        assert_eq!(snapshot.text_attribute("product_name"), Some("HS-WD200+ Wall Dimmer"));
        assert_eq!(snapshot.text_attribute("node_id"), None);
        assert_eq!(snapshot.text_attribute("missing"), None);
    }

    #[test]
    fn test_observable_for() {
        let pairing = EntityPairing::new("zwave", "light");
        assert_eq!(
            pairing.observable_for("zwave.office_dimmer_2"),
            Some("light.office_dimmer_2".to_string())
        );
        assert_eq!(pairing.observable_for("switch.office"), None);
        assert_eq!(pairing.observable_for("zwave"), None);
        assert_eq!(pairing.observable_for("zwave."), None);
    }

    #[test]
    fn test_resolve_requires_observable_state() {
        let pairing = EntityPairing::new("zwave", "light");
        let mut store = HashMap::new();
        assert_eq!(pairing.resolve("zwave.hall", &store), None);

        store.insert("light.hall".to_string(), Snapshot::new("on"));
        assert_eq!(
            pairing.resolve("zwave.hall", &store),
            Some(("light.hall".to_string(), Snapshot::new("on")))
        );
    }
}
