use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::time::Instant;

use crate::snapshot::Snapshot;

#[derive(Clone, Debug)]
pub struct TrackedEntity {
    /// Snapshot stored when the last probe was issued
    pub last_observed: Option<Snapshot>,
    /// Consecutive observations identical to `last_observed`
    pub match_count: u32,
    /// Probes issued since tracking began
    pub poll_count: u32,
    pub last_seen: Instant,
}

/// Per-entity tracking state, keyed by observable entity id.
///
/// An entity is tracked iff it has a record here. The scheduled set holds the
/// ids with a delayed probe still outstanding and may outlive the record.
#[derive(Debug, Default)]
pub struct TrackingRegistry {
    entities: HashMap<String, TrackedEntity>,
    scheduled: HashSet<String>,
}

impl TrackingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `entity_id`. Returns false if it was already tracked.
    pub fn begin(&mut self, entity_id: &str, now: Instant) -> bool {
        if self.entities.contains_key(entity_id) {
            return false;
        }
        self.entities.insert(
            entity_id.to_string(),
            TrackedEntity {
                last_observed: None,
                match_count: 0,
                poll_count: 0,
                last_seen: now,
            },
        );
        true
    }

    pub fn get(&self, entity_id: &str) -> Option<&TrackedEntity> {
        self.entities.get(entity_id)
    }

    pub fn is_tracked(&self, entity_id: &str) -> bool {
        self.entities.contains_key(entity_id)
    }

    pub fn tracked_count(&self) -> usize {
        self.entities.len()
    }

    /// Compare a fresh observation against the stored one and return the new
    /// match count, or `None` if the entity is not tracked.
    pub fn update(&mut self, entity_id: &str, observed: &Snapshot, now: Instant) -> Option<u32> {
        let entity = self.entities.get_mut(entity_id)?;
        if entity.last_observed.as_ref() == Some(observed) {
            entity.match_count += 1;
        } else {
            entity.match_count = 0;
        }
        entity.last_seen = now;
        Some(entity.match_count)
    }

    /// Store the snapshot a probe is being issued for and count the probe
    pub fn record_poll(&mut self, entity_id: &str, observed: Snapshot) -> Option<u32> {
        let entity = self.entities.get_mut(entity_id)?;
        entity.last_observed = Some(observed);
        entity.poll_count += 1;
        Some(entity.poll_count)
    }

    /// Drop all tracking state for the entity
    pub fn clear(&mut self, entity_id: &str) -> Option<TrackedEntity> {
        self.entities.remove(entity_id)
    }

    /// Returns false if a probe is already outstanding
    pub fn mark_scheduled(&mut self, entity_id: &str) -> bool {
        self.scheduled.insert(entity_id.to_string())
    }

    pub fn unmark_scheduled(&mut self, entity_id: &str) -> bool {
        self.scheduled.remove(entity_id)
    }

    #[cfg(test)]
    pub fn is_scheduled(&self, entity_id: &str) -> bool {
        self.scheduled.contains(entity_id)
    }

    /// Tracked entities with no observation for longer than `after`
    pub fn stale(&self, now: Instant, after: Duration) -> Vec<String> {
        let mut ids = self
            .entities
            .iter()
            .filter(|(_, entity)| now.saturating_duration_since(entity.last_seen) > after)
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_is_once() {
        let mut registry = TrackingRegistry::new();
        let now = Instant::now();
        assert!(registry.begin("light.hall", now));
        assert!(!registry.begin("light.hall", now));
        assert_eq!(registry.get("light.hall").map(|e| e.poll_count), Some(0));
    }

    #[test]
    fn test_update_counts_and_resets_matches() {
        let mut registry = TrackingRegistry::new();
        let now = Instant::now();
        let on = Snapshot::new("on");

        assert_eq!(registry.update("light.hall", &on, now), None);

        registry.begin("light.hall", now);
        assert_eq!(registry.update("light.hall", &on, now), Some(0));
        registry.record_poll("light.hall", on.clone());
        assert_eq!(registry.update("light.hall", &on, now), Some(1));
        assert_eq!(registry.update("light.hall", &on, now), Some(2));
        assert_eq!(registry.update("light.hall", &Snapshot::new("off"), now), Some(0));
    }

    #[test]
    fn test_clear_leaves_no_residue() {
        let mut registry = TrackingRegistry::new();
        let now = Instant::now();
        registry.begin("light.hall", now);
        registry.record_poll("light.hall", Snapshot::new("on"));
        assert!(registry.clear("light.hall").is_some());
        assert!(!registry.is_tracked("light.hall"));
        assert_eq!(registry.tracked_count(), 0);
        assert!(registry.clear("light.hall").is_none());
    }

    #[test]
    fn test_scheduled_set() {
        let mut registry = TrackingRegistry::new();
        assert!(registry.mark_scheduled("light.hall"));
        assert!(!registry.mark_scheduled("light.hall"));
        assert!(registry.is_scheduled("light.hall"));
        assert!(registry.unmark_scheduled("light.hall"));
        assert!(!registry.unmark_scheduled("light.hall"));
    }

    #[test]
    fn test_stale() {
        let mut registry = TrackingRegistry::new();
        let start = Instant::now();
        registry.begin("light.hall", start);
        registry.begin("light.porch", start + Duration::from_secs(50));

        let now = start + Duration::from_secs(70);
        assert_eq!(
            registry.stale(now, Duration::from_secs(60)),
            vec!["light.hall".to_string()]
        );
        assert!(registry.stale(now, Duration::from_secs(600)).is_empty());
    }
}
