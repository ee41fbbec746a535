use std::time::Duration;

use log::{debug, info};
use tokio::time::Instant;

use crate::config::TrackingSettings;
use crate::eligibility::Eligibility;
use crate::messages::DeviceChanged;
use crate::registry::TrackingRegistry;
use crate::snapshot::{EntityPairing, StateStore};

/// What the tracker decided for one device notification
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Ineligible,
    NoObservable,
    /// Still moving; refresh the entity right away
    Refresh(String),
    /// Still moving; refresh the entity once the delay has passed
    Schedule(String, Duration),
    /// Still moving, but a probe is already on its way
    AlreadyScheduled(String),
    Stable { entity_id: String, polls: u32 },
    Aborted { entity_id: String, polls: u32 },
}

/// Watches observable entities until their state stops changing.
///
/// Each eligible device notification compares the paired observable's current
/// snapshot with the one stored at the previous probe. Enough identical
/// observations in a row end tracking as stable; too many probes end it as
/// aborted. Otherwise another probe is requested.
pub struct StabilityTracker {
    stability_threshold: u32,
    max_polls: u32,
    refresh_delay: Duration,
    debounce: bool,
    eligibility: Eligibility,
    pairing: EntityPairing,
    registry: TrackingRegistry,
}

impl StabilityTracker {
    pub fn new(settings: &TrackingSettings, eligibility: Eligibility) -> Self {
        StabilityTracker {
            stability_threshold: settings.stability_threshold,
            max_polls: settings.max_polls,
            refresh_delay: settings.refresh_delay,
            debounce: settings.debounce,
            eligibility,
            pairing: EntityPairing::new(&settings.source_domain, &settings.target_domain),
            registry: TrackingRegistry::new(),
        }
    }

    pub fn registry(&self) -> &TrackingRegistry {
        &self.registry
    }

    pub fn handle_change(
        &mut self,
        change: &DeviceChanged,
        store: &impl StateStore,
        now: Instant,
    ) -> Outcome {
        if !self.eligibility.accepts(&change.old) {
            return Outcome::Ineligible;
        }

        let Some((entity_id, observed)) = self.pairing.resolve(&change.entity_id, store) else {
            return Outcome::NoObservable;
        };

        if self.registry.begin(&entity_id, now) {
            info!("tracking {}", entity_id);
        }

        let match_count = self
            .registry
            .update(&entity_id, &observed, now)
            .unwrap_or_default();
        let polls = self
            .registry
            .get(&entity_id)
            .map(|e| e.poll_count)
            .unwrap_or_default();

        if match_count >= self.stability_threshold {
            info!("{} now stable after {} polls", entity_id, polls);
            self.registry.clear(&entity_id);
            return Outcome::Stable { entity_id, polls };
        }
        if polls > self.max_polls {
            info!(
                "tracking of {} aborted after {} polls",
                entity_id, self.max_polls
            );
            self.registry.clear(&entity_id);
            return Outcome::Aborted { entity_id, polls };
        }

        if !self.debounce {
            self.registry.record_poll(&entity_id, observed);
            return Outcome::Refresh(entity_id);
        }

        if !self.registry.mark_scheduled(&entity_id) {
            return Outcome::AlreadyScheduled(entity_id);
        }
        debug!("scheduling refresh for {}", entity_id);
        self.registry.record_poll(&entity_id, observed);
        Outcome::Schedule(entity_id, self.refresh_delay)
    }

    /// A delayed probe fired. The refresh goes out whether or not the entity is
    /// still tracked.
    pub fn probe_due(&mut self, entity_id: &str) {
        if !self.registry.unmark_scheduled(entity_id) {
            debug!("probe for {} was not scheduled", entity_id);
        }
        if !self.registry.is_tracked(entity_id) {
            debug!("probe for {} fired after tracking ended", entity_id);
        }
    }

    /// Stop tracking entities that have gone quiet for longer than `after`
    pub fn sweep(&mut self, now: Instant, after: Duration) -> Vec<String> {
        let stale = self.registry.stale(now, after);
        for entity_id in &stale {
            if let Some(entity) = self.registry.clear(entity_id) {
                info!(
                    "tracking of {} abandoned after {} polls",
                    entity_id, entity.poll_count
                );
            }
        }
        stale
    }
}
