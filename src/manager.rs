use std::future::Future;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::TrackingSettings;
use crate::eligibility::Eligibility;
use crate::messages::TrackerMessage;
use crate::scheduler::ProbeScheduler;
use crate::state_store::StateCache;
use crate::tracker::{Outcome, StabilityTracker};

/// Asks the hub to re-read an entity from the device. Fire and forget.
pub trait RefreshService {
    fn refresh(&self, entity_id: &str) -> impl Future<Output = ()> + Send;
}

/// Logs refreshes instead of sending them
pub struct DryRun;

impl RefreshService for DryRun {
    async fn refresh(&self, entity_id: &str) {
        info!("dry run: would refresh {}", entity_id);
    }
}

/// Owns all tracking state and handles the inbox one message at a time
pub struct Manager<R> {
    cache: StateCache,
    tracker: StabilityTracker,
    scheduler: ProbeScheduler,
    refresher: R,
    stale_after: Option<Duration>,
}

impl<R: RefreshService> Manager<R> {
    pub fn new(
        settings: &TrackingSettings,
        eligibility: Eligibility,
        refresher: R,
        tx: mpsc::UnboundedSender<TrackerMessage>,
    ) -> Self {
        info!("{}", eligibility.describe());
        Manager {
            cache: StateCache::new(&settings.source_domain),
            tracker: StabilityTracker::new(settings, eligibility),
            scheduler: ProbeScheduler::new(tx),
            refresher,
            stale_after: settings.stale_after,
        }
    }

    pub async fn handle(&mut self, message: TrackerMessage) {
        match message {
            TrackerMessage::StateUpdate(update) => self.cache.seed(update),
            TrackerMessage::StateChanged(event) => {
                let Some(change) = self.cache.apply(event) else {
                    return;
                };
                match self
                    .tracker
                    .handle_change(&change, &self.cache, Instant::now())
                {
                    Outcome::Refresh(entity_id) => self.refresher.refresh(&entity_id).await,
                    Outcome::Schedule(entity_id, delay) => {
                        self.scheduler.schedule(entity_id, delay);
                    }
                    Outcome::Stable { entity_id, polls } | Outcome::Aborted { entity_id, polls } => {
                        debug!(
                            "released {} after {} polls, {} still tracked",
                            entity_id,
                            polls,
                            self.tracker.registry().tracked_count()
                        );
                    }
                    _ => {}
                }
            }
            TrackerMessage::ProbeDue(entity_id) => {
                self.tracker.probe_due(&entity_id);
                self.refresher.refresh(&entity_id).await;
            }
            TrackerMessage::Sweep => {
                if let Some(after) = self.stale_after {
                    self.tracker.sweep(Instant::now(), after);
                }
            }
        }
    }

    /// Handle messages until the inbox closes or the process is interrupted
    pub async fn run_loop(
        mut self,
        mut rx: mpsc::UnboundedReceiver<TrackerMessage>,
    ) -> anyhow::Result<()> {
        if let Some(after) = self.stale_after {
            self.scheduler.sweep_every(after);
        }

        loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Some(message) => self.handle(message).await,
                    None => {
                        debug!("Inbox closed");
                        break;
                    }
                },
                result = tokio::signal::ctrl_c() => {
                    result?;
                    info!("Interrupted, shutting down");
                    break;
                }
            }
        }

        info!(
            "Exiting with {} entities still tracked",
            self.tracker.registry().tracked_count()
        );
        Ok(())
    }
}
