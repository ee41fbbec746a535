use std::time::Duration;

use log::{debug, error};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::messages::TrackerMessage;

/// Delivers timed messages back into the tracker's inbox
#[derive(Clone, Debug)]
pub struct ProbeScheduler {
    tx: mpsc::UnboundedSender<TrackerMessage>,
}

impl ProbeScheduler {
    pub fn new(tx: mpsc::UnboundedSender<TrackerMessage>) -> Self {
        ProbeScheduler { tx }
    }

    /// Fire a `ProbeDue` for `entity_id` once `delay` has passed. Never cancelled.
    pub fn schedule(&self, entity_id: String, delay: Duration) -> JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("probe due for {}", entity_id);
            if let Err(err) = tx.send(TrackerMessage::ProbeDue(entity_id)) {
                error!("Error delivering probe: {:?}", err);
            }
        })
    }

    /// Send a `Sweep` every `period` until the inbox closes
    pub fn sweep_every(&self, period: Duration) -> JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx.send(TrackerMessage::Sweep).is_err() {
                    debug!("Inbox closed, stopping sweeps");
                    break;
                }
            }
        })
    }
}
