use std::time::Duration;

use chrono_tz::Tz;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::freshness::FreshnessTracker;
use crate::iqair::{Connector, DeviceClient, DeviceMetadata, parse_measurements};
use crate::mqtt::Publisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Published(i64),
    AlreadyPublished(i64),
}

/// Fetches measurements from the device and forwards new ones, one cycle at a
/// time with a fixed pause between cycles.
pub struct PollLoop<C, P> {
    device: DeviceClient<C>,
    publisher: P,
    metadata: DeviceMetadata,
    timezone: Tz,
    interval: Duration,
    tracker: FreshnessTracker,
}

impl<C: Connector, P: Publisher> PollLoop<C, P> {
    pub fn new(
        device: DeviceClient<C>,
        publisher: P,
        metadata: DeviceMetadata,
        timezone: Tz,
        interval: Duration,
    ) -> Self {
        Self {
            device,
            publisher,
            metadata,
            timezone,
            interval,
            tracker: FreshnessTracker::new(),
        }
    }

    pub fn tracker(&self) -> &FreshnessTracker {
        &self.tracker
    }

    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let raw = self.device.latest_measurements_document().await?;
        let batch = parse_measurements(&raw, &self.metadata, self.timezone)?;
        let revision = batch.revision();

        if !self.tracker.is_newer(&batch) {
            info!(
                revision,
                last_forwarded = ?self.tracker.last_forwarded(),
                "measurements from IQAir were already published, will not publish"
            );
            return Ok(CycleOutcome::AlreadyPublished(revision));
        }

        debug!(%batch, "got fresh IQAir measurements, going to publish them");
        self.publisher.publish(batch.to_json()?).await?;
        self.tracker.record_forwarded(&batch);

        Ok(CycleOutcome::Published(revision))
    }

    /// Runs until `shutdown` turns true or its sender is dropped.
    ///
    /// A failed cycle is logged and the loop goes on, except for a rejected login
    /// which stops the loop with [`Error::Authentication`].
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                result = self.run_cycle() => match result {
                    Ok(CycleOutcome::Published(revision)) => {
                        info!(revision, "published IQAir measurements");
                    }
                    Ok(CycleOutcome::AlreadyPublished(_)) => {}
                    Err(e @ Error::Authentication { .. }) => return Err(e),
                    Err(e) => warn!(error = %e, "poll cycle failed, will retry on next cycle"),
                },
            }

            debug!(interval = ?self.interval, "sleeping until next cycle");
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(self.interval) => {}
            }
        }

        info!("stopping IQAir polling");
        Ok(())
    }
}
