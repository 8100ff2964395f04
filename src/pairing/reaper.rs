//! Background expiry sweep for pairing sessions.
//!
//! Expiry is enforced lazily on every access, so the reaper only keeps
//! stored statuses tidy for reporting. Nothing depends on it running.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::PairingService;
use crate::error::Result;

pub struct SessionReaper {
    service: Arc<PairingService>,
    interval: Duration,
}

impl SessionReaper {
    pub fn new(service: Arc<PairingService>) -> Self {
        Self {
            service,
            interval: Duration::from_secs(60),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the reaper as a background task.
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                match self.run_once().await {
                    Ok(count) if count > 0 => {
                        info!(expired = count, "session reaper expired overdue sessions");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "session reaper failed");
                    }
                }
            }
        })
    }

    pub async fn run_once(&self) -> Result<u64> {
        self.service.expire_overdue().await
    }
}
