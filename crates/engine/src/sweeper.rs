//! Periodic release of expired rentals.

use std::time::Duration;

use chrono::Utc;
use tokio::time::{MissedTickBehavior, interval};

use crate::ops::Engine;

/// Runs [`Engine::sweep_expired`] on a fixed period.
#[derive(Clone, Debug)]
pub struct Sweeper {
    engine: Engine,
    interval: Duration,
}

impl Sweeper {
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            interval: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Loop forever. A failed pass is logged and retried on the next tick.
    pub async fn run(&self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "sweeper started");
        let mut timer = interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            self.tick().await;
        }
    }

    /// One pass. Returns how many rentals were released.
    pub async fn tick(&self) -> usize {
        match self.engine.sweep_expired(Utc::now()).await {
            Ok(expired) => {
                if !expired.is_empty() {
                    tracing::info!(released = expired.len(), "expired rentals released");
                }
                expired.len()
            }
            Err(err) => {
                tracing::error!("sweep failed: {err}");
                0
            }
        }
    }
}
