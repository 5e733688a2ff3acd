//! Vehicle generator: the only producer of work.

use std::sync::Arc;

use crossbeam_utils::sync::WaitGroup;
use rand::seq::SliceRandom;

use crate::config::GeneratorConfig;
use crate::error::{Error, Result};
use crate::router;
use crate::service_point::Site;
use crate::shutdown::StopSignal;
use crate::stats::Statistics;
use crate::vehicle::Vehicle;

/// Counts reported by the generator when it finishes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GeneratorSummary {
    pub generated: u64,
    pub admitted: u64,
    pub rejected: u64,
}

pub struct Generator {
    config: GeneratorConfig,
    site: Arc<Site>,
    stats: Arc<Statistics>,
    /// Fired by the generator when it stops producing.
    shutdown: StopSignal,
    /// Fired by the caller to end an unbounded (or early) run.
    stop: StopSignal,
}

impl Generator {
    pub fn new(
        config: GeneratorConfig,
        site: Arc<Site>,
        stats: Arc<Statistics>,
        shutdown: StopSignal,
        stop: StopSignal,
    ) -> Self {
        Self {
            config,
            site,
            stats,
            shutdown,
            stop,
        }
    }

    /// Wait for every worker to be ready, produce vehicles until the limit
    /// or an external stop, then fire the shutdown signal.
    pub fn run(self, workers_ready: WaitGroup) -> Result<GeneratorSummary> {
        workers_ready.wait();
        tracing::info!(limit = ?self.config.vehicle_limit(), "generator started");

        // Fires on every exit path, so workers can always drain.
        let _shutdown = self.shutdown.fire_on_drop();
        let result = self.produce();
        tracing::info!("production stopped, draining");
        result
    }

    fn produce(&self) -> Result<GeneratorSummary> {
        let mut rng = rand::thread_rng();
        let mut summary = GeneratorSummary::default();
        let limit = self.config.vehicle_limit();

        loop {
            if limit.is_some_and(|limit| summary.generated >= limit) || self.stop.is_fired() {
                break;
            }

            let fuel = self
                .config
                .fuel_types
                .choose(&mut rng)
                .ok_or_else(|| Error::config("generator needs at least one fuel type"))?
                .clone();
            let vehicle = Vehicle::new(summary.generated, fuel.clone());
            summary.generated += 1;

            match router::pick_station(&self.site.stations, &fuel) {
                Some(station) => {
                    let id = vehicle.id();
                    station.enqueue(vehicle)?;
                    summary.admitted += 1;
                    tracing::debug!(
                        vehicle = id,
                        %fuel,
                        station = %station.id(),
                        "vehicle admitted"
                    );
                }
                None => {
                    summary.rejected += 1;
                    self.stats.record_invalid(&fuel);
                    tracing::debug!(
                        vehicle = vehicle.id(),
                        %fuel,
                        "no station for fuel, vehicle turned away"
                    );
                }
            }

            let delay = self.config.delay.sample(&mut rng);
            if self.stop.wait_timeout(delay) {
                tracing::info!("external stop requested");
                break;
            }
        }

        tracing::info!(
            generated = summary.generated,
            admitted = summary.admitted,
            rejected = summary.rejected,
            "generator finished"
        );
        Ok(summary)
    }
}
