//! Station and register worker loops.
//!
//! Both kinds share one event loop. While `Running`, a worker waits for either
//! a vehicle or the shutdown signal. Once the signal is seen it is `Draining`:
//! it keeps serving, polling its queue, until its drain test passes. Stations
//! only look at their own counter. Registers also require every station to be
//! empty, because a busy station may still forward a vehicle to them.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, select};
use rand::Rng;

use crate::error::{Error, Result};
use crate::health_monitor::HealthMonitor;
use crate::router;
use crate::service_point::{Register, ServicePoint, Site, Station};
use crate::shutdown::{StopSignal, WorkerBarriers};
use crate::stats::Statistics;
use crate::types::PointId;
use crate::vehicle::Vehicle;

/// How long a draining worker waits on its queue before re-checking its
/// drain condition.
const DRAIN_POLL: Duration = Duration::from_millis(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Draining,
    Stopped,
}

/// Everything a worker thread owns or shares.
pub struct WorkerContext {
    pub site: Arc<Site>,
    /// Position of the worker's point in `site.stations` or `site.registers`.
    pub index: usize,
    pub rx: Receiver<Vehicle>,
    pub shutdown: StopSignal,
    pub barriers: WorkerBarriers,
    pub stats: Arc<Statistics>,
    pub health: Arc<HealthMonitor>,
}

/// What a worker reports when it exits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerSummary {
    pub point: PointId,
    pub served: u64,
    /// Stations still holding work when the worker stopped.
    pub busy_stations_at_exit: usize,
}

trait Service {
    fn point(&self) -> &ServicePoint;

    /// Serve one vehicle and release it from this point's counter.
    fn handle<R: Rng>(&self, vehicle: Vehicle, rng: &mut R);

    fn drained(&self) -> bool;
}

struct StationService<'a> {
    site: &'a Site,
    station: &'a Station,
    stats: &'a Statistics,
}

impl StationService<'_> {
    /// Hand the vehicle to the least-loaded register and wait for payment.
    fn forward(&self, mut vehicle: Vehicle) -> Result<()> {
        let id = vehicle.id();
        let waiter = vehicle.take_waiter().ok_or(Error::VehicleAbandoned {
            vehicle: id,
            context: "completion waiter already taken",
        })?;
        let register = router::pick_register(&self.site.registers)
            .ok_or(Error::NoRegister { vehicle: id })?;
        register.enqueue(vehicle)?;
        tracing::debug!(vehicle = id, register = %register.id(), "queued for payment");
        waiter.wait()?;
        tracing::debug!(vehicle = id, station = %self.station.id(), "vehicle leaves");
        Ok(())
    }
}

impl Service for StationService<'_> {
    fn point(&self) -> &ServicePoint {
        self.station
    }

    fn handle<R: Rng>(&self, vehicle: Vehicle, rng: &mut R) {
        self.stats.record_station_wait(vehicle.fuel(), vehicle.waited());
        let fueling = self.station.service_time().sample(rng);
        tracing::debug!(
            vehicle = vehicle.id(),
            fuel = %vehicle.fuel(),
            secs = fueling.as_secs_f64(),
            "fueling"
        );
        thread::sleep(fueling);

        if let Err(err) = self.forward(vehicle) {
            tracing::error!(station = %self.station.id(), "vehicle lost: {err}");
            self.stats.record_abandoned();
        }
        self.station.release();
    }

    fn drained(&self) -> bool {
        self.station.queue_length() == 0
    }
}

struct RegisterService<'a> {
    site: &'a Site,
    register: &'a Register,
    stats: &'a Statistics,
}

impl Service for RegisterService<'_> {
    fn point(&self) -> &ServicePoint {
        self.register
    }

    fn handle<R: Rng>(&self, vehicle: Vehicle, rng: &mut R) {
        self.stats.record_register_wait(vehicle.waited());
        let paying = self.register.service_time().sample(rng);
        tracing::debug!(
            vehicle = vehicle.id(),
            fuel = %vehicle.fuel(),
            secs = paying.as_secs_f64(),
            "paying"
        );
        thread::sleep(paying);

        if let Err(err) = vehicle.complete() {
            tracing::error!(register = %self.register.id(), "payment not delivered: {err}");
            self.stats.record_abandoned();
        }
        self.register.release();
    }

    fn drained(&self) -> bool {
        // Stations are read one at a time under their own locks.
        self.register.queue_length() == 0 && self.site.busy_stations() == 0
    }
}

/// Run the worker loop for `site.stations[ctx.index]` until it drains.
pub fn run_station(ctx: WorkerContext) -> WorkerSummary {
    let site = Arc::clone(&ctx.site);
    let stats = Arc::clone(&ctx.stats);
    let service = StationService {
        site: &site,
        station: &site.stations[ctx.index],
        stats: &stats,
    };
    event_loop(&service, ctx)
}

/// Run the worker loop for `site.registers[ctx.index]` until it and every
/// station drain.
pub fn run_register(ctx: WorkerContext) -> WorkerSummary {
    let site = Arc::clone(&ctx.site);
    let stats = Arc::clone(&ctx.stats);
    let service = RegisterService {
        site: &site,
        register: &site.registers[ctx.index],
        stats: &stats,
    };
    event_loop(&service, ctx)
}

fn event_loop<S: Service>(service: &S, ctx: WorkerContext) -> WorkerSummary {
    let WorkerContext {
        site,
        rx,
        shutdown,
        mut barriers,
        health,
        ..
    } = ctx;
    let id = service.point().id();
    let mut rng = rand::thread_rng();
    let mut state = WorkerState::Running;
    let mut served = 0u64;

    health.register_worker(id);
    barriers.mark_ready();
    tracing::debug!(point = %id, "worker ready");

    while state != WorkerState::Stopped {
        let next = match state {
            WorkerState::Running => select! {
                recv(rx) -> msg => match msg {
                    Ok(vehicle) => Some(vehicle),
                    Err(_) => {
                        tracing::warn!(point = %id, "queue disconnected, draining");
                        state = WorkerState::Draining;
                        None
                    }
                },
                recv(shutdown.receiver()) -> _ => {
                    let queued = service.point().queue_length();
                    tracing::debug!(point = %id, queued, "draining");
                    state = WorkerState::Draining;
                    health.heartbeat(id);
                    None
                },
            },
            WorkerState::Draining => {
                if service.drained() {
                    state = WorkerState::Stopped;
                    None
                } else {
                    rx.recv_timeout(DRAIN_POLL).ok()
                }
            }
            WorkerState::Stopped => None,
        };

        if let Some(vehicle) = next {
            service.handle(vehicle, &mut rng);
            served += 1;
            health.heartbeat(id);
        }
    }

    // Close the queue before counting down the completion barrier.
    drop(rx);
    health.retire(id);
    let busy_stations_at_exit = site.busy_stations();
    tracing::info!(point = %id, served, "worker stopped");
    barriers.mark_stopped();

    WorkerSummary {
        point: id,
        served,
        busy_stations_at_exit,
    }
}
