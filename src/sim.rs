//! Run coordinator: wires the site, workers, and generator together and
//! collects the end-of-run report.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::generator::{Generator, GeneratorSummary};
use crate::health_monitor::HealthMonitor;
use crate::service_point::{Register, Site, Station};
use crate::shutdown::{Barriers, StopSignal};
use crate::stats::{Statistics, StatsReport};
use crate::types::PointId;
use crate::vehicle::Vehicle;
use crate::worker::{self, WorkerContext, WorkerSummary};

/// Poll interval of the optional stall watcher.
const STALL_POLL: Duration = Duration::from_millis(250);

/// Best-effort CPU user/system time snapshot (seconds) on Unix platforms.
#[cfg(unix)]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    use libc::{RUSAGE_SELF, getrusage, rusage};
    // SAFETY: `rusage` is plain old data; all-zero is a valid value.
    let mut usage: rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { getrusage(RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return None;
    }
    let seconds = |tv: libc::timeval| tv.tv_sec as f64 + tv.tv_usec as f64 / 1_000_000.0;
    Some((seconds(usage.ru_utime), seconds(usage.ru_stime)))
}

#[cfg(not(unix))]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    None
}

/// Final state of one station or register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointReport {
    pub point: PointId,
    pub final_queue_length: usize,
    pub admitted: u64,
    pub released: u64,
    pub served: u64,
}

#[derive(Clone, Debug)]
pub struct RunReport {
    pub generator: GeneratorSummary,
    pub points: Vec<PointReport>,
    pub workers: Vec<WorkerSummary>,
    pub stats: StatsReport,
    pub elapsed: Duration,
    pub cpu_user_s: Option<f64>,
    pub cpu_sys_s: Option<f64>,
}

impl RunReport {
    /// Every counter is back to zero and balanced.
    pub fn all_drained(&self) -> bool {
        self.points
            .iter()
            .all(|point| point.final_queue_length == 0 && point.admitted == point.released)
    }

    pub fn print_summary(&self) {
        println!("RUN SUMMARY");
        println!(
            "vehicles_generated={} admitted={} invalid={}",
            self.generator.generated, self.generator.admitted, self.stats.invalid_vehicles
        );
        for point in &self.points {
            println!(
                "point={} served={} admitted={} released={} final_queue_length={}",
                point.point,
                point.served,
                point.admitted,
                point.released,
                point.final_queue_length
            );
        }
        println!("abandoned_vehicles={}", self.stats.abandoned_vehicles);
        println!("all_drained={}", self.all_drained());
        println!("elapsed_ms={:.2}", self.elapsed.as_secs_f64() * 1000.0);
        let fmt_cpu = |value: Option<f64>| {
            value
                .map(|v| format!("{v:.4}"))
                .unwrap_or_else(|| "NA".to_string())
        };
        println!(
            "cpu_user_s={} cpu_sys_s={}",
            fmt_cpu(self.cpu_user_s),
            fmt_cpu(self.cpu_sys_s)
        );
    }
}

/// A configured, not yet started simulation.
pub struct Simulation {
    config: Config,
    stop: StopSignal,
    stall_warning: Option<Duration>,
}

impl Simulation {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stop: StopSignal::new(),
            stall_warning: None,
        })
    }

    /// Log a warning when a worker holding work makes no progress for
    /// `timeout`. The run itself is never interrupted.
    pub fn with_stall_warning(mut self, timeout: Duration) -> Self {
        self.stall_warning = Some(timeout);
        self
    }

    /// Handle that asks the generator to stop early.
    pub fn stop_handle(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Run to completion: start workers, wait for them to be ready, generate,
    /// drain, and report. Blocks until every worker has stopped.
    pub fn run(self) -> Result<RunReport> {
        let started = Instant::now();
        let cpu_start = cpu_times_seconds();
        let (site, station_rxs, register_rxs) = build_site(&self.config);
        let site = Arc::new(site);
        let stats = Arc::new(Statistics::new());
        let health = Arc::new(HealthMonitor::new());
        let shutdown = StopSignal::new();
        let barriers = Barriers::new();

        tracing::info!(
            stations = site.stations.len(),
            registers = site.registers.len(),
            queue_capacity = self.config.queue_capacity,
            "starting workers"
        );

        let mut worker_handles = Vec::new();
        let queues = station_rxs
            .into_iter()
            .enumerate()
            .map(|(index, rx)| (index, rx, false))
            .chain(
                register_rxs
                    .into_iter()
                    .enumerate()
                    .map(|(index, rx)| (index, rx, true)),
            );
        for (index, rx, is_register) in queues {
            let point = if is_register {
                site.registers[index].id()
            } else {
                site.stations[index].id()
            };
            let ctx = WorkerContext {
                site: Arc::clone(&site),
                index,
                rx,
                shutdown: shutdown.clone(),
                barriers: barriers.enlist(),
                stats: Arc::clone(&stats),
                health: Arc::clone(&health),
            };
            let name = point.thread_name();
            let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
                if is_register {
                    worker::run_register(ctx)
                } else {
                    worker::run_station(ctx)
                }
            });
            match spawned {
                Ok(handle) => worker_handles.push((name, handle)),
                Err(err) => {
                    // Let the workers already running drain and exit.
                    shutdown.fire();
                    return Err(err.into());
                }
            }
        }

        let (workers_ready, workers_stopped) = barriers.split();
        let generator = Generator::new(
            self.config.generator.clone(),
            Arc::clone(&site),
            Arc::clone(&stats),
            shutdown.clone(),
            self.stop.clone(),
        );
        let generator_handle = match thread::Builder::new()
            .name("generator".to_string())
            .spawn(move || generator.run(workers_ready))
        {
            Ok(handle) => handle,
            Err(err) => {
                shutdown.fire();
                return Err(err.into());
            }
        };

        let watch_stop = StopSignal::new();
        let watcher = match self.stall_warning {
            Some(timeout) => match spawn_stall_watch(
                Arc::clone(&health),
                Arc::clone(&site),
                watch_stop.clone(),
                timeout,
            ) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    tracing::warn!("stall watcher unavailable: {err}");
                    None
                }
            },
            None => None,
        };

        // No timeout: a worker that never drains blocks here forever.
        workers_stopped.wait();
        tracing::info!("all workers stopped");

        watch_stop.fire();
        if let Some(watcher) = watcher {
            watcher.join().map_err(|_| Error::WorkerPanicked {
                name: "health-monitor".to_string(),
            })?;
        }

        let generator = generator_handle.join().map_err(|_| Error::WorkerPanicked {
            name: "generator".to_string(),
        })??;

        let mut workers = Vec::with_capacity(worker_handles.len());
        for (name, handle) in worker_handles {
            workers.push(handle.join().map_err(|_| Error::WorkerPanicked { name })?);
        }

        let points = site
            .points()
            .map(|point| {
                let counters = point.counters();
                let served = workers
                    .iter()
                    .find(|summary| summary.point == point.id())
                    .map_or(0, |summary| summary.served);
                PointReport {
                    point: point.id(),
                    final_queue_length: counters.current,
                    admitted: counters.admitted,
                    released: counters.released,
                    served,
                }
            })
            .collect();

        let (cpu_user_s, cpu_sys_s) = match (cpu_start, cpu_times_seconds()) {
            (Some((user_start, sys_start)), Some((user_end, sys_end))) => {
                (Some(user_end - user_start), Some(sys_end - sys_start))
            }
            _ => (None, None),
        };

        Ok(RunReport {
            generator,
            points,
            workers,
            stats: stats.report(),
            elapsed: started.elapsed(),
            cpu_user_s,
            cpu_sys_s,
        })
    }
}

type Queues = Vec<Receiver<Vehicle>>;

fn build_site(config: &Config) -> (Site, Queues, Queues) {
    let capacity = config.queue_capacity;
    let (stations, station_rxs): (Vec<_>, Vec<_>) = config
        .stations
        .iter()
        .map(|station| {
            Station::new(
                station.id,
                station.fuel.clone(),
                station.service_time,
                capacity,
            )
        })
        .unzip();
    let (registers, register_rxs): (Vec<_>, Vec<_>) = config
        .registers
        .iter()
        .map(|register| Register::new(register.id, register.service_time, capacity))
        .unzip();
    (
        Site {
            stations,
            registers,
        },
        station_rxs,
        register_rxs,
    )
}

fn spawn_stall_watch(
    health: Arc<HealthMonitor>,
    site: Arc<Site>,
    stop: StopSignal,
    timeout: Duration,
) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("health-monitor".to_string())
        .spawn(move || {
            while !stop.wait_timeout(STALL_POLL) {
                let busy = |id| site.point(id).is_some_and(|point| point.queue_length() > 0);
                for worker in health.detect_stalled(timeout, busy) {
                    tracing::warn!(
                        point = %worker,
                        timeout_s = timeout.as_secs_f64(),
                        "worker holds work but made no progress"
                    );
                }
            }
        })?;
    Ok(handle)
}
