//! Queue-time statistics collected during a run and their JSON export.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::error::Result;
use crate::types::FuelType;

#[derive(Clone, Copy, Debug, Default)]
struct Samples {
    count: u64,
    total: f64,
    max: f64,
}

impl Samples {
    fn record(&mut self, secs: f64) {
        self.count += 1;
        self.total += secs;
        if secs > self.max {
            self.max = secs;
        }
    }

    fn report(&self) -> QueueTimeReport {
        let average_s = if self.count > 0 {
            self.total / self.count as f64
        } else {
            0.0
        };
        QueueTimeReport {
            count: self.count,
            total_s: self.total,
            average_s,
            max_s: self.max,
        }
    }
}

#[derive(Default)]
struct StatsState {
    station_waits: HashMap<FuelType, Samples>,
    register_waits: Samples,
    invalid: HashMap<FuelType, u64>,
    abandoned: u64,
}

/// Thread-safe sink for timing samples and vehicle events.
pub struct Statistics {
    state: Mutex<StatsState>,
}

/// Summary of one class of queue waits.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct QueueTimeReport {
    pub count: u64,
    pub total_s: f64,
    pub average_s: f64,
    pub max_s: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatsReport {
    /// Station queue waits keyed by fuel type.
    pub stations: BTreeMap<FuelType, QueueTimeReport>,
    pub register: QueueTimeReport,
    pub invalid_vehicles: u64,
    pub invalid_by_fuel: BTreeMap<FuelType, u64>,
    pub abandoned_vehicles: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StatsState::default()),
        }
    }

    pub fn record_station_wait(&self, fuel: &FuelType, waited: Duration) {
        let mut guard = self.state.lock().expect("statistics mutex poisoned");
        guard
            .station_waits
            .entry(fuel.clone())
            .or_default()
            .record(waited.as_secs_f64());
    }

    pub fn record_register_wait(&self, waited: Duration) {
        let mut guard = self.state.lock().expect("statistics mutex poisoned");
        guard.register_waits.record(waited.as_secs_f64());
    }

    /// A vehicle no station could take.
    pub fn record_invalid(&self, fuel: &FuelType) {
        let mut guard = self.state.lock().expect("statistics mutex poisoned");
        *guard.invalid.entry(fuel.clone()).or_insert(0) += 1;
    }

    /// An admitted vehicle that failed mid-pipeline.
    pub fn record_abandoned(&self) {
        let mut guard = self.state.lock().expect("statistics mutex poisoned");
        guard.abandoned += 1;
    }

    pub fn report(&self) -> StatsReport {
        let guard = self.state.lock().expect("statistics mutex poisoned");
        StatsReport {
            stations: guard
                .station_waits
                .iter()
                .map(|(fuel, samples)| (fuel.clone(), samples.report()))
                .collect(),
            register: guard.register_waits.report(),
            invalid_vehicles: guard.invalid.values().sum(),
            invalid_by_fuel: guard
                .invalid
                .iter()
                .map(|(fuel, count)| (fuel.clone(), *count))
                .collect(),
            abandoned_vehicles: guard.abandoned,
        }
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsReport {
    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
