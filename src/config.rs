//! Run configuration: JSON loading, validation, and the built-in demo layout.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{FuelType, TimeRange};

/// Queue capacity used when the configuration does not set one.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub stations: Vec<StationConfig>,
    pub registers: Vec<RegisterConfig>,
    pub generator: GeneratorConfig,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    pub id: u32,
    pub fuel: FuelType,
    #[serde(rename = "time")]
    pub service_time: TimeRange,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegisterConfig {
    pub id: u32,
    #[serde(rename = "time")]
    pub service_time: TimeRange,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Number of vehicles to generate; `0` runs until stopped externally.
    #[serde(rename = "count_of_cars", default)]
    pub vehicle_count: u64,
    #[serde(rename = "generation_delay")]
    pub delay: TimeRange,
    pub fuel_types: Vec<FuelType>,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl GeneratorConfig {
    /// `None` when the generator runs until an external stop.
    pub fn vehicle_limit(&self) -> Option<u64> {
        (self.vehicle_count > 0).then_some(self.vehicle_count)
    }
}

impl Config {
    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Config = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check startup preconditions. Time ranges are already checked on
    /// deserialization.
    pub fn validate(&self) -> Result<()> {
        if self.registers.is_empty() {
            return Err(Error::config("at least one register is required"));
        }
        if self.generator.fuel_types.is_empty() {
            return Err(Error::config("generator needs at least one fuel type"));
        }
        if let Some(fuel) = self
            .generator
            .fuel_types
            .iter()
            .chain(self.stations.iter().map(|station| &station.fuel))
            .find(|fuel| fuel.as_str().trim().is_empty())
        {
            return Err(Error::config(format!("empty fuel type name {fuel:?}")));
        }

        let mut fuels = HashSet::new();
        for fuel in &self.generator.fuel_types {
            if !fuels.insert(fuel) {
                return Err(Error::config(format!("duplicate fuel type {fuel}")));
            }
        }

        let mut seen = HashSet::new();
        for station in &self.stations {
            if !seen.insert(station.id) {
                return Err(Error::config(format!("duplicate station id {}", station.id)));
            }
        }
        seen.clear();
        for register in &self.registers {
            if !seen.insert(register.id) {
                return Err(Error::config(format!(
                    "duplicate register id {}",
                    register.id
                )));
            }
        }
        Ok(())
    }

    /// Small, fast layout used by the `demo` command.
    pub fn demo() -> Self {
        let quick = |min, max| TimeRange::new(min, max).expect("demo ranges are valid");
        let station = |id, fuel: &str| StationConfig {
            id,
            fuel: FuelType::new(fuel),
            service_time: quick(0.01, 0.05),
        };
        Config {
            stations: vec![
                station(1, "gas"),
                station(2, "gas"),
                station(3, "diesel"),
                station(4, "lpg"),
                station(5, "electric"),
            ],
            registers: vec![
                RegisterConfig {
                    id: 1,
                    service_time: quick(0.01, 0.03),
                },
                RegisterConfig {
                    id: 2,
                    service_time: quick(0.01, 0.03),
                },
            ],
            generator: GeneratorConfig {
                vehicle_count: 40,
                delay: quick(0.0, 0.01),
                fuel_types: ["gas", "diesel", "lpg", "electric", "hydrogen"]
                    .into_iter()
                    .map(FuelType::new)
                    .collect(),
            },
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}
