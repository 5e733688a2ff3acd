//! Error types for the simulator.
//!
//! Configuration problems are reported before any worker thread starts.
//! Per-vehicle failures (`QueueClosed`, `VehicleAbandoned`) are logged and
//! counted by the workers rather than aborting the run.

use crate::types::{PointId, VehicleId};

pub type Result<T> = core::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The configuration is malformed or violates a startup precondition.
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A vehicle was sent to a service point whose worker already stopped.
    #[error("queue of {point} is closed")]
    QueueClosed { point: PointId },

    /// The other end of a vehicle's completion signal went away.
    #[error("vehicle {vehicle} was abandoned: {context}")]
    VehicleAbandoned {
        vehicle: VehicleId,
        context: &'static str,
    },

    #[error("no register available for vehicle {vehicle}")]
    NoRegister { vehicle: VehicleId },

    #[error("thread {name} panicked")]
    WorkerPanicked { name: String },
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}
