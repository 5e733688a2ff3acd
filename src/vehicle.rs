//! Vehicles and their one-shot completion signal.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::error::{Error, Result};
use crate::types::{FuelType, VehicleId};

/// A single visit to the gas station.
///
/// The vehicle is moved from queue to queue; only one worker holds it at a
/// time. The completion side is consumed by [`Vehicle::complete`], so it can be
/// signalled at most once.
#[derive(Debug)]
pub struct Vehicle {
    id: VehicleId,
    fuel: FuelType,
    enqueued_at: Instant,
    done: Sender<()>,
    waiter: Option<Receiver<()>>,
}

/// Read side of a vehicle's completion signal, held by the station that
/// forwarded the vehicle to a register.
#[derive(Debug)]
pub struct CompletionWaiter {
    vehicle: VehicleId,
    rx: Receiver<()>,
}

impl Vehicle {
    pub fn new(id: VehicleId, fuel: FuelType) -> Self {
        let (done, waiter) = bounded(1);
        Self {
            id,
            fuel,
            enqueued_at: Instant::now(),
            done,
            waiter: Some(waiter),
        }
    }

    pub fn id(&self) -> VehicleId {
        self.id
    }

    pub fn fuel(&self) -> &FuelType {
        &self.fuel
    }

    /// Stamp the moment the vehicle joins a queue.
    pub fn mark_enqueued(&mut self) {
        self.enqueued_at = Instant::now();
    }

    /// Time spent since the last [`Vehicle::mark_enqueued`].
    pub fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Detach the completion waiter. Returns `None` if it was already taken.
    pub fn take_waiter(&mut self) -> Option<CompletionWaiter> {
        self.waiter.take().map(|rx| CompletionWaiter { vehicle: self.id, rx })
    }

    /// Signal that payment is done. Consumes the vehicle: the visit is over.
    pub fn complete(self) -> Result<()> {
        self.done.send(()).map_err(|_| Error::VehicleAbandoned {
            vehicle: self.id,
            context: "station stopped waiting for payment",
        })
    }
}

impl CompletionWaiter {
    /// Block until the register signals completion.
    ///
    /// Fails if the vehicle was dropped without being completed.
    pub fn wait(self) -> Result<()> {
        self.rx.recv().map_err(|_| Error::VehicleAbandoned {
            vehicle: self.vehicle,
            context: "dropped before payment completed",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn completion_wakes_waiter_across_threads() {
        let mut vehicle = Vehicle::new(1, FuelType::new("diesel"));
        let waiter = vehicle.take_waiter().expect("fresh waiter");
        let (done_tx, done_rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            done_tx.send(waiter.wait().is_ok()).expect("send result");
        });

        vehicle.complete().expect("waiter alive");
        let completed = done_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("waiter result");
        assert!(completed);
        handle.join().expect("waiter thread panicked");
    }

    #[test]
    fn waiter_can_only_be_taken_once() {
        let mut vehicle = Vehicle::new(2, FuelType::new("gas"));
        assert!(vehicle.take_waiter().is_some());
        assert!(vehicle.take_waiter().is_none());
    }

    #[test]
    fn dropped_vehicle_fails_the_waiter() {
        let mut vehicle = Vehicle::new(3, FuelType::new("lpg"));
        let waiter = vehicle.take_waiter().expect("fresh waiter");
        drop(vehicle);
        assert!(matches!(
            waiter.wait(),
            Err(Error::VehicleAbandoned { vehicle: 3, .. })
        ));
    }

    #[test]
    fn completing_without_waiter_reports_abandoned() {
        let mut vehicle = Vehicle::new(4, FuelType::new("electric"));
        drop(vehicle.take_waiter());
        assert!(vehicle.complete().is_err());
    }
}
