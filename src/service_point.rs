//! Stations, registers, and the bounded queue + counter they share.

use std::sync::Mutex;

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::error::{Error, Result};
use crate::types::{FuelType, PointId, TimeRange};
use crate::vehicle::Vehicle;

#[derive(Debug, Default)]
struct QueueCounter {
    /// Vehicles admitted and not yet released.
    current: usize,
    admitted: u64,
    released: u64,
}

/// Snapshot of a service point's counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub current: usize,
    pub admitted: u64,
    pub released: u64,
}

/// A queue of vehicles in front of a single pump or desk.
///
/// The counter is bumped before the vehicle is sent, so a vehicle blocked on
/// a full queue already counts toward the load. It drops only when the owning
/// worker is completely done with the vehicle.
pub struct ServicePoint {
    id: PointId,
    service_time: TimeRange,
    queue: Sender<Vehicle>,
    counter: Mutex<QueueCounter>,
}

impl ServicePoint {
    /// Create the point and hand back the receive side for its worker.
    pub fn new(id: PointId, service_time: TimeRange, capacity: usize) -> (Self, Receiver<Vehicle>) {
        let (queue, rx) = bounded(capacity);
        let point = Self {
            id,
            service_time,
            queue,
            counter: Mutex::new(QueueCounter::default()),
        };
        (point, rx)
    }

    pub fn id(&self) -> PointId {
        self.id
    }

    pub fn service_time(&self) -> TimeRange {
        self.service_time
    }

    /// Current number of vehicles queued at or being served by this point.
    pub fn queue_length(&self) -> usize {
        self.counter.lock().expect("queue counter mutex poisoned").current
    }

    pub fn counters(&self) -> CounterSnapshot {
        let guard = self.counter.lock().expect("queue counter mutex poisoned");
        CounterSnapshot {
            current: guard.current,
            admitted: guard.admitted,
            released: guard.released,
        }
    }

    /// Admit a vehicle. Blocks while the queue is full.
    ///
    /// Fails only when the worker has already closed the queue; the counter
    /// is restored in that case.
    pub fn enqueue(&self, mut vehicle: Vehicle) -> Result<()> {
        self.admit();
        vehicle.mark_enqueued();
        if self.queue.send(vehicle).is_err() {
            let mut guard = self.counter.lock().expect("queue counter mutex poisoned");
            guard.current -= 1;
            guard.admitted -= 1;
            return Err(Error::QueueClosed { point: self.id });
        }
        Ok(())
    }

    /// Mark one vehicle as finished with this point.
    pub fn release(&self) {
        let mut guard = self.counter.lock().expect("queue counter mutex poisoned");
        debug_assert!(guard.current > 0, "queue counter underflow at {}", self.id);
        guard.current = guard.current.saturating_sub(1);
        guard.released += 1;
    }

    fn admit(&self) {
        let mut guard = self.counter.lock().expect("queue counter mutex poisoned");
        guard.current += 1;
        guard.admitted += 1;
    }
}

/// A fuel island serving exactly one fuel type.
pub struct Station {
    point: ServicePoint,
    fuel: FuelType,
}

impl Station {
    pub fn new(
        id: u32,
        fuel: FuelType,
        service_time: TimeRange,
        capacity: usize,
    ) -> (Self, Receiver<Vehicle>) {
        let (point, rx) = ServicePoint::new(PointId::Station(id), service_time, capacity);
        (Self { point, fuel }, rx)
    }

    pub fn serves(&self, fuel: &FuelType) -> bool {
        &self.fuel == fuel
    }
}

impl AsRef<ServicePoint> for Station {
    fn as_ref(&self) -> &ServicePoint {
        &self.point
    }
}

impl std::ops::Deref for Station {
    type Target = ServicePoint;

    fn deref(&self) -> &ServicePoint {
        &self.point
    }
}

/// A payment desk; accepts vehicles of any fuel type.
pub struct Register {
    point: ServicePoint,
}

impl Register {
    pub fn new(id: u32, service_time: TimeRange, capacity: usize) -> (Self, Receiver<Vehicle>) {
        let (point, rx) = ServicePoint::new(PointId::Register(id), service_time, capacity);
        (Self { point }, rx)
    }
}

impl AsRef<ServicePoint> for Register {
    fn as_ref(&self) -> &ServicePoint {
        &self.point
    }
}

impl std::ops::Deref for Register {
    type Target = ServicePoint;

    fn deref(&self) -> &ServicePoint {
        &self.point
    }
}

/// Every station and register of the simulated gas station, in
/// configuration order.
pub struct Site {
    pub stations: Vec<Station>,
    pub registers: Vec<Register>,
}

impl Site {
    pub fn point(&self, id: PointId) -> Option<&ServicePoint> {
        self.points().find(|point| point.id() == id)
    }

    /// Number of stations whose counter is non-zero, each read under its
    /// own lock.
    pub fn busy_stations(&self) -> usize {
        self.stations
            .iter()
            .filter(|station| station.queue_length() > 0)
            .count()
    }

    pub fn points(&self) -> impl Iterator<Item = &ServicePoint> {
        self.stations
            .iter()
            .map(|station| &station.point)
            .chain(self.registers.iter().map(|register| &register.point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    fn diesel(id: u64) -> Vehicle {
        Vehicle::new(id, FuelType::new("diesel"))
    }

    #[test]
    fn enqueue_and_release_track_counts() {
        let (point, rx) = ServicePoint::new(PointId::Station(1), TimeRange::ZERO, 4);
        point.enqueue(diesel(0)).expect("queue open");
        point.enqueue(diesel(1)).expect("queue open");
        assert_eq!(point.queue_length(), 2);

        // Receiving alone does not release; the worker still owns the vehicle.
        let vehicle = rx.recv().expect("vehicle queued");
        assert_eq!(vehicle.id(), 0);
        assert_eq!(point.queue_length(), 2);

        point.release();
        assert_eq!(
            point.counters(),
            CounterSnapshot {
                current: 1,
                admitted: 2,
                released: 1
            }
        );
    }

    #[test]
    fn full_queue_blocks_until_a_slot_frees() {
        let (point, rx) = ServicePoint::new(PointId::Register(1), TimeRange::ZERO, 1);
        let point = Arc::new(point);
        point.enqueue(diesel(0)).expect("queue open");

        let barrier = Arc::new(Barrier::new(2));
        let (done_tx, done_rx) = mpsc::channel();
        let producer = {
            let point = Arc::clone(&point);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                point.enqueue(diesel(1)).expect("queue open");
                done_tx.send(()).expect("send done");
            })
        };

        barrier.wait();
        // The second vehicle is counted but cannot be delivered yet.
        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(point.queue_length(), 2);

        let first = rx.recv().expect("first vehicle");
        assert_eq!(first.id(), 0);
        done_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("producer unblocked");
        assert_eq!(rx.recv().expect("second vehicle").id(), 1);
        producer.join().expect("producer thread panicked");
    }

    #[test]
    fn enqueue_after_close_restores_counter() {
        let (point, rx) = ServicePoint::new(PointId::Station(2), TimeRange::ZERO, 2);
        drop(rx);
        let result = point.enqueue(diesel(9));
        assert!(matches!(
            result,
            Err(Error::QueueClosed {
                point: PointId::Station(2)
            })
        ));
        assert_eq!(point.counters().current, 0);
        assert_eq!(point.counters().admitted, 0);
    }

    #[test]
    fn station_serves_only_its_fuel() {
        let (station, _rx) = Station::new(1, FuelType::new("lpg"), TimeRange::ZERO, 1);
        assert!(station.serves(&FuelType::new("lpg")));
        assert!(!station.serves(&FuelType::new("diesel")));
        assert_eq!(station.id(), PointId::Station(1));
    }
}
