//! Least-loaded routing.
//!
//! Each candidate's counter is read under its own lock, one at a time. The
//! result is a snapshot: the chosen point's load may change before the
//! vehicle actually lands in its queue.

use crate::service_point::{Register, ServicePoint, Station};
use crate::types::FuelType;

/// Return the candidate with the smallest queue length.
///
/// Ties go to the earliest candidate. `None` if there are no candidates.
pub fn least_loaded<'a, T, I>(candidates: I) -> Option<&'a T>
where
    T: AsRef<ServicePoint> + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut best: Option<(&'a T, usize)> = None;
    for candidate in candidates {
        let len = candidate.as_ref().queue_length();
        match best {
            Some((_, best_len)) if len >= best_len => {}
            _ => best = Some((candidate, len)),
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Pick the least-loaded station dispensing `fuel`.
pub fn pick_station<'a>(stations: &'a [Station], fuel: &FuelType) -> Option<&'a Station> {
    least_loaded(stations.iter().filter(|station| station.serves(fuel)))
}

pub fn pick_register(registers: &[Register]) -> Option<&Register> {
    least_loaded(registers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PointId, TimeRange};
    use crate::vehicle::Vehicle;

    fn stations(layout: &[(u32, &str)]) -> Vec<Station> {
        layout
            .iter()
            .map(|&(id, fuel)| Station::new(id, FuelType::new(fuel), TimeRange::ZERO, 8).0)
            .collect()
    }

    // Receivers must stay alive or enqueue reports a closed queue.
    fn load(point: &ServicePoint, count: u64) {
        for id in 0..count {
            point
                .enqueue(Vehicle::new(id, FuelType::new("diesel")))
                .expect("queue open");
        }
    }

    #[test]
    fn picks_strict_minimum() {
        let built: Vec<_> = (1..=3)
            .map(|id| Register::new(id, TimeRange::ZERO, 8))
            .collect();
        let (registers, _receivers): (Vec<_>, Vec<_>) = built.into_iter().unzip();
        load(&registers[0], 2);
        load(&registers[1], 1);
        load(&registers[2], 3);

        let chosen = pick_register(&registers).expect("non-empty");
        assert_eq!(chosen.id(), PointId::Register(2));
    }

    #[test]
    fn ties_go_to_first_in_order() {
        let built: Vec<_> = (1..=3)
            .map(|id| Register::new(id, TimeRange::ZERO, 8))
            .collect();
        let (registers, _receivers): (Vec<_>, Vec<_>) = built.into_iter().unzip();
        load(&registers[0], 1);

        let chosen = pick_register(&registers).expect("non-empty");
        assert_eq!(chosen.id(), PointId::Register(2));
    }

    #[test]
    fn filters_stations_by_fuel() {
        let stations = stations(&[(1, "gas"), (2, "diesel"), (3, "diesel")]);
        let chosen = pick_station(&stations, &FuelType::new("diesel")).expect("diesel station");
        assert_eq!(chosen.id(), PointId::Station(2));
        assert!(pick_station(&stations, &FuelType::new("hydrogen")).is_none());
    }

    #[test]
    fn empty_candidates_yield_none() {
        let registers: Vec<Register> = Vec::new();
        assert!(pick_register(&registers).is_none());
    }
}
