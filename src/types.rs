//! Shared identifiers, fuel types, and service-time ranges.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Sequence number of a generated vehicle.
pub type VehicleId = u64;

/// Identity of a station or register as given in the configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PointId {
    Station(u32),
    Register(u32),
}

impl PointId {
    /// Thread name used for the worker serving this point.
    pub fn thread_name(&self) -> String {
        match self {
            PointId::Station(id) => format!("station-{id:02}"),
            PointId::Register(id) => format!("register-{id:02}"),
        }
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointId::Station(id) => write!(f, "S{id:02}"),
            PointId::Register(id) => write!(f, "R{id:02}"),
        }
    }
}

/// Fuel a vehicle needs and a station dispenses.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FuelType(String);

impl FuelType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inclusive `[min, max]` range of seconds.
///
/// Deserializes from the two-element array form used in configuration files
/// and rejects bounds that are negative, non-finite, inverted, or too large
/// for a `Duration`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct TimeRange {
    min: f64,
    max: f64,
}

impl TimeRange {
    pub const ZERO: TimeRange = TimeRange { min: 0.0, max: 0.0 };

    pub fn new(min: f64, max: f64) -> Result<Self, Error> {
        if !min.is_finite() || !max.is_finite() {
            return Err(Error::config(format!(
                "time range [{min}, {max}] must be finite"
            )));
        }
        if min < 0.0 {
            return Err(Error::config(format!(
                "time range [{min}, {max}] must not be negative"
            )));
        }
        if min > max {
            return Err(Error::config(format!(
                "time range [{min}, {max}] has min greater than max"
            )));
        }
        if Duration::try_from_secs_f64(max).is_err() {
            return Err(Error::config(format!(
                "time range [{min}, {max}] exceeds the longest representable duration"
            )));
        }
        Ok(Self { min, max })
    }

    /// Draw a duration uniformly from the range, bounds included.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min == self.max {
            return Duration::from_secs_f64(self.min);
        }
        Duration::from_secs_f64(rng.gen_range(self.min..=self.max))
    }
}

impl TryFrom<[f64; 2]> for TimeRange {
    type Error = Error;

    fn try_from([min, max]: [f64; 2]) -> Result<Self, Self::Error> {
        Self::new(min, max)
    }
}

impl From<TimeRange> for [f64; 2] {
    fn from(range: TimeRange) -> Self {
        [range.min, range.max]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn rejects_inverted_and_negative_ranges() {
        assert!(TimeRange::new(2.0, 1.0).is_err());
        assert!(TimeRange::new(-0.5, 1.0).is_err());
        assert!(TimeRange::new(0.0, f64::INFINITY).is_err());
        assert!(TimeRange::new(f64::NAN, 1.0).is_err());
        assert!(TimeRange::new(1.5, 1.5).is_ok());
    }

    #[test]
    fn rejects_ranges_too_large_for_duration() {
        assert!(TimeRange::new(1e20, 1e20).is_err());
        assert!(TimeRange::new(0.0, 1e20).is_err());
        assert!(serde_json::from_str::<TimeRange>("[1e20, 1e20]").is_err());

        let range = TimeRange::new(0.0, 86_400.0 * 365.0).expect("a year fits");
        let mut rng = StdRng::seed_from_u64(3);
        assert!(range.sample(&mut rng) <= Duration::from_secs(86_400 * 365));
    }

    #[test]
    fn samples_stay_within_bounds() {
        let range = TimeRange::new(0.25, 0.75).expect("valid range");
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let secs = range.sample(&mut rng).as_secs_f64();
            assert!((0.25..=0.75).contains(&secs), "sample {secs} out of range");
        }
    }

    #[test]
    fn degenerate_range_is_exact() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(TimeRange::ZERO.sample(&mut rng), Duration::ZERO);
        let range = TimeRange::new(1.0, 1.0).expect("valid range");
        assert_eq!(range.sample(&mut rng), Duration::from_secs(1));
    }

    #[test]
    fn deserializes_from_array() {
        let range: TimeRange = serde_json::from_str("[1, 3.5]").expect("parse range");
        assert_eq!(<[f64; 2]>::from(range), [1.0, 3.5]);
        assert!(serde_json::from_str::<TimeRange>("[4, 3]").is_err());
    }

    #[test]
    fn point_ids_render_like_log_tags() {
        assert_eq!(PointId::Station(3).to_string(), "S03");
        assert_eq!(PointId::Register(12).to_string(), "R12");
        assert_eq!(PointId::Register(1).thread_name(), "register-01");
    }
}
