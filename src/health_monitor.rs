//! Progress tracking and stall detection for service-point workers.
//!
//! Purely diagnostic: a stalled worker is reported, never interrupted.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::PointId;

struct HealthState {
    last_seen: HashMap<PointId, Instant>,
    stalled: HashSet<PointId>,
}

/// Tracks worker heartbeats and reports workers with no recent progress.
pub struct HealthMonitor {
    state: Mutex<HealthState>,
}

impl HealthMonitor {
    fn overdue_workers(state: &HealthState, now: Instant, timeout: Duration) -> Vec<PointId> {
        state
            .last_seen
            .iter()
            .filter_map(|(&worker, &last)| {
                if now.duration_since(last) > timeout {
                    Some(worker)
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn new() -> Self {
        Self {
            state: Mutex::new(HealthState {
                last_seen: HashMap::new(),
                stalled: HashSet::new(),
            }),
        }
    }

    /// Start tracking a worker; no-op if already registered.
    pub fn register_worker(&self, worker: PointId) {
        let mut guard = self.state.lock().expect("health monitor mutex poisoned");
        guard.last_seen.entry(worker).or_insert_with(Instant::now);
    }

    /// Record progress; clears any prior stall mark for the worker.
    pub fn heartbeat(&self, worker: PointId) {
        let mut guard = self.state.lock().expect("health monitor mutex poisoned");
        if let Some(last) = guard.last_seen.get_mut(&worker) {
            *last = Instant::now();
        }
        guard.stalled.remove(&worker);
    }

    /// Stop tracking a worker that has exited.
    pub fn retire(&self, worker: PointId) {
        let mut guard = self.state.lock().expect("health monitor mutex poisoned");
        guard.last_seen.remove(&worker);
        guard.stalled.remove(&worker);
    }

    /// Workers overdue by `timeout` that `is_busy` says still hold work and
    /// were not already reported. Each stall episode is returned once.
    pub fn detect_stalled(
        &self,
        timeout: Duration,
        is_busy: impl Fn(PointId) -> bool,
    ) -> Vec<PointId> {
        let mut guard = self.state.lock().expect("health monitor mutex poisoned");
        let now = Instant::now();
        let mut fresh = Vec::new();
        for worker in Self::overdue_workers(&guard, now, timeout) {
            if is_busy(worker) && guard.stalled.insert(worker) {
                fresh.push(worker);
            }
        }
        fresh.sort();
        fresh
    }

    #[cfg(test)]
    fn stalled_workers(&self) -> HashSet<PointId> {
        let guard = self.state.lock().expect("health monitor mutex poisoned");
        guard.stalled.clone()
    }

    #[cfg(test)]
    fn set_last_seen_for_test(&self, worker: PointId, instant: Instant) {
        let mut guard = self.state.lock().expect("health monitor mutex poisoned");
        guard.last_seen.insert(worker, instant);
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATION: PointId = PointId::Station(1);
    const REGISTER: PointId = PointId::Register(1);

    #[test]
    fn reports_busy_worker_after_timeout() {
        let monitor = HealthMonitor::new();
        let past = Instant::now() - Duration::from_millis(50);
        monitor.set_last_seen_for_test(STATION, past);
        let stalled = monitor.detect_stalled(Duration::from_millis(10), |_| true);
        assert_eq!(stalled, vec![STATION]);
    }

    #[test]
    fn idle_worker_is_not_stalled() {
        let monitor = HealthMonitor::new();
        let past = Instant::now() - Duration::from_secs(5);
        monitor.set_last_seen_for_test(REGISTER, past);
        let stalled = monitor.detect_stalled(Duration::from_secs(1), |_| false);
        assert!(stalled.is_empty());
        assert!(monitor.stalled_workers().is_empty());
    }

    #[test]
    fn stall_is_reported_once_per_episode() {
        let monitor = HealthMonitor::new();
        let past = Instant::now() - Duration::from_millis(30);
        monitor.set_last_seen_for_test(STATION, past);
        assert_eq!(monitor.detect_stalled(Duration::from_millis(5), |_| true).len(), 1);
        assert!(monitor.detect_stalled(Duration::from_millis(5), |_| true).is_empty());

        // Progress clears the mark.
        monitor.heartbeat(STATION);
        assert!(!monitor.stalled_workers().contains(&STATION));
    }

    #[test]
    fn retired_worker_is_forgotten() {
        let monitor = HealthMonitor::new();
        monitor.register_worker(REGISTER);
        monitor.retire(REGISTER);
        let stalled = monitor.detect_stalled(Duration::ZERO, |_| true);
        assert!(stalled.is_empty());
    }
}
