//! One-shot broadcast signals and the two run barriers.
//!
//! A [`StopSignal`] is a channel that never carries a message: firing it
//! drops the only sender, which makes every clone of the receiver ready at
//! once without consuming anything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use crossbeam_utils::sync::WaitGroup;

/// Write-once, read-many broadcast event.
#[derive(Clone)]
pub struct StopSignal {
    fired: Arc<AtomicBool>,
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    rx: Receiver<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            fired: Arc::new(AtomicBool::new(false)),
            trigger: Arc::new(Mutex::new(Some(tx))),
            rx,
        }
    }

    /// Fire the signal. Returns `true` only for the call that fired it.
    pub fn fire(&self) -> bool {
        let sender = self
            .trigger
            .lock()
            .expect("stop signal mutex poisoned")
            .take();
        match sender {
            Some(sender) => {
                self.fired.store(true, Ordering::SeqCst);
                drop(sender);
                true
            }
            None => false,
        }
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Guard that fires the signal when dropped, including during a panic.
    pub fn fire_on_drop(&self) -> FireOnDrop {
        FireOnDrop(self.clone())
    }

    /// Receiver that becomes ready (disconnected) once the signal fires.
    /// Intended for `select!`.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

    /// Sleep for `duration` unless the signal fires first.
    /// Returns `true` if the signal fired.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        match self.rx.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }
}

pub struct FireOnDrop(StopSignal);

impl Drop for FireOnDrop {
    fn drop(&mut self) {
        self.0.fire();
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Startup-ready and fully-stopped barriers.
///
/// Each worker holds one clone of both wait groups. It drops its `ready`
/// clone once it is blocked waiting for input and its `stopped` clone when it
/// exits. The two release independently.
pub struct Barriers {
    ready: WaitGroup,
    stopped: WaitGroup,
}

/// A worker's share of the barriers.
pub struct WorkerBarriers {
    ready: Option<WaitGroup>,
    stopped: WaitGroup,
}

impl Barriers {
    pub fn new() -> Self {
        Self {
            ready: WaitGroup::new(),
            stopped: WaitGroup::new(),
        }
    }

    pub fn enlist(&self) -> WorkerBarriers {
        WorkerBarriers {
            ready: Some(self.ready.clone()),
            stopped: self.stopped.clone(),
        }
    }

    /// Split into the startup gate (handed to the generator) and the
    /// completion gate (kept by the coordinator).
    pub fn split(self) -> (WaitGroup, WaitGroup) {
        (self.ready, self.stopped)
    }
}

impl Default for Barriers {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerBarriers {
    /// Count down the startup barrier. Idempotent.
    pub fn mark_ready(&mut self) {
        self.ready.take();
    }

    /// Count down the completion barrier.
    pub fn mark_stopped(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn fires_exactly_once() {
        let signal = StopSignal::new();
        assert!(!signal.is_fired());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[test]
    fn every_clone_observes_the_signal() {
        let signal = StopSignal::new();
        let (tx, rx) = mpsc::channel();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let signal = signal.clone();
            let tx = tx.clone();
            handles.push(thread::spawn(move || {
                // Blocks until the signal fires; reading does not consume it.
                let _ = signal.receiver().recv();
                tx.send(()).expect("send observed");
            }));
        }

        signal.fire();
        for _ in 0..4 {
            rx.recv_timeout(Duration::from_secs(1))
                .expect("clone observed signal");
        }
        for handle in handles {
            handle.join().expect("observer thread panicked");
        }
        assert!(signal.wait_timeout(Duration::ZERO));
    }

    #[test]
    fn guard_fires_when_thread_panics() {
        let signal = StopSignal::new();
        let guarded = signal.clone();
        let result = thread::spawn(move || {
            let _guard = guarded.fire_on_drop();
            panic!("producer failed");
        })
        .join();
        assert!(result.is_err());
        assert!(signal.is_fired());
    }

    #[test]
    fn wait_timeout_expires_without_signal() {
        let signal = StopSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn startup_barrier_waits_for_all_workers() {
        let barriers = Barriers::new();
        let workers: Vec<_> = (0..3).map(|_| barriers.enlist()).collect();
        let (ready, stopped) = barriers.split();
        let (tx, rx) = mpsc::channel();

        let gate = thread::spawn(move || {
            ready.wait();
            tx.send(()).expect("send released");
        });

        let mut workers = workers;
        for worker in workers.iter_mut().take(2) {
            worker.mark_ready();
        }
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        workers[2].mark_ready();
        rx.recv_timeout(Duration::from_secs(1))
            .expect("startup barrier released");
        gate.join().expect("gate thread panicked");

        for worker in workers {
            worker.mark_stopped();
        }
        stopped.wait();
    }
}
