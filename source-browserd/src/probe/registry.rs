use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use crate::probe::{ProbeId, ProbeUnit};

/// In-flight probes, shared between the discovery loop (which registers them)
/// and whoever reaps or drains them.
///
/// Every unit held here is either still running or finished but not yet
/// observed. Probe workers never take the lock.
pub struct ProbeRegistry {
    units: Mutex<Vec<ProbeUnit>>,
    done_tx: flume::Sender<ProbeId>,
    done_rx: flume::Receiver<ProbeId>,
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeRegistry {
    pub fn new() -> Self {
        let (done_tx, done_rx) = flume::unbounded();
        Self {
            units: Mutex::new(Vec::new()),
            done_tx,
            done_rx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ProbeUnit>> {
        // A panic while holding the lock leaves the list itself consistent
        self.units.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sender handed to each new unit for its completion notice
    pub fn notifier(&self) -> flume::Sender<ProbeId> {
        self.done_tx.clone()
    }

    /// Receiver of completion notices, for waking a maintenance task instead
    /// of polling. Notices are wakeups only; `reap` does the removal.
    pub fn completions(&self) -> flume::Receiver<ProbeId> {
        self.done_rx.clone()
    }

    pub fn register(&self, unit: ProbeUnit) {
        self.lock().push(unit);
    }

    /// Starts and registers a unit under the lock, but only while `gate` is
    /// set. Returns `Ok(false)` if the gate was closed and nothing started.
    pub fn register_while(
        &self,
        gate: &AtomicBool,
        start: impl FnOnce() -> io::Result<ProbeUnit>,
    ) -> io::Result<bool> {
        let mut units = self.lock();
        if !gate.load(Ordering::SeqCst) {
            return Ok(false);
        }
        units.push(start()?);
        Ok(true)
    }

    /// Removes and observes every finished unit. Never waits on a running one.
    pub fn reap(&self) -> usize {
        let mut units = self.lock();
        self.done_rx.try_iter().for_each(drop);

        let (finished, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut *units).into_iter().partition(ProbeUnit::is_finished);
        *units = pending;

        let reaped = finished.len();
        for unit in finished {
            unit.observe();
        }
        if reaped > 0 {
            tracing::debug!("Reaped {} RTSP probes, {} pending", reaped, units.len());
        }
        reaped
    }

    /// Waits for every unit to finish and removes it. Used at shutdown; once
    /// this returns the registry is empty.
    pub fn drain(&self) -> usize {
        let mut units = self.lock();
        let drained = units.len();
        for unit in units.drain(..) {
            unit.observe();
        }
        self.done_rx.try_iter().for_each(drop);
        drained
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
