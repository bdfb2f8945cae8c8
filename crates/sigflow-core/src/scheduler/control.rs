//! Cross-thread control of a running tick loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// How a pause request takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseMode {
    /// Pause at the end of the current round.
    Immediate,
    /// Keep ticking until a round makes no progress, then pause. Give up
    /// (and keep running) if that takes more than `timeout_ticks` rounds.
    Drain {
        /// Rounds to wait for the pipeline to drain.
        timeout_ticks: u64,
    },
}

#[derive(Debug, Default)]
struct PauseState {
    requested: Option<PauseMode>,
    drain_start: Option<u64>,
}

#[derive(Debug)]
struct Control {
    abort: AtomicBool,
    pause: Mutex<PauseState>,
    resumed: Condvar,
    data_available: Mutex<bool>,
    data_cv: Condvar,
    started: Instant,
}

/// Cloneable control handle of a [`Scheduler`](super::Scheduler).
///
/// Other threads use it to pause, resume or abort the loop, and external
/// producers use it to wake the loop after writing.
///
/// ```rust
/// use sigflow_core::{ComponentRegistry, MapConfig, PauseMode, Scheduler};
///
/// let registry = ComponentRegistry::new();
/// let config = MapConfig::new();
/// let scheduler = Scheduler::new(&registry, &config);
/// let handle = scheduler.handle();
///
/// std::thread::spawn(move || handle.request_abort()).join().unwrap();
/// assert!(scheduler.handle().is_abort());
/// ```
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    inner: Arc<Control>,
}

impl Default for SchedulerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerHandle {
    /// Fresh handle with no pending requests.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Control {
                abort: AtomicBool::new(false),
                pause: Mutex::new(PauseState::default()),
                resumed: Condvar::new(),
                data_available: Mutex::new(false),
                data_cv: Condvar::new(),
                started: Instant::now(),
            }),
        }
    }

    /// Request a pause. Ignored while another pause is pending.
    pub fn pause(&self, mode: PauseMode) {
        let mut state = self.inner.pause.lock();
        if state.requested.is_some() {
            debug!(?mode, "pause already pending, request ignored");
            return;
        }
        state.requested = Some(mode);
        state.drain_start = None;
        debug!(?mode, "pause requested");
    }

    /// Cancel a pending pause or wake a paused loop.
    pub fn resume(&self) {
        {
            let mut state = self.inner.pause.lock();
            state.requested = None;
            state.drain_start = None;
        }
        self.inner.resumed.notify_all();
        self.signal_data_available();
    }

    /// Returns `true` while a pause is requested or in effect.
    pub fn is_paused(&self) -> bool {
        self.inner.pause.lock().requested.is_some()
    }

    /// Stop the loop at the next round boundary and wake every wait.
    pub fn request_abort(&self) {
        self.resume();
        self.inner.abort.store(true, Ordering::SeqCst);
        self.signal_data_available();
    }

    /// Returns `true` once an abort was requested.
    pub fn is_abort(&self) -> bool {
        self.inner.abort.load(Ordering::SeqCst)
    }

    /// Wake a loop waiting for external data. The signal is latched until
    /// the loop consumes it.
    pub fn signal_data_available(&self) {
        *self.inner.data_available.lock() = true;
        self.inner.data_cv.notify_all();
    }

    /// Time since the handle was created.
    pub fn elapsed(&self) -> Duration {
        self.inner.started.elapsed()
    }

    /// Block until data is signalled, an abort is requested or `timeout` passes.
    ///
    /// Returns `true` if a signal was consumed.
    pub(crate) fn wait_for_data(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flag = self.inner.data_available.lock();
        while !*flag && !self.is_abort() {
            if self.inner.data_cv.wait_until(&mut flag, deadline).timed_out() {
                break;
            }
        }
        std::mem::replace(&mut *flag, false)
    }

    pub(crate) fn pending_pause(&self) -> Option<PauseMode> {
        self.inner.pause.lock().requested
    }

    /// Record the first round of a drain pause; returns the start round and
    /// whether this call started it.
    pub(crate) fn begin_drain(&self, tick: u64) -> (u64, bool) {
        let mut state = self.inner.pause.lock();
        match state.drain_start {
            Some(start) => (start, false),
            None => {
                state.drain_start = Some(tick);
                (tick, true)
            }
        }
    }

    /// Drop a pending pause without waking anybody.
    pub(crate) fn cancel_pause(&self) {
        let mut state = self.inner.pause.lock();
        state.requested = None;
        state.drain_start = None;
    }

    /// Block while a pause is in effect.
    pub(crate) fn block_while_paused(&self) {
        let mut state = self.inner.pause.lock();
        while state.requested.is_some() && !self.is_abort() {
            self.inner.resumed.wait(&mut state);
        }
    }

    /// Clear abort and pause state for a new pipeline.
    pub(crate) fn reset(&self) {
        self.inner.abort.store(false, Ordering::SeqCst);
        self.cancel_pause();
        *self.inner.data_available.lock() = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn data_signal_is_latched() {
        let h = SchedulerHandle::new();
        h.signal_data_available();
        assert!(h.wait_for_data(Duration::from_millis(1)));
        assert!(!h.wait_for_data(Duration::from_millis(1)));
    }

    #[test]
    fn signal_from_other_thread_wakes_waiter() {
        let h = SchedulerHandle::new();
        let producer = h.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.signal_data_available();
        });
        assert!(h.wait_for_data(Duration::from_secs(5)));
        t.join().unwrap();
    }

    #[test]
    fn second_pause_ignored() {
        let h = SchedulerHandle::new();
        h.pause(PauseMode::Drain { timeout_ticks: 5 });
        h.pause(PauseMode::Immediate);
        assert_eq!(h.pending_pause(), Some(PauseMode::Drain { timeout_ticks: 5 }));
        h.resume();
        assert!(!h.is_paused());
    }

    #[test]
    fn drain_start_recorded_once() {
        let h = SchedulerHandle::new();
        h.pause(PauseMode::Drain { timeout_ticks: 5 });
        assert_eq!(h.begin_drain(3), (3, true));
        assert_eq!(h.begin_drain(7), (3, false));
    }

    #[test]
    fn abort_releases_pause() {
        let h = SchedulerHandle::new();
        h.pause(PauseMode::Immediate);
        let other = h.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            other.request_abort();
        });
        h.block_while_paused();
        assert!(h.is_abort());
        t.join().unwrap();
    }
}
