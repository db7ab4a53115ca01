// Shared run-control gate
//
// The gate is the only mutable state crossing the boundary between the
// operator interface (GUI, batch driver, stdin console) and the acquisition
// loop. Reads and writes are single atomic operations on a u8; waiters park on
// a condition variable so a write wakes them immediately.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Tri-state run-control value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum GateState {
    Stop = 0,
    Run = 1,
    Wait = 2,
}

impl GateState {
    /// Decode a raw gate value; anything unknown is treated as `Stop`
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Run,
            2 => Self::Wait,
            _ => Self::Stop,
        }
    }

    pub fn as_raw(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stop => "stop",
            Self::Run => "run",
            Self::Wait => "wait",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for GateState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stop" | "0" => Ok(Self::Stop),
            "run" | "start" | "1" => Ok(Self::Run),
            "wait" | "pause" | "2" => Ok(Self::Wait),
            other => Err(format!("Unknown gate state '{}'", other)),
        }
    }
}

struct GateInner {
    state: AtomicU8,
    lock: Mutex<()>,
    changed: Condvar,
}

/// Handle on a shared gate. Clones refer to the same state.
#[derive(Clone)]
pub struct ControlGate {
    inner: Arc<GateInner>,
}

impl ControlGate {
    pub fn new(initial: GateState) -> Self {
        Self {
            inner: Arc::new(GateInner {
                state: AtomicU8::new(initial.as_raw()),
                lock: Mutex::new(()),
                changed: Condvar::new(),
            }),
        }
    }

    /// Current value, without blocking
    pub fn read(&self) -> GateState {
        GateState::from_raw(self.inner.state.load(Ordering::SeqCst))
    }

    /// Set a new value and wake every waiter
    pub fn write(&self, state: GateState) {
        // Storing under the lock pairs with the check-then-wait in `wait_timeout_while`,
        // so a write cannot slip between a waiter's check and its park.
        let _guard = self.inner.lock.lock();
        let previous = self.inner.state.swap(state.as_raw(), Ordering::SeqCst);
        if previous != state.as_raw() {
            log::debug!(
                "Control gate changed: {} -> {}",
                GateState::from_raw(previous),
                state
            );
        }
        self.inner.changed.notify_all();
    }

    /// Block while `condition` holds for the current value, for at most `timeout`.
    ///
    /// Returns the value observed when the wait ended.
    pub fn wait_timeout_while<F>(&self, timeout: Duration, mut condition: F) -> GateState
    where
        F: FnMut(GateState) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock.lock();

        loop {
            let current = self.read();
            if !condition(current) {
                return current;
            }
            if self.inner.changed.wait_until(&mut guard, deadline).timed_out() {
                return self.read();
            }
        }
    }

    /// Wait up to `timeout` for the gate to leave `Wait`
    pub fn wait_while_waiting(&self, timeout: Duration) -> GateState {
        self.wait_timeout_while(timeout, |state| state == GateState::Wait)
    }

    /// Sleep for `duration` unless the gate turns to `Stop` first
    pub fn sleep_unless_stopped(&self, duration: Duration) -> GateState {
        self.wait_timeout_while(duration, |state| state != GateState::Stop)
    }
}

impl Default for ControlGate {
    fn default() -> Self {
        Self::new(GateState::Run)
    }
}

impl fmt::Debug for ControlGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlGate")
            .field("state", &self.read())
            .finish()
    }
}
