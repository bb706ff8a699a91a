//! Synchronization primitives for the run's OS-thread workers.
//!
//! Three primitives cover every cross-worker interaction:
//!
//! - [`StopSignal`]: the single cooperative cancellation signal. First setter
//!   wins and the state never reverts. Every blocking wait in the crate is
//!   composed as "stop OR this component's own event" so that no worker can
//!   hang on an event that will never fire.
//! - [`Latch`]: a one-shot readiness event ("mirror homed", "tracking live").
//! - [`Slot`]: a single-slot overwrite channel with clear-then-put semantics.
//!   Used both for the mirror mailbox (only the latest command matters, so
//!   posting never blocks and never queues) and for the result handoff (stale
//!   content is discarded before the fresh payload is queued).
//!
//! The result buffer needs no lock: it has a single writer until the handoff
//! and a single reader afterwards, so a `Slot` is sufficient by construction.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long stop-aware waits sleep between checks of their own event.
pub const STOP_POLL: Duration = Duration::from_millis(20);

/// Why the run was asked to stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The operator cut the run short.
    Operator,
    /// The configured run time limit elapsed.
    Timeout,
    /// A worker hit a fatal error and requested an orderly stop.
    Fault,
}

#[derive(Default)]
struct StopInner {
    state: Mutex<Option<StopReason>>,
    cvar: Condvar,
}

/// Monotonic, first-setter-wins stop request shared by all workers.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

impl StopSignal {
    /// A fresh, not-requested signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Returns `true` if this call was the first setter.
    pub fn request(&self, reason: StopReason) -> bool {
        let mut state = self.inner.state.lock();
        if state.is_some() {
            return false;
        }
        *state = Some(reason);
        self.inner.cvar.notify_all();
        true
    }

    /// Whether a stop has been requested.
    pub fn is_requested(&self) -> bool {
        self.inner.state.lock().is_some()
    }

    /// The winning stop reason, if any.
    pub fn reason(&self) -> Option<StopReason> {
        *self.inner.state.lock()
    }

    /// Block until a stop is requested, checking at most every `timeout`.
    ///
    /// Returns the reason once set. Never returns before the request.
    pub fn wait(&self, timeout: Duration) -> StopReason {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(reason) = *state {
                return reason;
            }
            self.inner.cvar.wait_for(&mut state, timeout);
        }
    }
}

struct LatchInner {
    set: Mutex<bool>,
    cvar: Condvar,
}

/// One-shot readiness event. Setting is idempotent.
#[derive(Clone)]
pub struct Latch {
    inner: Arc<LatchInner>,
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

impl Latch {
    /// An unset latch.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LatchInner {
                set: Mutex::new(false),
                cvar: Condvar::new(),
            }),
        }
    }

    /// Raise the latch. Later calls are no-ops.
    pub fn set(&self) {
        let mut set = self.inner.set.lock();
        if !*set {
            *set = true;
            self.inner.cvar.notify_all();
        }
    }

    /// Whether the latch has been raised.
    pub fn is_set(&self) -> bool {
        *self.inner.set.lock()
    }

    /// Wait up to `timeout` for the latch. Returns whether it is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut set = self.inner.set.lock();
        while !*set {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.inner.cvar.wait_for(&mut set, deadline - now);
        }
        true
    }

    /// Wait for the latch or a stop request, whichever comes first.
    ///
    /// Returns `true` if the latch fired. Waiting on a downstream readiness
    /// event without also watching the stop signal would hang forever if the
    /// operator stops before that component is reached.
    pub fn wait_or_stop(&self, stop: &StopSignal) -> bool {
        loop {
            if self.wait_timeout(STOP_POLL) {
                return true;
            }
            if stop.is_requested() {
                return false;
            }
        }
    }
}

struct SlotInner<T> {
    state: Mutex<SlotState<T>>,
    cvar: Condvar,
}

struct SlotState<T> {
    value: Option<T>,
    closed: bool,
}

/// Single-slot overwrite channel.
///
/// `put` always succeeds immediately and discards any unconsumed previous
/// value; `take_timeout` blocks until a value arrives or the wait expires.
/// No backpressure and no queueing, since only the latest value matters.
pub struct Slot<T> {
    inner: Arc<SlotInner<T>>,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Slot<T> {
    /// An empty, open slot.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SlotInner {
                state: Mutex::new(SlotState {
                    value: None,
                    closed: false,
                }),
                cvar: Condvar::new(),
            }),
        }
    }

    /// Clear-then-put: replace any pending value with `value` and wake a taker.
    pub fn put(&self, value: T) {
        let mut state = self.inner.state.lock();
        state.value = Some(value);
        self.inner.cvar.notify_one();
    }

    /// Take the pending value, waiting up to `timeout` for one to arrive.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            if let Some(value) = state.value.take() {
                return Some(value);
            }
            if state.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            self.inner.cvar.wait_for(&mut state, deadline - now);
        }
    }

    /// Close the slot: takers still drain a pending value, then see the close.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        state.closed = true;
        self.inner.cvar.notify_all();
    }

    /// Whether the slot has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}
