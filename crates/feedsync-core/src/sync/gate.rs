//! Delivery gate shared by live subscriptions and the identity observer.
//!
//! The gate mutex is held for the whole of every delivery. Closing takes the
//! same mutex and bumps the generation, so once `close` returns no listener
//! can run again, and a producer still holding the old generation is refused.
//!
//! The last delivered value is kept and replayed to listeners registered
//! later, so a listener added after the first delivery still starts from the
//! current state.
//!
//! Listeners run while the gate is locked. A listener may close the gate it
//! runs on: the close is applied as soon as that listener returns and the
//! remaining listeners of the delivery are skipped. Adding or removing
//! listeners from inside a listener is not supported.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, MutexGuard};

/// Identifier of a listener registered on a handle
pub type ListenerId = u64;

type Listener<T> = Box<dyn Fn(&T) + Send + Sync>;

struct GateState<T> {
    generation: u64,
    open: bool,
    next_listener: ListenerId,
    listeners: Vec<(ListenerId, Listener<T>)>,
    last: Option<T>,
}

impl<T> GateState<T> {
    fn shut(&mut self) {
        self.open = false;
        self.generation += 1;
        self.listeners.clear();
        self.last = None;
    }
}

pub(crate) struct DeliveryGate<T> {
    state: Mutex<GateState<T>>,
    /// Thread currently running this gate's listeners
    delivering: Mutex<Option<ThreadId>>,
    /// Close requested by a listener mid-delivery
    close_deferred: AtomicBool,
}

impl<T> DeliveryGate<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                generation: 0,
                open: true,
                next_listener: 0,
                listeners: Vec::new(),
                last: None,
            }),
            delivering: Mutex::new(None),
            close_deferred: AtomicBool::new(false),
        }
    }

    fn in_delivery(&self) -> bool {
        *self.delivering.lock() == Some(thread::current().id())
    }

    fn closing(&self) -> bool {
        self.close_deferred.load(Ordering::SeqCst)
    }

    /// Run `f` with this thread marked as the delivering one
    fn run_delivery<R>(&self, f: impl FnOnce() -> R) -> R {
        *self.delivering.lock() = Some(thread::current().id());
        let result = f();
        *self.delivering.lock() = None;
        result
    }

    /// Apply a close a listener asked for. Returns whether one was pending.
    fn apply_deferred_close(&self, state: &mut MutexGuard<'_, GateState<T>>) -> bool {
        if self.closing() && state.open {
            state.shut();
            return true;
        }
        false
    }

    /// Generation a producer must present to deliver
    pub(crate) fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub(crate) fn is_open(&self) -> bool {
        if self.closing() {
            return false;
        }
        match self.state.try_lock() {
            Some(state) => state.open,
            // Only a listener of the running delivery gets here
            None if self.in_delivery() => true,
            None => self.state.lock().open,
        }
    }

    /// Register a listener, replaying the last delivered value to it.
    /// Returns `None` once the gate is closed.
    pub(crate) fn add_listener<F>(&self, listener: F) -> Option<ListenerId>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        if !state.open {
            return None;
        }
        if let Some(last) = state.last.as_ref() {
            self.run_delivery(|| listener(last));
            if self.apply_deferred_close(&mut state) {
                return None;
            }
        }
        let id = state.next_listener;
        state.next_listener += 1;
        state.listeners.push((id, Box::new(listener)));
        Some(id)
    }

    pub(crate) fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(listener_id, _)| *listener_id != id);
        state.listeners.len() != before
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Drop every listener but keep the gate open, so a later `close` still
    /// reports the first release.
    pub(crate) fn disconnect_listeners(&self) {
        self.state.lock().listeners.clear();
    }

    /// Run every listener with `value`, unless the gate was closed or the
    /// producer's generation is stale. Returns whether delivery happened.
    pub(crate) fn deliver(&self, generation: u64, value: T) -> bool {
        let mut state = self.state.lock();
        if !state.open || state.generation != generation {
            return false;
        }
        self.run_delivery(|| {
            for (_, listener) in state.listeners.iter() {
                if self.closing() {
                    break;
                }
                listener(&value);
            }
        });
        if self.apply_deferred_close(&mut state) {
            return false;
        }
        state.last = Some(value);
        true
    }

    /// The last delivered value, if the gate is still open
    pub(crate) fn last(&self) -> Option<T>
    where
        T: Clone,
    {
        self.state.lock().last.clone()
    }

    /// Close the gate for good. Returns `false` if it was already closed.
    ///
    /// Called from another thread this waits for a running delivery to
    /// finish. Called by a listener of that delivery it takes effect when
    /// the listener returns.
    pub(crate) fn close(&self) -> bool {
        let mut state = match self.state.try_lock() {
            Some(state) => state,
            None if self.in_delivery() => return !self.close_deferred.swap(true, Ordering::SeqCst),
            None => self.state.lock(),
        };
        if !state.open {
            return false;
        }
        state.shut();
        true
    }
}
