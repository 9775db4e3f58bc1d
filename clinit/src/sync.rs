//! Synchronisation primitives used by the initialization core.
//!
//! Under `cfg(loom)` everything is swapped for the loom model checker
//! equivalents so the lock protocol can be checked exhaustively.

use std::{sync::PoisonError, time::Duration};

#[cfg(not(loom))]
pub(crate) use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Condvar, Mutex, MutexGuard, RwLock,
    },
    thread::{self, ThreadId},
};

#[cfg(loom)]
pub(crate) use loom::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Condvar, Mutex, MutexGuard, RwLock,
    },
    thread::{self, ThreadId},
};

pub(crate) fn current_thread() -> ThreadId {
    thread::current().id()
}

/// Locks the mutex, recovering the guard if a previous holder panicked.
/// None of our critical sections leave the protected data half-updated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Waits on the condition variable.
/// Returns the reacquired guard and whether the wait ran out of time
/// before anyone notified us. A `None` or zero timeout waits indefinitely.
#[cfg(not(loom))]
pub(crate) fn wait<'a, T>(
    cvar: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: Option<Duration>,
) -> (MutexGuard<'a, T>, bool) {
    match timeout.filter(|timeout| !timeout.is_zero()) {
        Some(timeout) => {
            let (guard, result) = cvar
                .wait_timeout(guard, timeout)
                .unwrap_or_else(PoisonError::into_inner);
            (guard, result.timed_out())
        }
        None => (cvar.wait(guard).unwrap_or_else(PoisonError::into_inner), false),
    }
}

// loom has no notion of wall clock time, the stall detector is off.
#[cfg(loom)]
pub(crate) fn wait<'a, T>(
    cvar: &Condvar,
    guard: MutexGuard<'a, T>,
    _timeout: Option<Duration>,
) -> (MutexGuard<'a, T>, bool) {
    (cvar.wait(guard).unwrap_or_else(PoisonError::into_inner), false)
}
