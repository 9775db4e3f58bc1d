use std::time::Duration;

use tracing::warn;

use crate::{
    error::InitializationError,
    identity::ClassIdentity,
    sync::{self, Condvar, Mutex, ThreadId},
};

/// Initialization state of a single class.
///
/// Only moves forward: `Linked -> InProgress -> Initialized | Erroneous`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InitState {
    Linked,
    InProgress { owner: ThreadId },
    Initialized,
    Erroneous(InitializationError),
}

impl InitState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InitState::Initialized | InitState::Erroneous(_))
    }
}

/// What a thread found when it acquired a class' initiation lock.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Entry {
    Initialized,
    Erroneous(InitializationError),
    /// The calling thread is the one running this class' initializer.
    Reentrant,
    /// The class was `Linked`, the calling thread now owns its initialization.
    Claimed,
}

/// Monitor guarding one class' state transitions.
///
/// Ownership is keyed on thread identity rather than lock depth, the owner
/// passes through `acquire` while every other thread waits for a terminal state.
pub struct InitiationLock {
    state: Mutex<InitState>,
    cvar: Condvar,
}

impl InitiationLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InitState::Linked),
            cvar: Condvar::new(),
        }
    }

    pub fn state(&self) -> InitState {
        sync::lock(&self.state).clone()
    }

    /// Blocks until the calling thread can proceed with `class`.
    ///
    /// A `Linked` class is claimed for the calling thread on the way out.
    pub(crate) fn acquire(&self, class: &ClassIdentity, stall_warning: Option<Duration>) -> Entry {
        let me = sync::current_thread();
        let mut state = sync::lock(&self.state);
        let mut waited = Duration::ZERO;
        loop {
            if let InitState::Linked = *state {
                *state = InitState::InProgress { owner: me };
                return Entry::Claimed;
            }
            let owner = match &*state {
                InitState::Initialized => return Entry::Initialized,
                InitState::Erroneous(err) => return Entry::Erroneous(err.clone()),
                InitState::InProgress { owner } if *owner == me => return Entry::Reentrant,
                InitState::InProgress { owner } => *owner,
                InitState::Linked => unreachable!("claimed above"),
            };
            let (guard, timed_out) = sync::wait(&self.cvar, state, stall_warning);
            state = guard;
            if timed_out {
                waited += stall_warning.unwrap_or_default();
                warn!(
                    %class,
                    ?owner,
                    ?waited,
                    "still waiting for another thread to initialize class"
                );
            }
        }
    }

    /// Publishes the terminal state of an initialization owned by the calling
    /// thread and wakes every waiter.
    pub(crate) fn release(&self, outcome: Result<(), InitializationError>) {
        let mut state = sync::lock(&self.state);
        debug_assert!(
            matches!(&*state, InitState::InProgress { owner } if *owner == sync::current_thread()),
            "released an initiation lock the current thread does not own"
        );
        *state = match outcome {
            Ok(()) => InitState::Initialized,
            Err(err) => InitState::Erroneous(err),
        };
        self.cvar.notify_all();
    }
}

impl Default for InitiationLock {
    fn default() -> Self {
        Self::new()
    }
}
