use std::time::Duration;

use tracing::debug;

use crate::{
    error::InitializationError,
    identity::ClassIdentity,
    lock::{Entry, InitState, InitiationLock},
    sync::{AtomicBool, Ordering},
};

/// Per class initialization record. One exists per class identity for as
/// long as the coordinator that created it.
pub struct ClassRecord {
    identity: ClassIdentity,
    lock: InitiationLock,
    // Set once the state is `Initialized`, read without taking the lock.
    initialized: AtomicBool,
}

pub(crate) enum Acquired<'r> {
    Initialized,
    Erroneous(InitializationError),
    Reentrant,
    Claimed(Claim<'r>),
}

impl ClassRecord {
    pub fn new(identity: ClassIdentity) -> Self {
        Self {
            identity,
            lock: InitiationLock::new(),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn identity(&self) -> &ClassIdentity {
        &self.identity
    }

    pub fn state(&self) -> InitState {
        self.lock.state()
    }

    /// Lock-free check. A `true` here also makes every write of the
    /// static initializer visible to the caller.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn acquire(&self, stall_warning: Option<Duration>) -> Acquired<'_> {
        match self.lock.acquire(&self.identity, stall_warning) {
            Entry::Initialized => Acquired::Initialized,
            Entry::Erroneous(err) => Acquired::Erroneous(err),
            Entry::Reentrant => Acquired::Reentrant,
            Entry::Claimed => {
                debug!(class = %self.identity, "claimed initialization");
                Acquired::Claimed(Claim {
                    record: self,
                    completed: false,
                })
            }
        }
    }

    fn finish(&self, outcome: Result<(), InitializationError>) {
        let initialized = outcome.is_ok();
        match &outcome {
            Ok(()) => debug!(class = %self.identity, "initialized"),
            Err(err) => debug!(class = %self.identity, %err, "initialization failed"),
        }
        self.lock.release(outcome);
        if initialized {
            self.initialized.store(true, Ordering::Release);
        }
    }
}

/// Ownership of a class that is `InProgress` on the current thread.
///
/// Dropping it without calling [`Claim::complete`] (the initializer body
/// unwound) parks the class as erroneous so waiting threads are released.
pub(crate) struct Claim<'r> {
    record: &'r ClassRecord,
    completed: bool,
}

impl Claim<'_> {
    pub(crate) fn complete(mut self, outcome: &Result<(), InitializationError>) {
        self.completed = true;
        self.record.finish(outcome.clone());
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.completed {
            let class = self.record.identity.clone();
            self.record
                .finish(Err(InitializationError::InitializerPanicked { class }));
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use super::*;

    #[test]
    fn completing_a_claim_sets_the_fast_path_flag() {
        let record = ClassRecord::new(ClassIdentity::bootstrap("A"));
        assert!(!record.is_initialized());
        let Acquired::Claimed(claim) = record.acquire(None) else {
            panic!("linked record must be claimed");
        };
        assert!(matches!(record.acquire(None), Acquired::Reentrant));
        claim.complete(&Ok(()));
        assert!(record.is_initialized());
        assert_eq!(record.state(), InitState::Initialized);
    }

    #[test]
    fn dropped_claim_marks_the_record_erroneous() {
        let record = ClassRecord::new(ClassIdentity::bootstrap("A"));
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _claim = record.acquire(None);
            panic!("initializer blew up");
        }));
        assert!(result.is_err());
        assert!(!record.is_initialized());
        assert_eq!(
            record.state(),
            InitState::Erroneous(InitializationError::InitializerPanicked {
                class: ClassIdentity::bootstrap("A")
            })
        );
    }
}

#[cfg(loom)]
mod loom_tests {
    use std::sync::Arc;

    use loom::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn exactly_one_thread_claims_a_record() {
        loom::model(|| {
            let record = Arc::new(ClassRecord::new(ClassIdentity::bootstrap("A")));
            let claims = Arc::new(AtomicUsize::new(0));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let record = record.clone();
                    let claims = claims.clone();
                    loom::thread::spawn(move || match record.acquire(None) {
                        Acquired::Claimed(claim) => {
                            claims.fetch_add(1, Ordering::SeqCst);
                            claim.complete(&Ok(()));
                        }
                        Acquired::Initialized => {}
                        Acquired::Reentrant | Acquired::Erroneous(_) => {
                            panic!("second thread must wait for the terminal state")
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
            assert_eq!(claims.load(Ordering::SeqCst), 1);
            assert!(record.is_initialized());
        });
    }

    #[test]
    fn waiter_observes_the_failure_of_the_owner() {
        loom::model(|| {
            let record = Arc::new(ClassRecord::new(ClassIdentity::bootstrap("A")));
            let Acquired::Claimed(claim) = record.acquire(None) else {
                panic!("linked record must be claimed");
            };
            let waiter = {
                let record = record.clone();
                loom::thread::spawn(move || match record.acquire(None) {
                    Acquired::Erroneous(err) => err,
                    _ => panic!("owner failed, waiter must see it"),
                })
            };
            let failure = InitializationError::InitializerPanicked {
                class: ClassIdentity::bootstrap("A"),
            };
            claim.complete(&Err(failure.clone()));
            assert_eq!(waiter.join().unwrap(), failure);
        });
    }
}
