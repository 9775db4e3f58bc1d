use std::collections::HashSet;

use tracing::{debug, trace};

use crate::{
    coordinator::Coordinator,
    error::{self, InitializationError},
    identity::ClassIdentity,
    record::{Acquired, ClassRecord},
};

/// Drives a single class through its initialization state machine.
pub(crate) struct Initializer<'c> {
    coordinator: &'c Coordinator,
}

impl<'c> Initializer<'c> {
    pub fn new(coordinator: &'c Coordinator) -> Self {
        Self { coordinator }
    }

    #[tracing::instrument(level = "trace", skip(self, record), fields(class = %record.identity()))]
    pub fn initialize(&self, record: &ClassRecord) -> Result<(), InitializationError> {
        let class = record.identity();
        match record.acquire(self.coordinator.options().stall_warning) {
            Acquired::Initialized => Ok(()),
            Acquired::Reentrant => {
                trace!(%class, "initialization already in progress on this thread");
                Ok(())
            }
            Acquired::Erroneous(recorded) => {
                debug!(%class, "class is in erroneous state");
                Err(InitializationError::no_class_def_found(class, recorded))
            }
            Acquired::Claimed(claim) => {
                let outcome = self.run_claimed(class);
                claim.complete(&outcome);
                outcome
            }
        }
    }

    // Runs with the class `InProgress` and owned by the current thread.
    fn run_claimed(&self, class: &ClassIdentity) -> Result<(), InitializationError> {
        self.initialize_supertypes(class)?;
        debug!(%class, "running static initializer");
        self.coordinator
            .runner()
            .run_static_initializer(class, self.coordinator)
            .map_err(|failure| error::wrap(class, failure))
    }

    fn initialize_supertypes(&self, class: &ClassIdentity) -> Result<(), InitializationError> {
        let resolver = self.coordinator.resolver();
        let linkage = |source| InitializationError::Linkage {
            class: class.clone(),
            source,
        };
        if let Some(superclass) = resolver.resolve_superclass(class).map_err(linkage)? {
            self.coordinator.ensure_initialized(&superclass)?;
        }
        // Interfaces never initialize their superinterfaces.
        if resolver.is_interface(class) {
            return Ok(());
        }
        for interface in self.superinterfaces_in_init_order(class)? {
            if resolver.is_interface_without_default_or_static_members(&interface) {
                continue;
            }
            self.coordinator.ensure_initialized(&interface)?;
        }
        Ok(())
    }

    /// Every superinterface of `class`, each interface's own superinterfaces
    /// ahead of it, direct ones in declaration order. No duplicates.
    fn superinterfaces_in_init_order(
        &self,
        class: &ClassIdentity,
    ) -> Result<Vec<ClassIdentity>, InitializationError> {
        let resolver = self.coordinator.resolver();
        let mut order = Vec::new();
        let mut expanded = HashSet::new();
        // (interface, its superinterfaces are already on the stack)
        let mut stack: Vec<(ClassIdentity, bool)> = Vec::new();
        let direct = resolver
            .resolve_superinterfaces(class)
            .map_err(|source| InitializationError::Linkage {
                class: class.clone(),
                source,
            })?;
        stack.extend(direct.into_iter().rev().map(|i| (i, false)));
        while let Some((interface, ready)) = stack.pop() {
            if ready {
                order.push(interface);
                continue;
            }
            if !expanded.insert(interface.clone()) {
                continue;
            }
            let supers = resolver
                .resolve_superinterfaces(&interface)
                .map_err(|source| InitializationError::Linkage {
                    class: interface.clone(),
                    source,
                })?;
            stack.push((interface, true));
            stack.extend(supers.into_iter().rev().map(|i| (i, false)));
        }
        Ok(order)
    }
}
