use std::{
    collections::HashMap,
    sync::{Arc, PoisonError},
    time::Duration,
};

use tracing::trace;

use crate::{
    error::{InitializationError, InitializerFailure, LinkageError},
    identity::{ClassIdentity, TypeShape},
    initializer::Initializer,
    lock::InitState,
    record::ClassRecord,
    sync::RwLock,
};

/// The class model as seen by initialization. Provided by the loader.
pub trait ClassResolver: Send + Sync {
    fn resolve_superclass(&self, class: &ClassIdentity)
        -> Result<Option<ClassIdentity>, LinkageError>;

    /// Direct superinterfaces in declaration order.
    fn resolve_superinterfaces(
        &self,
        _class: &ClassIdentity,
    ) -> Result<Vec<ClassIdentity>, LinkageError> {
        Ok(Vec::new())
    }

    fn is_interface(&self, _class: &ClassIdentity) -> bool {
        false
    }

    /// Interfaces declaring no default or static methods are never forced
    /// to initialize by their implementors.
    fn is_interface_without_default_or_static_members(&self, class: &ClassIdentity) -> bool;
}

/// Executes static initializer bodies. Provided by the interpreter.
pub trait InitializerRunner: Send + Sync {
    /// Runs the static initializer of `class`.
    ///
    /// The body may call back into `coordinator` for any class it touches.
    fn run_static_initializer(
        &self,
        class: &ClassIdentity,
        coordinator: &Coordinator,
    ) -> Result<(), InitializerFailure>;
}

#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Warn when a thread has waited this long on another thread's
    /// initialization of a class. The wait itself never gives up.
    /// A zero duration disables the warning.
    pub stall_warning: Option<Duration>,
}

/// Registry of class records and the entry point for class initialization.
pub struct Coordinator {
    records: RwLock<HashMap<ClassIdentity, Arc<ClassRecord>>>,
    resolver: Arc<dyn ClassResolver>,
    runner: Arc<dyn InitializerRunner>,
    options: Options,
}

impl Coordinator {
    pub fn new(
        resolver: Arc<dyn ClassResolver>,
        runner: Arc<dyn InitializerRunner>,
        options: Options,
    ) -> Arc<Self> {
        Arc::new(Self {
            records: RwLock::new(HashMap::new()),
            resolver,
            runner,
            options,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub(crate) fn resolver(&self) -> &dyn ClassResolver {
        self.resolver.as_ref()
    }

    pub(crate) fn runner(&self) -> &dyn InitializerRunner {
        self.runner.as_ref()
    }

    /// Returns the record for `class`, creating it on first use.
    /// Concurrent callers always get the same record.
    pub fn record_for(&self, class: &ClassIdentity) -> Arc<ClassRecord> {
        if let Some(record) = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(class)
        {
            return record.clone();
        }
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records
            .entry(class.clone())
            .or_insert_with(|| {
                trace!(%class, "created class record");
                Arc::new(ClassRecord::new(class.clone()))
            })
            .clone()
    }

    /// Makes sure `class` is initialized before the caller proceeds.
    ///
    /// If the calling thread is itself in the middle of initializing `class`
    /// this returns immediately, and the caller may observe static fields
    /// that still hold their default values.
    pub fn ensure_initialized(&self, class: &ClassIdentity) -> Result<(), InitializationError> {
        let shape = class
            .shape()
            .map_err(|source| InitializationError::Linkage {
                class: class.clone(),
                source,
            })?;
        match shape {
            TypeShape::Class => {}
            TypeShape::PrimitiveArray(_) => return Ok(()),
            TypeShape::ReferenceArray(element) => {
                trace!(%element, "array type delegates to its element type");
                return self.ensure_initialized(&element);
            }
        }
        let record = self.record_for(class);
        if record.is_initialized() {
            return Ok(());
        }
        Initializer::new(self).initialize(&record)
    }

    pub fn is_initialized(&self, class: &ClassIdentity) -> bool {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(class)
            .is_some_and(|record| record.is_initialized())
    }

    /// State of `class`, `None` if initialization was never requested.
    pub fn state_of(&self, class: &ClassIdentity) -> Option<InitState> {
        let record = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(class)
            .cloned();
        record.map(|record| record.state())
    }

    /// States of every known class, sorted by identity.
    pub fn snapshot(&self) -> Vec<(ClassIdentity, InitState)> {
        let records: Vec<_> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut states: Vec<_> = records
            .iter()
            .map(|record| (record.identity().clone(), record.state()))
            .collect();
        states.sort_by(|(a, _), (b, _)| a.cmp(b));
        states
    }
}
