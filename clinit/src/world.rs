//! An in-memory class world.
//!
//! Stands in for the loader and the interpreter: classes are declared up
//! front and their static initializers are plain closures. Field accesses
//! and allocations go through the coordinator exactly like the bytecodes
//! that trigger initialization would.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    coordinator::{ClassResolver, Coordinator, InitializerRunner, Options},
    error::{InitializationError, InitializerFailure, LinkageError, Throwable},
    identity::ClassIdentity,
    sync::{self, Mutex},
};

pub type Body =
    Arc<dyn Fn(&Coordinator, &World) -> Result<(), InitializerFailure> + Send + Sync>;

/// Value of a static field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    /// Reference to an instance of the given class.
    Ref(ClassIdentity),
}

#[derive(Clone)]
pub struct ClassDef {
    identity: ClassIdentity,
    superclass: Option<ClassIdentity>,
    interfaces: Vec<ClassIdentity>,
    is_interface: bool,
    declares_defaults: bool,
    body: Option<Body>,
}

impl ClassDef {
    pub fn class(identity: ClassIdentity) -> Self {
        Self {
            identity,
            superclass: None,
            interfaces: Vec::new(),
            is_interface: false,
            declares_defaults: false,
            body: None,
        }
    }

    pub fn interface(identity: ClassIdentity) -> Self {
        Self {
            is_interface: true,
            ..Self::class(identity)
        }
    }

    pub fn extends(mut self, superclass: ClassIdentity) -> Self {
        self.superclass = Some(superclass);
        self
    }

    /// Adds a direct superinterface. For interfaces this is what they extend.
    pub fn implements(mut self, interface: ClassIdentity) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Marks an interface as declaring default or static methods, which makes
    /// implementing classes initialize it.
    pub fn with_default_methods(mut self) -> Self {
        self.declares_defaults = true;
        self
    }

    pub fn body<F>(mut self, body: F) -> Self
    where
        F: Fn(&Coordinator, &World) -> Result<(), InitializerFailure> + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(body));
        self
    }

    pub fn identity(&self) -> &ClassIdentity {
        &self.identity
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("identity", &self.identity)
            .field("superclass", &self.superclass)
            .field("interfaces", &self.interfaces)
            .field("is_interface", &self.is_interface)
            .field("declares_defaults", &self.declares_defaults)
            .field("body", &self.body.as_ref().map(|_| "<static-initializer>"))
            .finish()
    }
}

pub struct World {
    classes: HashMap<ClassIdentity, ClassDef>,
    statics: Mutex<HashMap<(ClassIdentity, String), Value>>,
    run_log: Mutex<Vec<ClassIdentity>>,
}

impl World {
    pub fn new() -> Self {
        Self {
            classes: HashMap::new(),
            statics: Mutex::new(HashMap::new()),
            run_log: Mutex::new(Vec::new()),
        }
    }

    pub fn define(&mut self, def: ClassDef) -> &mut Self {
        self.classes.insert(def.identity.clone(), def);
        self
    }

    /// Shares the world as both resolver and runner of a new coordinator.
    pub fn into_coordinator(self, options: Options) -> (Arc<World>, Arc<Coordinator>) {
        let world = Arc::new(self);
        let coordinator = Coordinator::new(world.clone(), world.clone(), options);
        (world, coordinator)
    }

    /// `getstatic`: initializes `class` and reads the field.
    /// Fields never written read as [`Value::Null`].
    pub fn get_static(
        &self,
        coordinator: &Coordinator,
        class: &ClassIdentity,
        field: &str,
    ) -> Result<Value, InitializationError> {
        coordinator.ensure_initialized(class)?;
        Ok(self.peek_static(class, field))
    }

    /// `putstatic`: initializes `class` and writes the field.
    pub fn put_static(
        &self,
        coordinator: &Coordinator,
        class: &ClassIdentity,
        field: &str,
        value: Value,
    ) -> Result<(), InitializationError> {
        coordinator.ensure_initialized(class)?;
        sync::lock(&self.statics).insert((class.clone(), field.to_owned()), value);
        Ok(())
    }

    /// Reads a static field without triggering initialization.
    pub fn peek_static(&self, class: &ClassIdentity, field: &str) -> Value {
        sync::lock(&self.statics)
            .get(&(class.clone(), field.to_owned()))
            .cloned()
            .unwrap_or_default()
    }

    /// `new`: initializes `class` and returns a reference to a fresh instance.
    pub fn new_instance(
        &self,
        coordinator: &Coordinator,
        class: &ClassIdentity,
    ) -> Result<Value, InitializationError> {
        coordinator.ensure_initialized(class)?;
        Ok(Value::Ref(class.clone()))
    }

    /// `anewarray`: initializes the array type of `element` and returns a
    /// reference to the array.
    pub fn new_array(
        &self,
        coordinator: &Coordinator,
        element: &ClassIdentity,
    ) -> Result<Value, InitializationError> {
        let array = element.array_of();
        coordinator.ensure_initialized(&array)?;
        Ok(Value::Ref(array))
    }

    /// How many times the static initializer of `class` ran.
    pub fn run_count(&self, class: &ClassIdentity) -> usize {
        sync::lock(&self.run_log)
            .iter()
            .filter(|ran| *ran == class)
            .count()
    }

    /// Classes in the order their static initializers started.
    pub fn run_log(&self) -> Vec<ClassIdentity> {
        sync::lock(&self.run_log).clone()
    }

    fn lookup(&self, class: &ClassIdentity) -> Result<&ClassDef, LinkageError> {
        self.classes
            .get(class)
            .ok_or_else(|| LinkageError::ClassNotFound(class.name().to_owned()))
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassResolver for World {
    fn resolve_superclass(
        &self,
        class: &ClassIdentity,
    ) -> Result<Option<ClassIdentity>, LinkageError> {
        let def = self.lookup(class)?;
        match &def.superclass {
            Some(superclass) => Ok(Some(self.lookup(superclass)?.identity.clone())),
            None => Ok(None),
        }
    }

    fn resolve_superinterfaces(
        &self,
        class: &ClassIdentity,
    ) -> Result<Vec<ClassIdentity>, LinkageError> {
        self.lookup(class)?
            .interfaces
            .iter()
            .map(|interface| self.lookup(interface).map(|def| def.identity.clone()))
            .collect()
    }

    fn is_interface(&self, class: &ClassIdentity) -> bool {
        self.classes
            .get(class)
            .is_some_and(|def| def.is_interface)
    }

    fn is_interface_without_default_or_static_members(&self, class: &ClassIdentity) -> bool {
        self.classes
            .get(class)
            .is_some_and(|def| def.is_interface && !def.declares_defaults)
    }
}

impl InitializerRunner for World {
    fn run_static_initializer(
        &self,
        class: &ClassIdentity,
        coordinator: &Coordinator,
    ) -> Result<(), InitializerFailure> {
        sync::lock(&self.run_log).push(class.clone());
        let def = self.lookup(class).map_err(|err| {
            Throwable::error("java.lang.NoClassDefFoundError", err.to_string())
        })?;
        match &def.body {
            Some(body) => body(coordinator, self),
            None => Ok(()),
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    fn class(name: &str) -> ClassIdentity {
        ClassIdentity::bootstrap(name)
    }

    #[test]
    fn unset_statics_read_as_null() {
        let mut world = World::new();
        world.define(ClassDef::class(class("A")));
        let (world, coordinator) = world.into_coordinator(Options::default());
        assert_eq!(world.get_static(&coordinator, &class("A"), "X"), Ok(Value::Null));
        world
            .put_static(&coordinator, &class("A"), "X", Value::Int(7))
            .unwrap();
        assert_eq!(world.peek_static(&class("A"), "X"), Value::Int(7));
    }

    #[test]
    fn undefined_superclass_is_class_not_found() {
        let mut world = World::new();
        world.define(ClassDef::class(class("A")).extends(class("Missing")));
        assert_eq!(
            world.resolve_superclass(&class("A")),
            Err(LinkageError::ClassNotFound("Missing".to_owned()))
        );
    }

    #[test]
    fn interface_flags() {
        let mut world = World::new();
        world
            .define(ClassDef::interface(class("Plain")))
            .define(ClassDef::interface(class("WithDefaults")).with_default_methods())
            .define(ClassDef::class(class("Impl")));
        assert!(world.is_interface_without_default_or_static_members(&class("Plain")));
        assert!(!world.is_interface_without_default_or_static_members(&class("WithDefaults")));
        assert!(!world.is_interface_without_default_or_static_members(&class("Impl")));
        assert!(world.is_interface(&class("WithDefaults")));
    }
}
