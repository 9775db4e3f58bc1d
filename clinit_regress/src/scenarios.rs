use std::{
    sync::{Arc, Barrier, Mutex},
    thread,
    time::Duration,
};

use clinit::{
    world::{ClassDef, Value, World},
    ClassIdentity, Coordinator, InitState, InitializationError, Options, Throwable,
};
use color_eyre::eyre::{self, bail, ensure, eyre};
use tracing::{debug, info};

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scenario {
    Object,
    Array,
    Concurrent,
    Sticky,
    All,
}

impl Scenario {
    pub fn expand(self) -> Vec<Scenario> {
        match self {
            Scenario::All => vec![
                Scenario::Object,
                Scenario::Array,
                Scenario::Concurrent,
                Scenario::Sticky,
            ],
            scenario => vec![scenario],
        }
    }
}

pub struct Settings {
    pub threads: usize,
    pub options: Options,
}

pub fn run(scenario: Scenario, settings: &Settings) -> eyre::Result<()> {
    info!(?scenario, "running scenario");
    match scenario {
        Scenario::Object => object_case(settings),
        Scenario::Array => array_case(settings),
        Scenario::Concurrent => concurrent_case(settings),
        Scenario::Sticky => sticky_case(settings),
        Scenario::All => bail!("`all` has to be expanded before running"),
    }
}

fn class(name: &str) -> ClassIdentity {
    ClassIdentity::bootstrap(name)
}

fn dump_states(coordinator: &Coordinator) {
    for (class, state) in coordinator.snapshot() {
        debug!(%class, ?state, "final state");
    }
}

/// Parent's initializer creates a Child, Child extends Parent and reads its
/// own ROOT while Parent is still assigning it.
fn object_case(settings: &Settings) -> eyre::Result<()> {
    let parent = class("Parent_ObjectCase");
    let child = class("Child_ObjectCase");
    let seen_root = Arc::new(Mutex::new(None));

    let mut world = World::new();
    world.define(ClassDef::class(parent.clone()).body({
        let child = child.clone();
        move |coordinator, world| {
            let root = world.new_instance(coordinator, &child)?;
            world.put_static(coordinator, &child, "ROOT", root)?;
            Ok(())
        }
    }));
    world.define(ClassDef::class(child.clone()).extends(parent.clone()).body({
        let parent = parent.clone();
        let child = child.clone();
        let seen_root = seen_root.clone();
        move |coordinator, world| {
            coordinator.ensure_initialized(&parent)?;
            let root = world.get_static(coordinator, &child, "ROOT")?;
            *seen_root.lock().unwrap_or_else(|e| e.into_inner()) = Some(root);
            Ok(())
        }
    }));
    let (world, coordinator) = world.into_coordinator(settings.options.clone());

    let result = thread::spawn({
        let coordinator = coordinator.clone();
        let parent = parent.clone();
        move || coordinator.ensure_initialized(&parent)
    })
    .join()
    .map_err(|_| eyre!("initializing thread panicked"))?;
    result?;
    dump_states(&coordinator);

    let seen = seen_root.lock().unwrap_or_else(|e| e.into_inner()).clone();
    ensure!(
        seen == Some(Value::Null),
        "Child_ObjectCase.ROOT should read as null during circular initialization, got {seen:?}"
    );
    ensure!(
        world.peek_static(&child, "ROOT") != Value::Null,
        "Child_ObjectCase.ROOT was never assigned"
    );
    ensure!(
        world.run_count(&parent) == 1 && world.run_count(&child) == 1,
        "each static initializer has to run exactly once"
    );
    Ok(())
}

/// Parent's initializer allocates a Child[] while Child extends Parent.
fn array_case(settings: &Settings) -> eyre::Result<()> {
    let parent = class("Parent_ArrayCase");
    let child = class("Child_ArrayCase");

    let mut world = World::new();
    world.define(ClassDef::class(parent.clone()).body({
        let child = child.clone();
        move |coordinator, world| {
            let children = world.new_array(coordinator, &child)?;
            world.put_static(coordinator, &child, "CHILDREN", children)?;
            Ok(())
        }
    }));
    world.define(ClassDef::class(child.clone()).extends(parent.clone()));
    let (world, coordinator) = world.into_coordinator(settings.options.clone());

    coordinator.ensure_initialized(&parent)?;
    dump_states(&coordinator);
    ensure!(
        coordinator.state_of(&child) == Some(InitState::Initialized),
        "Child_ArrayCase should be initialized through its array type"
    );
    ensure!(
        world.run_count(&child) == 1,
        "Child_ArrayCase initializer has to run exactly once"
    );
    Ok(())
}

fn concurrent_case(settings: &Settings) -> eyre::Result<()> {
    let target = class("Contended");
    let mut world = World::new();
    world.define(ClassDef::class(target.clone()).body(|_, _| {
        thread::sleep(Duration::from_millis(10));
        Ok(())
    }));
    let (world, coordinator) = world.into_coordinator(settings.options.clone());

    let barrier = Arc::new(Barrier::new(settings.threads));
    let handles: Vec<_> = (0..settings.threads)
        .map(|_| {
            let coordinator = coordinator.clone();
            let barrier = barrier.clone();
            let target = target.clone();
            thread::spawn(move || {
                barrier.wait();
                coordinator.ensure_initialized(&target)
            })
        })
        .collect();
    for handle in handles {
        handle
            .join()
            .map_err(|_| eyre!("initializing thread panicked"))??;
    }
    let runs = world.run_count(&target);
    ensure!(runs == 1, "static initializer ran {runs} times");
    Ok(())
}

fn sticky_case(settings: &Settings) -> eyre::Result<()> {
    let target = class("Broken");
    let mut world = World::new();
    world.define(ClassDef::class(target.clone()).body(|_, _| {
        Err(Throwable::exception("java.lang.ArithmeticException", "/ by zero").into())
    }));
    let (world, coordinator) = world.into_coordinator(settings.options.clone());

    let Err(first) = coordinator.ensure_initialized(&target) else {
        bail!("failing initializer reported success");
    };
    ensure!(
        matches!(first, InitializationError::ExceptionInInitializer { .. }),
        "first caller should see the underlying cause, got {first}"
    );
    let handles: Vec<_> = (0..settings.threads)
        .map(|_| {
            let coordinator = coordinator.clone();
            let target = target.clone();
            thread::spawn(move || coordinator.ensure_initialized(&target))
        })
        .collect();
    for handle in handles {
        let result = handle
            .join()
            .map_err(|_| eyre!("initializing thread panicked"))?;
        let Err(later) = result else {
            bail!("erroneous class reported success");
        };
        ensure!(later.is_sticky(), "expected a sticky error, got {later}");
        ensure!(later.root_cause() == &first, "sticky error lost its cause");
    }
    ensure!(
        world.run_count(&target) == 1,
        "failing initializer must never be retried"
    );
    Ok(())
}
