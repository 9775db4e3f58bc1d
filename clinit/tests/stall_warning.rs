#![cfg(not(loom))]

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Barrier, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use clinit::{
    world::{ClassDef, World},
    ClassIdentity, Coordinator, InitializationError, Options,
};
use tracing::{
    field::{Field, Visit},
    span, Event, Level, Subscriber,
};
use tracing_subscriber::{
    layer::{Context, SubscriberExt},
    Layer,
};

type Fields = Vec<(String, String)>;

/// Records warning fields and counts spans, for one thread's dispatcher.
#[derive(Clone, Default)]
struct Capture {
    warnings: Arc<Mutex<Vec<Fields>>>,
    spans: Arc<AtomicUsize>,
}

impl Capture {
    fn warnings(&self) -> Vec<Fields> {
        self.warnings.lock().unwrap().clone()
    }

    fn spans(&self) -> usize {
        self.spans.load(Ordering::SeqCst)
    }

    fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::with_default(subscriber, f)
    }
}

#[derive(Default)]
struct FieldRecorder(Fields);

impl Visit for FieldRecorder {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.push((field.name().to_owned(), format!("{value:?}")));
    }
}

impl<S: Subscriber> Layer<S> for Capture {
    fn on_event(&self, event: &Event<'_>, _: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            let mut fields = FieldRecorder::default();
            event.record(&mut fields);
            self.warnings.lock().unwrap().push(fields.0);
        }
    }

    fn on_new_span(&self, _: &span::Attributes<'_>, _: &span::Id, _: Context<'_, S>) {
        self.spans.fetch_add(1, Ordering::SeqCst);
    }
}

fn field<'f>(fields: &'f Fields, name: &str) -> Option<&'f str> {
    fields
        .iter()
        .find(|(field, _)| field == name)
        .map(|(_, value)| value.as_str())
}

struct Held {
    coordinator: Arc<Coordinator>,
    release: Arc<AtomicBool>,
    owner: JoinHandle<Result<(), InitializationError>>,
}

/// Starts initializing `target` on a fresh thread whose initializer blocks
/// until released.
fn hold_initialization(target: &ClassIdentity, options: Options) -> Held {
    let started = Arc::new(Barrier::new(2));
    let release = Arc::new(AtomicBool::new(false));
    let mut world = World::new();
    world.define(ClassDef::class(target.clone()).body({
        let started = started.clone();
        let release = release.clone();
        move |_, _| {
            started.wait();
            while !release.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        }
    }));
    let (_, coordinator) = world.into_coordinator(options);
    let owner = {
        let coordinator = coordinator.clone();
        let target = target.clone();
        thread::spawn(move || coordinator.ensure_initialized(&target))
    };
    started.wait();
    Held {
        coordinator,
        release,
        owner,
    }
}

fn spawn_waiter(
    held: &Held,
    target: &ClassIdentity,
    capture: &Capture,
) -> JoinHandle<Result<(), InitializationError>> {
    let coordinator = held.coordinator.clone();
    let target = target.clone();
    let capture = capture.clone();
    thread::spawn(move || capture.run(|| coordinator.ensure_initialized(&target)))
}

#[test]
fn stalled_waiter_warns_with_class_and_owner_and_keeps_waiting() {
    let target = class("Stalled");
    let held = hold_initialization(
        &target,
        Options {
            stall_warning: Some(Duration::from_millis(5)),
        },
    );
    let capture = Capture::default();
    let waiter = spawn_waiter(&held, &target, &capture);

    thread::sleep(Duration::from_millis(60));
    assert!(!waiter.is_finished());
    let warnings = capture.warnings();
    assert!(!warnings.is_empty());
    let owner = format!("{:?}", held.owner.thread().id());
    for warning in &warnings {
        assert_eq!(field(warning, "class"), Some("bootstrap/Stalled"));
        assert_eq!(field(warning, "owner"), Some(owner.as_str()));
    }

    held.release.store(true, Ordering::SeqCst);
    assert_eq!(held.owner.join().unwrap(), Ok(()));
    assert_eq!(waiter.join().unwrap(), Ok(()));
}

#[test]
fn zero_stall_warning_blocks_quietly() {
    let target = class("StalledQuietly");
    let held = hold_initialization(
        &target,
        Options {
            stall_warning: Some(Duration::ZERO),
        },
    );
    let capture = Capture::default();
    let waiter = spawn_waiter(&held, &target, &capture);

    thread::sleep(Duration::from_millis(60));
    assert!(!waiter.is_finished());

    held.release.store(true, Ordering::SeqCst);
    assert_eq!(held.owner.join().unwrap(), Ok(()));
    assert_eq!(waiter.join().unwrap(), Ok(()));
    assert_eq!(capture.warnings(), Vec::<Fields>::new());
}

#[test]
fn initialized_classes_take_the_fast_path_without_spans() {
    let target = class("Hot");
    let mut world = World::new();
    world.define(ClassDef::class(target.clone()));
    let (_, coordinator) = world.into_coordinator(Options::default());
    let capture = Capture::default();

    capture.run(|| coordinator.ensure_initialized(&target)).unwrap();
    let after_first = capture.spans();
    assert!(after_first > 0);

    for _ in 0..10 {
        capture.run(|| coordinator.ensure_initialized(&target)).unwrap();
    }
    assert_eq!(capture.spans(), after_first);
}

fn class(name: &str) -> ClassIdentity {
    ClassIdentity::bootstrap(name)
}
