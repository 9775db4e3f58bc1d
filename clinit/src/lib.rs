//! Static initialization of loaded classes.
//!
//! Every class runs its static initializer at most once. A thread that
//! re-enters initialization of a class it is already initializing passes
//! straight through, other threads wait for the outcome, and failures stay
//! recorded on the class for the rest of its lifetime.

pub mod coordinator;
pub mod error;
pub mod identity;
mod initializer;
pub mod lock;
pub mod record;
mod sync;
pub mod world;

pub use coordinator::{ClassResolver, Coordinator, InitializerRunner, Options};
pub use error::{InitializationError, InitializerFailure, LinkageError, Throwable};
pub use identity::{ClassIdentity, LoaderId};
pub use lock::InitState;
