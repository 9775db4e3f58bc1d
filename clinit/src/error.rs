use std::fmt::{self, Display};

use thiserror::Error;

use crate::identity::ClassIdentity;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThrowableKind {
    /// Something in the `Exception` hierarchy, wrapped when it escapes an initializer.
    Exception,
    /// Something in the `Error` hierarchy, recorded as-is.
    Error,
}

/// A managed throwable that escaped a static initializer body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Throwable {
    pub class_name: String,
    pub message: Option<String>,
    pub kind: ThrowableKind,
}

impl Throwable {
    pub fn exception(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message: Some(message.into()),
            kind: ThrowableKind::Exception,
        }
    }

    pub fn error(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message: Some(message.into()),
            kind: ThrowableKind::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == ThrowableKind::Error
    }
}

impl Display for Throwable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.class_name, message),
            None => write!(f, "{}", self.class_name),
        }
    }
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum LinkageError {
    #[error("class {0} could not be found")]
    ClassNotFound(String),
    #[error("malformed type descriptor {0:?}")]
    MalformedDescriptor(String),
}

/// Canonical failure of class initialization.
///
/// This is the only error kind `ensure_initialized` reports, whatever the
/// initializer body threw.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum InitializationError {
    #[error("linking {class} failed")]
    Linkage {
        class: ClassIdentity,
        #[source]
        source: LinkageError,
    },
    #[error("exception in initializer of {class}: {cause}")]
    ExceptionInInitializer {
        class: ClassIdentity,
        cause: Throwable,
    },
    #[error("initializer of {class} raised {error}")]
    UncaughtError {
        class: ClassIdentity,
        error: Throwable,
    },
    #[error("initializer of {class} panicked")]
    InitializerPanicked { class: ClassIdentity },
    #[error("could not initialize class {class}")]
    NoClassDefFound {
        class: ClassIdentity,
        #[source]
        cause: Box<InitializationError>,
    },
}

impl InitializationError {
    /// Sticky error reported to every caller after the first one.
    pub fn no_class_def_found(class: &ClassIdentity, recorded: InitializationError) -> Self {
        Self::NoClassDefFound {
            class: class.clone(),
            cause: Box::new(recorded),
        }
    }

    /// The class this error is reported for.
    pub fn class(&self) -> &ClassIdentity {
        match self {
            Self::Linkage { class, .. }
            | Self::ExceptionInInitializer { class, .. }
            | Self::UncaughtError { class, .. }
            | Self::InitializerPanicked { class }
            | Self::NoClassDefFound { class, .. } => class,
        }
    }

    /// Follows sticky wrappers down to the failure that was originally recorded.
    pub fn root_cause(&self) -> &InitializationError {
        let mut current = self;
        while let Self::NoClassDefFound { cause, .. } = current {
            current = &**cause;
        }
        current
    }

    pub fn is_sticky(&self) -> bool {
        matches!(self, Self::NoClassDefFound { .. })
    }
}

/// How a static initializer body can fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InitializerFailure {
    /// The body threw.
    Thrown(Throwable),
    /// A nested initialization the body triggered failed, already canonical.
    Initialization(InitializationError),
}

impl From<InitializationError> for InitializerFailure {
    fn from(err: InitializationError) -> Self {
        Self::Initialization(err)
    }
}

impl From<Throwable> for InitializerFailure {
    fn from(throwable: Throwable) -> Self {
        Self::Thrown(throwable)
    }
}

/// Canonicalizes a body failure of `class` into an initialization error.
///
/// Failures that already are initialization errors pass through untouched,
/// so repeated propagation never nests wrappers.
pub fn wrap(class: &ClassIdentity, failure: InitializerFailure) -> InitializationError {
    match failure {
        InitializerFailure::Initialization(err) => err,
        InitializerFailure::Thrown(error) if error.is_error() => {
            InitializationError::UncaughtError {
                class: class.clone(),
                error,
            }
        }
        InitializerFailure::Thrown(cause) => InitializationError::ExceptionInInitializer {
            class: class.clone(),
            cause,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str) -> ClassIdentity {
        ClassIdentity::bootstrap(name)
    }

    #[test]
    fn exceptions_are_wrapped_in_exception_in_initializer() {
        let cause = Throwable::exception("java.lang.ArithmeticException", "/ by zero");
        let err = wrap(&class("A"), cause.clone().into());
        assert_eq!(
            err,
            InitializationError::ExceptionInInitializer {
                class: class("A"),
                cause
            }
        );
    }

    #[test]
    fn errors_are_recorded_as_is() {
        let error = Throwable::error("java.lang.OutOfMemoryError", "heap");
        let err = wrap(&class("A"), error.clone().into());
        assert_eq!(
            err,
            InitializationError::UncaughtError {
                class: class("A"),
                error
            }
        );
    }

    #[test]
    fn wrapping_an_initialization_error_is_identity() {
        let nested = InitializationError::ExceptionInInitializer {
            class: class("B"),
            cause: Throwable::exception("java.lang.IllegalStateException", "nope"),
        };
        let err = wrap(&class("A"), nested.clone().into());
        assert_eq!(err, nested);
        assert_eq!(wrap(&class("A"), err.clone().into()), nested);
    }

    #[test]
    fn root_cause_skips_sticky_wrappers() {
        let original = InitializationError::InitializerPanicked { class: class("C") };
        let sticky = InitializationError::no_class_def_found(
            &class("A"),
            InitializationError::no_class_def_found(&class("B"), original.clone()),
        );
        assert!(sticky.is_sticky());
        assert_eq!(sticky.class(), &class("A"));
        assert_eq!(sticky.root_cause(), &original);
    }

    #[test]
    fn display_names_class_and_cause() {
        let err = InitializationError::ExceptionInInitializer {
            class: class("A"),
            cause: Throwable::exception("java.lang.RuntimeException", "boom"),
        };
        assert_eq!(
            err.to_string(),
            "exception in initializer of bootstrap/A: java.lang.RuntimeException: boom"
        );
        let sticky = InitializationError::no_class_def_found(&class("A"), err);
        assert_eq!(sticky.to_string(), "could not initialize class bootstrap/A");
    }
}
