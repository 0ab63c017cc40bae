#![forbid(unsafe_code)]

//! Error taxonomy for the cell graph.
//!
//! Every contract violation is reported at the violating call site; nothing
//! is retried or internally recovered. Validation failures carry the failing
//! value, the expected constraint, and (for actions) the parameter position
//! and name, so failures are locatable without a debugger.

use thiserror::Error;

use crate::value::ValueKind;

pub type Result<T> = std::result::Result<T, CellError>;

#[derive(Debug, Error)]
pub enum CellError {
    /// A value failed its declared constraint.
    #[error("invalid value {value}: {reason} (expected {constraint})")]
    Validation {
        value: String,
        constraint: String,
        reason: String,
    },

    /// An action argument failed its declared constraint.
    #[error(
        "invalid argument `{name}` at position {index}: {reason} (value {value}, expected {constraint})"
    )]
    ArgumentValidation {
        index: usize,
        name: String,
        value: String,
        constraint: String,
        reason: String,
    },

    /// Wrong argument count to an action.
    #[error("expected {expected} arguments, received {actual}")]
    Arity { expected: usize, actual: usize },

    /// Listener subscribed twice to the same bus.
    #[error("listener is already subscribed")]
    DuplicateListener,

    /// Unsubscribe of a listener the bus does not hold.
    #[error("listener is not subscribed")]
    UnknownListener,

    /// Operation on a torn-down cell or bus.
    #[error("`{operation}` called on a disposed object")]
    Disposed { operation: &'static str },

    /// Aggregate operation referencing a non-existent member.
    #[error("unknown key `{key}`")]
    UnknownKey { key: String },

    /// Aggregate write to a derived (read-only) member.
    #[error("cell `{name}` is derived and read-only")]
    ReadOnly { name: String },

    /// Combinator applied to an upstream of an incompatible kind.
    #[error("dependency {index} has kind {found}, expected {expected}")]
    TypeConstraint {
        index: usize,
        expected: ValueKind,
        found: ValueKind,
    },

    /// Invalid configuration rejected at construction time.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// `set` called while a user-driven `set` is already in progress.
    #[error("reentrant set: a user-driven set is already in progress")]
    ReentrantSet,
}

impl CellError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn disposed(operation: &'static str) -> Self {
        Self::Disposed { operation }
    }

    pub(crate) fn unknown_key(key: impl Into<String>) -> Self {
        Self::UnknownKey { key: key.into() }
    }
}
