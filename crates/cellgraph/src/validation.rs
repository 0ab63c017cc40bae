#![forbid(unsafe_code)]

//! Value validation capability.
//!
//! Constraints are opaque to the cells that hold them: a cell only asks
//! "does this value pass?" and surfaces the failure reason verbatim.
//! [`Constraint`] is the built-in [`Validator`] implementation; embedding
//! applications can supply their own.

use std::fmt;
use std::rc::Rc;

use crate::value::{Value, ValueKind};

/// Outcome of validating one value against one constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    /// Human-readable reason when `valid` is false.
    pub reason: Option<String>,
}

impl Validation {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Validation capability: given a value, report valid/invalid plus a reason.
pub trait Validator<T> {
    fn validate(&self, value: &T) -> Validation;

    /// Human-readable description of what the constraint accepts, used in
    /// error messages.
    fn describe(&self) -> String;

    /// Declared value kind, when the constraint pins one. Combinator
    /// construction checks consult this.
    fn value_kind(&self) -> Option<ValueKind> {
        None
    }
}

/// Built-in constraint: a predicate with a description, optionally carrying
/// a declared [`ValueKind`].
pub struct Constraint<T> {
    check: Rc<dyn Fn(&T) -> Validation>,
    description: String,
    kind: Option<ValueKind>,
}

impl<T> Clone for Constraint<T> {
    fn clone(&self) -> Self {
        Self {
            check: Rc::clone(&self.check),
            description: self.description.clone(),
            kind: self.kind,
        }
    }
}

impl<T> fmt::Debug for Constraint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("description", &self.description)
            .field("kind", &self.kind)
            .finish()
    }
}

impl<T> Constraint<T> {
    /// Constraint from an arbitrary predicate. `description` should read as
    /// a noun phrase, e.g. `"a positive count"`.
    pub fn predicate(
        description: impl Into<String>,
        accept: impl Fn(&T) -> bool + 'static,
    ) -> Self {
        let description = description.into();
        let reason = format!("value is not {description}");
        Self {
            check: Rc::new(move |v| {
                if accept(v) {
                    Validation::ok()
                } else {
                    Validation::fail(reason.clone())
                }
            }),
            description,
            kind: None,
        }
    }
}

impl<T: PartialEq + fmt::Debug + 'static> Constraint<T> {
    /// Constraint accepting exactly the listed values.
    pub fn valid_values(values: Vec<T>) -> Self {
        let description = format!("one of {values:?}");
        let reason = format!("value is not {description}");
        Self {
            check: Rc::new(move |v| {
                if values.contains(v) {
                    Validation::ok()
                } else {
                    Validation::fail(reason.clone())
                }
            }),
            description,
            kind: None,
        }
    }
}

impl Constraint<Value> {
    /// Constraint accepting any value of the given kind.
    #[must_use]
    pub fn kind(kind: ValueKind) -> Self {
        Self {
            check: Rc::new(move |v: &Value| {
                if v.kind() == kind {
                    Validation::ok()
                } else {
                    Validation::fail(format!("value has kind {}, expected {kind}", v.kind()))
                }
            }),
            description: format!("a {kind} value"),
            kind: Some(kind),
        }
    }

    /// Constraint accepting numbers within `[min, max]`.
    #[must_use]
    pub fn number_range(min: f64, max: f64) -> Self {
        Self {
            check: Rc::new(move |v: &Value| match v.as_number() {
                Some(n) if n >= min && n <= max => Validation::ok(),
                Some(n) => Validation::fail(format!("{n} is outside [{min}, {max}]")),
                None => Validation::fail(format!("value has kind {}, expected number", v.kind())),
            }),
            description: format!("a number in [{min}, {max}]"),
            kind: Some(ValueKind::Number),
        }
    }
}

impl<T> Validator<T> for Constraint<T> {
    fn validate(&self, value: &T) -> Validation {
        (self.check)(value)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }

    fn value_kind(&self) -> Option<ValueKind> {
        self.kind
    }
}
