#![forbid(unsafe_code)]

//! Mutable observable cells.
//!
//! # Architecture
//!
//! `ObservableCell<T>` wraps its value in shared, reference-counted storage;
//! cloning a cell creates a new handle to the same state. Change
//! notifications go through an owned [`Emitter`] carrying `(new, old)`.
//!
//! # Invariants
//!
//! 1. Outside an in-progress `set`, the value satisfies the declared
//!    constraint (when the `diagnostics` feature is enabled).
//! 2. Setting a value equal to the current value is a no-op: no notification.
//! 3. A change produces exactly one notification round, observing the
//!    correct `(new, old)` pair.
//! 4. `link` fires its observer immediately with `(current, None)`;
//!    `lazy_link` fires on change only.
//! 5. Disposal clears the bus and makes further mutation a
//!    [`CellError::Disposed`] failure.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::emitter::{Emitter, Listener};
use crate::error::{CellError, Result};
use crate::registry::{HandleId, InstanceKind, InstanceMetadata, Registry};
use crate::telemetry::Instrument;
use crate::units::Units;
use crate::validation::{Constraint, Validator};
use crate::value::{Value, ValueKind};

/// Removal handle returned by `link`/`lazy_link`.
pub struct ChangeHandle<T> {
    pub(crate) listener: Listener<(T, Option<T>)>,
}

impl<T> Clone for ChangeHandle<T> {
    fn clone(&self) -> Self {
        Self {
            listener: Rc::clone(&self.listener),
        }
    }
}

/// Read-side seam shared by plain and derived cells. Derivations and
/// multilinks depend on this trait rather than on a concrete cell type, so
/// derived-over-derived composition works.
pub trait ReadableCell<T>: Clone + 'static {
    fn get(&self) -> T;
    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R;
    fn lazy_link(&self, observer: impl Fn(&T, Option<&T>) + 'static) -> Result<ChangeHandle<T>>;
    fn unlink(&self, handle: &ChangeHandle<T>) -> Result<()>;
    fn listener_count(&self) -> usize;
    /// Declared value kind, when a constraint pins one.
    fn declared_kind(&self) -> Option<ValueKind>;
}

/// Construction options for a cell. All fields are optional; the empty
/// config is a plain unconstrained cell.
pub struct CellConfig<T> {
    /// Advisory units tag, never interpreted by the core.
    pub units: Option<Units>,
    /// Validation constraint checked on every external `set`.
    pub constraint: Option<Rc<dyn Validator<T>>>,
    /// Custom change comparator; defaults to `PartialEq` value equality.
    pub equals: Option<Rc<dyn Fn(&T, &T) -> bool>>,
    /// Telemetry instrumentation for change records.
    pub instrument: Option<Instrument<T>>,
    /// External bookkeeping registry to attach to.
    pub registry: Option<Rc<dyn Registry>>,
    /// Registry id; falls back to the instrument id when absent.
    pub id: Option<String>,
}

impl<T> Default for CellConfig<T> {
    fn default() -> Self {
        Self {
            units: None,
            constraint: None,
            equals: None,
            instrument: None,
            registry: None,
            id: None,
        }
    }
}

struct CellState<T> {
    value: RefCell<T>,
    initial: T,
    bus: Emitter<(T, Option<T>)>,
    constraint: Option<Rc<dyn Validator<T>>>,
    equals: Option<Rc<dyn Fn(&T, &T) -> bool>>,
    units: Option<Units>,
    instrument: Option<Instrument<T>>,
    registry: Option<Rc<dyn Registry>>,
    handle: Cell<Option<HandleId>>,
    disposed: Cell<bool>,
}

/// A single mutable value with validation, change notification, and
/// reset-to-initial semantics.
///
/// Cloning an `ObservableCell` creates a new handle to the same state.
pub struct ObservableCell<T> {
    state: Rc<CellState<T>>,
}

impl<T> Clone for ObservableCell<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableCell")
            .field("value", &self.state.value.borrow())
            .field("initial", &self.state.initial)
            .field("disposed", &self.state.disposed.get())
            .finish()
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> ObservableCell<T> {
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self::build(initial, CellConfig::default())
    }

    /// Builds a cell from an explicit config. Fails with
    /// [`CellError::Config`] on invalid combinations and with
    /// [`CellError::Validation`] when the initial value violates the
    /// constraint.
    pub fn with_config(initial: T, config: CellConfig<T>) -> Result<Self> {
        if let Some(instrument) = &config.instrument {
            if instrument.id.is_empty() {
                return Err(CellError::config("instrument id must not be empty"));
            }
        }
        if config.registry.is_some()
            && config.id.is_none()
            && config.instrument.as_ref().is_none_or(|i| i.id.is_empty())
        {
            return Err(CellError::config("registry attachment requires an id"));
        }
        if let Some(constraint) = &config.constraint {
            let outcome = constraint.validate(&initial);
            if !outcome.valid {
                return Err(CellError::Validation {
                    value: format!("{initial:?}"),
                    constraint: constraint.describe(),
                    reason: outcome
                        .reason
                        .unwrap_or_else(|| "constraint rejected value".into()),
                });
            }
        }
        Ok(Self::build(initial, config))
    }

    fn build(initial: T, config: CellConfig<T>) -> Self {
        let registry_id = config
            .id
            .or_else(|| config.instrument.as_ref().map(|i| i.id.clone()));
        let state = Rc::new(CellState {
            value: RefCell::new(initial.clone()),
            initial,
            bus: Emitter::new(),
            constraint: config.constraint,
            equals: config.equals,
            units: config.units,
            instrument: config.instrument,
            registry: config.registry,
            handle: Cell::new(None),
            disposed: Cell::new(false),
        });
        if let (Some(registry), Some(id)) = (&state.registry, registry_id) {
            let handle = registry.attach(InstanceMetadata::new(id, InstanceKind::Cell));
            state.handle.set(Some(handle));
        }
        Self { state }
    }

    /// Current value, cloned.
    #[must_use]
    pub fn get(&self) -> T {
        self.state.value.borrow().clone()
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.state.value.borrow())
    }

    /// Sets a new value: validates, no-ops when equal to the current value,
    /// otherwise assigns and notifies with `(new, old)`.
    pub fn set(&self, value: T) -> Result<()> {
        self.check_live("set")?;
        self.write(value, true)
    }

    /// Equivalent to setting the initial value.
    pub fn reset(&self) -> Result<()> {
        self.check_live("reset")?;
        self.write(self.state.initial.clone(), true)
    }

    /// Subscribes `observer(new, old)` and immediately invokes it once with
    /// `(current, None)` to establish initial state.
    pub fn link(&self, observer: impl Fn(&T, Option<&T>) + 'static) -> Result<ChangeHandle<T>> {
        let observer: Rc<dyn Fn(&T, Option<&T>)> = Rc::new(observer);
        let handle = self.subscribe_observer(Rc::clone(&observer))?;
        self.with(|current| observer(current, None));
        Ok(handle)
    }

    /// Subscribes without the immediate invocation.
    pub fn lazy_link(
        &self,
        observer: impl Fn(&T, Option<&T>) + 'static,
    ) -> Result<ChangeHandle<T>> {
        self.subscribe_observer(Rc::new(observer))
    }

    pub fn unlink(&self, handle: &ChangeHandle<T>) -> Result<()> {
        self.state.bus.unsubscribe(&handle.listener)
    }

    pub fn unlink_all(&self) {
        self.state.bus.unsubscribe_all();
    }

    #[must_use]
    pub fn has_listener(&self, handle: &ChangeHandle<T>) -> bool {
        self.state.bus.has_listener(&handle.listener)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state.bus.listener_count()
    }

    #[must_use]
    pub fn initial_value(&self) -> T {
        self.state.initial.clone()
    }

    #[must_use]
    pub fn units(&self) -> Option<&Units> {
        self.state.units.as_ref()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state.disposed.get()
    }

    #[must_use]
    pub fn declared_kind(&self) -> Option<ValueKind> {
        self.state.constraint.as_ref().and_then(|c| c.value_kind())
    }

    /// Tears the cell down: clears the bus, detaches the registry handle,
    /// and marks the cell disposed. Disposing twice is an error.
    pub fn dispose(&self) -> Result<()> {
        if self.state.disposed.get() {
            return Err(CellError::disposed("dispose"));
        }
        self.state.bus.unsubscribe_all();
        if let (Some(registry), Some(handle)) = (&self.state.registry, self.state.handle.take()) {
            registry.detach(handle);
        }
        self.state.disposed.set(true);
        tracing::debug!("cell disposed");
        Ok(())
    }

    /// Write path for derivations: trusted values skip the external
    /// constraint but keep the no-op-on-equal and notification contract.
    pub(crate) fn set_internal(&self, value: T) {
        // Cannot fail with validation disabled.
        drop(self.write(value, false));
    }

    fn subscribe_observer(&self, observer: Rc<dyn Fn(&T, Option<&T>)>) -> Result<ChangeHandle<T>> {
        self.check_live("link")?;
        let listener: Listener<(T, Option<T>)> =
            Rc::new(move |args: &(T, Option<T>)| observer(&args.0, args.1.as_ref()));
        self.state.bus.subscribe(Rc::clone(&listener))?;
        Ok(ChangeHandle { listener })
    }

    fn write(&self, value: T, validate: bool) -> Result<()> {
        if validate && cfg!(feature = "diagnostics") {
            if let Some(constraint) = &self.state.constraint {
                let outcome = constraint.validate(&value);
                if !outcome.valid {
                    return Err(CellError::Validation {
                        value: format!("{value:?}"),
                        constraint: constraint.describe(),
                        reason: outcome
                            .reason
                            .unwrap_or_else(|| "constraint rejected value".into()),
                    });
                }
            }
        }

        let unchanged = {
            let current = self.state.value.borrow();
            match &self.state.equals {
                Some(equals) => equals(&current, &value),
                None => *current == value,
            }
        };
        if unchanged {
            return Ok(());
        }

        let old = self.state.value.replace(value.clone());
        tracing::trace!(new = ?value, old = ?old, "cell changed");

        let record = self.state.instrument.as_ref().map(|instrument| {
            let payload = serde_json::json!({
                "newValue": (instrument.serialize)(&value),
                "oldValue": (instrument.serialize)(&old),
            });
            let token =
                instrument
                    .sink
                    .record_start("model", &instrument.id, "changed", Some(payload));
            (Rc::clone(&instrument.sink), token)
        });

        self.state.bus.emit(&(value, Some(old)));

        if let Some((sink, token)) = record {
            sink.record_end(token);
        }
        Ok(())
    }

    fn check_live(&self, operation: &'static str) -> Result<()> {
        if cfg!(feature = "diagnostics") && self.state.disposed.get() {
            return Err(CellError::disposed(operation));
        }
        Ok(())
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> ReadableCell<T> for ObservableCell<T> {
    fn get(&self) -> T {
        ObservableCell::get(self)
    }

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        ObservableCell::with(self, f)
    }

    fn lazy_link(&self, observer: impl Fn(&T, Option<&T>) + 'static) -> Result<ChangeHandle<T>> {
        ObservableCell::lazy_link(self, observer)
    }

    fn unlink(&self, handle: &ChangeHandle<T>) -> Result<()> {
        ObservableCell::unlink(self, handle)
    }

    fn listener_count(&self) -> usize {
        ObservableCell::listener_count(self)
    }

    fn declared_kind(&self) -> Option<ValueKind> {
        ObservableCell::declared_kind(self)
    }
}

impl ObservableCell<bool> {
    /// Flips the current value.
    pub fn toggle(&self) -> Result<()> {
        let next = !self.get();
        self.set(next)
    }
}

impl ObservableCell<Value> {
    /// Dynamically-typed cell constrained to boolean values.
    #[must_use]
    pub fn of_bool(initial: bool) -> Self {
        Self::build(
            Value::Bool(initial),
            CellConfig {
                constraint: Some(Rc::new(Constraint::kind(ValueKind::Bool))),
                ..CellConfig::default()
            },
        )
    }

    /// Dynamically-typed cell constrained to numeric values.
    #[must_use]
    pub fn of_number(initial: f64) -> Self {
        Self::build(
            Value::Number(initial),
            CellConfig {
                constraint: Some(Rc::new(Constraint::kind(ValueKind::Number))),
                ..CellConfig::default()
            },
        )
    }
}
