#![forbid(unsafe_code)]

//! Validated, optionally recorded actions.
//!
//! A [`ValidatedAction`] wraps a side-effecting callable behind a declared
//! parameter schema. Every invocation checks argument count and validates
//! each argument in declaration order (short-circuiting on the first
//! failure) before the callable runs; both checks compile out with the
//! `diagnostics` feature disabled. When instrumented, each invocation is
//! bracketed by `record_start`/`record_end` telemetry records whose payload
//! maps parameter names to serialized argument values.
//!
//! The callable's return value is discarded: actions model fire-and-forget
//! operations, not queries.

use std::rc::Rc;

use crate::error::{CellError, Result};
use crate::registry::{HandleId, InstanceKind, InstanceMetadata, Registry};
use crate::telemetry::Instrument;
use crate::validation::Validator;
use crate::value::Value;

/// One declared parameter: a name (used in telemetry payloads and error
/// messages) and its constraint.
pub struct ActionParam {
    pub name: String,
    pub constraint: Rc<dyn Validator<Value>>,
}

impl ActionParam {
    pub fn new(name: impl Into<String>, constraint: impl Validator<Value> + 'static) -> Self {
        Self {
            name: name.into(),
            constraint: Rc::new(constraint),
        }
    }
}

/// Construction options for a [`ValidatedAction`].
#[derive(Default)]
pub struct ActionConfig {
    pub parameters: Vec<ActionParam>,
    /// When present, invocations are recorded to the sink for replay.
    pub instrument: Option<Instrument<Value>>,
    /// External bookkeeping registry to attach to.
    pub registry: Option<Rc<dyn Registry>>,
}

/// A callable with argument validation and optional invocation recording.
pub struct ValidatedAction {
    parameters: Vec<ActionParam>,
    action: Box<dyn FnMut(&[Value])>,
    instrument: Option<Instrument<Value>>,
    registry: Option<(Rc<dyn Registry>, HandleId)>,
}

impl ValidatedAction {
    /// Action with no declared parameters.
    #[must_use]
    pub fn new(action: impl FnMut(&[Value]) + 'static) -> Self {
        Self {
            parameters: Vec::new(),
            action: Box::new(action),
            instrument: None,
            registry: None,
        }
    }

    /// Action from an explicit config. Duplicate parameter names and an
    /// empty instrument id are rejected as [`CellError::Config`].
    pub fn with_config(action: impl FnMut(&[Value]) + 'static, config: ActionConfig) -> Result<Self> {
        for (index, param) in config.parameters.iter().enumerate() {
            if config.parameters[..index]
                .iter()
                .any(|p| p.name == param.name)
            {
                return Err(CellError::config(format!(
                    "duplicate parameter name `{}`",
                    param.name
                )));
            }
        }
        if let Some(instrument) = &config.instrument {
            if instrument.id.is_empty() {
                return Err(CellError::config("instrument id must not be empty"));
            }
        }
        let registry = match (&config.registry, &config.instrument) {
            (Some(registry), Some(instrument)) => {
                let handle = registry.attach(InstanceMetadata::new(
                    instrument.id.clone(),
                    InstanceKind::Action,
                ));
                Some((Rc::clone(registry), handle))
            }
            (Some(_), None) => {
                return Err(CellError::config("registry attachment requires an id"));
            }
            _ => None,
        };
        Ok(Self {
            parameters: config.parameters,
            action: Box::new(action),
            instrument: config.instrument,
            registry,
        })
    }

    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    #[must_use]
    pub fn is_recorded(&self) -> bool {
        self.instrument.is_some()
    }

    /// Validates `args` against the declared schema, then invokes the
    /// wrapped callable.
    pub fn execute(&mut self, args: &[Value]) -> Result<()> {
        if cfg!(feature = "diagnostics") {
            if args.len() != self.parameters.len() {
                return Err(CellError::Arity {
                    expected: self.parameters.len(),
                    actual: args.len(),
                });
            }
            for (index, (param, arg)) in self.parameters.iter().zip(args).enumerate() {
                let outcome = param.constraint.validate(arg);
                if !outcome.valid {
                    return Err(CellError::ArgumentValidation {
                        index,
                        name: param.name.clone(),
                        value: format!("{arg:?}"),
                        constraint: param.constraint.describe(),
                        reason: outcome
                            .reason
                            .unwrap_or_else(|| "constraint rejected value".into()),
                    });
                }
            }
        }

        let record = self.instrument.as_ref().map(|instrument| {
            let payload: serde_json::Map<String, serde_json::Value> = self
                .parameters
                .iter()
                .zip(args)
                .map(|(param, arg)| (param.name.clone(), (instrument.serialize)(arg)))
                .collect();
            let token = instrument.sink.record_start(
                "model",
                &instrument.id,
                "executed",
                Some(serde_json::Value::Object(payload)),
            );
            (Rc::clone(&instrument.sink), token)
        });

        tracing::trace!(parameters = self.parameters.len(), "action executed");
        (self.action)(args);

        if let Some((sink, token)) = record {
            sink.record_end(token);
        }
        Ok(())
    }
}

impl Drop for ValidatedAction {
    fn drop(&mut self) {
        if let Some((registry, handle)) = self.registry.take() {
            registry.detach(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LeakRegistry;
    use crate::telemetry::{MemorySink, TelemetrySink};
    use crate::validation::Constraint;
    use crate::value::ValueKind;
    use std::cell::RefCell;

    fn numeric_pair_config() -> ActionConfig {
        ActionConfig {
            parameters: vec![
                ActionParam::new("x", Constraint::kind(ValueKind::Number)),
                ActionParam::new("y", Constraint::kind(ValueKind::Number)),
            ],
            ..ActionConfig::default()
        }
    }

    #[test]
    fn executes_with_valid_arguments() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let c = Rc::clone(&calls);
        let mut action = ValidatedAction::with_config(
            move |args: &[Value]| c.borrow_mut().push(args.to_vec()),
            numeric_pair_config(),
        )
        .unwrap();

        action.execute(&[Value::from(1.0), Value::from(2.0)]).unwrap();
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(calls.borrow()[0], vec![Value::from(1.0), Value::from(2.0)]);
    }

    #[test]
    fn wrong_argument_count_is_an_arity_error() {
        let mut action =
            ValidatedAction::with_config(|_: &[Value]| {}, numeric_pair_config()).unwrap();
        let err = action.execute(&[Value::from(1.0)]).unwrap_err();
        match err {
            CellError::Arity { expected, actual } => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validation_failure_pinpoints_the_parameter() {
        let ran = Rc::new(RefCell::new(false));
        let r = Rc::clone(&ran);
        let mut action = ValidatedAction::with_config(
            move |_: &[Value]| *r.borrow_mut() = true,
            numeric_pair_config(),
        )
        .unwrap();

        let err = action
            .execute(&[Value::from("x"), Value::from(3.0)])
            .unwrap_err();
        match err {
            CellError::ArgumentValidation { index, name, .. } => {
                assert_eq!(index, 0);
                assert_eq!(name, "x");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!*ran.borrow()); // callable never ran
    }

    #[test]
    fn duplicate_parameter_names_rejected() {
        let config = ActionConfig {
            parameters: vec![
                ActionParam::new("x", Constraint::kind(ValueKind::Number)),
                ActionParam::new("x", Constraint::kind(ValueKind::Number)),
            ],
            ..ActionConfig::default()
        };
        assert!(matches!(
            ValidatedAction::with_config(|_: &[Value]| {}, config),
            Err(CellError::Config { .. })
        ));
    }

    #[test]
    fn recorded_invocation_brackets_the_call() {
        let sink = MemorySink::new();
        let config = ActionConfig {
            parameters: vec![
                ActionParam::new("x", Constraint::kind(ValueKind::Number)),
                ActionParam::new("label", Constraint::kind(ValueKind::Text)),
            ],
            instrument: Some(Instrument::json(
                Rc::clone(&sink) as Rc<dyn TelemetrySink>,
                "model.jump",
            )),
            ..ActionConfig::default()
        };
        let mut action = ValidatedAction::with_config(|_: &[Value]| {}, config).unwrap();

        action
            .execute(&[Value::from(4.0), Value::from("high")])
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, "model.jump");
        assert_eq!(events[0].event, "executed");
        assert!(events[0].closed);
        assert_eq!(
            events[0].payload,
            Some(serde_json::json!({"x": 4.0, "label": "high"}))
        );
    }

    #[test]
    fn zero_parameter_action() {
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        let mut action = ValidatedAction::new(move |_| *c.borrow_mut() += 1);
        action.execute(&[]).unwrap();
        action.execute(&[]).unwrap();
        assert_eq!(*count.borrow(), 2);
        assert!(!action.is_recorded());
    }

    #[test]
    fn registry_detaches_on_drop() {
        let registry = Rc::new(LeakRegistry::new());
        let sink = MemorySink::new();
        let config = ActionConfig {
            instrument: Some(Instrument::json(
                Rc::clone(&sink) as Rc<dyn TelemetrySink>,
                "model.fire",
            )),
            registry: Some(Rc::clone(&registry) as Rc<dyn Registry>),
            ..ActionConfig::default()
        };
        {
            let _action = ValidatedAction::with_config(|_: &[Value]| {}, config).unwrap();
            assert_eq!(registry.live_count(), 1);
        }
        assert_eq!(registry.live_count(), 0);
    }
}
