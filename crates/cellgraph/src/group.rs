#![forbid(unsafe_code)]

//! Named aggregate of dynamically-typed cells.
//!
//! A [`CellGroup`] maps string keys to [`ObservableCell<Value>`] members and
//! derived members built over them, with bulk operations (reset-all,
//! set-all, derive-by-name, multilink-by-name). Access is explicit —
//! `get`/`set`/`cell` — there is no accessor synthesis.
//!
//! Base cells reset in insertion order. `set_all` validates every key before
//! mutating anything, so an unknown key leaves the group untouched.

use std::rc::Rc;

use ahash::AHashMap;

use crate::cell::{CellConfig, ObservableCell};
use crate::derived::DerivedCell;
use crate::error::{CellError, Result};
use crate::multilink::{self, Multilink};
use crate::validation::Constraint;
use crate::value::{Value, ValueKind};

/// A set of named cells with bulk operations.
#[derive(Default)]
pub struct CellGroup {
    cells: AHashMap<String, ObservableCell<Value>>,
    derived: AHashMap<String, DerivedCell<Value>>,
    /// Insertion order of base cells; governs `reset_all`.
    keys: Vec<String>,
}

impl CellGroup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plain cell under `name`.
    pub fn add_cell(&mut self, name: impl Into<String>, initial: Value) -> Result<()> {
        self.add_cell_with(name, ObservableCell::new(initial))
    }

    /// Adds a pre-configured cell (constraints, units, instrumentation)
    /// under `name`.
    pub fn add_cell_with(
        &mut self,
        name: impl Into<String>,
        cell: ObservableCell<Value>,
    ) -> Result<()> {
        let name = name.into();
        if self.cells.contains_key(&name) || self.derived.contains_key(&name) {
            return Err(CellError::config(format!("key `{name}` already present")));
        }
        self.keys.push(name.clone());
        self.cells.insert(name, cell);
        Ok(())
    }

    /// Removes a member (plain or derived) without disposing it.
    pub fn remove_cell(&mut self, name: &str) -> Result<()> {
        if self.cells.remove(name).is_some() {
            self.keys.retain(|k| k != name);
            return Ok(());
        }
        if self.derived.remove(name).is_some() {
            return Ok(());
        }
        Err(CellError::unknown_key(name))
    }

    /// Direct access to the underlying base cell.
    pub fn cell(&self, name: &str) -> Result<&ObservableCell<Value>> {
        self.cells
            .get(name)
            .ok_or_else(|| CellError::unknown_key(name))
    }

    /// Direct access to a derived member.
    pub fn derived(&self, name: &str) -> Result<&DerivedCell<Value>> {
        self.derived
            .get(name)
            .ok_or_else(|| CellError::unknown_key(name))
    }

    /// Current value of a plain or derived member.
    pub fn get(&self, name: &str) -> Result<Value> {
        if let Some(cell) = self.cells.get(name) {
            return Ok(cell.get());
        }
        if let Some(derived) = self.derived.get(name) {
            return Ok(derived.get());
        }
        Err(CellError::unknown_key(name))
    }

    /// Sets a plain member. Writing a derived member is rejected.
    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        if let Some(cell) = self.cells.get(name) {
            return cell.set(value);
        }
        if self.derived.contains_key(name) {
            return Err(CellError::ReadOnly { name: name.into() });
        }
        Err(CellError::unknown_key(name))
    }

    /// Resets every base cell to its initial value, in insertion order.
    pub fn reset_all(&self) -> Result<()> {
        for key in &self.keys {
            if let Some(cell) = self.cells.get(key) {
                cell.reset()?;
            }
        }
        Ok(())
    }

    /// Sets several members at once. Every key is checked before any
    /// mutation; an unknown or derived key fails the whole call.
    pub fn set_all(&self, values: Vec<(&str, Value)>) -> Result<()> {
        for (name, _) in &values {
            if !self.cells.contains_key(*name) {
                if self.derived.contains_key(*name) {
                    return Err(CellError::ReadOnly {
                        name: (*name).into(),
                    });
                }
                return Err(CellError::unknown_key(*name));
            }
        }
        for (name, value) in values {
            // Checked above.
            if let Some(cell) = self.cells.get(name) {
                cell.set(value)?;
            }
        }
        Ok(())
    }

    /// Snapshot of every member's current value, base cells first in
    /// insertion order.
    #[must_use]
    pub fn values(&self) -> Vec<(String, Value)> {
        let mut snapshot: Vec<(String, Value)> = self
            .keys
            .iter()
            .filter_map(|k| self.cells.get(k).map(|c| (k.clone(), c.get())))
            .collect();
        let mut derived: Vec<_> = self
            .derived
            .iter()
            .map(|(k, d)| (k.clone(), d.get()))
            .collect();
        derived.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot.extend(derived);
        snapshot
    }

    /// Builds a derived member over the named base cells and stores it under
    /// `name`.
    pub fn derive(
        &mut self,
        name: impl Into<String>,
        dependencies: &[&str],
        recompute: impl Fn(&[Value]) -> Value + 'static,
    ) -> Result<()> {
        let name = name.into();
        if self.cells.contains_key(&name) || self.derived.contains_key(&name) {
            return Err(CellError::config(format!("key `{name}` already present")));
        }
        let deps = self.dependency_cells(dependencies)?;
        let derived = DerivedCell::from_slice(&deps, recompute)?;
        self.derived.insert(name, derived);
        Ok(())
    }

    /// Derived boolean AND over the named cells.
    pub fn derive_and(&mut self, name: impl Into<String>, dependencies: &[&str]) -> Result<()> {
        let name = name.into();
        if self.cells.contains_key(&name) || self.derived.contains_key(&name) {
            return Err(CellError::config(format!("key `{name}` already present")));
        }
        let deps = self.dependency_cells(dependencies)?;
        let derived = DerivedCell::and(&deps)?;
        self.derived.insert(name, derived);
        Ok(())
    }

    /// Derived boolean OR over the named cells.
    pub fn derive_or(&mut self, name: impl Into<String>, dependencies: &[&str]) -> Result<()> {
        let name = name.into();
        if self.cells.contains_key(&name) || self.derived.contains_key(&name) {
            return Err(CellError::config(format!("key `{name}` already present")));
        }
        let deps = self.dependency_cells(dependencies)?;
        let derived = DerivedCell::or(&deps)?;
        self.derived.insert(name, derived);
        Ok(())
    }

    /// Subscribes one observer to the named cells; it fires immediately and
    /// then once per change to any dependency, receiving all current values
    /// positionally.
    pub fn multilink(
        &self,
        dependencies: &[&str],
        observer: impl Fn(&[Value]) + 'static,
    ) -> Result<Multilink> {
        let deps = self.dependency_cells(dependencies)?;
        multilink::multilink(&deps, observer)
    }

    /// Like [`multilink`](Self::multilink), without the immediate call.
    pub fn lazy_multilink(
        &self,
        dependencies: &[&str],
        observer: impl Fn(&[Value]) + 'static,
    ) -> Result<Multilink> {
        let deps = self.dependency_cells(dependencies)?;
        multilink::lazy_multilink(&deps, observer)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.cells.contains_key(name) || self.derived.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len() + self.derived.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.derived.is_empty()
    }

    /// Tears down every member: derived members first (so their upstream
    /// subscriptions release before the base cells clear), then base cells.
    pub fn dispose(&mut self) -> Result<()> {
        for (_, derived) in self.derived.drain() {
            derived.dispose()?;
        }
        for (_, cell) in self.cells.drain() {
            cell.dispose()?;
        }
        self.keys.clear();
        Ok(())
    }

    fn dependency_cells(&self, names: &[&str]) -> Result<Vec<ObservableCell<Value>>> {
        names
            .iter()
            .map(|name| self.cell(name).map(ObservableCell::clone))
            .collect()
    }
}

/// Convenience constructors for typed group cells.
impl CellGroup {
    /// Adds a cell constrained to boolean values.
    pub fn add_bool(&mut self, name: impl Into<String>, initial: bool) -> Result<()> {
        self.add_cell_with(name, ObservableCell::of_bool(initial))
    }

    /// Adds a cell constrained to numeric values, optionally range-limited.
    pub fn add_number(
        &mut self,
        name: impl Into<String>,
        initial: f64,
        range: Option<(f64, f64)>,
    ) -> Result<()> {
        let cell = match range {
            Some((min, max)) => ObservableCell::with_config(
                Value::Number(initial),
                CellConfig {
                    constraint: Some(Rc::new(Constraint::number_range(min, max))),
                    ..CellConfig::default()
                },
            )?,
            None => ObservableCell::of_number(initial),
        };
        self.add_cell_with(name, cell)
    }

    /// Adds a cell constrained to text values.
    pub fn add_text(&mut self, name: impl Into<String>, initial: impl Into<String>) -> Result<()> {
        let cell = ObservableCell::with_config(
            Value::Text(initial.into()),
            CellConfig {
                constraint: Some(Rc::new(Constraint::kind(ValueKind::Text))),
                ..CellConfig::default()
            },
        )?;
        self.add_cell_with(name, cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn sample_group() -> CellGroup {
        let mut group = CellGroup::new();
        group.add_text("name", "larry").unwrap();
        group.add_number("age", 100.0, None).unwrap();
        group.add_bool("happy", true).unwrap();
        group
    }

    #[test]
    fn add_get_set() {
        let group = sample_group();
        assert_eq!(group.get("name").unwrap(), Value::from("larry"));

        group.set("age", Value::from(101.0)).unwrap();
        assert_eq!(group.get("age").unwrap(), Value::from(101.0));

        assert!(matches!(
            group.get("missing"),
            Err(CellError::UnknownKey { .. })
        ));
        assert!(matches!(
            group.set("missing", Value::Null),
            Err(CellError::UnknownKey { .. })
        ));
    }

    #[test]
    fn duplicate_key_rejected() {
        let mut group = sample_group();
        assert!(matches!(
            group.add_cell("name", Value::Null),
            Err(CellError::Config { .. })
        ));
    }

    #[test]
    fn remove_cell() {
        let mut group = sample_group();
        group.remove_cell("name").unwrap();
        assert!(!group.contains("name"));
        assert!(matches!(
            group.remove_cell("name"),
            Err(CellError::UnknownKey { .. })
        ));
    }

    #[test]
    fn reset_all_restores_initials() {
        let group = sample_group();
        group.set("name", Value::from("jensen")).unwrap();
        group.set("age", Value::from(101.0)).unwrap();

        group.reset_all().unwrap();
        assert_eq!(group.get("name").unwrap(), Value::from("larry"));
        assert_eq!(group.get("age").unwrap(), Value::from(100.0));
    }

    #[test]
    fn set_all_is_atomic_on_unknown_key() {
        let group = sample_group();
        let err = group
            .set_all(vec![
                ("name", Value::from("clark")),
                ("height", Value::from(180.0)),
            ])
            .unwrap_err();
        assert!(matches!(err, CellError::UnknownKey { .. }));
        // Nothing was applied.
        assert_eq!(group.get("name").unwrap(), Value::from("larry"));

        group
            .set_all(vec![
                ("name", Value::from("clark")),
                ("age", Value::from(102.0)),
            ])
            .unwrap();
        assert_eq!(group.get("name").unwrap(), Value::from("clark"));
    }

    #[test]
    fn derive_by_name() {
        let mut group = CellGroup::new();
        group.add_number("width", 2.0, None).unwrap();
        group.add_number("height", 3.0, None).unwrap();
        group
            .derive("area", &["width", "height"], |values| {
                let w = values[0].as_number().unwrap_or(0.0);
                let h = values[1].as_number().unwrap_or(0.0);
                Value::Number(w * h)
            })
            .unwrap();

        assert_eq!(group.get("area").unwrap(), Value::from(6.0));
        group.set("width", Value::from(5.0)).unwrap();
        assert_eq!(group.get("area").unwrap(), Value::from(15.0));
    }

    #[test]
    fn derived_members_are_read_only() {
        let mut group = CellGroup::new();
        group.add_bool("a", true).unwrap();
        group.add_bool("b", false).unwrap();
        group.derive_or("either", &["a", "b"]).unwrap();

        assert_eq!(group.get("either").unwrap(), Value::Bool(true));
        assert!(matches!(
            group.set("either", Value::Bool(false)),
            Err(CellError::ReadOnly { .. })
        ));
        assert!(matches!(
            group.set_all(vec![("either", Value::Bool(false))]),
            Err(CellError::ReadOnly { .. })
        ));
    }

    #[test]
    fn derive_and_requires_boolean_dependencies() {
        let mut group = sample_group();
        assert!(matches!(
            group.derive_and("invalid", &["happy", "age"]),
            Err(CellError::TypeConstraint { .. })
        ));
        assert!(!group.contains("invalid"));
    }

    #[test]
    fn multilink_by_name() {
        let group = sample_group();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let link = group
            .multilink(&["name", "age"], move |values| {
                s.borrow_mut().push(values.to_vec());
            })
            .unwrap();

        assert_eq!(seen.borrow().len(), 1);
        group.set("age", Value::from(101.0)).unwrap();
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(
            seen.borrow()[1],
            vec![Value::from("larry"), Value::from(101.0)]
        );

        link.detach().unwrap();
        group.set("age", Value::from(102.0)).unwrap();
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn dispose_tears_down_members() {
        let mut group = CellGroup::new();
        group.add_bool("a", false).unwrap();
        group.add_bool("b", false).unwrap();
        group.derive_and("both", &["a", "b"]).unwrap();

        group.dispose().unwrap();
        assert!(group.is_empty());
    }
}
