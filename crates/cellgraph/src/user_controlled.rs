#![forbid(unsafe_code)]

//! Cells driven by direct user interaction.
//!
//! [`UserControlledCell`] wraps a plain cell and marks every mutation that
//! flows through it as user-initiated: while one of its `set` calls is
//! dispatching, [`is_user_controlled`](UserControlledCell::is_user_controlled)
//! reports `true`, so observers can distinguish interaction-driven changes
//! from programmatic ones. A listener attempting another user-initiated set
//! while one is already dispatching fails fast with
//! [`CellError::ReentrantSet`] instead of silently re-entering.
//!
//! Programmatic writes should go to the underlying cell directly; this
//! wrapper deliberately exposes only the narrow surface an input handler
//! needs.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::cell::{ChangeHandle, ObservableCell};
use crate::error::{CellError, Result};

pub struct UserControlledCell<T> {
    cell: ObservableCell<T>,
    setting: Rc<Cell<bool>>,
}

impl<T> Clone for UserControlledCell<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            setting: Rc::clone(&self.setting),
        }
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> UserControlledCell<T> {
    #[must_use]
    pub fn new(cell: ObservableCell<T>) -> Self {
        Self {
            cell,
            setting: Rc::new(Cell::new(false)),
        }
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.cell.get()
    }

    /// True while a user-initiated set is dispatching notifications.
    #[must_use]
    pub fn is_user_controlled(&self) -> bool {
        self.setting.get()
    }

    /// Sets the value as a user interaction. Fails with
    /// [`CellError::ReentrantSet`] when called from a listener reacting to
    /// an in-progress user set.
    pub fn set(&self, value: T) -> Result<()> {
        if self.setting.get() {
            return Err(CellError::ReentrantSet);
        }
        self.setting.set(true);
        let result = self.cell.set(value);
        self.setting.set(false);
        result
    }

    pub fn reset(&self) -> Result<()> {
        if self.setting.get() {
            return Err(CellError::ReentrantSet);
        }
        self.setting.set(true);
        let result = self.cell.reset();
        self.setting.set(false);
        result
    }

    pub fn link(&self, observer: impl Fn(&T, Option<&T>) + 'static) -> Result<ChangeHandle<T>> {
        self.cell.link(observer)
    }

    pub fn lazy_link(
        &self,
        observer: impl Fn(&T, Option<&T>) + 'static,
    ) -> Result<ChangeHandle<T>> {
        self.cell.lazy_link(observer)
    }

    pub fn unlink(&self, handle: &ChangeHandle<T>) -> Result<()> {
        self.cell.unlink(handle)
    }

    /// The wrapped cell, for programmatic (non-user) writes.
    #[must_use]
    pub fn inner(&self) -> &ObservableCell<T> {
        &self.cell
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn set_flows_through_to_the_cell() {
        let controlled = UserControlledCell::new(ObservableCell::new(0));
        controlled.set(5).unwrap();
        assert_eq!(controlled.get(), 5);
        assert!(!controlled.is_user_controlled());
    }

    #[test]
    fn flag_is_visible_to_listeners_during_dispatch() {
        let controlled = UserControlledCell::new(ObservableCell::new(0));
        let observed = Rc::new(RefCell::new(Vec::new()));
        let o = Rc::clone(&observed);
        let probe = controlled.clone();
        controlled
            .lazy_link(move |_, _| o.borrow_mut().push(probe.is_user_controlled()))
            .unwrap();

        controlled.set(1).unwrap();
        controlled.inner().set(2).unwrap();
        assert_eq!(*observed.borrow(), vec![true, false]);
    }

    #[test]
    fn nested_user_set_fails_fast() {
        let controlled = UserControlledCell::new(ObservableCell::new(0));
        let nested = Rc::new(RefCell::new(None));
        let n = Rc::clone(&nested);
        let reentrant = controlled.clone();
        controlled
            .lazy_link(move |new, _| {
                if *new == 1 {
                    *n.borrow_mut() = Some(reentrant.set(2));
                }
            })
            .unwrap();

        controlled.set(1).unwrap();
        assert!(matches!(
            nested.borrow_mut().take(),
            Some(Err(CellError::ReentrantSet))
        ));
        // The outer set completed and the guard was released.
        assert_eq!(controlled.get(), 1);
        controlled.set(3).unwrap();
        assert_eq!(controlled.get(), 3);
    }

    #[test]
    fn guard_clears_after_a_failed_set() {
        let config = crate::cell::CellConfig {
            constraint: Some(Rc::new(crate::validation::Constraint::predicate(
                "a non-negative count",
                |n: &i32| *n >= 0,
            ))),
            ..crate::cell::CellConfig::default()
        };
        let controlled =
            UserControlledCell::new(ObservableCell::with_config(0, config).unwrap());

        assert!(controlled.set(-1).is_err());
        assert!(!controlled.is_user_controlled());
        controlled.set(4).unwrap();
        assert_eq!(controlled.get(), 4);
    }

    #[test]
    fn programmatic_writes_bypass_the_guard() {
        let controlled = UserControlledCell::new(ObservableCell::new(0));
        let inner = controlled.inner().clone();
        let clamp = controlled.inner().clone();
        // A clamping listener on the underlying cell may set freely.
        inner
            .lazy_link(move |new, _| {
                if *new > 10 {
                    clamp.set(10).unwrap();
                }
            })
            .unwrap();

        controlled.set(50).unwrap();
        assert_eq!(controlled.get(), 10);
    }
}
