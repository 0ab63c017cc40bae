#![forbid(unsafe_code)]

//! Read-only cells computed from upstream dependencies.
//!
//! # Design
//!
//! A `DerivedCell<T>` owns an inner [`ObservableCell`] and lazy-links an
//! internal handler to every upstream. On any upstream change the handler
//! re-reads the *current* value of every upstream (not just the one that
//! changed), recomputes, and forwards the result through the trusted internal
//! set path — so each upstream mutation produces exactly one full recompute
//! and at most one notification, never a stale partial one. Separate external
//! mutations are not batched: every change propagates fully before the next
//! is accepted.
//!
//! The write side does not exist on this type; value changes originate
//! solely from upstream notifications.
//!
//! Mutually dependent derivations (a cycle in the dependency graph) are not
//! detected and recurse unboundedly; constructing one is a caller error.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::cell::{ChangeHandle, ObservableCell, ReadableCell};
use crate::error::{CellError, Result};
use crate::value::{Value, ValueKind};

type Detacher = Box<dyn FnOnce() -> Result<()>>;

/// A read-only cell whose value is a pure function of N upstream cells.
///
/// Cloning a `DerivedCell` creates a new handle to the same state.
pub struct DerivedCell<T> {
    cell: ObservableCell<T>,
    links: Rc<RefCell<Vec<Detacher>>>,
}

impl<T> Clone for DerivedCell<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            links: Rc::clone(&self.links),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for DerivedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedCell")
            .field("cell", &self.cell)
            .field("dependencies", &self.links.borrow().len())
            .finish()
    }
}

fn detacher<S, C>(upstream: C, handle: ChangeHandle<S>) -> Detacher
where
    S: 'static,
    C: ReadableCell<S>,
{
    Box::new(move || upstream.unlink(&handle))
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> DerivedCell<T> {
    /// Derivation from a single upstream.
    pub fn from1<S1, C1>(u1: &C1, recompute: impl Fn(&S1) -> T + 'static) -> Result<Self>
    where
        S1: 'static,
        C1: ReadableCell<S1>,
    {
        let initial = u1.with(&recompute);
        let cell = ObservableCell::new(initial);

        let run = {
            let u1 = u1.clone();
            let inner = cell.clone();
            Rc::new(move || {
                let value = u1.with(&recompute);
                inner.set_internal(value);
            })
        };
        let h1 = u1.lazy_link({
            let run = Rc::clone(&run);
            move |_, _| run()
        })?;

        Ok(Self {
            cell,
            links: Rc::new(RefCell::new(vec![detacher(u1.clone(), h1)])),
        })
    }

    /// Derivation from two upstreams of possibly different types.
    pub fn from2<S1, S2, C1, C2>(
        u1: &C1,
        u2: &C2,
        recompute: impl Fn(&S1, &S2) -> T + 'static,
    ) -> Result<Self>
    where
        S1: 'static,
        S2: 'static,
        C1: ReadableCell<S1>,
        C2: ReadableCell<S2>,
    {
        let initial = u1.with(|a| u2.with(|b| recompute(a, b)));
        let cell = ObservableCell::new(initial);

        let run = {
            let u1 = u1.clone();
            let u2 = u2.clone();
            let inner = cell.clone();
            Rc::new(move || {
                let value = u1.with(|a| u2.with(|b| recompute(a, b)));
                inner.set_internal(value);
            })
        };
        let h1 = u1.lazy_link({
            let run = Rc::clone(&run);
            move |_, _| run()
        })?;
        let h2 = match u2.lazy_link({
            let run = Rc::clone(&run);
            move |_, _| run()
        }) {
            Ok(handle) => handle,
            Err(err) => {
                u1.unlink(&h1)?;
                return Err(err);
            }
        };

        Ok(Self {
            cell,
            links: Rc::new(RefCell::new(vec![
                detacher(u1.clone(), h1),
                detacher(u2.clone(), h2),
            ])),
        })
    }

    /// Derivation from three upstreams of possibly different types.
    pub fn from3<S1, S2, S3, C1, C2, C3>(
        u1: &C1,
        u2: &C2,
        u3: &C3,
        recompute: impl Fn(&S1, &S2, &S3) -> T + 'static,
    ) -> Result<Self>
    where
        S1: 'static,
        S2: 'static,
        S3: 'static,
        C1: ReadableCell<S1>,
        C2: ReadableCell<S2>,
        C3: ReadableCell<S3>,
    {
        let initial = u1.with(|a| u2.with(|b| u3.with(|c| recompute(a, b, c))));
        let cell = ObservableCell::new(initial);

        let run = {
            let u1 = u1.clone();
            let u2 = u2.clone();
            let u3 = u3.clone();
            let inner = cell.clone();
            Rc::new(move || {
                let value = u1.with(|a| u2.with(|b| u3.with(|c| recompute(a, b, c))));
                inner.set_internal(value);
            })
        };
        let mut links: Vec<Detacher> = Vec::with_capacity(3);

        let h1 = u1.lazy_link({
            let run = Rc::clone(&run);
            move |_, _| run()
        })?;
        links.push(detacher(u1.clone(), h1));

        let h2 = match u2.lazy_link({
            let run = Rc::clone(&run);
            move |_, _| run()
        }) {
            Ok(handle) => handle,
            Err(err) => {
                Self::unwind(links)?;
                return Err(err);
            }
        };
        links.push(detacher(u2.clone(), h2));

        let h3 = match u3.lazy_link({
            let run = Rc::clone(&run);
            move |_, _| run()
        }) {
            Ok(handle) => handle,
            Err(err) => {
                Self::unwind(links)?;
                return Err(err);
            }
        };
        links.push(detacher(u3.clone(), h3));

        Ok(Self {
            cell,
            links: Rc::new(RefCell::new(links)),
        })
    }

    /// Derivation from a homogeneous slice of upstreams.
    pub fn from_slice<S, C>(deps: &[C], recompute: impl Fn(&[S]) -> T + 'static) -> Result<Self>
    where
        S: Clone + 'static,
        C: ReadableCell<S>,
    {
        let current: Vec<S> = deps.iter().map(|dep| dep.get()).collect();
        let cell = ObservableCell::new(recompute(&current));

        let run = {
            let deps: Vec<C> = deps.to_vec();
            let inner = cell.clone();
            Rc::new(move || {
                let current: Vec<S> = deps.iter().map(|dep| dep.get()).collect();
                inner.set_internal(recompute(&current));
            })
        };

        let mut links: Vec<Detacher> = Vec::with_capacity(deps.len());
        for dep in deps {
            let handle = match dep.lazy_link({
                let run = Rc::clone(&run);
                move |_, _| run()
            }) {
                Ok(handle) => handle,
                Err(err) => {
                    Self::unwind(links)?;
                    return Err(err);
                }
            };
            links.push(detacher(dep.clone(), handle));
        }

        Ok(Self {
            cell,
            links: Rc::new(RefCell::new(links)),
        })
    }

    fn unwind(links: Vec<Detacher>) -> Result<()> {
        for unlink in links {
            unlink()?;
        }
        Ok(())
    }

    /// Current value, cloned.
    #[must_use]
    pub fn get(&self) -> T {
        self.cell.get()
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.cell.with(f)
    }

    /// Subscribes and fires immediately with `(current, None)`.
    pub fn link(&self, observer: impl Fn(&T, Option<&T>) + 'static) -> Result<ChangeHandle<T>> {
        self.cell.link(observer)
    }

    /// Subscribes without the immediate invocation.
    pub fn lazy_link(
        &self,
        observer: impl Fn(&T, Option<&T>) + 'static,
    ) -> Result<ChangeHandle<T>> {
        self.cell.lazy_link(observer)
    }

    pub fn unlink(&self, handle: &ChangeHandle<T>) -> Result<()> {
        self.cell.unlink(handle)
    }

    pub fn unlink_all(&self) {
        self.cell.unlink_all();
    }

    #[must_use]
    pub fn has_listener(&self, handle: &ChangeHandle<T>) -> bool {
        self.cell.has_listener(handle)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.cell.listener_count()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.cell.is_disposed()
    }

    /// Unsubscribes the internal handler from every upstream and clears the
    /// dependency list. The cell keeps its last computed value.
    pub fn detach(&self) -> Result<()> {
        let links = std::mem::take(&mut *self.links.borrow_mut());
        for unlink in links {
            unlink()?;
        }
        Ok(())
    }

    /// Detaches from every upstream, then disposes the inner cell. Disposing
    /// twice is an error.
    pub fn dispose(&self) -> Result<()> {
        self.detach()?;
        self.cell.dispose()
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> ReadableCell<T> for DerivedCell<T> {
    fn get(&self) -> T {
        DerivedCell::get(self)
    }

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        DerivedCell::with(self, f)
    }

    fn lazy_link(&self, observer: impl Fn(&T, Option<&T>) + 'static) -> Result<ChangeHandle<T>> {
        DerivedCell::lazy_link(self, observer)
    }

    fn unlink(&self, handle: &ChangeHandle<T>) -> Result<()> {
        DerivedCell::unlink(self, handle)
    }

    fn listener_count(&self) -> usize {
        DerivedCell::listener_count(self)
    }

    fn declared_kind(&self) -> Option<ValueKind> {
        None
    }
}

fn truthy(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

impl DerivedCell<Value> {
    /// Boolean AND over the upstreams. Every upstream must carry kind
    /// `Bool`, checked before any subscription is made.
    pub fn and<C: ReadableCell<Value>>(deps: &[C]) -> Result<Self> {
        Self::require_bool_upstreams(deps)?;
        Self::from_slice(deps, |values| Value::Bool(values.iter().all(truthy)))
    }

    /// Boolean OR over the upstreams. Every upstream must carry kind `Bool`.
    pub fn or<C: ReadableCell<Value>>(deps: &[C]) -> Result<Self> {
        Self::require_bool_upstreams(deps)?;
        Self::from_slice(deps, |values| Value::Bool(values.iter().any(truthy)))
    }

    /// Boolean cell tracking deep equality of two upstreams.
    pub fn value_equals<C1, C2>(a: &C1, b: &C2) -> Result<Self>
    where
        C1: ReadableCell<Value>,
        C2: ReadableCell<Value>,
    {
        Self::from2(a, b, |x, y| Value::Bool(x == y))
    }

    fn require_bool_upstreams<C: ReadableCell<Value>>(deps: &[C]) -> Result<()> {
        for (index, dep) in deps.iter().enumerate() {
            let found = dep
                .declared_kind()
                .unwrap_or_else(|| dep.with(Value::kind));
            if found != ValueKind::Bool {
                return Err(CellError::TypeConstraint {
                    index,
                    expected: ValueKind::Bool,
                    found,
                });
            }
        }
        Ok(())
    }
}
