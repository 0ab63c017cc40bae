#![forbid(unsafe_code)]

//! One observer over several cells.
//!
//! A multilink subscribes a single observer to N cells; on any change the
//! observer receives the current values of every dependency, positionally.
//! [`multilink`] invokes the observer immediately on construction to
//! establish initial state, [`lazy_multilink`] does not.

use std::cell::RefCell;
use std::rc::Rc;

use crate::cell::ReadableCell;
use crate::error::Result;

type Detacher = Box<dyn FnOnce() -> Result<()>>;

/// Handle to an active multilink; call [`detach`](Multilink::detach) to
/// sever every subscription.
pub struct Multilink {
    links: RefCell<Vec<Detacher>>,
}

impl Multilink {
    /// Unsubscribes the observer from every dependency. Detaching twice is
    /// harmless; the second call finds nothing to remove.
    pub fn detach(&self) -> Result<()> {
        let links = std::mem::take(&mut *self.links.borrow_mut());
        for unlink in links {
            unlink()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        !self.links.borrow().is_empty()
    }
}

/// Subscribes `observer` to every dependency and invokes it once immediately
/// with the current values.
pub fn multilink<S, C>(deps: &[C], observer: impl Fn(&[S]) + 'static) -> Result<Multilink>
where
    S: Clone + 'static,
    C: ReadableCell<S>,
{
    let observer: Rc<dyn Fn(&[S])> = Rc::new(observer);
    let link = attach(deps, Rc::clone(&observer))?;
    let current: Vec<S> = deps.iter().map(|dep| dep.get()).collect();
    observer(&current);
    Ok(link)
}

/// Subscribes without the immediate invocation.
pub fn lazy_multilink<S, C>(deps: &[C], observer: impl Fn(&[S]) + 'static) -> Result<Multilink>
where
    S: Clone + 'static,
    C: ReadableCell<S>,
{
    attach(deps, Rc::new(observer))
}

fn attach<S, C>(deps: &[C], observer: Rc<dyn Fn(&[S])>) -> Result<Multilink>
where
    S: Clone + 'static,
    C: ReadableCell<S>,
{
    let run = {
        let deps: Vec<C> = deps.to_vec();
        let observer = Rc::clone(&observer);
        Rc::new(move || {
            let current: Vec<S> = deps.iter().map(|dep| dep.get()).collect();
            observer(&current);
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
                for unlink in links {
                    unlink()?;
                }
                return Err(err);
            }
        };
        let upstream = dep.clone();
        links.push(Box::new(move || upstream.unlink(&handle)));
    }

    Ok(Multilink {
        links: RefCell::new(links),
    })
}
