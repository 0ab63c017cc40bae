#![forbid(unsafe_code)]

//! Ordered multicast event bus, safe under reentrant mutation.
//!
//! # Architecture
//!
//! Listeners are `Rc<dyn Fn(&A)>`; identity is `Rc` allocation identity, so
//! a listener appears at most once and can be removed by handle. The payload
//! type `A` fixes the event's arity — use tuples for multi-argument events.
//!
//! Each `emit` pushes a dispatch frame. A frame iterates the live listener
//! list until a mutation *defends* it by copying the pre-mutation list into
//! the frame; the frame then finishes its round over that defended snapshot.
//! Reentrant emits push their own frames and are unaffected by outer frames.
//!
//! # Invariants
//!
//! 1. Notification order is registration order.
//! 2. Within one round, every listener present when `emit` began runs exactly
//!    once — regardless of subscribes/unsubscribes performed by listeners.
//! 3. A listener added during a round first runs in the next round; a
//!    listener removed during a round still finishes the current one.
//! 4. A panicking listener unwinds to the `emit` caller; the bus does not
//!    catch it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{CellError, Result};

/// A subscribed callback. Clone the `Rc` to keep a removal handle.
pub type Listener<A> = Rc<dyn Fn(&A)>;

/// One in-progress notification round.
struct Frame<A> {
    /// `None` while the round iterates the live listener list; `Some` once a
    /// mutation defended the round with a pre-mutation copy.
    snapshot: Option<Vec<Listener<A>>>,
}

struct EmitterInner<A> {
    listeners: RefCell<Vec<Listener<A>>>,
    /// Stack of active rounds, innermost last.
    frames: RefCell<Vec<Frame<A>>>,
}

/// Ordered multicast dispatch for a single event type.
///
/// Cloning an `Emitter` creates a new handle to the same listener list.
pub struct Emitter<A> {
    inner: Rc<EmitterInner<A>>,
}

impl<A> Clone for Emitter<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: 'static> Default for Emitter<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: 'static> Emitter<A> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(EmitterInner {
                listeners: RefCell::new(Vec::new()),
                frames: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Adds a listener. The same `Rc` cannot be subscribed twice.
    pub fn subscribe(&self, listener: Listener<A>) -> Result<()> {
        if self.has_listener(&listener) {
            return Err(CellError::DuplicateListener);
        }
        self.defend();
        self.inner.listeners.borrow_mut().push(listener);
        Ok(())
    }

    /// Removes a listener. A listener removed during its own round still
    /// receives that round's callback.
    pub fn unsubscribe(&self, listener: &Listener<A>) -> Result<()> {
        let index = self
            .inner
            .listeners
            .borrow()
            .iter()
            .position(|l| Rc::ptr_eq(l, listener))
            .ok_or(CellError::UnknownListener)?;
        self.defend();
        self.inner.listeners.borrow_mut().remove(index);
        Ok(())
    }

    /// Removes every listener, each through the defend-then-remove path, so
    /// clearing the bus mid-dispatch is safe.
    pub fn unsubscribe_all(&self) {
        loop {
            let first = self.inner.listeners.borrow().first().cloned();
            match first {
                // Cannot fail: the listener was just read from the live list.
                Some(listener) => drop(self.unsubscribe(&listener)),
                None => break,
            }
        }
    }

    /// Notifies every listener, front to back. Reentrant calls from inside a
    /// listener are supported and run to completion before the outer round
    /// resumes its next listener.
    pub fn emit(&self, args: &A) {
        let depth = {
            let mut frames = self.inner.frames.borrow_mut();
            frames.push(Frame { snapshot: None });
            frames.len() - 1
        };
        tracing::trace!(depth, listeners = self.listener_count(), "emit");

        let mut index = 0;
        loop {
            // Re-resolve each step: a mutation may have defended this frame.
            let listener = {
                let frames = self.inner.frames.borrow();
                match &frames[depth].snapshot {
                    Some(snapshot) => snapshot.get(index).cloned(),
                    None => self.inner.listeners.borrow().get(index).cloned(),
                }
            };
            let Some(listener) = listener else { break };
            listener(args);
            index += 1;
        }

        self.inner.frames.borrow_mut().pop();
    }

    #[must_use]
    pub fn has_listener(&self, listener: &Listener<A>) -> bool {
        self.inner
            .listeners
            .borrow()
            .iter()
            .any(|l| Rc::ptr_eq(l, listener))
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Copies the live listener list into every active round that has not
    /// been defended yet. Rounds below an already-defended one were defended
    /// by the same earlier mutation, so the walk stops there.
    fn defend(&self) {
        let mut frames = self.inner.frames.borrow_mut();
        for frame in frames.iter_mut().rev() {
            if frame.snapshot.is_some() {
                break;
            }
            frame.snapshot = Some(self.inner.listeners.borrow().clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, Listener<()>) {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let listener: Listener<()> = Rc::new(move |_| c.set(c.get() + 1));
        (count, listener)
    }

    #[test]
    fn notifies_in_registration_order() {
        let bus: Emitter<u32> = Emitter::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = Rc::clone(&order);
            bus.subscribe(Rc::new(move |arg: &u32| log.borrow_mut().push((tag, *arg))))
                .unwrap();
        }
        bus.emit(&7);

        assert_eq!(
            *order.borrow(),
            vec![("first", 7), ("second", 7), ("third", 7)]
        );
    }

    #[test]
    fn duplicate_subscribe_rejected() {
        let bus: Emitter<()> = Emitter::new();
        let (_, listener) = counter();
        bus.subscribe(Rc::clone(&listener)).unwrap();
        assert!(matches!(
            bus.subscribe(listener),
            Err(CellError::DuplicateListener)
        ));
    }

    #[test]
    fn unknown_unsubscribe_rejected() {
        let bus: Emitter<()> = Emitter::new();
        let (_, listener) = counter();
        assert!(matches!(
            bus.unsubscribe(&listener),
            Err(CellError::UnknownListener)
        ));
    }

    #[test]
    fn listener_queries() {
        let bus: Emitter<()> = Emitter::new();
        let (_, listener) = counter();
        assert_eq!(bus.listener_count(), 0);
        bus.subscribe(Rc::clone(&listener)).unwrap();
        assert!(bus.has_listener(&listener));
        assert_eq!(bus.listener_count(), 1);
        bus.unsubscribe(&listener).unwrap();
        assert!(!bus.has_listener(&listener));
    }

    #[test]
    fn add_during_dispatch_waits_for_next_round() {
        let bus: Emitter<()> = Emitter::new();
        let (l1_count, _) = counter();
        let (l2_count, l2) = counter();

        let bus_for_l1 = bus.clone();
        let c1 = Rc::clone(&l1_count);
        let l2_for_l1 = Rc::clone(&l2);
        let l1: Listener<()> = Rc::new(move |_| {
            c1.set(c1.get() + 1);
            if !bus_for_l1.has_listener(&l2_for_l1) {
                bus_for_l1.subscribe(Rc::clone(&l2_for_l1)).unwrap();
            }
        });
        bus.subscribe(l1).unwrap();

        bus.emit(&());
        assert_eq!(l1_count.get(), 1);
        assert_eq!(l2_count.get(), 0);

        bus.emit(&());
        assert_eq!(l1_count.get(), 2);
        assert_eq!(l2_count.get(), 1);
    }

    #[test]
    fn remove_during_dispatch_finishes_current_round() {
        let bus: Emitter<()> = Emitter::new();
        let (l2_count, l2) = counter();

        let bus_for_l1 = bus.clone();
        let l2_for_l1 = Rc::clone(&l2);
        let l1: Listener<()> = Rc::new(move |_| {
            bus_for_l1.unsubscribe(&l2_for_l1).unwrap();
        });
        bus.subscribe(l1).unwrap();
        bus.subscribe(Rc::clone(&l2)).unwrap();

        // L1 removes L2, but L2 was present when the round began.
        bus.emit(&());
        assert_eq!(l2_count.get(), 1);
        assert_eq!(bus.listener_count(), 1);

        bus.emit(&());
        assert_eq!(l2_count.get(), 1);
    }

    #[test]
    fn unsubscribe_all_during_dispatch() {
        let bus: Emitter<()> = Emitter::new();
        let (tail_count, tail) = counter();

        let bus_for_head = bus.clone();
        let head: Listener<()> = Rc::new(move |_| bus_for_head.unsubscribe_all());
        bus.subscribe(head).unwrap();
        bus.subscribe(Rc::clone(&tail)).unwrap();

        bus.emit(&());
        assert_eq!(tail_count.get(), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn reentrant_emit_uses_current_listeners() {
        let bus: Emitter<u32> = Emitter::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let bus_for_l1 = bus.clone();
        let log_for_l1 = Rc::clone(&log);
        let l1: Listener<u32> = Rc::new(move |arg| {
            log_for_l1.borrow_mut().push(("l1", *arg));
            if *arg == 0 {
                bus_for_l1.emit(&1);
            }
        });
        let log_for_l2 = Rc::clone(&log);
        let l2: Listener<u32> = Rc::new(move |arg| log_for_l2.borrow_mut().push(("l2", *arg)));

        bus.subscribe(l1).unwrap();
        bus.subscribe(l2).unwrap();
        bus.emit(&0);

        // Inner round completes before the outer round reaches l2.
        assert_eq!(
            *log.borrow(),
            vec![("l1", 0), ("l1", 1), ("l2", 1), ("l2", 0)]
        );
    }

    #[test]
    fn removed_listener_skipped_in_nested_round() {
        // Outer round defends; the nested emit after removal uses the live
        // (shrunken) list.
        let bus: Emitter<u32> = Emitter::new();
        let (l2_count, l2) = counter_u32();

        let bus_for_l1 = bus.clone();
        let l2_for_l1 = Rc::clone(&l2);
        let l1: Listener<u32> = Rc::new(move |arg| {
            if *arg == 0 {
                bus_for_l1.unsubscribe(&l2_for_l1).unwrap();
                bus_for_l1.emit(&1);
            }
        });
        bus.subscribe(l1).unwrap();
        bus.subscribe(Rc::clone(&l2)).unwrap();

        bus.emit(&0);
        // Nested round (arg 1) skipped l2; the defended outer round (arg 0)
        // still delivered to it.
        assert_eq!(l2_count.get(), 1);
    }

    fn counter_u32() -> (Rc<Cell<u32>>, Listener<u32>) {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let listener: Listener<u32> = Rc::new(move |_| c.set(c.get() + 1));
        (count, listener)
    }

    #[test]
    fn tuple_payload_carries_multiple_arguments() {
        let bus: Emitter<(i32, Option<i32>)> = Emitter::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_for_listener = Rc::clone(&seen);
        bus.subscribe(Rc::new(move |(new, old): &(i32, Option<i32>)| {
            seen_for_listener.borrow_mut().push((*new, *old));
        }))
        .unwrap();

        bus.emit(&(2, Some(1)));
        assert_eq!(*seen.borrow(), vec![(2, Some(1))]);
    }
}
