#![forbid(unsafe_code)]

//! Handle/registration capability for external instance bookkeeping.
//!
//! Cells and actions attach on construction and detach on disposal when a
//! registry is supplied through config. The core treats the returned
//! [`HandleId`] as opaque. There is no ambient global registry: an
//! application owns its registry instance and threads it through
//! configuration explicitly.

use std::cell::{Cell, RefCell};

use ahash::AHashMap;

/// Opaque handle returned by [`Registry::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

/// What kind of instance a registration describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    Cell,
    DerivedCell,
    Action,
}

/// Metadata supplied at registration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceMetadata {
    /// Path-like identifier, e.g. `"model.thermometer.temperature"`.
    pub id: String,
    pub kind: InstanceKind,
}

impl InstanceMetadata {
    pub fn new(id: impl Into<String>, kind: InstanceKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// External bookkeeping capability.
pub trait Registry {
    fn attach(&self, metadata: InstanceMetadata) -> HandleId;
    fn detach(&self, handle: HandleId);
}

/// Registry that tracks live instances, for leak detection in tests and
/// diagnostics builds.
#[derive(Debug, Default)]
pub struct LeakRegistry {
    next: Cell<u64>,
    live: RefCell<AHashMap<HandleId, InstanceMetadata>>,
}

impl LeakRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attached-but-not-detached instances.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.borrow().len()
    }

    /// Identifiers of live instances, for leak reports.
    #[must_use]
    pub fn live_ids(&self) -> Vec<String> {
        self.live.borrow().values().map(|m| m.id.clone()).collect()
    }
}

impl Registry for LeakRegistry {
    fn attach(&self, metadata: InstanceMetadata) -> HandleId {
        let handle = HandleId(self.next.get());
        self.next.set(handle.0 + 1);
        self.live.borrow_mut().insert(handle, metadata);
        handle
    }

    fn detach(&self, handle: HandleId) {
        self.live.borrow_mut().remove(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leak_registry_counts_live_instances() {
        let registry = LeakRegistry::new();
        let a = registry.attach(InstanceMetadata::new("model.a", InstanceKind::Cell));
        let _b = registry.attach(InstanceMetadata::new("model.b", InstanceKind::Action));
        assert_eq!(registry.live_count(), 2);

        registry.detach(a);
        assert_eq!(registry.live_count(), 1);
        assert_eq!(registry.live_ids(), vec!["model.b".to_owned()]);
    }

    #[test]
    fn detach_unknown_handle_is_inert() {
        let registry = LeakRegistry::new();
        let a = registry.attach(InstanceMetadata::new("model.a", InstanceKind::Cell));
        registry.detach(a);
        registry.detach(a);
        assert_eq!(registry.live_count(), 0);
    }
}
