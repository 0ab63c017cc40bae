#![forbid(unsafe_code)]

//! Reactive observable cells with validation and change notification.
//!
//! The primitives, bottom up:
//!
//! - [`Emitter`]: an ordered multicast event bus, safe under reentrant
//!   subscribe/unsubscribe/emit from inside listeners.
//! - [`ObservableCell`]: a mutable value that validates writes, ignores
//!   equal values, and notifies listeners with `(new, old)`.
//! - [`DerivedCell`]: a read-only cell recomputed from upstream cells,
//!   with `and`/`or`/`value_equals` combinators on dynamically-typed cells.
//! - [`multilink`]/[`lazy_multilink`]: one observer over several cells.
//! - [`CellGroup`]: a keyed aggregate of cells with bulk set/reset and
//!   by-name derivation.
//! - [`ValidatedAction`]: a callable with a declared parameter schema,
//!   validated before every invocation.
//!
//! # Architecture
//!
//! Everything is single-threaded: shared ownership is `Rc<RefCell<..>>`,
//! and cloning a cell clones a handle to the same state. Listener identity
//! is the `Rc` pointer of the registered closure, so handles compare by
//! identity rather than by code.
//!
//! Capabilities the core stays agnostic about are traits at the seams:
//! [`Validator`] for constraints, [`TelemetrySink`] for invocation/change
//! records, and [`Registry`] for instance bookkeeping. There is no global
//! registry; callers own whichever registry they pass in.
//!
//! # Invariants
//!
//! 1. Listeners are notified in registration order.
//! 2. A listener removed during a notification round still receives that
//!    round; a listener added during a round waits for the next one.
//! 3. Setting a value equal to the current value is a no-op: no
//!    notification, no telemetry record.
//! 4. A derived cell's recomputation reads the *current* value of every
//!    upstream, never a stale captured argument.
//! 5. Validation failures surface as [`CellError`] values; the stored value
//!    is untouched by a rejected write.
//!
//! With the default `diagnostics` feature disabled, constraint checks,
//! arity checks, and disposal checks compile out; the notification contract
//! is unchanged.

pub mod action;
pub mod cell;
pub mod derived;
pub mod emitter;
pub mod error;
pub mod group;
pub mod multilink;
pub mod registry;
pub mod telemetry;
pub mod units;
pub mod user_controlled;
pub mod validation;
pub mod value;

pub use action::{ActionConfig, ActionParam, ValidatedAction};
pub use cell::{CellConfig, ChangeHandle, ObservableCell, ReadableCell};
pub use derived::DerivedCell;
pub use emitter::Emitter;
pub use error::{CellError, Result};
pub use group::CellGroup;
pub use multilink::{Multilink, lazy_multilink, multilink};
pub use registry::{HandleId, InstanceKind, InstanceMetadata, LeakRegistry, Registry};
pub use telemetry::{EventToken, Instrument, MemorySink, NoopSink, TelemetrySink};
pub use units::Units;
pub use user_controlled::UserControlledCell;
pub use validation::{Constraint, Validation, Validator};
pub use value::{Value, ValueKind};
