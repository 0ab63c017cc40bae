#![forbid(unsafe_code)]

//! Telemetry sink capability: structured start/end records of notable
//! operations (cell changes, action invocations), for replay and debugging.
//!
//! The core only writes to the sink; it never reads back. Storage and
//! transport are the embedding application's concern — [`NoopSink`] discards
//! everything, [`MemorySink`] keeps records in memory for tests and replay
//! tooling.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Serialize;

/// Opaque handle pairing a `record_end` with its `record_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventToken(u64);

impl EventToken {
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Receiver of structured start/end event records.
pub trait TelemetrySink {
    /// Begin an event. `payload` maps declared argument/parameter names to
    /// externally-serialized values.
    fn record_start(
        &self,
        channel: &str,
        source: &str,
        event: &str,
        payload: Option<serde_json::Value>,
    ) -> EventToken;

    /// Close the event opened by `token`.
    fn record_end(&self, token: EventToken);
}

/// Sink that discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn record_start(
        &self,
        _channel: &str,
        _source: &str,
        _event: &str,
        _payload: Option<serde_json::Value>,
    ) -> EventToken {
        EventToken(0)
    }

    fn record_end(&self, _token: EventToken) {}
}

/// One record captured by a [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub token: EventToken,
    pub channel: String,
    pub source: String,
    pub event: String,
    pub payload: Option<serde_json::Value>,
    /// Whether the matching `record_end` has arrived.
    pub closed: bool,
}

/// In-memory sink preserving records in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: RefCell<Vec<RecordedEvent>>,
    next_token: Cell<u64>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Snapshot of every record seen so far.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.borrow().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl TelemetrySink for MemorySink {
    fn record_start(
        &self,
        channel: &str,
        source: &str,
        event: &str,
        payload: Option<serde_json::Value>,
    ) -> EventToken {
        let token = EventToken(self.next_token.get());
        self.next_token.set(token.0 + 1);
        self.events.borrow_mut().push(RecordedEvent {
            token,
            channel: channel.to_owned(),
            source: source.to_owned(),
            event: event.to_owned(),
            payload,
            closed: false,
        });
        token
    }

    fn record_end(&self, token: EventToken) {
        let mut events = self.events.borrow_mut();
        if let Some(record) = events.iter_mut().rev().find(|r| r.token == token) {
            record.closed = true;
        }
    }
}

/// Instrumentation bundle attached to a cell or action: where to record,
/// under what source id, and how to serialize values for the payload.
pub struct Instrument<T> {
    pub sink: Rc<dyn TelemetrySink>,
    pub id: String,
    pub serialize: Rc<dyn Fn(&T) -> serde_json::Value>,
}

impl<T> Clone for Instrument<T> {
    fn clone(&self) -> Self {
        Self {
            sink: Rc::clone(&self.sink),
            id: self.id.clone(),
            serialize: Rc::clone(&self.serialize),
        }
    }
}

impl<T: Serialize> Instrument<T> {
    /// Instrument serializing values through serde_json. Values that fail to
    /// serialize become JSON null rather than failing the mutation.
    pub fn json(sink: Rc<dyn TelemetrySink>, id: impl Into<String>) -> Self {
        Self {
            sink,
            id: id.into(),
            serialize: Rc::new(|v| serde_json::to_value(v).unwrap_or(serde_json::Value::Null)),
        }
    }
}
