//! Outcome values: the collected results of dispatching one event.
//!
//! A [`Value`] is created empty when an event is fired, filled slot by slot
//! while its handlers run and frozen when the handler chain ends. Handlers
//! that return the value of a nested event leave a forward link in their slot;
//! reads follow such links transparently once the nested event is dispatched.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::sync::Arc;

/// Forward links deeper than this are reported as a cycle.
const MAX_LINK_DEPTH: usize = 64;

/// Failure kind recorded for forward-link cycles.
pub const CYCLE_FAILURE: &str = "cycle";

/// Returns whether a JSON value counts as "handled" for filter handlers.
///
/// `null`, `false`, zero, and empty strings, arrays or objects are falsy.
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(map) => !map.is_empty(),
    }
}

/// One line of a failure's trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEntry {
    /// Where the failing handler was invoked.
    Handler {
        /// Owning component name
        component: String,
        /// Handler name
        handler: String,
        /// Event being dispatched
        event: String,
        /// Channel of the handler
        channel: String,
    },
    /// A nested cause from the error's source chain.
    Cause(String),
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEntry::Handler {
                component,
                handler,
                event,
                channel,
            } => write!(f, "in {component}.{handler} handling {event} on {channel}"),
            TraceEntry::Cause(cause) => write!(f, "caused by: {cause}"),
        }
    }
}

/// A captured handler failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    /// Failure kind, e.g. the error type name or `"panic"`
    pub kind: String,
    /// Human-readable message
    pub message: String,
    /// Structured trace records
    #[serde(default)]
    pub trace: Vec<TraceEntry>,
}

impl Failure {
    /// Create a failure without trace records.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            trace: Vec::new(),
        }
    }

    /// Unpack into `(kind, message, trace)`.
    pub fn into_parts(self) -> (String, String, Vec<TraceEntry>) {
        (self.kind, self.message, self.trace)
    }

    /// JSON rendering: `{"kind", "message", "trace"}`.
    pub fn to_json(&self) -> JsonValue {
        json!({
            "kind": self.kind,
            "message": self.message,
            "trace": self.trace.iter().map(ToString::to_string).collect::<Vec<_>>(),
        })
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Failure {}

/// One handler's contribution to an outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// A returned value
    Value(JsonValue),
    /// A captured failure
    Failure(Failure),
}

impl Slot {
    /// JSON rendering; failures become `{"kind", "message", "trace"}` objects.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Slot::Value(value) => value.clone(),
            Slot::Failure(failure) => failure.to_json(),
        }
    }

    /// Whether this slot holds a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Slot::Failure(_))
    }
}

/// Snapshot of a value's state.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Dispatch has not finished, or a forward link is still unresolved
    Pending,
    /// No handler produced anything
    Empty,
    /// Exactly one handler produced a value
    Single(JsonValue),
    /// Exactly one handler produced a failure
    Failure(Failure),
    /// Two or more slots, in invocation order
    Many(Vec<Slot>),
}

impl Outcome {
    fn collapse(mut slots: Vec<Slot>) -> Self {
        match slots.len() {
            0 => Outcome::Empty,
            1 => match slots.remove(0) {
                Slot::Value(value) => Outcome::Single(value),
                Slot::Failure(failure) => Outcome::Failure(failure),
            },
            _ => Outcome::Many(slots),
        }
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Ready(Slot),
    Link(Value),
}

#[derive(Debug, Default)]
struct ValueState {
    entries: Vec<Entry>,
    frozen: bool,
}

/// Shared handle to the outcome of one event.
///
/// Cloning is cheap; every clone observes the same state. Only the
/// dispatcher writes to a value.
#[derive(Clone, Default)]
pub struct Value {
    inner: Arc<Mutex<ValueState>>,
}

impl Value {
    /// Create an empty, unresolved value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether two handles refer to the same value.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether dispatch finished and every forward link resolved.
    pub fn is_resolved(&self) -> bool {
        !matches!(self.outcome(), Outcome::Pending)
    }

    /// Snapshot of the current state, following forward links.
    pub fn outcome(&self) -> Outcome {
        self.resolve(0)
    }

    /// The result as JSON, or `None` while pending.
    ///
    /// An empty outcome reads as `[]`, several slots as an array in
    /// invocation order.
    pub fn value(&self) -> Option<JsonValue> {
        match self.outcome() {
            Outcome::Pending => None,
            Outcome::Empty => Some(JsonValue::Array(Vec::new())),
            Outcome::Single(value) => Some(value),
            Outcome::Failure(failure) => Some(failure.to_json()),
            Outcome::Many(slots) => Some(JsonValue::Array(
                slots.iter().map(Slot::to_json).collect(),
            )),
        }
    }

    /// The failure, when the outcome is a single failure.
    pub fn failure(&self) -> Option<Failure> {
        match self.outcome() {
            Outcome::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    /// Resolved slots in invocation order; empty while pending.
    pub fn slots(&self) -> Vec<Slot> {
        match self.outcome() {
            Outcome::Pending | Outcome::Empty => Vec::new(),
            Outcome::Single(value) => vec![Slot::Value(value)],
            Outcome::Failure(failure) => vec![Slot::Failure(failure)],
            Outcome::Many(slots) => slots,
        }
    }

    pub(crate) fn push_value(&self, value: JsonValue) {
        self.push(Entry::Ready(Slot::Value(value)));
    }

    pub(crate) fn push_failure(&self, failure: Failure) {
        self.push(Entry::Ready(Slot::Failure(failure)));
    }

    pub(crate) fn push_link(&self, link: Value) {
        self.push(Entry::Link(link));
    }

    /// Discard collected slots and keep only `failure`.
    pub(crate) fn replace_with_failure(&self, failure: Failure) {
        let mut state = self.inner.lock();
        if !state.frozen {
            state.entries = vec![Entry::Ready(Slot::Failure(failure))];
        }
    }

    pub(crate) fn freeze(&self) {
        self.inner.lock().frozen = true;
    }

    fn push(&self, entry: Entry) {
        let mut state = self.inner.lock();
        if state.frozen {
            tracing::debug!("Ignoring write to a frozen value");
            return;
        }
        state.entries.push(entry);
    }

    fn resolve(&self, depth: usize) -> Outcome {
        if depth > MAX_LINK_DEPTH {
            return Outcome::Failure(Failure::new(
                CYCLE_FAILURE,
                "Forward link chain does not terminate",
            ));
        }

        // Links are followed after the lock is released.
        let entries = {
            let state = self.inner.lock();
            if !state.frozen {
                return Outcome::Pending;
            }
            state.entries.clone()
        };

        let mut slots = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                Entry::Ready(slot) => slots.push(slot),
                Entry::Link(link) => match link.resolve(depth + 1) {
                    Outcome::Pending => return Outcome::Pending,
                    Outcome::Empty => {}
                    Outcome::Single(value) => slots.push(Slot::Value(value)),
                    Outcome::Failure(failure) => slots.push(Slot::Failure(failure)),
                    Outcome::Many(inner) => slots.push(Slot::Value(JsonValue::Array(
                        inner.iter().map(Slot::to_json).collect(),
                    ))),
                },
            }
        }
        Outcome::collapse(slots)
    }
}

impl<'a> IntoIterator for &'a Value {
    type Item = Slot;
    type IntoIter = std::vec::IntoIter<Slot>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots().into_iter()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome() {
            Outcome::Pending | Outcome::Empty => Ok(()),
            Outcome::Single(JsonValue::String(s)) => f.write_str(&s),
            Outcome::Single(value) => write!(f, "{value}"),
            Outcome::Failure(failure) => f.write_str(&failure.message),
            Outcome::Many(slots) => {
                let rendered = JsonValue::Array(slots.iter().map(Slot::to_json).collect());
                write!(f, "{rendered}")
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Value").field(&self.outcome()).finish()
    }
}
