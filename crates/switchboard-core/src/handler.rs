//! Handler declaration and registered handler descriptors.
//!
//! A [`Handler`] is built explicitly and attached to a component, either
//! through [`crate::Component::with_handler`] before attachment or through
//! [`crate::Manager::add_handler`] afterwards.
//!
//! # Example
//!
//! ```rust
//! use switchboard_core::{Handler, Reply};
//!
//! let hello = Handler::on("hello", |_ctx, payload| {
//!     let name = payload.arg(0).and_then(|v| v.as_str()).unwrap_or("World");
//!     Ok(Reply::from(format!("Hello {name}!")))
//! })
//! .with_priority(1.0);
//!
//! assert_eq!(hello.name(), "hello");
//! ```

use crate::channel::Channel;
use crate::component::ComponentId;
use crate::context::HandlerContext;
use crate::event::{Event, Payload};
use crate::value::{TraceEntry, Value};
use serde_json::Value as JsonValue;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// What a handler invocation produced.
pub type HandlerResult = Result<Reply, HandlerError>;

type ArgsFn = dyn Fn(&mut HandlerContext<'_>, &Payload) -> HandlerResult + Send + Sync;
type EventFn = dyn Fn(&mut HandlerContext<'_>, &mut Event) -> HandlerResult + Send + Sync;

/// A handler's successful reply.
#[derive(Debug, Clone, Default)]
pub enum Reply {
    /// Nothing is recorded in the outcome
    #[default]
    None,
    /// A value recorded at this handler's slot
    Value(JsonValue),
    /// The outcome of another event; reads follow it once resolved
    Pending(Value),
}

/// `null` records nothing, like [`Reply::None`].
impl From<JsonValue> for Reply {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Reply::None,
            value => Reply::Value(value),
        }
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Pending(value)
    }
}

impl From<&str> for Reply {
    fn from(value: &str) -> Self {
        Reply::Value(JsonValue::from(value))
    }
}

impl From<String> for Reply {
    fn from(value: String) -> Self {
        Reply::Value(JsonValue::from(value))
    }
}

impl From<bool> for Reply {
    fn from(value: bool) -> Self {
        Reply::Value(JsonValue::from(value))
    }
}

impl From<i64> for Reply {
    fn from(value: i64) -> Self {
        Reply::Value(JsonValue::from(value))
    }
}

impl From<f64> for Reply {
    fn from(value: f64) -> Self {
        Reply::Value(JsonValue::from(value))
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::None
    }
}

/// A failure raised by a handler.
///
/// Captured into the event's outcome value; never propagated to the loop.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct HandlerError {
    /// Failure kind
    pub kind: String,
    /// Error message
    pub message: String,
    /// Nested causes, outermost first
    pub causes: Vec<String>,
}

impl HandlerError {
    /// Create an error of the given kind.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Create an error of kind `"error"`.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new("error", message)
    }

    /// Capture a typed error, using its type name as the kind and its
    /// source chain as causes.
    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        let kind = std::any::type_name::<E>()
            .rsplit("::")
            .next()
            .unwrap_or("error")
            .to_string();
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            kind,
            message: err.to_string(),
            causes,
        }
    }

    /// Capture a panic payload as a failure of kind `"panic"`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };
        Self::new("panic", message)
    }

    /// Add a nested cause.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    pub(crate) fn trace_causes(&self) -> impl Iterator<Item = TraceEntry> + '_ {
        self.causes.iter().cloned().map(TraceEntry::Cause)
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            kind: "error".to_string(),
            message: err.to_string(),
            causes: err.chain().skip(1).map(ToString::to_string).collect(),
        }
    }
}

impl From<crate::error::Error> for HandlerError {
    fn from(err: crate::error::Error) -> Self {
        Self::from_error(&err)
    }
}

/// The event names a handler answers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPattern {
    /// One event name
    Named(String),
    /// Every event
    Any,
}

impl EventPattern {
    /// Whether `name` matches.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            EventPattern::Named(n) => n == name,
            EventPattern::Any => true,
        }
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventPattern::Named(name) => f.write_str(name),
            EventPattern::Any => f.write_str("*"),
        }
    }
}

#[derive(Clone)]
enum Callback {
    Args(Arc<ArgsFn>),
    Event(Arc<EventFn>),
}

/// A handler declaration.
///
/// Defaults: priority `0.0`, not a filter, listening on the owning
/// component's channel.
#[derive(Clone)]
pub struct Handler {
    name: String,
    pattern: EventPattern,
    channel: Option<Channel>,
    priority: f64,
    filter: bool,
    callback: Callback,
}

impl Handler {
    /// Handle `event` with a callback that receives only the arguments.
    pub fn on<F>(event: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_>, &Payload) -> HandlerResult + Send + Sync + 'static,
    {
        let event = event.into();
        Self::build(event.clone(), EventPattern::Named(event), Callback::Args(Arc::new(f)))
    }

    /// Handle `event` with a callback that receives the event itself.
    pub fn on_event<F>(event: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_>, &mut Event) -> HandlerResult + Send + Sync + 'static,
    {
        let event = event.into();
        Self::build(event.clone(), EventPattern::Named(event), Callback::Event(Arc::new(f)))
    }

    /// Handle every event, receiving only the arguments.
    pub fn on_any<F>(f: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_>, &Payload) -> HandlerResult + Send + Sync + 'static,
    {
        Self::build("any".to_string(), EventPattern::Any, Callback::Args(Arc::new(f)))
    }

    /// Handle every event, receiving the event itself.
    pub fn on_any_event<F>(f: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_>, &mut Event) -> HandlerResult + Send + Sync + 'static,
    {
        Self::build("any".to_string(), EventPattern::Any, Callback::Event(Arc::new(f)))
    }

    fn build(name: String, pattern: EventPattern, callback: Callback) -> Self {
        Self {
            name,
            pattern,
            channel: None,
            priority: 0.0,
            filter: false,
            callback,
        }
    }

    /// Set priority (higher runs first)
    ///
    /// `-0.0` is the same priority as `0.0`; NaN runs after every other
    /// priority.
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = if priority.is_nan() {
            f64::NEG_INFINITY
        } else {
            priority + 0.0
        };
        self
    }

    /// Mark as a filter: a truthy reply stops dispatch
    pub fn with_filter(mut self, filter: bool) -> Self {
        self.filter = filter;
        self
    }

    /// Listen on an explicit channel instead of the component's own
    pub fn with_channel(mut self, channel: impl Into<Channel>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Override the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Event names handled
    pub fn pattern(&self) -> &EventPattern {
        &self.pattern
    }

    /// Explicit channel, if any
    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    /// Priority
    pub fn priority(&self) -> f64 {
        self.priority
    }

    /// Whether this is a filter
    pub fn is_filter(&self) -> bool {
        self.filter
    }

    /// Whether the callback receives the event itself
    pub fn wants_event(&self) -> bool {
        matches!(self.callback, Callback::Event(_))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("channel", &self.channel)
            .field("priority", &self.priority)
            .field("filter", &self.filter)
            .field("wants_event", &self.wants_event())
            .finish()
    }
}

/// Identifier of a registered handler. Also its registration sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub(crate) u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A handler bound to its owning component. Immutable once registered.
pub(crate) struct HandlerDescriptor {
    pub(crate) id: HandlerId,
    pub(crate) owner: ComponentId,
    pub(crate) owner_name: String,
    pub(crate) channel: Channel,
    pub(crate) handler: Handler,
}

impl HandlerDescriptor {
    pub(crate) fn matches(&self, event: &str) -> bool {
        self.handler.pattern.matches(event)
    }

    pub(crate) fn priority(&self) -> f64 {
        self.handler.priority
    }

    pub(crate) fn is_filter(&self) -> bool {
        self.handler.filter
    }

    pub(crate) fn name(&self) -> &str {
        &self.handler.name
    }

    pub(crate) fn invoke(&self, ctx: &mut HandlerContext<'_>, event: &mut Event) -> HandlerResult {
        match &self.handler.callback {
            Callback::Args(f) => f(ctx, event.payload()),
            Callback::Event(f) => f(ctx, event),
        }
    }

    pub(crate) fn info(&self) -> HandlerInfo {
        HandlerInfo {
            id: self.id,
            component: self.owner,
            name: self.handler.name.clone(),
            event: self.handler.pattern.clone(),
            channel: self.channel.clone(),
            priority: self.handler.priority,
            filter: self.handler.filter,
            wants_event: self.handler.wants_event(),
        }
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("channel", &self.channel)
            .field("handler", &self.handler)
            .finish()
    }
}

/// Read-only view of a registered handler.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerInfo {
    /// Handler id
    pub id: HandlerId,
    /// Owning component
    pub component: ComponentId,
    /// Display name
    pub name: String,
    /// Event names handled
    pub event: EventPattern,
    /// Channel listened on
    pub channel: Channel,
    /// Priority
    pub priority: f64,
    /// Whether a truthy reply stops dispatch
    pub filter: bool,
    /// Whether the callback receives the event itself
    pub wants_event: bool,
}
