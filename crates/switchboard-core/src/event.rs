//! Events, payloads and time budgets.

use crate::channel::{Channel, Target};
use crate::component::ComponentId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::time::Duration;

/// Positional and named arguments carried by an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Ordered positional arguments
    #[serde(default)]
    pub args: Vec<JsonValue>,
    /// Named arguments
    #[serde(default)]
    pub kwargs: Map<String, JsonValue>,
}

impl Payload {
    /// Positional argument by index.
    pub fn arg(&self, index: usize) -> Option<&JsonValue> {
        self.args.get(index)
    }

    /// Named argument by key.
    pub fn kwarg(&self, key: &str) -> Option<&JsonValue> {
        self.kwargs.get(key)
    }

    /// Whether there are no arguments at all.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

/// Remaining time an idle wait may spend on a timer-class event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBudget {
    /// No deadline known anywhere in the system
    Unbounded,
    /// Wait at most this long; zero means do not wait
    Remaining(Duration),
}

impl TimeBudget {
    /// A budget that forbids waiting.
    pub const NONE: TimeBudget = TimeBudget::Remaining(Duration::ZERO);

    /// Whether no deadline applies.
    pub fn is_unbounded(&self) -> bool {
        matches!(self, TimeBudget::Unbounded)
    }

    /// Whether the budget is used up.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, TimeBudget::Remaining(d) if d.is_zero())
    }

    /// Remaining duration, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            TimeBudget::Unbounded => None,
            TimeBudget::Remaining(d) => Some(*d),
        }
    }

    /// The tighter of two budgets.
    pub fn min(self, other: TimeBudget) -> TimeBudget {
        match (self, other) {
            (TimeBudget::Unbounded, b) | (b, TimeBudget::Unbounded) => b,
            (TimeBudget::Remaining(a), TimeBudget::Remaining(b)) => TimeBudget::Remaining(a.min(b)),
        }
    }

    /// Subtract elapsed time, flooring at zero. Unbounded stays unbounded.
    pub fn saturating_sub(self, elapsed: Duration) -> TimeBudget {
        match self {
            TimeBudget::Unbounded => TimeBudget::Unbounded,
            TimeBudget::Remaining(d) => TimeBudget::Remaining(d.saturating_sub(elapsed)),
        }
    }
}

impl From<Option<Duration>> for TimeBudget {
    fn from(budget: Option<Duration>) -> Self {
        budget.map_or(TimeBudget::Unbounded, TimeBudget::Remaining)
    }
}

impl fmt::Display for TimeBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeBudget::Unbounded => write!(f, "unbounded"),
            TimeBudget::Remaining(d) => write!(f, "{}ms", d.as_millis()),
        }
    }
}

/// An event raised by a component or by the manager.
///
/// Everything but the time budget is fixed once the event is built; handlers
/// receive it either as `&Payload` or, when declared with
/// [`crate::Handler::on_event`], as `&mut Event` so they can shrink the
/// budget.
#[derive(Debug, Clone)]
pub struct Event {
    name: String,
    payload: Payload,
    target: Target,
    time_left: TimeBudget,
    notify_success: bool,
    notify_failure: bool,
    value: Option<Value>,
}

impl Event {
    /// Create an event with no arguments, targeted at the firer's channel.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Payload::default(),
            target: Target::Default,
            time_left: TimeBudget::NONE,
            notify_success: false,
            notify_failure: false,
            value: None,
        }
    }

    /// Append a positional argument.
    pub fn with_arg(mut self, arg: impl Into<JsonValue>) -> Self {
        self.payload.args.push(arg.into());
        self
    }

    /// Append several positional arguments.
    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<JsonValue>,
    {
        self.payload.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set a named argument.
    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.payload.kwargs.insert(key.into(), value.into());
        self
    }

    /// Target an explicit channel.
    pub fn on_channel(mut self, channel: impl Into<Channel>) -> Self {
        self.target = Target::Channel(channel.into());
        self
    }

    /// Target the own channel of a component.
    pub fn to_component(mut self, id: ComponentId) -> Self {
        self.target = Target::Component(id);
        self
    }

    /// Broadcast to every channel (`*`).
    pub fn broadcast(mut self) -> Self {
        self.target = Target::all();
        self
    }

    /// Set the initial time budget.
    pub fn with_time_left(mut self, budget: TimeBudget) -> Self {
        self.time_left = budget;
        self
    }

    /// Fire `<name>_success` once dispatch finishes without a failed slot.
    pub fn notify_success(mut self) -> Self {
        self.notify_success = true;
        self
    }

    /// Fire `<name>_failure` once dispatch finishes with a failed slot.
    pub fn notify_failure(mut self) -> Self {
        self.notify_failure = true;
        self
    }

    /// Event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Positional arguments.
    pub fn args(&self) -> &[JsonValue] {
        &self.payload.args
    }

    /// Named arguments.
    pub fn kwargs(&self) -> &Map<String, JsonValue> {
        &self.payload.kwargs
    }

    /// Delivery target.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Remaining time budget.
    pub fn time_left(&self) -> TimeBudget {
        self.time_left
    }

    /// Shrink the time budget. A looser budget than the current one is ignored.
    pub fn reduce_time_left(&mut self, budget: TimeBudget) {
        self.time_left = self.time_left.min(budget);
    }

    /// Outcome value attached when the event was fired.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub(crate) fn wants_success_notice(&self) -> bool {
        self.notify_success
    }

    pub(crate) fn wants_failure_notice(&self) -> bool {
        self.notify_failure
    }

    pub(crate) fn set_target(&mut self, target: Target) {
        self.target = target;
    }

    pub(crate) fn attach_value(&mut self, value: Value) {
        self.value = Some(value);
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}[{}] {:?}>", self.name, self.target, self.payload.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_builder() {
        let event = Event::new("read")
            .with_arg("chunk")
            .with_args([1, 2])
            .with_kwarg("size", 5)
            .on_channel("file.stdout");

        assert_eq!(event.name(), "read");
        assert_eq!(event.args(), &[json!("chunk"), json!(1), json!(2)]);
        assert_eq!(event.payload().kwarg("size"), Some(&json!(5)));
        assert_eq!(event.target(), &Target::Channel(Channel::from("file.stdout")));
        assert!(event.value().is_none());
    }

    #[test]
    fn test_default_budget_forbids_waiting() {
        let event = Event::new("ping");
        assert!(event.time_left().is_exhausted());
    }

    #[test]
    fn test_reduce_time_left_only_shrinks() {
        let mut event = Event::new("generate_events").with_time_left(TimeBudget::Unbounded);
        event.reduce_time_left(TimeBudget::Remaining(Duration::from_millis(500)));
        assert_eq!(event.time_left(), TimeBudget::Remaining(Duration::from_millis(500)));

        event.reduce_time_left(TimeBudget::Remaining(Duration::from_secs(5)));
        assert_eq!(event.time_left(), TimeBudget::Remaining(Duration::from_millis(500)));

        event.reduce_time_left(TimeBudget::Unbounded);
        assert_eq!(event.time_left(), TimeBudget::Remaining(Duration::from_millis(500)));

        event.reduce_time_left(TimeBudget::NONE);
        assert!(event.time_left().is_exhausted());
    }

    #[test]
    fn test_budget_saturating_sub() {
        let budget = TimeBudget::Remaining(Duration::from_millis(30));
        assert_eq!(
            budget.saturating_sub(Duration::from_millis(50)),
            TimeBudget::NONE
        );
        assert_eq!(
            TimeBudget::Unbounded.saturating_sub(Duration::from_secs(1)),
            TimeBudget::Unbounded
        );
        assert_eq!(
            TimeBudget::from(Some(Duration::from_millis(7))).remaining(),
            Some(Duration::from_millis(7))
        );
        assert!(TimeBudget::from(None).is_unbounded());
    }
}
