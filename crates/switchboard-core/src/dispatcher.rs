//! Delivers one event to its handlers and fills its outcome value.

use crate::channel::{Channel, Target};
use crate::component::ComponentTree;
use crate::context::HandlerContext;
use crate::event::Event;
use crate::handler::{HandlerDescriptor, HandlerError, Reply};
use crate::manager::Manager;
use crate::value::{is_truthy, Failure, Slot, TraceEntry, Value, CYCLE_FAILURE};
use serde_json::{json, Value as JsonValue};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, debug_span, trace, warn};

/// What one dispatch did, for manager statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DispatchSummary {
    pub(crate) invoked: usize,
    pub(crate) failures: usize,
    pub(crate) short_circuited: bool,
}

/// Channels an event is delivered on; `None` is a dispatch miss.
///
/// The wildcard channel expands to every attached component's own channel.
/// Wildcard-channel handlers are added by the registry in every case.
pub(crate) fn resolve_channels(tree: &ComponentTree, target: &Target) -> Option<Vec<Channel>> {
    let channel = match target {
        Target::Default => Channel::Any,
        Target::Channel(channel) => channel.clone(),
        Target::Component(id) => tree.channel_of(*id)?.clone(),
    };
    Some(match channel {
        Channel::Any => tree.channels(),
        named => vec![named],
    })
}

/// Handlers that would receive `event`, in invocation order.
pub(crate) fn resolve_handlers(manager: &Manager, event: &Event) -> Vec<Arc<HandlerDescriptor>> {
    let tree = manager.tree().read();
    let Some(channels) = resolve_channels(&tree, event.target()) else {
        return Vec::new();
    };
    manager.registry().read().resolve(event.name(), &channels)
}

enum Step {
    Continue,
    Stop,
}

/// Invoke every matching handler in order and freeze the event's value.
///
/// Locks are released before the first handler runs; handlers registered or
/// removed during the dispatch do not affect it.
pub(crate) fn dispatch(manager: &Manager, mut event: Event) -> DispatchSummary {
    let value = match event.value() {
        Some(value) => value.clone(),
        None => {
            let value = Value::new();
            event.attach_value(value.clone());
            value
        }
    };

    let span = debug_span!("dispatch", event = %event.name(), target = %event.target());
    let _enter = span.enter();

    let handlers = resolve_handlers(manager, &event);
    if handlers.is_empty() {
        debug!("No handlers matched");
    }

    let mut summary = DispatchSummary::default();
    for descriptor in &handlers {
        summary.invoked += 1;
        trace!(
            handler = %descriptor.name(),
            priority = descriptor.priority(),
            filter = descriptor.is_filter(),
            "Invoking handler"
        );

        let mut ctx = HandlerContext::new(
            manager,
            descriptor.owner,
            &descriptor.owner_name,
            &descriptor.channel,
            descriptor.name(),
        );
        let result = catch_unwind(AssertUnwindSafe(|| descriptor.invoke(&mut ctx, &mut event)))
            .unwrap_or_else(|payload| Err(HandlerError::from_panic(payload)));

        let step = match result {
            Ok(Reply::None) | Ok(Reply::Value(JsonValue::Null)) => Step::Continue,
            Ok(Reply::Value(result)) => {
                let handled = is_truthy(&result);
                value.push_value(result);
                if descriptor.is_filter() && handled {
                    Step::Stop
                } else {
                    Step::Continue
                }
            }
            Ok(Reply::Pending(link)) if link.ptr_eq(&value) => {
                let err = HandlerError::new(CYCLE_FAILURE, "Handler returned its own event's value");
                record_failure(&value, descriptor, &event, err, &mut summary)
            }
            Ok(Reply::Pending(link)) => {
                value.push_link(link);
                if descriptor.is_filter() {
                    Step::Stop
                } else {
                    Step::Continue
                }
            }
            Err(err) => record_failure(&value, descriptor, &event, err, &mut summary),
        };

        if let Step::Stop = step {
            summary.short_circuited = true;
            debug!(handler = %descriptor.name(), "Filter handler stopped dispatch");
            break;
        }
    }

    value.freeze();
    notify_completion(manager, &event, &value);
    summary
}

fn record_failure(
    value: &Value,
    descriptor: &HandlerDescriptor,
    event: &Event,
    err: HandlerError,
    summary: &mut DispatchSummary,
) -> Step {
    summary.failures += 1;
    warn!(
        handler = %descriptor.name(),
        component = %descriptor.owner_name,
        kind = %err.kind,
        "Handler failed: {}",
        err.message
    );

    let mut trace = vec![TraceEntry::Handler {
        component: descriptor.owner_name.clone(),
        handler: descriptor.name().to_string(),
        event: event.name().to_string(),
        channel: descriptor.channel.to_string(),
    }];
    trace.extend(err.trace_causes());
    let failure = Failure {
        kind: err.kind,
        message: err.message,
        trace,
    };

    if descriptor.is_filter() {
        value.replace_with_failure(failure);
        Step::Stop
    } else {
        value.push_failure(failure);
        Step::Continue
    }
}

/// A completion notice waiting for its event's outcome to resolve.
pub(crate) struct Completion {
    name: String,
    target: Target,
    on_success: bool,
    on_failure: bool,
    value: Value,
}

impl Completion {
    pub(crate) fn is_ready(&self) -> bool {
        self.value.is_resolved()
    }

    /// The `<name>_success` or `<name>_failure` event, if one was asked for.
    ///
    /// Failures reached through forward links count.
    pub(crate) fn into_event(self) -> Option<Event> {
        let failed = self.value.slots().iter().any(Slot::is_failure);
        let suffix = match (failed, self.on_success, self.on_failure) {
            (false, true, _) => "success",
            (true, _, true) => "failure",
            _ => return None,
        };

        let rendered = self.value.value().unwrap_or(JsonValue::Null);
        let mut notice = Event::new(format!("{}_{suffix}", self.name))
            .with_args([json!(self.name), rendered]);
        notice.set_target(self.target);
        Some(notice)
    }
}

fn notify_completion(manager: &Manager, event: &Event, value: &Value) {
    if !event.wants_success_notice() && !event.wants_failure_notice() {
        return;
    }

    let completion = Completion {
        name: event.name().to_string(),
        target: event.target().clone(),
        on_success: event.wants_success_notice(),
        on_failure: event.wants_failure_notice(),
        value: value.clone(),
    };
    if completion.is_ready() {
        if let Some(notice) = completion.into_event() {
            manager.enqueue(notice);
        }
    } else {
        trace!(event = %event.name(), "Completion notice waits for forward links");
        manager.defer_completion(completion);
    }
}
