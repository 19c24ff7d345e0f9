//! The context passed to every handler invocation.

use crate::channel::{Channel, Target};
use crate::component::ComponentId;
use crate::event::Event;
use crate::manager::Manager;
use crate::value::Value;

/// Access to the manager and the invoking handler's identity.
pub struct HandlerContext<'a> {
    manager: &'a Manager,
    component: ComponentId,
    component_name: &'a str,
    channel: &'a Channel,
    handler: &'a str,
}

impl<'a> HandlerContext<'a> {
    pub(crate) fn new(
        manager: &'a Manager,
        component: ComponentId,
        component_name: &'a str,
        channel: &'a Channel,
        handler: &'a str,
    ) -> Self {
        Self {
            manager,
            component,
            component_name,
            channel,
            handler,
        }
    }

    /// The manager dispatching this event.
    pub fn manager(&self) -> &Manager {
        self.manager
    }

    /// The component owning the handler.
    pub fn component(&self) -> ComponentId {
        self.component
    }

    /// Name of the component owning the handler.
    pub fn component_name(&self) -> &str {
        self.component_name
    }

    /// The channel the handler listens on.
    pub fn channel(&self) -> &Channel {
        self.channel
    }

    /// The handler's name.
    pub fn handler_name(&self) -> &str {
        self.handler
    }

    /// Enqueue an event for the next flush.
    ///
    /// An event without an explicit target goes to the handler's channel.
    pub fn fire(&self, mut event: Event) -> Value {
        if *event.target() == Target::Default {
            event.set_target(Target::Channel(self.channel.clone()));
        }
        self.manager.enqueue(event)
    }

    /// Enqueue a nested event and return its value.
    ///
    /// Returning the value (or `Reply::from(value)`) from the handler links
    /// the current event's outcome to it.
    pub fn push(&self, event: Event) -> Value {
        self.fire(event)
    }

    /// Enqueue an event on an explicit channel.
    pub fn fire_to(&self, event: Event, channel: impl Into<Channel>) -> Value {
        self.fire(event.on_channel(channel))
    }

    /// Wake an idle loop.
    pub fn resume(&self) {
        self.manager.resume();
    }
}
