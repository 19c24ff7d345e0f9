//! Channels and event targets.

use crate::component::ComponentId;
use std::fmt;

/// A named delivery address.
///
/// `Channel::Any` is the wildcard `*`: handlers on it take part in every
/// channel's resolution, and events sent to it are broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Channel {
    /// The wildcard channel `*`
    #[default]
    Any,
    /// A concrete channel name
    Named(String),
}

impl Channel {
    /// Text form of the wildcard channel.
    pub const WILDCARD: &'static str = "*";

    /// Create a channel from a name; `"*"` yields [`Channel::Any`].
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        if name == Self::WILDCARD {
            Channel::Any
        } else {
            Channel::Named(name)
        }
    }

    /// Whether this is the wildcard channel.
    pub fn is_any(&self) -> bool {
        matches!(self, Channel::Any)
    }

    /// Text form of the channel.
    pub fn as_str(&self) -> &str {
        match self {
            Channel::Any => Self::WILDCARD,
            Channel::Named(name) => name,
        }
    }
}

impl From<&str> for Channel {
    fn from(name: &str) -> Self {
        Channel::named(name)
    }
}

impl From<String> for Channel {
    fn from(name: String) -> Self {
        Channel::named(name)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an event should be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Target {
    /// The channel of whoever fires the event. Resolved when the event is
    /// fired: the manager itself fires on `*`, a handler fires on its
    /// component's channel.
    #[default]
    Default,
    /// An explicit channel. `Channel::Any` broadcasts.
    Channel(Channel),
    /// The own channel of an attached component, looked up at dispatch time.
    Component(ComponentId),
}

impl Target {
    /// Broadcast target (`*`).
    pub fn all() -> Self {
        Target::Channel(Channel::Any)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Default => write!(f, "<default>"),
            Target::Channel(channel) => write!(f, "{channel}"),
            Target::Component(id) => write!(f, "component {id}"),
        }
    }
}
