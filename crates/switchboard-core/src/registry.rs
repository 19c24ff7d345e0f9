//! Handler registry: per-channel handler lists in dispatch order.

use crate::channel::Channel;
use crate::component::ComponentId;
use crate::handler::{Handler, HandlerDescriptor, HandlerId};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Dispatch order: priority descending, then registration order.
fn dispatch_order(a: &HandlerDescriptor, b: &HandlerDescriptor) -> Ordering {
    b.priority()
        .total_cmp(&a.priority())
        .then_with(|| a.id.cmp(&b.id))
}

/// Registered handlers, grouped by the channel they listen on.
///
/// Each channel's list is kept in dispatch order so resolving a single
/// channel needs no sort.
#[derive(Debug, Default)]
pub(crate) struct HandlerRegistry {
    by_channel: HashMap<Channel, Vec<Arc<HandlerDescriptor>>>,
    next_id: u64,
}

impl HandlerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `owner`; it listens on its explicit channel or
    /// on `owner_channel`.
    pub(crate) fn register(
        &mut self,
        owner: ComponentId,
        owner_name: &str,
        owner_channel: &Channel,
        handler: Handler,
    ) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;

        let channel = handler
            .channel()
            .cloned()
            .unwrap_or_else(|| owner_channel.clone());
        let descriptor = Arc::new(HandlerDescriptor {
            id,
            owner,
            owner_name: owner_name.to_string(),
            channel: channel.clone(),
            handler,
        });

        let list = self.by_channel.entry(channel).or_default();
        let at = list.partition_point(|existing| {
            dispatch_order(existing, &descriptor) == Ordering::Less
        });
        list.insert(at, descriptor);
        id
    }

    /// Remove every handler owned by `owner`. Returns how many were removed.
    pub(crate) fn unregister(&mut self, owner: ComponentId) -> usize {
        self.retain(|d| d.owner != owner)
    }

    /// Remove one handler.
    pub(crate) fn remove(&mut self, id: HandlerId) -> bool {
        self.retain(|d| d.id != id) > 0
    }

    fn retain(&mut self, keep: impl Fn(&HandlerDescriptor) -> bool) -> usize {
        let mut removed = 0;
        for list in self.by_channel.values_mut() {
            let before = list.len();
            list.retain(|d| keep(d.as_ref()));
            removed += before - list.len();
        }
        self.by_channel.retain(|_, list| !list.is_empty());
        removed
    }

    /// Handlers for `event` on any of `channels`, wildcard-channel handlers
    /// included, merged into one dispatch-ordered list.
    pub(crate) fn resolve(&self, event: &str, channels: &[Channel]) -> Vec<Arc<HandlerDescriptor>> {
        let any = Channel::Any;
        let mut wanted: Vec<&Channel> = Vec::with_capacity(channels.len() + 1);
        wanted.push(&any);
        for channel in channels {
            if !wanted.contains(&channel) {
                wanted.push(channel);
            }
        }

        let mut resolved: Vec<Arc<HandlerDescriptor>> = wanted
            .into_iter()
            .filter_map(|channel| self.by_channel.get(channel))
            .flatten()
            .filter(|d| d.matches(event))
            .cloned()
            .collect();
        resolved.sort_by(|a, b| dispatch_order(a, b));
        resolved
    }

    /// All handlers owned by `owner`, in registration order.
    pub(crate) fn owned_by(&self, owner: ComponentId) -> Vec<Arc<HandlerDescriptor>> {
        let mut owned: Vec<_> = self
            .by_channel
            .values()
            .flatten()
            .filter(|d| d.owner == owner)
            .cloned()
            .collect();
        owned.sort_by_key(|d| d.id);
        owned
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: HandlerId) -> bool {
        self.by_channel.values().flatten().any(|d| d.id == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_channel.values().map(Vec::len).sum()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.by_channel.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Reply;
    use proptest::prelude::*;

    fn noop(name: &str) -> Handler {
        Handler::on(name, |_, _| Ok(Reply::None))
    }

    fn names(resolved: &[Arc<HandlerDescriptor>]) -> Vec<String> {
        resolved.iter().map(|d| d.name().to_string()).collect()
    }

    #[test]
    fn test_wildcard_handlers_join_channel_resolution() {
        let mut registry = HandlerRegistry::new();
        let a = Channel::from("a");
        registry.register(ComponentId(2), "b", &Channel::Any, noop("test").with_name("h2").with_priority(10.0));
        registry.register(ComponentId(1), "a", &a, noop("test").with_name("h1"));

        let resolved = registry.resolve("test", &[a]);
        assert_eq!(names(&resolved), vec!["h2", "h1"]);
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let mut registry = HandlerRegistry::new();
        let values = Channel::from("values");
        for name in ["foo", "bar", "baz"] {
            registry.register(ComponentId(1), "c", &values, noop("values").with_name(name));
        }

        let resolved = registry.resolve("values", &[values]);
        assert_eq!(names(&resolved), vec!["foo", "bar", "baz"]);
    }

    #[test]
    fn test_resolve_filters_by_event_name() {
        let mut registry = HandlerRegistry::new();
        let chan = Channel::from("a");
        registry.register(ComponentId(1), "c", &chan, noop("read"));
        registry.register(ComponentId(1), "c", &chan, noop("write"));
        registry.register(
            ComponentId(1),
            "c",
            &chan,
            Handler::on_any(|_, _| Ok(Reply::None)),
        );

        assert_eq!(names(&registry.resolve("read", &[chan.clone()])), vec!["read", "any"]);
        assert!(registry.resolve("read", &[Channel::from("other")]).is_empty());
    }

    #[test]
    fn test_multi_channel_merge_is_priority_ordered() {
        let mut registry = HandlerRegistry::new();
        let a = Channel::from("a");
        let b = Channel::from("b");
        registry.register(ComponentId(1), "a", &a, noop("e").with_name("a_low").with_priority(1.0));
        registry.register(ComponentId(1), "a", &a, noop("e").with_name("a_high").with_priority(5.0));
        registry.register(ComponentId(2), "b", &b, noop("e").with_name("b_mid").with_priority(3.0));

        let resolved = registry.resolve("e", &[a, b]);
        assert_eq!(names(&resolved), vec!["a_high", "b_mid", "a_low"]);
    }

    #[test]
    fn test_unregister_and_remove() {
        let mut registry = HandlerRegistry::new();
        let chan = Channel::from("a");
        let first = registry.register(ComponentId(1), "one", &chan, noop("e"));
        registry.register(ComponentId(1), "one", &Channel::Any, noop("e"));
        registry.register(ComponentId(2), "two", &chan, noop("e"));
        assert_eq!(registry.len(), 3);

        assert!(registry.remove(first));
        assert!(!registry.remove(first));
        assert!(!registry.contains(first));
        assert_eq!(registry.unregister(ComponentId(1)), 1);
        assert_eq!(registry.owned_by(ComponentId(2)).len(), 1);
        assert_eq!(registry.unregister(ComponentId(2)), 1);
        assert!(registry.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn resolve_is_priority_descending_and_registration_stable(
            handlers in prop::collection::vec((-5i32..5, prop::bool::ANY), 0..40)
        ) {
            let mut registry = HandlerRegistry::new();
            let chan = Channel::from("a");
            for (priority, wildcard) in &handlers {
                let listen = if *wildcard { Channel::Any } else { chan.clone() };
                registry.register(
                    ComponentId(1),
                    "c",
                    &listen,
                    noop("e").with_priority(f64::from(*priority)),
                );
            }

            let resolved = registry.resolve("e", &[chan]);
            prop_assert_eq!(resolved.len(), handlers.len());
            for pair in resolved.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!(
                    a.priority() > b.priority() || (a.priority() == b.priority() && a.id < b.id),
                    "Out of order: {:?} before {:?}",
                    a.id,
                    b.id
                );
            }
        }
    }
}
