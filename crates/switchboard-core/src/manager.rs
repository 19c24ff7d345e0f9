//! The manager: component tree, handler registry, event queue and run loop.

use crate::channel::{Channel, Target};
use crate::component::{Component, ComponentId, ComponentInfo, ComponentTree};
use crate::dispatcher::{self, Completion, DispatchSummary};
use crate::error::{Error, Result};
use crate::event::{Event, TimeBudget};
use crate::handler::{Handler, HandlerId, HandlerInfo};
use crate::idle::IdleWait;
use crate::queue::{EventQueue, QueueStats};
use crate::registry::HandlerRegistry;
use crate::value::Value;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use switchboard_config::SwitchboardConfig;
use tracing::{debug, info, warn};

/// Name of the synthetic event fired once per loop iteration.
pub const GENERATE_EVENTS: &str = "generate_events";

/// Name under which the manager owns its internal handlers.
const MANAGER_NAME: &str = "manager";

/// Callback that wakes a parked loop.
pub type ResumeHook = Arc<dyn Fn() + Send + Sync>;

/// Counters describing the manager's work so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ManagerStats {
    /// Events fired
    pub fired: u64,
    /// Events dispatched
    pub dispatched: u64,
    /// Completed flushes
    pub flushes: u64,
    /// Handler invocations that failed
    pub handler_failures: u64,
    /// Events currently queued
    pub pending: usize,
    /// Queue statistics
    pub queue: QueueStats,
}

struct ManagerInner {
    /// Manager configuration
    config: SwitchboardConfig,
    /// Attached components; locked before `registry`
    tree: RwLock<ComponentTree>,
    /// Registered handlers
    registry: RwLock<HandlerRegistry>,
    /// Events awaiting dispatch
    queue: EventQueue,
    /// Idle fallback, when enabled
    idle: Option<IdleWait>,
    /// User hook run on every fire and resume
    resume_hook: Mutex<Option<ResumeHook>>,
    /// Installed by the idle fallback while parked
    idle_hook: Mutex<Option<ResumeHook>>,
    /// Completion notices whose outcome has unresolved forward links
    completions: Mutex<Vec<Completion>>,
    /// Running state
    running: AtomicBool,
    /// Set by `stop()` while running, cleared when `run()` returns
    stop_requested: AtomicBool,
    fired: AtomicU64,
    dispatched: AtomicU64,
    flushes: AtomicU64,
    handler_failures: AtomicU64,
}

/// Owns the event space: components, handlers, the queue and the loop.
///
/// `Manager` is a cheap handle; clones share the same state and may be sent
/// to other threads to fire events, `resume()` or `stop()` the loop.
///
/// ```rust
/// use switchboard_core::{Component, Event, Handler, Manager, Reply};
///
/// let manager = Manager::new();
/// manager
///     .attach(
///         Component::new("app")
///             .with_channel("app")
///             .with_handler(Handler::on("hello", |_, _| Ok(Reply::from("Hello World!")))),
///     )
///     .unwrap();
///
/// let value = manager.fire_to(Event::new("hello"), "app");
/// manager.flush();
/// assert_eq!(value.to_string(), "Hello World!");
/// ```
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Manager {
    /// Name of the synthetic event fired once per loop iteration.
    pub const GENERATE_EVENTS: &'static str = GENERATE_EVENTS;

    /// Create a manager with default configuration.
    pub fn new() -> Self {
        Self::build(SwitchboardConfig::default())
    }

    /// Create a manager from validated configuration.
    pub fn with_config(config: SwitchboardConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SwitchboardConfig) -> Self {
        let idle = config
            .idle
            .enabled
            .then(|| IdleWait::from_config(&config.idle));

        let mut registry = HandlerRegistry::new();
        if let Some(idle) = &idle {
            registry.register(ComponentId::ROOT, MANAGER_NAME, &Channel::Any, idle.handler());
        }

        let queue = EventQueue::new(config.manager.queue_warn_threshold);
        Self {
            inner: Arc::new(ManagerInner {
                config,
                tree: RwLock::new(ComponentTree::new()),
                registry: RwLock::new(registry),
                queue,
                idle,
                resume_hook: Mutex::new(None),
                idle_hook: Mutex::new(None),
                completions: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                fired: AtomicU64::new(0),
                dispatched: AtomicU64::new(0),
                flushes: AtomicU64::new(0),
                handler_failures: AtomicU64::new(0),
            }),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &SwitchboardConfig {
        &self.inner.config
    }

    pub(crate) fn tree(&self) -> &RwLock<ComponentTree> {
        &self.inner.tree
    }

    pub(crate) fn registry(&self) -> &RwLock<HandlerRegistry> {
        &self.inner.registry
    }

    // ----- Components -----

    /// Attach a top-level component and its children.
    pub fn attach(&self, component: Component) -> Result<ComponentId> {
        self.attach_under(None, component)
    }

    /// Attach a component as a child of `parent`.
    pub fn attach_to(&self, parent: ComponentId, component: Component) -> Result<ComponentId> {
        self.attach_under(Some(parent), component)
    }

    fn attach_under(&self, parent: Option<ComponentId>, component: Component) -> Result<ComponentId> {
        let mut tree = self.inner.tree.write();
        let mut registry = self.inner.registry.write();
        let id = attach_recursive(&mut tree, &mut registry, parent, component)
            .ok_or_else(|| Error::ComponentNotFound(parent.unwrap_or(ComponentId::ROOT)))?;
        drop(registry);

        info!(
            component = %id,
            name = tree.name_of(id).unwrap_or_default(),
            attached = tree.len(),
            "Attached component"
        );
        Ok(id)
    }

    /// Detach a component and its subtree, removing all their handlers.
    ///
    /// A dispatch already in progress completes with the handlers it started
    /// with.
    pub fn detach(&self, id: ComponentId) -> Result<()> {
        let mut tree = self.inner.tree.write();
        let removed = tree.remove(id);
        if removed.is_empty() {
            return Err(Error::ComponentNotFound(id));
        }

        let mut registry = self.inner.registry.write();
        let handlers: usize = removed.iter().map(|c| registry.unregister(*c)).sum();
        info!(
            component = %id,
            components = removed.len(),
            handlers,
            "Detached component"
        );
        Ok(())
    }

    /// Whether any component is attached.
    pub fn is_attached(&self) -> bool {
        !self.inner.tree.read().is_empty()
    }

    /// Top-level components in attachment order.
    pub fn components(&self) -> Vec<ComponentId> {
        self.inner.tree.read().roots().to_vec()
    }

    /// View of an attached component.
    pub fn component_info(&self, id: ComponentId) -> Option<ComponentInfo> {
        self.inner.tree.read().info(id)
    }

    /// Children of a component in attachment order.
    pub fn children(&self, id: ComponentId) -> Vec<ComponentId> {
        self.inner.tree.read().children(id)
    }

    /// Parent of a component.
    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.inner.tree.read().parent(id)
    }

    /// Top-level ancestor of a component.
    pub fn root_of(&self, id: ComponentId) -> Option<ComponentId> {
        self.inner.tree.read().root_of(id)
    }

    // ----- Handlers -----

    /// Register a handler for an attached component, or for the manager
    /// itself with [`ComponentId::ROOT`].
    pub fn add_handler(&self, owner: ComponentId, handler: Handler) -> Result<HandlerId> {
        let tree = self.inner.tree.read();
        let (name, channel) = if owner == ComponentId::ROOT {
            (MANAGER_NAME, Channel::Any)
        } else {
            let info = tree
                .name_of(owner)
                .zip(tree.channel_of(owner))
                .ok_or(Error::ComponentNotFound(owner))?;
            (info.0, info.1.clone())
        };

        let id = self
            .inner
            .registry
            .write()
            .register(owner, name, &channel, handler);
        debug!(handler = %id, component = %owner, "Added handler");
        Ok(id)
    }

    /// Remove a single handler.
    pub fn remove_handler(&self, id: HandlerId) -> Result<()> {
        if self.inner.registry.write().remove(id) {
            debug!(handler = %id, "Removed handler");
            Ok(())
        } else {
            Err(Error::HandlerNotFound(id))
        }
    }

    /// Handlers an event named `event` on `channel` would reach, in
    /// invocation order. Nothing is invoked.
    pub fn handlers_for(&self, event: &str, channel: impl Into<Channel>) -> Vec<HandlerInfo> {
        let probe = Event::new(event).on_channel(channel);
        dispatcher::resolve_handlers(self, &probe)
            .iter()
            .map(|d| d.info())
            .collect()
    }

    /// Handlers owned by a component, in registration order.
    pub fn handlers_of(&self, owner: ComponentId) -> Vec<HandlerInfo> {
        self.inner
            .registry
            .read()
            .owned_by(owner)
            .iter()
            .map(|d| d.info())
            .collect()
    }

    // ----- Firing -----

    /// Enqueue an event. Without an explicit target it is broadcast.
    ///
    /// The returned value resolves when the event is dispatched by a later
    /// [`flush`](Self::flush).
    pub fn fire(&self, mut event: Event) -> Value {
        if *event.target() == Target::Default {
            event.set_target(Target::all());
        }
        self.enqueue(event)
    }

    /// Enqueue an event on an explicit channel.
    pub fn fire_to(&self, event: Event, channel: impl Into<Channel>) -> Value {
        self.fire(event.on_channel(channel))
    }

    /// Enqueue an event for the next flush; same as [`fire`](Self::fire).
    pub fn push(&self, event: Event) -> Value {
        self.fire(event)
    }

    pub(crate) fn enqueue(&self, mut event: Event) -> Value {
        let value = Value::new();
        event.attach_value(value.clone());
        debug!(event = %event.name(), target = %event.target(), "Fired event");
        self.inner.queue.push(event);
        self.inner.fired.fetch_add(1, Ordering::Relaxed);
        self.run_hooks();
        value
    }

    fn run_hooks(&self) {
        let user = self.inner.resume_hook.lock().clone();
        if let Some(hook) = user {
            hook();
        }
        let idle = self.inner.idle_hook.lock().clone();
        if let Some(hook) = idle {
            hook();
        }
    }

    pub(crate) fn defer_completion(&self, completion: Completion) {
        self.inner.completions.lock().push(completion);
    }

    /// Fire the deferred completion notices whose outcome has resolved.
    fn release_completions(&self) {
        let ready: Vec<Completion> = {
            let mut deferred = self.inner.completions.lock();
            if deferred.is_empty() {
                return;
            }
            let (ready, waiting) = deferred.drain(..).partition(Completion::is_ready);
            *deferred = waiting;
            ready
        };
        for notice in ready.into_iter().filter_map(Completion::into_event) {
            self.enqueue(notice);
        }
    }

    /// Dispatch the events queued when the flush starts, in order.
    ///
    /// Events fired while flushing wait for the next flush. Returns the
    /// number of events dispatched.
    pub fn flush(&self) -> usize {
        let events = self
            .inner
            .queue
            .take_snapshot(self.inner.config.manager.max_events_per_flush);
        let count = events.len();

        let mut invoked = 0;
        let mut short_circuited = 0;
        for event in events {
            let summary: DispatchSummary = dispatcher::dispatch(self, event);
            invoked += summary.invoked;
            short_circuited += usize::from(summary.short_circuited);
            self.inner.dispatched.fetch_add(1, Ordering::Relaxed);
            self.inner
                .handler_failures
                .fetch_add(summary.failures as u64, Ordering::Relaxed);
        }

        self.release_completions();
        self.inner.flushes.fetch_add(1, Ordering::Relaxed);
        if count > 0 {
            debug!(events = count, invoked, short_circuited, "Flushed events");
        }
        count
    }

    /// Whether events are queued.
    pub fn has_pending(&self) -> bool {
        !self.inner.queue.is_empty()
    }

    /// Number of queued events.
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    // ----- Loop -----

    /// One loop iteration: fire `generate_events`, then flush.
    ///
    /// The event's budget is zero when work is already queued, otherwise the
    /// configured idle budget. Returns the number of events dispatched.
    pub fn tick(&self) -> usize {
        let budget = if self.has_pending() {
            TimeBudget::NONE
        } else {
            TimeBudget::from(self.inner.config.idle.budget())
        };
        self.fire(Event::new(GENERATE_EVENTS).with_time_left(budget));
        self.flush()
    }

    /// Run the loop until [`stop`](Self::stop) is called or, when configured
    /// with `stop_when_detached`, until no component is attached.
    pub fn run(&self) -> Result<()> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyRunning);
        }

        info!(components = self.inner.tree.read().len(), "Manager loop started");
        if self.spins_when_idle() {
            warn!("No idle fallback and no idle budget; the loop will spin while idle");
        }
        let until_detached = self.inner.config.manager.stop_when_detached;
        while !self.is_stop_requested() && (!until_detached || self.is_attached()) {
            self.tick();
        }
        let drained = self.flush();

        self.inner.stop_requested.store(false, Ordering::SeqCst);
        self.inner.running.store(false, Ordering::SeqCst);
        info!(drained, "Manager loop stopped");
        Ok(())
    }

    /// Ask the loop to stop after the current iteration. Safe from any thread.
    ///
    /// Without a running loop this does nothing; a later `run()` or `tick()`
    /// is not affected.
    pub fn stop(&self) {
        if !self.is_running() {
            debug!("Stop requested while not running");
            return;
        }
        self.inner.stop_requested.store(true, Ordering::SeqCst);
        self.resume();
    }

    /// Whether `run()` would busy-loop when no work is queued.
    pub(crate) fn spins_when_idle(&self) -> bool {
        self.inner.idle.is_none() && self.inner.config.idle.budget().is_none()
    }

    /// Whether `run()` is executing.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Whether a stop was requested and `run()` has not yet returned.
    pub fn is_stop_requested(&self) -> bool {
        self.inner.stop_requested.load(Ordering::SeqCst)
    }

    /// Wake a parked loop. Safe from any thread.
    pub fn resume(&self) {
        self.run_hooks();
        if let Some(idle) = &self.inner.idle {
            idle.resume();
        }
    }

    /// Install or clear the hook run whenever an event is fired or the loop
    /// is resumed.
    pub fn set_resume_hook(&self, hook: Option<ResumeHook>) {
        *self.inner.resume_hook.lock() = hook;
    }

    /// Hook slot used by the idle fallback while parked; independent of
    /// [`set_resume_hook`](Self::set_resume_hook).
    pub(crate) fn set_idle_hook(&self, hook: Option<ResumeHook>) {
        *self.inner.idle_hook.lock() = hook;
    }

    /// The built-in idle fallback, when enabled.
    pub fn idle(&self) -> Option<&IdleWait> {
        self.inner.idle.as_ref()
    }

    /// Current counters.
    pub fn stats(&self) -> ManagerStats {
        let queue = self.inner.queue.stats();
        ManagerStats {
            fired: self.inner.fired.load(Ordering::Relaxed),
            dispatched: self.inner.dispatched.load(Ordering::Relaxed),
            flushes: self.inner.flushes.load(Ordering::Relaxed),
            handler_failures: self.inner.handler_failures.load(Ordering::Relaxed),
            pending: queue.current_size,
            queue,
        }
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("components", &self.inner.tree.read().len())
            .field("handlers", &self.inner.registry.read().len())
            .field("pending", &self.pending())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Insert `component` and its children, registering their handlers.
/// `None` when `parent` is not attached.
fn attach_recursive(
    tree: &mut ComponentTree,
    registry: &mut HandlerRegistry,
    parent: Option<ComponentId>,
    component: Component,
) -> Option<ComponentId> {
    let (name, channel, handlers, children) = component.into_parts();
    let id = tree.insert(parent, name.clone(), channel.clone())?;
    for handler in handlers {
        registry.register(id, &name, &channel, handler);
    }
    for child in children {
        attach_recursive(tree, registry, Some(id), child)?;
    }
    Some(id)
}
