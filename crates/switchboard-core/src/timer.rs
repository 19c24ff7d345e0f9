//! Timers: components that fire an event after an interval.

use crate::component::Component;
use crate::event::{Event, TimeBudget};
use crate::handler::{Handler, Reply};
use crate::manager::GENERATE_EVENTS;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Priority of timer handlers: above the idle fallback, below ordinary work.
pub const TIMER_PRIORITY: f64 = 0.0;

struct TimerState {
    deadline: Instant,
    done: bool,
}

/// Fires `event` once `interval` has passed, once or repeatedly.
///
/// The deadline is fixed when [`into_component`](Self::into_component) is
/// called. While waiting the timer shrinks the budget of `generate_events`
/// so an idle loop wakes in time. A one-shot timer detaches itself after
/// firing.
///
/// ```rust
/// use std::time::Duration;
/// use switchboard_core::{Event, Manager, Timer};
///
/// let manager = Manager::new();
/// manager
///     .attach(Timer::every(Duration::from_secs(1), Event::new("tick")).into_component())
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Timer {
    name: String,
    interval: Duration,
    event: Event,
    persist: bool,
}

impl Timer {
    /// Fire `event` once after `interval`.
    pub fn once(interval: Duration, event: Event) -> Self {
        Self {
            name: "timer".to_string(),
            interval,
            event,
            persist: false,
        }
    }

    /// Fire `event` every `interval`.
    pub fn every(interval: Duration, event: Event) -> Self {
        Self {
            persist: true,
            ..Self::once(interval, event)
        }
    }

    /// Set the component name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Interval between firings.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the timer repeats.
    pub fn is_persistent(&self) -> bool {
        self.persist
    }

    /// Start the clock and build the component.
    pub fn into_component(self) -> Component {
        let Timer {
            name,
            interval,
            event,
            persist,
        } = self;
        let state = Arc::new(Mutex::new(TimerState {
            deadline: Instant::now() + interval,
            done: false,
        }));

        let handler = Handler::on_event(GENERATE_EVENTS, move |ctx, generate| {
            let now = Instant::now();
            let mut state = state.lock();
            if state.done {
                return Ok(Reply::None);
            }

            if now >= state.deadline {
                trace!(event = %event.name(), "Timer expired");
                ctx.fire(event.clone());
                if !persist {
                    state.done = true;
                    drop(state);
                    if let Err(err) = ctx.manager().detach(ctx.component()) {
                        debug!(error = %err, "One-shot timer already detached");
                    }
                    return Ok(Reply::None);
                }
                state.deadline += interval;
                if state.deadline <= now {
                    state.deadline = now + interval;
                }
            }

            generate.reduce_time_left(TimeBudget::Remaining(
                state.deadline.saturating_duration_since(now),
            ));
            Ok(Reply::None)
        })
        .with_priority(TIMER_PRIORITY)
        .with_name("timer_expiry");

        Component::new(name).with_handler(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_builders() {
        let once = Timer::once(Duration::from_millis(5), Event::new("ping"));
        assert!(!once.is_persistent());
        let every = Timer::every(Duration::from_millis(5), Event::new("ping")).with_name("heartbeat");
        assert!(every.is_persistent());
        assert_eq!(every.interval(), Duration::from_millis(5));

        let component = every.into_component();
        assert_eq!(component.name(), "heartbeat");
        assert_eq!(component.handlers().len(), 1);
        assert_eq!(component.handlers()[0].priority(), TIMER_PRIORITY);
    }
}
