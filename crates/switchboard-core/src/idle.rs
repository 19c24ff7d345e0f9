//! Idle wait / wake coordinator.
//!
//! When a loop iteration produced no work, the fallback handler registered by
//! [`IdleWait::handler`] parks the loop until its time budget elapses or
//! another thread calls [`IdleWait::resume`]. It runs last on
//! `generate_events` and is a filter, so it always claims the event.

use crate::event::TimeBudget;
use crate::handler::{Handler, Reply};
use crate::manager::GENERATE_EVENTS;
use flume::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchboard_config::IdleConfig;
use tracing::trace;

/// Priority of the idle fallback handler.
pub const IDLE_PRIORITY: f64 = -100.0;

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// `resume()` was called
    Woken,
    /// The time budget ran out
    Elapsed,
    /// A stop was requested
    Stopped,
}

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    /// Not parked
    Running,
    /// Parked in [`IdleWait::wait`]
    Waiting,
}

struct IdleInner {
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    recheck: Duration,
    waiting: AtomicBool,
    wakes: AtomicU64,
}

/// Cross-thread wake primitive with a bounded re-check interval.
///
/// At most one wake is buffered: several `resume()` calls before a wait
/// release it once.
#[derive(Clone)]
pub struct IdleWait {
    inner: Arc<IdleInner>,
}

impl IdleWait {
    /// Create a coordinator that re-checks for stop requests every `recheck`.
    pub fn new(recheck: Duration) -> Self {
        let (wake_tx, wake_rx) = flume::bounded(1);
        Self {
            inner: Arc::new(IdleInner {
                wake_tx,
                wake_rx,
                recheck,
                waiting: AtomicBool::new(false),
                wakes: AtomicU64::new(0),
            }),
        }
    }

    /// Create a coordinator from configuration.
    pub fn from_config(config: &IdleConfig) -> Self {
        Self::new(config.recheck_interval())
    }

    /// Re-check interval.
    pub fn recheck_interval(&self) -> Duration {
        self.inner.recheck
    }

    /// Wake a current or upcoming wait. Safe from any thread.
    pub fn resume(&self) {
        let _ = self.inner.wake_tx.try_send(());
    }

    /// Current state.
    pub fn state(&self) -> IdleState {
        if self.is_waiting() {
            IdleState::Waiting
        } else {
            IdleState::Running
        }
    }

    /// Whether a thread is parked in [`wait`](Self::wait).
    pub fn is_waiting(&self) -> bool {
        self.inner.waiting.load(Ordering::SeqCst)
    }

    /// Number of waits ended by a wake.
    pub fn wakes(&self) -> u64 {
        self.inner.wakes.load(Ordering::Relaxed)
    }

    /// Park until woken, until `budget` runs out, or until `should_stop`
    /// returns true.
    ///
    /// An unbounded budget waits in re-check slices until woken or stopped.
    /// A bounded budget is reduced by the time actually spent, floored at
    /// zero; an exhausted budget returns [`WaitOutcome::Elapsed`] at once.
    pub fn wait(&self, budget: &mut TimeBudget, should_stop: impl Fn() -> bool) -> WaitOutcome {
        self.inner.waiting.store(true, Ordering::SeqCst);
        let outcome = loop {
            let slice = match budget.remaining() {
                Some(left) if left.is_zero() => break WaitOutcome::Elapsed,
                Some(left) => left.min(self.inner.recheck),
                None => self.inner.recheck,
            };
            if should_stop() {
                break WaitOutcome::Stopped;
            }

            let started = Instant::now();
            match self.inner.wake_rx.recv_timeout(slice) {
                Ok(()) => {
                    self.inner.wakes.fetch_add(1, Ordering::Relaxed);
                    break WaitOutcome::Woken;
                }
                Err(RecvTimeoutError::Timeout) => {
                    *budget = budget.saturating_sub(started.elapsed());
                }
                Err(RecvTimeoutError::Disconnected) => break WaitOutcome::Stopped,
            }
        };
        self.inner.waiting.store(false, Ordering::SeqCst);
        outcome
    }

    /// The `generate_events` fallback handler.
    ///
    /// Skips waiting when the budget is exhausted or events are queued.
    /// Installs a wake hook on the manager while parked so that firing
    /// from any thread wakes the loop, and writes the reduced budget back to
    /// the event.
    pub fn handler(&self) -> Handler {
        let idle = self.clone();
        Handler::on_event(GENERATE_EVENTS, move |ctx, event| {
            let mut budget = event.time_left();
            if budget.is_exhausted() {
                return Ok(Reply::from(true));
            }

            let manager = ctx.manager();
            let waker = idle.clone();
            manager.set_idle_hook(Some(Arc::new(move || waker.resume())));
            let outcome = if manager.has_pending() {
                None
            } else {
                Some(idle.wait(&mut budget, || manager.is_stop_requested()))
            };
            manager.set_idle_hook(None);

            event.reduce_time_left(budget);
            trace!(?outcome, budget = %budget, "Idle wait finished");
            Ok(Reply::from(true))
        })
        .with_priority(IDLE_PRIORITY)
        .with_filter(true)
        .with_name("idle_fallback")
    }
}

impl std::fmt::Debug for IdleWait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleWait")
            .field("recheck", &self.inner.recheck)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_buffered_resume_wakes_immediately() {
        let idle = IdleWait::new(ms(1_000));
        idle.resume();
        idle.resume();

        let mut budget = TimeBudget::Unbounded;
        assert_eq!(idle.wait(&mut budget, || false), WaitOutcome::Woken);
        assert_eq!(idle.wakes(), 1);

        let mut bounded = TimeBudget::Remaining(ms(10));
        assert_eq!(idle.wait(&mut bounded, || false), WaitOutcome::Elapsed);
    }

    #[test]
    fn test_bounded_budget_decays_to_zero() {
        let idle = IdleWait::new(ms(15));
        let mut budget = TimeBudget::Remaining(ms(40));

        let started = Instant::now();
        assert_eq!(idle.wait(&mut budget, || false), WaitOutcome::Elapsed);
        assert!(budget.is_exhausted());
        assert!(started.elapsed() >= ms(40));
        assert_eq!(idle.state(), IdleState::Running);
    }

    #[test]
    fn test_exhausted_budget_does_not_wait() {
        let idle = IdleWait::new(ms(1_000));
        let mut budget = TimeBudget::NONE;
        let started = Instant::now();
        assert_eq!(idle.wait(&mut budget, || false), WaitOutcome::Elapsed);
        assert!(started.elapsed() < ms(500));
    }

    #[test]
    fn test_stop_is_observed_within_recheck() {
        let idle = IdleWait::new(ms(10));
        let stop = Arc::new(AtomicBool::new(false));

        let flag = stop.clone();
        let stopper = thread::spawn(move || {
            thread::sleep(ms(30));
            flag.store(true, Ordering::SeqCst);
        });

        let mut budget = TimeBudget::Unbounded;
        let outcome = idle.wait(&mut budget, || stop.load(Ordering::SeqCst));
        stopper.join().unwrap();
        assert_eq!(outcome, WaitOutcome::Stopped);
        assert!(budget.is_unbounded());
    }

    #[test]
    fn test_resume_from_other_thread() {
        let idle = IdleWait::new(ms(5_000));
        let (parked_tx, parked_rx) = flume::bounded(1);

        let waiter = {
            let idle = idle.clone();
            thread::spawn(move || {
                let mut budget = TimeBudget::Unbounded;
                let started = Instant::now();
                let outcome = idle.wait(&mut budget, || false);
                parked_tx.send(started.elapsed()).unwrap();
                outcome
            })
        };

        while !idle.is_waiting() {
            thread::sleep(ms(1));
        }
        idle.resume();

        let waited = parked_rx.recv_timeout(ms(2_000)).unwrap();
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Woken);
        assert!(waited < ms(2_000));
    }

    #[test]
    fn test_handler_declaration() {
        let handler = IdleWait::new(ms(10)).handler();
        assert_eq!(handler.priority(), IDLE_PRIORITY);
        assert!(handler.is_filter());
        assert!(handler.wants_event());
        assert_eq!(handler.name(), "idle_fallback");
    }
}
