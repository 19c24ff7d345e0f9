//! Idle waiting, cross-thread wake-up and run loop control

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use switchboard_config::SwitchboardConfig;
use switchboard_core::{Component, Error, Event, Handler, Manager, Reply};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn config(recheck_ms: u64, budget_ms: Option<u64>) -> SwitchboardConfig {
    let mut config = SwitchboardConfig::default();
    config.idle.recheck_interval_ms = recheck_ms;
    config.idle.budget_ms = budget_ms;
    config
}

fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(ms(1));
    }
    condition()
}

#[test]
fn test_tick_parks_until_resumed_from_another_thread() {
    let manager = Manager::with_config(config(5_000, None)).unwrap();
    let idle = manager.idle().cloned().unwrap();

    let worker = {
        let manager = manager.clone();
        thread::spawn(move || {
            let started = Instant::now();
            manager.tick();
            started.elapsed()
        })
    };

    assert!(wait_until(ms(2_000), || idle.is_waiting()));
    manager.resume();

    let parked_for = worker.join().unwrap();
    assert!(parked_for < ms(5_000), "woken before the re-check interval");
    assert_eq!(idle.wakes(), 1);
    assert!(!idle.is_waiting());
}

#[test]
fn test_fire_from_another_thread_wakes_the_loop() {
    let manager = Manager::with_config(config(5_000, None)).unwrap();
    let handled = Arc::new(AtomicUsize::new(0));
    let counter = handled.clone();
    manager
        .attach(Component::new("app").with_channel("app").with_handler(Handler::on(
            "work",
            move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Reply::None)
            },
        )))
        .unwrap();
    let idle = manager.idle().cloned().unwrap();

    let worker = {
        let manager = manager.clone();
        thread::spawn(move || {
            manager.tick();
            manager.tick();
        })
    };

    assert!(wait_until(ms(2_000), || idle.is_waiting()));
    manager.fire_to(Event::new("work"), "app");
    worker.join().unwrap();

    assert_eq!(handled.load(Ordering::SeqCst), 1);
}

#[test]
fn test_bounded_budget_is_spent_without_wake() {
    let manager = Manager::with_config(config(10, Some(40))).unwrap();

    let started = Instant::now();
    manager.tick();
    let elapsed = started.elapsed();

    assert!(elapsed >= ms(40), "waited only {elapsed:?}");
    assert!(elapsed < ms(2_000));
}

#[test]
fn test_pending_work_skips_the_wait() {
    let manager = Manager::with_config(config(5_000, None)).unwrap();
    manager.fire(Event::new("queued"));

    let started = Instant::now();
    assert_eq!(manager.tick(), 2);
    assert!(started.elapsed() < ms(1_000));
}

#[test]
fn test_run_until_stopped_from_another_thread() {
    let manager = Manager::with_config(config(20, None)).unwrap();
    manager.attach(Component::new("app")).unwrap();

    let runner = {
        let manager = manager.clone();
        thread::spawn(move || manager.run())
    };

    assert!(wait_until(ms(2_000), || manager.is_running()));
    assert!(matches!(manager.run(), Err(Error::AlreadyRunning)));

    manager.stop();
    runner.join().unwrap().unwrap();
    assert!(!manager.is_running());
    assert!(!manager.is_stop_requested());
}

#[test]
fn test_run_ends_when_last_component_detaches() {
    let manager = Manager::with_config(config(20, None)).unwrap();
    manager
        .attach(Component::new("app").with_channel("app").with_handler(Handler::on(
            "quit",
            |ctx, _| {
                ctx.manager().detach(ctx.component())?;
                Ok(Reply::None)
            },
        )))
        .unwrap();

    let runner = {
        let manager = manager.clone();
        thread::spawn(move || manager.run())
    };

    assert!(wait_until(ms(2_000), || manager.is_running()));
    manager.fire_to(Event::new("quit"), "app");
    runner.join().unwrap().unwrap();
    assert!(!manager.is_attached());
}

#[test]
fn test_idle_can_be_disabled() {
    let mut config = SwitchboardConfig::default();
    config.idle.enabled = false;
    let manager = Manager::with_config(config).unwrap();

    assert!(manager.idle().is_none());
    assert!(manager.handlers_for(Manager::GENERATE_EVENTS, "*").is_empty());
}

#[test]
fn test_user_resume_hook_survives_idle_wait() {
    let manager = Manager::with_config(config(10, Some(5))).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    manager.set_resume_hook(Some(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })));

    manager.tick();
    let after_tick = calls.load(Ordering::SeqCst);
    manager.fire(Event::new("later"));

    assert_eq!(calls.load(Ordering::SeqCst), after_tick + 1);
}

#[test]
fn test_stop_before_run_does_not_cancel_it() {
    let manager = Manager::with_config(config(20, None)).unwrap();
    manager.attach(Component::new("app")).unwrap();
    manager.stop();
    assert!(!manager.is_stop_requested());

    let stopper = {
        let manager = manager.clone();
        thread::spawn(move || {
            wait_until(ms(2_000), || manager.is_running());
            thread::sleep(ms(50));
            manager.stop();
        })
    };

    let started = Instant::now();
    manager.run().unwrap();
    stopper.join().unwrap();
    assert!(started.elapsed() >= ms(40), "run returned after {:?}", started.elapsed());
}

#[test]
fn test_tick_parks_after_stop_without_loop() {
    let manager = Manager::with_config(config(10, Some(30))).unwrap();
    manager.stop();

    let started = Instant::now();
    manager.tick();
    assert!(started.elapsed() >= ms(30));
}
