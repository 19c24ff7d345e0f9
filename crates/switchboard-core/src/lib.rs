//! # Switchboard Core
//!
//! A single-process event engine. Components register handlers on named
//! channels; the manager queues fired events and dispatches each one to every
//! matching handler in priority order, collecting results and captured
//! failures into an outcome [`Value`].
//!
//! ## Features
//!
//! - **Deterministic ordering**: priority descending, registration order on ties
//! - **Filter handlers** that stop dispatch with a truthy reply
//! - **Failure capture**: handler errors and panics become structured
//!   [`Failure`]s in the outcome, never unwinding into the loop
//! - **Forward links** from an outcome to a nested event's outcome
//! - **Idle waiting** that another thread can interrupt with `resume()`
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────┐ fire  ┌──────────────┐ flush ┌──────────────┐
//! │  Caller  │──────▶│  EventQueue  │──────▶│  Dispatcher  │
//! └──────────┘       └──────────────┘       └──────────────┘
//!      ▲                                        │      │
//!      │ Value                                  ▼      ▼
//!      │                          ┌───────────────┐ ┌─────────────────┐
//!      └──────────────────────────│ ComponentTree │ │ HandlerRegistry │
//!                                 └───────────────┘ └─────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use switchboard_core::{Component, Event, Handler, Manager, Reply};
//!
//! let manager = Manager::new();
//! manager
//!     .attach(
//!         Component::new("greeter")
//!             .with_channel("greeter")
//!             .with_handler(Handler::on("hello", |_ctx, payload| {
//!                 let who = payload.arg(0).and_then(|v| v.as_str()).unwrap_or("World");
//!                 Ok(Reply::from(format!("Hello {who}!")))
//!             })),
//!     )
//!     .unwrap();
//!
//! let value = manager.fire_to(Event::new("hello").with_arg("Rust"), "greeter");
//! manager.flush();
//! assert_eq!(value.to_string(), "Hello Rust!");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod channel;
mod component;
mod context;
mod dispatcher;
pub mod error;
mod event;
mod handler;
mod idle;
mod manager;
mod queue;
mod registry;
mod timer;
mod value;

pub use channel::{Channel, Target};
pub use component::{Component, ComponentId, ComponentInfo};
pub use context::HandlerContext;
pub use error::{Error, Result};
pub use event::{Event, Payload, TimeBudget};
pub use handler::{EventPattern, Handler, HandlerError, HandlerId, HandlerInfo, HandlerResult, Reply};
pub use idle::{IdleState, IdleWait, WaitOutcome, IDLE_PRIORITY};
pub use manager::{Manager, ManagerStats, ResumeHook, GENERATE_EVENTS};
pub use queue::QueueStats;
pub use timer::{Timer, TIMER_PRIORITY};
pub use value::{is_truthy, Failure, Outcome, Slot, TraceEntry, Value, CYCLE_FAILURE};

pub use switchboard_config::SwitchboardConfig;
