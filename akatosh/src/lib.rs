//! A discrete-event scheduling kernel.
//!
//! Akatosh advances a virtual clock over a dynamically changing population of
//! events and executes their actions in an order that respects, in this order
//! of precedence, event time, declared priority and explicit dependencies
//! between events. Optionally, virtual time can be paced against the wall
//! clock, with detection of events that miss their real-time deadline.
//!
//! It is meant as the substrate of higher-level modeling constructs such as
//! processes, entities or resources: these only need the current simulation
//! time and the ability to schedule, cancel and chain events, which is what
//! the kernel provides.
//!
//!
//! # A practical overview
//!
//! Running a simulation typically involves three steps:
//!
//! 1. the creation of a [`Simulation`](simulation::Simulation) and of its
//!    [`Scheduler`](simulation::Scheduler) handle with a
//!    [`SimInit`](simulation::SimInit) builder,
//! 2. the scheduling of initial events, each described by an
//!    [`Event`](event::Event),
//! 3. the execution of the simulation, which moves time forward from event to
//!    event until a time bound is reached or no active event remains.
//!
//! ## Events
//!
//! An event is created from its action, a closure called each time the event
//! fires. The action may take a [`&Scheduler`](simulation::Scheduler)
//! argument to interact with the simulation, and it may be asynchronous:
//!
//! ```
//! use akatosh::event::Event;
//! use akatosh::simulation::Scheduler;
//!
//! let hello = Event::new(|| println!("hello"));
//! let clock = Event::new(|scheduler: &Scheduler| println!("now is {}", scheduler.time()));
//! let later = Event::new(|| async { println!("hello from a future") });
//! ```
//!
//! The event description is then refined with builder methods:
//!
//! - [`priority()`](event::Event::priority): among events due at the same
//!   time, those with a lower priority value run first; the default priority
//!   is 0,
//! - [`after()`](event::Event::after): the event waits until all the listed
//!   precursor events have ended; it then becomes due at its scheduled time or
//!   at the current time, whichever is later,
//! - [`every()`](event::Event::every), optionally with
//!   [`till()`](event::Event::till) or
//!   [`for_duration()`](event::Event::for_duration): the event is continuous
//!   and fires again at the given interval until its end time,
//! - [`label()`](event::Event::label): a name used in logs and error reports.
//!
//! ## Scheduling
//!
//! Events are handed over to the simulation with
//! [`Scheduler::schedule()`](simulation::Scheduler::schedule), together with
//! a deadline that may be relative to the current time (a
//! [`Duration`](std::time::Duration)) or absolute (a
//! [`MonotonicTime`](time::MonotonicTime)). The returned
//! [`EventKey`](event::EventKey) can be used to name the event as the
//! precursor of other events, to cancel it or to query its state.
//!
//! ## Running simulations
//!
//! The following simulation fills a tank with a pump running every second for
//! 3 seconds, then closes a valve once the pump has stopped. An alarm with a
//! higher priority value is due at the same time as the last pump cycle, but
//! the valve runs before the alarm since it is activated by the pump:
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//!
//! use akatosh::event::Event;
//! use akatosh::simulation::SimInit;
//! use akatosh::time::MonotonicTime;
//!
//! let t0 = MonotonicTime::EPOCH;
//! let (mut simu, scheduler) = SimInit::new().init(t0).unwrap();
//! let journal = Arc::new(Mutex::new(Vec::new()));
//!
//! let pump = scheduler
//!     .schedule(Duration::ZERO, {
//!         let journal = journal.clone();
//!         Event::new(move || journal.lock().unwrap().push("pump"))
//!             .every(Duration::from_secs(1))
//!             .for_duration(Duration::from_secs(3))
//!             .label("pump")
//!     })
//!     .unwrap();
//!
//! scheduler
//!     .schedule(Duration::ZERO, {
//!         let journal = journal.clone();
//!         Event::new(move || journal.lock().unwrap().push("valve"))
//!             .after([pump])
//!             .priority(-1)
//!     })
//!     .unwrap();
//!
//! scheduler
//!     .schedule(Duration::from_secs(3), {
//!         let journal = journal.clone();
//!         Event::new(move || journal.lock().unwrap().push("alarm")).priority(5)
//!     })
//!     .unwrap();
//!
//! simu.run().unwrap();
//!
//! assert_eq!(simu.time(), t0 + Duration::from_secs(3));
//! assert_eq!(
//!     *journal.lock().unwrap(),
//!     ["pump", "pump", "pump", "pump", "valve", "alarm"]
//! );
//! ```
//!
//! Besides [`run()`](simulation::Simulation::run), a simulation can be
//! stepped one time step at a time with
//! [`step()`](simulation::Simulation::step) or up to a time bound with
//! [`run_until()`](simulation::Simulation::run_until).
//!
//! ## Real-time execution
//!
//! A simulation configured with
//! [`SimInit::set_realtime()`](simulation::SimInit::set_realtime) sleeps
//! before each time step so that simulation time keeps pace with the wall
//! clock. Events with a [`step()`](event::Event::step) are then subject to a
//! deadline: an event that starts late or runs for too long is stopped and its
//! [`watchdog()`](event::Event::watchdog) is called. See the
//! [`simulation`] module for details.
//!
//!
//! # Modules documentation
//!
//! * the [`event`] module describes event states and the signatures accepted
//!   as event actions,
//! * the [`simulation`] module discusses the execution order of events and
//!   real-time execution,
//! * the [`time`] module discusses the monotonic timestamp format used for
//!   simulations ([`time::MonotonicTime`]) and wall clocks,
//! * the [`tracing`] module explains how to stamp logs with the simulation
//!   time.
#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod event;
pub mod simulation;
pub mod time;
pub mod tracing;
pub(crate) mod util;
