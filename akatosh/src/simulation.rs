//! Discrete-event simulation management.
//!
//! This module contains most notably the [`Simulation`] environment, the
//! [`SimInit`] simulation builder, the [`Scheduler`] handle as well as
//! miscellaneous other types related to simulation management.
//!
//! # Simulation lifecycle
//!
//! The lifecycle of a simulation typically comprises the following stages:
//!
//! 1. instantiation of a [`SimInit`] simulation builder, optionally configured
//!    for real-time execution with [`SimInit::set_realtime()`] or
//!    [`SimInit::set_clock()`],
//! 2. initialization of a [`Simulation`] instance and of its [`Scheduler`]
//!    handle with [`SimInit::init()`],
//! 3. scheduling of the initial events with [`Scheduler::schedule()`],
//! 4. discrete-event simulation with [`Simulation::step()`],
//!    [`Simulation::run_until()`] or [`Simulation::run()`], during which
//!    actions may themselves schedule, cancel or (de)activate events.
//!
//! # Execution order
//!
//! At each time step, the kernel moves simulation time forward to that of the
//! earliest active event, then repeatedly pulls all due events that share the
//! lowest priority value and executes them as one batch:
//!
//! - the relative order of the actions of a batch is unspecified;
//!   asynchronous actions are polled jointly and may interleave at their
//!   suspension points,
//! - the effects of a batch on the event pools are settled only once the whole
//!   batch has run: followers are activated and continuous events are
//!   rescheduled after the last action of the batch has completed, but an
//!   event cancelled by a batch member before its own turn does not run,
//! - a follower activated by a batch joins the pool of due events, so it runs
//!   before any batch with a higher priority value, even if its own priority
//!   value is lower than that of its precursors.
//!
//! # Real-time execution
//!
//! When paced against a wall clock, the kernel sleeps before each time step
//! until the wall clock instant corresponding to that time. If the time scale
//! is 1, the timing of each firing of an event with a
//! [step](crate::event::Event::step) is checked after its batch: a firing that
//! started more than one step late, that ran for more than one step, or for
//! which both delays add up to more than one step, misses its deadline. The
//! violation is logged, the [watchdog](crate::event::Event::watchdog) of the
//! event is called with a [`DeadlineViolation`] report and the event is
//! cancelled. The simulation itself goes on.
//!
//! A simulation can be paused with [`Simulation::pause()`], in which case the
//! stepping methods return without processing events until
//! [`Simulation::resume()`] is called. A running simulation can also be paused
//! from another thread with a [`RealtimeHandle`]; the pause then takes effect
//! before the next batch and blocks the simulation until resumed. In both
//! cases, the time spent paused is not counted as lateness.
mod pacer;
mod registry;
mod resolver;
mod scheduler;
mod sim_init;

pub use pacer::{DeadlineViolation, RealtimeHandle};
pub use registry::PoolSizes;
pub use scheduler::{Scheduler, SchedulingError};
pub use sim_init::SimInit;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures_executor::block_on;
use futures_util::future::join_all;
use futures_util::FutureExt;
use thiserror::Error;
use tracing::{debug, error, trace};

use crate::event::{Action, Event, EventDiagnostic, EventInfo, EventKey};
use crate::time::{AutoSystemClock, Deadline, MonotonicTime};

use pacer::{Pacer, Timed};
use registry::{Batch, Registry};

/// Simulation environment.
///
/// A `Simulation` is created by calling
/// [`SimInit::init()`](crate::simulation::SimInit::init) on a simulation
/// builder, which also returns a [`Scheduler`] handle sharing the same event
/// registry.
///
/// A call to [`step()`](Simulation::step) will:
///
/// 1. increment simulation time until that of the next active event in
///    chronological order, then
/// 2. call [`Clock::synchronize()`](crate::time::Clock::synchronize) which,
///    unless the simulation is configured to run as fast as possible, blocks
///    until the desired wall clock time, and finally
/// 3. execute all events due at the new simulation time, batch by batch, in
///    increasing order of priority value.
///
/// The [`run_until()`](Simulation::run_until) and [`run()`](Simulation::run)
/// methods iterate until a time bound is exceeded or until no active event
/// remains. Simulation time is only ever moved to the time of an event, so it
/// is not advanced to the bound if no event is scheduled for that time.
///
/// An [`ExecutionError`] is fatal: the simulation should not be stepped any
/// further once it has been returned.
pub struct Simulation {
    registry: Arc<Mutex<Registry>>,
    scheduler: Scheduler,
    pacer: Pacer,
    realtime: RealtimeHandle,
    // Set by `pause()` and cleared by `resume()`.
    halted: bool,
}

impl Simulation {
    /// Creates a new `Simulation`.
    pub(crate) fn new(registry: Arc<Mutex<Registry>>, pacer: Pacer) -> Self {
        Self {
            scheduler: Scheduler::new(registry.clone()),
            registry,
            pacer,
            realtime: RealtimeHandle::new(),
            halted: false,
        }
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> MonotonicTime {
        self.registry().now()
    }

    /// Returns a handle to the event registry.
    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    /// Schedules an event at the specified deadline.
    ///
    /// See [`Scheduler::schedule()`].
    pub fn schedule(
        &self,
        deadline: impl Deadline,
        event: Event,
    ) -> Result<EventKey, SchedulingError> {
        self.scheduler.schedule(deadline, event)
    }

    /// Cancels an event.
    ///
    /// See [`Scheduler::cancel()`].
    pub fn cancel(&self, key: EventKey) -> Result<(), SchedulingError> {
        self.scheduler.cancel(key)
    }

    /// Returns a snapshot of an event.
    pub fn event_info(&self, key: EventKey) -> Result<EventInfo, SchedulingError> {
        self.scheduler.event_info(key)
    }

    /// Returns the number of events in each pool.
    pub fn pool_sizes(&self) -> PoolSizes {
        self.registry().pool_sizes()
    }

    /// Discards ended and cancelled events that no pending event waits for,
    /// returning their number.
    ///
    /// The keys of discarded events become invalid: using them results in a
    /// [`SchedulingError::UnknownEvent`] error.
    pub fn purge_past(&mut self) -> usize {
        self.registry().purge_past()
    }

    /// Advances simulation time to that of the next active event, processing
    /// that event as well as all other events due at the same time.
    ///
    /// Events already due at the current time, such as events scheduled for
    /// the start time, are processed first without advancing time. This method
    /// returns immediately if no active event remains.
    pub fn step(&mut self) -> Result<(), ExecutionError> {
        self.step_bounded(MonotonicTime::MAX).map(|_| ())
    }

    /// Iteratively advances simulation time and processes all events due up to
    /// the specified deadline, as if by calling [`Simulation::step()`]
    /// repeatedly.
    ///
    /// An error is returned if the deadline lies before the current time. A
    /// deadline beyond [`MonotonicTime::MAX`] is treated as `MonotonicTime::MAX`.
    pub fn run_until(&mut self, deadline: impl Deadline) -> Result<(), ExecutionError> {
        let now = self.time();
        let target = deadline.into_time(now).unwrap_or(MonotonicTime::MAX);
        if target < now {
            let err = ExecutionError::InvalidAdvance { now, target };
            error!(%err, "invalid simulation bound");

            return Err(err);
        }

        while self.step_bounded(target)?.is_some() {}

        Ok(())
    }

    /// Processes events until no active event remains.
    ///
    /// Continuous events without an end time never stop by themselves, in
    /// which case this method does not return unless they are cancelled.
    pub fn run(&mut self) -> Result<(), ExecutionError> {
        while self.step_bounded(MonotonicTime::MAX)?.is_some() {}

        let stranded = self.registry().stranded();
        if stranded != 0 && !self.halted {
            debug!(
                count = stranded,
                "simulation exhausted with inactive events left"
            );
        }

        Ok(())
    }

    /// Paces the simulation against the system clock from now on.
    ///
    /// See [`SimInit::set_realtime()`].
    pub fn enable_realtime(&mut self, time_scale: f64) -> Result<(), ExecutionError> {
        let time_scale = sim_init::valid_time_scale(time_scale).inspect_err(|err| {
            error!(%err, "real-time mode not enabled");
        })?;
        self.pacer
            .set_clock(Box::new(AutoSystemClock::with_time_scale(time_scale)));
        debug!(time_scale, "real-time mode enabled");

        Ok(())
    }

    /// Pauses the simulation.
    ///
    /// Until [`resume()`](Simulation::resume) is called, the stepping methods
    /// return immediately without processing any event. The time spent paused
    /// is not counted as lateness in real-time mode.
    ///
    /// To pause a running simulation from another thread, or from an action,
    /// use a [`RealtimeHandle`] instead: the stepping methods then block until
    /// the handle resumes the simulation.
    pub fn pause(&mut self) {
        self.halted = true;
        self.realtime.pause();
        debug!("simulation paused");
    }

    /// Resumes a simulation paused with [`pause()`](Simulation::pause) or
    /// with a [`RealtimeHandle`].
    pub fn resume(&mut self) {
        self.halted = false;
        self.realtime.resume();
    }

    /// Returns `true` if the simulation is paused.
    pub fn is_paused(&self) -> bool {
        self.halted || self.realtime.is_paused()
    }

    /// Returns a handle that can pause and resume the simulation from other
    /// threads.
    pub fn realtime_handle(&self) -> RealtimeHandle {
        self.realtime.clone()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap()
    }

    /// Processes the next time step if it does not lie beyond the bound, and
    /// returns its time.
    fn step_bounded(
        &mut self,
        till: MonotonicTime,
    ) -> Result<Option<MonotonicTime>, ExecutionError> {
        self.process_next(till).inspect_err(|err| {
            error!(%err, "simulation aborted");
        })
    }

    fn process_next(
        &mut self,
        till: MonotonicTime,
    ) -> Result<Option<MonotonicTime>, ExecutionError> {
        if self.halted {
            return Ok(None);
        }
        self.wait_while_paused();

        let time = loop {
            let target = {
                let registry = self.registry();
                if registry.has_ready() {
                    registry.now()
                } else {
                    match registry.next_time() {
                        Some(time) if time <= till => time,
                        _ => return Ok(None),
                    }
                }
            };

            self.pacer.synchronize(target);

            // Events may have been scheduled from another thread meanwhile.
            let mut registry = self.registry();
            if registry.now() != target {
                if registry.has_ready() || registry.next_time() != Some(target) {
                    continue;
                }
                registry.advance_to(target)?;
            }
            registry.drain_due()?;

            break target;
        };

        let _guard = crate::tracing::enter_actions(time);
        loop {
            self.wait_while_paused();
            let Some(batch) = self.registry().pull_batch() else {
                break;
            };
            self.execute_batch(batch)?;
        }

        Ok(Some(time))
    }

    /// Executes a batch of events, then settles its members.
    fn execute_batch(&mut self, batch: Batch) -> Result<(), ExecutionError> {
        let mut outcomes = Vec::with_capacity(batch.keys.len());
        let mut firings = Vec::with_capacity(batch.keys.len());
        let mut pending = Vec::new();

        for &key in &batch.keys {
            // Earlier members may have cancelled or deactivated this one.
            let action = self.registry().begin_firing(key);
            let Some(mut action) = action else {
                outcomes.push((key, false));
                continue;
            };
            trace!(event = %key, priority = batch.priority, "firing event");
            outcomes.push((key, true));

            let started = Instant::now();
            match &mut action {
                Action::Sync(func) => {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| func(&self.scheduler)));
                    let execution = started.elapsed();
                    self.registry().restore_action(key, action);
                    if let Err(payload) = result {
                        return Err(self.panic_error(key, payload));
                    }
                    firings.push(Firing {
                        key,
                        started,
                        execution,
                    });
                }
                Action::Async(func) => {
                    let result =
                        panic::catch_unwind(AssertUnwindSafe(|| func(self.scheduler.clone())));
                    self.registry().restore_action(key, action);
                    match result {
                        Ok(fut) => pending.push((
                            key,
                            started,
                            AssertUnwindSafe(Timed::new(fut)).catch_unwind(),
                        )),
                        Err(payload) => return Err(self.panic_error(key, payload)),
                    }
                }
            }
        }

        if !pending.is_empty() {
            let (headers, futures): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .map(|(key, started, fut)| ((key, started), fut))
                .unzip();
            let results = block_on(join_all(futures));
            for ((key, started), result) in headers.into_iter().zip(results) {
                match result {
                    Ok(execution) => firings.push(Firing {
                        key,
                        started,
                        execution,
                    }),
                    Err(payload) => return Err(self.panic_error(key, payload)),
                }
            }
        }

        if self.pacer.enforces_deadlines() {
            for firing in &firings {
                self.check_deadline(firing)?;
            }
        }

        for (key, fired) in outcomes {
            self.registry().complete(key, fired)?;
        }

        Ok(())
    }

    /// Stops an event that missed its deadline and calls its watchdog.
    fn check_deadline(&mut self, firing: &Firing) -> Result<(), ExecutionError> {
        let (event, step) = {
            let registry = self.registry();
            match registry.get(firing.key) {
                Ok(entry) if !entry.state.is_terminal() => {
                    (entry.diagnostic(firing.key), entry.step)
                }
                _ => return Ok(()),
            }
        };
        let Some(step) = step else {
            return Ok(());
        };
        let Some(violation) = self
            .pacer
            .check(&event, step, firing.started, firing.execution)
        else {
            return Ok(());
        };

        error!(%violation, "deadline violation");
        let watchdog = {
            let mut registry = self.registry();
            let watchdog = registry.take_watchdog(firing.key);
            registry.retire(firing.key);
            watchdog
        };
        if let Some(mut watchdog) = watchdog {
            panic::catch_unwind(AssertUnwindSafe(|| watchdog(&violation)))
                .map_err(|payload| self.panic_error(firing.key, payload))?;
        }

        Ok(())
    }

    /// Applies to the wall clock the time spent paused, blocking first if the
    /// simulation is currently paused.
    fn wait_while_paused(&mut self) {
        let shift = self.realtime.wait_while_paused();
        if shift > Duration::ZERO {
            debug!(shift = ?shift, "simulation resumed");
            self.pacer.shift(shift);
        }
    }

    fn panic_error(&self, key: EventKey, payload: Box<dyn Any + Send>) -> ExecutionError {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            message.to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            String::from("unknown panic payload")
        };

        match self.registry().get(key) {
            Ok(entry) => ExecutionError::Panic {
                event: entry.diagnostic(key),
                message,
            },
            Err(err) => err.into(),
        }
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("time", &self.time())
            .field("pacer", &self.pacer)
            .field("realtime", &self.realtime)
            .finish_non_exhaustive()
    }
}

/// Wall clock timing of an event firing.
struct Firing {
    key: EventKey,
    started: Instant,
    execution: Duration,
}

/// Error returned when the simulation cannot proceed.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum ExecutionError {
    /// The event registry was found in an inconsistent state.
    #[error("inconsistent state of {event}: {reason}")]
    Consistency {
        /// The offending event.
        event: EventDiagnostic,
        /// Description of the inconsistency.
        reason: String,
    },
    /// Simulation time cannot be moved to the requested time.
    #[error("cannot move simulation time from {now:.9} to {target:.9}")]
    InvalidAdvance {
        /// Current simulation time.
        now: MonotonicTime,
        /// Requested time.
        target: MonotonicTime,
    },
    /// The action or the watchdog of an event panicked.
    #[error("{event} panicked: {message}")]
    Panic {
        /// The event whose callback panicked.
        event: EventDiagnostic,
        /// The panic message, if any.
        message: String,
    },
    /// The time scale is not strictly positive and finite.
    #[error("invalid time scale {0}: the time scale should be strictly positive and finite")]
    InvalidTimeScale(f64),
    /// An event transition requested by the kernel failed.
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
}
