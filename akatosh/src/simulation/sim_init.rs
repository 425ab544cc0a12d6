use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::time::{AutoSystemClock, Clock, MonotonicTime, NoClock};

use super::pacer::Pacer;
use super::registry::Registry;
use super::{ExecutionError, Scheduler, Simulation};

/// Builder for a discrete-event simulation.
pub struct SimInit {
    clock: Box<dyn Clock + 'static>,
    time_scale: Option<f64>,
    clock_tolerance: Duration,
}

impl SimInit {
    /// Creates a builder for a simulation running as fast as possible.
    pub fn new() -> Self {
        Self {
            clock: Box::new(NoClock::new()),
            time_scale: None,
            clock_tolerance: Duration::ZERO,
        }
    }

    /// Synchronize the simulation with the provided [`Clock`].
    ///
    /// If the clock isn't explicitly set then the default [`NoClock`] is used,
    /// resulting in the simulation running as fast as possible.
    pub fn set_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self.time_scale = None;

        self
    }

    /// Paces the simulation against the system clock.
    ///
    /// One second of simulation time lasts `1 / time_scale` seconds of wall
    /// clock time. The wall clock reference is taken when the first events are
    /// processed. Deadlines of events with a [step](crate::event::Event::step)
    /// are only enforced with a time scale of 1.
    ///
    /// This overrides any clock set with [`set_clock()`](Self::set_clock). The
    /// time scale is validated by [`init()`](Self::init).
    pub fn set_realtime(mut self, time_scale: f64) -> Self {
        self.time_scale = Some(time_scale);

        self
    }

    /// Sets the lag behind the wall clock beyond which a warning is logged.
    ///
    /// The tolerance defaults to zero, meaning that any lag is reported.
    pub fn set_clock_tolerance(mut self, tolerance: Duration) -> Self {
        self.clock_tolerance = tolerance;

        self
    }

    /// Builds a simulation initialized at the specified simulation time.
    ///
    /// The simulation is returned together with a [`Scheduler`] handle that
    /// can be used to schedule the initial events.
    pub fn init(
        self,
        start_time: MonotonicTime,
    ) -> Result<(Simulation, Scheduler), ExecutionError> {
        let clock: Box<dyn Clock> = match self.time_scale {
            Some(time_scale) => Box::new(AutoSystemClock::with_time_scale(
                valid_time_scale(time_scale)?,
            )),
            None => self.clock,
        };
        debug!(
            start_time = %format_args!("{:.9}", start_time),
            time_scale = ?clock.time_scale(),
            "simulation initialized"
        );

        let registry = Arc::new(Mutex::new(Registry::new(start_time)));
        let scheduler = Scheduler::new(registry.clone());
        let pacer = Pacer::new(clock, self.clock_tolerance);

        Ok((Simulation::new(registry, pacer), scheduler))
    }
}

impl Default for SimInit {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SimInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimInit")
            .field("time_scale", &self.time_scale)
            .field("clock_tolerance", &self.clock_tolerance)
            .finish_non_exhaustive()
    }
}

/// Checks that a time scale is strictly positive and finite.
pub(super) fn valid_time_scale(time_scale: f64) -> Result<f64, ExecutionError> {
    if time_scale.is_finite() && time_scale > 0.0 {
        Ok(time_scale)
    } else {
        Err(ExecutionError::InvalidTimeScale(time_scale))
    }
}
