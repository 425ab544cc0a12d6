use std::time::{Duration, Instant};

use crate::time::MonotonicTime;

/// A type that can be used to pace a simulation against the wall clock.
///
/// This trait abstracts over different types of clocks, such as
/// as-fast-as-possible and real-time clocks.
///
/// A clock can be associated to a simulation prior to initialization by calling
/// [`SimInit::set_clock()`](crate::simulation::SimInit::set_clock).
pub trait Clock: Send {
    /// Blocks until the deadline.
    fn synchronize(&mut self, deadline: MonotonicTime) -> SyncStatus;

    /// Returns the wall clock instant matched to the specified simulation
    /// time, or `None` if this clock is not synchronized to the wall clock.
    fn wall_instant(&self, _time: MonotonicTime) -> Option<Instant> {
        None
    }

    /// Returns the number of simulated seconds elapsing per wall clock second,
    /// or `None` if this clock is not synchronized to the wall clock.
    fn time_scale(&self) -> Option<f64> {
        None
    }

    /// Moves the wall clock reference forward by the specified duration.
    ///
    /// This is used to discount the time spent while a simulation was paused.
    fn shift(&mut self, _offset: Duration) {}
}

/// The current synchronization status of a clock.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    /// The clock is synchronized.
    Synchronized,
    /// The deadline has already elapsed and lags behind the current clock time
    /// by the duration given in the payload.
    OutOfSync(Duration),
}

/// A dummy [`Clock`] that ignores synchronization.
///
/// Choosing this clock effectively makes the simulation run as fast as
/// possible.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoClock {}

impl NoClock {
    /// Constructs a new `NoClock` object.
    pub fn new() -> Self {
        Self {}
    }
}

impl Clock for NoClock {
    /// Returns immediately with status `SyncStatus::Synchronized`.
    fn synchronize(&mut self, _: MonotonicTime) -> SyncStatus {
        SyncStatus::Synchronized
    }
}

/// A real-time [`Clock`] based on the system's monotonic clock.
///
/// This clock maps a simulation reference time onto a wall clock [`Instant`]
/// and lets simulation time flow `time_scale` times faster than wall clock
/// time.
#[derive(Copy, Clone, Debug)]
pub struct SystemClock {
    simulation_ref: MonotonicTime,
    wall_clock_ref: Instant,
    time_scale: f64,
}

impl SystemClock {
    /// Constructs a `SystemClock` with an offset between simulation clock and
    /// wall clock specified by a simulation time matched to an [`Instant`]
    /// timestamp.
    ///
    /// The provided reference time may lie in the past or in the future.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::{Duration, Instant};
    ///
    /// use akatosh::simulation::SimInit;
    /// use akatosh::time::{MonotonicTime, SystemClock};
    ///
    /// let t0 = MonotonicTime::new(1_234_567_890, 0).unwrap();
    ///
    /// // Make the simulation start in 1s.
    /// let clock = SystemClock::from_instant(t0, Instant::now() + Duration::from_secs(1));
    ///
    /// let (simu, scheduler) = SimInit::new().set_clock(clock).init(t0).unwrap();
    /// ```
    pub fn from_instant(simulation_ref: MonotonicTime, wall_clock_ref: Instant) -> Self {
        Self {
            simulation_ref,
            wall_clock_ref,
            time_scale: 1.0,
        }
    }

    /// Returns a clock with the same references but the specified time scale.
    ///
    /// # Panics
    ///
    /// This method panics if the time scale is not a strictly positive, finite
    /// number.
    pub fn with_time_scale(self, time_scale: f64) -> Self {
        assert!(
            time_scale.is_finite() && time_scale > 0.0,
            "the time scale should be strictly positive and finite"
        );

        Self { time_scale, ..self }
    }

    /// Converts a simulation time span to a wall clock span.
    fn wall_offset(&self, span: Duration) -> Option<Duration> {
        Duration::try_from_secs_f64(span.as_secs_f64() / self.time_scale).ok()
    }
}

impl Clock for SystemClock {
    /// Blocks until the system time corresponds to the specified simulation
    /// time.
    fn synchronize(&mut self, deadline: MonotonicTime) -> SyncStatus {
        let now = Instant::now();
        let Some(target) = self.wall_instant(deadline) else {
            // The deadline cannot be mapped to a wall clock instant.
            return SyncStatus::OutOfSync(now.saturating_duration_since(self.wall_clock_ref));
        };
        if now <= target {
            spin_sleep::sleep(target - now);

            return SyncStatus::Synchronized;
        }

        SyncStatus::OutOfSync(now - target)
    }

    /// Returns `None` if the instant cannot be represented.
    fn wall_instant(&self, time: MonotonicTime) -> Option<Instant> {
        if time >= self.simulation_ref {
            let offset = self.wall_offset(time.duration_since(self.simulation_ref))?;
            self.wall_clock_ref.checked_add(offset)
        } else {
            let offset = self.wall_offset(self.simulation_ref.duration_since(time))?;
            Some(
                self.wall_clock_ref
                    .checked_sub(offset)
                    .unwrap_or(self.wall_clock_ref),
            )
        }
    }

    fn time_scale(&self) -> Option<f64> {
        Some(self.time_scale)
    }

    fn shift(&mut self, offset: Duration) {
        if let Some(wall_clock_ref) = self.wall_clock_ref.checked_add(offset) {
            self.wall_clock_ref = wall_clock_ref;
        }
    }
}

/// An automatically initialized real-time [`Clock`] based on the system's
/// monotonic clock.
///
/// This clock is similar to [`SystemClock`] except that the first call to
/// [`synchronize()`](Clock::synchronize) never blocks and implicitly defines
/// the reference time. In other words, the clock starts running on its first
/// invocation.
#[derive(Copy, Clone, Debug)]
pub struct AutoSystemClock {
    inner: Option<SystemClock>,
    time_scale: f64,
}

impl AutoSystemClock {
    /// Constructs a new `AutoSystemClock` running at wall clock pace.
    pub fn new() -> Self {
        Self {
            inner: None,
            time_scale: 1.0,
        }
    }

    /// Constructs a new `AutoSystemClock` with the specified time scale.
    ///
    /// # Panics
    ///
    /// This method panics if the time scale is not a strictly positive, finite
    /// number.
    pub fn with_time_scale(time_scale: f64) -> Self {
        assert!(
            time_scale.is_finite() && time_scale > 0.0,
            "the time scale should be strictly positive and finite"
        );

        Self {
            inner: None,
            time_scale,
        }
    }
}

impl Default for AutoSystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for AutoSystemClock {
    /// Initializes the time reference and returns immediately on the first
    /// call, otherwise blocks until the system time corresponds to the
    /// specified simulation time.
    fn synchronize(&mut self, deadline: MonotonicTime) -> SyncStatus {
        match &mut self.inner {
            None => {
                let now = Instant::now();
                self.inner =
                    Some(SystemClock::from_instant(deadline, now).with_time_scale(self.time_scale));

                SyncStatus::Synchronized
            }
            Some(clock) => clock.synchronize(deadline),
        }
    }

    fn wall_instant(&self, time: MonotonicTime) -> Option<Instant> {
        self.inner.as_ref().and_then(|clock| clock.wall_instant(time))
    }

    fn time_scale(&self) -> Option<f64> {
        Some(self.time_scale)
    }

    fn shift(&mut self, offset: Duration) {
        if let Some(clock) = &mut self.inner {
            clock.shift(offset);
        }
    }
}
