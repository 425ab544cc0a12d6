//! Simulation time and wall clocks.
//!
//! This module provides most notably:
//!
//! * [`MonotonicTime`]: a monotonic timestamp based on the [TAI] time standard,
//!   used as the virtual time of the simulation,
//! * [`Deadline`]: a trait for types that can be turned into an absolute
//!   simulation time, implemented by [`MonotonicTime`] itself (absolute time)
//!   and by [`Duration`] (time relative to the current simulation time),
//! * [`Clock`]: a trait for types that can pace a simulation against the wall
//!   clock, implemented for instance by [`SystemClock`] and
//!   [`AutoSystemClock`].
//!
//! [TAI]: https://en.wikipedia.org/wiki/International_Atomic_Time
//!
//!
//! # Examples
//!
//! An event that re-schedules itself one second later, once:
//!
//! ```
//! use std::time::Duration;
//!
//! use akatosh::event::Event;
//! use akatosh::simulation::{Scheduler, SimInit};
//! use akatosh::time::MonotonicTime;
//!
//! let (mut simu, scheduler) = SimInit::new().init(MonotonicTime::EPOCH).unwrap();
//!
//! scheduler
//!     .schedule(
//!         Duration::from_secs(1),
//!         Event::new(|scheduler: &Scheduler| {
//!             let again = Event::new(|| {}).label("again");
//!             scheduler.schedule(Duration::from_secs(1), again).unwrap();
//!         }),
//!     )
//!     .unwrap();
//!
//! simu.run().unwrap();
//! assert_eq!(simu.time(), MonotonicTime::EPOCH + Duration::from_secs(2));
//! ```

mod clock;

use std::time::Duration;

pub use tai_time::MonotonicTime;

pub use clock::{AutoSystemClock, Clock, NoClock, SyncStatus, SystemClock};

/// A type that can be converted to an absolute simulation time.
pub trait Deadline {
    /// Make this deadline into an absolute timestamp, using the provided
    /// current time as a reference.
    ///
    /// Returns `None` if the timestamp is out of the range of
    /// [`MonotonicTime`].
    fn into_time(self, now: MonotonicTime) -> Option<MonotonicTime>;
}

impl Deadline for Duration {
    #[inline(always)]
    fn into_time(self, now: MonotonicTime) -> Option<MonotonicTime> {
        now.checked_add(self)
    }
}

impl Deadline for MonotonicTime {
    #[inline(always)]
    fn into_time(self, _: MonotonicTime) -> Option<MonotonicTime> {
        Some(self)
    }
}
