//! Support for structured logging.
//!
//! # Overview
//!
//! The kernel reports its activity with the [`tracing`] crate under the
//! `akatosh` target:
//!
//! - `error`: deadline violations in real-time mode and fatal consistency
//!   errors,
//! - `warn`: loss of synchronization with the wall clock,
//! - `debug`: event state transitions and expected runtime conditions, such as
//!   a follower that passed its due time,
//! - `trace`: each event firing.
//!
//! Actions may of course log with the `tracing` macros as well. The
//! [`tracing_subscriber::fmt`][mod@tracing_subscriber::fmt] subscriber stamps
//! log lines with the wall clock time by default, which is rarely what is
//! wanted for a simulation. This module therefore provides a custom
//! [`SimulationTime`] timer that stamps events emitted while actions run with
//! the simulation time.
//!
//! # Configuration
//!
//! ```
//! use akatosh::tracing::SimulationTime;
//!
//! tracing_subscriber::fmt()
//!     .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
//!     .with_timer(SimulationTime::with_system_timer())
//!     .init();
//! ```
//!
//! This timer reverts to system time stamping for events emitted outside of
//! actions, e.g.:
//!
//! ```text
//! [1970-01-01 00:00:03.000000000]  WARN my_simulation: tank is empty
//! 2024-09-10T14:39:24.670921Z  INFO my_simulation: simulation complete
//! ```
//!
//! Alternatively, `SimulationTime::with_system_timer_always()` prepends the
//! system time to all events, including those emitted from actions:
//!
//! ```text
//! 2024-09-10T14:39:22.124945Z [1970-01-01 00:00:03.000000000]  WARN my_simulation: tank is empty
//! 2024-09-10T14:39:24.670921Z  INFO my_simulation: simulation complete
//! ```
//!
//! # Event filtering examples
//!
//! Filtering with the `RUST_LOG` environment variable requires the
//! `env-filter` feature of the [`tracing-subscriber`][tracing_subscriber]
//! crate. To see state transitions of the kernel but only warnings from
//! everything else:
//!
//! ```text
//! $ RUST_LOG="warn,akatosh=debug" cargo run --release my_simulation
//! ```

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};

use crate::time::MonotonicTime;

thread_local! {
    static ACTION_TIME: Cell<Option<MonotonicTime>> = const { Cell::new(None) };
}

/// Marks the current thread as executing actions at the specified time until
/// the guard is dropped.
pub(crate) fn enter_actions(time: MonotonicTime) -> ActionTimeGuard {
    let previous = ACTION_TIME.with(|cell| cell.replace(Some(time)));

    ActionTimeGuard {
        previous,
        _not_send: PhantomData,
    }
}

/// Restores the previous action time on drop.
#[derive(Debug)]
pub(crate) struct ActionTimeGuard {
    previous: Option<MonotonicTime>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ActionTimeGuard {
    fn drop(&mut self) {
        ACTION_TIME.with(|cell| cell.set(self.previous));
    }
}

/// A timer that can be used in conjunction with the
/// [`tracing-subscriber`][tracing_subscriber] crate to log events using the
/// simulation time instead of (or on top of) the wall clock time.
///
/// See the [module-level documentation][crate::tracing] for more details.
#[derive(Default, Debug)]
pub struct SimulationTime<const VERBOSE: bool, T> {
    sys_timer: T,
}

impl SimulationTime<false, SystemTime> {
    /// Constructs a new simulation timer which falls back to the [`SystemTime`]
    /// timer for events emitted outside of actions.
    pub fn with_system_timer() -> Self {
        Self::default()
    }
}

impl SimulationTime<true, SystemTime> {
    /// Constructs a new simulation timer which prepends a [`SystemTime`]
    /// timestamp to all tracing events, as well as a simulation timestamp for
    /// events emitted from actions.
    pub fn with_system_timer_always() -> Self {
        Self::default()
    }
}

impl<T: FormatTime> SimulationTime<false, T> {
    /// Constructs a new simulation timer which falls back to the provided
    /// timer for events emitted outside of actions.
    pub fn with_custom_timer(sys_timer: T) -> Self {
        Self { sys_timer }
    }
}

impl<T: FormatTime> SimulationTime<true, T> {
    /// Constructs a new simulation timer which prepends a timestamp generated
    /// with the provided timer to all tracing events, as well as a simulation
    /// timestamp for events emitted from actions.
    pub fn with_custom_timer_always(sys_timer: T) -> Self {
        Self { sys_timer }
    }
}

impl<const VERBOSE: bool, T: FormatTime> FormatTime for SimulationTime<VERBOSE, T> {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        match ACTION_TIME.with(Cell::get) {
            Some(time) => {
                if VERBOSE {
                    self.sys_timer.format_time(w)?;
                    w.write_char(' ')?;
                }
                write!(w, "[{:.9}]", time)
            }
            None => self.sys_timer.format_time(w),
        }
    }
}
