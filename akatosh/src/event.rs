//! Events, event keys and event states.
//!
//! An [`Event`] describes what should happen and under which ordering
//! constraints: its action, its priority, the precursor events it must wait
//! for and, for continuous events, the interval at which it fires again. The
//! time at which it becomes eligible is provided separately when the event is
//! handed over to a [`Scheduler`](crate::simulation::Scheduler), which returns
//! an [`EventKey`].
//!
//! # Examples
//!
//! An event that fires at t=0, 1, 2 and 3, and another one that waits for the
//! first to end:
//!
//! ```
//! use std::time::Duration;
//!
//! use akatosh::event::Event;
//! use akatosh::simulation::SimInit;
//! use akatosh::time::MonotonicTime;
//!
//! let (mut simu, scheduler) = SimInit::new().init(MonotonicTime::EPOCH).unwrap();
//!
//! let ticker = scheduler
//!     .schedule(
//!         Duration::ZERO,
//!         Event::new(|| println!("tick"))
//!             .every(Duration::from_secs(1))
//!             .for_duration(Duration::from_secs(3))
//!             .label("ticker"),
//!     )
//!     .unwrap();
//!
//! scheduler
//!     .schedule(Duration::ZERO, Event::new(|| println!("done")).after([ticker]))
//!     .unwrap();
//!
//! simu.run().unwrap();
//! ```

mod action;
pub mod markers;

use std::fmt;
use std::time::Duration;

pub use action::{Action, ActionFn};

use crate::simulation::DeadlineViolation;
use crate::time::MonotonicTime;

/// A unique handle to an event owned by a simulation.
///
/// Keys remain valid for the whole lifetime of the event, including after it
/// has ended or was cancelled, until it is discarded with
/// [`Simulation::purge_past()`](crate::simulation::Simulation::purge_past).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EventKey {
    // The unique, monotonically increasing creation epoch.
    epoch: u64,
    // An index pointing to the event in the arena.
    slot: usize,
}

impl EventKey {
    pub(crate) fn new(slot: usize, epoch: u64) -> Self {
        Self { epoch, slot }
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns the unique identifier of the event.
    ///
    /// Identifiers are allocated in creation order.
    pub fn id(&self) -> u64 {
        self.epoch
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.epoch)
    }
}

/// The state of an event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum EventState {
    /// The event waits for its precursors or was deactivated.
    Inactive,
    /// The event fires once its time is due.
    Active,
    /// The event was cancelled or stopped; this state is terminal.
    Cancelled,
    /// The event has run to completion; this state is terminal.
    Ended,
}

impl EventState {
    /// Returns `true` for the `Cancelled` and `Ended` states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Ended)
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Ended => "ended",
        };

        f.write_str(name)
    }
}

/// The pool an event belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Pool {
    /// Not due yet, or waiting for precursors.
    Future,
    /// Due at the current simulation time and awaiting execution.
    Ready,
    /// Ended or cancelled.
    Past,
}

/// A state transition requested on an event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Inactive to active.
    Activate,
    /// Active to inactive.
    Deactivate,
    /// Any non-terminal state to cancelled.
    Cancel,
    /// Active to ended, after execution.
    End,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
            Self::Cancel => "cancel",
            Self::End => "end",
        };

        f.write_str(name)
    }
}

/// Identification of an event in error reports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventDiagnostic {
    /// Key of the event.
    pub key: EventKey,
    /// Label of the event, if any.
    pub label: Option<String>,
    /// Time at which the event is, or was, due.
    pub at: MonotonicTime,
    /// Priority of the event.
    pub priority: i32,
}

impl fmt::Display for EventDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event {}", self.key)?;
        if let Some(label) = &self.label {
            write!(f, " '{}'", label)?;
        }
        write!(f, " at {:.9} with priority {}", self.at, self.priority)
    }
}

/// A snapshot of an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventInfo {
    /// Key of the event.
    pub key: EventKey,
    /// Label of the event, if any.
    pub label: Option<String>,
    /// Time at which the event is, or was, due.
    pub at: MonotonicTime,
    /// Priority of the event.
    pub priority: i32,
    /// Current state.
    pub state: EventState,
    /// Current pool.
    pub pool: Pool,
    /// Events that must end before this event becomes active.
    pub precursors: Vec<EventKey>,
    /// Events waiting for this event to end.
    pub followers: Vec<EventKey>,
}

/// End condition of a continuous event.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum RepetitionEnd {
    Never,
    Till(MonotonicTime),
    After(Duration),
}

pub(crate) type Watchdog = Box<dyn FnMut(&DeadlineViolation) + Send>;

/// The description of an event to be scheduled.
///
/// An `Event` is created from its action and refined with builder methods
/// before being handed over to
/// [`Scheduler::schedule()`](crate::simulation::Scheduler::schedule).
pub struct Event {
    pub(crate) action: Action,
    pub(crate) label: Option<String>,
    pub(crate) priority: i32,
    pub(crate) precursors: Vec<EventKey>,
    pub(crate) interval: Option<Duration>,
    pub(crate) end: RepetitionEnd,
    pub(crate) step: Option<Duration>,
    pub(crate) watchdog: Option<Watchdog>,
}

impl Event {
    /// Creates a one-shot event with priority 0 and no precursor.
    pub fn new<F, S>(action: F) -> Self
    where
        F: ActionFn<S>,
    {
        Self {
            action: action.into_action(),
            label: None,
            priority: 0,
            precursors: Vec::new(),
            interval: None,
            end: RepetitionEnd::Never,
            step: None,
            watchdog: None,
        }
    }

    /// Sets a diagnostic label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the priority; lower values fire earlier at equal times.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Adds precursors that must have ended before this event becomes active.
    pub fn after(mut self, precursors: impl IntoIterator<Item = EventKey>) -> Self {
        self.precursors.extend(precursors);
        self
    }

    /// Makes the event continuous, firing again `interval` after each firing.
    ///
    /// Unless an end is set with [`till()`](Self::till) or
    /// [`for_duration()`](Self::for_duration), the event fires until it is
    /// cancelled.
    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Sets the last time at which a continuous event may fire.
    pub fn till(mut self, till: MonotonicTime) -> Self {
        self.end = RepetitionEnd::Till(till);
        self
    }

    /// Sets the duration, counted from the scheduled time, during which a
    /// continuous event may fire.
    pub fn for_duration(mut self, duration: Duration) -> Self {
        self.end = RepetitionEnd::After(duration);
        self
    }

    /// Sets the wall clock cadence enforced in real-time mode.
    ///
    /// A firing that starts late or runs for longer than `step` is a deadline
    /// violation and stops the event.
    pub fn step(mut self, step: Duration) -> Self {
        self.step = Some(step);
        self
    }

    /// Sets a callback invoked on deadline violation in real-time mode.
    pub fn watchdog<W>(mut self, watchdog: W) -> Self
    where
        W: FnMut(&DeadlineViolation) + Send + 'static,
    {
        self.watchdog = Some(Box::new(watchdog));
        self
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("label", &self.label)
            .field("priority", &self.priority)
            .field("precursors", &self.precursors)
            .field("interval", &self.interval)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}
