//! Scheduling functions and types.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::event::{
    ActionFn, Event, EventDiagnostic, EventInfo, EventKey, EventState, Transition,
};
use crate::time::{Deadline, MonotonicTime};

use super::registry::Registry;

/// A handle to the event registry of a simulation.
///
/// A `Scheduler` is returned by
/// [`SimInit::init()`](crate::simulation::SimInit::init) and is passed to
/// actions that request it. It can be cloned and sent to other threads, but
/// all clones refer to the same simulation.
///
/// The registry is never locked while an action runs, so actions are free to
/// schedule, cancel or (de)activate events, including themselves.
#[derive(Clone)]
pub struct Scheduler {
    registry: Arc<Mutex<Registry>>,
}

impl Scheduler {
    pub(crate) fn new(registry: Arc<Mutex<Registry>>) -> Self {
        Self { registry }
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap()
    }

    /// Returns the current simulation time.
    ///
    /// # Examples
    ///
    /// ```
    /// use akatosh::simulation::Scheduler;
    /// use akatosh::time::MonotonicTime;
    ///
    /// fn is_third_millenium(scheduler: &Scheduler) -> bool {
    ///     let time = scheduler.time();
    ///     time >= MonotonicTime::new(978307200, 0).unwrap()
    ///         && time < MonotonicTime::new(32535216000, 0).unwrap()
    /// }
    /// ```
    pub fn time(&self) -> MonotonicTime {
        self.registry().now()
    }

    /// Schedules an event at the specified deadline.
    ///
    /// The deadline may be relative to the current time (a [`Duration`]) or
    /// absolute (a [`MonotonicTime`]). An event scheduled for the current time
    /// is executed within the current time step; if it has a lower or equal
    /// priority than the batch being executed, it runs right after that batch.
    ///
    /// An error is returned if the deadline lies in the past or beyond
    /// [`MonotonicTime::MAX`], if one of the precursors is unknown or if a
    /// continuous event has a null interval.
    ///
    /// The end time of a continuous event given as a duration saturates at
    /// [`MonotonicTime::MAX`], so `for_duration(Duration::MAX)` never ends by
    /// itself.
    ///
    /// [`Duration`]: std::time::Duration
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use akatosh::event::Event;
    /// use akatosh::simulation::Scheduler;
    ///
    /// // Fires an alarm 10 seconds from now, after the alarm is armed.
    /// fn arm_alarm(scheduler: &Scheduler) {
    ///     let armed = scheduler
    ///         .schedule(Duration::ZERO, Event::new(|| println!("armed")))
    ///         .unwrap();
    ///     scheduler
    ///         .schedule(
    ///             Duration::from_secs(10),
    ///             Event::new(|| println!("ring")).after([armed]).label("alarm"),
    ///         )
    ///         .unwrap();
    /// }
    /// ```
    pub fn schedule(
        &self,
        deadline: impl Deadline,
        event: Event,
    ) -> Result<EventKey, SchedulingError> {
        let at = deadline
            .into_time(self.time())
            .ok_or(SchedulingError::TimeOverflow)?;

        self.registry().admit(at, event)
    }

    /// Schedules a one-shot action with the specified priority and
    /// precursors.
    ///
    /// This is a shorthand for [`schedule()`](Self::schedule) with an
    /// [`Event`] built from its arguments.
    pub fn schedule_action<F, S>(
        &self,
        deadline: impl Deadline,
        priority: i32,
        precursors: impl IntoIterator<Item = EventKey>,
        action: F,
    ) -> Result<EventKey, SchedulingError>
    where
        F: ActionFn<S>,
    {
        self.schedule(
            deadline,
            Event::new(action).priority(priority).after(precursors),
        )
    }

    /// Cancels an event.
    ///
    /// The event moves to the past pool without running. Its followers are not
    /// activated. Cancelling an event that has ended or was already cancelled
    /// is an error.
    pub fn cancel(&self, key: EventKey) -> Result<(), SchedulingError> {
        self.registry().cancel(key)
    }

    /// Activates an inactive event whose precursors have all ended.
    ///
    /// The event becomes due at its scheduled time or at the current time,
    /// whichever is later. Activating an active event has no effect.
    pub fn activate(&self, key: EventKey) -> Result<(), SchedulingError> {
        self.registry().activate(key, false)
    }

    /// Activates an inactive event regardless of the state of its
    /// precursors.
    pub fn force_activate(&self, key: EventKey) -> Result<(), SchedulingError> {
        self.registry().activate(key, true)
    }

    /// Deactivates an active event.
    ///
    /// An inactive event does not fire until it is activated again, either
    /// explicitly or when one of its precursors ends. Deactivating an inactive
    /// event has no effect.
    pub fn deactivate(&self, key: EventKey) -> Result<(), SchedulingError> {
        self.registry().deactivate(key)
    }

    /// Returns the state of an event.
    pub fn state(&self, key: EventKey) -> Result<EventState, SchedulingError> {
        Ok(self.registry().get(key)?.state)
    }

    /// Returns a snapshot of an event.
    pub fn event_info(&self, key: EventKey) -> Result<EventInfo, SchedulingError> {
        self.registry().info(key)
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("time", &self.time())
            .finish_non_exhaustive()
    }
}

/// Error returned when an event cannot be scheduled or changed.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum SchedulingError {
    /// The scheduled time lies before the current simulation time.
    #[error("the scheduled time {at:.9} lies before the current time {now:.9}")]
    OutOfOrderScheduling {
        /// Requested time.
        at: MonotonicTime,
        /// Current simulation time.
        now: MonotonicTime,
    },
    /// The requested transition is not allowed from the current state.
    #[error("cannot {transition} {event}: the event is {state}")]
    InvalidTransition {
        /// The offending event.
        event: EventDiagnostic,
        /// Current state of the event.
        state: EventState,
        /// Requested transition.
        transition: Transition,
    },
    /// Not all precursors of the event have ended.
    #[error("cannot activate {0}: some precursors have not ended")]
    PrecursorsPending(EventDiagnostic),
    /// The end time of the continuous event has passed.
    #[error("cannot activate {0}: its end time has passed")]
    PassedDueTime(EventDiagnostic),
    /// The key does not refer to an event of the simulation, or refers to a
    /// purged event.
    #[error("unknown event {0}")]
    UnknownEvent(EventKey),
    /// The scheduled time is beyond the range of the simulation time.
    #[error("the scheduled time is beyond the range of the simulation time")]
    TimeOverflow,
    /// The repetition interval of a continuous event is zero.
    #[error("the repetition interval of a continuous event cannot be zero")]
    NullRepetitionInterval,
}
