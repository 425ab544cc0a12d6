//! Event arena, event pools and current simulation time.

use std::time::Duration;

use slab::Slab;
use tracing::debug;

use crate::event::{
    Action, Event, EventDiagnostic, EventInfo, EventKey, EventState, Pool, RepetitionEnd,
    Transition, Watchdog,
};
use crate::simulation::{ExecutionError, SchedulingError};
use crate::time::MonotonicTime;
use crate::util::priority_queue::{InsertKey, PriorityQueue};

/// An event owned by the registry.
pub(crate) struct Entry {
    epoch: u64,
    pub(crate) label: Option<String>,
    pub(crate) at: MonotonicTime,
    pub(crate) priority: i32,
    pub(crate) precursors: Vec<EventKey>,
    pub(crate) followers: Vec<EventKey>,
    pub(crate) state: EventState,
    pub(crate) pool: Pool,
    pub(crate) step: Option<Duration>,
    interval: Option<Duration>,
    till: Option<MonotonicTime>,
    action: Option<Action>,
    watchdog: Option<Watchdog>,
    // Key in the future queue or in the ready queue, depending on the pool.
    queue_key: Option<InsertKey>,
    // Set while the event belongs to the batch being executed.
    in_batch: bool,
    followers_notified: bool,
}

impl Entry {
    pub(crate) fn diagnostic(&self, key: EventKey) -> EventDiagnostic {
        EventDiagnostic {
            key,
            label: self.label.clone(),
            at: self.at,
            priority: self.priority,
        }
    }

    /// Returns `true` if activation at `at` would start past the end time of
    /// a continuous event.
    fn is_past_due(&self, at: MonotonicTime) -> bool {
        self.till.is_some_and(|till| at > till)
    }
}

/// Outcome of an activation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Activation {
    Activated,
    AlreadyActive,
    PassedDue,
}

/// A group of ready events sharing the same priority.
#[derive(Debug)]
pub(crate) struct Batch {
    pub(crate) priority: i32,
    pub(crate) keys: Vec<EventKey>,
}

/// Number of events in each pool.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PoolSizes {
    /// Events not yet due or waiting for precursors.
    pub future: usize,
    /// Due events awaiting execution.
    pub ready: usize,
    /// Ended and cancelled events.
    pub past: usize,
}

/// The clock and event registry.
///
/// Each event lives in the arena until purged and belongs to exactly one of
/// the future, ready and past pools. Active events of the future pool are
/// indexed by time and ready events by priority.
pub(crate) struct Registry {
    now: MonotonicTime,
    events: Slab<Entry>,
    next_epoch: u64,
    future: PriorityQueue<MonotonicTime, EventKey>,
    ready: PriorityQueue<i32, EventKey>,
}

impl Registry {
    pub(crate) fn new(now: MonotonicTime) -> Self {
        Self {
            now,
            events: Slab::new(),
            next_epoch: 0,
            future: PriorityQueue::new(),
            ready: PriorityQueue::new(),
        }
    }

    /// Returns the current simulation time.
    pub(crate) fn now(&self) -> MonotonicTime {
        self.now
    }

    pub(crate) fn get(&self, key: EventKey) -> Result<&Entry, SchedulingError> {
        match self.events.get(key.slot()) {
            Some(entry) if entry.epoch == key.epoch() => Ok(entry),
            _ => Err(SchedulingError::UnknownEvent(key)),
        }
    }

    pub(crate) fn get_mut(&mut self, key: EventKey) -> Result<&mut Entry, SchedulingError> {
        match self.events.get_mut(key.slot()) {
            Some(entry) if entry.epoch == key.epoch() => Ok(entry),
            _ => Err(SchedulingError::UnknownEvent(key)),
        }
    }

    /// Adds an event to the registry.
    ///
    /// The event goes to the ready pool if it is active and due now, to the
    /// future pool otherwise.
    pub(crate) fn admit(
        &mut self,
        at: MonotonicTime,
        event: Event,
    ) -> Result<EventKey, SchedulingError> {
        if at < self.now {
            return Err(SchedulingError::OutOfOrderScheduling { at, now: self.now });
        }
        if event.interval.is_some_and(|interval| interval.is_zero()) {
            return Err(SchedulingError::NullRepetitionInterval);
        }

        let mut precursors = event.precursors;
        precursors.sort_unstable();
        precursors.dedup();
        let mut is_pending = false;
        for &precursor in &precursors {
            is_pending |= self.get(precursor)?.state != EventState::Ended;
        }

        let till = match (event.interval, event.end) {
            (None, _) | (Some(_), RepetitionEnd::Never) => None,
            (Some(_), RepetitionEnd::Till(till)) => Some(till),
            (Some(_), RepetitionEnd::After(duration)) => {
                Some(at.checked_add(duration).unwrap_or(MonotonicTime::MAX))
            }
        };

        let epoch = self.next_epoch;
        self.next_epoch += 1;
        let vacant = self.events.vacant_entry();
        let key = EventKey::new(vacant.key(), epoch);
        vacant.insert(Entry {
            epoch,
            label: event.label,
            at,
            priority: event.priority,
            precursors: precursors.clone(),
            followers: Vec::new(),
            state: if is_pending {
                EventState::Inactive
            } else {
                EventState::Active
            },
            pool: Pool::Future,
            step: event.step,
            interval: event.interval,
            till,
            action: Some(event.action),
            watchdog: event.watchdog,
            queue_key: None,
            in_batch: false,
            followers_notified: false,
        });

        for precursor in precursors {
            self.events[precursor.slot()].followers.push(key);
        }
        if !is_pending {
            self.enqueue(key);
        }

        debug!(
            event = %key,
            at = %format_args!("{:.9}", at),
            pending = is_pending,
            "event admitted"
        );

        Ok(key)
    }

    /// Returns the time of the earliest active event in the future pool.
    pub(crate) fn next_time(&self) -> Option<MonotonicTime> {
        self.future.peek_key().copied()
    }

    /// Returns `true` if some events await execution at the current time.
    pub(crate) fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Moves the simulation time forward to the time of the earliest active
    /// event.
    pub(crate) fn advance_to(&mut self, target: MonotonicTime) -> Result<(), ExecutionError> {
        if target < self.now || self.next_time() != Some(target) {
            return Err(ExecutionError::InvalidAdvance {
                now: self.now,
                target,
            });
        }
        self.now = target;

        Ok(())
    }

    /// Moves all due events from the future pool to the ready pool and returns
    /// their number.
    pub(crate) fn drain_due(&mut self) -> Result<usize, ExecutionError> {
        let mut count = 0;
        while self.future.peek_key().is_some_and(|&at| at <= self.now) {
            let Some((_, key)) = self.future.pull() else {
                break;
            };
            let Some(entry) = self.events.get_mut(key.slot()) else {
                continue;
            };
            entry.queue_key = None;
            if entry.state != EventState::Active {
                return Err(ExecutionError::Consistency {
                    event: entry.diagnostic(key),
                    reason: format!(
                        "an event in the {} state was found in the time index",
                        entry.state
                    ),
                });
            }
            entry.pool = Pool::Ready;
            entry.queue_key = Some(self.ready.insert(entry.priority, key));
            count += 1;
        }

        Ok(count)
    }

    /// Pulls all ready events with the lowest priority.
    pub(crate) fn pull_batch(&mut self) -> Option<Batch> {
        let priority = *self.ready.peek_key()?;
        let mut keys = Vec::new();
        while self.ready.peek_key() == Some(&priority) {
            let Some((_, key)) = self.ready.pull() else {
                break;
            };
            if let Some(entry) = self.events.get_mut(key.slot()) {
                entry.queue_key = None;
                entry.in_batch = true;
                keys.push(key);
            }
        }

        Some(Batch { priority, keys })
    }

    /// Takes the action of a batch member if it is still active.
    pub(crate) fn begin_firing(&mut self, key: EventKey) -> Option<Action> {
        let entry = self.get_mut(key).ok()?;
        if !entry.in_batch || entry.state != EventState::Active {
            return None;
        }

        entry.action.take()
    }

    /// Gives back the action taken by `begin_firing`, unless the event was
    /// cancelled meanwhile.
    pub(crate) fn restore_action(&mut self, key: EventKey, action: Action) {
        if let Ok(entry) = self.get_mut(key) {
            if !entry.state.is_terminal() {
                entry.action = Some(action);
            }
        }
    }

    /// Settles a batch member once the whole batch has run.
    ///
    /// A fired event is either re-admitted to the future pool, if continuous
    /// and not past its end time, or ended. An event skipped because it was
    /// deactivated returns to the future pool.
    pub(crate) fn complete(&mut self, key: EventKey, fired: bool) -> Result<(), ExecutionError> {
        let now = self.now;
        let entry = self.get_mut(key)?;
        entry.in_batch = false;

        match entry.state {
            EventState::Cancelled => return Ok(()),
            EventState::Ended => {
                return Err(SchedulingError::InvalidTransition {
                    event: entry.diagnostic(key),
                    state: entry.state,
                    transition: Transition::End,
                }
                .into())
            }
            _ => {}
        }
        if !fired {
            // Skipped members may have been re-activated after their turn.
            if entry.state == EventState::Active {
                self.enqueue(key);
            } else {
                entry.pool = Pool::Future;
            }
            return Ok(());
        }

        // A next firing beyond the time range ends the event.
        let next = entry.interval.and_then(|interval| now.checked_add(interval));
        match next {
            Some(next) if !entry.is_past_due(next) => {
                entry.at = next;
                entry.pool = Pool::Future;
                debug!(event = %key, next = %format_args!("{:.9}", next), "next firing scheduled");
                if entry.state == EventState::Active {
                    self.enqueue(key);
                }

                Ok(())
            }
            _ => super::resolver::end(self, key),
        }
    }

    /// Cancels an event.
    pub(crate) fn cancel(&mut self, key: EventKey) -> Result<(), SchedulingError> {
        let entry = self.get(key)?;
        if entry.state.is_terminal() {
            return Err(SchedulingError::InvalidTransition {
                event: entry.diagnostic(key),
                state: entry.state,
                transition: Transition::Cancel,
            });
        }
        self.retire(key);
        debug!(event = %key, "event cancelled");

        Ok(())
    }

    /// Moves a non-terminal event to the past pool as cancelled, without
    /// activating its followers.
    pub(crate) fn retire(&mut self, key: EventKey) {
        self.dequeue(key);
        if let Ok(entry) = self.get_mut(key) {
            entry.state = EventState::Cancelled;
            entry.pool = Pool::Past;
            entry.action = None;
            entry.watchdog = None;
        }
        self.mark_followers_notified(key);
    }

    /// Deactivates an event, removing it from the time index.
    pub(crate) fn deactivate(&mut self, key: EventKey) -> Result<(), SchedulingError> {
        let entry = self.get(key)?;
        match entry.state {
            EventState::Inactive => return Ok(()),
            EventState::Active => {}
            state => {
                return Err(SchedulingError::InvalidTransition {
                    event: entry.diagnostic(key),
                    state,
                    transition: Transition::Deactivate,
                })
            }
        }
        self.dequeue(key);
        let entry = self.get_mut(key)?;
        entry.state = EventState::Inactive;
        if !entry.in_batch {
            entry.pool = Pool::Future;
        }
        debug!(event = %key, "event deactivated");

        Ok(())
    }

    /// Activates an inactive event.
    ///
    /// Unless `force` is set, all precursors must have ended.
    pub(crate) fn activate(&mut self, key: EventKey, force: bool) -> Result<(), SchedulingError> {
        let entry = self.get(key)?;
        if entry.state.is_terminal() {
            return Err(SchedulingError::InvalidTransition {
                event: entry.diagnostic(key),
                state: entry.state,
                transition: Transition::Activate,
            });
        }
        if !force && !self.precursors_ended(key) {
            return Err(SchedulingError::PrecursorsPending(entry.diagnostic(key)));
        }
        let diagnostic = entry.diagnostic(key);

        match self.make_active(key)? {
            Activation::PassedDue => Err(SchedulingError::PassedDueTime(diagnostic)),
            Activation::Activated | Activation::AlreadyActive => Ok(()),
        }
    }

    /// Returns `true` if all precursors of the event have ended.
    pub(crate) fn precursors_ended(&self, key: EventKey) -> bool {
        self.get(key).is_ok_and(|entry| {
            entry
                .precursors
                .iter()
                .all(|&p| self.get(p).is_ok_and(|p| p.state == EventState::Ended))
        })
    }

    /// Makes an inactive event active, no earlier than the current time.
    ///
    /// A continuous event whose end time has already passed is retired
    /// instead.
    pub(crate) fn make_active(&mut self, key: EventKey) -> Result<Activation, SchedulingError> {
        let now = self.now;
        let entry = self.get_mut(key)?;
        if entry.state == EventState::Active {
            return Ok(Activation::AlreadyActive);
        }
        entry.at = entry.at.max(now);
        if entry.is_past_due(entry.at) {
            debug!(event = %entry.diagnostic(key), "event passed due time");
            self.retire(key);

            return Ok(Activation::PassedDue);
        }
        entry.state = EventState::Active;
        debug!(event = %key, at = %format_args!("{:.9}", entry.at), "event activated");
        if !entry.in_batch {
            self.enqueue(key);
        }

        Ok(Activation::Activated)
    }

    /// Marks an event as ended and moves it to the past pool.
    pub(crate) fn mark_ended(&mut self, key: EventKey) -> Result<Vec<EventKey>, SchedulingError> {
        self.dequeue(key);
        let entry = self.get_mut(key)?;
        if entry.state.is_terminal() {
            return Err(SchedulingError::InvalidTransition {
                event: entry.diagnostic(key),
                state: entry.state,
                transition: Transition::End,
            });
        }
        entry.state = EventState::Ended;
        entry.pool = Pool::Past;
        entry.action = None;
        entry.watchdog = None;
        let followers = entry.followers.clone();
        self.mark_followers_notified(key);

        Ok(followers)
    }

    fn mark_followers_notified(&mut self, key: EventKey) {
        if let Ok(entry) = self.get_mut(key) {
            debug_assert!(!entry.followers_notified);
            entry.followers_notified = true;
        }
    }

    /// Takes the watchdog of an event, if any.
    pub(crate) fn take_watchdog(&mut self, key: EventKey) -> Option<Watchdog> {
        self.get_mut(key).ok()?.watchdog.take()
    }

    /// Returns a snapshot of an event.
    pub(crate) fn info(&self, key: EventKey) -> Result<EventInfo, SchedulingError> {
        let entry = self.get(key)?;

        Ok(EventInfo {
            key,
            label: entry.label.clone(),
            at: entry.at,
            priority: entry.priority,
            state: entry.state,
            pool: entry.pool,
            precursors: entry.precursors.clone(),
            followers: entry.followers.clone(),
        })
    }

    /// Counts the events in each pool.
    pub(crate) fn pool_sizes(&self) -> PoolSizes {
        let mut sizes = PoolSizes::default();
        for (_, entry) in &self.events {
            match entry.pool {
                Pool::Future => sizes.future += 1,
                Pool::Ready => sizes.ready += 1,
                Pool::Past => sizes.past += 1,
            }
        }

        sizes
    }

    /// Counts the inactive events of the future pool.
    pub(crate) fn stranded(&self) -> usize {
        self.events
            .iter()
            .filter(|(_, entry)| entry.pool == Pool::Future && entry.state == EventState::Inactive)
            .count()
    }

    /// Discards past events that no live event waits for, and returns their
    /// number.
    pub(crate) fn purge_past(&mut self) -> usize {
        let mut awaited = Vec::new();
        for (_, entry) in &self.events {
            if !entry.state.is_terminal() {
                awaited.extend_from_slice(&entry.precursors);
            }
        }
        awaited.sort_unstable();
        awaited.dedup();

        let mut purged = Vec::new();
        self.events.retain(|slot, entry| {
            let key = EventKey::new(slot, entry.epoch);
            let keep = entry.pool != Pool::Past || awaited.binary_search(&key).is_ok();
            if !keep {
                purged.push(key);
            }
            keep
        });
        if purged.is_empty() {
            return 0;
        }

        purged.sort_unstable();
        for (_, entry) in &mut self.events {
            entry
                .followers
                .retain(|follower| purged.binary_search(follower).is_err());
            entry
                .precursors
                .retain(|precursor| purged.binary_search(precursor).is_err());
        }
        debug!(count = purged.len(), "past events purged");

        purged.len()
    }

    /// Inserts an active event in the ready queue if it is due, or in the time
    /// index of the future pool otherwise.
    fn enqueue(&mut self, key: EventKey) {
        let now = self.now;
        let Some(entry) = self.events.get_mut(key.slot()) else {
            return;
        };
        if entry.epoch != key.epoch() {
            return;
        }
        if entry.at <= now {
            entry.pool = Pool::Ready;
            entry.queue_key = Some(self.ready.insert(entry.priority, key));
        } else {
            entry.pool = Pool::Future;
            entry.queue_key = Some(self.future.insert(entry.at, key));
        }
    }

    /// Removes an event from whichever queue indexes it.
    fn dequeue(&mut self, key: EventKey) {
        let Some(entry) = self.events.get_mut(key.slot()) else {
            return;
        };
        if entry.epoch != key.epoch() {
            return;
        }
        if let Some(queue_key) = entry.queue_key.take() {
            match entry.pool {
                Pool::Future => {
                    self.future.delete(queue_key);
                }
                Pool::Ready => {
                    self.ready.delete(queue_key);
                }
                Pool::Past => {}
            }
        }
    }
}
