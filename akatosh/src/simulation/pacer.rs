//! Wall clock pacing and deadline enforcement.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use pin_project_lite::pin_project;
use tracing::warn;

use crate::event::{EventDiagnostic, EventKey};
use crate::time::{Clock, MonotonicTime, SyncStatus};

/// Report of an event firing that missed its real-time deadline.
///
/// A firing misses its deadline if it started late, if its action ran for
/// too long, or if both delays add up to more than the event step.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeadlineViolation {
    /// Key of the event.
    pub key: EventKey,
    /// Label of the event, if any.
    pub label: Option<String>,
    /// Simulation time of the firing.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub at: MonotonicTime,
    /// Delay between the wall clock instant at which the firing was due and
    /// the instant at which it started.
    ///
    /// The wait is measured against the due instant of this firing rather
    /// than against the previous firing of the event, so an event firing on
    /// time has a null wait whatever its interval.
    pub wait: Duration,
    /// Wall clock time spent in the action.
    pub execution: Duration,
    /// Step of the event.
    pub step: Duration,
}

impl fmt::Display for DeadlineViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event {}", self.key)?;
        if let Some(label) = &self.label {
            write!(f, " '{}'", label)?;
        }
        write!(
            f,
            " at {:.9} missed its deadline: waited {:?} and ran for {:?} with a step of {:?}",
            self.at, self.wait, self.execution, self.step
        )
    }
}

/// Synchronization of simulation time with a wall clock.
pub(crate) struct Pacer {
    clock: Box<dyn Clock>,
    tolerance: Duration,
}

impl Pacer {
    pub(crate) fn new(clock: Box<dyn Clock>, tolerance: Duration) -> Self {
        Self { clock, tolerance }
    }

    pub(crate) fn set_clock(&mut self, clock: Box<dyn Clock>) {
        self.clock = clock;
    }

    /// Blocks until the wall clock instant that corresponds to the deadline,
    /// if the clock is a wall clock.
    pub(crate) fn synchronize(&mut self, deadline: MonotonicTime) {
        if let SyncStatus::OutOfSync(lag) = self.clock.synchronize(deadline) {
            if lag > self.tolerance {
                warn!(
                    lag = ?lag,
                    deadline = %format_args!("{:.9}", deadline),
                    "simulation lags behind the wall clock"
                );
            }
        }
    }

    /// Returns `true` if deadlines are enforced, which is only the case for a
    /// wall clock running at the pace of simulation time.
    pub(crate) fn enforces_deadlines(&self) -> bool {
        self.clock.time_scale() == Some(1.0)
    }

    /// Checks the timing of a firing against the event step.
    pub(crate) fn check(
        &self,
        event: &EventDiagnostic,
        step: Duration,
        started: Instant,
        execution: Duration,
    ) -> Option<DeadlineViolation> {
        let due = self.clock.wall_instant(event.at)?;
        let wait = started.saturating_duration_since(due);
        if wait <= step && execution <= step && wait.saturating_add(execution) <= step {
            return None;
        }

        Some(DeadlineViolation {
            key: event.key,
            label: event.label.clone(),
            at: event.at,
            wait,
            execution,
            step,
        })
    }

    /// Delays the wall clock reference by the specified duration.
    pub(crate) fn shift(&mut self, offset: Duration) {
        self.clock.shift(offset);
    }
}

impl fmt::Debug for Pacer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pacer")
            .field("time_scale", &self.clock.time_scale())
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

pin_project! {
    /// A future that accumulates the wall clock time spent polling its inner
    /// future and resolves to that duration.
    pub(crate) struct Timed<F> {
        #[pin]
        fut: F,
        elapsed: Duration,
    }
}

impl<F> Timed<F> {
    pub(crate) fn new(fut: F) -> Self {
        Self {
            fut,
            elapsed: Duration::ZERO,
        }
    }
}

impl<F> Future for Timed<F>
where
    F: Future<Output = ()>,
{
    type Output = Duration;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let start = Instant::now();
        let poll = this.fut.poll(cx);
        *this.elapsed += start.elapsed();

        poll.map(|()| *this.elapsed)
    }
}

#[derive(Debug, Default)]
struct PauseState {
    paused_since: Option<Instant>,
    // Paused time not yet applied to the clock.
    pending_shift: Duration,
}

/// A thread-safe handle to pause and resume a real-time simulation.
///
/// While paused, the simulation blocks before the next batch of events. On
/// resumption, the wall clock reference is delayed by the paused duration so
/// that the pause does not count as lateness.
///
/// # Examples
///
/// ```
/// use std::thread;
/// use std::time::Duration;
///
/// use akatosh::simulation::SimInit;
/// use akatosh::time::MonotonicTime;
///
/// let (mut simu, _scheduler) = SimInit::new()
///     .set_realtime(1.0)
///     .init(MonotonicTime::EPOCH)
///     .unwrap();
///
/// let handle = simu.realtime_handle();
/// handle.pause();
/// let resumer = thread::spawn(move || {
///     thread::sleep(Duration::from_millis(10));
///     handle.resume();
/// });
///
/// // Blocks until resumed.
/// simu.step().unwrap();
/// resumer.join().unwrap();
/// ```
#[derive(Clone, Default)]
pub struct RealtimeHandle {
    inner: Arc<(Mutex<PauseState>, Condvar)>,
}

impl RealtimeHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Pauses the simulation; does nothing if it is already paused.
    pub fn pause(&self) {
        let mut state = self.inner.0.lock().unwrap();
        if state.paused_since.is_none() {
            state.paused_since = Some(Instant::now());
        }
    }

    /// Resumes the simulation; does nothing if it is not paused.
    pub fn resume(&self) {
        let (state, condvar) = &*self.inner;
        let mut state = state.lock().unwrap();
        if let Some(since) = state.paused_since.take() {
            state.pending_shift += since.elapsed();
            condvar.notify_all();
        }
    }

    /// Returns `true` if the simulation is paused.
    pub fn is_paused(&self) -> bool {
        self.inner.0.lock().unwrap().paused_since.is_some()
    }

    /// Blocks while the simulation is paused and returns the total paused
    /// duration accumulated since the previous call.
    pub(crate) fn wait_while_paused(&self) -> Duration {
        let (state, condvar) = &*self.inner;
        let mut state = condvar
            .wait_while(state.lock().unwrap(), |state| state.paused_since.is_some())
            .unwrap();

        std::mem::take(&mut state.pending_shift)
    }
}

impl fmt::Debug for RealtimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeHandle")
            .field("is_paused", &self.is_paused())
            .finish_non_exhaustive()
    }
}
