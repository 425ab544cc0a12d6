//! Event scheduling and time advance.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use akatosh::event::{Event, EventKey, EventState, Pool};
use akatosh::simulation::{
    ExecutionError, PoolSizes, Scheduler, SchedulingError, SimInit, Simulation,
};
use akatosh::time::MonotonicTime;

type Journal<T> = Arc<Mutex<Vec<T>>>;

fn bench(t0: MonotonicTime) -> (Simulation, Scheduler) {
    SimInit::new().init(t0).unwrap()
}

// An event recording the simulation time at which it fires.
fn time_probe(journal: &Journal<MonotonicTime>) -> Event {
    let journal = journal.clone();
    Event::new(move |scheduler: &Scheduler| journal.lock().unwrap().push(scheduler.time()))
}

#[test]
fn schedule_events() {
    let t0 = MonotonicTime::EPOCH;
    let (mut simu, scheduler) = bench(t0);
    let journal = Journal::default();

    // Queue 2 events at t0+3s and t0+2s, in reverse order.
    scheduler
        .schedule(Duration::from_secs(3), time_probe(&journal))
        .unwrap();
    scheduler
        .schedule(t0 + Duration::from_secs(2), time_probe(&journal))
        .unwrap();

    // Move to the 1st event at t0+2s.
    simu.step().unwrap();
    assert_eq!(simu.time(), t0 + Duration::from_secs(2));
    assert_eq!(*journal.lock().unwrap(), [t0 + Duration::from_secs(2)]);

    // Schedule another event in 4s (at t0+6s).
    simu.schedule(Duration::from_secs(4), time_probe(&journal))
        .unwrap();

    // Move to the 2nd event at t0+3s.
    simu.step().unwrap();
    assert_eq!(simu.time(), t0 + Duration::from_secs(3));

    // Move to the 3rd event at t0+6s.
    simu.step().unwrap();
    assert_eq!(simu.time(), t0 + Duration::from_secs(6));
    assert_eq!(journal.lock().unwrap().len(), 3);

    // Nothing left.
    simu.step().unwrap();
    assert_eq!(simu.time(), t0 + Duration::from_secs(6));
}

#[test]
fn schedule_events_at_start_time() {
    let t0 = MonotonicTime::new(100, 0).unwrap();
    let (mut simu, scheduler) = bench(t0);
    let journal = Journal::default();

    let key = scheduler.schedule(t0, time_probe(&journal)).unwrap();
    assert_eq!(simu.event_info(key).unwrap().pool, Pool::Ready);
    scheduler
        .schedule(Duration::from_secs(1), time_probe(&journal))
        .unwrap();

    // Events due at the start time are processed without advancing time.
    simu.step().unwrap();
    assert_eq!(simu.time(), t0);
    assert_eq!(*journal.lock().unwrap(), [t0]);

    simu.step().unwrap();
    assert_eq!(simu.time(), t0 + Duration::from_secs(1));
}

#[test]
fn schedule_in_the_past() {
    let t0 = MonotonicTime::EPOCH;
    let (mut simu, scheduler) = bench(t0);
    scheduler
        .schedule(Duration::from_secs(2), Event::new(|| {}))
        .unwrap();
    simu.step().unwrap();

    assert_eq!(
        scheduler
            .schedule(t0 + Duration::from_secs(1), Event::new(|| {}))
            .unwrap_err(),
        SchedulingError::OutOfOrderScheduling {
            at: t0 + Duration::from_secs(1),
            now: t0 + Duration::from_secs(2),
        }
    );
}

#[test]
fn time_is_monotonic() {
    let t0 = MonotonicTime::EPOCH;
    let (mut simu, scheduler) = bench(t0);
    let journal = Journal::default();

    // Deterministic pseudo-random times and priorities.
    let mut state: u64 = 0x2545F4914F6CDD1D;
    for _ in 0..200 {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let at = Duration::from_millis(state % 1000);
        let priority = (state % 7) as i32 - 3;
        scheduler
            .schedule(at, time_probe(&journal).priority(priority))
            .unwrap();
    }
    simu.run().unwrap();

    let journal = journal.lock().unwrap();
    assert_eq!(journal.len(), 200);
    assert!(journal.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(simu.time(), *journal.last().unwrap());
}

#[test]
fn run_until_does_not_move_time_past_last_event() {
    let t0 = MonotonicTime::EPOCH;
    let (mut simu, scheduler) = bench(t0);
    let journal = Journal::default();
    for secs in [1, 2, 3] {
        scheduler
            .schedule(Duration::from_secs(secs), time_probe(&journal))
            .unwrap();
    }

    simu.run_until(t0 + Duration::from_secs(2)).unwrap();
    assert_eq!(simu.time(), t0 + Duration::from_secs(2));
    assert_eq!(journal.lock().unwrap().len(), 2);

    // Relative bound.
    simu.run_until(Duration::from_secs(10)).unwrap();
    assert_eq!(simu.time(), t0 + Duration::from_secs(3));
    assert_eq!(journal.lock().unwrap().len(), 3);

    assert_eq!(
        simu.run_until(t0 + Duration::from_secs(1)).unwrap_err(),
        ExecutionError::InvalidAdvance {
            now: t0 + Duration::from_secs(3),
            target: t0 + Duration::from_secs(1),
        }
    );
}

#[test]
fn events_scheduled_for_the_current_time_run_in_the_same_step() {
    let t0 = MonotonicTime::EPOCH;
    let (mut simu, scheduler) = bench(t0);
    let journal = Journal::default();

    let spawner = {
        let journal = journal.clone();
        Event::new(move |scheduler: &Scheduler| {
            journal.lock().unwrap().push("spawner");
            let journal = journal.clone();
            scheduler
                .schedule(
                    Duration::ZERO,
                    Event::new(move || journal.lock().unwrap().push("spawned")),
                )
                .unwrap();
        })
        .priority(5)
    };
    let bystander = {
        let journal = journal.clone();
        Event::new(move || journal.lock().unwrap().push("bystander")).priority(10)
    };
    scheduler.schedule(Duration::from_secs(1), spawner).unwrap();
    scheduler
        .schedule(Duration::from_secs(1), bystander)
        .unwrap();

    simu.step().unwrap();
    assert_eq!(*journal.lock().unwrap(), ["spawner", "spawned", "bystander"]);
    assert_eq!(simu.time(), t0 + Duration::from_secs(1));
}

#[test]
fn self_cancelling_continuous_event() {
    let t0 = MonotonicTime::EPOCH;
    let (mut simu, scheduler) = bench(t0);
    let journal = Journal::default();
    let own_key: Arc<Mutex<Option<EventKey>>> = Arc::default();

    let key = scheduler
        .schedule(Duration::ZERO, {
            let journal = journal.clone();
            let own_key = own_key.clone();
            Event::new(move |scheduler: &Scheduler| {
                let mut journal = journal.lock().unwrap();
                journal.push(scheduler.time());
                if journal.len() == 3 {
                    let key = own_key.lock().unwrap().unwrap();
                    scheduler.cancel(key).unwrap();
                }
            })
            .every(Duration::from_secs(2))
        })
        .unwrap();
    *own_key.lock().unwrap() = Some(key);

    simu.run().unwrap();
    assert_eq!(
        *journal.lock().unwrap(),
        [
            t0,
            t0 + Duration::from_secs(2),
            t0 + Duration::from_secs(4)
        ]
    );
    assert_eq!(simu.event_info(key).unwrap().state, EventState::Cancelled);
}

#[test]
fn pool_sizes_and_purge() {
    let t0 = MonotonicTime::EPOCH;
    let (mut simu, scheduler) = bench(t0);

    let a = scheduler
        .schedule(Duration::from_secs(1), Event::new(|| {}))
        .unwrap();
    let b = scheduler
        .schedule(Duration::from_secs(1), Event::new(|| {}))
        .unwrap();
    let late = scheduler
        .schedule(Duration::from_secs(10), Event::new(|| {}))
        .unwrap();
    let follower = scheduler
        .schedule(Duration::ZERO, Event::new(|| {}).after([a, late]))
        .unwrap();
    scheduler.schedule(Duration::ZERO, Event::new(|| {})).unwrap();
    assert_eq!(
        simu.pool_sizes(),
        PoolSizes {
            future: 4,
            ready: 1,
            past: 0
        }
    );

    simu.run_until(Duration::from_secs(5)).unwrap();
    assert_eq!(
        simu.pool_sizes(),
        PoolSizes {
            future: 2,
            ready: 0,
            past: 3
        }
    );

    // `a` is still awaited by `follower`.
    assert_eq!(simu.purge_past(), 2);
    assert_eq!(
        simu.event_info(b).unwrap_err(),
        SchedulingError::UnknownEvent(b)
    );
    assert_eq!(simu.event_info(a).unwrap().state, EventState::Ended);
    assert_eq!(simu.event_info(a).unwrap().followers, [follower]);

    simu.run().unwrap();
    assert_eq!(simu.event_info(follower).unwrap().state, EventState::Ended);
    assert_eq!(simu.purge_past(), 3);
    assert_eq!(simu.pool_sizes(), PoolSizes::default());
}

#[test]
fn scheduling_beyond_time_range() {
    let t0 = MonotonicTime::EPOCH;
    let (mut simu, scheduler) = bench(t0);
    let journal = Journal::default();
    let errors: Journal<SchedulingError> = Journal::default();

    // An endless continuous event.
    let ticker = scheduler
        .schedule(
            Duration::ZERO,
            time_probe(&journal)
                .every(Duration::from_secs(1))
                .for_duration(Duration::MAX),
        )
        .unwrap();
    // An action scheduling out of range.
    scheduler
        .schedule(Duration::from_secs(1), {
            let errors = errors.clone();
            Event::new(move |scheduler: &Scheduler| {
                let result = scheduler.schedule(Duration::MAX, Event::new(|| {}));
                errors.lock().unwrap().push(result.unwrap_err());
            })
        })
        .unwrap();

    simu.run_until(t0 + Duration::from_secs(2)).unwrap();
    assert_eq!(*errors.lock().unwrap(), [SchedulingError::TimeOverflow]);
    assert_eq!(journal.lock().unwrap().len(), 3);
    assert_eq!(simu.event_info(ticker).unwrap().state, EventState::Active);

    // The simulation is still usable.
    simu.cancel(ticker).unwrap();
    simu.run_until(Duration::MAX).unwrap();
    assert_eq!(simu.time(), t0 + Duration::from_secs(2));
    assert_eq!(
        scheduler
            .schedule(Duration::MAX, Event::new(|| {}))
            .unwrap_err(),
        SchedulingError::TimeOverflow
    );
}

#[test]
fn paused_simulation_does_not_step() {
    let t0 = MonotonicTime::EPOCH;
    let (mut simu, scheduler) = bench(t0);
    let journal = Journal::default();
    for secs in [1, 2] {
        scheduler
            .schedule(Duration::from_secs(secs), time_probe(&journal))
            .unwrap();
    }

    simu.pause();
    assert!(simu.is_paused());
    simu.step().unwrap();
    simu.run_until(Duration::from_secs(5)).unwrap();
    simu.run().unwrap();
    assert_eq!(simu.time(), t0);
    assert!(journal.lock().unwrap().is_empty());

    simu.resume();
    assert!(!simu.is_paused());
    simu.step().unwrap();
    assert_eq!(*journal.lock().unwrap(), [t0 + Duration::from_secs(1)]);

    simu.pause();
    simu.run().unwrap();
    assert_eq!(simu.time(), t0 + Duration::from_secs(1));
    simu.resume();
    simu.run().unwrap();
    assert_eq!(simu.time(), t0 + Duration::from_secs(2));
    assert_eq!(journal.lock().unwrap().len(), 2);
}
