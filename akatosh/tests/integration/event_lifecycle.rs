//! Event states, continuous events and explicit state transitions.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use akatosh::event::{Event, EventKey, EventState, Pool, Transition};
use akatosh::simulation::{Scheduler, SchedulingError, SimInit};
use akatosh::time::MonotonicTime;

type Journal = Arc<Mutex<Vec<MonotonicTime>>>;

fn time_probe(journal: &Journal) -> Event {
    let journal = journal.clone();
    Event::new(move |scheduler: &Scheduler| journal.lock().unwrap().push(scheduler.time()))
}

fn at(millis: u64) -> MonotonicTime {
    MonotonicTime::EPOCH + Duration::from_millis(millis)
}

#[test]
fn continuous_event_fires_on_its_end_time() {
    let (mut simu, scheduler) = SimInit::new().init(at(0)).unwrap();
    let journal = Journal::default();

    let key = scheduler
        .schedule(
            at(0),
            time_probe(&journal)
                .every(Duration::from_secs(1))
                .for_duration(Duration::from_secs(3)),
        )
        .unwrap();

    simu.run().unwrap();
    assert_eq!(
        *journal.lock().unwrap(),
        [at(0), at(1000), at(2000), at(3000)]
    );
    assert_eq!(simu.event_info(key).unwrap().state, EventState::Ended);
    assert_eq!(simu.time(), at(3000));
}

#[test]
fn continuous_event_with_absolute_end() {
    let (mut simu, scheduler) = SimInit::new().init(at(0)).unwrap();
    let journal = Journal::default();

    scheduler
        .schedule(
            at(500),
            time_probe(&journal)
                .every(Duration::from_secs(1))
                .till(at(3000)),
        )
        .unwrap();

    simu.run().unwrap();
    assert_eq!(*journal.lock().unwrap(), [at(500), at(1500), at(2500)]);
}

#[test]
fn continuous_event_keeps_its_key_and_pool() {
    let (mut simu, scheduler) = SimInit::new().init(at(0)).unwrap();
    let journal = Journal::default();

    let key = scheduler
        .schedule(at(0), time_probe(&journal).every(Duration::from_millis(250)))
        .unwrap();

    simu.run_until(at(1000)).unwrap();
    assert_eq!(journal.lock().unwrap().len(), 5);
    let info = simu.event_info(key).unwrap();
    assert_eq!(info.state, EventState::Active);
    assert_eq!(info.pool, Pool::Future);
    assert_eq!(info.at, at(1250));

    simu.cancel(key).unwrap();
    simu.run().unwrap();
    assert_eq!(journal.lock().unwrap().len(), 5);
}

#[test]
fn terminal_states_reject_transitions() {
    let (mut simu, scheduler) = SimInit::new().init(at(0)).unwrap();

    let ended = scheduler
        .schedule(at(1000), Event::new(|| {}).label("ended"))
        .unwrap();
    let cancelled = scheduler
        .schedule(at(1000), Event::new(|| {}).label("cancelled"))
        .unwrap();
    scheduler.cancel(cancelled).unwrap();
    simu.run().unwrap();

    let check = |key: EventKey, state: EventState| {
        for (result, transition) in [
            (scheduler.cancel(key), Transition::Cancel),
            (scheduler.activate(key), Transition::Activate),
            (scheduler.force_activate(key), Transition::Activate),
            (scheduler.deactivate(key), Transition::Deactivate),
        ] {
            match result {
                Err(SchedulingError::InvalidTransition {
                    event,
                    state: s,
                    transition: t,
                }) => {
                    assert_eq!(event.key, key);
                    assert_eq!(s, state);
                    assert_eq!(t, transition);
                }
                other => panic!("unexpected result: {:?}", other),
            }
        }
        assert_eq!(scheduler.state(key).unwrap(), state);
    };
    check(ended, EventState::Ended);
    check(cancelled, EventState::Cancelled);
}

#[test]
fn deactivated_event_does_not_fire_until_reactivated() {
    let (mut simu, scheduler) = SimInit::new().init(at(0)).unwrap();
    let journal = Journal::default();

    let key = scheduler.schedule(at(1000), time_probe(&journal)).unwrap();
    scheduler
        .schedule(at(3000), Event::new(|| {}))
        .unwrap();
    scheduler.deactivate(key).unwrap();
    assert_eq!(simu.event_info(key).unwrap().pool, Pool::Future);

    simu.step().unwrap();
    assert_eq!(simu.time(), at(3000));
    assert!(journal.lock().unwrap().is_empty());

    // The activation time is clamped to the current time.
    scheduler.activate(key).unwrap();
    assert_eq!(simu.event_info(key).unwrap().pool, Pool::Ready);
    simu.run().unwrap();
    assert_eq!(*journal.lock().unwrap(), [at(3000)]);
}

#[test]
fn batch_member_deactivated_before_its_turn() {
    let (mut simu, scheduler) = SimInit::new().init(at(0)).unwrap();
    let journal = Journal::default();
    let target: Arc<Mutex<Option<EventKey>>> = Arc::default();

    scheduler
        .schedule(at(1000), {
            let target = target.clone();
            Event::new(move |scheduler: &Scheduler| {
                let key = target.lock().unwrap().unwrap();
                scheduler.deactivate(key).unwrap();
            })
        })
        .unwrap();
    let key = scheduler.schedule(at(1000), time_probe(&journal)).unwrap();
    *target.lock().unwrap() = Some(key);

    simu.run().unwrap();
    assert!(journal.lock().unwrap().is_empty());
    let info = simu.event_info(key).unwrap();
    assert_eq!(info.state, EventState::Inactive);
    assert_eq!(info.pool, Pool::Future);

    scheduler.activate(key).unwrap();
    simu.run().unwrap();
    assert_eq!(*journal.lock().unwrap(), [at(1000)]);
    assert_eq!(simu.event_info(key).unwrap().state, EventState::Ended);
}

#[test]
fn reactivation_past_end_time_is_rejected() {
    let (mut simu, scheduler) = SimInit::new().init(at(0)).unwrap();

    let key = scheduler
        .schedule(
            at(1000),
            Event::new(|| {})
                .every(Duration::from_secs(1))
                .till(at(2000))
                .label("short-lived"),
        )
        .unwrap();
    scheduler.deactivate(key).unwrap();
    scheduler.schedule(at(5000), Event::new(|| {})).unwrap();
    simu.run().unwrap();

    assert!(matches!(
        scheduler.activate(key),
        Err(SchedulingError::PassedDueTime(event)) if event.key == key
    ));
    assert_eq!(scheduler.state(key).unwrap(), EventState::Cancelled);
}
