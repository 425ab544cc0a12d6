//! Precursor and follower relationships.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use akatosh::event::{Event, EventState, Pool};
use akatosh::simulation::{Scheduler, SimInit};
use akatosh::time::MonotonicTime;

type Journal = Arc<Mutex<Vec<(&'static str, MonotonicTime)>>>;

// An event recording its name and firing time.
fn named(journal: &Journal, name: &'static str) -> Event {
    let journal = journal.clone();
    Event::new(move |scheduler: &Scheduler| {
        journal.lock().unwrap().push((name, scheduler.time()))
    })
    .label(name)
}

fn at(secs: u64) -> MonotonicTime {
    MonotonicTime::EPOCH + Duration::from_secs(secs)
}

#[test]
fn follower_waits_for_late_precursor() {
    let (mut simu, scheduler) = SimInit::new().init(at(0)).unwrap();
    let journal = Journal::default();

    let x = scheduler.schedule(at(5), named(&journal, "x")).unwrap();
    let y = scheduler
        .schedule(at(0), named(&journal, "y").priority(-1).after([x]))
        .unwrap();

    let info = simu.event_info(y).unwrap();
    assert_eq!(info.state, EventState::Inactive);
    assert_eq!(info.pool, Pool::Future);
    assert_eq!(info.precursors, [x]);

    simu.step().unwrap();
    assert_eq!(simu.time(), at(5));
    assert_eq!(*journal.lock().unwrap(), [("x", at(5)), ("y", at(5))]);

    let info = simu.event_info(y).unwrap();
    assert_eq!(info.state, EventState::Ended);
    assert_eq!(info.at, at(5));
}

#[test]
fn follower_waits_for_all_precursors() {
    let (mut simu, scheduler) = SimInit::new().init(at(0)).unwrap();
    let journal = Journal::default();

    let a = scheduler.schedule(at(2), named(&journal, "a")).unwrap();
    let b = scheduler.schedule(at(2), named(&journal, "b")).unwrap();
    scheduler
        .schedule(at(2), named(&journal, "c").priority(1).after([a, b]))
        .unwrap();

    simu.run().unwrap();

    let journal = journal.lock().unwrap();
    assert_eq!(journal.len(), 3);
    assert_eq!(journal[2], ("c", at(2)));
}

#[test]
fn follower_keeps_a_later_scheduled_time() {
    let (mut simu, scheduler) = SimInit::new().init(at(0)).unwrap();
    let journal = Journal::default();

    let a = scheduler.schedule(at(1), named(&journal, "a")).unwrap();
    scheduler
        .schedule(at(4), named(&journal, "b").after([a]))
        .unwrap();

    simu.run().unwrap();
    assert_eq!(*journal.lock().unwrap(), [("a", at(1)), ("b", at(4))]);
}

#[test]
fn precursor_ended_before_scheduling() {
    let (mut simu, scheduler) = SimInit::new().init(at(0)).unwrap();
    let journal = Journal::default();

    let a = scheduler.schedule(at(1), named(&journal, "a")).unwrap();
    simu.step().unwrap();

    let b = scheduler
        .schedule(Duration::from_secs(1), named(&journal, "b").after([a]))
        .unwrap();
    assert_eq!(simu.event_info(b).unwrap().state, EventState::Active);

    simu.run().unwrap();
    assert_eq!(*journal.lock().unwrap(), [("a", at(1)), ("b", at(2))]);
}

#[test]
fn continuous_precursor_releases_followers_when_it_ends() {
    let (mut simu, scheduler) = SimInit::new().init(at(0)).unwrap();
    let journal = Journal::default();

    let ticker = scheduler
        .schedule(
            at(0),
            named(&journal, "tick")
                .every(Duration::from_secs(1))
                .for_duration(Duration::from_secs(2)),
        )
        .unwrap();
    scheduler
        .schedule(at(0), named(&journal, "done").after([ticker]))
        .unwrap();

    simu.run().unwrap();
    assert_eq!(
        *journal.lock().unwrap(),
        [
            ("tick", at(0)),
            ("tick", at(1)),
            ("tick", at(2)),
            ("done", at(2))
        ]
    );
}

#[test]
fn follower_past_its_end_time_is_skipped() {
    let (mut simu, scheduler) = SimInit::new().init(at(0)).unwrap();
    let journal = Journal::default();

    let x = scheduler.schedule(at(5), named(&journal, "x")).unwrap();
    let y = scheduler
        .schedule(
            at(1),
            named(&journal, "y")
                .after([x])
                .every(Duration::from_secs(1))
                .till(at(3)),
        )
        .unwrap();
    let z = scheduler
        .schedule(at(0), named(&journal, "z").after([y]))
        .unwrap();

    simu.run().unwrap();

    assert_eq!(*journal.lock().unwrap(), [("x", at(5))]);
    assert_eq!(simu.event_info(y).unwrap().state, EventState::Cancelled);
    assert_eq!(simu.event_info(y).unwrap().pool, Pool::Past);
    // The skipped follower does not release its own followers.
    assert_eq!(simu.event_info(z).unwrap().state, EventState::Inactive);
}

#[test]
fn cancellation_does_not_release_followers() {
    let (mut simu, scheduler) = SimInit::new().init(at(0)).unwrap();
    let journal = Journal::default();

    let a = scheduler.schedule(at(1), named(&journal, "a")).unwrap();
    let b = scheduler
        .schedule(at(1), named(&journal, "b").after([a]))
        .unwrap();
    scheduler.cancel(a).unwrap();

    simu.run().unwrap();

    assert!(journal.lock().unwrap().is_empty());
    let info = simu.event_info(b).unwrap();
    assert_eq!(info.state, EventState::Inactive);
    assert_eq!(info.pool, Pool::Future);

    // A stranded follower can still be forced.
    scheduler.force_activate(b).unwrap();
    simu.run().unwrap();
    assert_eq!(*journal.lock().unwrap(), [("b", at(1))]);
}

#[test]
fn chain_resolves_within_one_time_step() {
    let (mut simu, scheduler) = SimInit::new().init(at(0)).unwrap();
    let journal = Journal::default();

    let mut previous = scheduler.schedule(at(3), named(&journal, "0")).unwrap();
    for name in ["1", "2", "3", "4"] {
        previous = scheduler
            .schedule(at(0), named(&journal, name).after([previous]))
            .unwrap();
    }

    simu.step().unwrap();
    let journal = journal.lock().unwrap();
    assert_eq!(
        journal.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
        ["0", "1", "2", "3", "4"]
    );
    assert!(journal.iter().all(|(_, time)| *time == at(3)));
}
