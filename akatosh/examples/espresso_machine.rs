//! Example: espresso coffee machine.
//!
//! This example demonstrates in particular:
//!
//! * continuous events,
//! * events that wait for a precursor,
//! * cancellation of events, and its effect on followers,
//! * forced activation of a follower.
//!
//! ```text
//!                  every second, while brewing
//!                ┌──────────────────────────────┐
//!                │                              ▼
//!   Brew ●──►┌───────┐  water   ┌───────┐   ┌───────┐
//!            │ Pump  │◄─────────┤ Tank  │   │  Cup  │
//!            └───┬───┘          └───────┘   └───────┘
//!                │ ends                         ▲
//!                └──────────► Serve ────────────┘
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use akatosh::event::{Event, EventKey, EventState};
use akatosh::simulation::{ExecutionError, Scheduler, SimInit};
use akatosh::time::MonotonicTime;

/// Water dispensed by the pump at each tick [ml].
const DOSE: u32 = 2;

/// State of the machine, shared by the events.
#[derive(Debug, Default)]
struct Machine {
    /// Water left in the tank [ml].
    tank: u32,
    /// Water in the cup being filled [ml].
    cup: u32,
    /// Volumes of the cups served so far [ml].
    served: Vec<u32>,
    /// The pump event of the ongoing brew, if any.
    pump: Option<EventKey>,
}

/// Starts a brew of the specified duration and returns the key of the serving
/// event.
///
/// The pump dispenses a dose every second and stops on its own when the tank is
/// empty, in which case the cup is not served.
fn brew(
    scheduler: &Scheduler,
    machine: &Arc<Mutex<Machine>>,
    brew_time: Duration,
) -> Result<EventKey, ExecutionError> {
    let pump = scheduler.schedule(
        Duration::from_secs(1),
        Event::new({
            let machine = machine.clone();
            move |scheduler: &Scheduler| {
                let mut machine = machine.lock().unwrap();
                let dose = DOSE.min(machine.tank);
                machine.tank -= dose;
                machine.cup += dose;
                if machine.tank == 0 {
                    // Out of water: stop the pump without serving.
                    if let Some(pump) = machine.pump.take() {
                        scheduler.cancel(pump).unwrap();
                    }
                }
            }
        })
        .every(Duration::from_secs(1))
        .for_duration(brew_time - Duration::from_secs(1))
        .label("pump"),
    )?;
    machine.lock().unwrap().pump = Some(pump);

    let serve = scheduler.schedule(
        Duration::ZERO,
        Event::new({
            let machine = machine.clone();
            move || {
                let mut machine = machine.lock().unwrap();
                let cup = std::mem::take(&mut machine.cup);
                machine.served.push(cup);
                machine.pump = None;
            }
        })
        .after([pump])
        .label("serve"),
    )?;

    Ok(serve)
}

fn main() -> Result<(), ExecutionError> {
    // ---------------
    // Bench assembly.
    // ---------------

    let machine = Arc::new(Mutex::new(Machine {
        tank: 80,
        ..Machine::default()
    }));

    // Start time (arbitrary since events only depend on relative time).
    let t0 = MonotonicTime::EPOCH;
    let (mut simu, scheduler) = SimInit::new().init(t0)?;

    // ----------
    // Simulation.
    // ----------

    // Brew one espresso shot of 25 seconds.
    let serve = brew(&scheduler, &machine, Duration::from_secs(25))?;
    simu.run()?;
    assert_eq!(simu.time(), t0 + Duration::from_secs(25));
    assert_eq!(simu.event_info(serve)?.state, EventState::Ended);
    {
        let machine = machine.lock().unwrap();
        assert_eq!(machine.served, [50]);
        assert_eq!(machine.tank, 30);
    }

    // The next shot runs out of water after 15 seconds: the pump is cancelled
    // and the cup is not served.
    let t = simu.time();
    let serve = brew(&scheduler, &machine, Duration::from_secs(25))?;
    simu.run()?;
    assert_eq!(simu.time(), t + Duration::from_secs(15));
    assert_eq!(simu.event_info(serve)?.state, EventState::Inactive);
    {
        let machine = machine.lock().unwrap();
        assert_eq!(machine.tank, 0);
        assert_eq!(machine.cup, 30);
    }

    // Serve the partial shot anyway.
    scheduler.force_activate(serve)?;
    simu.run()?;
    assert_eq!(machine.lock().unwrap().served, [50, 30]);

    // Discard past events.
    assert_eq!(simu.purge_past(), 4);

    Ok(())
}
