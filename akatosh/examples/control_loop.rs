//! Example: real-time control loop with a deadline watchdog.
//!
//! This example demonstrates in particular:
//!
//! * real-time execution,
//! * deadline enforcement for continuous events,
//! * logging with the simulation time.
//!
//! A controller samples a sensor every 100ms of simulation time, which is paced
//! against the wall clock. Each cycle must complete within its 100ms step. The
//! fifth cycle overruns, so the controller is stopped and its watchdog engages
//! a fallback that holds the last command until the end of the run.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use akatosh::event::Event;
use akatosh::simulation::{ExecutionError, Scheduler, SimInit};
use akatosh::time::MonotonicTime;
use akatosh::tracing::SimulationTime;

const PERIOD: Duration = Duration::from_millis(100);

fn main() -> Result<(), ExecutionError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_timer(SimulationTime::with_system_timer())
        .init();

    let t0 = MonotonicTime::EPOCH;
    let (mut simu, scheduler) = SimInit::new()
        .set_realtime(1.0)
        .set_clock_tolerance(Duration::from_millis(5))
        .init(t0)?;

    let cycles = Arc::new(Mutex::new(0u32));
    let fallback_engaged = Arc::new(Mutex::new(false));

    scheduler.schedule(
        Duration::ZERO,
        Event::new({
            let cycles = cycles.clone();
            move |scheduler: &Scheduler| {
                let mut cycles = cycles.lock().unwrap();
                *cycles += 1;
                info!(cycle = *cycles, time = %scheduler.time(), "control cycle");
                if *cycles == 5 {
                    // Simulated overrun.
                    thread::sleep(PERIOD + Duration::from_millis(20));
                }
            }
        })
        .every(PERIOD)
        .for_duration(Duration::from_secs(1))
        .step(PERIOD)
        .label("controller")
        .watchdog({
            let fallback_engaged = fallback_engaged.clone();
            move |violation| {
                warn!(%violation, "engaging fallback");
                *fallback_engaged.lock().unwrap() = true;
            }
        }),
    )?;

    simu.run()?;

    assert_eq!(*cycles.lock().unwrap(), 5);
    assert!(*fallback_engaged.lock().unwrap());

    Ok(())
}
