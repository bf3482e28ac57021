//! [`SimDriver`] – the outer simulation loop.
//!
//! This is the one place that advances the clock: every iteration calls
//! [`SimWorld::step`] and then [`ActuationScheduler::tick`], on the same
//! thread.  With `realtime` set, each iteration is paced to the timestep.
//!
//! Setting the shutdown flag abandons whatever is in flight after an
//! emergency hold.  Setting the drain flag lets the in-flight command finish,
//! then holds every actuator and returns; queued commands stay queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use motus_hal::SimWorld;
use motus_types::CommandReport;
use tracing::{debug, info, warn};

use crate::scheduler::ActuationScheduler;

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Sleep out the rest of each timestep.
    pub realtime: bool,
    /// Stop after this many ticks.
    pub max_ticks: Option<u64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            realtime: true,
            max_ticks: None,
        }
    }
}

/// Counts from a finished [`SimDriver::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverSummary {
    pub ticks: u64,
    pub completed: u64,
    pub failures: u64,
    /// The loop ended because a drain finished.
    pub drained: bool,
}

pub struct SimDriver {
    world: SimWorld,
    scheduler: ActuationScheduler,
    config: DriverConfig,
}

impl SimDriver {
    pub fn new(world: SimWorld, scheduler: ActuationScheduler, config: DriverConfig) -> Self {
        Self {
            world,
            scheduler,
            config,
        }
    }

    pub fn world(&self) -> &SimWorld {
        &self.world
    }

    pub fn scheduler(&self) -> &ActuationScheduler {
        &self.scheduler
    }

    /// Advance one tick: step the world, then the scheduler.
    pub fn step(&mut self) -> Option<CommandReport> {
        self.world.step();
        self.scheduler.tick()
    }

    /// Run until `shutdown` is set, a requested drain completes, or
    /// `max_ticks` is reached.
    pub fn run(&mut self, shutdown: &AtomicBool, drain: &AtomicBool) -> DriverSummary {
        let period = Duration::from_millis(self.world.timestep_ms());
        let mut summary = DriverSummary::default();
        let mut draining = false;
        info!(
            timestep_ms = self.world.timestep_ms(),
            realtime = self.config.realtime,
            "simulation loop started"
        );

        while !shutdown.load(Ordering::SeqCst) {
            if self.config.max_ticks.is_some_and(|max| summary.ticks >= max) {
                break;
            }
            if !draining && drain.load(Ordering::SeqCst) {
                self.scheduler.begin_drain();
                draining = true;
            }
            if draining && self.scheduler.is_drained() {
                self.scheduler.hold_all();
                summary.drained = true;
                break;
            }
            let started = Instant::now();
            if let Some(report) = self.step() {
                summary.completed += 1;
                if report.outcome.is_failure() {
                    summary.failures += 1;
                }
            }
            summary.ticks += 1;

            if self.config.realtime {
                let spent = started.elapsed();
                match period.checked_sub(spent) {
                    Some(rest) => thread::sleep(rest),
                    None => debug!(
                        overrun_us = (spent - period).as_micros() as u64,
                        "tick overran timestep"
                    ),
                }
            }
        }

        if shutdown.load(Ordering::SeqCst) {
            if let Some(report) = self.scheduler.emergency_stop() {
                warn!(
                    command_id = %report.command_id,
                    kind = %report.kind,
                    "in-flight command abandoned at shutdown"
                );
            }
        }
        info!(
            ticks = summary.ticks,
            completed = summary.completed,
            failures = summary.failures,
            "simulation loop stopped"
        );
        summary
    }

}
