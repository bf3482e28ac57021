//! [`ActuationScheduler`] – the tick-driven command executor.
//!
//! The scheduler owns the [`DeviceRegistry`] and the consumer end of the
//! command queue.  [`ActuationScheduler::tick`] is called exactly once per
//! simulation step, on the thread that steps the simulation, and never
//! blocks: waiting is modelled as staying in [`ExecState::Executing`] and
//! re-checking on the next tick.
//!
//! # Per-tick behaviour
//!
//! - **Idle**: dequeue the front command, if any.  Targets are clamped to the
//!   actuator's limits, speeds to its velocity cap, and the setpoints are
//!   issued.  `Stop` and commands with no known actuator finish on this same
//!   tick.
//! - **Executing**: count one elapsed tick, then check in order: contact
//!   (for `stop_on_contact` commands), convergence or its timeout (for
//!   `wait_for_convergence` commands), or the fixed duration otherwise.
//!
//! Only one command is ever in flight, so no two commands can drive the same
//! actuator at once.  A rejected setpoint holds the failed command's
//! actuators and returns to `Idle`; it never takes the scheduler down.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use motus_hal::DeviceRegistry;
use motus_types::{Command, CommandKind, CommandReport, Outcome};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::command_queue::CommandReceiver;
use crate::convergence::{contact_detected, is_converged};

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecState {
    #[default]
    Idle,
    /// Transient, inside a tick that is pulling from the queue.
    Dequeuing,
    Executing,
    /// Finishing the in-flight command; nothing new will be dequeued.
    Draining,
}

impl fmt::Display for ExecState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecState::Idle => "idle",
            ExecState::Dequeuing => "dequeuing",
            ExecState::Executing => "executing",
            ExecState::Draining => "draining",
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    /// Sensors whose non-zero reading ends a `stop_on_contact` command.
    pub contact_sensors: Vec<String>,
}

/// Read-only view of the scheduler, published after every tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionSnapshot {
    pub tick: u64,
    pub state: ExecState,
    pub command_id: Option<Uuid>,
    pub command_kind: Option<CommandKind>,
    pub elapsed_ticks: u32,
    pub queue_depth: usize,
    pub completed: u64,
    pub failures: u64,
    pub last_report: Option<CommandReport>,
}

impl fmt::Display for ExecutionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state)?;
        if let Some(kind) = self.command_kind {
            write!(f, " {kind} ({} ticks)", self.elapsed_ticks)?;
        }
        write!(
            f,
            ", queued {}, completed {} ({} failed)",
            self.queue_depth, self.completed, self.failures
        )?;
        if let Some(r) = &self.last_report {
            write!(f, ", last {} {:?}", r.kind, r.outcome)?;
        }
        Ok(())
    }
}

/// Private in-flight copy of the command being executed.
struct InFlight {
    command: Command,
    /// Clamped setpoints actually issued.
    applied: BTreeMap<String, f64>,
    elapsed: u32,
    remaining_wait: u32,
}

pub struct ActuationScheduler {
    registry: DeviceRegistry,
    queue: CommandReceiver,
    config: SchedulerConfig,
    state: ExecState,
    in_flight: Option<InFlight>,
    tick: u64,
    draining: bool,
    completed: u64,
    failures: u64,
    last_report: Option<CommandReport>,
    snapshot: watch::Sender<ExecutionSnapshot>,
}

impl ActuationScheduler {
    pub fn new(registry: DeviceRegistry, queue: CommandReceiver, config: SchedulerConfig) -> Self {
        for sensor in &config.contact_sensors {
            if !registry.has_sensor(sensor) {
                warn!(sensor = %sensor, "contact sensor not registered; it will never fire");
            }
        }
        let (snapshot, _) = watch::channel(ExecutionSnapshot::default());
        Self {
            registry,
            queue,
            config,
            state: ExecState::Idle,
            in_flight: None,
            tick: 0,
            draining: false,
            completed: 0,
            failures: 0,
            last_report: None,
            snapshot,
        }
    }

    /// Receiver for the per-tick [`ExecutionSnapshot`].
    pub fn subscribe(&self) -> watch::Receiver<ExecutionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Nothing in flight and nothing queued.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.queue.is_empty()
    }

    /// Stop dequeuing once the in-flight command (if any) finishes.
    pub fn begin_drain(&mut self) {
        info!(queued = self.queue.len(), "draining scheduler");
        self.draining = true;
        if self.in_flight.is_none() {
            self.state = ExecState::Draining;
        }
    }

    /// Draining and nothing left in flight.
    pub fn is_drained(&self) -> bool {
        self.draining && self.in_flight.is_none()
    }

    /// Advance by one simulation tick.  Returns the report of a command that
    /// finished during this tick.
    pub fn tick(&mut self) -> Option<CommandReport> {
        self.tick += 1;
        let report = match self.in_flight.take() {
            Some(flight) => self.advance(flight),
            None if self.draining => {
                self.state = ExecState::Draining;
                None
            }
            None => self.start_next(),
        };
        if let Some(r) = &report {
            self.record(r);
        }
        self.publish();
        report
    }

    /// Hold every actuator where it is.
    pub fn hold_all(&mut self) {
        info!(tick = self.tick, "holding all actuators");
        if let Err(e) = self.registry.hold_all() {
            error!(error = %e, "hold incomplete");
        }
    }

    /// Hold every actuator now and abandon the in-flight command.
    pub fn emergency_stop(&mut self) -> Option<CommandReport> {
        warn!(tick = self.tick, "emergency stop");
        if let Err(e) = self.registry.hold_all() {
            error!(error = %e, "emergency hold incomplete");
        }
        let report = self
            .in_flight
            .take()
            .map(|f| self.finish(&f.command, Outcome::Stopped, f.elapsed));
        if let Some(r) = &report {
            self.record(r);
        }
        self.publish();
        report
    }

    // ── Idle ───────────────────────────────────────────────────────────────

    fn start_next(&mut self) -> Option<CommandReport> {
        self.state = ExecState::Dequeuing;
        let Some(command) = self.queue.try_dequeue_front() else {
            self.state = ExecState::Idle;
            return None;
        };
        debug!(command_id = %command.id, kind = %command.kind, tick = self.tick, "dequeued");

        match command.kind {
            CommandKind::Stop => {
                if let Err(e) = self.registry.hold_all() {
                    warn!(
                        command_id = %command.id,
                        error = %e,
                        "stop could not hold every actuator"
                    );
                }
                Some(self.finish(&command, Outcome::Stopped, 0))
            }
            CommandKind::Wait => match command.duration_ticks.unwrap_or(0) {
                0 => Some(self.finish(&command, Outcome::Elapsed, 0)),
                ticks => {
                    self.begin(command, BTreeMap::new(), ticks);
                    None
                }
            },
            _ => self.apply(command),
        }
    }

    fn apply(&mut self, command: Command) -> Option<CommandReport> {
        let mut setpoints: Vec<(&str, f64, f64)> = Vec::with_capacity(command.targets.len());
        for (name, &target) in &command.targets {
            let Some(limits) = self.registry.limits(name) else {
                warn!(
                    command_id = %command.id,
                    actuator = %name,
                    "skipping target for unknown actuator"
                );
                continue;
            };
            let setpoint = if command.kind == CommandKind::MoveBase {
                // velocity mode: spin toward the sign of the target
                let position = if target < 0.0 { f64::NEG_INFINITY } else { f64::INFINITY };
                let velocity = limits.clamp_velocity(target * command.speed.unwrap_or(1.0));
                (name.as_str(), position, velocity)
            } else {
                let position = limits.clamp_position(target);
                if position != target {
                    debug!(
                        actuator = %name,
                        requested = target,
                        clamped = position,
                        "target clamped"
                    );
                }
                let velocity = limits.clamp_velocity(command.speed.unwrap_or(limits.max_velocity));
                (name.as_str(), position, velocity)
            };
            setpoints.push(setpoint);
        }

        if setpoints.is_empty() {
            return Some(self.finish(&command, Outcome::Vacuous, 0));
        }

        let issued = setpoints.iter().try_for_each(|&(name, position, velocity)| {
            self.registry.set_position(name, position)?;
            self.registry.set_velocity(name, velocity)
        });
        if let Err(e) = issued {
            warn!(
                command_id = %command.id,
                error = %e,
                "setpoint rejected; holding command actuators"
            );
            if let Err(hold_err) = self.registry.hold(setpoints.iter().map(|(name, ..)| *name)) {
                error!(command_id = %command.id, error = %hold_err, "hold after fault failed");
            }
            return Some(self.finish(&command, Outcome::Faulted { details: e.to_string() }, 0));
        }

        let applied = setpoints
            .iter()
            .map(|&(name, position, _)| (name.to_string(), position))
            .collect();
        self.begin(command, applied, 0);
        None
    }

    fn begin(&mut self, command: Command, applied: BTreeMap<String, f64>, remaining_wait: u32) {
        self.in_flight = Some(InFlight {
            command,
            applied,
            elapsed: 0,
            remaining_wait,
        });
        self.state = ExecState::Executing;
    }

    // ── Executing ──────────────────────────────────────────────────────────

    fn advance(&mut self, mut flight: InFlight) -> Option<CommandReport> {
        flight.elapsed = flight.elapsed.saturating_add(1);
        let cmd = &flight.command;

        let outcome = if cmd.kind == CommandKind::Wait {
            flight.remaining_wait = flight.remaining_wait.saturating_sub(1);
            (flight.remaining_wait == 0).then_some(Outcome::Elapsed)
        } else if cmd.stop_on_contact && self.contact() {
            self.hold_applied(&flight);
            Some(Outcome::Contact)
        } else if cmd.wait_for_convergence {
            let current = self.registry.read_positions(flight.applied.keys().map(String::as_str));
            if is_converged(&current, &flight.applied, cmd.tolerance) {
                Some(Outcome::Converged)
            } else if flight.elapsed >= cmd.timeout_ticks {
                warn!(
                    command_id = %cmd.id,
                    kind = %cmd.kind,
                    ticks = flight.elapsed,
                    "convergence timed out"
                );
                Some(Outcome::TimedOut)
            } else {
                None
            }
        } else if flight.elapsed >= cmd.duration_ticks.unwrap_or(0) {
            if cmd.kind == CommandKind::MoveBase {
                self.hold_applied(&flight);
            }
            Some(Outcome::Elapsed)
        } else {
            None
        };

        match outcome {
            Some(outcome) => Some(self.finish(&flight.command, outcome, flight.elapsed)),
            None => {
                self.in_flight = Some(flight);
                None
            }
        }
    }

    fn contact(&self) -> bool {
        contact_detected(
            self.config
                .contact_sensors
                .iter()
                .filter_map(|s| self.registry.read(s)),
        )
    }

    fn hold_applied(&mut self, flight: &InFlight) {
        if let Err(e) = self.registry.hold(flight.applied.keys().map(String::as_str)) {
            warn!(command_id = %flight.command.id, error = %e, "hold failed");
        }
    }

    // ── Bookkeeping ────────────────────────────────────────────────────────

    fn finish(&mut self, command: &Command, outcome: Outcome, ticks: u32) -> CommandReport {
        self.state = if self.draining {
            ExecState::Draining
        } else {
            ExecState::Idle
        };
        if outcome.is_failure() {
            warn!(
                command_id = %command.id,
                kind = %command.kind,
                ?outcome,
                ticks,
                "command failed"
            );
        } else {
            info!(
                command_id = %command.id,
                kind = %command.kind,
                ?outcome,
                ticks,
                "command finished"
            );
        }
        CommandReport {
            command_id: command.id,
            kind: command.kind,
            outcome,
            ticks,
            finished_at: Utc::now(),
        }
    }

    fn record(&mut self, report: &CommandReport) {
        self.completed += 1;
        if report.outcome.is_failure() {
            self.failures += 1;
        }
        self.last_report = Some(report.clone());
    }

    fn publish(&self) {
        let flight = self.in_flight.as_ref();
        self.snapshot.send_replace(ExecutionSnapshot {
            tick: self.tick,
            state: self.state,
            command_id: flight.map(|f| f.command.id),
            command_kind: flight.map(|f| f.command.kind),
            elapsed_ticks: flight.map_or(0, |f| f.elapsed),
            queue_depth: self.queue.len(),
            completed: self.completed,
            failures: self.failures,
            last_report: self.last_report.clone(),
        });
    }
}
