//! `motus-types` – shared data model for the Motus actuation stack.
//!
//! Everything that crosses a crate boundary lives here: the [`Command`]
//! produced by plan expansion and consumed by the actuation scheduler, the
//! per-actuator [`JointLimits`], the [`CommandReport`] emitted when a
//! command finishes, and the global [`MotusError`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Convergence tolerance applied when a step does not specify one.
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// Convergence ceiling used when a command is built without an explicit
/// timeout (roughly 5 s at a 16 ms timestep).
pub const DEFAULT_TIMEOUT_TICKS: u32 = 313;

// ─────────────────────────────────────────────────────────────────────────────
// Command
// ─────────────────────────────────────────────────────────────────────────────

/// The kind of actuation a [`Command`] requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Position-controlled move of one or more arm joints.
    MoveJoints,
    /// Velocity-mode drive of the mobile base wheels for a fixed duration.
    MoveBase,
    /// Drive every gripper finger to its minimum (open) limit.
    OpenGripper,
    /// Drive every gripper finger to its maximum (closed) limit.
    CloseGripper,
    /// Dwell without touching any actuator.
    Wait,
    /// Hold every actuator at its sensed position with zero velocity.
    Stop,
}

impl CommandKind {
    /// `true` for kinds whose targets are positions checked for convergence.
    pub fn is_positional(self) -> bool {
        matches!(
            self,
            CommandKind::MoveJoints | CommandKind::OpenGripper | CommandKind::CloseGripper
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandKind::MoveJoints => "move_joints",
            CommandKind::MoveBase => "move_base",
            CommandKind::OpenGripper => "open_gripper",
            CommandKind::CloseGripper => "close_gripper",
            CommandKind::Wait => "wait",
            CommandKind::Stop => "stop",
        };
        f.write_str(s)
    }
}

/// One atomic actuation request.
///
/// A command is owned by the queue once enqueued and moved into the
/// scheduler on dequeue, so nothing can alter it while it is in flight.
///
/// For [`CommandKind::MoveBase`] the target values are normalised wheel
/// directions in `[-1, 1]`, scaled by `speed`; for every other kind they are
/// joint positions in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,
    pub kind: CommandKind,
    /// Actuator name → target. Empty for `Wait` and `Stop`.
    pub targets: BTreeMap<String, f64>,
    /// Velocity cap in units per second.
    pub speed: Option<f64>,
    /// Fixed dwell in ticks, used when convergence is not awaited.
    pub duration_ticks: Option<u32>,
    pub tolerance: f64,
    /// Maximum ticks to wait for convergence before a soft failure.
    pub timeout_ticks: u32,
    pub wait_for_convergence: bool,
    /// Finish early as soon as any contact sensor reports a non-zero value.
    pub stop_on_contact: bool,
}

impl Command {
    /// Create a command of `kind` with no targets and default tolerances.
    pub fn new(kind: CommandKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            targets: BTreeMap::new(),
            speed: None,
            duration_ticks: None,
            tolerance: DEFAULT_TOLERANCE,
            timeout_ticks: DEFAULT_TIMEOUT_TICKS,
            wait_for_convergence: kind.is_positional(),
            stop_on_contact: false,
        }
    }

    /// A `MoveJoints` command over `targets` that waits for convergence.
    pub fn move_joints(targets: BTreeMap<String, f64>) -> Self {
        Self {
            targets,
            ..Self::new(CommandKind::MoveJoints)
        }
    }

    /// A `Wait` command that dwells for `ticks` ticks.
    pub fn wait(ticks: u32) -> Self {
        Self {
            duration_ticks: Some(ticks),
            ..Self::new(CommandKind::Wait)
        }
    }

    /// A `Stop` command.
    pub fn stop() -> Self {
        Self::new(CommandKind::Stop)
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_duration_ticks(mut self, ticks: u32) -> Self {
        self.duration_ticks = Some(ticks);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_timeout_ticks(mut self, ticks: u32) -> Self {
        self.timeout_ticks = ticks;
        self
    }

    pub fn with_convergence(mut self, wait: bool) -> Self {
        self.wait_for_convergence = wait;
        self
    }

    pub fn with_stop_on_contact(mut self, stop: bool) -> Self {
        self.stop_on_contact = stop;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Joint limits
// ─────────────────────────────────────────────────────────────────────────────

/// Position and velocity limits declared by an actuator.
///
/// Unbounded axes (continuous wheels) use infinities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimits {
    pub min_position: f64,
    pub max_position: f64,
    pub max_velocity: f64,
}

impl JointLimits {
    pub fn new(min_position: f64, max_position: f64, max_velocity: f64) -> Self {
        Self {
            min_position,
            max_position,
            max_velocity,
        }
    }

    /// Limits of a continuous joint that can spin forever.
    pub fn unbounded(max_velocity: f64) -> Self {
        Self::new(f64::NEG_INFINITY, f64::INFINITY, max_velocity)
    }

    /// Clamp a requested position into `[min_position, max_position]`.
    pub fn clamp_position(&self, requested: f64) -> f64 {
        requested.max(self.min_position).min(self.max_position)
    }

    /// Clamp a requested speed into `[0, max_velocity]`.
    pub fn clamp_velocity(&self, requested: f64) -> f64 {
        requested.abs().min(self.max_velocity)
    }
}

impl Default for JointLimits {
    fn default() -> Self {
        Self::unbounded(f64::INFINITY)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution results
// ─────────────────────────────────────────────────────────────────────────────

/// How a command left the `Executing` state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Every observable target reached tolerance.
    Converged,
    /// A contact sensor fired before convergence.
    Contact,
    /// The fixed duration elapsed (no convergence check requested).
    Elapsed,
    /// Soft failure: convergence was not reached within the timeout.
    TimedOut,
    /// A `Stop` command was applied.
    Stopped,
    /// No target named a known actuator, nothing to do.
    Vacuous,
    /// Applying a setpoint failed; the command was abandoned.
    Faulted { details: String },
}

impl Outcome {
    /// `true` for outcomes the user should hear about as a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::TimedOut | Outcome::Faulted { .. })
    }
}

/// Summary emitted by the scheduler when a command finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReport {
    pub command_id: Uuid,
    pub kind: CommandKind,
    pub outcome: Outcome,
    /// Ticks spent in `Executing`, counted from the dequeue tick.
    pub ticks: u32,
    pub finished_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Global error type for device faults and configuration.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MotusError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
