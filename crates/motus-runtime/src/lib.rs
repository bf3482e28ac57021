//! `motus-runtime` – from inbound text to actuator setpoints.
//!
//! Text arrives at the [`Controller`] on the async side, becomes
//! [`Command`][motus_types::Command]s via the fast paths or the translator
//! and [`PlanExpander`], and is queued.  On the simulation thread the
//! [`SimDriver`] steps the world and ticks the [`ActuationScheduler`], which
//! executes one command at a time against the device registry.  The command
//! queue is the only thing the two sides share.
//!
//! # Modules
//!
//! - [`command_queue`] – unbounded FIFO; cloneable sender, single receiver.
//! - [`convergence`] – pure tolerance and contact checks.
//! - [`scheduler`] – [`ActuationScheduler`]: the per-tick state machine,
//!   command reports and the published [`ExecutionSnapshot`].
//! - [`plan`] – plan parsing, typed step params, the plan JSON Schema, and
//!   [`PlanExpander`] with preset fallback.
//! - [`presets`] – named arm poses and utterance keyword matching.
//! - [`directive`] – raw `forward 1.0 2.0` directives and gripper phrases.
//! - [`translator`] – [`PlanTranslator`] and the OpenAI-compatible
//!   [`LlmTranslator`].
//! - [`controller`] – [`Controller`]: routing, queueing, escaped replies.
//! - [`driver`] – [`SimDriver`]: the single place the clock is advanced.
//! - [`telemetry`] – [`init_tracing`]: console logs plus optional OTLP
//!   export when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

pub mod command_queue;
pub mod controller;
pub mod convergence;
pub mod directive;
pub mod driver;
pub mod plan;
pub mod presets;
pub mod scheduler;
pub mod telemetry;
pub mod translator;

pub use command_queue::{CommandReceiver, CommandSender, command_queue};
pub use controller::{Controller, Inbound, escape_reply};
pub use driver::{DriverConfig, DriverSummary, SimDriver};
pub use plan::{ExpanderConfig, MotionProfile, PlanError, PlanExpander, StepDescription, parse_plan};
pub use scheduler::{ActuationScheduler, ExecState, ExecutionSnapshot, SchedulerConfig};
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use translator::{
    LlmTranslator, OfflineTranslator, PlanTranslator, TranslateError, TranslatorConfig,
};
