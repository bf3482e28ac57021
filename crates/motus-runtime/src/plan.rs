//! Plan parsing and expansion into [`Command`]s.
//!
//! A *plan* is the translator's output: a JSON array of
//! `{ "action": ..., "params": { ... } }` steps.  [`parse_plan`] turns the raw
//! reply into [`StepDescription`]s (or a [`PlanError`]), and
//! [`PlanExpander`] validates and normalises each step into a concrete
//! [`Command`] with defaults filled in and durations converted to ticks.
//!
//! Expansion is forgiving: an unknown action or a malformed step is dropped
//! with a warning, and a malformed entry inside `targets` is skipped on its
//! own.  When nothing usable comes out, [`PlanExpander::expand_with_fallback`]
//! falls back to a preset pose named in the utterance.
//!
//! # Step vocabulary
//!
//! | `action` | Command | Notable params |
//! |---|---|---|
//! | `move_arm` | `MoveJoints` | `targets`, `speed`, `duration`, `tolerance`, `timeout`, `wait_for_convergence` |
//! | `move_robot` | `MoveBase` | `direction` or `targets`, `speed`, `duration` |
//! | `control_gripper` | `OpenGripper` / `CloseGripper` | `action` (`open`/`close`), `speed`, `timeout` |
//! | `wait` | `Wait` | `seconds` |

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use motus_hal::sim::{GRIPPER_FINGERS, LEFT_WHEEL, RIGHT_WHEEL};
use motus_types::{Command, CommandKind, DEFAULT_TOLERANCE, JointLimits};
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::directive::{BaseDirection, Directive, GripperAction};
use crate::presets::preset_from_utterance;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Why a translator reply could not be read as a plan.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("reply is not valid JSON: {0}")]
    NotJson(String),
    #[error("reply is JSON but not an array of steps")]
    NotAnArray,
    #[error("plan contains no usable steps")]
    Empty,
}

// ─────────────────────────────────────────────────────────────────────────────
// Raw steps
// ─────────────────────────────────────────────────────────────────────────────

/// One untyped plan step.  Transient: consumed by the expander.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDescription {
    pub action: String,
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
}

impl StepDescription {
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            action: action.into(),
            params,
        }
    }
}

/// Remove a surrounding Markdown code fence (```` ``` ```` or
/// ```` ```json ````) from a model reply.
pub fn strip_code_fences(raw: &str) -> &str {
    let s = raw.trim();
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let Some(end) = rest.find("```") else {
        return s;
    };
    let body = &rest[..end];
    let body = if body.starts_with("json") || body.starts_with("JSON") {
        body.split_once('\n').map_or("", |(_, tail)| tail)
    } else {
        body
    };
    body.trim()
}

/// Parse a translator reply into steps.
///
/// Array elements that are not `{action, params}` objects are skipped with a
/// warning.  An array with nothing usable left is [`PlanError::Empty`].
pub fn parse_plan(raw: &str) -> Result<Vec<StepDescription>, PlanError> {
    let value: Value = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| PlanError::NotJson(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(PlanError::NotAnArray);
    };

    let steps: Vec<StepDescription> = items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value(item) {
            Ok(step) => Some(step),
            Err(e) => {
                warn!(index = i, error = %e, "skipping malformed plan step");
                None
            }
        })
        .collect();

    if steps.is_empty() {
        return Err(PlanError::Empty);
    }
    Ok(steps)
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed params
// ─────────────────────────────────────────────────────────────────────────────

/// A number, or a string holding one (models quote numbers now and then).
fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    n.filter(|v| v.is_finite())
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(v) => number(&v)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("expected a number, got {v}"))),
    }
}

/// Joint targets, either as a map or as a list of pairs.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TargetSpec {
    /// `{"elbow_joint": 1.5, ...}`
    Map(BTreeMap<String, Value>),
    /// `[{"joint": "elbow_joint", "angle": 1.5}, ...]`
    List(Vec<Value>),
}

impl TargetSpec {
    /// Normalise to a name → value map, skipping malformed entries.
    pub fn normalize(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        match self {
            TargetSpec::Map(map) => {
                for (name, raw) in map {
                    match number(raw) {
                        Some(v) => {
                            out.insert(name.clone(), v);
                        }
                        None => warn!(joint = %name, value = %raw, "skipping non-numeric target"),
                    }
                }
            }
            TargetSpec::List(entries) => {
                for entry in entries {
                    let joint = entry.get("joint").and_then(Value::as_str);
                    let angle = entry.get("angle").and_then(number);
                    match (joint, angle) {
                        (Some(j), Some(a)) => {
                            out.insert(j.to_string(), a);
                        }
                        _ => warn!(entry = %entry, "skipping target entry without joint/angle"),
                    }
                }
            }
        }
        out
    }
}

/// Params of a `move_arm` step.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct MoveArmParams {
    /// Joint name → angle in radians.
    #[serde(default)]
    pub targets: Option<TargetSpec>,
    /// Joint speed cap in rad/s.
    #[serde(default, deserialize_with = "lenient_f64")]
    #[schemars(with = "Option<f64>")]
    pub speed: Option<f64>,
    /// Seconds to dwell when not waiting for convergence.
    #[serde(default, deserialize_with = "lenient_f64")]
    #[schemars(with = "Option<f64>")]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    #[schemars(with = "Option<f64>")]
    pub tolerance: Option<f64>,
    /// Seconds to wait for convergence before giving up.
    #[serde(default, deserialize_with = "lenient_f64")]
    #[schemars(with = "Option<f64>")]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub wait_for_convergence: Option<bool>,
}

/// Params of a `move_robot` step.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct MoveRobotParams {
    /// `forward`, `backward`, `left` or `right`.
    #[serde(default)]
    pub direction: Option<String>,
    /// Wheel name → direction in [-1, 1], used when `direction` is absent.
    #[serde(default)]
    pub targets: Option<TargetSpec>,
    #[serde(default, deserialize_with = "lenient_f64")]
    #[schemars(with = "Option<f64>")]
    pub speed: Option<f64>,
    /// Seconds to drive.
    #[serde(default, deserialize_with = "lenient_f64")]
    #[schemars(with = "Option<f64>")]
    pub duration: Option<f64>,
}

/// Params of a `control_gripper` step.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct GripperParams {
    /// `open` or `close`.
    pub action: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    #[schemars(with = "Option<f64>")]
    pub speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    #[schemars(with = "Option<f64>")]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    #[schemars(with = "Option<f64>")]
    pub timeout: Option<f64>,
}

/// Params of a `wait` step.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct WaitParams {
    #[serde(default, deserialize_with = "lenient_f64")]
    #[schemars(with = "Option<f64>")]
    pub seconds: Option<f64>,
}

/// Schema-only view of one step, tagged by `action`.
#[allow(dead_code)]
#[derive(JsonSchema)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
enum PlanStep {
    MoveArm(MoveArmParams),
    MoveRobot(MoveRobotParams),
    ControlGripper(GripperParams),
    Wait(WaitParams),
}

/// JSON Schema of a whole plan (an array of steps), for the translator
/// prompt.
pub fn plan_schema() -> Value {
    serde_json::to_value(schema_for!(Vec<PlanStep>)).unwrap_or(Value::Null)
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default timing of expanded commands.  Both profiles share every code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionProfile {
    #[default]
    Standard,
    Fast,
}

/// Seconds used for each default, per profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileTimings {
    pub arm_duration: f64,
    pub gripper_duration: f64,
    pub base_duration: f64,
    pub wait: f64,
    pub timeout: f64,
}

impl MotionProfile {
    pub fn timings(self) -> ProfileTimings {
        match self {
            MotionProfile::Standard => ProfileTimings {
                arm_duration: 3.0,
                gripper_duration: 2.0,
                base_duration: 1.0,
                wait: 1.0,
                timeout: 5.0,
            },
            MotionProfile::Fast => ProfileTimings {
                arm_duration: 1.5,
                gripper_duration: 1.0,
                base_duration: 0.5,
                wait: 0.5,
                timeout: 3.0,
            },
        }
    }
}

impl FromStr for MotionProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(MotionProfile::Standard),
            "fast" => Ok(MotionProfile::Fast),
            other => Err(format!("unknown motion profile '{other}' (expected standard or fast)")),
        }
    }
}

impl fmt::Display for MotionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MotionProfile::Standard => "standard",
            MotionProfile::Fast => "fast",
        })
    }
}

/// Configuration for [`PlanExpander`].
#[derive(Debug, Clone)]
pub struct ExpanderConfig {
    /// Simulation timestep, used to convert seconds to ticks.
    pub timestep_ms: u64,
    pub profile: MotionProfile,
    pub arm_speed: f64,
    pub gripper_speed: f64,
    pub base_speed: f64,
    pub tolerance: f64,
    pub gripper_actuators: Vec<String>,
    pub left_wheel: String,
    pub right_wheel: String,
}

impl Default for ExpanderConfig {
    fn default() -> Self {
        Self {
            timestep_ms: 16,
            profile: MotionProfile::Standard,
            arm_speed: 1.0,
            gripper_speed: 0.5,
            base_speed: 1.0,
            tolerance: DEFAULT_TOLERANCE,
            gripper_actuators: GRIPPER_FINGERS.iter().map(|s| s.to_string()).collect(),
            left_wheel: LEFT_WHEEL.to_string(),
            right_wheel: RIGHT_WHEEL.to_string(),
        }
    }
}

impl ExpanderConfig {
    /// Whole ticks covering `secs`, rounded up.  Negative or NaN input is 0.
    pub fn ticks(&self, secs: f64) -> u32 {
        let ticks = (secs * 1000.0 / self.timestep_ms.max(1) as f64).ceil();
        if ticks.is_nan() || ticks <= 0.0 {
            0
        } else {
            ticks.min(u32::MAX as f64) as u32
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Expander
// ─────────────────────────────────────────────────────────────────────────────

/// Where an expansion's commands came from.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanSource {
    /// Expanded from a translated plan of this many steps.
    Translated { steps: usize },
    /// Fallback preset pose.
    Preset(&'static str),
    /// Nothing usable.
    Nothing,
}

/// The outcome of [`PlanExpander::expand_with_fallback`].
#[derive(Debug, Clone)]
pub struct Expansion {
    pub source: PlanSource,
    pub commands: Vec<Command>,
}

/// Turns step descriptions into commands.
///
/// Holds a snapshot of actuator limits taken at startup so gripper targets
/// can be derived without touching the registry, which belongs to the
/// scheduler.
#[derive(Debug, Clone)]
pub struct PlanExpander {
    config: ExpanderConfig,
    limits: BTreeMap<String, JointLimits>,
}

impl PlanExpander {
    pub fn new(config: ExpanderConfig, limits: BTreeMap<String, JointLimits>) -> Self {
        Self { config, limits }
    }

    pub fn config(&self) -> &ExpanderConfig {
        &self.config
    }

    /// Expand every step, dropping the ones that cannot be understood.
    pub fn expand(&self, steps: &[StepDescription]) -> Vec<Command> {
        steps.iter().filter_map(|s| self.expand_step(s)).collect()
    }

    /// Expand `steps`; if that yields nothing, fall back to the preset pose
    /// named in `utterance`.
    pub fn expand_with_fallback(&self, steps: &[StepDescription], utterance: &str) -> Expansion {
        let commands = self.expand(steps);
        if !commands.is_empty() {
            return Expansion {
                source: PlanSource::Translated { steps: steps.len() },
                commands,
            };
        }
        match preset_from_utterance(utterance) {
            Some(preset) => Expansion {
                source: PlanSource::Preset(preset.name),
                commands: vec![self.move_joints(preset.targets(), &MoveArmParams::default())],
            },
            None => Expansion {
                source: PlanSource::Nothing,
                commands: Vec::new(),
            },
        }
    }

    /// Command for one step, or `None` if it was dropped.
    pub fn expand_step(&self, step: &StepDescription) -> Option<Command> {
        let params = Value::Object(step.params.clone());
        match step.action.as_str() {
            "move_arm" => {
                let p: MoveArmParams = typed(&step.action, params)?;
                let targets = p.targets.as_ref().map(TargetSpec::normalize).unwrap_or_default();
                if targets.is_empty() {
                    warn!("dropping move_arm step without usable targets");
                    return None;
                }
                Some(self.move_joints(targets, &p))
            }
            "move_robot" => {
                let p: MoveRobotParams = typed(&step.action, params)?;
                self.move_robot(&p)
            }
            "control_gripper" => {
                let p: GripperParams = typed(&step.action, params)?;
                let Ok(action) = p.action.parse::<GripperAction>() else {
                    warn!(action = %p.action, "dropping control_gripper step with unknown action");
                    return None;
                };
                let mut cmd = self.gripper(action);
                if let Some(speed) = p.speed {
                    cmd.speed = Some(speed.abs());
                }
                if let Some(d) = p.duration {
                    cmd.duration_ticks = Some(self.config.ticks(d));
                }
                if let Some(t) = p.timeout {
                    cmd.timeout_ticks = self.config.ticks(t);
                }
                Some(cmd)
            }
            "wait" => {
                let p: WaitParams = typed(&step.action, params)?;
                let secs = p.seconds.unwrap_or(self.config.profile.timings().wait);
                Some(Command::wait(self.config.ticks(secs)))
            }
            other => {
                warn!(action = %other, "dropping step with unknown action");
                None
            }
        }
    }

    /// A `MoveJoints` command over `targets`, defaults taken from `p`.
    pub fn move_joints(&self, targets: BTreeMap<String, f64>, p: &MoveArmParams) -> Command {
        let t = self.config.profile.timings();
        Command::move_joints(targets)
            .with_speed(p.speed.unwrap_or(self.config.arm_speed).abs())
            .with_duration_ticks(self.config.ticks(p.duration.unwrap_or(t.arm_duration)))
            .with_tolerance(p.tolerance.unwrap_or(self.config.tolerance).abs())
            .with_timeout_ticks(self.config.ticks(p.timeout.unwrap_or(t.timeout)))
            .with_convergence(p.wait_for_convergence.unwrap_or(true))
    }

    /// Open or close every gripper finger.  Targets are the limit positions
    /// of each finger; closing finishes early on contact.
    pub fn gripper(&self, action: GripperAction) -> Command {
        let t = self.config.profile.timings();
        let kind = match action {
            GripperAction::Open => CommandKind::OpenGripper,
            GripperAction::Close => CommandKind::CloseGripper,
        };
        let targets = self
            .config
            .gripper_actuators
            .iter()
            .filter_map(|name| {
                let limits = self.limits.get(name)?;
                let pos = match action {
                    GripperAction::Open => limits.min_position,
                    GripperAction::Close => limits.max_position,
                };
                pos.is_finite().then(|| (name.clone(), pos))
            })
            .collect();
        Command {
            targets,
            ..Command::new(kind)
        }
        .with_speed(self.config.gripper_speed)
        .with_duration_ticks(self.config.ticks(t.gripper_duration))
        .with_tolerance(self.config.tolerance)
        .with_timeout_ticks(self.config.ticks(t.timeout))
        .with_stop_on_contact(action == GripperAction::Close)
    }

    /// A timed base drive in `direction`.
    pub fn drive(&self, direction: BaseDirection, speed: f64, duration_secs: f64) -> Command {
        let (left, right) = direction.wheel_signs();
        self.base_command(BTreeMap::from([
            (self.config.left_wheel.clone(), left),
            (self.config.right_wheel.clone(), right),
        ]))
        .with_speed(speed.abs())
        .with_duration_ticks(self.config.ticks(duration_secs))
    }

    /// Command for a parsed raw directive.
    pub fn directive(&self, directive: &Directive) -> Command {
        match *directive {
            Directive::Drive {
                direction,
                speed,
                duration_secs,
            } => self.drive(direction, speed, duration_secs),
            Directive::Stop => Command::stop(),
        }
    }

    fn move_robot(&self, p: &MoveRobotParams) -> Option<Command> {
        let t = self.config.profile.timings();
        let speed = p.speed.unwrap_or(self.config.base_speed);
        let duration = p.duration.unwrap_or(t.base_duration);

        if let Some(word) = &p.direction {
            let Ok(direction) = word.parse::<BaseDirection>() else {
                warn!(direction = %word, "dropping move_robot step with unknown direction");
                return None;
            };
            return Some(self.drive(direction, speed, duration));
        }

        let targets: BTreeMap<String, f64> = p
            .targets
            .as_ref()
            .map(TargetSpec::normalize)
            .unwrap_or_default()
            .into_iter()
            .map(|(wheel, dir)| (wheel, dir.clamp(-1.0, 1.0)))
            .collect();
        if targets.is_empty() {
            warn!("dropping move_robot step without direction or targets");
            return None;
        }
        Some(
            self.base_command(targets)
                .with_speed(speed.abs())
                .with_duration_ticks(self.config.ticks(duration)),
        )
    }

    fn base_command(&self, targets: BTreeMap<String, f64>) -> Command {
        Command {
            targets,
            ..Command::new(CommandKind::MoveBase)
        }
        .with_convergence(false)
    }
}

/// Deserialize step params, logging and dropping the step on failure.
fn typed<T: de::DeserializeOwned>(action: &str, params: Value) -> Option<T> {
    match serde_json::from_value(params) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!(action = %action, error = %e, "dropping step with malformed params");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motus_hal::sim::GRIPPER_LIMITS;
    use serde_json::json;

    fn expander() -> PlanExpander {
        let limits = GRIPPER_FINGERS
            .iter()
            .map(|f| (f.to_string(), GRIPPER_LIMITS))
            .collect();
        PlanExpander::new(
            ExpanderConfig {
                timestep_ms: 50,
                ..ExpanderConfig::default()
            },
            limits,
        )
    }

    // ── parsing ────────────────────────────────────────────────────────────

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n[{\"action\":\"wait\"}]\n```";
        assert_eq!(strip_code_fences(raw), "[{\"action\":\"wait\"}]");
    }

    #[test]
    fn strips_bare_fence_and_leaves_plain_text() {
        assert_eq!(strip_code_fences("```\n[]\n```"), "[]");
        assert_eq!(strip_code_fences("  [1]  "), "[1]");
        assert_eq!(strip_code_fences("```unterminated"), "```unterminated");
    }

    #[test]
    fn parse_plan_reads_fenced_array() {
        let raw = "```json\n[{\"action\":\"wait\",\"params\":{\"seconds\":0.5}},{\"action\":\"move_arm\"}]\n```";
        let steps = parse_plan(raw).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].action, "wait");
        assert!(steps[1].params.is_empty());
    }

    #[test]
    fn parse_plan_errors() {
        assert!(matches!(parse_plan("I cannot do that"), Err(PlanError::NotJson(_))));
        assert_eq!(parse_plan("{\"action\":\"wait\"}"), Err(PlanError::NotAnArray));
        assert_eq!(parse_plan("[]"), Err(PlanError::Empty));
        assert_eq!(parse_plan("[1, \"two\"]"), Err(PlanError::Empty));
    }

    #[test]
    fn parse_plan_skips_malformed_elements() {
        let steps = parse_plan("[42, {\"action\":\"wait\"}, {\"params\":{}}]").unwrap();
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn schema_lists_every_action() {
        let schema = plan_schema().to_string();
        for action in ["move_arm", "move_robot", "control_gripper", "wait"] {
            assert!(schema.contains(action), "schema missing {action}");
        }
    }

    // ── targets ────────────────────────────────────────────────────────────

    #[test]
    fn map_and_list_targets_normalise_identically() {
        let map: TargetSpec = serde_json::from_value(
            json!({"elbow_joint": 1.5, "shoulder_lift_joint": "-1.0"}),
        )
        .unwrap();
        let list: TargetSpec = serde_json::from_value(json!([
            {"joint": "elbow_joint", "angle": 1.5},
            {"joint": "shoulder_lift_joint", "angle": -1.0}
        ]))
        .unwrap();
        assert_eq!(map.normalize(), list.normalize());
        assert_eq!(map.normalize()["shoulder_lift_joint"], -1.0);
    }

    #[test]
    fn malformed_entries_are_skipped_individually() {
        let list: TargetSpec = serde_json::from_value(json!([
            {"joint": "elbow_joint", "angle": 1.5},
            {"joint": "wrist_1_joint"},
            {"angle": 0.3},
            {"joint": "wrist_2_joint", "angle": "lots"},
            "garbage"
        ]))
        .unwrap();
        let targets = list.normalize();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets["elbow_joint"], 1.5);
    }

    // ── expansion ──────────────────────────────────────────────────────────

    #[test]
    fn move_arm_gets_defaults() {
        let step = StepDescription::new("move_arm", json!({"targets": {"elbow_joint": 1.5}}));
        let cmds = expander().expand(&[step]);
        assert_eq!(cmds.len(), 1);
        let c = &cmds[0];
        assert_eq!(c.kind, CommandKind::MoveJoints);
        assert_eq!(c.speed, Some(1.0));
        assert_eq!(c.duration_ticks, Some(60));
        assert_eq!(c.timeout_ticks, 100);
        assert!((c.tolerance - DEFAULT_TOLERANCE).abs() < f64::EPSILON);
        assert!(c.wait_for_convergence);
    }

    #[test]
    fn move_arm_respects_overrides() {
        let step = StepDescription::new(
            "move_arm",
            json!({
                "targets": {"elbow_joint": 1.5},
                "speed": "0.5",
                "timeout": 1.0,
                "wait_for_convergence": false,
                "duration": 0.2
            }),
        );
        let c = expander().expand_step(&step).unwrap();
        assert_eq!(c.speed, Some(0.5));
        assert_eq!(c.timeout_ticks, 20);
        assert_eq!(c.duration_ticks, Some(4));
        assert!(!c.wait_for_convergence);
    }

    #[test]
    fn unknown_and_malformed_steps_are_dropped() {
        let steps = vec![
            StepDescription::new("dance", json!({})),
            StepDescription::new("move_arm", json!({})),
            StepDescription::new(
                "move_arm",
                json!({"targets": {"elbow_joint": 1.0}, "speed": "fast"}),
            ),
            StepDescription::new("control_gripper", json!({"action": "squeeze"})),
            StepDescription::new("wait", json!({"seconds": 0.1})),
        ];
        let cmds = expander().expand(&steps);
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].kind, CommandKind::Wait);
        assert_eq!(cmds[0].duration_ticks, Some(2));
    }

    #[test]
    fn wait_defaults_to_profile_seconds() {
        let c = expander().expand_step(&StepDescription::new("wait", json!({}))).unwrap();
        assert_eq!(c.duration_ticks, Some(20));
    }

    #[test]
    fn close_gripper_targets_max_limit_and_stops_on_contact() {
        let step = StepDescription::new("control_gripper", json!({"action": "close"}));
        let c = expander().expand_step(&step).unwrap();
        assert_eq!(c.kind, CommandKind::CloseGripper);
        assert_eq!(c.targets.len(), 3);
        assert!(c.targets.values().all(|v| *v == GRIPPER_LIMITS.max_position));
        assert!(c.stop_on_contact);
        assert_eq!(c.speed, Some(0.5));
    }

    #[test]
    fn open_gripper_targets_min_limit() {
        let c = expander().gripper(GripperAction::Open);
        assert_eq!(c.kind, CommandKind::OpenGripper);
        assert!(c.targets.values().all(|v| *v == GRIPPER_LIMITS.min_position));
        assert!(!c.stop_on_contact);
        assert!(c.wait_for_convergence);
    }

    #[test]
    fn gripper_without_known_fingers_has_no_targets() {
        let e = PlanExpander::new(ExpanderConfig::default(), BTreeMap::new());
        assert!(e.gripper(GripperAction::Close).targets.is_empty());
    }

    #[test]
    fn move_robot_by_direction() {
        let step = StepDescription::new(
            "move_robot",
            json!({"direction": "left", "speed": 2.0, "duration": 0.5}),
        );
        let c = expander().expand_step(&step).unwrap();
        assert_eq!(c.kind, CommandKind::MoveBase);
        assert_eq!(c.targets[LEFT_WHEEL], -1.0);
        assert_eq!(c.targets[RIGHT_WHEEL], 1.0);
        assert_eq!(c.speed, Some(2.0));
        assert_eq!(c.duration_ticks, Some(10));
        assert!(!c.wait_for_convergence);
    }

    #[test]
    fn move_robot_by_targets_clamps_directions() {
        let step = StepDescription::new(
            "move_robot",
            json!({"targets": {"left wheel motor": 4.0, "right wheel motor": -0.5}}),
        );
        let c = expander().expand_step(&step).unwrap();
        assert_eq!(c.targets[LEFT_WHEEL], 1.0);
        assert_eq!(c.targets[RIGHT_WHEEL], -0.5);
    }

    #[test]
    fn move_robot_needs_direction_or_targets() {
        assert!(expander().expand_step(&StepDescription::new("move_robot", json!({}))).is_none());
        assert!(
            expander()
                .expand_step(&StepDescription::new("move_robot", json!({"direction": "up"})))
                .is_none()
        );
    }

    #[test]
    fn directive_stop_is_a_stop_command() {
        assert_eq!(expander().directive(&Directive::Stop).kind, CommandKind::Stop);
    }

    // ── fallback ───────────────────────────────────────────────────────────

    #[test]
    fn fallback_yields_exactly_the_preset() {
        let e = expander();
        for _ in 0..3 {
            let out = e.expand_with_fallback(&[], "lift the arm");
            assert_eq!(out.source, PlanSource::Preset("lift"));
            assert_eq!(out.commands.len(), 1);
            assert_eq!(out.commands[0].kind, CommandKind::MoveJoints);
            assert_eq!(
                out.commands[0].targets,
                crate::presets::preset_by_name("lift").unwrap().targets()
            );
        }
    }

    #[test]
    fn fallback_also_applies_when_every_step_is_dropped() {
        let steps = vec![StepDescription::new("dance", json!({}))];
        let out = expander().expand_with_fallback(&steps, "go home");
        assert_eq!(out.source, PlanSource::Preset("home"));
    }

    #[test]
    fn no_plan_and_no_preset_is_nothing() {
        let out = expander().expand_with_fallback(&[], "make me a sandwich");
        assert_eq!(out.source, PlanSource::Nothing);
        assert!(out.commands.is_empty());
    }

    #[test]
    fn translated_plan_wins_over_preset() {
        let steps = vec![StepDescription::new("wait", json!({"seconds": 1}))];
        let out = expander().expand_with_fallback(&steps, "lift");
        assert_eq!(out.source, PlanSource::Translated { steps: 1 });
    }

    #[test]
    fn seconds_to_ticks_rounds_up() {
        let cfg = ExpanderConfig {
            timestep_ms: 16,
            ..ExpanderConfig::default()
        };
        assert_eq!(cfg.ticks(1.0), 63);
        assert_eq!(cfg.ticks(0.0), 0);
        assert_eq!(cfg.ticks(-2.0), 0);
        assert_eq!(cfg.ticks(f64::NAN), 0);
    }

    #[test]
    fn profile_parses_and_changes_timings() {
        assert_eq!("FAST".parse::<MotionProfile>(), Ok(MotionProfile::Fast));
        assert!("ludicrous".parse::<MotionProfile>().is_err());
        assert!(
            MotionProfile::Fast.timings().arm_duration
                < MotionProfile::Standard.timings().arm_duration
        );
    }
}
