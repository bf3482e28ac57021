//! In-process robot simulator for tests and headless runs.
//!
//! [`SimWorld`] owns the simulated joint state and the single fixed-timestep
//! advance primitive, [`SimWorld::step`].  The drivers it hands out through
//! the [`DeviceRegistry`] (motors, position sensors, touch sensors) share that
//! state, so a setpoint written through the registry becomes visible in the
//! sensors after the next step.
//!
//! # Example
//!
//! ```rust
//! use motus_hal::sim::SimWorld;
//!
//! let (mut world, mut registry) = SimWorld::builder(50)
//!     .with_ur10e_arm()
//!     .build();
//!
//! registry.set_position("elbow_joint", 0.1).unwrap();
//! registry.set_velocity("elbow_joint", 1.0).unwrap();
//! world.step();
//! world.step();
//! assert!((registry.sensed_position("elbow_joint").unwrap() - 0.1).abs() < 1e-9);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use motus_types::{JointLimits, MotusError};

use crate::actuator::{Actuator, Sensor};
use crate::registry::{DeviceManifest, DeviceRegistry};

/// Joint names of the UR10e arm, base to tool.
pub const UR10E_JOINTS: [&str; 6] = [
    "shoulder_pan_joint",
    "shoulder_lift_joint",
    "elbow_joint",
    "wrist_1_joint",
    "wrist_2_joint",
    "wrist_3_joint",
];

/// Proximal joints of the three-finger gripper.
pub const GRIPPER_FINGERS: [&str; 3] =
    ["finger_1_joint_1", "finger_2_joint_1", "finger_middle_joint_1"];

pub const LEFT_WHEEL: &str = "left wheel motor";
pub const RIGHT_WHEEL: &str = "right wheel motor";

/// Finger travel of the three-finger gripper (radians).
pub const GRIPPER_LIMITS: JointLimits = JointLimits {
    min_position: 0.0495,
    max_position: 1.2218,
    max_velocity: 2.0,
};

/// Suffix appended to an actuator id to name its position sensor.
pub const POSITION_SENSOR_SUFFIX: &str = "_sensor";

// ─────────────────────────────────────────────────────────────────────────────
// Shared joint state
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct JointState {
    position: f64,
    target: f64,
    velocity: f64,
    limits: JointLimits,
    faulted: bool,
}

type SharedJoint = Arc<Mutex<JointState>>;

fn lock(joint: &SharedJoint) -> MutexGuard<'_, JointState> {
    joint.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─────────────────────────────────────────────────────────────────────────────
// Sim drivers
// ─────────────────────────────────────────────────────────────────────────────

/// Simulated motor.  Setpoints are stored and realised by [`SimWorld::step`].
pub struct SimMotor {
    id: String,
    joint: SharedJoint,
}

impl Actuator for SimMotor {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_position(&mut self, target: f64) -> Result<(), MotusError> {
        let mut j = lock(&self.joint);
        if j.faulted {
            return Err(MotusError::HardwareFault {
                component: self.id.clone(),
                details: "motor not responding".into(),
            });
        }
        j.target = target;
        Ok(())
    }

    fn set_velocity(&mut self, velocity: f64) -> Result<(), MotusError> {
        let mut j = lock(&self.joint);
        if j.faulted {
            return Err(MotusError::HardwareFault {
                component: self.id.clone(),
                details: "motor not responding".into(),
            });
        }
        j.velocity = velocity.abs();
        Ok(())
    }

    fn limits(&self) -> JointLimits {
        lock(&self.joint).limits
    }

    fn commanded_position(&self) -> f64 {
        lock(&self.joint).target
    }
}

/// Encoder reporting the true position of one joint.
pub struct SimPositionSensor {
    id: String,
    joint: SharedJoint,
}

impl Sensor for SimPositionSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn read(&self) -> Result<f64, MotusError> {
        Ok(lock(&self.joint).position)
    }
}

/// Fingertip touch sensor: reads `1.0` once its finger has closed past
/// `contact_at`, standing in for an object between the fingers.
pub struct SimTouchSensor {
    id: String,
    joint: SharedJoint,
    contact_at: f64,
}

impl Sensor for SimTouchSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn read(&self) -> Result<f64, MotusError> {
        let touching = lock(&self.joint).position >= self.contact_at;
        Ok(if touching { 1.0 } else { 0.0 })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SimWorld
// ─────────────────────────────────────────────────────────────────────────────

/// The simulated robot and its clock.
pub struct SimWorld {
    timestep_ms: u64,
    ticks: u64,
    joints: Vec<(String, SharedJoint)>,
}

impl std::fmt::Debug for SimWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimWorld")
            .field("timestep_ms", &self.timestep_ms)
            .field("ticks", &self.ticks)
            .field("joints", &self.joints.len())
            .finish()
    }
}

impl SimWorld {
    /// Start building a world that advances `timestep_ms` per step.
    pub fn builder(timestep_ms: u64) -> SimWorldBuilder {
        SimWorldBuilder {
            timestep_ms,
            ..SimWorldBuilder::default()
        }
    }

    pub fn timestep_ms(&self) -> u64 {
        self.timestep_ms
    }

    /// Number of steps taken so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advance the clock by one timestep.
    ///
    /// Each joint moves toward its target by at most `velocity * dt`,
    /// snapping onto the target when it is within reach.  An infinite target
    /// spins the joint in that direction.  Positions stay inside the joint's
    /// limits.
    pub fn step(&mut self) {
        let dt = self.timestep_ms as f64 / 1000.0;
        for (_, joint) in &self.joints {
            let mut j = lock(joint);
            let reach = j.velocity * dt;
            let next = if j.target.is_infinite() {
                j.position + reach * j.target.signum()
            } else {
                let delta = j.target - j.position;
                if delta.abs() <= reach {
                    j.target
                } else {
                    j.position + reach * delta.signum()
                }
            };
            j.position = j.limits.clamp_position(next);
        }
        self.ticks += 1;
    }

    /// True position of joint `id`.
    pub fn position(&self, id: &str) -> Option<f64> {
        self.joint(id).map(|j| lock(j).position)
    }

    /// Current velocity setpoint of joint `id`.
    pub fn velocity(&self, id: &str) -> Option<f64> {
        self.joint(id).map(|j| lock(j).velocity)
    }

    /// Teleport joint `id` (setpoint included) to `position`.
    pub fn set_position(&mut self, id: &str, position: f64) {
        if let Some(joint) = self.joint(id) {
            let mut j = lock(joint);
            j.position = position;
            j.target = position;
        }
    }

    /// Make every setpoint on joint `id` fail until cleared.
    pub fn set_fault(&mut self, id: &str, faulted: bool) {
        if let Some(joint) = self.joint(id) {
            lock(joint).faulted = faulted;
        }
    }

    fn joint(&self, id: &str) -> Option<&SharedJoint> {
        self.joints.iter().find(|(name, _)| name == id).map(|(_, j)| j)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

struct JointSpec {
    id: String,
    limits: JointLimits,
    initial: f64,
    position_sensor: bool,
}

struct TouchSpec {
    id: String,
    finger: String,
    contact_at: f64,
}

/// Builder for a [`SimWorld`] and the [`DeviceRegistry`] exposing its
/// devices.
///
/// Call the `with_*` methods to add hardware, then [`build`][Self::build].
#[derive(Default)]
pub struct SimWorldBuilder {
    timestep_ms: u64,
    joints: Vec<JointSpec>,
    touch: Vec<TouchSpec>,
}

impl SimWorldBuilder {
    /// Add one joint with a linked `<id>_sensor` position sensor.
    pub fn with_joint(mut self, id: impl Into<String>, limits: JointLimits, initial: f64) -> Self {
        self.joints.push(JointSpec {
            id: id.into(),
            limits,
            initial,
            position_sensor: true,
        });
        self
    }

    /// Add the six UR10e joints, all starting at zero.
    pub fn with_ur10e_arm(mut self) -> Self {
        for (i, name) in UR10E_JOINTS.iter().enumerate() {
            // base and shoulder joints are the slower, larger drives
            let max_velocity = if i < 2 { 2.094 } else { 3.142 };
            let limits =
                JointLimits::new(-std::f64::consts::TAU, std::f64::consts::TAU, max_velocity);
            self = self.with_joint(*name, limits, 0.0);
        }
        self
    }

    /// Add the three gripper fingers, starting fully open.
    pub fn with_three_finger_gripper(mut self) -> Self {
        for name in GRIPPER_FINGERS {
            self = self.with_joint(name, GRIPPER_LIMITS, GRIPPER_LIMITS.min_position);
        }
        self
    }

    /// Add a touch sensor `id` that reports contact once `finger` passes
    /// `contact_at`.  Ignored at build time if `finger` was never added.
    pub fn with_touch_sensor(
        mut self,
        id: impl Into<String>,
        finger: impl Into<String>,
        contact_at: f64,
    ) -> Self {
        self.touch.push(TouchSpec {
            id: id.into(),
            finger: finger.into(),
            contact_at,
        });
        self
    }

    /// Add the two continuous wheels of a differential-drive base.  Wheels
    /// have no position sensors.
    pub fn with_differential_base(mut self) -> Self {
        for name in [LEFT_WHEEL, RIGHT_WHEEL] {
            self.joints.push(JointSpec {
                id: name.to_string(),
                limits: JointLimits::unbounded(6.28),
                initial: 0.0,
                position_sensor: false,
            });
        }
        self
    }

    /// Manifest of every device this builder will create.
    pub fn manifest(&self) -> DeviceManifest {
        let mut manifest = DeviceManifest::new();
        for spec in &self.joints {
            manifest = manifest.actuator(spec.id.clone());
            if spec.position_sensor {
                manifest = manifest.sensor(format!("{}{POSITION_SENSOR_SUFFIX}", spec.id));
            }
        }
        for spec in &self.touch {
            manifest = manifest.sensor(spec.id.clone());
        }
        manifest
    }

    /// Consume the builder and return the world plus its device registry.
    pub fn build(self) -> (SimWorld, DeviceRegistry) {
        let mut registry = DeviceRegistry::new();
        let mut joints = Vec::with_capacity(self.joints.len());

        for spec in self.joints {
            let joint = Arc::new(Mutex::new(JointState {
                position: spec.initial,
                target: spec.initial,
                velocity: 0.0,
                limits: spec.limits,
                faulted: false,
            }));
            registry.register_actuator(Box::new(SimMotor {
                id: spec.id.clone(),
                joint: Arc::clone(&joint),
            }));
            if spec.position_sensor {
                let sensor_id = format!("{}{POSITION_SENSOR_SUFFIX}", spec.id);
                registry.register_sensor(Box::new(SimPositionSensor {
                    id: sensor_id.clone(),
                    joint: Arc::clone(&joint),
                }));
                registry.link_position_sensor(spec.id.clone(), sensor_id);
            }
            joints.push((spec.id, joint));
        }

        for spec in self.touch {
            let Some((_, joint)) = joints.iter().find(|(name, _)| *name == spec.finger) else {
                continue;
            };
            registry.register_sensor(Box::new(SimTouchSensor {
                id: spec.id,
                joint: Arc::clone(joint),
                contact_at: spec.contact_at,
            }));
        }

        let world = SimWorld {
            timestep_ms: self.timestep_ms,
            ticks: 0,
            joints,
        };
        (world, registry)
    }
}
