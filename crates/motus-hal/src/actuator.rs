//! Generic `Actuator` and `Sensor` traits for simulated or physical devices.
//!
//! Drivers implement these traits and register themselves with a
//! [`DeviceRegistry`][crate::registry::DeviceRegistry].  The scheduler only
//! ever talks to the traits, so a simulator backend can be swapped for a real
//! one without touching planning or execution logic.

use motus_types::{JointLimits, MotusError};

/// A position- and velocity-settable motor (arm joint, gripper finger,
/// wheel, …).
pub trait Actuator: Send + Sync {
    /// Stable identifier, e.g. `"shoulder_lift_joint"` or `"left wheel motor"`.
    fn id(&self) -> &str;

    /// Command the actuator toward `target` (radians).  An infinite target
    /// puts the motor in velocity mode, spinning in that direction.
    ///
    /// # Errors
    ///
    /// Returns [`MotusError::HardwareFault`] if the setpoint is rejected.
    fn set_position(&mut self, target: f64) -> Result<(), MotusError>;

    /// Set the speed (units/s) used to reach the position setpoint.
    ///
    /// # Errors
    ///
    /// Returns [`MotusError::HardwareFault`] if the setpoint is rejected.
    fn set_velocity(&mut self, velocity: f64) -> Result<(), MotusError>;

    /// Declared position and velocity limits.
    fn limits(&self) -> JointLimits;

    /// The most recently commanded position setpoint.
    fn commanded_position(&self) -> f64;
}

/// A readable scalar sensor (position encoder, touch sensor, …).
pub trait Sensor: Send + Sync {
    /// Stable identifier, e.g. `"elbow_joint_sensor"`.
    fn id(&self) -> &str;

    /// Return the latest reading.
    ///
    /// # Errors
    ///
    /// Returns [`MotusError::HardwareFault`] if the device cannot be read.
    fn read(&self) -> Result<f64, MotusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal in-process motor used only for tests.
    struct MockMotor {
        id: String,
        position: f64,
        velocity: f64,
    }

    impl Actuator for MockMotor {
        fn id(&self) -> &str {
            &self.id
        }

        fn set_position(&mut self, target: f64) -> Result<(), MotusError> {
            self.position = target;
            Ok(())
        }

        fn set_velocity(&mut self, velocity: f64) -> Result<(), MotusError> {
            self.velocity = velocity;
            Ok(())
        }

        fn limits(&self) -> JointLimits {
            JointLimits::new(-1.0, 1.0, 2.0)
        }

        fn commanded_position(&self) -> f64 {
            self.position
        }
    }

    struct ConstantSensor(f64);

    impl Sensor for ConstantSensor {
        fn id(&self) -> &str {
            "constant"
        }

        fn read(&self) -> Result<f64, MotusError> {
            Ok(self.0)
        }
    }

    #[test]
    fn mock_motor_records_setpoints() {
        let mut motor = MockMotor {
            id: "elbow_joint".to_string(),
            position: 0.0,
            velocity: 0.0,
        };
        motor.set_position(0.5).unwrap();
        motor.set_velocity(1.5).unwrap();
        assert_eq!(motor.id(), "elbow_joint");
        assert!((motor.commanded_position() - 0.5).abs() < f64::EPSILON);
        assert!((motor.velocity - 1.5).abs() < f64::EPSILON);
        assert_eq!(motor.limits().max_velocity, 2.0);
    }

    #[test]
    fn sensor_trait_object_reads() {
        let sensor: Box<dyn Sensor> = Box::new(ConstantSensor(0.25));
        assert_eq!(sensor.read().unwrap(), 0.25);
    }
}
