//! [`DeviceRegistry`] – named actuators and sensors behind one interface.
//!
//! The registry owns every registered [`Actuator`] and [`Sensor`] driver and
//! resolves them by string identifier.  Each actuator may be linked to a
//! position sensor; [`DeviceRegistry::read_positions`] uses those links to
//! report the current position of the actuators a command targets.
//!
//! The registry is built once at startup.  [`DeviceRegistry::missing`]
//! compares it against a [`DeviceManifest`] so absent devices are reported
//! up front instead of being discovered one setpoint at a time.

use std::collections::{BTreeMap, HashMap};

use motus_types::{JointLimits, MotusError};
use tracing::debug;

use crate::actuator::{Actuator, Sensor};

/// The devices a robot configuration expects to find.
#[derive(Debug, Clone, Default)]
pub struct DeviceManifest {
    pub actuators: Vec<String>,
    pub sensors: Vec<String>,
}

impl DeviceManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actuator(mut self, id: impl Into<String>) -> Self {
        self.actuators.push(id.into());
        self
    }

    pub fn sensor(mut self, id: impl Into<String>) -> Self {
        self.sensors.push(id.into());
        self
    }
}

/// Central device registry.
///
/// Construct with [`DeviceRegistry::new`], register drivers, link position
/// sensors, then hand the registry to the scheduler, which becomes its only
/// writer.
#[derive(Default)]
pub struct DeviceRegistry {
    actuators: BTreeMap<String, Box<dyn Actuator>>,
    sensors: BTreeMap<String, Box<dyn Sensor>>,
    /// actuator id → sensor id
    position_sensors: HashMap<String, String>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actuator driver.  Any previously registered driver with the
    /// same `id` is replaced.
    pub fn register_actuator(&mut self, actuator: Box<dyn Actuator>) {
        self.actuators.insert(actuator.id().to_string(), actuator);
    }

    /// Register a sensor driver.  Any previously registered driver with the
    /// same `id` is replaced.
    pub fn register_sensor(&mut self, sensor: Box<dyn Sensor>) {
        self.sensors.insert(sensor.id().to_string(), sensor);
    }

    /// Declare that `sensor_id` measures the position of `actuator_id`.
    pub fn link_position_sensor(
        &mut self,
        actuator_id: impl Into<String>,
        sensor_id: impl Into<String>,
    ) {
        self.position_sensors
            .insert(actuator_id.into(), sensor_id.into());
    }

    pub fn has_actuator(&self, id: &str) -> bool {
        self.actuators.contains_key(id)
    }

    pub fn has_sensor(&self, id: &str) -> bool {
        self.sensors.contains_key(id)
    }

    /// Declared limits of actuator `id`, if registered.
    pub fn limits(&self, id: &str) -> Option<JointLimits> {
        self.actuators.get(id).map(|a| a.limits())
    }

    /// Snapshot of every actuator's limits, for consumers that must not hold
    /// the registry itself (the plan expander).
    pub fn limits_table(&self) -> BTreeMap<String, JointLimits> {
        self.actuators
            .iter()
            .map(|(id, a)| (id.clone(), a.limits()))
            .collect()
    }

    /// Issue a position setpoint to actuator `id`.
    ///
    /// # Errors
    ///
    /// [`MotusError::UnknownDevice`] if `id` is not registered, or the
    /// driver's own [`MotusError::HardwareFault`].
    pub fn set_position(&mut self, id: &str, target: f64) -> Result<(), MotusError> {
        self.actuator_mut(id)?.set_position(target)
    }

    /// Issue a velocity setpoint to actuator `id`.
    ///
    /// # Errors
    ///
    /// Same as [`set_position`][Self::set_position].
    pub fn set_velocity(&mut self, id: &str, velocity: f64) -> Result<(), MotusError> {
        self.actuator_mut(id)?.set_velocity(velocity)
    }

    /// Read sensor `id`.  Unknown sensors and read failures yield `None`.
    pub fn read(&self, id: &str) -> Option<f64> {
        let sensor = self.sensors.get(id)?;
        match sensor.read() {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(sensor = id, error = %e, "sensor read failed");
                None
            }
        }
    }

    /// Current sensed position of actuator `id`, when it has a readable
    /// position sensor.
    pub fn sensed_position(&self, actuator_id: &str) -> Option<f64> {
        let sensor_id = self.position_sensors.get(actuator_id)?;
        self.read(sensor_id)
    }

    /// Sensed positions for every name in `names` that is observable.
    /// Unobservable names are simply absent from the result.
    pub fn read_positions<'a, I>(&self, names: I) -> HashMap<String, f64>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter_map(|name| self.sensed_position(name).map(|v| (name.to_string(), v)))
            .collect()
    }

    /// Hold each named actuator where it is: position setpoint at the sensed
    /// position (or the last finite setpoint) and zero velocity.
    ///
    /// Every actuator is attempted even if an earlier one fails.  Unknown
    /// names are ignored.
    ///
    /// # Errors
    ///
    /// Returns the first driver error encountered.
    pub fn hold<'a, I>(&mut self, names: I) -> Result<(), MotusError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut first_err = None;
        for name in names {
            let sensed = self.sensed_position(name);
            let Some(act) = self.actuators.get_mut(name) else {
                continue;
            };
            let hold_at = sensed.or_else(|| {
                let commanded = act.commanded_position();
                commanded.is_finite().then_some(commanded)
            });
            let result = match hold_at {
                Some(pos) => act.set_position(pos).and_then(|_| act.set_velocity(0.0)),
                None => act.set_velocity(0.0),
            };
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Hold every registered actuator.
    ///
    /// # Errors
    ///
    /// Returns the first driver error encountered.
    pub fn hold_all(&mut self) -> Result<(), MotusError> {
        let ids: Vec<String> = self.actuators.keys().cloned().collect();
        self.hold(ids.iter().map(String::as_str))
    }

    /// Devices named in `manifest` that are not registered.
    pub fn missing(&self, manifest: &DeviceManifest) -> Vec<String> {
        let actuators = manifest
            .actuators
            .iter()
            .filter(|id| !self.has_actuator(id));
        let sensors = manifest.sensors.iter().filter(|id| !self.has_sensor(id));
        actuators.chain(sensors).cloned().collect()
    }

    fn actuator_mut(&mut self, id: &str) -> Result<&mut Box<dyn Actuator>, MotusError> {
        self.actuators
            .get_mut(id)
            .ok_or_else(|| MotusError::UnknownDevice(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    // ------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct Recorded {
        position: f64,
        velocity: f64,
    }

    struct MockMotor {
        id: String,
        state: Arc<Mutex<Recorded>>,
        fail: bool,
    }

    impl MockMotor {
        fn new(id: &str) -> (Box<Self>, Arc<Mutex<Recorded>>) {
            let state = Arc::new(Mutex::new(Recorded::default()));
            let motor = Box::new(Self {
                id: id.to_string(),
                state: Arc::clone(&state),
                fail: false,
            });
            (motor, state)
        }
    }

    impl Actuator for MockMotor {
        fn id(&self) -> &str {
            &self.id
        }
        fn set_position(&mut self, target: f64) -> Result<(), MotusError> {
            if self.fail {
                return Err(MotusError::HardwareFault {
                    component: self.id.clone(),
                    details: "rejected".into(),
                });
            }
            self.state.lock().unwrap().position = target;
            Ok(())
        }
        fn set_velocity(&mut self, velocity: f64) -> Result<(), MotusError> {
            self.state.lock().unwrap().velocity = velocity;
            Ok(())
        }
        fn limits(&self) -> JointLimits {
            JointLimits::new(-2.0, 2.0, 1.0)
        }
        fn commanded_position(&self) -> f64 {
            self.state.lock().unwrap().position
        }
    }

    struct FixedSensor {
        id: String,
        value: Option<f64>,
    }

    impl Sensor for FixedSensor {
        fn id(&self) -> &str {
            &self.id
        }
        fn read(&self) -> Result<f64, MotusError> {
            self.value.ok_or_else(|| MotusError::HardwareFault {
                component: self.id.clone(),
                details: "disconnected".into(),
            })
        }
    }

    fn sensor(id: &str, value: Option<f64>) -> Box<FixedSensor> {
        Box::new(FixedSensor {
            id: id.to_string(),
            value,
        })
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[test]
    fn set_position_routes_to_driver() {
        let mut reg = DeviceRegistry::new();
        let (motor, state) = MockMotor::new("elbow_joint");
        reg.register_actuator(motor);
        reg.set_position("elbow_joint", 1.25).unwrap();
        assert!((state.lock().unwrap().position - 1.25).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_actuator_is_reported() {
        let mut reg = DeviceRegistry::new();
        let result = reg.set_position("ghost", 0.0);
        assert!(matches!(result, Err(MotusError::UnknownDevice(id)) if id == "ghost"));
    }

    #[test]
    fn read_positions_skips_unobservable_actuators() {
        let mut reg = DeviceRegistry::new();
        reg.register_actuator(MockMotor::new("a").0);
        reg.register_actuator(MockMotor::new("b").0);
        reg.register_actuator(MockMotor::new("c").0);
        reg.register_sensor(sensor("a_sensor", Some(0.5)));
        reg.register_sensor(sensor("c_sensor", None));
        reg.link_position_sensor("a", "a_sensor");
        reg.link_position_sensor("c", "c_sensor");

        let readings = reg.read_positions(["a", "b", "c", "missing"]);
        assert_eq!(readings.len(), 1);
        assert_eq!(readings["a"], 0.5);
    }

    #[test]
    fn hold_uses_sensed_position_and_zero_velocity() {
        let mut reg = DeviceRegistry::new();
        let (motor, state) = MockMotor::new("wrist_1_joint");
        reg.register_actuator(motor);
        reg.register_sensor(sensor("wrist_1_joint_sensor", Some(-0.3)));
        reg.link_position_sensor("wrist_1_joint", "wrist_1_joint_sensor");
        reg.set_position("wrist_1_joint", 1.0).unwrap();
        reg.set_velocity("wrist_1_joint", 1.0).unwrap();

        reg.hold(["wrist_1_joint"]).unwrap();
        let s = state.lock().unwrap();
        assert!((s.position - (-0.3)).abs() < f64::EPSILON);
        assert_eq!(s.velocity, 0.0);
    }

    #[test]
    fn hold_without_sensor_in_velocity_mode_only_zeroes_velocity() {
        let mut reg = DeviceRegistry::new();
        let (motor, state) = MockMotor::new("left wheel motor");
        reg.register_actuator(motor);
        reg.set_position("left wheel motor", f64::INFINITY).unwrap();
        reg.set_velocity("left wheel motor", 3.0).unwrap();

        reg.hold_all().unwrap();
        let s = state.lock().unwrap();
        assert_eq!(s.position, f64::INFINITY);
        assert_eq!(s.velocity, 0.0);
    }

    #[test]
    fn hold_attempts_every_actuator_and_returns_first_error() {
        let mut reg = DeviceRegistry::new();
        let (mut bad, _) = MockMotor::new("a");
        bad.fail = true;
        let (good, good_state) = MockMotor::new("b");
        good_state.lock().unwrap().velocity = 2.0;
        reg.register_actuator(bad);
        reg.register_actuator(good);

        let result = reg.hold(["a", "b"]);
        assert!(matches!(result, Err(MotusError::HardwareFault { .. })));
        assert_eq!(good_state.lock().unwrap().velocity, 0.0);
    }

    #[test]
    fn missing_reports_absent_devices() {
        let mut reg = DeviceRegistry::new();
        reg.register_actuator(MockMotor::new("elbow_joint").0);
        let manifest = DeviceManifest::new()
            .actuator("elbow_joint")
            .actuator("wrist_3_joint")
            .sensor("elbow_joint_sensor");
        assert_eq!(
            reg.missing(&manifest),
            vec!["wrist_3_joint".to_string(), "elbow_joint_sensor".to_string()]
        );
    }

    #[test]
    fn limits_table_snapshots_every_actuator() {
        let mut reg = DeviceRegistry::new();
        reg.register_actuator(MockMotor::new("a").0);
        reg.register_actuator(MockMotor::new("b").0);
        let table = reg.limits_table();
        assert_eq!(table.len(), 2);
        assert_eq!(table["a"].max_position, 2.0);
        assert_eq!(reg.limits("b"), Some(JointLimits::new(-2.0, 2.0, 1.0)));
        assert_eq!(reg.limits("zzz"), None);
    }

    #[test]
    fn re_registering_actuator_replaces_old_driver() {
        let mut reg = DeviceRegistry::new();
        reg.register_actuator(MockMotor::new("joint_x").0);
        let (fresh, state) = MockMotor::new("joint_x");
        reg.register_actuator(fresh);
        reg.set_position("joint_x", 0.7).unwrap();
        assert!((state.lock().unwrap().position - 0.7).abs() < f64::EPSILON);
        assert!(reg.missing(&DeviceManifest::new().actuator("joint_x")).is_empty());
    }
}
