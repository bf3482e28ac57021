//! `motus-hal` – device access for the actuation scheduler.
//!
//! # Modules
//!
//! - [`actuator`] – the [`Actuator`] and [`Sensor`] traits every device
//!   driver implements.
//! - [`registry`] – [`DeviceRegistry`]: named actuators and sensors, limit
//!   lookup, position read-back, and the hold-in-place stop behaviour.
//!   Built once at startup and checked against a [`DeviceManifest`].
//! - [`sim`] – [`SimWorld`]: an in-process fixed-timestep simulator whose
//!   [`SimWorld::step`] is the only clock-advancing primitive in the stack.

pub mod actuator;
pub mod registry;
pub mod sim;

pub use actuator::{Actuator, Sensor};
pub use registry::{DeviceManifest, DeviceRegistry};
pub use sim::{SimWorld, SimWorldBuilder};
