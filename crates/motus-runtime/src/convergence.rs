//! Convergence checks used by the scheduler to decide when a motion is done.
//!
//! Both functions are pure; the scheduler calls them at most once per tick
//! with fresh sensor readings.

use std::collections::{BTreeMap, HashMap};

/// `true` iff every target key has a reading within `tolerance` of its
/// target.  A key with no reading never blocks convergence, so an
/// unobservable actuator cannot stall the queue.
pub fn is_converged(
    current: &HashMap<String, f64>,
    target: &BTreeMap<String, f64>,
    tolerance: f64,
) -> bool {
    target.iter().all(|(name, goal)| match current.get(name) {
        Some(now) => (now - goal).abs() <= tolerance,
        None => true,
    })
}

/// `true` if any reading is non-zero.
pub fn contact_detected(readings: impl IntoIterator<Item = f64>) -> bool {
    readings.into_iter().any(|v| v != 0.0)
}
