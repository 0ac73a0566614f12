//! Sensor registry.
//!
//! Concrete sensor models (IMU, encoder, force) live outside this crate; the
//! registry only defines the refresh contract and keeps the channel plumbing
//! in one place. Sensors are refreshed by the simulation driver on its sensor
//! clock with the last published state, and may draw from a seeded RNG so a
//! run is reproducible for a given seed.

use nalgebra::DVector;
use rand::rngs::StdRng;

/// A sensor attached to the model.
///
/// `values()` must keep a stable length across the lifetime of the sensor;
/// channel registration happens once, before the first refresh.
pub trait Sensor {
    /// Unique sensor name.
    fn name(&self) -> &str;

    /// One label per measured scalar, in the order of [`Sensor::values`].
    fn fieldnames(&self) -> Vec<String>;

    /// Current measurement.
    fn values(&self) -> &[f64];

    /// Recompute the measurement from the published state.
    ///
    /// `a` and `u` are the acceleration and generalised effort of the last
    /// snapshot; they lag one step behind `q` and `v` in continuous mode.
    fn refresh(
        &mut self,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
        a: &DVector<f64>,
        u: &DVector<f64>,
        rng: &mut StdRng,
    );

    /// Clear any internal state (filters, biases drawn at start-up).
    fn reset(&mut self) {}
}

/// Channel name for one field of a sensor, e.g. `imu.gyro_x`.
#[must_use]
pub fn channel_name(sensor: &dyn Sensor, field: &str) -> String {
    format!("{}.{}", sensor.name(), field)
}
