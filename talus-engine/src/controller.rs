//! Controller contract.

use nalgebra::DVector;
use talus_rigid::Model;

use crate::error::ControlError;

/// User-supplied controller driving the actuated joints.
///
/// Both callbacks are invoked synchronously from the integration loop and
/// must be deterministic for given inputs: the dynamics assembler may
/// re-evaluate the same state several times within one trial step.
pub trait Controller {
    /// Command torque for the actuated joints, length `model.nmotors()`.
    ///
    /// The engine saturates each entry to the joint's effort limit before
    /// applying it.
    fn compute_command(
        &mut self,
        model: &Model,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
    ) -> Result<DVector<f64>, ControlError>;

    /// Internal (passive) dynamics in the full velocity space, length
    /// `model.nv()`: joint friction, transmission flexibility, and the like.
    fn internal_dynamics(
        &mut self,
        model: &Model,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
    ) -> Result<DVector<f64>, ControlError>;

    /// Clear any internal state. Called at the start of every simulation.
    fn reset(&mut self) {}
}

/// A controller that applies no command and no internal dynamics.
///
/// Useful for passive simulations and as a starting point for tests.
#[derive(Debug, Default, Clone)]
pub struct PassiveController;

impl Controller for PassiveController {
    fn compute_command(
        &mut self,
        model: &Model,
        _t: f64,
        _q: &DVector<f64>,
        _v: &DVector<f64>,
    ) -> Result<DVector<f64>, ControlError> {
        Ok(DVector::zeros(model.nmotors()))
    }

    fn internal_dynamics(
        &mut self,
        model: &Model,
        _t: f64,
        _q: &DVector<f64>,
        _v: &DVector<f64>,
    ) -> Result<DVector<f64>, ControlError> {
        Ok(DVector::zeros(model.nv()))
    }
}
