//! Engine configuration.
//!
//! The options form a nested dictionary with a fixed schema; the typed view
//! below is the single source of truth and is rebuilt (and re-validated)
//! whenever the dictionary is set. Unknown keys are rejected so a typo cannot
//! silently fall back to a default.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// World-level options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldOptions {
    /// Gravity as a 6-vector `[fx, fy, fz, τx, τy, τz]`; only the linear part
    /// is pushed into the rigid-body model.
    pub gravity: [f64; 6],
}

impl Default for WorldOptions {
    fn default() -> Self {
        Self {
            gravity: [0.0, 0.0, -9.81, 0.0, 0.0, 0.0],
        }
    }
}

impl WorldOptions {
    /// Linear part of the gravity vector.
    #[must_use]
    pub fn gravity_linear(&self) -> Vector3<f64> {
        Vector3::new(self.gravity[0], self.gravity[1], self.gravity[2])
    }
}

/// Integration-driver options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StepperOptions {
    /// Absolute tolerance of the step-size controller.
    pub tol_abs: f64,
    /// Relative tolerance of the step-size controller.
    pub tol_rel: f64,
    /// Sensor sampling period in seconds; `0` means continuous.
    pub sensors_update_period: f64,
    /// Controller update period in seconds; `0` means continuous.
    pub controller_update_period: f64,
    /// Seed for every stochastic element of a run.
    pub random_seed: u64,
}

impl Default for StepperOptions {
    fn default() -> Self {
        Self {
            tol_abs: 1e-6,
            tol_rel: 1e-5,
            sensors_update_period: 0.0,
            controller_update_period: 0.0,
            random_seed: 0,
        }
    }
}

/// Ground-contact options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContactOptions {
    /// Normal spring stiffness (N/m).
    pub stiffness: f64,
    /// Normal damping (N·s/m), active only while penetrating further.
    pub damping: f64,
    /// Dry friction coefficient.
    pub friction_dry: f64,
    /// Viscous friction coefficient.
    pub friction_viscous: f64,
    /// Tangential-speed scale of the friction regularisation (m/s).
    pub dry_friction_vel_eps: f64,
    /// Penetration scale of the contact blending law (m).
    pub transition_eps: f64,
}

impl Default for ContactOptions {
    fn default() -> Self {
        Self {
            stiffness: 1e6,
            damping: 2e3,
            friction_dry: 1.7,
            friction_viscous: 1.7,
            dry_friction_vel_eps: 1e-2,
            transition_eps: 1e-3,
        }
    }
}

/// Joint-limit penalty options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JointBoundOptions {
    /// Penalty stiffness (N·m/rad).
    pub bound_stiffness: f64,
    /// Penalty damping (N·m·s/rad).
    pub bound_damping: f64,
    /// Position-error scale of the limit blending law (rad).
    pub bound_transition_eps: f64,
}

impl Default for JointBoundOptions {
    fn default() -> Self {
        Self {
            bound_stiffness: 1e5,
            bound_damping: 1e2,
            bound_transition_eps: 1e-2,
        }
    }
}

/// Telemetry channel gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryOptions {
    /// Record the generalised configuration.
    pub log_configuration: bool,
    /// Record the generalised velocity.
    pub log_velocity: bool,
    /// Record the generalised acceleration.
    pub log_acceleration: bool,
    /// Record the saturated command torque.
    pub log_command: bool,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            log_configuration: true,
            log_velocity: true,
            log_acceleration: true,
            log_command: true,
        }
    }
}

/// Complete engine options.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineOptions {
    /// World-level options.
    pub world: WorldOptions,
    /// Integration-driver options.
    pub stepper: StepperOptions,
    /// Ground-contact options.
    pub contacts: ContactOptions,
    /// Joint-limit penalty options.
    pub joints: JointBoundOptions,
    /// Telemetry channel gates.
    pub telemetry: TelemetryOptions,
}

impl EngineOptions {
    /// Build the typed view from a dictionary, rejecting unknown keys.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let options: Self = serde_json::from_value(value)
            .map_err(|e| EngineError::bad_input(format!("invalid options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    /// The dictionary view of the options.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        // Serialization of plain floats and bools cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Check every mandatory range.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f64) -> Result<()> {
            if !(value.is_finite() && value > 0.0) {
                return Err(EngineError::bad_input(format!(
                    "{name} must be strictly positive, got {value}"
                )));
            }
            Ok(())
        }
        fn non_negative(name: &str, value: f64) -> Result<()> {
            if !(value.is_finite() && value >= 0.0) {
                return Err(EngineError::bad_input(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
            Ok(())
        }

        positive("stepper.tol_abs", self.stepper.tol_abs)?;
        positive("stepper.tol_rel", self.stepper.tol_rel)?;
        non_negative("stepper.sensors_update_period", self.stepper.sensors_update_period)?;
        non_negative(
            "stepper.controller_update_period",
            self.stepper.controller_update_period,
        )?;
        non_negative("contacts.stiffness", self.contacts.stiffness)?;
        non_negative("contacts.damping", self.contacts.damping)?;
        non_negative("contacts.friction_dry", self.contacts.friction_dry)?;
        non_negative("contacts.friction_viscous", self.contacts.friction_viscous)?;
        positive("contacts.dry_friction_vel_eps", self.contacts.dry_friction_vel_eps)?;
        positive("contacts.transition_eps", self.contacts.transition_eps)?;
        non_negative("joints.bound_stiffness", self.joints.bound_stiffness)?;
        non_negative("joints.bound_damping", self.joints.bound_damping)?;
        positive("joints.bound_transition_eps", self.joints.bound_transition_eps)?;

        for (i, g) in self.world.gravity.iter().enumerate() {
            if !g.is_finite() {
                return Err(EngineError::bad_input(format!(
                    "world.gravity[{i}] must be finite"
                )));
            }
        }
        Ok(())
    }
}
