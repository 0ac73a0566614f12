//! Adaptive-step simulation core for articulated mechanical systems.
//!
//! The engine advances a rigid-body model through time under the combined
//! action of a user controller, the controller's internal dynamics,
//! joint-limit penalties and compliant ground contacts, recording a
//! telemetry trace of the evolution.
//!
//! # Architecture
//!
//! - [`contact`] — penalty ground contact per frame (spring-damper normal,
//!   regularised friction, `tanh` blending)
//! - [`bounds`] — joint-limit penalty torques
//! - The dynamics assembler fuses those with the command and the passive
//!   internal dynamics through the Articulated Body Algorithm
//! - A Dormand–Prince 5(4) pair with a PI step-size controller drives the
//!   state, landing exactly on every sensor and controller break-point
//! - Every published snapshot becomes one telemetry row
//!
//! # Example
//!
//! ```
//! use nalgebra::DVector;
//! use talus_engine::{Engine, PassiveController};
//! use talus_rigid::{Joint, Model, SpatialInertia};
//!
//! // A free-falling unit sphere.
//! let mut builder = Model::builder();
//! builder.add_joint(Joint::free_flyer("ball", SpatialInertia::sphere(1.0, 0.1)));
//! let mut model = builder.build()?;
//!
//! let mut controller = PassiveController;
//! let mut engine = Engine::new(&mut model, &mut controller)?;
//!
//! let mut x0 = DVector::zeros(engine.model().nx());
//! x0[6] = 1.0; // unit quaternion
//! engine.simulate(&x0, 0.5)?;
//!
//! // After 0.5 s of free fall: z ≈ -½ g t².
//! let qz = engine.snapshot().q[2];
//! assert!((qz - (-0.5 * 9.81 * 0.25)).abs() < 1e-3);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]

pub mod bounds;
pub mod contact;
mod controller;
mod dynamics;
mod engine;
mod error;
mod ode;
mod options;
mod stepper;

pub use controller::{Controller, PassiveController};
pub use engine::{Callback, Engine, MAX_ITERATIONS, MIN_SIMULATION_DURATION};
pub use error::{ControlError, EngineError, Result};
pub use options::{
    ContactOptions, EngineOptions, JointBoundOptions, StepperOptions, TelemetryOptions,
    WorldOptions,
};
pub use stepper::Snapshot;
