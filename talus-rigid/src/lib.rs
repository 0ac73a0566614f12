//! Rigid-body kinematic tree and O(n) dynamics algorithms.
//!
//! This crate provides the mechanics layer consumed by the simulation core:
//!
//! - [`Model`] — immutable kinematic tree (joints, frames, inertias, bounds)
//! - [`Data`] — per-run workspace created via [`Model::make_data`]
//! - [`forward_kinematics`] / [`update_frame_placements`] — placements and
//!   twists
//! - [`aba`] — forward dynamics (Articulated Body Algorithm)
//! - [`rnea`] — inverse dynamics (Recursive Newton–Euler)
//! - [`integrate`] — manifold-aware configuration update
//! - [`kinetic_energy`] / [`potential_energy`] — mechanical energy
//! - [`Sensor`] — the sensor registry contract
//!
//! # Coordinate conventions
//!
//! Spatial vectors are `[angular (3), linear (3)]` (Featherstone). The
//! free-flyer configuration block is `(tx, ty, tz, qx, qy, qz, qw)` and its
//! velocity block is the body-frame twist `[ω, v]`. `q` and `v` are the only
//! state; everything in [`Data`] is derived.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]

mod aba;
mod data;
mod energy;
mod error;
mod integrate;
mod joint;
mod kinematics;
mod model;
mod rnea;
mod sensor;
pub mod spatial;

pub use aba::aba;
pub use data::Data;
pub use energy::{kinetic_energy, potential_energy};
pub use error::{Result, RigidError};
pub use integrate::{integrate, normalize};
pub use joint::{JointKind, FREE_FLYER_NQ, FREE_FLYER_NV};
pub use kinematics::{forward_kinematics, frame_velocity_world, update_frame_placements};
pub use model::{Frame, Joint, Model, ModelBuilder};
pub use rnea::rnea;
pub use sensor::{channel_name, Sensor};
pub use spatial::{SpatialInertia, SpatialVector};
