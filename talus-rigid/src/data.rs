//! Per-run algorithm workspace.
//!
//! `Data` is the mutable counterpart of [`Model`](crate::Model): world
//! placements and body twists computed by forward kinematics, plus the
//! pre-allocated scratch of the dynamics passes so stepping never allocates.
//! One `Data` is created per simulation run via `model.make_data()`.

use nalgebra::{Isometry3, Matrix6};

use crate::spatial::{SpatialVector, Transform};

/// Mutable workspace for the kinematics and dynamics algorithms.
///
/// `q` and `v` remain the only state variables; everything in here is
/// computed from them and may be stale between calls.
#[derive(Debug, Clone)]
pub struct Data {
    /// World placement of each joint frame (filled by forward kinematics).
    pub joint_placements: Vec<Isometry3<f64>>,
    /// Body-frame twist `[ω, v]` of each joint (filled by forward kinematics).
    pub joint_velocities: Vec<SpatialVector>,
    /// World placement of each fixed frame (filled by
    /// [`update_frame_placements`](crate::update_frame_placements)).
    pub frame_placements: Vec<Isometry3<f64>>,

    // Dynamics scratch, indexed by joint.
    pub(crate) x_tree: Vec<Transform>,
    pub(crate) x_world: Vec<Transform>,
    pub(crate) vel: Vec<SpatialVector>,
    pub(crate) c_bias: Vec<SpatialVector>,
    pub(crate) p_a: Vec<SpatialVector>,
    pub(crate) i_a: Vec<Matrix6<f64>>,
    pub(crate) acc: Vec<SpatialVector>,
    pub(crate) net_forces: Vec<SpatialVector>,
}

impl Data {
    pub(crate) fn new(n_joints: usize, n_frames: usize) -> Self {
        Self {
            joint_placements: vec![Isometry3::identity(); n_joints],
            joint_velocities: vec![SpatialVector::zeros(); n_joints],
            frame_placements: vec![Isometry3::identity(); n_frames],
            x_tree: vec![Transform::identity(); n_joints],
            x_world: vec![Transform::identity(); n_joints],
            vel: vec![SpatialVector::zeros(); n_joints],
            c_bias: vec![SpatialVector::zeros(); n_joints],
            p_a: vec![SpatialVector::zeros(); n_joints],
            i_a: vec![Matrix6::zeros(); n_joints],
            acc: vec![SpatialVector::zeros(); n_joints],
            net_forces: vec![SpatialVector::zeros(); n_joints],
        }
    }
}
