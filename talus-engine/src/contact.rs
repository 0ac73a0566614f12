//! Penalty ground-contact model.
//!
//! Each contact frame below the ground plane contributes a spring-damper
//! normal force plus a regularised tangential friction force. Every switching
//! behaviour is smooth: the friction coefficient is a continuous piecewise-
//! linear function of the sliding speed, and the whole wrench is faded in by
//! a `tanh` of the penetration so the resulting ODE stays C¹ for the
//! embedded-error step controller.

use nalgebra::{Vector2, Vector3};
use talus_rigid::spatial::{spatial, SpatialVector};
use talus_rigid::{frame_velocity_world, Data, Model};

use crate::options::ContactOptions;

/// Tangential force saturation, for numerical stability.
const MAX_TANGENTIAL_FORCE: f64 = 1e5;

/// Friction coefficient as a function of tangential speed.
///
/// Three regimes over `ε = dry_friction_vel_eps`:
/// - `s ≤ ε`: linear wedge through the origin up to the dry coefficient;
/// - `ε < s < 1.5 ε`: linear bridge from dry down to viscous;
/// - `s ≥ 1.5 ε`: viscous plateau.
#[must_use]
pub fn friction_coefficient(speed: f64, options: &ContactOptions) -> f64 {
    let eps = options.dry_friction_vel_eps;
    let dry = options.friction_dry;
    let viscous = options.friction_viscous;
    if speed <= eps {
        speed / eps * dry
    } else if speed < 1.5 * eps {
        -2.0 * speed * (dry - viscous) / eps + 3.0 * dry - 2.0 * viscous
    } else {
        viscous
    }
}

/// Contact wrench of one frame, expressed at the parent joint origin in the
/// parent joint frame, layout `[τ, f]`.
///
/// Reads only kinematic data computed earlier in the same evaluation;
/// returns zero when the frame is at or above the ground.
#[must_use]
pub fn contact_wrench(
    model: &Model,
    data: &Data,
    frame_idx: usize,
    options: &ContactOptions,
) -> SpatialVector {
    let placement = &data.frame_placements[frame_idx];
    let pz = placement.translation.vector.z;
    if pz >= 0.0 {
        return SpatialVector::zeros();
    }

    let v_world = frame_velocity_world(model, data, frame_idx);

    // Normal spring-damper; damping acts only while penetrating further.
    let damping = if v_world.z < 0.0 {
        -options.damping * v_world.z
    } else {
        0.0
    };
    let fz = -options.stiffness * pz + damping;

    // Regularised friction, saturated component-wise.
    let v_xy = Vector2::new(v_world.x, v_world.y);
    let speed = v_xy.norm();
    let mut f_world = Vector3::new(0.0, 0.0, fz);
    if speed > 0.0 {
        let mu = friction_coefficient(speed, options);
        let f_tangent = -(v_xy / speed) * mu * fz;
        f_world.x = f_tangent.x.clamp(-MAX_TANGENTIAL_FORCE, MAX_TANGENTIAL_FORCE);
        f_world.y = f_tangent.y.clamp(-MAX_TANGENTIAL_FORCE, MAX_TANGENTIAL_FORCE);
    }

    // Express the wrench at the parent joint origin, in the joint frame.
    let frame = &model.frames()[frame_idx];
    let f_joint = frame.placement.rotation * (placement.rotation.inverse() * f_world);
    let tau_joint = frame.placement.translation.vector.cross(&f_joint);

    // Smoothly fade the contact in as penetration grows.
    let blending = (2.0 * (-pz) / options.transition_eps).tanh();
    spatial(tau_joint, f_joint) * blending
}
