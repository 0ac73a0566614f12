//! Recursive Newton–Euler Algorithm — inverse dynamics.
//!
//! Given `(q, v, a)`, computes the generalised effort that produces `a`. As a
//! side effect the world placements and body twists in [`Data`] are
//! refreshed, so energy queries can reuse them without a separate kinematics
//! pass.

use nalgebra::{DVector, Vector6};

use crate::error::{Result, RigidError};
use crate::model::Model;
use crate::spatial::{cross_force, cross_motion, spatial, Transform};
use crate::Data;

/// Run the Recursive Newton–Euler Algorithm. Returns the generalised effort
/// (length `nv`).
pub fn rnea(
    model: &Model,
    data: &mut Data,
    q: &DVector<f64>,
    v: &DVector<f64>,
    a: &DVector<f64>,
) -> Result<DVector<f64>> {
    if q.len() != model.nq() {
        return Err(RigidError::ConfigurationSize {
            expected: model.nq(),
            got: q.len(),
        });
    }
    if v.len() != model.nv() || a.len() != model.nv() {
        return Err(RigidError::VelocitySize {
            expected: model.nv(),
            got: if v.len() != model.nv() { v.len() } else { a.len() },
        });
    }

    let nb = model.joints().len();
    let mut tau = DVector::zeros(model.nv());

    let a0 = spatial(nalgebra::Vector3::zeros(), -model.gravity());

    // -- Forward pass: velocities and accelerations --
    for i in 0..nb {
        let joint = &model.joints()[i];
        let q_off = model.q_offset(i);
        let v_off = model.v_offset(i);
        let nq = joint.kind.nq();
        let nv = joint.kind.nv();

        let x_joint = joint.kind.transform(&q.as_slice()[q_off..q_off + nq]);
        let x_fixed = Transform::from_placement(&joint.placement);
        data.x_tree[i] = x_joint.compose(&x_fixed);

        let v_joint = joint.kind.velocity(&v.as_slice()[v_off..v_off + nv]);
        let a_joint = joint.kind.velocity(&a.as_slice()[v_off..v_off + nv]);

        match joint.parent {
            None => {
                data.x_world[i] = data.x_tree[i];
                data.vel[i] = v_joint;
                data.acc[i] = data.x_tree[i].apply_motion(&a0) + a_joint;
            }
            Some(p) => {
                data.x_world[i] = data.x_tree[i].compose(&data.x_world[p]);
                let v_parent = data.x_tree[i].apply_motion(&data.vel[p]);
                data.vel[i] = v_parent + v_joint;
                data.acc[i] = data.x_tree[i].apply_motion(&data.acc[p])
                    + cross_motion(&data.vel[i], &v_joint)
                    + a_joint;
            }
        }

        data.joint_placements[i] = data.x_world[i].to_placement();
        data.joint_velocities[i] = data.vel[i];
    }

    // -- Backward pass: net body forces, then joint efforts --
    for i in 0..nb {
        let inertia = &model.joints()[i].inertia;
        data.net_forces[i] = inertia.mul_motion(&data.acc[i])
            + cross_force(&data.vel[i], &inertia.mul_motion(&data.vel[i]));
    }

    for i in (0..nb).rev() {
        let joint = &model.joints()[i];
        let v_off = model.v_offset(i);

        match joint.kind.axis_subspace() {
            Some(s) => tau[v_off] = s.dot(&data.net_forces[i]),
            None => {
                let block: Vector6<f64> = data.net_forces[i];
                tau.rows_mut(v_off, 6).copy_from(&block);
            }
        }

        if let Some(p) = joint.parent {
            let f = data.x_tree[i].inv_apply_force(&data.net_forces[i]);
            data.net_forces[p] += f;
        }
    }

    Ok(tau)
}
