//! Articulated Body Algorithm — O(n) forward dynamics.
//!
//! Given `(q, v, τ)` and optional external wrenches per joint, computes the
//! generalised acceleration. Three passes over the tree:
//! 1. forward: joint transforms, body twists, velocity-product bias;
//! 2. backward: articulated inertias and bias forces;
//! 3. forward: accelerations.
//!
//! Gravity enters through the base-acceleration trick: the world "accelerates"
//! at `-g`, so no per-body gravity forces are needed.

use nalgebra::{DVector, Matrix6, Vector6};

use crate::error::{Result, RigidError};
use crate::model::Model;
use crate::spatial::{cross_force, cross_motion, spatial, SpatialVector, Transform};
use crate::Data;

/// Run the Articulated Body Algorithm.
///
/// `fext` holds one wrench per joint, expressed in that joint's frame at its
/// origin, layout `[τ, f]`. Pass an empty slice when there are no external
/// forces. Returns the generalised acceleration (length `nv`).
pub fn aba(
    model: &Model,
    data: &mut Data,
    q: &DVector<f64>,
    v: &DVector<f64>,
    tau: &DVector<f64>,
    fext: &[SpatialVector],
) -> Result<DVector<f64>> {
    if q.len() != model.nq() {
        return Err(RigidError::ConfigurationSize {
            expected: model.nq(),
            got: q.len(),
        });
    }
    if v.len() != model.nv() || tau.len() != model.nv() {
        return Err(RigidError::VelocitySize {
            expected: model.nv(),
            got: if v.len() != model.nv() { v.len() } else { tau.len() },
        });
    }

    let nb = model.joints().len();
    let mut qdd = DVector::zeros(model.nv());

    // World frame "accelerates" at -g.
    let a0 = spatial(nalgebra::Vector3::zeros(), -model.gravity());

    // -- Pass 1: transforms, velocities, bias forces --
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
        match joint.parent {
            None => {
                data.vel[i] = v_joint;
                data.c_bias[i] = SpatialVector::zeros();
            }
            Some(p) => {
                let v_parent = data.x_tree[i].apply_motion(&data.vel[p]);
                data.vel[i] = v_parent + v_joint;
                data.c_bias[i] = cross_motion(&data.vel[i], &v_joint);
            }
        }

        data.i_a[i] = joint.inertia.to_matrix();
        data.p_a[i] = cross_force(&data.vel[i], &joint.inertia.mul_motion(&data.vel[i]));
        if let Some(ext) = fext.get(i) {
            data.p_a[i] -= ext;
        }
    }

    // -- Pass 2: articulated inertias --
    for i in (0..nb).rev() {
        let joint = &model.joints()[i];
        let v_off = model.v_offset(i);

        match joint.kind.axis_subspace() {
            Some(s) => {
                let ia_s = data.i_a[i] * s;
                let d = s.dot(&ia_s);
                if d.abs() < 1e-20 {
                    continue;
                }
                let u = tau[v_off] - s.dot(&data.p_a[i]);

                if let Some(p) = joint.parent {
                    let ia_new = data.i_a[i] - (ia_s * ia_s.transpose()) / d;
                    let p_new = data.p_a[i] + ia_new * data.c_bias[i] + ia_s * (u / d);

                    let x_mot = data.x_tree[i].to_motion_matrix();
                    data.i_a[p] += x_mot.transpose() * ia_new * x_mot;
                    data.p_a[p] += data.x_tree[i].inv_apply_force(&p_new);
                }
            }
            None => {
                // Free-flyer: S is the 6×6 identity, so the articulated
                // inertia is absorbed entirely at this joint.
                if let Some(p) = joint.parent {
                    // With S = 1, I_a − U D⁻¹ Uᵀ vanishes and the propagated
                    // bias reduces to the joint torque itself.
                    let tau_block = Vector6::from_column_slice(&tau.as_slice()[v_off..v_off + 6]);
                    data.p_a[p] += data.x_tree[i].inv_apply_force(&tau_block);
                }
            }
        }
    }

    // -- Pass 3: accelerations --
    for i in 0..nb {
        let joint = &model.joints()[i];
        let v_off = model.v_offset(i);

        let a_parent = match joint.parent {
            None => data.x_tree[i].apply_motion(&a0),
            Some(p) => data.x_tree[i].apply_motion(&data.acc[p]),
        };
        let a_free = a_parent + data.c_bias[i];

        match joint.kind.axis_subspace() {
            Some(s) => {
                let ia_s = data.i_a[i] * s;
                let d = s.dot(&ia_s);
                if d.abs() < 1e-20 {
                    data.acc[i] = a_free;
                    continue;
                }
                let u = tau[v_off] - s.dot(&data.p_a[i]);
                let qdd_i = (u - (data.i_a[i] * a_free).dot(&s)) / d;
                qdd[v_off] = qdd_i;
                data.acc[i] = a_free + s * qdd_i;
            }
            None => {
                let tau_block = Vector6::from_column_slice(&tau.as_slice()[v_off..v_off + 6]);
                let u_vec = tau_block - data.p_a[i];
                let Some(d_inv) = data.i_a[i].try_inverse() else {
                    data.acc[i] = a_free;
                    continue;
                };
                let qdd_block: Vector6<f64> = d_inv * (u_vec - data.i_a[i] * a_free);
                qdd.rows_mut(v_off, 6).copy_from(&qdd_block);
                data.acc[i] = a_free + qdd_block;
            }
        }
    }

    Ok(qdd)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::model::Joint;
    use crate::spatial::SpatialInertia;
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Matrix3, Vector3};

    const G: f64 = 9.81;

    fn rod_inertia(mass: f64, length: f64) -> SpatialInertia {
        // Uniform rod hanging along -z from the joint.
        let i = mass * length * length / 12.0;
        SpatialInertia::new(
            mass,
            Vector3::new(0.0, 0.0, -length / 2.0),
            Matrix3::from_diagonal(&Vector3::new(i, i, 0.0)),
        )
    }

    fn double_pendulum() -> Model {
        let mut builder = Model::builder();
        builder = builder.gravity(Vector3::new(0.0, 0.0, -G));
        let upper = builder.add_joint(Joint::revolute(
            "upper",
            Vector3::y_axis(),
            rod_inertia(1.0, 1.0),
        ));
        builder.add_joint(
            Joint::revolute("lower", Vector3::y_axis(), rod_inertia(1.0, 1.0))
                .with_parent(upper)
                .with_placement(Isometry3::translation(0.0, 0.0, -1.0)),
        );
        builder.build().unwrap()
    }

    #[test]
    fn test_double_pendulum_equilibrium() {
        let model = double_pendulum();
        let mut data = model.make_data();

        let q = DVector::zeros(2);
        let v = DVector::zeros(2);
        let tau = DVector::zeros(2);
        let qdd = aba(&model, &mut data, &q, &v, &tau, &[]).unwrap();

        assert_relative_eq!(qdd[0], 0.0, epsilon = 1e-10);
        assert_relative_eq!(qdd[1], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_single_pendulum_horizontal_release() {
        // Rod released horizontally: qdd = -(m g l/2) / (m l²/3).
        let mut builder = Model::builder().gravity(Vector3::new(0.0, 0.0, -G));
        builder.add_joint(Joint::revolute(
            "hinge",
            Vector3::y_axis(),
            rod_inertia(1.0, 1.0),
        ));
        let model = builder.build().unwrap();
        let mut data = model.make_data();

        let q = DVector::from_element(1, std::f64::consts::FRAC_PI_2);
        let v = DVector::zeros(1);
        let tau = DVector::zeros(1);
        let qdd = aba(&model, &mut data, &q, &v, &tau, &[]).unwrap();

        let expected = -(G * 0.5) / (1.0 / 3.0);
        assert_relative_eq!(qdd[0], expected, epsilon = 1e-8);
    }

    #[test]
    fn test_free_flyer_free_fall() {
        let mut builder = Model::builder().gravity(Vector3::new(0.0, 0.0, -G));
        builder.add_joint(Joint::free_flyer("base", SpatialInertia::sphere(1.0, 0.1)));
        let model = builder.build().unwrap();
        let mut data = model.make_data();

        let q = model.neutral_configuration();
        let v = DVector::zeros(6);
        let tau = DVector::zeros(6);
        let qdd = aba(&model, &mut data, &q, &v, &tau, &[]).unwrap();

        for k in 0..5 {
            assert_relative_eq!(qdd[k], 0.0, epsilon = 1e-10);
        }
        assert_relative_eq!(qdd[5], -G, epsilon = 1e-8);
    }

    #[test]
    fn test_external_force_cancels_gravity() {
        // Pushing up with m·g on the free-flyer gives zero acceleration.
        let mut builder = Model::builder().gravity(Vector3::new(0.0, 0.0, -G));
        builder.add_joint(Joint::free_flyer("base", SpatialInertia::sphere(2.0, 0.1)));
        let model = builder.build().unwrap();
        let mut data = model.make_data();

        let q = model.neutral_configuration();
        let v = DVector::zeros(6);
        let tau = DVector::zeros(6);
        let fext = vec![spatial(Vector3::zeros(), Vector3::new(0.0, 0.0, 2.0 * G))];
        let qdd = aba(&model, &mut data, &q, &v, &tau, &fext).unwrap();

        assert_relative_eq!(qdd.norm(), 0.0, epsilon = 1e-8);
    }

    #[test]
    fn test_torque_accelerates_joint() {
        let mut builder = Model::builder().gravity(Vector3::zeros());
        builder.add_joint(Joint::revolute(
            "hinge",
            Vector3::y_axis(),
            rod_inertia(1.0, 1.0),
        ));
        let model = builder.build().unwrap();
        let mut data = model.make_data();

        let q = DVector::zeros(1);
        let v = DVector::zeros(1);
        let tau = DVector::from_element(1, 1.0);
        let qdd = aba(&model, &mut data, &q, &v, &tau, &[]).unwrap();

        // qdd = tau / (m l²/3)
        assert_relative_eq!(qdd[0], 3.0, epsilon = 1e-8);
    }
}
