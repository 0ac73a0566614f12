//! Forward kinematics: joint placements, body twists, frame placements.

use nalgebra::{DVector, Vector3};

use crate::error::{Result, RigidError};
use crate::model::Model;
use crate::spatial::{angular, linear, Transform};
use crate::Data;

/// Compute world placements and body-frame twists for every joint.
///
/// Fills `data.joint_placements`, `data.joint_velocities` and the internal
/// Plücker transforms reused by the dynamics passes.
pub fn forward_kinematics(
    model: &Model,
    data: &mut Data,
    q: &DVector<f64>,
    v: &DVector<f64>,
) -> Result<()> {
    if q.len() != model.nq() {
        return Err(RigidError::ConfigurationSize {
            expected: model.nq(),
            got: q.len(),
        });
    }
    if v.len() != model.nv() {
        return Err(RigidError::VelocitySize {
            expected: model.nv(),
            got: v.len(),
        });
    }

    for (i, joint) in model.joints().iter().enumerate() {
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
                data.x_world[i] = data.x_tree[i];
                data.joint_velocities[i] = v_joint;
            }
            Some(p) => {
                data.x_world[i] = data.x_tree[i].compose(&data.x_world[p]);
                data.joint_velocities[i] =
                    data.x_tree[i].apply_motion(&data.joint_velocities[p]) + v_joint;
            }
        }
        data.joint_placements[i] = data.x_world[i].to_placement();
    }
    Ok(())
}

/// Update the world placement of every fixed frame.
///
/// Requires [`forward_kinematics`] to have run on the same `data`.
pub fn update_frame_placements(model: &Model, data: &mut Data) {
    for (f, frame) in model.frames().iter().enumerate() {
        data.frame_placements[f] = data.joint_placements[frame.parent_joint] * frame.placement;
    }
}

/// World-frame linear velocity of a fixed frame's origin.
///
/// Requires [`forward_kinematics`] to have run on the same `data`.
#[must_use]
pub fn frame_velocity_world(model: &Model, data: &Data, frame_idx: usize) -> Vector3<f64> {
    let frame = &model.frames()[frame_idx];
    let twist = &data.joint_velocities[frame.parent_joint];
    let p = frame.placement.translation.vector;
    let v_local = linear(twist) + angular(twist).cross(&p);
    data.joint_placements[frame.parent_joint].rotation * v_local
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::model::Joint;
    use crate::spatial::SpatialInertia;
    use approx::assert_relative_eq;
    use nalgebra::Isometry3;

    fn pendulum() -> Model {
        let mut builder = Model::builder();
        let hinge = builder.add_joint(Joint::revolute(
            "hinge",
            Vector3::y_axis(),
            SpatialInertia::point_mass(1.0, Vector3::new(0.0, 0.0, -1.0)),
        ));
        builder.add_contact_frame("tip", hinge, Isometry3::translation(0.0, 0.0, -1.0));
        builder.build().unwrap()
    }

    #[test]
    fn test_pendulum_tip_placement() {
        let model = pendulum();
        let mut data = model.make_data();

        // Hanging straight down, the tip sits at z = -1.
        let q = DVector::from_element(1, 0.0);
        let v = DVector::from_element(1, 0.0);
        forward_kinematics(&model, &mut data, &q, &v).unwrap();
        update_frame_placements(&model, &mut data);

        let tip = data.frame_placements[0].translation.vector;
        assert_relative_eq!(tip, Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-12);

        // Rotated a quarter turn about +y, the tip swings to -x.
        let q = DVector::from_element(1, std::f64::consts::FRAC_PI_2);
        forward_kinematics(&model, &mut data, &q, &v).unwrap();
        update_frame_placements(&model, &mut data);

        let tip = data.frame_placements[0].translation.vector;
        assert_relative_eq!(tip, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_pendulum_tip_velocity() {
        let model = pendulum();
        let mut data = model.make_data();

        // At the bottom with unit joint rate the tip moves tangentially:
        // v = ω × r = (0, 1, 0) × (0, 0, -1) = (-1, 0, 0).
        let q = DVector::from_element(1, 0.0);
        let v = DVector::from_element(1, 1.0);
        forward_kinematics(&model, &mut data, &q, &v).unwrap();

        let tip_vel = frame_velocity_world(&model, &data, 0);
        assert_relative_eq!(tip_vel, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_free_flyer_placement_tracks_configuration() {
        let mut builder = Model::builder();
        builder.add_joint(Joint::free_flyer("base", SpatialInertia::sphere(1.0, 0.1)));
        let model = builder.build().unwrap();
        let mut data = model.make_data();

        let mut q = model.neutral_configuration();
        q[0] = 1.5;
        q[2] = -0.5;
        let v = DVector::zeros(6);
        forward_kinematics(&model, &mut data, &q, &v).unwrap();

        let placement = data.joint_placements[0].translation.vector;
        assert_relative_eq!(placement, Vector3::new(1.5, 0.0, -0.5), epsilon = 1e-12);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let model = pendulum();
        let mut data = model.make_data();
        let q = DVector::zeros(3);
        let v = DVector::zeros(1);
        assert!(matches!(
            forward_kinematics(&model, &mut data, &q, &v),
            Err(RigidError::ConfigurationSize { .. })
        ));
    }
}
