//! Mechanical energy queries.
//!
//! Both functions read the placements and twists stored in [`Data`], so a
//! forward-kinematics or RNEA pass must have run on the same state first.

use crate::model::Model;
use crate::Data;

/// Kinetic energy `½ Σ vᵢᵀ Iᵢ vᵢ` from the body twists in `data`.
#[must_use]
pub fn kinetic_energy(model: &Model, data: &Data) -> f64 {
    model
        .joints()
        .iter()
        .zip(&data.joint_velocities)
        .map(|(joint, twist)| 0.5 * twist.dot(&joint.inertia.mul_motion(twist)))
        .sum()
}

/// Gravitational potential energy `−Σ mᵢ g · cᵢ` from the world COM
/// positions in `data`.
#[must_use]
pub fn potential_energy(model: &Model, data: &Data) -> f64 {
    let g = model.gravity();
    model
        .joints()
        .iter()
        .zip(&data.joint_placements)
        .map(|(joint, placement)| {
            let com_world = placement.rotation * joint.inertia.com + placement.translation.vector;
            -joint.inertia.mass * g.dot(&com_world)
        })
        .sum()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::kinematics::forward_kinematics;
    use crate::model::Joint;
    use crate::spatial::SpatialInertia;
    use approx::assert_relative_eq;
    use nalgebra::{DVector, Vector3};

    #[test]
    fn test_point_mass_energies() {
        let mut builder = Model::builder().gravity(Vector3::new(0.0, 0.0, -9.81));
        builder.add_joint(Joint::free_flyer("ball", SpatialInertia::sphere(2.0, 0.1)));
        let model = builder.build().unwrap();
        let mut data = model.make_data();

        let mut q = model.neutral_configuration();
        q[2] = 3.0;
        // Body-frame twist [ω, v] with downward linear velocity.
        let v = DVector::from_vec(vec![0.0, 0.0, 0.0, 0.0, 0.0, -1.5]);
        forward_kinematics(&model, &mut data, &q, &v).unwrap();

        let ke = kinetic_energy(&model, &data);
        let pe = potential_energy(&model, &data);

        assert_relative_eq!(ke, 0.5 * 2.0 * 1.5 * 1.5, epsilon = 1e-10);
        assert_relative_eq!(pe, 2.0 * 9.81 * 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_pendulum_potential_uses_com() {
        // Point mass 1 kg at distance 1 m below the hinge; straight down has
        // PE = -g, horizontal has PE = 0.
        let mut builder = Model::builder().gravity(Vector3::new(0.0, 0.0, -9.81));
        builder.add_joint(Joint::revolute(
            "hinge",
            Vector3::y_axis(),
            SpatialInertia::point_mass(1.0, Vector3::new(0.0, 0.0, -1.0)),
        ));
        let model = builder.build().unwrap();
        let mut data = model.make_data();

        let v = DVector::zeros(1);
        let q = DVector::zeros(1);
        forward_kinematics(&model, &mut data, &q, &v).unwrap();
        assert_relative_eq!(potential_energy(&model, &data), -9.81, epsilon = 1e-10);

        let q = DVector::from_element(1, std::f64::consts::FRAC_PI_2);
        forward_kinematics(&model, &mut data, &q, &v).unwrap();
        assert_relative_eq!(potential_energy(&model, &data), 0.0, epsilon = 1e-10);
    }
}
