//! Joint-limit penalty torques.
//!
//! When an actuated joint leaves its `[min, max]` position range, a penalty
//! spring-damper pushes it back, faded in by the same `tanh` blending law as
//! the contact model so the switch-on stays smooth at the boundary.

use nalgebra::DVector;
use talus_rigid::Model;

use crate::options::JointBoundOptions;

/// Accumulate the joint-limit penalty torque of every actuated joint into
/// `u` (length `nv`, zeroed here).
pub fn bounds_torque(
    model: &Model,
    options: &JointBoundOptions,
    q: &DVector<f64>,
    v: &DVector<f64>,
    u: &mut DVector<f64>,
) {
    u.fill(0.0);

    let actuated = model
        .joints()
        .iter()
        .filter(|j| j.kind.is_actuated())
        .zip(model.actuated_position_idx().iter().copied())
        .zip(model.actuated_velocity_idx().iter().copied());

    for ((joint, q_idx), v_idx) in actuated {
        let position = q[q_idx];
        let velocity = v[v_idx];

        let (error, force) = if position > joint.position_max {
            let error = position - joint.position_max;
            let damping = -options.bound_damping * velocity.max(0.0);
            (error, -options.bound_stiffness * error + damping)
        } else if position < joint.position_min {
            let error = joint.position_min - position;
            let damping = -options.bound_damping * velocity.min(0.0);
            (error, options.bound_stiffness * error + damping)
        } else {
            (0.0, 0.0)
        };

        let blending = (2.0 * error / options.bound_transition_eps).tanh();
        u[v_idx] += force * blending;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use talus_rigid::{Joint, Model, SpatialInertia};

    fn bounded_pendulum() -> Model {
        let mut builder = Model::builder();
        builder.add_joint(
            Joint::revolute(
                "hinge",
                Vector3::y_axis(),
                SpatialInertia::point_mass(1.0, Vector3::new(0.0, 0.0, -1.0)),
            )
            .with_position_bounds(-0.5, 0.5),
        );
        builder.build().unwrap()
    }

    fn options() -> JointBoundOptions {
        JointBoundOptions {
            bound_stiffness: 1e4,
            bound_damping: 10.0,
            bound_transition_eps: 1e-2,
        }
    }

    #[test]
    fn test_inside_bounds_no_torque() {
        let model = bounded_pendulum();
        let mut u = DVector::zeros(1);
        bounds_torque(
            &model,
            &options(),
            &DVector::from_element(1, 0.3),
            &DVector::from_element(1, 2.0),
            &mut u,
        );
        assert_relative_eq!(u[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_upper_violation_pushes_back() {
        let model = bounded_pendulum();
        let mut u = DVector::zeros(1);
        bounds_torque(
            &model,
            &options(),
            &DVector::from_element(1, 0.6),
            &DVector::zeros(1),
            &mut u,
        );
        // Deep violation: blending saturated, pure spring.
        assert_relative_eq!(u[0], -1e4 * 0.1, epsilon = 1.0);
        assert!(u[0] < 0.0);
    }

    #[test]
    fn test_lower_violation_pushes_back() {
        let model = bounded_pendulum();
        let mut u = DVector::zeros(1);
        bounds_torque(
            &model,
            &options(),
            &DVector::from_element(1, -0.7),
            &DVector::zeros(1),
            &mut u,
        );
        assert!(u[0] > 0.0);
    }

    #[test]
    fn test_damping_only_against_escape() {
        let model = bounded_pendulum();
        let opts = options();

        // Above the upper bound, moving further out: damping adds.
        let mut u_escaping = DVector::zeros(1);
        bounds_torque(
            &model,
            &opts,
            &DVector::from_element(1, 0.6),
            &DVector::from_element(1, 1.0),
            &mut u_escaping,
        );
        // Above the upper bound, moving back in: spring only.
        let mut u_returning = DVector::zeros(1);
        bounds_torque(
            &model,
            &opts,
            &DVector::from_element(1, 0.6),
            &DVector::from_element(1, -1.0),
            &mut u_returning,
        );

        assert!(u_escaping[0] < u_returning[0]);
    }

    #[test]
    fn test_smooth_switch_on_at_boundary() {
        let model = bounded_pendulum();
        let mut u = DVector::zeros(1);
        bounds_torque(
            &model,
            &options(),
            &DVector::from_element(1, 0.5 + 1e-9),
            &DVector::zeros(1),
            &mut u,
        );
        // Tiny violation: the tanh blending keeps the force tiny too.
        assert!(u[0].abs() < 1e-3);
    }
}
