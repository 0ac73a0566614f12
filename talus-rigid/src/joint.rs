//! Joint models: configuration space, motion subspace and manifold updates.
//!
//! Three joint kinds are supported: a 6-DoF free-flyer whose orientation is a
//! unit quaternion, and scalar revolute/prismatic joints. The free-flyer is
//! the only joint whose configuration does not live in a vector space, so all
//! configuration updates go through [`JointKind::integrate`] rather than raw
//! addition.

use nalgebra::{Isometry3, Quaternion, Translation3, Unit, UnitQuaternion, Vector3};

use crate::spatial::{spatial, SpatialVector, Transform};

/// Configuration layout of the free-flyer block: `(tx, ty, tz, qx, qy, qz, qw)`.
pub const FREE_FLYER_NQ: usize = 7;
/// Velocity layout of the free-flyer block: body-frame `[ω (3), v (3)]`.
pub const FREE_FLYER_NV: usize = 6;

/// The kind of a joint, together with its fixed geometric data.
#[derive(Debug, Clone)]
pub enum JointKind {
    /// 6-DoF virtual joint letting the root body move freely in space.
    FreeFlyer,
    /// 1-DoF rotation about a fixed axis.
    Revolute {
        /// Rotation axis in the joint frame.
        axis: Unit<Vector3<f64>>,
    },
    /// 1-DoF translation along a fixed axis.
    Prismatic {
        /// Translation axis in the joint frame.
        axis: Unit<Vector3<f64>>,
    },
}

impl JointKind {
    /// Number of configuration coordinates.
    #[must_use]
    pub fn nq(&self) -> usize {
        match self {
            Self::FreeFlyer => FREE_FLYER_NQ,
            Self::Revolute { .. } | Self::Prismatic { .. } => 1,
        }
    }

    /// Number of velocity coordinates (degrees of freedom).
    #[must_use]
    pub fn nv(&self) -> usize {
        match self {
            Self::FreeFlyer => FREE_FLYER_NV,
            Self::Revolute { .. } | Self::Prismatic { .. } => 1,
        }
    }

    /// Whether this joint carries a single actuated scalar coordinate.
    #[must_use]
    pub fn is_actuated(&self) -> bool {
        !matches!(self, Self::FreeFlyer)
    }

    /// Write the neutral configuration into `q` (length `nq`).
    pub fn neutral(&self, q: &mut [f64]) {
        match self {
            Self::FreeFlyer => {
                q[..6].fill(0.0);
                q[6] = 1.0;
            }
            Self::Revolute { .. } | Self::Prismatic { .. } => q[0] = 0.0,
        }
    }

    /// Joint transform (Plücker, parent side → joint side) at configuration
    /// `q` (length `nq`).
    #[must_use]
    pub fn transform(&self, q: &[f64]) -> Transform {
        Transform::from_placement(&self.placement(q))
    }

    /// Placement of the joint frame in its parent-side frame at `q`.
    #[must_use]
    pub fn placement(&self, q: &[f64]) -> Isometry3<f64> {
        match self {
            Self::FreeFlyer => Isometry3::from_parts(
                Translation3::new(q[0], q[1], q[2]),
                Unit::new_normalize(Quaternion::new(q[6], q[3], q[4], q[5])),
            ),
            Self::Revolute { axis } => Isometry3::from_parts(
                Translation3::identity(),
                UnitQuaternion::from_axis_angle(axis, q[0]),
            ),
            Self::Prismatic { axis } => Isometry3::from_parts(
                Translation3::from(axis.into_inner() * q[0]),
                UnitQuaternion::identity(),
            ),
        }
    }

    /// Joint-space velocity contribution `S · q̇` in joint coordinates.
    #[must_use]
    pub fn velocity(&self, qd: &[f64]) -> SpatialVector {
        match self {
            Self::FreeFlyer => SpatialVector::from_column_slice(qd),
            Self::Revolute { axis } => spatial(axis.into_inner() * qd[0], Vector3::zeros()),
            Self::Prismatic { axis } => spatial(Vector3::zeros(), axis.into_inner() * qd[0]),
        }
    }

    /// Motion subspace of a 1-DoF joint, `None` for the free-flyer (whose
    /// subspace is the 6×6 identity).
    #[must_use]
    pub fn axis_subspace(&self) -> Option<SpatialVector> {
        match self {
            Self::FreeFlyer => None,
            Self::Revolute { axis } => Some(spatial(axis.into_inner(), Vector3::zeros())),
            Self::Prismatic { axis } => Some(spatial(Vector3::zeros(), axis.into_inner())),
        }
    }

    /// Integrate the configuration block `q` (length `nq`) by the tangent
    /// displacement `dq` (length `nv`, already scaled by the time step).
    ///
    /// The free-flyer translation advances by the body-frame linear
    /// displacement rotated into the world, and the orientation by the
    /// quaternion exponential of the body-frame angular displacement. The
    /// quaternion is renormalized so it stays unit to machine precision.
    pub fn integrate(&self, q: &mut [f64], dq: &[f64]) {
        match self {
            Self::FreeFlyer => {
                let rot = Unit::new_normalize(Quaternion::new(q[6], q[3], q[4], q[5]));
                let d_ang = Vector3::new(dq[0], dq[1], dq[2]);
                let d_lin = Vector3::new(dq[3], dq[4], dq[5]);

                let t_next = Vector3::new(q[0], q[1], q[2]) + rot * d_lin;
                let rot_next = Unit::new_normalize(
                    (rot * UnitQuaternion::from_scaled_axis(d_ang)).into_inner(),
                );

                q[0] = t_next.x;
                q[1] = t_next.y;
                q[2] = t_next.z;
                q[3] = rot_next.coords[0];
                q[4] = rot_next.coords[1];
                q[5] = rot_next.coords[2];
                q[6] = rot_next.coords[3];
            }
            Self::Revolute { .. } | Self::Prismatic { .. } => q[0] += dq[0],
        }
    }

    /// Suffixes of the configuration coordinates, used to mint channel names.
    #[must_use]
    pub fn position_suffixes(&self) -> Vec<&'static str> {
        match self {
            Self::FreeFlyer => vec![
                "trans_x", "trans_y", "trans_z", "quat_x", "quat_y", "quat_z", "quat_w",
            ],
            Self::Revolute { .. } | Self::Prismatic { .. } => vec!["position"],
        }
    }

    /// Suffixes of the velocity coordinates.
    #[must_use]
    pub fn velocity_suffixes(&self) -> Vec<&'static str> {
        match self {
            Self::FreeFlyer => vec![
                "omega_x", "omega_y", "omega_z", "vel_x", "vel_y", "vel_z",
            ],
            Self::Revolute { .. } | Self::Prismatic { .. } => vec!["velocity"],
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_neutral_free_flyer_is_identity() {
        let kind = JointKind::FreeFlyer;
        let mut q = [f64::NAN; 7];
        kind.neutral(&mut q);

        let placement = kind.placement(&q);
        assert_relative_eq!(placement.translation.vector.norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(placement.rotation.angle(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_revolute_transform_rotates_about_axis() {
        let kind = JointKind::Revolute {
            axis: Vector3::z_axis(),
        };
        let placement = kind.placement(&[std::f64::consts::FRAC_PI_2]);

        let rotated = placement.rotation * Vector3::x();
        assert_relative_eq!(rotated, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_prismatic_velocity_is_linear() {
        let kind = JointKind::Prismatic {
            axis: Vector3::x_axis(),
        };
        let v = kind.velocity(&[2.0]);
        assert_relative_eq!(v[3], 2.0, epsilon = 1e-12);
        assert_relative_eq!(v.fixed_rows::<3>(0).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_free_flyer_integrate_pure_translation() {
        let kind = JointKind::FreeFlyer;
        let mut q = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        // Body-frame linear displacement with identity orientation.
        kind.integrate(&mut q, &[0.0, 0.0, 0.0, 0.1, -0.2, 0.3]);

        assert_relative_eq!(q[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(q[1], -0.2, epsilon = 1e-12);
        assert_relative_eq!(q[2], 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_free_flyer_integrate_keeps_quaternion_unit() {
        let kind = JointKind::FreeFlyer;
        let mut q = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0];

        for _ in 0..10_000 {
            kind.integrate(&mut q, &[1e-2, -2e-2, 3e-2, 0.0, 0.0, 0.0]);
        }
        let norm = (q[3] * q[3] + q[4] * q[4] + q[5] * q[5] + q[6] * q[6]).sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_free_flyer_integrate_rotation_composes() {
        let kind = JointKind::FreeFlyer;
        let mut q = [0.0; 7];
        kind.neutral(&mut q);

        // Two quarter turns about z.
        let half = std::f64::consts::FRAC_PI_2;
        kind.integrate(&mut q, &[0.0, 0.0, half, 0.0, 0.0, 0.0]);
        kind.integrate(&mut q, &[0.0, 0.0, half, 0.0, 0.0, 0.0]);

        let placement = kind.placement(&q);
        let rotated = placement.rotation * Vector3::x();
        assert_relative_eq!(rotated, -Vector3::x(), epsilon = 1e-10);
    }
}
