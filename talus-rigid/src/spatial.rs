//! Spatial algebra for 6D motion and force vectors.
//!
//! Implements Featherstone's spatial vector algebra used by the dynamics
//! algorithms (forward kinematics, ABA, RNEA). Everything here is pure math
//! with no tree state.
//!
//! Conventions:
//! - Spatial vectors are `[angular (3), linear (3)]`.
//! - Motion vectors hold `[ω, v]`, force vectors hold `[τ, f]`.

use nalgebra::{Isometry3, Matrix3, Matrix6, Vector3, Vector6};

/// 6D spatial vector: `[angular (3), linear (3)]`.
pub type SpatialVector = Vector6<f64>;

/// Angular part of a spatial vector.
#[inline]
#[must_use]
pub fn angular(s: &SpatialVector) -> Vector3<f64> {
    Vector3::new(s[0], s[1], s[2])
}

/// Linear part of a spatial vector.
#[inline]
#[must_use]
pub fn linear(s: &SpatialVector) -> Vector3<f64> {
    Vector3::new(s[3], s[4], s[5])
}

/// Assemble a spatial vector from angular and linear parts.
#[inline]
#[must_use]
pub fn spatial(ang: Vector3<f64>, lin: Vector3<f64>) -> SpatialVector {
    Vector6::new(ang.x, ang.y, ang.z, lin.x, lin.y, lin.z)
}

/// Spatial cross product for motion vectors: `v × s`.
#[inline]
#[must_use]
pub fn cross_motion(v: &SpatialVector, s: &SpatialVector) -> SpatialVector {
    let w = angular(v);
    let vl = linear(v);
    let sa = angular(s);
    let sl = linear(s);
    spatial(w.cross(&sa), w.cross(&sl) + vl.cross(&sa))
}

/// Spatial cross product for force vectors: `v ×* f`.
#[inline]
#[must_use]
pub fn cross_force(v: &SpatialVector, f: &SpatialVector) -> SpatialVector {
    let w = angular(v);
    let vl = linear(v);
    let fa = angular(f);
    let fl = linear(f);
    spatial(w.cross(&fa) + vl.cross(&fl), w.cross(&fl))
}

/// Skew-symmetric matrix of a 3-vector.
#[inline]
#[must_use]
pub fn skew(p: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -p.z, p.y, p.z, 0.0, -p.x, -p.y, p.x, 0.0)
}

/// Plücker coordinate transform between two frames.
///
/// `Transform { rotation: E, translation: r }` maps spatial vectors expressed
/// in a frame `A` into a frame `B`, where `E` rotates `A`-frame vectors into
/// `B`-frame vectors and `r` is the origin of `B` expressed in `A`.
#[derive(Debug, Clone, Copy)]
pub struct Transform {
    /// Rotation mapping source-frame vectors into destination-frame vectors.
    pub rotation: Matrix3<f64>,
    /// Destination origin expressed in the source frame.
    pub translation: Vector3<f64>,
}

impl Transform {
    /// Identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Build the transform from a placement of the destination frame in the
    /// source frame (`iso` maps destination coordinates into source
    /// coordinates).
    #[must_use]
    pub fn from_placement(iso: &Isometry3<f64>) -> Self {
        Self {
            rotation: iso.rotation.to_rotation_matrix().matrix().transpose(),
            translation: iso.translation.vector,
        }
    }

    /// Placement of the destination frame expressed in the source frame.
    #[must_use]
    pub fn to_placement(&self) -> Isometry3<f64> {
        let rot = nalgebra::Rotation3::from_matrix_unchecked(self.rotation.transpose());
        Isometry3::from_parts(
            nalgebra::Translation3::from(self.translation),
            nalgebra::UnitQuaternion::from_rotation_matrix(&rot),
        )
    }

    /// Compose `self ∘ rhs`: apply `rhs` first, then `self`.
    ///
    /// If `rhs` maps `A → B` and `self` maps `B → C`, the result maps `A → C`.
    #[must_use]
    pub fn compose(&self, rhs: &Self) -> Self {
        Self {
            rotation: self.rotation * rhs.rotation,
            translation: rhs.translation + rhs.rotation.transpose() * self.translation,
        }
    }

    /// Transform a motion vector from the source frame into the destination
    /// frame: `ω' = E ω`, `v' = E (v − r × ω)`.
    #[must_use]
    pub fn apply_motion(&self, m: &SpatialVector) -> SpatialVector {
        let w = angular(m);
        let v = linear(m);
        spatial(
            self.rotation * w,
            self.rotation * (v - self.translation.cross(&w)),
        )
    }

    /// Transform a force vector from the destination frame back into the
    /// source frame: `f = Eᵀ f'`, `τ = Eᵀ τ' + r × f`.
    ///
    /// Used when accumulating child forces onto a parent during backward
    /// passes.
    #[must_use]
    pub fn inv_apply_force(&self, f: &SpatialVector) -> SpatialVector {
        let tau = self.rotation.transpose() * angular(f);
        let lin = self.rotation.transpose() * linear(f);
        spatial(tau + self.translation.cross(&lin), lin)
    }

    /// The 6×6 motion-vector matrix `[E, 0; −E r̂, E]`.
    #[must_use]
    pub fn to_motion_matrix(&self) -> Matrix6<f64> {
        let mut x = Matrix6::zeros();
        let er = -self.rotation * skew(&self.translation);
        for i in 0..3 {
            for j in 0..3 {
                x[(i, j)] = self.rotation[(i, j)];
                x[(i + 3, j + 3)] = self.rotation[(i, j)];
                x[(i + 3, j)] = er[(i, j)];
            }
        }
        x
    }
}

/// Rigid-body spatial inertia: mass, center of mass and rotational inertia
/// about the center of mass, all expressed in the body frame.
#[derive(Debug, Clone, Copy)]
pub struct SpatialInertia {
    /// Body mass (kg).
    pub mass: f64,
    /// Center of mass in the body frame.
    pub com: Vector3<f64>,
    /// Rotational inertia about the center of mass.
    pub inertia: Matrix3<f64>,
}

impl SpatialInertia {
    /// Create a spatial inertia from mass, COM offset and inertia about COM.
    #[must_use]
    pub fn new(mass: f64, com: Vector3<f64>, inertia: Matrix3<f64>) -> Self {
        Self { mass, com, inertia }
    }

    /// Uniform solid sphere centered on the body origin.
    #[must_use]
    pub fn sphere(mass: f64, radius: f64) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self::new(mass, Vector3::zeros(), Matrix3::from_diagonal_element(i))
    }

    /// Point mass at an offset from the body origin.
    #[must_use]
    pub fn point_mass(mass: f64, offset: Vector3<f64>) -> Self {
        Self::new(mass, offset, Matrix3::zeros())
    }

    /// The 6×6 spatial inertia about the body origin (parallel-axis form):
    ///
    /// ```text
    /// I = [I_com + m (hᵀh 1 − h hᵀ),  m ĥ ]
    ///     [m ĥᵀ,                       m 1 ]
    /// ```
    #[must_use]
    pub fn to_matrix(&self) -> Matrix6<f64> {
        let m = self.mass;
        let h = self.com;
        let mut out = Matrix6::zeros();

        let h_dot_h = h.dot(&h);
        for i in 0..3 {
            for j in 0..3 {
                let delta = if i == j { 1.0 } else { 0.0 };
                out[(i, j)] = self.inertia[(i, j)] + m * (h_dot_h * delta - h[i] * h[j]);
            }
        }

        let mh = skew(&h) * m;
        for i in 0..3 {
            for j in 0..3 {
                out[(i, j + 3)] = mh[(i, j)];
                out[(i + 3, j)] = mh[(j, i)];
            }
            out[(i + 3, i + 3)] = m;
        }
        out
    }

    /// Apply the spatial inertia to a motion vector.
    ///
    /// Equivalent to `to_matrix() * v` without building the full matrix.
    #[must_use]
    pub fn mul_motion(&self, v: &SpatialVector) -> SpatialVector {
        let w = angular(v);
        let lin = linear(v);
        let h = self.com;
        let ang_out = self.inertia * w + self.mass * h.cross(&w.cross(&h)) + self.mass * h.cross(&lin);
        let lin_out = self.mass * (lin - h.cross(&w));
        spatial(ang_out, lin_out)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn test_cross_motion_matches_definition() {
        let v = spatial(Vector3::new(1.0, 2.0, 3.0), Vector3::new(0.5, -1.0, 0.25));
        let s = spatial(Vector3::new(-1.0, 0.5, 2.0), Vector3::new(1.0, 1.0, -2.0));

        let out = cross_motion(&v, &s);
        let w = angular(&v);
        let vl = linear(&v);
        assert_relative_eq!(angular(&out), w.cross(&angular(&s)), epsilon = 1e-12);
        assert_relative_eq!(
            linear(&out),
            w.cross(&linear(&s)) + vl.cross(&angular(&s)),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_cross_force_dual_identity() {
        // For any motion m and force f: (v × m) · f = −m · (v ×* f).
        let v = spatial(Vector3::new(0.3, -0.2, 0.7), Vector3::new(1.0, 0.1, -0.4));
        let m = spatial(Vector3::new(0.5, 0.5, -1.0), Vector3::new(0.2, 2.0, 0.9));
        let f = spatial(Vector3::new(-0.6, 1.2, 0.8), Vector3::new(0.4, -0.3, 1.1));

        let lhs = cross_motion(&v, &m).dot(&f);
        let rhs = -m.dot(&cross_force(&v, &f));
        assert_relative_eq!(lhs, rhs, epsilon = 1e-12);
    }

    #[test]
    fn test_transform_roundtrip_through_placement() {
        let iso = Isometry3::from_parts(
            Translation3::new(1.0, -2.0, 0.5),
            UnitQuaternion::from_euler_angles(0.3, -0.1, 0.8),
        );
        let x = Transform::from_placement(&iso);
        let back = x.to_placement();

        assert_relative_eq!(
            back.translation.vector,
            iso.translation.vector,
            epsilon = 1e-12
        );
        assert_relative_eq!(back.rotation.angle_to(&iso.rotation), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_compose_matches_matrix_product() {
        let a = Transform::from_placement(&Isometry3::from_parts(
            Translation3::new(0.2, 0.0, 1.0),
            UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3),
        ));
        let b = Transform::from_placement(&Isometry3::from_parts(
            Translation3::new(-1.0, 0.5, 0.0),
            UnitQuaternion::from_euler_angles(-0.4, 0.0, 0.9),
        ));

        let composed = a.compose(&b).to_motion_matrix();
        let product = a.to_motion_matrix() * b.to_motion_matrix();
        assert_relative_eq!(composed, product, epsilon = 1e-10);
    }

    #[test]
    fn test_apply_motion_matches_matrix() {
        let x = Transform::from_placement(&Isometry3::from_parts(
            Translation3::new(0.7, -0.3, 0.2),
            UnitQuaternion::from_euler_angles(0.5, -0.2, 0.1),
        ));
        let m = spatial(Vector3::new(1.0, 0.0, -1.0), Vector3::new(0.2, 0.4, 0.6));

        assert_relative_eq!(x.apply_motion(&m), x.to_motion_matrix() * m, epsilon = 1e-12);
    }

    #[test]
    fn test_inv_apply_force_is_transpose_action() {
        // X^T maps destination-frame forces back into the source frame.
        let x = Transform::from_placement(&Isometry3::from_parts(
            Translation3::new(0.1, 0.9, -0.5),
            UnitQuaternion::from_euler_angles(0.0, 0.6, -0.3),
        ));
        let f = spatial(Vector3::new(0.3, -0.8, 0.2), Vector3::new(1.5, 0.0, -0.7));

        let expected = x.to_motion_matrix().transpose() * f;
        assert_relative_eq!(x.inv_apply_force(&f), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_inertia_matrix() {
        let inertia = SpatialInertia::sphere(2.0, 0.5);
        let mat = inertia.to_matrix();

        let expected = 0.4 * 2.0 * 0.25;
        for i in 0..3 {
            assert_relative_eq!(mat[(i, i)], expected, epsilon = 1e-12);
            assert_relative_eq!(mat[(i + 3, i + 3)], 2.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_mul_motion_matches_matrix() {
        let inertia = SpatialInertia::new(
            1.7,
            Vector3::new(0.1, -0.3, 0.6),
            Matrix3::new(0.4, 0.01, 0.0, 0.01, 0.5, 0.02, 0.0, 0.02, 0.3),
        );
        let v = spatial(Vector3::new(0.2, 1.0, -0.5), Vector3::new(-0.8, 0.3, 0.9));

        assert_relative_eq!(inertia.mul_motion(&v), inertia.to_matrix() * v, epsilon = 1e-12);
    }

    #[test]
    fn test_point_mass_parallel_axis() {
        // A point mass at (0, 0, -1) has inertia m about x and y at the origin.
        let inertia = SpatialInertia::point_mass(3.0, Vector3::new(0.0, 0.0, -1.0));
        let mat = inertia.to_matrix();

        assert_relative_eq!(mat[(0, 0)], 3.0, epsilon = 1e-12);
        assert_relative_eq!(mat[(1, 1)], 3.0, epsilon = 1e-12);
        assert_relative_eq!(mat[(2, 2)], 0.0, epsilon = 1e-12);
    }
}
