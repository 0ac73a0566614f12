//! Configuration integration on the manifold.

use nalgebra::DVector;

use crate::error::{Result, RigidError};
use crate::model::Model;

/// Integrate a configuration by a tangent displacement `dq` (length `nv`,
/// already scaled by the time step).
///
/// Scalar coordinates advance by addition; the free-flyer block goes through
/// the quaternion exponential so the orientation stays on the unit sphere.
pub fn integrate(model: &Model, q: &DVector<f64>, dq: &DVector<f64>) -> Result<DVector<f64>> {
    if q.len() != model.nq() {
        return Err(RigidError::ConfigurationSize {
            expected: model.nq(),
            got: q.len(),
        });
    }
    if dq.len() != model.nv() {
        return Err(RigidError::VelocitySize {
            expected: model.nv(),
            got: dq.len(),
        });
    }

    let mut out = q.clone();
    for (i, joint) in model.joints().iter().enumerate() {
        let q_off = model.q_offset(i);
        let v_off = model.v_offset(i);
        let nq = joint.kind.nq();
        let nv = joint.kind.nv();
        joint.kind.integrate(
            &mut out.as_mut_slice()[q_off..q_off + nq],
            &dq.as_slice()[v_off..v_off + nv],
        );
    }
    Ok(out)
}

/// Renormalize the quaternion blocks of a configuration in place.
///
/// Integrators that combine several manifold-consistent derivatives (e.g. the
/// stages of an embedded Runge–Kutta pair) leave the free-flyer quaternion
/// unit only to truncation order; calling this after every accepted step pins
/// it back onto the sphere.
pub fn normalize(model: &Model, q: &mut DVector<f64>) {
    for (i, joint) in model.joints().iter().enumerate() {
        if matches!(joint.kind, crate::joint::JointKind::FreeFlyer) {
            let off = model.q_offset(i) + 3;
            let norm = q.rows(off, 4).norm();
            if norm > 0.0 {
                let mut block = q.rows_mut(off, 4);
                block /= norm;
            }
        }
    }
}
