//! System dynamics assembler.
//!
//! Given `(t, x)`, fuses kinematics, ground contacts, the command torque,
//! the controller's internal dynamics and the joint-limit penalties into
//! `dx/dt` through forward dynamics. Only one evaluation is ever in flight:
//! the integrator calls back into the engine synchronously.

use nalgebra::DVector;
use talus_rigid::{aba, forward_kinematics, integrate, update_frame_placements, Model};

use crate::bounds::bounds_torque;
use crate::contact::contact_wrench;
use crate::controller::Controller;
use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// Floor on the finite-difference interval of the configuration derivative.
///
/// Values much below this trigger catastrophic cancellation in
/// `(integrate(q, v·Δt) − q) / Δt` on the first evaluation of a step.
const MIN_DERIVATIVE_DT: f64 = 1e-5;

/// Saturate the command to the effort limits and scatter it into the
/// full-length control vector at the actuated-joint rows.
pub(crate) fn saturate_and_scatter(
    model: &Model,
    u_command: &mut DVector<f64>,
    u_control: &mut DVector<f64>,
) {
    let actuated = model
        .joints()
        .iter()
        .filter(|j| j.kind.is_actuated())
        .zip(model.actuated_velocity_idx().iter().copied())
        .enumerate();
    for (i, (joint, v_idx)) in actuated {
        u_command[i] = u_command[i].clamp(-joint.effort_limit, joint.effort_limit);
        u_control[v_idx] = u_command[i];
    }
}

impl<C: Controller> Engine<'_, C> {
    /// Evaluate `dx/dt` at `(t, x)`.
    ///
    /// Pure with respect to `(t, x)` up to reads of the last snapshot's
    /// acceleration and effort, which feed the sensors in continuous mode.
    pub(crate) fn system_dynamics(
        &mut self,
        t: f64,
        x: &DVector<f64>,
        dxdt: &mut DVector<f64>,
    ) -> Result<()> {
        let nq = self.model.nq();
        let nv = self.model.nv();

        self.state.q_eval.copy_from(&x.rows(0, nq));
        self.state.v_eval.copy_from(&x.rows(nq, nv));

        // Kinematics for the contact model.
        forward_kinematics(self.model, &mut self.data, &self.state.q_eval, &self.state.v_eval)?;
        update_frame_placements(self.model, &mut self.data);

        // External forces: one wrench per contact frame, accumulated on the
        // parent joint and exported through the model's contact buffer.
        for f in &mut self.fext {
            f.fill(0.0);
        }
        for i in 0..self.model.contact_frames().len() {
            let frame_idx = self.model.contact_frames()[i];
            let wrench = contact_wrench(self.model, &self.data, frame_idx, &self.options.contacts);
            self.model.contact_forces[i] = wrench;
            self.fext[self.model.frames()[frame_idx].parent_joint] += wrench;
        }

        // Continuous-mode refresh: with no sensor clock the readings track
        // every evaluation; the acceleration and effort lag one snapshot.
        if self.options.stepper.sensors_update_period < f64::EPSILON {
            self.model.refresh_sensors(
                t,
                &self.state.q_eval,
                &self.state.v_eval,
                &self.state.snapshot.a,
                &self.state.snapshot.u,
                &mut self.rng,
            );
        }

        // Continuous-mode command: the dynamics change with every evaluation.
        if self.options.stepper.controller_update_period < f64::EPSILON {
            let command = self.controller.compute_command(
                self.model,
                t,
                &self.state.q_eval,
                &self.state.v_eval,
            )?;
            if command.len() != self.model.nmotors() {
                return Err(EngineError::bad_input(format!(
                    "compute_command returned {} entries, expected {}",
                    command.len(),
                    self.model.nmotors()
                )));
            }
            self.state.snapshot.u_command.copy_from(&command);
            saturate_and_scatter(
                self.model,
                &mut self.state.snapshot.u_command,
                &mut self.state.u_control,
            );
        }

        let internal = self.controller.internal_dynamics(
            self.model,
            t,
            &self.state.q_eval,
            &self.state.v_eval,
        )?;
        if internal.len() != nv {
            return Err(EngineError::bad_input(format!(
                "internal_dynamics returned {} entries, expected {nv}",
                internal.len()
            )));
        }
        self.state.u_internal.copy_from(&internal);

        bounds_torque(
            self.model,
            &self.options.joints,
            &self.state.q_eval,
            &self.state.v_eval,
            &mut self.state.u_bounds,
        );

        self.state.u_total.copy_from(&self.state.u_bounds);
        self.state.u_total += &self.state.u_internal;
        self.state.u_total += &self.state.u_control;

        let a = aba(
            self.model,
            &mut self.data,
            &self.state.q_eval,
            &self.state.v_eval,
            &self.state.u_total,
            &self.fext,
        )?;

        // Manifold-consistent configuration derivative: finite difference of
        // the group integration, with a floor on the interval.
        let dt_fd = (t - self.state.snapshot.t).max(MIN_DERIVATIVE_DT);
        let q_next = integrate(self.model, &self.state.q_eval, &(&self.state.v_eval * dt_fd))?;
        dxdt.rows_mut(0, nq)
            .copy_from(&((q_next - &self.state.q_eval) / dt_fd));
        dxdt.rows_mut(nq, nv).copy_from(&a);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use talus_rigid::{Joint, SpatialInertia};

    #[test]
    fn test_saturation_clamps_and_scatters() {
        let mut builder = Model::builder();
        let base = builder.add_joint(Joint::free_flyer("base", SpatialInertia::sphere(1.0, 0.1)));
        builder.add_joint(
            Joint::revolute("hinge", Vector3::y_axis(), SpatialInertia::sphere(0.5, 0.05))
                .with_parent(base)
                .with_effort_limit(2.0),
        );
        let model = builder.build().unwrap();

        let mut u_command = DVector::from_element(1, 10.0);
        let mut u_control = DVector::zeros(model.nv());
        saturate_and_scatter(&model, &mut u_command, &mut u_control);

        assert_relative_eq!(u_command[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(u_control[6], 2.0, epsilon = 1e-12);
        assert_relative_eq!(u_control.rows(0, 6).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_saturation_is_symmetric() {
        let mut builder = Model::builder();
        builder.add_joint(
            Joint::revolute("hinge", Vector3::y_axis(), SpatialInertia::sphere(0.5, 0.05))
                .with_effort_limit(3.5),
        );
        let model = builder.build().unwrap();

        let mut u_command = DVector::from_element(1, -100.0);
        let mut u_control = DVector::zeros(1);
        saturate_and_scatter(&model, &mut u_command, &mut u_control);

        assert_relative_eq!(u_command[0], -3.5, epsilon = 1e-12);
        assert_relative_eq!(u_control[0], -3.5, epsilon = 1e-12);
    }
}
