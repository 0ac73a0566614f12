//! Embedded Runge–Kutta stepping with PI step-size control.
//!
//! Dormand–Prince 5(4): fifth-order solution with an embedded fourth-order
//! error estimate and the FSAL property (the last stage of an accepted step
//! is the first stage of the next one). [`Dopri5::try_step`] consumes and
//! updates the caller's stored derivative, so a derivative refreshed after a
//! control discontinuity is honored by the next trial step.

use nalgebra::DVector;

use crate::error::{EngineError, Result};

/// Step-size safety factor.
const SAFETY: f64 = 0.9;
/// Largest growth of the step size after an accepted step.
const MAX_FACTOR: f64 = 5.0;
/// Smallest shrink of the step size after a rejected step.
const MIN_FACTOR: f64 = 0.2;
/// Proportional exponent of the PI controller (`0.7 / order`).
const ALPHA: f64 = 0.7 / 5.0;
/// Integral exponent of the PI controller (`0.4 / order`).
const BETA: f64 = 0.4 / 5.0;

/// Consecutive-rejection quota of the failure limiter.
pub(crate) const MAX_CONSECUTIVE_FAILURES: u32 = 500;

/// Floor on proposed step sizes. Repeated rejections must not shrink the
/// step to zero: a zero-size step is always "accepted" without making
/// progress, which would defeat the failure limiter.
const MIN_STEP: f64 = 1e-14;

// Dormand–Prince 5(4) tableau.
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// b − b̂: weights of the embedded error estimate.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

/// Controlled Dormand–Prince 5(4) stepper.
#[derive(Debug)]
pub(crate) struct Dopri5 {
    tol_abs: f64,
    tol_rel: f64,
    /// Error of the last accepted step, floored; feeds the PI integral term.
    err_prev: f64,
    k2: DVector<f64>,
    k3: DVector<f64>,
    k4: DVector<f64>,
    k5: DVector<f64>,
    k6: DVector<f64>,
    k7: DVector<f64>,
    x_stage: DVector<f64>,
    x_trial: DVector<f64>,
}

impl Dopri5 {
    pub(crate) fn new(nx: usize, tol_abs: f64, tol_rel: f64) -> Self {
        Self {
            tol_abs,
            tol_rel,
            err_prev: 1e-4,
            k2: DVector::zeros(nx),
            k3: DVector::zeros(nx),
            k4: DVector::zeros(nx),
            k5: DVector::zeros(nx),
            k6: DVector::zeros(nx),
            k7: DVector::zeros(nx),
            x_stage: DVector::zeros(nx),
            x_trial: DVector::zeros(nx),
        }
    }

    /// Attempt one controlled step of size `*dt`.
    ///
    /// On acceptance `x`, `dxdt` and `t` advance and `*dt` becomes the
    /// proposal for the next step (which may be larger). On rejection the
    /// state is untouched and `*dt` is shrunk. `dxdt` must hold the
    /// derivative at `(t, x)` on entry.
    pub(crate) fn try_step<F>(
        &mut self,
        mut rhs: F,
        x: &mut DVector<f64>,
        dxdt: &mut DVector<f64>,
        t: &mut f64,
        dt: &mut f64,
    ) -> Result<bool>
    where
        F: FnMut(f64, &DVector<f64>, &mut DVector<f64>) -> Result<()>,
    {
        let h = *dt;
        let k1 = &*dxdt;

        self.x_stage.copy_from(x);
        self.x_stage.axpy(h * A21, k1, 1.0);
        rhs(*t + C2 * h, &self.x_stage, &mut self.k2)?;

        self.x_stage.copy_from(x);
        self.x_stage.axpy(h * A31, k1, 1.0);
        self.x_stage.axpy(h * A32, &self.k2, 1.0);
        rhs(*t + C3 * h, &self.x_stage, &mut self.k3)?;

        self.x_stage.copy_from(x);
        self.x_stage.axpy(h * A41, k1, 1.0);
        self.x_stage.axpy(h * A42, &self.k2, 1.0);
        self.x_stage.axpy(h * A43, &self.k3, 1.0);
        rhs(*t + C4 * h, &self.x_stage, &mut self.k4)?;

        self.x_stage.copy_from(x);
        self.x_stage.axpy(h * A51, k1, 1.0);
        self.x_stage.axpy(h * A52, &self.k2, 1.0);
        self.x_stage.axpy(h * A53, &self.k3, 1.0);
        self.x_stage.axpy(h * A54, &self.k4, 1.0);
        rhs(*t + C5 * h, &self.x_stage, &mut self.k5)?;

        self.x_stage.copy_from(x);
        self.x_stage.axpy(h * A61, k1, 1.0);
        self.x_stage.axpy(h * A62, &self.k2, 1.0);
        self.x_stage.axpy(h * A63, &self.k3, 1.0);
        self.x_stage.axpy(h * A64, &self.k4, 1.0);
        self.x_stage.axpy(h * A65, &self.k5, 1.0);
        rhs(*t + h, &self.x_stage, &mut self.k6)?;

        self.x_trial.copy_from(x);
        self.x_trial.axpy(h * B1, k1, 1.0);
        self.x_trial.axpy(h * B3, &self.k3, 1.0);
        self.x_trial.axpy(h * B4, &self.k4, 1.0);
        self.x_trial.axpy(h * B5, &self.k5, 1.0);
        self.x_trial.axpy(h * B6, &self.k6, 1.0);

        // FSAL stage: derivative at the trial state.
        rhs(*t + h, &self.x_trial, &mut self.k7)?;

        // A divergent trial state (NaN/Inf) would slip through the max-based
        // norm below; reject it outright.
        if !self.x_trial.iter().all(|v| v.is_finite()) {
            *dt = (h * MIN_FACTOR).max(MIN_STEP);
            return Ok(false);
        }

        // Mixed absolute/relative error norm.
        let mut err: f64 = 0.0;
        for i in 0..x.len() {
            let e = h
                * (E1 * k1[i]
                    + E3 * self.k3[i]
                    + E4 * self.k4[i]
                    + E5 * self.k5[i]
                    + E6 * self.k6[i]
                    + E7 * self.k7[i]);
            let scale = self.tol_abs + self.tol_rel * x[i].abs().max(self.x_trial[i].abs());
            err = err.max((e / scale).abs());
        }

        if err <= 1.0 {
            *t += h;
            x.copy_from(&self.x_trial);
            dxdt.copy_from(&self.k7);

            let factor = if err == 0.0 {
                MAX_FACTOR
            } else {
                (SAFETY * err.powf(-ALPHA) * self.err_prev.powf(BETA))
                    .clamp(MIN_FACTOR, MAX_FACTOR)
            };
            self.err_prev = err.max(1e-4);
            *dt = (h * factor).max(MIN_STEP);
            Ok(true)
        } else {
            *dt = (h * (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, 1.0)).max(MIN_STEP);
            Ok(false)
        }
    }
}

/// Counts consecutive rejected trial steps and aborts the run once the quota
/// is exhausted, so a shrinking step size cannot loop forever.
#[derive(Debug, Default)]
pub(crate) struct FailedStepChecker {
    consecutive: u32,
}

impl FailedStepChecker {
    pub(crate) fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub(crate) fn failure(&mut self, t: f64) -> Result<()> {
        self.consecutive += 1;
        if self.consecutive >= MAX_CONSECUTIVE_FAILURES {
            tracing::error!(t, consecutive = self.consecutive, "integrator cannot make progress");
            return Err(EngineError::StepFailure {
                t,
                consecutive: self.consecutive,
            });
        }
        Ok(())
    }
}
