//! Stepper state: the current ODE state and the last published snapshot.

use nalgebra::DVector;
use talus_rigid::Model;

/// The last published state of the simulation, updated only after an
/// accepted integrator step (or at initialization).
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Snapshot time.
    pub t: f64,
    /// Generalised configuration.
    pub q: DVector<f64>,
    /// Generalised velocity.
    pub v: DVector<f64>,
    /// Generalised acceleration.
    pub a: DVector<f64>,
    /// Total generalised effort that produced `a` (inverse dynamics).
    pub u: DVector<f64>,
    /// Saturated command torque, one entry per actuated joint.
    pub u_command: DVector<f64>,
    /// Total mechanical energy.
    pub energy: f64,
    /// Number of accepted outer iterations so far.
    pub iter: u64,
}

/// Mutable state of the integration driver.
#[derive(Debug, Clone)]
pub(crate) struct StepperState {
    /// Current ODE state `x = (q, v)`.
    pub x: DVector<f64>,
    /// Current derivative `dx/dt = (q̇, a)`.
    pub dxdt: DVector<f64>,
    /// Command scatter vector (length `nv`), refreshed on the controller clock.
    pub u_control: DVector<f64>,
    /// Internal-dynamics effort (length `nv`).
    pub u_internal: DVector<f64>,
    /// Joint-limit penalty effort (length `nv`).
    pub u_bounds: DVector<f64>,
    /// Total effort scratch (length `nv`).
    pub u_total: DVector<f64>,
    /// Configuration scratch for dynamics evaluations.
    pub q_eval: DVector<f64>,
    /// Velocity scratch for dynamics evaluations.
    pub v_eval: DVector<f64>,
    /// Last published snapshot.
    pub snapshot: Snapshot,
}

impl StepperState {
    pub(crate) fn new(model: &Model) -> Self {
        let nq = model.nq();
        let nv = model.nv();
        Self {
            x: DVector::zeros(nq + nv),
            dxdt: DVector::zeros(nq + nv),
            u_control: DVector::zeros(nv),
            u_internal: DVector::zeros(nv),
            u_bounds: DVector::zeros(nv),
            u_total: DVector::zeros(nv),
            q_eval: DVector::zeros(nq),
            v_eval: DVector::zeros(nv),
            snapshot: Snapshot {
                t: 0.0,
                q: DVector::zeros(nq),
                v: DVector::zeros(nv),
                a: DVector::zeros(nv),
                u: DVector::zeros(nv),
                u_command: DVector::zeros(model.nmotors()),
                energy: 0.0,
                iter: 0,
            },
        }
    }

    /// Reset to the initial state `x0`, zeroing every derived quantity.
    pub(crate) fn initialize(&mut self, model: &Model, x0: &DVector<f64>) {
        let nq = model.nq();
        let nv = model.nv();
        self.x.copy_from(x0);
        self.dxdt.fill(0.0);
        self.u_control.fill(0.0);
        self.u_internal.fill(0.0);
        self.u_bounds.fill(0.0);
        self.u_total.fill(0.0);
        self.snapshot.t = 0.0;
        self.snapshot.q.copy_from(&x0.rows(0, nq));
        self.snapshot.v.copy_from(&x0.rows(nq, nv));
        self.snapshot.a.fill(0.0);
        self.snapshot.u.fill(0.0);
        self.snapshot.u_command.fill(0.0);
        self.snapshot.energy = 0.0;
        self.snapshot.iter = 0;
    }

    /// Publish a new snapshot after an accepted step.
    ///
    /// `x` and `dxdt` are the integrator's live state; they are also copied
    /// into this struct so the stepper state always mirrors the last
    /// published snapshot. `u_command` is kept up to date separately by the
    /// saturation step.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn update_snapshot(
        &mut self,
        model: &Model,
        t: f64,
        x: &DVector<f64>,
        dxdt: &DVector<f64>,
        u: &DVector<f64>,
        energy: f64,
        count_iteration: bool,
    ) {
        let nq = model.nq();
        let nv = model.nv();
        self.x.copy_from(x);
        self.dxdt.copy_from(dxdt);
        self.snapshot.t = t;
        self.snapshot.q.copy_from(&x.rows(0, nq));
        self.snapshot.v.copy_from(&x.rows(nq, nv));
        self.snapshot.a.copy_from(&dxdt.rows(nq, nv));
        self.snapshot.u.copy_from(u);
        self.snapshot.energy = energy;
        if count_iteration {
            self.snapshot.iter += 1;
        }
    }
}
