//! Simulation engine: lifecycle, break-point scheduling and telemetry.
//!
//! The engine is a run-scoped value borrowing the model and controller for
//! its own lifetime; construction performs the validation the caller would
//! otherwise defer to a separate `initialize` call, so an unvalidated engine
//! is unrepresentable. One [`Engine::simulate`] call owns the CPU until the
//! run terminates: user code runs only through the controller callbacks and
//! the termination predicate, invoked synchronously from this loop.
//!
//! Per outer iteration the order is fixed: publish snapshot → termination
//! check → (optional) sensor refresh → (optional) controller update with a
//! forced re-evaluation of `dx/dt` → adaptive stepping to the next
//! break-point → inverse-dynamics and energy bookkeeping → snapshot update.

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use talus_rigid::{kinetic_energy, normalize, potential_energy, rnea, Data, Model, SpatialVector};
use talus_telemetry::{FloatChannel, IntChannel, Recorder, TelemetryLog};

use crate::controller::Controller;
use crate::dynamics::saturate_and_scatter;
use crate::error::{EngineError, Result};
use crate::ode::{Dopri5, FailedStepChecker};
use crate::options::EngineOptions;
use crate::stepper::{Snapshot, StepperState};

/// Hard minimum on the requested simulation duration (s).
pub const MIN_SIMULATION_DURATION: f64 = 0.05;

/// Cap on the number of outer iterations of a run.
pub const MAX_ITERATIONS: u64 = 100_000;

/// Tolerance used to decide that the current time sits on a sensor or
/// controller period multiple.
const BREAKPOINT_LANDING_TOL: f64 = 1e-8;

/// Initial step size in pure adaptive mode (s).
const DEFAULT_FREE_STEP: f64 = 5e-4;

/// Termination predicate: return `false` to request a cooperative stop after
/// the current iteration's publish.
pub type Callback<'a> = Box<dyn FnMut(f64, &DVector<f64>) -> bool + 'a>;

/// Telemetry channel handles, rebuilt at the start of every run from the
/// current option gates.
#[derive(Debug, Default)]
struct Channels {
    q: Vec<FloatChannel>,
    v: Vec<FloatChannel>,
    a: Vec<FloatChannel>,
    u_command: Vec<FloatChannel>,
    energy: Option<FloatChannel>,
    iter: Option<IntChannel>,
    sensors: Vec<FloatChannel>,
}

impl Channels {
    fn register(recorder: &mut Recorder, model: &Model, options: &EngineOptions) -> Result<Self> {
        let mut channels = Self::default();

        let options_json =
            serde_json::to_string(options).unwrap_or_else(|_| String::from("{}"));
        recorder.register_constant("engine.options", options_json)?;

        channels.iter = Some(recorder.register_int("iter")?);
        if options.telemetry.log_configuration {
            for name in model.position_names() {
                channels.q.push(recorder.register_float(name)?);
            }
        }
        if options.telemetry.log_velocity {
            for name in model.velocity_names() {
                channels.v.push(recorder.register_float(name)?);
            }
        }
        if options.telemetry.log_acceleration {
            for name in model.acceleration_names() {
                channels.a.push(recorder.register_float(name)?);
            }
        }
        if options.telemetry.log_command {
            for name in model.motor_names() {
                channels.u_command.push(recorder.register_float(name)?);
            }
        }
        channels.energy = Some(recorder.register_float("energy")?);
        for sensor in model.sensors() {
            for field in sensor.fieldnames() {
                channels
                    .sensors
                    .push(recorder.register_float(talus_rigid::channel_name(sensor.as_ref(), &field))?);
            }
        }
        Ok(channels)
    }
}

/// The simulation engine. See the [module documentation](self) for the
/// execution model.
pub struct Engine<'a, C: Controller> {
    pub(crate) model: &'a mut Model,
    pub(crate) controller: &'a mut C,
    callback: Callback<'a>,
    pub(crate) options: EngineOptions,
    pub(crate) state: StepperState,
    pub(crate) data: Data,
    pub(crate) fext: Vec<SpatialVector>,
    pub(crate) rng: StdRng,
    recorder: Recorder,
    channels: Channels,
}

impl<'a, C: Controller> std::fmt::Debug for Engine<'a, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl<'a, C: Controller> Engine<'a, C> {
    /// Create an engine with the default always-true termination predicate.
    ///
    /// Probes the controller once at the neutral state so wrong-sized
    /// outputs surface here rather than mid-run.
    pub fn new(model: &'a mut Model, controller: &'a mut C) -> Result<Self> {
        Self::with_callback(model, controller, Box::new(|_, _| true))
    }

    /// Create an engine with a user termination predicate.
    pub fn with_callback(
        model: &'a mut Model,
        controller: &'a mut C,
        callback: Callback<'a>,
    ) -> Result<Self> {
        let q0 = model.neutral_configuration();
        let v0 = DVector::zeros(model.nv());

        let command = controller
            .compute_command(model, 0.0, &q0, &v0)
            .map_err(EngineError::from)?;
        if command.len() != model.nmotors() {
            return Err(EngineError::bad_input(format!(
                "compute_command returned {} entries, expected {}",
                command.len(),
                model.nmotors()
            )));
        }
        let internal = controller
            .internal_dynamics(model, 0.0, &q0, &v0)
            .map_err(EngineError::from)?;
        if internal.len() != model.nv() {
            return Err(EngineError::bad_input(format!(
                "internal_dynamics returned {} entries, expected {}",
                internal.len(),
                model.nv()
            )));
        }

        let state = StepperState::new(model);
        let data = model.make_data();
        let n_joints = model.joints().len();
        tracing::debug!(
            nq = model.nq(),
            nv = model.nv(),
            nmotors = model.nmotors(),
            "engine initialized"
        );
        Ok(Self {
            model,
            controller,
            callback,
            options: EngineOptions::default(),
            state,
            data,
            fext: vec![SpatialVector::zeros(); n_joints],
            rng: StdRng::seed_from_u64(0),
            recorder: Recorder::new(),
            channels: Channels::default(),
        })
    }

    /// The borrowed model.
    #[must_use]
    pub fn model(&self) -> &Model {
        self.model
    }

    /// The last published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.state.snapshot
    }

    /// The typed options currently in force.
    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// The options as a nested dictionary.
    #[must_use]
    pub fn get_options(&self) -> serde_json::Value {
        self.options.to_value()
    }

    /// Replace the options. Gravity is pushed into the model immediately and
    /// re-read again at the start of every simulation.
    pub fn set_options(&mut self, options: EngineOptions) -> Result<()> {
        options.validate()?;
        self.model.set_gravity(options.world.gravity_linear());
        self.options = options;
        Ok(())
    }

    /// Replace the options from a dictionary, rejecting unknown keys.
    pub fn set_options_from_value(&mut self, value: serde_json::Value) -> Result<()> {
        self.set_options(EngineOptions::from_value(value)?)
    }

    /// Run the simulation from `x0` until `t_end`.
    pub fn simulate(&mut self, x0: &DVector<f64>, t_end: f64) -> Result<()> {
        if x0.len() != self.model.nx() {
            return Err(EngineError::bad_input(format!(
                "x0 has {} entries, model expects {}",
                x0.len(),
                self.model.nx()
            )));
        }
        if t_end < MIN_SIMULATION_DURATION {
            return Err(EngineError::bad_input(format!(
                "simulation duration {t_end} shorter than the {MIN_SIMULATION_DURATION} s minimum"
            )));
        }
        tracing::debug!(t_end, "starting simulation");

        let nq = self.model.nq();
        let nv = self.model.nv();

        // Gravity is re-read from the options on every run, so options set
        // before construction cannot go stale.
        self.model.set_gravity(self.options.world.gravity_linear());
        self.rng = StdRng::seed_from_u64(self.options.stepper.random_seed);
        self.model.reset();
        self.controller.reset();
        self.data = self.model.make_data();
        self.state.initialize(self.model, x0);
        for f in &mut self.fext {
            f.fill(0.0);
        }

        // Telemetry channels follow the gates in force at run start.
        self.recorder = Recorder::new();
        self.channels = Channels::register(&mut self.recorder, self.model, &self.options)?;
        self.recorder.start()?;

        let mut x = x0.clone();
        let mut dxdt = DVector::zeros(nq + nv);

        // Seed the derivative and the initial snapshot.
        self.system_dynamics(0.0, &x, &mut dxdt)?;
        {
            let q = x.rows(0, nq).clone_owned();
            let v = x.rows(nq, nv).clone_owned();
            let a = dxdt.rows(nq, nv).clone_owned();
            let u = rnea(self.model, &mut self.data, &q, &v, &a)?;
            let energy = kinetic_energy(self.model, &self.data)
                + potential_energy(self.model, &self.data);
            self.state
                .update_snapshot(self.model, 0.0, &x, &dxdt, &u, energy, false);
        }

        // Outer period: the coarsest clock the integrator must land on.
        let sensor_period = self.options.stepper.sensors_update_period;
        let control_period = self.options.stepper.controller_update_period;
        let update_period = if sensor_period < f64::EPSILON {
            control_period
        } else if control_period < f64::EPSILON {
            sensor_period
        } else {
            sensor_period.min(control_period)
        };

        let mut dt = if update_period > 0.0 {
            update_period
        } else {
            DEFAULT_FREE_STEP
        };

        let mut stepper = Dopri5::new(
            nq + nv,
            self.options.stepper.tol_abs,
            self.options.stepper.tol_rel,
        );
        let mut fail_checker = FailedStepChecker::default();

        let mut current_time = 0.0_f64;
        let mut next_time = 0.0_f64;
        loop {
            self.publish()?;

            // Exact landing, cooperative stop, or iteration cap.
            if (t_end - current_time).abs() < f64::EPSILON {
                break;
            }
            if !(self.callback)(current_time, &x) {
                tracing::debug!(t = current_time, "callback requested termination");
                break;
            }
            if self.state.snapshot.iter >= MAX_ITERATIONS {
                tracing::warn!(t = current_time, "iteration cap reached before t_end");
                break;
            }

            if update_period > 0.0 {
                // Break-point mode: land exactly on every period multiple.
                current_time = next_time;
                next_time += update_period.min(t_end - current_time);

                if sensor_period > 0.0 {
                    let nearest = (current_time / sensor_period).round() * sensor_period;
                    if (current_time - nearest).abs() < BREAKPOINT_LANDING_TOL {
                        let snapshot = &self.state.snapshot;
                        self.model.refresh_sensors(
                            snapshot.t,
                            &snapshot.q,
                            &snapshot.v,
                            &snapshot.a,
                            &snapshot.u,
                            &mut self.rng,
                        );
                    }
                }

                if control_period > 0.0 {
                    let nearest = (current_time / control_period).round() * control_period;
                    if (current_time - nearest).abs() < BREAKPOINT_LANDING_TOL {
                        let snapshot = &self.state.snapshot;
                        let command = self
                            .controller
                            .compute_command(self.model, snapshot.t, &snapshot.q, &snapshot.v)
                            .map_err(EngineError::from)?;
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
                        // The dynamics changed discontinuously; the stored
                        // derivative must be refreshed before stepping.
                        self.system_dynamics(current_time, &x, &mut dxdt)?;
                    }
                }

                while current_time < next_time {
                    // Shrink the trial step to land exactly on the break-point.
                    let mut trial_dt = dt.min(next_time - current_time);
                    let accepted = stepper.try_step(
                        |t, x, dxdt| self.system_dynamics(t, x, dxdt),
                        &mut x,
                        &mut dxdt,
                        &mut current_time,
                        &mut trial_dt,
                    )?;
                    if accepted {
                        fail_checker.reset();
                        // Do not let break-point truncation shrink the next step.
                        dt = dt.max(trial_dt);
                    } else {
                        fail_checker.failure(current_time)?;
                        dt = trial_dt;
                    }
                }
            } else {
                // Pure adaptive mode: one accepted step per outer iteration.
                dt = dt.min(t_end - current_time);
                loop {
                    let accepted = stepper.try_step(
                        |t, x, dxdt| self.system_dynamics(t, x, dxdt),
                        &mut x,
                        &mut dxdt,
                        &mut current_time,
                        &mut dt,
                    )?;
                    if accepted {
                        fail_checker.reset();
                        break;
                    }
                    fail_checker.failure(current_time)?;
                }
            }

            // The RK combination leaves the free-flyer quaternion unit only
            // to truncation order; pin it back onto the sphere.
            let mut q = x.rows(0, nq).clone_owned();
            normalize(self.model, &mut q);
            x.rows_mut(0, nq).copy_from(&q);

            // Reverse-dynamics consistency and energy; kinematics are reused
            // from the RNEA pass.
            let v = x.rows(nq, nv).clone_owned();
            let a = dxdt.rows(nq, nv).clone_owned();
            let u = rnea(self.model, &mut self.data, &q, &v, &a)?;
            let energy = kinetic_energy(self.model, &self.data)
                + potential_energy(self.model, &self.data);
            self.state
                .update_snapshot(self.model, current_time, &x, &dxdt, &u, energy, true);
        }

        tracing::debug!(
            t = current_time,
            iterations = self.state.snapshot.iter,
            rows = self.recorder.rows(),
            "simulation finished"
        );
        Ok(())
    }

    /// Decode the recorded trace.
    #[must_use]
    pub fn log_data(&self) -> TelemetryLog {
        self.recorder.log()
    }

    /// Write the recorded trace to a binary file.
    pub fn write_log_binary(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        self.recorder.write_binary(path)?;
        Ok(())
    }

    /// Write the recorded trace as text.
    pub fn write_log_txt(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        self.recorder.log().write_txt_file(path)?;
        Ok(())
    }

    /// Return to the just-constructed state, discarding the recorded trace.
    pub fn reset(&mut self) {
        self.model.reset();
        self.controller.reset();
        let zero = DVector::zeros(self.model.nx());
        self.state.initialize(self.model, &zero);
        self.recorder = Recorder::new();
        self.channels = Channels::default();
    }

    /// Record the current snapshot and sensor values as one telemetry row.
    fn publish(&mut self) -> Result<()> {
        let Self {
            model,
            state,
            recorder,
            channels,
            ..
        } = self;
        let snapshot = &state.snapshot;

        if let Some(ch) = channels.iter {
            #[allow(clippy::cast_possible_wrap)]
            recorder.set_int(ch, snapshot.iter as i64);
        }
        for (ch, value) in channels.q.iter().zip(snapshot.q.iter()) {
            recorder.set_float(*ch, *value);
        }
        for (ch, value) in channels.v.iter().zip(snapshot.v.iter()) {
            recorder.set_float(*ch, *value);
        }
        for (ch, value) in channels.a.iter().zip(snapshot.a.iter()) {
            recorder.set_float(*ch, *value);
        }
        for (ch, value) in channels.u_command.iter().zip(snapshot.u_command.iter()) {
            recorder.set_float(*ch, *value);
        }
        if let Some(ch) = channels.energy {
            recorder.set_float(ch, snapshot.energy);
        }
        let mut k = 0;
        for sensor in model.sensors() {
            for &value in sensor.values() {
                recorder.set_float(channels.sensors[k], value);
                k += 1;
            }
        }
        recorder.flush_snapshot(snapshot.t)?;
        Ok(())
    }
}
