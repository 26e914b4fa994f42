//! Transient analysis with LTE-based adaptive step control.
//!
//! Integrates the nonlinear DAE from t = 0 (seeded by an operating point
//! unless UIC is set) to `tstop`. Each step runs the transient-mode
//! Newton loop, evaluates the worst per-device local truncation error,
//! and either accepts the step (promoting device state) or halves the
//! step and retries. The integration order toggles between backward
//! Euler and trapezoidal based on the LTE margin.

use nodal_core::{CircuitStatus, IntegrationMethod};
use nodal_devices::Circuit;

use crate::error::{Error, Result};
use crate::newton::{solve_newton, ConvergenceCriteria};
use crate::op::OperatingPoint;
use crate::result::ResultSet;

/// Truncation error tolerance factor (SPICE3F5 default).
const TRTOL: f64 = 7.0;
/// Minimum step as a fraction of the initial step.
const MIN_STEP_DIVISOR: f64 = 50.0;
/// The initial step never exceeds `tstop` divided by this.
const INITIAL_STEP_POINTS: f64 = 300.0;
/// Relative LTE tolerance against the solution magnitude.
const LTE_RELTOL: f64 = 1e-3;
/// Absolute LTE tolerance floor.
const LTE_ABSTOL: f64 = 1e-6;

/// Transient analysis driver.
#[derive(Debug, Clone)]
pub struct Transient {
    /// Requested time step (also the default step cap).
    pub tstep: f64,
    /// Stop time.
    pub tstop: f64,
    /// Results are recorded from this time onward.
    pub tstart: f64,
    /// Hard step-size cap; 0 means use `tstep`.
    pub tmax: f64,
    /// Skip the operating point and start from zero state.
    pub uic: bool,
    pub criteria: ConvergenceCriteria,
}

impl Transient {
    pub fn new(tstep: f64, tstop: f64) -> Self {
        Self {
            tstep,
            tstop,
            tstart: 0.0,
            tmax: 0.0,
            uic: false,
            criteria: ConvergenceCriteria::default(),
        }
    }

    pub fn run(&self, circuit: &mut Circuit) -> Result<ResultSet> {
        if self.tstep <= 0.0 || self.tstop <= 0.0 {
            return Err(Error::InvalidParams(format!(
                "transient needs positive tstep/tstop, got {}/{}",
                self.tstep, self.tstop
            )));
        }

        let dt_initial = self.tstep.min(self.tstop / INITIAL_STEP_POINTS);
        let dt_min = dt_initial / MIN_STEP_DIVISOR;
        let dt_max = if self.tmax > 0.0 { self.tmax } else { self.tstep };
        let dt_max = dt_max.max(dt_min);
        let gmin = self.criteria.gmin;

        let mut results = ResultSet::new();
        let mut method = IntegrationMethod::BackwardEuler;

        if !self.uic {
            // Bias point seeds all device state at t = 0.
            OperatingPoint {
                criteria: self.criteria.clone(),
            }
            .solve(circuit)?;

            let seed = CircuitStatus::transient(0.0, dt_initial, method, gmin);
            circuit.load_state(&seed);
            circuit.update_state(&seed);

            if self.tstart <= 0.0 {
                results.store_time_result(0.0, &circuit.get_solution());
            }
        }

        let mut t = 0.0;
        let mut dt = dt_initial;
        let mut first_step = true;

        while t < self.tstop {
            dt = dt.clamp(dt_min, dt_max);
            let t_next = (t + dt).min(self.tstop);
            dt = t_next - t;

            let status = CircuitStatus::transient(t, dt, method, gmin);

            match solve_newton(circuit, &status, gmin, &self.criteria) {
                Ok(_) => {}
                Err(e) => {
                    if dt > dt_min {
                        log::debug!("t={t:.3e}: Newton failed ({e}), halving dt");
                        dt = (dt / 2.0).max(dt_min);
                        continue;
                    }
                    return Err(Error::TransientFailed { time: t });
                }
            }

            // Capture the just-solved state, then judge the step.
            circuit.load_state(&status);
            let lte = circuit.max_lte(&status);
            let x_max = solution_inf_norm(circuit);
            let tol = TRTOL * LTE_ABSTOL.max(LTE_RELTOL * x_max);

            if lte > tol && dt > dt_min {
                dt = (dt / 2.0).max(dt_min);
                continue;
            }

            // Order control: promote to trapezoidal after the first
            // accepted step and while the error margin is comfortable;
            // fall back to backward Euler when trapezoidal overshoots.
            if first_step {
                first_step = false;
                method = IntegrationMethod::Trapezoidal;
            } else if lte > tol {
                method = IntegrationMethod::BackwardEuler;
            } else if lte < tol / 10.0 {
                method = IntegrationMethod::Trapezoidal;
            }

            circuit.update_state(&status);
            t = t_next;

            if t >= self.tstart {
                results.store_time_result(t, &circuit.get_solution());
            }

            if t < self.tstop {
                if lte < tol / 100.0 {
                    dt *= 2.0;
                } else {
                    dt *= 1.1;
                }
                dt = dt.min(dt_max);
            }
        }

        Ok(results)
    }
}

fn solution_inf_norm(circuit: &Circuit) -> f64 {
    circuit
        .matrix()
        .solution()
        .iter()
        .skip(1)
        .fold(0.0, |acc, v| acc.max(v.abs()))
}
