//! Operating-point analysis.
//!
//! A homotopy ladder built on the Newton primitive: linear initial
//! estimate, plain Newton, gmin stepping, then source stepping. Each
//! stage reuses the previous stage's bias as its starting point.

use nodal_core::{CircuitMatrix, CircuitStatus};
use nodal_devices::Circuit;

use crate::error::Result;
use crate::newton::{
    solve_newton, solve_with_gmin_stepping, solve_with_source_stepping, ConvergenceCriteria,
};
use crate::result::ResultSet;

/// Operating-point driver.
#[derive(Debug, Clone, Default)]
pub struct OperatingPoint {
    pub criteria: ConvergenceCriteria,
}

impl OperatingPoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Solve the DC bias point, leaving the solution in the circuit's
    /// matrix and the bias voltages in the nonlinear devices.
    pub fn solve(&self, circuit: &mut Circuit) -> Result<()> {
        let status = CircuitStatus::op(self.criteria.gmin);

        // Stage 0: linear estimate seeds the nonlinear bias voltages.
        if let Some(estimate) = self.linear_estimate(circuit, &status) {
            circuit.update_nonlinear_voltages(&estimate)?;
        }

        // Stage 1: plain Newton.
        if solve_newton(circuit, &status, 0.0, &self.criteria).is_ok() {
            return Ok(());
        }

        // Stage 2: gmin stepping.
        log::debug!("{}: Newton failed, trying gmin stepping", circuit.name());
        if solve_with_gmin_stepping(circuit, &status, &self.criteria).is_ok() {
            return Ok(());
        }

        // Stage 3: source stepping.
        log::debug!(
            "{}: gmin stepping failed, trying source stepping",
            circuit.name()
        );
        solve_with_source_stepping(circuit, &status, &self.criteria)?;
        Ok(())
    }

    /// Run the analysis and publish `V(node)` / `I(branch)` results as
    /// single-element series.
    pub fn run(&self, circuit: &mut Circuit) -> Result<ResultSet> {
        self.solve(circuit)?;
        let mut results = ResultSet::new();
        results.store_op(&circuit.get_solution());
        Ok(results)
    }

    /// Solve a linear-devices-only copy of the system for a starting
    /// guess. Returns `None` when the reduced system is singular (for
    /// example a node touching only nonlinear devices).
    fn linear_estimate(&self, circuit: &mut Circuit, status: &CircuitStatus) -> Option<Vec<f64>> {
        let mut mat = CircuitMatrix::new(circuit.size(), false);
        if let Err(e) = circuit.stamp_linear_into(&mut mat, status) {
            log::debug!("linear estimate stamp failed: {e}");
            return None;
        }
        mat.load_gmin(self.criteria.gmin);
        match mat.factor_and_solve() {
            Ok(()) => Some(mat.solution().to_vec()),
            Err(e) => {
                log::debug!("linear estimate solve failed: {e}");
                None
            }
        }
    }
}
