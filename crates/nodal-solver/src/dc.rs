//! DC sweep analysis: one or two swept sources over inclusive grids.

use nodal_core::CircuitStatus;
use nodal_devices::Circuit;

use crate::error::{Error, Result};
use crate::newton::{solve_newton, ConvergenceCriteria};
use crate::op::OperatingPoint;
use crate::result::ResultSet;

/// One swept source with its inclusive grid.
#[derive(Debug, Clone)]
pub struct SweepSpec {
    pub source: String,
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl SweepSpec {
    /// The inclusive grid: `floor((stop-start)/step) + 1` points when
    /// `start <= stop`.
    pub fn grid(&self) -> Vec<f64> {
        if self.step == 0.0 {
            return vec![self.start];
        }
        let span = (self.stop - self.start) / self.step;
        if span < 0.0 {
            return vec![self.start];
        }
        // Tolerate accumulated rounding at the last grid point.
        let n = (span + 1e-9).floor() as usize + 1;
        (0..n).map(|i| self.start + i as f64 * self.step).collect()
    }
}

/// DC sweep driver: a single sweep, or a nested pair where the inner
/// source runs its full grid for every outer point.
#[derive(Debug, Clone)]
pub struct DcSweep {
    pub sweeps: Vec<SweepSpec>,
    pub criteria: ConvergenceCriteria,
}

impl DcSweep {
    pub fn new(sweeps: Vec<SweepSpec>) -> Self {
        Self {
            sweeps,
            criteria: ConvergenceCriteria::default(),
        }
    }

    pub fn run(&self, circuit: &mut Circuit) -> Result<ResultSet> {
        match self.sweeps.len() {
            1 => self.single_sweep(circuit),
            2 => self.nested_sweep(circuit),
            n => Err(Error::InvalidParams(format!(
                "unsupported number of sweep sources: {n}"
            ))),
        }
    }

    /// Solve one grid point: warm-started Newton, with the full OP
    /// homotopy as a fallback for hard corners.
    fn solve_point(&self, circuit: &mut Circuit) -> Result<()> {
        let status = CircuitStatus::op(self.criteria.gmin);
        if solve_newton(circuit, &status, 0.0, &self.criteria).is_ok() {
            return Ok(());
        }
        OperatingPoint {
            criteria: self.criteria.clone(),
        }
        .solve(circuit)
    }

    fn original_value(&self, circuit: &Circuit, name: &str) -> Result<f64> {
        circuit
            .source_value(name)
            .ok_or_else(|| Error::SourceNotFound(name.to_string()))
    }

    fn single_sweep(&self, circuit: &mut Circuit) -> Result<ResultSet> {
        let spec = &self.sweeps[0];
        let original = self.original_value(circuit, &spec.source)?;

        let mut results = ResultSet::new();
        let outcome = (|| -> Result<()> {
            for value in spec.grid() {
                circuit.set_source_value(&spec.source, value)?;
                self.solve_point(circuit)?;
                results.store_sweep_result(&[("SWEEP1", value)], &circuit.get_solution());
            }
            Ok(())
        })();

        circuit.set_source_value(&spec.source, original)?;
        outcome?;
        Ok(results)
    }

    fn nested_sweep(&self, circuit: &mut Circuit) -> Result<ResultSet> {
        let (outer, inner) = (&self.sweeps[0], &self.sweeps[1]);
        let outer_orig = self.original_value(circuit, &outer.source)?;
        let inner_orig = self.original_value(circuit, &inner.source)?;

        let mut results = ResultSet::new();
        let outcome = (|| -> Result<()> {
            for outer_value in outer.grid() {
                circuit.set_source_value(&outer.source, outer_value)?;
                for inner_value in inner.grid() {
                    circuit.set_source_value(&inner.source, inner_value)?;
                    self.solve_point(circuit)?;
                    results.store_sweep_result(
                        &[("SWEEP1", outer_value), ("SWEEP2", inner_value)],
                        &circuit.get_solution(),
                    );
                }
            }
            Ok(())
        })();

        circuit.set_source_value(&outer.source, outer_orig)?;
        circuit.set_source_value(&inner.source, inner_orig)?;
        outcome?;
        Ok(results)
    }
}
