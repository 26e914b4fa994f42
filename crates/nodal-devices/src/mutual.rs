//! Mutual coupling (K element) between inductors.
//!
//! For every pair of linked windings the mutual inductance is
//! `M = k * sqrt(Li * Lj)`. Linear inductors couple through their branch
//! rows. Magnetic windings have no branch rows, so the K element owns
//! their full trapezoidal companion: the conductance block `(dt/2) * G`
//! with `G` the inverse of the inductance matrix `[Li, Mij]`, plus the
//! matching per-winding history currents. Coupled windings skip their own
//! transient stamp.

use nalgebra::DMatrix;
use nodal_core::{AnalysisMode, CircuitMatrix, CircuitStatus};

use crate::error::Result;

/// Per-winding snapshot assembled by the circuit before each stamp pass.
#[derive(Debug, Clone)]
pub struct CoupledWinding {
    pub name: String,
    /// Branch row for linear inductors; `None` for magnetic windings.
    pub branch: Option<usize>,
    pub nodes: [usize; 2],
    /// Inductance (linear value or magnetic `L_eff`).
    pub inductance: f64,
    /// Current at the last accepted step (n1 -> n2 positive).
    pub current_prev: f64,
    /// Voltage at the last accepted step.
    pub voltage_prev: f64,
}

/// A K element: couples two or more inductors by name.
#[derive(Debug, Clone)]
pub struct Mutual {
    pub name: String,
    /// Names of the coupled inductors, as written in the netlist.
    pub inductor_names: Vec<String>,
    /// Coupling coefficient, -1 <= k <= 1.
    pub coefficient: f64,
}

impl Mutual {
    pub fn new(name: impl Into<String>, inductor_names: Vec<String>, coefficient: f64) -> Self {
        Self {
            name: name.into(),
            inductor_names,
            coefficient,
        }
    }

    /// Mutual inductance for one pair.
    pub fn mutual_inductance(&self, li: f64, lj: f64) -> f64 {
        self.coefficient * (li * lj).sqrt()
    }

    /// Stamp the coupling contributions. `windings` carries the resolved
    /// state of the coupled inductors in `inductor_names` order.
    pub fn stamp(
        &self,
        mat: &mut CircuitMatrix,
        windings: &[CoupledWinding],
        status: &CircuitStatus,
    ) -> Result<()> {
        if self.coefficient == 0.0 {
            // k = 0 is equivalent to absent coupling.
            return Ok(());
        }

        match status.mode {
            AnalysisMode::OperatingPoint => Ok(()),
            AnalysisMode::Transient => self.stamp_transient(mat, windings, status),
            AnalysisMode::Ac => self.stamp_ac(mat, windings, status),
        }
    }

    /// Whether this coupling is over magnetic windings (no branch rows).
    pub fn is_magnetic(windings: &[CoupledWinding]) -> bool {
        windings.iter().any(|w| w.branch.is_none())
    }

    /// Inverse of the coupled inductance matrix `[Li, k*sqrt(Li*Lj)]`.
    ///
    /// `|k| = 1` makes the matrix singular; the diagonal is nudged before
    /// inversion so unity coupling degrades gracefully instead of
    /// crashing.
    pub fn inverse_inductance(&self, windings: &[CoupledWinding]) -> DMatrix<f64> {
        let n = windings.len();
        let mut l = DMatrix::zeros(n, n);
        for r in 0..n {
            for c in 0..n {
                l[(r, c)] = if r == c {
                    windings[r].inductance
                } else {
                    self.mutual_inductance(windings[r].inductance, windings[c].inductance)
                };
            }
        }
        let nudge = 1e-6 * windings.iter().map(|w| w.inductance).fold(0.0, f64::max);
        loop {
            if let Some(inv) = l.clone().try_inverse() {
                if inv.iter().all(|v| v.is_finite()) {
                    return inv;
                }
            }
            for r in 0..n {
                l[(r, r)] += nudge;
            }
        }
    }

    fn stamp_transient(
        &self,
        mat: &mut CircuitMatrix,
        windings: &[CoupledWinding],
        status: &CircuitStatus,
    ) -> Result<()> {
        let dt = status.time_step;
        if dt <= 0.0 {
            return Ok(());
        }

        if Self::is_magnetic(windings) {
            return self.stamp_magnetic_group(mat, windings, dt);
        }

        for i in 0..windings.len() {
            for j in i + 1..windings.len() {
                let (wi, wj) = (&windings[i], &windings[j]);
                let m = self.mutual_inductance(wi.inductance, wj.inductance);
                if m == 0.0 {
                    continue;
                }
                let (bi, bj) = (wi.branch.unwrap(), wj.branch.unwrap());
                // Branch-row coupling: the off-diagonal companion -M/dt
                // plus the history term of the partner current on each
                // branch equation.
                mat.add_element(bi, bj, -m / dt);
                mat.add_element(bj, bi, -m / dt);
                mat.add_rhs(bi, m * wj.current_prev / dt);
                mat.add_rhs(bj, m * wi.current_prev / dt);
            }
        }
        Ok(())
    }

    /// Full trapezoidal companion for a group of magnetic windings:
    /// `i_n = i_prev + (dt/2) * G * (v_n + v_prev)` with `G` the inverse
    /// inductance matrix. The windings themselves skip their transient
    /// stamp when coupled, so this is the complete contribution.
    fn stamp_magnetic_group(
        &self,
        mat: &mut CircuitMatrix,
        windings: &[CoupledWinding],
        dt: f64,
    ) -> Result<()> {
        let gamma = self.inverse_inductance(windings);
        let n = windings.len();

        for r in 0..n {
            let wr = &windings[r];
            let mut ihist = wr.current_prev;
            for c in 0..n {
                let g = 0.5 * dt * gamma[(r, c)];
                stamp_cross(mat, wr.nodes, windings[c].nodes, g);
                ihist += g * windings[c].voltage_prev;
            }
            stamp_history(mat, wr.nodes, ihist);
        }
        Ok(())
    }

    fn stamp_ac(
        &self,
        mat: &mut CircuitMatrix,
        windings: &[CoupledWinding],
        status: &CircuitStatus,
    ) -> Result<()> {
        let omega = status.omega();

        for i in 0..windings.len() {
            for j in i + 1..windings.len() {
                let (wi, wj) = (&windings[i], &windings[j]);
                let m = self.mutual_inductance(wi.inductance, wj.inductance);
                if m == 0.0 {
                    continue;
                }
                let y_im = omega * m;
                stamp_cross_complex(mat, wi.nodes, wj.nodes, y_im);
                stamp_cross_complex(mat, wj.nodes, wi.nodes, y_im);
            }
        }
        Ok(())
    }
}

/// Current into `rows` driven by the voltage across `cols`; with
/// `rows == cols` this is the standard four-corner pattern.
fn stamp_cross(mat: &mut CircuitMatrix, rows: [usize; 2], cols: [usize; 2], g: f64) {
    let [a, b] = rows;
    let [c, d] = cols;
    if a != 0 {
        if c != 0 {
            mat.add_element(a, c, g);
        }
        if d != 0 {
            mat.add_element(a, d, -g);
        }
    }
    if b != 0 {
        if c != 0 {
            mat.add_element(b, c, -g);
        }
        if d != 0 {
            mat.add_element(b, d, g);
        }
    }
}

fn stamp_cross_complex(mat: &mut CircuitMatrix, rows: [usize; 2], cols: [usize; 2], y_im: f64) {
    let [a, b] = rows;
    let [c, d] = cols;
    if a != 0 {
        if c != 0 {
            mat.add_complex_element(a, c, 0.0, y_im);
        }
        if d != 0 {
            mat.add_complex_element(a, d, 0.0, -y_im);
        }
    }
    if b != 0 {
        if c != 0 {
            mat.add_complex_element(b, c, 0.0, -y_im);
        }
        if d != 0 {
            mat.add_complex_element(b, d, 0.0, y_im);
        }
    }
}

fn stamp_history(mat: &mut CircuitMatrix, nodes: [usize; 2], ihist: f64) {
    let [a, b] = nodes;
    if a != 0 {
        mat.add_rhs(a, -ihist);
    }
    if b != 0 {
        mat.add_rhs(b, ihist);
    }
}
