//! Newton-Raphson iteration and its convergence aids.
//!
//! The Newton primitive runs the strict per-iteration order:
//! clear -> refresh nonlinear voltages -> stamp -> load gmin -> factor ->
//! solve -> convergence check. Gmin stepping and source stepping are
//! separate strategies composed by the operating-point driver, not baked
//! into the primitive.

use nodal_core::CircuitStatus;
use nodal_devices::Circuit;

use crate::error::{Error, Result};

/// Convergence criteria shared by all analyses.
#[derive(Debug, Clone)]
pub struct ConvergenceCriteria {
    /// Relative tolerance on every solution entry.
    pub reltol: f64,
    /// Absolute tolerance on every solution entry.
    pub abstol: f64,
    /// Maximum Newton iterations per solve.
    pub max_iter: usize,
    /// Baseline gmin floor.
    pub gmin: f64,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            reltol: 1e-6,
            abstol: 1e-12,
            max_iter: 100,
            gmin: 1e-12,
        }
    }
}

/// Outcome of one converged Newton solve.
#[derive(Debug, Clone, Copy)]
pub struct NewtonResult {
    pub iterations: usize,
}

/// Per-entry convergence: `|x - x_prev| <= reltol*max(|x|,|x_prev|) + abstol`.
fn converged(old: &[f64], new: &[f64], criteria: &ConvergenceCriteria) -> bool {
    for i in 1..new.len() {
        let diff = (new[i] - old[i]).abs();
        let tol = criteria.reltol * new[i].abs().max(old[i].abs()) + criteria.abstol;
        if diff > tol {
            return false;
        }
    }
    true
}

/// Run Newton-Raphson at a fixed gmin level.
///
/// `status` carries the analysis mode; its gmin field is overridden with
/// `gmin` so device stamps and the diagonal load agree. Linear circuits
/// return after a single solve.
pub fn solve_newton(
    circuit: &mut Circuit,
    status: &CircuitStatus,
    gmin: f64,
    criteria: &ConvergenceCriteria,
) -> Result<NewtonResult> {
    let mut status = status.clone();
    status.gmin = gmin;

    let mut old_solution: Option<Vec<f64>> = None;

    for iter in 0..criteria.max_iter {
        circuit.matrix_mut().clear();

        // First iteration reuses the bias voltages already in the devices.
        if let Some(prev) = &old_solution {
            circuit.update_nonlinear_voltages(prev)?;
        }

        circuit.stamp(&status)?;
        circuit.matrix_mut().load_gmin(gmin);
        circuit.matrix_mut().factor_and_solve()?;

        if !circuit.has_nonlinear_devices() {
            return Ok(NewtonResult { iterations: 1 });
        }

        let solution = circuit.matrix().solution().to_vec();
        if let Some(prev) = &old_solution {
            if converged(prev, &solution, criteria) {
                return Ok(NewtonResult {
                    iterations: iter + 1,
                });
            }
        }
        old_solution = Some(solution);
    }

    Err(Error::ConvergenceFailed {
        iterations: criteria.max_iter,
    })
}

/// Gmin stepping: Newton at a decade ladder of gmin levels, starting at
/// `size * 0.001 * 10^steps` and ending near `size * 0.0001`, each level
/// seeded by the previous solution. Finishes with a `gmin = 0` solve.
pub fn solve_with_gmin_stepping(
    circuit: &mut Circuit,
    status: &CircuitStatus,
    criteria: &ConvergenceCriteria,
) -> Result<NewtonResult> {
    let num_steps = 10;
    let start_gmin = circuit.size() as f64 * 0.001;
    let mut gmin = start_gmin * 10f64.powi(num_steps);

    for _ in 0..=num_steps {
        if let Err(e) = solve_newton(circuit, status, gmin, criteria) {
            log::debug!("gmin step at {gmin:.3e} failed: {e}");
            break;
        }
        gmin /= 10.0;
    }

    solve_newton(circuit, status, 0.0, criteria)
}

/// Source stepping: scale every voltage source through the factor ladder,
/// running Newton at each scale. Sources are restored on exit regardless
/// of the outcome, then a final Newton runs at nominal.
pub fn solve_with_source_stepping(
    circuit: &mut Circuit,
    status: &CircuitStatus,
    criteria: &ConvergenceCriteria,
) -> Result<NewtonResult> {
    const FACTORS: [f64; 10] = [0.05, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.85, 1.0];

    let mut outcome = Ok(());
    for &factor in &FACTORS {
        circuit.scale_voltage_sources(factor);
        if let Err(e) = solve_newton(circuit, status, 0.0, criteria) {
            log::debug!("source stepping failed at {:.0}%: {e}", factor * 100.0);
            outcome = Err(e);
            break;
        }
    }
    circuit.scale_voltage_sources(1.0);
    outcome?;

    solve_newton(circuit, status, 0.0, criteria)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use nodal_core::{Element, ElementKind, ModelCard, ModelKind};

    fn diode_circuit() -> Circuit {
        // V1 -- Rs -- D1 to ground: the classic exponential solve.
        let mut models = IndexMap::new();
        models.insert("DTEST".to_string(), ModelCard::new(ModelKind::Diode, "DTEST"));

        let mut d = Element::new(ElementKind::Diode, "D1", vec!["2".into(), "0".into()], 0.0);
        d.model = Some("DTEST".into());

        let elements = vec![
            Element::new(ElementKind::Vsource, "V1", vec!["1".into(), "0".into()], 5.0),
            Element::new(ElementKind::Resistor, "RS", vec!["1".into(), "2".into()], 1000.0),
            d,
        ];
        Circuit::build("diode", &elements, &models, false).unwrap()
    }

    #[test]
    fn test_linear_single_iteration() {
        let elements = vec![
            Element::new(ElementKind::Vsource, "V1", vec!["1".into(), "0".into()], 10.0),
            Element::new(ElementKind::Resistor, "R1", vec!["1".into(), "2".into()], 1e3),
            Element::new(ElementKind::Resistor, "R2", vec!["2".into(), "0".into()], 1e3),
        ];
        let mut circuit = Circuit::build("div", &elements, &IndexMap::new(), false).unwrap();
        let result = solve_newton(
            &mut circuit,
            &CircuitStatus::default(),
            0.0,
            &ConvergenceCriteria::default(),
        )
        .unwrap();
        assert_eq!(result.iterations, 1);
        let sol = circuit.get_solution();
        assert!((sol["V(2)"] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_diode_converges() {
        let mut circuit = diode_circuit();
        let result = solve_newton(
            &mut circuit,
            &CircuitStatus::default(),
            0.0,
            &ConvergenceCriteria::default(),
        )
        .unwrap();
        assert!(result.iterations < 100);

        let sol = circuit.get_solution();
        let vd = sol["V(2)"];
        assert!(vd > 0.4 && vd < 0.8, "V(diode) = {vd}");
        // KCL: resistor current equals diode current.
        let i_r = (sol["V(1)"] - vd) / 1000.0;
        assert!((sol["I(RS)"] - i_r).abs() < 1e-9);
    }

    #[test]
    fn test_newton_repeatable() {
        // Running the solve twice gives the same answer.
        let mut circuit = diode_circuit();
        let criteria = ConvergenceCriteria::default();
        solve_newton(&mut circuit, &CircuitStatus::default(), 0.0, &criteria).unwrap();
        let first = circuit.get_solution();
        solve_newton(&mut circuit, &CircuitStatus::default(), 0.0, &criteria).unwrap();
        let second = circuit.get_solution();
        for (name, v) in &first {
            assert!((v - second[name]).abs() <= f64::EPSILON * v.abs().max(1.0));
        }
    }

    #[test]
    fn test_gmin_stepping_solves_diode() {
        let mut circuit = diode_circuit();
        let result = solve_with_gmin_stepping(
            &mut circuit,
            &CircuitStatus::default(),
            &ConvergenceCriteria::default(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_source_stepping_restores_scale() {
        let mut circuit = diode_circuit();
        solve_with_source_stepping(
            &mut circuit,
            &CircuitStatus::default(),
            &ConvergenceCriteria::default(),
        )
        .unwrap();
        // Nominal source value still reads back after stepping.
        assert_eq!(circuit.source_value("V1"), Some(5.0));
        let sol = circuit.get_solution();
        assert!((sol["V(1)"] - 5.0).abs() < 1e-6);
    }
}
