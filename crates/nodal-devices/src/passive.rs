//! Passive device models: resistor, capacitor, linear inductor.

use nodal_core::integrator::bdf_coeffs;
use nodal_core::{AnalysisMode, CircuitMatrix, CircuitStatus};

use crate::device::{node_voltage, TimeDependent};
use crate::error::{Error, Result};

/// Diagonal regularization for inductor branch rows in OP mode.
/// Guards inductor loops against a structurally singular branch equation.
const SMALL_L: f64 = 1e-3;

/// A linear resistor with optional temperature coefficients.
#[derive(Debug, Clone)]
pub struct Resistor {
    pub name: String,
    /// Terminal node indices (0 = ground).
    pub nodes: [usize; 2],
    /// Resistance at the nominal temperature (ohms).
    pub resistance: f64,
    /// Linear temperature coefficient (1/K).
    pub tc1: f64,
    /// Quadratic temperature coefficient (1/K^2).
    pub tc2: f64,
    /// Nominal temperature (K).
    pub tnom: f64,
}

impl Resistor {
    pub fn new(name: impl Into<String>, nodes: [usize; 2], resistance: f64) -> Self {
        Self {
            name: name.into(),
            nodes,
            resistance,
            tc1: 0.0,
            tc2: 0.0,
            tnom: 300.15,
        }
    }

    /// Conductance at the given temperature:
    /// `G = 1 / (R * (1 + Tc1*dT + Tc2*dT^2))`.
    pub fn conductance(&self, temp: f64) -> f64 {
        let dt = temp - self.tnom;
        1.0 / (self.resistance * (1.0 + self.tc1 * dt + self.tc2 * dt * dt))
    }

    pub fn stamp(&mut self, mat: &mut CircuitMatrix, status: &CircuitStatus) -> Result<()> {
        let g = self.conductance(status.temp);
        let [n1, n2] = self.nodes;

        if status.mode == AnalysisMode::Ac {
            if n1 != 0 {
                mat.add_complex_element(n1, n1, g, 0.0);
                if n2 != 0 {
                    mat.add_complex_element(n1, n2, -g, 0.0);
                }
            }
            if n2 != 0 {
                if n1 != 0 {
                    mat.add_complex_element(n2, n1, -g, 0.0);
                }
                mat.add_complex_element(n2, n2, g, 0.0);
            }
        } else {
            if n1 != 0 {
                mat.add_element(n1, n1, g);
                if n2 != 0 {
                    mat.add_element(n1, n2, -g);
                }
            }
            if n2 != 0 {
                if n1 != 0 {
                    mat.add_element(n2, n1, -g);
                }
                mat.add_element(n2, n2, g);
            }
        }
        Ok(())
    }
}

/// A linear capacitor.
///
/// Open in DC (a gmin shunt keeps floating nodes solvable), a BDF-1
/// companion `Geq = C/dt`, `Ieq = q_prev/dt` in transient, and `jwC` in AC.
#[derive(Debug, Clone)]
pub struct Capacitor {
    pub name: String,
    pub nodes: [usize; 2],
    /// Capacitance (F).
    pub capacitance: f64,
    /// Voltage across the device from the latest solve.
    pub voltage: f64,
    /// Voltage at the last accepted step.
    pub voltage_prev: f64,
    /// Charge at the last accepted step (`C * voltage_prev`).
    pub charge_prev: f64,
    /// Current through the device from the latest solve.
    pub current: f64,
}

impl Capacitor {
    pub fn new(name: impl Into<String>, nodes: [usize; 2], capacitance: f64) -> Self {
        Self {
            name: name.into(),
            nodes,
            capacitance,
            voltage: 0.0,
            voltage_prev: 0.0,
            charge_prev: 0.0,
            current: 0.0,
        }
    }

    pub fn stamp(&mut self, mat: &mut CircuitMatrix, status: &CircuitStatus) -> Result<()> {
        let [n1, n2] = self.nodes;

        match status.mode {
            AnalysisMode::Ac => {
                let yc = status.omega() * self.capacitance;
                if n1 != 0 {
                    mat.add_complex_element(n1, n1, 0.0, yc);
                    if n2 != 0 {
                        mat.add_complex_element(n1, n2, 0.0, -yc);
                    }
                }
                if n2 != 0 {
                    if n1 != 0 {
                        mat.add_complex_element(n2, n1, 0.0, -yc);
                    }
                    mat.add_complex_element(n2, n2, 0.0, yc);
                }
            }
            AnalysisMode::OperatingPoint => {
                // Open circuit at DC; a small shunt avoids floating nodes.
                let gmin = status.gmin.max(1e-12);
                if n1 != 0 {
                    mat.add_element(n1, n1, gmin);
                    if n2 != 0 {
                        mat.add_element(n1, n2, -gmin);
                    }
                }
                if n2 != 0 {
                    if n1 != 0 {
                        mat.add_element(n2, n1, -gmin);
                    }
                    mat.add_element(n2, n2, gmin);
                }
            }
            AnalysisMode::Transient => {
                let dt = status.time_step;
                if dt <= 0.0 {
                    return Err(Error::stamp(&self.name, "transient stamp with dt <= 0"));
                }
                let geq = self.capacitance / dt;
                let ieq = self.charge_prev / dt;

                if n1 != 0 {
                    mat.add_element(n1, n1, geq);
                    if n2 != 0 {
                        mat.add_element(n1, n2, -geq);
                    }
                    mat.add_rhs(n1, ieq);
                }
                if n2 != 0 {
                    if n1 != 0 {
                        mat.add_element(n2, n1, -geq);
                    }
                    mat.add_element(n2, n2, geq);
                    mat.add_rhs(n2, -ieq);
                }
            }
        }
        Ok(())
    }
}

impl TimeDependent for Capacitor {
    fn load_state(&mut self, solution: &[f64], status: &CircuitStatus) {
        // Deferred until a real step exists; dt = 0 would divide below.
        let dt = status.time_step;
        if dt <= 0.0 {
            return;
        }
        let vd = node_voltage(solution, self.nodes[0]) - node_voltage(solution, self.nodes[1]);
        self.voltage = vd;
        self.current = self.capacitance * (vd - self.voltage_prev) / dt;
    }

    fn update_state(&mut self, solution: &[f64], _status: &CircuitStatus) {
        let vd = node_voltage(solution, self.nodes[0]) - node_voltage(solution, self.nodes[1]);
        self.voltage = vd;
        self.voltage_prev = vd;
        self.charge_prev = self.capacitance * vd;
    }

    fn calculate_lte(&self, status: &CircuitStatus) -> f64 {
        (self.capacitance * (self.voltage - self.voltage_prev)).abs() / (2.0 * status.time_step)
    }
}

/// A linear inductor, augmented with a branch current row.
///
/// The incidence convention puts `-1` on the `n1` side, so the physical
/// current flowing n1 -> n2 is `-solution[branch]`.
#[derive(Debug, Clone)]
pub struct Inductor {
    pub name: String,
    pub nodes: [usize; 2],
    /// Inductance (H).
    pub inductance: f64,
    /// Branch row index in the MNA system.
    pub branch: usize,
    /// Current from the latest solve (n1 -> n2 positive).
    pub current: f64,
    /// Current at the last accepted step.
    pub current_prev: f64,
    /// Voltage across the device from the latest solve.
    pub voltage: f64,
    /// Voltage at the last accepted step.
    pub voltage_prev: f64,
}

impl Inductor {
    pub fn new(name: impl Into<String>, nodes: [usize; 2], inductance: f64, branch: usize) -> Self {
        Self {
            name: name.into(),
            nodes,
            inductance,
            branch,
            current: 0.0,
            current_prev: 0.0,
            voltage: 0.0,
            voltage_prev: 0.0,
        }
    }

    fn stamp_incidence(&self, mat: &mut CircuitMatrix) {
        let [n1, n2] = self.nodes;
        let b = self.branch;
        if n1 != 0 {
            mat.add_element(n1, b, -1.0);
            mat.add_element(b, n1, -1.0);
        }
        if n2 != 0 {
            mat.add_element(n2, b, 1.0);
            mat.add_element(b, n2, 1.0);
        }
    }

    pub fn stamp(&mut self, mat: &mut CircuitMatrix, status: &CircuitStatus) -> Result<()> {
        if self.inductance == 0.0 {
            return Err(Error::ZeroInductance {
                name: self.name.clone(),
            });
        }
        let [n1, n2] = self.nodes;

        match status.mode {
            AnalysisMode::Ac => {
                // Admittance 1/(jwL) between the node rows.
                let y_im = -1.0 / (status.omega() * self.inductance);
                if n1 != 0 {
                    mat.add_complex_element(n1, n1, 0.0, y_im);
                    if n2 != 0 {
                        mat.add_complex_element(n1, n2, 0.0, -y_im);
                    }
                }
                if n2 != 0 {
                    if n1 != 0 {
                        mat.add_complex_element(n2, n1, 0.0, -y_im);
                    }
                    mat.add_complex_element(n2, n2, 0.0, y_im);
                }
                // The branch row carries no KCL coupling in AC; define the
                // branch unknown as the admittance current so the
                // augmented row stays nonsingular and I(L) is published.
                let b = self.branch;
                mat.add_complex_element(b, b, 1.0, 0.0);
                if n1 != 0 {
                    mat.add_complex_element(b, n1, 0.0, y_im);
                }
                if n2 != 0 {
                    mat.add_complex_element(b, n2, 0.0, -y_im);
                }
            }
            AnalysisMode::OperatingPoint => {
                // Near-short with a regularized branch equation.
                self.stamp_incidence(mat);
                mat.add_element(self.branch, self.branch, -SMALL_L);
            }
            AnalysisMode::Transient => {
                let dt = status.time_step;
                if dt <= 0.0 {
                    return Err(Error::stamp(&self.name, "transient stamp with dt <= 0"));
                }
                // Leading BDF-1 coefficient alpha = 1/dt.
                let alpha = bdf_coeffs(1, dt)[0];
                self.stamp_incidence(mat);
                mat.add_element(self.branch, self.branch, -alpha * self.inductance);
                mat.add_rhs(self.branch, alpha * self.inductance * self.current_prev);
            }
        }
        Ok(())
    }
}

impl TimeDependent for Inductor {
    fn load_state(&mut self, solution: &[f64], _status: &CircuitStatus) {
        self.current = -solution[self.branch];
        self.voltage =
            node_voltage(solution, self.nodes[0]) - node_voltage(solution, self.nodes[1]);
    }

    fn update_state(&mut self, solution: &[f64], _status: &CircuitStatus) {
        self.current = -solution[self.branch];
        self.voltage =
            node_voltage(solution, self.nodes[0]) - node_voltage(solution, self.nodes[1]);
        self.current_prev = self.current;
        self.voltage_prev = self.voltage;
    }

    fn calculate_lte(&self, status: &CircuitStatus) -> f64 {
        let di = (self.current - self.current_prev).abs();
        let dv = (self.voltage - self.voltage_prev).abs();
        di.max(dv) / (2.0 * status.time_step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodal_core::IntegrationMethod;

    #[test]
    fn test_resistor_stamp() {
        let mut mat = CircuitMatrix::new(2, false);
        let mut r = Resistor::new("R1", [1, 2], 1000.0);
        r.stamp(&mut mat, &CircuitStatus::default()).unwrap();

        let g = 1e-3;
        assert!((mat.element(1, 1).0 - g).abs() < 1e-12);
        assert!((mat.element(2, 2).0 - g).abs() < 1e-12);
        assert!((mat.element(1, 2).0 + g).abs() < 1e-12);
        assert!((mat.element(2, 1).0 + g).abs() < 1e-12);
    }

    #[test]
    fn test_resistor_to_ground() {
        let mut mat = CircuitMatrix::new(1, false);
        let mut r = Resistor::new("R1", [1, 0], 100.0);
        r.stamp(&mut mat, &CircuitStatus::default()).unwrap();
        assert!((mat.element(1, 1).0 - 0.01).abs() < 1e-12);
        assert_eq!(mat.num_entries(), 1);
    }

    #[test]
    fn test_resistor_temperature() {
        let r = Resistor {
            tc1: 1e-3,
            ..Resistor::new("R1", [1, 0], 1000.0)
        };
        // At tnom + 100K: R_eff = 1000 * 1.1
        let g = r.conductance(400.15);
        assert!((g - 1.0 / 1100.0).abs() < 1e-12);
    }

    #[test]
    fn test_capacitor_op_shunt() {
        let mut mat = CircuitMatrix::new(2, false);
        let mut c = Capacitor::new("C1", [1, 2], 1e-6);
        c.stamp(&mut mat, &CircuitStatus::op(0.0)).unwrap();
        // gmin floor 1e-12 even when status gmin is 0
        assert!((mat.element(1, 1).0 - 1e-12).abs() < 1e-24);
    }

    #[test]
    fn test_capacitor_companion() {
        let mut mat = CircuitMatrix::new(1, false);
        let mut c = Capacitor::new("C1", [1, 0], 1e-6);
        c.voltage_prev = 2.5;
        c.charge_prev = 1e-6 * 2.5;

        let status = CircuitStatus::transient(0.0, 1e-6, IntegrationMethod::BackwardEuler, 1e-12);
        c.stamp(&mut mat, &status).unwrap();

        // Geq = C/dt = 1.0, Ieq = q_prev/dt = 2.5
        assert!((mat.element(1, 1).0 - 1.0).abs() < 1e-12);
        assert!((mat.rhs()[1] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_capacitor_lte_constant_ramp() {
        let mut c = Capacitor::new("C1", [1, 0], 1e-6);
        c.voltage_prev = 1.0;
        let status = CircuitStatus::transient(0.0, 1e-6, IntegrationMethod::BackwardEuler, 1e-12);
        let solution = [0.0, 1.1];
        c.load_state(&solution, &status);
        // LTE = |C * dv| / (2 dt) = 1e-6 * 0.1 / 2e-6 = 0.05
        assert!((c.calculate_lte(&status) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_capacitor_charge_residual() {
        // After an accepted step: |C*(v - v_prev)/dt - i| within tolerance.
        let mut c = Capacitor::new("C1", [1, 0], 1e-6);
        c.voltage_prev = 1.0;
        let status = CircuitStatus::transient(0.0, 1e-5, IntegrationMethod::BackwardEuler, 1e-12);
        let solution = [0.0, 3.0];
        c.load_state(&solution, &status);
        let expected = 1e-6 * (3.0 - 1.0) / 1e-5;
        assert!((c.current - expected).abs() < 1e-12 * expected.abs() + 1e-12);
    }

    #[test]
    fn test_inductor_op_stamp() {
        let mut mat = CircuitMatrix::new(3, false);
        let mut l = Inductor::new("L1", [1, 2], 1e-3, 3);
        l.stamp(&mut mat, &CircuitStatus::default()).unwrap();

        assert_eq!(mat.element(1, 3).0, -1.0);
        assert_eq!(mat.element(3, 1).0, -1.0);
        assert_eq!(mat.element(2, 3).0, 1.0);
        assert_eq!(mat.element(3, 2).0, 1.0);
        assert!((mat.element(3, 3).0 + SMALL_L).abs() < 1e-12);
    }

    #[test]
    fn test_inductor_transient_companion() {
        let mut mat = CircuitMatrix::new(2, false);
        let mut l = Inductor::new("L1", [1, 0], 2e-3, 2);
        l.current_prev = 0.5;

        let dt = 1e-3;
        let status = CircuitStatus::transient(0.0, dt, IntegrationMethod::BackwardEuler, 1e-12);
        l.stamp(&mut mat, &status).unwrap();

        // diag = -L/dt = -2, rhs = (L/dt) * i_prev = 1.0
        assert!((mat.element(2, 2).0 + 2.0).abs() < 1e-12);
        assert!((mat.rhs()[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_inductor_zero_inductance() {
        let mut mat = CircuitMatrix::new(2, false);
        let mut l = Inductor::new("L1", [1, 0], 0.0, 2);
        assert!(matches!(
            l.stamp(&mut mat, &CircuitStatus::default()),
            Err(Error::ZeroInductance { .. })
        ));
    }

    #[test]
    fn test_inductor_ac_admittance() {
        let mut mat = CircuitMatrix::new(2, true);
        let mut l = Inductor::new("L1", [1, 0], 1e-3, 2);
        let status = CircuitStatus::ac(1000.0);
        l.stamp(&mut mat, &status).unwrap();

        let expected = -1.0 / (status.omega() * 1e-3);
        assert!((mat.element(1, 1).1 - expected).abs() < 1e-9);
    }

    #[test]
    fn test_inductor_current_sign() {
        // x[branch] = -i: a positive n1->n2 current reads back negated.
        let mut l = Inductor::new("L1", [1, 0], 1e-3, 2);
        let solution = [0.0, 1.0, -0.25];
        l.load_state(&solution, &CircuitStatus::default());
        assert!((l.current - 0.25).abs() < 1e-12);
    }
}
