//! Junction diode model.
//!
//! Shockley current with temperature-adjusted saturation current,
//! transit-time diffusion charge in transient, and junction capacitance
//! in AC.

use nodal_core::{thermal_voltage, AnalysisMode, CircuitMatrix, CircuitStatus, ModelCard};

use crate::device::{node_voltage, NonLinear, TimeDependent};
use crate::error::Result;

/// Diode model parameters, pulled from a `.model D(...)` card.
#[derive(Debug, Clone)]
pub struct DiodeParams {
    /// Saturation current (A).
    pub is: f64,
    /// Emission coefficient.
    pub n: f64,
    /// Series resistance (ohms).
    pub rs: f64,
    /// Zero-bias junction capacitance (F).
    pub cj0: f64,
    /// Grading coefficient.
    pub m: f64,
    /// Built-in junction potential (V).
    pub vj: f64,
    /// Breakdown voltage (V).
    pub bv: f64,
    /// Transit time (s).
    pub tt: f64,
    /// Saturation current temperature exponent.
    pub xti: f64,
    /// Energy gap (eV).
    pub eg: f64,
    /// Parameter measurement temperature (K).
    pub tnom: f64,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self {
            is: 1e-14,
            n: 1.0,
            rs: 0.0,
            cj0: 0.0,
            m: 0.5,
            vj: 1.0,
            bv: 100.0,
            tt: 0.0,
            xti: 3.0,
            eg: 1.11,
            tnom: 300.15,
        }
    }
}

impl DiodeParams {
    pub fn from_model(card: &ModelCard) -> Self {
        let d = Self::default();
        Self {
            is: card.param("is", d.is),
            n: card.param("n", d.n),
            rs: card.param("rs", d.rs),
            cj0: card.param("cj0", d.cj0),
            m: card.param("m", d.m),
            vj: card.param("vj", d.vj),
            bv: card.param("bv", d.bv),
            tt: card.param("tt", d.tt),
            xti: card.param("xti", d.xti),
            eg: card.param("eg", d.eg),
            tnom: card.param("tnom", d.tnom),
        }
    }
}

/// A junction diode between anode (`nodes[0]`) and cathode (`nodes[1]`).
#[derive(Debug, Clone)]
pub struct Diode {
    pub name: String,
    pub nodes: [usize; 2],
    pub params: DiodeParams,

    /// Junction voltage from the last Newton update.
    pub vd: f64,
    /// Current at the linearization point.
    pub id: f64,
    /// Conductance at the linearization point.
    pub gd: f64,

    vd_prev: f64,
    id_prev: f64,
    /// Diffusion charge from the last accepted step.
    charge_prev: f64,
    /// Diffusion charge at the latest solve.
    charge: f64,
}

impl Diode {
    pub fn new(name: impl Into<String>, nodes: [usize; 2], params: DiodeParams) -> Self {
        Self {
            name: name.into(),
            nodes,
            params,
            vd: 0.0,
            id: 0.0,
            gd: 0.0,
            vd_prev: 0.0,
            id_prev: 0.0,
            charge_prev: 0.0,
            charge: 0.0,
        }
    }

    /// Temperature-adjusted saturation current:
    /// `Is(T) = Is * (T/Tnom)^(Xti/N) * exp(-Eg/(2*vt) * (T/Tnom - 1))`.
    fn saturation_current(&self, temp: f64) -> f64 {
        let ratio = temp / self.params.tnom;
        let vt = thermal_voltage(temp);
        self.params.is
            * ratio.powf(self.params.xti / self.params.n)
            * (-self.params.eg / (2.0 * vt) * (ratio - 1.0)).exp()
    }

    /// Evaluate `(id, gd)` at junction voltage `vd`.
    ///
    /// Forward and weak reverse (`vd > -3*n*vt`) use the Shockley branch
    /// with the exponent clamped at 40; strong reverse saturates at `-Is`.
    pub fn evaluate(&self, vd: f64, temp: f64, gmin: f64) -> (f64, f64) {
        let vt = thermal_voltage(temp);
        let nvt = self.params.n * vt;
        let is_t = self.saturation_current(temp);

        if vd > -3.0 * nvt {
            let exp_arg = (vd / nvt).min(40.0);
            let id = is_t * (exp_arg.exp() - 1.0);
            let gd = (id.abs() + is_t) / nvt + gmin;
            (id, gd)
        } else {
            (-is_t, gmin)
        }
    }

    /// Junction capacitance at `vd`: depletion formula in reverse bias
    /// (argument clamped at 0.1), linearized in forward bias.
    pub fn junction_capacitance(&self, vd: f64) -> f64 {
        if self.params.cj0 == 0.0 {
            return 0.0;
        }
        if vd < 0.0 {
            let arg = (1.0 - vd / self.params.vj).max(0.1);
            self.params.cj0 * arg.powf(-self.params.m)
        } else {
            self.params.cj0 * (1.0 + self.params.m * vd / self.params.vj)
        }
    }

    pub fn stamp(&mut self, mat: &mut CircuitMatrix, status: &CircuitStatus) -> Result<()> {
        if status.mode == AnalysisMode::Ac {
            return self.stamp_ac(mat, status);
        }

        let (mut id, mut gd) = self.evaluate(self.vd, status.temp, status.gmin.max(1e-12));

        // Transit-time diffusion charge companion.
        if status.mode == AnalysisMode::Transient && self.params.tt > 0.0 && status.time_step > 0.0
        {
            let dt = status.time_step;
            self.charge = self.params.tt * id;
            let i_cap = (self.charge - self.charge_prev) / dt;
            gd += self.params.tt * gd / dt;
            id += i_cap;
        }

        self.id = id;
        self.gd = gd;

        let [n1, n2] = self.nodes;
        let ieq = id - gd * self.vd;

        if n1 != 0 {
            mat.add_element(n1, n1, gd);
            if n2 != 0 {
                mat.add_element(n1, n2, -gd);
            }
            mat.add_rhs(n1, -ieq);
        }
        if n2 != 0 {
            if n1 != 0 {
                mat.add_element(n2, n1, -gd);
            }
            mat.add_element(n2, n2, gd);
            mat.add_rhs(n2, ieq);
        }
        Ok(())
    }

    fn stamp_ac(&mut self, mat: &mut CircuitMatrix, status: &CircuitStatus) -> Result<()> {
        // Linearization frozen at the bias point established by OP.
        let (_, gd) = self.evaluate(self.vd, status.temp, status.gmin.max(1e-12));
        let cj = self.junction_capacitance(self.vd);
        let y_im = status.omega() * cj;

        let [n1, n2] = self.nodes;
        if n1 != 0 {
            mat.add_complex_element(n1, n1, gd, y_im);
            if n2 != 0 {
                mat.add_complex_element(n1, n2, -gd, -y_im);
            }
        }
        if n2 != 0 {
            if n1 != 0 {
                mat.add_complex_element(n2, n1, -gd, -y_im);
            }
            mat.add_complex_element(n2, n2, gd, y_im);
        }
        Ok(())
    }
}

impl Diode {
    /// Log-compress junction voltages above the critical voltage so a
    /// cold Newton start does not crawl down the exponential one thermal
    /// voltage per iteration.
    fn limit_voltage(&self, vd: f64, nvt: f64) -> f64 {
        let vcrit = nvt * (nvt / (std::f64::consts::SQRT_2 * self.params.is)).ln();
        if vd > vcrit {
            vcrit + nvt * (1.0 + ((vd - vcrit) / nvt).ln_1p())
        } else {
            vd
        }
    }
}

impl NonLinear for Diode {
    fn update_voltages(&mut self, solution: &[f64]) -> Result<()> {
        let v1 = node_voltage(solution, self.nodes[0]);
        let v2 = node_voltage(solution, self.nodes[1]);
        let nvt = self.params.n * thermal_voltage(300.15);
        self.vd = self.limit_voltage(v1 - v2, nvt);
        Ok(())
    }
}

impl TimeDependent for Diode {
    fn load_state(&mut self, _solution: &[f64], _status: &CircuitStatus) {}

    fn update_state(&mut self, _solution: &[f64], _status: &CircuitStatus) {
        self.vd_prev = self.vd;
        self.id_prev = self.id;
        self.charge_prev = self.charge;
    }

    fn calculate_lte(&self, _status: &CircuitStatus) -> f64 {
        (self.vd - self.vd_prev).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diode() -> Diode {
        Diode::new("D1", [1, 2], DiodeParams::default())
    }

    #[test]
    fn test_forward_bias() {
        let d = diode();
        let (id, gd) = d.evaluate(0.7, 300.15, 1e-12);
        assert!(id > 1e-4, "forward current should be significant: {id}");
        assert!(gd > 0.0);
    }

    #[test]
    fn test_strong_reverse() {
        let d = diode();
        let (id, gd) = d.evaluate(-1.0, 300.15, 1e-12);
        assert!((id + d.saturation_current(300.15)).abs() < 1e-20);
        assert!((gd - 1e-12).abs() < 1e-24);
    }

    #[test]
    fn test_branch_point_continuity() {
        // At vd = -3*n*vt the two branches agree to within Is.
        let d = diode();
        let nvt = d.params.n * thermal_voltage(300.15);
        let v = -3.0 * nvt;
        let shockley = d.saturation_current(300.15) * ((v / nvt).exp() - 1.0);
        let saturated = -d.saturation_current(300.15);
        assert!((shockley - saturated).abs() <= d.params.is);
    }

    #[test]
    fn test_exp_clamp() {
        let d = diode();
        let (id, _) = d.evaluate(100.0, 300.15, 1e-12);
        assert!(id.is_finite());
    }

    #[test]
    fn test_junction_capacitance() {
        let mut params = DiodeParams::default();
        params.cj0 = 4e-12;
        let d = Diode::new("D1", [1, 0], params);

        // Reverse bias shrinks the capacitance.
        let c_rev = d.junction_capacitance(-5.0);
        assert!(c_rev < 4e-12);

        // Forward bias grows it linearly.
        let c_fwd = d.junction_capacitance(0.5);
        assert!((c_fwd - 4e-12 * 1.25).abs() < 1e-24);

        // Deep reverse bias hits the 0.1 clamp.
        let c_deep = d.junction_capacitance(-1e6);
        assert!((c_deep - 4e-12 * 0.1_f64.powf(-0.5)).abs() < 1e-22);
    }

    #[test]
    fn test_linearized_stamp() {
        let mut d = diode();
        d.vd = 0.6;
        let mut mat = CircuitMatrix::new(2, false);
        d.stamp(&mut mat, &CircuitStatus::op(1e-12)).unwrap();

        let (id, gd) = d.evaluate(0.6, 300.15, 1e-12);
        let ieq = id - gd * 0.6;
        assert!((mat.element(1, 1).0 - gd).abs() < 1e-9 * gd);
        assert!((mat.rhs()[1] + ieq).abs() < 1e-9 * ieq.abs() + 1e-15);
        assert!((mat.rhs()[2] - ieq).abs() < 1e-9 * ieq.abs() + 1e-15);
    }

    #[test]
    fn test_update_voltages() {
        let mut d = diode();
        let solution = [0.0, 0.65, 0.05];
        d.update_voltages(&solution).unwrap();
        assert!((d.vd - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_temperature_adjusted_is() {
        let d = diode();
        // Is grows steeply with temperature.
        let is_hot = d.saturation_current(350.0);
        let is_nom = d.saturation_current(300.15);
        assert!(is_hot > 10.0 * is_nom);
    }
}
