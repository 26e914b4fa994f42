//! Bipolar junction transistor: Ebers-Moll with simplified Gummel-Poon
//! extensions (Early voltage, high-level-injection roll-off, charge
//! factor, temperature-adjusted saturation current).

use nodal_core::{thermal_voltage, AnalysisMode, CircuitMatrix, CircuitStatus, ModelCard, ModelKind};

use crate::device::{node_voltage, NonLinear, TimeDependent};
use crate::error::Result;

const GMIN_FLOOR: f64 = 1e-12;

/// BJT model parameters from a `.model NPN/PNP(...)` card.
#[derive(Debug, Clone)]
pub struct BjtParams {
    /// Transport saturation current (A).
    pub is: f64,
    /// Ideal maximum forward beta.
    pub bf: f64,
    /// Ideal maximum reverse beta.
    pub br: f64,
    /// Forward emission coefficient.
    pub nf: f64,
    /// Reverse emission coefficient.
    pub nr: f64,
    /// Forward Early voltage (V).
    pub vaf: f64,
    /// Reverse Early voltage (V).
    pub var: f64,
    /// Forward beta roll-off corner current (A).
    pub ikf: f64,
    /// Reverse beta roll-off corner current (A).
    pub ikr: f64,
    /// B-E zero-bias depletion capacitance (F).
    pub cje: f64,
    /// B-C zero-bias depletion capacitance (F).
    pub cjc: f64,
    /// Ideal forward transit time (s).
    pub tf: f64,
    /// Ideal reverse transit time (s).
    pub tr: f64,
    /// Beta temperature exponent.
    pub xtb: f64,
    /// Saturation current temperature exponent.
    pub xti: f64,
    /// Energy gap (eV).
    pub eg: f64,
    /// Parameter measurement temperature (K).
    pub tnom: f64,
}

impl Default for BjtParams {
    fn default() -> Self {
        Self {
            is: 1e-16,
            bf: 100.0,
            br: 1.0,
            nf: 1.0,
            nr: 1.0,
            vaf: 100.0,
            var: 100.0,
            ikf: 0.01,
            ikr: 0.01,
            cje: 0.0,
            cjc: 0.0,
            tf: 0.0,
            tr: 0.0,
            xtb: 0.0,
            xti: 3.0,
            eg: 1.11,
            tnom: 300.15,
        }
    }
}

impl BjtParams {
    pub fn from_model(card: &ModelCard) -> Self {
        let d = Self::default();
        Self {
            is: card.param("is", d.is),
            bf: card.param("bf", d.bf),
            br: card.param("br", d.br),
            nf: card.param("nf", d.nf),
            nr: card.param("nr", d.nr),
            vaf: card.param("vaf", d.vaf),
            var: card.param("var", d.var),
            ikf: card.param("ikf", d.ikf),
            ikr: card.param("ikr", d.ikr),
            cje: card.param("cje", d.cje),
            cjc: card.param("cjc", d.cjc),
            tf: card.param("tf", d.tf),
            tr: card.param("tr", d.tr),
            xtb: card.param("xtb", d.xtb),
            xti: card.param("xti", d.xti),
            eg: card.param("eg", d.eg),
            tnom: card.param("tnom", d.tnom),
        }
    }
}

/// Evaluated small-signal operating point, in internal (NPN) polarity.
#[derive(Debug, Clone, Copy, Default)]
struct BjtOp {
    ic: f64,
    ib: f64,
    ie: f64,
    gm: f64,
    gpi: f64,
    gmu: f64,
    gout: f64,
}

/// A BJT with terminals (collector, base, emitter).
///
/// PNP devices evaluate in flipped polarity: junction voltages and
/// terminal currents are negated at the device boundary, conductances
/// stay positive.
#[derive(Debug, Clone)]
pub struct Bjt {
    pub name: String,
    /// Terminal node indices: [collector, base, emitter].
    pub nodes: [usize; 3],
    /// +1 for NPN, -1 for PNP.
    pub polarity: f64,
    pub params: BjtParams,

    /// External junction voltages from the last Newton update.
    pub vbe: f64,
    pub vbc: f64,
    pub vce: f64,
    /// External terminal currents at the linearization point.
    pub ic: f64,
    pub ib: f64,
    pub ie: f64,
    /// Small-signal conductances (polarity-independent).
    pub gm: f64,
    pub gpi: f64,
    pub gmu: f64,
    pub gout: f64,

    prev_vbe: f64,
    prev_vbc: f64,
    prev_ic: f64,
    prev_ib: f64,
}

impl Bjt {
    pub fn new(name: impl Into<String>, nodes: [usize; 3], kind: ModelKind, params: BjtParams) -> Self {
        let polarity = if kind == ModelKind::Pnp { -1.0 } else { 1.0 };
        // Typical silicon starting bias: forward active, out of saturation.
        let vbe = 0.7 * polarity;
        let vce = 1.0 * polarity;
        Self {
            name: name.into(),
            nodes,
            polarity,
            params,
            vbe,
            vbc: vbe - vce,
            vce,
            ic: 0.0,
            ib: 0.0,
            ie: 0.0,
            gm: GMIN_FLOOR,
            gpi: GMIN_FLOOR,
            gmu: GMIN_FLOOR,
            gout: GMIN_FLOOR,
            prev_vbe: 0.0,
            prev_vbc: 0.0,
            prev_ic: 0.0,
            prev_ib: 0.0,
        }
    }

    fn saturation_current(&self, temp: f64) -> f64 {
        let ratio = temp / self.params.tnom;
        let vt = thermal_voltage(temp);
        self.params.is
            * ratio.powf(self.params.xti / self.params.nf)
            * (-self.params.eg / vt * (ratio - 1.0)).exp()
    }

    fn adjusted_betas(&self, temp: f64) -> (f64, f64) {
        let ratio = temp / self.params.tnom;
        (
            self.params.bf * ratio.powf(self.params.xtb),
            self.params.br * ratio.powf(self.params.xtb),
        )
    }

    /// Junction current and slope with the strong-reverse cut at -3*vt_n
    /// and the exponent clamped at 40.
    fn junction(&self, v: f64, is: f64, vt_n: f64) -> (f64, f64) {
        if v < -3.0 * vt_n {
            return (-is, 0.0);
        }
        let arg = (v / vt_n).min(40.0);
        let ev = arg.exp();
        (is * (ev - 1.0), is * ev / vt_n)
    }

    /// Base charge factor for high-level injection roll-off.
    fn charge_factor(&self, vbe: f64, vbc: f64, i_f: f64, i_r: f64) -> f64 {
        let p = &self.params;
        let mut q1 = 1.0;
        if p.vaf > 0.0 || p.var > 0.0 {
            q1 = 1.0 / (1.0 - vbc / p.vaf.max(1e-10) - vbe / p.var.max(1e-10));
        }
        let mut q2 = 0.0;
        if p.ikf > 0.0 {
            q2 += i_f / p.ikf;
        }
        if p.ikr > 0.0 {
            q2 += i_r / p.ikr;
        }
        q1 * (1.0 + (1.0 + 4.0 * q2) * 0.5)
    }

    /// Evaluate the operating point at internal junction voltages.
    fn evaluate(&self, vbe: f64, vbc: f64, temp: f64) -> BjtOp {
        let p = &self.params;
        let vt = thermal_voltage(temp);
        let is_t = self.saturation_current(temp);
        let (bf_t, br_t) = self.adjusted_betas(temp);

        let (mut i_f, _) = self.junction(vbe, is_t, p.nf * vt);
        let (mut i_r, _) = self.junction(vbc, is_t, p.nr * vt);

        let qb = self.charge_factor(vbe, vbc, i_f, i_r);
        if p.vaf > 0.0 {
            i_f *= 1.0 + vbc / p.vaf.max(1e-10);
        }
        if p.var > 0.0 {
            i_r *= 1.0 + vbe / p.var.max(1e-10);
        }
        if p.ikf > 0.0 {
            i_f /= 1.0 + (i_f / (p.ikf * qb)).abs();
        }
        if p.ikr > 0.0 {
            i_r /= 1.0 + (i_r / (p.ikr * qb)).abs();
        }

        let ib = i_f / bf_t + i_r / br_t;
        let ic = i_f - i_r;
        let ie = -(ic + ib);

        let gm = (ic.abs() / (p.nf * vt)).max(GMIN_FLOOR);
        let gpi = (ib.abs() / (p.nf * vt)).max(GMIN_FLOOR);
        let gmu = if vbc > -3.0 * p.nr * vt {
            (is_t * (vbc / (p.nr * vt)).min(40.0).exp() / (p.nr * vt)).max(GMIN_FLOOR)
        } else {
            GMIN_FLOOR
        };
        let mut gout = GMIN_FLOOR;
        if p.vaf > 0.0 {
            gout += ic.abs() / p.vaf.max(1.0);
        }

        BjtOp {
            ic,
            ib,
            ie,
            gm,
            gpi,
            gmu,
            gout,
        }
    }

    /// Base-emitter and base-collector capacitances at the bias point:
    /// depletion plus transit-time diffusion terms.
    pub fn capacitances(&self) -> (f64, f64) {
        let cbe = self.params.cje + self.params.tf * self.gm;
        let cbc = self.params.cjc + self.params.tr * self.gmu;
        (cbe, cbc)
    }

    fn refresh_operating_point(&mut self, temp: f64, gmin: f64) {
        let pol = self.polarity;
        let op = self.evaluate(pol * self.vbe, pol * self.vbc, temp);
        self.ic = pol * op.ic;
        self.ib = pol * op.ib;
        self.ie = pol * op.ie;
        self.gm = op.gm;
        self.gpi = op.gpi + gmin;
        self.gmu = op.gmu + gmin;
        self.gout = op.gout + gmin;
    }

    pub fn stamp(&mut self, mat: &mut CircuitMatrix, status: &CircuitStatus) -> Result<()> {
        if status.mode == AnalysisMode::Ac {
            return self.stamp_ac(mat, status);
        }

        self.refresh_operating_point(status.temp, status.gmin);

        let [nc, nb, ne] = self.nodes;
        let (gm, gpi, gmu, gout) = (self.gm, self.gpi, self.gmu, self.gout);

        // Linearization: ic = gm*vbe - gmu*vbc + gout*vce,
        //                ib = gpi*vbe + gmu*vbc, ie = -(ic + ib).
        let rc = -self.ic + gm * self.vbe - gmu * self.vbc + gout * self.vce;
        let rb = -self.ib + gpi * self.vbe + gmu * self.vbc;
        let re = -(rc + rb);

        if nc != 0 {
            mat.add_element(nc, nc, gout + gmu);
            if nb != 0 {
                mat.add_element(nc, nb, gm - gmu);
            }
            if ne != 0 {
                mat.add_element(nc, ne, -gout - gm);
            }
            mat.add_rhs(nc, rc);
        }
        if nb != 0 {
            mat.add_element(nb, nb, gpi + gmu);
            if nc != 0 {
                mat.add_element(nb, nc, -gmu);
            }
            if ne != 0 {
                mat.add_element(nb, ne, -gpi);
            }
            mat.add_rhs(nb, rb);
        }
        if ne != 0 {
            mat.add_element(ne, ne, gout + gm + gpi);
            if nc != 0 {
                mat.add_element(ne, nc, -gout);
            }
            if nb != 0 {
                mat.add_element(ne, nb, -gm - gpi);
            }
            mat.add_rhs(ne, re);
        }
        Ok(())
    }

    fn stamp_ac(&mut self, mat: &mut CircuitMatrix, status: &CircuitStatus) -> Result<()> {
        let [nc, nb, ne] = self.nodes;
        let (cbe, cbc) = self.capacitances();
        let omega = status.omega();
        let (gm, gpi, gmu, gout) = (self.gm, self.gpi, self.gmu, self.gout);

        if nc != 0 {
            mat.add_complex_element(nc, nc, gout + gmu, omega * cbc);
            if nb != 0 {
                mat.add_complex_element(nc, nb, gm - gmu, -omega * cbc);
            }
            if ne != 0 {
                mat.add_complex_element(nc, ne, -gout - gm, 0.0);
            }
        }
        if nb != 0 {
            mat.add_complex_element(nb, nb, gpi + gmu, omega * (cbe + cbc));
            if nc != 0 {
                mat.add_complex_element(nb, nc, -gmu, -omega * cbc);
            }
            if ne != 0 {
                mat.add_complex_element(nb, ne, -gpi, -omega * cbe);
            }
        }
        if ne != 0 {
            mat.add_complex_element(ne, ne, gout + gm + gpi, omega * cbe);
            if nc != 0 {
                mat.add_complex_element(ne, nc, -gout, 0.0);
            }
            if nb != 0 {
                mat.add_complex_element(ne, nb, -gm - gpi, -omega * cbe);
            }
        }
        Ok(())
    }

    /// Soft junction-voltage limit in internal polarity: compresses above
    /// 0.8V forward, floors at -5V reverse.
    fn limit_junction(v: f64) -> f64 {
        if v > 0.8 {
            0.8 + (v - 0.8) / 2.0
        } else if v < -5.0 {
            -5.0
        } else {
            v
        }
    }
}

impl NonLinear for Bjt {
    fn update_voltages(&mut self, solution: &[f64]) -> Result<()> {
        let vc = node_voltage(solution, self.nodes[0]);
        let vb = node_voltage(solution, self.nodes[1]);
        let ve = node_voltage(solution, self.nodes[2]);
        let pol = self.polarity;

        let vbe_int = Self::limit_junction(pol * (vb - ve));
        let vbc_int = Self::limit_junction(pol * (vb - vc));

        self.vbe = pol * vbe_int;
        self.vbc = pol * vbc_int;
        self.vce = self.vbe - self.vbc;
        Ok(())
    }
}

impl TimeDependent for Bjt {
    fn load_state(&mut self, _solution: &[f64], _status: &CircuitStatus) {}

    fn update_state(&mut self, _solution: &[f64], _status: &CircuitStatus) {
        self.prev_vbe = self.vbe;
        self.prev_vbc = self.vbc;
        self.prev_ic = self.ic;
        self.prev_ib = self.ib;
    }

    fn calculate_lte(&self, _status: &CircuitStatus) -> f64 {
        let dv = (self.vbe - self.prev_vbe)
            .abs()
            .max((self.vbc - self.prev_vbc).abs());
        let di = (self.ic - self.prev_ic)
            .abs()
            .max((self.ib - self.prev_ib).abs());
        dv.max(di)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn npn() -> Bjt {
        Bjt::new("Q1", [1, 2, 3], ModelKind::Npn, BjtParams::default())
    }

    #[test]
    fn test_forward_active() {
        let q = npn();
        let op = q.evaluate(0.65, 0.65 - 5.0, 300.15);
        assert!(op.ic > 0.0, "ic = {}", op.ic);
        assert!(op.ib > 0.0, "ib = {}", op.ib);
        assert!((op.ie + op.ic + op.ib).abs() < 1e-18);

        // Beta in the vicinity of BF (roll-off pulls it below slightly).
        let beta = op.ic / op.ib;
        assert!(beta > 30.0 && beta < 110.0, "beta = {beta}");
    }

    #[test]
    fn test_cutoff() {
        let q = npn();
        let op = q.evaluate(-0.5, -5.0, 300.15);
        assert!(op.ic.abs() < 1e-12);
        assert!(op.ib.abs() < 1e-12);
    }

    #[test]
    fn test_gm_tracks_ic() {
        let q = npn();
        let op = q.evaluate(0.62, -4.0, 300.15);
        let vt = thermal_voltage(300.15);
        let expected = op.ic / vt;
        assert!((op.gm - expected).abs() / expected < 0.05, "gm = {}", op.gm);
    }

    #[test]
    fn test_early_effect_raises_gout() {
        let q = npn();
        let op = q.evaluate(0.65, 0.65 - 5.0, 300.15);
        let expected = op.ic / 100.0;
        assert!(
            (op.gout - expected).abs() / expected < 0.2,
            "gout = {} expected ~{}",
            op.gout,
            expected
        );
    }

    #[test]
    fn test_pnp_current_directions() {
        let mut q = Bjt::new("Q2", [1, 2, 3], ModelKind::Pnp, BjtParams::default());
        // PNP forward active: Vbe = -0.7, Vce = -5.
        let solution = [0.0, -5.0, -0.7, 0.0];
        q.update_voltages(&solution).unwrap();
        q.refresh_operating_point(300.15, 1e-12);
        assert!(q.ic < 0.0, "PNP ic should be negative: {}", q.ic);
        assert!(q.ib < 0.0, "PNP ib should be negative: {}", q.ib);
        assert!(q.gm > 0.0);
    }

    #[test]
    fn test_voltage_limiting() {
        assert_eq!(Bjt::limit_junction(0.5), 0.5);
        assert!((Bjt::limit_junction(1.2) - 1.0).abs() < 1e-12);
        assert_eq!(Bjt::limit_junction(-9.0), -5.0);
    }

    #[test]
    fn test_stamp_row_consistency() {
        // The three RHS contributions must sum to zero (KCL).
        let mut q = npn();
        let solution = [0.0, 5.0, 0.65, 0.0];
        q.update_voltages(&solution).unwrap();

        let mut mat = CircuitMatrix::new(3, false);
        q.stamp(&mut mat, &CircuitStatus::op(1e-12)).unwrap();
        let rhs = mat.rhs();
        assert!((rhs[1] + rhs[2] + rhs[3]).abs() < 1e-12);

        // Column sums are zero as well: shifting all terminals by a
        // common potential draws no current.
        for col in 1..=3 {
            let sum: f64 = (1..=3).map(|row| mat.element(row, col).0).sum();
            assert!(sum.abs() < 1e-12, "column {col} sum = {sum}");
        }
    }

    #[test]
    fn test_large_bias_is_finite() {
        let q = npn();
        let op = q.evaluate(100.0, 50.0, 300.15);
        assert!(op.ic.is_finite() && op.ib.is_finite());
    }

    #[test]
    fn test_transient_lte_uses_prev_state() {
        let mut q = npn();
        let solution = [0.0, 5.0, 0.65, 0.0];
        q.update_voltages(&solution).unwrap();
        q.refresh_operating_point(300.15, 1e-12);
        q.update_state(&solution, &CircuitStatus::default());
        assert!(q.calculate_lte(&CircuitStatus::default()).abs() < 1e-15);

        let moved = [0.0, 5.0, 0.70, 0.0];
        q.update_voltages(&moved).unwrap();
        assert!(q.calculate_lte(&CircuitStatus::default()) > 0.0);
    }
}
