//! MOSFET levels 1-3 with Meyer capacitances.
//!
//! Level 1 is the Shichman-Hodges square law with analytic conductances.
//! Level 2 adds Grove-Frohman mobility degradation and velocity
//! saturation, level 3 the semi-empirical short-channel corrections;
//! both compute conductances by one-sided numerical differences.
//!
//! Internal junction voltages are stored in flipped polarity for PMOS, so
//! all region logic runs in NMOS space; terminal currents and voltages
//! are mapped back at the device boundary.

use nodal_core::{AnalysisMode, CircuitMatrix, CircuitStatus, ModelCard, ModelKind};

use crate::device::{node_voltage, NonLinear, TimeDependent};
use crate::error::Result;

const GMIN_FLOOR: f64 = 1e-12;
/// Step for one-sided numerical conductance derivatives (levels 2 and 3).
const DERIV_STEP: f64 = 1e-6;

/// Operating region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MosRegion {
    #[default]
    Cutoff,
    Linear,
    Saturation,
}

/// MOSFET model parameters from a `.model NMOS/PMOS(...)` card.
#[derive(Debug, Clone)]
pub struct MosfetParams {
    /// Model level (1-3).
    pub level: usize,
    /// Zero-bias threshold voltage (V).
    pub vto: f64,
    /// Transconductance parameter (A/V^2).
    pub kp: f64,
    /// Body effect parameter (V^0.5).
    pub gamma: f64,
    /// Surface potential (V).
    pub phi: f64,
    /// Channel length modulation (1/V).
    pub lambda: f64,
    /// Oxide thickness (m).
    pub tox: f64,
    /// Surface mobility (cm^2/Vs).
    pub uo: f64,
    /// Critical field for mobility degradation (V/cm).
    pub ucrit: f64,
    /// Critical field exponent.
    pub uexp: f64,
    /// Maximum drift velocity (m/s); 0 disables velocity saturation.
    pub vmax: f64,
    /// Level 3 mobility modulation (1/V).
    pub theta: f64,
    /// Level 3 static feedback.
    pub eta: f64,
    /// Level 3 saturation field factor.
    pub kappa: f64,
    /// Level 3 width effect on threshold.
    pub delta: f64,
    /// Bulk junction capacitances (F).
    pub cbd: f64,
    pub cbs: f64,
    /// Overlap capacitances (F/m).
    pub cgso: f64,
    pub cgdo: f64,
    pub cgbo: f64,
    /// Bulk junction capacitance per area (F/m^2) and grading.
    pub cj: f64,
    pub mj: f64,
    /// Sidewall capacitance (F/m) and grading.
    pub cjsw: f64,
    pub mjsw: f64,
    /// Bulk junction potential (V).
    pub pb: f64,
    /// Channel length / width (m).
    pub l: f64,
    pub w: f64,
    /// Drain/source areas (m^2) and perimeters (m).
    pub ad: f64,
    pub a_s: f64,
    pub pd: f64,
    pub ps: f64,
    /// Parameter measurement temperature (K).
    pub tnom: f64,
}

impl Default for MosfetParams {
    fn default() -> Self {
        Self {
            level: 1,
            vto: 0.7,
            kp: 2e-5,
            gamma: 0.5,
            phi: 0.6,
            lambda: 0.01,
            tox: 1e-7,
            uo: 600.0,
            ucrit: 1e4,
            uexp: 0.0,
            vmax: 0.0,
            theta: 0.0,
            eta: 0.0,
            kappa: 0.2,
            delta: 0.0,
            cbd: 0.0,
            cbs: 0.0,
            cgso: 0.0,
            cgdo: 0.0,
            cgbo: 0.0,
            cj: 0.0,
            mj: 0.5,
            cjsw: 0.0,
            mjsw: 0.33,
            pb: 0.8,
            l: 10e-6,
            w: 10e-6,
            ad: 0.0,
            a_s: 0.0,
            pd: 0.0,
            ps: 0.0,
            tnom: 300.15,
        }
    }
}

impl MosfetParams {
    pub fn from_model(card: &ModelCard) -> Self {
        let d = Self::default();
        Self {
            level: card.param("level", d.level as f64).max(1.0).min(3.0) as usize,
            vto: card.param("vto", d.vto),
            kp: card.param("kp", d.kp),
            gamma: card.param("gamma", d.gamma),
            phi: card.param("phi", d.phi),
            lambda: card.param("lambda", d.lambda),
            tox: card.param("tox", d.tox),
            uo: card.param("uo", d.uo),
            ucrit: card.param("ucrit", d.ucrit),
            uexp: card.param("uexp", d.uexp),
            vmax: card.param("vmax", d.vmax),
            theta: card.param("theta", d.theta),
            eta: card.param("eta", d.eta),
            kappa: card.param("kappa", d.kappa),
            delta: card.param("delta", d.delta),
            cbd: card.param("cbd", d.cbd),
            cbs: card.param("cbs", d.cbs),
            cgso: card.param("cgso", d.cgso),
            cgdo: card.param("cgdo", d.cgdo),
            cgbo: card.param("cgbo", d.cgbo),
            cj: card.param("cj", d.cj),
            mj: card.param("mj", d.mj),
            cjsw: card.param("cjsw", d.cjsw),
            mjsw: card.param("mjsw", d.mjsw),
            pb: card.param("pb", d.pb),
            l: card.param("l", d.l),
            w: card.param("w", d.w),
            ad: card.param("ad", d.ad),
            a_s: card.param("as", d.a_s),
            pd: card.param("pd", d.pd),
            ps: card.param("ps", d.ps),
            tnom: card.param("tnom", d.tnom),
        }
    }

    fn cox(&self) -> f64 {
        // epsilon_ox / tox, CGS units as in the reference models.
        3.9 * 8.85e-14 / self.tox
    }
}

/// A MOSFET with terminals (drain, gate, source, bulk).
#[derive(Debug, Clone)]
pub struct Mosfet {
    pub name: String,
    /// Terminal node indices: [drain, gate, source, bulk].
    pub nodes: [usize; 4],
    /// +1 for NMOS, -1 for PMOS.
    pub polarity: f64,
    pub params: MosfetParams,

    /// Internal-polarity junction voltages.
    pub vgs: f64,
    pub vds: f64,
    pub vbs: f64,
    pub vgd: f64,
    pub vbd: f64,

    /// Internal-polarity drain current at the linearization point.
    pub id: f64,
    pub gm: f64,
    pub gds: f64,
    pub gmbs: f64,
    pub region: MosRegion,

    /// Meyer capacitances at the current region.
    cgs: f64,
    cgd: f64,
    cgb: f64,

    // Charge state for the capacitive companions (external voltages).
    q_gs: f64,
    q_gd: f64,
    q_gb: f64,
    q_bs: f64,
    q_bd: f64,
    q_gs_prev: f64,
    q_gd_prev: f64,
    q_gb_prev: f64,
    q_bs_prev: f64,
    q_bd_prev: f64,

    prev_vgs: f64,
    prev_vds: f64,
    prev_id: f64,
}

impl Mosfet {
    pub fn new(
        name: impl Into<String>,
        nodes: [usize; 4],
        kind: ModelKind,
        params: MosfetParams,
    ) -> Self {
        let polarity = if kind == ModelKind::Pmos { -1.0 } else { 1.0 };
        Self {
            name: name.into(),
            nodes,
            polarity,
            params,
            // Starting bias: weakly on with a small drain voltage.
            vgs: 0.7,
            vds: 0.1,
            vbs: 0.0,
            vgd: 0.6,
            vbd: -0.1,
            id: 0.0,
            gm: GMIN_FLOOR,
            gds: GMIN_FLOOR,
            gmbs: GMIN_FLOOR,
            region: MosRegion::Cutoff,
            cgs: 0.0,
            cgd: 0.0,
            cgb: 0.0,
            q_gs: 0.0,
            q_gd: 0.0,
            q_gb: 0.0,
            q_bs: 0.0,
            q_bd: 0.0,
            q_gs_prev: 0.0,
            q_gd_prev: 0.0,
            q_gb_prev: 0.0,
            q_bs_prev: 0.0,
            q_bd_prev: 0.0,
            prev_vgs: 0.0,
            prev_vds: 0.0,
            prev_id: 0.0,
        }
    }

    /// Threshold voltage with body effect, internal polarity:
    /// `Vth = VTO + gamma*(sqrt(max(0, phi - vbs)) - sqrt(phi))`.
    pub fn threshold(&self, vbs: f64) -> f64 {
        let p = &self.params;
        let vto = p.vto.abs();
        if p.gamma > 0.0 {
            vto + p.gamma * ((p.phi - vbs).max(0.0).sqrt() - p.phi.sqrt())
        } else {
            vto
        }
    }

    /// Drain current and region at internal junction voltages.
    pub fn evaluate(&self, vgs: f64, vds: f64, vbs: f64) -> (f64, MosRegion) {
        let vth = self.threshold(vbs);
        if vgs - vth <= 0.0 {
            return (0.0, MosRegion::Cutoff);
        }
        match self.params.level {
            2 => self.level2(vgs, vds, vth),
            3 => self.level3(vgs, vds, vth),
            _ => self.level1(vgs, vds, vth),
        }
    }

    fn level1(&self, vgs: f64, vds: f64, vth: f64) -> (f64, MosRegion) {
        let p = &self.params;
        let vgst = vgs - vth;
        let beta = p.kp * p.w / p.l;
        if vds < vgst {
            let id = beta * (vgst * vds - 0.5 * vds * vds) * (1.0 + p.lambda * vds);
            (id, MosRegion::Linear)
        } else {
            let id = 0.5 * beta * vgst * vgst * (1.0 + p.lambda * vds);
            (id, MosRegion::Saturation)
        }
    }

    fn level2(&self, vgs: f64, vds: f64, vth: f64) -> (f64, MosRegion) {
        let p = &self.params;
        let vgst = vgs - vth;

        // Mobility degradation above the critical field.
        let mut ueff = p.uo;
        if p.ucrit > 0.0 {
            let eeff = vgs / p.tox;
            if eeff > p.ucrit {
                ueff *= (p.ucrit / eeff).powf(p.uexp);
            }
        }
        let beta = ueff * p.cox() * p.w / p.l;
        let lambda = if p.lambda > 0.0 { p.lambda } else { 0.02 };

        // Velocity saturation caps the saturation voltage.
        let mut vdsat = vgst;
        if p.vmax > 0.0 {
            vdsat = vgst.min(p.vmax * p.l / ueff);
        }

        if vds < vdsat {
            let id = beta * (vgst * vds - 0.5 * vds * vds) * (1.0 + lambda * vds);
            (id, MosRegion::Linear)
        } else {
            let id = 0.5 * beta * vdsat * vdsat * (1.0 + lambda * vds);
            (id, MosRegion::Saturation)
        }
    }

    fn level3(&self, vgs: f64, vds: f64, vth: f64) -> (f64, MosRegion) {
        let p = &self.params;
        let mut vgst = vgs - vth;
        if p.theta > 0.0 {
            vgst /= 1.0 + p.theta * vgst;
        }

        let mut vdsat = vgst;
        if p.eta > 0.0 {
            vdsat = vgst / (1.0 + p.eta * vgst);
        }
        if p.kappa > 0.0 {
            vdsat /= (1.0 + p.kappa * vgst).sqrt();
        }

        let mut beta = p.kp * p.w / p.l;
        if p.delta > 0.0 {
            beta /= 1.0 + p.delta / p.w;
        }

        if vds < vdsat {
            let id = beta
                * (vgst * vds - 0.5 * vds * vds / (1.0 + p.kappa * vgs))
                * (1.0 + p.lambda * vds);
            (id, MosRegion::Linear)
        } else {
            let id = 0.5 * beta * vdsat * vdsat * (1.0 + p.lambda * vds);
            (id, MosRegion::Saturation)
        }
    }

    /// Refresh `id`, region and small-signal conductances at the stored
    /// bias. Level 1 uses analytic derivatives; levels 2 and 3 one-sided
    /// numerical differences floored at gmin.
    fn refresh_operating_point(&mut self) {
        let (vgs, vds, vbs) = (self.vgs, self.vds, self.vbs);
        let (id, region) = self.evaluate(vgs, vds, vbs);
        self.id = id;
        self.region = region;

        let p = &self.params;
        if region == MosRegion::Cutoff {
            self.gm = GMIN_FLOOR;
            self.gds = GMIN_FLOOR;
            self.gmbs = GMIN_FLOOR;
            return;
        }

        match p.level {
            1 => {
                let vth = self.threshold(vbs);
                let vgst = vgs - vth;
                let beta = p.kp * p.w / p.l;
                let (gm, gds) = if region == MosRegion::Linear {
                    (
                        beta * vds * (1.0 + p.lambda * vds),
                        beta * (vgst - vds) * (1.0 + p.lambda * vds)
                            + beta * p.lambda * (vgst * vds - 0.5 * vds * vds),
                    )
                } else {
                    (
                        beta * vgst * (1.0 + p.lambda * vds),
                        0.5 * beta * vgst * vgst * p.lambda,
                    )
                };
                self.gm = gm.max(GMIN_FLOOR);
                self.gds = gds.max(GMIN_FLOOR);
            }
            _ => {
                let (idg, _) = self.evaluate(vgs + DERIV_STEP, vds, vbs);
                let (idd, _) = self.evaluate(vgs, vds + DERIV_STEP, vbs);
                self.gm = ((idg - id) / DERIV_STEP).max(GMIN_FLOOR);
                self.gds = ((idd - id) / DERIV_STEP).max(GMIN_FLOOR);
            }
        }

        // Body-effect transconductance.
        self.gmbs = if p.gamma > 0.0 && p.phi > 0.0 && vbs < 0.0 {
            (self.gm * p.gamma / (2.0 * (p.phi - vbs).sqrt())).max(GMIN_FLOOR)
        } else {
            GMIN_FLOOR
        };
    }

    /// Meyer capacitance split by operating region.
    fn refresh_capacitances(&mut self) {
        let p = &self.params;
        let cgate = p.cox() * p.w * p.l;
        let cgso = p.cgso * p.w;
        let cgdo = p.cgdo * p.w;
        let cgbo = p.cgbo * p.l;

        match self.region {
            MosRegion::Cutoff => {
                self.cgb = 2.0 * cgate / 3.0;
                self.cgs = cgso;
                self.cgd = cgdo;
            }
            MosRegion::Linear => {
                self.cgs = cgate / 2.0 + cgso;
                self.cgd = cgate / 2.0 + cgdo;
                self.cgb = cgbo;
            }
            MosRegion::Saturation => {
                self.cgs = 2.0 * cgate / 3.0 + cgso;
                self.cgd = cgdo;
                self.cgb = cgbo + cgate / 3.0;
            }
        }
    }

    /// Bulk junction capacitance with voltage dependence.
    fn junction_cap(&self, c0: f64, v: f64) -> f64 {
        let p = &self.params;
        if c0 == 0.0 {
            return 0.0;
        }
        if v < 0.0 {
            c0 / (1.0 - v / p.pb).powf(p.mj)
        } else {
            c0 * (1.0 + p.mj * v / p.pb)
        }
    }

    fn bulk_caps(&self) -> (f64, f64) {
        let p = &self.params;
        let mut cbs0 = p.cbs;
        if cbs0 == 0.0 && p.cj > 0.0 {
            cbs0 = p.cj * p.a_s + p.cjsw * p.ps;
        }
        let mut cbd0 = p.cbd;
        if cbd0 == 0.0 && p.cj > 0.0 {
            cbd0 = p.cj * p.ad + p.cjsw * p.pd;
        }
        (
            self.junction_cap(cbs0, self.vbs),
            self.junction_cap(cbd0, self.vbd),
        )
    }

    /// Capacitance pairs as (node_a, node_b, C, q_prev).
    fn cap_pairs(&self) -> [(usize, usize, f64, f64); 5] {
        let [nd, ng, ns, nb] = self.nodes;
        let (cbs, cbd) = self.bulk_caps();
        [
            (ng, nd, self.cgd, self.q_gd_prev),
            (ng, ns, self.cgs, self.q_gs_prev),
            (ng, nb, self.cgb, self.q_gb_prev),
            (nb, ns, cbs, self.q_bs_prev),
            (nb, nd, cbd, self.q_bd_prev),
        ]
    }

    pub fn stamp(&mut self, mat: &mut CircuitMatrix, status: &CircuitStatus) -> Result<()> {
        if status.mode == AnalysisMode::Ac {
            return self.stamp_ac(mat, status);
        }

        self.refresh_operating_point();
        self.refresh_capacitances();

        let [nd, ng, ns, nb] = self.nodes;
        let (gm, gds, gmbs) = (self.gm, self.gds, self.gmbs);
        let pol = self.polarity;

        // External quantities for the RHS.
        let id_x = pol * self.id;
        let vgs_x = pol * self.vgs;
        let vds_x = pol * self.vds;
        let vbs_x = pol * self.vbs;
        let rd = -id_x + gds * vds_x + gm * vgs_x + gmbs * vbs_x;

        if nd != 0 {
            mat.add_element(nd, nd, gds + status.gmin);
            if ng != 0 {
                mat.add_element(nd, ng, gm);
            }
            if ns != 0 {
                mat.add_element(nd, ns, -gds - gm - gmbs);
            }
            if nb != 0 {
                mat.add_element(nd, nb, gmbs);
            }
            mat.add_rhs(nd, rd);
        }
        if ns != 0 {
            mat.add_element(ns, ns, gds + gm + gmbs + status.gmin);
            if nd != 0 {
                mat.add_element(ns, nd, -gds);
            }
            if ng != 0 {
                mat.add_element(ns, ng, -gm);
            }
            if nb != 0 {
                mat.add_element(ns, nb, -gmbs);
            }
            mat.add_rhs(ns, -rd);
        }

        // Capacitive companions: four-corner C/dt with q_prev/dt history.
        if status.mode == AnalysisMode::Transient && status.time_step > 0.0 {
            let dt = status.time_step;
            for (a, b, c, q_prev) in self.cap_pairs() {
                if c == 0.0 {
                    continue;
                }
                let geq = c / dt;
                let ieq = q_prev / dt;
                if a != 0 {
                    mat.add_element(a, a, geq);
                    if b != 0 {
                        mat.add_element(a, b, -geq);
                    }
                    mat.add_rhs(a, ieq);
                }
                if b != 0 {
                    if a != 0 {
                        mat.add_element(b, a, -geq);
                    }
                    mat.add_element(b, b, geq);
                    mat.add_rhs(b, -ieq);
                }
            }
        }
        Ok(())
    }

    fn stamp_ac(&mut self, mat: &mut CircuitMatrix, status: &CircuitStatus) -> Result<()> {
        // Conductances frozen at the OP bias.
        self.refresh_capacitances();
        let [nd, ng, ns, nb] = self.nodes;
        let (gm, gds, gmbs) = (self.gm, self.gds, self.gmbs);
        let omega = status.omega();

        if nd != 0 {
            mat.add_complex_element(nd, nd, gds, 0.0);
            if ng != 0 {
                mat.add_complex_element(nd, ng, gm, 0.0);
            }
            if ns != 0 {
                mat.add_complex_element(nd, ns, -gds - gm - gmbs, 0.0);
            }
            if nb != 0 {
                mat.add_complex_element(nd, nb, gmbs, 0.0);
            }
        }
        if ns != 0 {
            mat.add_complex_element(ns, ns, gds + gm + gmbs, 0.0);
            if nd != 0 {
                mat.add_complex_element(ns, nd, -gds, 0.0);
            }
            if ng != 0 {
                mat.add_complex_element(ns, ng, -gm, 0.0);
            }
            if nb != 0 {
                mat.add_complex_element(ns, nb, -gmbs, 0.0);
            }
        }

        for (a, b, c, _) in self.cap_pairs() {
            if c == 0.0 {
                continue;
            }
            let y = omega * c;
            if a != 0 {
                mat.add_complex_element(a, a, 0.0, y);
                if b != 0 {
                    mat.add_complex_element(a, b, 0.0, -y);
                }
            }
            if b != 0 {
                if a != 0 {
                    mat.add_complex_element(b, a, 0.0, -y);
                }
                mat.add_complex_element(b, b, 0.0, y);
            }
        }
        Ok(())
    }
}

impl NonLinear for Mosfet {
    fn update_voltages(&mut self, solution: &[f64]) -> Result<()> {
        let vd = node_voltage(solution, self.nodes[0]);
        let vg = node_voltage(solution, self.nodes[1]);
        let vs = node_voltage(solution, self.nodes[2]);
        let vb = node_voltage(solution, self.nodes[3]);
        let pol = self.polarity;

        self.vgs = pol * (vg - vs);
        self.vds = pol * (vd - vs);
        self.vbs = pol * (vb - vs);
        self.vgd = self.vgs - self.vds;
        self.vbd = self.vbs - self.vds;
        Ok(())
    }
}

impl TimeDependent for Mosfet {
    fn load_state(&mut self, solution: &[f64], _status: &CircuitStatus) {
        let vd = node_voltage(solution, self.nodes[0]);
        let vg = node_voltage(solution, self.nodes[1]);
        let vs = node_voltage(solution, self.nodes[2]);
        let vb = node_voltage(solution, self.nodes[3]);
        let (cbs, cbd) = self.bulk_caps();

        self.q_gd = self.cgd * (vg - vd);
        self.q_gs = self.cgs * (vg - vs);
        self.q_gb = self.cgb * (vg - vb);
        self.q_bs = cbs * (vb - vs);
        self.q_bd = cbd * (vb - vd);
    }

    fn update_state(&mut self, _solution: &[f64], _status: &CircuitStatus) {
        self.q_gd_prev = self.q_gd;
        self.q_gs_prev = self.q_gs;
        self.q_gb_prev = self.q_gb;
        self.q_bs_prev = self.q_bs;
        self.q_bd_prev = self.q_bd;
        self.prev_vgs = self.vgs;
        self.prev_vds = self.vds;
        self.prev_id = self.id;
    }

    fn calculate_lte(&self, _status: &CircuitStatus) -> f64 {
        let dv = (self.vgs - self.prev_vgs)
            .abs()
            .max((self.vds - self.prev_vds).abs());
        dv.max((self.id - self.prev_id).abs())
    }
}
