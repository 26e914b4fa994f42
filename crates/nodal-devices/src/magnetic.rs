//! Jiles-Atherton magnetic core and nonlinear winding model.
//!
//! A single core instance is shared by every winding naming it: the
//! circuit owns the cores in an arena and advances each core once per
//! stamp pass from the summed winding magnetomotive force. Windings read
//! the core's differential permeability to form their effective
//! inductance.

use nodal_core::{AnalysisMode, CircuitMatrix, CircuitStatus, ModelCard};

use crate::device::{node_voltage, TimeDependent};
use crate::error::{Error, Result};

/// Vacuum permeability (H/m).
pub const MU0: f64 = 4.0 * std::f64::consts::PI * 1e-7;

/// Applied-field clamp for numerical stability.
const H_CLAMP: f64 = 1e6;
/// Differential-permeability clamp.
const DMDH_CLAMP: f64 = 1e3;
/// Effective-inductance floor.
const L_EFF_FLOOR: f64 = 1e-12;

/// Jiles-Atherton core parameters from a `.model CORE(...)` card.
#[derive(Debug, Clone)]
pub struct CoreParams {
    /// Saturation magnetization (A/m).
    pub ms: f64,
    /// Domain coupling parameter.
    pub alpha: f64,
    /// Anhysteretic shape parameter (A/m).
    pub a: f64,
    /// Reversibility coefficient.
    pub c: f64,
    /// Pinning coefficient (A/m).
    pub k: f64,
    /// Cross-sectional area (m^2).
    pub area: f64,
    /// Mean magnetic path length (m).
    pub len: f64,
    /// Curie temperature (K).
    pub tc: f64,
    /// Temperature scaling exponent.
    pub beta: f64,
}

impl Default for CoreParams {
    fn default() -> Self {
        Self {
            ms: 1.6e6,
            alpha: 1e-3,
            a: 1000.0,
            c: 0.1,
            k: 2000.0,
            area: 1e-4, // 1 cm^2
            len: 0.1,   // 10 cm
            tc: 1043.0, // iron
            beta: 0.0,
        }
    }
}

impl CoreParams {
    pub fn from_model(card: &ModelCard) -> Self {
        let d = Self::default();
        Self {
            ms: card.param("ms", d.ms),
            alpha: card.param("alpha", d.alpha),
            a: card.param("a", d.a),
            c: card.param("c", d.c),
            k: card.param("k", d.k),
            area: card.param("area", d.area),
            len: card.param("len", d.len),
            tc: card.param("tc", d.tc),
            beta: card.param("beta", d.beta),
        }
    }
}

/// Jiles-Atherton hysteresis state machine `(H, M_irr, M)`.
#[derive(Debug, Clone)]
pub struct JilesAthertonCore {
    pub params: CoreParams,
    /// Applied field (A/m).
    pub h: f64,
    h_old: f64,
    /// Total magnetization (A/m).
    pub m: f64,
    /// Anhysteretic magnetization (A/m).
    pub m_an: f64,
    /// Irreversible magnetization (A/m).
    pub m_irr: f64,
    /// Differential permeability dM/dH, clamped.
    pub dmdh: f64,
}

impl JilesAthertonCore {
    pub fn new(params: CoreParams) -> Self {
        // Initial slope of the anhysteretic curve.
        let dmdh = (params.ms / (3.0 * params.a)).min(DMDH_CLAMP);
        Self {
            params,
            h: 0.0,
            h_old: 0.0,
            m: 0.0,
            m_an: 0.0,
            m_irr: 0.0,
            dmdh,
        }
    }

    /// Modified Langevin function.
    fn langevin(x: f64) -> f64 {
        if x.abs() < 1e-6 {
            x / 3.0
        } else {
            1.0 / x.tanh() - 1.0 / x
        }
    }

    /// Advance the hysteresis state to applied field `h` and return
    /// `(M, dM/dH)`. A repeated call at the same field is a no-op, so
    /// Newton re-stamps within one step do not walk the state.
    pub fn calculate(&mut self, h: f64, temp: f64) -> (f64, f64) {
        let p = &self.params;
        let h = h.clamp(-H_CLAMP, H_CLAMP);
        let dh = h - self.h_old;

        if dh.abs() < 1e-12 {
            return (self.m, self.dmdh);
        }

        // Temperature-scaled saturation magnetization.
        let mst = if p.beta != 0.0 && temp < p.tc {
            p.ms * ((p.tc - temp) / p.tc).powf(p.beta)
        } else {
            p.ms
        };

        // Effective field with domain coupling.
        let he = h + p.alpha * self.m;
        self.m_an = mst * Self::langevin(he / p.a);

        let delta = if dh < 0.0 { -1.0 } else { 1.0 };

        let mut denom = p.k * delta - p.alpha * (self.m_an - self.m_irr);
        if denom.abs() < 1e-12 {
            denom = 1e-12_f64.copysign(denom);
        }

        let dmirr_dh = (self.m_an - self.m_irr) / denom;
        self.m_irr += dmirr_dh * dh;

        let m_old = self.m;
        self.m = self.m_irr + p.c * (self.m_an - self.m_irr);

        let mut dmdh = (self.m - m_old) / dh;
        if !dmdh.is_finite() {
            dmdh = mst / p.a / 3.0;
        }
        self.dmdh = dmdh.clamp(-DMDH_CLAMP, DMDH_CLAMP);

        self.h = h;
        self.h_old = h;

        (self.m, self.dmdh)
    }
}

/// A winding on a shared Jiles-Atherton core.
///
/// Stamped as a node-row companion (no branch row): the effective
/// inductance follows the core's differential permeability at the
/// winding's magnetomotive force.
#[derive(Debug, Clone)]
pub struct MagneticInductor {
    pub name: String,
    pub nodes: [usize; 2],
    /// Winding turns.
    pub turns: f64,
    /// Index of the shared core in the circuit's core arena.
    pub core_index: usize,
    /// Set when a K element couples this winding; the coupling then owns
    /// the transient companion and the current update.
    pub coupled: bool,
    /// Effective inductance from the latest stamp.
    pub l_eff: f64,
    /// Current from the latest solve (n1 -> n2 positive).
    pub current: f64,
    pub current_prev: f64,
    pub voltage: f64,
    pub voltage_prev: f64,
    /// Integrated flux linkage (Wb).
    pub flux: f64,
}

impl MagneticInductor {
    pub fn new(name: impl Into<String>, nodes: [usize; 2], turns: f64, core_index: usize) -> Self {
        Self {
            name: name.into(),
            nodes,
            turns,
            core_index,
            coupled: false,
            l_eff: L_EFF_FLOOR,
            current: 0.0,
            current_prev: 0.0,
            voltage: 0.0,
            voltage_prev: 0.0,
            flux: 0.0,
        }
    }

    /// Magnetomotive force `N * i` of this winding at the last accepted
    /// step; the circuit divides by the core path length.
    pub fn mmf(&self) -> f64 {
        self.turns * self.current_prev
    }

    /// `L_eff = mu0 * N^2 * A * (1 + dM/dH) / l`, floored.
    pub fn effective_inductance(&self, core: &JilesAthertonCore) -> f64 {
        let p = &core.params;
        (MU0 * self.turns * self.turns * p.area * (1.0 + core.dmdh) / p.len).max(L_EFF_FLOOR)
    }

    pub fn stamp(
        &mut self,
        mat: &mut CircuitMatrix,
        core: &JilesAthertonCore,
        status: &CircuitStatus,
    ) -> Result<()> {
        let [n1, n2] = self.nodes;
        self.l_eff = self.effective_inductance(core);

        match status.mode {
            AnalysisMode::OperatingPoint => {
                // Windings carry no DC conductance; a small shunt keeps
                // the nodes from floating.
                let geq = 1e-9;
                if n1 != 0 {
                    mat.add_element(n1, n1, geq);
                    if n2 != 0 {
                        mat.add_element(n1, n2, -geq);
                    }
                }
                if n2 != 0 {
                    if n1 != 0 {
                        mat.add_element(n2, n1, -geq);
                    }
                    mat.add_element(n2, n2, geq);
                }
            }
            AnalysisMode::Transient => {
                let dt = status.time_step;
                if dt <= 0.0 {
                    return Err(Error::stamp(&self.name, "transient stamp with dt <= 0"));
                }
                if self.coupled {
                    // The K element stamps the coupled companion.
                    return Ok(());
                }
                // Trapezoidal companion on the node rows.
                let geq = dt / (2.0 * self.l_eff);
                let ieq = self.current_prev + geq * self.voltage_prev;

                if n1 != 0 {
                    mat.add_element(n1, n1, geq);
                    if n2 != 0 {
                        mat.add_element(n1, n2, -geq);
                    }
                    mat.add_rhs(n1, -ieq);
                }
                if n2 != 0 {
                    if n1 != 0 {
                        mat.add_element(n2, n1, -geq);
                    }
                    mat.add_element(n2, n2, geq);
                    mat.add_rhs(n2, ieq);
                }
            }
            AnalysisMode::Ac => {
                // Linearized at the bias-point permeability.
                let y_im = -1.0 / (status.omega() * self.l_eff);
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
            }
        }
        Ok(())
    }
}

impl TimeDependent for MagneticInductor {
    fn load_state(&mut self, solution: &[f64], status: &CircuitStatus) {
        let dt = status.time_step;
        if dt <= 0.0 {
            return;
        }
        let vd = node_voltage(solution, self.nodes[0]) - node_voltage(solution, self.nodes[1]);
        self.voltage = vd;
        let geq = dt / (2.0 * self.l_eff);
        self.current = self.current_prev + geq * (vd + self.voltage_prev);
    }

    fn update_state(&mut self, solution: &[f64], status: &CircuitStatus) {
        let dt = status.time_step;
        let vd = node_voltage(solution, self.nodes[0]) - node_voltage(solution, self.nodes[1]);
        if dt > 0.0 {
            if !self.coupled {
                // Coupled windings get their current from the K element's
                // inverse-inductance recurrence via the circuit.
                let geq = dt / (2.0 * self.l_eff);
                self.current = self.current_prev + geq * (vd + self.voltage_prev);
            }
            self.flux += vd * dt;
        }
        self.voltage = vd;
        self.voltage_prev = vd;
        if !self.coupled {
            self.current_prev = self.current;
        }
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

    fn core() -> JilesAthertonCore {
        JilesAthertonCore::new(CoreParams::default())
    }

    #[test]
    fn test_initial_permeability() {
        let c = core();
        // Ms/(3a) = 1.6e6/3000 ~ 533, under the clamp.
        assert!((c.dmdh - 1.6e6 / 3000.0).abs() < 1.0);
    }

    #[test]
    fn test_langevin_small_argument() {
        assert!((JilesAthertonCore::langevin(1e-9) - 1e-9 / 3.0).abs() < 1e-18);
        // Saturates toward 1 for large arguments.
        assert!(JilesAthertonCore::langevin(100.0) > 0.98);
    }

    #[test]
    fn test_magnetization_follows_field() {
        let mut c = core();
        let (m1, _) = c.calculate(100.0, 300.15);
        let (m2, _) = c.calculate(500.0, 300.15);
        assert!(m2 > m1, "M should grow with H: {m1} -> {m2}");
    }

    #[test]
    fn test_repeated_field_is_noop() {
        let mut c = core();
        c.calculate(200.0, 300.15);
        let state = (c.m, c.m_irr, c.dmdh);
        c.calculate(200.0, 300.15);
        assert_eq!(state, (c.m, c.m_irr, c.dmdh));
    }

    #[test]
    fn test_hysteresis_multivalued() {
        // Drive one full cycle: M at H=0 on the way down differs from
        // the virgin value, so the B-H loop is open.
        let mut c = core();
        let steps = 200;
        let h_peak = 2000.0;

        let mut m_up_at_zero = None;
        for i in 0..=steps {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / steps as f64;
            let h = h_peak * phase.sin();
            c.calculate(h, 300.15);
            if i == steps / 2 {
                // Returning through H ~ 0 after the positive peak.
                m_up_at_zero = Some(c.m);
            }
        }
        let m_down_at_zero = c.m;
        let remanence = m_up_at_zero.unwrap();
        assert!(
            (remanence - m_down_at_zero).abs() > 1.0,
            "loop should be open: {remanence} vs {m_down_at_zero}"
        );
    }

    #[test]
    fn test_field_clamp() {
        let mut c = core();
        let (m, dmdh) = c.calculate(1e9, 300.15);
        assert!(m.is_finite());
        assert!(dmdh.abs() <= DMDH_CLAMP);
        assert!(c.h <= H_CLAMP);
    }

    #[test]
    fn test_effective_inductance_scaling() {
        let c = core();
        let w300 = MagneticInductor::new("L1", [1, 0], 300.0, 0);
        let w150 = MagneticInductor::new("L2", [2, 0], 150.0, 0);
        let l1 = w300.effective_inductance(&c);
        let l2 = w150.effective_inductance(&c);
        // L scales with N^2.
        assert!((l1 / l2 - 4.0).abs() < 1e-9);
        assert!(l2 >= L_EFF_FLOOR);
    }

    #[test]
    fn test_transient_companion_stamp() {
        let c = core();
        let mut w = MagneticInductor::new("L1", [1, 0], 100.0, 0);
        let status = CircuitStatus::transient(
            0.0,
            1e-6,
            nodal_core::IntegrationMethod::Trapezoidal,
            1e-12,
        );
        let mut mat = CircuitMatrix::new(1, false);
        w.stamp(&mut mat, &c, &status).unwrap();

        let geq = 1e-6 / (2.0 * w.l_eff);
        assert!((mat.element(1, 1).0 - geq).abs() < geq * 1e-12);
    }

    #[test]
    fn test_winding_current_integration() {
        let c = core();
        let mut w = MagneticInductor::new("L1", [1, 0], 100.0, 0);
        let dt = 1e-6;
        let status =
            CircuitStatus::transient(0.0, dt, nodal_core::IntegrationMethod::Trapezoidal, 1e-12);
        // Stamp once to set l_eff, then apply 1V for one step.
        let mut mat = CircuitMatrix::new(1, false);
        w.stamp(&mut mat, &c, &status).unwrap();
        let solution = [0.0, 1.0];
        w.update_state(&solution, &status);
        let expected = dt / (2.0 * w.l_eff);
        assert!((w.current - expected).abs() < expected * 1e-9);
        assert!((w.flux - 1e-6).abs() < 1e-15);
    }
}
