//! Independent voltage and current sources with the full waveform family.

use nodal_core::{AnalysisMode, CircuitMatrix, CircuitStatus};

use crate::error::Result;
use crate::waveforms::Waveform;

/// An independent voltage source, augmented with a branch current row.
///
/// Incidence follows the inductor convention (`-1` on the `n1` side), so
/// the published current is `-solution[branch]` - negative when the source
/// delivers current out of its positive terminal, matching SPICE.
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub name: String,
    pub nodes: [usize; 2],
    pub waveform: Waveform,
    /// AC stimulus magnitude.
    pub ac_mag: f64,
    /// AC stimulus phase (degrees).
    pub ac_phase: f64,
    /// Branch row index in the MNA system.
    pub branch: usize,
    /// Scale factor applied by source stepping (1.0 nominally).
    pub scale: f64,
}

impl VoltageSource {
    pub fn new(name: impl Into<String>, nodes: [usize; 2], waveform: Waveform, branch: usize) -> Self {
        Self {
            name: name.into(),
            nodes,
            waveform,
            ac_mag: 0.0,
            ac_phase: 0.0,
            branch,
            scale: 1.0,
        }
    }

    /// Source voltage at time `t`, including any stepping scale.
    pub fn voltage_at(&self, t: f64) -> f64 {
        self.scale * self.waveform.value_at(t)
    }

    /// DC bias level (used by OP and sweeps).
    pub fn dc_value(&self) -> f64 {
        self.waveform.dc_value()
    }

    /// Replace the DC level; used by DC sweeps.
    pub fn set_dc_value(&mut self, value: f64) {
        self.waveform = Waveform::Dc(value);
    }

    pub fn stamp(&mut self, mat: &mut CircuitMatrix, status: &CircuitStatus) -> Result<()> {
        let [n1, n2] = self.nodes;
        let b = self.branch;

        if status.mode == AnalysisMode::Ac {
            if n1 != 0 {
                mat.add_complex_element(n1, b, -1.0, 0.0);
                mat.add_complex_element(b, n1, -1.0, 0.0);
            }
            if n2 != 0 {
                mat.add_complex_element(n2, b, 1.0, 0.0);
                mat.add_complex_element(b, n2, 1.0, 0.0);
            }
            let phase_rad = self.ac_phase.to_radians();
            mat.add_complex_rhs(
                b,
                -self.ac_mag * phase_rad.cos(),
                -self.ac_mag * phase_rad.sin(),
            );
        } else {
            if n1 != 0 {
                mat.add_element(n1, b, -1.0);
                mat.add_element(b, n1, -1.0);
            }
            if n2 != 0 {
                mat.add_element(n2, b, 1.0);
                mat.add_element(b, n2, 1.0);
            }
            // -v1 + v2 = -V with this incidence sign.
            mat.add_rhs(b, -self.voltage_at(status.time));
        }
        Ok(())
    }
}

/// An independent current source. RHS contributions only.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub name: String,
    pub nodes: [usize; 2],
    pub waveform: Waveform,
    pub ac_mag: f64,
    pub ac_phase: f64,
    /// Scale factor applied by source stepping (1.0 nominally).
    pub scale: f64,
}

impl CurrentSource {
    pub fn new(name: impl Into<String>, nodes: [usize; 2], waveform: Waveform) -> Self {
        Self {
            name: name.into(),
            nodes,
            waveform,
            ac_mag: 0.0,
            ac_phase: 0.0,
            scale: 1.0,
        }
    }

    pub fn current_at(&self, t: f64) -> f64 {
        self.scale * self.waveform.value_at(t)
    }

    pub fn dc_value(&self) -> f64 {
        self.waveform.dc_value()
    }

    pub fn set_dc_value(&mut self, value: f64) {
        self.waveform = Waveform::Dc(value);
    }

    pub fn stamp(&mut self, mat: &mut CircuitMatrix, status: &CircuitStatus) -> Result<()> {
        let [n1, n2] = self.nodes;

        if status.mode == AnalysisMode::Ac {
            let phase_rad = self.ac_phase.to_radians();
            let re = self.ac_mag * phase_rad.cos();
            let im = self.ac_mag * phase_rad.sin();
            if n1 != 0 {
                mat.add_complex_rhs(n1, re, im);
            }
            if n2 != 0 {
                mat.add_complex_rhs(n2, -re, -im);
            }
        } else {
            // Current I flows into n1 and out of n2.
            let i = self.current_at(status.time);
            if n1 != 0 {
                mat.add_rhs(n1, i);
            }
            if n2 != 0 {
                mat.add_rhs(n2, -i);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vsource_dc_stamp() {
        let mut mat = CircuitMatrix::new(2, false);
        let mut v = VoltageSource::new("V1", [1, 0], Waveform::Dc(5.0), 2);
        v.stamp(&mut mat, &CircuitStatus::default()).unwrap();

        assert_eq!(mat.element(1, 2).0, -1.0);
        assert_eq!(mat.element(2, 1).0, -1.0);
        assert!((mat.rhs()[2] + 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_vsource_solves_to_value() {
        // Single node held at 5V through the branch equation, 1k load.
        let mut mat = CircuitMatrix::new(2, false);
        let mut v = VoltageSource::new("V1", [1, 0], Waveform::Dc(5.0), 2);
        v.stamp(&mut mat, &CircuitStatus::default()).unwrap();
        mat.add_element(1, 1, 1e-3);

        mat.factor_and_solve().unwrap();
        let x = mat.solution();
        assert!((x[1] - 5.0).abs() < 1e-12);
        // 5mA delivered: published current -x[2] = -5mA.
        assert!((-x[2] + 0.005).abs() < 1e-12);
    }

    #[test]
    fn test_vsource_sin_in_transient() {
        let w = Waveform::Sin {
            offset: 0.0,
            amplitude: 5.0,
            freq: 1000.0,
            phase: 0.0,
        };
        let v = VoltageSource::new("V1", [1, 0], w, 2);
        assert!((v.voltage_at(0.25e-3) - 5.0).abs() < 1e-9);
        assert_eq!(v.dc_value(), 0.0);
    }

    #[test]
    fn test_vsource_scaling() {
        let mut v = VoltageSource::new("V1", [1, 0], Waveform::Dc(10.0), 2);
        v.scale = 0.1;
        assert!((v.voltage_at(0.0) - 1.0).abs() < 1e-12);
        v.scale = 1.0;
        assert!((v.voltage_at(0.0) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_isource_stamp() {
        let mut mat = CircuitMatrix::new(2, false);
        let mut i = CurrentSource::new("I1", [1, 2], Waveform::Dc(1e-3));
        i.stamp(&mut mat, &CircuitStatus::default()).unwrap();
        assert!((mat.rhs()[1] - 1e-3).abs() < 1e-15);
        assert!((mat.rhs()[2] + 1e-3).abs() < 1e-15);
    }

    #[test]
    fn test_ac_phasor_rhs() {
        let mut mat = CircuitMatrix::new(2, true);
        let mut i = CurrentSource::new("I1", [1, 0], Waveform::Dc(0.0));
        i.ac_mag = 2.0;
        i.ac_phase = 90.0;
        i.stamp(&mut mat, &CircuitStatus::ac(1e3)).unwrap();
        // cos(90) ~ 0, sin(90) = 1: purely imaginary injection.
        let rhs_re = mat.rhs()[1];
        assert!(rhs_re.abs() < 1e-12);
    }
}
