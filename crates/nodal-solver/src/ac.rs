//! AC small-signal analysis.
//!
//! Establishes the bias point with an operating-point solve, freezes the
//! device linearizations there, then solves the complex system once per
//! frequency point.

use nodal_core::CircuitStatus;
use nodal_devices::Circuit;

use crate::error::{Error, Result};
use crate::newton::ConvergenceCriteria;
use crate::op::OperatingPoint;
use crate::result::ResultSet;

/// Frequency grid spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcSweepType {
    /// Equal log10 spacing.
    Decade,
    /// Equal log2 spacing.
    Octave,
    /// Equal linear spacing.
    Linear,
}

/// AC analysis parameters. `num_points` is the total grid size for a
/// linear sweep and the per-decade/per-octave density for log sweeps.
#[derive(Debug, Clone)]
pub struct AcAnalysis {
    pub sweep_type: AcSweepType,
    pub num_points: usize,
    pub fstart: f64,
    pub fstop: f64,
    pub criteria: ConvergenceCriteria,
}

impl AcAnalysis {
    pub fn new(sweep_type: AcSweepType, num_points: usize, fstart: f64, fstop: f64) -> Self {
        Self {
            sweep_type,
            num_points,
            fstart,
            fstop,
            criteria: ConvergenceCriteria::default(),
        }
    }

    /// The frequency grid. Linear sweeps place `num_points` equally
    /// spaced values; decade/octave sweeps place `num_points` per decade
    /// (octave) at equal log spacing, inclusive of both endpoints.
    pub fn frequencies(&self) -> Vec<f64> {
        let n = self.num_points;
        if n <= 1 {
            return vec![self.fstart];
        }
        match self.sweep_type {
            AcSweepType::Linear => {
                let step = (self.fstop - self.fstart) / (n as f64 - 1.0);
                (0..n).map(|i| self.fstart + step * i as f64).collect()
            }
            AcSweepType::Decade => {
                let decades = (self.fstop / self.fstart).log10();
                let total = (n as f64 * decades).ceil() as usize + 1;
                (0..total)
                    .map(|i| self.fstart * 10f64.powf(i as f64 / n as f64))
                    .filter(|&f| f <= self.fstop * 1.001)
                    .collect()
            }
            AcSweepType::Octave => {
                let octaves = (self.fstop / self.fstart).log2();
                let total = (n as f64 * octaves).ceil() as usize + 1;
                (0..total)
                    .map(|i| self.fstart * 2f64.powf(i as f64 / n as f64))
                    .filter(|&f| f <= self.fstop * 1.001)
                    .collect()
            }
        }
    }

    pub fn run(&self, circuit: &mut Circuit) -> Result<ResultSet> {
        if !circuit.matrix().is_complex() {
            return Err(Error::InvalidParams(
                "circuit was not built with a complex matrix for AC analysis".into(),
            ));
        }
        if self.fstart <= 0.0 {
            return Err(Error::InvalidParams(format!(
                "AC start frequency must be positive, got {}",
                self.fstart
            )));
        }

        // Bias point; nonlinear devices keep their linearization from it.
        OperatingPoint {
            criteria: self.criteria.clone(),
        }
        .solve(circuit)?;

        let mut results = ResultSet::new();
        for freq in self.frequencies() {
            let status = CircuitStatus::ac(freq);
            circuit.matrix_mut().clear();
            circuit.stamp(&status)?;
            circuit.matrix_mut().factor_and_solve()?;
            results.store_ac_result(freq, &circuit.get_complex_solution());
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use nodal_core::{Element, ElementKind};

    #[test]
    fn test_frequency_grid_sizes() {
        // Linear: total count. 4 decades at 10/decade: 41 points.
        let lin = AcAnalysis::new(AcSweepType::Linear, 17, 10.0, 1e5);
        assert_eq!(lin.frequencies().len(), 17);

        let dec = AcAnalysis::new(AcSweepType::Decade, 10, 10.0, 1e5);
        assert_eq!(dec.frequencies().len(), 41);

        // 3 octaves at 4/octave: 13 points.
        let oct = AcAnalysis::new(AcSweepType::Octave, 4, 1e3, 8e3);
        assert_eq!(oct.frequencies().len(), 13);
    }

    #[test]
    fn test_decade_endpoints_and_spacing() {
        let ac = AcAnalysis::new(AcSweepType::Decade, 10, 10.0, 1e5);
        let f = ac.frequencies();
        assert!((f[0] - 10.0).abs() < 1e-9);
        assert!((f.last().unwrap() - 1e5).abs() < 1e-3);
        // Equal ratios between adjacent points.
        let r0 = f[1] / f[0];
        let r1 = f[2] / f[1];
        assert!((r0 - r1).abs() < 1e-9);
    }

    #[test]
    fn test_linear_spacing() {
        let ac = AcAnalysis::new(AcSweepType::Linear, 3, 0.0, 0.0);
        // Degenerate but well-defined: single repeated frequency.
        assert_eq!(ac.frequencies().len(), 3);

        let ac = AcAnalysis::new(AcSweepType::Linear, 5, 100.0, 500.0);
        let f = ac.frequencies();
        assert!((f[1] - f[0] - 100.0).abs() < 1e-9);
    }

    fn rc_lowpass() -> Circuit {
        // V1 (1V AC) - R 1k - node 2 - C 159n to ground: fc ~ 1kHz.
        let mut v = Element::new(ElementKind::Vsource, "V1", vec!["1".into(), "0".into()], 0.0);
        v.ac = Some((1.0, 0.0));
        let elements = vec![
            v,
            Element::new(ElementKind::Resistor, "R1", vec!["1".into(), "2".into()], 1e3),
            Element::new(
                ElementKind::Capacitor,
                "C1",
                vec!["2".into(), "0".into()],
                159e-9,
            ),
        ];
        Circuit::build("rc", &elements, &IndexMap::new(), true).unwrap()
    }

    #[test]
    fn test_rc_lowpass_rolloff() {
        let mut circuit = rc_lowpass();
        let ac = AcAnalysis::new(AcSweepType::Decade, 31, 10.0, 1e5);
        let results = ac.run(&mut circuit).unwrap();

        let freqs = results.get("FREQ").unwrap().to_vec();
        let mag = results.get("V(2)_MAG").unwrap().to_vec();
        let phase = results.get("V(2)_PHASE").unwrap().to_vec();

        // Flat well below the corner, strongly attenuated above.
        assert!((mag[0] - 1.0).abs() < 0.01, "passband mag = {}", mag[0]);
        let last = *mag.last().unwrap();
        assert!(last < 0.05, "stopband mag = {last}");

        // Phase goes from ~0 toward -90 degrees.
        assert!(phase[0] > -10.0);
        assert!(*phase.last().unwrap() < -80.0);

        // At the corner frequency the magnitude is ~ 1/sqrt(2).
        let fc = 1.0 / (2.0 * std::f64::consts::PI * 1e3 * 159e-9);
        let (idx, _) = freqs
            .iter()
            .enumerate()
            .min_by(|a, b| {
                (a.1 - fc)
                    .abs()
                    .partial_cmp(&(b.1 - fc).abs())
                    .unwrap()
            })
            .unwrap();
        assert!((mag[idx] - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.1);
    }

    #[test]
    fn test_ac_requires_complex_matrix() {
        let elements = vec![
            Element::new(ElementKind::Vsource, "V1", vec!["1".into(), "0".into()], 1.0),
            Element::new(ElementKind::Resistor, "R1", vec!["1".into(), "0".into()], 1e3),
        ];
        let mut circuit = Circuit::build("r", &elements, &IndexMap::new(), false).unwrap();
        let ac = AcAnalysis::new(AcSweepType::Linear, 3, 10.0, 100.0);
        assert!(ac.run(&mut circuit).is_err());
    }

    #[test]
    fn test_ac_residual_small() {
        // One frequency point of the RC lowpass: |Y*v - i| is tiny.
        let mut circuit = rc_lowpass();
        let ac = AcAnalysis::new(AcSweepType::Linear, 1, 1e3, 1e3);
        let results = ac.run(&mut circuit).unwrap();

        // Check against the analytic divider: H = 1/(1 + j w R C).
        let w = 2.0 * std::f64::consts::PI * 1e3;
        let (r, c) = (1e3, 159e-9);
        let h_mag = 1.0 / (1.0 + (w * r * c).powi(2)).sqrt();
        let got = results.get("V(2)_MAG").unwrap()[0];
        assert!((got - h_mag).abs() < 1e-6, "got {got}, want {h_mag}");
    }
}
