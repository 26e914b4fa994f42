//! Device capability traits and the tagged device variant.
//!
//! The stamping loop dispatches over [`Device`] variants directly;
//! capability accessors (`as_nonlinear`, `as_time_dependent`) let the
//! analyses filter devices without reflection.

use nodal_core::{CircuitMatrix, CircuitStatus};

use crate::bjt::Bjt;
use crate::diode::Diode;
use crate::error::Result;
use crate::magnetic::MagneticInductor;
use crate::mosfet::Mosfet;
use crate::mutual::Mutual;
use crate::passive::{Capacitor, Inductor, Resistor};
use crate::sources::{CurrentSource, VoltageSource};

/// Node voltage from a 1-based solution vector; ground reads 0.
pub fn node_voltage(solution: &[f64], node: usize) -> f64 {
    if node == 0 || node >= solution.len() {
        0.0
    } else {
        solution[node]
    }
}

/// Per-iteration voltage refresh for devices that are linearized anew at
/// each Newton step.
pub trait NonLinear {
    /// Pull the device's controlling voltages from the last accepted
    /// solution before the next stamp.
    fn update_voltages(&mut self, solution: &[f64]) -> Result<()>;
}

/// Lifecycle hooks for devices with time-dependent state.
pub trait TimeDependent {
    /// Capture the just-solved voltages/currents without promoting state;
    /// called after the Newton loop of a step, before LTE evaluation.
    fn load_state(&mut self, solution: &[f64], status: &CircuitStatus);

    /// Promote current state to previous after a step is accepted.
    fn update_state(&mut self, solution: &[f64], status: &CircuitStatus);

    /// Per-device local truncation error estimate for the current step.
    fn calculate_lte(&self, status: &CircuitStatus) -> f64;
}

/// Every device in a circuit, tagged by variant.
///
/// Mutual couplings and magnetic windings need context beyond the matrix
/// (resolved partner windings, the shared core), so the circuit stamps
/// them through dedicated paths; [`Device::stamp`] covers the rest.
#[derive(Debug)]
pub enum Device {
    Resistor(Resistor),
    Capacitor(Capacitor),
    Inductor(Inductor),
    Magnetic(MagneticInductor),
    Mutual(Mutual),
    Diode(Diode),
    Bjt(Bjt),
    Mosfet(Mosfet),
    Vsource(VoltageSource),
    Isource(CurrentSource),
}

impl Device {
    pub fn name(&self) -> &str {
        match self {
            Device::Resistor(d) => &d.name,
            Device::Capacitor(d) => &d.name,
            Device::Inductor(d) => &d.name,
            Device::Magnetic(d) => &d.name,
            Device::Mutual(d) => &d.name,
            Device::Diode(d) => &d.name,
            Device::Bjt(d) => &d.name,
            Device::Mosfet(d) => &d.name,
            Device::Vsource(d) => &d.name,
            Device::Isource(d) => &d.name,
        }
    }

    /// Terminal node indices (empty for K elements).
    pub fn nodes(&self) -> &[usize] {
        match self {
            Device::Resistor(d) => &d.nodes,
            Device::Capacitor(d) => &d.nodes,
            Device::Inductor(d) => &d.nodes,
            Device::Magnetic(d) => &d.nodes,
            Device::Mutual(_) => &[],
            Device::Diode(d) => &d.nodes,
            Device::Bjt(d) => &d.nodes,
            Device::Mosfet(d) => &d.nodes,
            Device::Vsource(d) => &d.nodes,
            Device::Isource(d) => &d.nodes,
        }
    }

    /// Branch row index for branch-augmented devices (V sources and
    /// linear inductors).
    pub fn branch_index(&self) -> Option<usize> {
        match self {
            Device::Inductor(d) => Some(d.branch),
            Device::Vsource(d) => Some(d.branch),
            _ => None,
        }
    }

    /// Stamp for every variant the circuit does not special-case.
    /// Mutual and magnetic devices go through the circuit's stamp pass.
    pub fn stamp(&mut self, mat: &mut CircuitMatrix, status: &CircuitStatus) -> Result<()> {
        match self {
            Device::Resistor(d) => d.stamp(mat, status),
            Device::Capacitor(d) => d.stamp(mat, status),
            Device::Inductor(d) => d.stamp(mat, status),
            Device::Diode(d) => d.stamp(mat, status),
            Device::Bjt(d) => d.stamp(mat, status),
            Device::Mosfet(d) => d.stamp(mat, status),
            Device::Vsource(d) => d.stamp(mat, status),
            Device::Isource(d) => d.stamp(mat, status),
            Device::Mutual(_) | Device::Magnetic(_) => Ok(()),
        }
    }

    pub fn is_nonlinear(&self) -> bool {
        matches!(self, Device::Diode(_) | Device::Bjt(_) | Device::Mosfet(_))
    }

    pub fn as_nonlinear(&mut self) -> Option<&mut dyn NonLinear> {
        match self {
            Device::Diode(d) => Some(d),
            Device::Bjt(d) => Some(d),
            Device::Mosfet(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_time_dependent(&mut self) -> Option<&mut dyn TimeDependent> {
        match self {
            Device::Capacitor(d) => Some(d),
            Device::Inductor(d) => Some(d),
            Device::Magnetic(d) => Some(d),
            Device::Diode(d) => Some(d),
            Device::Bjt(d) => Some(d),
            Device::Mosfet(d) => Some(d),
            _ => None,
        }
    }

    /// Read-only LTE access for the transient controller.
    pub fn lte(&self, status: &CircuitStatus) -> Option<f64> {
        match self {
            Device::Capacitor(d) => Some(d.calculate_lte(status)),
            Device::Inductor(d) => Some(d.calculate_lte(status)),
            Device::Magnetic(d) => Some(d.calculate_lte(status)),
            Device::Diode(d) => Some(d.calculate_lte(status)),
            Device::Bjt(d) => Some(d.calculate_lte(status)),
            Device::Mosfet(d) => Some(d.calculate_lte(status)),
            _ => None,
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, Device::Vsource(_) | Device::Isource(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveforms::Waveform;

    #[test]
    fn test_node_voltage_ground() {
        let solution = [0.0, 1.5, -2.0];
        assert_eq!(node_voltage(&solution, 0), 0.0);
        assert_eq!(node_voltage(&solution, 1), 1.5);
        assert_eq!(node_voltage(&solution, 2), -2.0);
        assert_eq!(node_voltage(&solution, 99), 0.0);
    }

    #[test]
    fn test_capability_filtering() {
        let mut r = Device::Resistor(Resistor::new("R1", [1, 0], 1e3));
        let mut c = Device::Capacitor(Capacitor::new("C1", [1, 0], 1e-6));
        let mut d = Device::Diode(Diode::new(
            "D1",
            [1, 0],
            crate::diode::DiodeParams::default(),
        ));

        assert!(r.as_nonlinear().is_none());
        assert!(r.as_time_dependent().is_none());
        assert!(c.as_nonlinear().is_none());
        assert!(c.as_time_dependent().is_some());
        assert!(d.as_nonlinear().is_some());
        assert!(d.as_time_dependent().is_some());
        assert!(d.is_nonlinear());
    }

    #[test]
    fn test_branch_index() {
        let v = Device::Vsource(VoltageSource::new("V1", [1, 0], Waveform::Dc(1.0), 7));
        let l = Device::Inductor(Inductor::new("L1", [1, 0], 1e-3, 8));
        let r = Device::Resistor(Resistor::new("R1", [1, 0], 1e3));
        assert_eq!(v.branch_index(), Some(7));
        assert_eq!(l.branch_index(), Some(8));
        assert_eq!(r.branch_index(), None);
    }
}
