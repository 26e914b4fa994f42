//! Core MNA matrix kernel and circuit data model for the nodal simulator.
//!
//! This crate holds the pieces every other layer builds on:
//!
//! - [`CircuitMatrix`](matrix::CircuitMatrix) - the `Ax = b` system with
//!   1-based row indexing (index 0 is the ground sentinel), incremental
//!   fill-in during stamping, and LU factor/solve.
//! - [`CircuitStatus`](status::CircuitStatus) - the per-solve snapshot
//!   (analysis mode, time step, gmin, integration method, temperature,
//!   frequency) handed to every stamp call.
//! - [`Element`](element::Element) / [`ModelCard`](element::ModelCard) -
//!   parser output consumed by the topology stage.
//! - Integration coefficient tables and engineering-unit helpers.
//!
//! # Modified Nodal Analysis
//!
//! The system contains one KCL row per non-ground node followed by one
//! branch row per voltage source and per linear inductor. A two-terminal
//! conductance `G` between nodes `n1`, `n2` stamps the four-corner pattern
//! `A[n1,n1]+=G; A[n1,n2]-=G; A[n2,n1]-=G; A[n2,n2]+=G` with ground rows
//! omitted.

pub mod element;
pub mod error;
pub mod integrator;
pub mod matrix;
pub mod status;
pub mod units;

pub use element::{Element, ElementKind, ModelCard, ModelKind, SourceSpec, is_ground_name};
pub use error::{Error, Result};
pub use matrix::CircuitMatrix;
pub use status::{AnalysisMode, CircuitStatus, IntegPhase, IntegrationMethod};

/// Elementary charge (C).
pub const CHARGE: f64 = 1.602176634e-19;
/// Boltzmann constant (J/K).
pub const BOLTZMANN: f64 = 1.380649e-23;
/// 0 degrees Celsius in Kelvin.
pub const KELVIN: f64 = 273.15;

/// Thermal voltage kT/q at the given temperature, clamped to room
/// temperature for non-positive inputs.
pub fn thermal_voltage(temp_k: f64) -> f64 {
    let t = if temp_k <= 0.0 { 300.15 } else { temp_k };
    BOLTZMANN * t / CHARGE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thermal_voltage() {
        // ~25.85 mV at 27C
        let vt = thermal_voltage(300.15);
        assert!((vt - 0.02585).abs() < 1e-4);
        // Non-positive temperature falls back to room temperature
        assert_eq!(thermal_voltage(0.0), thermal_voltage(300.15));
    }
}
