//! Device models and circuit topology for the nodal simulator.
//!
//! Provides:
//! - Passive elements: R, C, L
//! - Independent sources: V, I with DC/SIN/PULSE/PWL waveforms
//! - Nonlinear devices: diode, BJT, MOSFET (levels 1-3)
//! - Magnetics: Jiles-Atherton cores, windings, and K couplings
//! - [`Circuit`]: topology construction and stamp orchestration

pub mod bjt;
pub mod circuit;
pub mod device;
pub mod diode;
pub mod error;
pub mod magnetic;
pub mod mosfet;
pub mod mutual;
pub mod passive;
pub mod sources;
pub mod waveforms;

pub use circuit::Circuit;
pub use device::{Device, NonLinear, TimeDependent};
pub use error::{Error, Result};
pub use waveforms::Waveform;
