//! Analysis engines for the nodal simulator.
//!
//! - [`OperatingPoint`] - DC bias with gmin and source stepping homotopies
//! - [`DcSweep`] - one or two swept sources over inclusive grids
//! - [`AcAnalysis`] - small-signal frequency response around the bias point
//! - [`Transient`] - adaptive time-domain integration with LTE control
//!
//! All analyses operate on a [`nodal_devices::Circuit`] and publish their
//! results as a [`ResultSet`] keyed by variable name.

pub mod ac;
pub mod dc;
pub mod error;
pub mod newton;
pub mod op;
pub mod result;
pub mod transient;

pub use ac::{AcAnalysis, AcSweepType};
pub use dc::{DcSweep, SweepSpec};
pub use error::{Error, Result};
pub use newton::{
    solve_newton, solve_with_gmin_stepping, solve_with_source_stepping, ConvergenceCriteria,
    NewtonResult,
};
pub use op::OperatingPoint;
pub use result::ResultSet;
pub use transient::Transient;
