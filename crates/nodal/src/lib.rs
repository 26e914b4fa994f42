//! Umbrella crate for the nodal circuit simulator.
//!
//! Re-exports the public API of the member crates:
//!
//! - [`core`] - MNA matrix kernel, circuit status, elements, units
//! - [`devices`] - device models and circuit topology
//! - [`solver`] - OP, DC sweep, AC, and transient analyses
//! - [`parser`] - netlist text parsing
//!
//! # Example
//!
//! ```rust
//! use nodal::devices::Circuit;
//! use nodal::parser::parse;
//! use nodal::solver::OperatingPoint;
//!
//! let deck = parse(
//!     "divider\n\
//!      V1 1 0 DC 10\n\
//!      R1 1 2 1k\n\
//!      R2 2 0 1k\n\
//!      .op\n",
//! )
//! .unwrap();
//!
//! let mut circuit = Circuit::build(&deck.title, &deck.elements, &deck.models, false).unwrap();
//! let results = OperatingPoint::new().run(&mut circuit).unwrap();
//! assert!((results.get("V(2)").unwrap()[0] - 5.0).abs() < 1e-9);
//! ```

pub use nodal_core as core;
pub use nodal_devices as devices;
pub use nodal_parser as parser;
pub use nodal_solver as solver;
