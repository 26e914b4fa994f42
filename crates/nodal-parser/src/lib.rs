//! SPICE netlist parser for the nodal simulator.
//!
//! Accepts the classic deck format: a title line, `*` comments, `+`
//! continuations, element lines keyed by their leading character
//! (`R L C K D Q M V I`), `.model` cards, and the analysis commands
//! `.op`, `.tran`, `.ac`, `.dc`. Values carry engineering suffixes
//! (`T G meg K m u n p f`, trailing `s` tolerated).
//!
//! The output is a [`Deck`]: an ordered element list, a model registry,
//! and the requested analyses - exactly what the topology stage consumes.

pub mod error;
pub mod lexer;
pub mod parser;

pub use error::{Error, Result};
pub use parser::{parse, AcSweepKind, AnalysisCommand, Deck, DcSweepCommand};
