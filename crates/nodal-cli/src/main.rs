//! Nodal command-line interface.

mod output;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use nodal_devices::Circuit;
use nodal_parser::{parse, AcSweepKind, AnalysisCommand, Deck};
use nodal_solver::{
    AcAnalysis, AcSweepType, DcSweep, OperatingPoint, ResultSet, SweepSpec, Transient,
};

use output::print_results;

#[derive(Parser)]
#[command(name = "nodal")]
#[command(about = "A SPICE-style analog circuit simulator", long_about = None)]
#[command(version)]
struct Cli {
    /// Input netlist file
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let content = fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read netlist: {}", cli.input.display()))?;
    let deck = parse(&content).map_err(|e| anyhow::anyhow!("parse error: {e}"))?;

    if cli.verbose {
        eprintln!("circuit: {}", deck.title);
        eprintln!("elements: {}", deck.elements.len());
        eprintln!("models: {}", deck.models.len());
        eprintln!("analyses: {}", deck.analyses.len());
    }

    run_simulation(&deck)
}

fn run_simulation(deck: &Deck) -> Result<()> {
    let mut circuit = Circuit::build(&deck.title, &deck.elements, &deck.models, deck.wants_ac())
        .map_err(|e| anyhow::anyhow!("building circuit: {e}"))?;

    // Default to an operating point when the netlist requests nothing.
    if deck.analyses.is_empty() {
        let results = OperatingPoint::new()
            .run(&mut circuit)
            .map_err(|e| anyhow::anyhow!("operating point: {e}"))?;
        print_results("Operating Point", &results);
        return Ok(());
    }

    for analysis in &deck.analyses {
        let (label, results) = run_analysis(&mut circuit, analysis)?;
        print_results(label, &results);
    }
    Ok(())
}

fn run_analysis(
    circuit: &mut Circuit,
    analysis: &AnalysisCommand,
) -> Result<(&'static str, ResultSet)> {
    match analysis {
        AnalysisCommand::Op => {
            let results = OperatingPoint::new()
                .run(circuit)
                .map_err(|e| anyhow::anyhow!("operating point: {e}"))?;
            Ok(("Operating Point", results))
        }
        AnalysisCommand::Dc { sweeps } => {
            let specs = sweeps
                .iter()
                .map(|s| SweepSpec {
                    source: s.source.clone(),
                    start: s.start,
                    stop: s.stop,
                    step: s.step,
                })
                .collect();
            let results = DcSweep::new(specs)
                .run(circuit)
                .map_err(|e| anyhow::anyhow!("dc sweep: {e}"))?;
            Ok(("DC Sweep", results))
        }
        AnalysisCommand::Ac {
            sweep,
            num_points,
            fstart,
            fstop,
        } => {
            let sweep_type = match sweep {
                AcSweepKind::Dec => AcSweepType::Decade,
                AcSweepKind::Oct => AcSweepType::Octave,
                AcSweepKind::Lin => AcSweepType::Linear,
            };
            let results = AcAnalysis::new(sweep_type, *num_points, *fstart, *fstop)
                .run(circuit)
                .map_err(|e| anyhow::anyhow!("ac analysis: {e}"))?;
            Ok(("AC Analysis", results))
        }
        AnalysisCommand::Tran {
            tstep,
            tstop,
            tstart,
            tmax,
            uic,
        } => {
            let mut tran = Transient::new(*tstep, *tstop);
            tran.tstart = *tstart;
            tran.tmax = *tmax;
            tran.uic = *uic;
            let results = tran
                .run(circuit)
                .map_err(|e| anyhow::anyhow!("transient: {e}"))?;
            Ok(("Transient Analysis", results))
        }
    }
}
