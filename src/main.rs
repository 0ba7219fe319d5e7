//! Netcalc - diagram calculation from the command line
//!
//! Reads a project JSON file, solves one of its diagrams and prints the solve
//! report as JSON.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=netcalc_core=debug netcalc project.json main
//! netcalc project.json main --apply > solved.json
//! ```

use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;

use netcalc_core::{
    diagram::{DiagramId, Project},
    error::Result,
    netlist::{BuildOptions, Diagnostic},
    solver::{self, Solution, SolverConfig, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE},
};

/// Solve the values of a wired constraint diagram
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the project file (.json)
    #[arg(value_name = "PROJECT_FILE")]
    project_file: PathBuf,

    /// Id of the diagram to solve
    #[arg(value_name = "DIAGRAM_ID")]
    diagram: String,

    /// Maximum Newton-Raphson iterations
    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,

    /// Step-norm convergence tolerance
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    tolerance: f64,

    /// Keep each source's two terminals as separate unknowns
    #[arg(long)]
    no_fold_aliases: bool,

    /// Print the project with the results merged in instead of the report
    #[arg(long)]
    apply: bool,
}

/// Report printed on stdout.
#[derive(Serialize)]
struct Report<'a> {
    diagram: &'a DiagramId,
    nets: usize,
    diagnostics: Vec<String>,
    #[serde(flatten)]
    solution: &'a Solution,
}

fn describe(diagnostics: &[Diagnostic]) -> Vec<String> {
    diagnostics.iter().map(ToString::to_string).collect()
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Load the project
    let mut project = Project::from_path(&args.project_file)?;
    let diagram = DiagramId::new(args.diagram);

    let options = BuildOptions::new().with_fold_aliases(!args.no_fold_aliases);
    let config = SolverConfig::new()
        .with_max_iterations(args.max_iterations)
        .with_tolerance(args.tolerance);

    // Build and solve
    let calculation = solver::calculate(&project, &diagram, &options, &config)?;

    if args.apply {
        if let Some(target) = project.diagram_mut(&diagram) {
            target.apply(&calculation.solution);
        }
        println!("{}", project.to_json()?);
    } else {
        let report = Report {
            diagram: &diagram,
            nets: calculation.netlist.nets.len(),
            diagnostics: describe(&calculation.netlist.diagnostics),
            solution: &calculation.solution,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
