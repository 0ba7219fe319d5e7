//! # Netcalc Core
//!
//! The calculation engine behind a visual editor for wired constraint
//! diagrams.
//!
//! This library provides:
//! - A diagram model of typed nodes (sources, summations, products and
//!   references to other diagrams) connected by wires
//! - A net builder that flattens nested diagram references into one network
//!   of scalar unknowns
//! - A damped Newton-Raphson solver that finds the value of every unknown and
//!   writes the results back into node data
//!
//! ## Architecture
//!
//! - [`diagram`] - Projects, diagrams, node instances and edges
//! - [`behavior`] - Per-node-type equations and result finalization
//! - [`netlist`] - Flattening and equivalence-class construction
//! - [`solver`] - Equation assembly, dense LU and the Newton loop
//!
//! ## Usage
//!
//! ```
//! use netcalc_core::behavior::{NodeData, VALUE_PORT};
//! use netcalc_core::diagram::{Diagram, Position, Project};
//! use netcalc_core::{netlist, solver};
//!
//! let mut d = Diagram::new("main", "Main");
//! d.add_node("x", Position::default(), NodeData::source(None))
//!     .add_node("two", Position::default(), NodeData::locked_source(2.0))
//!     .add_node("sum", Position::default(), NodeData::summation(["t0"], ["b0"]))
//!     .connect("two", VALUE_PORT, "sum", "t0")
//!     .connect("sum", "b0", "x", VALUE_PORT);
//!
//! let mut built = netlist::build(&Project::new(), &d);
//! let solution = solver::solve(&mut built.nodes, &mut built.nets).unwrap();
//! assert!(solution.is_converged());
//! d.apply(&solution);
//! ```
//!
//! ### Native CLI
//!
//! ```bash
//! netcalc project.json main > report.json
//! ```

pub mod behavior;
pub mod diagram;
pub mod error;
pub mod netlist;
pub mod solver;

// Re-export main types for convenience
pub use diagram::{Diagram, DiagramId, Project};
pub use error::{CalcError, Result};
pub use netlist::{build, Netlist};
pub use solver::{calculate, solve, Solution, SolverConfig};

// WASM bindings
#[cfg(feature = "wasm")]
mod wasm;

#[cfg(feature = "wasm")]
pub use wasm::WasmProject;
