//! Nonlinear constraint solver.
//!
//! This module provides the numerical engine that turns a [`Netlist`] into
//! values.
//!
//! ## Damped Newton-Raphson
//!
//! Every node contributes zero or more equations `fᵢ(x) = 0` over the net
//! values `x`. Each iteration:
//!
//! 1. Assemble the Jacobian `J` and residual `r` at `x`
//! 2. Solve `J·δ = −r`
//! 3. Step `x ← x + α·δ`, starting with `α = 1`
//! 4. If the residual norm did not drop below 0.99× its previous value,
//!    shrink `α` by 0.9
//!
//! The solve converges when `‖δ‖` falls below the tolerance and aborts when
//! `α` drops below 0.1 or the iteration cap is reached. An aborted solve still
//! applies its last iterate; a non-square, singular or non-finite system
//! fails and applies nothing.
//!
//! [`Netlist`]: crate::netlist::Netlist

mod assembler;
mod calculation;
mod dense;
mod newton;

pub use assembler::{assemble, Assembly, EquationSink};
pub use calculation::{calculate, solve, solve_with, Calculation, Solution};
pub use dense::{DenseSystem, SingularMatrix};
pub use newton::{AbortReason, NewtonRaphson, NewtonResult, SolveStatus, SolverConfig};

/// Step norm below which the solve has converged.
pub const DEFAULT_TOLERANCE: f64 = 1e-8;

/// Maximum Newton-Raphson iterations per solve.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Residual ratio at or above which an iteration counts as stalled.
pub const DEFAULT_STALL_RATIO: f64 = 0.99;

/// Damping multiplier applied on a stall.
pub const DEFAULT_DAMPING_BACKOFF: f64 = 0.9;

/// Damping below which the solve is aborted.
pub const DEFAULT_MIN_DAMPING: f64 = 0.1;
