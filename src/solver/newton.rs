//! Damped Newton-Raphson iteration.

use std::collections::BTreeMap;

use serde::Serialize;

use super::assembler::{assemble, norm, Assembly};
use super::dense::DenseSystem;
use super::{
    DEFAULT_DAMPING_BACKOFF, DEFAULT_MAX_ITERATIONS, DEFAULT_MIN_DAMPING, DEFAULT_STALL_RATIO,
    DEFAULT_TOLERANCE,
};
use crate::error::{CalcError, Result};
use crate::netlist::CalcNode;

/// Configuration for the solver.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Iteration cap before the solve is aborted.
    pub max_iterations: usize,
    /// Step norm below which the solve has converged.
    pub tolerance: f64,
    /// A residual norm not below `stall_ratio` times the previous one counts
    /// as a stall.
    pub stall_ratio: f64,
    /// Factor applied to the damping on a stall.
    pub damping_backoff: f64,
    /// Damping below which the solve is aborted.
    pub min_damping: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            stall_ratio: DEFAULT_STALL_RATIO,
            damping_backoff: DEFAULT_DAMPING_BACKOFF,
            min_damping: DEFAULT_MIN_DAMPING,
        }
    }
}

impl SolverConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the step-norm convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the damping backoff factor and the damping floor.
    pub fn with_damping(mut self, backoff: f64, min_damping: f64) -> Self {
        self.damping_backoff = backoff;
        self.min_damping = min_damping;
        self
    }
}

/// Why a solve stopped without converging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// Damping shrank below the floor
    DampingExhausted,
    /// Iteration cap reached
    IterationLimit,
}

/// Terminal state of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Converged,
    /// Stopped early; the last iterate is still applied
    Aborted(AbortReason),
}

impl SolveStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, SolveStatus::Converged)
    }
}

/// Final iterate and bookkeeping of a Newton run.
#[derive(Debug, Clone)]
pub struct NewtonResult {
    pub values: Vec<f64>,
    pub status: SolveStatus,
    pub iterations: usize,
    pub residual_norm: f64,
    pub step_norm: f64,
    pub damping: f64,
}

/// Newton-Raphson solver with residual-driven step damping.
#[derive(Debug, Clone, Default)]
pub struct NewtonRaphson {
    config: SolverConfig,
}

impl NewtonRaphson {
    /// Create a solver with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a solver with custom configuration.
    pub fn with_config(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Drive the residual of `nodes`' equations to zero starting from
    /// `initial`.
    ///
    /// Shape, singularity and non-finite failures are errors. Running out of
    /// iterations or damping is not: the last iterate is returned with an
    /// [`SolveStatus::Aborted`] status.
    pub fn solve(
        &self,
        nodes: &BTreeMap<String, CalcNode>,
        initial: &[f64],
    ) -> Result<NewtonResult> {
        let n = initial.len();
        let mut x = initial.to_vec();

        let mut assembly = assemble(nodes, &x);
        check_assembly(&assembly, 0)?;

        let mut previous = assembly.residual_norm();
        let mut damping = 1.0;

        if n == 0 {
            return Ok(NewtonResult {
                values: x,
                status: SolveStatus::Converged,
                iterations: 0,
                residual_norm: previous,
                step_norm: 0.0,
                damping,
            });
        }

        let mut system = DenseSystem::new(n);

        for iter in 0..self.config.max_iterations {
            let _span = tracing::debug_span!("newton_iter", iter).entered();

            system.load_newton_step(&assembly);
            system
                .factor()
                .map_err(|_| CalcError::SingularJacobian { iteration: iter })?;
            system.solve();

            let step_norm = norm(&system.x);
            for (xi, di) in x.iter_mut().zip(&system.x) {
                *xi += damping * di;
            }
            if x.iter().any(|v| !v.is_finite()) {
                return Err(CalcError::NonFiniteResidual { iteration: iter });
            }

            assembly = assemble(nodes, &x);
            check_assembly(&assembly, iter)?;
            let residual_norm = assembly.residual_norm();

            tracing::debug!(step_norm, residual_norm, damping, "newton step");

            if step_norm < self.config.tolerance {
                tracing::debug!(iterations = iter + 1, "Newton converged");
                return Ok(NewtonResult {
                    values: x,
                    status: SolveStatus::Converged,
                    iterations: iter + 1,
                    residual_norm,
                    step_norm,
                    damping,
                });
            }

            if residual_norm >= self.config.stall_ratio * previous {
                damping *= self.config.damping_backoff;
                tracing::debug!(damping, "residual stalled, backing off");
                if damping < self.config.min_damping {
                    return Ok(NewtonResult {
                        values: x,
                        status: SolveStatus::Aborted(AbortReason::DampingExhausted),
                        iterations: iter + 1,
                        residual_norm,
                        step_norm,
                        damping,
                    });
                }
            }
            previous = residual_norm;
        }

        Ok(NewtonResult {
            residual_norm: assembly.residual_norm(),
            values: x,
            status: SolveStatus::Aborted(AbortReason::IterationLimit),
            iterations: self.config.max_iterations,
            step_norm: norm(&system.x),
            damping,
        })
    }
}

fn check_assembly(assembly: &Assembly, iteration: usize) -> Result<()> {
    if !assembly.is_square() {
        return Err(CalcError::shape_mismatch(assembly.equations(), assembly.unknowns));
    }
    if !assembly.is_finite() {
        return Err(CalcError::NonFiniteResidual { iteration });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::behavior::NodeData;
    use crate::netlist::NetId;

    fn calc(id: &str, data: NodeData, ports: &[(&str, usize)]) -> (String, CalcNode) {
        let mut node = CalcNode::new(id, id, "", data);
        for (port, net) in ports {
            node.ports.insert(port.to_string(), NetId(*net));
        }
        (id.to_string(), node)
    }

    /// x * x = c with c pinned.
    fn square_root_of(c: f64) -> BTreeMap<String, CalcNode> {
        BTreeMap::from([
            calc("c", NodeData::locked_source(c), &[("value", 1)]),
            calc(
                "p",
                NodeData::product(["t0", "t1"], ["b0"]),
                &[("t0", 0), ("t1", 0), ("b0", 1)],
            ),
        ])
    }

    #[test]
    fn test_linear_system_converges_in_two_steps() {
        let nodes = BTreeMap::from([
            calc("a", NodeData::locked_source(3.0), &[("value", 0)]),
            calc("b", NodeData::locked_source(4.0), &[("value", 1)]),
            calc(
                "s",
                NodeData::summation(["t0", "t1"], ["b0"]),
                &[("t0", 0), ("t1", 1), ("b0", 2)],
            ),
        ]);
        let result = NewtonRaphson::new().solve(&nodes, &[1.0, 1.0, 1.0]).unwrap();

        assert_eq!(result.status, SolveStatus::Converged);
        assert_eq!(result.iterations, 2);
        assert_abs_diff_eq!(result.values[2], 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result.damping, 1.0);
    }

    #[test]
    fn test_nonlinear_converges() {
        let result = NewtonRaphson::new().solve(&square_root_of(2.0), &[1.0, 2.0]).unwrap();

        assert!(result.status.is_converged());
        assert_abs_diff_eq!(result.values[0], 2.0f64.sqrt(), epsilon = 1e-10);
        assert!(result.residual_norm < 1e-12);
    }

    #[test]
    fn test_converged_start_takes_one_iteration() {
        let start = [2.0f64.sqrt(), 2.0];
        let first = NewtonRaphson::new().solve(&square_root_of(2.0), &start).unwrap();
        let again = NewtonRaphson::new()
            .solve(&square_root_of(2.0), &first.values)
            .unwrap();

        assert_eq!(again.iterations, 1);
        assert!(again.step_norm < DEFAULT_TOLERANCE);
        assert_abs_diff_eq!(again.damping, 1.0);
    }

    #[test]
    fn test_iteration_limit_aborts_with_last_iterate() {
        let config = SolverConfig::new().with_max_iterations(2).with_tolerance(0.0);
        let result = NewtonRaphson::with_config(config)
            .solve(&square_root_of(1e6), &[1.0, 1e6])
            .unwrap();

        assert_eq!(result.status, SolveStatus::Aborted(AbortReason::IterationLimit));
        assert_eq!(result.iterations, 2);
        // Moved toward the root
        assert!(result.values[0] > 1.0);
    }

    #[test]
    fn test_damping_exhaustion_aborts() {
        // Every step is a stall when the stall ratio is zero
        let mut config = SolverConfig::new().with_damping(0.5, 0.3);
        config.stall_ratio = 0.0;
        let result = NewtonRaphson::with_config(config)
            .solve(&square_root_of(9.0), &[1.0, 9.0])
            .unwrap();

        assert_eq!(result.status, SolveStatus::Aborted(AbortReason::DampingExhausted));
        assert_eq!(result.iterations, 2);
        assert_abs_diff_eq!(result.damping, 0.25);
    }

    #[test]
    fn test_shape_mismatch() {
        let nodes = BTreeMap::from([calc("a", NodeData::source(None), &[("value", 0)])]);
        let err = NewtonRaphson::new().solve(&nodes, &[1.0]).unwrap_err();
        assert!(matches!(err, CalcError::ShapeMismatch { equations: 0, unknowns: 1 }));
    }

    #[test]
    fn test_singular_jacobian() {
        // Two equations on net 0, nothing on net 1
        let nodes = BTreeMap::from([
            calc("a", NodeData::locked_source(1.0), &[("value", 0)]),
            calc("b", NodeData::locked_source(1.0), &[("value", 0)]),
            calc("c", NodeData::source(None), &[("value", 1)]),
        ]);
        let err = NewtonRaphson::new().solve(&nodes, &[1.0, 1.0]).unwrap_err();
        assert!(matches!(err, CalcError::SingularJacobian { iteration: 0 }));
    }

    #[test]
    fn test_empty_system_converges() {
        let result = NewtonRaphson::new().solve(&BTreeMap::new(), &[]).unwrap();
        assert!(result.status.is_converged());
        assert_eq!(result.iterations, 0);
    }
}
