//! Equation assembly.

use std::collections::BTreeMap;

use crate::netlist::CalcNode;

/// Collects the equations nodes contribute for one iterate.
pub struct EquationSink<'a> {
    values: &'a [f64],
    jacobian: &'a mut Vec<f64>,
    residuals: &'a mut Vec<f64>,
}

impl<'a> EquationSink<'a> {
    fn new(values: &'a [f64], jacobian: &'a mut Vec<f64>, residuals: &'a mut Vec<f64>) -> Self {
        Self {
            values,
            jacobian,
            residuals,
        }
    }

    /// Add one equation.
    ///
    /// `equation` receives the net values and a zeroed Jacobian row (one
    /// entry per net), fills in the partial derivatives of its constraint and
    /// returns the constraint's residual.
    pub fn add_equation<F>(&mut self, equation: F)
    where
        F: FnOnce(&[f64], &mut [f64]) -> f64,
    {
        let start = self.jacobian.len();
        self.jacobian.resize(start + self.values.len(), 0.0);
        let residual = equation(self.values, &mut self.jacobian[start..]);
        self.residuals.push(residual);
    }
}

/// The Jacobian and residual of every equation at one iterate.
#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    /// Row-major, `equations() × unknowns`
    jacobian: Vec<f64>,
    pub residuals: Vec<f64>,
    pub unknowns: usize,
}

impl Assembly {
    /// Number of equations contributed.
    pub fn equations(&self) -> usize {
        self.residuals.len()
    }

    pub fn is_square(&self) -> bool {
        self.equations() == self.unknowns
    }

    /// Jacobian entry at (row, col).
    pub fn jacobian(&self, row: usize, col: usize) -> f64 {
        self.jacobian[row * self.unknowns + col]
    }

    /// All Jacobian entries, row-major.
    pub fn jacobian_values(&self) -> &[f64] {
        &self.jacobian
    }

    /// Euclidean norm of the residual vector.
    pub fn residual_norm(&self) -> f64 {
        norm(&self.residuals)
    }

    /// Check that no residual or derivative is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.residuals.iter().chain(&self.jacobian).all(|v| v.is_finite())
    }
}

/// Run every node's equation contribution at `values`.
///
/// Nodes are visited in map order, so row order is stable across iterations.
pub fn assemble(nodes: &BTreeMap<String, CalcNode>, values: &[f64]) -> Assembly {
    let mut jacobian = Vec::new();
    let mut residuals = Vec::new();
    {
        let mut sink = EquationSink::new(values, &mut jacobian, &mut residuals);
        for node in nodes.values() {
            node.data.contribute_equations(node, &mut sink);
        }
    }

    Assembly {
        jacobian,
        residuals,
        unknowns: values.len(),
    }
}

/// Euclidean norm.
pub fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}
