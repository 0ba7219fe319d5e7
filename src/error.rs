//! Error types for the netcalc calculation engine.
//!
//! This module provides a unified error type [`CalcError`] that covers the
//! error conditions that can occur while resolving a diagram and solving its
//! constraint system. Topology problems found while flattening a diagram are
//! not errors: they are recovered locally and reported as
//! [`Diagnostic`](crate::netlist::Diagnostic)s.

use thiserror::Error;

/// Result type alias using [`CalcError`].
pub type Result<T> = std::result::Result<T, CalcError>;

/// Unified error type for all netcalc operations.
#[derive(Error, Debug)]
pub enum CalcError {
    // ============ Lookup Errors ============
    /// Diagram not found in the project
    #[error("Diagram '{id}' not found in project")]
    DiagramNotFound { id: String },

    // ============ Solve Errors ============
    /// The assembled system is not square
    #[error("System has {equations} equations for {unknowns} unknowns - diagram is over- or under-determined")]
    ShapeMismatch { equations: usize, unknowns: usize },

    /// Jacobian is singular and cannot be solved
    #[error("Singular Jacobian at iteration {iteration} - some values are not determined by the diagram")]
    SingularJacobian { iteration: usize },

    /// Residual or iterate became NaN or infinite
    #[error("Non-finite value in residual at iteration {iteration}")]
    NonFiniteResidual { iteration: usize },

    // ============ I/O Errors ============
    /// Error reading a project file
    #[error("Failed to read project file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed project or report JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ============ WASM Errors ============
    /// WASM-specific error
    #[cfg(feature = "wasm")]
    #[error("WASM error: {message}")]
    WasmError { message: String },
}

impl CalcError {
    /// Create a diagram lookup error
    pub fn diagram_not_found(id: impl Into<String>) -> Self {
        Self::DiagramNotFound { id: id.into() }
    }

    /// Create a shape mismatch error
    pub fn shape_mismatch(equations: usize, unknowns: usize) -> Self {
        Self::ShapeMismatch {
            equations,
            unknowns,
        }
    }

    /// Whether the failure comes from the shape or conditioning of the
    /// equation system rather than from I/O or lookup.
    pub fn is_system_failure(&self) -> bool {
        matches!(
            self,
            Self::ShapeMismatch { .. }
                | Self::SingularJacobian { .. }
                | Self::NonFiniteResidual { .. }
        )
    }
}
