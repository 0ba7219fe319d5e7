//! Diagram references.

use serde::{Deserialize, Serialize};

use super::Behavior;
use crate::diagram::{DiagramId, Project};
use crate::netlist::{CalcNode, Net};
use crate::solver::EquationSink;

/// A node that inlines another diagram.
///
/// Its ports are the connection ports of the referenced diagram. The `left`
/// and `right` lists are the last exported port layout, kept for the editor;
/// the net builder always resolves ports from the referenced diagram itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub diagram: DiagramId,
    #[serde(default)]
    pub left: Vec<String>,
    #[serde(default)]
    pub right: Vec<String>,
}

impl ReferenceData {
    pub fn new(diagram: impl Into<DiagramId>) -> Self {
        Self {
            diagram: diagram.into(),
            left: Vec::new(),
            right: Vec::new(),
        }
    }

    /// Refresh the exported port lists from the referenced diagram.
    ///
    /// Returns true if the lists changed. A missing target clears them.
    pub fn sync_ports(&mut self, project: &Project) -> bool {
        let ports = project.connection_ports(&self.diagram).unwrap_or_default();
        if ports.left == self.left && ports.right == self.right {
            return false;
        }
        self.left = ports.left;
        self.right = ports.right;
        true
    }
}

impl Behavior for ReferenceData {
    fn declares_port(&self, port: &str) -> bool {
        self.left.iter().chain(&self.right).any(|p| p == port)
    }

    fn contribute_equations(&self, _node: &CalcNode, _sink: &mut EquationSink<'_>) {}

    fn finish_calculation(&self, _node: &CalcNode, _nets: &[Net]) -> Self {
        self.clone()
    }
}
