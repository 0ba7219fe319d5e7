//! Diagram and project structures.

use serde::{Deserialize, Serialize};

use super::types::{ConnectionPorts, DiagramId, Edge, Endpoint, Position};
use crate::behavior::NodeData;
use crate::error::{CalcError, Result};
use crate::solver::Solution;

/// One placed node of a given behavior type within a diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInstance {
    /// Node id, unique within its diagram
    pub id: String,
    /// Canvas position
    #[serde(default)]
    pub position: Position,
    /// Behavior tag and payload
    pub data: NodeData,
}

impl NodeInstance {
    pub fn new(id: impl Into<String>, position: Position, data: NodeData) -> Self {
        Self {
            id: id.into(),
            position,
            data,
        }
    }
}

/// A named collection of node instances and the edges between their ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagram {
    pub id: DiagramId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeInstance>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Diagram {
    /// Create an empty diagram.
    pub fn new(id: impl Into<DiagramId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Place a node in the diagram.
    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        position: Position,
        data: NodeData,
    ) -> &mut Self {
        self.nodes.push(NodeInstance::new(id, position, data));
        self
    }

    /// Wire two ports together.
    pub fn connect(
        &mut self,
        node_a: impl Into<String>,
        port_a: impl Into<String>,
        node_b: impl Into<String>,
        port_b: impl Into<String>,
    ) -> &mut Self {
        self.edges.push(Edge::new(
            Endpoint::new(node_a, port_a),
            Endpoint::new(node_b, port_b),
        ));
        self
    }

    /// Find a node instance by id.
    pub fn node(&self, id: &str) -> Option<&NodeInstance> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Find a node instance by id, mutably.
    pub fn node_mut(&mut self, id: &str) -> Option<&mut NodeInstance> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Compute the ports this diagram exposes when it is referenced.
    ///
    /// Every input-designated source is a connection port, named by its node
    /// id. Nodes at or left of the median x go to the left column, the rest to
    /// the right; both columns are sorted by y, ties broken by id.
    pub fn connection_ports(&self) -> ConnectionPorts {
        let mut ports: Vec<&NodeInstance> = self
            .nodes
            .iter()
            .filter(|n| n.data.connection_port().is_some())
            .collect();

        if ports.is_empty() {
            return ConnectionPorts::default();
        }

        let mut xs: Vec<f64> = ports.iter().map(|n| n.position.x).collect();
        xs.sort_by(|a, b| a.total_cmp(b));
        let mid = xs.len() / 2;
        let median = if xs.len() % 2 == 0 {
            (xs[mid - 1] + xs[mid]) / 2.0
        } else {
            xs[mid]
        };

        ports.sort_by(|a, b| {
            a.position
                .y
                .total_cmp(&b.position.y)
                .then_with(|| a.id.cmp(&b.id))
        });

        let (left, right): (Vec<&NodeInstance>, Vec<&NodeInstance>) =
            ports.into_iter().partition(|n| n.position.x <= median);

        ConnectionPorts {
            left: left.into_iter().map(|n| n.id.clone()).collect(),
            right: right.into_iter().map(|n| n.id.clone()).collect(),
        }
    }

    /// Merge solved node data back into this diagram.
    ///
    /// Returns the number of node instances that were updated. Ids in the
    /// solution that do not exist here are ignored.
    pub fn apply(&mut self, solution: &Solution) -> usize {
        let mut updated = 0;
        for (id, data) in &solution.nodes {
            if let Some(node) = self.node_mut(id) {
                node.data = data.clone();
                updated += 1;
            }
        }
        updated
    }
}

/// The owning collection of diagrams.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub diagrams: Vec<Diagram>,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a project from JSON.
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Read and parse a project file.
    #[cfg(feature = "cli")]
    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CalcError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json(&content)
    }

    /// Serialize the project to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Add a diagram, replacing any existing diagram with the same id.
    pub fn insert(&mut self, diagram: Diagram) {
        match self.diagrams.iter_mut().find(|d| d.id == diagram.id) {
            Some(existing) => *existing = diagram,
            None => self.diagrams.push(diagram),
        }
    }

    /// Find a diagram by id.
    pub fn diagram(&self, id: &DiagramId) -> Option<&Diagram> {
        self.diagrams.iter().find(|d| &d.id == id)
    }

    /// Find a diagram by id, mutably.
    pub fn diagram_mut(&mut self, id: &DiagramId) -> Option<&mut Diagram> {
        self.diagrams.iter_mut().find(|d| &d.id == id)
    }

    /// Find a diagram by id or fail with [`CalcError::DiagramNotFound`].
    pub fn require(&self, id: &DiagramId) -> Result<&Diagram> {
        self.diagram(id)
            .ok_or_else(|| CalcError::diagram_not_found(id.as_str()))
    }

    /// Ports exposed by the diagram with the given id.
    pub fn connection_ports(&self, id: &DiagramId) -> Option<ConnectionPorts> {
        self.diagram(id).map(Diagram::connection_ports)
    }

    /// Refresh the exported port lists of every reference node in the
    /// project. Returns the number of reference nodes whose lists changed.
    pub fn sync_reference_ports(&mut self) -> usize {
        let mut updates = Vec::new();
        for (d, diagram) in self.diagrams.iter().enumerate() {
            for (n, node) in diagram.nodes.iter().enumerate() {
                if let NodeData::Reference(reference) = &node.data {
                    let mut synced = reference.clone();
                    if synced.sync_ports(self) {
                        updates.push((d, n, synced));
                    }
                }
            }
        }

        let changed = updates.len();
        for (d, n, synced) in updates {
            self.diagrams[d].nodes[n].data = NodeData::Reference(synced);
        }
        changed
    }
}
