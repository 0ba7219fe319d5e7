//! Net building.
//!
//! This module turns a diagram into the unknowns of the solver. Building runs
//! in two passes:
//!
//! 1. **Flatten**: every node instance becomes a [`CalcNode`], recursively
//!    inlining referenced diagrams under a `refId.` namespace. A reference
//!    whose target is already being inlined further up is dropped.
//! 2. **Partition**: ports connected by edges, by reference boundaries, or by
//!    a node's alias rule are grouped into equivalence classes. Each class is
//!    one [`Net`], seeded with the mean of the values its ports propose.
//!
//! Topology problems never fail a build. They are logged and collected as
//! [`Diagnostic`]s on the resulting [`Netlist`].

mod flatten;
mod nets;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::behavior::NodeData;
use crate::diagram::{Diagram, DiagramId, Endpoint, Project};

/// Initial value of a net that no port seeds.
pub const DEFAULT_NET_VALUE: f64 = 1.0;

/// Index of a net in the solver's unknown vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NetId(pub usize);

impl fmt::Display for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "net{}", self.0)
    }
}

/// An equivalence class of connected ports; one scalar unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct Net {
    pub id: NetId,
    pub value: f64,
}

impl Net {
    pub fn new(id: NetId, value: f64) -> Self {
        Self { id, value }
    }
}

/// Solve-time representation of a node instance after inlining.
#[derive(Debug, Clone, PartialEq)]
pub struct CalcNode {
    /// Globally unique id: `namespace` + `local_id`
    pub id: String,
    /// Id of the instance within its own diagram
    pub local_id: String,
    /// Chain of enclosing reference ids, each followed by `.`
    pub namespace: String,
    /// Node payload, updated by the finalizer after a solve
    pub data: NodeData,
    /// Nets of the ports that are connected to anything
    pub ports: BTreeMap<String, NetId>,
}

impl CalcNode {
    pub fn new(
        id: impl Into<String>,
        local_id: impl Into<String>,
        namespace: impl Into<String>,
        data: NodeData,
    ) -> Self {
        Self {
            id: id.into(),
            local_id: local_id.into(),
            namespace: namespace.into(),
            data,
            ports: BTreeMap::new(),
        }
    }

    /// Net on the given port, if it is connected.
    pub fn net(&self, port: &str) -> Option<NetId> {
        self.ports.get(port).copied()
    }

    /// Check if this node belongs to the root diagram.
    pub fn is_top_level(&self) -> bool {
        self.namespace.is_empty()
    }
}

/// A non-fatal topology finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// An edge names a node that is not in the diagram
    DanglingEndpoint { diagram: DiagramId, endpoint: Endpoint },
    /// An edge names a port the node does not have
    UnknownPort { diagram: DiagramId, endpoint: Endpoint },
    /// A reference points at a diagram that is not in the project
    UnresolvedReference { node: String, target: DiagramId },
    /// A reference points at a diagram that is already being inlined
    ReferenceCycle { node: String, target: DiagramId },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DanglingEndpoint { diagram, endpoint } => {
                write!(f, "edge in '{diagram}' references missing node at {endpoint}")
            }
            Diagnostic::UnknownPort { diagram, endpoint } => {
                write!(f, "edge in '{diagram}' references unknown port {endpoint}")
            }
            Diagnostic::UnresolvedReference { node, target } => {
                write!(f, "reference '{node}' points at missing diagram '{target}'")
            }
            Diagnostic::ReferenceCycle { node, target } => {
                write!(f, "reference '{node}' to '{target}' forms a cycle and was not inlined")
            }
        }
    }
}

/// Options for [`build_with`].
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Merge ports a node declares as aliases into one net.
    pub fold_aliases: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { fold_aliases: true }
    }
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable alias folding.
    ///
    /// With folding off, a source's two terminals are separate unknowns and
    /// the source contributes an equation keeping them equal.
    pub fn with_fold_aliases(mut self, fold_aliases: bool) -> Self {
        self.fold_aliases = fold_aliases;
        self
    }
}

/// A flattened diagram ready to solve.
#[derive(Debug, Clone)]
pub struct Netlist {
    /// Flattened nodes, keyed by flattened id
    pub nodes: BTreeMap<String, CalcNode>,
    /// Unknowns, indexed by [`NetId`]
    pub nets: Vec<Net>,
    /// Topology findings recovered during the build
    pub diagnostics: Vec<Diagnostic>,
}

impl Netlist {
    /// Find a flattened node by its flattened id.
    pub fn node(&self, id: &str) -> Option<&CalcNode> {
        self.nodes.get(id)
    }

    /// Net on a port of a flattened node.
    pub fn net_of(&self, node: &str, port: &str) -> Option<NetId> {
        self.nodes.get(node).and_then(|n| n.net(port))
    }

    /// Current value on a port of a flattened node.
    pub fn value_of(&self, node: &str, port: &str) -> Option<f64> {
        self.net_of(node, port)
            .and_then(|id| self.nets.get(id.0))
            .map(|net| net.value)
    }
}

/// Build the netlist of a diagram with default options.
pub fn build(project: &Project, diagram: &Diagram) -> Netlist {
    build_with(project, diagram, &BuildOptions::default())
}

/// Build the netlist of a diagram.
pub fn build_with(project: &Project, diagram: &Diagram, options: &BuildOptions) -> Netlist {
    let _span = tracing::debug_span!("build", diagram = %diagram.id).entered();

    let flattened = flatten::flatten(project, diagram);
    let mut nodes = flattened.nodes;
    let nets = nets::partition(&mut nodes, &flattened.links, options);

    tracing::debug!(
        nodes = nodes.len(),
        nets = nets.len(),
        diagnostics = flattened.diagnostics.len(),
        "netlist built"
    );

    Netlist {
        nodes,
        nets,
        diagnostics: flattened.diagnostics,
    }
}
