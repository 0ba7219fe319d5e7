//! Core types for diagram representation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A unique identifier for a diagram within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagramId(pub String);

impl DiagramId {
    /// Create a diagram id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DiagramId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for DiagramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Layout position of a node instance on the canvas.
///
/// The engine only reads it to order connection ports.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One end of an edge: a port on a node instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    /// Node instance id (local to the diagram)
    pub node: String,
    /// Port name on that node
    pub port: String,
}

impl Endpoint {
    pub fn new(node: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.port)
    }
}

/// An undirected wire between two ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub a: Endpoint,
    pub b: Endpoint,
}

impl Edge {
    pub fn new(a: Endpoint, b: Endpoint) -> Self {
        Self { a, b }
    }
}

/// Exported ports of a diagram, in display order.
///
/// Ports are split into a left and a right column by the median horizontal
/// position of their source nodes, and each column runs top to bottom.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPorts {
    pub left: Vec<String>,
    pub right: Vec<String>,
}

impl ConnectionPorts {
    /// Iterate over all port names, left column first.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.left.iter().chain(self.right.iter())
    }

    pub fn contains(&self, port: &str) -> bool {
        self.iter().any(|p| p == port)
    }

    pub fn len(&self) -> usize {
        self.left.len() + self.right.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }
}
