//! Node behaviors.
//!
//! This module provides the closed set of node types a diagram can contain:
//! - Source: a constant or variable value on a wire
//! - Summation: top row sums to bottom row
//! - Product: top row multiplies to bottom row
//! - Reference: an inlined instance of another diagram
//!
//! Each payload type implements [`Behavior`], which tells the net builder how
//! the node's ports are wired and tells the solver which equations the node
//! enforces and how to read the solution back.

mod arithmetic;
mod reference;
mod source;

pub use arithmetic::{ProductData, SummationData};
pub use reference::ReferenceData;
pub use source::{SourceData, EXTERNAL_PORT, VALUE_PORT};

use serde::{Deserialize, Serialize};

use crate::diagram::DiagramId;
use crate::netlist::{CalcNode, Net};
use crate::solver::EquationSink;

/// The equation-contribution and finalization contract of a node type.
pub trait Behavior: Sized {
    /// Check whether a port name exists on this node.
    fn declares_port(&self, port: &str) -> bool;

    /// Pairs of ports that always carry the same unknown.
    fn port_aliases(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Seed value this node proposes for the net on the given port.
    fn initial_value(&self, _port: &str) -> Option<f64> {
        None
    }

    /// Port that is wired to the outside when the containing diagram is
    /// referenced, if this node is a connection port.
    fn connection_port(&self) -> Option<&'static str> {
        None
    }

    /// Add this node's constraints for the current iterate.
    fn contribute_equations(&self, node: &CalcNode, sink: &mut EquationSink<'_>);

    /// Produce updated data from the converged net values.
    fn finish_calculation(&self, node: &CalcNode, nets: &[Net]) -> Self;
}

/// Behavior-specific node payload, tagged by node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeData {
    Source(SourceData),
    Summation(SummationData),
    Product(ProductData),
    Reference(ReferenceData),
}

impl NodeData {
    /// An unlocked source with an optional starting value.
    pub fn source(value: Option<f64>) -> Self {
        NodeData::Source(SourceData::new(value))
    }

    /// A source pinned to `value`.
    pub fn locked_source(value: f64) -> Self {
        NodeData::Source(SourceData::locked(value))
    }

    /// An unlocked source exported as a connection port.
    pub fn input_source(value: Option<f64>) -> Self {
        NodeData::Source(SourceData::new(value).with_input(true))
    }

    pub fn summation<S: Into<String>>(
        top: impl IntoIterator<Item = S>,
        bottom: impl IntoIterator<Item = S>,
    ) -> Self {
        NodeData::Summation(SummationData::new(top, bottom))
    }

    pub fn product<S: Into<String>>(
        top: impl IntoIterator<Item = S>,
        bottom: impl IntoIterator<Item = S>,
    ) -> Self {
        NodeData::Product(ProductData::new(top, bottom))
    }

    pub fn reference(diagram: impl Into<DiagramId>) -> Self {
        NodeData::Reference(ReferenceData::new(diagram))
    }

    pub fn declares_port(&self, port: &str) -> bool {
        match self {
            NodeData::Source(s) => s.declares_port(port),
            NodeData::Summation(s) => s.declares_port(port),
            NodeData::Product(p) => p.declares_port(port),
            NodeData::Reference(r) => r.declares_port(port),
        }
    }

    pub fn port_aliases(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            NodeData::Source(s) => s.port_aliases(),
            NodeData::Summation(s) => s.port_aliases(),
            NodeData::Product(p) => p.port_aliases(),
            NodeData::Reference(r) => r.port_aliases(),
        }
    }

    pub fn initial_value(&self, port: &str) -> Option<f64> {
        match self {
            NodeData::Source(s) => s.initial_value(port),
            NodeData::Summation(s) => s.initial_value(port),
            NodeData::Product(p) => p.initial_value(port),
            NodeData::Reference(r) => r.initial_value(port),
        }
    }

    pub fn connection_port(&self) -> Option<&'static str> {
        match self {
            NodeData::Source(s) => s.connection_port(),
            NodeData::Summation(s) => s.connection_port(),
            NodeData::Product(p) => p.connection_port(),
            NodeData::Reference(r) => r.connection_port(),
        }
    }

    pub fn contribute_equations(&self, node: &CalcNode, sink: &mut EquationSink<'_>) {
        match self {
            NodeData::Source(s) => s.contribute_equations(node, sink),
            NodeData::Summation(s) => s.contribute_equations(node, sink),
            NodeData::Product(p) => p.contribute_equations(node, sink),
            NodeData::Reference(r) => r.contribute_equations(node, sink),
        }
    }

    pub fn finish_calculation(&self, node: &CalcNode, nets: &[Net]) -> NodeData {
        match self {
            NodeData::Source(s) => NodeData::Source(s.finish_calculation(node, nets)),
            NodeData::Summation(s) => NodeData::Summation(s.finish_calculation(node, nets)),
            NodeData::Product(p) => NodeData::Product(p.finish_calculation(node, nets)),
            NodeData::Reference(r) => NodeData::Reference(r.finish_calculation(node, nets)),
        }
    }
}
