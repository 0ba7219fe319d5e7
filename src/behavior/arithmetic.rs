//! Summation and product constraint nodes.
//!
//! Both node types carry two rows of ports, `top` and `bottom`, whose names are
//! maintained by the editor as wires are added and removed. Ports that did not
//! end up in a net are skipped.

use serde::{Deserialize, Serialize};

use super::Behavior;
use crate::netlist::{CalcNode, Net, NetId};
use crate::solver::EquationSink;

/// Nets connected to the named ports, in row order.
fn row_nets(node: &CalcNode, row: &[String]) -> Vec<NetId> {
    row.iter().filter_map(|port| node.net(port)).collect()
}

/// A summation node: `Σ top − Σ bottom = 0`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SummationData {
    #[serde(default)]
    pub top: Vec<String>,
    #[serde(default)]
    pub bottom: Vec<String>,
}

impl SummationData {
    pub fn new<S: Into<String>>(
        top: impl IntoIterator<Item = S>,
        bottom: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            top: top.into_iter().map(Into::into).collect(),
            bottom: bottom.into_iter().map(Into::into).collect(),
        }
    }
}

impl Behavior for SummationData {
    fn declares_port(&self, port: &str) -> bool {
        self.top.iter().chain(&self.bottom).any(|p| p == port)
    }

    fn contribute_equations(&self, node: &CalcNode, sink: &mut EquationSink<'_>) {
        let top = row_nets(node, &self.top);
        let bottom = row_nets(node, &self.bottom);
        if top.is_empty() && bottom.is_empty() {
            return;
        }

        sink.add_equation(move |x, row| {
            let mut residual = 0.0;
            for net in &top {
                row[net.0] += 1.0;
                residual += x[net.0];
            }
            for net in &bottom {
                row[net.0] -= 1.0;
                residual -= x[net.0];
            }
            residual
        });
    }

    fn finish_calculation(&self, _node: &CalcNode, _nets: &[Net]) -> Self {
        self.clone()
    }
}

/// A product node: `Π top − Π bottom = 0`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProductData {
    #[serde(default)]
    pub top: Vec<String>,
    #[serde(default)]
    pub bottom: Vec<String>,
}

impl ProductData {
    pub fn new<S: Into<String>>(
        top: impl IntoIterator<Item = S>,
        bottom: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            top: top.into_iter().map(Into::into).collect(),
            bottom: bottom.into_iter().map(Into::into).collect(),
        }
    }
}

impl Behavior for ProductData {
    fn declares_port(&self, port: &str) -> bool {
        self.top.iter().chain(&self.bottom).any(|p| p == port)
    }

    fn contribute_equations(&self, node: &CalcNode, sink: &mut EquationSink<'_>) {
        let top = row_nets(node, &self.top);
        let bottom = row_nets(node, &self.bottom);
        if top.is_empty() || bottom.is_empty() {
            return;
        }

        sink.add_equation(move |x, row| {
            let top_product: f64 = top.iter().map(|net| x[net.0]).product();
            let bottom_product: f64 = bottom.iter().map(|net| x[net.0]).product();

            // ∂(Π)/∂v = Π / v; a zero-valued net gets no derivative term this
            // iteration.
            for net in &top {
                let v = x[net.0];
                if v != 0.0 {
                    row[net.0] += top_product / v;
                }
            }
            for net in &bottom {
                let v = x[net.0];
                if v != 0.0 {
                    row[net.0] -= bottom_product / v;
                }
            }

            top_product - bottom_product
        });
    }

    fn finish_calculation(&self, _node: &CalcNode, _nets: &[Net]) -> Self {
        self.clone()
    }
}
