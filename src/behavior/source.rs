//! Value sources.

use serde::{Deserialize, Serialize};

use super::Behavior;
use crate::netlist::{CalcNode, Net, NetId};
use crate::solver::EquationSink;

/// The exposed terminal of a source.
pub const VALUE_PORT: &str = "value";

/// The implicit terminal of a source, wired to the enclosing diagram when the
/// source is a connection port.
pub const EXTERNAL_PORT: &str = "external";

const ALIASES: &[(&str, &str)] = &[(VALUE_PORT, EXTERNAL_PORT)];

/// A source node.
///
/// A locked source pins its net to `value`. An unlocked source is a probe:
/// after a solve it adopts the value of the net it sits on, and its current
/// value only seeds the initial guess.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceData {
    /// Configured or last solved value
    #[serde(default)]
    pub value: Option<f64>,
    /// If true, `value` is a constraint rather than a result
    #[serde(default)]
    pub locked: bool,
    /// If true, the source is exported as a connection port
    #[serde(default)]
    pub input: bool,
}

impl SourceData {
    /// Create an unlocked source.
    pub fn new(value: Option<f64>) -> Self {
        Self {
            value,
            locked: false,
            input: false,
        }
    }

    /// Create a source locked to `value`.
    pub fn locked(value: f64) -> Self {
        Self {
            value: Some(value),
            locked: true,
            input: false,
        }
    }

    /// Mark the source as a connection port.
    pub fn with_input(mut self, input: bool) -> Self {
        self.input = input;
        self
    }

    /// The pinned value, if the source is locked and has a value.
    pub fn pinned_value(&self) -> Option<f64> {
        if self.locked {
            self.value
        } else {
            None
        }
    }

    /// Distinct nets on the two terminals, value terminal first.
    fn terminal_nets(node: &CalcNode) -> Vec<NetId> {
        let mut nets = Vec::with_capacity(2);
        for port in [VALUE_PORT, EXTERNAL_PORT] {
            if let Some(net) = node.net(port) {
                if !nets.contains(&net) {
                    nets.push(net);
                }
            }
        }
        nets
    }
}

impl Behavior for SourceData {
    fn declares_port(&self, port: &str) -> bool {
        port == VALUE_PORT || port == EXTERNAL_PORT
    }

    fn port_aliases(&self) -> &'static [(&'static str, &'static str)] {
        ALIASES
    }

    fn initial_value(&self, port: &str) -> Option<f64> {
        if self.declares_port(port) {
            self.value
        } else {
            None
        }
    }

    fn connection_port(&self) -> Option<&'static str> {
        if self.input {
            Some(EXTERNAL_PORT)
        } else {
            None
        }
    }

    fn contribute_equations(&self, node: &CalcNode, sink: &mut EquationSink<'_>) {
        let nets = Self::terminal_nets(node);

        if let Some(target) = self.pinned_value() {
            for net in nets {
                sink.add_equation(move |x, row| {
                    row[net.0] = 1.0;
                    x[net.0] - target
                });
            }
            return;
        }

        // Unlocked: only ties the terminals together when they ended up in
        // different nets (alias folding disabled).
        if let [a, b] = nets[..] {
            sink.add_equation(move |x, row| {
                row[a.0] += 1.0;
                row[b.0] -= 1.0;
                x[a.0] - x[b.0]
            });
        }
    }

    fn finish_calculation(&self, node: &CalcNode, nets: &[Net]) -> Self {
        if self.pinned_value().is_some() {
            return self.clone();
        }

        let solved = node
            .net(VALUE_PORT)
            .or_else(|| node.net(EXTERNAL_PORT))
            .and_then(|id| nets.get(id.0))
            .map(|net| net.value);

        Self {
            value: solved.or(self.value),
            ..self.clone()
        }
    }
}
