//! Solve-and-apply entry points.

use std::collections::BTreeMap;

use serde::Serialize;

use super::newton::{NewtonRaphson, SolveStatus, SolverConfig};
use crate::behavior::NodeData;
use crate::diagram::{DiagramId, Project};
use crate::error::Result;
use crate::netlist::{self, BuildOptions, CalcNode, Net, Netlist};

/// Outcome of a successful (converged or aborted) solve.
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    pub status: SolveStatus,
    pub iterations: usize,
    pub residual_norm: f64,
    pub damping: f64,
    /// Finalized data of the root diagram's nodes, keyed by local id
    pub nodes: BTreeMap<String, NodeData>,
}

impl Solution {
    pub fn is_converged(&self) -> bool {
        self.status.is_converged()
    }
}

/// Solve with default configuration.
pub fn solve(nodes: &mut BTreeMap<String, CalcNode>, nets: &mut [Net]) -> Result<Solution> {
    solve_with(nodes, nets, &SolverConfig::default())
}

/// Solve the flattened system in place.
///
/// On success every net holds its final value, every node's data has been
/// finalized, and the returned [`Solution`] carries the finalized data of the
/// top-level nodes. On error nothing is modified.
pub fn solve_with(
    nodes: &mut BTreeMap<String, CalcNode>,
    nets: &mut [Net],
    config: &SolverConfig,
) -> Result<Solution> {
    let _span = tracing::info_span!("solve", nodes = nodes.len(), nets = nets.len()).entered();

    let initial: Vec<f64> = nets.iter().map(|net| net.value).collect();
    let result = NewtonRaphson::with_config(config.clone()).solve(nodes, &initial)?;

    match result.status {
        SolveStatus::Converged => tracing::info!(
            iterations = result.iterations,
            residual = result.residual_norm,
            "solve converged"
        ),
        SolveStatus::Aborted(reason) => tracing::warn!(
            ?reason,
            iterations = result.iterations,
            residual = result.residual_norm,
            damping = result.damping,
            "solve aborted, applying best-effort values"
        ),
    }

    for (net, value) in nets.iter_mut().zip(&result.values) {
        net.value = *value;
    }

    let mut applied = BTreeMap::new();
    for node in nodes.values_mut() {
        let data = node.data.finish_calculation(node, nets);
        node.data = data;
        if node.is_top_level() {
            applied.insert(node.local_id.clone(), node.data.clone());
        }
    }

    Ok(Solution {
        status: result.status,
        iterations: result.iterations,
        residual_norm: result.residual_norm,
        damping: result.damping,
        nodes: applied,
    })
}

/// A build and solve of one diagram.
#[derive(Debug, Clone)]
pub struct Calculation {
    pub netlist: Netlist,
    pub solution: Solution,
}

/// Look up a diagram, build its netlist and solve it.
pub fn calculate(
    project: &Project,
    diagram: &DiagramId,
    options: &BuildOptions,
    config: &SolverConfig,
) -> Result<Calculation> {
    let root = project.require(diagram)?;
    let mut netlist = netlist::build_with(project, root, options);
    for diagnostic in &netlist.diagnostics {
        tracing::debug!(%diagnostic, "topology");
    }
    let solution = solve_with(&mut netlist.nodes, &mut netlist.nets, config)?;
    Ok(Calculation { netlist, solution })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::behavior::{SourceData, VALUE_PORT};
    use crate::solver::AbortReason;
    use crate::diagram::{Diagram, Position};
    use crate::error::CalcError;
    use crate::netlist::build;

    fn at(x: f64, y: f64) -> Position {
        Position::new(x, y)
    }

    fn source_value(data: &NodeData) -> Option<f64> {
        match data {
            NodeData::Source(SourceData { value, .. }) => *value,
            other => panic!("expected source, got {other:?}"),
        }
    }

    fn run(project: &Project, diagram: &Diagram) -> Result<(Netlist, Solution)> {
        let mut netlist = build(project, diagram);
        let solution = solve(&mut netlist.nodes, &mut netlist.nets)?;
        Ok((netlist, solution))
    }

    #[test]
    fn test_unlocked_sources_are_underdetermined() {
        let mut d = Diagram::new("main", "Main");
        d.add_node("a", at(0.0, 0.0), NodeData::source(Some(1.0)))
            .add_node("b", at(1.0, 0.0), NodeData::source(Some(5.0)))
            .add_node("c", at(2.0, 0.0), NodeData::source(None))
            .connect("a", VALUE_PORT, "b", VALUE_PORT)
            .connect("b", VALUE_PORT, "c", VALUE_PORT);

        let mut netlist = build(&Project::new(), &d);
        let before = netlist.nets.clone();
        let err = solve(&mut netlist.nodes, &mut netlist.nets).unwrap_err();

        assert!(matches!(err, CalcError::ShapeMismatch { .. }));
        assert!(err.is_system_failure());
        // Nothing applied on failure
        assert_eq!(netlist.nets, before);
        assert_eq!(source_value(&netlist.nodes["c"].data), None);
    }

    #[test]
    fn test_aborted_solve_still_applies() {
        // x * x = 1e6 from x = 1 needs more than two iterations
        let mut d = Diagram::new("main", "Main");
        d.add_node("x", at(0.0, 0.0), NodeData::source(None))
            .add_node("c", at(1.0, 0.0), NodeData::locked_source(1e6))
            .add_node("sq", at(0.5, 0.0), NodeData::product(["t0", "t1"], ["b0"]))
            .connect("x", VALUE_PORT, "sq", "t0")
            .connect("x", VALUE_PORT, "sq", "t1")
            .connect("sq", "b0", "c", VALUE_PORT);

        let mut netlist = build(&Project::new(), &d);
        let before = netlist.nets.clone();
        let config = SolverConfig::new().with_max_iterations(2);
        let solution = solve_with(&mut netlist.nodes, &mut netlist.nets, &config).unwrap();

        assert_eq!(solution.status, SolveStatus::Aborted(AbortReason::IterationLimit));
        assert_eq!(solution.iterations, 2);
        assert_ne!(netlist.nets, before);

        let x = source_value(&solution.nodes["x"]).unwrap();
        assert!(x > 1.0 && x < 1e6);
        assert_eq!(source_value(&netlist.nodes["x"].data), Some(x));
        assert_abs_diff_eq!(netlist.value_of("x", VALUE_PORT).unwrap(), x);
    }

    #[test]
    fn test_singular_solve_applies_nothing() {
        // Two pins on one net, nothing determines the second net
        let mut d = Diagram::new("main", "Main");
        d.add_node("a", at(0.0, 0.0), NodeData::locked_source(1.0))
            .add_node("b", at(1.0, 0.0), NodeData::locked_source(1.0))
            .add_node("c", at(2.0, 0.0), NodeData::source(Some(4.0)))
            .add_node("e", at(3.0, 0.0), NodeData::source(None))
            .connect("a", VALUE_PORT, "b", VALUE_PORT)
            .connect("c", VALUE_PORT, "e", VALUE_PORT);

        let mut netlist = build(&Project::new(), &d);
        assert_eq!(netlist.nets.len(), 2);
        let before = netlist.nets.clone();
        let nodes_before = netlist.nodes.clone();

        let err = solve(&mut netlist.nodes, &mut netlist.nets).unwrap_err();
        assert!(matches!(err, CalcError::SingularJacobian { iteration: 0 }));
        assert!(err.is_system_failure());
        assert_eq!(netlist.nets, before);
        assert_eq!(netlist.nodes, nodes_before);
        assert_eq!(source_value(&netlist.nodes["e"].data), None);
    }

    #[test]
    fn test_locked_source_drives_unlocked() {
        let mut d = Diagram::new("main", "Main");
        d.add_node("free", at(0.0, 0.0), NodeData::source(Some(2.0)))
            .add_node("pin", at(1.0, 0.0), NodeData::locked_source(5.0))
            .connect("free", VALUE_PORT, "pin", VALUE_PORT);

        let (_, solution) = run(&Project::new(), &d).unwrap();
        assert!(solution.is_converged());
        assert_abs_diff_eq!(source_value(&solution.nodes["free"]).unwrap(), 5.0, epsilon = 1e-12);
        assert_eq!(solution.nodes["pin"], NodeData::locked_source(5.0));
    }

    // "four" stays unlocked: with every source locked the system has more
    // equations than nets and fails as overdetermined.
    fn summation_diagram(bottom: NodeData) -> Diagram {
        let mut d = Diagram::new("main", "Main");
        d.add_node("sum", at(0.0, 0.0), NodeData::summation(["t0", "t1"], ["b0"]))
            .add_node("three", at(-1.0, 0.0), NodeData::locked_source(3.0))
            .add_node("four", at(-1.0, 1.0), NodeData::source(Some(4.0)))
            .add_node("seven", at(1.0, 0.0), bottom)
            .connect("three", VALUE_PORT, "sum", "t0")
            .connect("four", VALUE_PORT, "sum", "t1")
            .connect("sum", "b0", "seven", VALUE_PORT);
        d
    }

    #[test]
    fn test_summation_balances() {
        let d = summation_diagram(NodeData::locked_source(7.0));
        let (netlist, solution) = run(&Project::new(), &d).unwrap();

        assert!(solution.is_converged());
        assert!(solution.residual_norm < 1e-12);
        assert_abs_diff_eq!(source_value(&solution.nodes["four"]).unwrap(), 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(netlist.value_of("sum", "b0").unwrap(), 7.0);
    }

    #[test]
    fn test_summation_solves_missing_addend() {
        let mut d = summation_diagram(NodeData::locked_source(10.0));
        if let Some(node) = d.node_mut("four") {
            node.data = NodeData::source(None);
        }

        let (_, solution) = run(&Project::new(), &d).unwrap();
        assert!(solution.is_converged());
        assert_abs_diff_eq!(source_value(&solution.nodes["four"]).unwrap(), 7.0, epsilon = 1e-10);
    }

    #[test]
    fn test_summation_overdetermined_fails() {
        let mut d = summation_diagram(NodeData::locked_source(7.0));
        if let Some(node) = d.node_mut("four") {
            node.data = NodeData::locked_source(4.0);
        }

        let err = run(&Project::new(), &d).unwrap_err();
        assert!(matches!(err, CalcError::ShapeMismatch { equations: 4, unknowns: 3 }));
    }

    fn product_diagram() -> Diagram {
        let mut d = Diagram::new("main", "Main");
        d.add_node("prod", at(0.0, 0.0), NodeData::product(["t0", "t1"], ["b0"]))
            .add_node("two", at(-1.0, 0.0), NodeData::locked_source(2.0))
            .add_node("three", at(-1.0, 1.0), NodeData::locked_source(3.0))
            .add_node("out", at(1.0, 0.0), NodeData::source(None))
            .connect("two", VALUE_PORT, "prod", "t0")
            .connect("three", VALUE_PORT, "prod", "t1")
            .connect("prod", "b0", "out", VALUE_PORT);
        d
    }

    #[test]
    fn test_product_converges_and_is_stable() {
        let d = product_diagram();
        let (mut netlist, solution) = run(&Project::new(), &d).unwrap();

        assert!(solution.is_converged());
        assert_abs_diff_eq!(source_value(&solution.nodes["out"]).unwrap(), 6.0, epsilon = 1e-10);
        assert_abs_diff_eq!(netlist.value_of("prod", "b0").unwrap(), 6.0, epsilon = 1e-10);

        // Solving again from the converged nets takes a single, undamped step
        let again = solve(&mut netlist.nodes, &mut netlist.nets).unwrap();
        assert!(again.is_converged());
        assert_eq!(again.iterations, 1);
        assert_abs_diff_eq!(again.damping, 1.0);
        assert_abs_diff_eq!(source_value(&again.nodes["out"]).unwrap(), 6.0, epsilon = 1e-10);
    }

    #[test]
    fn test_product_divides() {
        // 12 / 4 = 3 with the unknown on the top row
        let mut d = Diagram::new("main", "Main");
        d.add_node("prod", at(0.0, 0.0), NodeData::product(["t0", "t1"], ["b0"]))
            .add_node("x", at(-1.0, 0.0), NodeData::source(None))
            .add_node("four", at(-1.0, 1.0), NodeData::locked_source(4.0))
            .add_node("twelve", at(1.0, 0.0), NodeData::locked_source(12.0))
            .connect("x", VALUE_PORT, "prod", "t0")
            .connect("four", VALUE_PORT, "prod", "t1")
            .connect("prod", "b0", "twelve", VALUE_PORT);

        let (_, solution) = run(&Project::new(), &d).unwrap();
        assert!(solution.is_converged());
        assert_abs_diff_eq!(source_value(&solution.nodes["x"]).unwrap(), 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_round_trip_is_idempotent() {
        let mut d = product_diagram();
        let project = Project::new();

        let (_, first) = run(&project, &d).unwrap();
        assert_eq!(d.apply(&first), 4);

        let (_, second) = run(&project, &d).unwrap();
        assert!(second.is_converged());
        assert_eq!(second.iterations, 1);
        assert_abs_diff_eq!(second.damping, 1.0);
        assert_eq!(second.nodes.len(), first.nodes.len());
    }

    #[test]
    fn test_reference_results_stay_top_level() {
        let mut leaf = Diagram::new("double", "Double");
        leaf.add_node("x", at(0.0, 0.0), NodeData::input_source(None))
            .add_node("y", at(10.0, 0.0), NodeData::input_source(None))
            .add_node("sum", at(5.0, 0.0), NodeData::summation(["t0", "t1"], ["b0"]))
            .connect("x", VALUE_PORT, "sum", "t0")
            .connect("x", VALUE_PORT, "sum", "t1")
            .connect("sum", "b0", "y", VALUE_PORT);

        let mut root = Diagram::new("root", "Root");
        root.add_node("in", at(0.0, 0.0), NodeData::locked_source(21.0))
            .add_node("dbl", at(5.0, 0.0), NodeData::reference("double"))
            .add_node("out", at(10.0, 0.0), NodeData::source(None))
            .connect("in", VALUE_PORT, "dbl", "x")
            .connect("dbl", "y", "out", VALUE_PORT);

        let mut project = Project::new();
        project.insert(leaf);
        project.insert(root);

        let calc = calculate(
            &project,
            &DiagramId::new("root"),
            &BuildOptions::default(),
            &SolverConfig::default(),
        )
        .unwrap();

        let solution = calc.solution;
        assert!(solution.is_converged());
        assert_abs_diff_eq!(source_value(&solution.nodes["out"]).unwrap(), 42.0, epsilon = 1e-10);

        // Inlined instances are finalized in the netlist but not reported
        let keys: Vec<&str> = solution.nodes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["dbl", "in", "out"]);
        let inner = &calc.netlist.nodes["dbl.x"];
        assert_abs_diff_eq!(source_value(&inner.data).unwrap(), 21.0, epsilon = 1e-10);
    }

    #[test]
    fn test_split_terminals_propagate_values() {
        let mut d = Diagram::new("main", "Main");
        d.add_node("a", at(0.0, 0.0), NodeData::source(None))
            .add_node("b", at(1.0, 0.0), NodeData::source(None))
            .add_node("pin", at(2.0, 0.0), NodeData::locked_source(8.0))
            .connect("pin", VALUE_PORT, "a", "external")
            .connect("a", VALUE_PORT, "b", VALUE_PORT);

        let options = BuildOptions::new().with_fold_aliases(false);
        let mut netlist = netlist::build_with(&Project::new(), &d, &options);
        assert_eq!(netlist.nets.len(), 2);

        let solution = solve(&mut netlist.nodes, &mut netlist.nets).unwrap();
        assert!(solution.is_converged());
        assert_abs_diff_eq!(source_value(&solution.nodes["b"]).unwrap(), 8.0, epsilon = 1e-12);
        assert_abs_diff_eq!(source_value(&solution.nodes["a"]).unwrap(), 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cyclic_project_still_solves() {
        let mut a = Diagram::new("a", "A");
        a.add_node("s", at(0.0, 0.0), NodeData::input_source(None))
            .add_node("pin", at(0.0, 5.0), NodeData::locked_source(3.0))
            .add_node("to_b", at(5.0, 0.0), NodeData::reference("b"))
            .connect("pin", VALUE_PORT, "s", VALUE_PORT)
            .connect("s", VALUE_PORT, "to_b", "t");

        let mut b = Diagram::new("b", "B");
        b.add_node("t", at(0.0, 0.0), NodeData::input_source(None))
            .add_node("to_a", at(5.0, 0.0), NodeData::reference("a"))
            .connect("t", VALUE_PORT, "to_a", "s");

        let mut project = Project::new();
        project.insert(a);
        project.insert(b);

        let calc = calculate(
            &project,
            &DiagramId::new("a"),
            &BuildOptions::default(),
            &SolverConfig::default(),
        )
        .unwrap();
        assert!(calc.solution.is_converged());
        assert_eq!(calc.netlist.diagnostics.len(), 1);
        assert_abs_diff_eq!(source_value(&calc.solution.nodes["s"]).unwrap(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_diagram() {
        let err = calculate(
            &Project::new(),
            &DiagramId::new("nope"),
            &BuildOptions::default(),
            &SolverConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CalcError::DiagramNotFound { .. }));
        assert!(!err.is_system_failure());
    }
}
