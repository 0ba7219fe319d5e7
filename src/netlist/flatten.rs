//! Recursive inlining of referenced diagrams.

use std::collections::{BTreeMap, HashMap};

use super::{CalcNode, Diagnostic};
use crate::behavior::NodeData;
use crate::diagram::{ConnectionPorts, Diagram, DiagramId, Endpoint, Project};

/// A port on a flattened node: (flattened node id, port name).
pub(super) type PortKey = (String, String);

/// Output of the flatten pass.
#[derive(Debug, Default)]
pub(super) struct Flattened {
    pub nodes: BTreeMap<String, CalcNode>,
    /// Undirected port-to-port connections from every inlining level
    pub links: Vec<(PortKey, PortKey)>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Flatten `root` and everything it references.
pub(super) fn flatten(project: &Project, root: &Diagram) -> Flattened {
    let mut out = Flattened::default();
    flatten_into(project, root, "", vec![root.id.clone()], &mut out);
    out
}

/// Inline one diagram under `prefix`.
///
/// `stack` holds the ids of the diagrams currently being inlined, root first.
/// Each nested call gets its own copy.
fn flatten_into(
    project: &Project,
    diagram: &Diagram,
    prefix: &str,
    stack: Vec<DiagramId>,
    out: &mut Flattened,
) {
    // Local id -> exported ports, for references that were inlined
    let mut inlined: HashMap<&str, ConnectionPorts> = HashMap::new();

    for instance in &diagram.nodes {
        let id = format!("{prefix}{}", instance.id);
        out.nodes.insert(
            id.clone(),
            CalcNode::new(id.clone(), instance.id.clone(), prefix, instance.data.clone()),
        );

        let NodeData::Reference(reference) = &instance.data else {
            continue;
        };

        if stack.contains(&reference.diagram) {
            tracing::warn!(
                node = %id,
                target = %reference.diagram,
                "reference cycle, not inlining"
            );
            out.diagnostics.push(Diagnostic::ReferenceCycle {
                node: id,
                target: reference.diagram.clone(),
            });
            continue;
        }

        let Some(target) = project.diagram(&reference.diagram) else {
            tracing::warn!(node = %id, target = %reference.diagram, "reference to missing diagram");
            out.diagnostics.push(Diagnostic::UnresolvedReference {
                node: id,
                target: reference.diagram.clone(),
            });
            continue;
        };

        let inner_prefix = format!("{id}.");
        let mut inner_stack = stack.clone();
        inner_stack.push(target.id.clone());
        flatten_into(project, target, &inner_prefix, inner_stack, out);

        let ports = target.connection_ports();
        for port in ports.iter() {
            let boundary = target
                .node(port)
                .and_then(|n| n.data.connection_port());
            if let Some(boundary) = boundary {
                out.links.push((
                    (id.clone(), port.clone()),
                    (format!("{inner_prefix}{port}"), boundary.to_string()),
                ));
            }
        }
        inlined.insert(instance.id.as_str(), ports);
    }

    for edge in &diagram.edges {
        let a = resolve_endpoint(diagram, prefix, &edge.a, &inlined, &mut out.diagnostics);
        let b = resolve_endpoint(diagram, prefix, &edge.b, &inlined, &mut out.diagnostics);
        if let (Some(a), Some(b)) = (a, b) {
            out.links.push((a, b));
        }
    }
}

/// Map an edge endpoint to a flattened port, or `None` if it cannot carry a
/// connection.
fn resolve_endpoint(
    diagram: &Diagram,
    prefix: &str,
    endpoint: &Endpoint,
    inlined: &HashMap<&str, ConnectionPorts>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<PortKey> {
    let Some(node) = diagram.node(&endpoint.node) else {
        tracing::warn!(diagram = %diagram.id, %endpoint, "edge references missing node");
        diagnostics.push(Diagnostic::DanglingEndpoint {
            diagram: diagram.id.clone(),
            endpoint: endpoint.clone(),
        });
        return None;
    };

    let declared = match &node.data {
        NodeData::Reference(_) => match inlined.get(node.id.as_str()) {
            Some(ports) => ports.contains(&endpoint.port),
            None => {
                // Already reported when the reference was skipped
                tracing::debug!(
                    diagram = %diagram.id,
                    %endpoint,
                    "edge to reference that was not inlined"
                );
                return None;
            }
        },
        data => data.declares_port(&endpoint.port),
    };

    if !declared {
        tracing::warn!(diagram = %diagram.id, %endpoint, "edge references unknown port");
        diagnostics.push(Diagnostic::UnknownPort {
            diagram: diagram.id.clone(),
            endpoint: endpoint.clone(),
        });
        return None;
    }

    Some((format!("{prefix}{}", endpoint.node), endpoint.port.clone()))
}
