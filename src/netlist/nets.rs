//! Partitioning of connected ports into nets.

use std::collections::{BTreeMap, HashMap, VecDeque};

use super::flatten::PortKey;
use super::{BuildOptions, CalcNode, Net, NetId, DEFAULT_NET_VALUE};

/// Group linked ports into nets and record each net on its nodes' port maps.
///
/// Traversal visits ports in sorted order, so net ids are stable for a given
/// flattened diagram.
pub(super) fn partition(
    nodes: &mut BTreeMap<String, CalcNode>,
    links: &[(PortKey, PortKey)],
    options: &BuildOptions,
) -> Vec<Net> {
    let mut adjacency: BTreeMap<PortKey, Vec<PortKey>> = BTreeMap::new();
    for (a, b) in links {
        link(&mut adjacency, a.clone(), b.clone());
    }

    if options.fold_aliases {
        for node in nodes.values() {
            for (p, q) in node.data.port_aliases() {
                let p = (node.id.clone(), p.to_string());
                let q = (node.id.clone(), q.to_string());
                // An alias pair with no outside connection stays unconnected
                if adjacency.contains_key(&p) || adjacency.contains_key(&q) {
                    link(&mut adjacency, p, q);
                }
            }
        }
    }

    let mut assigned: HashMap<PortKey, NetId> = HashMap::new();
    let mut nets = Vec::new();

    for start in adjacency.keys() {
        if assigned.contains_key(start) {
            continue;
        }

        let id = NetId(nets.len());
        let mut seed_sum = 0.0;
        let mut seed_count = 0usize;
        let mut queue = VecDeque::from([start.clone()]);
        assigned.insert(start.clone(), id);

        while let Some(key) = queue.pop_front() {
            let seed = nodes
                .get(&key.0)
                .and_then(|node| node.data.initial_value(&key.1));
            if let Some(seed) = seed {
                seed_sum += seed;
                seed_count += 1;
            }

            for next in adjacency.get(&key).into_iter().flatten() {
                if !assigned.contains_key(next) {
                    assigned.insert(next.clone(), id);
                    queue.push_back(next.clone());
                }
            }
        }

        let value = if seed_count > 0 {
            seed_sum / seed_count as f64
        } else {
            DEFAULT_NET_VALUE
        };
        tracing::trace!(net = %id, value, seeds = seed_count, "net allocated");
        nets.push(Net::new(id, value));
    }

    for ((node, port), id) in assigned {
        if let Some(node) = nodes.get_mut(&node) {
            node.ports.insert(port, id);
        }
    }

    nets
}

fn link(adjacency: &mut BTreeMap<PortKey, Vec<PortKey>>, a: PortKey, b: PortKey) {
    adjacency.entry(a.clone()).or_default().push(b.clone());
    adjacency.entry(b).or_default().push(a);
}
