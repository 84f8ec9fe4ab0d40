//! Deterministic topological ordering of a graph's nodes.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use sg_onnx::{Graph, LoadError, Node};

/// Every name a node reads: its present inputs, then the outer-scope names its
/// sub-graphs read implicitly.
pub(crate) fn node_reads(node: &Node) -> Vec<String> {
    let mut reads: Vec<String> = node.present_inputs().map(str::to_string).collect();
    for (_, body) in node.subgraphs() {
        for name in body.free_names() {
            if !reads.contains(&name) {
                reads.push(name);
            }
        }
    }
    reads
}

/// Graph inputs and initializers.
fn defined_names(graph: &Graph) -> HashSet<&str> {
    graph
        .inputs()
        .iter()
        .map(|v| v.name.as_str())
        .chain(graph.initializers().keys().map(String::as_str))
        .collect()
}

/// Kahn's algorithm over producer edges. Among ready nodes the one declared
/// first runs first, so the result only depends on the graph.
///
/// `outer` holds names visible from enclosing graphs; reading anything else
/// that is neither defined nor produced here is an error.
pub fn topological_order(graph: &Graph, outer: &HashSet<String>) -> Result<Vec<usize>, LoadError> {
    let nodes = graph.nodes();
    let defined = defined_names(graph);

    let mut producer: HashMap<&str, usize> = HashMap::new();
    for (i, node) in nodes.iter().enumerate() {
        for output in node.outputs.iter().filter(|o| !o.is_empty()) {
            producer.insert(output.as_str(), i);
        }
    }

    let mut pending = vec![0usize; nodes.len()];
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        let mut sources = HashSet::new();
        for name in node_reads(node) {
            match producer.get(name.as_str()) {
                Some(&p) => {
                    if sources.insert(p) {
                        pending[i] += 1;
                        consumers[p].push(i);
                    }
                }
                None if defined.contains(name.as_str()) || outer.contains(&name) => {}
                None => {
                    return Err(LoadError::UnknownInput {
                        node: node.name.clone(),
                        name,
                    })
                }
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = pending
        .iter()
        .enumerate()
        .filter(|(_, &n)| n == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &c in &consumers[i] {
            pending[c] -= 1;
            if pending[c] == 0 {
                ready.push(Reverse(c));
            }
        }
    }

    if order.len() < nodes.len() {
        let stuck = pending
            .iter()
            .enumerate()
            .filter(|(_, &n)| n > 0)
            .map(|(i, _)| nodes[i].name.clone())
            .collect();
        return Err(LoadError::Cycle { nodes: stuck });
    }

    for output in graph.outputs() {
        let name = output.name.as_str();
        if !producer.contains_key(name) && !defined.contains(name) && !outer.contains(name) {
            return Err(LoadError::Structure(format!(
                "graph output '{}' is never produced",
                name
            )));
        }
    }
    Ok(order)
}
