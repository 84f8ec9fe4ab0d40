//! Static planning of in-place buffer reuse.
//!
//! A node may overwrite the buffer of the input slot its kernel declares when
//! that input:
//! - is a runtime value of the local frame: a graph input without an
//!   initializer, or a node output of this graph (never an initializer or an
//!   outer-scope value);
//! - is not a graph output;
//! - is last read by this node in execution order, implicit sub-graph reads
//!   included;
//! - appears once among the node's inputs and is not also read by one of its
//!   sub-graphs.
//!
//! Whether the buffer is actually reused is decided by the kernel at run time,
//! from the dtype and shape it is given.

use std::collections::{HashMap, HashSet};

use sg_onnx::{Graph, Node};

use crate::order::node_reads;

pub(crate) struct InplacePlanner<'g> {
    locals: HashSet<&'g str>,
    outputs: HashSet<&'g str>,
    /// Position in execution order of each name's last reader.
    last_use: HashMap<String, usize>,
}

impl<'g> InplacePlanner<'g> {
    pub(crate) fn new(graph: &'g Graph, order: &[usize]) -> Self {
        let mut locals: HashSet<&str> = graph
            .inputs()
            .iter()
            .map(|v| v.name.as_str())
            .filter(|name| graph.initializer(name).is_none())
            .collect();
        for node in graph.nodes() {
            locals.extend(node.outputs.iter().map(String::as_str).filter(|o| !o.is_empty()));
        }
        let outputs = graph.outputs().iter().map(|v| v.name.as_str()).collect();

        let mut last_use = HashMap::new();
        for (position, &index) in order.iter().enumerate() {
            for name in node_reads(&graph.nodes()[index]) {
                last_use.insert(name, position);
            }
        }
        InplacePlanner {
            locals,
            outputs,
            last_use,
        }
    }

    pub(crate) fn last_use(&self, name: &str) -> Option<usize> {
        self.last_use.get(name).copied()
    }

    /// Whether `name` lives in the local frame and may be dropped after its
    /// last reader.
    pub(crate) fn releasable(&self, name: &str) -> bool {
        self.locals.contains(name) && !self.outputs.contains(name)
    }

    /// Whether `node`, running at `position`, may overwrite input `slot`.
    pub(crate) fn eligible(&self, node: &Node, position: usize, slot: usize) -> bool {
        let Some(name) = node.inputs.get(slot).filter(|n| !n.is_empty()) else {
            return false;
        };
        let explicit = node.inputs.iter().filter(|n| *n == name).count();
        let implicit = node
            .subgraphs()
            .any(|(_, body)| body.free_names().iter().any(|f| f == name));
        self.releasable(name)
            && self.last_use(name) == Some(position)
            && explicit == 1
            && !implicit
    }
}
