//! A graph compiled against a registry: ordered steps with their kernels,
//! in-place plan, release lists and nested programs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use sg_kernels::{Kernel, Registry};
use sg_onnx::{Attribute, Graph, LoadError, Node, Opsets};
use tracing::{debug, trace};

use crate::error::{Result, RuntimeError};
use crate::inplace::InplacePlanner;
use crate::order::{node_reads, topological_order};

/// One node ready to run.
#[derive(Debug)]
pub(crate) struct Step {
    /// Index into `graph.nodes()`.
    pub(crate) node: usize,
    pub(crate) kernel: Box<dyn Kernel>,
    /// Inputs passed to the kernel; trailing omitted optional inputs are cut.
    pub(crate) arity: usize,
    /// Input slot whose buffer the kernel may take over.
    pub(crate) inplace: Option<usize>,
    /// Local values read for the last time here.
    pub(crate) release: Vec<String>,
    /// Compiled sub-graphs keyed by attribute name.
    pub(crate) bodies: HashMap<String, Program>,
}

#[derive(Debug)]
pub(crate) struct Program {
    pub(crate) graph: Arc<Graph>,
    pub(crate) steps: Vec<Step>,
    /// Nesting depth; 0 for the top-level graph.
    pub(crate) depth: usize,
}

impl Program {
    pub(crate) fn compile(
        graph: Arc<Graph>,
        registry: &Registry,
        inherited: &Opsets,
        outer: &HashSet<String>,
        depth: usize,
        inplace: bool,
    ) -> Result<Program> {
        let opsets = if graph.opsets().is_empty() {
            inherited
        } else {
            graph.opsets()
        };
        let order = topological_order(&graph, outer)?;
        let planner = InplacePlanner::new(&graph, &order);

        // Everything a nested body may read from this scope.
        let mut visible = outer.clone();
        visible.extend(graph.inputs().iter().map(|v| v.name.clone()));
        visible.extend(graph.initializers().keys().cloned());
        for node in graph.nodes() {
            visible.extend(node.outputs.iter().filter(|o| !o.is_empty()).cloned());
        }

        let mut steps = Vec::with_capacity(order.len());
        for (position, &index) in order.iter().enumerate() {
            let node = &graph.nodes()[index];
            let arity = supplied_arity(node)?;
            let kernel = registry
                .create(node, opsets)
                .map_err(|e| RuntimeError::node(node, e))?;

            let mut bodies = HashMap::new();
            for (attribute, value) in &node.attributes {
                if let Attribute::Graph(body) = value {
                    let program =
                        Program::compile(Arc::clone(body), registry, opsets, &visible, depth + 1, inplace)?;
                    bodies.insert(attribute.clone(), program);
                }
            }

            let slot = if inplace {
                kernel
                    .inplace_input()
                    .filter(|&slot| slot < arity && planner.eligible(node, position, slot))
            } else {
                None
            };

            let produced = node.outputs.iter().filter(|o| !o.is_empty()).cloned();
            let mut release: Vec<String> = Vec::new();
            for name in node_reads(node).into_iter().chain(produced) {
                let done = match planner.last_use(&name) {
                    Some(last) => last == position,
                    // produced here and never read
                    None => node.outputs.contains(&name),
                };
                if done && planner.releasable(&name) && !release.contains(&name) {
                    release.push(name);
                }
            }

            trace!(
                node = %node.name,
                op_type = %node.op_type,
                position,
                depth,
                inplace = ?slot,
                "compiled step"
            );
            steps.push(Step {
                node: index,
                kernel,
                arity,
                inplace: slot,
                release,
                bodies,
            });
        }

        debug!(
            graph = %graph.name(),
            depth,
            steps = steps.len(),
            "compiled program"
        );
        Ok(Program {
            graph,
            steps,
            depth,
        })
    }

    pub(crate) fn node(&self, step: &Step) -> &Node {
        &self.graph.nodes()[step.node]
    }

    /// Nodes in execution order.
    pub(crate) fn ordered_nodes(&self) -> impl Iterator<Item = &Node> {
        self.steps.iter().map(|s| self.node(s))
    }

    /// Output names this program may write in place.
    pub(crate) fn planned_inplace(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| s.inplace.is_some())
            .filter_map(|s| self.node(s).outputs.first().cloned())
            .collect()
    }
}

/// Number of inputs handed to the kernel. Only trailing optional inputs may
/// be omitted.
fn supplied_arity(node: &Node) -> Result<usize> {
    let arity = node
        .inputs
        .iter()
        .rposition(|name| !name.is_empty())
        .map_or(0, |last| last + 1);
    if let Some(gap) = node.inputs[..arity].iter().position(String::is_empty) {
        return Err(LoadError::Structure(format!(
            "node '{}' omits input {} but supplies a later one",
            node.name, gap
        ))
        .into());
    }
    Ok(arity)
}
