use std::collections::{BTreeMap, HashSet};

use sg_tensor::{Tensor, Value};
use tracing::debug;

use crate::error::{LoadError, Result};
use crate::graph::{Graph, Node, Opsets, ValueInfo, DEFAULT_DOMAIN, ML_DOMAIN};

/// Opset imported for the default domain when none is given.
pub const DEFAULT_OPSET: i64 = 13;
/// Opset imported for `ai.onnx.ml` when none is given.
pub const DEFAULT_ML_OPSET: i64 = 2;

/// Assembles and validates a [`Graph`].
///
/// The protobuf loader goes through this builder too, so a graph obtained
/// either way satisfies the same invariants: every node has a unique name
/// (empty names become `"{op_type}_{index}"`) and every value name is
/// assigned exactly once across graph inputs, initializers and node outputs.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    name: String,
    doc_string: String,
    nodes: Vec<Node>,
    inputs: Vec<ValueInfo>,
    outputs: Vec<ValueInfo>,
    value_infos: Vec<ValueInfo>,
    initializers: Vec<(String, Tensor)>,
    opsets: Opsets,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let mut opsets = Opsets::new();
        opsets.insert(DEFAULT_DOMAIN, DEFAULT_OPSET);
        opsets.insert(ML_DOMAIN, DEFAULT_ML_OPSET);
        GraphBuilder {
            name: name.into(),
            doc_string: String::new(),
            nodes: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            value_infos: Vec::new(),
            initializers: Vec::new(),
            opsets,
        }
    }

    /// Import `domain` at `version`, replacing any previous import.
    pub fn opset(mut self, domain: &str, version: i64) -> Self {
        self.opsets.insert(domain, version);
        self
    }

    /// Replace every opset import.
    pub fn opsets(mut self, opsets: Opsets) -> Self {
        self.opsets = opsets;
        self
    }

    pub fn doc_string(mut self, doc: impl Into<String>) -> Self {
        self.doc_string = doc.into();
        self
    }

    pub fn input(mut self, info: ValueInfo) -> Self {
        self.inputs.push(info);
        self
    }

    pub fn output(mut self, info: ValueInfo) -> Self {
        self.outputs.push(info);
        self
    }

    pub fn value_info(mut self, info: ValueInfo) -> Self {
        self.value_infos.push(info);
        self
    }

    pub fn initializer(mut self, name: impl Into<String>, tensor: Tensor) -> Self {
        self.initializers.push((name.into(), tensor));
        self
    }

    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn build(self) -> Result<Graph> {
        let mut assigned: HashSet<String> = HashSet::new();
        for info in &self.inputs {
            if !assigned.insert(info.name.clone()) {
                return Err(LoadError::DuplicateName(info.name.clone()));
            }
        }

        // Initializers may shadow a declared input of the same name: the
        // input then becomes optional.
        let mut initializers = BTreeMap::new();
        for (name, tensor) in self.initializers {
            if initializers.contains_key(&name) {
                return Err(LoadError::DuplicateName(name));
            }
            assigned.insert(name.clone());
            initializers.insert(name, Value::Tensor(tensor));
        }

        let mut node_names = HashSet::new();
        let mut nodes = self.nodes;
        for (index, node) in nodes.iter_mut().enumerate() {
            if node.name.is_empty() {
                node.name = format!("{}_{}", node.op_type, index);
            }
            if !node_names.insert(node.name.clone()) {
                return Err(LoadError::DuplicateName(node.name.clone()));
            }
            for output in node.outputs.iter().filter(|o| !o.is_empty()) {
                if !assigned.insert(output.clone()) {
                    return Err(LoadError::DuplicateName(output.clone()));
                }
            }
        }

        debug!(
            graph = %self.name,
            nodes = nodes.len(),
            inputs = self.inputs.len(),
            outputs = self.outputs.len(),
            initializers = initializers.len(),
            "built graph"
        );

        Ok(Graph {
            name: self.name,
            doc_string: self.doc_string,
            nodes,
            inputs: self.inputs,
            outputs: self.outputs,
            value_infos: self.value_infos,
            initializers,
            opsets: self.opsets,
        })
    }
}
