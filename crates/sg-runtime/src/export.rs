//! DOT and JSON views of a session's graph.
//!
//! Both read the session's public state only and never run the graph.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::json;
use sg_onnx::{Attribute, Graph, Node, ValueInfo};
use sg_tensor::{CpuStorage, ShapeObject, Tensor, Value};

use crate::error::Result;
use crate::session::{ModelInfo, Session};

/// Longest attribute or initializer preview kept in a DOT label.
const PREVIEW_WIDTH: usize = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct DotOptions {
    /// Add inferred shapes and `inplace` marks to value labels.
    pub shapes: bool,
    /// Draw Scan bodies as clusters instead of a single node.
    pub recursive: bool,
    /// Prepended to every DOT identifier.
    pub prefix: String,
    pub fontsize: u32,
}

impl Default for DotOptions {
    fn default() -> Self {
        Self {
            shapes: false,
            recursive: false,
            prefix: String::new(),
            fontsize: 10,
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "'").replace('\n', "\\n")
}

fn truncate(s: String, width: usize) -> String {
    match s.char_indices().nth(width) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s,
    }
}

fn values_preview(tensor: &Tensor) -> String {
    fn join<T: ToString>(values: &[T]) -> String {
        let shown: Vec<String> = values.iter().take(8).map(T::to_string).collect();
        format!("[{}]", shown.join(" "))
    }
    let text = match tensor.storage() {
        CpuStorage::F32(v) => join(v),
        CpuStorage::F64(v) => join(v),
        CpuStorage::I64(v) => join(v),
        CpuStorage::Bool(v) => join(v),
        CpuStorage::Str(v) => join(v),
    };
    truncate(text, PREVIEW_WIDTH)
}

fn attribute_preview(attribute: &Attribute) -> String {
    match attribute {
        Attribute::Float(v) => v.to_string(),
        Attribute::Int(v) => v.to_string(),
        Attribute::String(v) => v.clone(),
        Attribute::Tensor(t) => format!("{}{}", t.dtype(), t.shape()),
        Attribute::Graph(g) => format!("graph {}", g.name()),
        Attribute::Floats(v) => format!("{:?}", v),
        Attribute::Ints(v) => format!("{:?}", v),
        Attribute::Strings(v) => format!("{:?}", v),
        Attribute::Tensors(v) => format!("{} tensors", v.len()),
        Attribute::Graphs(v) => format!("{} graphs", v.len()),
    }
}

struct DotWriter<'a> {
    options: &'a DotOptions,
    shapes: Option<BTreeMap<String, ShapeObject>>,
    inplaces: HashSet<String>,
    lines: Vec<String>,
}

impl DotWriter<'_> {
    /// `\nshape=...` suffix for a top-level value, empty otherwise.
    fn shape_suffix(&self, name: &str, prefix: &str) -> String {
        let Some(shapes) = &self.shapes else {
            return String::new();
        };
        if prefix != self.options.prefix {
            return String::new();
        }
        let mut suffix = match shapes.get(name) {
            Some(shape) => format!("\\nshape={}", escape(&shape.to_string())),
            None => String::new(),
        };
        if self.inplaces.contains(name) {
            suffix.push_str("\\ninplace");
        }
        suffix
    }

    fn graph(&mut self, graph: &Graph, prefix: &str, indent: &str) {
        let fs = self.options.fontsize;
        let mut declared: HashSet<&str> = HashSet::new();

        self.lines.push(String::new());
        for info in graph.inputs() {
            let suffix = self.shape_suffix(&info.name, prefix);
            self.lines.push(format!(
                "{indent}\"{prefix}{name}\" [shape=box color=red label=\"{label}\\n{ty}{suffix}\" fontsize={fs}];",
                name = escape(&info.name),
                label = escape(&info.name),
                ty = escape(&info.ty.to_string()),
            ));
            declared.insert(&info.name);
        }

        self.lines.push(String::new());
        for info in graph.outputs() {
            let suffix = self.shape_suffix(&info.name, prefix);
            self.lines.push(format!(
                "{indent}\"{prefix}{name}\" [shape=box color=green label=\"{label}\\n{ty}{suffix}\" fontsize={fs}];",
                name = escape(&info.name),
                label = escape(&info.name),
                ty = escape(&info.ty.to_string()),
            ));
            declared.insert(&info.name);
        }

        self.lines.push(String::new());
        for (name, value) in graph.initializers() {
            if declared.contains(name.as_str()) {
                continue;
            }
            let body = match value {
                Value::Tensor(t) => format!("{}{}\\n{}", t.dtype(), t.shape(), escape(&values_preview(t))),
                other => other.describe(),
            };
            self.lines.push(format!(
                "{indent}\"{prefix}{id}\" [shape=box label=\"{id}\\n{body}\" fontsize={fs}];",
                id = escape(name),
            ));
            declared.insert(name);
        }

        for node in graph.nodes() {
            self.lines.push(String::new());
            for output in node.outputs.iter().filter(|o| !o.is_empty()) {
                if declared.insert(output) {
                    let suffix = self.shape_suffix(output, prefix);
                    self.lines.push(format!(
                        "{indent}\"{prefix}{id}\" [shape=box label=\"{id}{suffix}\" fontsize={fs}];",
                        id = escape(output),
                    ));
                }
            }
            self.node(node, prefix, indent);
        }
    }

    fn node(&mut self, node: &Node, prefix: &str, indent: &str) {
        let fs = self.options.fontsize;
        let attributes: String = node
            .attributes
            .iter()
            .map(|(name, value)| {
                let width = PREVIEW_WIDTH.saturating_sub(name.len()).max(10);
                format!("\\n{}={}", name, escape(&truncate(attribute_preview(value), width)))
            })
            .collect();
        let label = format!("{}\\n({}){}", escape(&node.op_type), escape(&node.name), attributes);
        let id = escape(&node.name);

        let body = match node.attribute("body") {
            Some(Attribute::Graph(body)) if self.options.recursive => Some(body),
            _ => None,
        };
        if let Some(body) = body {
            let subprefix = format!("{}{}_", prefix, id);
            self.lines.push(format!("{indent}subgraph \"cluster_{prefix}{id}\" {{"));
            self.lines.push(format!("{indent}  label=\"{label}\";"));
            self.lines.push(format!("{indent}  fontsize={fs};"));
            self.lines.push(format!("{indent}  color=black;"));
            let nested = format!("{indent}  ");
            self.graph(body, &subprefix, &nested);
            self.lines.push(format!("{indent}}}"));
            for (outer, inner) in node.present_inputs().zip(body.inputs()) {
                self.lines.push(format!(
                    "{indent}\"{prefix}{}\" -> \"{subprefix}{}\";",
                    escape(outer),
                    escape(&inner.name)
                ));
            }
            for (inner, outer) in body.outputs().iter().zip(&node.outputs) {
                self.lines.push(format!(
                    "{indent}\"{subprefix}{}\" -> \"{prefix}{}\";",
                    escape(&inner.name),
                    escape(outer)
                ));
            }
            return;
        }

        self.lines.push(format!(
            "{indent}\"{prefix}{id}\" [shape=box style=\"filled,rounded\" color=orange label=\"{label}\" fontsize={fs}];"
        ));
        for input in node.present_inputs() {
            self.lines
                .push(format!("{indent}\"{prefix}{}\" -> \"{prefix}{id}\";", escape(input)));
        }
        for output in node.outputs.iter().filter(|o| !o.is_empty()) {
            self.lines
                .push(format!("{indent}\"{prefix}{id}\" -> \"{prefix}{}\";", escape(output)));
        }
    }
}

/// Render the session's graph in the DOT language.
pub fn to_dot(session: &Session, options: &DotOptions) -> String {
    let mut writer = DotWriter {
        options,
        shapes: options.shapes.then(|| session.shapes()),
        inplaces: session.inplaces().into_iter().collect(),
        lines: vec![
            "digraph{".to_string(),
            "  orientation=portrait;".to_string(),
            "  ranksep=0.25;".to_string(),
            "  nodesep=0.05;".to_string(),
        ],
    };
    writer.graph(session.graph(), &options.prefix, "  ");
    writer.lines.push("}".to_string());
    writer.lines.join("\n")
}

#[derive(Debug, Clone, Serialize)]
pub struct ValueRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializerRecord {
    pub name: String,
    pub dtype: String,
    pub dims: Vec<usize>,
    /// Every element, for small tensors only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeRecord {
    pub name: String,
    pub op_type: String,
    pub domain: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphRecord {
    pub name: String,
    pub opsets: BTreeMap<String, i64>,
    pub inputs: Vec<ValueRecord>,
    pub outputs: Vec<ValueRecord>,
    pub initializers: Vec<InitializerRecord>,
    pub nodes: Vec<NodeRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelRecord {
    pub ir_version: i64,
    pub producer_name: String,
    pub producer_version: String,
    pub domain: String,
    pub model_version: i64,
    pub doc_string: String,
    pub runtime: String,
    pub graph: GraphRecord,
}

/// Initializers up to this many elements carry their values.
const MAX_JSON_VALUES: usize = 16;

fn tensor_json(tensor: &Tensor) -> serde_json::Value {
    match tensor.storage() {
        CpuStorage::F32(v) => json!(v),
        CpuStorage::F64(v) => json!(v),
        CpuStorage::I64(v) => json!(v),
        CpuStorage::Bool(v) => json!(v),
        CpuStorage::Str(v) => json!(v),
    }
}

fn attribute_json(attribute: &Attribute) -> serde_json::Value {
    match attribute {
        Attribute::Float(v) => json!(v),
        Attribute::Int(v) => json!(v),
        Attribute::String(v) => json!(v),
        Attribute::Tensor(t) => json!({
            "dtype": t.dtype().to_string(),
            "dims": t.dims(),
            "values": tensor_json(t),
        }),
        Attribute::Graph(g) => json!(graph_record(g)),
        Attribute::Floats(v) => json!(v),
        Attribute::Ints(v) => json!(v),
        Attribute::Strings(v) => json!(v),
        Attribute::Tensors(v) => json!(v.iter().map(|t| t.dims().to_vec()).collect::<Vec<_>>()),
        Attribute::Graphs(v) => json!(v.iter().map(|g| graph_record(g)).collect::<Vec<_>>()),
    }
}

fn value_records<'a>(infos: impl Iterator<Item = &'a ValueInfo>) -> Vec<ValueRecord> {
    infos
        .map(|v| ValueRecord {
            name: v.name.clone(),
            ty: v.ty.to_string(),
        })
        .collect()
}

/// The record tree of one graph, nested graphs included.
pub fn graph_record(graph: &Graph) -> GraphRecord {
    GraphRecord {
        name: graph.name().to_string(),
        opsets: graph
            .opsets()
            .iter()
            .map(|(d, v)| (d.to_string(), v))
            .collect(),
        inputs: value_records(graph.inputs().iter()),
        outputs: value_records(graph.outputs().iter()),
        initializers: graph
            .initializers()
            .iter()
            .filter_map(|(name, value)| value.as_tensor().ok().map(|t| (name, t)))
            .map(|(name, t)| InitializerRecord {
                name: name.clone(),
                dtype: t.dtype().to_string(),
                dims: t.dims().to_vec(),
                values: (t.numel() <= MAX_JSON_VALUES).then(|| tensor_json(t)),
            })
            .collect(),
        nodes: graph
            .nodes()
            .iter()
            .map(|n| NodeRecord {
                name: n.name.clone(),
                op_type: n.op_type.clone(),
                domain: n.domain.clone(),
                inputs: n.inputs.clone(),
                outputs: n.outputs.clone(),
                attributes: n
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), attribute_json(v)))
                    .collect(),
            })
            .collect(),
    }
}

pub fn model_record(session: &Session) -> ModelRecord {
    let ModelInfo {
        ir_version,
        producer_name,
        producer_version,
        domain,
        model_version,
        doc_string,
    } = session.info().clone();
    ModelRecord {
        ir_version,
        producer_name,
        producer_version,
        domain,
        model_version,
        doc_string,
        runtime: session.runtime().to_string(),
        graph: graph_record(session.graph()),
    }
}

/// Pretty-printed JSON of [`model_record`].
pub fn to_json(session: &Session) -> Result<String> {
    Ok(serde_json::to_string_pretty(&model_record(session))?)
}
