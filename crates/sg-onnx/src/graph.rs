use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use sg_tensor::{DType, Dimension, ShapeObject, Tensor, Value};

/// The default operator domain. `"ai.onnx"` is an alias for it.
pub const DEFAULT_DOMAIN: &str = "";
/// Domain of the traditional-ML operators (LabelEncoder, ZipMap, ...).
pub const ML_DOMAIN: &str = "ai.onnx.ml";

/// Maps the `"ai.onnx"` alias onto the default domain.
pub fn canonical_domain(domain: &str) -> &str {
    if domain == "ai.onnx" {
        DEFAULT_DOMAIN
    } else {
        domain
    }
}

/// Opset version imported for each operator domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Opsets {
    versions: BTreeMap<String, i64>,
}

impl Opsets {
    pub fn new() -> Self {
        Opsets::default()
    }

    pub fn insert(&mut self, domain: &str, version: i64) {
        self.versions
            .insert(canonical_domain(domain).to_string(), version);
    }

    pub fn version(&self, domain: &str) -> Option<i64> {
        self.versions.get(canonical_domain(domain)).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.versions.iter().map(|(d, v)| (d.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// One declared dimension of a value-info shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimSpec {
    Value(i64),
    Param(String),
    Unknown,
}

impl DimSpec {
    pub fn to_dimension(&self) -> Dimension {
        match self {
            DimSpec::Value(v) => Dimension::Known(*v),
            DimSpec::Param(p) => Dimension::symbol(p.as_str()),
            DimSpec::Unknown => Dimension::Unknown,
        }
    }
}

impl From<i64> for DimSpec {
    fn from(v: i64) -> Self {
        DimSpec::Value(v)
    }
}

impl From<&str> for DimSpec {
    fn from(p: &str) -> Self {
        if p.is_empty() || p == "?" {
            DimSpec::Unknown
        } else {
            DimSpec::Param(p.to_string())
        }
    }
}

impl fmt::Display for DimSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimSpec::Value(v) => write!(f, "{}", v),
            DimSpec::Param(p) => write!(f, "{}", p),
            DimSpec::Unknown => write!(f, "?"),
        }
    }
}

/// Declared type of a graph input, output or intermediate value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueType {
    /// `shape: None` means the rank is not declared.
    Tensor {
        dtype: Option<DType>,
        shape: Option<Vec<DimSpec>>,
    },
    Sequence(Box<ValueType>),
    Map {
        key: Option<DType>,
        value: Box<ValueType>,
    },
    Unknown,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Tensor { dtype, shape } => {
                match dtype {
                    Some(d) => write!(f, "{}", d)?,
                    None => write!(f, "?")?,
                }
                if let Some(dims) = shape {
                    let dims: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
                    write!(f, "[{}]", dims.join(", "))?;
                }
                Ok(())
            }
            ValueType::Sequence(inner) => write!(f, "seq({})", inner),
            ValueType::Map { key, value } => match key {
                Some(k) => write!(f, "map({}, {})", k, value),
                None => write!(f, "map(?, {})", value),
            },
            ValueType::Unknown => write!(f, "?"),
        }
    }
}

/// A named, typed graph value declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueInfo {
    pub name: String,
    pub ty: ValueType,
}

impl ValueInfo {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        ValueInfo {
            name: name.into(),
            ty,
        }
    }

    /// A tensor declaration with a known rank.
    pub fn tensor(name: impl Into<String>, dtype: DType, dims: &[DimSpec]) -> Self {
        ValueInfo::new(
            name,
            ValueType::Tensor {
                dtype: Some(dtype),
                shape: Some(dims.to_vec()),
            },
        )
    }

    pub fn dtype(&self) -> Option<DType> {
        match &self.ty {
            ValueType::Tensor { dtype, .. } => *dtype,
            _ => None,
        }
    }

    pub fn dims(&self) -> Option<&[DimSpec]> {
        match &self.ty {
            ValueType::Tensor { shape, .. } => shape.as_deref(),
            _ => None,
        }
    }

    /// The declaration as a symbolic shape; unknown for non-tensor types or
    /// undeclared ranks.
    pub fn shape_object(&self) -> ShapeObject {
        let shape = match self.dims() {
            Some(dims) => ShapeObject::new(
                dims.iter().map(DimSpec::to_dimension).collect(),
                self.dtype(),
            ),
            None => ShapeObject::unknown(self.dtype()),
        };
        shape.with_name(self.name.clone())
    }
}

/// Attribute value type tags, numbered as in `AttributeProto.AttributeType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Float = 1,
    Int = 2,
    String = 3,
    Tensor = 4,
    Graph = 5,
    Floats = 6,
    Ints = 7,
    Strings = 8,
    Tensors = 9,
    Graphs = 10,
}

impl AttributeKind {
    pub fn from_onnx(id: i64) -> Option<AttributeKind> {
        Some(match id {
            1 => AttributeKind::Float,
            2 => AttributeKind::Int,
            3 => AttributeKind::String,
            4 => AttributeKind::Tensor,
            5 => AttributeKind::Graph,
            6 => AttributeKind::Floats,
            7 => AttributeKind::Ints,
            8 => AttributeKind::Strings,
            9 => AttributeKind::Tensors,
            10 => AttributeKind::Graphs,
            _ => return None,
        })
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttributeKind::Float => "FLOAT",
            AttributeKind::Int => "INT",
            AttributeKind::String => "STRING",
            AttributeKind::Tensor => "TENSOR",
            AttributeKind::Graph => "GRAPH",
            AttributeKind::Floats => "FLOATS",
            AttributeKind::Ints => "INTS",
            AttributeKind::Strings => "STRINGS",
            AttributeKind::Tensors => "TENSORS",
            AttributeKind::Graphs => "GRAPHS",
        };
        write!(f, "{}", s)
    }
}

/// A node attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Float(f32),
    Int(i64),
    String(String),
    Tensor(Tensor),
    Graph(Arc<Graph>),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<String>),
    Tensors(Vec<Tensor>),
    Graphs(Vec<Arc<Graph>>),
}

impl Attribute {
    pub fn kind(&self) -> AttributeKind {
        match self {
            Attribute::Float(_) => AttributeKind::Float,
            Attribute::Int(_) => AttributeKind::Int,
            Attribute::String(_) => AttributeKind::String,
            Attribute::Tensor(_) => AttributeKind::Tensor,
            Attribute::Graph(_) => AttributeKind::Graph,
            Attribute::Floats(_) => AttributeKind::Floats,
            Attribute::Ints(_) => AttributeKind::Ints,
            Attribute::Strings(_) => AttributeKind::Strings,
            Attribute::Tensors(_) => AttributeKind::Tensors,
            Attribute::Graphs(_) => AttributeKind::Graphs,
        }
    }
}

/// One operator invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub op_type: String,
    pub domain: String,
    /// Input value names; an empty string marks an omitted optional input.
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attributes: BTreeMap<String, Attribute>,
    pub doc_string: String,
}

impl Node {
    pub fn new<I, O>(op_type: impl Into<String>, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Node {
            name: String::new(),
            op_type: op_type.into(),
            domain: String::new(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            attributes: BTreeMap::new(),
            doc_string: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: Attribute) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Nested graphs carried by this node's attributes.
    pub fn subgraphs(&self) -> impl Iterator<Item = (&str, &Graph)> {
        self.attributes.iter().flat_map(|(name, attr)| {
            let graphs: Vec<&Graph> = match attr {
                Attribute::Graph(g) => vec![g.as_ref()],
                Attribute::Graphs(gs) => gs.iter().map(Arc::as_ref).collect(),
                _ => Vec::new(),
            };
            graphs.into_iter().map(move |g| (name.as_str(), g))
        })
    }

    /// Input names actually supplied, skipping omitted optional inputs.
    pub fn present_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(String::as_str).filter(|s| !s.is_empty())
    }
}

/// An immutable computation graph.
///
/// Built through [`GraphBuilder`](crate::GraphBuilder), which validates name
/// uniqueness; node order is the declaration order and is not assumed to be
/// topological.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    pub(crate) name: String,
    pub(crate) doc_string: String,
    pub(crate) nodes: Vec<Node>,
    pub(crate) inputs: Vec<ValueInfo>,
    pub(crate) outputs: Vec<ValueInfo>,
    pub(crate) value_infos: Vec<ValueInfo>,
    /// Stored as values so executors can read them in place.
    pub(crate) initializers: BTreeMap<String, Value>,
    pub(crate) opsets: Opsets,
}

impl Graph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc_string(&self) -> &str {
        &self.doc_string
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn inputs(&self) -> &[ValueInfo] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ValueInfo] {
        &self.outputs
    }

    /// Declarations of intermediate values, if the producer recorded any.
    pub fn value_infos(&self) -> &[ValueInfo] {
        &self.value_infos
    }

    pub fn initializers(&self) -> &BTreeMap<String, Value> {
        &self.initializers
    }

    pub fn initializer(&self, name: &str) -> Option<&Tensor> {
        match self.initializers.get(name)? {
            Value::Tensor(t) => Some(t),
            Value::Records(_) => None,
        }
    }

    pub fn initializer_value(&self, name: &str) -> Option<&Value> {
        self.initializers.get(name)
    }

    pub fn opsets(&self) -> &Opsets {
        &self.opsets
    }

    /// Names read by this graph's nodes (including nested graphs) that are
    /// not defined inside it. These must come from an enclosing scope.
    pub fn free_names(&self) -> Vec<String> {
        let mut defined: std::collections::HashSet<&str> = self
            .inputs
            .iter()
            .map(|v| v.name.as_str())
            .chain(self.initializers.keys().map(String::as_str))
            .collect();
        for node in &self.nodes {
            defined.extend(node.outputs.iter().map(String::as_str));
        }
        let mut free = Vec::new();
        for node in &self.nodes {
            let nested = node.subgraphs().flat_map(|(_, g)| g.free_names());
            let reads: Vec<String> = node
                .present_inputs()
                .map(str::to_string)
                .chain(nested)
                .collect();
            for name in reads {
                if !defined.contains(name.as_str()) && !free.contains(&name) {
                    free.push(name);
                }
            }
        }
        free
    }
}

/// A loaded model file: metadata plus the top-level graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub ir_version: i64,
    pub producer_name: String,
    pub producer_version: String,
    pub domain: String,
    pub model_version: i64,
    pub doc_string: String,
    pub graph: Graph,
}

impl Model {
    /// Wrap a programmatically built graph with empty metadata.
    pub fn from_graph(graph: Graph) -> Self {
        Model {
            ir_version: 8,
            producer_name: String::new(),
            producer_version: String::new(),
            domain: String::new(),
            model_version: 0,
            doc_string: String::new(),
            graph,
        }
    }

    pub fn opsets(&self) -> &Opsets {
        self.graph.opsets()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opsets_alias() {
        let mut o = Opsets::new();
        o.insert("ai.onnx", 13);
        assert_eq!(o.version(""), Some(13));
        assert_eq!(o.version("ai.onnx"), Some(13));
        assert_eq!(o.version(ML_DOMAIN), None);
    }

    #[test]
    fn test_value_info_shape_object() {
        let vi = ValueInfo::tensor("X", DType::F32, &["N".into(), DimSpec::Value(2)]);
        assert_eq!(vi.shape_object().to_string(), "(N, 2)");
        let seq = ValueInfo::new("S", ValueType::Sequence(Box::new(ValueType::Unknown)));
        assert!(seq.shape_object().is_unknown());
        assert_eq!(seq.ty.to_string(), "seq(?)");
    }

    #[test]
    fn test_node_present_inputs() {
        let n = Node::new("Gemm", ["A", "B", ""], ["Y"]);
        assert_eq!(n.present_inputs().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_attribute_kind_ids() {
        for id in 1..=10 {
            let kind = AttributeKind::from_onnx(id).unwrap();
            assert_eq!(kind as i64, id);
        }
        assert!(AttributeKind::from_onnx(11).is_none());
        assert_eq!(Attribute::Ints(vec![1]).kind().to_string(), "INTS");
    }
}
