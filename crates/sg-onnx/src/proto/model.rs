//! Decoding of `ModelProto`, `GraphProto`, `NodeProto`, `AttributeProto` and
//! the value-info type messages.

use std::sync::Arc;

use sg_tensor::Tensor;
use tracing::{debug, warn};

use super::tensor::{decode_tensor, widened_dtype};
use super::wire::Reader;
use crate::builder::GraphBuilder;
use crate::error::{LoadError, Result};
use crate::graph::{
    Attribute, AttributeKind, DimSpec, Graph, Model, Node, Opsets, ValueInfo, ValueType,
};

/// Graph attributes nested deeper than this are rejected.
const MAX_GRAPH_DEPTH: usize = 64;

pub fn decode_model(buf: &[u8]) -> Result<Model> {
    const CTX: &str = "ModelProto";
    let mut ir_version = 0;
    let mut producer_name = String::new();
    let mut producer_version = String::new();
    let mut domain = String::new();
    let mut model_version = 0;
    let mut doc_string = String::new();
    let mut graph_bytes = None;
    let mut opsets = Opsets::new();

    let mut r = Reader::new(buf, CTX);
    while let Some((field, payload)) = r.next_field()? {
        match field {
            1 => ir_version = payload.as_i64(CTX)?,
            2 => producer_name = payload.as_string(CTX)?,
            3 => producer_version = payload.as_string(CTX)?,
            4 => domain = payload.as_string(CTX)?,
            5 => model_version = payload.as_i64(CTX)?,
            6 => doc_string = payload.as_string(CTX)?,
            7 => graph_bytes = Some(payload.as_bytes(CTX)?),
            8 => {
                let (d, v) = decode_opset(payload.as_bytes(CTX)?)?;
                opsets.insert(&d, v);
            }
            _ => {}
        }
    }

    let graph_bytes = graph_bytes.ok_or(LoadError::MissingGraph)?;
    if opsets.version("").is_none() {
        return Err(LoadError::MissingOpset);
    }
    let graph = decode_graph(graph_bytes, &opsets, 0)?;
    debug!(
        ir_version,
        producer = %producer_name,
        nodes = graph.nodes().len(),
        "decoded model"
    );

    Ok(Model {
        ir_version,
        producer_name,
        producer_version,
        domain,
        model_version,
        doc_string,
        graph,
    })
}

fn decode_opset(buf: &[u8]) -> Result<(String, i64)> {
    const CTX: &str = "OperatorSetIdProto";
    let mut domain = String::new();
    let mut version = 0;
    let mut r = Reader::new(buf, CTX);
    while let Some((field, payload)) = r.next_field()? {
        match field {
            1 => domain = payload.as_string(CTX)?,
            2 => version = payload.as_i64(CTX)?,
            _ => {}
        }
    }
    Ok((domain, version))
}

/// Decode a graph. Nested graphs inherit `opsets` from the model.
pub fn decode_graph(buf: &[u8], opsets: &Opsets, depth: usize) -> Result<Graph> {
    const CTX: &str = "GraphProto";
    if depth > MAX_GRAPH_DEPTH {
        return Err(LoadError::Structure(format!(
            "graph attributes nested deeper than {}",
            MAX_GRAPH_DEPTH
        )));
    }
    let mut name = String::new();
    let mut doc_string = String::new();
    let mut nodes = Vec::new();
    let mut initializers = Vec::new();
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    let mut value_infos = Vec::new();

    let mut r = Reader::new(buf, CTX);
    while let Some((field, payload)) = r.next_field()? {
        match field {
            1 => nodes.push(decode_node(payload.as_bytes(CTX)?, opsets, depth)?),
            2 => name = payload.as_string(CTX)?,
            5 => initializers.push(decode_tensor(payload.as_bytes(CTX)?)?),
            10 => doc_string = payload.as_string(CTX)?,
            11 => inputs.push(decode_value_info(payload.as_bytes(CTX)?)?),
            12 => outputs.push(decode_value_info(payload.as_bytes(CTX)?)?),
            13 => value_infos.push(decode_value_info(payload.as_bytes(CTX)?)?),
            15 => {
                return Err(LoadError::Structure(
                    "sparse initializers are not supported".to_string(),
                ))
            }
            _ => {}
        }
    }

    let mut builder = GraphBuilder::new(name)
        .opsets(opsets.clone())
        .doc_string(doc_string);
    for info in inputs {
        builder = builder.input(info);
    }
    for info in outputs {
        builder = builder.output(info);
    }
    for info in value_infos {
        builder = builder.value_info(info);
    }
    for (name, tensor) in initializers {
        builder = builder.initializer(name, tensor);
    }
    for node in nodes {
        builder = builder.node(node);
    }
    builder.build()
}

fn decode_node(buf: &[u8], opsets: &Opsets, depth: usize) -> Result<Node> {
    const CTX: &str = "NodeProto";
    let mut node = Node::new("", Vec::<String>::new(), Vec::<String>::new());
    let mut r = Reader::new(buf, CTX);
    while let Some((field, payload)) = r.next_field()? {
        match field {
            1 => node.inputs.push(payload.as_string(CTX)?),
            2 => node.outputs.push(payload.as_string(CTX)?),
            3 => node.name = payload.as_string(CTX)?,
            4 => node.op_type = payload.as_string(CTX)?,
            5 => {
                let (name, attr) = decode_attribute(payload.as_bytes(CTX)?, opsets, depth)?;
                node.attributes.insert(name, attr);
            }
            6 => node.doc_string = payload.as_string(CTX)?,
            7 => node.domain = payload.as_string(CTX)?,
            _ => {}
        }
    }
    if node.op_type.is_empty() {
        return Err(LoadError::decode(CTX, format!("node '{}' has no op_type", node.name)));
    }
    Ok(node)
}

fn decode_attribute(buf: &[u8], opsets: &Opsets, depth: usize) -> Result<(String, Attribute)> {
    const CTX: &str = "AttributeProto";
    let mut name = String::new();
    let mut kind_id = None;
    let mut f = None;
    let mut i = None;
    let mut s = None;
    let mut t: Option<Tensor> = None;
    let mut g: Option<Graph> = None;
    let mut floats = Vec::new();
    let mut ints = Vec::new();
    let mut strings = Vec::new();
    let mut tensors = Vec::new();
    let mut graphs = Vec::new();

    let mut r = Reader::new(buf, CTX);
    while let Some((field, payload)) = r.next_field()? {
        match field {
            1 => name = payload.as_string(CTX)?,
            2 => f = Some(payload.as_f32(CTX)?),
            3 => i = Some(payload.as_i64(CTX)?),
            4 => s = Some(payload.as_string(CTX)?),
            5 => t = Some(decode_tensor(payload.as_bytes(CTX)?)?.1),
            6 => g = Some(decode_graph(payload.as_bytes(CTX)?, opsets, depth + 1)?),
            7 => payload.extend_f32(&mut floats, CTX)?,
            8 => payload.extend_i64(&mut ints, CTX)?,
            9 => strings.push(payload.as_string(CTX)?),
            10 => tensors.push(decode_tensor(payload.as_bytes(CTX)?)?.1),
            11 => graphs.push(Arc::new(decode_graph(payload.as_bytes(CTX)?, opsets, depth + 1)?)),
            20 => kind_id = Some(payload.as_i64(CTX)?),
            21 => warn!(attribute = %name, "ignoring ref_attr_name, function attributes are not supported"),
            _ => {}
        }
    }

    // Producers older than IR version 2 omit the type tag; infer it from the
    // populated field.
    let kind = match kind_id {
        Some(id) => AttributeKind::from_onnx(id)
            .ok_or_else(|| LoadError::decode(CTX, format!("attribute '{}' has unknown type {}", name, id)))?,
        None if f.is_some() => AttributeKind::Float,
        None if i.is_some() => AttributeKind::Int,
        None if s.is_some() => AttributeKind::String,
        None if t.is_some() => AttributeKind::Tensor,
        None if g.is_some() => AttributeKind::Graph,
        None if !floats.is_empty() => AttributeKind::Floats,
        None if !ints.is_empty() => AttributeKind::Ints,
        None if !strings.is_empty() => AttributeKind::Strings,
        None if !tensors.is_empty() => AttributeKind::Tensors,
        None if !graphs.is_empty() => AttributeKind::Graphs,
        None => {
            return Err(LoadError::decode(
                CTX,
                format!("attribute '{}' has no type and no value", name),
            ))
        }
    };

    let missing = |what: &str| LoadError::decode(CTX, format!("attribute '{}' of type {} has no {}", name, kind, what));
    let value = match kind {
        AttributeKind::Float => Attribute::Float(f.unwrap_or(0.0)),
        AttributeKind::Int => Attribute::Int(i.unwrap_or(0)),
        AttributeKind::String => Attribute::String(s.unwrap_or_default()),
        AttributeKind::Tensor => Attribute::Tensor(t.ok_or_else(|| missing("tensor"))?),
        AttributeKind::Graph => Attribute::Graph(Arc::new(g.ok_or_else(|| missing("graph"))?)),
        AttributeKind::Floats => Attribute::Floats(floats),
        AttributeKind::Ints => Attribute::Ints(ints),
        AttributeKind::Strings => Attribute::Strings(strings),
        AttributeKind::Tensors => Attribute::Tensors(tensors),
        AttributeKind::Graphs => Attribute::Graphs(graphs),
    };
    Ok((name, value))
}

fn decode_value_info(buf: &[u8]) -> Result<ValueInfo> {
    const CTX: &str = "ValueInfoProto";
    let mut name = String::new();
    let mut ty = ValueType::Unknown;
    let mut r = Reader::new(buf, CTX);
    while let Some((field, payload)) = r.next_field()? {
        match field {
            1 => name = payload.as_string(CTX)?,
            2 => ty = decode_type(payload.as_bytes(CTX)?)?,
            _ => {}
        }
    }
    Ok(ValueInfo::new(name, ty))
}

fn decode_type(buf: &[u8]) -> Result<ValueType> {
    const CTX: &str = "TypeProto";
    let mut ty = ValueType::Unknown;
    let mut r = Reader::new(buf, CTX);
    while let Some((field, payload)) = r.next_field()? {
        match field {
            1 => ty = decode_tensor_type(payload.as_bytes(CTX)?)?,
            4 => ty = ValueType::Sequence(Box::new(decode_sequence_type(payload.as_bytes(CTX)?)?)),
            5 => ty = decode_map_type(payload.as_bytes(CTX)?)?,
            _ => {}
        }
    }
    Ok(ty)
}

fn decode_tensor_type(buf: &[u8]) -> Result<ValueType> {
    const CTX: &str = "TypeProto.Tensor";
    let mut dtype = None;
    let mut shape = None;
    let mut r = Reader::new(buf, CTX);
    while let Some((field, payload)) = r.next_field()? {
        match field {
            1 => dtype = widened_dtype(payload.as_i64(CTX)? as i32)?,
            2 => shape = Some(decode_shape(payload.as_bytes(CTX)?)?),
            _ => {}
        }
    }
    Ok(ValueType::Tensor { dtype, shape })
}

fn decode_shape(buf: &[u8]) -> Result<Vec<DimSpec>> {
    const CTX: &str = "TensorShapeProto";
    let mut dims = Vec::new();
    let mut r = Reader::new(buf, CTX);
    while let Some((field, payload)) = r.next_field()? {
        if field == 1 {
            dims.push(decode_dim(payload.as_bytes(CTX)?)?);
        }
    }
    Ok(dims)
}

fn decode_dim(buf: &[u8]) -> Result<DimSpec> {
    const CTX: &str = "TensorShapeProto.Dimension";
    let mut dim = DimSpec::Unknown;
    let mut r = Reader::new(buf, CTX);
    while let Some((field, payload)) = r.next_field()? {
        match field {
            // Some exporters write -1 for a free dimension.
            1 => {
                let v = payload.as_i64(CTX)?;
                dim = if v < 0 { DimSpec::Unknown } else { DimSpec::Value(v) };
            }
            2 => dim = DimSpec::from(payload.as_string(CTX)?.as_str()),
            _ => {}
        }
    }
    Ok(dim)
}

fn decode_sequence_type(buf: &[u8]) -> Result<ValueType> {
    const CTX: &str = "TypeProto.Sequence";
    let mut elem = ValueType::Unknown;
    let mut r = Reader::new(buf, CTX);
    while let Some((field, payload)) = r.next_field()? {
        if field == 1 {
            elem = decode_type(payload.as_bytes(CTX)?)?;
        }
    }
    Ok(elem)
}

fn decode_map_type(buf: &[u8]) -> Result<ValueType> {
    const CTX: &str = "TypeProto.Map";
    let mut key = None;
    let mut value = ValueType::Unknown;
    let mut r = Reader::new(buf, CTX);
    while let Some((field, payload)) = r.next_field()? {
        match field {
            1 => key = widened_dtype(payload.as_i64(CTX)? as i32)?,
            2 => value = decode_type(payload.as_bytes(CTX)?)?,
            _ => {}
        }
    }
    Ok(ValueType::Map {
        key,
        value: Box::new(value),
    })
}
