//! Test-only graphs, plus a minimal protobuf writer for model files.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use sg_onnx::{Attribute, DimSpec, Graph, GraphBuilder, Node, ValueInfo};
use sg_tensor::{DType, Tensor, Value};

pub fn inputs(pairs: Vec<(&str, Value)>) -> HashMap<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

pub fn floats(data: Vec<f32>, dims: &[usize]) -> Value {
    Tensor::from_vec(data, dims).unwrap().into()
}

pub fn f32s(value: &Value) -> Vec<f32> {
    value.as_tensor().unwrap().data::<f32>().unwrap().to_vec()
}

/// `y = relu(x @ w + b)` with `x: [N, 3]`.
pub fn dense() -> Graph {
    GraphBuilder::new("dense")
        .input(ValueInfo::tensor("x", DType::F32, &["N".into(), DimSpec::Value(3)]))
        .initializer(
            "w",
            Tensor::from_vec(vec![1.0f32, -1.0, 0.5, 2.0, -0.5, 1.0], &[3, 2]).unwrap(),
        )
        .initializer("b", Tensor::from_vec(vec![0.25f32, -0.25], &[2]).unwrap())
        .node(Node::new("MatMul", ["x", "w"], ["xw"]).with_name("matmul"))
        .node(Node::new("Add", ["xw", "b"], ["z"]).with_name("bias"))
        .node(Node::new("Relu", ["z"], ["y"]).with_name("relu"))
        .output(ValueInfo::tensor("y", DType::F32, &["N".into(), DimSpec::Value(2)]))
        .build()
        .unwrap()
}

/// Cumulative sum over a 1-D input via Scan: outputs the total and every
/// partial sum.
pub fn running_sum() -> Graph {
    let body = GraphBuilder::new("step")
        .input(ValueInfo::tensor("acc", DType::F32, &[]))
        .input(ValueInfo::tensor("item", DType::F32, &[]))
        .node(Node::new("Add", ["acc", "item"], ["next"]))
        .node(Node::new("Identity", ["next"], ["emit"]))
        .output(ValueInfo::tensor("next", DType::F32, &[]))
        .output(ValueInfo::tensor("emit", DType::F32, &[]))
        .build()
        .unwrap();
    GraphBuilder::new("running_sum")
        .input(ValueInfo::tensor("init", DType::F32, &[]))
        .input(ValueInfo::tensor("xs", DType::F32, &["T".into()]))
        .node(
            Node::new("Scan", ["init", "xs"], ["total", "partial"])
                .with_name("scan")
                .with_attr("body", Attribute::Graph(Arc::new(body)))
                .with_attr("num_scan_inputs", Attribute::Int(1)),
        )
        .output(ValueInfo::tensor("total", DType::F32, &[]))
        .output(ValueInfo::tensor("partial", DType::F32, &["T".into()]))
        .build()
        .unwrap()
}

/// Running sum of `xs * scale`, where `scale = gain * 2` lives in the outer
/// graph and is read by the Scan body without being passed in. `scale` is
/// used again after the Scan.
pub fn scaled_running_sum() -> Graph {
    let body = GraphBuilder::new("scaled_step")
        .input(ValueInfo::tensor("acc", DType::F32, &[]))
        .input(ValueInfo::tensor("item", DType::F32, &[]))
        .node(Node::new("Mul", ["item", "scale"], ["scaled"]))
        .node(Node::new("Add", ["acc", "scaled"], ["next"]))
        .node(Node::new("Identity", ["next"], ["emit"]))
        .output(ValueInfo::tensor("next", DType::F32, &[]))
        .output(ValueInfo::tensor("emit", DType::F32, &[]))
        .build()
        .unwrap();
    GraphBuilder::new("scaled_running_sum")
        .input(ValueInfo::tensor("gain", DType::F32, &[]))
        .input(ValueInfo::tensor("init", DType::F32, &[]))
        .input(ValueInfo::tensor("xs", DType::F32, &["T".into()]))
        .initializer("two", Tensor::scalar(2.0f32))
        .node(Node::new("Mul", ["gain", "two"], ["scale"]).with_name("scale"))
        .node(
            Node::new("Scan", ["init", "xs"], ["total", "partial"])
                .with_name("scan")
                .with_attr("body", Attribute::Graph(Arc::new(body)))
                .with_attr("num_scan_inputs", Attribute::Int(1)),
        )
        .node(Node::new("Add", ["total", "scale"], ["shifted"]).with_name("shift"))
        .output(ValueInfo::tensor("shifted", DType::F32, &[]))
        .output(ValueInfo::tensor("partial", DType::F32, &["T".into()]))
        .build()
        .unwrap()
}

#[derive(Default, Clone)]
pub struct Pb {
    buf: Vec<u8>,
}

fn put_varint(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

impl Pb {
    pub fn new() -> Self {
        Pb::default()
    }

    fn key(&mut self, field: u32, wire: u8) {
        put_varint(&mut self.buf, (u64::from(field) << 3) | u64::from(wire));
    }

    pub fn int(mut self, field: u32, v: i64) -> Self {
        self.key(field, 0);
        put_varint(&mut self.buf, v as u64);
        self
    }

    pub fn bytes(mut self, field: u32, data: &[u8]) -> Self {
        self.key(field, 2);
        put_varint(&mut self.buf, data.len() as u64);
        self.buf.extend_from_slice(data);
        self
    }

    pub fn string(self, field: u32, s: &str) -> Self {
        self.bytes(field, s.as_bytes())
    }

    pub fn message(self, field: u32, msg: Pb) -> Self {
        self.bytes(field, &msg.buf)
    }

    pub fn packed_floats(self, field: u32, values: &[f32]) -> Self {
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.bytes(field, &payload)
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// A float tensor type; `Err` dims are symbolic parameters.
pub fn float_type(dims: &[Result<i64, &str>]) -> Pb {
    let mut shape = Pb::new();
    for d in dims {
        let dim = match d {
            Ok(v) => Pb::new().int(1, *v),
            Err(p) => Pb::new().string(2, p),
        };
        shape = shape.message(1, dim);
    }
    Pb::new().message(1, Pb::new().int(1, 1).message(2, shape))
}

pub fn value_info(name: &str, ty: Pb) -> Pb {
    Pb::new().string(1, name).message(2, ty)
}

pub fn float_tensor(name: &str, dims: &[i64], data: &[f32]) -> Pb {
    let mut t = Pb::new();
    for &d in dims {
        t = t.int(1, d);
    }
    t.int(2, 1).packed_floats(4, data).string(8, name)
}

pub fn node(op_type: &str, inputs: &[&str], outputs: &[&str]) -> Pb {
    let mut n = Pb::new();
    for i in inputs {
        n = n.string(1, i);
    }
    for o in outputs {
        n = n.string(2, o);
    }
    n.string(4, op_type)
}

pub fn model(graph: Pb, opsets: &[(&str, i64)]) -> Vec<u8> {
    let mut m = Pb::new()
        .int(1, 8)
        .string(2, "stepgraph-tests")
        .string(3, "0.1")
        .int(5, 1)
        .message(7, graph);
    for (domain, version) in opsets {
        m = m.message(8, Pb::new().string(1, domain).int(2, *version));
    }
    m.finish()
}
