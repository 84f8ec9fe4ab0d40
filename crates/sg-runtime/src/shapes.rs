//! Static shape pass over a compiled program.
//!
//! Runs in execution order and asks each kernel for its output shapes. A
//! kernel without shape support, or one that cannot tell from what it is
//! given, yields unknown shapes; the pass never fails.

use std::collections::BTreeMap;

use sg_onnx::ValueInfo;
use sg_tensor::ShapeObject;
use tracing::debug;

use crate::program::Program;

pub(crate) fn infer(program: &Program) -> BTreeMap<String, ShapeObject> {
    let graph = &program.graph;
    let mut shapes: BTreeMap<String, ShapeObject> = BTreeMap::new();
    for (name, value) in graph.initializers() {
        let shape = match value.as_tensor() {
            Ok(t) => ShapeObject::of_tensor(t),
            Err(_) => ShapeObject::unknown(None),
        };
        shapes.insert(name.clone(), shape.with_name(name.clone()));
    }
    for info in graph.inputs() {
        shapes.insert(info.name.clone(), info.shape_object());
    }

    // Declarations recorded in the file, used when a kernel cannot tell.
    let declared: BTreeMap<&str, &ValueInfo> = graph
        .value_infos()
        .iter()
        .chain(graph.outputs())
        .map(|v| (v.name.as_str(), v))
        .collect();

    for step in &program.steps {
        let node = program.node(step);
        let inputs: Vec<ShapeObject> = node.inputs[..step.arity]
            .iter()
            .map(|name| {
                shapes
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| ShapeObject::unknown(None))
            })
            .collect();
        let inferred = match step.kernel.infer_shapes(&inputs) {
            Some(out) if out.len() == node.outputs.len() => Some(out),
            Some(out) => {
                debug!(
                    node = %node.name,
                    expected = node.outputs.len(),
                    got = out.len(),
                    "shape inference returned the wrong number of shapes"
                );
                None
            }
            None => {
                debug!(node = %node.name, op_type = %node.op_type, "no shape inference, degrading to unknown");
                None
            }
        };
        for (i, name) in node.outputs.iter().enumerate() {
            if name.is_empty() {
                continue;
            }
            let from_kernel = inferred
                .as_ref()
                .map(|out| out[i].clone())
                .filter(|s| !s.is_unknown());
            let shape = match (from_kernel, declared.get(name.as_str())) {
                (Some(s), _) => s,
                (None, Some(info)) => info.shape_object(),
                (None, None) => ShapeObject::unknown(None),
            };
            shapes.insert(name.clone(), shape.with_name(name.clone()));
        }
    }
    shapes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    use sg_kernels::Registry;
    use sg_onnx::{Attribute, DimSpec, GraphBuilder, Node};
    use sg_tensor::{DType, Tensor};

    fn program(graph: sg_onnx::Graph) -> Program {
        let opsets = graph.opsets().clone();
        Program::compile(Arc::new(graph), &Registry::cpu(), &opsets, &HashSet::new(), 0, true).unwrap()
    }

    #[test]
    fn test_symbolic_chain() {
        let g = GraphBuilder::new("g")
            .input(ValueInfo::tensor("x", DType::F32, &["N".into(), DimSpec::Value(3)]))
            .initializer("w", Tensor::from_vec(vec![0.5f32; 6], &[3, 2]).unwrap())
            .node(Node::new("MatMul", ["x", "w"], ["h"]))
            .node(Node::new("Relu", ["h"], ["r"]))
            .node(
                Node::new("ReduceSum", ["r"], ["s"])
                    .with_attr("keepdims", Attribute::Int(0)),
            )
            .output(ValueInfo::new("s", sg_onnx::ValueType::Unknown))
            .build()
            .unwrap();
        let shapes = infer(&program(g));
        assert_eq!(shapes["h"].to_string(), "(N, 2)");
        assert_eq!(shapes["r"].to_string(), "(N, 2)");
        // opset 13 ReduceSum takes axes as an input; none given means all
        assert_eq!(shapes["s"].to_string(), "()");
        assert_eq!(shapes["w"].to_string(), "(3, 2)");
    }

    #[test]
    fn test_degrades_to_declaration_or_unknown() {
        let g = GraphBuilder::new("g")
            .input(ValueInfo::tensor("x", DType::F32, &[DimSpec::Value(4)]))
            .input(ValueInfo::tensor("shape", DType::I64, &[DimSpec::Value(2)]))
            .node(Node::new("Reshape", ["x", "shape"], ["y"]))
            .node(Node::new("Neg", ["y"], ["z"]))
            .value_info(ValueInfo::tensor("y", DType::F32, &[DimSpec::Value(2), DimSpec::Value(2)]))
            .output(ValueInfo::tensor("z", DType::F32, &[]))
            .build()
            .unwrap();
        let shapes = infer(&program(g));
        assert_eq!(shapes["y"].to_string(), "(2, 2)");
        assert_eq!(shapes["z"].to_string(), "(2, 2)");
    }
}
