mod support;

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::thread;

use approx::assert_abs_diff_eq;
use sg_onnx::{Attribute, DimSpec, GraphBuilder, Node, ValueInfo, ML_DOMAIN};
use sg_runtime::{topological_order, ErrorKind, RuntimeError, Session, SessionOptions};
use sg_tensor::{DType, Label, Tensor, Value};
use support::*;

fn dense_session(options: SessionOptions) -> Session {
    Session::from_graph(dense(), options).unwrap()
}

#[test]
fn test_dense_forward() {
    let s = dense_session(SessionOptions::default());
    let x = floats(vec![1.0, 2.0, 3.0, -1.0, 0.0, 0.0], &[2, 3]);
    let out = s.run(inputs(vec![("x", x)])).unwrap();
    let y = f32s(&out["y"]);
    let expected = [0.75, 5.75, 0.0, 0.75];
    assert_eq!(y.len(), expected.len());
    for (a, b) in y.iter().zip(expected) {
        assert_abs_diff_eq!(*a, b, epsilon = 1e-6);
    }
}

#[test]
fn test_order_is_valid_and_deterministic() {
    let g = GraphBuilder::new("diamond")
        .input(ValueInfo::tensor("x", DType::F32, &[DimSpec::Value(2)]))
        // declared out of dependency order
        .node(Node::new("Add", ["l", "r"], ["y"]).with_name("join"))
        .node(Node::new("Neg", ["x"], ["r"]).with_name("right"))
        .node(Node::new("Abs", ["x"], ["l"]).with_name("left"))
        .output(ValueInfo::tensor("y", DType::F32, &[DimSpec::Value(2)]))
        .build()
        .unwrap();

    let first = topological_order(&g, &HashSet::new()).unwrap();
    for _ in 0..5 {
        assert_eq!(topological_order(&g, &HashSet::new()).unwrap(), first);
    }
    // every input is produced before it is read
    let mut available: HashSet<&str> = ["x"].into_iter().collect();
    for &i in &first {
        let node = &g.nodes()[i];
        assert!(node.present_inputs().all(|name| available.contains(name)));
        available.extend(node.outputs.iter().map(String::as_str));
    }

    let s = Session::from_graph(g, SessionOptions::default()).unwrap();
    let names: Vec<&str> = s.order().iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names.last(), Some(&"join"));
}

#[test]
fn test_cycle_rejected_at_load() {
    let g = GraphBuilder::new("loop")
        .input(ValueInfo::tensor("x", DType::F32, &[DimSpec::Value(1)]))
        .node(Node::new("Add", ["x", "b"], ["a"]).with_name("first"))
        .node(Node::new("Neg", ["a"], ["b"]).with_name("second"))
        .output(ValueInfo::tensor("b", DType::F32, &[DimSpec::Value(1)]))
        .build()
        .unwrap();
    let err = Session::from_graph(g, SessionOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
}

#[test]
fn test_inferred_shapes_match_actual_outputs() {
    let s = dense_session(SessionOptions::default());
    let shapes = s.shapes();
    assert_eq!(shapes["xw"].to_string(), "(N, 2)");

    let x = floats(vec![0.5; 12], &[4, 3]);
    let (out, trace) = s.run_with_trace(inputs(vec![("x", x)])).unwrap();
    assert_eq!(trace.bindings.get("N"), Some(&4));
    let resolved = shapes["y"].resolve(&trace.bindings).unwrap();
    assert_eq!(resolved, out["y"].as_tensor().unwrap().dims());
}

#[test]
fn test_inplace_does_not_change_results() {
    let on = dense_session(SessionOptions::new().inplace(true));
    let off = dense_session(SessionOptions::new().inplace(false));
    assert_eq!(on.inplaces(), vec!["z", "y"]);
    assert!(off.inplaces().is_empty());

    let x = floats(vec![1.0, -2.0, 3.0, 0.5, 0.5, -4.0], &[2, 3]);
    let (a, trace_on) = on.run_with_trace(inputs(vec![("x", x.clone())])).unwrap();
    let (b, trace_off) = off.run_with_trace(inputs(vec![("x", x.clone())])).unwrap();
    assert_eq!(a, b);
    assert!(trace_on.inplaced.contains(&"y".to_string()));
    assert!(trace_off.inplaced.is_empty());

    // the caller's input is never written through
    assert_eq!(f32s(&x), vec![1.0, -2.0, 3.0, 0.5, 0.5, -4.0]);
}

#[test]
fn test_intermediate_values_in_order() {
    let s = dense_session(SessionOptions::default());
    let values = s
        .run_intermediate(inputs(vec![("x", floats(vec![1.0, 2.0, 3.0], &[1, 3]))]))
        .unwrap();
    let names: Vec<&str> = values.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["x", "xw", "z", "y"]);
    assert_abs_diff_eq!(f32s(&values[1].1)[0], 0.5, epsilon = 1e-6);
}

#[test]
fn test_rowwise_runtime_agrees_with_cpu() {
    let cpu = dense_session(SessionOptions::default());
    let rowwise = dense_session(SessionOptions::new().runtime("cpu-rowwise"));
    assert_eq!(rowwise.runtime(), "cpu-rowwise");
    let x = floats((0..9).map(|v| v as f32 - 4.0).collect(), &[3, 3]);
    let a = cpu.run(inputs(vec![("x", x.clone())])).unwrap();
    let b = rowwise.run(inputs(vec![("x", x)])).unwrap();
    for (p, q) in f32s(&a["y"]).iter().zip(f32s(&b["y"])) {
        assert_abs_diff_eq!(*p, q, epsilon = 1e-5);
    }
}

#[test]
fn test_session_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Session>();
}

#[test]
fn test_concurrent_runs_share_a_session() {
    let s = dense_session(SessionOptions::default());
    thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let s = &s;
                scope.spawn(move || {
                    let x = floats(vec![i as f32; 3], &[1, 3]);
                    f32s(&s.run(inputs(vec![("x", x)])).unwrap()["y"])
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let i = i as f32;
            let y = handle.join().unwrap();
            // column sums of w are 1 and 2
            assert_abs_diff_eq!(y[0], (i + 0.25).max(0.0), epsilon = 1e-6);
            assert_abs_diff_eq!(y[1], (2.0 * i - 0.25).max(0.0), epsilon = 1e-6);
        }
    });
}

#[test]
fn test_unsupported_operator_named() {
    let g = GraphBuilder::new("g")
        .input(ValueInfo::tensor("x", DType::F32, &[DimSpec::Value(1)]))
        .node(
            Node::new("Frobnicate", ["x"], ["y"])
                .with_name("mystery")
                .with_domain("custom"),
        )
        .output(ValueInfo::tensor("y", DType::F32, &[DimSpec::Value(1)]))
        .build()
        .unwrap();
    let err = Session::from_graph(g, SessionOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperator);
    let message = err.to_string();
    assert!(message.contains("mystery"));
    assert!(message.contains("Frobnicate"));
    assert!(message.contains("custom"));
}

#[test]
fn test_label_encoder_end_to_end() {
    let g = GraphBuilder::new("labels")
        .input(ValueInfo::tensor("ids", DType::I64, &[DimSpec::Unknown]))
        .node(
            Node::new("LabelEncoder", ["ids"], ["names"])
                .with_domain(ML_DOMAIN)
                .with_attr("keys_int64s", Attribute::Ints(vec![1, 2]))
                .with_attr("values_strings", Attribute::Strings(vec!["a".into(), "b".into()]))
                .with_attr("default_string", Attribute::String("z".into())),
        )
        .output(ValueInfo::tensor("names", DType::Str, &[DimSpec::Unknown]))
        .build()
        .unwrap();
    let s = Session::from_graph(g, SessionOptions::default()).unwrap();
    let ids: Value = Tensor::from_vec(vec![1i64, 2, 7], &[3]).unwrap().into();
    let out = s.run(inputs(vec![("ids", ids)])).unwrap();
    let names = out["names"].as_tensor().unwrap().data::<String>().unwrap().to_vec();
    assert_eq!(names, vec!["a", "b", "z"]);
}

#[test]
fn test_linear_regressor_then_zipmap() {
    let g = GraphBuilder::new("ml")
        .input(ValueInfo::tensor("x", DType::F32, &["N".into(), DimSpec::Value(2)]))
        .node(
            Node::new("LinearRegressor", ["x"], ["score"])
                .with_domain(ML_DOMAIN)
                .with_attr("coefficients", Attribute::Floats(vec![1.0, 2.0]))
                .with_attr("intercepts", Attribute::Floats(vec![1.0])),
        )
        .node(
            Node::new("ZipMap", ["score"], ["records"])
                .with_domain(ML_DOMAIN)
                .with_attr("classlabels_strings", Attribute::Strings(vec!["price".into()])),
        )
        .output(ValueInfo::new("records", sg_onnx::ValueType::Unknown))
        .build()
        .unwrap();
    let s = Session::from_graph(g, SessionOptions::default()).unwrap();
    let out = s
        .run(inputs(vec![("x", floats(vec![3.0, 4.0, 0.0, 1.0], &[2, 2]))]))
        .unwrap();
    let records = out["records"].as_records().unwrap();
    assert_eq!(records.len(), 2);
    let key = Label::Str("price".into());
    assert_abs_diff_eq!(records[0][&key], 12.0, epsilon = 1e-6);
    assert_abs_diff_eq!(records[1][&key], 3.0, epsilon = 1e-6);
}

#[test]
fn test_scan_running_sum() {
    let s = Session::from_graph(running_sum(), SessionOptions::default()).unwrap();
    let out = s
        .run(inputs(vec![
            ("init", Tensor::scalar(0.0f32).into()),
            ("xs", floats(vec![1.0, 2.0, 3.0], &[3])),
        ]))
        .unwrap();
    assert_eq!(f32s(&out["total"]), vec![6.0]);
    assert_eq!(f32s(&out["partial"]), vec![1.0, 3.0, 6.0]);
    assert_eq!(out["partial"].as_tensor().unwrap().dims(), &[3]);
}

#[test]
fn test_scan_body_reads_outer_value() {
    for inplace in [true, false] {
        let s = Session::from_graph(scaled_running_sum(), SessionOptions::new().inplace(inplace))
            .unwrap();
        for _ in 0..2 {
            let out = s
                .run(inputs(vec![
                    ("gain", Tensor::scalar(1.5f32).into()),
                    ("init", Tensor::scalar(0.0f32).into()),
                    ("xs", floats(vec![1.0, 2.0, 3.0], &[3])),
                ]))
                .unwrap();
            assert_eq!(f32s(&out["partial"]), vec![3.0, 9.0, 18.0], "inplace={}", inplace);
            assert_eq!(f32s(&out["shifted"]), vec![21.0], "inplace={}", inplace);
        }
    }
}

#[test]
fn test_scan_body_arity_is_a_load_error() {
    let body = GraphBuilder::new("short")
        .input(ValueInfo::tensor("acc", DType::F32, &[]))
        .input(ValueInfo::tensor("item", DType::F32, &[]))
        .node(Node::new("Add", ["acc", "item"], ["next"]))
        .output(ValueInfo::tensor("next", DType::F32, &[]))
        .build()
        .unwrap();
    let g = GraphBuilder::new("g")
        .input(ValueInfo::tensor("init", DType::F32, &[]))
        .input(ValueInfo::tensor("xs", DType::F32, &[DimSpec::Value(3)]))
        .node(
            Node::new("Scan", ["init", "xs"], ["total", "partial"])
                .with_attr("body", Attribute::Graph(Arc::new(body)))
                .with_attr("num_scan_inputs", Attribute::Int(1)),
        )
        .output(ValueInfo::tensor("total", DType::F32, &[]))
        .build()
        .unwrap();
    let err = Session::from_graph(g, SessionOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
}

#[test]
fn test_declared_width_checked_before_running() {
    let s = dense_session(SessionOptions::default());
    // N binds, but the inner width does not match the declaration
    let err = s
        .run(inputs(vec![("x", floats(vec![1.0; 4], &[2, 2]))]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    assert!(matches!(err, RuntimeError::InputShape { .. }));
}

#[test]
fn test_open_model_file() {
    let graph = Pb::new()
        .string(2, "scale")
        .message(1, node("Mul", &["x", "k"], &["y"]))
        .message(5, float_tensor("k", &[1], &[3.0]))
        .message(11, value_info("x", float_type(&[Err("N")])))
        .message(12, value_info("y", float_type(&[Err("N")])));
    let bytes = model(graph, &[("", 13)]);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let s = Session::open(file.path(), SessionOptions::default()).unwrap();
    assert_eq!(s.info().producer_name, "stepgraph-tests");
    assert_eq!(s.input_names(), vec!["x"]);
    let out = s.run_positional(vec![floats(vec![1.0, 2.0], &[2])]).unwrap();
    assert_eq!(f32s(&out["y"]), vec![3.0, 6.0]);
}

#[test]
fn test_open_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Session::open(dir.path().join("absent.onnx"), SessionOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
}

#[test]
fn test_kernel_failure_names_node() {
    let s = Session::from_graph(running_sum(), SessionOptions::default()).unwrap();
    let err = s
        .run(inputs(vec![
            ("init", Tensor::scalar(0.0f32).into()),
            ("xs", floats(vec![], &[0])),
        ]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert!(matches!(err, RuntimeError::Node { ref node, .. } if node == "scan"));
}
