use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use sg_kernels::Registry;
use sg_onnx::{Graph, Model, Node, ValueInfo};
use sg_tensor::{Bindings, Dimension, ShapeObject, Value};
use tracing::{debug, info};

use crate::error::{Result, RuntimeError};
use crate::exec::Executor;
use crate::options::SessionOptions;
use crate::program::Program;
use crate::shapes;

/// Lifecycle of a session and of each call, logged at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loaded,
    Ordered,
    Bound,
    Running,
    Completed,
    Failed,
}

/// Model file metadata kept by a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelInfo {
    pub ir_version: i64,
    pub producer_name: String,
    pub producer_version: String,
    pub domain: String,
    pub model_version: i64,
    pub doc_string: String,
}

/// What a single call observed besides its outputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunTrace {
    /// Extents bound to each symbolic input dimension.
    pub bindings: Bindings,
    /// Outputs whose kernel reused an input buffer.
    pub inplaced: Vec<String>,
}

/// A graph compiled against one runtime, ready to run any number of times,
/// from any number of threads.
#[derive(Debug)]
pub struct Session {
    info: ModelInfo,
    registry: Registry,
    options: SessionOptions,
    program: Program,
    shapes: Option<BTreeMap<String, ShapeObject>>,
}

impl Session {
    /// Build with the registry named by `options.runtime`.
    pub fn new(model: Model, options: SessionOptions) -> Result<Self> {
        let registry = Registry::by_name(&options.runtime)?;
        Session::with_registry(model, registry, options)
    }

    pub fn open(path: impl AsRef<Path>, options: SessionOptions) -> Result<Self> {
        Session::new(Model::open(path)?, options)
    }

    pub fn from_graph(graph: Graph, options: SessionOptions) -> Result<Self> {
        Session::new(Model::from_graph(graph), options)
    }

    pub fn with_registry(model: Model, registry: Registry, options: SessionOptions) -> Result<Self> {
        let Model {
            ir_version,
            producer_name,
            producer_version,
            domain,
            model_version,
            doc_string,
            graph,
        } = model;
        let info = ModelInfo {
            ir_version,
            producer_name,
            producer_version,
            domain,
            model_version,
            doc_string,
        };
        debug!(phase = ?Phase::Loaded, graph = %graph.name(), nodes = graph.nodes().len());

        let opsets = graph.opsets().clone();
        let program = Program::compile(
            Arc::new(graph),
            &registry,
            &opsets,
            &HashSet::new(),
            0,
            options.inplace,
        )?;
        debug!(phase = ?Phase::Ordered, steps = program.steps.len());

        let shapes = options.infer_shapes.then(|| shapes::infer(&program));
        info!(
            graph = %program.graph.name(),
            runtime = registry.name(),
            nodes = program.steps.len(),
            inplace = options.inplace,
            "session ready"
        );
        Ok(Session {
            info,
            registry,
            options,
            program,
            shapes,
        })
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn graph(&self) -> &Graph {
        &self.program.graph
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn runtime(&self) -> &str {
        self.registry.name()
    }

    pub fn input_names(&self) -> Vec<&str> {
        self.graph().inputs().iter().map(|v| v.name.as_str()).collect()
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.graph().outputs().iter().map(|v| v.name.as_str()).collect()
    }

    /// Top-level nodes in execution order.
    pub fn order(&self) -> Vec<&Node> {
        self.program.ordered_nodes().collect()
    }

    /// Outputs planned to be written into one of their node's input buffers.
    pub fn inplaces(&self) -> Vec<String> {
        self.program.planned_inplace()
    }

    /// Inferred shape of every value of the top-level graph. Computed now when
    /// the session was built with `infer_shapes` off.
    pub fn shapes(&self) -> BTreeMap<String, ShapeObject> {
        match &self.shapes {
            Some(shapes) => shapes.clone(),
            None => shapes::infer(&self.program),
        }
    }

    pub fn run(&self, inputs: HashMap<String, Value>) -> Result<HashMap<String, Value>> {
        Ok(self.run_with_trace(inputs)?.0)
    }

    /// Inputs given in declaration order.
    pub fn run_positional(&self, inputs: Vec<Value>) -> Result<HashMap<String, Value>> {
        let declared = self.graph().inputs();
        if inputs.len() > declared.len() {
            return Err(RuntimeError::InputCount {
                expected: declared.len(),
                got: inputs.len(),
            });
        }
        let named = declared
            .iter()
            .map(|v| v.name.clone())
            .zip(inputs)
            .collect();
        self.run(named)
    }

    pub fn run_with_trace(&self, inputs: HashMap<String, Value>) -> Result<(HashMap<String, Value>, RunTrace)> {
        let (outputs, trace, _) = self.execute(inputs, false)?;
        Ok((outputs, trace))
    }

    /// Every value in execution order: the bound inputs, then each node
    /// output as it was produced.
    pub fn run_intermediate(&self, inputs: HashMap<String, Value>) -> Result<Vec<(String, Value)>> {
        Ok(self.execute(inputs, true)?.2)
    }

    fn execute(
        &self,
        inputs: HashMap<String, Value>,
        record: bool,
    ) -> Result<(HashMap<String, Value>, RunTrace, Vec<(String, Value)>)> {
        let (bound, bindings) = self.bind(inputs)?;
        debug!(phase = ?Phase::Bound, inputs = bound.len(), symbols = bindings.len());

        let executor = Executor::new(self.registry.backend().as_ref(), record);
        debug!(phase = ?Phase::Running);
        match executor.run(&self.program, bound) {
            Ok(outputs) => {
                debug!(phase = ?Phase::Completed, outputs = outputs.len());
                let (inplaced, snapshots) = executor.into_trace();
                Ok((outputs, RunTrace { bindings, inplaced }, snapshots))
            }
            Err(e) => {
                debug!(phase = ?Phase::Failed, error = %e);
                Err(e)
            }
        }
    }

    /// Check supplied inputs against the declarations, binding symbolic
    /// dimensions along the way. Returns inputs in declaration order.
    fn bind(&self, mut inputs: HashMap<String, Value>) -> Result<(Vec<(String, Value)>, Bindings)> {
        let graph = self.graph();
        let declared = graph.inputs();
        if let Some(extra) = inputs
            .keys()
            .filter(|name| !declared.iter().any(|v| &v.name == *name))
            .min()
        {
            return Err(RuntimeError::UnexpectedInput(extra.clone()));
        }

        let mut bindings = Bindings::new();
        let mut bound = Vec::with_capacity(inputs.len());
        for info in declared {
            match inputs.remove(&info.name) {
                Some(value) => {
                    check_input(info, &value, &mut bindings)?;
                    bound.push((info.name.clone(), value));
                }
                None if graph.initializer(&info.name).is_some() => {}
                None => return Err(RuntimeError::MissingInput(info.name.clone())),
            }
        }
        Ok((bound, bindings))
    }
}

fn check_input(info: &ValueInfo, value: &Value, bindings: &mut Bindings) -> Result<()> {
    let Some(expected) = info.dtype() else {
        return Ok(());
    };
    let tensor = match value {
        Value::Tensor(t) if t.dtype() == expected => t,
        other => {
            return Err(RuntimeError::InputType {
                name: info.name.clone(),
                expected,
                got: other.describe(),
            })
        }
    };
    let declared = info.shape_object();
    let Some(dims) = declared.dims() else {
        return Ok(());
    };
    let shape_error = |message: String| RuntimeError::InputShape {
        name: info.name.clone(),
        message,
    };
    if dims.len() != tensor.dims().len() {
        return Err(shape_error(format!(
            "declared rank {}, got {}",
            dims.len(),
            tensor.shape()
        )));
    }
    for (axis, (dim, &actual)) in dims.iter().zip(tensor.dims()).enumerate() {
        let actual = actual as i64;
        match dim {
            Dimension::Known(k) if *k != actual => {
                return Err(shape_error(format!(
                    "axis {} must be {}, got {}",
                    axis, k, actual
                )))
            }
            Dimension::Symbol(name) => match bindings.get(name) {
                Some(&previous) if previous != actual => {
                    return Err(shape_error(format!(
                        "'{}' is already bound to {}, got {} on axis {}",
                        name, previous, actual, axis
                    )))
                }
                Some(_) => {}
                None => {
                    bindings.insert(name.clone(), actual);
                }
            },
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sg_onnx::{DimSpec, GraphBuilder};
    use sg_tensor::{DType, Tensor};

    use crate::error::ErrorKind;

    fn session() -> Session {
        let g = GraphBuilder::new("g")
            .input(ValueInfo::tensor("a", DType::F32, &["N".into(), DimSpec::Value(2)]))
            .input(ValueInfo::tensor("b", DType::F32, &["N".into(), DimSpec::Unknown]))
            .node(Node::new("Add", ["a", "b"], ["c"]))
            .output(ValueInfo::tensor("c", DType::F32, &["N".into(), DimSpec::Value(2)]))
            .build()
            .unwrap();
        Session::from_graph(g, SessionOptions::default()).unwrap()
    }

    fn t(rows: usize, cols: usize) -> Value {
        Tensor::from_vec(vec![1.0f32; rows * cols], &[rows, cols]).unwrap().into()
    }

    fn inputs(pairs: Vec<(&str, Value)>) -> HashMap<String, Value> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_bindings_reported() {
        let s = session();
        let (out, trace) = s
            .run_with_trace(inputs(vec![("a", t(3, 2)), ("b", t(3, 2))]))
            .unwrap();
        assert_eq!(out["c"].as_tensor().unwrap().dims(), &[3, 2]);
        assert_eq!(trace.bindings.get("N"), Some(&3));
    }

    #[test]
    fn test_input_errors() {
        let s = session();
        let missing = s.run(inputs(vec![("a", t(1, 2))])).unwrap_err();
        assert!(matches!(missing, RuntimeError::MissingInput(ref n) if n == "b"));

        let extra = s
            .run(inputs(vec![("a", t(1, 2)), ("b", t(1, 2)), ("z", t(1, 2))]))
            .unwrap_err();
        assert_eq!(extra.kind(), ErrorKind::Input);

        let wrong_type: Value = Tensor::from_vec(vec![1i64, 2], &[1, 2]).unwrap().into();
        let err = s.run(inputs(vec![("a", wrong_type), ("b", t(1, 2))])).unwrap_err();
        assert!(matches!(err, RuntimeError::InputType { .. }));

        let err = s.run(inputs(vec![("a", t(1, 3)), ("b", t(1, 3))])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);

        // N bound to 2 by `a`, then 3 by `b`
        let err = s.run(inputs(vec![("a", t(2, 2)), ("b", t(3, 2))])).unwrap_err();
        assert!(matches!(err, RuntimeError::InputShape { ref name, .. } if name == "b"));
    }

    #[test]
    fn test_positional() {
        let s = session();
        let out = s.run_positional(vec![t(1, 2), t(1, 2)]).unwrap();
        assert_eq!(out["c"].as_tensor().unwrap().data::<f32>().unwrap(), &[2.0, 2.0]);
        assert!(matches!(
            s.run_positional(vec![t(1, 2)]),
            Err(RuntimeError::MissingInput(_))
        ));
        assert!(matches!(
            s.run_positional(vec![t(1, 2), t(1, 2), t(1, 2)]),
            Err(RuntimeError::InputCount { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn test_initializer_backed_input_is_optional() {
        let g = GraphBuilder::new("g")
            .input(ValueInfo::tensor("x", DType::F32, &[DimSpec::Value(1)]))
            .input(ValueInfo::tensor("w", DType::F32, &[DimSpec::Value(1)]))
            .initializer("w", Tensor::from_vec(vec![10.0f32], &[1]).unwrap())
            .node(Node::new("Mul", ["x", "w"], ["y"]))
            .output(ValueInfo::tensor("y", DType::F32, &[DimSpec::Value(1)]))
            .build()
            .unwrap();
        let s = Session::from_graph(g, SessionOptions::default()).unwrap();
        let x: Value = Tensor::from_vec(vec![2.0f32], &[1]).unwrap().into();
        let out = s.run(inputs(vec![("x", x.clone())])).unwrap();
        assert_eq!(out["y"].as_tensor().unwrap().data::<f32>().unwrap(), &[20.0]);

        let w: Value = Tensor::from_vec(vec![3.0f32], &[1]).unwrap().into();
        let out = s.run(inputs(vec![("x", x), ("w", w)])).unwrap();
        assert_eq!(out["y"].as_tensor().unwrap().data::<f32>().unwrap(), &[6.0]);
    }

    #[test]
    fn test_unknown_runtime() {
        let g = GraphBuilder::new("g").build().unwrap();
        let err = Session::from_graph(g, SessionOptions::new().runtime("tpu")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Load);
    }
}
