use sg_kernels::KernelError;
use sg_onnx::LoadError;
use sg_tensor::{DType, TensorError};
use thiserror::Error;

/// Coarse classification of a [`RuntimeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed file or graph structure.
    Load,
    /// No kernel registered for an operator at the imported opset.
    UnsupportedOperator,
    /// An attribute is missing, mistyped or malformed.
    Attribute,
    ShapeMismatch,
    /// The operator is recognized but this configuration is not computed.
    UnimplementedSemantics,
    /// Missing, extra or mismatched execution inputs.
    Input,
    Execution,
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("load error: {0}")]
    Load(#[from] LoadError),
    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),
    #[error("node '{node}' ({op_type}): {source}")]
    Node {
        node: String,
        op_type: String,
        #[source]
        source: KernelError,
    },
    #[error("missing input '{0}'")]
    MissingInput(String),
    #[error("'{0}' is not an input of the graph")]
    UnexpectedInput(String),
    #[error("expected {expected} inputs, got {got}")]
    InputCount { expected: usize, got: usize },
    #[error("input '{name}' must be {expected}, got {got}")]
    InputType {
        name: String,
        expected: DType,
        got: String,
    },
    #[error("input '{name}' has an incompatible shape: {message}")]
    InputShape { name: String, message: String },
    #[error("node '{node}' reads '{name}', which holds no value")]
    MissingValue { node: String, name: String },
    #[error("node '{node}' produced {got} outputs, expected {expected}")]
    OutputCount {
        node: String,
        expected: usize,
        got: usize,
    },
    #[error("JSON export failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl RuntimeError {
    pub(crate) fn node(node: &sg_onnx::Node, source: KernelError) -> Self {
        RuntimeError::Node {
            node: node.name.clone(),
            op_type: node.op_type.clone(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::Load(_) => ErrorKind::Load,
            RuntimeError::Kernel(e) | RuntimeError::Node { source: e, .. } => kernel_kind(e),
            RuntimeError::MissingInput(_)
            | RuntimeError::UnexpectedInput(_)
            | RuntimeError::InputCount { .. }
            | RuntimeError::InputType { .. } => ErrorKind::Input,
            RuntimeError::InputShape { .. } => ErrorKind::ShapeMismatch,
            RuntimeError::MissingValue { .. }
            | RuntimeError::OutputCount { .. }
            | RuntimeError::Json(_) => ErrorKind::Execution,
        }
    }
}

fn kernel_kind(error: &KernelError) -> ErrorKind {
    match error {
        KernelError::UnsupportedOperator { .. } => ErrorKind::UnsupportedOperator,
        KernelError::Attribute { .. } => ErrorKind::Attribute,
        KernelError::ShapeMismatch(_) => ErrorKind::ShapeMismatch,
        KernelError::Unimplemented(_) => ErrorKind::UnimplementedSemantics,
        KernelError::UnknownRuntime(_) | KernelError::Load(_) => ErrorKind::Load,
        KernelError::InvalidInput(_) => ErrorKind::Execution,
        KernelError::Subgraph { source, .. } => match source.downcast_ref::<RuntimeError>() {
            Some(inner) => inner.kind(),
            None => ErrorKind::Execution,
        },
        KernelError::Tensor(e) => match e {
            TensorError::ShapeMismatch { .. }
            | TensorError::BroadcastError { .. }
            | TensorError::MatmulMismatch { .. }
            | TensorError::DataLength { .. }
            | TensorError::InvalidAxis { .. } => ErrorKind::ShapeMismatch,
            _ => ErrorKind::Execution,
        },
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
