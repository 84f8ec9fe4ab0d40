use sg_onnx::LoadError;
use sg_tensor::TensorError;
use thiserror::Error;

fn opset_label(version: &Option<i64>) -> String {
    match version {
        Some(v) => format!("opset {}", v),
        None => "an unimported domain".to_string(),
    }
}

fn domain_label(domain: &str) -> &str {
    if domain.is_empty() {
        "ai.onnx"
    } else {
        domain
    }
}

#[derive(Error, Debug)]
pub enum KernelError {
    #[error(
        "unsupported operator '{op_type}' in domain '{}' at {}",
        domain_label(.domain),
        opset_label(.version)
    )]
    UnsupportedOperator {
        op_type: String,
        domain: String,
        version: Option<i64>,
    },
    #[error("invalid attribute on node '{node}': {message}")]
    Attribute { node: String, message: String },
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("not implemented: {0}")]
    Unimplemented(String),
    #[error("unknown runtime '{0}' (expected 'cpu' or 'cpu-rowwise')")]
    UnknownRuntime(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("sub-graph '{attribute}' failed: {source}")]
    Subgraph {
        attribute: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("graph error: {0}")]
    Load(#[from] LoadError),
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}

pub type Result<T> = std::result::Result<T, KernelError>;
