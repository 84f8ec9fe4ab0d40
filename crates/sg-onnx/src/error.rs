use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed protobuf in {context}: {message}")]
    Decode { context: String, message: String },
    #[error("model has no graph")]
    MissingGraph,
    #[error("model declares no opset for the default domain")]
    MissingOpset,
    #[error("unsupported ONNX element type {0}")]
    UnsupportedElemType(i32),
    #[error("tensor '{0}' uses external data, which is not supported")]
    ExternalData(String),
    #[error("duplicate name '{0}'")]
    DuplicateName(String),
    #[error("graph contains a cycle through nodes {nodes:?}")]
    Cycle { nodes: Vec<String> },
    #[error("node '{node}' reads '{name}', which is not an input, initializer or node output")]
    UnknownInput { node: String, name: String },
    #[error("invalid graph structure: {0}")]
    Structure(String),
    #[error("tensor error: {0}")]
    Tensor(#[from] sg_tensor::TensorError),
}

impl LoadError {
    pub(crate) fn decode(context: &str, message: impl Into<String>) -> Self {
        LoadError::Decode {
            context: context.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;
