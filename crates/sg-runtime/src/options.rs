use sg_kernels::RUNTIMES;
use tracing::warn;

pub const RUNTIME_VAR: &str = "STEPGRAPH_RUNTIME";
pub const INPLACE_VAR: &str = "STEPGRAPH_INPLACE";
pub const INFER_SHAPES_VAR: &str = "STEPGRAPH_INFER_SHAPES";

/// Settings fixed at session construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Name of the kernel registry: `"cpu"` or `"cpu-rowwise"`.
    pub runtime: String,
    /// Reuse buffers of values at their last consumer.
    pub inplace: bool,
    /// Run the shape-inference pass when the session is built.
    pub infer_shapes: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            runtime: "cpu".to_string(),
            inplace: true,
            infer_shapes: true,
        }
    }
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    pub fn inplace(mut self, inplace: bool) -> Self {
        self.inplace = inplace;
        self
    }

    pub fn infer_shapes(mut self, infer_shapes: bool) -> Self {
        self.infer_shapes = infer_shapes;
        self
    }

    /// Defaults overridden by `STEPGRAPH_RUNTIME`, `STEPGRAPH_INPLACE` and
    /// `STEPGRAPH_INFER_SHAPES`. Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();

        if let Some(value) = lookup(RUNTIME_VAR) {
            let value = value.trim().to_ascii_lowercase();
            if RUNTIMES.contains(&value.as_str()) {
                options.runtime = value;
            } else {
                warn!("Unsupported {} value '{}'", RUNTIME_VAR, value);
            }
        }
        if let Some(value) = lookup(INPLACE_VAR) {
            match parse_flag(&value) {
                Some(flag) => options.inplace = flag,
                None => warn!("Unsupported {} value '{}'", INPLACE_VAR, value),
            }
        }
        if let Some(value) = lookup(INFER_SHAPES_VAR) {
            match parse_flag(&value) {
                Some(flag) => options.infer_shapes = flag,
                None => warn!("Unsupported {} value '{}'", INFER_SHAPES_VAR, value),
            }
        }
        options
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
