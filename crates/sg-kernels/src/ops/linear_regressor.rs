use sg_onnx::{AttributeKind, Node};
use sg_tensor::{BinaryOp, DType, Dimension, Shape, ShapeObject, Tensor, Value};

use crate::attrs::{AttrReader, AttributeSpec};
use crate::error::{KernelError, Result};
use crate::kernel::{check_arity, tensor_at, Kernel, KernelContext};

const SCHEMA: &[AttributeSpec] = &[
    AttributeSpec::required("coefficients", AttributeKind::Floats),
    AttributeSpec::optional("intercepts", AttributeKind::Floats),
    AttributeSpec::int("targets", 1),
    AttributeSpec::string("post_transform", "NONE"),
];

/// Post transforms defined for the operator but not computed here.
const UNSUPPORTED_TRANSFORMS: &[&str] = &["SOFTMAX", "LOGISTIC", "SOFTMAX_ZERO", "PROBIT"];

/// `Y = X * C^T + intercepts` with `C` shaped `[targets, features]`.
///
/// A 1-D input is scored as a single row.
#[derive(Debug)]
pub struct LinearRegressor {
    /// Coefficients already laid out as `[features, targets]`.
    weights: Tensor,
    intercepts: Option<Tensor>,
    features: usize,
    targets: usize,
}

impl LinearRegressor {
    pub fn new(node: &Node) -> Result<Self> {
        let attrs = AttrReader::new(node, SCHEMA)?;
        let transform = attrs.string("post_transform")?;
        if UNSUPPORTED_TRANSFORMS.contains(&transform.as_str()) {
            return Err(KernelError::Unimplemented(format!(
                "LinearRegressor post_transform '{}'",
                transform
            )));
        }
        if transform != "NONE" {
            return Err(attrs.error(format!("unknown post_transform '{}'", transform)));
        }

        let targets = attrs.int("targets")?;
        let targets = usize::try_from(targets)
            .ok()
            .filter(|&t| t > 0)
            .ok_or_else(|| attrs.error(format!("targets must be positive, got {}", targets)))?;
        let coefficients = attrs.floats("coefficients")?;
        if coefficients.is_empty() || coefficients.len() % targets != 0 {
            return Err(attrs.error(format!(
                "{} coefficients cannot be split across {} targets",
                coefficients.len(),
                targets
            )));
        }
        let features = coefficients.len() / targets;
        let weights = Tensor::from_vec(coefficients, &[targets, features])?.transpose(&[1, 0])?;

        let intercepts = attrs.floats("intercepts")?;
        let intercepts = match intercepts.len() {
            0 => None,
            n if n == targets => Some(Tensor::from_vec(intercepts, &[targets])?),
            n => {
                return Err(attrs.error(format!(
                    "{} intercepts for {} targets",
                    n, targets
                )))
            }
        };
        Ok(LinearRegressor {
            weights,
            intercepts,
            features,
            targets,
        })
    }
}

impl Kernel for LinearRegressor {
    fn op_type(&self) -> &str {
        "LinearRegressor"
    }

    fn compute(&self, inputs: &[&Value], ctx: &KernelContext) -> Result<Vec<Value>> {
        check_arity("LinearRegressor", inputs, 1, 1)?;
        let x = tensor_at(inputs, 0)?;
        let x = match x.shape().ndim() {
            1 => x.reshape(Shape::new(vec![1, x.dims()[0]]))?,
            2 => x.clone(),
            _ => {
                return Err(KernelError::ShapeMismatch(format!(
                    "LinearRegressor expects [N, {}], got {}",
                    self.features,
                    x.shape()
                )))
            }
        };
        if x.dims()[1] != self.features {
            return Err(KernelError::ShapeMismatch(format!(
                "LinearRegressor expects {} features, got {}",
                self.features,
                x.dims()[1]
            )));
        }
        let x = x.cast(DType::F32)?;
        let mut y = ctx.backend.matmul(&x, &self.weights)?;
        if let Some(b) = &self.intercepts {
            ctx.backend.binary_inplace(BinaryOp::Add, &mut y, b)?;
        }
        Ok(vec![y.into()])
    }

    fn infer_shapes(&self, inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        let x = inputs.first()?;
        let rows = match x.rank()? {
            1 => Dimension::Known(1),
            2 => x.get(0)?,
            _ => return None,
        };
        Some(vec![ShapeObject::new(
            vec![rows, Dimension::from(self.targets)],
            Some(DType::F32),
        )])
    }
}
