use sg_onnx::{AttributeKind, Node};
use sg_tensor::{normalize_axis, ArgOp, DType, ReduceOp, ShapeObject, Tensor, Value};

use crate::attrs::{AttrReader, AttributeSpec};
use crate::error::{KernelError, Result};
use crate::kernel::{check_arity, int_list, tensor_at, Kernel, KernelContext};

const REDUCE_SCHEMA: &[AttributeSpec] = &[
    AttributeSpec::optional("axes", AttributeKind::Ints),
    AttributeSpec::int("keepdims", 1),
];

const REDUCE_INPUT_AXES_SCHEMA: &[AttributeSpec] = &[
    AttributeSpec::int("keepdims", 1),
    AttributeSpec::int("noop_with_empty_axes", 0),
];

#[derive(Debug)]
enum AxesSource {
    Attribute(Option<Vec<i64>>),
    /// Second input; absent or empty means every axis unless
    /// `noop_with_empty_axes` is set.
    Input { noop_when_empty: bool },
}

/// ReduceSum, ReduceMean, ReduceMax and ReduceMin.
#[derive(Debug)]
pub struct Reduce {
    op_type: String,
    op: ReduceOp,
    axes: AxesSource,
    keep_dims: bool,
}

impl Reduce {
    /// The attribute form: `axes` is an attribute, absent means all axes.
    pub fn new(node: &Node, op: ReduceOp) -> Result<Self> {
        let attrs = AttrReader::new(node, REDUCE_SCHEMA)?;
        Ok(Reduce {
            op_type: node.op_type.clone(),
            op,
            axes: AxesSource::Attribute(attrs.opt_ints("axes")?),
            keep_dims: attrs.flag("keepdims")?,
        })
    }

    /// The input form introduced for ReduceSum at opset 13.
    pub fn with_input_axes(node: &Node, op: ReduceOp) -> Result<Self> {
        let attrs = AttrReader::new(node, REDUCE_INPUT_AXES_SCHEMA)?;
        Ok(Reduce {
            op_type: node.op_type.clone(),
            op,
            axes: AxesSource::Input {
                noop_when_empty: attrs.flag("noop_with_empty_axes")?,
            },
            keep_dims: attrs.flag("keepdims")?,
        })
    }

    /// Normalized axes; `None` means the reduction is skipped.
    fn axes(&self, inputs: &[&Value], ndim: usize) -> Result<Option<Vec<usize>>> {
        let raw = match &self.axes {
            AxesSource::Attribute(axes) => axes.clone().unwrap_or_default(),
            AxesSource::Input { noop_when_empty } => {
                let axes = match inputs.get(1) {
                    Some(v) => int_list(v.as_tensor()?)?,
                    None => Vec::new(),
                };
                if axes.is_empty() && *noop_when_empty {
                    return Ok(None);
                }
                axes
            }
        };
        let mut axes = raw
            .iter()
            .map(|&a| normalize_axis(a, ndim, 0))
            .collect::<sg_tensor::Result<Vec<_>>>()?;
        axes.sort_unstable();
        axes.dedup();
        Ok(Some(axes))
    }
}

impl Kernel for Reduce {
    fn op_type(&self) -> &str {
        &self.op_type
    }

    fn compute(&self, inputs: &[&Value], ctx: &KernelContext) -> Result<Vec<Value>> {
        let max = match self.axes {
            AxesSource::Attribute(_) => 1,
            AxesSource::Input { .. } => 2,
        };
        check_arity(&self.op_type, inputs, 1, max)?;
        let x = tensor_at(inputs, 0)?;
        let out = match self.axes(inputs, x.shape().ndim())? {
            Some(axes) => ctx.backend.reduce(self.op, x, &axes, self.keep_dims)?,
            None => x.clone(),
        };
        Ok(vec![out.into()])
    }

    fn infer_shapes(&self, inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        let x = inputs.first()?;
        let rank = x.rank()?;
        let axes: Vec<usize> = match &self.axes {
            AxesSource::Attribute(Some(axes)) => axes
                .iter()
                .map(|&a| normalize_axis(a, rank, 0).ok())
                .collect::<Option<_>>()?,
            AxesSource::Attribute(None) => (0..rank).collect(),
            // Axes only known at run time.
            AxesSource::Input { .. } if inputs.len() > 1 => return None,
            AxesSource::Input { noop_when_empty: true } => return Some(vec![x.clone()]),
            AxesSource::Input { .. } => (0..rank).collect(),
        };
        let axes = if axes.is_empty() { (0..rank).collect() } else { axes };
        let mut sorted = axes;
        sorted.sort_unstable();
        sorted.dedup();
        let mut out = x.clone();
        for &axis in sorted.iter().rev() {
            out = out.reduce(axis, self.keep_dims).ok()?;
        }
        Some(vec![out])
    }
}

const ARG_SCHEMA: &[AttributeSpec] = &[
    AttributeSpec::int("axis", 0),
    AttributeSpec::int("keepdims", 1),
    AttributeSpec::int("select_last_index", 0),
];

/// ArgMax and ArgMin; the output is int64.
#[derive(Debug)]
pub struct ArgReduce {
    op_type: String,
    op: ArgOp,
    axis: i64,
    keep_dims: bool,
}

impl ArgReduce {
    pub fn new(node: &Node, op: ArgOp) -> Result<Self> {
        let attrs = AttrReader::new(node, ARG_SCHEMA)?;
        if attrs.flag("select_last_index")? {
            return Err(KernelError::Unimplemented(format!(
                "{} with select_last_index=1",
                node.op_type
            )));
        }
        Ok(ArgReduce {
            op_type: node.op_type.clone(),
            op,
            axis: attrs.int("axis")?,
            keep_dims: attrs.flag("keepdims")?,
        })
    }
}

impl Kernel for ArgReduce {
    fn op_type(&self) -> &str {
        &self.op_type
    }

    fn compute(&self, inputs: &[&Value], ctx: &KernelContext) -> Result<Vec<Value>> {
        check_arity(&self.op_type, inputs, 1, 1)?;
        let x: &Tensor = tensor_at(inputs, 0)?;
        let axis = normalize_axis(self.axis, x.shape().ndim(), 0)?;
        Ok(vec![ctx.backend.arg_reduce(self.op, x, axis, self.keep_dims)?.into()])
    }

    fn infer_shapes(&self, inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        let x = inputs.first()?;
        let axis = normalize_axis(self.axis, x.rank()?, 0).ok()?;
        let out = x.reduce(axis, self.keep_dims).ok()?;
        Some(vec![out.with_dtype(Some(DType::I64))])
    }
}
