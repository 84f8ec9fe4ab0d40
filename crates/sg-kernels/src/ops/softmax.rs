use sg_onnx::Node;
use sg_tensor::{normalize_axis, Shape, ShapeObject, Value};

use crate::attrs::{AttrReader, AttributeSpec};
use crate::error::Result;
use crate::kernel::{check_arity, tensor_at, Kernel, KernelContext};

/// Softmax.
///
/// Before opset 13 the input is coerced to 2-D at `axis` (default 1) and
/// normalized over everything from `axis` on. From opset 13 on, only `axis`
/// (default -1) is normalized.
#[derive(Debug)]
pub struct Softmax {
    axis: i64,
    flatten: bool,
}

impl Softmax {
    pub fn v1(node: &Node) -> Result<Self> {
        const SCHEMA: &[AttributeSpec] = &[AttributeSpec::int("axis", 1)];
        let attrs = AttrReader::new(node, SCHEMA)?;
        Ok(Softmax {
            axis: attrs.int("axis")?,
            flatten: true,
        })
    }

    pub fn v13(node: &Node) -> Result<Self> {
        const SCHEMA: &[AttributeSpec] = &[AttributeSpec::int("axis", -1)];
        let attrs = AttrReader::new(node, SCHEMA)?;
        Ok(Softmax {
            axis: attrs.int("axis")?,
            flatten: false,
        })
    }
}

impl Kernel for Softmax {
    fn op_type(&self) -> &str {
        "Softmax"
    }

    fn compute(&self, inputs: &[&Value], ctx: &KernelContext) -> Result<Vec<Value>> {
        check_arity("Softmax", inputs, 1, 1)?;
        let x = tensor_at(inputs, 0)?;
        let ndim = x.shape().ndim();
        if !self.flatten {
            let axis = normalize_axis(self.axis, ndim, 0)?;
            return Ok(vec![ctx.backend.softmax(x, axis)?.into()]);
        }
        // `axis == ndim` is allowed here and leaves one trailing column.
        let axis = normalize_axis(self.axis, ndim, 1)?;
        let rows: usize = x.dims()[..axis].iter().product();
        let cols: usize = x.dims()[axis..].iter().product();
        let flat = x.reshape(Shape::new(vec![rows, cols]))?;
        let y = ctx.backend.softmax(&flat, 1)?;
        Ok(vec![y.into_reshaped(x.shape().clone())?.into()])
    }

    fn infer_shapes(&self, inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        Some(vec![inputs.first()?.clone()])
    }
}
