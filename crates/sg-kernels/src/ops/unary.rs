use sg_onnx::Node;
use sg_tensor::{ShapeObject, UnaryOp, Value};

use crate::attrs::{AttrReader, AttributeSpec};
use crate::error::{KernelError, Result};
use crate::kernel::{check_arity, tensor_at, Kernel, KernelContext};

/// Element-wise unary operator; the output keeps the input dtype and shape.
#[derive(Debug)]
pub struct Unary {
    op_type: String,
    op: UnaryOp,
}

impl Unary {
    pub fn new(node: &Node, op: UnaryOp) -> Result<Self> {
        const SCHEMA: &[AttributeSpec] = &[];
        AttrReader::new(node, SCHEMA)?;
        Ok(Unary {
            op_type: node.op_type.clone(),
            op,
        })
    }
}

impl Kernel for Unary {
    fn op_type(&self) -> &str {
        &self.op_type
    }

    fn compute(&self, inputs: &[&Value], ctx: &KernelContext) -> Result<Vec<Value>> {
        check_arity(&self.op_type, inputs, 1, 1)?;
        let x = tensor_at(inputs, 0)?;
        Ok(vec![ctx.backend.unary(self.op, x)?.into()])
    }

    fn infer_shapes(&self, inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        Some(vec![inputs.first()?.clone()])
    }

    fn inplace_input(&self) -> Option<usize> {
        Some(0)
    }

    fn compute_inplace(
        &self,
        owned: Value,
        others: &[&Value],
        ctx: &KernelContext,
    ) -> Result<(Vec<Value>, bool)> {
        if !others.is_empty() {
            return Err(KernelError::InvalidInput(format!(
                "{} expects 1 input, got {}",
                self.op_type,
                others.len() + 1
            )));
        }
        let mut x = owned.into_tensor()?;
        ctx.backend.unary_inplace(self.op, &mut x)?;
        Ok((vec![x.into()], true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use sg_tensor::{CpuBackend, Tensor};

    #[test]
    fn test_relu_and_inplace_agree() {
        let node = Node::new("Relu", ["x"], ["y"]);
        let k = Unary::new(&node, UnaryOp::Relu).unwrap();
        let backend = CpuBackend::new();
        let ctx = KernelContext::new(&backend);
        let x: Value = Tensor::from_vec(vec![-1.0f32, 2.0, -3.0], &[3]).unwrap().into();

        let out = k.compute(&[&x], &ctx).unwrap();
        let (inplace, reused) = k.compute_inplace(x.clone(), &[], &ctx).unwrap();
        assert!(reused);
        assert_eq!(out, inplace);
        assert_eq!(out[0].as_tensor().unwrap().data::<f32>().unwrap(), &[0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_sigmoid() {
        let node = Node::new("Sigmoid", ["x"], ["y"]);
        let k = Unary::new(&node, UnaryOp::Sigmoid).unwrap();
        let backend = CpuBackend::new();
        let x: Value = Tensor::from_vec(vec![0.0f64], &[1]).unwrap().into();
        let out = k.compute(&[&x], &KernelContext::new(&backend)).unwrap();
        assert_abs_diff_eq!(out[0].as_tensor().unwrap().data::<f64>().unwrap()[0], 0.5);
    }

    #[test]
    fn test_wrong_arity() {
        let node = Node::new("Neg", ["x"], ["y"]);
        let k = Unary::new(&node, UnaryOp::Neg).unwrap();
        let backend = CpuBackend::new();
        let x: Value = Tensor::scalar(1i64).into();
        assert!(k.compute(&[&x, &x], &KernelContext::new(&backend)).is_err());
    }
}
