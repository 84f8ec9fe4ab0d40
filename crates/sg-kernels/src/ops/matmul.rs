use sg_onnx::Node;
use sg_tensor::{BinaryOp, ComputeBackend, Dimension, Shape, ShapeObject, Tensor, Value};

use crate::attrs::{AttrReader, AttributeSpec};
use crate::error::{KernelError, Result};
use crate::kernel::{check_arity, tensor_at, Kernel, KernelContext};

/// Numpy `matmul`: 1-D operands are promoted to matrices and leading batch
/// dimensions broadcast.
#[derive(Debug)]
pub struct MatMul;

impl MatMul {
    pub fn new(node: &Node) -> Result<Self> {
        const SCHEMA: &[AttributeSpec] = &[];
        AttrReader::new(node, SCHEMA)?;
        Ok(MatMul)
    }
}

/// Batched matrix product over the backend's 2-D kernel.
pub(crate) fn batched_matmul(backend: &dyn ComputeBackend, a: &Tensor, b: &Tensor) -> Result<Tensor> {
    if a.shape().ndim() == 0 || b.shape().ndim() == 0 {
        return Err(KernelError::ShapeMismatch(
            "MatMul operands must have at least one dimension".to_string(),
        ));
    }
    let a_vec = a.shape().ndim() == 1;
    let b_vec = b.shape().ndim() == 1;
    let a = if a_vec {
        a.reshape(Shape::new(vec![1, a.dims()[0]]))?
    } else {
        a.clone()
    };
    let b = if b_vec {
        b.reshape(Shape::new(vec![b.dims()[0], 1]))?
    } else {
        b.clone()
    };

    let (ar, br) = (a.shape().ndim(), b.shape().ndim());
    let (m, k) = (a.dims()[ar - 2], a.dims()[ar - 1]);
    let (k2, n) = (b.dims()[br - 2], b.dims()[br - 1]);
    if k != k2 {
        return Err(KernelError::ShapeMismatch(format!(
            "MatMul inner dimensions differ: {} and {}",
            a.shape(),
            b.shape()
        )));
    }

    let batch = Shape::broadcast_shape(
        &Shape::from_slice(&a.dims()[..ar - 2]),
        &Shape::from_slice(&b.dims()[..br - 2]),
    )?;
    let mut out = if batch.ndim() == 0 {
        backend.matmul(&a, &b)?
    } else {
        let count = batch.numel();
        let full = |t: &Tensor, rows: usize, cols: usize| -> Result<Tensor> {
            let mut dims = batch.dims().to_vec();
            dims.extend([rows, cols]);
            Ok(t
                .broadcast_to(&Shape::new(dims))?
                .into_reshaped(Shape::new(vec![count, rows, cols]))?)
        };
        let a3 = full(&a, m, k)?;
        let b3 = full(&b, k, n)?;
        let products = (0..count)
            .map(|i| Ok(backend.matmul(&a3.select(0, i)?, &b3.select(0, i)?)?))
            .collect::<Result<Vec<_>>>()?;
        let mut dims = batch.dims().to_vec();
        dims.extend([m, n]);
        if count == 0 {
            Tensor::zeros(a.dtype(), Shape::new(dims))
        } else {
            Tensor::stack(&products, 0)?.into_reshaped(Shape::new(dims))?
        }
    };

    let mut dims = out.dims().to_vec();
    if b_vec {
        dims.pop();
    }
    if a_vec {
        let at = dims.len() - if b_vec { 1 } else { 2 };
        dims.remove(at);
    }
    if a_vec || b_vec {
        out = out.into_reshaped(Shape::new(dims))?;
    }
    Ok(out)
}

impl Kernel for MatMul {
    fn op_type(&self) -> &str {
        "MatMul"
    }

    fn compute(&self, inputs: &[&Value], ctx: &KernelContext) -> Result<Vec<Value>> {
        check_arity("MatMul", inputs, 2, 2)?;
        let a = tensor_at(inputs, 0)?;
        let b = tensor_at(inputs, 1)?;
        Ok(vec![batched_matmul(ctx.backend, a, b)?.into()])
    }

    fn infer_shapes(&self, inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        let [a, b] = inputs else {
            return None;
        };
        let (da, db) = (a.dims()?, b.dims()?);
        if da.is_empty() || db.is_empty() {
            return None;
        }
        let batch_a = ShapeObject::new(da[..da.len().saturating_sub(2)].to_vec(), None);
        let batch_b = ShapeObject::new(db[..db.len().saturating_sub(2)].to_vec(), None);
        let mut dims = ShapeObject::broadcast(&batch_a, &batch_b).ok()?.dims()?.to_vec();
        if da.len() >= 2 {
            dims.push(da[da.len() - 2].clone());
        }
        if db.len() >= 2 {
            dims.push(db[db.len() - 1].clone());
        }
        Some(vec![ShapeObject::new(dims, a.dtype())])
    }
}

const GEMM_SCHEMA: &[AttributeSpec] = &[
    AttributeSpec::float("alpha", 1.0),
    AttributeSpec::float("beta", 1.0),
    AttributeSpec::int("transA", 0),
    AttributeSpec::int("transB", 0),
];

/// `Y = alpha * A' * B' + beta * C` on 2-D operands.
#[derive(Debug)]
pub struct Gemm {
    alpha: f32,
    beta: f32,
    trans_a: bool,
    trans_b: bool,
}

impl Gemm {
    pub fn new(node: &Node) -> Result<Self> {
        let attrs = AttrReader::new(node, GEMM_SCHEMA)?;
        Ok(Gemm {
            alpha: attrs.float("alpha")?,
            beta: attrs.float("beta")?,
            trans_a: attrs.flag("transA")?,
            trans_b: attrs.flag("transB")?,
        })
    }
}

fn scaled(backend: &dyn ComputeBackend, t: Tensor, factor: f32) -> Result<Tensor> {
    if factor == 1.0 {
        return Ok(t);
    }
    let factor = Tensor::scalar(f64::from(factor)).cast(t.dtype())?;
    Ok(backend.binary(BinaryOp::Mul, &t, &factor)?)
}

impl Kernel for Gemm {
    fn op_type(&self) -> &str {
        "Gemm"
    }

    fn compute(&self, inputs: &[&Value], ctx: &KernelContext) -> Result<Vec<Value>> {
        check_arity("Gemm", inputs, 2, 3)?;
        let mut a = tensor_at(inputs, 0)?.clone();
        let mut b = tensor_at(inputs, 1)?.clone();
        if a.shape().ndim() != 2 || b.shape().ndim() != 2 {
            return Err(KernelError::ShapeMismatch(format!(
                "Gemm expects 2-D operands, got {} and {}",
                a.shape(),
                b.shape()
            )));
        }
        if self.trans_a {
            a = a.transpose(&[1, 0])?;
        }
        if self.trans_b {
            b = b.transpose(&[1, 0])?;
        }
        let mut y = scaled(ctx.backend, ctx.backend.matmul(&a, &b)?, self.alpha)?;
        if let Some(c) = inputs.get(2) {
            let c = scaled(ctx.backend, c.as_tensor()?.clone(), self.beta)?;
            let target = Shape::broadcast_shape(y.shape(), c.shape())?;
            if target != *y.shape() {
                return Err(KernelError::ShapeMismatch(format!(
                    "Gemm bias {} does not broadcast to {}",
                    c.shape(),
                    y.shape()
                )));
            }
            ctx.backend.binary_inplace(BinaryOp::Add, &mut y, &c)?;
        }
        Ok(vec![y.into()])
    }

    fn infer_shapes(&self, inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        let (a, b) = (inputs.first()?, inputs.get(1)?);
        if a.rank()? != 2 || b.rank()? != 2 {
            return None;
        }
        let m: Dimension = a.get(if self.trans_a { 1 } else { 0 })?;
        let n: Dimension = b.get(if self.trans_b { 0 } else { 1 })?;
        Some(vec![ShapeObject::new(vec![m, n], a.dtype())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use sg_onnx::Attribute;
    use sg_tensor::{CpuBackend, RowwiseBackend};

    fn f32s(data: Vec<f32>, dims: &[usize]) -> Value {
        Tensor::from_vec(data, dims).unwrap().into()
    }

    fn run(k: &dyn Kernel, inputs: &[&Value]) -> Tensor {
        let backend = CpuBackend::new();
        let out = k.compute(inputs, &KernelContext::new(&backend)).unwrap();
        out.into_iter().next().unwrap().into_tensor().unwrap()
    }

    #[test]
    fn test_matmul_vector_promotion() {
        let k = MatMul::new(&Node::new("MatMul", ["a", "b"], ["y"])).unwrap();
        let m = f32s(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let v = f32s(vec![1.0, 1.0], &[2]);
        let mv = run(&k, &[&m, &v]);
        assert_eq!(mv.dims(), &[2]);
        assert_eq!(mv.data::<f32>().unwrap(), &[3.0, 7.0]);
        let vm = run(&k, &[&v, &m]);
        assert_eq!(vm.dims(), &[2]);
        assert_eq!(vm.data::<f32>().unwrap(), &[4.0, 6.0]);
        let dot = run(&k, &[&v, &v]);
        assert_eq!(dot.dims(), &[] as &[usize]);
        assert_eq!(dot.data::<f32>().unwrap(), &[2.0]);
    }

    #[test]
    fn test_matmul_batched_broadcast() {
        let k = MatMul::new(&Node::new("MatMul", ["a", "b"], ["y"])).unwrap();
        // two 1x2 matrices against one shared 2x1 matrix
        let a = f32s(vec![1.0, 2.0, 3.0, 4.0], &[2, 1, 2]);
        let b = f32s(vec![10.0, 1.0], &[2, 1]);
        let y = run(&k, &[&a, &b]);
        assert_eq!(y.dims(), &[2, 1, 1]);
        assert_eq!(y.data::<f32>().unwrap(), &[12.0, 34.0]);
    }

    #[test]
    fn test_rowwise_backend_agrees() {
        let a = Tensor::from_vec((0..12).map(|v| v as f32 * 0.5).collect::<Vec<_>>(), &[3, 4]).unwrap();
        let b = Tensor::from_vec((0..8).map(|v| v as f32 - 3.0).collect::<Vec<_>>(), &[4, 2]).unwrap();
        let cpu = batched_matmul(&CpuBackend::new(), &a, &b).unwrap();
        let rowwise = batched_matmul(&RowwiseBackend::new(), &a, &b).unwrap();
        for (x, y) in cpu.data::<f32>().unwrap().iter().zip(rowwise.data::<f32>().unwrap()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_gemm_attributes() {
        let node = Node::new("Gemm", ["a", "b", "c"], ["y"])
            .with_attr("alpha", Attribute::Float(2.0))
            .with_attr("beta", Attribute::Float(0.5))
            .with_attr("transB", Attribute::Int(1));
        let k = Gemm::new(&node).unwrap();
        let a = f32s(vec![1.0, 2.0], &[1, 2]);
        let b = f32s(vec![1.0, 1.0, 2.0, 0.0], &[2, 2]);
        let c = f32s(vec![4.0], &[1]);
        let y = run(&k, &[&a, &b, &c]);
        // A * B^T = [3, 2]; 2 * that + 0.5 * 4
        assert_eq!(y.data::<f32>().unwrap(), &[8.0, 6.0]);

        let shapes = k
            .infer_shapes(&[
                ShapeObject::new(vec!["N".into(), 2usize.into()], None),
                ShapeObject::new(vec![3usize.into(), 2usize.into()], None),
            ])
            .unwrap();
        assert_eq!(shapes[0].to_string(), "(N, 3)");
    }

    #[test]
    fn test_gemm_rejects_vectors() {
        let k = Gemm::new(&Node::new("Gemm", ["a", "b"], ["y"])).unwrap();
        let backend = CpuBackend::new();
        let v = f32s(vec![1.0, 2.0], &[2]);
        let r = k.compute(&[&v, &v], &KernelContext::new(&backend));
        assert!(matches!(r, Err(KernelError::ShapeMismatch(_))));
    }
}
