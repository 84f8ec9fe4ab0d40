use crate::backend::BinaryOp;
use crate::dtype::Numeric;
use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::storage::Element;
use crate::tensor::Tensor;

pub fn check_dtypes(a: &Tensor, b: &Tensor) -> Result<()> {
    if a.dtype() != b.dtype() {
        return Err(TensorError::DTypeMismatch {
            expected: a.dtype().to_string(),
            got: b.dtype().to_string(),
        });
    }
    Ok(())
}

fn apply<T: Numeric>(op: BinaryOp, a: T, b: T) -> Result<T> {
    match op {
        BinaryOp::Add => Ok(a.wrapping_add(b)),
        BinaryOp::Sub => Ok(a.wrapping_sub(b)),
        BinaryOp::Mul => Ok(a.wrapping_mul(b)),
        BinaryOp::Div => a.divide(b),
        BinaryOp::Pow => Ok(T::from_f64(a.to_f64().powf(b.to_f64()))),
    }
}

pub fn binary<T: Numeric + Element>(op: BinaryOp, a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let out_shape = Shape::broadcast_shape(a.shape(), b.shape())?;
    let ad = a.data::<T>()?;
    let bd = b.data::<T>()?;

    let data = if a.shape() == &out_shape && b.shape() == &out_shape {
        ad.iter()
            .zip(bd)
            .map(|(&x, &y)| apply(op, x, y))
            .collect::<Result<Vec<T>>>()?
    } else {
        let ai = a.shape().broadcast_indices(&out_shape);
        let bi = b.shape().broadcast_indices(&out_shape);
        ai.iter()
            .zip(&bi)
            .map(|(&i, &j)| apply(op, ad[i], bd[j]))
            .collect::<Result<Vec<T>>>()?
    };
    Tensor::new(data, out_shape)
}

pub fn binary_inplace<T: Numeric + Element>(
    op: BinaryOp,
    a: &mut Tensor,
    b: &Tensor,
) -> Result<()> {
    let out_shape = Shape::broadcast_shape(a.shape(), b.shape())?;
    if a.shape() != &out_shape {
        return Err(TensorError::ShapeMismatch {
            expected: a.dims().to_vec(),
            got: out_shape.dims().to_vec(),
        });
    }
    let bi = b.shape().broadcast_indices(&out_shape);
    let bd = b.data::<T>()?;
    for (x, &j) in a.data_mut::<T>()?.iter_mut().zip(&bi) {
        *x = apply(op, *x, bd[j])?;
    }
    Ok(())
}
