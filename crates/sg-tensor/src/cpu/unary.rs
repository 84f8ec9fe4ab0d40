use crate::backend::UnaryOp;
use crate::dtype::Numeric;
use crate::error::{Result, TensorError};
use crate::storage::Element;
use crate::tensor::Tensor;

/// Per-element evaluation of a `UnaryOp`.
pub trait UnaryElement: Numeric + Element {
    /// Callers check `UnaryOp::accepts` first.
    fn apply(op: UnaryOp, x: Self) -> Self;
}

macro_rules! impl_float_unary {
    ($t:ty) => {
        impl UnaryElement for $t {
            fn apply(op: UnaryOp, x: Self) -> Self {
                match op {
                    UnaryOp::Abs => x.abs(),
                    UnaryOp::Neg => -x,
                    UnaryOp::Exp => x.exp(),
                    UnaryOp::Log => x.ln(),
                    UnaryOp::Sqrt => x.sqrt(),
                    UnaryOp::Reciprocal => 1.0 / x,
                    UnaryOp::Relu => x.max(0.0),
                    UnaryOp::Sigmoid => 1.0 / (1.0 + (-x).exp()),
                    UnaryOp::Tanh => x.tanh(),
                    UnaryOp::Floor => x.floor(),
                    UnaryOp::Ceil => x.ceil(),
                }
            }
        }
    };
}

impl_float_unary!(f32);
impl_float_unary!(f64);

impl UnaryElement for i64 {
    fn apply(op: UnaryOp, x: Self) -> Self {
        match op {
            UnaryOp::Abs => x.wrapping_abs(),
            UnaryOp::Neg => x.wrapping_neg(),
            UnaryOp::Relu => x.max(0),
            _ => x,
        }
    }
}

pub fn check(op: UnaryOp, x: &Tensor) -> Result<()> {
    if op.accepts(x.dtype()) {
        Ok(())
    } else {
        Err(TensorError::UnsupportedDType(format!(
            "{} is not defined for {}",
            op,
            x.dtype()
        )))
    }
}

pub fn unary<T: UnaryElement>(op: UnaryOp, x: &Tensor) -> Result<Tensor> {
    let data: Vec<T> = x.data::<T>()?.iter().map(|&v| T::apply(op, v)).collect();
    Tensor::new(data, x.shape().clone())
}

pub fn unary_inplace<T: UnaryElement>(op: UnaryOp, x: &mut Tensor) -> Result<()> {
    for v in x.data_mut::<T>()? {
        *v = T::apply(op, *v);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_float_ops() {
        assert_relative_eq!(f32::apply(UnaryOp::Exp, 1.0), std::f32::consts::E);
        assert_relative_eq!(f64::apply(UnaryOp::Log, 1.0), 0.0);
        assert_eq!(f32::apply(UnaryOp::Reciprocal, 4.0), 0.25);
        assert_eq!(f64::apply(UnaryOp::Floor, -1.5), -2.0);
        assert_eq!(f64::apply(UnaryOp::Ceil, -1.5), -1.0);
        assert_relative_eq!(f64::apply(UnaryOp::Tanh, 0.5), 0.5f64.tanh());
    }

    #[test]
    fn test_int_ops() {
        assert_eq!(i64::apply(UnaryOp::Neg, 3), -3);
        assert_eq!(i64::apply(UnaryOp::Relu, -3), 0);
        assert!(!UnaryOp::Sqrt.accepts(crate::dtype::DType::I64));
    }

    #[test]
    fn test_string_rejected() {
        let t = Tensor::from_vec(vec!["a".to_string()], &[1]).unwrap();
        assert!(check(UnaryOp::Abs, &t).is_err());
    }
}
