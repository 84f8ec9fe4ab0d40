//! Reductions, arg-reductions and softmax.

use crate::backend::{ArgOp, ReduceOp};
use crate::dtype::Numeric;
use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::storage::Element;
use crate::tensor::Tensor;

/// Splits `dims` around `axis` into (outer, extent, inner) element counts.
fn split_at_axis(dims: &[usize], axis: usize) -> (usize, usize, usize) {
    let outer = dims[..axis].iter().product();
    let inner = dims[axis + 1..].iter().product();
    (outer, dims[axis], inner)
}

fn check_axis(x: &Tensor, axis: usize) -> Result<()> {
    if axis >= x.shape().ndim() {
        return Err(TensorError::InvalidAxis {
            axis: axis as i64,
            ndim: x.shape().ndim(),
        });
    }
    Ok(())
}

pub fn reduce<T: Numeric + Element>(
    op: ReduceOp,
    x: &Tensor,
    axes: &[usize],
    keep_dims: bool,
) -> Result<Tensor> {
    for &axis in axes {
        check_axis(x, axis)?;
    }
    let dims = x.dims();
    let reduced: Vec<bool> = (0..dims.len())
        .map(|i| axes.is_empty() || axes.contains(&i))
        .collect();
    let kept = Shape::new(
        dims.iter()
            .zip(&reduced)
            .map(|(&d, &r)| if r { 1 } else { d })
            .collect(),
    );

    let init = match op {
        ReduceOp::Sum | ReduceOp::Mean => T::zero(),
        ReduceOp::Max => T::lowest(),
        ReduceOp::Min => T::highest(),
    };
    let mut acc = vec![init; kept.numel()];
    // The keep-dims shape broadcasts back onto the input, which gives every
    // input element the output cell it folds into.
    let targets = kept.broadcast_indices(x.shape());
    for (&v, &o) in x.data::<T>()?.iter().zip(&targets) {
        let a = acc[o];
        acc[o] = match op {
            ReduceOp::Sum | ReduceOp::Mean => a.wrapping_add(v),
            ReduceOp::Max => if v > a { v } else { a },
            ReduceOp::Min => if v < a { v } else { a },
        };
    }
    if op == ReduceOp::Mean {
        let count = (x.numel() / kept.numel().max(1)) as f64;
        for a in acc.iter_mut() {
            *a = T::from_f64(a.to_f64() / count);
        }
    }

    let shape = if keep_dims {
        kept
    } else {
        Shape::new(
            dims.iter()
                .zip(&reduced)
                .filter(|&(_, &r)| !r)
                .map(|(&d, _)| d)
                .collect(),
        )
    };
    Tensor::new(acc, shape)
}

pub fn arg_reduce<T: Numeric + Element>(
    op: ArgOp,
    x: &Tensor,
    axis: usize,
    keep_dims: bool,
) -> Result<Tensor> {
    check_axis(x, axis)?;
    let (outer, extent, inner) = split_at_axis(x.dims(), axis);
    if extent == 0 {
        return Err(TensorError::Other(format!(
            "arg{} over empty axis {}",
            op, axis
        )));
    }
    let data = x.data::<T>()?;
    let mut out = Vec::with_capacity(outer * inner);
    for o in 0..outer {
        for i in 0..inner {
            let at = |e: usize| data[(o * extent + e) * inner + i];
            let mut best = 0;
            for e in 1..extent {
                let better = match op {
                    ArgOp::Max => at(e) > at(best),
                    ArgOp::Min => at(e) < at(best),
                };
                if better {
                    best = e;
                }
            }
            out.push(best as i64);
        }
    }
    let shape = if keep_dims {
        let mut dims = x.dims().to_vec();
        dims[axis] = 1;
        Shape::new(dims)
    } else {
        x.shape().remove_axis(axis)
    };
    Tensor::new(out, shape)
}

pub fn softmax<T: Numeric + Element>(x: &Tensor, axis: usize) -> Result<Tensor> {
    check_axis(x, axis)?;
    let (outer, extent, inner) = split_at_axis(x.dims(), axis);
    let data = x.data::<T>()?;
    let mut out = vec![T::zero(); data.len()];
    let mut scratch = vec![0.0f64; extent];
    for o in 0..outer {
        for i in 0..inner {
            let at = |e: usize| (o * extent + e) * inner + i;
            let max = (0..extent)
                .map(|e| data[at(e)].to_f64())
                .fold(f64::NEG_INFINITY, f64::max);
            let mut sum = 0.0;
            for (e, s) in scratch.iter_mut().enumerate() {
                *s = (data[at(e)].to_f64() - max).exp();
                sum += *s;
            }
            for (e, s) in scratch.iter().enumerate() {
                out[at(e)] = T::from_f64(s / sum);
            }
        }
    }
    Tensor::new(out, x.shape().clone())
}
