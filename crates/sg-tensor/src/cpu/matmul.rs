//! Matrix product loops.
//!
//! Two orderings are provided. `matmul_accumulate` walks `b` row by row and
//! accumulates scaled rows into the output, which keeps every inner loop on
//! contiguous memory. `matmul_rowwise` computes each output cell as one dot
//! product between a row of `a` and a column of `b`.

use crate::dtype::Numeric;
use crate::error::{Result, TensorError};
use crate::storage::Element;
use crate::tensor::Tensor;

/// Validate ranks, dtypes and the shared dimension; returns `(m, k, n)`.
pub fn check_operands(a: &Tensor, b: &Tensor) -> Result<(usize, usize, usize)> {
    if a.shape().ndim() != 2 || b.shape().ndim() != 2 {
        return Err(TensorError::Other(format!(
            "matmul requires 2D tensors, got {} and {}",
            a.shape(),
            b.shape()
        )));
    }
    if a.dtype() != b.dtype() {
        return Err(TensorError::DTypeMismatch {
            expected: a.dtype().to_string(),
            got: b.dtype().to_string(),
        });
    }
    let (m, k) = (a.shape().dim(0), a.shape().dim(1));
    let (k2, n) = (b.shape().dim(0), b.shape().dim(1));
    if k != k2 {
        return Err(TensorError::MatmulMismatch { m, k, k2, n });
    }
    Ok((m, k, n))
}

pub fn matmul_accumulate<T: Numeric + Element>(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let (m, k, n) = check_operands(a, b)?;
    let a = a.data::<T>()?;
    let b = b.data::<T>()?;

    let mut c = vec![T::zero(); m * n];
    for i in 0..m {
        let out = &mut c[i * n..(i + 1) * n];
        for p in 0..k {
            let scale = a[i * k + p];
            for (o, &bv) in out.iter_mut().zip(&b[p * n..(p + 1) * n]) {
                *o = o.wrapping_add(scale.wrapping_mul(bv));
            }
        }
    }
    Tensor::from_vec(c, &[m, n])
}

pub fn matmul_rowwise<T: Numeric + Element>(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let (m, k, n) = check_operands(a, b)?;
    let a = a.data::<T>()?;
    let b = b.data::<T>()?;

    let mut c = Vec::with_capacity(m * n);
    for row in a.chunks_exact(k.max(1)).take(m) {
        for j in 0..n {
            let mut sum = T::zero();
            for (p, &av) in row.iter().enumerate().take(k) {
                sum = sum.wrapping_add(av.wrapping_mul(b[p * n + j]));
            }
            c.push(sum);
        }
    }
    // k == 0 leaves `a` empty; every cell is an empty sum.
    c.resize(m * n, T::zero());
    Tensor::from_vec(c, &[m, n])
}
