use crate::error::{Result, TensorError};
use std::fmt;

/// A tensor shape, wrapping a vector of dimension sizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    pub fn from_slice(dims: &[usize]) -> Self {
        Shape {
            dims: dims.to_vec(),
        }
    }

    /// Rank.
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Element count; 1 for a scalar.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Element count, or `None` if it does not fit in `usize`.
    pub fn checked_numel(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |n, &d| n.checked_mul(d))
    }

    /// Returns the size of dimension `i`.
    ///
    /// # Panics
    /// Panics if `i >= ndim()`.
    pub fn dim(&self, i: usize) -> usize {
        self.dims[i]
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Row-major strides, in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.dims.len()];
        for i in (1..self.dims.len()).rev() {
            strides[i - 1] = strides[i] * self.dims[i];
        }
        strides
    }

    /// Shape with `axis` removed.
    pub fn remove_axis(&self, axis: usize) -> Shape {
        let mut dims = self.dims.clone();
        dims.remove(axis);
        Shape { dims }
    }

    /// Shape with a new axis of extent `size` inserted before `axis`.
    pub fn insert_axis(&self, axis: usize, size: usize) -> Shape {
        let mut dims = self.dims.clone();
        dims.insert(axis, size);
        Shape { dims }
    }

    /// Flat source offsets for every element of `target`, reading `self`
    /// under numpy broadcasting. `target` must be a valid broadcast of `self`.
    pub fn broadcast_indices(&self, target: &Shape) -> Vec<usize> {
        let offset = target.ndim() - self.ndim();
        let src_strides = self.strides();
        let strides: Vec<usize> = (0..target.ndim())
            .map(|i| {
                if i < offset || self.dims[i - offset] == 1 {
                    0
                } else {
                    src_strides[i - offset]
                }
            })
            .collect();
        strided_indices(target.dims(), &strides)
    }

    /// Flat source offsets for reading `self` through the axis permutation
    /// `perm`. The returned order is the row-major order of the permuted shape.
    pub fn permuted_indices(&self, perm: &[usize]) -> Vec<usize> {
        let src_strides = self.strides();
        let dims: Vec<usize> = perm.iter().map(|&p| self.dims[p]).collect();
        let strides: Vec<usize> = perm.iter().map(|&p| src_strides[p]).collect();
        strided_indices(&dims, &strides)
    }

    /// Numpy broadcast of two shapes: right-aligned, and each pair of extents
    /// must match or contain a 1.
    pub fn broadcast_shape(a: &Shape, b: &Shape) -> Result<Shape> {
        let ndim = a.ndim().max(b.ndim());
        let extent = |s: &Shape, i: usize| {
            (i + s.ndim())
                .checked_sub(ndim)
                .map_or(1, |j| s.dims[j])
        };
        let dims = (0..ndim)
            .map(|i| match (extent(a, i), extent(b, i)) {
                (x, y) if x == y || y == 1 => Ok(x),
                (1, y) => Ok(y),
                _ => Err(TensorError::BroadcastError {
                    a: a.dims.clone(),
                    b: b.dims.clone(),
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Shape::new(dims))
    }
}

/// Walk `dims` in row-major order and emit `sum(index[i] * strides[i])`.
fn strided_indices(dims: &[usize], strides: &[usize]) -> Vec<usize> {
    let n: usize = dims.iter().product();
    let mut out = Vec::with_capacity(n);
    let mut index = vec![0usize; dims.len()];
    let mut offset = 0usize;
    for _ in 0..n {
        out.push(offset);
        for ax in (0..dims.len()).rev() {
            index[ax] += 1;
            offset += strides[ax];
            if index[ax] < dims[ax] {
                break;
            }
            offset -= strides[ax] * index[ax];
            index[ax] = 0;
        }
    }
    out
}

/// Resolve a possibly negative ONNX axis against a rank.
///
/// `-1` is the last axis. `extra` widens the accepted range for operators that
/// address positions in their output rather than their input (Unsqueeze).
pub fn normalize_axis(axis: i64, ndim: usize, extra: usize) -> Result<usize> {
    let rank = (ndim + extra) as i64;
    let resolved = if axis < 0 { axis + rank } else { axis };
    if resolved < 0 || resolved >= rank {
        return Err(TensorError::InvalidAxis { axis, ndim });
    }
    Ok(resolved as usize)
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::from_slice(dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_numel_strides() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!((s.ndim(), s.numel(), s.dim(1)), (3, 24, 3));
        assert_eq!(s.strides(), vec![12, 4, 1]);

        let scalar = Shape::new(vec![]);
        assert_eq!(scalar.numel(), 1);
        assert!(scalar.strides().is_empty());
    }

    #[test]
    fn test_checked_numel() {
        assert_eq!(Shape::new(vec![2, 3, 4]).checked_numel(), Some(24));
        assert_eq!(Shape::new(vec![]).checked_numel(), Some(1));
        assert_eq!(Shape::new(vec![0, usize::MAX]).checked_numel(), Some(0));
        assert_eq!(Shape::new(vec![1 << 40, 1 << 40]).checked_numel(), None);
    }

    #[test]
    fn test_broadcast_shape() {
        let cases: &[(&[usize], &[usize], &[usize])] = &[
            (&[2, 3], &[2, 3], &[2, 3]),
            (&[2, 1], &[1, 3], &[2, 3]),
            (&[3], &[4, 2, 3], &[4, 2, 3]),
            (&[], &[5], &[5]),
        ];
        for &(a, b, want) in cases {
            let got = Shape::broadcast_shape(&Shape::from_slice(a), &Shape::from_slice(b)).unwrap();
            assert_eq!(got.dims(), want);
        }
        let err = Shape::broadcast_shape(&Shape::new(vec![2]), &Shape::new(vec![3]));
        assert!(matches!(err, Err(TensorError::BroadcastError { .. })));
    }

    #[test]
    fn test_normalize_axis() {
        assert_eq!(normalize_axis(-1, 3, 0).unwrap(), 2);
        assert_eq!(normalize_axis(1, 3, 0).unwrap(), 1);
        assert!(normalize_axis(3, 3, 0).is_err());
        assert!(normalize_axis(-4, 3, 0).is_err());
        assert_eq!(normalize_axis(3, 3, 1).unwrap(), 3);
    }

    #[test]
    fn test_insert_remove_axis() {
        let s = Shape::new(vec![2, 3]);
        assert_eq!(s.insert_axis(1, 5).dims(), &[2, 5, 3]);
        assert_eq!(s.remove_axis(0).dims(), &[3]);
    }

    #[test]
    fn test_broadcast_indices() {
        let src = Shape::new(vec![2, 1]);
        let target = Shape::new(vec![2, 3]);
        assert_eq!(src.broadcast_indices(&target), vec![0, 0, 0, 1, 1, 1]);
        let row = Shape::new(vec![3]);
        assert_eq!(row.broadcast_indices(&target), vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_permuted_indices() {
        let s = Shape::new(vec![2, 3]);
        assert_eq!(s.permuted_indices(&[1, 0]), vec![0, 3, 1, 4, 2, 5]);
        assert_eq!(s.permuted_indices(&[0, 1]), vec![0, 1, 2, 3, 4, 5]);
    }
}
