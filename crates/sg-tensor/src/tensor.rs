use crate::backend::ComputeBackend;
use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::storage::{CpuStorage, Element};

/// A tensor backed by CPU storage.
///
/// Holds contiguous, row-major data of one element type with an associated
/// shape. Operations that require arithmetic are dispatched to a
/// `ComputeBackend`; layout operations live here.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    storage: CpuStorage,
    shape: Shape,
}

impl Tensor {
    /// Create a new tensor from data and a shape.
    ///
    /// # Errors
    /// Fails if the data length does not match `shape.numel()`.
    pub fn new(data: impl Into<CpuStorage>, shape: Shape) -> Result<Self> {
        let storage = data.into();
        let numel = shape
            .checked_numel()
            .ok_or_else(|| TensorError::DimensionOverflow(format!("{:?}", shape.dims())))?;
        if storage.len() != numel {
            return Err(TensorError::DataLength {
                len: storage.len(),
                shape: shape.dims().to_vec(),
            });
        }
        Ok(Tensor { storage, shape })
    }

    /// Shorthand for `Tensor::new(data, Shape::from_slice(dims))`.
    pub fn from_vec<T: Element>(data: Vec<T>, dims: &[usize]) -> Result<Self> {
        Tensor::new(data, Shape::from_slice(dims))
    }

    /// A rank-0 tensor holding one element.
    pub fn scalar<T: Element>(value: T) -> Self {
        Tensor {
            storage: T::into_storage(vec![value]),
            shape: Shape::new(vec![]),
        }
    }

    /// Create a zero-filled tensor with the given shape.
    pub fn zeros(dtype: DType, shape: Shape) -> Self {
        let n = shape.numel();
        Tensor {
            storage: CpuStorage::zeros(dtype, n),
            shape,
        }
    }

    /// Returns a reference to the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    pub fn numel(&self) -> usize {
        self.storage.len()
    }

    /// Borrow the data as a typed slice.
    pub fn data<T: Element>(&self) -> Result<&[T]> {
        self.storage.as_slice()
    }

    pub fn data_mut<T: Element>(&mut self) -> Result<&mut [T]> {
        self.storage.as_slice_mut()
    }

    /// Returns the underlying storage reference.
    pub fn storage(&self) -> &CpuStorage {
        &self.storage
    }

    pub fn into_storage(self) -> CpuStorage {
        self.storage
    }

    /// Reshape the tensor, returning a new tensor with the same data but
    /// a different shape.
    ///
    /// The total number of elements must remain the same.
    pub fn reshape(&self, new_shape: Shape) -> Result<Tensor> {
        self.clone().into_reshaped(new_shape)
    }

    /// Reshape without copying the data.
    pub fn into_reshaped(self, new_shape: Shape) -> Result<Tensor> {
        if self.shape.numel() != new_shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.dims().to_vec(),
                got: new_shape.dims().to_vec(),
            });
        }
        Ok(Tensor {
            storage: self.storage,
            shape: new_shape,
        })
    }

    /// Permute axes: output axis `i` is input axis `perm[i]`.
    pub fn transpose(&self, perm: &[usize]) -> Result<Tensor> {
        let ndim = self.shape.ndim();
        let mut seen = vec![false; ndim];
        if perm.len() != ndim {
            return Err(TensorError::Other(format!(
                "permutation {:?} does not match rank {}",
                perm, ndim
            )));
        }
        for &p in perm {
            if p >= ndim || seen[p] {
                return Err(TensorError::Other(format!(
                    "{:?} is not a permutation of 0..{}",
                    perm, ndim
                )));
            }
            seen[p] = true;
        }
        let dims: Vec<usize> = perm.iter().map(|&p| self.shape.dim(p)).collect();
        let storage = self.storage.gather(&self.shape.permuted_indices(perm));
        Ok(Tensor {
            storage,
            shape: Shape::new(dims),
        })
    }

    /// Materialize this tensor broadcast to `target`.
    pub fn broadcast_to(&self, target: &Shape) -> Result<Tensor> {
        let joined = Shape::broadcast_shape(&self.shape, target)?;
        if &joined != target {
            return Err(TensorError::BroadcastError {
                a: self.shape.dims().to_vec(),
                b: target.dims().to_vec(),
            });
        }
        if &self.shape == target {
            return Ok(self.clone());
        }
        Ok(Tensor {
            storage: self.storage.gather(&self.shape.broadcast_indices(target)),
            shape: target.clone(),
        })
    }

    /// The sub-tensor at `index` along `axis`, with that axis removed.
    pub fn select(&self, axis: usize, index: usize) -> Result<Tensor> {
        let ndim = self.shape.ndim();
        if axis >= ndim {
            return Err(TensorError::InvalidAxis {
                axis: axis as i64,
                ndim,
            });
        }
        let extent = self.shape.dim(axis);
        if index >= extent {
            return Err(TensorError::Other(format!(
                "index {} out of range for axis {} of extent {}",
                index, axis, extent
            )));
        }
        let outer: usize = self.shape.dims()[..axis].iter().product();
        let inner: usize = self.shape.dims()[axis + 1..].iter().product();
        let mut indices = Vec::with_capacity(outer * inner);
        for o in 0..outer {
            let base = (o * extent + index) * inner;
            indices.extend(base..base + inner);
        }
        Ok(Tensor {
            storage: self.storage.gather(&indices),
            shape: self.shape.remove_axis(axis),
        })
    }

    /// Join tensors along an existing axis. All other extents must agree.
    pub fn concat(parts: &[&Tensor], axis: usize) -> Result<Tensor> {
        let Some(first) = parts.first() else {
            return Err(TensorError::Other("concat of zero tensors".to_string()));
        };
        let ndim = first.shape.ndim();
        if axis >= ndim {
            return Err(TensorError::InvalidAxis {
                axis: axis as i64,
                ndim,
            });
        }
        let mut total = 0;
        for part in parts {
            let compatible = part.shape.ndim() == ndim
                && (0..ndim).all(|i| i == axis || part.shape.dim(i) == first.shape.dim(i));
            if !compatible {
                return Err(TensorError::ShapeMismatch {
                    expected: first.shape.dims().to_vec(),
                    got: part.shape.dims().to_vec(),
                });
            }
            total += part.shape.dim(axis);
        }

        let outer: usize = first.shape.dims()[..axis].iter().product();
        let inner: usize = first.shape.dims()[axis + 1..].iter().product();
        let combined = CpuStorage::concat(&parts.iter().map(|p| &p.storage).collect::<Vec<_>>())?;

        // Offsets of each part inside `combined`.
        let mut starts = Vec::with_capacity(parts.len());
        let mut acc = 0;
        for part in parts {
            starts.push(acc);
            acc += part.numel();
        }

        let mut indices = Vec::with_capacity(combined.len());
        for o in 0..outer {
            for (part, &start) in parts.iter().zip(&starts) {
                let block = part.shape.dim(axis) * inner;
                let base = start + o * block;
                indices.extend(base..base + block);
            }
        }
        let mut dims = first.shape.dims().to_vec();
        dims[axis] = total;
        Ok(Tensor {
            storage: combined.gather(&indices),
            shape: Shape::new(dims),
        })
    }

    /// Join equally shaped tensors along a new axis inserted at `axis`.
    pub fn stack(parts: &[Tensor], axis: usize) -> Result<Tensor> {
        let expanded = parts
            .iter()
            .map(|p| {
                if axis > p.shape.ndim() {
                    return Err(TensorError::InvalidAxis {
                        axis: axis as i64,
                        ndim: p.shape.ndim(),
                    });
                }
                p.reshape(p.shape.insert_axis(axis, 1))
            })
            .collect::<Result<Vec<_>>>()?;
        Tensor::concat(&expanded.iter().collect::<Vec<_>>(), axis)
    }

    /// Convert every element to `dtype`.
    pub fn cast(&self, dtype: DType) -> Result<Tensor> {
        Ok(Tensor {
            storage: self.storage.cast(dtype)?,
            shape: self.shape.clone(),
        })
    }

    /// Matrix multiplication of two 2D tensors using the given backend.
    ///
    /// self is [m, k], other is [k, n], result is [m, n].
    pub fn matmul(&self, other: &Tensor, backend: &dyn ComputeBackend) -> Result<Tensor> {
        backend.matmul(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuBackend;

    fn t(data: Vec<f32>, dims: &[usize]) -> Tensor {
        Tensor::from_vec(data, dims).unwrap()
    }

    #[test]
    fn test_new_tensor() {
        let t = t(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        assert_eq!(t.shape().ndim(), 2);
        assert_eq!(t.shape().dim(0), 2);
        assert_eq!(t.shape().dim(1), 3);
        assert_eq!(t.dtype(), DType::F32);
        assert_eq!(t.data::<f32>().unwrap(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_new_shape_mismatch() {
        let r = Tensor::new(vec![1.0f32, 2.0], Shape::new(vec![3]));
        assert!(matches!(r, Err(TensorError::DataLength { len: 2, .. })));
        let r = Tensor::new(Vec::<f32>::new(), Shape::new(vec![1 << 40, 1 << 40]));
        assert!(matches!(r, Err(TensorError::DimensionOverflow(_))));
    }

    #[test]
    fn test_zeros_and_scalar() {
        let z = Tensor::zeros(DType::I64, Shape::new(vec![2, 3]));
        assert_eq!(z.data::<i64>().unwrap(), &[0; 6]);

        let s = Tensor::scalar(2.5f64);
        assert_eq!(s.dims(), &[] as &[usize]);
        assert_eq!(s.data::<f64>().unwrap(), &[2.5]);
    }

    #[test]
    fn test_reshape() {
        let a = t(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let r = a.reshape(Shape::new(vec![3, 2])).unwrap();
        assert_eq!(r.dims(), &[3, 2]);
        assert_eq!(r.data::<f32>().unwrap(), a.data::<f32>().unwrap());
    }

    #[test]
    fn test_reshape_mismatch() {
        let a = t(vec![1.0, 2.0, 3.0], &[3]);
        assert!(a.reshape(Shape::new(vec![2, 2])).is_err());
    }

    #[test]
    fn test_transpose() {
        let a = t(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let tr = a.transpose(&[1, 0]).unwrap();
        assert_eq!(tr.dims(), &[3, 2]);
        assert_eq!(tr.data::<f32>().unwrap(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert!(a.transpose(&[0, 0]).is_err());
    }

    #[test]
    fn test_select_and_stack() {
        let a = t(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let row = a.select(0, 1).unwrap();
        assert_eq!(row.data::<f32>().unwrap(), &[4.0, 5.0, 6.0]);
        let col = a.select(1, 2).unwrap();
        assert_eq!(col.data::<f32>().unwrap(), &[3.0, 6.0]);

        let rows: Vec<Tensor> = (0..2).map(|i| a.select(0, i).unwrap()).collect();
        assert_eq!(Tensor::stack(&rows, 0).unwrap(), a);
        let cols: Vec<Tensor> = (0..3).map(|i| a.select(1, i).unwrap()).collect();
        assert_eq!(Tensor::stack(&cols, 1).unwrap(), a);
    }

    #[test]
    fn test_concat() {
        let a = t(vec![1.0, 2.0], &[1, 2]);
        let b = t(vec![3.0, 4.0, 5.0, 6.0], &[2, 2]);
        let c = Tensor::concat(&[&a, &b], 0).unwrap();
        assert_eq!(c.dims(), &[3, 2]);
        assert_eq!(c.data::<f32>().unwrap(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let d = t(vec![7.0, 8.0], &[2, 1]);
        let e = Tensor::concat(&[&b, &d], 1).unwrap();
        assert_eq!(e.data::<f32>().unwrap(), &[3.0, 4.0, 7.0, 5.0, 6.0, 8.0]);
        assert!(Tensor::concat(&[&a, &d], 0).is_err());
    }

    #[test]
    fn test_broadcast_to() {
        let a = t(vec![1.0, 2.0], &[2, 1]);
        let b = a.broadcast_to(&Shape::new(vec![2, 2])).unwrap();
        assert_eq!(b.data::<f32>().unwrap(), &[1.0, 1.0, 2.0, 2.0]);
        assert!(a.broadcast_to(&Shape::new(vec![3, 2])).is_err());
    }

    #[test]
    fn test_matmul() {
        let backend = CpuBackend::new();
        let a = t(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let b = t(vec![5.0, 6.0, 7.0, 8.0], &[2, 2]);
        let c = a.matmul(&b, &backend).unwrap();
        assert_eq!(c.dims(), &[2, 2]);
        assert_eq!(c.data::<f32>().unwrap(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_matmul_dimension_mismatch() {
        let backend = CpuBackend::new();
        let a = t(vec![1.0, 2.0, 3.0], &[1, 3]);
        let b = t(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]);
        assert!(a.matmul(&b, &backend).is_err());
    }
}
