use crate::dtype::DType;
use crate::error::{Result, TensorError};

/// CPU-side tensor storage, one variant per element type.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I64(Vec<i64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

/// Rust element types that map onto a `CpuStorage` variant.
pub trait Element: Clone + Send + Sync + 'static {
    const DTYPE: DType;
    fn into_storage(data: Vec<Self>) -> CpuStorage;
    fn slice(storage: &CpuStorage) -> Option<&[Self]>;
    fn slice_mut(storage: &mut CpuStorage) -> Option<&mut [Self]>;
}

macro_rules! impl_element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const DTYPE: DType = DType::$variant;

            fn into_storage(data: Vec<Self>) -> CpuStorage {
                CpuStorage::$variant(data)
            }

            fn slice(storage: &CpuStorage) -> Option<&[Self]> {
                match storage {
                    CpuStorage::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn slice_mut(storage: &mut CpuStorage) -> Option<&mut [Self]> {
                match storage {
                    CpuStorage::$variant(v) => Some(v.as_mut_slice()),
                    _ => None,
                }
            }
        }
    };
}

impl_element!(f32, F32);
impl_element!(f64, F64);
impl_element!(i64, I64);
impl_element!(bool, Bool);
impl_element!(String, Str);

impl<T: Element> From<Vec<T>> for CpuStorage {
    fn from(data: Vec<T>) -> Self {
        T::into_storage(data)
    }
}

impl CpuStorage {
    /// Number of elements in this storage.
    pub fn len(&self) -> usize {
        match self {
            CpuStorage::F32(v) => v.len(),
            CpuStorage::F64(v) => v.len(),
            CpuStorage::I64(v) => v.len(),
            CpuStorage::Bool(v) => v.len(),
            CpuStorage::Str(v) => v.len(),
        }
    }

    /// Returns true if the storage contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the dtype of this storage.
    pub fn dtype(&self) -> DType {
        match self {
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F64(_) => DType::F64,
            CpuStorage::I64(_) => DType::I64,
            CpuStorage::Bool(_) => DType::Bool,
            CpuStorage::Str(_) => DType::Str,
        }
    }

    /// Borrow the data as a typed slice.
    ///
    /// # Errors
    /// Returns a dtype mismatch if `T` is not the stored element type.
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        T::slice(self).ok_or_else(|| TensorError::DTypeMismatch {
            expected: T::DTYPE.to_string(),
            got: self.dtype().to_string(),
        })
    }

    /// Borrow the data as a mutable typed slice.
    pub fn as_slice_mut<T: Element>(&mut self) -> Result<&mut [T]> {
        let got = self.dtype();
        T::slice_mut(self).ok_or_else(|| TensorError::DTypeMismatch {
            expected: T::DTYPE.to_string(),
            got: got.to_string(),
        })
    }

    /// Create zero-filled (or empty-string, or false) storage.
    pub fn zeros(dtype: DType, n: usize) -> Self {
        match dtype {
            DType::F32 => CpuStorage::F32(vec![0.0; n]),
            DType::F64 => CpuStorage::F64(vec![0.0; n]),
            DType::I64 => CpuStorage::I64(vec![0; n]),
            DType::Bool => CpuStorage::Bool(vec![false; n]),
            DType::Str => CpuStorage::Str(vec![String::new(); n]),
        }
    }

    /// Gather elements at the given flat indices into new storage.
    pub fn gather(&self, indices: &[usize]) -> Self {
        fn pick<T: Clone>(v: &[T], indices: &[usize]) -> Vec<T> {
            indices.iter().map(|&i| v[i].clone()).collect()
        }
        match self {
            CpuStorage::F32(v) => CpuStorage::F32(pick(v, indices)),
            CpuStorage::F64(v) => CpuStorage::F64(pick(v, indices)),
            CpuStorage::I64(v) => CpuStorage::I64(pick(v, indices)),
            CpuStorage::Bool(v) => CpuStorage::Bool(pick(v, indices)),
            CpuStorage::Str(v) => CpuStorage::Str(pick(v, indices)),
        }
    }

    /// Concatenate storages of the same dtype.
    pub fn concat(parts: &[&CpuStorage]) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Err(TensorError::Other("concat of zero storages".to_string()));
        };
        let mut out = CpuStorage::zeros(first.dtype(), 0);
        for part in parts {
            match (&mut out, part) {
                (CpuStorage::F32(o), CpuStorage::F32(p)) => o.extend_from_slice(p),
                (CpuStorage::F64(o), CpuStorage::F64(p)) => o.extend_from_slice(p),
                (CpuStorage::I64(o), CpuStorage::I64(p)) => o.extend_from_slice(p),
                (CpuStorage::Bool(o), CpuStorage::Bool(p)) => o.extend_from_slice(p),
                (CpuStorage::Str(o), CpuStorage::Str(p)) => o.extend_from_slice(p),
                (o, p) => {
                    return Err(TensorError::DTypeMismatch {
                        expected: o.dtype().to_string(),
                        got: p.dtype().to_string(),
                    })
                }
            }
        }
        Ok(out)
    }

    /// Convert every element to `dtype`.
    ///
    /// Numeric to string uses the display form; string to numeric parses and
    /// fails on malformed text.
    pub fn cast(&self, dtype: DType) -> Result<Self> {
        if self.dtype() == dtype {
            return Ok(self.clone());
        }
        if let CpuStorage::Str(v) = self {
            return parse_strings(v, dtype);
        }
        if dtype == DType::Str {
            let strings = match self {
                CpuStorage::F32(v) => v.iter().map(|x| x.to_string()).collect(),
                CpuStorage::F64(v) => v.iter().map(|x| x.to_string()).collect(),
                CpuStorage::I64(v) => v.iter().map(|x| x.to_string()).collect(),
                CpuStorage::Bool(v) => v.iter().map(|x| x.to_string()).collect(),
                CpuStorage::Str(v) => v.clone(),
            };
            return Ok(CpuStorage::Str(strings));
        }
        let wide = self.to_f64_vec()?;
        Ok(match dtype {
            DType::F32 => CpuStorage::F32(wide.iter().map(|&x| x as f32).collect()),
            DType::F64 => CpuStorage::F64(wide),
            DType::I64 => CpuStorage::I64(wide.iter().map(|&x| x as i64).collect()),
            DType::Bool => CpuStorage::Bool(wide.iter().map(|&x| x != 0.0).collect()),
            DType::Str => unreachable!("string target handled above"),
        })
    }

    /// Widen numeric or boolean data to f64.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        match self {
            CpuStorage::F32(v) => Ok(v.iter().map(|&x| x as f64).collect()),
            CpuStorage::F64(v) => Ok(v.clone()),
            CpuStorage::I64(v) => Ok(v.iter().map(|&x| x as f64).collect()),
            CpuStorage::Bool(v) => Ok(v.iter().map(|&x| if x { 1.0 } else { 0.0 }).collect()),
            CpuStorage::Str(_) => Err(TensorError::UnsupportedDType(
                "string data has no numeric value".to_string(),
            )),
        }
    }
}

fn parse_strings(v: &[String], dtype: DType) -> Result<CpuStorage> {
    fn parse_all<T: std::str::FromStr>(v: &[String], dtype: DType) -> Result<Vec<T>> {
        v.iter()
            .map(|s| {
                s.trim().parse::<T>().map_err(|_| {
                    TensorError::Other(format!("cannot parse '{}' as {}", s, dtype))
                })
            })
            .collect()
    }
    Ok(match dtype {
        DType::F32 => CpuStorage::F32(parse_all(v, dtype)?),
        DType::F64 => CpuStorage::F64(parse_all(v, dtype)?),
        DType::I64 => CpuStorage::I64(parse_all(v, dtype)?),
        DType::Bool => CpuStorage::Bool(parse_all(v, dtype)?),
        DType::Str => CpuStorage::Str(v.to_vec()),
    })
}
