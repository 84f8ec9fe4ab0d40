use std::fmt;
use std::ops::{Add, Mul, Sub};

use crate::error::{Result, TensorError};

/// Element types a tensor can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating point.
    F32,
    /// 64-bit floating point.
    F64,
    /// 64-bit signed integer.
    I64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Str,
}

impl DType {
    /// Converts an ONNX `TensorProto.DataType` id to a `DType`.
    ///
    /// ONNX data type ids:
    /// - 1 => FLOAT
    /// - 7 => INT64
    /// - 8 => STRING
    /// - 9 => BOOL
    /// - 11 => DOUBLE
    ///
    /// Narrower encodings (FLOAT16, INT32) are widened by the loader and are
    /// not distinct runtime types.
    pub fn from_onnx_type(id: i32) -> Option<DType> {
        match id {
            1 => Some(DType::F32),
            7 => Some(DType::I64),
            8 => Some(DType::Str),
            9 => Some(DType::Bool),
            11 => Some(DType::F64),
            _ => None,
        }
    }

    /// Returns the ONNX data type id for this `DType`.
    pub fn to_onnx_type(&self) -> i32 {
        match self {
            DType::F32 => 1,
            DType::I64 => 7,
            DType::Str => 8,
            DType::Bool => 9,
            DType::F64 => 11,
        }
    }

    /// Returns true for floating point types.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    /// Returns true for types arithmetic kernels accept.
    pub fn is_numeric(&self) -> bool {
        matches!(self, DType::F32 | DType::F64 | DType::I64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "float32"),
            DType::F64 => write!(f, "float64"),
            DType::I64 => write!(f, "int64"),
            DType::Bool => write!(f, "bool"),
            DType::Str => write!(f, "str"),
        }
    }
}

/// Element types the arithmetic loops in `cpu` are generic over.
pub trait Numeric:
    Copy
    + PartialOrd
    + Default
    + fmt::Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Send
    + Sync
    + 'static
{
    fn zero() -> Self;
    fn one() -> Self;
    fn from_usize(n: usize) -> Self;
    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;
    /// Integer arithmetic wraps on overflow, as numpy does.
    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
    fn wrapping_mul(self, rhs: Self) -> Self;
    /// Integer division fails on a zero divisor and on `MIN / -1`.
    fn divide(self, rhs: Self) -> Result<Self>;
    fn lowest() -> Self;
    fn highest() -> Self;
}

macro_rules! impl_float {
    ($t:ty) => {
        impl Numeric for $t {
            fn zero() -> Self {
                0.0
            }
            fn one() -> Self {
                1.0
            }
            fn from_usize(n: usize) -> Self {
                n as $t
            }
            fn from_f64(v: f64) -> Self {
                v as $t
            }
            fn to_f64(self) -> f64 {
                self as f64
            }
            fn wrapping_add(self, rhs: Self) -> Self {
                self + rhs
            }
            fn wrapping_sub(self, rhs: Self) -> Self {
                self - rhs
            }
            fn wrapping_mul(self, rhs: Self) -> Self {
                self * rhs
            }
            fn divide(self, rhs: Self) -> Result<Self> {
                Ok(self / rhs)
            }
            fn lowest() -> Self {
                <$t>::NEG_INFINITY
            }
            fn highest() -> Self {
                <$t>::INFINITY
            }
        }
    };
}

impl_float!(f32);
impl_float!(f64);

impl Numeric for i64 {
    fn zero() -> Self {
        0
    }
    fn one() -> Self {
        1
    }
    fn from_usize(n: usize) -> Self {
        n as i64
    }
    fn from_f64(v: f64) -> Self {
        v as i64
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn wrapping_add(self, rhs: Self) -> Self {
        i64::wrapping_add(self, rhs)
    }
    fn wrapping_sub(self, rhs: Self) -> Self {
        i64::wrapping_sub(self, rhs)
    }
    fn wrapping_mul(self, rhs: Self) -> Self {
        i64::wrapping_mul(self, rhs)
    }
    fn divide(self, rhs: Self) -> Result<Self> {
        if rhs == 0 {
            return Err(TensorError::DivisionByZero);
        }
        self.checked_div(rhs)
            .ok_or_else(|| TensorError::ArithmeticOverflow(format!("{} / {}", self, rhs)))
    }
    fn lowest() -> Self {
        i64::MIN
    }
    fn highest() -> Self {
        i64::MAX
    }
}
