use std::collections::BTreeMap;
use std::fmt;

use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::tensor::Tensor;

/// Key of one record entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Label {
    Int(i64),
    Str(String),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(i) => write!(f, "{}", i),
            Label::Str(s) => write!(f, "{}", s),
        }
    }
}

/// One label to score map, as produced per row by ZipMap.
pub type Record = BTreeMap<Label, f32>;

/// Anything that can be bound to a name during execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Tensor(Tensor),
    Records(Vec<Record>),
}

impl Value {
    pub fn as_tensor(&self) -> Result<&Tensor> {
        match self {
            Value::Tensor(t) => Ok(t),
            Value::Records(_) => Err(TensorError::DTypeMismatch {
                expected: "tensor".to_string(),
                got: "records".to_string(),
            }),
        }
    }

    pub fn into_tensor(self) -> Result<Tensor> {
        match self {
            Value::Tensor(t) => Ok(t),
            Value::Records(_) => Err(TensorError::DTypeMismatch {
                expected: "tensor".to_string(),
                got: "records".to_string(),
            }),
        }
    }

    pub fn as_records(&self) -> Option<&[Record]> {
        match self {
            Value::Records(r) => Some(r),
            Value::Tensor(_) => None,
        }
    }

    /// Element type for tensors, `None` for record sequences.
    pub fn dtype(&self) -> Option<DType> {
        match self {
            Value::Tensor(t) => Some(t.dtype()),
            Value::Records(_) => None,
        }
    }

    /// Short description used in diagnostics: `float32[2, 3]` or `records[4]`.
    pub fn describe(&self) -> String {
        match self {
            Value::Tensor(t) => format!("{}{}", t.dtype(), t.shape()),
            Value::Records(r) => format!("records[{}]", r.len()),
        }
    }
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Value::Tensor(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_value() {
        let v = Value::from(Tensor::from_vec(vec![1i64, 2], &[2]).unwrap());
        assert_eq!(v.dtype(), Some(DType::I64));
        assert_eq!(v.describe(), "int64[2]");
        assert!(v.as_records().is_none());
        assert!(v.into_tensor().is_ok());
    }

    #[test]
    fn test_records_value() {
        let mut rec = Record::new();
        rec.insert(Label::Str("b".into()), 0.25);
        rec.insert(Label::Str("a".into()), 0.75);
        let v = Value::Records(vec![rec]);
        assert_eq!(v.dtype(), None);
        assert!(v.as_tensor().is_err());
        let first = &v.as_records().unwrap()[0];
        let keys: Vec<String> = first.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
