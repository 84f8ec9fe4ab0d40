use std::collections::HashMap;

use sg_onnx::{AttributeKind, Node};
use sg_tensor::{CpuStorage, DType, ShapeObject, Tensor, Value};

use crate::attrs::{AttrReader, AttributeSpec};
use crate::error::{KernelError, Result};
use crate::kernel::{check_arity, tensor_at, Kernel, KernelContext};

const SCHEMA: &[AttributeSpec] = &[
    AttributeSpec::optional("keys_floats", AttributeKind::Floats),
    AttributeSpec::optional("keys_int64s", AttributeKind::Ints),
    AttributeSpec::optional("keys_strings", AttributeKind::Strings),
    AttributeSpec::optional("values_floats", AttributeKind::Floats),
    AttributeSpec::optional("values_int64s", AttributeKind::Ints),
    AttributeSpec::optional("values_strings", AttributeKind::Strings),
    AttributeSpec::float("default_float", 0.0),
    AttributeSpec::int("default_int64", -1),
    AttributeSpec::string("default_string", ""),
    AttributeSpec::optional("classes_strings", AttributeKind::Strings),
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Int(i64),
    // Bit pattern, with -0.0 folded onto 0.0.
    Float(u32),
    Str(String),
}

fn float_key(v: f32) -> Key {
    Key::Float(if v == 0.0 { 0 } else { v.to_bits() })
}

#[derive(Debug)]
enum Table {
    Floats { values: Vec<f32>, default: f32 },
    Ints { values: Vec<i64>, default: i64 },
    Strings { values: Vec<String>, default: String },
}

impl Table {
    fn len(&self) -> usize {
        match self {
            Table::Floats { values, .. } => values.len(),
            Table::Ints { values, .. } => values.len(),
            Table::Strings { values, .. } => values.len(),
        }
    }

    fn dtype(&self) -> DType {
        match self {
            Table::Floats { .. } => DType::F32,
            Table::Ints { .. } => DType::I64,
            Table::Strings { .. } => DType::Str,
        }
    }

    fn gather(&self, hits: &[Option<usize>]) -> CpuStorage {
        match self {
            Table::Floats { values, default } => CpuStorage::F32(
                hits.iter().map(|h| h.map_or(*default, |i| values[i])).collect(),
            ),
            Table::Ints { values, default } => CpuStorage::I64(
                hits.iter().map(|h| h.map_or(*default, |i| values[i])).collect(),
            ),
            Table::Strings { values, default } => CpuStorage::Str(
                hits.iter()
                    .map(|h| h.map_or_else(|| default.clone(), |i| values[i].clone()))
                    .collect(),
            ),
        }
    }
}

/// Maps every input element through a fixed key to value table, falling
/// back to the default of the value type on a miss.
#[derive(Debug)]
pub struct LabelEncoder {
    key_dtype: DType,
    index: HashMap<Key, usize>,
    table: Table,
}

impl LabelEncoder {
    /// The version 1 form, keyed by `classes_strings`, is not supported.
    pub fn v1(node: &Node) -> Result<Self> {
        Err(KernelError::Unimplemented(format!(
            "LabelEncoder version 1 (node '{}')",
            node.name
        )))
    }

    pub fn v2(node: &Node) -> Result<Self> {
        let attrs = AttrReader::new(node, SCHEMA)?;
        let key_groups = [
            ("keys_floats", DType::F32),
            ("keys_int64s", DType::I64),
            ("keys_strings", DType::Str),
        ];
        let present: Vec<_> = key_groups.iter().filter(|(n, _)| attrs.has(n)).collect();
        let (key_attr, key_dtype) = match present.as_slice() {
            [&(name, dtype)] => (name, dtype),
            [] if attrs.has("classes_strings") => {
                return Self::v1(node);
            }
            [] => return Err(attrs.error("no keys attribute defines the encoding")),
            _ => return Err(attrs.error("exactly one keys attribute may be set")),
        };
        let keys: Vec<Key> = match key_dtype {
            DType::F32 => attrs.floats(key_attr)?.into_iter().map(float_key).collect(),
            DType::I64 => attrs.ints(key_attr)?.into_iter().map(Key::Int).collect(),
            _ => attrs.strings(key_attr)?.into_iter().map(Key::Str).collect(),
        };

        let value_attrs = ["values_floats", "values_int64s", "values_strings"];
        match value_attrs.iter().filter(|n| attrs.has(n)).count() {
            1 => {}
            0 => return Err(attrs.error("no values attribute defines the encoding")),
            _ => return Err(attrs.error("exactly one values attribute may be set")),
        }
        let table = if attrs.has("values_floats") {
            Table::Floats {
                values: attrs.floats("values_floats")?,
                default: attrs.float("default_float")?,
            }
        } else if attrs.has("values_int64s") {
            Table::Ints {
                values: attrs.ints("values_int64s")?,
                default: attrs.int("default_int64")?,
            }
        } else {
            Table::Strings {
                values: attrs.strings("values_strings")?,
                default: attrs.string("default_string")?,
            }
        };
        if table.len() != keys.len() {
            return Err(attrs.error(format!(
                "{} keys but {} values",
                keys.len(),
                table.len()
            )));
        }

        let mut index = HashMap::with_capacity(keys.len());
        for (i, key) in keys.into_iter().enumerate() {
            // Last occurrence wins.
            index.insert(key, i);
        }
        Ok(LabelEncoder {
            key_dtype,
            index,
            table,
        })
    }

    fn lookup(&self, x: &Tensor) -> Result<Vec<Option<usize>>> {
        let hits = match (self.key_dtype, x.storage()) {
            (DType::I64, CpuStorage::I64(v)) => {
                v.iter().map(|&k| self.index.get(&Key::Int(k)).copied()).collect()
            }
            (DType::F32, CpuStorage::F32(v)) => {
                v.iter().map(|&k| self.index.get(&float_key(k)).copied()).collect()
            }
            (DType::F32, CpuStorage::F64(v)) => v
                .iter()
                .map(|&k| self.index.get(&float_key(k as f32)).copied())
                .collect(),
            (DType::Str, CpuStorage::Str(v)) => v
                .iter()
                .map(|k| self.index.get(&Key::Str(k.clone())).copied())
                .collect(),
            (expected, _) => {
                return Err(KernelError::InvalidInput(format!(
                    "LabelEncoder keys are {}, input is {}",
                    expected,
                    x.dtype()
                )))
            }
        };
        Ok(hits)
    }
}

impl Kernel for LabelEncoder {
    fn op_type(&self) -> &str {
        "LabelEncoder"
    }

    fn compute(&self, inputs: &[&Value], _ctx: &KernelContext) -> Result<Vec<Value>> {
        check_arity("LabelEncoder", inputs, 1, 1)?;
        let x = tensor_at(inputs, 0)?;
        let hits = self.lookup(x)?;
        let out = Tensor::new(self.table.gather(&hits), x.shape().clone())?;
        Ok(vec![out.into()])
    }

    fn infer_shapes(&self, inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        Some(vec![inputs
            .first()?
            .clone()
            .with_dtype(Some(self.table.dtype()))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sg_onnx::Attribute;
    use sg_tensor::CpuBackend;

    fn run(k: &LabelEncoder, x: Tensor) -> Result<Tensor> {
        let backend = CpuBackend::new();
        let x: Value = x.into();
        let out = k.compute(&[&x], &KernelContext::new(&backend))?;
        Ok(out.into_iter().next().unwrap().into_tensor()?)
    }

    #[test]
    fn test_int_keys_to_strings_with_default() {
        let node = Node::new("LabelEncoder", ["x"], ["y"])
            .with_domain("ai.onnx.ml")
            .with_attr("keys_int64s", Attribute::Ints(vec![1, 2]))
            .with_attr("values_strings", Attribute::Strings(vec!["a".into(), "b".into()]))
            .with_attr("default_string", Attribute::String("z".into()));
        let k = LabelEncoder::v2(&node).unwrap();
        let y = run(&k, Tensor::from_vec(vec![1i64, 3], &[2]).unwrap()).unwrap();
        assert_eq!(y.data::<String>().unwrap(), &["a".to_string(), "z".to_string()]);
    }

    #[test]
    fn test_duplicate_keys_take_last_value() {
        let node = Node::new("LabelEncoder", ["x"], ["y"])
            .with_attr("keys_int64s", Attribute::Ints(vec![1, 1]))
            .with_attr("values_int64s", Attribute::Ints(vec![10, 20]));
        let k = LabelEncoder::v2(&node).unwrap();
        let y = run(&k, Tensor::from_vec(vec![1i64], &[1]).unwrap()).unwrap();
        assert_eq!(y.data::<i64>().unwrap(), &[20]);
    }

    #[test]
    fn test_string_keys_to_floats() {
        let node = Node::new("LabelEncoder", ["x"], ["y"])
            .with_attr("keys_strings", Attribute::Strings(vec!["x".into(), "y".into()]))
            .with_attr("values_floats", Attribute::Floats(vec![0.5, 1.5]));
        let k = LabelEncoder::v2(&node).unwrap();
        let x = Tensor::from_vec(vec!["y".to_string(), "q".to_string()], &[1, 2]).unwrap();
        let y = run(&k, x).unwrap();
        assert_eq!(y.dims(), &[1, 2]);
        assert_eq!(y.data::<f32>().unwrap(), &[1.5, 0.0]);
    }

    #[test]
    fn test_float_keys_fold_negative_zero() {
        let node = Node::new("LabelEncoder", ["x"], ["y"])
            .with_attr("keys_floats", Attribute::Floats(vec![0.0, 2.5]))
            .with_attr("values_int64s", Attribute::Ints(vec![10, 20]));
        let k = LabelEncoder::v2(&node).unwrap();
        let y = run(&k, Tensor::from_vec(vec![-0.0f32, 2.5, 7.0], &[3]).unwrap()).unwrap();
        assert_eq!(y.data::<i64>().unwrap(), &[10, 20, -1]);
    }

    #[test]
    fn test_invalid_descriptors() {
        let both = Node::new("LabelEncoder", ["x"], ["y"])
            .with_attr("keys_int64s", Attribute::Ints(vec![1]))
            .with_attr("keys_strings", Attribute::Strings(vec!["a".into()]))
            .with_attr("values_int64s", Attribute::Ints(vec![1]));
        assert!(matches!(LabelEncoder::v2(&both), Err(KernelError::Attribute { .. })));

        let uneven = Node::new("LabelEncoder", ["x"], ["y"])
            .with_attr("keys_int64s", Attribute::Ints(vec![1, 2]))
            .with_attr("values_int64s", Attribute::Ints(vec![1]));
        assert!(matches!(LabelEncoder::v2(&uneven), Err(KernelError::Attribute { .. })));

        let old = Node::new("LabelEncoder", ["x"], ["y"])
            .with_attr("classes_strings", Attribute::Strings(vec!["a".into()]));
        assert!(matches!(LabelEncoder::v2(&old), Err(KernelError::Unimplemented(_))));
    }

    #[test]
    fn test_key_dtype_checked() {
        let node = Node::new("LabelEncoder", ["x"], ["y"])
            .with_attr("keys_int64s", Attribute::Ints(vec![1]))
            .with_attr("values_int64s", Attribute::Ints(vec![2]));
        let k = LabelEncoder::v2(&node).unwrap();
        let r = run(&k, Tensor::from_vec(vec!["1".to_string()], &[1]).unwrap());
        assert!(matches!(r, Err(KernelError::InvalidInput(_))));
    }
}
