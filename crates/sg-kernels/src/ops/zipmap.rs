use sg_onnx::{AttributeKind, Node};
use sg_tensor::{DType, Label, Record, ShapeObject, Value};

use crate::attrs::{AttrReader, AttributeSpec};
use crate::error::{KernelError, Result};
use crate::kernel::{check_arity, tensor_at, Kernel, KernelContext};

const SCHEMA: &[AttributeSpec] = &[
    AttributeSpec::optional("classlabels_int64s", AttributeKind::Ints),
    AttributeSpec::optional("classlabels_strings", AttributeKind::Strings),
];

/// Turns each row of class scores into a label to score record.
#[derive(Debug)]
pub struct ZipMap {
    labels: Vec<Label>,
}

impl ZipMap {
    pub fn new(node: &Node) -> Result<Self> {
        let attrs = AttrReader::new(node, SCHEMA)?;
        let ints = attrs.ints("classlabels_int64s")?;
        let strings = attrs.strings("classlabels_strings")?;
        let labels = match (ints.is_empty(), strings.is_empty()) {
            (false, true) => ints.into_iter().map(Label::Int).collect(),
            (true, false) => strings.into_iter().map(Label::Str).collect(),
            _ => {
                return Err(attrs.error(
                    "exactly one of classlabels_int64s and classlabels_strings must be non-empty",
                ))
            }
        };
        Ok(ZipMap { labels })
    }
}

impl Kernel for ZipMap {
    fn op_type(&self) -> &str {
        "ZipMap"
    }

    fn compute(&self, inputs: &[&Value], _ctx: &KernelContext) -> Result<Vec<Value>> {
        check_arity("ZipMap", inputs, 1, 1)?;
        let x = tensor_at(inputs, 0)?;
        let width = match x.dims() {
            [c] | [_, c] => *c,
            _ => {
                return Err(KernelError::ShapeMismatch(format!(
                    "ZipMap input must be 1-D or 2-D, got rank {} ({})",
                    x.dims().len(),
                    x.shape()
                )))
            }
        };
        if width != self.labels.len() {
            return Err(KernelError::ShapeMismatch(format!(
                "ZipMap has {} labels, input is {}",
                self.labels.len(),
                x.shape()
            )));
        }
        let scores = x.cast(DType::F32)?;
        let scores = scores.data::<f32>()?;
        let records: Vec<Record> = scores
            .chunks(width.max(1))
            .map(|row| self.labels.iter().cloned().zip(row.iter().copied()).collect())
            .collect();
        Ok(vec![Value::Records(records)])
    }

    fn infer_shapes(&self, _inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        Some(vec![ShapeObject::unknown(None)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sg_onnx::Attribute;
    use sg_tensor::{CpuBackend, Tensor};

    #[test]
    fn test_rows_become_records() {
        let node = Node::new("ZipMap", ["x"], ["y"])
            .with_attr("classlabels_strings", Attribute::Strings(vec!["no".into(), "yes".into()]));
        let k = ZipMap::new(&node).unwrap();
        let backend = CpuBackend::new();
        let x: Value = Tensor::from_vec(vec![0.25f32, 0.75, 0.5, 0.5], &[2, 2]).unwrap().into();
        let out = k.compute(&[&x], &KernelContext::new(&backend)).unwrap();
        let records = out[0].as_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0][&Label::Str("yes".into())], 0.75);
        assert_eq!(records[1][&Label::Str("no".into())], 0.5);
    }

    #[test]
    fn test_descriptor_required() {
        let none = Node::new("ZipMap", ["x"], ["y"]);
        assert!(matches!(ZipMap::new(&none), Err(KernelError::Attribute { .. })));
        let both = Node::new("ZipMap", ["x"], ["y"])
            .with_attr("classlabels_int64s", Attribute::Ints(vec![0]))
            .with_attr("classlabels_strings", Attribute::Strings(vec!["a".into()]));
        assert!(ZipMap::new(&both).is_err());
    }

    #[test]
    fn test_width_checked() {
        let node = Node::new("ZipMap", ["x"], ["y"])
            .with_attr("classlabels_int64s", Attribute::Ints(vec![0, 1, 2]));
        let k = ZipMap::new(&node).unwrap();
        let backend = CpuBackend::new();
        let x: Value = Tensor::from_vec(vec![0.5f32, 0.5], &[1, 2]).unwrap().into();
        assert!(matches!(
            k.compute(&[&x], &KernelContext::new(&backend)),
            Err(KernelError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_rank_above_two_rejected() {
        let node = Node::new("ZipMap", ["x"], ["y"])
            .with_attr("classlabels_int64s", Attribute::Ints(vec![0, 1]));
        let k = ZipMap::new(&node).unwrap();
        let backend = CpuBackend::new();
        let x: Value = Tensor::from_vec(vec![0.5f32; 4], &[1, 2, 2]).unwrap().into();
        match k.compute(&[&x], &KernelContext::new(&backend)) {
            Err(KernelError::ShapeMismatch(msg)) => assert!(msg.contains("rank 3"), "{}", msg),
            other => panic!("expected a rank error, got {:?}", other),
        }
    }
}
