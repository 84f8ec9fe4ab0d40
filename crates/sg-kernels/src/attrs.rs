//! Attribute schemas and their validated reader.
//!
//! Every kernel declares a static `&[AttributeSpec]`. [`AttrReader::new`]
//! checks the node against it once, at construction: attributes of the wrong
//! type and missing required attributes are errors, attributes the schema
//! does not list are logged and ignored.

use std::sync::Arc;

use sg_onnx::{Attribute, AttributeKind, Graph, Node};
use sg_tensor::Tensor;
use tracing::warn;

use crate::error::{KernelError, Result};

/// Value used when an attribute is absent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttrDefault {
    Required,
    /// Absent is allowed and distinguishable from any value.
    Optional,
    Float(f32),
    Int(i64),
    Str(&'static str),
    Floats(&'static [f32]),
    Ints(&'static [i64]),
    Strings(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeSpec {
    pub name: &'static str,
    pub kind: AttributeKind,
    pub default: AttrDefault,
}

impl AttributeSpec {
    pub const fn required(name: &'static str, kind: AttributeKind) -> Self {
        AttributeSpec {
            name,
            kind,
            default: AttrDefault::Required,
        }
    }

    pub const fn optional(name: &'static str, kind: AttributeKind) -> Self {
        AttributeSpec {
            name,
            kind,
            default: AttrDefault::Optional,
        }
    }

    pub const fn float(name: &'static str, value: f32) -> Self {
        AttributeSpec {
            name,
            kind: AttributeKind::Float,
            default: AttrDefault::Float(value),
        }
    }

    pub const fn int(name: &'static str, value: i64) -> Self {
        AttributeSpec {
            name,
            kind: AttributeKind::Int,
            default: AttrDefault::Int(value),
        }
    }

    pub const fn string(name: &'static str, value: &'static str) -> Self {
        AttributeSpec {
            name,
            kind: AttributeKind::String,
            default: AttrDefault::Str(value),
        }
    }

    pub const fn floats(name: &'static str, value: &'static [f32]) -> Self {
        AttributeSpec {
            name,
            kind: AttributeKind::Floats,
            default: AttrDefault::Floats(value),
        }
    }

    pub const fn ints(name: &'static str, value: &'static [i64]) -> Self {
        AttributeSpec {
            name,
            kind: AttributeKind::Ints,
            default: AttrDefault::Ints(value),
        }
    }

    pub const fn strings(name: &'static str, value: &'static [&'static str]) -> Self {
        AttributeSpec {
            name,
            kind: AttributeKind::Strings,
            default: AttrDefault::Strings(value),
        }
    }
}

/// Typed access to a node's attributes, validated against a schema.
#[derive(Debug)]
pub struct AttrReader<'a> {
    node: &'a Node,
    schema: &'static [AttributeSpec],
}

impl<'a> AttrReader<'a> {
    pub fn new(node: &'a Node, schema: &'static [AttributeSpec]) -> Result<Self> {
        let reader = AttrReader { node, schema };
        for (name, value) in &node.attributes {
            match schema.iter().find(|s| s.name == name) {
                Some(spec) if spec.kind != value.kind() => {
                    return Err(reader.error(format!(
                        "attribute '{}' must be {}, got {}",
                        name,
                        spec.kind,
                        value.kind()
                    )))
                }
                Some(_) => {}
                None => warn!(
                    node = %node.name,
                    op_type = %node.op_type,
                    attribute = %name,
                    "ignoring unknown attribute"
                ),
            }
        }
        for spec in schema {
            if spec.default == AttrDefault::Required && !node.attributes.contains_key(spec.name) {
                return Err(reader.error(format!("missing required attribute '{}'", spec.name)));
            }
        }
        Ok(reader)
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }

    /// An attribute error naming this node.
    pub fn error(&self, message: impl Into<String>) -> KernelError {
        KernelError::Attribute {
            node: self.node.name.clone(),
            message: message.into(),
        }
    }

    fn spec(&self, name: &str) -> Result<&'static AttributeSpec> {
        self.schema
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| self.error(format!("attribute '{}' is not in the schema", name)))
    }

    /// Whether the node sets `name` explicitly.
    pub fn has(&self, name: &str) -> bool {
        self.node.attributes.contains_key(name)
    }

    fn get(&self, name: &str) -> Result<(Option<&'a Attribute>, AttrDefault)> {
        let spec = self.spec(name)?;
        Ok((self.node.attributes.get(name), spec.default))
    }

    fn absent(&self, name: &str) -> KernelError {
        self.error(format!("attribute '{}' has no default", name))
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        match self.get(name)? {
            (Some(Attribute::Int(v)), _) => Ok(*v),
            (None, AttrDefault::Int(v)) => Ok(v),
            _ => Err(self.absent(name)),
        }
    }

    pub fn float(&self, name: &str) -> Result<f32> {
        match self.get(name)? {
            (Some(Attribute::Float(v)), _) => Ok(*v),
            (None, AttrDefault::Float(v)) => Ok(v),
            _ => Err(self.absent(name)),
        }
    }

    pub fn string(&self, name: &str) -> Result<String> {
        match self.get(name)? {
            (Some(Attribute::String(v)), _) => Ok(v.clone()),
            (None, AttrDefault::Str(v)) => Ok(v.to_string()),
            _ => Err(self.absent(name)),
        }
    }

    /// Integer list, or `None` when absent without a default.
    pub fn opt_ints(&self, name: &str) -> Result<Option<Vec<i64>>> {
        match self.get(name)? {
            (Some(Attribute::Ints(v)), _) => Ok(Some(v.clone())),
            (None, AttrDefault::Ints(v)) => Ok(Some(v.to_vec())),
            (None, AttrDefault::Optional) => Ok(None),
            _ => Err(self.absent(name)),
        }
    }

    /// Integer list; absent optional lists read as empty.
    pub fn ints(&self, name: &str) -> Result<Vec<i64>> {
        Ok(self.opt_ints(name)?.unwrap_or_default())
    }

    /// Float list; absent optional lists read as empty.
    pub fn floats(&self, name: &str) -> Result<Vec<f32>> {
        match self.get(name)? {
            (Some(Attribute::Floats(v)), _) => Ok(v.clone()),
            (None, AttrDefault::Floats(v)) => Ok(v.to_vec()),
            (None, AttrDefault::Optional) => Ok(Vec::new()),
            _ => Err(self.absent(name)),
        }
    }

    /// String list; absent optional lists read as empty.
    pub fn strings(&self, name: &str) -> Result<Vec<String>> {
        match self.get(name)? {
            (Some(Attribute::Strings(v)), _) => Ok(v.clone()),
            (None, AttrDefault::Strings(v)) => Ok(v.iter().map(|s| s.to_string()).collect()),
            (None, AttrDefault::Optional) => Ok(Vec::new()),
            _ => Err(self.absent(name)),
        }
    }

    pub fn tensor(&self, name: &str) -> Result<Option<Tensor>> {
        match self.get(name)? {
            (Some(Attribute::Tensor(t)), _) => Ok(Some(t.clone())),
            (None, AttrDefault::Optional) => Ok(None),
            _ => Err(self.absent(name)),
        }
    }

    pub fn graph(&self, name: &str) -> Result<Arc<Graph>> {
        match self.get(name)? {
            (Some(Attribute::Graph(g)), _) => Ok(Arc::clone(g)),
            _ => Err(self.absent(name)),
        }
    }

    /// An integer used as a boolean flag; only 0 and 1 are accepted.
    pub fn flag(&self, name: &str) -> Result<bool> {
        match self.int(name)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.error(format!("attribute '{}' must be 0 or 1, got {}", name, other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &[AttributeSpec] = &[
        AttributeSpec::int("axis", -1),
        AttributeSpec::float("alpha", 1.0),
        AttributeSpec::optional("axes", AttributeKind::Ints),
        AttributeSpec::required("coefficients", AttributeKind::Floats),
        AttributeSpec::string("mode", "NONE"),
        AttributeSpec::int("keepdims", 1),
    ];

    fn node() -> Node {
        Node::new("Op", ["x"], ["y"])
            .with_name("op")
            .with_attr("coefficients", Attribute::Floats(vec![1.0, 2.0]))
    }

    #[test]
    fn test_defaults_and_values() {
        let n = node().with_attr("alpha", Attribute::Float(0.5));
        let r = AttrReader::new(&n, SCHEMA).unwrap();
        assert_eq!(r.int("axis").unwrap(), -1);
        assert_eq!(r.float("alpha").unwrap(), 0.5);
        assert_eq!(r.opt_ints("axes").unwrap(), None);
        assert!(r.ints("axes").unwrap().is_empty());
        assert_eq!(r.floats("coefficients").unwrap(), vec![1.0, 2.0]);
        assert_eq!(r.string("mode").unwrap(), "NONE");
        assert!(r.flag("keepdims").unwrap());
        assert!(!r.has("axis"));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let n = node().with_attr("axis", Attribute::Float(1.0));
        let r = AttrReader::new(&n, SCHEMA);
        assert!(matches!(r, Err(KernelError::Attribute { node, .. }) if node == "op"));
    }

    #[test]
    fn test_missing_required() {
        let n = Node::new("Op", ["x"], ["y"]);
        let err = AttrReader::new(&n, SCHEMA).unwrap_err();
        assert!(err.to_string().contains("coefficients"));
    }

    #[test]
    fn test_unknown_attribute_ignored() {
        let n = node().with_attr("colour", Attribute::String("red".into()));
        let r = AttrReader::new(&n, SCHEMA).unwrap();
        assert!(r.int("colour").is_err());
    }

    #[test]
    fn test_bad_flag() {
        let n = node().with_attr("keepdims", Attribute::Int(2));
        let r = AttrReader::new(&n, SCHEMA).unwrap();
        assert!(r.flag("keepdims").is_err());
    }
}
