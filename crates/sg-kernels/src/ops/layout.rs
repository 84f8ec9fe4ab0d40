//! Kernels that move or reinterpret data without arithmetic.

use sg_onnx::proto::tensor::widened_dtype;
use sg_onnx::{AttributeKind, Node};
use sg_tensor::{normalize_axis, DType, Dimension, Shape, ShapeObject, Tensor, Value};

use crate::attrs::{AttrReader, AttributeSpec};
use crate::error::{KernelError, Result};
use crate::kernel::{check_arity, int_list, tensor_at, Kernel, KernelContext};

#[derive(Debug)]
pub struct Identity;

impl Identity {
    pub fn new(node: &Node) -> Result<Self> {
        const SCHEMA: &[AttributeSpec] = &[];
        AttrReader::new(node, SCHEMA)?;
        Ok(Identity)
    }
}

impl Kernel for Identity {
    fn op_type(&self) -> &str {
        "Identity"
    }

    fn compute(&self, inputs: &[&Value], _ctx: &KernelContext) -> Result<Vec<Value>> {
        check_arity("Identity", inputs, 1, 1)?;
        Ok(vec![inputs[0].clone()])
    }

    fn infer_shapes(&self, inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        Some(vec![inputs.first()?.clone()])
    }

    fn inplace_input(&self) -> Option<usize> {
        Some(0)
    }

    fn compute_inplace(
        &self,
        owned: Value,
        others: &[&Value],
        _ctx: &KernelContext,
    ) -> Result<(Vec<Value>, bool)> {
        if !others.is_empty() {
            return Err(KernelError::InvalidInput(
                "Identity expects 1 input".to_string(),
            ));
        }
        Ok((vec![owned], true))
    }
}

#[derive(Debug)]
pub struct Cast {
    to: DType,
}

impl Cast {
    pub fn new(node: &Node) -> Result<Self> {
        const SCHEMA: &[AttributeSpec] = &[AttributeSpec::required("to", AttributeKind::Int)];
        let attrs = AttrReader::new(node, SCHEMA)?;
        let id = attrs.int("to")?;
        let to = i32::try_from(id)
            .ok()
            .and_then(|id| widened_dtype(id).ok().flatten())
            .ok_or_else(|| attrs.error(format!("unsupported target type {}", id)))?;
        Ok(Cast { to })
    }
}

impl Kernel for Cast {
    fn op_type(&self) -> &str {
        "Cast"
    }

    fn compute(&self, inputs: &[&Value], _ctx: &KernelContext) -> Result<Vec<Value>> {
        check_arity("Cast", inputs, 1, 1)?;
        Ok(vec![tensor_at(inputs, 0)?.cast(self.to)?.into()])
    }

    fn infer_shapes(&self, inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        Some(vec![inputs.first()?.clone().with_dtype(Some(self.to))])
    }

    fn inplace_input(&self) -> Option<usize> {
        Some(0)
    }

    fn compute_inplace(
        &self,
        owned: Value,
        others: &[&Value],
        ctx: &KernelContext,
    ) -> Result<(Vec<Value>, bool)> {
        if owned.dtype() == Some(self.to) && others.is_empty() {
            return Ok((vec![owned], true));
        }
        let mut inputs = vec![&owned];
        inputs.extend_from_slice(others);
        Ok((self.compute(&inputs, ctx)?, false))
    }
}

/// Transpose; without `perm` the axes are reversed.
#[derive(Debug)]
pub struct Transpose {
    perm: Option<Vec<i64>>,
}

impl Transpose {
    pub fn new(node: &Node) -> Result<Self> {
        const SCHEMA: &[AttributeSpec] = &[AttributeSpec::optional("perm", AttributeKind::Ints)];
        let attrs = AttrReader::new(node, SCHEMA)?;
        let perm = attrs.opt_ints("perm")?;
        if let Some(perm) = &perm {
            let mut sorted = perm.clone();
            sorted.sort_unstable();
            if sorted.iter().enumerate().any(|(i, &p)| p != i as i64) {
                return Err(attrs.error(format!("perm {:?} is not a permutation", perm)));
            }
        }
        Ok(Transpose { perm })
    }

    fn perm(&self, ndim: usize) -> Vec<usize> {
        match &self.perm {
            Some(p) => p.iter().map(|&a| a as usize).collect(),
            None => (0..ndim).rev().collect(),
        }
    }
}

impl Kernel for Transpose {
    fn op_type(&self) -> &str {
        "Transpose"
    }

    fn compute(&self, inputs: &[&Value], _ctx: &KernelContext) -> Result<Vec<Value>> {
        check_arity("Transpose", inputs, 1, 1)?;
        let x = tensor_at(inputs, 0)?;
        let perm = self.perm(x.shape().ndim());
        if perm.len() != x.shape().ndim() {
            return Err(KernelError::ShapeMismatch(format!(
                "perm {:?} does not match input {}",
                perm,
                x.shape()
            )));
        }
        Ok(vec![x.transpose(&perm)?.into()])
    }

    fn infer_shapes(&self, inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        let x = inputs.first()?;
        let perm = self.perm(x.rank()?);
        if perm.len() != x.rank()? {
            return None;
        }
        Some(vec![x.transpose(&perm)])
    }
}

/// Resolve a Reshape target: `0` copies the input extent (unless
/// `allow_zero`), a single `-1` takes whatever is left.
fn reshape_target(input: &Shape, spec: &[i64], allow_zero: bool) -> Result<Shape> {
    let mut dims = Vec::with_capacity(spec.len());
    let mut infer_at = None;
    for (i, &d) in spec.iter().enumerate() {
        match d {
            -1 if infer_at.is_none() => {
                infer_at = Some(i);
                dims.push(1);
            }
            -1 => {
                return Err(KernelError::ShapeMismatch(
                    "Reshape target has more than one -1".to_string(),
                ))
            }
            0 if !allow_zero => {
                if i >= input.ndim() {
                    return Err(KernelError::ShapeMismatch(format!(
                        "Reshape copies axis {} of {}, which does not exist",
                        i, input
                    )));
                }
                dims.push(input.dim(i));
            }
            d if d >= 0 => dims.push(d as usize),
            d => {
                return Err(KernelError::ShapeMismatch(format!(
                    "invalid Reshape extent {}",
                    d
                )))
            }
        }
    }
    if let Some(at) = infer_at {
        let known: usize = dims.iter().product();
        if known == 0 || input.numel() % known != 0 {
            return Err(KernelError::ShapeMismatch(format!(
                "cannot reshape {} to {:?}",
                input, spec
            )));
        }
        dims[at] = input.numel() / known;
    }
    let target = Shape::new(dims);
    if target.numel() != input.numel() {
        return Err(KernelError::ShapeMismatch(format!(
            "cannot reshape {} to {}",
            input, target
        )));
    }
    Ok(target)
}

#[derive(Debug)]
pub struct Reshape {
    allow_zero: bool,
}

impl Reshape {
    pub fn new(node: &Node) -> Result<Self> {
        const SCHEMA: &[AttributeSpec] = &[AttributeSpec::int("allowzero", 0)];
        let attrs = AttrReader::new(node, SCHEMA)?;
        Ok(Reshape {
            allow_zero: attrs.flag("allowzero")?,
        })
    }
}

impl Kernel for Reshape {
    fn op_type(&self) -> &str {
        "Reshape"
    }

    fn compute(&self, inputs: &[&Value], _ctx: &KernelContext) -> Result<Vec<Value>> {
        check_arity("Reshape", inputs, 2, 2)?;
        let x = tensor_at(inputs, 0)?;
        let spec = int_list(tensor_at(inputs, 1)?)?;
        let target = reshape_target(x.shape(), &spec, self.allow_zero)?;
        Ok(vec![x.reshape(target)?.into()])
    }

    fn inplace_input(&self) -> Option<usize> {
        Some(0)
    }

    fn compute_inplace(
        &self,
        owned: Value,
        others: &[&Value],
        _ctx: &KernelContext,
    ) -> Result<(Vec<Value>, bool)> {
        let [shape] = others else {
            return Err(KernelError::InvalidInput(
                "Reshape expects 2 inputs".to_string(),
            ));
        };
        let x = owned.into_tensor()?;
        let spec = int_list(shape.as_tensor()?)?;
        let target = reshape_target(x.shape(), &spec, self.allow_zero)?;
        Ok((vec![x.into_reshaped(target)?.into()], true))
    }
}

#[derive(Debug)]
enum Axes {
    Attribute(Option<Vec<i64>>),
    Input,
}

impl Axes {
    fn resolve(&self, inputs: &[&Value]) -> Result<Option<Vec<i64>>> {
        match self {
            Axes::Attribute(axes) => Ok(axes.clone()),
            Axes::Input => match inputs.get(1) {
                Some(v) => Ok(Some(int_list(v.as_tensor()?)?)),
                None => Ok(None),
            },
        }
    }

    fn max_inputs(&self) -> usize {
        match self {
            Axes::Attribute(_) => 1,
            Axes::Input => 2,
        }
    }
}

fn normalized(axes: &[i64], ndim: usize) -> Result<Vec<usize>> {
    let mut out = axes
        .iter()
        .map(|&a| normalize_axis(a, ndim, 0))
        .collect::<sg_tensor::Result<Vec<_>>>()?;
    out.sort_unstable();
    let before = out.len();
    out.dedup();
    if out.len() != before {
        return Err(KernelError::InvalidInput(format!("repeated axis in {:?}", axes)));
    }
    Ok(out)
}

/// Squeeze; without axes every extent-1 axis is removed.
#[derive(Debug)]
pub struct Squeeze {
    axes: Axes,
}

impl Squeeze {
    pub fn v1(node: &Node) -> Result<Self> {
        const SCHEMA: &[AttributeSpec] = &[AttributeSpec::optional("axes", AttributeKind::Ints)];
        let attrs = AttrReader::new(node, SCHEMA)?;
        Ok(Squeeze {
            axes: Axes::Attribute(attrs.opt_ints("axes")?),
        })
    }

    pub fn v13(node: &Node) -> Result<Self> {
        const SCHEMA: &[AttributeSpec] = &[];
        AttrReader::new(node, SCHEMA)?;
        Ok(Squeeze { axes: Axes::Input })
    }
}

impl Kernel for Squeeze {
    fn op_type(&self) -> &str {
        "Squeeze"
    }

    fn compute(&self, inputs: &[&Value], _ctx: &KernelContext) -> Result<Vec<Value>> {
        check_arity("Squeeze", inputs, 1, self.axes.max_inputs())?;
        let x = tensor_at(inputs, 0)?;
        let dims = x.dims();
        let axes = match self.axes.resolve(inputs)? {
            Some(axes) => {
                let axes = normalized(&axes, dims.len())?;
                if let Some(&bad) = axes.iter().find(|&&a| dims[a] != 1) {
                    return Err(KernelError::ShapeMismatch(format!(
                        "cannot squeeze axis {} of {}",
                        bad,
                        x.shape()
                    )));
                }
                axes
            }
            None => (0..dims.len()).filter(|&a| dims[a] == 1).collect(),
        };
        let kept: Vec<usize> = (0..dims.len())
            .filter(|a| !axes.contains(a))
            .map(|a| dims[a])
            .collect();
        Ok(vec![x.reshape(Shape::new(kept))?.into()])
    }

    fn infer_shapes(&self, inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        let x = inputs.first()?;
        let dims = x.dims()?;
        let axes = match &self.axes {
            Axes::Attribute(Some(axes)) => normalized(axes, dims.len()).ok()?,
            Axes::Attribute(None) | Axes::Input if inputs.len() == 1 => {
                // Only decidable when every extent is known.
                let mut axes = Vec::new();
                for (i, d) in dims.iter().enumerate() {
                    match d.as_known() {
                        Some(1) => axes.push(i),
                        Some(_) => {}
                        None => return None,
                    }
                }
                axes
            }
            Axes::Attribute(None) | Axes::Input => return None,
        };
        Some(vec![x.squeeze(&axes).ok()?])
    }
}

/// Unsqueeze; axes index the output shape.
#[derive(Debug)]
pub struct Unsqueeze {
    axes: Axes,
}

impl Unsqueeze {
    pub fn v1(node: &Node) -> Result<Self> {
        const SCHEMA: &[AttributeSpec] = &[AttributeSpec::required("axes", AttributeKind::Ints)];
        let attrs = AttrReader::new(node, SCHEMA)?;
        Ok(Unsqueeze {
            axes: Axes::Attribute(Some(attrs.ints("axes")?)),
        })
    }

    pub fn v13(node: &Node) -> Result<Self> {
        const SCHEMA: &[AttributeSpec] = &[];
        AttrReader::new(node, SCHEMA)?;
        Ok(Unsqueeze { axes: Axes::Input })
    }
}

impl Kernel for Unsqueeze {
    fn op_type(&self) -> &str {
        "Unsqueeze"
    }

    fn compute(&self, inputs: &[&Value], _ctx: &KernelContext) -> Result<Vec<Value>> {
        let min = self.axes.max_inputs();
        check_arity("Unsqueeze", inputs, min, min)?;
        let x = tensor_at(inputs, 0)?;
        let axes = self.axes.resolve(inputs)?.unwrap_or_default();
        let out_rank = x.shape().ndim() + axes.len();
        let mut shape = x.shape().clone();
        for axis in normalized(&axes, out_rank)? {
            shape = shape.insert_axis(axis, 1);
        }
        Ok(vec![x.reshape(shape)?.into()])
    }

    fn infer_shapes(&self, inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        let Axes::Attribute(Some(axes)) = &self.axes else {
            return None;
        };
        let x = inputs.first()?;
        let mut out = x.clone();
        for axis in normalized(axes, x.rank()? + axes.len()).ok()? {
            out = out.insert_axis(axis, Dimension::Known(1)).ok()?;
        }
        Some(vec![out])
    }
}

/// Flatten to 2-D around `axis` (default 1).
#[derive(Debug)]
pub struct Flatten {
    axis: i64,
}

impl Flatten {
    pub fn new(node: &Node) -> Result<Self> {
        const SCHEMA: &[AttributeSpec] = &[AttributeSpec::int("axis", 1)];
        let attrs = AttrReader::new(node, SCHEMA)?;
        Ok(Flatten {
            axis: attrs.int("axis")?,
        })
    }
}

impl Kernel for Flatten {
    fn op_type(&self) -> &str {
        "Flatten"
    }

    fn compute(&self, inputs: &[&Value], _ctx: &KernelContext) -> Result<Vec<Value>> {
        check_arity("Flatten", inputs, 1, 1)?;
        let x = tensor_at(inputs, 0)?;
        let axis = normalize_axis(self.axis, x.shape().ndim(), 1)?;
        let rows: usize = x.dims()[..axis].iter().product();
        let cols: usize = x.dims()[axis..].iter().product();
        Ok(vec![x.reshape(Shape::new(vec![rows, cols]))?.into()])
    }

    fn infer_shapes(&self, inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        let x = inputs.first()?;
        let dims = x.dims()?;
        let axis = normalize_axis(self.axis, dims.len(), 1).ok()?;
        let product = |ds: &[Dimension]| {
            ShapeObject::new(ds.to_vec(), None)
                .product()
                .unwrap_or(Dimension::Known(1))
        };
        let rows = product(&dims[..axis]);
        let cols = product(&dims[axis..]);
        Some(vec![ShapeObject::new(vec![rows, cols], x.dtype())])
    }
}

#[derive(Debug)]
pub struct Concat {
    axis: i64,
}

impl Concat {
    pub fn new(node: &Node) -> Result<Self> {
        const SCHEMA: &[AttributeSpec] = &[AttributeSpec::required("axis", AttributeKind::Int)];
        let attrs = AttrReader::new(node, SCHEMA)?;
        Ok(Concat {
            axis: attrs.int("axis")?,
        })
    }
}

impl Kernel for Concat {
    fn op_type(&self) -> &str {
        "Concat"
    }

    fn compute(&self, inputs: &[&Value], _ctx: &KernelContext) -> Result<Vec<Value>> {
        check_arity("Concat", inputs, 1, usize::MAX)?;
        let parts = (0..inputs.len())
            .map(|i| tensor_at(inputs, i))
            .collect::<Result<Vec<&Tensor>>>()?;
        let axis = normalize_axis(self.axis, parts[0].shape().ndim(), 0)?;
        Ok(vec![Tensor::concat(&parts, axis)?.into()])
    }

    fn infer_shapes(&self, inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        let first = inputs.first()?;
        let axis = normalize_axis(self.axis, first.rank()?, 0).ok()?;
        let mut out = first.clone();
        let mut extent = first.get(axis)?;
        for other in &inputs[1..] {
            if other.rank()? != first.rank()? {
                return None;
            }
            extent = extent.add(&other.get(axis)?);
        }
        out.set(axis, extent);
        Some(vec![out])
    }
}
