//! Scan (opset 9 and later).
//!
//! Node inputs are `N` loop states followed by `M` scanned tensors; node
//! outputs are the `N` final states followed by `K` stacked per-iteration
//! outputs. The `body` graph has the same arity on both sides and is run by
//! the executor once per iteration.

use sg_onnx::{AttributeKind, LoadError, Node};
use sg_tensor::{normalize_axis, ShapeObject, Tensor, Value};
use tracing::trace;

use crate::attrs::{AttrReader, AttributeSpec};
use crate::error::{KernelError, Result};
use crate::kernel::{check_arity, Kernel, KernelContext};

const SCHEMA: &[AttributeSpec] = &[
    AttributeSpec::required("body", AttributeKind::Graph),
    AttributeSpec::required("num_scan_inputs", AttributeKind::Int),
    AttributeSpec::optional("scan_input_axes", AttributeKind::Ints),
    AttributeSpec::optional("scan_input_directions", AttributeKind::Ints),
    AttributeSpec::optional("scan_output_axes", AttributeKind::Ints),
    AttributeSpec::optional("scan_output_directions", AttributeKind::Ints),
];

#[derive(Debug)]
pub struct Scan {
    num_states: usize,
    input_axes: Vec<i64>,
    input_reversed: Vec<bool>,
    output_axes: Vec<i64>,
    output_reversed: Vec<bool>,
}

impl Scan {
    pub fn new(node: &Node) -> Result<Self> {
        let attrs = AttrReader::new(node, SCHEMA)?;
        let body = attrs.graph("body")?;

        if body.inputs().len() != node.inputs.len() {
            return Err(LoadError::Structure(format!(
                "Scan node '{}' has {} inputs but its body declares {}",
                node.name,
                node.inputs.len(),
                body.inputs().len()
            ))
            .into());
        }
        if body.outputs().len() != node.outputs.len() {
            return Err(LoadError::Structure(format!(
                "Scan node '{}' has {} outputs but its body declares {}",
                node.name,
                node.outputs.len(),
                body.outputs().len()
            ))
            .into());
        }

        let num_scan_inputs = attrs.int("num_scan_inputs")?;
        let num_scan_inputs = usize::try_from(num_scan_inputs)
            .ok()
            .filter(|&m| m >= 1 && m <= node.inputs.len())
            .ok_or_else(|| {
                attrs.error(format!(
                    "num_scan_inputs {} does not fit {} inputs",
                    num_scan_inputs,
                    node.inputs.len()
                ))
            })?;
        let num_states = node.inputs.len() - num_scan_inputs;
        if num_states > node.outputs.len() {
            return Err(attrs.error(format!(
                "{} loop states but only {} outputs",
                num_states,
                node.outputs.len()
            )));
        }
        let num_scan_outputs = node.outputs.len() - num_states;

        let per_slot = |name: &str, count: usize| -> Result<Vec<i64>> {
            let values = attrs.ints(name)?;
            match values.len() {
                0 => Ok(vec![0; count]),
                n if n == count => Ok(values),
                n => Err(attrs.error(format!("{} has {} entries, expected {}", name, n, count))),
            }
        };
        let directions = |name: &str, count: usize| -> Result<Vec<bool>> {
            per_slot(name, count)?
                .into_iter()
                .map(|d| match d {
                    0 => Ok(false),
                    1 => Ok(true),
                    other => Err(attrs.error(format!("{} entry must be 0 or 1, got {}", name, other))),
                })
                .collect()
        };

        Ok(Scan {
            input_axes: per_slot("scan_input_axes", num_scan_inputs)?,
            input_reversed: directions("scan_input_directions", num_scan_inputs)?,
            output_axes: per_slot("scan_output_axes", num_scan_outputs)?,
            output_reversed: directions("scan_output_directions", num_scan_outputs)?,
            num_states,
        })
    }

    /// Slices of every scanned input, in iteration order.
    fn slices(&self, scanned: &[&Value]) -> Result<(usize, Vec<Vec<Tensor>>)> {
        let mut length = None;
        let mut all = Vec::with_capacity(scanned.len());
        for (i, value) in scanned.iter().enumerate() {
            let tensor = value.as_tensor()?;
            let axis = normalize_axis(self.input_axes[i], tensor.shape().ndim(), 0)?;
            let extent = tensor.dims()[axis];
            match length {
                None => length = Some(extent),
                Some(n) if n != extent => {
                    return Err(KernelError::ShapeMismatch(format!(
                        "Scan inputs disagree on sequence length: {} and {}",
                        n, extent
                    )))
                }
                Some(_) => {}
            }
            let mut slices = (0..extent)
                .map(|k| tensor.select(axis, k))
                .collect::<sg_tensor::Result<Vec<_>>>()?;
            if self.input_reversed[i] {
                slices.reverse();
            }
            all.push(slices);
        }
        Ok((length.unwrap_or(0), all))
    }
}

impl Kernel for Scan {
    fn op_type(&self) -> &str {
        "Scan"
    }

    fn compute(&self, inputs: &[&Value], ctx: &KernelContext) -> Result<Vec<Value>> {
        let arity = self.num_states + self.input_axes.len();
        check_arity("Scan", inputs, arity, arity)?;
        let (length, slices) = self.slices(&inputs[self.num_states..])?;
        if length == 0 {
            return Err(KernelError::InvalidInput(
                "Scan over a sequence of length 0".to_string(),
            ));
        }

        let mut states: Vec<Value> = inputs[..self.num_states].iter().map(|v| (*v).clone()).collect();
        let mut collected: Vec<Vec<Tensor>> = vec![Vec::with_capacity(length); self.output_axes.len()];
        for step in 0..length {
            trace!(step, length, "scan iteration");
            let mut body_inputs = states;
            body_inputs.extend(slices.iter().map(|s| Value::Tensor(s[step].clone())));
            let mut outputs = ctx.run_subgraph("body", body_inputs)?;
            if outputs.len() != self.num_states + collected.len() {
                return Err(KernelError::InvalidInput(format!(
                    "Scan body returned {} values, expected {}",
                    outputs.len(),
                    self.num_states + collected.len()
                )));
            }
            let per_step = outputs.split_off(self.num_states);
            states = outputs;
            for (bucket, value) in collected.iter_mut().zip(per_step) {
                bucket.push(value.into_tensor()?);
            }
        }

        let mut results = states;
        for (k, mut parts) in collected.into_iter().enumerate() {
            if self.output_reversed[k] {
                parts.reverse();
            }
            let ndim = parts.first().map_or(0, |t| t.shape().ndim());
            let axis = normalize_axis(self.output_axes[k], ndim, 1)?;
            results.push(Tensor::stack(&parts, axis)?.into());
        }
        Ok(results)
    }

    fn infer_shapes(&self, inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        let mut out: Vec<ShapeObject> = inputs.iter().take(self.num_states).cloned().collect();
        if out.len() < self.num_states {
            return None;
        }
        out.extend((0..self.output_axes.len()).map(|_| ShapeObject::unknown(None)));
        Some(out)
    }
}
