//! Shapes whose extents may be symbolic or unknown.

use std::fmt;

use crate::dim::{Bindings, DimEvaluator, Dimension};
use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::tensor::Tensor;

/// A shape made of [`Dimension`]s, or the unknown-shape sentinel when the rank
/// itself is not known.
///
/// The optional name only serves debugging: derived shapes carry their
/// source's name with a suffix (`-RD` for reduce, `-SZ` squeeze, `-TR`
/// transpose, `-EV` evaluate).
#[derive(Debug, Clone)]
pub struct ShapeObject {
    dims: Option<Vec<Dimension>>,
    dtype: Option<DType>,
    name: Option<String>,
}

impl ShapeObject {
    pub fn new(dims: Vec<Dimension>, dtype: Option<DType>) -> Self {
        ShapeObject {
            dims: Some(dims),
            dtype,
            name: None,
        }
    }

    /// The unknown-shape sentinel.
    pub fn unknown(dtype: Option<DType>) -> Self {
        ShapeObject {
            dims: None,
            dtype,
            name: None,
        }
    }

    /// The exact shape of a materialized tensor.
    pub fn of_tensor(tensor: &Tensor) -> Self {
        ShapeObject::new(
            tensor.dims().iter().map(|&d| Dimension::from(d)).collect(),
            Some(tensor.dtype()),
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_dtype(mut self, dtype: Option<DType>) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn dims(&self) -> Option<&[Dimension]> {
        self.dims.as_deref()
    }

    pub fn dtype(&self) -> Option<DType> {
        self.dtype
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_unknown(&self) -> bool {
        self.dims.is_none()
    }

    pub fn rank(&self) -> Option<usize> {
        self.dims.as_ref().map(Vec::len)
    }

    /// Dimension at `index`. Reads past the rank return `1`; an unknown shape
    /// returns `None`.
    pub fn get(&self, index: usize) -> Option<Dimension> {
        let dims = self.dims.as_ref()?;
        Some(dims.get(index).cloned().unwrap_or(Dimension::Known(1)))
    }

    /// Overwrite the dimension at `index`, padding with `1`s as needed.
    /// No effect on an unknown shape.
    pub fn set(&mut self, index: usize, dim: Dimension) {
        if let Some(dims) = self.dims.as_mut() {
            while dims.len() <= index {
                dims.push(Dimension::Known(1));
            }
            dims[index] = dim;
        }
    }

    fn derived(&self, dims: Option<Vec<Dimension>>, suffix: &str) -> ShapeObject {
        ShapeObject {
            dims,
            dtype: self.dtype,
            name: self.name.as_ref().map(|n| format!("{}-{}", n, suffix)),
        }
    }

    fn check_axis(&self, axis: usize, ndim: usize) -> Result<()> {
        if axis >= ndim {
            return Err(TensorError::InvalidAxis {
                axis: axis as i64,
                ndim,
            });
        }
        Ok(())
    }

    /// Remove `axis`, or replace it by `1` when `keep_dims`.
    pub fn reduce(&self, axis: usize, keep_dims: bool) -> Result<ShapeObject> {
        let Some(dims) = &self.dims else {
            return Ok(self.derived(None, "RD"));
        };
        self.check_axis(axis, dims.len())?;
        let mut out = dims.clone();
        if keep_dims {
            out[axis] = Dimension::Known(1);
        } else {
            out.remove(axis);
        }
        Ok(self.derived(Some(out), "RD"))
    }

    /// Remove the given axes.
    pub fn drop_axis(&self, axes: &[usize]) -> Result<ShapeObject> {
        let Some(dims) = &self.dims else {
            return Ok(self.derived(None, "SZ"));
        };
        let mut sorted = axes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let mut out = dims.clone();
        for &axis in sorted.iter().rev() {
            self.check_axis(axis, dims.len())?;
            out.remove(axis);
        }
        Ok(self.derived(Some(out), "SZ"))
    }

    /// Remove the given axes, which are expected to have extent 1.
    pub fn squeeze(&self, axes: &[usize]) -> Result<ShapeObject> {
        self.drop_axis(axes)
    }

    /// Insert `dim` before position `axis`.
    pub fn insert_axis(&self, axis: usize, dim: Dimension) -> Result<ShapeObject> {
        let Some(dims) = &self.dims else {
            return Ok(self.derived(None, "SZ"));
        };
        self.check_axis(axis, dims.len() + 1)?;
        let mut out = dims.clone();
        out.insert(axis, dim);
        Ok(self.derived(Some(out), "SZ"))
    }

    /// Permute dimensions; a permutation entry past the rank yields an
    /// unknown dimension.
    pub fn transpose(&self, perm: &[usize]) -> ShapeObject {
        let Some(dims) = &self.dims else {
            return self.derived(None, "TR");
        };
        let out = perm
            .iter()
            .map(|&p| dims.get(p).cloned().unwrap_or(Dimension::Unknown))
            .collect();
        self.derived(Some(out), "TR")
    }

    /// Product of all dimensions as a lazy expression; `1` for a scalar.
    pub fn product(&self) -> Option<Dimension> {
        let dims = self.dims.as_ref()?;
        let mut iter = dims.iter();
        let first = iter.next().cloned().unwrap_or(Dimension::Known(1));
        Some(iter.fold(first, |acc, d| acc.mul(d)))
    }

    /// Numpy broadcasting over symbolic shapes.
    ///
    /// Known extents follow the usual rules; a `1` yields to its partner; two
    /// differing symbolic extents combine into `max(a, b)`. The result is
    /// unknown if either side is.
    pub fn broadcast(a: &ShapeObject, b: &ShapeObject) -> Result<ShapeObject> {
        let dtype = a.dtype.or(b.dtype);
        let (Some(da), Some(db)) = (&a.dims, &b.dims) else {
            return Ok(ShapeObject::unknown(dtype));
        };
        let rank = da.len().max(db.len());
        let mut out = Vec::with_capacity(rank);
        for i in 0..rank {
            let x = if i < da.len() { &da[da.len() - 1 - i] } else { &Dimension::Known(1) };
            let y = if i < db.len() { &db[db.len() - 1 - i] } else { &Dimension::Known(1) };
            let d = match (x, y) {
                _ if x == y && !x.is_unknown() => x.clone(),
                (Dimension::Known(1), _) => y.clone(),
                (_, Dimension::Known(1)) => x.clone(),
                (Dimension::Known(_), Dimension::Known(_)) => {
                    return Err(TensorError::Other(format!(
                        "cannot broadcast shapes {} and {}",
                        a, b
                    )))
                }
                _ => x.max(y),
            };
            out.push(d);
        }
        out.reverse();
        Ok(ShapeObject::new(out, dtype))
    }

    /// Evaluate every dimension within one evaluation session.
    pub fn evaluate<'a>(&'a self, ev: &mut DimEvaluator<'a>) -> Result<ShapeObject> {
        let dims = match &self.dims {
            Some(dims) => Some(
                dims.iter()
                    .map(|d| d.evaluate(ev))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };
        Ok(self.derived(dims, "EV"))
    }

    /// Concrete extents once every dimension evaluates to a number under
    /// `bindings`.
    pub fn resolve(&self, bindings: &Bindings) -> Option<Vec<usize>> {
        let mut ev = DimEvaluator::new(bindings.clone());
        let evaluated = self.evaluate(&mut ev).ok()?;
        evaluated
            .dims?
            .iter()
            .map(|d| d.as_known().and_then(|n| usize::try_from(n).ok()))
            .collect()
    }

    /// Shape ordering: higher rank is greater, then the first differing
    /// dimension decides. An unknown shape is greater than any known one.
    pub fn greater_than(&self, other: &ShapeObject) -> Result<bool> {
        let (a, b) = match (&self.dims, &other.dims) {
            (None, None) => return Ok(false),
            (None, Some(_)) => return Ok(true),
            (Some(_), None) => return Ok(false),
            (Some(a), Some(b)) => (a, b),
        };
        if a.len() != b.len() {
            return Ok(a.len() > b.len());
        }
        for (x, y) in a.iter().zip(b) {
            if x.greater_than(y)? {
                return Ok(true);
            }
            if y.greater_than(x)? {
                return Ok(false);
            }
        }
        Ok(false)
    }

    /// Render as `(N, 2)`; unknown dimensions as `x` (`use_x`) or `?`.
    pub fn render(&self, use_x: bool) -> String {
        match &self.dims {
            None => "?".to_string(),
            Some(dims) => format!(
                "({})",
                dims.iter()
                    .map(|d| d.render(use_x))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

impl PartialEq for ShapeObject {
    fn eq(&self, other: &Self) -> bool {
        let empty = Bindings::new();
        match (&self.dims, &other.dims) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y || x.equivalent(y, &empty))
            }
            _ => false,
        }
    }
}

impl fmt::Display for ShapeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(false))
    }
}
