//! Symbolic dimension algebra.
//!
//! A [`Dimension`] is either a known extent, a named symbol (`"N"`), an
//! unknown placeholder, or a lazy expression combining two dimensions with
//! `+`, `*` or `max`. Expressions are only reduced when [`Dimension::evaluate`]
//! is called with a [`DimEvaluator`] carrying symbol bindings.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, TensorError};

/// Symbol name to extent bindings used during evaluation.
pub type Bindings = HashMap<String, i64>;

/// Binary operators the algebra supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DimOp {
    Add,
    Mul,
    Max,
}

impl DimOp {
    fn apply(self, a: i64, b: i64) -> Option<i64> {
        match self {
            DimOp::Add => a.checked_add(b),
            DimOp::Mul => a.checked_mul(b),
            DimOp::Max => Some(a.max(b)),
        }
    }

    fn render(self, a: &str, b: &str) -> String {
        match self {
            DimOp::Add => format!("({})+({})", a, b),
            DimOp::Mul => format!("({})*({})", a, b),
            DimOp::Max => format!("max({},{})", a, b),
        }
    }
}

/// One axis extent of a shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dimension {
    Known(i64),
    Symbol(String),
    Unknown,
    Expr(DimOp, Box<Dimension>, Box<Dimension>),
}

impl Dimension {
    /// A named symbolic dimension. `"?"` and the empty string mean unknown.
    pub fn symbol(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.is_empty() || name == "?" {
            Dimension::Unknown
        } else {
            Dimension::Symbol(name)
        }
    }

    /// Lazy `self + other`.
    pub fn add(&self, other: &Dimension) -> Dimension {
        Dimension::Expr(DimOp::Add, Box::new(self.clone()), Box::new(other.clone()))
    }

    /// Lazy `self * other`.
    pub fn mul(&self, other: &Dimension) -> Dimension {
        Dimension::Expr(DimOp::Mul, Box::new(self.clone()), Box::new(other.clone()))
    }

    /// Lazy `max(self, other)`.
    pub fn max(&self, other: &Dimension) -> Dimension {
        Dimension::Expr(DimOp::Max, Box::new(self.clone()), Box::new(other.clone()))
    }

    pub fn as_known(&self) -> Option<i64> {
        match self {
            Dimension::Known(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Dimension::Unknown)
    }

    /// Reduce the dimension to a `Known` extent or a display `Symbol`.
    ///
    /// Symbols are looked up in the evaluator's bindings. Unknown placeholders
    /// receive a generated symbol that stays the same for this dimension for
    /// the lifetime of `ev`. A clone is a different placeholder and gets its
    /// own name.
    pub fn evaluate<'a>(&'a self, ev: &mut DimEvaluator<'a>) -> Result<Dimension> {
        match self {
            Dimension::Known(n) => Ok(Dimension::Known(*n)),
            Dimension::Symbol(name) => Ok(match ev.bindings.get(name) {
                Some(&v) => Dimension::Known(v),
                None => Dimension::Symbol(name.clone()),
            }),
            Dimension::Unknown => Ok(Dimension::Symbol(ev.generated_name(self))),
            Dimension::Expr(op, a, b) => {
                let a = a.evaluate(ev)?;
                let b = b.evaluate(ev)?;
                match (&a, &b) {
                    (Dimension::Known(x), Dimension::Known(y)) => op
                        .apply(*x, *y)
                        .map(Dimension::Known)
                        .ok_or_else(|| TensorError::DimensionOverflow(self.to_string())),
                    _ => Ok(Dimension::Symbol(op.render(&a.to_string(), &b.to_string()))),
                }
            }
        }
    }

    /// Strict ordering between two dimensions.
    ///
    /// Unknown placeholders are never greater than anything and nothing is
    /// greater than them. A symbol is considered greater than a known extent.
    /// Remaining cases are decided by evaluating both sides without bindings.
    ///
    /// # Errors
    /// Fails when both sides stay symbolic and differ.
    pub fn greater_than(&self, other: &Dimension) -> Result<bool> {
        match (self, other) {
            (Dimension::Known(a), Dimension::Known(b)) => Ok(a > b),
            (Dimension::Unknown, _) | (_, Dimension::Unknown) => Ok(false),
            (Dimension::Known(_), Dimension::Symbol(_)) => Ok(false),
            (Dimension::Symbol(_), Dimension::Known(_)) => Ok(true),
            _ => {
                if self == other {
                    return Ok(false);
                }
                let mut ev = DimEvaluator::default();
                let a = self.evaluate(&mut ev)?;
                let b = other.evaluate(&mut ev)?;
                match (&a, &b) {
                    _ if a == b => Ok(false),
                    (Dimension::Known(x), Dimension::Known(y)) => Ok(x > y),
                    _ => Err(TensorError::DimensionCompare {
                        left: a.to_string(),
                        right: b.to_string(),
                    }),
                }
            }
        }
    }

    /// Whether both dimensions denote the same extent under `bindings`.
    ///
    /// Two unknown placeholders are equivalent; an unknown is never
    /// equivalent to anything else. Unresolved symbols are equivalent only
    /// when they evaluate to the same expression.
    pub fn equivalent(&self, other: &Dimension, bindings: &Bindings) -> bool {
        match (self, other) {
            (Dimension::Unknown, Dimension::Unknown) => true,
            (Dimension::Unknown, _) | (_, Dimension::Unknown) => false,
            (Dimension::Known(a), Dimension::Known(b)) => a == b,
            _ => {
                let mut ev = DimEvaluator::new(bindings.clone());
                match (self.evaluate(&mut ev), other.evaluate(&mut ev)) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => false,
                }
            }
        }
    }

    /// Render with unknown placeholders shown as `x` (`use_x`) or `?`.
    pub fn render(&self, use_x: bool) -> String {
        match self {
            Dimension::Known(n) => n.to_string(),
            Dimension::Symbol(s) => s.clone(),
            Dimension::Unknown => if use_x { "x" } else { "?" }.to_string(),
            Dimension::Expr(op, a, b) => {
                if let (Some(x), Some(y)) = (a.as_known(), b.as_known()) {
                    if let Some(v) = op.apply(x, y) {
                        return v.to_string();
                    }
                }
                let a = a.render(use_x);
                let b = b.render(use_x);
                match op {
                    DimOp::Add => format!("{}+{}", a, b),
                    DimOp::Mul => format!("{}*{}", a, b),
                    DimOp::Max => format!("max({},{})", a, b),
                }
            }
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(false))
    }
}

impl From<i64> for Dimension {
    fn from(n: i64) -> Self {
        Dimension::Known(n)
    }
}

impl From<usize> for Dimension {
    fn from(n: usize) -> Self {
        Dimension::Known(n as i64)
    }
}

impl From<&str> for Dimension {
    fn from(s: &str) -> Self {
        Dimension::symbol(s)
    }
}

impl From<String> for Dimension {
    fn from(s: String) -> Self {
        Dimension::symbol(s)
    }
}

/// One evaluation session: symbol bindings plus the names generated for
/// unknown placeholders so far.
///
/// The session borrows every placeholder it names, so a placeholder cannot
/// be dropped and its storage reused while the session is alive.
#[derive(Debug, Default)]
pub struct DimEvaluator<'a> {
    bindings: Bindings,
    generated: Vec<(&'a Dimension, String)>,
}

impl<'a> DimEvaluator<'a> {
    pub fn new(bindings: Bindings) -> Self {
        DimEvaluator {
            bindings,
            generated: Vec::new(),
        }
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    // Names are assigned in first-visit order and keyed by placeholder
    // identity.
    fn generated_name(&mut self, dim: &'a Dimension) -> String {
        if let Some((_, name)) = self.generated.iter().find(|(d, _)| std::ptr::eq(*d, dim)) {
            return name.clone();
        }
        let name = format!("n{}", self.generated.len());
        self.generated.push((dim, name.clone()));
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind<'a>(pairs: &[(&str, i64)]) -> DimEvaluator<'a> {
        DimEvaluator::new(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    #[test]
    fn test_constructors() {
        assert_eq!(Dimension::from(3i64), Dimension::Known(3));
        assert_eq!(Dimension::from("?"), Dimension::Unknown);
        assert_eq!(Dimension::from("N"), Dimension::Symbol("N".into()));
    }

    #[test]
    fn test_add_is_lazy() {
        let n = Dimension::symbol("N");
        let sum = n.add(&Dimension::Known(2));
        assert!(matches!(sum, Dimension::Expr(DimOp::Add, _, _)));
        // operands untouched
        assert_eq!(n, Dimension::symbol("N"));
    }

    #[test]
    fn test_evaluate_distributes_over_add() {
        let a = Dimension::symbol("N").mul(&Dimension::Known(3));
        let b = Dimension::symbol("M").max(&Dimension::Known(4));
        let sum = a.add(&b);
        for (n, m) in [(1, 1), (2, 7), (5, 3), (0, 10)] {
            let mut ev = bind(&[("N", n), ("M", m)]);
            let lhs = sum.evaluate(&mut ev).unwrap().as_known().unwrap();
            let ea = a.evaluate(&mut ev).unwrap().as_known().unwrap();
            let eb = b.evaluate(&mut ev).unwrap().as_known().unwrap();
            assert_eq!(lhs, ea + eb);
        }
    }

    #[test]
    fn test_evaluate_partial_stays_symbolic() {
        let d = Dimension::symbol("N").add(&Dimension::Known(3));
        let mut ev = DimEvaluator::default();
        assert_eq!(d.evaluate(&mut ev).unwrap(), Dimension::Symbol("(N)+(3)".into()));
        let m = Dimension::symbol("N").max(&Dimension::Known(3));
        assert_eq!(m.evaluate(&mut ev).unwrap(), Dimension::Symbol("max(N,3)".into()));
    }

    #[test]
    fn test_unknown_generated_name_is_stable_in_session() {
        let d = Dimension::Unknown;
        let other = Dimension::Unknown;
        let copy = d.clone();
        let mut ev = DimEvaluator::default();
        let first = d.evaluate(&mut ev).unwrap();
        let second = d.evaluate(&mut ev).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Dimension::Symbol("n0".into()));

        assert_eq!(other.evaluate(&mut ev).unwrap(), Dimension::Symbol("n1".into()));
        assert_eq!(copy.evaluate(&mut ev).unwrap(), Dimension::Symbol("n2".into()));
        assert_eq!(d.evaluate(&mut ev).unwrap(), first);
    }

    #[test]
    fn test_generated_names_follow_visit_order() {
        let dims: Vec<Dimension> = (0..4).map(|_| Dimension::Unknown).collect();
        let mut ev = DimEvaluator::default();
        let names: Vec<Dimension> = dims.iter().map(|d| d.evaluate(&mut ev).unwrap()).collect();
        let expected: Vec<Dimension> =
            (0..4).map(|i| Dimension::Symbol(format!("n{}", i))).collect();
        assert_eq!(names, expected);

        let sum = Dimension::Unknown.add(&Dimension::Known(1));
        let mut fresh = DimEvaluator::default();
        assert_eq!(sum.evaluate(&mut fresh).unwrap(), Dimension::Symbol("(n0)+(1)".into()));
        assert_eq!(sum.evaluate(&mut fresh).unwrap(), Dimension::Symbol("(n0)+(1)".into()));
    }

    #[test]
    fn test_overflow() {
        let d = Dimension::Known(i64::MAX).add(&Dimension::Known(1));
        let mut ev = DimEvaluator::default();
        assert!(matches!(
            d.evaluate(&mut ev),
            Err(TensorError::DimensionOverflow(_))
        ));
    }

    #[test]
    fn test_greater_than() {
        let k3 = Dimension::Known(3);
        let k5 = Dimension::Known(5);
        let n = Dimension::symbol("N");
        let m = Dimension::symbol("M");
        assert!(k5.greater_than(&k3).unwrap());
        assert!(!k3.greater_than(&k5).unwrap());
        assert!(!Dimension::Unknown.greater_than(&k3).unwrap());
        assert!(!k3.greater_than(&Dimension::Unknown).unwrap());
        assert!(!Dimension::Unknown.greater_than(&Dimension::Unknown).unwrap());
        assert!(n.greater_than(&k3).unwrap());
        assert!(!k3.greater_than(&n).unwrap());
        assert!(!n.greater_than(&n).unwrap());
        assert!(n.greater_than(&m).is_err());
        let six = Dimension::Known(2).mul(&Dimension::Known(3));
        assert!(six.greater_than(&Dimension::Known(4).add(&Dimension::Known(1))).unwrap());
    }

    #[test]
    fn test_equivalent() {
        let empty = Bindings::new();
        let n = Dimension::symbol("N");
        let m = Dimension::symbol("M");
        assert!(Dimension::Unknown.equivalent(&Dimension::Unknown, &empty));
        assert!(!Dimension::Unknown.equivalent(&Dimension::Known(1), &empty));
        assert!(n.equivalent(&n.clone(), &empty));
        assert!(!n.equivalent(&m, &empty));

        let mut same = Bindings::new();
        same.insert("N".into(), 4);
        same.insert("M".into(), 4);
        assert!(n.equivalent(&m, &same));
        assert!(n.add(&Dimension::Known(1)).equivalent(&Dimension::Known(5), &same));
    }

    #[test]
    fn test_render() {
        let d = Dimension::symbol("N").mul(&Dimension::Known(2));
        assert_eq!(d.to_string(), "N*2");
        assert_eq!(Dimension::Known(2).add(&Dimension::Known(3)).to_string(), "5");
        assert_eq!(Dimension::Unknown.render(true), "x");
        assert_eq!(Dimension::Unknown.to_string(), "?");
        assert_eq!(Dimension::Known(1).max(&Dimension::Unknown).to_string(), "max(1,?)");
    }
}
