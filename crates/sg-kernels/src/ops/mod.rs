//! Built-in kernels and their registration.

pub mod binary;
pub mod label_encoder;
pub mod layout;
pub mod linear_regressor;
pub mod matmul;
pub mod reduce;
pub mod scan;
pub mod softmax;
pub mod unary;
pub mod zipmap;

pub use binary::Binary;
pub use label_encoder::LabelEncoder;
pub use layout::{Cast, Concat, Flatten, Identity, Reshape, Squeeze, Transpose, Unsqueeze};
pub use linear_regressor::LinearRegressor;
pub use matmul::{Gemm, MatMul};
pub use reduce::{ArgReduce, Reduce};
pub use scan::Scan;
pub use softmax::Softmax;
pub use unary::Unary;
pub use zipmap::ZipMap;

use sg_onnx::{DEFAULT_DOMAIN, ML_DOMAIN};
use sg_tensor::{ArgOp, BinaryOp, ReduceOp, UnaryOp};

use crate::error::Result;
use crate::kernel::Kernel;
use crate::registry::Registry;

fn boxed<K: Kernel + 'static>(kernel: Result<K>) -> Result<Box<dyn Kernel>> {
    Ok(Box::new(kernel?))
}

/// Register `$op` for every listed `(name, since, variant)`.
macro_rules! register_family {
    ($registry:expr, $kernel:ident, $op:ident, [$(($name:literal, $variant:ident)),* $(,)?]) => {
        $(
            $registry.register(DEFAULT_DOMAIN, $name, 1, |n| boxed($kernel::new(n, $op::$variant)));
        )*
    };
}

/// Register every built-in kernel into `registry`.
pub(crate) fn register_builtins(registry: &mut Registry) {
    register_family!(registry, Unary, UnaryOp, [
        ("Abs", Abs),
        ("Neg", Neg),
        ("Exp", Exp),
        ("Log", Log),
        ("Sqrt", Sqrt),
        ("Reciprocal", Reciprocal),
        ("Relu", Relu),
        ("Sigmoid", Sigmoid),
        ("Tanh", Tanh),
        ("Floor", Floor),
        ("Ceil", Ceil),
    ]);
    register_family!(registry, Binary, BinaryOp, [
        ("Add", Add),
        ("Sub", Sub),
        ("Mul", Mul),
        ("Div", Div),
        ("Pow", Pow),
    ]);
    register_family!(registry, Reduce, ReduceOp, [
        ("ReduceSum", Sum),
        ("ReduceMean", Mean),
        ("ReduceMax", Max),
        ("ReduceMin", Min),
    ]);
    register_family!(registry, ArgReduce, ArgOp, [("ArgMax", Max), ("ArgMin", Min)]);

    registry
        .register(DEFAULT_DOMAIN, "ReduceSum", 13, |n| {
            boxed(Reduce::with_input_axes(n, ReduceOp::Sum))
        })
        .register(DEFAULT_DOMAIN, "MatMul", 1, |n| boxed(MatMul::new(n)))
        .register(DEFAULT_DOMAIN, "Gemm", 1, |n| boxed(Gemm::new(n)))
        .register(DEFAULT_DOMAIN, "Softmax", 1, |n| boxed(Softmax::v1(n)))
        .register(DEFAULT_DOMAIN, "Softmax", 13, |n| boxed(Softmax::v13(n)))
        .register(DEFAULT_DOMAIN, "Identity", 1, |n| boxed(Identity::new(n)))
        .register(DEFAULT_DOMAIN, "Cast", 1, |n| boxed(Cast::new(n)))
        .register(DEFAULT_DOMAIN, "Transpose", 1, |n| boxed(Transpose::new(n)))
        .register(DEFAULT_DOMAIN, "Reshape", 1, |n| boxed(Reshape::new(n)))
        .register(DEFAULT_DOMAIN, "Squeeze", 1, |n| boxed(Squeeze::v1(n)))
        .register(DEFAULT_DOMAIN, "Squeeze", 13, |n| boxed(Squeeze::v13(n)))
        .register(DEFAULT_DOMAIN, "Unsqueeze", 1, |n| boxed(Unsqueeze::v1(n)))
        .register(DEFAULT_DOMAIN, "Unsqueeze", 13, |n| boxed(Unsqueeze::v13(n)))
        .register(DEFAULT_DOMAIN, "Flatten", 1, |n| boxed(Flatten::new(n)))
        .register(DEFAULT_DOMAIN, "Concat", 1, |n| boxed(Concat::new(n)))
        .register(DEFAULT_DOMAIN, "Scan", 9, |n| boxed(Scan::new(n)));

    registry
        .register(ML_DOMAIN, "LabelEncoder", 1, |n| boxed(LabelEncoder::v1(n)))
        .register(ML_DOMAIN, "LabelEncoder", 2, |n| boxed(LabelEncoder::v2(n)))
        .register(ML_DOMAIN, "LinearRegressor", 1, |n| boxed(LinearRegressor::new(n)))
        .register(ML_DOMAIN, "ZipMap", 1, |n| boxed(ZipMap::new(n)));
}
