mod dtype;
mod shape;
mod tensor;

pub use dtype::{DType, TensorElement};
pub use shape::{compute_strides, numel};
pub(crate) use shape::checked_numel;
pub use tensor::Tensor;
