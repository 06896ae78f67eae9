//! Caller-side tensor type.
//!
//! `Tensor` is a strided view over reference-counted storage. Cloning a tensor
//! shares its storage, which is what lets the marshaler hand tensors to an
//! artifact without copying their data.
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::dtype::{bf16_bits_to_f32, f16_bits_to_f32, DType, TensorElement};
use super::shape::{
    checked_numel, compute_strides, is_contiguous, linear_to_indices, numel, offset_for,
    storage_span,
};

/// Eight-byte aligned byte buffer shared between tensors and artifacts.
struct Storage {
    words: UnsafeCell<Box<[u64]>>,
    nbytes: usize,
}

// Storage is written by artifacts through raw data pointers. Coordinating
// those writes with readers is the caller's obligation, the same as for a
// framework tensor shared across threads.
unsafe impl Send for Storage {}
unsafe impl Sync for Storage {}

impl Storage {
    fn zeroed(nbytes: usize) -> Self {
        let words = vec![0u64; nbytes.div_ceil(8)].into_boxed_slice();
        Self {
            words: UnsafeCell::new(words),
            nbytes,
        }
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let storage = Self::zeroed(bytes.len());
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), storage.base_ptr(), bytes.len());
        }
        storage
    }

    fn base_ptr(&self) -> *mut u8 {
        unsafe { (*self.words.get()).as_mut_ptr() as *mut u8 }
    }
}

#[derive(Clone)]
pub struct Tensor {
    dtype: DType,
    shape: Vec<usize>,
    strides: Vec<usize>,
    storage: Arc<Storage>,
}

impl Tensor {
    /// Build a 1-d tensor from a flat data vector.
    ///
    /// # Example
    /// ```no_run
    /// # use modelrunner::Tensor;
    /// # fn main() -> anyhow::Result<()> {
    /// let t = Tensor::from_vec(vec![1.0f32, 2.0, 3.0])?;
    /// assert_eq!(t.shape(), &[3]);
    /// # Ok(()) }
    /// ```
    pub fn from_vec<T: TensorElement>(data: Vec<T>) -> Result<Self> {
        let len = data.len();
        Self::from_vec_with_shape(data, &[len])
    }

    /// Build a contiguous tensor with an explicit shape.
    pub fn from_vec_with_shape<T: TensorElement>(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        let expected = checked_numel(shape)?;
        if expected != data.len() {
            return Err(anyhow!(
                "shape {:?} expects {} values, got {}",
                shape,
                expected,
                data.len()
            ));
        }
        let storage = Storage::from_bytes(bytemuck::cast_slice(&data));
        Ok(Self {
            dtype: T::DTYPE,
            shape: shape.to_vec(),
            strides: compute_strides(shape),
            storage: Arc::new(storage),
        })
    }

    pub fn zeros(dtype: DType, shape: &[usize]) -> Result<Self> {
        Self::empty_strided(dtype, shape, &compute_strides(shape))
    }

    /// Allocate zeroed storage large enough for an arbitrary strided layout.
    ///
    /// Fails when the element count or the byte size of the layout does not
    /// fit in `usize`, so `numel` and `nbytes` are exact for every tensor.
    pub fn empty_strided(dtype: DType, shape: &[usize], strides: &[usize]) -> Result<Self> {
        let elem = dtype.size_in_bytes();
        checked_numel(shape)?
            .checked_mul(elem)
            .ok_or_else(|| anyhow!("shape {:?} of {:?} overflows usize bytes", shape, dtype))?;
        let storage_nbytes = storage_span(shape, strides)?
            .checked_mul(elem)
            .ok_or_else(|| anyhow!("storage for strides {:?} overflows usize bytes", strides))?;
        Ok(Self {
            dtype,
            shape: shape.to_vec(),
            strides: strides.to_vec(),
            storage: Arc::new(Storage::zeroed(storage_nbytes)),
        })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn dim(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        numel(&self.shape)
    }

    pub fn nbytes(&self) -> usize {
        self.numel() * self.dtype.size_in_bytes()
    }

    pub fn is_contiguous(&self) -> bool {
        is_contiguous(&self.shape, &self.strides)
    }

    /// Raw pointer to the first element; writes through it are visible to
    /// every tensor sharing this storage.
    pub fn data_ptr(&self) -> *mut u8 {
        self.storage.base_ptr()
    }

    pub fn shares_storage(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Collect the logical elements in row-major order.
    pub fn to_vec<T: TensorElement>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype {
            return Err(anyhow!(
                "requested {:?} elements from a {:?} tensor",
                T::DTYPE,
                self.dtype
            ));
        }
        let base = self.data_ptr() as *const T;
        let len = self.numel();
        if self.is_contiguous() {
            if len == 0 {
                return Ok(Vec::new());
            }
            let slice = unsafe { std::slice::from_raw_parts(base, len) };
            return Ok(slice.to_vec());
        }
        let mut out = Vec::with_capacity(len);
        for idx in 0..len {
            let coords = linear_to_indices(idx, &self.shape);
            let offset = offset_for(&self.shape, &self.strides, &coords)?;
            out.push(unsafe { *base.add(offset) });
        }
        Ok(out)
    }

    /// Widen every element to `f64`, including half-precision and bool.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        match self.dtype {
            DType::U8 => widen::<u8>(self),
            DType::I8 => widen::<i8>(self),
            DType::I16 => widen::<i16>(self),
            DType::I32 => widen::<i32>(self),
            DType::I64 => widen::<i64>(self),
            DType::F32 => widen::<f32>(self),
            DType::F64 => widen::<f64>(self),
            DType::Bool => Ok(self
                .raw_elements::<u8>()?
                .into_iter()
                .map(|v| if v != 0 { 1.0 } else { 0.0 })
                .collect()),
            DType::F16 => Ok(self
                .raw_elements::<u16>()?
                .into_iter()
                .map(|bits| f16_bits_to_f32(bits) as f64)
                .collect()),
            DType::BF16 => Ok(self
                .raw_elements::<u16>()?
                .into_iter()
                .map(|bits| bf16_bits_to_f32(bits) as f64)
                .collect()),
        }
    }

    /// Elementwise `|a - b| <= atol + rtol * |b|`, with matching shapes.
    pub fn allclose(&self, other: &Tensor, rtol: f64, atol: f64) -> bool {
        if self.shape != other.shape {
            return false;
        }
        let (Ok(lhs), Ok(rhs)) = (self.to_f64_vec(), other.to_f64_vec()) else {
            return false;
        };
        lhs.iter().zip(rhs.iter()).all(|(a, b)| {
            if a.is_nan() || b.is_nan() {
                return false;
            }
            (a - b).abs() <= atol + rtol * b.abs()
        })
    }

    // Same layout walk as `to_vec` but without the dtype check, for dtypes
    // that have no Rust element type of their own.
    fn raw_elements<T: bytemuck::Pod>(&self) -> Result<Vec<T>> {
        if std::mem::size_of::<T>() != self.dtype.size_in_bytes() {
            return Err(anyhow!("element width mismatch for {:?}", self.dtype));
        }
        let base = self.data_ptr() as *const T;
        let mut out = Vec::with_capacity(self.numel());
        for idx in 0..self.numel() {
            let coords = linear_to_indices(idx, &self.shape);
            let offset = offset_for(&self.shape, &self.strides, &coords)?;
            out.push(unsafe { *base.add(offset) });
        }
        Ok(out)
    }
}

fn widen<T: TensorElement>(tensor: &Tensor) -> Result<Vec<f64>> {
    Ok(tensor.to_vec::<T>()?.into_iter().map(T::to_f64).collect())
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("dtype", &self.dtype)
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("storage_nbytes", &self.storage.nbytes)
            .finish()
    }
}
