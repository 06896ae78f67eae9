//! Conversion between caller tensors and ABI tensor handles.
//!
//! A handle is a boxed [`Tensor`] behind an opaque pointer. Creating a handle
//! never copies tensor data: inputs are shallow clones (or moves) of the
//! caller's tensors, and outputs are unboxed back into the caller's ownership.
//! Each handle has exactly one owner at a time; whoever holds it last must
//! release it through [`delete_handle`] or by stealing it.
use crate::abi::TensorHandle;
use crate::error::{Result, RunnerError};
use crate::tensor::Tensor;

/// Wrap one tensor in a fresh handle, taking ownership of the tensor value.
pub fn into_handle(tensor: Tensor) -> TensorHandle {
    Box::into_raw(Box::new(tensor)) as TensorHandle
}

/// New handles sharing storage with `tensors`; the caller keeps its tensors.
pub fn new_handles_from_tensors(tensors: &[Tensor]) -> Vec<TensorHandle> {
    tensors.iter().cloned().map(into_handle).collect()
}

/// Move `tensors` into handles without touching their storage.
pub fn handles_from_tensors(tensors: Vec<Tensor>) -> Vec<TensorHandle> {
    tensors.into_iter().map(into_handle).collect()
}

/// Take back ownership of a single handle.
///
/// # Safety
/// `handle` must have been produced by [`into_handle`] (directly or through the
/// shim) and must not be used again after this call.
pub unsafe fn steal_tensor(handle: TensorHandle) -> Result<Tensor> {
    if handle.is_null() {
        return Err(RunnerError::Marshal("artifact returned a null tensor handle".into()));
    }
    Ok(*Box::from_raw(handle as *mut Tensor))
}

/// Take ownership of every tensor behind `handles`, nulling each slot.
///
/// Non-null handles are always released, even when a null slot makes the
/// whole conversion fail.
///
/// # Safety
/// Every non-null entry must be a live handle owned by the caller.
pub unsafe fn steal_tensors_from_handles(handles: &mut [TensorHandle]) -> Result<Vec<Tensor>> {
    let mut out = Vec::with_capacity(handles.len());
    let mut null_slot = None;
    for (idx, slot) in handles.iter_mut().enumerate() {
        let handle = std::mem::replace(slot, std::ptr::null_mut());
        if handle.is_null() {
            null_slot.get_or_insert(idx);
            continue;
        }
        out.push(*Box::from_raw(handle as *mut Tensor));
    }
    match null_slot {
        Some(idx) => Err(RunnerError::Marshal(format!(
            "artifact left output handle {} of {} unset",
            idx,
            handles.len()
        ))),
        None => Ok(out),
    }
}

/// Borrow the tensor behind a handle without taking ownership.
///
/// # Safety
/// `handle` must be live for the whole of `'a`.
pub unsafe fn borrow_tensor<'a>(handle: TensorHandle) -> Option<&'a Tensor> {
    (handle as *const Tensor).as_ref()
}

/// Release a handle the caller owns. Null is ignored.
///
/// # Safety
/// `handle` must be live and must not be used again after this call.
pub unsafe fn delete_handle(handle: TensorHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle as *mut Tensor));
    }
}
