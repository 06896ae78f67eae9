//! `extern "C"` services an artifact calls back into.
//!
//! Artifacts never see the layout of a [`Tensor`] or [`ConstantMap`]; they go
//! through these functions instead. All of them return a [`Status`], and a
//! panic inside a shim call is reported as [`STATUS_FAILURE`] rather than
//! unwinding into foreign code.
use std::ffi::{c_char, c_void, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::abi::{
    ConstantMapHandle, ProxyExecutorHandle, Status, TensorHandle, STATUS_FAILURE, STATUS_SUCCESS,
};
use crate::constants::ConstantMap;
use crate::marshal;
use crate::proxy_executor::ProxyExecutorSlot;
use crate::tensor::{DType, Tensor};

fn guarded<F>(call: &str, body: F) -> Status
where
    F: FnOnce() -> Result<(), String>,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => STATUS_SUCCESS,
        Ok(Err(msg)) => {
            crate::error!("{}: {}", call, msg);
            STATUS_FAILURE
        }
        Err(_) => {
            crate::critical!("{}: panicked inside shim call", call);
            STATUS_FAILURE
        }
    }
}

unsafe fn tensor_arg<'a>(handle: TensorHandle) -> Result<&'a Tensor, String> {
    marshal::borrow_tensor(handle).ok_or_else(|| "null tensor handle".to_string())
}

unsafe fn write_out<T>(out: *mut T, value: T) -> Result<(), String> {
    if out.is_null() {
        return Err("null output pointer".to_string());
    }
    out.write(value);
    Ok(())
}

#[no_mangle]
pub unsafe extern "C" fn modelrunner_tensor_get_data_ptr(
    tensor: TensorHandle,
    data_ptr: *mut *mut c_void,
) -> Status {
    guarded("tensor_get_data_ptr", || {
        let tensor = tensor_arg(tensor)?;
        write_out(data_ptr, tensor.data_ptr() as *mut c_void)
    })
}

#[no_mangle]
pub unsafe extern "C" fn modelrunner_tensor_get_dtype(tensor: TensorHandle, dtype: *mut i32) -> Status {
    guarded("tensor_get_dtype", || {
        let tensor = tensor_arg(tensor)?;
        write_out(dtype, tensor.dtype().code())
    })
}

#[no_mangle]
pub unsafe extern "C" fn modelrunner_tensor_get_dim(tensor: TensorHandle, dim: *mut usize) -> Status {
    guarded("tensor_get_dim", || {
        let tensor = tensor_arg(tensor)?;
        write_out(dim, tensor.dim())
    })
}

#[no_mangle]
pub unsafe extern "C" fn modelrunner_tensor_get_numel(tensor: TensorHandle, numel: *mut usize) -> Status {
    guarded("tensor_get_numel", || {
        let tensor = tensor_arg(tensor)?;
        write_out(numel, tensor.numel())
    })
}

/// Pointer into the tensor's own size array, valid while the handle lives.
#[no_mangle]
pub unsafe extern "C" fn modelrunner_tensor_get_sizes(
    tensor: TensorHandle,
    sizes: *mut *const usize,
) -> Status {
    guarded("tensor_get_sizes", || {
        let tensor = tensor_arg(tensor)?;
        write_out(sizes, tensor.shape().as_ptr())
    })
}

#[no_mangle]
pub unsafe extern "C" fn modelrunner_tensor_get_strides(
    tensor: TensorHandle,
    strides: *mut *const usize,
) -> Status {
    guarded("tensor_get_strides", || {
        let tensor = tensor_arg(tensor)?;
        write_out(strides, tensor.strides().as_ptr())
    })
}

/// Allocate a zeroed tensor; the new handle is owned by the caller.
#[no_mangle]
pub unsafe extern "C" fn modelrunner_empty_strided(
    ndim: usize,
    sizes: *const usize,
    strides: *const usize,
    dtype: i32,
    out: *mut TensorHandle,
) -> Status {
    guarded("empty_strided", || {
        if ndim > 0 && (sizes.is_null() || strides.is_null()) {
            return Err("null size or stride array".to_string());
        }
        let (shape, strides) = if ndim == 0 {
            (&[][..], &[][..])
        } else {
            (
                std::slice::from_raw_parts(sizes, ndim),
                std::slice::from_raw_parts(strides, ndim),
            )
        };
        let dtype = DType::from_code(dtype).map_err(|err| err.to_string())?;
        let tensor = Tensor::empty_strided(dtype, shape, strides).map_err(|err| err.to_string())?;
        write_out(out, marshal::into_handle(tensor))
    })
}

/// New owned handle sharing storage with `tensor`.
#[no_mangle]
pub unsafe extern "C" fn modelrunner_tensor_clone_handle(
    tensor: TensorHandle,
    out: *mut TensorHandle,
) -> Status {
    guarded("tensor_clone_handle", || {
        let tensor = tensor_arg(tensor)?;
        write_out(out, marshal::into_handle(tensor.clone()))
    })
}

#[no_mangle]
pub unsafe extern "C" fn modelrunner_delete_tensor_object(tensor: TensorHandle) -> Status {
    guarded("delete_tensor_object", || {
        marshal::delete_handle(tensor);
        Ok(())
    })
}

unsafe fn constant_map_arg<'a>(map: ConstantMapHandle) -> Result<&'a ConstantMap<'a>, String> {
    (map as *const ConstantMap<'a>)
        .as_ref()
        .ok_or_else(|| "null constant map handle".to_string())
}

#[no_mangle]
pub unsafe extern "C" fn modelrunner_constant_map_len(map: ConstantMapHandle, len: *mut usize) -> Status {
    guarded("constant_map_len", || {
        let map = constant_map_arg(map)?;
        write_out(len, map.len())
    })
}

/// Borrowed handle for `name`, or null when absent. Never delete it.
#[no_mangle]
pub unsafe extern "C" fn modelrunner_constant_map_get(
    map: ConstantMapHandle,
    name: *const c_char,
    tensor: *mut TensorHandle,
) -> Status {
    guarded("constant_map_get", || {
        let map = constant_map_arg(map)?;
        if name.is_null() {
            return Err("null constant name".to_string());
        }
        let name = CStr::from_ptr(name)
            .to_str()
            .map_err(|err| format!("constant name is not utf-8: {}", err))?;
        let handle = map
            .get(name)
            .map(|t| t as *const Tensor as TensorHandle)
            .unwrap_or(std::ptr::null_mut());
        write_out(tensor, handle)
    })
}

/// Name (not NUL-terminated) and borrowed tensor of entry `idx`.
#[no_mangle]
pub unsafe extern "C" fn modelrunner_constant_map_entry_at(
    map: ConstantMapHandle,
    idx: usize,
    name: *mut *const u8,
    name_len: *mut usize,
    tensor: *mut TensorHandle,
) -> Status {
    guarded("constant_map_entry_at", || {
        let map = constant_map_arg(map)?;
        let (entry_name, entry_tensor) = map
            .entry_at(idx)
            .ok_or_else(|| format!("constant map index {} out of range ({})", idx, map.len()))?;
        write_out(name, entry_name.as_ptr())?;
        write_out(name_len, entry_name.len())?;
        write_out(tensor, entry_tensor as *const Tensor as TensorHandle)
    })
}

/// Dispatch extern node `node_index` to the runner's proxy executor.
///
/// Tensor arguments are borrowed; outputs are written in place.
#[no_mangle]
pub unsafe extern "C" fn modelrunner_proxy_executor_call_function(
    proxy_executor: ProxyExecutorHandle,
    node_index: i32,
    num_ints: i32,
    flatten_int_args: *const i64,
    num_tensors: i32,
    flatten_tensor_args: *const TensorHandle,
) -> Status {
    guarded("proxy_executor_call_function", || {
        let slot = (proxy_executor as *const ProxyExecutorSlot)
            .as_ref()
            .ok_or_else(|| "artifact requires a proxy executor but none is loaded".to_string())?;
        let node_index =
            usize::try_from(node_index).map_err(|_| format!("negative node index {}", node_index))?;
        let int_args = raw_slice(flatten_int_args, num_ints)?;
        let tensor_handles = raw_slice(flatten_tensor_args, num_tensors)?;
        let mut tensors = Vec::with_capacity(tensor_handles.len());
        for handle in tensor_handles {
            tensors.push(tensor_arg(*handle)?);
        }
        slot.executor()
            .call_function(node_index, int_args, &tensors)
            .map_err(|err| format!("{:#}", err))
    })
}

unsafe fn raw_slice<'a, T>(ptr: *const T, len: i32) -> Result<&'a [T], String> {
    let len = usize::try_from(len).map_err(|_| format!("negative argument count {}", len))?;
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err("null argument array".to_string());
    }
    Ok(std::slice::from_raw_parts(ptr, len))
}
