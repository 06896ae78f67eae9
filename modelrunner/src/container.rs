use std::ffi::CString;
use std::path::Path;

use crate::abi::{symbols, ContainerHandle};
use crate::error::{check_status, Result, RunnerError};
use crate::loader::SymbolTable;

/// Exclusive owner of the artifact's container state.
///
/// The artifact keeps the compiled model and both constant-buffer slots
/// behind this handle. It is deleted exactly once, when this value drops.
pub(crate) struct Container {
    handle: ContainerHandle,
    delete: crate::abi::DeleteFn,
}

impl Container {
    pub(crate) fn create(
        symbols: &SymbolTable,
        num_models: usize,
        device: &str,
        cubin_dir: Option<&Path>,
    ) -> Result<Self> {
        let device_c = CString::new(device)
            .map_err(|_| RunnerError::Config(format!("device string {:?} contains NUL", device)))?;
        let cubin_c = match cubin_dir {
            Some(dir) if !dir.as_os_str().is_empty() => Some(
                CString::new(dir.to_string_lossy().into_owned()).map_err(|_| {
                    RunnerError::Config(format!("cubin dir {} contains NUL", dir.display()))
                })?,
            ),
            _ => None,
        };
        let mut handle: ContainerHandle = std::ptr::null_mut();
        let status = unsafe {
            (symbols.create_with_device)(
                &mut handle,
                num_models,
                device_c.as_ptr(),
                cubin_c.as_ref().map_or(std::ptr::null(), |dir| dir.as_ptr()),
            )
        };
        check_status(symbols::CREATE_WITH_DEVICE, status)?;
        if handle.is_null() {
            return Err(RunnerError::RuntimeInvocation {
                call: symbols::CREATE_WITH_DEVICE,
                code: crate::abi::STATUS_FAILURE,
            });
        }
        crate::trace!(
            "created container on {} with {} model copies",
            device,
            num_models
        );
        Ok(Self {
            handle,
            delete: symbols.delete,
        })
    }

    pub(crate) fn handle(&self) -> ContainerHandle {
        self.handle
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        let status = unsafe { (self.delete)(self.handle) };
        if status != crate::abi::STATUS_SUCCESS {
            crate::critical!("{} failed with status {}", symbols::DELETE, status);
        }
    }
}
