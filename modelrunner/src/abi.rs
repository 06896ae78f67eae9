//! C entry-point table shared between the runner and a compiled artifact.
//!
//! Every entry point returns a [`Status`]; zero is success and any other value
//! is surfaced as [`crate::RunnerError::RuntimeInvocation`]. Handle types are
//! opaque pointees: the runner never dereferences a container handle, and the
//! artifact only touches tensor and constant-map handles through [`crate::shim`].
use std::ffi::{c_char, c_void};

pub type Status = i32;

pub const STATUS_SUCCESS: Status = 0;
pub const STATUS_FAILURE: Status = 1;

#[repr(C)]
pub struct ContainerOpaque {
    _private: [u8; 0],
}

#[repr(C)]
pub struct TensorOpaque {
    _private: [u8; 0],
}

#[repr(C)]
pub struct ConstantMapOpaque {
    _private: [u8; 0],
}

#[repr(C)]
pub struct ProxyExecutorOpaque {
    _private: [u8; 0],
}

pub type ContainerHandle = *mut ContainerOpaque;
pub type TensorHandle = *mut TensorOpaque;
pub type ConstantMapHandle = *const ConstantMapOpaque;
pub type ProxyExecutorHandle = *mut ProxyExecutorOpaque;
/// Device stream the artifact may enqueue work on; null means synchronous.
pub type StreamHandle = *mut c_void;

pub type CreateWithDeviceFn = unsafe extern "C" fn(
    container: *mut ContainerHandle,
    num_models: usize,
    device: *const c_char,
    cubin_dir: *const c_char,
) -> Status;
pub type DeleteFn = unsafe extern "C" fn(container: ContainerHandle) -> Status;
pub type RunFn = unsafe extern "C" fn(
    container: ContainerHandle,
    input_handles: *mut TensorHandle,
    num_inputs: usize,
    output_handles: *mut TensorHandle,
    num_outputs: usize,
    stream: StreamHandle,
    proxy_executor: ProxyExecutorHandle,
) -> Status;
pub type GetNumOutputsFn =
    unsafe extern "C" fn(container: ContainerHandle, num_outputs: *mut usize) -> Status;
pub type GetNumConstantsFn =
    unsafe extern "C" fn(container: ContainerHandle, num_constants: *mut usize) -> Status;
pub type GetConstantNameFn = unsafe extern "C" fn(
    container: ContainerHandle,
    idx: usize,
    name: *mut *const c_char,
) -> Status;
pub type GetConstantOriginalFqnFn = unsafe extern "C" fn(
    container: ContainerHandle,
    idx: usize,
    original_fqn: *mut *const c_char,
) -> Status;
pub type GetConstantDtypeFn =
    unsafe extern "C" fn(container: ContainerHandle, idx: usize, dtype: *mut i32) -> Status;
pub type UpdateConstantBufferFn = unsafe extern "C" fn(
    container: ContainerHandle,
    constant_map: ConstantMapHandle,
    use_inactive: bool,
    validate_full_update: bool,
) -> Status;
pub type UpdateInactiveConstantBufferFn =
    unsafe extern "C" fn(container: ContainerHandle, constant_map: ConstantMapHandle) -> Status;
pub type RunConstantFoldingFn = unsafe extern "C" fn(
    container: ContainerHandle,
    use_inactive: bool,
    stream: StreamHandle,
    proxy_executor: ProxyExecutorHandle,
) -> Status;
pub type SwapConstantBufferFn = unsafe extern "C" fn(container: ContainerHandle) -> Status;
pub type FreeInactiveConstantBufferFn =
    unsafe extern "C" fn(container: ContainerHandle) -> Status;
pub type GetCallSpecFn = unsafe extern "C" fn(
    container: ContainerHandle,
    in_spec: *mut *const c_char,
    out_spec: *mut *const c_char,
) -> Status;

/// Exported symbol names, fixed by the artifact ABI.
pub mod symbols {
    pub const CREATE_WITH_DEVICE: &str = "AOTInductorModelContainerCreateWithDevice";
    pub const DELETE: &str = "AOTInductorModelContainerDelete";
    pub const RUN: &str = "AOTInductorModelContainerRun";
    pub const RUN_SINGLE_THREADED: &str = "AOTInductorModelContainerRunSingleThreaded";
    pub const GET_NUM_OUTPUTS: &str = "AOTInductorModelContainerGetNumOutputs";
    pub const GET_NUM_CONSTANTS: &str = "AOTInductorModelContainerGetNumConstants";
    pub const GET_CONSTANT_NAME: &str = "AOTInductorModelContainerGetConstantName";
    pub const GET_CONSTANT_ORIGINAL_FQN: &str = "AOTInductorModelContainerGetConstantOriginalFQN";
    pub const GET_CONSTANT_DTYPE: &str = "AOTInductorModelContainerGetConstantDtype";
    pub const UPDATE_CONSTANT_BUFFER: &str = "AOTInductorModelContainerUpdateConstantBuffer";
    pub const UPDATE_INACTIVE_CONSTANT_BUFFER: &str =
        "AOTInductorModelContainerUpdateInactiveConstantBuffer";
    pub const RUN_CONSTANT_FOLDING: &str = "AOTInductorModelContainerRunConstantFolding";
    pub const SWAP_CONSTANT_BUFFER: &str = "AOTInductorModelContainerSwapConstantBuffer";
    pub const FREE_INACTIVE_CONSTANT_BUFFER: &str =
        "AOTInductorModelContainerFreeInactiveConstantBuffer";
    pub const GET_CALL_SPEC: &str = "AOTInductorModelContainerGetCallSpec";
}
