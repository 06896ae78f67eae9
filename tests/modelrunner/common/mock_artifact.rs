//! In-process stand-in for a compiled model-container artifact.
//!
//! The model is `y = x @ w_pre + w_add` over `[4, 4]` f32 tensors. Constant
//! data lives in two slots inside the container, and tensors are only touched
//! through the crate's `extern "C"` shim, the same way a compiled artifact
//! touches them.
//!
//! `w_pre` only reaches `run` through constant folding: a slot serves the
//! folded copy taken at its last fold, so updating `w_pre` without folding
//! leaves the slot serving stale (or, for a fresh slot, no) weights. `w_add`
//! is read directly and takes effect on update.
use std::ffi::{c_char, c_void, CStr};
use std::path::Path;
use std::ptr;
use std::sync::Mutex;

use modelrunner::abi::{
    self, symbols, ConstantMapHandle, ContainerHandle, ProxyExecutorHandle, Status, StreamHandle,
    TensorHandle, STATUS_FAILURE, STATUS_SUCCESS,
};
use modelrunner::shim;
use modelrunner::StaticModule;

pub const SIDE: usize = 4;
pub const NUMEL: usize = SIDE * SIDE;
pub const CONSTANT_NAMES: [&str; 2] = ["w_pre", "w_add"];
pub const ORIGINAL_FQNS: [&str; 2] = ["pre.weight", "add.bias"];
pub const IN_SPEC: &str = "[1, {\"type\": \"builtins.tuple\", \"children_spec\": [\"x\"]}]";
pub const OUT_SPEC: &str = "[1, {\"type\": null, \"context\": null, \"children_spec\": []}]";
pub const EXTERN_TARGET: &str = "mock::add_scalar";
pub const EXTERN_SCALAR: i64 = 3;

const F32_CODE: i32 = 6;
const NAMES_C: [&[u8]; 2] = [b"w_pre\0", b"w_add\0"];
const FQNS_C: [&[u8]; 2] = [b"pre.weight\0", b"add.bias\0"];
const IN_SPEC_C: &[u8] =
    b"[1, {\"type\": \"builtins.tuple\", \"children_spec\": [\"x\"]}]\0";
const OUT_SPEC_C: &[u8] = b"[1, {\"type\": null, \"context\": null, \"children_spec\": []}]\0";

/// Cubin dirs of containers deleted so far, in deletion order.
static DELETED: Mutex<Vec<String>> = Mutex::new(Vec::new());

pub fn deleted_containers() -> Vec<String> {
    DELETED.lock().map(|d| d.clone()).unwrap_or_default()
}

pub fn reference_weights() -> (Vec<f32>, Vec<f32>) {
    let w_pre = (0..NUMEL).map(|i| i as f32 * 0.1 - 0.5).collect();
    let w_add = (0..NUMEL).map(|i| 0.25 * (i % SIDE) as f32).collect();
    (w_pre, w_add)
}

pub fn reference_output(x: &[f32], w_pre: &[f32], w_add: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0f32; NUMEL];
    for row in 0..SIDE {
        for col in 0..SIDE {
            let mut acc = 0.0f32;
            for k in 0..SIDE {
                acc += x[row * SIDE + k] * w_pre[k * SIDE + col];
            }
            out[row * SIDE + col] = acc + w_add[row * SIDE + col];
        }
    }
    out
}

#[derive(Default, Clone)]
struct Slot {
    w_pre: Option<Vec<f32>>,
    w_add: Option<Vec<f32>>,
    // Copy of w_pre taken by the last fold of this slot.
    folded: Option<Vec<f32>>,
}

struct State {
    slots: [Slot; 2],
    active: usize,
}

impl State {
    fn slot_index(&self, use_inactive: bool) -> usize {
        if use_inactive {
            1 - self.active
        } else {
            self.active
        }
    }
}

struct MockContainer {
    state: Mutex<State>,
    cubin_dir: String,
    calls_extern_node: bool,
}

unsafe fn container<'a>(handle: ContainerHandle) -> Option<&'a MockContainer> {
    (handle as *const MockContainer).as_ref()
}

unsafe fn read_f32(handle: TensorHandle) -> Option<Vec<f32>> {
    let mut dtype = 0i32;
    if shim::modelrunner_tensor_get_dtype(handle, &mut dtype) != STATUS_SUCCESS || dtype != F32_CODE {
        return None;
    }
    let mut numel = 0usize;
    if shim::modelrunner_tensor_get_numel(handle, &mut numel) != STATUS_SUCCESS || numel != NUMEL {
        return None;
    }
    let mut data: *mut c_void = ptr::null_mut();
    if shim::modelrunner_tensor_get_data_ptr(handle, &mut data) != STATUS_SUCCESS {
        return None;
    }
    Some(std::slice::from_raw_parts(data as *const f32, numel).to_vec())
}

unsafe fn new_output(values: &[f32]) -> Option<TensorHandle> {
    let sizes = [SIDE, SIDE];
    let strides = [SIDE, 1];
    let mut out: TensorHandle = ptr::null_mut();
    if shim::modelrunner_empty_strided(2, sizes.as_ptr(), strides.as_ptr(), F32_CODE, &mut out)
        != STATUS_SUCCESS
    {
        return None;
    }
    let mut data: *mut c_void = ptr::null_mut();
    if shim::modelrunner_tensor_get_data_ptr(out, &mut data) != STATUS_SUCCESS {
        shim::modelrunner_delete_tensor_object(out);
        return None;
    }
    ptr::copy_nonoverlapping(values.as_ptr(), data as *mut f32, values.len());
    Some(out)
}

unsafe fn call_extern_node(proxy_executor: ProxyExecutorHandle, tensor: TensorHandle) -> Status {
    let int_args = [EXTERN_SCALAR];
    let tensor_args = [tensor];
    shim::modelrunner_proxy_executor_call_function(
        proxy_executor,
        0,
        1,
        int_args.as_ptr(),
        1,
        tensor_args.as_ptr(),
    )
}

unsafe fn create_impl(
    out: *mut ContainerHandle,
    num_models: usize,
    device: *const c_char,
    cubin_dir: *const c_char,
    calls_extern_node: bool,
) -> Status {
    if out.is_null() || device.is_null() || num_models == 0 {
        return STATUS_FAILURE;
    }
    let device = CStr::from_ptr(device).to_string_lossy();
    if device != "cpu" && !device.starts_with("cuda") {
        return STATUS_FAILURE;
    }
    let cubin_dir = if cubin_dir.is_null() {
        String::new()
    } else {
        CStr::from_ptr(cubin_dir).to_string_lossy().into_owned()
    };
    let (w_pre, w_add) = reference_weights();
    let burned_in = Slot {
        folded: Some(w_pre.clone()),
        w_pre: Some(w_pre),
        w_add: Some(w_add),
    };
    let container = MockContainer {
        state: Mutex::new(State {
            slots: [burned_in, Slot::default()],
            active: 0,
        }),
        cubin_dir,
        calls_extern_node,
    };
    *out = Box::into_raw(Box::new(container)) as ContainerHandle;
    STATUS_SUCCESS
}

unsafe extern "C" fn create_with_device(
    out: *mut ContainerHandle,
    num_models: usize,
    device: *const c_char,
    cubin_dir: *const c_char,
) -> Status {
    create_impl(out, num_models, device, cubin_dir, false)
}

unsafe extern "C" fn create_with_extern_node(
    out: *mut ContainerHandle,
    num_models: usize,
    device: *const c_char,
    cubin_dir: *const c_char,
) -> Status {
    create_impl(out, num_models, device, cubin_dir, true)
}

unsafe extern "C" fn delete(handle: ContainerHandle) -> Status {
    if handle.is_null() {
        return STATUS_FAILURE;
    }
    let container = Box::from_raw(handle as *mut MockContainer);
    if let Ok(mut deleted) = DELETED.lock() {
        deleted.push(container.cubin_dir.clone());
    }
    STATUS_SUCCESS
}

unsafe extern "C" fn run(
    handle: ContainerHandle,
    inputs: *mut TensorHandle,
    num_inputs: usize,
    outputs: *mut TensorHandle,
    num_outputs: usize,
    _stream: StreamHandle,
    proxy_executor: ProxyExecutorHandle,
) -> Status {
    // Inputs are ours from here on, whatever happens.
    let handles: Vec<TensorHandle> = if inputs.is_null() {
        Vec::new()
    } else {
        std::slice::from_raw_parts_mut(inputs, num_inputs)
            .iter_mut()
            .map(|slot| std::mem::replace(slot, ptr::null_mut()))
            .collect()
    };
    let x = match handles.as_slice() {
        [single] => read_f32(*single),
        _ => None,
    };
    for handle in handles {
        shim::modelrunner_delete_tensor_object(handle);
    }
    let (Some(container), Some(x)) = (container(handle), x) else {
        return STATUS_FAILURE;
    };
    if num_outputs != 1 || outputs.is_null() {
        return STATUS_FAILURE;
    }
    let y = {
        let Ok(state) = container.state.lock() else {
            return STATUS_FAILURE;
        };
        let slot = &state.slots[state.active];
        let (Some(w_pre), Some(w_add)) = (slot.folded.as_ref(), slot.w_add.as_ref()) else {
            return STATUS_FAILURE;
        };
        reference_output(&x, w_pre, w_add)
    };
    let Some(out) = new_output(&y) else {
        return STATUS_FAILURE;
    };
    if container.calls_extern_node {
        let status = call_extern_node(proxy_executor, out);
        if status != STATUS_SUCCESS {
            shim::modelrunner_delete_tensor_object(out);
            return status;
        }
    }
    *outputs = out;
    STATUS_SUCCESS
}

unsafe extern "C" fn get_num_outputs(_handle: ContainerHandle, num_outputs: *mut usize) -> Status {
    *num_outputs = 1;
    STATUS_SUCCESS
}

unsafe extern "C" fn get_num_constants(_handle: ContainerHandle, num_constants: *mut usize) -> Status {
    *num_constants = CONSTANT_NAMES.len();
    STATUS_SUCCESS
}

unsafe extern "C" fn get_constant_name(
    _handle: ContainerHandle,
    idx: usize,
    name: *mut *const c_char,
) -> Status {
    match NAMES_C.get(idx) {
        Some(bytes) => {
            *name = bytes.as_ptr() as *const c_char;
            STATUS_SUCCESS
        }
        None => STATUS_FAILURE,
    }
}

unsafe extern "C" fn get_constant_original_fqn(
    _handle: ContainerHandle,
    idx: usize,
    fqn: *mut *const c_char,
) -> Status {
    match FQNS_C.get(idx) {
        Some(bytes) => {
            *fqn = bytes.as_ptr() as *const c_char;
            STATUS_SUCCESS
        }
        None => STATUS_FAILURE,
    }
}

unsafe extern "C" fn get_constant_dtype(_handle: ContainerHandle, idx: usize, dtype: *mut i32) -> Status {
    if idx >= CONSTANT_NAMES.len() {
        return STATUS_FAILURE;
    }
    *dtype = F32_CODE;
    STATUS_SUCCESS
}

unsafe fn write_constants(
    handle: ContainerHandle,
    map: ConstantMapHandle,
    use_inactive: bool,
    validate_full_update: bool,
) -> Status {
    let Some(container) = container(handle) else {
        return STATUS_FAILURE;
    };
    let Ok(mut state) = container.state.lock() else {
        return STATUS_FAILURE;
    };
    let idx = state.slot_index(use_inactive);
    for (name, bytes) in CONSTANT_NAMES.iter().zip(NAMES_C) {
        let mut tensor: TensorHandle = ptr::null_mut();
        if shim::modelrunner_constant_map_get(map, bytes.as_ptr() as *const c_char, &mut tensor)
            != STATUS_SUCCESS
        {
            return STATUS_FAILURE;
        }
        if tensor.is_null() {
            if validate_full_update {
                return STATUS_FAILURE;
            }
            continue;
        }
        let Some(values) = read_f32(tensor) else {
            return STATUS_FAILURE;
        };
        let slot = &mut state.slots[idx];
        match *name {
            "w_pre" => slot.w_pre = Some(values),
            _ => slot.w_add = Some(values),
        }
    }
    STATUS_SUCCESS
}

unsafe extern "C" fn update_constant_buffer(
    handle: ContainerHandle,
    map: ConstantMapHandle,
    use_inactive: bool,
    validate_full_update: bool,
) -> Status {
    write_constants(handle, map, use_inactive, validate_full_update)
}

unsafe extern "C" fn update_inactive_constant_buffer(
    handle: ContainerHandle,
    map: ConstantMapHandle,
) -> Status {
    write_constants(handle, map, true, false)
}

unsafe extern "C" fn run_constant_folding(
    handle: ContainerHandle,
    use_inactive: bool,
    _stream: StreamHandle,
    proxy_executor: ProxyExecutorHandle,
) -> Status {
    let Some(container) = container(handle) else {
        return STATUS_FAILURE;
    };
    let Ok(mut state) = container.state.lock() else {
        return STATUS_FAILURE;
    };
    let idx = state.slot_index(use_inactive);
    let Some(w_pre) = state.slots[idx].w_pre.clone() else {
        return STATUS_FAILURE;
    };
    if container.calls_extern_node {
        // The folded subgraph contains the extern node too; run it on a
        // scratch tensor through whatever executor the runner handed us.
        let Some(scratch) = new_output(&w_pre) else {
            return STATUS_FAILURE;
        };
        let status = call_extern_node(proxy_executor, scratch);
        shim::modelrunner_delete_tensor_object(scratch);
        if status != STATUS_SUCCESS {
            return status;
        }
    }
    state.slots[idx].folded = Some(w_pre);
    STATUS_SUCCESS
}

unsafe extern "C" fn swap_constant_buffer(handle: ContainerHandle) -> Status {
    let Some(container) = container(handle) else {
        return STATUS_FAILURE;
    };
    let Ok(mut state) = container.state.lock() else {
        return STATUS_FAILURE;
    };
    state.active = 1 - state.active;
    STATUS_SUCCESS
}

unsafe extern "C" fn free_inactive_constant_buffer(handle: ContainerHandle) -> Status {
    let Some(container) = container(handle) else {
        return STATUS_FAILURE;
    };
    let Ok(mut state) = container.state.lock() else {
        return STATUS_FAILURE;
    };
    let idx = state.slot_index(true);
    state.slots[idx] = Slot::default();
    STATUS_SUCCESS
}

unsafe extern "C" fn get_call_spec(
    _handle: ContainerHandle,
    in_spec: *mut *const c_char,
    out_spec: *mut *const c_char,
) -> Status {
    *in_spec = IN_SPEC_C.as_ptr() as *const c_char;
    *out_spec = OUT_SPEC_C.as_ptr() as *const c_char;
    STATUS_SUCCESS
}

/// Every entry point, including the optional one.
pub fn module() -> StaticModule {
    StaticModule::new("mock-artifact")
        .with_symbol(symbols::CREATE_WITH_DEVICE, create_with_device as abi::CreateWithDeviceFn as *const c_void)
        .with_symbol(symbols::DELETE, delete as abi::DeleteFn as *const c_void)
        .with_symbol(symbols::RUN, run as abi::RunFn as *const c_void)
        .with_symbol(symbols::RUN_SINGLE_THREADED, run as abi::RunFn as *const c_void)
        .with_symbol(symbols::GET_NUM_OUTPUTS, get_num_outputs as abi::GetNumOutputsFn as *const c_void)
        .with_symbol(
            symbols::GET_NUM_CONSTANTS,
            get_num_constants as abi::GetNumConstantsFn as *const c_void,
        )
        .with_symbol(
            symbols::GET_CONSTANT_NAME,
            get_constant_name as abi::GetConstantNameFn as *const c_void,
        )
        .with_symbol(
            symbols::GET_CONSTANT_ORIGINAL_FQN,
            get_constant_original_fqn as abi::GetConstantOriginalFqnFn as *const c_void,
        )
        .with_symbol(
            symbols::GET_CONSTANT_DTYPE,
            get_constant_dtype as abi::GetConstantDtypeFn as *const c_void,
        )
        .with_symbol(
            symbols::UPDATE_CONSTANT_BUFFER,
            update_constant_buffer as abi::UpdateConstantBufferFn as *const c_void,
        )
        .with_symbol(
            symbols::UPDATE_INACTIVE_CONSTANT_BUFFER,
            update_inactive_constant_buffer as abi::UpdateInactiveConstantBufferFn as *const c_void,
        )
        .with_symbol(
            symbols::RUN_CONSTANT_FOLDING,
            run_constant_folding as abi::RunConstantFoldingFn as *const c_void,
        )
        .with_symbol(
            symbols::SWAP_CONSTANT_BUFFER,
            swap_constant_buffer as abi::SwapConstantBufferFn as *const c_void,
        )
        .with_symbol(
            symbols::FREE_INACTIVE_CONSTANT_BUFFER,
            free_inactive_constant_buffer as abi::FreeInactiveConstantBufferFn as *const c_void,
        )
        .with_symbol(symbols::GET_CALL_SPEC, get_call_spec as abi::GetCallSpecFn as *const c_void)
}

/// The full module with one entry point left out.
pub fn module_without(symbol: &str) -> StaticModule {
    let mut module = module();
    module.remove(symbol);
    module
}

/// A module whose `run` and constant folding dispatch extern node 0 through
/// the proxy executor, with the node list at `sidecar` when given.
pub fn module_with_extern_node(sidecar: Option<&Path>) -> StaticModule {
    let mut module = module();
    module.insert(
        symbols::CREATE_WITH_DEVICE,
        create_with_extern_node as abi::CreateWithDeviceFn as *const c_void,
    );
    match sidecar {
        Some(path) => module.with_sidecar(path),
        None => module,
    }
}

/// Sidecar contents naming the single extern node the mock dispatches.
pub fn sidecar_json() -> String {
    format!(
        "{{\"nodes\": [{{\"name\": \"add_scalar_0\", \"node\": {{\"target\": \"{}\", \"inputs\": []}}}}]}}",
        EXTERN_TARGET
    )
}
