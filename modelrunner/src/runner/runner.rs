//! The model-container runner.
//!
//! A runner owns a loaded artifact, its resolved entry points and the container
//! created from them. The container holds two constant-buffer slots: `run`
//! always reads the active one, maintenance writes usually target the inactive
//! one, and `swap_constant_buffer` flips which is which. The safe rotation is
//! update inactive, fold inactive (when the artifact folds constants), swap.
//!
//! There is no locking in here. `swap_constant_buffer` and
//! `free_inactive_constant_buffer` take `&mut self`, so a caller sharing a
//! runner behind a readers-writer lock gets exactly the required discipline:
//! concurrent `run`s and inactive-slot maintenance under the read side, the
//! swap under the write side.
use std::collections::HashMap;
use std::ffi::{c_char, CStr};
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

use once_cell::sync::OnceCell;

use crate::abi::{symbols, ContainerHandle, ProxyExecutorHandle, StreamHandle, TensorHandle};
use crate::config::RunnerOptions;
use crate::constants::ConstantMap;
use crate::container::Container;
use crate::error::{check_status, Result, RunnerError};
use crate::loader::{Capability, DynamicModule, SymbolSource, SymbolTable};
use crate::marshal;
use crate::proxy_executor::{ProxyExecutorSlot, SidecarProxyExecutor};
use crate::tensor::{DType, Tensor};

use super::variant::{RunVariant, SingleThreaded, Threaded};

/// Structural descriptions of the artifact's inputs and outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSpec {
    pub inputs: String,
    pub outputs: String,
}

pub struct ModelContainerRunner<V: RunVariant = Threaded> {
    // Field order is drop order: the container must be deleted while the
    // artifact is still loaded.
    container: Container,
    proxy_executor: Option<Box<ProxyExecutorSlot>>,
    symbols: SymbolTable,
    constant_names: OnceCell<Vec<String>>,
    call_spec: OnceCell<CallSpec>,
    device: String,
    num_models: usize,
    source: Box<dyn SymbolSource + Send + Sync>,
    _variant: PhantomData<V>,
}

// The container handle is only ever passed back to the artifact that created
// it, and the artifact ABI allows that from any thread.
unsafe impl<V: RunVariant> Send for ModelContainerRunner<V> {}
// Concurrent calls are allowed only through the threaded run entry point.
unsafe impl Sync for ModelContainerRunner<Threaded> {}

impl ModelContainerRunner<Threaded> {
    /// Open the artifact at `path` with the threaded run entry point.
    pub fn new(path: impl AsRef<Path>, options: &RunnerOptions) -> Result<Self> {
        Self::with_variant(path, options)
    }

    /// Open the artifact at `path` on `cpu` with default options.
    pub fn cpu(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_variant(path, &RunnerOptions::cpu())
    }
}

impl ModelContainerRunner<SingleThreaded> {
    pub fn new_single_threaded(path: impl AsRef<Path>, options: &RunnerOptions) -> Result<Self> {
        Self::with_variant(path, options)
    }
}

impl<V: RunVariant> ModelContainerRunner<V> {
    pub fn with_variant(path: impl AsRef<Path>, options: &RunnerOptions) -> Result<Self> {
        let module = DynamicModule::open(path)?;
        Self::from_source(Box::new(module), options)
    }

    /// Build a runner over any symbol source.
    ///
    /// Every mandatory entry point is resolved before the artifact is asked to
    /// create its container, so a missing symbol never leaves half-built state
    /// behind.
    pub fn from_source(
        source: Box<dyn SymbolSource + Send + Sync>,
        options: &RunnerOptions,
    ) -> Result<Self> {
        options
            .validate()
            .map_err(|err| RunnerError::Config(err.to_string()))?;
        if options.single_threaded != V::SINGLE_THREADED {
            crate::warning!(
                "options request single_threaded={} but the runner type selects the {} entry point",
                options.single_threaded,
                V::NAME
            );
        }

        let symbols = SymbolTable::resolve(source.as_ref(), V::SINGLE_THREADED)?;

        let proxy_executor = match source.sidecar_config() {
            Some(config) => {
                let executor = SidecarProxyExecutor::load_from_file(
                    &config,
                    options.is_cpu(),
                    options.custom_ops.clone(),
                )?;
                Some(ProxyExecutorSlot::new(Box::new(executor)))
            }
            None => {
                crate::debug!("no proxy executor config for {}", source.describe());
                None
            }
        };

        let container = Container::create(
            &symbols,
            options.num_models,
            &options.device,
            options.cubin_dir.as_deref(),
        )?;

        crate::trace!(
            "runner ready for {} ({} run, proxy executor {})",
            source.describe(),
            V::NAME,
            if proxy_executor.is_some() { "loaded" } else { "absent" }
        );
        Ok(Self {
            container,
            proxy_executor,
            symbols,
            constant_names: OnceCell::new(),
            call_spec: OnceCell::new(),
            device: options.device.clone(),
            num_models: options.num_models,
            source,
            _variant: PhantomData,
        })
    }

    fn handle(&self) -> ContainerHandle {
        self.container.handle()
    }

    fn proxy_handle(&self) -> ProxyExecutorHandle {
        self.proxy_executor
            .as_ref()
            .map_or(std::ptr::null_mut(), |slot| slot.handle())
    }

    /// Run inference; the caller keeps its input tensors.
    ///
    /// Input handles share storage with `inputs`. Outputs are allocated by
    /// the artifact and returned in artifact-defined order.
    pub fn run(&self, inputs: &[Tensor], stream: Option<StreamHandle>) -> Result<Vec<Tensor>> {
        let handles = marshal::new_handles_from_tensors(inputs);
        self.run_impl(handles, stream)
    }

    /// Run inference, consuming the inputs so no extra references outlive
    /// the call.
    pub fn boxed_run(&self, inputs: Vec<Tensor>, stream: Option<StreamHandle>) -> Result<Vec<Tensor>> {
        let handles = marshal::handles_from_tensors(inputs);
        self.run_impl(handles, stream)
    }

    fn run_impl(&self, mut inputs: Vec<TensorHandle>, stream: Option<StreamHandle>) -> Result<Vec<Tensor>> {
        let num_outputs = match self.num_outputs() {
            Ok(n) => n,
            Err(err) => {
                // The artifact never saw these handles, so they are still ours.
                for handle in inputs {
                    unsafe { marshal::delete_handle(handle) };
                }
                return Err(err);
            }
        };
        // Only the handle array is allocated here; output storage comes from
        // the artifact.
        let mut outputs: Vec<TensorHandle> = vec![std::ptr::null_mut(); num_outputs];
        crate::debug!(
            "{}: {} inputs, {} outputs",
            self.symbols.run_symbol,
            inputs.len(),
            num_outputs
        );
        // Input handles belong to the artifact from here on, success or not.
        let status = unsafe {
            (self.symbols.run)(
                self.handle(),
                inputs.as_mut_ptr(),
                inputs.len(),
                outputs.as_mut_ptr(),
                outputs.len(),
                stream.unwrap_or(std::ptr::null_mut()),
                self.proxy_handle(),
            )
        };
        if let Err(err) = check_status(self.symbols.run_symbol, status) {
            // Release whatever outputs the artifact managed to hand over.
            let _ = unsafe { marshal::steal_tensors_from_handles(&mut outputs) };
            return Err(err);
        }
        unsafe { marshal::steal_tensors_from_handles(&mut outputs) }
    }

    pub fn num_outputs(&self) -> Result<usize> {
        let mut num_outputs = 0usize;
        let status = unsafe { (self.symbols.get_num_outputs)(self.handle(), &mut num_outputs) };
        check_status(symbols::GET_NUM_OUTPUTS, status)?;
        Ok(num_outputs)
    }

    pub fn num_constants(&self) -> Result<usize> {
        let mut num_constants = 0usize;
        let status = unsafe { (self.symbols.get_num_constants)(self.handle(), &mut num_constants) };
        check_status(symbols::GET_NUM_CONSTANTS, status)?;
        Ok(num_constants)
    }

    fn constant_name(&self, idx: usize) -> Result<String> {
        let mut name: *const c_char = std::ptr::null();
        let status = unsafe { (self.symbols.get_constant_name)(self.handle(), idx, &mut name) };
        check_status(symbols::GET_CONSTANT_NAME, status)?;
        unsafe { owned_c_str(symbols::GET_CONSTANT_NAME, name) }
    }

    fn constant_original_fqn(&self, idx: usize) -> Result<String> {
        let mut fqn: *const c_char = std::ptr::null();
        let status =
            unsafe { (self.symbols.get_constant_original_fqn)(self.handle(), idx, &mut fqn) };
        check_status(symbols::GET_CONSTANT_ORIGINAL_FQN, status)?;
        unsafe { owned_c_str(symbols::GET_CONSTANT_ORIGINAL_FQN, fqn) }
    }

    fn constant_dtype(&self, idx: usize) -> Result<DType> {
        let mut code = 0i32;
        let status = unsafe { (self.symbols.get_constant_dtype)(self.handle(), idx, &mut code) };
        check_status(symbols::GET_CONSTANT_DTYPE, status)?;
        DType::from_code(code).map_err(|err| RunnerError::Marshal(err.to_string()))
    }

    /// Constant names in artifact index order. The set is fixed when the
    /// artifact is compiled, so it is queried once and cached.
    pub fn constant_names(&self) -> Result<&[String]> {
        let names = self.constant_names.get_or_try_init(|| {
            (0..self.num_constants()?)
                .map(|idx| self.constant_name(idx))
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(names)
    }

    pub fn constant_names_to_original_fqns(&self) -> Result<HashMap<String, String>> {
        let mut result = HashMap::new();
        for idx in 0..self.num_constants()? {
            result.insert(self.constant_name(idx)?, self.constant_original_fqn(idx)?);
        }
        Ok(result)
    }

    pub fn constant_names_to_dtypes(&self) -> Result<HashMap<String, DType>> {
        let mut result = HashMap::new();
        for idx in 0..self.num_constants()? {
            result.insert(self.constant_name(idx)?, self.constant_dtype(idx)?);
        }
        Ok(result)
    }

    /// Write `constants` into the active (`use_inactive == false`) or inactive
    /// slot.
    ///
    /// With `check_full_update` the map must name every constant the artifact
    /// knows and nothing else. That is verified here before the artifact is
    /// called, so a rejected update never touches the slot.
    ///
    /// "Every constant" means every name the artifact reports through its
    /// constant count, including constants it would otherwise derive by
    /// folding. An artifact's own full-update check may skip those, so this
    /// check rejects some maps the artifact alone would accept. Callers that
    /// only supply raw constants should pass `check_full_update = false` and
    /// run constant folding afterwards.
    ///
    /// Writing the active slot while `run` is in flight on another thread is
    /// allowed by the ABI; ordering the two is up to the caller.
    pub fn update_constant_buffer(
        &self,
        constants: &ConstantMap<'_>,
        use_inactive: bool,
        check_full_update: bool,
    ) -> Result<()> {
        if check_full_update {
            self.check_full_update(constants)?;
        }
        let status = unsafe {
            (self.symbols.update_constant_buffer)(
                self.handle(),
                constants.as_handle(),
                use_inactive,
                check_full_update,
            )
        };
        check_status(symbols::UPDATE_CONSTANT_BUFFER, status)?;
        crate::trace!(
            "updated {} constants in the {} buffer",
            constants.len(),
            if use_inactive { "inactive" } else { "active" }
        );
        Ok(())
    }

    fn check_full_update(&self, constants: &ConstantMap<'_>) -> Result<()> {
        let known = self.constant_names()?;
        let missing = constants.missing_from(known.iter().map(String::as_str));
        if !missing.is_empty() {
            return Err(RunnerError::ConstantBufferIncomplete { missing });
        }
        let unknown: Vec<String> = constants
            .names()
            .filter(|name| !known.iter().any(|k| k == name))
            .map(str::to_string)
            .collect();
        if !unknown.is_empty() {
            return Err(RunnerError::UnknownConstants { names: unknown });
        }
        Ok(())
    }

    /// Write `constants` into the inactive slot without full-update checking.
    pub fn update_inactive_constant_buffer(&self, constants: &ConstantMap<'_>) -> Result<()> {
        let status = unsafe {
            (self.symbols.update_inactive_constant_buffer)(self.handle(), constants.as_handle())
        };
        check_status(symbols::UPDATE_INACTIVE_CONSTANT_BUFFER, status)?;
        crate::trace!("updated {} constants in the inactive buffer", constants.len());
        Ok(())
    }

    /// Recompute folded constants from the raw constants in the chosen slot.
    ///
    /// Needed after writing raw constants and before they are swapped into
    /// service, or `run` keeps serving stale folded values.
    pub fn run_const_fold(&self, use_inactive: bool, stream: Option<StreamHandle>) -> Result<()> {
        let status = unsafe {
            (self.symbols.run_constant_folding)(
                self.handle(),
                use_inactive,
                stream.unwrap_or(std::ptr::null_mut()),
                self.proxy_handle(),
            )
        };
        check_status(symbols::RUN_CONSTANT_FOLDING, status)
    }

    /// Make the inactive slot active and vice versa.
    ///
    /// Every `run` issued after this returns reads the newly active slot.
    pub fn swap_constant_buffer(&mut self) -> Result<()> {
        let status = unsafe { (self.symbols.swap_constant_buffer)(self.handle()) };
        check_status(symbols::SWAP_CONSTANT_BUFFER, status)?;
        crate::trace!("swapped constant buffers");
        Ok(())
    }

    /// Release the inactive slot's storage. A later update into it allocates
    /// again.
    pub fn free_inactive_constant_buffer(&mut self) -> Result<()> {
        let free = self.symbols.free_inactive_constant_buffer.ok_or(
            RunnerError::CapabilityUnavailable {
                capability: Capability::FreeInactiveConstantBuffer.name(),
            },
        )?;
        let status = unsafe { free(self.handle()) };
        check_status(symbols::FREE_INACTIVE_CONSTANT_BUFFER, status)
    }

    pub fn call_spec(&self) -> Result<&CallSpec> {
        self.call_spec.get_or_try_init(|| {
            let mut in_spec: *const c_char = std::ptr::null();
            let mut out_spec: *const c_char = std::ptr::null();
            let status =
                unsafe { (self.symbols.get_call_spec)(self.handle(), &mut in_spec, &mut out_spec) };
            check_status(symbols::GET_CALL_SPEC, status)?;
            Ok(CallSpec {
                inputs: unsafe { owned_c_str(symbols::GET_CALL_SPEC, in_spec)? },
                outputs: unsafe { owned_c_str(symbols::GET_CALL_SPEC, out_spec)? },
            })
        })
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.symbols.has(capability)
    }

    pub fn has_proxy_executor(&self) -> bool {
        self.proxy_executor.is_some()
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn num_models(&self) -> usize {
        self.num_models
    }

    pub fn artifact(&self) -> String {
        self.source.describe()
    }
}

impl<V: RunVariant> fmt::Debug for ModelContainerRunner<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelContainerRunner")
            .field("artifact", &self.source.describe())
            .field("variant", &V::NAME)
            .field("device", &self.device)
            .field("num_models", &self.num_models)
            .field("symbols", &self.symbols)
            .field("proxy_executor", &self.proxy_executor.is_some())
            .finish()
    }
}

unsafe fn owned_c_str(call: &'static str, ptr: *const c_char) -> Result<String> {
    if ptr.is_null() {
        return Err(RunnerError::Marshal(format!("{} returned a null string", call)));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(str::to_string)
        .map_err(|err| RunnerError::Marshal(format!("{} returned invalid utf-8: {}", call, err)))
}
