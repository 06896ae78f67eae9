use std::ffi::c_void;
use std::fmt;

use crate::abi::{self, symbols};
use crate::error::{Result, RunnerError};

use super::SymbolSource;

/// Entry points an artifact may legitimately omit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    FreeInactiveConstantBuffer,
}

impl Capability {
    pub fn symbol(self) -> &'static str {
        match self {
            Capability::FreeInactiveConstantBuffer => symbols::FREE_INACTIVE_CONSTANT_BUFFER,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Capability::FreeInactiveConstantBuffer => "free_inactive_constant_buffer",
        }
    }
}

macro_rules! load_symbol {
    ($source:expr, $ty:ty, $name:expr) => {{
        let address = $source
            .resolve($name)
            .ok_or_else(|| RunnerError::MissingSymbol {
                artifact: $source.describe(),
                symbol: $name,
            })?;
        // The artifact ABI fixes the signature behind each exported name.
        unsafe { std::mem::transmute::<*const c_void, $ty>(address) }
    }};
}

macro_rules! try_load_symbol {
    ($source:expr, $ty:ty, $name:expr) => {{
        match $source.resolve($name) {
            Some(address) => Some(unsafe { std::mem::transmute::<*const c_void, $ty>(address) }),
            None => {
                crate::warning!("could not resolve {} in {}", $name, $source.describe());
                None
            }
        }
    }};
}

/// Typed entry points resolved once at load time.
///
/// Mandatory slots are plain function pointers, so a table that exists is
/// complete; optional slots are `Option`s checked at call time. The table is
/// only meaningful while the source it was resolved from is alive.
#[derive(Clone, Copy)]
pub struct SymbolTable {
    pub(crate) create_with_device: abi::CreateWithDeviceFn,
    pub(crate) delete: abi::DeleteFn,
    pub(crate) run: abi::RunFn,
    pub(crate) run_symbol: &'static str,
    pub(crate) get_num_outputs: abi::GetNumOutputsFn,
    pub(crate) get_num_constants: abi::GetNumConstantsFn,
    pub(crate) get_constant_name: abi::GetConstantNameFn,
    pub(crate) get_constant_original_fqn: abi::GetConstantOriginalFqnFn,
    pub(crate) get_constant_dtype: abi::GetConstantDtypeFn,
    pub(crate) update_constant_buffer: abi::UpdateConstantBufferFn,
    pub(crate) update_inactive_constant_buffer: abi::UpdateInactiveConstantBufferFn,
    pub(crate) run_constant_folding: abi::RunConstantFoldingFn,
    pub(crate) swap_constant_buffer: abi::SwapConstantBufferFn,
    pub(crate) get_call_spec: abi::GetCallSpecFn,
    pub(crate) free_inactive_constant_buffer: Option<abi::FreeInactiveConstantBufferFn>,
}

impl SymbolTable {
    /// Resolve every entry point, failing on the first missing mandatory one.
    pub fn resolve(source: &dyn SymbolSource, single_threaded: bool) -> Result<Self> {
        let run_symbol = if single_threaded {
            symbols::RUN_SINGLE_THREADED
        } else {
            symbols::RUN
        };
        let table = Self {
            create_with_device: load_symbol!(source, abi::CreateWithDeviceFn, symbols::CREATE_WITH_DEVICE),
            delete: load_symbol!(source, abi::DeleteFn, symbols::DELETE),
            run: load_symbol!(source, abi::RunFn, run_symbol),
            run_symbol,
            get_num_outputs: load_symbol!(source, abi::GetNumOutputsFn, symbols::GET_NUM_OUTPUTS),
            get_num_constants: load_symbol!(
                source,
                abi::GetNumConstantsFn,
                symbols::GET_NUM_CONSTANTS
            ),
            get_constant_name: load_symbol!(
                source,
                abi::GetConstantNameFn,
                symbols::GET_CONSTANT_NAME
            ),
            get_constant_original_fqn: load_symbol!(
                source,
                abi::GetConstantOriginalFqnFn,
                symbols::GET_CONSTANT_ORIGINAL_FQN
            ),
            get_constant_dtype: load_symbol!(
                source,
                abi::GetConstantDtypeFn,
                symbols::GET_CONSTANT_DTYPE
            ),
            update_constant_buffer: load_symbol!(
                source,
                abi::UpdateConstantBufferFn,
                symbols::UPDATE_CONSTANT_BUFFER
            ),
            update_inactive_constant_buffer: load_symbol!(
                source,
                abi::UpdateInactiveConstantBufferFn,
                symbols::UPDATE_INACTIVE_CONSTANT_BUFFER
            ),
            run_constant_folding: load_symbol!(
                source,
                abi::RunConstantFoldingFn,
                symbols::RUN_CONSTANT_FOLDING
            ),
            swap_constant_buffer: load_symbol!(
                source,
                abi::SwapConstantBufferFn,
                symbols::SWAP_CONSTANT_BUFFER
            ),
            get_call_spec: load_symbol!(source, abi::GetCallSpecFn, symbols::GET_CALL_SPEC),
            free_inactive_constant_buffer: try_load_symbol!(
                source,
                abi::FreeInactiveConstantBufferFn,
                symbols::FREE_INACTIVE_CONSTANT_BUFFER
            ),
        };
        crate::trace!(
            "resolved entry points from {} (run via {})",
            source.describe(),
            run_symbol
        );
        Ok(table)
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::FreeInactiveConstantBuffer => self.free_inactive_constant_buffer.is_some(),
        }
    }

    pub fn run_symbol(&self) -> &'static str {
        self.run_symbol
    }
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolTable")
            .field("run_symbol", &self.run_symbol)
            .field(
                "free_inactive_constant_buffer",
                &self.has(Capability::FreeInactiveConstantBuffer),
            )
            .finish_non_exhaustive()
    }
}
