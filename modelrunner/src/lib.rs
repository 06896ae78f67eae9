pub mod abi;
pub mod logging;
pub mod marshal;
pub mod shim;

mod config;
mod constants;
mod container;
mod error;
mod loader;
mod proxy_executor;
mod random;
mod runner;
mod tensor;

pub use abi::StreamHandle;
pub use config::{
    RunnerOptions, CUBIN_DIR_ENV, DEVICE_ENV, NUM_MODELS_ENV, SINGLE_THREADED_ENV,
};
pub use constants::ConstantMap;
pub use error::{Result, RunnerError};
pub use loader::{sidecar_config_path, Capability, DynamicModule, StaticModule, SymbolSource, SymbolTable};
pub use proxy_executor::{
    CustomKernel, CustomOpRegistry, ExternKernelNode, ProxyExecutor, SidecarProxyExecutor,
};
pub use random::{Random, RandomValue};
pub use runner::{
    device_type, open_runner, CallSpec, ModelContainerRunner, ModelRunner, RunVariant,
    RunnerConstructor, RunnerRegistry, SingleThreaded, Threaded,
};
pub use tensor::{compute_strides, numel, DType, Tensor, TensorElement};
