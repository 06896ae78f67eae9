mod module;
mod symbols;

pub use module::{sidecar_config_path, DynamicModule, StaticModule, SymbolSource};
pub use symbols::{Capability, SymbolTable};
