use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};

use libloading::Library;

use crate::error::{Result, RunnerError};

/// Something that can hand out entry-point addresses by name.
pub trait SymbolSource {
    /// Human-readable identity used in errors and logs.
    fn describe(&self) -> String;

    /// Address of `name`, or `None` when the source does not export it.
    fn resolve(&self, name: &str) -> Option<*const c_void>;

    /// Proxy-executor configuration that ships alongside this source.
    fn sidecar_config(&self) -> Option<PathBuf> {
        None
    }
}

/// `P.ext` -> `P.json`, replacing only the final extension.
pub fn sidecar_config_path(path: &Path) -> PathBuf {
    path.with_extension("json")
}

/// A shared object opened from disk.
///
/// Resolved function pointers stay valid only while this value is alive, so
/// the runner keeps it for as long as it keeps the symbol table.
#[derive(Debug)]
pub struct DynamicModule {
    path: PathBuf,
    library: Library,
}

impl DynamicModule {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        // Loading runs the module's initialisers; that is the artifact contract.
        let library = unsafe { Library::new(&path) }.map_err(|source| RunnerError::Load {
            path: path.clone(),
            source,
        })?;
        crate::trace!("opened model artifact {}", path.display());
        Ok(Self { path, library })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SymbolSource for DynamicModule {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn resolve(&self, name: &str) -> Option<*const c_void> {
        let symbol = unsafe { self.library.get::<*const c_void>(name.as_bytes()) };
        match symbol {
            Ok(symbol) => Some(*symbol),
            Err(err) => {
                crate::debug!("dlsym {} in {}: {}", name, self.path.display(), err);
                None
            }
        }
    }

    fn sidecar_config(&self) -> Option<PathBuf> {
        let candidate = sidecar_config_path(&self.path);
        candidate.is_file().then_some(candidate)
    }
}

/// Entry points registered in-process, for artifacts linked into the binary.
#[derive(Debug, Default)]
pub struct StaticModule {
    name: String,
    symbols: HashMap<String, usize>,
    sidecar: Option<PathBuf>,
}

impl StaticModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Register an entry point; pass a function pointer cast to `*const c_void`.
    pub fn with_symbol(mut self, name: impl Into<String>, address: *const c_void) -> Self {
        self.insert(name, address);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, address: *const c_void) {
        self.symbols.insert(name.into(), address as usize);
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.symbols.remove(name).is_some()
    }

    pub fn with_sidecar(mut self, path: impl Into<PathBuf>) -> Self {
        self.sidecar = Some(path.into());
        self
    }
}

impl SymbolSource for StaticModule {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn resolve(&self, name: &str) -> Option<*const c_void> {
        self.symbols
            .get(name)
            .copied()
            .filter(|address| *address != 0)
            .map(|address| address as *const c_void)
    }

    fn sidecar_config(&self) -> Option<PathBuf> {
        self.sidecar.clone().filter(|path| path.is_file())
    }
}
