use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::config::RunnerOptions;
use crate::error::{Result, RunnerError};

use super::model_runner::ModelRunner;
use super::runner::ModelContainerRunner;
use super::variant::{SingleThreaded, Threaded};

pub type RunnerConstructor =
    Box<dyn Fn(&Path, &RunnerOptions) -> Result<Box<dyn ModelRunner>> + Send + Sync>;

/// Device type to runner constructor.
///
/// Built explicitly and passed to whatever needs to create runners by name;
/// nothing is registered behind the caller's back.
#[derive(Default)]
pub struct RunnerRegistry {
    constructors: HashMap<String, RunnerConstructor>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `cpu` constructor installed.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("cpu", open_runner);
        registry
    }

    /// Install `constructor` for `device_type`, returning any it replaced.
    pub fn register<F>(&mut self, device_type: impl Into<String>, constructor: F) -> Option<RunnerConstructor>
    where
        F: Fn(&Path, &RunnerOptions) -> Result<Box<dyn ModelRunner>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(device_type.into(), Box::new(constructor))
    }

    pub fn contains(&self, device_type: &str) -> bool {
        self.constructors.contains_key(device_type)
    }

    pub fn device_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build a runner for `options.device`, dispatching on its device type.
    pub fn create(&self, path: impl AsRef<Path>, options: &RunnerOptions) -> Result<Box<dyn ModelRunner>> {
        let device_type = device_type(&options.device);
        let constructor = self
            .constructors
            .get(device_type)
            .ok_or_else(|| RunnerError::UnknownDevice(options.device.clone()))?;
        crate::trace!(
            "creating {} runner for {}",
            device_type,
            path.as_ref().display()
        );
        constructor(path.as_ref(), options)
    }
}

impl fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerRegistry")
            .field("device_types", &self.device_types())
            .finish()
    }
}

/// `cuda:0` -> `cuda`.
pub fn device_type(device: &str) -> &str {
    device.split(':').next().unwrap_or(device).trim()
}

/// Open a shared-object artifact, picking the run variant from
/// `options.single_threaded`.
pub fn open_runner(path: &Path, options: &RunnerOptions) -> Result<Box<dyn ModelRunner>> {
    if options.single_threaded {
        Ok(Box::new(ModelContainerRunner::<SingleThreaded>::with_variant(path, options)?))
    } else {
        Ok(Box::new(ModelContainerRunner::<Threaded>::with_variant(path, options)?))
    }
}
