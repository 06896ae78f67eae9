use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::proxy_executor::CustomOpRegistry;

pub const DEVICE_ENV: &str = "MODELRUNNER_DEVICE";
pub const NUM_MODELS_ENV: &str = "MODELRUNNER_NUM_MODELS";
pub const CUBIN_DIR_ENV: &str = "MODELRUNNER_CUBIN_DIR";
pub const SINGLE_THREADED_ENV: &str = "MODELRUNNER_SINGLE_THREADED";

/// Construction options for a runner.
///
/// `single_threaded` is only consulted by [`crate::RunnerRegistry`], which maps
/// it onto the runner's run-variant type parameter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerOptions {
    /// Device string passed to the artifact, e.g. `cpu` or `cuda:0`.
    pub device: String,
    /// Number of model copies the container may run concurrently.
    pub num_models: usize,
    /// Directory holding device kernels the artifact loads lazily.
    pub cubin_dir: Option<PathBuf>,
    pub single_threaded: bool,
    /// Host kernels for extern nodes listed in the sidecar config.
    #[serde(skip)]
    pub custom_ops: Arc<CustomOpRegistry>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            device: "cpu".to_string(),
            num_models: 1,
            cubin_dir: None,
            single_threaded: false,
            custom_ops: Arc::new(CustomOpRegistry::default()),
        }
    }
}

impl RunnerOptions {
    pub fn cpu() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    pub fn with_num_models(mut self, num_models: usize) -> Self {
        self.num_models = num_models;
        self
    }

    pub fn with_cubin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cubin_dir = Some(dir.into());
        self
    }

    pub fn with_custom_ops(mut self, ops: CustomOpRegistry) -> Self {
        self.custom_ops = Arc::new(ops);
        self
    }

    pub fn single_threaded(mut self, single_threaded: bool) -> Self {
        self.single_threaded = single_threaded;
        self
    }

    /// Defaults overridden by `MODELRUNNER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Self::from_env`] with an injectable variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();
        if let Some(device) = lookup(DEVICE_ENV) {
            options.device = device.trim().to_string();
        }
        if let Some(raw) = lookup(NUM_MODELS_ENV) {
            options.num_models = raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("parse {}={}", NUM_MODELS_ENV, raw))?;
        }
        if let Some(dir) = lookup(CUBIN_DIR_ENV) {
            let dir = dir.trim();
            if !dir.is_empty() {
                options.cubin_dir = Some(PathBuf::from(dir));
            }
        }
        if let Some(raw) = lookup(SINGLE_THREADED_ENV) {
            options.single_threaded = parse_flag(&raw)
                .ok_or_else(|| anyhow!("parse {}={}: expected a boolean", SINGLE_THREADED_ENV, raw))?;
        }
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runner options at {}", path.display()))?;
        let options: Self = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse runner options at {}", path.display()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.trim().is_empty() {
            return Err(anyhow!("device string must not be empty"));
        }
        if self.num_models == 0 {
            return Err(anyhow!("num_models must be at least 1"));
        }
        Ok(())
    }

    pub fn is_cpu(&self) -> bool {
        self.device == "cpu"
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
