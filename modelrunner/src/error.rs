use std::path::PathBuf;

use thiserror::Error;

use crate::abi::Status;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to load model artifact {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("artifact {artifact} does not export mandatory symbol {symbol}")]
    MissingSymbol { artifact: String, symbol: &'static str },
    #[error("no {capability} in artifact! Consider rebuilding the artifact with the latest package")]
    CapabilityUnavailable { capability: &'static str },
    #[error("API call failed at {call}, status code {code}")]
    RuntimeInvocation { call: &'static str, code: Status },
    #[error("constant map is missing required constants: {}", missing.join(", "))]
    ConstantBufferIncomplete { missing: Vec<String> },
    #[error("constant map names constants the artifact does not know: {}", names.join(", "))]
    UnknownConstants { names: Vec<String> },
    #[error("tensor marshaling failed: {0}")]
    Marshal(String),
    #[error("invalid runner configuration: {0}")]
    Config(String),
    #[error("no runner registered for device {0}")]
    UnknownDevice(String),
    #[error("proxy executor: {0:#}")]
    ProxyExecutor(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RunnerError>;

/// Map an entry-point status to a `Result`, naming the call on failure.
pub(crate) fn check_status(call: &'static str, code: Status) -> Result<()> {
    if code == crate::abi::STATUS_SUCCESS {
        Ok(())
    } else {
        crate::error!("{} returned status {}", call, code);
        Err(RunnerError::RuntimeInvocation { call, code })
    }
}
