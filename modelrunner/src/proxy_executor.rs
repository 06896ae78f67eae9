//! Custom-operator dispatch for artifacts that call back out of compiled code.
//!
//! An artifact refers to each fallback operator by an extern-node index. The
//! sidecar JSON next to the artifact lists those nodes; the executor resolves
//! a node's target name against a [`CustomOpRegistry`] of host kernels.
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::abi::ProxyExecutorHandle;
use crate::tensor::Tensor;

/// Host kernel for a custom operator; outputs are written into tensor args.
pub type CustomKernel = Box<dyn Fn(&[i64], &[&Tensor]) -> Result<()> + Send + Sync>;

#[derive(Default)]
pub struct CustomOpRegistry {
    kernels: HashMap<String, CustomKernel>,
}

impl CustomOpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, target: impl Into<String>, kernel: F) -> Option<CustomKernel>
    where
        F: Fn(&[i64], &[&Tensor]) -> Result<()> + Send + Sync + 'static,
    {
        self.kernels.insert(target.into(), Box::new(kernel))
    }

    pub fn get(&self, target: &str) -> Option<&CustomKernel> {
        self.kernels.get(target)
    }

    pub fn contains(&self, target: &str) -> bool {
        self.kernels.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}

impl fmt::Debug for CustomOpRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.kernels.keys().collect();
        names.sort();
        f.debug_struct("CustomOpRegistry").field("kernels", &names).finish()
    }
}

/// Resolves extern nodes referenced by an artifact.
pub trait ProxyExecutor: Send + Sync {
    fn call_function(&self, node_index: usize, int_args: &[i64], tensor_args: &[&Tensor]) -> Result<()>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExternKernelNode {
    pub name: String,
    #[serde(default)]
    pub node: Value,
}

impl ExternKernelNode {
    /// Operator target, falling back to the node name.
    pub fn target(&self) -> &str {
        self.node
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or(self.name.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct ExternKernelNodes {
    #[serde(default)]
    nodes: Vec<ExternKernelNode>,
}

pub struct SidecarProxyExecutor {
    path: PathBuf,
    nodes: Vec<ExternKernelNode>,
    is_cpu: bool,
    ops: Arc<CustomOpRegistry>,
}

impl SidecarProxyExecutor {
    pub fn load_from_file(
        path: impl AsRef<Path>,
        is_cpu: bool,
        ops: Arc<CustomOpRegistry>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read proxy executor config at {}", path.display()))?;
        let parsed: ExternKernelNodes = serde_json::from_str(&contents).with_context(|| {
            format!("failed to parse proxy executor config at {}", path.display())
        })?;
        for node in &parsed.nodes {
            if !ops.contains(node.target()) {
                crate::warning!(
                    "extern node {} targets {} which has no registered kernel",
                    node.name,
                    node.target()
                );
            }
        }
        crate::trace!(
            "proxy executor loaded {} extern nodes from {}",
            parsed.nodes.len(),
            path.display()
        );
        Ok(Self {
            path: path.to_path_buf(),
            nodes: parsed.nodes,
            is_cpu,
            ops,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn nodes(&self) -> &[ExternKernelNode] {
        &self.nodes
    }

    pub fn is_cpu(&self) -> bool {
        self.is_cpu
    }
}

impl ProxyExecutor for SidecarProxyExecutor {
    fn call_function(&self, node_index: usize, int_args: &[i64], tensor_args: &[&Tensor]) -> Result<()> {
        let node = self.nodes.get(node_index).ok_or_else(|| {
            anyhow!(
                "extern node index {} out of range ({} nodes)",
                node_index,
                self.nodes.len()
            )
        })?;
        let kernel = self
            .ops
            .get(node.target())
            .ok_or_else(|| anyhow!("no kernel registered for {}", node.target()))?;
        kernel(int_args, tensor_args).with_context(|| format!("extern node {}", node.name))
    }
}

/// Heap slot giving a trait object a stable thin pointer for the ABI.
pub(crate) struct ProxyExecutorSlot(Box<dyn ProxyExecutor>);

impl ProxyExecutorSlot {
    pub(crate) fn new(executor: Box<dyn ProxyExecutor>) -> Box<Self> {
        Box::new(Self(executor))
    }

    pub(crate) fn executor(&self) -> &dyn ProxyExecutor {
        self.0.as_ref()
    }

    pub(crate) fn handle(&self) -> ProxyExecutorHandle {
        self as *const ProxyExecutorSlot as ProxyExecutorHandle
    }
}
