use std::collections::{BTreeMap, HashMap};

use crate::abi::ConstantMapHandle;
use crate::tensor::Tensor;

/// Constant name to borrowed tensor, handed to the artifact for one update.
///
/// The map never owns tensor storage; the artifact copies whatever it keeps.
#[derive(Debug, Default, Clone)]
pub struct ConstantMap<'a> {
    entries: BTreeMap<String, &'a Tensor>,
}

impl<'a> ConstantMap<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the tensor bound to `name`.
    pub fn insert(&mut self, name: impl Into<String>, tensor: &'a Tensor) -> Option<&'a Tensor> {
        self.entries.insert(name.into(), tensor)
    }

    pub fn get(&self, name: &str) -> Option<&'a Tensor> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `idx` in name order.
    pub fn entry_at(&self, idx: usize) -> Option<(&str, &'a Tensor)> {
        self.entries
            .iter()
            .nth(idx)
            .map(|(name, tensor)| (name.as_str(), *tensor))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Names in `required` that this map does not provide, in input order.
    pub fn missing_from<'n, I>(&self, required: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'n str>,
    {
        required
            .into_iter()
            .filter(|name| !self.entries.contains_key(*name))
            .map(str::to_string)
            .collect()
    }

    /// Opaque pointer valid while `self` is borrowed.
    pub(crate) fn as_handle(&self) -> ConstantMapHandle {
        self as *const ConstantMap<'a> as ConstantMapHandle
    }
}

impl<'a> FromIterator<(String, &'a Tensor)> for ConstantMap<'a> {
    fn from_iter<I: IntoIterator<Item = (String, &'a Tensor)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> From<&'a HashMap<String, Tensor>> for ConstantMap<'a> {
    fn from(tensors: &'a HashMap<String, Tensor>) -> Self {
        tensors
            .iter()
            .map(|(name, tensor)| (name.clone(), tensor))
            .collect()
    }
}
