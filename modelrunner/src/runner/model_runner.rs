use std::collections::HashMap;

use crate::abi::StreamHandle;
use crate::constants::ConstantMap;
use crate::error::Result;
use crate::loader::Capability;
use crate::tensor::{DType, Tensor};

use super::runner::{CallSpec, ModelContainerRunner};
use super::variant::RunVariant;

/// Object-safe view of a runner, independent of its run variant.
pub trait ModelRunner: Send {
    fn run(&self, inputs: &[Tensor], stream: Option<StreamHandle>) -> Result<Vec<Tensor>>;
    fn boxed_run(&self, inputs: Vec<Tensor>, stream: Option<StreamHandle>) -> Result<Vec<Tensor>>;
    fn num_outputs(&self) -> Result<usize>;
    fn constant_names_to_original_fqns(&self) -> Result<HashMap<String, String>>;
    fn constant_names_to_dtypes(&self) -> Result<HashMap<String, DType>>;
    fn update_constant_buffer(
        &self,
        constants: &ConstantMap<'_>,
        use_inactive: bool,
        check_full_update: bool,
    ) -> Result<()>;
    fn update_inactive_constant_buffer(&self, constants: &ConstantMap<'_>) -> Result<()>;
    fn run_const_fold(&self, use_inactive: bool, stream: Option<StreamHandle>) -> Result<()>;
    fn swap_constant_buffer(&mut self) -> Result<()>;
    fn free_inactive_constant_buffer(&mut self) -> Result<()>;
    fn call_spec(&self) -> Result<CallSpec>;
    fn has_capability(&self, capability: Capability) -> bool;
    fn is_single_threaded(&self) -> bool;
}

impl<V: RunVariant> ModelRunner for ModelContainerRunner<V> {
    fn run(&self, inputs: &[Tensor], stream: Option<StreamHandle>) -> Result<Vec<Tensor>> {
        ModelContainerRunner::run(self, inputs, stream)
    }

    fn boxed_run(&self, inputs: Vec<Tensor>, stream: Option<StreamHandle>) -> Result<Vec<Tensor>> {
        ModelContainerRunner::boxed_run(self, inputs, stream)
    }

    fn num_outputs(&self) -> Result<usize> {
        ModelContainerRunner::num_outputs(self)
    }

    fn constant_names_to_original_fqns(&self) -> Result<HashMap<String, String>> {
        ModelContainerRunner::constant_names_to_original_fqns(self)
    }

    fn constant_names_to_dtypes(&self) -> Result<HashMap<String, DType>> {
        ModelContainerRunner::constant_names_to_dtypes(self)
    }

    fn update_constant_buffer(
        &self,
        constants: &ConstantMap<'_>,
        use_inactive: bool,
        check_full_update: bool,
    ) -> Result<()> {
        ModelContainerRunner::update_constant_buffer(self, constants, use_inactive, check_full_update)
    }

    fn update_inactive_constant_buffer(&self, constants: &ConstantMap<'_>) -> Result<()> {
        ModelContainerRunner::update_inactive_constant_buffer(self, constants)
    }

    fn run_const_fold(&self, use_inactive: bool, stream: Option<StreamHandle>) -> Result<()> {
        ModelContainerRunner::run_const_fold(self, use_inactive, stream)
    }

    fn swap_constant_buffer(&mut self) -> Result<()> {
        ModelContainerRunner::swap_constant_buffer(self)
    }

    fn free_inactive_constant_buffer(&mut self) -> Result<()> {
        ModelContainerRunner::free_inactive_constant_buffer(self)
    }

    fn call_spec(&self) -> Result<CallSpec> {
        ModelContainerRunner::call_spec(self).cloned()
    }

    fn has_capability(&self, capability: Capability) -> bool {
        ModelContainerRunner::has_capability(self, capability)
    }

    fn is_single_threaded(&self) -> bool {
        V::SINGLE_THREADED
    }
}
