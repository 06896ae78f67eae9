mod model_runner;
mod registry;
mod runner;
mod variant;

pub use model_runner::ModelRunner;
pub use registry::{device_type, open_runner, RunnerConstructor, RunnerRegistry};
pub use runner::{CallSpec, ModelContainerRunner};
pub use variant::{RunVariant, SingleThreaded, Threaded};
