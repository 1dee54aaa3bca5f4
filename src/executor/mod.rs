#[allow(clippy::module_inception)]
pub mod executor;
pub mod memory;
pub mod opentofu;
pub mod registry;

pub use executor::{is_already_managed, Executor};
pub use memory::MemoryExecutor;
pub use opentofu::CliExecutor;
pub use registry::{DefaultExecutorRegistry, ExecutorRegistry};
