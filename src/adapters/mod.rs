// Adapters layer: concrete implementations of the domain ports.

pub mod json_inspector;
pub mod memory_modules;
pub mod memory_runtime;
pub mod scheduler;
pub mod toml_descriptor;

pub use json_inspector::JsonClassInspector;
pub use memory_modules::{ClassSpec, InMemoryModuleSystem, ModuleLayout, ModuleSpec};
pub use memory_runtime::{InMemoryWebRuntime, RuntimeCall};
pub use scheduler::{InlineScheduler, TokioScheduler};
pub use toml_descriptor::TomlDescriptorEngine;
