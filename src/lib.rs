pub mod adapters;
pub mod class_space;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;
pub use config::{ClassSpaceConfig, ExtenderConfig};

pub use class_space::{ClassSpaceResolver, ResolvedClassSpace};
pub use core::{LifecycleState, WarExtender, WebApplication};
pub use utils::error::{ExtenderError, Result};
