//! Deployment lifecycle of web application units.

pub mod events;
pub mod extender;
pub mod gate;
pub mod runtime_slot;
pub mod state;
pub mod web_application;

pub use events::EventDispatcher;
pub use extender::WarExtender;
pub use gate::CompletionGate;
pub use runtime_slot::RuntimeSlot;
pub use state::{AtomicState, LifecycleState};
pub use web_application::{ContextReleaseListener, DeploymentContext, WebApplication};
