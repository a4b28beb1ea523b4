pub mod config;
pub mod error;
pub mod event;
pub mod hooks;
pub mod plugin;
pub mod registry;
pub mod traits;
pub mod types;

pub use config::EngineConfig;
pub use error::{ActorError, Result, StrandError};
pub use event::{EngineEvent, EventBus};
pub use plugin::Plugin;
pub use registry::NodeRegistry;
pub use types::*;
