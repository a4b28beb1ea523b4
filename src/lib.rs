//! Strand: a graph execution engine with forkable, resumable executor trees.
//!
//! This crate re-exports the workspace crates and wires up logging.

pub use strand_core as core;
pub use strand_engine as engine;
pub use strand_expr as expr;
pub use strand_store as store;

pub use strand_core::{EngineConfig, EngineEvent, EventBus, NodeRegistry, Result, StrandError};
pub use strand_engine::{Executor, ExecutorContext, ExecutorOutput, ExecutorStatus, NodeActor};

use strand_core::config::LogConfig;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` wins over the configured
/// filter. Returns false when a subscriber was already installed.
pub fn init_tracing(config: &LogConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(filter = %config.filter, "Tracing initialized");
    }
    installed
}
