use std::sync::Arc;

use strand_core::config::{EngineConfig, ExecutorConfig};
use strand_core::error::Result;
use strand_core::plugin::CommandHooksPlugin;
use strand_core::traits::{ChatModel, StateStorage};
use strand_core::{EventBus, NodeRegistry};
use strand_store::InMemoryStateStorage;

/// Everything an executor tree shares: registry, storage, model, events
/// and limits.
#[derive(Clone)]
pub struct ExecutorContext {
    pub registry: Arc<NodeRegistry>,
    pub storage: Arc<dyn StateStorage>,
    pub model: Option<Arc<dyn ChatModel>>,
    pub events: Arc<EventBus>,
    pub config: ExecutorConfig,
}

impl ExecutorContext {
    pub fn new(registry: Arc<NodeRegistry>, storage: Arc<dyn StateStorage>) -> Self {
        Self {
            registry,
            storage,
            model: None,
            events: Arc::new(EventBus::default()),
            config: ExecutorConfig::default(),
        }
    }

    /// A context backed by process-local storage.
    pub fn in_memory(registry: Arc<NodeRegistry>) -> Self {
        Self::new(registry, Arc::new(InMemoryStateStorage::new()))
    }

    /// Build a context from engine configuration: opens the configured
    /// storage and installs the command hooks plugin when hooks are set.
    pub fn from_config(mut registry: NodeRegistry, config: &EngineConfig) -> Result<Self> {
        if !config.hooks.is_empty() {
            registry.add_plugin(Arc::new(CommandHooksPlugin::new(config.hooks.clone())));
        }
        let storage = strand_store::open_storage(&config.storage)?;
        Ok(Self::new(Arc::new(registry), storage).with_config(config.executor.clone()))
    }

    pub fn with_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }
}
