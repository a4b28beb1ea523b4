use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::HooksConfig;
use crate::error::Result;
use crate::hooks::{
    ActorInfo, CommandPostHook, CommandPreHook, HookSet, PreHookData, SyncPreHook,
};
use crate::types::NodeKind;

/// Installs hooks on actors while they initialise.
pub trait Plugin: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn applies_to(&self, kind: NodeKind) -> bool {
        let _ = kind;
        true
    }

    fn install(&self, actor: &ActorInfo, hooks: &mut HookSet) -> Result<()>;
}

/// Injects fixed values (credentials, tenant ids) into the execution
/// context. Values supplied by the caller win.
pub struct ContextPlugin {
    name: String,
    values: Map<String, Value>,
    kinds: Option<Vec<NodeKind>>,
}

impl ContextPlugin {
    pub fn new(name: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            values,
            kinds: None,
        }
    }

    /// Restrict the plugin to the given node kinds.
    pub fn only(mut self, kinds: &[NodeKind]) -> Self {
        self.kinds = Some(kinds.to_vec());
        self
    }
}

impl Plugin for ContextPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn applies_to(&self, kind: NodeKind) -> bool {
        self.kinds.as_ref().map_or(true, |k| k.contains(&kind))
    }

    fn install(&self, _actor: &ActorInfo, hooks: &mut HookSet) -> Result<()> {
        let values = self.values.clone();
        hooks.add_pre(Arc::new(SyncPreHook::new(
            format!("{}:context", self.name),
            move |_, mut data: PreHookData| {
                for (key, value) in &values {
                    data.context
                        .entry(key.clone())
                        .or_insert_with(|| value.clone());
                }
                Ok(data)
            },
        )));
        Ok(())
    }
}

/// Runs the configured `[hooks]` shell commands around every node.
pub struct CommandHooksPlugin {
    config: HooksConfig,
}

impl CommandHooksPlugin {
    pub fn new(config: HooksConfig) -> Self {
        Self { config }
    }
}

impl Plugin for CommandHooksPlugin {
    fn name(&self) -> &str {
        "command_hooks"
    }

    fn install(&self, _actor: &ActorInfo, hooks: &mut HookSet) -> Result<()> {
        if !self.config.on_node_start.is_empty() {
            hooks.add_pre(Arc::new(CommandPreHook {
                commands: self.config.on_node_start.clone(),
            }));
        }
        if !self.config.on_node_complete.is_empty() {
            hooks.add_post(Arc::new(CommandPostHook {
                commands: self.config.on_node_complete.clone(),
            }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Payload;
    use serde_json::json;
    use uuid::Uuid;

    fn info(kind: NodeKind) -> ActorInfo {
        ActorInfo {
            actor_id: Uuid::new_v4(),
            composite_id: String::new(),
            node_kind: kind,
            node_name: "n".into(),
        }
    }

    #[tokio::test]
    async fn test_context_plugin_does_not_overwrite() {
        let mut values = Map::new();
        values.insert("token".into(), json!("secret"));
        values.insert("tenant".into(), json!("acme"));
        let plugin = ContextPlugin::new("auth", values);

        let mut hooks = HookSet::new();
        let actor = info(NodeKind::Tool);
        plugin.install(&actor, &mut hooks).unwrap();

        let mut context = Map::new();
        context.insert("tenant".into(), json!("caller"));
        let data = PreHookData {
            input: Payload::text("x"),
            execution_id: Uuid::new_v4(),
            context,
        };
        let out = hooks.run_pre(&actor, data).await.unwrap();
        assert_eq!(out.context["token"], json!("secret"));
        assert_eq!(out.context["tenant"], json!("caller"));
    }

    #[test]
    fn test_kind_filter() {
        let plugin = ContextPlugin::new("auth", Map::new()).only(&[NodeKind::Tool]);
        assert!(plugin.applies_to(NodeKind::Tool));
        assert!(!plugin.applies_to(NodeKind::Llm));
    }

    #[test]
    fn test_command_plugin_installs_only_configured() {
        let plugin = CommandHooksPlugin::new(HooksConfig {
            on_node_start: vec!["true".into()],
            on_node_complete: vec![],
        });
        let mut hooks = HookSet::new();
        plugin.install(&info(NodeKind::Function), &mut hooks).unwrap();
        assert_eq!(hooks.pre_len(), 1);
        assert_eq!(hooks.post_len(), 0);
    }
}
