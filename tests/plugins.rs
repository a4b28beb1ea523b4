use std::sync::{Arc, Mutex};

use serde_json::{json, Map};
use strand::{EngineConfig, Executor, ExecutorContext};
use strand_core::hooks::{ActorInfo, HookSet, PostHookData, SyncPostHook};
use strand_core::plugin::{ContextPlugin, Plugin};
use strand_core::traits::NodeRef;
use strand_core::types::{EdgeSpec, ExecutionContext, NodeKind, Payload};
use strand_test_utils::{registry, FnNode};

/// Drops every successor of nodes named in the deny list.
struct StopPlugin {
    deny: Vec<String>,
}

impl Plugin for StopPlugin {
    fn name(&self) -> &str {
        "stop"
    }

    fn install(&self, actor: &ActorInfo, hooks: &mut HookSet) -> strand::Result<()> {
        if self.deny.contains(&actor.node_name) {
            hooks.add_post(Arc::new(SyncPostHook::new(
                "stop:successors",
                |_, mut data: PostHookData| {
                    data.next_nodes.clear();
                    Ok(data)
                },
            )));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_context_plugin_reaches_every_function_node() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = |name: &'static str| {
        let seen = seen.clone();
        FnNode::new(name, move |input, _, ctx: &ExecutionContext| {
            seen.lock()
                .unwrap()
                .push((ctx.node_name.clone(), ctx.values.get("tenant").cloned()));
            Ok(input)
        })
    };
    let a = NodeRef::Function(Arc::new(recorder("a").edge(EdgeSpec::to("b"))));
    let b = NodeRef::Function(Arc::new(recorder("b")));

    let mut nodes = registry(vec![a.clone(), b]);
    let mut values = Map::new();
    values.insert("tenant".into(), json!("acme"));
    nodes.add_plugin(Arc::new(
        ContextPlugin::new("tenant", values).only(&[NodeKind::Function]),
    ));

    let executor = Executor::start(ExecutorContext::in_memory(Arc::new(nodes)), a).expect("start");
    executor.run("x").await.expect("run");

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("a".to_string(), Some(json!("acme"))),
            ("b".to_string(), Some(json!("acme"))),
        ]
    );
}

#[tokio::test]
async fn test_post_hook_plugin_can_cut_routing() {
    let a = NodeRef::Function(Arc::new(FnNode::echo("a").edge(EdgeSpec::to("b"))));
    let b = NodeRef::Function(Arc::new(FnNode::new("b", |_, _, _| {
        Ok(Payload::text("unreachable"))
    })));
    let mut nodes = registry(vec![a.clone(), b]);
    nodes.add_plugin(Arc::new(StopPlugin {
        deny: vec!["a".into()],
    }));

    let executor = Executor::start(ExecutorContext::in_memory(Arc::new(nodes)), a).expect("start");
    let output = executor.run("x").await.expect("run");
    assert_eq!(output.output, Payload::text("x"));
    assert_eq!(executor.actors().len(), 1);
}

#[tokio::test]
async fn test_configured_command_hooks_run_around_nodes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("hooks.log");
    let toml_content = format!(
        "[hooks]\non_node_start = [\"echo start:$STRAND_NODE_NAME >> {log}\"]\non_node_complete = [\"echo done:$STRAND_NEXT_COUNT >> {log}\"]\n",
        log = log.display()
    );
    let config = EngineConfig::from_toml_str(&toml_content).expect("parse config");

    let a = NodeRef::Function(Arc::new(FnNode::echo("a")));
    let ctx = ExecutorContext::from_config(registry(vec![a.clone()]), &config).expect("context");
    let executor = Executor::start(ctx, a).expect("start");
    executor.run("x").await.expect("run");

    let written = std::fs::read_to_string(&log).expect("hook log");
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines, vec!["start:a", "done:0"]);
}
