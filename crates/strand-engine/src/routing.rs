//! Successor computation for node actors.

use serde_json::{Map, Value};
use strand_expr::{ConditionCache, Evaluator, FunctionTable};
use tracing::{debug, warn};

use strand_core::error::Result;
use strand_core::traits::NextNode;
use strand_core::types::{EdgeSpec, NodeKind, NodeState, Payload};
use strand_core::NodeRegistry;

use crate::status::NodeActorStatus;

/// Build the `$output` / `$status` / `$state` context for edge conditions.
pub fn condition_context(
    output: &Payload,
    status: NodeActorStatus,
    state: &NodeState,
) -> Result<Map<String, Value>> {
    let mut ctx = Map::new();
    ctx.insert("$output".into(), output.as_output_context());
    ctx.insert("$status".into(), Value::String(status.to_string()));
    ctx.insert("$state".into(), serde_json::to_value(state)?);
    Ok(ctx)
}

/// Decide whether an edge is followed.
///
/// No condition means always. A condition that fails to parse or evaluate
/// counts as false.
pub fn edge_followed(
    edge: &EdgeSpec,
    cache: &ConditionCache,
    context: &Map<String, Value>,
    state_context: &Map<String, Value>,
    functions: &FunctionTable,
) -> bool {
    let Some(condition) = edge.when.as_deref() else {
        return true;
    };

    let result = cache
        .get_or_parse(condition)
        .and_then(|expr| Evaluator::new(context, state_context, functions).evaluate(&expr));

    match result {
        Ok(followed) => {
            debug!(target_node = %edge.target, condition, followed, "Evaluated edge condition");
            followed
        }
        Err(e) => {
            warn!(
                target_node = %edge.target,
                condition,
                error = %e,
                "Edge condition failed, edge not followed"
            );
            false
        }
    }
}

/// One successor per tool call in a model reply, each fed its call.
pub fn route_tool_calls(registry: &NodeRegistry, output: &Payload) -> Result<Vec<NextNode>> {
    let Payload::Message(message) = output else {
        return Ok(Vec::new());
    };

    message
        .tool_calls()
        .into_iter()
        .map(|call| {
            let node = registry.lookup(NodeKind::Tool, &call.name)?;
            Ok(NextNode {
                node,
                input: Payload::ToolCall(call),
            })
        })
        .collect()
}

/// One successor per followed edge, each fed the raw output.
pub fn route_edges(
    registry: &NodeRegistry,
    cache: &ConditionCache,
    edges: &[EdgeSpec],
    output: &Payload,
    status: NodeActorStatus,
    state: &NodeState,
) -> Result<Vec<NextNode>> {
    if edges.is_empty() {
        return Ok(Vec::new());
    }

    let context = condition_context(output, status, state)?;
    let mut next = Vec::new();
    for edge in edges {
        if edge_followed(edge, cache, &context, &state.context, registry.functions()) {
            next.push(NextNode {
                node: registry.lookup(edge.target_kind, &edge.target)?,
                input: output.clone(),
            });
        }
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strand_core::types::{ChatMessage, ToolCall};
    use strand_core::StrandError;
    use strand_test_utils::{FnNode, FnTool};
    use std::sync::Arc;

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry
            .add_function(Arc::new(FnNode::echo("next")))
            .unwrap();
        registry.add_tool(Arc::new(FnTool::echo("search"))).unwrap();
        registry.register_function("checks.broken", || Err("boom".into()));
        registry
    }

    fn state() -> NodeState {
        let mut state = NodeState::new(NodeKind::Function, "src");
        state.context.insert("retries".into(), json!(2));
        state
    }

    #[test]
    fn test_edge_without_condition_always_followed() {
        let registry = registry();
        let cache = ConditionCache::new();
        let next = route_edges(
            &registry,
            &cache,
            &[EdgeSpec::to("next")],
            &Payload::text("x"),
            NodeActorStatus::Executing,
            &state(),
        )
        .unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].input, Payload::text("x"));
    }

    #[test]
    fn test_failing_conditions_never_followed() {
        let registry = registry();
        let cache = ConditionCache::new();
        let edges = [
            EdgeSpec::to("next").when("ghost > 1"),
            EdgeSpec::to("next").when("x =="),
            EdgeSpec::to("next").when("checks.broken"),
            EdgeSpec::to("next").when("checks.missing"),
        ];
        let next = route_edges(
            &registry,
            &cache,
            &edges,
            &Payload::text("x"),
            NodeActorStatus::Executing,
            &state(),
        )
        .unwrap();
        assert!(next.is_empty());
    }

    #[test]
    fn test_overly_nested_condition_skips_only_its_edge() {
        let registry = registry();
        let cache = ConditionCache::new();
        let deep = format!("{}true{}", "(".repeat(50_000), ")".repeat(50_000));
        let edges = [
            EdgeSpec::to("next").when(deep.clone()),
            EdgeSpec::to("next").when(format!("{}true", "!".repeat(50_000))),
            EdgeSpec::to("next").when("retries == 2"),
        ];
        let next = route_edges(
            &registry,
            &cache,
            &edges,
            &Payload::text("x"),
            NodeActorStatus::Executing,
            &state(),
        )
        .unwrap();
        assert_eq!(next.len(), 1);
        assert!(cache.get_or_parse(&deep).is_err());
    }

    #[test]
    fn test_conditions_see_output_status_and_context() {
        let registry = registry();
        let cache = ConditionCache::new();
        let edges = [
            EdgeSpec::to("next").when("$output.score > 3"),
            EdgeSpec::to("next").when("$status == 'executing' and retries == 2"),
            EdgeSpec::to("next").when("$state.name == 'src'"),
            EdgeSpec::to("next").when("$output.score < 3"),
        ];
        let next = route_edges(
            &registry,
            &cache,
            &edges,
            &Payload::Json(json!({"score": 4})),
            NodeActorStatus::Executing,
            &state(),
        )
        .unwrap();
        assert_eq!(next.len(), 3);
    }

    #[test]
    fn test_missing_edge_target_is_error() {
        let registry = registry();
        let cache = ConditionCache::new();
        let err = route_edges(
            &registry,
            &cache,
            &[EdgeSpec::to("nowhere")],
            &Payload::text("x"),
            NodeActorStatus::Executing,
            &state(),
        )
        .unwrap_err();
        assert!(matches!(err, StrandError::NodeNotFound { .. }));
    }

    #[test]
    fn test_tool_calls_route_to_tools() {
        let registry = registry();
        let reply = ChatMessage::assistant_tool_calls(
            "",
            vec![
                ToolCall::new("search", json!({"q": "a"})),
                ToolCall::new("search", json!({"q": "b"})),
            ],
        );
        let next = route_tool_calls(&registry, &Payload::Message(reply)).unwrap();
        assert_eq!(next.len(), 2);
        assert!(matches!(next[1].input, Payload::ToolCall(ref c) if c.args == json!({"q": "b"})));
    }

    #[test]
    fn test_plain_reply_has_no_successors() {
        let registry = registry();
        let reply = ChatMessage::assistant_text("done");
        assert!(route_tool_calls(&registry, &Payload::Message(reply))
            .unwrap()
            .is_empty());
    }
}
