//! Tool dispatch: tool calls in, tool messages out.
//!
//! The dispatcher guarantees that every `ToolCall` on the last assistant
//! message produces exactly one tool message carrying the same
//! `tool_call_id`, in call order. Lookup misses and run failures become
//! error-text tool messages - the model, not the executor, is the retry
//! agent for tool failures, so nothing here ever aborts the graph.

use bioweave_graph::messages::{Message, MessageContent};
use bioweave_graph::tool::{Tool, ToolOutput, ToolRegistry};
use std::sync::Arc;

/// Executes the tool calls of the last assistant message.
#[derive(Clone)]
pub struct ToolNode {
    registry: ToolRegistry,
}

impl ToolNode {
    /// Build a dispatcher over the given tool set
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            registry: ToolRegistry::from_tools(tools),
        }
    }

    /// The underlying registry (for definitions when binding tools)
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute every tool call of the last assistant message, in order.
    ///
    /// Returns one tool message per call; empty when the last assistant
    /// message has no calls.
    pub async fn execute(&self, messages: &[Message]) -> Vec<Message> {
        let last_assistant = messages.iter().rev().find(|m| m.is_assistant());
        let calls = match last_assistant {
            Some(msg) => msg.tool_calls().to_vec(),
            None => Vec::new(),
        };

        let mut replies = Vec::with_capacity(calls.len());
        for call in calls {
            tracing::debug!(tool = %call.name, call_id = %call.id, "Dispatching tool call");
            let reply = match self.registry.execute(&call.name, call.args.clone()).await {
                Ok(ToolOutput::Text(text)) => Message::tool(text, &call.id).with_name(&call.name),
                Ok(ToolOutput::Multimodal(parts)) => {
                    Message::tool(MessageContent::Parts(parts), &call.id).with_name(&call.name)
                }
                Err(error) => {
                    tracing::warn!(tool = %call.name, error = %error, "Tool call failed");
                    Message::tool(
                        format!(
                            "Error executing tool {} with input {}: {}",
                            call.name, call.args, error
                        ),
                        &call.id,
                    )
                    .with_name(&call.name)
                }
            };
            replies.push(reply);
        }
        replies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bioweave_graph::messages::{ContentPart, ToolCall};
    use bioweave_graph::tool::{ToolError, ToolResult};
    use serde_json::{json, Value};

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Uppercases text"
        }
        async fn run(&self, args: Value) -> ToolResult {
            Ok(ToolOutput::text(
                args["text"].as_str().unwrap_or("").to_uppercase(),
            ))
        }
    }

    struct BoomTool;

    #[async_trait]
    impl Tool for BoomTool {
        fn name(&self) -> &str {
            "boom"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        async fn run(&self, _args: Value) -> ToolResult {
            Err(ToolError::execution("boom", "boom"))
        }
    }

    struct PlotTool;

    #[async_trait]
    impl Tool for PlotTool {
        fn name(&self) -> &str {
            "plot"
        }
        fn description(&self) -> &str {
            "Returns a figure"
        }
        async fn run(&self, _args: Value) -> ToolResult {
            Ok(ToolOutput::Multimodal(vec![
                ContentPart::text("figure 1"),
                ContentPart::image_url("/tmp/fig1.png"),
            ]))
        }
    }

    #[tokio::test]
    async fn test_dispatch_in_call_order() {
        let node = ToolNode::new(vec![Arc::new(UpperTool)]);
        let messages = vec![Message::assistant("go").with_tool_calls(vec![
            ToolCall::new("c1", "upper", json!({"text": "a"})),
            ToolCall::new("c2", "upper", json!({"text": "b"})),
        ])];

        let replies = node.execute(&messages).await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(replies[0].text(), Some("A"));
        assert_eq!(replies[1].tool_call_id.as_deref(), Some("c2"));
        assert_eq!(replies[1].text(), Some("B"));
    }

    #[tokio::test]
    async fn test_error_isolated_into_tool_message() {
        let node = ToolNode::new(vec![Arc::new(BoomTool)]);
        let messages = vec![Message::assistant("go")
            .with_tool_calls(vec![ToolCall::new("c1", "boom", json!({}))])];

        let replies = node.execute(&messages).await;
        assert_eq!(replies.len(), 1);
        let text = replies[0].text().unwrap();
        assert!(text.contains("Error executing tool boom"));
        assert!(text.contains("boom"));
        assert_eq!(replies[0].tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_message() {
        let node = ToolNode::new(vec![Arc::new(UpperTool)]);
        let messages = vec![Message::assistant("go")
            .with_tool_calls(vec![ToolCall::new("c1", "missing", json!({}))])];

        let replies = node.execute(&messages).await;
        assert!(replies[0].text().unwrap().contains("Error executing tool missing"));
    }

    #[tokio::test]
    async fn test_multimodal_blocks_preserved() {
        let node = ToolNode::new(vec![Arc::new(PlotTool)]);
        let messages = vec![Message::assistant("go")
            .with_tool_calls(vec![ToolCall::new("c1", "plot", json!({}))])];

        let replies = node.execute(&messages).await;
        match &replies[0].content {
            MessageContent::Parts(parts) => assert_eq!(parts.len(), 2),
            _ => panic!("expected multimodal tool message"),
        }
    }

    #[tokio::test]
    async fn test_no_assistant_message_no_replies() {
        let node = ToolNode::new(vec![Arc::new(UpperTool)]);
        let replies = node.execute(&[Message::human("hi")]).await;
        assert!(replies.is_empty());
    }
}
