//! Token accounting and conversation compaction.
//!
//! Long tool-loop conversations are compacted before the next model call
//! once they cross a token threshold: a smaller summariser model condenses
//! the middle of the conversation (everything after the first human
//! message) into one background briefing, and the conversation becomes
//!
//! ```text
//! [system, system("# Background (compacted…)\n\n" + summary), first_human]
//! ```
//!
//! Compaction fails open: if the summariser call errors, the original
//! conversation is returned unchanged and the run continues.

use bioweave_graph::llm::{ChatModel, ChatRequest};
use bioweave_graph::messages::{content_to_text, Message, MessageRole};

/// Approximate characters per token, matched to the truncation helper.
const CHARS_PER_TOKEN: usize = 4;

/// Per-message formatting overhead in tokens (role plus wrapping).
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Approximate token count of one message.
pub fn approximate_message_tokens(message: &Message) -> usize {
    let mut chars = content_to_text(&message.content).chars().count();
    for call in message.tool_calls() {
        chars += call.name.chars().count() + call.args.to_string().chars().count();
    }
    chars.div_ceil(CHARS_PER_TOKEN) + MESSAGE_OVERHEAD_TOKENS
}

/// Approximate token count of a conversation.
pub fn approximate_token_count(messages: &[Message]) -> usize {
    messages.iter().map(approximate_message_tokens).sum()
}

fn role_label(role: &MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::Human => "human",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

/// Serialise the middle of a conversation to plain text for summarisation.
///
/// Assistant tool calls render as
/// `[assistant] Called tool '<name>' with args: <args>` followed by the
/// message content; tool results as `[tool (<name>)]` blocks; image blocks
/// appear as the literal `[image]` placeholder via `content_to_text`.
fn serialise_middle(middle: &[Message]) -> String {
    let mut parts = Vec::new();
    for msg in middle {
        let role = role_label(&msg.role);
        let content = content_to_text(&msg.content);
        if msg.role == MessageRole::Assistant && msg.has_tool_calls() {
            let call = &msg.tool_calls()[0];
            parts.push(format!(
                "[{}] Called tool '{}' with args: {}\n{}",
                role, call.name, call.args, content
            ));
        } else if msg.role == MessageRole::Tool {
            let name = msg.name.as_deref().unwrap_or("?");
            parts.push(format!("[{} ({})]\n{}", role, name, content));
        } else {
            parts.push(format!("[{}]\n{}", role, content));
        }
    }
    parts.join("\n---\n")
}

const SUMMARIZER_SYSTEM_PROMPT: &str = "You are a concise summarizer. Summarize the following agent \
conversation history into a compact background briefing. Focus on: what \
actions were taken (tool calls and results), key findings, what was \
created/updated, and any errors. Keep it concise (under 1000 words). Do \
NOT include raw file contents; just note what was read and the key \
takeaways.";

/// Compact `messages` when it exceeds `token_threshold`.
///
/// Returns either the original conversation (under threshold, unsplittable
/// shape, empty middle, or summariser failure) or the compacted 3-message
/// form. Idempotent within one threshold crossing: a compacted
/// conversation is far below any reasonable threshold.
pub async fn compact_messages(
    summarizer: &dyn ChatModel,
    messages: Vec<Message>,
    token_threshold: usize,
) -> Vec<Message> {
    let token_count = approximate_token_count(&messages);
    if token_count <= token_threshold {
        return messages;
    }

    let system_msg = match messages.first() {
        Some(m) if m.role == MessageRole::System => m.clone(),
        _ => return messages,
    };
    let first_human_idx = match messages.iter().position(|m| m.role == MessageRole::Human) {
        Some(idx) => idx,
        None => return messages,
    };
    let first_human = messages[first_human_idx].clone();
    let middle = &messages[first_human_idx + 1..];
    if middle.is_empty() {
        return messages;
    }

    tracing::info!(
        token_count,
        token_threshold,
        middle_len = middle.len(),
        "Compacting conversation"
    );

    let background = serialise_middle(middle);
    let summary_request = ChatRequest::new(vec![
        Message::system(SUMMARIZER_SYSTEM_PROMPT),
        Message::human(format!(
            "Conversation history to summarize:\n\n{}",
            background
        )),
    ]);

    let summary = match summarizer.chat(summary_request).await {
        Ok(response) => content_to_text(&response.message.content),
        Err(e) => {
            tracing::warn!(error = %e, "Compaction failed; keeping original conversation");
            return messages;
        }
    };

    let compacted = vec![
        system_msg,
        Message::system(format!(
            "# Background (compacted from earlier conversation)\n\n{}",
            summary
        )),
        first_human,
    ];
    tracing::info!(
        new_token_count = approximate_token_count(&compacted),
        "Compaction complete"
    );
    compacted
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bioweave_graph::error::{GraphError, Result as GraphResult};
    use bioweave_graph::llm::ChatResponse;
    use bioweave_graph::messages::ToolCall;

    struct FixedSummarizer;

    #[async_trait]
    impl ChatModel for FixedSummarizer {
        async fn chat(&self, _request: ChatRequest) -> GraphResult<ChatResponse> {
            let message = Message::assistant("summary of prior work");
            Ok(ChatResponse {
                message,
                usage: None,
            })
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl ChatModel for FailingSummarizer {
        async fn chat(&self, _request: ChatRequest) -> GraphResult<ChatResponse> {
            Err(GraphError::Execution("provider down".to_string()))
        }
    }

    fn long_conversation() -> Vec<Message> {
        let mut messages = vec![
            Message::system("You are a data scientist."),
            Message::human("Analyze the cohort."),
        ];
        for i in 0..20 {
            messages.push(
                Message::assistant("x".repeat(2000)).with_tool_calls(vec![ToolCall::new(
                    format!("c{}", i),
                    "code_execution",
                    serde_json::json!({"code": "print(1)"}),
                )]),
            );
            messages.push(Message::tool("y".repeat(2000), format!("c{}", i)).with_name("code_execution"));
        }
        messages
    }

    #[tokio::test]
    async fn test_under_threshold_unchanged() {
        let messages = vec![Message::system("s"), Message::human("q")];
        let out = compact_messages(&FixedSummarizer, messages.clone(), 80_000).await;
        assert_eq!(out.len(), messages.len());
    }

    #[tokio::test]
    async fn test_compaction_shape() {
        let out = compact_messages(&FixedSummarizer, long_conversation(), 1_000).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].role, MessageRole::System);
        assert_eq!(out[1].role, MessageRole::System);
        assert!(out[1]
            .text()
            .unwrap()
            .starts_with("# Background (compacted from earlier conversation)"));
        assert_eq!(out[2].role, MessageRole::Human);
    }

    #[tokio::test]
    async fn test_compaction_failure_keeps_original() {
        let messages = long_conversation();
        let original_len = messages.len();
        let out = compact_messages(&FailingSummarizer, messages, 1_000).await;
        assert_eq!(out.len(), original_len);
    }

    #[tokio::test]
    async fn test_no_system_message_unsplittable() {
        let messages = vec![
            Message::human("q"),
            Message::assistant("a".repeat(50_000)),
        ];
        let out = compact_messages(&FixedSummarizer, messages.clone(), 100).await;
        assert_eq!(out.len(), messages.len());
    }

    #[test]
    fn test_serialise_middle_format() {
        let middle = vec![
            Message::assistant("running").with_tool_calls(vec![ToolCall::new(
                "c1",
                "search_papers",
                serde_json::json!({"q": "brca1"}),
            )]),
            Message::tool("5 hits", "c1").with_name("search_papers"),
        ];
        let text = serialise_middle(&middle);
        assert!(text.contains("[assistant] Called tool 'search_papers' with args:"));
        assert!(text.contains("[tool (search_papers)]\n5 hits"));
        assert!(text.contains("\n---\n"));
    }

    #[test]
    fn test_token_count_grows_with_content() {
        let short = vec![Message::human("hi")];
        let long = vec![Message::human("x".repeat(4000))];
        assert!(approximate_token_count(&long) > approximate_token_count(&short));
        assert!(approximate_token_count(&long) >= 1000);
    }
}
