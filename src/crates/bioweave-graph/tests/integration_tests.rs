//! Cross-module integration tests for the graph engine.

use bioweave_graph::messages::{Message, ToolCall};
use bioweave_graph::state::{OverwriteReducer, StateSchema, SumReducer};
use bioweave_graph::stream::StreamOptions;
use bioweave_graph::{GraphError, StateGraph, END, START};
use futures::StreamExt;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn messages_from(state: &serde_json::Value) -> Vec<Message> {
    serde_json::from_value(state["messages"].clone()).unwrap_or_default()
}

/// An agent-shaped loop: model node emits a tool call, tool node answers
/// it, model node concludes. Checks the tool_call_id join invariant and
/// the append-only log along the way.
#[tokio::test]
async fn test_agent_loop_tool_call_join() {
    let turn = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut graph = StateGraph::new("agent-loop");
    {
        let turn = turn.clone();
        graph.add_node("agent", move |_state| {
            let turn = turn.clone();
            Box::pin(async move {
                let n = turn.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                let msg = if n == 0 {
                    Message::assistant("checking").with_tool_calls(vec![ToolCall::new(
                        "call-1",
                        "lookup",
                        json!({"q": "tp53"}),
                    )])
                } else {
                    Message::assistant("done")
                };
                Ok(json!({"messages": [msg]}))
            })
        });
    }
    graph.add_node("tools", |state| {
        Box::pin(async move {
            let messages: Vec<Message> =
                serde_json::from_value(state["messages"].clone()).unwrap_or_default();
            let last = messages.last().cloned().unwrap();
            let replies: Vec<Message> = last
                .tool_calls()
                .iter()
                .map(|tc| Message::tool("42 results", &tc.id).with_name(&tc.name))
                .collect();
            Ok(json!({"messages": replies}))
        })
    });

    graph.add_edge(START, "agent");
    let mut branches = HashMap::new();
    branches.insert("tools".to_string(), "tools".to_string());
    branches.insert(END.to_string(), END.to_string());
    graph.add_conditional_edge(
        "agent",
        |state| {
            let messages: Vec<Message> =
                serde_json::from_value(state["messages"].clone()).unwrap_or_default();
            match messages.last() {
                Some(m) if m.has_tool_calls() => "tools".to_string(),
                _ => END.to_string(),
            }
        },
        branches,
    );
    graph.add_edge("tools", "agent");

    let compiled = graph.compile().unwrap();
    let result = compiled
        .invoke(json!({"messages": [Message::human("how many?")]}))
        .await
        .unwrap();

    let messages = messages_from(&result);
    // human, assistant+call, tool, assistant
    assert_eq!(messages.len(), 4);

    // Every tool call has exactly one later tool message with the same id.
    for (idx, msg) in messages.iter().enumerate() {
        for call in msg.tool_calls() {
            let answers: Vec<_> = messages[idx + 1..]
                .iter()
                .filter(|m| m.tool_call_id.as_deref() == Some(call.id.as_str()))
                .collect();
            assert_eq!(answers.len(), 1, "tool call {} unanswered", call.id);
        }
    }
}

/// Message log length is non-decreasing across streamed snapshots.
#[tokio::test]
async fn test_stream_message_log_monotone() {
    let mut graph = StateGraph::new("monotone");
    for name in ["one", "two", "three"] {
        graph.add_node(name, move |_state| {
            Box::pin(async move {
                Ok(json!({"messages": [Message::assistant("step")]}))
            })
        });
    }
    graph.add_edge(START, "one");
    graph.add_edge("one", "two");
    graph.add_edge("two", "three");
    graph.add_edge("three", END);

    let compiled = graph.compile().unwrap();
    let snapshots: Vec<_> = compiled
        .stream(json!({"messages": []}), StreamOptions::default())
        .collect()
        .await;

    let mut prev_len = 0;
    for snapshot in &snapshots {
        let len = messages_from(&snapshot.state).len();
        assert!(len >= prev_len, "message log shrank");
        prev_len = len;
    }
    assert_eq!(prev_len, 3);
}

/// Subgraph transparency: nested graph snapshots carry a namespace path
/// and appear in the parent's stream only when requested.
#[tokio::test]
async fn test_subgraph_streaming_namespace() {
    let mut child = StateGraph::new("child");
    child.add_node("inner", |_state| {
        Box::pin(async move { Ok(json!({"inner_ran": true})) })
    });
    child.add_edge(START, "inner");
    child.add_edge("inner", END);
    let child = Arc::new(child.compile().unwrap());

    let mut parent = StateGraph::new("parent");
    {
        let child_for_node = child.clone();
        parent.add_subgraph_node("nested", child.clone(), move |state| {
            let child = child_for_node.clone();
            Box::pin(async move {
                let out = child.invoke(state).await?;
                Ok(json!({"child_out": out["inner_ran"]}))
            })
        });
    }
    parent.add_edge(START, "nested");
    parent.add_edge("nested", END);
    let parent = parent.compile().unwrap();

    // Opaque by default.
    let plain: Vec<_> = parent
        .stream(json!({}), StreamOptions::default())
        .collect()
        .await;
    assert!(plain.iter().all(|s| s.namespace.is_empty()));

    // Transparent when asked.
    let nested: Vec<_> = parent
        .stream(json!({}), StreamOptions::with_subgraphs())
        .collect()
        .await;
    assert!(nested
        .iter()
        .any(|s| s.namespace == vec!["child".to_string()] && s.node == "inner"));
    assert!(nested
        .iter()
        .any(|s| s.namespace.is_empty() && s.node == "nested"));
}

/// Token counters summed through the schema are monotone within a run.
#[tokio::test]
async fn test_token_counter_accumulation() {
    let schema = StateSchema::with_messages()
        .field("total_input_tokens", Box::new(SumReducer))
        .field("stage", Box::new(OverwriteReducer));
    let mut graph = StateGraph::with_schema("tokens", schema);
    for (name, tokens) in [("a", 10), ("b", 25)] {
        graph.add_node(name, move |_state| {
            Box::pin(async move {
                Ok(json!({"total_input_tokens": tokens, "stage": name}))
            })
        });
    }
    graph.add_edge(START, "a");
    graph.add_edge("a", "b");
    graph.add_edge("b", END);

    let result = graph
        .compile()
        .unwrap()
        .invoke(json!({"total_input_tokens": 0}))
        .await
        .unwrap();
    assert_eq!(result["total_input_tokens"], 35);
    assert_eq!(result["stage"], "b");
}

/// A model that never emits tool calls terminates in one extra node
/// execution after the router sees the bare message.
#[tokio::test]
async fn test_no_tool_calls_reaches_end() {
    let executions = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let mut graph = StateGraph::new("bare");
    {
        let executions = executions.clone();
        graph.add_node("agent", move |_state| {
            let executions = executions.clone();
            Box::pin(async move {
                executions.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(json!({"messages": [Message::assistant("final answer")]}))
            })
        });
    }
    graph.add_node("tools", |_state| Box::pin(async move { Ok(json!({})) }));
    graph.add_edge(START, "agent");
    let mut branches = HashMap::new();
    branches.insert("tools".to_string(), "tools".to_string());
    branches.insert(END.to_string(), END.to_string());
    graph.add_conditional_edge(
        "agent",
        |state| {
            let messages: Vec<Message> =
                serde_json::from_value(state["messages"].clone()).unwrap_or_default();
            match messages.last() {
                Some(m) if m.has_tool_calls() => "tools".to_string(),
                _ => END.to_string(),
            }
        },
        branches,
    );
    graph.add_edge("tools", "agent");

    let compiled = graph.compile().unwrap();
    compiled.invoke(json!({"messages": []})).await.unwrap();
    assert_eq!(executions.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_recursion_limit_error_kind() {
    let mut graph = StateGraph::new("spin");
    graph.add_node("a", |_state| Box::pin(async move { Ok(json!({})) }));
    graph.add_edge(START, "a");
    graph.add_edge("a", "a");

    let err = graph
        .compile()
        .unwrap()
        .invoke_with_limit(json!({}), 3)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::RecursionLimit { limit: 3 }));
}
