//! Functions offered to the chat model

use super::{ToolCall, ToolDefinition};
use crate::conversation::StoredMessage;
use crate::error::Result;
use crate::knowledge::KnowledgeSearch;
use serde::Deserialize;
use serde_json::{json, Value};

pub const SEARCH_KNOWLEDGE_TOOL: &str = "search_knowledge_base";
pub const CHAT_HISTORY_TOOL: &str = "get_chat_history";

pub fn search_knowledge_tool() -> ToolDefinition {
    ToolDefinition {
        name: SEARCH_KNOWLEDGE_TOOL.to_string(),
        description: "Search the knowledge base for passages relevant to a query. \
                      Returns a JSON list of documents with their page and content."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The text to search for."}
            },
            "required": ["query"]
        }),
    }
}

pub fn chat_history_tool() -> ToolDefinition {
    ToolDefinition {
        name: CHAT_HISTORY_TOOL.to_string(),
        description: "Return earlier messages of this conversation as a JSON list, oldest first."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "num_chats": {
                    "type": "integer",
                    "description": "Number of previous exchanges to return. Omit for all of them."
                }
            }
        }),
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

#[derive(Deserialize)]
struct HistoryArgs {
    #[serde(default)]
    num_chats: Option<usize>,
}

/// Run the knowledge search tool and render its JSON result
pub async fn search_knowledge(knowledge: &dyn KnowledgeSearch, arguments: &str, limit: usize) -> Result<String> {
    let args: SearchArgs = serde_json::from_str(arguments)?;
    let hits = knowledge.search(&args.query, limit).await?;
    if hits.is_empty() {
        return Ok("No documents found".to_string());
    }
    Ok(serde_json::to_string(&hits)?)
}

/// Render the last `num_chats` exchanges (a user message plus its reply)
pub fn chat_history(history: &[StoredMessage], arguments: &str) -> Result<String> {
    let args: HistoryArgs = if arguments.trim().is_empty() {
        HistoryArgs { num_chats: None }
    } else {
        serde_json::from_str(arguments)?
    };

    let start = match args.num_chats {
        Some(n) => history.len().saturating_sub(n.saturating_mul(2)),
        None => 0,
    };
    let messages: Vec<Value> = history[start..]
        .iter()
        .map(|m| json!({"role": m.role.to_string(), "content": m.content}))
        .collect();
    Ok(serde_json::to_string(&messages)?)
}

/// Display form of a call: `name(key=value, ...)`
pub fn format_tool_call(call: &ToolCall) -> String {
    let args = match serde_json::from_str::<Value>(&call.function.arguments) {
        Ok(Value::Object(map)) => map
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{}={}", key, s),
                other => format!("{}={}", key, other),
            })
            .collect::<Vec<_>>()
            .join(", "),
        _ => call.function.arguments.clone(),
    };
    format!("{}({})", call.function.name, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::MessageRole;
    use crate::error::Error;
    use crate::knowledge::KnowledgeHit;
    use async_trait::async_trait;

    struct OneHit;

    #[async_trait]
    impl KnowledgeSearch for OneHit {
        async fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeHit>> {
            if query == "nothing" {
                return Ok(Vec::new());
            }
            Ok(vec![KnowledgeHit {
                name: "ThaiRecipes_3".to_string(),
                page: 3,
                score: 0.9,
                content: format!("{} (limit {})", query, limit),
            }])
        }
    }

    fn exchange(n: usize) -> Vec<StoredMessage> {
        (0..n)
            .flat_map(|i| {
                [
                    StoredMessage::new(MessageRole::User, format!("q{}", i)),
                    StoredMessage::new(MessageRole::Assistant, format!("a{}", i)),
                ]
            })
            .collect()
    }

    #[tokio::test]
    async fn test_search_renders_hits() {
        let out = search_knowledge(&OneHit, r#"{"query":"green curry"}"#, 5).await.unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[0]["name"], "ThaiRecipes_3");
        assert_eq!(value[0]["content"], "green curry (limit 5)");

        let empty = search_knowledge(&OneHit, r#"{"query":"nothing"}"#, 5).await.unwrap();
        assert_eq!(empty, "No documents found");
    }

    #[tokio::test]
    async fn test_search_rejects_bad_arguments() {
        let err = search_knowledge(&OneHit, r#"{"q":1}"#, 5).await.unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_history_limits_exchanges() {
        let history = exchange(3);

        let last: Vec<Value> = serde_json::from_str(&chat_history(&history, r#"{"num_chats":1}"#).unwrap()).unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0]["content"], "q2");
        assert_eq!(last[1]["role"], "assistant");

        let all: Vec<Value> = serde_json::from_str(&chat_history(&history, "{}").unwrap()).unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(chat_history(&history, "").unwrap(), serde_json::to_string(&all).unwrap());
    }

    #[test]
    fn test_format_tool_call() {
        let call = ToolCall::new("1", SEARCH_KNOWLEDGE_TOOL, r#"{"query":"pad thai"}"#);
        assert_eq!(format_tool_call(&call), "search_knowledge_base(query=pad thai)");

        let call = ToolCall::new("2", CHAT_HISTORY_TOOL, r#"{"num_chats":2}"#);
        assert_eq!(format_tool_call(&call), "get_chat_history(num_chats=2)");

        let call = ToolCall::new("3", CHAT_HISTORY_TOOL, "");
        assert_eq!(format_tool_call(&call), "get_chat_history()");
    }
}
