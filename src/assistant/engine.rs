use super::tools::{
    chat_history, chat_history_tool, format_tool_call, search_knowledge, search_knowledge_tool,
    CHAT_HISTORY_TOOL, SEARCH_KNOWLEDGE_TOOL,
};
use super::{ChatMessage, ChatModel, ToolCall, ToolDefinition};
use crate::config::AssistantConfig;
use crate::conversation::{ConversationStore, MessageRole, StoredMessage};
use crate::error::{Error, Result};
use crate::knowledge::KnowledgeSearch;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

const EXIT_COMMANDS: [&str; 3] = ["exit", "quit", "bye"];

/// Everything an assistant is built from
pub struct AssistantOptions {
    /// Run to continue; `None` starts a new run
    pub run_id: Option<String>,
    pub user_id: String,
    pub model: Arc<dyn ChatModel>,
    pub knowledge: Arc<dyn KnowledgeSearch>,
    pub storage: Arc<dyn ConversationStore>,
    pub settings: AssistantConfig,
}

/// Answer to one user turn
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub content: String,
    /// Tools executed while producing the answer, in order
    pub tool_calls: Vec<ToolCall>,
}

/// An interactive assistant bound to one conversation run
pub struct Assistant {
    run_id: String,
    user_id: String,
    model: Arc<dyn ChatModel>,
    knowledge: Arc<dyn KnowledgeSearch>,
    storage: Arc<dyn ConversationStore>,
    settings: AssistantConfig,
    history: Vec<StoredMessage>,
}

impl Assistant {
    /// Bind to an existing run (loading its history) or create a new one
    pub async fn new(options: AssistantOptions) -> Result<Self> {
        let AssistantOptions {
            run_id,
            user_id,
            model,
            knowledge,
            storage,
            settings,
        } = options;

        let (run_id, history) = match run_id {
            Some(id) => {
                let run = storage
                    .get_run(&id)
                    .await?
                    .ok_or_else(|| Error::RunNotFound(id.clone()))?;
                if run.user_id != user_id {
                    warn!(run_id = %id, owner = %run.user_id, user = %user_id, "Run belongs to another user");
                }
                let history = storage.list_messages(&id).await?;
                debug!(run_id = %id, messages = history.len(), "Loaded run history");
                (run.run_id, history)
            }
            None => (storage.create_run(&user_id).await?.run_id, Vec::new()),
        };

        info!(run_id = %run_id, user = %user_id, model = %model.model_name(), "Assistant ready");

        Ok(Self {
            run_id,
            user_id,
            model,
            knowledge,
            storage,
            settings,
            history,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Messages of this run, oldest first
    pub fn history(&self) -> &[StoredMessage] {
        &self.history
    }

    fn system_prompt(&self) -> String {
        let mut lines = vec![
            "You are a helpful assistant that answers questions using the documents in your knowledge base."
                .to_string(),
        ];
        if self.settings.search_knowledge {
            lines.push(format!(
                "Call `{}` before answering questions about the documents and base your answer on what it returns.",
                SEARCH_KNOWLEDGE_TOOL
            ));
        }
        if self.settings.read_chat_history {
            lines.push(format!(
                "Call `{}` when you need earlier parts of this conversation.",
                CHAT_HISTORY_TOOL
            ));
        }
        if self.settings.markdown {
            lines.push("Use markdown to format your answers.".to_string());
        }
        lines.join("\n")
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        let mut tools = Vec::new();
        if self.settings.search_knowledge {
            tools.push(search_knowledge_tool());
        }
        if self.settings.read_chat_history {
            tools.push(chat_history_tool());
        }
        tools
    }

    fn prompt(&self, input: &str) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(self.system_prompt())];
        if self.settings.read_chat_history {
            let start = self.history.len().saturating_sub(self.settings.history_messages);
            messages.extend(self.history[start..].iter().map(ChatMessage::from));
        }
        messages.push(ChatMessage::user(input));
        messages
    }

    /// Execute one tool call. Failures go back to the model as text.
    async fn run_tool(&self, call: &ToolCall) -> String {
        let arguments = call.function.arguments.as_str();
        let result = match call.function.name.as_str() {
            SEARCH_KNOWLEDGE_TOOL if self.settings.search_knowledge => {
                search_knowledge(self.knowledge.as_ref(), arguments, self.settings.num_documents).await
            }
            CHAT_HISTORY_TOOL if self.settings.read_chat_history => chat_history(&self.history, arguments),
            other => Err(Error::Llm(format!("Unknown tool: {}", other))),
        };

        result.unwrap_or_else(|e| {
            warn!(tool = %call.function.name, error = %e, "Tool call failed");
            format!("Error: {}", e)
        })
    }

    /// Answer one user message, running tools as the model requests them.
    /// The exchange is persisted only once a final answer exists.
    pub async fn chat(&mut self, input: &str) -> Result<Reply> {
        let mut messages = self.prompt(input);
        let tools = self.tools();
        let mut executed = Vec::new();

        for round in 0..self.settings.max_tool_rounds {
            let completion = self.model.complete(&messages, &tools).await?;

            if completion.tool_calls.is_empty() {
                let content = completion.content.unwrap_or_default();
                self.record(input, &content).await?;
                return Ok(Reply {
                    content,
                    tool_calls: executed,
                });
            }

            debug!(round, calls = completion.tool_calls.len(), "Model requested tools");
            messages.push(ChatMessage::tool_request(
                completion.content,
                completion.tool_calls.clone(),
            ));
            for call in completion.tool_calls {
                let output = self.run_tool(&call).await;
                messages.push(ChatMessage::tool_result(call.id.clone(), output));
                executed.push(call);
            }
        }

        Err(Error::Llm(format!(
            "No final answer after {} model rounds",
            self.settings.max_tool_rounds
        )))
    }

    async fn record(&mut self, input: &str, answer: &str) -> Result<()> {
        let exchange = [
            StoredMessage::new(MessageRole::User, input),
            StoredMessage::new(MessageRole::Assistant, answer),
        ];
        self.storage.append_messages(&self.run_id, &exchange).await?;
        self.history.extend(exchange);
        Ok(())
    }

    /// Interactive loop on stdin/stdout until the user leaves
    pub async fn cli_app(&mut self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        self.cli_app_with(stdin, std::io::stdout()).await
    }

    /// Interactive loop over arbitrary input and output. Ends on `exit`,
    /// `quit`, `bye` or end of input.
    pub async fn cli_app_with<R, W>(&mut self, input: R, mut out: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin + Send,
        W: Write + Send,
    {
        let mut lines = input.lines();

        loop {
            write!(out, "User: ")?;
            out.flush()?;

            let Some(line) = lines.next_line().await? else {
                writeln!(out)?;
                break;
            };

            let message = line.trim();
            if message.is_empty() {
                continue;
            }
            if EXIT_COMMANDS.contains(&message.to_lowercase().as_str()) {
                break;
            }

            match self.chat(message).await {
                Ok(reply) => {
                    if self.settings.show_tool_calls {
                        for call in &reply.tool_calls {
                            writeln!(out, " - Running: {}", format_tool_call(call))?;
                        }
                    }
                    writeln!(out, "Assistant: {}\n", reply.content)?;
                }
                Err(e) => {
                    warn!(run_id = %self.run_id, error = %e, "Turn failed");
                    writeln!(out, "Error: {}\n", e)?;
                }
            }
        }

        info!(run_id = %self.run_id, messages = self.history.len(), "Session ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::Completion;
    use crate::conversation::{RunRecord, SqliteStorage};
    use crate::knowledge::KnowledgeHit;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned completions and records every prompt it sees
    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<Completion>>>,
        prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<Completion>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<Vec<ChatMessage>> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, messages: &[ChatMessage], _tools: &[ToolDefinition]) -> Result<Completion> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Llm("script exhausted".to_string())))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    struct Recipes;

    #[async_trait]
    impl KnowledgeSearch for Recipes {
        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<KnowledgeHit>> {
            Ok(vec![KnowledgeHit {
                name: "ThaiRecipes_12".to_string(),
                page: 12,
                score: 0.8,
                content: format!("Recipe for {}", query),
            }])
        }
    }

    fn text(content: &str) -> Result<Completion> {
        Ok(Completion {
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
        })
    }

    fn calls(calls: Vec<ToolCall>) -> Result<Completion> {
        Ok(Completion {
            content: None,
            tool_calls: calls,
        })
    }

    /// Delegates to SQLite but rejects every message write
    struct ReadOnlyRuns(Arc<SqliteStorage>);

    #[async_trait]
    impl ConversationStore for ReadOnlyRuns {
        async fn get_all_run_ids(&self, user_id: &str) -> Result<Vec<String>> {
            self.0.get_all_run_ids(user_id).await
        }

        async fn create_run(&self, user_id: &str) -> Result<RunRecord> {
            self.0.create_run(user_id).await
        }

        async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
            self.0.get_run(run_id).await
        }

        async fn append_messages(&self, _run_id: &str, _messages: &[StoredMessage]) -> Result<()> {
            Err(Error::Database(sqlx::Error::PoolTimedOut))
        }

        async fn list_messages(&self, run_id: &str) -> Result<Vec<StoredMessage>> {
            self.0.list_messages(run_id).await
        }
    }

    async fn storage() -> Arc<SqliteStorage> {
        Arc::new(SqliteStorage::connect("sqlite::memory:", "pdf_assistant").await.unwrap())
    }

    async fn assistant(
        model: Arc<ScriptedModel>,
        storage: Arc<SqliteStorage>,
        run_id: Option<String>,
    ) -> Result<Assistant> {
        Assistant::new(AssistantOptions {
            run_id,
            user_id: "alice".to_string(),
            model,
            knowledge: Arc::new(Recipes),
            storage,
            settings: AssistantConfig::default(),
        })
        .await
    }

    #[tokio::test]
    async fn test_new_run_is_created_when_none_given() {
        let store = storage().await;
        let assistant = assistant(ScriptedModel::new(vec![]), store.clone(), None).await.unwrap();

        assert_eq!(store.get_all_run_ids("alice").await.unwrap(), vec![assistant.run_id().to_string()]);
        assert!(assistant.history().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_run_is_rejected() {
        let store = storage().await;
        let result = assistant(ScriptedModel::new(vec![]), store, Some("run-404".to_string())).await;
        assert!(matches!(result, Err(Error::RunNotFound(id)) if id == "run-404"));
    }

    #[tokio::test]
    async fn test_tool_loop_feeds_results_back() {
        let store = storage().await;
        let model = ScriptedModel::new(vec![
            calls(vec![ToolCall::new("call_1", SEARCH_KNOWLEDGE_TOOL, r#"{"query":"tom yum"}"#)]),
            text("Use lemongrass."),
        ]);
        let mut assistant = assistant(model.clone(), store.clone(), None).await.unwrap();

        let reply = assistant.chat("How do I make tom yum?").await.unwrap();

        assert_eq!(reply.content, "Use lemongrass.");
        assert_eq!(reply.tool_calls.len(), 1);

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 2);
        let tool_message = prompts[1].last().unwrap();
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_message.content.as_deref().unwrap().contains("Recipe for tom yum"));

        let stored = store.list_messages(assistant.run_id()).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].content, "Use lemongrass.");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() {
        let store = storage().await;
        let model = ScriptedModel::new(vec![
            calls(vec![ToolCall::new("call_1", "delete_everything", "{}")]),
            text("Sorry."),
        ]);
        let mut assistant = assistant(model.clone(), store, None).await.unwrap();

        assistant.chat("hi").await.unwrap();

        let result = model.prompts()[1].last().unwrap().content.clone().unwrap();
        assert!(result.starts_with("Error: "));
        assert!(result.contains("delete_everything"));
    }

    #[tokio::test]
    async fn test_runaway_tool_loop_is_bounded() {
        let store = storage().await;
        let rounds = AssistantConfig::default().max_tool_rounds;
        let replies = (0..rounds)
            .map(|i| calls(vec![ToolCall::new(format!("call_{i}"), CHAT_HISTORY_TOOL, "{}")]))
            .collect();
        let mut assistant = assistant(ScriptedModel::new(replies), store.clone(), None).await.unwrap();

        assert!(matches!(assistant.chat("loop").await, Err(Error::Llm(_))));
        assert!(store.list_messages(assistant.run_id()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_continued_run_replays_history() {
        let store = storage().await;
        let first = {
            let mut assistant = assistant(ScriptedModel::new(vec![text("Green curry.")]), store.clone(), None)
                .await
                .unwrap();
            assistant.chat("Suggest a dish").await.unwrap();
            assistant.run_id().to_string()
        };

        let model = ScriptedModel::new(vec![text("It uses coconut milk.")]);
        let mut resumed = assistant(model.clone(), store, Some(first.clone())).await.unwrap();
        assert_eq!(resumed.run_id(), first);
        assert_eq!(resumed.history().len(), 2);

        resumed.chat("What is in it?").await.unwrap();

        let prompt = &model.prompts()[0];
        let contents: Vec<_> = prompt.iter().filter_map(|m| m.content.clone()).collect();
        assert_eq!(&contents[1..], ["Suggest a dish", "Green curry.", "What is in it?"]);
    }

    #[tokio::test]
    async fn test_cli_app_shows_tool_calls_and_exits() {
        let store = storage().await;
        let model = ScriptedModel::new(vec![
            calls(vec![ToolCall::new("call_1", SEARCH_KNOWLEDGE_TOOL, r#"{"query":"satay"}"#)]),
            text("Grill the skewers."),
        ]);
        let mut assistant = assistant(model, store, None).await.unwrap();

        let input: &[u8] = b"How do I make satay?\n\nbye\nnever read\n";
        let mut out = Vec::new();
        assistant.cli_app_with(input, &mut out).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains(" - Running: search_knowledge_base(query=satay)"));
        assert!(out.contains("Assistant: Grill the skewers."));
        assert_eq!(assistant.history().len(), 2);
    }

    #[tokio::test]
    async fn test_cli_app_survives_failed_turn() {
        let store = storage().await;
        let model = ScriptedModel::new(vec![Err(Error::Llm("rate limited".to_string())), text("Hello.")]);
        let mut assistant = assistant(model, store, None).await.unwrap();

        let input: &[u8] = b"first\nsecond\n";
        let mut out = Vec::new();
        assistant.cli_app_with(input, &mut out).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Error: Language model error: rate limited"));
        assert!(out.contains("Assistant: Hello."));
        assert_eq!(assistant.history().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_history_untouched() {
        let store = storage().await;
        let mut assistant = Assistant::new(AssistantOptions {
            run_id: None,
            user_id: "alice".to_string(),
            model: ScriptedModel::new(vec![text("Pad thai.")]),
            knowledge: Arc::new(Recipes),
            storage: Arc::new(ReadOnlyRuns(store.clone())),
            settings: AssistantConfig::default(),
        })
        .await
        .unwrap();

        assert!(matches!(assistant.chat("Suggest a dish").await, Err(Error::Database(_))));
        assert!(assistant.history().is_empty());
        assert!(store.list_messages(assistant.run_id()).await.unwrap().is_empty());
    }
}
