//! Session resolution: continue the user's latest run or start a new one

use crate::assistant::{Assistant, AssistantOptions, ChatModel, OpenAiChat};
use crate::config::Config;
use crate::conversation::ConversationStore;
use crate::error::{Error, Result};
use crate::knowledge::KnowledgeSearch;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// What the factory is asked to build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    /// Run to continue; `None` lets the assistant assign a fresh one
    pub run_id: Option<String>,
    pub user_id: String,
}

/// A constructed assistant that owns the interactive loop
#[async_trait]
pub trait InteractiveAssistant: Send {
    /// Concrete run id, assigned by construction time
    fn run_id(&self) -> &str;

    /// Blocks until the user ends the session
    async fn run(&mut self) -> Result<()>;
}

/// Builds assistants bound to the knowledge collection and storage
#[async_trait]
pub trait AssistantFactory: Send + Sync {
    type Assistant: InteractiveAssistant;

    async fn create(&self, request: SessionRequest) -> Result<Self::Assistant>;
}

/// A resolved session, ready for the interactive loop
pub struct Session<A> {
    pub assistant: A,
    /// True when an existing run was bound
    pub continued: bool,
}

impl<A: InteractiveAssistant> Session<A> {
    pub fn run_id(&self) -> &str {
        self.assistant.run_id()
    }

    /// `Started Run: <id>` or `Continuing Run: <id>`
    pub fn status_line(&self) -> String {
        let verb = if self.continued { "Continuing" } else { "Started" };
        format!("{} Run: {}", verb, self.run_id())
    }
}

/// Chooses the run a session binds to
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionResolver;

impl SessionResolver {
    pub fn new() -> Self {
        Self
    }

    /// The user's latest run. Store failures become `Error::RunLookup`.
    pub async fn latest_run(&self, user_id: &str, store: &dyn ConversationStore) -> Result<Option<String>> {
        let ids = store
            .get_all_run_ids(user_id)
            .await
            .map_err(|e| Error::RunLookup(e.to_string()))?;
        Ok(ids.into_iter().next())
    }

    /// The run to continue, if any. Lookup failures fall back to a new run.
    pub async fn previous_run(&self, force_new: bool, user_id: &str, store: &dyn ConversationStore) -> Option<String> {
        if force_new {
            return None;
        }

        match self.latest_run(user_id, store).await {
            Ok(run_id) => run_id,
            Err(e) => {
                warn!(user = %user_id, error = %e, "Starting a new run");
                let cause = match e {
                    Error::RunLookup(cause) => cause,
                    other => other.to_string(),
                };
                println!("Failed to get previous run: {}. Starting new...", cause);
                None
            }
        }
    }

    /// Pick a run and construct the session around it. Construction
    /// failure is returned as `Error::SessionConstruction`.
    pub async fn resolve<F: AssistantFactory>(
        &self,
        force_new: bool,
        user_id: &str,
        store: &dyn ConversationStore,
        factory: &F,
    ) -> Result<Session<F::Assistant>> {
        let run_id = self.previous_run(force_new, user_id, store).await;
        let continued = run_id.is_some();

        let assistant = factory
            .create(SessionRequest {
                run_id,
                user_id: user_id.to_string(),
            })
            .await
            .map_err(|e| match e {
                Error::SessionConstruction(_) => e,
                other => Error::SessionConstruction(other.to_string()),
            })?;

        let session = Session { assistant, continued };
        info!(user = %user_id, run_id = %session.run_id(), continued, "Session resolved");
        println!("{}\n", session.status_line());
        Ok(session)
    }
}

/// Factory for the real assistant. The chat model is built per session.
pub struct AssistantBuilder {
    config: Config,
    knowledge: Arc<dyn KnowledgeSearch>,
    storage: Arc<dyn ConversationStore>,
}

impl AssistantBuilder {
    pub fn new(config: &Config, knowledge: Arc<dyn KnowledgeSearch>, storage: Arc<dyn ConversationStore>) -> Self {
        Self {
            config: config.clone(),
            knowledge,
            storage,
        }
    }
}

#[async_trait]
impl AssistantFactory for AssistantBuilder {
    type Assistant = Assistant;

    async fn create(&self, request: SessionRequest) -> Result<Assistant> {
        let model: Arc<dyn ChatModel> = Arc::new(OpenAiChat::new(&self.config)?);

        Assistant::new(AssistantOptions {
            run_id: request.run_id,
            user_id: request.user_id,
            model,
            knowledge: self.knowledge.clone(),
            storage: self.storage.clone(),
            settings: self.config.assistant.clone(),
        })
        .await
    }
}

#[async_trait]
impl InteractiveAssistant for Assistant {
    fn run_id(&self) -> &str {
        Assistant::run_id(self)
    }

    async fn run(&mut self) -> Result<()> {
        self.cli_app().await
    }
}
