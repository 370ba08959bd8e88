//! Chat command: provision the knowledge base, resolve a session, hand off
//! to the interactive loop

use crate::config::Config;
use crate::conversation::{ConversationStore, LazySqliteStorage};
use crate::knowledge::{EmbeddingIndex, KnowledgeProvisioner, KnowledgeSearch, PdfKnowledgeBase};
use crate::session::{AssistantBuilder, AssistantFactory, InteractiveAssistant, SessionResolver};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Lifecycle of one chat invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPhase {
    NotStarted,
    KnowledgeReady,
    SessionResolved,
    Running,
    /// Terminal; the interactive loop is never entered
    Failed,
}

impl ChatPhase {
    /// Next phase after the current step succeeded or failed
    pub fn advance(self, ok: bool) -> ChatPhase {
        match (self, ok) {
            (ChatPhase::Failed, _) => ChatPhase::Failed,
            (ChatPhase::Running, _) => ChatPhase::Running,
            (_, false) => ChatPhase::Failed,
            (ChatPhase::NotStarted, true) => ChatPhase::KnowledgeReady,
            (ChatPhase::KnowledgeReady, true) => ChatPhase::SessionResolved,
            (ChatPhase::SessionResolved, true) => ChatPhase::Running,
        }
    }
}

/// What a chat invocation went through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOutcome {
    /// Every phase entered, starting with `NotStarted`
    pub phases: Vec<ChatPhase>,
    /// `Started Run: ..` / `Continuing Run: ..` once a session exists
    pub status: Option<String>,
    /// Error that ended the interactive loop, if any
    pub loop_error: Option<String>,
}

impl ChatOutcome {
    pub fn phase(&self) -> ChatPhase {
        self.phases.last().copied().unwrap_or(ChatPhase::NotStarted)
    }

    fn step(&mut self, ok: bool) {
        let next = self.phase().advance(ok);
        debug!(from = ?self.phase(), to = ?next, "Chat phase");
        self.phases.push(next);
    }
}

/// Run the chat lifecycle against the given collaborators. Never returns an
/// error: failures are reported and recorded in the outcome.
pub async fn run_chat<F: AssistantFactory>(
    index: &dyn EmbeddingIndex,
    store: &dyn ConversationStore,
    factory: &F,
    force_new: bool,
    user_id: &str,
) -> ChatOutcome {
    let mut outcome = ChatOutcome {
        phases: vec![ChatPhase::NotStarted],
        status: None,
        loop_error: None,
    };

    let provisioned = KnowledgeProvisioner::new().provision(index).await;
    outcome.step(provisioned.is_ready());
    if let Some(e) = provisioned.error() {
        error!(collection = %index.name(), error = %e, "Knowledge base unavailable");
        println!("Knowledge base setup failed. Exiting.");
        return outcome;
    }

    let mut session = match SessionResolver::new().resolve(force_new, user_id, store, factory).await {
        Ok(session) => session,
        Err(e) => {
            error!(user = %user_id, error = %e, "Session start failed");
            println!("Assistant failed to start: {}", e);
            outcome.step(false);
            return outcome;
        }
    };
    outcome.step(true);
    outcome.status = Some(session.status_line());

    outcome.step(true);
    info!(run_id = %session.run_id(), "Entering interactive loop");
    if let Err(e) = session.assistant.run().await {
        error!(run_id = %session.run_id(), error = %e, "Interactive loop ended with error");
        println!("Assistant stopped: {}", e);
        outcome.loop_error = Some(e.to_string());
    }

    outcome
}

/// Wire the real collaborators from configuration and run the chat.
/// Only the knowledge base is built up front; the conversation store and
/// chat model are opened by the session stage.
pub async fn cmd_chat(config: &Config, force_new: bool, user_id: &str) -> ChatOutcome {
    info!(user = %user_id, force_new, collection = %config.collection_name, "Starting chat");

    match PdfKnowledgeBase::from_config(config) {
        Ok(knowledge) => chat_with_knowledge(config, Arc::new(knowledge), force_new, user_id).await,
        Err(e) => {
            error!(collection = %config.collection_name, error = %e, "Knowledge base construction failed");
            println!("Failed to create knowledge base: {}", e);
            println!("Knowledge base setup failed. Exiting.");
            ChatOutcome {
                phases: vec![ChatPhase::NotStarted, ChatPhase::Failed],
                status: None,
                loop_error: None,
            }
        }
    }
}

/// Run the chat over an already built knowledge base, with conversation
/// storage opened lazily from `config`
pub async fn chat_with_knowledge<K>(config: &Config, knowledge: Arc<K>, force_new: bool, user_id: &str) -> ChatOutcome
where
    K: EmbeddingIndex + KnowledgeSearch + 'static,
{
    let storage = Arc::new(LazySqliteStorage::new(&config.storage_url(), &config.table_name));
    let factory = AssistantBuilder::new(config, knowledge.clone(), storage.clone());

    run_chat(knowledge.as_ref(), storage.as_ref(), &factory, force_new, user_id).await
}
