//! Conversation storage
//!
//! Runs are persisted conversations owned by a user. The store lists a
//! user's run ids **most recently created first** (later insertion wins a
//! timestamp tie), so the first id is the latest run.

mod schema;
mod sqlite;

pub use schema::*;
pub use sqlite::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Who authored a stored message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            _ => Err(Error::Other(format!("Unknown message role: {}", s))),
        }
    }
}

/// A persisted conversation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub user_id: String,
    pub run_name: Option<String>,
    /// Microseconds since the Unix epoch
    pub created_at: i64,
    pub updated_at: i64,
}

/// A message in a run's chat log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: MessageRole,
    pub content: String,
    pub created_at: i64,
}

impl StoredMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: chrono::Utc::now().timestamp_micros(),
        }
    }
}

/// Persistence for conversation runs
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Run ids owned by `user_id`, most recently created first
    async fn get_all_run_ids(&self, user_id: &str) -> Result<Vec<String>>;

    /// Create a fresh run with a newly assigned id
    async fn create_run(&self, user_id: &str) -> Result<RunRecord>;

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>>;

    /// Append to a run's chat log atomically: either every message is
    /// stored or none is. Fails if the run does not exist.
    async fn append_messages(&self, run_id: &str, messages: &[StoredMessage]) -> Result<()>;

    /// The run's chat log, oldest first
    async fn list_messages(&self, run_id: &str) -> Result<Vec<StoredMessage>>;
}
