//! pdf-assistant: chat with a remote PDF through retrieval-augmented generation
//!
//! The PDF is chunked, embedded and stored in a Qdrant collection. A chat
//! model answers questions by searching that collection, and conversations
//! are persisted in SQLite so they can be resumed.

pub mod assistant;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod document;
pub mod embed;
pub mod error;
pub mod knowledge;
pub mod progress;
pub mod session;
pub mod store;

pub use error::{Error, Result};
