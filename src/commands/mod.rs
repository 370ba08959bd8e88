//! CLI commands implementation

pub mod chat;

pub use chat::*;
