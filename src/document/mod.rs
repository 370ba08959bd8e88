//! Document sources
//!
//! A document source turns a fixed list of locators into parsed text on
//! demand. The knowledge base asks for documents only while (re)building.

mod pdf;

pub use pdf::*;

use crate::error::Result;
use async_trait::async_trait;

/// A unit of extracted text (one PDF page)
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    /// Stable identifier, e.g. `ThaiRecipes_3`
    pub name: String,

    /// Locator the content came from
    pub uri: String,

    /// 1-based page number within the source file
    pub page: usize,

    pub text: String,
}

/// Produces parsed documents from configured locators
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Locators this source reads from
    fn locators(&self) -> &[String];

    /// Fetch and parse every document
    async fn read(&self) -> Result<Vec<SourceDocument>>;
}

/// Normalize whitespace in extracted text
pub fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut pending_newlines = 0;
    let mut pending_space = false;

    for c in text.chars() {
        if c == '\n' {
            pending_newlines += 1;
        } else if c.is_whitespace() {
            pending_space = true;
        } else {
            if !result.is_empty() {
                if pending_newlines >= 2 {
                    result.push_str("\n\n");
                } else if pending_newlines == 1 {
                    result.push('\n');
                } else if pending_space {
                    result.push(' ');
                }
            }
            pending_newlines = 0;
            pending_space = false;
            result.push(c);
        }
    }

    result
}
