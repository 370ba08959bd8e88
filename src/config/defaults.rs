//! Default values for configuration

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    "http://127.0.0.1:6334".to_string()
}

/// Default collection name
pub fn default_collection_name() -> String {
    "recipes".to_string()
}

/// Default PDF documents backing the knowledge base
pub fn default_pdf_urls() -> Vec<String> {
    vec!["https://phi-public.s3.amazonaws.com/recipes/ThaiRecipes.pdf".to_string()]
}

/// Default table name for assistant runs
pub fn default_table_name() -> String {
    "pdf_assistant".to_string()
}

/// Default OpenAI-compatible API base URL
pub fn default_openai_base_url() -> String {
    "https://api.openai.com/v1/".to_string()
}

/// Default chat model
pub fn default_chat_model() -> String {
    "gpt-4o".to_string()
}

/// Default embedding model (1536-dim)
pub fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

/// Default embedding dimension
pub fn default_embedding_dimension() -> usize {
    1536
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default maximum characters per chunk
pub fn default_chunk_max_chars() -> usize {
    1500
}

/// Default minimum characters per chunk
pub fn default_chunk_min_chars() -> usize {
    100
}

/// Default overlap characters between chunks
pub fn default_chunk_overlap() -> usize {
    200
}

pub fn default_show_tool_calls() -> bool {
    true
}

pub fn default_search_knowledge() -> bool {
    true
}

pub fn default_read_chat_history() -> bool {
    true
}

pub fn default_markdown() -> bool {
    true
}

/// Default number of knowledge chunks returned per search
pub fn default_num_documents() -> usize {
    5
}

/// Default number of prior messages replayed into the prompt
pub fn default_history_messages() -> usize {
    6
}

/// Upper bound on model/tool round trips for a single user turn
pub fn default_max_tool_rounds() -> usize {
    8
}
