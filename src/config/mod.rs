//! Configuration management for pdf-assistant
//!
//! Settings are layered: built-in defaults, an optional TOML file, then the
//! process environment (including a `.env` file). The result is validated
//! once at startup and passed explicitly to every component.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable holding the language-model API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "PDF_ASSISTANT_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Language-model API key (never written to disk)
    #[serde(skip)]
    pub openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Chat model used by the assistant
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Qdrant collection name
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Conversation storage connection string (sqlite URL)
    #[serde(default)]
    pub database_url: Option<String>,

    /// Table holding assistant runs
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// PDF locations backing the knowledge base
    #[serde(default = "default_pdf_urls")]
    pub pdf_urls: Vec<String>,

    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Assistant behaviour
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

/// Lookup the expected embedding dimension for a known model
pub fn embedding_dimension_for_model(model: &str) -> Option<usize> {
    match model {
        "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-small" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

impl EmbeddingConfig {
    /// Resolve the effective embedding dimension based on the configured model
    pub fn resolved_dimension(&self) -> usize {
        embedding_dimension_for_model(&self.model).unwrap_or(self.dimension)
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum characters per chunk
    #[serde(default = "default_chunk_max_chars")]
    pub max_chars: usize,

    /// Overlap characters between chunks
    #[serde(default = "default_chunk_overlap")]
    pub overlap_chars: usize,

    /// Minimum chunk size (don't create tiny chunks)
    #[serde(default = "default_chunk_min_chars")]
    pub min_chars: usize,
}

/// Assistant behaviour flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Print each tool invocation before it runs
    #[serde(default = "default_show_tool_calls")]
    pub show_tool_calls: bool,

    /// Offer the knowledge search tool to the model
    #[serde(default = "default_search_knowledge")]
    pub search_knowledge: bool,

    /// Offer the chat history tool and replay recent messages
    #[serde(default = "default_read_chat_history")]
    pub read_chat_history: bool,

    /// Ask the model to answer in markdown
    #[serde(default = "default_markdown")]
    pub markdown: bool,

    /// Chunks returned per knowledge search
    #[serde(default = "default_num_documents")]
    pub num_documents: usize,

    /// Prior messages replayed into each prompt
    #[serde(default = "default_history_messages")]
    pub history_messages: usize,

    /// Maximum model round trips per user turn
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for pdf-assistant data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to the default SQLite database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            openai_api_key: None,
            openai_base_url: default_openai_base_url(),
            chat_model: default_chat_model(),
            qdrant_url: default_qdrant_url(),
            collection_name: default_collection_name(),
            database_url: None,
            table_name: default_table_name(),
            pdf_urls: default_pdf_urls(),
            embedding: EmbeddingConfig::default(),
            chunk: ChunkConfig::default(),
            assistant: AssistantConfig::default(),
            paths: PathsConfig::default(),
        };
        config.init_paths(None);
        config
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: default_chunk_max_chars(),
            overlap_chars: default_chunk_overlap(),
            min_chars: default_chunk_min_chars(),
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            show_tool_calls: default_show_tool_calls(),
            search_knowledge: default_search_knowledge(),
            read_chat_history: default_read_chat_history(),
            markdown: default_markdown(),
            num_documents: default_num_documents(),
            history_messages: default_history_messages(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

impl Config {
    /// Get the default base directory (~/.pdf-assistant)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pdf-assistant")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("assistant.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("assistant.db"),
            base_dir: base,
        };

        Ok(config)
    }

    /// Build the startup configuration from the process environment.
    ///
    /// Reads `.env` if present, then an optional TOML file, then environment
    /// overrides, and validates the result. A missing API key is an error.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let vars: HashMap<String, String> = std::env::vars().collect();

        let config_path = vars
            .get(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_config_path);

        let base = if config_path.exists() {
            Self::load(&config_path)?
        } else {
            debug!("No config file found, using defaults");
            Config::default()
        };

        let config = base.with_env_overrides(&vars);
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides from the given variable map
    pub fn with_env_overrides(mut self, vars: &HashMap<String, String>) -> Self {
        let non_empty = |key: &str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        if let Some(key) = non_empty(API_KEY_ENV) {
            self.openai_api_key = Some(key);
        }
        if let Some(url) = non_empty("OPENAI_BASE_URL") {
            self.openai_base_url = url;
        }
        if let Some(model) = non_empty("OPENAI_MODEL_NAME") {
            self.chat_model = model;
        }
        if let Some(url) = non_empty("QDRANT_URL") {
            self.qdrant_url = url;
        }
        if let Some(url) = non_empty("DATABASE_URL") {
            self.database_url = Some(url);
        }
        self
    }

    /// The API key, or a configuration error if it is absent
    pub fn api_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| Error::Config(format!("{} is missing from the environment", API_KEY_ENV)))
    }

    /// Effective conversation storage URL
    pub fn storage_url(&self) -> String {
        self.database_url
            .clone()
            .unwrap_or_else(|| format!("sqlite://{}?mode=rwc", self.paths.db_file.display()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.api_key()?;

        if self.pdf_urls.is_empty() {
            return Err(Error::Config("pdf_urls must not be empty".to_string()));
        }

        for raw in &self.pdf_urls {
            url::Url::parse(raw)
                .map_err(|e| Error::Config(format!("Invalid PDF URL '{}': {}", raw, e)))?;
        }

        if self.collection_name.trim().is_empty() {
            return Err(Error::Config("collection_name must not be empty".to_string()));
        }

        if self.embedding.resolved_dimension() == 0 {
            return Err(Error::Config(
                "embedding.dimension must be positive".to_string(),
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(Error::Config(
                "embedding.batch_size must be positive".to_string(),
            ));
        }

        if self.chunk.max_chars < self.chunk.min_chars {
            return Err(Error::Config(
                "chunk.max_chars must be >= chunk.min_chars".to_string(),
            ));
        }

        if self.chunk.overlap_chars >= self.chunk.max_chars {
            return Err(Error::Config(
                "chunk.overlap_chars must be < chunk.max_chars".to_string(),
            ));
        }

        if self.assistant.max_tool_rounds == 0 {
            return Err(Error::Config(
                "assistant.max_tool_rounds must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
