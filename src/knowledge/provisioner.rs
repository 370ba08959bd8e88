use super::{EmbeddingIndex, LoadReport};
use crate::error::Error;
use tracing::{error, info, warn};

/// Result of bringing a collection to the ready state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The non-destructive load succeeded
    Loaded(LoadReport),
    /// The load failed and a full rebuild succeeded
    Rebuilt { load_error: String, report: LoadReport },
    /// Both tiers failed
    Failed {
        load_error: String,
        rebuild_error: String,
    },
}

impl ProvisionOutcome {
    pub fn is_ready(&self) -> bool {
        !matches!(self, ProvisionOutcome::Failed { .. })
    }

    pub fn rebuilt(&self) -> bool {
        matches!(self, ProvisionOutcome::Rebuilt { .. })
    }

    /// The failure of both tiers as one error
    pub fn error(&self) -> Option<Error> {
        match self {
            ProvisionOutcome::Failed {
                load_error,
                rebuild_error,
            } => Some(Error::Provisioning(format!(
                "load failed ({}); rebuild failed ({})",
                load_error, rebuild_error
            ))),
            _ => None,
        }
    }
}

/// Makes a knowledge collection queryable: a cheap load first, a full
/// rebuild only if that fails. Never returns an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct KnowledgeProvisioner;

impl KnowledgeProvisioner {
    pub fn new() -> Self {
        Self
    }

    pub async fn provision(&self, index: &dyn EmbeddingIndex) -> ProvisionOutcome {
        println!("Loading knowledge base...");
        let load_error = match index.load(false).await {
            Ok(report) => {
                info!(collection = %index.name(), embedded = report.chunks_embedded, "Knowledge base ready");
                println!("Knowledge base loaded successfully.");
                return ProvisionOutcome::Loaded(report);
            }
            Err(e) => e.to_string(),
        };

        warn!(collection = %index.name(), error = %load_error, "Initial load failed");
        println!("Initial load failed: {}", load_error);
        println!("Attempting to recreate knowledge base...");

        match index.load(true).await {
            Ok(report) => {
                info!(collection = %index.name(), embedded = report.chunks_embedded, "Knowledge base rebuilt");
                println!("Knowledge base created and loaded successfully.");
                ProvisionOutcome::Rebuilt { load_error, report }
            }
            Err(e) => {
                let rebuild_error = e.to_string();
                error!(collection = %index.name(), error = %rebuild_error, "Knowledge base rebuild failed");
                println!("Failed to create knowledge base: {}", rebuild_error);
                ProvisionOutcome::Failed {
                    load_error,
                    rebuild_error,
                }
            }
        }
    }

    /// True once the collection is queryable
    pub async fn ensure_ready(&self, index: &dyn EmbeddingIndex) -> bool {
        self.provision(index).await.is_ready()
    }
}
