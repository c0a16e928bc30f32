//! Adapter interfaces for external capabilities.
//!
//! The orchestrator only depends on the traits below. Each trait is one
//! opaque outbound call; timeouts and fallbacks are applied by the caller.

pub mod arxiv;
pub mod chat;
pub mod pdf;
pub mod proposal;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{DocumentItem, ModelType, ProposalResult};

pub use arxiv::{ArxivRetriever, PdfFetcher};
pub use chat::ChatClient;
pub use pdf::PdftotextExtractor;

/// Best-effort translation into English search keywords
#[async_trait]
pub trait Translator: Send + Sync {
    fn name(&self) -> &str;

    async fn translate(&self, text: &str) -> Result<String>;
}

/// Document search; may return fewer than `max_count` items or none
#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &str;

    async fn retrieve(&self, query: &str, max_count: u32) -> Result<Vec<DocumentItem>>;
}

/// Download one document's full content, returning the local copy
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, item: &DocumentItem, timeout: Duration) -> Result<PathBuf>;
}

/// Pull plain text out of a fetched document
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, item: &DocumentItem, local: &Path, max_pages: u32) -> Result<String>;
}

/// Everything the generator gets to work with
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    /// Topic as supplied by the user (untranslated)
    pub topic: &'a str,
    pub items: &'a [DocumentItem],
    /// One entry per item, in the same order
    pub extracted_texts: &'a [String],
    pub model: ModelType,
    pub max_tokens: u32,
}

/// The generator's error detail
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GenerationError {
    pub message: String,
    /// Raw response or other diagnostic payload
    pub details: Option<Value>,
}

impl GenerationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Produce the final proposal
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> std::result::Result<ProposalResult, GenerationError>;
}

/// The full set of capabilities a pipeline run needs
#[derive(Clone)]
pub struct Capabilities {
    pub translator: Arc<dyn Translator>,
    pub retriever: Arc<dyn Retriever>,
    pub fetcher: Arc<dyn Fetcher>,
    pub extractor: Arc<dyn Extractor>,
    pub generator: Arc<dyn Generator>,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("translator", &self.translator.name())
            .field("retriever", &self.retriever.name())
            .field("fetcher", &self.fetcher.name())
            .field("extractor", &self.extractor.name())
            .field("generator", &self.generator.name())
            .finish()
    }
}

impl Capabilities {
    /// Wire up the production adapters from resolved configuration
    pub fn from_config(config: &crate::config::ResolvedConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("papertrail/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let chat = Arc::new(ChatClient::from_config(&config.llm, http.clone()));

        Ok(Self {
            translator: chat.clone(),
            retriever: Arc::new(ArxivRetriever::new(http.clone())),
            fetcher: Arc::new(PdfFetcher::new(http, config.pdf_dir())),
            extractor: Arc::new(PdftotextExtractor::new()),
            generator: chat,
        })
    }
}
