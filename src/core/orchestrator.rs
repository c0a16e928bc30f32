//! Pipeline orchestrator.
//!
//! Runs the five stages of one project in order: translate, retrieve,
//! fetch, extract, generate. Every stage except generate absorbs capability
//! failures into a fallback value; a generation failure ends the run with the
//! project marked failed. Any other error (store I/O, for instance) is caught
//! once at the top and recorded as a project failure with a bounded message.
//!
//! Progress is written to the project store at each stage boundary, so
//! readers may observe intermediate `status_message` values mid-run.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{Capabilities, GenerationError, GenerationRequest};
use crate::domain::{DocumentItem, ProjectRequest, ProjectUpdate, ProposalResult, Status};

use super::limits::PipelineLimits;
use super::store::ProjectStore;

/// What a pipeline run reports back to the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { project_id: String },
    Failed { project_id: String, error: String },
}

impl RunOutcome {
    pub fn project_id(&self) -> &str {
        match self {
            RunOutcome::Completed { project_id } | RunOutcome::Failed { project_id, .. } => {
                project_id
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

/// Whether `text` contains CJK unified ideographs
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

/// Sequences the pipeline stages for one project at a time.
///
/// Holds no per-run state; everything a run produces goes to the store.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    store: ProjectStore,
    capabilities: Capabilities,
    limits: PipelineLimits,
}

impl Orchestrator {
    pub fn new(store: ProjectStore, capabilities: Capabilities, limits: PipelineLimits) -> Self {
        Self {
            store,
            capabilities,
            limits,
        }
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn limits(&self) -> &PipelineLimits {
        &self.limits
    }

    /// Run every stage for `project_id`.
    ///
    /// Project-level failures come back as `Ok(RunOutcome::Failed)`. An
    /// `Err` means the failure could not even be recorded in the store.
    #[instrument(skip(self, request), fields(project_id = %project_id))]
    pub async fn run(&self, project_id: &str, request: &ProjectRequest) -> Result<RunOutcome> {
        info!(topic = %request.topic, "Starting pipeline run");

        match self.execute(project_id, request).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => self.handle_run_failure(project_id, e).await,
        }
    }

    async fn execute(&self, id: &str, request: &ProjectRequest) -> Result<RunOutcome> {
        let topic = request.topic.as_str();

        let (query, translated_topic) = self.translate_stage(id, topic).await?;

        let max_count = request.params.bounded_max_papers();
        let documents = self.retrieve_stage(id, topic, &query, max_count).await?;

        let documents = self.fetch_stage(id, documents).await?;

        let (documents, texts) = self.extract_stage(documents).await;
        self.store
            .update(
                id,
                ProjectUpdate::new()
                    .papers(documents.clone())
                    .status_message("Generating technical proposal"),
            )
            .await?;

        let mut result = match self.generate_stage(request, &documents, &texts).await {
            Ok(result) => result,
            Err(e) => return self.handle_generation_failure(id, e).await,
        };
        result.translated_topic = translated_topic;

        self.store.save_result(id, &result).await?;

        info!("Pipeline run completed");
        Ok(RunOutcome::Completed {
            project_id: id.to_string(),
        })
    }

    /// Stage 1: translate CJK topics into English search terms.
    ///
    /// Returns the search query and, when translation was attempted, the
    /// translated topic. Failure falls back to the original topic.
    async fn translate_stage(&self, id: &str, topic: &str) -> Result<(String, Option<String>)> {
        if !contains_cjk(topic) {
            self.store
                .update(
                    id,
                    ProjectUpdate::new().status_message("Searching for related papers"),
                )
                .await?;
            return Ok((topic.to_string(), None));
        }

        let translated = match bounded(
            "translate",
            self.limits.translate_timeout(),
            self.capabilities.translator.translate(topic),
        )
        .await
        {
            Ok(translated) => translated,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Translation failed, using original topic");
                topic.to_string()
            }
        };

        self.store
            .update(
                id,
                ProjectUpdate::new()
                    .translated_topic(translated.clone())
                    .status_message("Topic translated, searching for related papers"),
            )
            .await?;

        Ok((translated.clone(), Some(translated)))
    }

    /// Stage 2: search for documents, never returning an empty list
    async fn retrieve_stage(
        &self,
        id: &str,
        topic: &str,
        query: &str,
        max_count: u32,
    ) -> Result<Vec<DocumentItem>> {
        let mut documents = match bounded(
            "retrieve",
            self.limits.retrieve_timeout(),
            self.capabilities.retriever.retrieve(query, max_count),
        )
        .await
        {
            Ok(documents) => documents,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Retrieval failed, treating as no results");
                Vec::new()
            }
        };
        documents.truncate(max_count as usize);

        if documents.is_empty() {
            warn!(%query, "No documents found, continuing with a placeholder");
            documents.push(DocumentItem::placeholder(topic));
        }

        info!(count = documents.len(), "Documents retrieved");
        self.store
            .update(
                id,
                ProjectUpdate::new()
                    .papers(documents.clone())
                    .status_message("Downloading papers"),
            )
            .await?;

        Ok(documents)
    }

    /// Stage 3: fetch each document, keeping only the ones that arrived.
    ///
    /// If nothing could be fetched the first document is kept as-is, so the
    /// later stages always have something to work with.
    async fn fetch_stage(&self, id: &str, documents: Vec<DocumentItem>) -> Result<Vec<DocumentItem>> {
        let total = documents.len();
        let timeout = self.limits.fetch_timeout();
        let mut fetched = Vec::with_capacity(total);

        for (index, item) in documents.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.limits.fetch_delay()).await;
            }

            debug!(document = %item.id, "Fetching {}/{}", index + 1, total);
            match bounded("fetch", timeout, self.capabilities.fetcher.fetch(item, timeout)).await {
                Ok(path) => {
                    let mut item = item.clone();
                    item.local_handle = Some(path);
                    fetched.push(item);
                }
                Err(e) => {
                    warn!(document = %item.id, error = %format!("{:#}", e), "Fetch failed, skipping");
                }
            }
        }

        if fetched.is_empty() {
            if let Some(first) = documents.into_iter().next() {
                warn!("Every fetch failed, continuing with the first document's metadata");
                fetched.push(first);
            }
        } else if fetched.len() < total {
            warn!(total, kept = fetched.len(), "Some documents could not be fetched");
        }

        self.store
            .update(
                id,
                ProjectUpdate::new()
                    .papers(fetched.clone())
                    .status_message("Extracting paper content"),
            )
            .await?;

        Ok(fetched)
    }

    /// Stage 4: extract text, falling back to each document's summary
    async fn extract_stage(
        &self,
        mut documents: Vec<DocumentItem>,
    ) -> (Vec<DocumentItem>, Vec<String>) {
        let timeout = self.limits.extract_timeout();
        let max_pages = self.limits.extract_max_pages;
        let mut texts = Vec::with_capacity(documents.len());

        for item in documents.iter_mut() {
            let Some(local) = item.local_handle.clone() else {
                debug!(document = %item.id, "No local copy, using summary");
                texts.push(item.summary.clone());
                continue;
            };

            let extracted = bounded(
                "extract",
                timeout,
                self.capabilities.extractor.extract(item, &local, max_pages),
            )
            .await;

            match extracted {
                Ok(text) => {
                    item.content_extracted = true;
                    texts.push(text);
                }
                Err(e) => {
                    warn!(document = %item.id, error = %format!("{:#}", e), "Extraction failed, using summary");
                    texts.push(item.summary.clone());
                }
            }
        }

        (documents, texts)
    }

    /// Stage 5: generate the proposal. The only stage allowed to fail the run.
    async fn generate_stage(
        &self,
        request: &ProjectRequest,
        documents: &[DocumentItem],
        texts: &[String],
    ) -> std::result::Result<ProposalResult, GenerationError> {
        let generation = GenerationRequest {
            topic: &request.topic,
            items: documents,
            extracted_texts: texts,
            model: request.params.model_type,
            max_tokens: self.limits.max_tokens,
        };

        let limit = self.limits.generate_timeout();
        match tokio::time::timeout(limit, self.capabilities.generator.generate(generation)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::new(format!(
                "Proposal generation timed out after {}s",
                limit.as_secs()
            ))),
        }
    }

    async fn handle_generation_failure(
        &self,
        id: &str,
        failure: GenerationError,
    ) -> Result<RunOutcome> {
        let detail = match &failure.details {
            Some(details) => format!("{}: {}", failure.message, details),
            None => failure.message.clone(),
        };
        error!(error = %detail, "Proposal generation failed");

        self.store
            .update(
                id,
                ProjectUpdate::new()
                    .status(Status::Failed)
                    .error(detail.clone())
                    .status_message("Proposal generation failed"),
            )
            .await?;

        Ok(RunOutcome::Failed {
            project_id: id.to_string(),
            error: detail,
        })
    }

    async fn handle_run_failure(&self, id: &str, failure: anyhow::Error) -> Result<RunOutcome> {
        let message = format!("{:#}", failure);
        error!(error = %message, "Pipeline run failed");

        let bounded_message = self.limits.bound_error(&message);
        self.store
            .update(
                id,
                ProjectUpdate::new()
                    .status(Status::Failed)
                    .error(bounded_message.clone())
                    .status_message(format!("Processing failed: {}", bounded_message)),
            )
            .await
            .context("Failed to record pipeline failure")?;

        Ok(RunOutcome::Failed {
            project_id: id.to_string(),
            error: bounded_message,
        })
    }
}

/// Await a capability call under a timeout
async fn bounded<T>(
    stage: &str,
    limit: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!("{} timed out after {:?}", stage, limit),
    }
}
