//! OpenAI-compatible chat-completions client.
//!
//! Serves as both the translator and the generator, and summarises web
//! pages through the endpoint's link-reading tool.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::proposal::parse_proposal;
use super::{GenerationError, GenerationRequest, Generator, Translator};
use crate::config::LlmConfig;
use crate::domain::{ModelType, ProposalResult};

/// Longest slice of extracted text included per document
const MAX_EXCERPT_CHARS: usize = 3000;

const TRANSLATE_PROMPT: &str = "You translate technical research topics into concise English \
keywords suitable for an academic search engine. Reply with the keywords only.";

/// Request timeout for page analysis
const ANALYZE_TIMEOUT: Duration = Duration::from_secs(60);

const PROPOSAL_PROMPT: &str = "You are a technical consultant who writes detailed, actionable \
technical proposals grounded in research papers. Answer in Markdown. Include an architecture \
section with a Mermaid diagram, a '## Implementation Steps' section as a numbered list, and a \
'## Required Resources' section as a bullet list.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

/// Chat-completions HTTP client
pub struct ChatClient {
    api_url: String,
    api_key: Option<String>,
    model: String,
    /// Per-tier model overrides (`lite`, `pro`, `reader`)
    models: HashMap<String, String>,
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key,
            model: model.into(),
            models: HashMap::new(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &LlmConfig, client: reqwest::Client) -> Self {
        Self {
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            models: config.models.clone(),
            client,
        }
    }

    /// Model name for a requested tier
    pub fn model_for(&self, tier: ModelType) -> &str {
        self.models
            .get(&tier.to_string())
            .map(String::as_str)
            .unwrap_or(&self.model)
    }

    /// Send one completion request and return the raw JSON body
    async fn complete_raw(&self, request: &ChatRequest<'_>, timeout: Duration) -> Result<Value> {
        let mut builder = self.client.post(&self.api_url).timeout(timeout).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("Chat request to {} failed", self.api_url))?;

        response
            .json::<Value>()
            .await
            .context("Failed to parse chat response")
    }

    /// Summarise the page behind `url` using the endpoint's LinkReader tool
    pub async fn analyze_url(&self, url: &str) -> Result<String> {
        let url = validate_url(url)?;
        info!(%url, "Analyzing web content");

        let prompt = format!("Analyze and summarize the content of this URL: {}", url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: None,
            max_tokens: None,
            tools: vec![link_reader_tool()],
        };

        let body = self.complete_raw(&request, ANALYZE_TIMEOUT).await?;
        Self::first_choice(&body)
            .filter(|s| !s.trim().is_empty())
            .with_context(|| format!("Web content analysis returned no choices: {}", body))
    }

    /// First choice's content, if the body has one
    fn first_choice(body: &Value) -> Option<String> {
        serde_json::from_value::<ChatResponse>(body.clone())
            .ok()?
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
    }
}

#[async_trait]
impl Translator for ChatClient {
    fn name(&self) -> &str {
        "chat"
    }

    async fn translate(&self, text: &str) -> Result<String> {
        info!(topic = %text, "Translating topic");

        let user = format!("Translate this technical topic into English search keywords:\n\n{}", text);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: TRANSLATE_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: Some(0.3),
            max_tokens: None,
            tools: Vec::new(),
        };

        let body = self.complete_raw(&request, Duration::from_secs(30)).await?;
        let translation = Self::first_choice(&body)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .with_context(|| format!("Translation returned no choices: {}", body))?;

        debug!(%translation, "Topic translated");
        Ok(translation)
    }
}

#[async_trait]
impl Generator for ChatClient {
    fn name(&self) -> &str {
        "chat"
    }

    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> std::result::Result<ProposalResult, GenerationError> {
        let model = self.model_for(request.model);
        info!(topic = %request.topic, %model, documents = request.items.len(), "Generating proposal");

        let user = build_user_prompt(&request);
        let chat = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: PROPOSAL_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: Some(0.7),
            max_tokens: Some(request.max_tokens),
            tools: Vec::new(),
        };

        let body = self
            .complete_raw(&chat, Duration::from_secs(120))
            .await
            .map_err(|e| GenerationError::new(format!("{:#}", e)))?;

        match Self::first_choice(&body) {
            Some(text) => Ok(parse_proposal(&text, request.items)),
            None => Err(GenerationError::new("Proposal generation failed").with_details(body)),
        }
    }
}

/// Only absolute http(s) URLs are sent for analysis
fn validate_url(url: &str) -> Result<&str> {
    let url = url.trim();
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .with_context(|| format!("Not an http(s) URL: {}", url))?;
    if rest.is_empty() || rest.starts_with('/') || rest.contains(char::is_whitespace) {
        anyhow::bail!("Not an http(s) URL: {}", url);
    }
    Ok(url)
}

fn link_reader_tool() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": "LinkReader",
            "description": "Read the content behind URLs, including web pages and PDFs",
            "parameters": {
                "type": "object",
                "properties": {
                    "urls": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "URLs to read"
                    }
                },
                "required": ["urls"]
            }
        }
    })
}

fn build_user_prompt(request: &GenerationRequest<'_>) -> String {
    let documents: Vec<String> = request
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let mut entry = format!(
                "Paper {}:\nTitle: {}\nAuthors: {}\nSummary: {}\n",
                i + 1,
                item.title,
                item.authors.join(", "),
                item.summary
            );
            if let Some(text) = request.extracted_texts.get(i).filter(|t| !t.is_empty()) {
                let excerpt: String = text.chars().take(MAX_EXCERPT_CHARS).collect();
                entry.push_str(&format!("Excerpt: {}...\n", excerpt));
            }
            entry
        })
        .collect();

    format!(
        "Write a detailed technical proposal for the research topic below, based on the related papers.\n\n\
         Topic: {}\n\nRelated papers:\n{}",
        request.topic,
        documents.join("\n\n")
    )
}
