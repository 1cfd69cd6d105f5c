use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use breakwire_common::EntitySet;

use crate::traits::{EmbedAgent, EntityAgent};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

const EXTRACTION_PROMPT: &str = "Extract named entities from this news item. \
Respond with a JSON object with keys: people, organizations, locations, \
events, dates, topics. Each value is an array of strings. Use empty arrays \
for categories with no entities. Respond with JSON only.";

/// Client for any OpenAI-compatible API (OpenAI, Voyage, OpenRouter).
/// Covers the two calls the engine consumes: embeddings and JSON-mode
/// entity extraction.
pub struct OpenAi {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
    embedding_model: String,
    extraction_model: String,
}

impl OpenAi {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
            base_url: OPENAI_API_URL.to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            extraction_model: "gpt-4o-mini".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_embedding_model(mut self, model: &str) -> Self {
        self.embedding_model = model.to_string();
        self
    }

    pub fn with_extraction_model(mut self, model: &str) -> Self {
        self.extraction_model = model.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn embed_request(&self, input: serde_json::Value) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input,
        };

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("Embedding API error ({}): {}", status, error_text));
        }

        let body: EmbeddingResponse = response.json().await?;
        let mut data = body.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbedAgent for OpenAi {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(model = %self.embedding_model, "Embedding request");
        let mut vectors = self
            .embed_request(serde_json::Value::String(text.to_string()))
            .await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("Embedding API returned no vectors"))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.embedding_model, count = texts.len(), "Batch embedding request");
        self.embed_request(serde_json::json!(texts)).await
    }
}

#[async_trait]
impl EntityAgent for OpenAi {
    async fn extract_entities(
        &self,
        title: &str,
        description: &str,
        url: Option<&str>,
    ) -> Result<EntitySet> {
        let api_url = format!("{}/chat/completions", self.base_url);

        let mut item = format!("Title: {title}\n\nDescription: {description}");
        if let Some(u) = url {
            item.push_str(&format!("\n\nURL: {u}"));
        }

        let request = ChatRequest {
            model: self.extraction_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: EXTRACTION_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: item,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        debug!(model = %self.extraction_model, "Entity extraction request");

        let response = self
            .http
            .post(&api_url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!(
                "Extraction API error ({}): {}",
                status,
                error_text
            ));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("No response from extraction API"))?;

        let entities: EntitySet = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Extraction returned malformed JSON: {e}"))?;
        Ok(entities)
    }
}

// --- Wire types ---

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: serde_json::Value,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
