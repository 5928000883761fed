//! Embeddings from a local Ollama server.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::instrument;

use crate::clients::{ClientError, Embedder};

const PROVIDER: &str = "ollama";

/// Dense-embedding client over Ollama's `/api/embeddings` endpoint.
#[derive(Clone, Debug)]
pub struct OllamaEmbedder {
    http: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    /// `base_url` e.g. `http://localhost:11434`; `dimensions` must match the
    /// collection the vectors are searched against.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ClientError::Http {
                provider: PROVIDER,
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions,
        })
    }
}

#[async_trait::async_trait]
impl Embedder for OllamaEmbedder {
    #[instrument(skip(self, text), fields(len = text.len()), err)]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ClientError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({"model": self.model, "prompt": text}))
            .send()
            .await
            .map_err(|e| ClientError::Http {
                provider: PROVIDER,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message,
            });
        }

        let payload: EmbeddingResponse =
            response.json().await.map_err(|e| ClientError::Decode {
                provider: PROVIDER,
                message: e.to_string(),
            })?;
        if payload.embedding.is_empty() {
            return Err(ClientError::Empty { provider: PROVIDER });
        }
        if payload.embedding.len() != self.dimensions {
            return Err(ClientError::Decode {
                provider: PROVIDER,
                message: format!(
                    "expected {} dimensions, got {}",
                    self.dimensions,
                    payload.embedding.len()
                ),
            });
        }
        Ok(payload.embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
