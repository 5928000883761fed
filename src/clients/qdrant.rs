//! Filtered vector search over Qdrant's REST API.

use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::instrument;

use crate::clients::{ClientError, VectorSearch};
use crate::state::{RagHit, RagQueryParams};

const PROVIDER: &str = "qdrant";

/// Dense search against one Qdrant collection.
///
/// The domain goes into the filter's `must` clause, so documents outside the
/// requested domain are excluded regardless of similarity. Keywords go into
/// `should` as full-text matches on the content field: they boost ranking
/// but never exclude a similar document on their own.
#[derive(Clone, Debug)]
pub struct QdrantSearch {
    http: Client,
    base_url: String,
    collection: String,
}

impl QdrantSearch {
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
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
            collection: collection.into(),
        })
    }
}

#[async_trait::async_trait]
impl VectorSearch for QdrantSearch {
    #[instrument(skip(self, embedding, params), fields(domain = %params.domain, limit), err)]
    async fn search(
        &self,
        embedding: &[f32],
        params: &RagQueryParams,
        limit: usize,
    ) -> Result<Vec<RagHit>, ClientError> {
        let should: Vec<Value> = params
            .keywords
            .iter()
            .map(|kw| json!({"key": "content", "match": {"text": kw}}))
            .collect();
        let body = json!({
            "query": embedding,
            "filter": {
                "must": [{"key": "domain", "match": {"value": params.domain.as_str()}}],
                "should": should,
            },
            "limit": limit,
            "with_payload": true,
        });

        let url = format!(
            "{}/collections/{}/points/query",
            self.base_url, self.collection
        );
        let response = self
            .http
            .post(&url)
            .json(&body)
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

        let payload: Value = response.json().await.map_err(|e| ClientError::Decode {
            provider: PROVIDER,
            message: e.to_string(),
        })?;
        let points = payload
            .get("result")
            .and_then(|r| r.get("points"))
            .and_then(Value::as_array)
            .ok_or(ClientError::Decode {
                provider: PROVIDER,
                message: "missing result.points".into(),
            })?;

        let hits = points
            .iter()
            .filter_map(|point| {
                let score = point.get("score").and_then(Value::as_f64)? as f32;
                let content = point
                    .get("payload")
                    .and_then(|p| p.get("content"))
                    .and_then(Value::as_str)?
                    .to_string();
                Some(RagHit { score, content })
            })
            .collect();
        Ok(hits)
    }
}
