pub mod cache;

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use url::Url;

use crate::{server_config::ApiConfig, HttpClient};

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Identifies the vector space. Vectors from different models never mix.
    fn model(&self) -> &str;
}

pub type SharedEmbedder = Arc<dyn Embedder>;

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct ApiEmbedder {
    http_client: HttpClient,
    endpoint: Url,
    api_key: String,
    model: String,
}

impl ApiEmbedder {
    pub fn new(http_client: HttpClient, api: &ApiConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http_client,
            endpoint: api_endpoint(&api.base_url, "embeddings")?,
            api_key: api.key.clone(),
            model: api.embedding_model.clone(),
        })
    }
}

#[async_trait]
impl Embedder for ApiEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let resp = self
            .http_client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&json!(
              {
                "model": &self.model,
                "input": [text],
              }
            ))
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;

        parse_embedding(&resp)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn parse_embedding(resp: &serde_json::Value) -> anyhow::Result<Vec<f32>> {
    let data = resp["data"].as_array().context("No data array")?;
    let first = data.first().context("No first element")?;
    let embedding_value = &first["embedding"];
    let embedding: Vec<f32> = serde_json::from_value(embedding_value.clone())
        .context("Failed to parse embedding as Vec<f32>")?;
    Ok(embedding)
}

/// Joins `path` onto the API base, keeping any path prefix such as `/v1`.
pub fn api_endpoint(base_url: &str, path: &str) -> anyhow::Result<Url> {
    let base = if base_url.ends_with('/') {
        Url::parse(base_url)
    } else {
        Url::parse(&format!("{base_url}/"))
    }
    .with_context(|| format!("Invalid API base url {base_url}"))?;

    base.join(path)
        .with_context(|| format!("Invalid API path {path}"))
}

/// Cosine similarity, or 0 when either vector has no magnitude. Callers
/// check that both vectors have the same length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
