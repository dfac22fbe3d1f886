use std::sync::Arc;
use tokio::time::Duration;

use leaky_bucket::RateLimiter;

/// Paces calls to the embedding API: one call per interval, no bursting.
#[derive(Clone)]
pub struct RateLimiters {
    embedding: Arc<RateLimiter>,
}

impl RateLimiters {
    pub fn new(embedding_interval: Duration) -> Self {
        let embedding = RateLimiter::builder()
            .initial(1)
            .interval(embedding_interval)
            .max(1)
            .refill(1)
            .build();

        Self {
            embedding: Arc::new(embedding),
        }
    }

    pub fn from_config(retrieval: &crate::server_config::RetrievalConfig) -> Self {
        Self::new(Duration::from_millis(retrieval.embedding_interval_ms))
    }

    pub async fn acquire_one(&self) {
        self.embedding.acquire_one().await;
    }

    pub fn get_status(&self) -> String {
        format!(
            "embeddings: {}/{}",
            self.embedding.balance(),
            self.embedding.max()
        )
    }
}
