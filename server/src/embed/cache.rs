//! On-disk embedding matrix, one row per corpus question in corpus order.

use std::path::Path;

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

use crate::{corpus::Corpus, rate_limiters::RateLimiters};

use super::Embedder;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    fingerprint: String,
    dim: usize,
    rows: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, Default)]
pub struct EmbeddingCache {
    rows: Vec<Vec<f32>>,
}

impl EmbeddingCache {
    pub fn new(rows: Vec<Vec<f32>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row length, `None` for an empty cache.
    pub fn dim(&self) -> Option<usize> {
        self.rows.first().map(Vec::len)
    }

    /// Identifies the corpus questions and the embedding model a cache was
    /// built from.
    pub fn fingerprint(corpus: &Corpus, embedding_model: &str) -> String {
        format!("{}:{}", embedding_model, corpus.fingerprint())
    }

    /// Reads the cache at `path` if it exists and was built for a corpus with
    /// this `fingerprint`. Unreadable, stale or ragged files count as missing.
    pub fn read(path: &Path, fingerprint: &str) -> Option<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Could not read embeddings file {}: {}", path.display(), e);
                return None;
            }
        };

        let file: CacheFile = match bincode::deserialize(&bytes) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!("Embeddings file {} is corrupt: {}", path.display(), e);
                return None;
            }
        };

        if file.fingerprint != fingerprint {
            tracing::warn!(
                "Embeddings file {} was built for a different corpus",
                path.display()
            );
            return None;
        }

        if let Some(row) = file.rows.iter().position(|row| row.len() != file.dim) {
            tracing::warn!(
                "Embeddings file {} row {} has {} dimensions, expected {}",
                path.display(),
                row + 1,
                file.rows[row].len(),
                file.dim
            );
            return None;
        }

        Some(Self { rows: file.rows })
    }

    /// Writes through a temporary file and renames it into place.
    pub fn write(&self, path: &Path, fingerprint: &str) -> anyhow::Result<()> {
        let file = CacheFile {
            fingerprint: fingerprint.to_string(),
            dim: self.dim().unwrap_or(0),
            rows: self.rows.clone(),
        };
        let bytes = bincode::serialize(&file).context("Failed to serialize embeddings")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &bytes)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to move embeddings into {}", path.display()))?;
        Ok(())
    }

    /// Embeds every corpus question in order, one API call per question.
    pub async fn compute(
        corpus: &Corpus,
        embedder: &dyn Embedder,
        rate_limiters: &RateLimiters,
    ) -> anyhow::Result<Self> {
        let total = corpus.len();
        let mut rows: Vec<Vec<f32>> = Vec::with_capacity(total);

        for (idx, question) in corpus.questions().enumerate() {
            rate_limiters.acquire_one().await;
            tracing::info!(
                limiter = %rate_limiters.get_status(),
                "Computing embedding for question {}/{}",
                idx + 1,
                total
            );
            let embedding = embedder
                .embed(question)
                .await
                .with_context(|| format!("Failed to embed question {}", idx + 1))?;

            if let Some(first) = rows.first() {
                ensure!(
                    first.len() == embedding.len(),
                    "Embedding {} has {} dimensions, expected {}",
                    idx + 1,
                    embedding.len(),
                    first.len()
                );
            }
            rows.push(embedding);
        }

        Ok(Self { rows })
    }

    pub async fn load_or_compute(
        path: &Path,
        corpus: &Corpus,
        embedder: &dyn Embedder,
        rate_limiters: &RateLimiters,
    ) -> anyhow::Result<Self> {
        let fingerprint = Self::fingerprint(corpus, embedder.model());

        if let Some(cache) = Self::read(path, &fingerprint) {
            tracing::info!("Embeddings file found. Loaded {} embeddings", cache.len());
            return Ok(cache);
        }

        tracing::info!("Embeddings file not usable. Computing embeddings for all questions");
        let cache = Self::compute(corpus, embedder, rate_limiters).await?;
        cache.write(path, &fingerprint)?;
        tracing::info!("Embeddings computed and saved to {}", path.display());
        Ok(cache)
    }
}
