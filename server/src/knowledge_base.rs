//! Brute-force nearest-neighbour lookup over the cached corpus embeddings.

use anyhow::ensure;

use crate::{
    corpus::{Corpus, QaPair},
    embed::{cache::EmbeddingCache, cosine_similarity, Embedder},
};

pub const DEFAULT_TOP_N: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPair<'a> {
    pub pair: &'a QaPair,
    pub score: f32,
}

pub struct KnowledgeBase {
    corpus: Corpus,
    embeddings: EmbeddingCache,
}

impl KnowledgeBase {
    pub fn new(corpus: Corpus, embeddings: EmbeddingCache) -> anyhow::Result<Self> {
        ensure!(
            corpus.len() == embeddings.len(),
            "corpus has {} rows but the embedding cache has {}",
            corpus.len(),
            embeddings.len()
        );
        if let Some(dim) = embeddings.dim() {
            ensure!(
                embeddings.rows().iter().all(|row| row.len() == dim),
                "embedding cache rows do not share one dimension"
            );
        }
        Ok(Self { corpus, embeddings })
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    /// The `top_n` rows most similar to `query`, best first. Equal scores keep
    /// corpus order. The query must have the cache's dimension.
    pub fn top_k(&self, query: &[f32], top_n: usize) -> anyhow::Result<Vec<ScoredPair<'_>>> {
        if let Some(dim) = self.embeddings.dim() {
            ensure!(
                query.len() == dim,
                "query embedding has {} dimensions, the knowledge base has {}",
                query.len(),
                dim
            );
        }

        let mut scores: Vec<(usize, f32)> = self
            .embeddings
            .rows()
            .iter()
            .map(|row| cosine_similarity(query, row))
            .enumerate()
            .collect();

        scores.sort_by(|a, b| b.1.total_cmp(&a.1));

        let results = scores
            .into_iter()
            .take(top_n)
            .filter_map(|(idx, score)| {
                self.corpus
                    .get(idx)
                    .map(|pair| ScoredPair { pair, score })
            })
            .collect();
        Ok(results)
    }

    /// Embeds `text` and returns the closest reference pairs.
    pub async fn find_relevant(
        &self,
        embedder: &dyn Embedder,
        text: &str,
        top_n: usize,
    ) -> anyhow::Result<Vec<QaPair>> {
        let query = embedder.embed(text).await?;
        let pairs = self
            .top_k(&query, top_n)?
            .into_iter()
            .map(|scored| {
                tracing::debug!(score = scored.score, "Retrieved reference");
                scored.pair.clone()
            })
            .collect();
        Ok(pairs)
    }
}
