//! Immutable index snapshots and the builder that produces them.
//!
//! An [`IndexSnapshot`] pairs an ordered chunk sequence with one embedding
//! vector per chunk. Once built it is never mutated; a rebuild produces a
//! new snapshot with a higher version.
//!
//! Search is brute-force k-nearest-neighbour over all stored vectors. For
//! a single collection of resumes this stays well within interactive
//! latency and keeps snapshots trivially shareable behind an `Arc`.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedding::{cosine_similarity, dot_product, euclidean_distance, Embedder};
use crate::error::BuildError;
use crate::models::Chunk;

/// Distance metric used for nearest-neighbour lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Dot,
    Euclidean,
}

impl Metric {
    /// Relevance score where higher always means closer.
    fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => cosine_similarity(a, b),
            Metric::Dot => dot_product(a, b),
            Metric::Euclidean => -euclidean_distance(a, b),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Metric::Cosine => "cosine",
            Metric::Dot => "dot",
            Metric::Euclidean => "euclidean",
        };
        f.write_str(name)
    }
}

/// A retrieved chunk and its relevance score.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    /// Cosine similarity or dot product; negated distance for Euclidean.
    pub score: f32,
}

/// An immutable, fully built, searchable index.
#[derive(Debug)]
pub struct IndexSnapshot {
    version: u64,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
    metric: Metric,
    built_at: DateTime<Utc>,
}

impl IndexSnapshot {
    /// The snapshot that is live before any build has completed.
    pub fn empty(metric: Metric) -> Self {
        Self {
            version: 0,
            chunks: Vec::new(),
            vectors: Vec::new(),
            metric,
            built_at: Utc::now(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Return the `k` chunks closest to `query`, best first.
    ///
    /// Ties keep chunk order. `k` larger than the snapshot returns every
    /// chunk.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, self.metric.score(query, v)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| SearchHit {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect()
    }
}

/// Turns a chunk sequence into an [`IndexSnapshot`].
#[derive(Clone)]
pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    metric: Metric,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn Embedder>, metric: Metric) -> Self {
        Self { embedder, metric }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Embed every chunk and assemble a snapshot tagged `version`.
    ///
    /// An empty chunk sequence yields an empty snapshot without calling
    /// the embedder.
    pub async fn build(&self, version: u64, chunks: Vec<Chunk>) -> Result<IndexSnapshot, BuildError> {
        if chunks.is_empty() {
            return Ok(IndexSnapshot {
                version,
                ..IndexSnapshot::empty(self.metric)
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| BuildError::Embedding(format!("{:#}", e)))?;

        if vectors.len() != chunks.len() {
            return Err(BuildError::CountMismatch {
                expected: chunks.len(),
                got: vectors.len(),
            });
        }

        let dims = vectors[0].len();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(BuildError::DimensionMismatch {
                expected: dims,
                got: bad.len(),
            });
        }

        Ok(IndexSnapshot {
            version,
            chunks,
            vectors,
            metric: self.metric,
            built_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    /// Maps each text to a fixed axis by its first letter.
    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| match t.chars().next() {
                    Some('a') => vec![1.0, 0.0, 0.0],
                    Some('b') => vec![0.0, 1.0, 0.0],
                    _ => vec![0.0, 0.0, 1.0],
                })
                .collect())
        }
    }

    struct BrokenEmbedder {
        short: bool,
    }

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn model_name(&self) -> &str {
            "broken"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.short {
                Ok(vec![vec![1.0, 0.0, 0.0]; texts.len() - 1])
            } else {
                anyhow::bail!("model unavailable")
            }
        }
    }

    fn chunk(text: &str, doc: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            source_document_id: doc.to_string(),
        }
    }

    fn chunks() -> Vec<Chunk> {
        vec![
            chunk("alpha skills", "a.pdf"),
            chunk("beta skills", "b.pdf"),
            chunk("charlie skills", "c.pdf"),
        ]
    }

    #[tokio::test]
    async fn build_and_search_nearest_first() {
        let builder = IndexBuilder::new(Arc::new(AxisEmbedder), Metric::Cosine);
        let snap = builder.build(1, chunks()).await.unwrap();
        assert_eq!(snap.version(), 1);
        assert_eq!(snap.len(), 3);

        let hits = snap.search(&[0.1, 0.9, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.source_document_id, "b.pdf");
    }

    #[tokio::test]
    async fn k_larger_than_snapshot_returns_all() {
        let builder = IndexBuilder::new(Arc::new(AxisEmbedder), Metric::Euclidean);
        let snap = builder.build(2, chunks()).await.unwrap();
        let hits = snap.search(&[0.0, 0.0, 1.0], 10);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].chunk.source_document_id, "c.pdf");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn ties_keep_chunk_order() {
        let builder = IndexBuilder::new(Arc::new(AxisEmbedder), Metric::Dot);
        let snap = builder.build(1, chunks()).await.unwrap();
        let hits = snap.search(&[0.0, 0.0, 0.0], 3);
        let order: Vec<&str> = hits
            .iter()
            .map(|h| h.chunk.source_document_id.as_str())
            .collect();
        assert_eq!(order, vec!["a.pdf", "b.pdf", "c.pdf"]);
    }

    #[tokio::test]
    async fn empty_build_skips_embedder() {
        let builder = IndexBuilder::new(Arc::new(BrokenEmbedder { short: false }), Metric::Cosine);
        let snap = builder.build(7, Vec::new()).await.unwrap();
        assert_eq!(snap.version(), 7);
        assert!(snap.is_empty());
        assert!(snap.search(&[1.0], 5).is_empty());
    }

    #[tokio::test]
    async fn embedder_failure_is_build_error() {
        let builder = IndexBuilder::new(Arc::new(BrokenEmbedder { short: false }), Metric::Cosine);
        let err = builder.build(1, chunks()).await.unwrap_err();
        assert!(matches!(err, BuildError::Embedding(ref m) if m.contains("model unavailable")));
    }

    #[tokio::test]
    async fn vector_count_mismatch_is_build_error() {
        let builder = IndexBuilder::new(Arc::new(BrokenEmbedder { short: true }), Metric::Cosine);
        let err = builder.build(1, chunks()).await.unwrap_err();
        assert!(matches!(
            err,
            BuildError::CountMismatch {
                expected: 3,
                got: 2
            }
        ));
    }

    #[test]
    fn metric_names() {
        assert_eq!(Metric::default(), Metric::Cosine);
        assert_eq!(Metric::Euclidean.to_string(), "euclidean");
    }
}
