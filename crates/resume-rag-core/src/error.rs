//! Error taxonomy for index builds and queries.
//!
//! Errors are scoped: a [`BuildError`] only fails the rebuild that raised
//! it and a [`QueryError`] only fails the question that raised it.

use thiserror::Error;

/// Index construction failure. The live snapshot is never touched.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("embedder returned {got} vectors for {expected} chunks")]
    CountMismatch { expected: usize, got: usize },

    #[error("inconsistent embedding dimensions: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("snapshot version {offered} is not newer than live version {live}")]
    StaleVersion { live: u64, offered: u64 },
}

/// Failure to answer a single question.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("question must not be empty")]
    InvalidQuestion,

    #[error("no documents are loaded")]
    EmptyCollection,

    #[error("question embedding failed: {0}")]
    Embedding(String),

    #[error("answer generation failed: {0}")]
    Generation(String),
}
