//! # Resume RAG Core
//!
//! Runtime-free logic for Resume RAG: the document model, chunking and
//! deduplication, immutable index snapshots, the live-index registry,
//! the shared document collection, and the question-answering service.
//!
//! This crate contains no tokio, filesystem I/O, or network code. The
//! embedding and answer-generation capabilities are consumed through the
//! [`embedding::Embedder`] and [`generation::Generator`] traits, which the
//! application crate implements.
//!
//! ## Data flow
//!
//! ```text
//! Documents ──▶ chunk::chunk_documents ──▶ index::IndexBuilder ──▶ registry::IndexRegistry
//!                                                                   │ current()
//!                                                                   ▼
//!                                                          query::QueryService
//! ```

pub mod chunk;
pub mod collection;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod models;
pub mod query;
pub mod registry;
