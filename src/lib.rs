//! # Resume RAG
//!
//! A live resume ingestion and question-answering service.
//!
//! Resumes dropped into an upload directory are extracted, normalized into
//! per-file records, chunked, embedded, and published as an immutable index
//! snapshot. Connected chat sessions ask questions; each answer is grounded
//! on the snapshot that was live when the question was asked.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Watcher   │──▶│   Ingestor   │──▶│  Collection  │
//! │ upload dir │   │ extract+csv  │   │  documents   │
//! └────────────┘   └──────────────┘   └──────┬───────┘
//!                                            │ rebuild
//!                                            ▼
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Sessions  │──▶│ QueryService │◀──│   Registry   │
//! │ WebSocket  │   │ embed+answer │   │  snapshots   │
//! └────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rrag convert ./cv.pdf --out ./csv_files   # one-shot extraction
//! rrag chunks                               # chunking dry run
//! rrag ask "Who has Kubernetes experience?"
//! rrag serve                                # watcher + HTTP/WebSocket
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`extract`] | PDF/DOCX text extraction |
//! | [`record`] | Per-file CSV records |
//! | [`watcher`] | Debounced upload directory watcher |
//! | [`ingest`] | File → record → collection pipeline |
//! | [`rebuild`] | Coalescing index rebuild worker |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Answer generation providers |
//! | [`http`] | Shared retrying JSON POST |
//! | [`session`] | Chat session lifecycle |
//! | [`service`] | Component wiring |
//! | [`server`] | HTTP and WebSocket server |
//! | [`commands`] | CLI command implementations |

pub mod commands;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod http;
pub mod ingest;
pub mod logging;
pub mod rebuild;
pub mod record;
pub mod server;
pub mod service;
pub mod session;
pub mod watcher;
