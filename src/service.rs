//! Service wiring.
//!
//! [`ResumeRag`] owns one instance of every component and the background
//! tasks that connect them:
//!
//! ```text
//! FileWatcher ──▶ Ingestor ──▶ DocumentCollection
//!                    │
//!                    └─ request ─▶ RebuildWorker ──publish──▶ IndexRegistry
//!                                                                 │
//! SessionManager ──▶ QueryService ◀────────── current() ──────────┘
//! ```
//!
//! Nothing here is global; tests build as many independent instances as
//! they need.

use std::sync::Arc;

use anyhow::{Context, Result};
use resume_rag_core::chunk::TextSplitter;
use resume_rag_core::collection::DocumentCollection;
use resume_rag_core::embedding::Embedder;
use resume_rag_core::generation::Generator;
use resume_rag_core::index::IndexBuilder;
use resume_rag_core::query::QueryService;
use resume_rag_core::registry::IndexRegistry;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::ingest::Ingestor;
use crate::rebuild::{RebuildHandle, RebuildOutcome, RebuildWorker};
use crate::session::SessionManager;
use crate::watcher::FileWatcher;

/// Watcher → ingest loop queue depth.
const EVENT_QUEUE: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub documents: usize,
    pub snapshot_version: u64,
    pub chunks: usize,
    pub sessions: usize,
    pub rebuilds_completed: u64,
    pub rebuilds_failed: u64,
}

pub struct ResumeRag {
    config: Config,
    collection: Arc<DocumentCollection>,
    registry: Arc<IndexRegistry>,
    query: Arc<QueryService>,
    sessions: Arc<SessionManager>,
    rebuild: RebuildHandle,
    ingestor: Arc<Ingestor>,
    watcher: Option<FileWatcher>,
    tasks: Vec<JoinHandle<()>>,
}

impl ResumeRag {
    /// Build the service with providers chosen by `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        Self::with_capabilities(config, embedder, generator)
    }

    /// Build the service around explicit capabilities and start the
    /// rebuild worker. File watching starts with [`start_ingest`](Self::start_ingest).
    pub fn with_capabilities(
        config: Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        let metric = config.retrieval.metric;
        let collection = Arc::new(DocumentCollection::new());
        let registry = Arc::new(IndexRegistry::new(metric));

        let worker = RebuildWorker::new(
            Arc::clone(&collection),
            Arc::clone(&registry),
            IndexBuilder::new(Arc::clone(&embedder), metric),
            TextSplitter::new(config.chunking.chunk_size),
        );
        let (rebuild, worker_task) = worker.spawn();

        let query = Arc::new(QueryService::new(
            Arc::clone(&registry),
            embedder,
            generator,
            config.retrieval.top_k,
        ));
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&query),
            Arc::clone(&collection),
        ));
        let ingestor = Arc::new(Ingestor::new(
            Arc::clone(&collection),
            rebuild.clone(),
            config.paths.record_dir.clone(),
            &config.ingest.include_globs,
        )?);

        Ok(Self {
            config,
            collection,
            registry,
            query,
            sessions,
            rebuild,
            ingestor,
            watcher: None,
            tasks: vec![worker_task],
        })
    }

    /// Load stored records, start watching the upload directory, and
    /// ingest uploads that arrived while the service was down.
    ///
    /// Fails if the upload directory cannot be watched.
    pub async fn start_ingest(&mut self) -> Result<()> {
        let upload_dir = self.config.paths.upload_dir.clone();
        std::fs::create_dir_all(&upload_dir)
            .with_context(|| format!("Failed to create upload dir: {}", upload_dir.display()))?;
        std::fs::create_dir_all(&self.config.paths.record_dir).with_context(|| {
            format!(
                "Failed to create record dir: {}",
                self.config.paths.record_dir.display()
            )
        })?;

        self.ingestor.load_records();
        self.rebuild.request();

        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        let mut watcher = FileWatcher::new(tx, self.config.ingest.settle_delay())
            .context("Failed to start file watcher")?;
        watcher
            .watch(&upload_dir)
            .with_context(|| format!("Failed to watch upload dir: {}", upload_dir.display()))?;
        self.watcher = Some(watcher);
        tracing::info!(dir = %upload_dir.display(), "watching for uploads");

        self.tasks.push(tokio::spawn(Arc::clone(&self.ingestor).run(rx)));

        let caught_up = self.ingestor.catch_up(&upload_dir).await;
        if caught_up > 0 {
            tracing::info!(files = caught_up, "ingested uploads found at startup");
        }
        Ok(())
    }

    /// Request a rebuild and wait for a build that includes every change
    /// made before this call.
    pub async fn rebuild_now(&self) -> RebuildOutcome {
        let ticket = self.rebuild.request();
        self.rebuild.wait_for(ticket).await
    }

    pub fn status(&self) -> ServiceStatus {
        let snapshot = self.registry.current();
        ServiceStatus {
            documents: self.collection.len(),
            snapshot_version: snapshot.version(),
            chunks: snapshot.len(),
            sessions: self.sessions.count(),
            rebuilds_completed: self.rebuild.completed(),
            rebuilds_failed: self.rebuild.failed(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn collection(&self) -> &Arc<DocumentCollection> {
        &self.collection
    }

    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    pub fn query(&self) -> &Arc<QueryService> {
        &self.query
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn rebuild(&self) -> &RebuildHandle {
        &self.rebuild
    }

    pub fn ingestor(&self) -> &Arc<Ingestor> {
        &self.ingestor
    }
}

impl Drop for ResumeRag {
    fn drop(&mut self) {
        // Dropping the watcher closes the event channel and ends the ingest loop.
        self.watcher.take();
        for task in &self.tasks {
            task.abort();
        }
    }
}
