//! Background index rebuilds.
//!
//! A single worker task owns every build. Requests are coalesced through a
//! [`Notify`]: any number of requests that arrive while a build is running
//! collapse into exactly one follow-up build, which reads the collection as
//! it is when that build starts. Successful builds are published to the
//! [`IndexRegistry`]; failed builds are logged and the previous snapshot
//! stays live.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use resume_rag_core::chunk::{chunk_documents, TextSplitter};
use resume_rag_core::collection::DocumentCollection;
use resume_rag_core::error::BuildError;
use resume_rag_core::index::{IndexBuilder, IndexSnapshot};
use resume_rag_core::registry::IndexRegistry;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

/// Result of the most recent build.
#[derive(Debug, Clone, PartialEq)]
pub enum RebuildOutcome {
    /// No build has finished yet.
    Idle,
    Published { version: u64, chunks: usize },
    Failed { error: String },
}

#[derive(Default)]
struct Counters {
    requested: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Cheap, cloneable front end of the rebuild worker.
#[derive(Clone)]
pub struct RebuildHandle {
    signal: Arc<Notify>,
    outcomes: watch::Receiver<RebuildOutcome>,
    /// Highest request ticket whose changes a finished build has seen.
    covered: watch::Receiver<u64>,
    counters: Arc<Counters>,
}

impl RebuildHandle {
    /// Ask for a rebuild. Never blocks; repeated calls while a build is
    /// running produce a single follow-up build.
    ///
    /// Returns a ticket for [`wait_for`](Self::wait_for).
    pub fn request(&self) -> u64 {
        let ticket = self.counters.requested.fetch_add(1, Ordering::SeqCst) + 1;
        self.signal.notify_one();
        ticket
    }

    /// Wait for the first build that started after request `ticket` was
    /// made, and return the latest outcome.
    pub async fn wait_for(&self, ticket: u64) -> RebuildOutcome {
        let mut covered = self.covered.clone();
        if covered.wait_for(|&c| c >= ticket).await.is_err() {
            return RebuildOutcome::Failed {
                error: "rebuild worker stopped".to_string(),
            };
        }
        self.last_outcome()
    }

    pub fn subscribe(&self) -> watch::Receiver<RebuildOutcome> {
        self.outcomes.clone()
    }

    pub fn last_outcome(&self) -> RebuildOutcome {
        self.outcomes.borrow().clone()
    }

    pub fn requested(&self) -> u64 {
        self.counters.requested.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.counters.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }
}

pub struct RebuildWorker {
    collection: Arc<DocumentCollection>,
    registry: Arc<IndexRegistry>,
    builder: IndexBuilder,
    splitter: TextSplitter,
}

impl RebuildWorker {
    pub fn new(
        collection: Arc<DocumentCollection>,
        registry: Arc<IndexRegistry>,
        builder: IndexBuilder,
        splitter: TextSplitter,
    ) -> Self {
        Self {
            collection,
            registry,
            builder,
            splitter,
        }
    }

    /// Chunk the current collection, build, and publish one snapshot.
    ///
    /// The new version is one above the live version. Only the worker
    /// publishes, so versions increase by exactly one per successful build.
    pub async fn rebuild_once(&self) -> Result<Arc<IndexSnapshot>, BuildError> {
        let documents = self.collection.snapshot();
        let chunks = chunk_documents(&documents, &self.splitter);
        let version = self.registry.version() + 1;

        tracing::info!(
            version,
            documents = documents.len(),
            chunks = chunks.len(),
            "building index"
        );

        let snapshot = self.builder.build(version, chunks).await?;
        self.registry.publish(snapshot)
    }

    /// Start the worker task.
    pub fn spawn(self) -> (RebuildHandle, JoinHandle<()>) {
        let signal = Arc::new(Notify::new());
        let counters = Arc::new(Counters::default());
        let (tx, rx) = watch::channel(RebuildOutcome::Idle);
        let (covered_tx, covered_rx) = watch::channel(0u64);

        let handle = RebuildHandle {
            signal: Arc::clone(&signal),
            outcomes: rx,
            covered: covered_rx,
            counters: Arc::clone(&counters),
        };

        let task = tokio::spawn(async move {
            loop {
                signal.notified().await;
                // Read before the collection is copied: every request up to
                // here made its changes visible to this build.
                let covers = counters.requested.load(Ordering::SeqCst);

                let outcome = match self.rebuild_once().await {
                    Ok(snapshot) => {
                        counters.completed.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(
                            version = snapshot.version(),
                            chunks = snapshot.len(),
                            "published index snapshot"
                        );
                        RebuildOutcome::Published {
                            version: snapshot.version(),
                            chunks: snapshot.len(),
                        }
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(error = %e, "index build failed; keeping live snapshot");
                        RebuildOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                };

                tx.send_replace(outcome);
                covered_tx.send_replace(covers);
            }
        });

        (handle, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use resume_rag_core::embedding::Embedder;
    use resume_rag_core::index::Metric;
    use resume_rag_core::models::Document;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    struct CountingEmbedder {
        calls: AtomicU64,
        fail: AtomicBool,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicU64::new(0),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("embedding backend down");
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn worker(embedder: Arc<CountingEmbedder>) -> (Arc<DocumentCollection>, Arc<IndexRegistry>, RebuildWorker) {
        let collection = Arc::new(DocumentCollection::new());
        let registry = Arc::new(IndexRegistry::new(Metric::Cosine));
        let worker = RebuildWorker::new(
            Arc::clone(&collection),
            Arc::clone(&registry),
            IndexBuilder::new(embedder, Metric::Cosine),
            TextSplitter::new(512),
        );
        (collection, registry, worker)
    }

    fn doc(id: &str, text: &str) -> Document {
        Document::new(id, format!("/up/{}", id), text.to_string())
    }

    async fn wait_for(rx: &mut watch::Receiver<RebuildOutcome>, want: impl Fn(&RebuildOutcome) -> bool) -> RebuildOutcome {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                {
                    let current = rx.borrow_and_update();
                    if want(&current) {
                        return current.clone();
                    }
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn rebuild_once_publishes_next_version() {
        let (collection, registry, worker) = worker(Arc::new(CountingEmbedder::new()));
        collection.upsert(doc("a.pdf", "Resume: Python developer"));

        let snapshot = worker.rebuild_once().await.unwrap();
        assert_eq!(snapshot.version(), 1);
        assert_eq!(registry.version(), 1);
        assert_eq!(registry.current().chunks()[0].source_document_id, "a.pdf");

        let snapshot = worker.rebuild_once().await.unwrap();
        assert_eq!(snapshot.version(), 2);
    }

    #[tokio::test]
    async fn empty_collection_publishes_empty_snapshot() {
        let embedder = Arc::new(CountingEmbedder::new());
        let (_collection, registry, worker) = worker(Arc::clone(&embedder));
        let snapshot = worker.rebuild_once().await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(registry.version(), 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_build_keeps_live_snapshot() {
        let embedder = Arc::new(CountingEmbedder::new());
        let (collection, registry, worker) = worker(Arc::clone(&embedder));
        collection.upsert(doc("a.pdf", "Resume: Python developer"));
        worker.rebuild_once().await.unwrap();

        embedder.fail.store(true, Ordering::SeqCst);
        collection.upsert(doc("b.pdf", "Resume: Go developer"));
        let err = worker.rebuild_once().await.unwrap_err();
        assert!(matches!(err, BuildError::Embedding(_)));
        assert_eq!(registry.version(), 1);
        assert_eq!(registry.current().len(), 1);

        // A failed build does not consume a version.
        embedder.fail.store(false, Ordering::SeqCst);
        assert_eq!(worker.rebuild_once().await.unwrap().version(), 2);
    }

    #[tokio::test]
    async fn spawned_worker_reports_outcomes() {
        let embedder = Arc::new(CountingEmbedder::new());
        let (collection, _registry, worker) = worker(Arc::clone(&embedder));
        let (handle, task) = worker.spawn();
        let mut rx = handle.subscribe();
        assert_eq!(handle.last_outcome(), RebuildOutcome::Idle);

        collection.upsert(doc("a.pdf", "Resume: Python developer"));
        handle.request();
        let outcome = wait_for(&mut rx, |o| matches!(o, RebuildOutcome::Published { .. })).await;
        assert_eq!(outcome, RebuildOutcome::Published { version: 1, chunks: 1 });

        embedder.fail.store(true, Ordering::SeqCst);
        handle.request();
        let outcome = wait_for(&mut rx, |o| matches!(o, RebuildOutcome::Failed { .. })).await;
        assert!(matches!(outcome, RebuildOutcome::Failed { ref error } if error.contains("embedding backend down")));
        assert_eq!(handle.completed(), 1);
        assert_eq!(handle.failed(), 1);
        assert_eq!(handle.requested(), 2);

        task.abort();
    }

    struct GatedEmbedder {
        started: AtomicU64,
        gate: tokio::sync::Semaphore,
    }

    #[async_trait]
    impl Embedder for GatedEmbedder {
        fn model_name(&self) -> &str {
            "gated"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await?.forget();
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[tokio::test]
    async fn wait_for_skips_build_already_running() {
        let embedder = Arc::new(GatedEmbedder {
            started: AtomicU64::new(0),
            gate: tokio::sync::Semaphore::new(0),
        });
        let collection = Arc::new(DocumentCollection::new());
        let registry = Arc::new(IndexRegistry::new(Metric::Cosine));
        let (handle, task) = RebuildWorker::new(
            Arc::clone(&collection),
            Arc::clone(&registry),
            IndexBuilder::new(Arc::clone(&embedder) as Arc<dyn Embedder>, Metric::Cosine),
            TextSplitter::new(512),
        )
        .spawn();

        collection.upsert(doc("a.pdf", "Resume: Python developer"));
        handle.request();
        tokio::time::timeout(Duration::from_secs(5), async {
            while embedder.started.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // Requested while the first build is running.
        collection.upsert(doc("b.pdf", "Resume: Go developer"));
        let ticket = handle.request();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.wait_for(ticket).await })
        };

        embedder.gate.add_permits(1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(registry.version(), 1);
        assert!(!waiter.is_finished());

        embedder.gate.add_permits(1);
        let outcome = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, RebuildOutcome::Published { version: 2, chunks: 2 });

        task.abort();
    }

    #[tokio::test]
    async fn wait_for_reports_stopped_worker() {
        let (_collection, _registry, worker) = worker(Arc::new(CountingEmbedder::new()));
        let (handle, task) = worker.spawn();
        task.abort();
        let _ = task.await;
        let ticket = handle.request();
        assert!(matches!(
            handle.wait_for(ticket).await,
            RebuildOutcome::Failed { ref error } if error.contains("stopped")
        ));
    }
}
