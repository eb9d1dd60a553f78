//! Ingestion pipeline: upload directory → record files → collection.
//!
//! For each settled input file the pipeline extracts text, writes the
//! normalized record, and upserts a [`Document`] into the collection. A
//! rebuild is requested only when the collection actually changed.
//! Extraction failures are logged and the file is skipped; the pipeline
//! keeps running.

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use resume_rag_core::collection::{DocumentCollection, UpsertOutcome};
use resume_rag_core::models::Document;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use walkdir::WalkDir;

use crate::extract::extract_file;
use crate::rebuild::RebuildHandle;
use crate::record::{
    has_record, load_documents, record_path_for, remove_record, upsert_record, ResumeRecord,
};
use crate::watcher::FileEvent;

pub struct Ingestor {
    collection: Arc<DocumentCollection>,
    rebuild: RebuildHandle,
    record_dir: PathBuf,
    include: GlobSet,
    /// Held while a record file is read and rewritten.
    record_lock: Arc<Mutex<()>>,
}

impl Ingestor {
    pub fn new(
        collection: Arc<DocumentCollection>,
        rebuild: RebuildHandle,
        record_dir: PathBuf,
        include_globs: &[String],
    ) -> Result<Self> {
        Ok(Self {
            collection,
            rebuild,
            record_dir,
            include: build_globset(include_globs)?,
            record_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Whether `path` names an input file the pipeline handles.
    pub fn accepts(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.include.is_match(Path::new(name)))
            .unwrap_or(false)
    }

    /// Extract `path`, write its record, and add it to the collection.
    pub async fn ingest_path(&self, path: &Path) -> Result<UpsertOutcome> {
        let input = path.to_path_buf();
        let record_path = record_path_for(path, &self.record_dir);
        let id = Document::id_for_path(path);

        let record = {
            let id = id.clone();
            let record_lock = Arc::clone(&self.record_lock);
            tokio::task::spawn_blocking(move || -> Result<ResumeRecord> {
                let text = extract_file(&input)
                    .with_context(|| format!("Failed to extract {}", input.display()))?;
                let record = ResumeRecord::new(id, &text);
                let _guard = record_lock.lock().unwrap_or_else(|e| e.into_inner());
                upsert_record(&record_path, &record)?;
                Ok(record)
            })
            .await??
        };

        let outcome = self.collection.upsert(record.to_document(path));
        tracing::info!(document = %id, ?outcome, "ingested");
        if outcome.changed() {
            self.rebuild.request();
        }
        Ok(outcome)
    }

    /// Drop the document for a deleted input file along with its record.
    pub fn remove_path(&self, path: &Path) -> bool {
        let id = Document::id_for_path(path);
        let record_path = record_path_for(path, &self.record_dir);
        {
            let _guard = self.lock_records();
            if let Err(e) = remove_record(&record_path, &id) {
                tracing::warn!(record = %record_path.display(), error = %format!("{:#}", e), "failed to remove record");
            }
        }

        match self.collection.remove(&id) {
            Some(_) => {
                tracing::info!(document = %id, "removed");
                self.rebuild.request();
                true
            }
            None => false,
        }
    }

    /// Load every record file into the collection. Returns the number of
    /// documents loaded. Malformed files are skipped.
    pub fn load_records(&self) -> usize {
        let loaded = {
            let _guard = self.lock_records();
            load_documents(&self.record_dir, &self.collection)
        };
        tracing::info!(documents = loaded, "loaded records");
        loaded
    }

    fn is_recorded(&self, path: &Path) -> bool {
        let _guard = self.lock_records();
        has_record(
            &record_path_for(path, &self.record_dir),
            &Document::id_for_path(path),
        )
    }

    fn lock_records(&self) -> std::sync::MutexGuard<'_, ()> {
        self.record_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ingest accepted files in `upload_dir` that have no record yet.
    /// Catches up on uploads made while the service was down.
    pub async fn catch_up(&self, upload_dir: &Path) -> usize {
        let mut pending: Vec<PathBuf> = WalkDir::new(upload_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| self.accepts(p) && !self.is_recorded(p))
            .collect();
        pending.sort();

        let mut ingested = 0;
        for path in pending {
            match self.ingest_path(&path).await {
                Ok(_) => ingested += 1,
                Err(e) => log_skip(&path, &e),
            }
        }
        ingested
    }

    pub async fn handle_event(&self, event: FileEvent) {
        match event {
            FileEvent::Changed(path) => {
                if !self.accepts(&path) {
                    return;
                }
                if let Err(e) = self.ingest_path(&path).await {
                    log_skip(&path, &e);
                }
            }
            FileEvent::Removed(path) => {
                if self.accepts(&path) {
                    self.remove_path(&path);
                }
            }
            FileEvent::Renamed { from, to } => {
                if self.accepts(&from) {
                    self.remove_path(&from);
                }
                if self.accepts(&to) {
                    if let Err(e) = self.ingest_path(&to).await {
                        log_skip(&to, &e);
                    }
                }
            }
        }
    }

    /// Process watcher events until the channel closes.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<FileEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        tracing::debug!("ingest loop stopped");
    }
}

fn log_skip(path: &Path, e: &anyhow::Error) {
    tracing::warn!(file = %path.display(), error = %format!("{:#}", e), "skipping file");
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}
