//! The in-memory document collection shared by ingestion and rebuilds.
//!
//! Documents keep their first-insertion order; replacing a document keeps
//! its slot. Rebuilds take a [`snapshot`](DocumentCollection::snapshot)
//! copy and never iterate the live collection.

use std::sync::RwLock;

use crate::models::Document;

/// What an [`upsert`](DocumentCollection::upsert) did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// An existing document with the same id was superseded.
    Replaced,
    /// The stored document already had identical text.
    Unchanged,
}

impl UpsertOutcome {
    /// Whether the collection content changed and a rebuild is needed.
    pub fn changed(self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

#[derive(Default)]
pub struct DocumentCollection {
    docs: RwLock<Vec<Document>>,
}

impl DocumentCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `doc`, or supersede the document with the same id.
    pub fn upsert(&self, doc: Document) -> UpsertOutcome {
        let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
        match docs.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) if existing.content_hash == doc.content_hash => UpsertOutcome::Unchanged,
            Some(existing) => {
                *existing = doc;
                UpsertOutcome::Replaced
            }
            None => {
                docs.push(doc);
                UpsertOutcome::Inserted
            }
        }
    }

    pub fn remove(&self, id: &str) -> Option<Document> {
        let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
        let pos = docs.iter().position(|d| d.id == id)?;
        Some(docs.remove(pos))
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        let docs = self.docs.read().unwrap_or_else(|e| e.into_inner());
        docs.iter().find(|d| d.id == id).cloned()
    }

    /// A read-consistent copy of every document in collection order.
    pub fn snapshot(&self) -> Vec<Document> {
        self.docs.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.docs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
