//! Client sessions.
//!
//! Each connected client gets a [`SessionId`], a bounded outbound message
//! queue, and, once open, a bounded queue of pending questions drained by
//! one answer loop per session. Questions are answered strictly in arrival
//! order. The connection's reader never waits on an answer: when the
//! question queue is full the question is refused with [`BUSY_NOTICE`].
//! Closing a session deregisters it at once and stops its loop; an answer
//! that finishes afterwards is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use resume_rag_core::collection::DocumentCollection;
use resume_rag_core::error::QueryError;
use resume_rag_core::query::QueryService;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Reply sent when a question arrives before any resume is loaded.
pub const NO_DATA_NOTICE: &str = "No data available";

/// Reply sent when a question is refused because too many are pending.
pub const BUSY_NOTICE: &str = "Error: too many pending questions";

/// Messages buffered for a client that is slow to read.
pub const OUTBOUND_QUEUE: usize = 16;

/// Questions waiting behind the one being answered.
pub const PENDING_QUESTIONS: usize = 4;

pub type SessionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

/// What happened to a submitted question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    Queued,
    /// The question queue was full; [`BUSY_NOTICE`] was sent instead.
    Busy,
    NotOpen,
}

struct SessionEntry {
    state: SessionState,
    outbound: mpsc::Sender<String>,
    /// Set once the session is open. Dropping it stops the answer loop.
    questions: Option<mpsc::Sender<String>>,
    connected_at: DateTime<Utc>,
}

pub struct SessionManager {
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
    query: Arc<QueryService>,
    collection: Arc<DocumentCollection>,
}

impl SessionManager {
    pub fn new(query: Arc<QueryService>, collection: Arc<DocumentCollection>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            query,
            collection,
        }
    }

    /// Register a new connection. Messages pushed to the session arrive on
    /// the returned receiver.
    pub fn register(&self) -> (SessionId, mpsc::Receiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let entry = SessionEntry {
            state: SessionState::Connecting,
            outbound: tx,
            questions: None,
            connected_at: Utc::now(),
        };
        self.lock().insert(id, entry);
        (id, rx)
    }

    /// Mark a registered session ready for questions and start its answer
    /// loop. Must be called from within a Tokio runtime.
    pub fn open(self: &Arc<Self>, id: SessionId) -> bool {
        let mut sessions = self.lock();
        let Some(entry) = sessions.get_mut(&id) else {
            return false;
        };
        if entry.questions.is_none() {
            let (tx, rx) = mpsc::channel(PENDING_QUESTIONS);
            entry.questions = Some(tx);
            tokio::spawn(answer_loop(Arc::downgrade(self), id, rx));
        }
        entry.state = SessionState::Open;
        tracing::info!(session = %id, "session open");
        true
    }

    /// `Closed` for sessions that are no longer registered.
    pub fn state(&self, id: SessionId) -> SessionState {
        self.lock()
            .get(&id)
            .map(|e| e.state)
            .unwrap_or(SessionState::Closed)
    }

    /// Queue `message` for the session, waiting while the outbound queue is
    /// full. Returns `false`, and does nothing else, if the session is gone.
    pub async fn push(&self, id: SessionId, message: String) -> bool {
        let outbound = match self.lock().get(&id) {
            Some(entry) if entry.state == SessionState::Open => entry.outbound.clone(),
            _ => return false,
        };
        outbound.send(message).await.is_ok()
    }

    /// Deregister the session. In-flight and queued answers are discarded.
    pub fn close(&self, id: SessionId) {
        if let Some(entry) = self.lock().remove(&id) {
            let seconds = (Utc::now() - entry.connected_at).num_seconds();
            tracing::info!(session = %id, duration_secs = seconds, "session closed");
        }
    }

    /// Number of registered sessions.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Queue `question` for the session's answer loop without waiting.
    pub fn submit(&self, id: SessionId, question: String) -> Submitted {
        let sessions = self.lock();
        let Some(entry) = sessions.get(&id) else {
            return Submitted::NotOpen;
        };
        let Some(questions) = entry.questions.as_ref().filter(|_| entry.state == SessionState::Open)
        else {
            return Submitted::NotOpen;
        };

        match questions.try_send(question) {
            Ok(()) => Submitted::Queued,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(session = %id, "question refused; queue full");
                if entry.outbound.try_send(BUSY_NOTICE.to_string()).is_err() {
                    tracing::debug!(session = %id, "busy notice dropped");
                }
                Submitted::Busy
            }
            Err(TrySendError::Closed(_)) => Submitted::NotOpen,
        }
    }

    /// The text sent back for one question: the answer, the no-data
    /// notice, or an error message.
    pub async fn reply_to(&self, question: &str) -> String {
        if self.collection.is_empty() {
            return NO_DATA_NOTICE.to_string();
        }

        match self.query.answer(question).await {
            Ok(result) => {
                tracing::info!(
                    version = result.snapshot_version,
                    sources = result.cited_sources.len(),
                    "answered question"
                );
                result.answer_text
            }
            // Documents are loaded but the first build has not published yet.
            Err(QueryError::EmptyCollection) => NO_DATA_NOTICE.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "question failed");
                format!("Error: {}", e)
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Answer the session's questions one at a time until it closes.
async fn answer_loop(
    manager: Weak<SessionManager>,
    id: SessionId,
    mut questions: mpsc::Receiver<String>,
) {
    while let Some(question) = questions.recv().await {
        let Some(manager) = manager.upgrade() else {
            break;
        };
        if manager.state(id) != SessionState::Open {
            break;
        }
        let reply = manager.reply_to(&question).await;
        if !manager.push(id, reply).await {
            tracing::debug!(session = %id, "session gone; answer discarded");
        }
    }
    tracing::debug!(session = %id, "answer loop stopped");
}
