//! Upload directory watcher.
//!
//! Raw notify events are debounced for the configured settle delay, then
//! converted into [`FileEvent`]s and forwarded to the ingestion loop over
//! a tokio channel. A file is only reported once writes to it have been
//! quiet for the whole delay.

use notify_debouncer_full::notify::event::{ModifyKind, RenameMode};
use notify_debouncer_full::notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// Created or rewritten; contents are settled.
    Changed(PathBuf),
    Removed(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

pub struct FileWatcher {
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl FileWatcher {
    pub fn new(
        event_tx: tokio_mpsc::Sender<FileEvent>,
        settle: Duration,
    ) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel::<DebounceEventResult>();

        std::thread::Builder::new()
            .name("rrag-watcher".to_string())
            .spawn(move || {
                while let Ok(result) = rx.recv() {
                    if !forward_events(result, &event_tx) {
                        break;
                    }
                }
            })
            .map_err(|e| notify::Error::generic(&e.to_string()))?;

        let debouncer = new_debouncer(settle, None, move |result| {
            let _ = tx.send(result);
        })?;

        Ok(Self { debouncer })
    }

    /// Watch the top level of `dir`.
    pub fn watch(&mut self, dir: &Path) -> Result<(), notify::Error> {
        debug!(dir = %dir.display(), "watching");
        self.debouncer.watch(dir, RecursiveMode::NonRecursive)
    }
}

/// Returns `false` once the receiving side is gone.
fn forward_events(result: DebounceEventResult, event_tx: &tokio_mpsc::Sender<FileEvent>) -> bool {
    match result {
        Ok(events) => {
            for event in events {
                if let Some(file_event) = convert_event(&event) {
                    if event_tx.blocking_send(file_event).is_err() {
                        warn!("event channel closed");
                        return false;
                    }
                }
            }
        }
        Err(errors) => {
            for e in errors {
                error!(error = %e, "watch error");
            }
        }
    }
    true
}

fn convert_event(event: &notify_debouncer_full::DebouncedEvent) -> Option<FileEvent> {
    let path = event.paths.first()?.clone();

    // Staged uploads are written under a hidden name and renamed into place.
    if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = &event.kind {
        if let Some(to) = event.paths.get(1) {
            return match (is_hidden(&path), is_hidden(to)) {
                (false, false) => Some(FileEvent::Renamed {
                    from: path,
                    to: to.clone(),
                }),
                (true, false) => Some(FileEvent::Changed(to.clone())),
                (false, true) => Some(FileEvent::Removed(path)),
                (true, true) => None,
            };
        }
    }

    if is_hidden(&path) {
        return None;
    }

    match &event.kind {
        EventKind::Create(_) => Some(FileEvent::Changed(path)),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(FileEvent::Removed(path)),
        EventKind::Modify(ModifyKind::Name(_)) => Some(FileEvent::Changed(path)),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(FileEvent::Changed(path)),
        EventKind::Remove(_) => Some(FileEvent::Removed(path)),
        _ => None,
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
}
