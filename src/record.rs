//! Normalized resume records on disk.
//!
//! Each ingested input file produces one row in the CSV file `<stem>.csv`
//! in the record directory, under a `source,Resume` header. Inputs that
//! share a stem (`jane.pdf`, `jane.docx`) share the file, one row each. Line
//! breaks in the extracted text are flattened to spaces. Records are the
//! durable form of the collection: on startup every record in the
//! directory is loaded back.

use anyhow::{Context, Result};
use resume_rag_core::collection::DocumentCollection;
use resume_rag_core::models::Document;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// One row of a record file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeRecord {
    /// File name of the input the text came from.
    pub source: String,
    #[serde(rename = "Resume")]
    pub resume: String,
}

impl ResumeRecord {
    pub fn new(source: impl Into<String>, text: &str) -> Self {
        Self {
            source: source.into(),
            resume: text.trim().replace(['\n', '\r'], " "),
        }
    }

    /// The collection entry for this record.
    pub fn to_document(&self, source_path: &Path) -> Document {
        Document::new(
            self.source.clone(),
            source_path,
            format!("Resume: {}", self.resume),
        )
    }
}

/// `<record_dir>/<input stem>.csv`
pub fn record_path_for(input: &Path, record_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "record".to_string());
    record_dir.join(format!("{}.csv", stem))
}

/// Write `records` to `path`, replacing any previous file.
///
/// The rows go to a temporary file in the same directory that is then
/// renamed into place, so a reader never sees a half-written record.
pub fn write_records(path: &Path, records: &[ResumeRecord]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create record dir: {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create record in {}", dir.display()))?;
    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
    }
    tmp.persist(path)
        .with_context(|| format!("Failed to move record into place: {}", path.display()))?;
    Ok(())
}

/// Store `record` in the file at `path`, replacing the row with the same
/// source. Rows of other sources sharing the file name stay.
pub fn upsert_record(path: &Path, record: &ResumeRecord) -> Result<()> {
    let mut rows = existing_rows(path);
    match rows.iter_mut().find(|r| r.source == record.source) {
        Some(row) => *row = record.clone(),
        None => rows.push(record.clone()),
    }
    write_records(path, &rows)
}

/// Drop the row for `source`. The file is deleted once no rows remain.
/// Returns whether a row was removed.
pub fn remove_record(path: &Path, source: &str) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let mut rows = read_records(path)?;
    let before = rows.len();
    rows.retain(|r| r.source != source);
    if rows.len() == before {
        return Ok(false);
    }

    if rows.is_empty() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove record: {}", path.display()))?;
    } else {
        write_records(path, &rows)?;
    }
    Ok(true)
}

/// Whether the file at `path` holds a row for `source`.
pub fn has_record(path: &Path, source: &str) -> bool {
    path.exists()
        && read_records(path)
            .map(|rows| rows.iter().any(|r| r.source == source))
            .unwrap_or(false)
}

pub fn read_records(path: &Path) -> Result<Vec<ResumeRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open record: {}", path.display()))?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        let record: ResumeRecord =
            row.with_context(|| format!("Malformed record: {}", path.display()))?;
        records.push(record);
    }
    Ok(records)
}

/// Load every record in `dir` into `collection`. Returns the number of
/// documents loaded; malformed files are logged and skipped.
pub fn load_documents(dir: &Path, collection: &DocumentCollection) -> usize {
    let mut loaded = 0;
    for path in list_record_files(dir) {
        match read_records(&path) {
            Ok(records) => {
                for record in records {
                    collection.upsert(record.to_document(&path));
                    loaded += 1;
                }
            }
            Err(e) => tracing::warn!(
                record = %path.display(),
                error = %format!("{:#}", e),
                "skipping record"
            ),
        }
    }
    loaded
}

fn existing_rows(path: &Path) -> Vec<ResumeRecord> {
    if !path.exists() {
        return Vec::new();
    }
    read_records(path).unwrap_or_else(|e| {
        tracing::warn!(record = %path.display(), error = %format!("{:#}", e), "replacing malformed record");
        Vec::new()
    })
}

/// Every `*.csv` directly inside `dir`, sorted by path.
pub fn list_record_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map(|ext| ext == "csv").unwrap_or(false))
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn record_path_uses_stem() {
        let path = record_path_for(Path::new("/up/jane_doe.pdf"), Path::new("/csv"));
        assert_eq!(path, PathBuf::from("/csv/jane_doe.csv"));
    }

    #[test]
    fn newlines_flattened() {
        let record = ResumeRecord::new("a.pdf", "Jane\nPython\r\ndeveloper");
        assert_eq!(record.resume, "Jane Python  developer");
    }

    #[test]
    fn written_file_has_header_and_row() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.csv");
        upsert_record(&path, &ResumeRecord::new("a.pdf", "Python, Rust")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("source,Resume"));
        assert_eq!(lines.next(), Some("a.pdf,\"Python, Rust\""));
        assert_eq!(lines.next(), None);
        // No temporary file left behind.
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);

        let back = read_records(&path).unwrap();
        assert_eq!(back, vec![ResumeRecord::new("a.pdf", "Python, Rust")]);
    }

    #[test]
    fn rewrite_replaces_previous_record() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("a.csv");
        upsert_record(&path, &ResumeRecord::new("a.pdf", "old")).unwrap();
        upsert_record(&path, &ResumeRecord::new("a.pdf", "new")).unwrap();
        let back = read_records(&path).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].resume, "new");
    }

    #[test]
    fn shared_stem_keeps_one_row_per_source() {
        let tmp = TempDir::new().unwrap();
        let path = record_path_for(Path::new("/up/jane.docx"), tmp.path());
        assert_eq!(path, record_path_for(Path::new("/up/jane.pdf"), tmp.path()));

        upsert_record(&path, &ResumeRecord::new("jane.docx", "Rust")).unwrap();
        upsert_record(&path, &ResumeRecord::new("jane.pdf", "Go")).unwrap();
        upsert_record(&path, &ResumeRecord::new("jane.docx", "Rust and Go")).unwrap();

        let rows = read_records(&path).unwrap();
        assert_eq!(
            rows,
            vec![
                ResumeRecord::new("jane.docx", "Rust and Go"),
                ResumeRecord::new("jane.pdf", "Go"),
            ]
        );
        assert!(has_record(&path, "jane.pdf"));
        assert!(!has_record(&path, "jane.doc"));
    }

    #[test]
    fn remove_only_touches_matching_source() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("jane.csv");
        upsert_record(&path, &ResumeRecord::new("jane.docx", "Rust")).unwrap();

        // A same-stem file that was never recorded.
        assert!(!remove_record(&path, "jane.pdf").unwrap());
        assert_eq!(read_records(&path).unwrap().len(), 1);

        upsert_record(&path, &ResumeRecord::new("jane.pdf", "Go")).unwrap();
        assert!(remove_record(&path, "jane.pdf").unwrap());
        assert_eq!(
            read_records(&path).unwrap(),
            vec![ResumeRecord::new("jane.docx", "Rust")]
        );

        assert!(remove_record(&path, "jane.docx").unwrap());
        assert!(!path.exists());
        assert!(!remove_record(&path, "jane.docx").unwrap());
    }

    #[test]
    fn concurrent_writes_leave_a_complete_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("jane.csv");
        let writers: Vec<_> = (0..8)
            .map(|n| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let row = ResumeRecord::new(format!("jane{}.pdf", n), &"Rust ".repeat(500));
                    write_records(&path, &[row]).unwrap();
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let rows = read_records(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].resume, "Rust ".repeat(500).trim());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn malformed_record_is_replaced_on_upsert() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.csv");
        std::fs::write(&path, "wrong,header\n\"unterminated").unwrap();
        upsert_record(&path, &ResumeRecord::new("a.pdf", "Rust")).unwrap();
        assert_eq!(read_records(&path).unwrap(), vec![ResumeRecord::new("a.pdf", "Rust")]);
    }

    #[test]
    fn load_documents_reads_every_row() {
        let tmp = TempDir::new().unwrap();
        upsert_record(&tmp.path().join("jane.csv"), &ResumeRecord::new("jane.docx", "Rust")).unwrap();
        upsert_record(&tmp.path().join("jane.csv"), &ResumeRecord::new("jane.pdf", "Go")).unwrap();
        upsert_record(&tmp.path().join("bob.csv"), &ResumeRecord::new("bob.pdf", "Java")).unwrap();
        std::fs::write(tmp.path().join("bad.csv"), "wrong,header\n\"unterminated").unwrap();

        let collection = DocumentCollection::new();
        assert_eq!(load_documents(tmp.path(), &collection), 3);
        let ids: Vec<String> = collection.snapshot().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["bob.pdf", "jane.docx", "jane.pdf"]);
    }

    #[test]
    fn document_text_is_prefixed() {
        let doc = ResumeRecord::new("a.pdf", "Python developer").to_document(Path::new("/up/a.pdf"));
        assert_eq!(doc.id, "a.pdf");
        assert_eq!(doc.raw_text, "Resume: Python developer");
    }

    #[test]
    fn lists_only_csv_files_sorted() {
        let tmp = TempDir::new().unwrap();
        for name in ["b.csv", "a.csv", "notes.txt", "c.csv.tmp"] {
            std::fs::write(tmp.path().join(name), "source,Resume\n").unwrap();
        }
        let files = list_record_files(tmp.path());
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn missing_dir_lists_nothing() {
        assert!(list_record_files(Path::new("/nonexistent/records")).is_empty());
    }
}
