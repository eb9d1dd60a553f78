//! CLI command implementations.
//!
//! Each `run_*` function backs one `rrag` subcommand. Results go to stdout;
//! diagnostics go through `tracing`.

use anyhow::{bail, Context, Result};
use resume_rag_core::chunk::{chunk_stats, TextSplitter};
use resume_rag_core::collection::DocumentCollection;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::extract::{extract_file, FileKind};
use crate::rebuild::RebuildOutcome;
use crate::record::{load_documents, record_path_for, upsert_record, ResumeRecord};
use crate::server::run_server;
use crate::service::ResumeRag;

/// Extract one resume and write its record into `out_dir`.
pub fn run_convert(file: &Path, out_dir: &Path) -> Result<()> {
    if FileKind::from_path(file).is_none() {
        bail!(
            "Unsupported file type: {} (expected .pdf, .doc, or .docx)",
            file.display()
        );
    }

    let text = extract_file(file).with_context(|| format!("Failed to extract {}", file.display()))?;
    let source = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let record = ResumeRecord::new(source, &text);
    let path = record_path_for(file, out_dir);
    upsert_record(&path, &record)?;

    println!("Wrote {} ({} chars)", path.display(), record.resume.chars().count());
    Ok(())
}

/// Chunk every stored record and report counts without embedding anything.
pub fn run_chunks(config: &Config, chunk_size: Option<usize>) -> Result<()> {
    let chunk_size = chunk_size.unwrap_or(config.chunking.chunk_size);
    if chunk_size == 0 {
        bail!("--chunk-size must be > 0");
    }

    let collection = DocumentCollection::new();
    let loaded = load_documents(&config.paths.record_dir, &collection);
    tracing::debug!(documents = loaded, "loaded records");
    let documents = collection.snapshot();
    let splitter = TextSplitter::new(chunk_size);
    let stats = chunk_stats(&documents, &splitter);

    println!("Chunking dry run (chunk_size={}, overlap={}):", splitter.chunk_size(), splitter.overlap());
    println!("  documents:      {}", stats.documents);
    println!("  chunks:         {}", stats.segments);
    println!("  after dedup:    {}", stats.unique_chunks);
    println!("  longest chunk:  {} chars", stats.longest_chunk);
    Ok(())
}

/// Build one snapshot over the stored records and answer `question`.
pub async fn run_ask(config: Config, question: &str) -> Result<()> {
    let service = ResumeRag::from_config(config)?;
    let loaded = service.ingestor().load_records();
    if loaded == 0 {
        println!("{}", crate::session::NO_DATA_NOTICE);
        return Ok(());
    }

    match service.rebuild_now().await {
        RebuildOutcome::Published { version, chunks } => {
            tracing::info!(version, chunks, "snapshot ready");
        }
        RebuildOutcome::Failed { error } => bail!("Index build failed: {}", error),
        RebuildOutcome::Idle => bail!("Index build did not run"),
    }

    let result = service.query().answer(question).await?;
    println!("{}", result.answer_text);
    if !result.cited_sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &result.cited_sources {
            println!("  - {}", source);
        }
    }
    Ok(())
}

/// Start ingestion and serve HTTP until terminated.
pub async fn run_serve(config: Config) -> Result<()> {
    let mut service = ResumeRag::from_config(config)?;
    service.start_ingest().await?;
    run_server(Arc::new(service)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn convert_rejects_unknown_extension() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("notes.txt");
        std::fs::write(&input, "hello").unwrap();
        let err = run_convert(&input, tmp.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported file type"));
        assert!(!tmp.path().join("notes.csv").exists());
    }

    #[test]
    fn chunks_over_records() {
        let tmp = TempDir::new().unwrap();
        let config = Config::minimal(tmp.path());
        upsert_record(
            &config.paths.record_dir.join("jane.csv"),
            &ResumeRecord::new("jane.pdf", "Rust engineer with ten years of systems work"),
        )
        .unwrap();

        run_chunks(&config, Some(64)).unwrap();
    }

    #[test]
    fn convert_keeps_other_extension_with_same_stem() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("csv_files");
        upsert_record(
            &out.join("jane.csv"),
            &ResumeRecord::new("jane.pdf", "Rust engineer"),
        )
        .unwrap();

        let input = tmp.path().join("jane.docx");
        std::fs::write(&input, b"not a zip").unwrap();
        assert!(run_convert(&input, &out).is_err());

        let records = crate::record::read_records(&out.join("jane.csv")).unwrap();
        assert_eq!(records, vec![ResumeRecord::new("jane.pdf", "Rust engineer")]);
    }

    #[test]
    fn chunks_rejects_zero_size() {
        let tmp = TempDir::new().unwrap();
        let config = Config::minimal(tmp.path());
        assert!(run_chunks(&config, Some(0)).is_err());
    }
}
