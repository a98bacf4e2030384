//! Document ingestion pipeline.
//!
//! One document per call: size check, PDF text extraction, normalization,
//! chunking, embedding, then an atomic replace of the document's records in
//! the backing store and a version swap so the new content is searchable
//! before the call returns. A byte-identical re-upload is detected by content
//! hash and short-circuits without re-embedding.

use std::path::Path;

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::{embed_in_batches, Embedder};
use crate::error::{Error, Result};
use crate::extract;
use crate::models::{Document, DocumentStatus, EmbeddingRecord, IngestReport};
use crate::store::{persist, KnowledgeStore};

/// Stable document id derived from the filename, so a re-upload addresses
/// the same row and replaces its records.
pub fn document_id_for(filename: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, filename.as_bytes()).to_string()
}

/// Ingest one document and return the post-swap report.
pub async fn ingest_document(
    config: &Config,
    store: &KnowledgeStore,
    embedder: &dyn Embedder,
    filename: &str,
    media_type: &str,
    bytes: &[u8],
) -> Result<IngestReport> {
    let filename = safe_filename(filename)?;
    if bytes.len() > config.documents.max_upload_bytes {
        return Err(Error::IngestionFailed(format!(
            "{} is {} bytes, over the {} byte upload ceiling",
            filename,
            bytes.len(),
            config.documents.max_upload_bytes
        )));
    }

    let document_id = document_id_for(&filename);
    let dedup_hash = content_hash(bytes);

    // Byte-identical re-upload: the records in the store are already exactly
    // what this document would produce.
    if let Some(existing) = persist::get_document(store.pool(), &document_id).await? {
        if existing.status == DocumentStatus::Processed && existing.dedup_hash == dedup_hash {
            let chunk_count = persist::record_count_for_document(store.pool(), &document_id).await?;
            let version = store.ensure_fresh().await?;
            info!(document_id = %document_id, filename = %filename, "unchanged re-upload, skipping embedding");
            return Ok(IngestReport {
                status: DocumentStatus::Processed,
                document_id,
                chunk_count: chunk_count as usize,
                current_version_id: version.version_id,
            });
        }
    }

    let text = extract::extract_text(bytes, media_type)?;

    let document = Document {
        id: document_id.clone(),
        filename: filename.clone(),
        ingested_at: chrono::Utc::now(),
        byte_len: bytes.len() as i64,
        status: DocumentStatus::Pending,
        dedup_hash,
    };
    save_raw_bytes(config, &filename, bytes)?;
    persist::upsert_document(store.pool(), &document).await?;

    let chunks = chunk_text(&document_id, &text, &config.chunking);
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

    let vectors = match embed_in_batches(embedder, &texts, config.embedding.batch_size).await {
        Ok(vectors) => vectors,
        Err(err) => {
            mark_failed(store.pool(), &document_id).await;
            return Err(err);
        }
    };

    // New vectors must match whatever dimensionality the store already
    // serves, or the merged version would be unsearchable.
    let current = match store.ensure_fresh().await {
        Ok(version) => version,
        Err(err) => {
            warn!(error = %err, "refresh before merge failed, checking against last version");
            store.current_version()
        }
    };
    if !current.is_empty() && current.dims != embedder.dimension() {
        mark_failed(store.pool(), &document_id).await;
        return Err(Error::IndexBuildFailed(format!(
            "embedder produces {} dims but the store holds {} dim vectors",
            embedder.dimension(),
            current.dims
        )));
    }

    let records: Vec<EmbeddingRecord> = chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| EmbeddingRecord {
            chunk_id: format!("{}:{}", chunk.document_id, chunk.seq),
            document_id: chunk.document_id.clone(),
            seq: chunk.seq,
            text: chunk.text.clone(),
            vector,
        })
        .collect();

    let generation = persist::replace_records(store.pool(), &document, &records).await?;
    let version = store.ensure_fresh().await?;
    info!(
        document_id = %document_id,
        filename = %filename,
        chunks = records.len(),
        generation,
        version_id = version.version_id,
        "document ingested"
    );

    Ok(IngestReport {
        status: DocumentStatus::Processed,
        document_id,
        chunk_count: records.len(),
        current_version_id: version.version_id,
    })
}

/// Ingest one PDF file or every PDF under a directory, printing a per-file
/// summary plus totals.
pub async fn run_ingest(
    config: &Config,
    store: &KnowledgeStore,
    embedder: &dyn Embedder,
    path: &Path,
) -> Result<()> {
    let files = collect_pdf_files(path)?;
    if files.is_empty() {
        println!("no PDF files found under {}", path.display());
        return Ok(());
    }

    let mut processed = 0usize;
    let mut failed = 0usize;
    let mut total_chunks = 0usize;
    let mut last_version = 0u64;

    for file in &files {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf")
            .to_string();
        let bytes = std::fs::read(file)?;
        match ingest_document(config, store, embedder, &name, extract::MIME_PDF, &bytes).await {
            Ok(report) => {
                println!("  {}: processed, {} chunks", name, report.chunk_count);
                processed += 1;
                total_chunks += report.chunk_count;
                last_version = report.current_version_id;
            }
            Err(err) => {
                println!("  {}: failed ({})", name, err);
                failed += 1;
            }
        }
    }

    println!("ingest {}", path.display());
    println!("  processed: {}", processed);
    println!("  failed: {}", failed);
    println!("  chunks written: {}", total_chunks);
    if last_version > 0 {
        println!("  store version: {}", last_version);
    }
    Ok(())
}

fn collect_pdf_files(path: &Path) -> Result<Vec<std::path::PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(Error::IngestionFailed(format!(
            "no such file or directory: {}",
            path.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| Error::IngestionFailed(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Uploads address documents by bare filename; reject anything that would
/// escape the documents directory.
fn safe_filename(filename: &str) -> Result<String> {
    match Path::new(filename).file_name().and_then(|n| n.to_str()) {
        Some(name) if name == filename && !name.is_empty() => Ok(name.to_string()),
        _ => Err(Error::IngestionFailed(format!(
            "invalid filename: {:?}",
            filename
        ))),
    }
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn save_raw_bytes(config: &Config, filename: &str, bytes: &[u8]) -> Result<()> {
    std::fs::create_dir_all(&config.documents.dir)?;
    std::fs::write(config.documents.dir.join(filename), bytes)?;
    Ok(())
}

async fn mark_failed(pool: &SqlitePool, document_id: &str) {
    if let Err(err) = persist::mark_document_failed(pool, document_id).await {
        warn!(error = %err, document_id, "could not record failed status");
    }
}
