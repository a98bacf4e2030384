//! SQLite persistence for documents, embedding records, and the store
//! generation counter.
//!
//! Every write that changes index-visible data (record replacement, document
//! deletion, clearing) runs in one transaction and bumps `store_meta.generation`
//! before committing. Readers compare that counter against the generation their
//! in-memory version was built from to decide staleness.

use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::Result;
use crate::models::{Document, DocumentStatus, EmbeddingRecord};

pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL UNIQUE,
            ingested_at INTEGER NOT NULL,
            byte_len INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            dedup_hash TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            chunk_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            text TEXT NOT NULL,
            vector BLOB NOT NULL,
            UNIQUE(document_id, seq),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Single-row table holding the write generation counter.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS store_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            generation INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("INSERT OR IGNORE INTO store_meta (id, generation) VALUES (1, 0)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_document_id ON records(document_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_ingested_at ON documents(ingested_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn generation(pool: &SqlitePool) -> Result<i64> {
    let generation: i64 = sqlx::query_scalar("SELECT generation FROM store_meta WHERE id = 1")
        .fetch_one(pool)
        .await?;
    Ok(generation)
}

async fn bump_generation(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>) -> Result<i64> {
    sqlx::query("UPDATE store_meta SET generation = generation + 1 WHERE id = 1")
        .execute(&mut **tx)
        .await?;
    let generation: i64 = sqlx::query_scalar("SELECT generation FROM store_meta WHERE id = 1")
        .fetch_one(&mut **tx)
        .await?;
    Ok(generation)
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Document {
    let ingested_at: i64 = row.get("ingested_at");
    let status: String = row.get("status");
    Document {
        id: row.get("id"),
        filename: row.get("filename"),
        ingested_at: chrono::DateTime::from_timestamp(ingested_at, 0).unwrap_or_default(),
        byte_len: row.get("byte_len"),
        status: DocumentStatus::from_str(&status),
        dedup_hash: row.get("dedup_hash"),
    }
}

pub async fn get_document(pool: &SqlitePool, id: &str) -> Result<Option<Document>> {
    let row = sqlx::query(
        "SELECT id, filename, ingested_at, byte_len, status, dedup_hash FROM documents WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(document_from_row))
}

pub async fn find_document_by_filename(
    pool: &SqlitePool,
    filename: &str,
) -> Result<Option<Document>> {
    let row = sqlx::query(
        "SELECT id, filename, ingested_at, byte_len, status, dedup_hash FROM documents WHERE filename = ?",
    )
    .bind(filename)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(document_from_row))
}

/// Insert or update a document row without touching its records.
///
/// Used to record a document as `pending` before extraction and embedding
/// begin. Does not bump the generation counter: the vector set is unchanged.
pub async fn upsert_document(pool: &SqlitePool, document: &Document) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documents (id, filename, ingested_at, byte_len, status, dedup_hash)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            ingested_at = excluded.ingested_at,
            byte_len = excluded.byte_len,
            status = excluded.status,
            dedup_hash = excluded.dedup_hash
        "#,
    )
    .bind(&document.id)
    .bind(&document.filename)
    .bind(document.ingested_at.timestamp())
    .bind(document.byte_len)
    .bind(document.status.as_str())
    .bind(&document.dedup_hash)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_document_failed(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("UPDATE documents SET status = ? WHERE id = ?")
        .bind(DocumentStatus::Failed.as_str())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Atomically replace a document's records and mark it processed.
///
/// Old records for the document are deleted and the new set inserted in one
/// transaction, so concurrent readers observe either the previous complete
/// set or the new one. Returns the generation after the bump.
pub async fn replace_records(
    pool: &SqlitePool,
    document: &Document,
    records: &[EmbeddingRecord],
) -> Result<i64> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO documents (id, filename, ingested_at, byte_len, status, dedup_hash)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            ingested_at = excluded.ingested_at,
            byte_len = excluded.byte_len,
            status = excluded.status,
            dedup_hash = excluded.dedup_hash
        "#,
    )
    .bind(&document.id)
    .bind(&document.filename)
    .bind(document.ingested_at.timestamp())
    .bind(document.byte_len)
    .bind(DocumentStatus::Processed.as_str())
    .bind(&document.dedup_hash)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM records WHERE document_id = ?")
        .bind(&document.id)
        .execute(&mut *tx)
        .await?;

    for record in records {
        sqlx::query(
            "INSERT INTO records (chunk_id, document_id, seq, text, vector) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.chunk_id)
        .bind(&record.document_id)
        .bind(record.seq)
        .bind(&record.text)
        .bind(vec_to_blob(&record.vector))
        .execute(&mut *tx)
        .await?;
    }

    let generation = bump_generation(&mut tx).await?;
    tx.commit().await?;
    Ok(generation)
}

/// Load every record in deterministic (document_id, seq) order.
pub async fn load_records(pool: &SqlitePool) -> Result<Vec<EmbeddingRecord>> {
    let rows = sqlx::query(
        "SELECT chunk_id, document_id, seq, text, vector FROM records ORDER BY document_id ASC, seq ASC",
    )
    .fetch_all(pool)
    .await?;

    let records = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("vector");
            EmbeddingRecord {
                chunk_id: row.get("chunk_id"),
                document_id: row.get("document_id"),
                seq: row.get("seq"),
                text: row.get("text"),
                vector: blob_to_vec(&blob),
            }
        })
        .collect();
    Ok(records)
}

pub async fn list_documents(pool: &SqlitePool) -> Result<Vec<Document>> {
    let rows = sqlx::query(
        "SELECT id, filename, ingested_at, byte_len, status, dedup_hash FROM documents ORDER BY ingested_at DESC, filename ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(document_from_row).collect())
}

pub async fn record_count_for_document(pool: &SqlitePool, document_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE document_id = ?")
        .bind(document_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn counts(pool: &SqlitePool) -> Result<(i64, i64)> {
    let document_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;
    let vector_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
        .fetch_one(pool)
        .await?;
    Ok((document_count, vector_count))
}

/// Delete a document and its records. Returns false if no such document
/// existed; the generation is bumped only when something was removed.
pub async fn delete_document(pool: &SqlitePool, id: &str) -> Result<bool> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM records WHERE document_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if deleted == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    bump_generation(&mut tx).await?;
    tx.commit().await?;
    Ok(true)
}

/// Drop every document and record, leaving an empty store at a new generation.
pub async fn clear(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM records").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM documents")
        .execute(&mut *tx)
        .await?;

    bump_generation(&mut tx).await?;
    tx.commit().await?;
    Ok(())
}
