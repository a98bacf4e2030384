//! Store status overview for the CLI.
//!
//! Prints a quick summary of what's indexed: store condition, version and
//! generation numbers, and a per-document breakdown. Used by `lectern status`
//! to confirm that ingestion and reloads are working as expected.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::store::{persist, KnowledgeStore};

/// Run the status command: load the store and print a summary.
pub async fn run_status(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let store = KnowledgeStore::open(pool).await?;
    let report = store.status().await;
    let version = store.current_version();

    let generation = persist::generation(store.pool()).await.unwrap_or(0);
    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Lectern Knowledge Store");
    println!("=======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Status:      {}", report.status.as_str());
    println!(
        "  Version:     {} (generation {})",
        version.version_id, generation
    );
    println!("  Documents:   {}", report.document_count);
    println!("  Vectors:     {}", report.vector_count);

    let documents = persist::list_documents(store.pool()).await?;
    if !documents.is_empty() {
        println!();
        println!("  By document:");
        println!(
            "  {:<36} {:>10} {:>8}   {}",
            "FILENAME", "STATUS", "CHUNKS", "INGESTED"
        );
        println!("  {}", "-".repeat(76));

        for document in &documents {
            let chunk_count =
                persist::record_count_for_document(store.pool(), &document.id).await?;
            println!(
                "  {:<36} {:>10} {:>8}   {}",
                document.filename,
                document.status.as_str(),
                chunk_count,
                document.ingested_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
