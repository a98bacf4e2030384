//! CLI search: embed the query and rank it against the loaded store.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::store::KnowledgeStore;

pub async fn run_search(config: &Config, query: &str, limit: usize) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let pool = db::connect(&config.db.path).await?;
    let store = KnowledgeStore::open(pool).await?;
    let version = store.ensure_fresh().await?;

    let embedder = embedding::create_embedder(&config.embedding)?;
    let query_vector = embedding::embed_query(embedder.as_ref(), query).await?;

    let hits = version.search(&query_vector, limit);
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} (chunk {})",
            i + 1,
            hit.score,
            hit.record.document_id,
            hit.record.seq
        );
        println!("    excerpt: \"{}\"", excerpt(&hit.record.text));
        println!();
    }

    Ok(())
}

/// First 240 chars of a chunk, flattened to one line for terminal output.
fn excerpt(text: &str) -> String {
    const MAX_CHARS: usize = 240;
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MAX_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(MAX_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}
