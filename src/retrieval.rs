//! Retrieval gate and context injector for live conversation turns.
//!
//! The gate decides, from a finalized utterance alone, whether a knowledge
//! lookup is worth a round trip. The injector owns everything after a
//! trigger: embed the utterance, search the store, and fold the winning
//! passages into one bounded side-context block for the next generation
//! request. Nothing on this path may fail the conversation; every error
//! degrades to "inject nothing" with a warning.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::embedding::{embed_query, Embedder};
use crate::error::Error;
use crate::models::SearchHit;
use crate::store::KnowledgeStore;

/// Decides whether a finalized utterance should trigger retrieval.
///
/// Implementations must be pure over the utterance text; the keyword gate
/// below is the default, replaceable by e.g. an intent classifier without
/// touching the injector.
pub trait RetrievalGate: Send + Sync {
    fn should_retrieve(&self, utterance: &str) -> bool;
}

/// Word-boundary keyword gate over a configured topical vocabulary.
///
/// Matching is case-insensitive and whole-word: "cut" fires on "cut" and
/// "Cut," but not on "haircut" or "cutting".
pub struct KeywordGate {
    terms: HashSet<String>,
}

impl KeywordGate {
    pub fn new(vocabulary: &[String]) -> Self {
        KeywordGate {
            terms: vocabulary.iter().map(|t| t.to_lowercase()).collect(),
        }
    }
}

impl RetrievalGate for KeywordGate {
    fn should_retrieve(&self, utterance: &str) -> bool {
        if self.terms.is_empty() {
            return false;
        }
        utterance
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .any(|word| self.terms.contains(&word.to_lowercase()))
    }
}

/// Embeds a triggered utterance, searches the store, and assembles the
/// side-context block.
pub struct Injector {
    embedder: Arc<dyn Embedder>,
    store: Arc<KnowledgeStore>,
    k: usize,
    max_context_chars: usize,
}

impl Injector {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<KnowledgeStore>,
        config: &RetrievalConfig,
    ) -> Self {
        Injector {
            embedder,
            store,
            k: config.k,
            max_context_chars: config.max_context_chars,
        }
    }

    /// Retrieve context for a finalized utterance.
    ///
    /// Returns `None` when nothing useful (or nothing at all) came back;
    /// embedder and store failures are logged as degradation, never raised.
    pub async fn retrieve(&self, utterance: &str) -> Option<String> {
        let query = match embed_query(self.embedder.as_ref(), utterance).await {
            Ok(query) => query,
            Err(err) => {
                let err = Error::RetrievalDegraded(err.to_string());
                warn!(error = %err, "skipping context injection");
                return None;
            }
        };

        let hits = self.store.search(&query, self.k).await;
        if hits.is_empty() {
            debug!("no passages matched, nothing to inject");
            return None;
        }

        let block = compose_context(&hits, self.max_context_chars);
        if let Some(ref text) = block {
            debug!(
                passages = hits.len(),
                chars = text.chars().count(),
                "assembled side context"
            );
        }
        block
    }
}

/// Join passages in score order into one block capped at `max_chars`
/// characters. A passage that would push the block over the cap is dropped
/// whole; later, shorter passages may still fit.
fn compose_context(hits: &[SearchHit], max_chars: usize) -> Option<String> {
    const SEPARATOR: &str = "\n\n";

    let mut block = String::new();
    let mut block_chars = 0usize;
    for hit in hits {
        let passage_chars = hit.record.text.chars().count();
        let sep_chars = if block.is_empty() {
            0
        } else {
            SEPARATOR.chars().count()
        };
        if block_chars + sep_chars + passage_chars > max_chars {
            continue;
        }
        if !block.is_empty() {
            block.push_str(SEPARATOR);
        }
        block.push_str(&hit.record.text);
        block_chars += sep_chars + passage_chars;
    }

    if block.is_empty() {
        None
    } else {
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::embedding::OfflineEmbedder;
    use crate::error::Result;
    use crate::models::{Document, DocumentStatus, EmbeddingRecord};
    use crate::store::persist;
    use async_trait::async_trait;
    use chrono::Utc;

    fn gate(terms: &[&str]) -> KeywordGate {
        let vocabulary: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
        KeywordGate::new(&vocabulary)
    }

    #[test]
    fn test_gate_matches_whole_words_case_insensitively() {
        let g = gate(&["cut", "simmer"]);
        assert!(g.should_retrieve("now cut the onion"));
        assert!(g.should_retrieve("Cut, then rinse"));
        assert!(g.should_retrieve("LET IT SIMMER"));
        assert!(!g.should_retrieve("I got a haircut"));
        assert!(!g.should_retrieve("keep cutting"));
        assert!(!g.should_retrieve(""));
    }

    #[test]
    fn test_gate_with_empty_vocabulary_never_fires() {
        let g = gate(&[]);
        assert!(!g.should_retrieve("cut cook stir"));
    }

    fn hit(text: &str, score: f32) -> SearchHit {
        SearchHit {
            record: EmbeddingRecord {
                chunk_id: "c".to_string(),
                document_id: "d".to_string(),
                seq: 0,
                text: text.to_string(),
                vector: Vec::new(),
            },
            score,
        }
    }

    #[test]
    fn test_compose_drops_whole_passages_over_the_cap() {
        let hits = vec![hit("aaaa", 0.9), hit("bbbb", 0.8), hit("cc", 0.7)];
        // Cap of 10: "aaaa" (4) fits, "\n\nbbbb" (6) would make 10 -> fits
        // exactly, "\n\ncc" would overflow and is dropped.
        let block = compose_context(&hits, 10).unwrap();
        assert_eq!(block, "aaaa\n\nbbbb");

        // A tighter cap drops the middle passage but keeps the short tail.
        let block = compose_context(&hits, 8).unwrap();
        assert_eq!(block, "aaaa\n\ncc");
    }

    #[test]
    fn test_compose_returns_none_when_nothing_fits() {
        let hits = vec![hit("a long passage", 0.9)];
        assert!(compose_context(&hits, 3).is_none());
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(Error::EmbeddingUnavailable("down for the test".to_string()))
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    async fn store_with(records: &[EmbeddingRecord]) -> (tempfile::TempDir, Arc<KnowledgeStore>) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect(&dir.path().join("r.sqlite")).await.unwrap();
        let store = KnowledgeStore::open(pool).await.unwrap();
        if !records.is_empty() {
            let doc = Document {
                id: "d".to_string(),
                filename: "d.pdf".to_string(),
                ingested_at: Utc::now(),
                byte_len: 1,
                status: DocumentStatus::Pending,
                dedup_hash: String::new(),
            };
            persist::replace_records(store.pool(), &doc, records)
                .await
                .unwrap();
        }
        (dir, Arc::new(store))
    }

    #[tokio::test]
    async fn test_injector_returns_matching_passage() {
        let embedder = Arc::new(OfflineEmbedder::new(16));
        let passage = "blanch the beans before shocking them in ice water";
        let vector = embed_query(embedder.as_ref(), passage).await.unwrap();
        let (_dir, store) = store_with(&[EmbeddingRecord {
            chunk_id: "d:0".to_string(),
            document_id: "d".to_string(),
            seq: 0,
            text: passage.to_string(),
            vector,
        }])
        .await;

        let injector = Injector::new(embedder, store, &RetrievalConfig::default());
        let block = injector.retrieve(passage).await.unwrap();
        assert!(block.contains("blanch the beans"));
    }

    #[tokio::test]
    async fn test_injector_degrades_to_none_when_embedder_fails() {
        let (_dir, store) = store_with(&[]).await;
        let injector = Injector::new(
            Arc::new(FailingEmbedder),
            store,
            &RetrievalConfig::default(),
        );
        assert!(injector.retrieve("please cut the leeks").await.is_none());
    }

    #[tokio::test]
    async fn test_injector_returns_none_on_empty_store() {
        let embedder = Arc::new(OfflineEmbedder::new(16));
        let (_dir, store) = store_with(&[]).await;
        let injector = Injector::new(embedder, store, &RetrievalConfig::default());
        assert!(injector.retrieve("what temperature for bread").await.is_none());
    }
}
