//! Versioned in-memory vector index over the SQLite backing store.
//!
//! The index is a chain of immutable [`StoreVersion`] snapshots. Readers
//! clone an `Arc` to the current version and search it without locking;
//! writers construct a complete new version and swap the pointer. A version
//! stays alive for as long as any reader still holds its `Arc`, so searches
//! in flight during a swap finish against the snapshot they started with.
//!
//! Staleness is detected by comparing the version's generation against the
//! `store_meta` counter persisted by [`persist`]; reloads are serialized by a
//! single-flight guard, and a caller that loses the race adopts the winner's
//! version instead of rebuilding again.

pub mod persist;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{EmbeddingRecord, SearchHit, StoreState, StoreStatusReport};

/// One immutable snapshot of the vector index.
#[derive(Debug)]
pub struct StoreVersion {
    /// Process-local monotonic id, 0 for the pre-load placeholder.
    pub version_id: u64,
    /// Backing-store generation this snapshot was built from.
    pub generation: i64,
    /// Vector dimensionality, 0 when the snapshot holds no records.
    pub dims: usize,
    pub built_at: DateTime<Utc>,
    records: Vec<EmbeddingRecord>,
}

impl StoreVersion {
    fn empty() -> Self {
        StoreVersion {
            version_id: 0,
            generation: 0,
            dims: 0,
            built_at: Utc::now(),
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    /// Distinct document ids present in this snapshot, sorted.
    pub fn document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .records
            .iter()
            .map(|r| r.document_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Cosine similarity search over this snapshot.
    ///
    /// Results are ordered by score descending; equal scores tie-break by
    /// (document_id, seq) ascending so rankings are reproducible. An empty
    /// snapshot yields an empty list.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        if k == 0 || self.records.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .records
            .iter()
            .map(|record| SearchHit {
                score: cosine_similarity(query, &record.vector),
                record: record.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.record.document_id.cmp(&b.record.document_id))
                .then_with(|| a.record.seq.cmp(&b.record.seq))
        });
        hits.truncate(k);
        hits
    }
}

/// Manager owning the current version pointer and the reload protocol.
pub struct KnowledgeStore {
    pool: SqlitePool,
    current: RwLock<Arc<StoreVersion>>,
    version_counter: AtomicU64,
    /// Serialize reload attempts; at most one rebuild in flight.
    reload_lock: Mutex<()>,
}

impl KnowledgeStore {
    /// Open the store, creating the schema if needed.
    ///
    /// The initial version is a generation-0 placeholder; the first access
    /// through [`ensure_fresh`](Self::ensure_fresh) loads whatever the
    /// backing store already holds.
    pub async fn open(pool: SqlitePool) -> Result<Self> {
        persist::init_schema(&pool).await?;
        info!("knowledge store opened");
        Ok(KnowledgeStore {
            pool,
            current: RwLock::new(Arc::new(StoreVersion::empty())),
            version_counter: AtomicU64::new(0),
            reload_lock: Mutex::new(()),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cheap handle to the currently serving snapshot.
    pub fn current_version(&self) -> Arc<StoreVersion> {
        Arc::clone(&self.current.read())
    }

    /// True when the backing store has committed writes this process has not
    /// loaded yet. Never false-negative: every committing write bumps the
    /// generation the comparison is made against.
    pub async fn is_stale(&self) -> Result<bool> {
        let persisted = persist::generation(&self.pool).await?;
        Ok(persisted != self.current_version().generation)
    }

    /// Return a fresh snapshot, reloading from the backing store if stale.
    ///
    /// Concurrent callers collapse into one rebuild: whoever holds the guard
    /// rebuilds, everyone else re-checks staleness after acquiring it and
    /// adopts the version already swapped in.
    pub async fn ensure_fresh(&self) -> Result<Arc<StoreVersion>> {
        if !self.is_stale().await? {
            return Ok(self.current_version());
        }

        let _guard = self.reload_lock.lock().await;
        if !self.is_stale().await? {
            debug!("reload already performed by a concurrent caller");
            return Ok(self.current_version());
        }

        let version = self.load_version().await?;
        *self.current.write() = Arc::clone(&version);
        info!(
            version_id = version.version_id,
            generation = version.generation,
            vectors = version.len(),
            "knowledge store version swapped"
        );
        Ok(version)
    }

    async fn load_version(&self) -> Result<Arc<StoreVersion>> {
        let generation = persist::generation(&self.pool).await?;
        let records = persist::load_records(&self.pool).await?;
        let dims = consistent_dims(&records)?;
        let version_id = self.version_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(StoreVersion {
            version_id,
            generation,
            dims,
            built_at: Utc::now(),
            records,
        }))
    }

    /// Similarity search against the freshest available snapshot.
    ///
    /// A failed refresh is logged and the last loaded version is searched
    /// instead; a stale answer beats no answer for a live conversation.
    pub async fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let version = match self.ensure_fresh().await {
            Ok(version) => version,
            Err(err) => {
                let err = Error::ReloadFailed(err.to_string());
                warn!(error = %err, "searching last loaded version");
                self.current_version()
            }
        };
        version.search(query, k)
    }

    /// Status of the store as of the freshest reachable version.
    ///
    /// When the backing store cannot be consulted the last loaded version is
    /// reported; if none was ever loaded the state is `Unknown`.
    pub async fn status(&self) -> StoreStatusReport {
        let version = match self.ensure_fresh().await {
            Ok(version) => version,
            Err(err) => {
                let current = self.current_version();
                if current.version_id == 0 {
                    warn!(error = %err, "store status unavailable");
                    return StoreStatusReport {
                        status: StoreState::Unknown,
                        document_count: 0,
                        vector_count: 0,
                        document_ids: Vec::new(),
                    };
                }
                warn!(error = %err, "reporting status of last loaded version");
                current
            }
        };

        let document_ids = version.document_ids();
        StoreStatusReport {
            status: if version.is_empty() {
                StoreState::Empty
            } else {
                StoreState::Ready
            },
            document_count: document_ids.len(),
            vector_count: version.len(),
            document_ids,
        }
    }
}

/// `lectern init`: create the database schema and the document directory.
///
/// Idempotent; running it against an existing store changes nothing.
pub async fn run_init(config: &crate::config::Config) -> anyhow::Result<()> {
    let pool = crate::db::connect(&config.db.path).await?;
    persist::init_schema(&pool).await?;
    std::fs::create_dir_all(&config.documents.dir)?;
    pool.close().await;

    println!("Initialized knowledge store at {}", config.db.path.display());
    println!("Document directory: {}", config.documents.dir.display());
    Ok(())
}

/// All records in a snapshot must share one dimensionality.
fn consistent_dims(records: &[EmbeddingRecord]) -> Result<usize> {
    let dims = match records.first() {
        Some(first) => first.vector.len(),
        None => return Ok(0),
    };
    for record in records {
        if record.vector.len() != dims {
            return Err(Error::IndexBuildFailed(format!(
                "record {} has {} dims, expected {}",
                record.chunk_id,
                record.vector.len(),
                dims
            )));
        }
    }
    Ok(dims)
}
