//! Embedding provider boundary.
//!
//! The core consumes one contract: a batch of texts in, a batch of
//! fixed-length vectors out, in the same order. A batch either fully
//! succeeds or the call fails with `EmbeddingUnavailable`; partial batches
//! are never returned, so a failed document ingestion can simply be retried
//! wholesale.
//!
//! Providers:
//! - **[`HttpEmbedder`]** calls an OpenAI-compatible `/embeddings` endpoint
//!   with bounded retry and exponential backoff (429/5xx and transport
//!   errors retry; other 4xx fail immediately).
//! - **[`OfflineEmbedder`]** derives deterministic unit vectors from a text
//!   hash. No network; used for tests, demos, and air-gapped runs.
//!
//! Vector helpers for the SQLite backing store live here too:
//! [`vec_to_blob`] / [`blob_to_vec`] encode vectors as little-endian f32
//! BLOBs, and [`cosine_similarity`] is the similarity measure used by
//! search.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Batch embedding contract consumed by ingestion and retrieval.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in input
    /// order. Fails wholesale with `EmbeddingUnavailable`.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Vector dimensionality this provider produces.
    fn dimension(&self) -> usize;

    /// Model identifier, for logs and status output.
    fn model_name(&self) -> &str;
}

/// Embed a single query text. Convenience wrapper for retrieval.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let mut vectors = embedder.embed(&[text.to_string()]).await?;
    vectors
        .pop()
        .ok_or_else(|| Error::EmbeddingUnavailable("empty embedding response".to_string()))
}

/// Embed `texts` in batches of `batch_size`, preserving input order.
///
/// Any failing batch aborts the whole call; callers treat the document as
/// not ingested and retry it entirely.
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let mut chunk_vectors = embedder.embed(batch).await?;
        if chunk_vectors.len() != batch.len() {
            return Err(Error::EmbeddingUnavailable(format!(
                "provider returned {} vectors for {} texts",
                chunk_vectors.len(),
                batch.len()
            )));
        }
        vectors.append(&mut chunk_vectors);
    }
    Ok(vectors)
}

/// Create the configured [`Embedder`].
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "http" => Ok(Arc::new(HttpEmbedder::new(config)?)),
        "offline" => Ok(Arc::new(OfflineEmbedder::new(config.dims))),
        other => Err(Error::Config(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ HTTP Provider ============

/// OpenAI-compatible embeddings client.
///
/// Sends `POST {base_url}/embeddings` with `{model, input}` and expects
/// `data[].embedding` arrays back. A bearer token is attached when the
/// configured environment variable is set; self-hosted endpoints that do
/// not check authorization work without it.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_ref()
            .ok_or_else(|| Error::Config("embedding.base_url required for http provider".into()))?
            .trim_end_matches('/')
            .to_string();
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Config("embedding.model required for http provider".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url),
            api_key: std::env::var(&config.api_key_env).ok(),
            model,
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&self.endpoint).json(&body);
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            Error::EmbeddingUnavailable(format!(
                                "malformed embedding response: {}",
                                e
                            ))
                        })?;
                        return parse_embeddings_response(&json, texts.len(), self.dims);
                    }

                    // Rate limited or server error, worth retrying.
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::EmbeddingUnavailable(format!(
                            "embedding API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Other client errors will not get better on retry.
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(Error::EmbeddingUnavailable(format!(
                        "embedding API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(Error::EmbeddingUnavailable(format!(
                        "embedding request failed: {}",
                        e
                    )));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::EmbeddingUnavailable("embedding failed after retries".to_string())
        }))
    }

    fn dimension(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Parse an OpenAI-style embeddings response, honoring the `index` field so
/// output order always matches input order.
fn parse_embeddings_response(
    json: &serde_json::Value,
    expected_count: usize,
    expected_dims: usize,
) -> Result<Vec<Vec<f32>>> {
    let data = json.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
        Error::EmbeddingUnavailable("invalid embedding response: missing data array".to_string())
    })?;

    if data.len() != expected_count {
        return Err(Error::EmbeddingUnavailable(format!(
            "provider returned {} embeddings for {} inputs",
            data.len(),
            expected_count
        )));
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected_count];
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                Error::EmbeddingUnavailable(
                    "invalid embedding response: missing embedding".to_string(),
                )
            })?;

        let vector: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        if vector.len() != expected_dims {
            return Err(Error::EmbeddingUnavailable(format!(
                "provider returned {}-dimensional vector, expected {}",
                vector.len(),
                expected_dims
            )));
        }

        if index >= expected_count || slots[index].is_some() {
            return Err(Error::EmbeddingUnavailable(format!(
                "invalid embedding response: bad index {}",
                index
            )));
        }
        slots[index] = Some(vector);
    }

    // Every slot was filled exactly once, so unwrapping here cannot miss.
    Ok(slots.into_iter().flatten().collect())
}

// ============ Offline Provider ============

/// Deterministic, network-free embedder.
///
/// Derives a unit vector from repeated SHA-256 digests of the text. The
/// same text always maps to the same vector and different texts map to
/// effectively unrelated directions, which is all that tests and offline
/// demos need from a similarity space.
pub struct OfflineEmbedder {
    dims: usize,
}

impl OfflineEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = Vec::with_capacity(self.dims);
        let mut counter = 0u32;
        while vector.len() < self.dims {
            let mut hasher = Sha256::new();
            hasher.update(counter.to_le_bytes());
            hasher.update(text.as_bytes());
            for byte in hasher.finalize() {
                if vector.len() == self.dims {
                    break;
                }
                vector.push((byte as f32 / 127.5) - 1.0);
            }
            counter += 1;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for OfflineEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "offline-hash"
    }
}

// ============ Vector helpers ============

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` for empty vectors or
/// mismatched lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_embedder_is_deterministic() {
        let embedder = OfflineEmbedder::new(64);
        let texts = vec![
            "cutting onions".to_string(),
            "roasting peppers".to_string(),
            "cutting onions".to_string(),
        ];
        let first = embedder.embed(&texts).await.unwrap();
        let second = embedder.embed(&texts).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0], first[2]);
        assert_ne!(first[0], first[1]);
    }

    #[tokio::test]
    async fn test_offline_vectors_are_unit_length() {
        let embedder = OfflineEmbedder::new(384);
        let vectors = embedder.embed(&["hello".to_string()]).await.unwrap();
        assert_eq!(vectors[0].len(), 384);
        let norm: f32 = vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_batching_preserves_order_across_batches() {
        let embedder = OfflineEmbedder::new(32);
        let texts: Vec<String> = (0..7).map(|i| format!("text number {}", i)).collect();
        let batched = embed_in_batches(&embedder, &texts, 3).await.unwrap();
        let whole = embedder.embed(&texts).await.unwrap();
        assert_eq!(batched, whole);
    }

    #[test]
    fn test_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), vec.len() * 4);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_is_zero() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_response_parsing_honors_index_field() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] },
            ]
        });
        let vectors = parse_embeddings_response(&json, 2, 2).unwrap();
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[test]
    fn test_response_with_wrong_count_is_unavailable() {
        let json = serde_json::json!({
            "data": [ { "index": 0, "embedding": [1.0, 0.0] } ]
        });
        let err = parse_embeddings_response(&json, 2, 2).unwrap_err();
        assert!(matches!(err, Error::EmbeddingUnavailable(_)));
    }

    #[test]
    fn test_response_with_wrong_dims_is_unavailable() {
        let json = serde_json::json!({
            "data": [ { "index": 0, "embedding": [1.0, 0.0, 0.5] } ]
        });
        let err = parse_embeddings_response(&json, 1, 2).unwrap_err();
        assert!(matches!(err, Error::EmbeddingUnavailable(_)));
    }

    fn http_config(base_url: String, max_retries: u32) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "http".to_string(),
            base_url: Some(base_url),
            model: Some("test-model".to_string()),
            dims: 2,
            max_retries,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_http_embedder_round_trips_over_the_wire() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "index": 0, "embedding": [1.0, 0.0] },
                    { "index": 1, "embedding": [0.0, 1.0] },
                ]
            })))
            .mount(&mock_server)
            .await;

        let embedder = HttpEmbedder::new(&http_config(mock_server.uri(), 0)).unwrap();
        let vectors = embedder
            .embed(&["salt".to_string(), "acid".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_http_embedder_retries_rate_limits() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        // First request is rate limited; the retry succeeds.
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [ { "index": 0, "embedding": [0.5, 0.5] } ]
            })))
            .mount(&mock_server)
            .await;

        let embedder = HttpEmbedder::new(&http_config(mock_server.uri(), 2)).unwrap();
        let vectors = embedder.embed(&["heat".to_string()]).await.unwrap();
        assert_eq!(vectors, vec![vec![0.5, 0.5]]);
    }

    #[tokio::test]
    async fn test_http_embedder_fails_fast_on_client_error() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&mock_server)
            .await;

        let embedder = HttpEmbedder::new(&http_config(mock_server.uri(), 3)).unwrap();
        let err = embedder.embed(&["fat".to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingUnavailable(_)));
    }
}
