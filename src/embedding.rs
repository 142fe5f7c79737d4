//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]** — reports unavailable; used when embeddings are not configured.
//! - **`LocalProvider`** — runs models locally via fastembed; the model is
//!   loaded lazily on the first embed call, on a blocking worker, and reused
//!   for the process lifetime.
//! - **[`RemoteProvider`]** — calls a remote embedding endpoint with retry
//!   and backoff, fronted by a content-hash-keyed SQLite cache with a TTL.
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`] — compute similarity between two embedding vectors
//! - [`vec_to_blob`] — encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`] — decode a SQLite BLOB back into a `Vec<f32>`
//!
//! # Availability and degradation
//!
//! `embed` returns `Ok(None)` for blank input and for expected
//! unavailability (provider down, endpoint unreachable after retries).
//! Errors are reserved for conditions the caller cannot degrade around.
//!
//! # Retry Strategy (remote provider)
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;

/// Trait for embedding providers.
///
/// "Not configured" is signalled through [`is_available`](EmbeddingProvider::is_available),
/// never through errors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dimension(&self) -> usize;

    /// Whether the provider can currently produce embeddings.
    async fn is_available(&self) -> bool;

    /// Embed one text. Returns `Ok(None)` on blank input or expected
    /// unavailability; callers fall back to keyword-only scoring.
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>>;
}

// ============ Disabled Provider ============

/// A no-op embedding provider used when embeddings are not configured.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dimension(&self) -> usize {
        0
    }

    async fn is_available(&self) -> bool {
        false
    }

    async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>> {
        Ok(None)
    }
}

// ============ Local Provider (fastembed) ============

/// Embedding provider for local inference via fastembed.
///
/// Model download/initialization is deferred to the first `embed` call and
/// runs on a blocking worker, so construction is free and callers are never
/// blocked on the async runtime. The loaded model is shared for the rest of
/// the process lifetime.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: tokio::sync::OnceCell<Arc<std::sync::Mutex<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        // Fails fast on unknown model names; the load itself stays lazy.
        config_to_fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or(default_local_dims(&model_name));

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: tokio::sync::OnceCell::new(),
        })
    }

    async fn model(&self) -> Result<Arc<std::sync::Mutex<fastembed::TextEmbedding>>> {
        let model_name = self.model_name.clone();
        self.model
            .get_or_try_init(|| async move {
                let fastembed_model = config_to_fastembed_model(&model_name)?;
                let loaded = tokio::task::spawn_blocking(move || {
                    fastembed::TextEmbedding::try_new(
                        fastembed::InitOptions::new(fastembed_model)
                            .with_show_download_progress(false),
                    )
                    .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))
                })
                .await??;
                Ok::<_, anyhow::Error>(Arc::new(std::sync::Mutex::new(loaded)))
            })
            .await
            .cloned()
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dims
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let model = match self.model().await {
            Ok(model) => model,
            Err(e) => {
                // Model download/initialization failure is recoverable by
                // degrading to keyword-only scoring.
                warn!("local embedding model unavailable: {}", e);
                return Ok(None);
            }
        };

        let text = text.to_string();
        let batch_size = self.batch_size;
        let result = tokio::task::spawn_blocking(move || {
            let mut model = model.lock().unwrap();
            model
                .embed(vec![text], Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await?;

        match result {
            Ok(mut embeddings) if !embeddings.is_empty() => Ok(Some(embeddings.remove(0))),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!("local embedding failed: {}", e);
                Ok(None)
            }
        }
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn default_local_dims(model_name: &str) -> usize {
    match model_name {
        "all-minilm-l6-v2" => 384,
        "bge-small-en-v1.5" => 384,
        "bge-base-en-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "multilingual-e5-small" => 384,
        "multilingual-e5-base" => 768,
        "multilingual-e5-large" => 1024,
        _ => 384,
    }
}

// ============ Remote Provider (cache-backed) ============

/// Embedding provider calling a remote `POST {url}/api/embed` endpoint,
/// fronted by a SQLite cache keyed on `sha256(model + text)`.
///
/// Cached vectors are stored as little-endian f32 blobs; rows written by
/// older deployments as JSON arrays are still readable. Entries older than
/// the TTL are treated as misses and recomputed in place.
pub struct RemoteProvider {
    model: String,
    dims: Option<usize>,
    url: String,
    timeout_secs: u64,
    max_retries: u32,
    cache_ttl: Duration,
    pool: SqlitePool,
}

impl RemoteProvider {
    pub fn new(config: &EmbeddingConfig, pool: SqlitePool) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for remote provider"))?;
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.url required for remote provider"))?;

        Ok(Self {
            model,
            dims: config.dims,
            url,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
            cache_ttl: Duration::from_secs(config.cache_ttl_days * 24 * 3600),
            pool,
        })
    }

    fn cache_key(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.model.as_bytes());
        hasher.update(b"\0");
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn cache_get(&self, key: &str) -> Result<Option<Vec<f32>>> {
        let row = sqlx::query(
            "SELECT vector, format, computed_at FROM embedding_text_cache \
             WHERE cache_key = ? AND model_name = ?",
        )
        .bind(key)
        .bind(&self.model)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let computed_at: i64 = row.get("computed_at");
        let age = chrono::Utc::now().timestamp() - computed_at;
        if age < 0 || age as u64 > self.cache_ttl.as_secs() {
            return Ok(None);
        }

        let blob: Vec<u8> = row.get("vector");
        let format: String = row.get("format");
        Ok(decode_cached_vector(&blob, &format))
    }

    async fn cache_put(&self, key: &str, vector: &[f32]) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO embedding_text_cache \
             (cache_key, model_name, vector, format, computed_at) VALUES (?, ?, ?, 'f32le', ?)",
        )
        .bind(key)
        .bind(&self.model)
        .bind(vec_to_blob(vector))
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Call the remote embedding endpoint with retry/backoff.
    async fn fetch(&self, text: &str) -> Result<Vec<f32>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(format!("{}/api/embed", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_embed_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Embedding API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Embedding API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "Embedding endpoint unreachable at {}: {}",
                        self.url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dims.unwrap_or(0)
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let key = self.cache_key(text);
        match self.cache_get(&key).await {
            Ok(Some(vector)) => return Ok(Some(vector)),
            Ok(None) => {}
            Err(e) => debug!("embedding cache read failed: {}", e),
        }

        let vector = match self.fetch(text).await {
            Ok(vector) => vector,
            Err(e) => {
                // Endpoint down is expected unavailability, not a failure
                // of the scoring request.
                warn!("remote embedding unavailable: {}", e);
                return Ok(None);
            }
        };

        if let Some(dims) = self.dims {
            if vector.len() != dims {
                warn!(
                    "remote embedding dimension mismatch: expected {}, got {}",
                    dims,
                    vector.len()
                );
                return Ok(None);
            }
        }

        if let Err(e) = self.cache_put(&key, &vector).await {
            debug!("embedding cache write failed: {}", e);
        }
        Ok(Some(vector))
    }
}

/// Parse an `{"embeddings": [[...]]}` response body.
fn parse_embed_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing embeddings array"))?;

    let first = embeddings
        .first()
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: empty embeddings array"))?;

    Ok(first
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// Decode a cached vector, falling back from the binary encoding to the
/// legacy JSON text encoding.
fn decode_cached_vector(blob: &[u8], format: &str) -> Option<Vec<f32>> {
    if format == "json" || blob.first() == Some(&b'[') {
        return serde_json::from_slice::<Vec<f32>>(blob).ok();
    }
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(blob_to_vec(blob))
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// # Supported Providers
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"local"` | `LocalProvider` (fastembed, see features) |
/// | `"remote"` | [`RemoteProvider`] |
pub fn create_provider(
    config: &EmbeddingConfig,
    pool: &SqlitePool,
) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires --features local-embeddings-fastembed"
        ),
        "remote" => Ok(Arc::new(RemoteProvider::new(config, pool.clone())?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing
/// a BLOB of `vec.len() × 4` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]: reads 4-byte little-endian `f32` values
/// from the byte slice.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; zero-magnitude vectors yield `0.0`.
/// A dimension mismatch is a programmer error (vectors from different
/// models must never be compared), so it panics rather than degrading.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(
        a.len(),
        b.len(),
        "cosine_similarity: embedding dimension mismatch"
    );
    if a.is_empty() {
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
