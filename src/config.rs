use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub transcript: TranscriptConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/lectern.sqlite")
}

/// Raw document storage: uploaded bytes are kept on disk under a stable id
/// so documents can be re-processed without a re-upload.
#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: default_documents_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("./data/documents")
}
fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

/// Fixed character windows with overlap. The same (window, overlap) pair
/// always produces the same chunk boundaries for a given text.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_chars: default_window_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_window_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            api_key_env: default_api_key_env(),
            model: None,
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "offline".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of passages fetched per triggered turn.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Ceiling on the assembled side-context block, in characters.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    /// Topical vocabulary for the keyword gate. Configuration, not contract:
    /// swap the list (or the whole gate implementation) freely.
    #[serde(default = "default_vocabulary")]
    pub vocabulary: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            max_context_chars: default_max_context_chars(),
            vocabulary: default_vocabulary(),
        }
    }
}

fn default_k() -> usize {
    3
}
fn default_max_context_chars() -> usize {
    3200
}
fn default_vocabulary() -> Vec<String> {
    [
        "cook",
        "recipe",
        "ingredient",
        "salt",
        "fat",
        "acid",
        "heat",
        "temperature",
        "bake",
        "boil",
        "fry",
        "roast",
        "season",
        "technique",
        "flavor",
        "texture",
        "prepare",
        "dish",
        "meal",
        "food",
        "taste",
        "spice",
        "herb",
        "sauce",
        "vegetable",
        "meat",
        "fish",
        "pasta",
        "rice",
        "bread",
        "knife",
        "cut",
        "chop",
        "blend",
        "mix",
        "stir",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Speaker labels per recognition source. Lines are attributed by source
/// tag, never by inspecting participant identity strings.
#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptConfig {
    #[serde(default = "default_local_label")]
    pub local_label: String,
    #[serde(default = "default_remote_label")]
    pub remote_label: String,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            local_label: default_local_label(),
            remote_label: default_remote_label(),
        }
    }
}

fn default_local_label() -> String {
    "You".to_string()
}
fn default_remote_label() -> String {
    "Room".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Shared by file loading and by callers that assemble a Config in code.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.window_chars == 0 {
        anyhow::bail!("chunking.window_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.window_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.window_chars");
    }

    if config.documents.max_upload_bytes == 0 {
        anyhow::bail!("documents.max_upload_bytes must be > 0");
    }

    if config.retrieval.k == 0 {
        anyhow::bail!("retrieval.k must be >= 1");
    }
    if config.retrieval.max_context_chars == 0 {
        anyhow::bail!("retrieval.max_context_chars must be > 0");
    }

    match config.embedding.provider.as_str() {
        "offline" => {}
        "http" => {
            if config.embedding.base_url.is_none() {
                anyhow::bail!("embedding.base_url must be set when provider is 'http'");
            }
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be set when provider is 'http'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be http or offline.",
            other
        ),
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    config
        .server
        .bind
        .parse::<std::net::SocketAddr>()
        .with_context(|| format!("server.bind is not a valid address: {}", config.server.bind))?;

    Ok(())
}
