//! TOML configuration for the retrieval core.
//!
//! Every section is optional and falls back to the defaults the upload
//! service has always used (800-token chunks, 100-token overlap, 50-char
//! OCR threshold, `text-embedding-3-small` at 1536 dims). A handful of
//! environment variables override the file so deployments can tune
//! chunking without shipping a new config.
//!
//! Invalid combinations are rejected by [`Config::validate`] at startup
//! instead of failing at request time.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per session.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("embeddings")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Pages whose trimmed text is shorter than this are sent to OCR.
    #[serde(default = "default_ocr_threshold")]
    pub ocr_min_text_threshold: usize,
    /// Raster scale for OCR'd pages (1.0 = 72 DPI).
    #[serde(default = "default_render_scale")]
    pub render_scale: f32,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    /// `"tesseract"` or `"disabled"`.
    #[serde(default = "default_ocr")]
    pub ocr: String,
    #[serde(default = "default_tesseract_bin")]
    pub tesseract_bin: PathBuf,
    #[serde(default = "default_pdftoppm_bin")]
    pub pdftoppm_bin: PathBuf,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            ocr_min_text_threshold: default_ocr_threshold(),
            render_scale: default_render_scale(),
            max_file_size_mb: default_max_file_size_mb(),
            ocr: default_ocr(),
            tesseract_bin: default_tesseract_bin(),
            pdftoppm_bin: default_pdftoppm_bin(),
        }
    }
}

fn default_ocr_threshold() -> usize {
    50
}
fn default_render_scale() -> f32 {
    2.0
}
fn default_max_file_size_mb() -> u64 {
    5
}
fn default_ocr() -> String {
    "tesseract".to_string()
}
fn default_tesseract_bin() -> PathBuf {
    PathBuf::from("tesseract")
}
fn default_pdftoppm_bin() -> PathBuf {
    PathBuf::from("pdftoppm")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_tokens: default_chunk_size(),
            overlap_tokens: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"openai"`, `"ollama"`, or `"disabled"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// OpenAI-compatible API base, e.g. `https://api.openai.com/v1`.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Ollama server URL.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            base_url: None,
            url: None,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    100
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

impl Config {
    /// Apply the upload service's environment overrides on top of the file.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CHUNK_SIZE_TOKENS") {
            self.chunking.chunk_size_tokens = parse_env("CHUNK_SIZE_TOKENS", &v)?;
        }
        if let Some(v) = lookup("CHUNK_OVERLAP_TOKENS") {
            self.chunking.overlap_tokens = parse_env("CHUNK_OVERLAP_TOKENS", &v)?;
        }
        if let Some(v) = lookup("OCR_MIN_TEXT_THRESHOLD") {
            self.extraction.ocr_min_text_threshold = parse_env("OCR_MIN_TEXT_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("MAX_FILE_SIZE_MB") {
            self.extraction.max_file_size_mb = parse_env("MAX_FILE_SIZE_MB", &v)?;
        }
        if let Some(v) = lookup("EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = lookup("EMBEDDINGS_FOLDER") {
            self.storage.root = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size_tokens == 0 {
            bail!("chunking.chunk_size_tokens must be > 0");
        }
        if self.chunking.overlap_tokens >= self.chunking.chunk_size_tokens {
            bail!(
                "chunking.overlap_tokens ({}) must be smaller than chunking.chunk_size_tokens ({})",
                self.chunking.overlap_tokens,
                self.chunking.chunk_size_tokens
            );
        }
        if !(self.extraction.render_scale > 0.0) {
            bail!("extraction.render_scale must be > 0");
        }
        if self.extraction.max_file_size_mb == 0 {
            bail!("extraction.max_file_size_mb must be > 0");
        }
        match self.extraction.ocr.as_str() {
            "tesseract" | "disabled" => {}
            other => bail!(
                "Unknown OCR engine: '{}'. Must be tesseract or disabled.",
                other
            ),
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.dims == 0 {
            bail!("embedding.dims must be > 0");
        }
        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be >= 1");
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid value for {}: {:?} ({})", key, value, e))
}

/// Load, override from the environment, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

/// Defaults plus environment overrides, for running without a config file.
pub fn default_config() -> Result<Config> {
    let mut config = Config::default();
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}
