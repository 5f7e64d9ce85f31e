//! TOML configuration for the `rlib` binary.
//!
//! Every section is optional; a missing file or an empty one yields the
//! same settings as [`Config::minimal`].
//!
//! ```toml
//! [store]
//! root = "./research"
//!
//! [index]
//! min_token_len = 2
//!
//! [query]
//! top_k = 5
//!
//! [ingest]
//! include_globs = ["**/*.md", "**/*.txt"]
//! ```

use anyhow::{bail, Context, Result};
use globset::Glob;
use research_library_core::query::QueryParams;
use research_library_core::tokenize::{TokenizerConfig, DEFAULT_MIN_TOKEN_LEN, DEFAULT_STOPWORDS};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
        }
    }
}

fn default_store_root() -> PathBuf {
    PathBuf::from("./research")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Snapshot location. Defaults to `<store.root>/index.json`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
    /// Replaces the built-in stopword list when set.
    #[serde(default)]
    pub stopwords: Option<Vec<String>>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: None,
            min_token_len: default_min_token_len(),
            stopwords: None,
        }
    }
}

fn default_min_token_len() -> usize {
    DEFAULT_MIN_TOKEN_LEN
}

impl IndexConfig {
    pub fn tokenizer_config(&self) -> TokenizerConfig {
        TokenizerConfig {
            min_token_len: self.min_token_len,
            stopwords: self
                .stopwords
                .clone()
                .unwrap_or_else(|| DEFAULT_STOPWORDS.iter().map(|w| w.to_string()).collect()),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_snippet_context_chars")]
    pub snippet_context_chars: usize,
    #[serde(default = "default_fallback_snippet_chars")]
    pub fallback_snippet_chars: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            snippet_context_chars: default_snippet_context_chars(),
            fallback_snippet_chars: default_fallback_snippet_chars(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_snippet_context_chars() -> usize {
    80
}
fn default_fallback_snippet_chars() -> usize {
    200
}

impl QueryConfig {
    pub fn params(&self) -> QueryParams {
        QueryParams {
            top_k: self.top_k,
            snippet_context_chars: self.snippet_context_chars,
            fallback_snippet_chars: self.fallback_snippet_chars,
            explain: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.markdown".to_string(),
        "**/*.txt".to_string(),
    ]
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Defaults rooted at `root`. Handy for tests and embedding.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let mut config = Self::minimal();
        config.store.root = root.into();
        config
    }

    pub fn index_path(&self) -> PathBuf {
        self.index
            .path
            .clone()
            .unwrap_or_else(|| self.store.root.join("index.json"))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.index.min_token_len == 0 {
        bail!("index.min_token_len must be >= 1");
    }

    if config.query.top_k == 0 {
        bail!("query.top_k must be >= 1");
    }

    if config.query.fallback_snippet_chars == 0 {
        bail!("query.fallback_snippet_chars must be > 0");
    }

    if config.ingest.include_globs.is_empty() {
        bail!("ingest.include_globs must not be empty");
    }

    for pattern in config
        .ingest
        .include_globs
        .iter()
        .chain(&config.ingest.exclude_globs)
    {
        Glob::new(pattern).with_context(|| format!("Invalid glob pattern: '{}'", pattern))?;
    }

    Ok(())
}
