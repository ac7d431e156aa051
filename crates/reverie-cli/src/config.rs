//! Configuration Vault – reads/writes `~/.reverie/config.toml`.

use reverie_memory::{ConsolidationConfig, SchedulerConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which embedder turns text into vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Deterministic token hashing; needs nothing external.
    #[default]
    Hash,
    /// A local Ollama embedding model.
    Ollama,
}

impl std::fmt::Display for EmbedderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedderKind::Hash => write!(f, "hash"),
            EmbedderKind::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for EmbedderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hash" => Ok(EmbedderKind::Hash),
            "ollama" => Ok(EmbedderKind::Ollama),
            other => Err(format!("unknown embedder '{other}' (expected hash or ollama)")),
        }
    }
}

/// Persisted user configuration stored in `~/.reverie/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Embedder used for `remember` and `recall`.
    #[serde(default)]
    pub embedder: EmbedderKind,

    /// Vector length for the hash embedder.
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    /// Base URL of the Ollama instance.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Ollama embedding model (e.g. "nomic-embed-text").
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// SQLite file for raw content.  Empty keeps content in memory only.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub store_path: String,

    /// Seconds between background consolidation cycles.
    #[serde(default = "default_consolidation_interval_secs")]
    pub consolidation_interval_secs: u64,

    /// Seconds before an untouched ACTIVE memory goes DORMANT.  0 disables.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Maximum hits shown by `/recall`.
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    /// Minimum similarity for a `/recall` hit.
    #[serde(default = "default_recall_threshold")]
    pub recall_threshold: f32,

    /// Consolidation engine tuning.
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
}

fn default_embedding_dimension() -> usize {
    reverie_memory::embedder::DEFAULT_HASH_DIMENSION
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_consolidation_interval_secs() -> u64 {
    300
}
fn default_idle_timeout_secs() -> u64 {
    600
}
fn default_recall_limit() -> usize {
    reverie_memory::associative::DEFAULT_RECALL_LIMIT
}
fn default_recall_threshold() -> f32 {
    reverie_memory::associative::DEFAULT_RECALL_THRESHOLD
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedder: EmbedderKind::default(),
            embedding_dimension: default_embedding_dimension(),
            ollama_url: default_ollama_url(),
            embedding_model: default_embedding_model(),
            store_path: String::new(),
            consolidation_interval_secs: default_consolidation_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            recall_limit: default_recall_limit(),
            recall_threshold: default_recall_threshold(),
            consolidation: ConsolidationConfig::default(),
        }
    }
}

impl Config {
    /// Timer settings for the background consolidation scheduler.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(self.consolidation_interval_secs.max(1)),
            idle_timeout: (self.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.idle_timeout_secs)),
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

/// Return the path to `~/.reverie/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Return the path to `~/.reverie/index.json`, where the index snapshot lives.
pub fn index_path() -> PathBuf {
    index_path_for_home(&home_dir())
}

/// Return the path to `~/.reverie/history.txt`, the REPL line history.
pub fn history_path() -> PathBuf {
    PathBuf::from(home_dir()).join(".reverie").join("history.txt")
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".reverie").join("config.toml")
}

pub(crate) fn index_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".reverie").join("index.json")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `REVERIE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `REVERIE_OLLAMA_URL` | `ollama_url` |
/// | `REVERIE_EMBED_MODEL` | `embedding_model` |
/// | `REVERIE_EMBEDDER` | `embedder` (`hash` or `ollama`) |
/// | `REVERIE_STORE_PATH` | `store_path` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("REVERIE_OLLAMA_URL") {
        cfg.ollama_url = v;
    }
    if let Ok(v) = std::env::var("REVERIE_EMBED_MODEL") {
        cfg.embedding_model = v;
    }
    if let Ok(v) = std::env::var("REVERIE_EMBEDDER")
        && let Ok(kind) = v.parse::<EmbedderKind>()
    {
        cfg.embedder = kind;
    }
    if let Ok(v) = std::env::var("REVERIE_STORE_PATH") {
        cfg.store_path = v;
    }
}

/// Save the config to disk, creating `~/.reverie/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    write_private(path, raw.as_bytes())
}

/// Write `bytes` to `path` readable by the owner only, creating the parent
/// directory (rwx------) if needed.
pub(crate) fn write_private(path: &Path, bytes: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set directory permissions: {}", e))?;
        }
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(bytes)
            })
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, bytes).map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
    Ok(())
}
