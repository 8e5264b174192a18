use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub canonicalize: CanonicalizeConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Where each pipeline stage reads and writes.
#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_raw")]
    pub raw: PathBuf,
    #[serde(default = "default_canonical")]
    pub canonical: PathBuf,
    #[serde(default = "default_graph")]
    pub graph: PathBuf,
    #[serde(default = "default_rdf")]
    pub rdf: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw: default_raw(),
            canonical: default_canonical(),
            graph: default_graph(),
            rdf: default_rdf(),
        }
    }
}

fn default_raw() -> PathBuf {
    PathBuf::from("data/raw/messages_last_7_days.jsonl")
}
fn default_canonical() -> PathBuf {
    PathBuf::from("data/raw/canonical_last_7_days.jsonl")
}
fn default_graph() -> PathBuf {
    PathBuf::from("data/raw/graph.json")
}
fn default_rdf() -> PathBuf {
    PathBuf::from("data/rdf/sioc_graph.ttl")
}

/// Message source settings used by `cgraph extract`.
#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    /// JSON-lines export the file source reads from.
    #[serde(default)]
    pub dump: Option<PathBuf>,
    /// Username, numeric id, or invite link of the chat to extract.
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default = "default_window_days")]
    pub window_days: i64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            dump: None,
            entity: None,
            window_days: default_window_days(),
        }
    }
}

fn default_window_days() -> i64 {
    7
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CanonicalizeConfig {
    /// Public username of the chat; enables `https://t.me/<username>/<id>` permalinks.
    #[serde(default)]
    pub public_username: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("data/store")
}

impl Config {
    /// Built-in defaults, used when no config file is present.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.extract.window_days < 1 {
        anyhow::bail!("extract.window_days must be >= 1");
    }

    if let Some(entity) = &config.extract.entity {
        if entity.trim().is_empty() {
            anyhow::bail!("extract.entity must not be empty when set");
        }
    }

    if let Some(username) = &config.canonicalize.public_username {
        let name = username.trim_start_matches('@');
        if name.is_empty() || name.chars().any(|c| !(c.is_ascii_alphanumeric() || c == '_')) {
            anyhow::bail!(
                "canonicalize.public_username '{}' is not a valid username",
                username
            );
        }
    }

    let paths = &config.paths;
    for (name, path) in [
        ("raw", &paths.raw),
        ("canonical", &paths.canonical),
        ("graph", &paths.graph),
        ("rdf", &paths.rdf),
    ] {
        if path.as_os_str().is_empty() {
            anyhow::bail!("paths.{} must not be empty", name);
        }
    }

    Ok(())
}
