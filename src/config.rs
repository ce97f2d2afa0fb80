use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub serialization: SerializationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root of the flat file store holding uploaded and prepared sources.
    pub file_store_root: PathBuf,
    /// Where git sources are checked out. Defaults to a `.git-cache`
    /// directory next to the file store root.
    #[serde(default)]
    pub git_cache_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn git_cache_dir(&self) -> PathBuf {
        match &self.git_cache_dir {
            Some(dir) => dir.clone(),
            None => {
                let parent = self
                    .file_store_root
                    .parent()
                    .unwrap_or_else(|| Path::new("."));
                parent.join(".git-cache")
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SerializationConfig {
    /// File extensions considered test content. Matched case-sensitively.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Listing exclusions applied by the readers.
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
}

impl Default for SerializationConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            exclude_globs: default_exclude_globs(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["yaml".to_string(), "yml".to_string()]
}

fn default_exclude_globs() -> Vec<String> {
    vec!["**/.git/**".to_string()]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.serialization.extensions.is_empty() {
        anyhow::bail!("serialization.extensions must not be empty");
    }

    for ext in &config.serialization.extensions {
        if ext.starts_with('.') || ext.contains('/') {
            anyhow::bail!(
                "serialization.extensions entries must be bare extensions, got '{}'",
                ext
            );
        }
    }

    if config.storage.file_store_root.as_os_str().is_empty() {
        anyhow::bail!("storage.file_store_root must not be empty");
    }

    Ok(config)
}
