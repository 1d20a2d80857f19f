use cowtree::BTreeOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Tree limits as they appear in the `[tree]` section; unset keys fall back to defaults.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct TreeSection {
    pub page_size: Option<usize>,
    pub max_key_size: Option<usize>,
    pub max_value_size: Option<usize>,
}

#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    data: RawConfig,
}

impl CliConfig {
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Tree options from the file with `overrides` applied on top.
    pub fn tree_options(&self, overrides: &TreeSection) -> BTreeOptions {
        let defaults = BTreeOptions::default();
        let file = &self.data.tree;
        BTreeOptions {
            page_size: overrides
                .page_size
                .or(file.page_size)
                .unwrap_or(defaults.page_size),
            max_key_size: overrides
                .max_key_size
                .or(file.max_key_size)
                .unwrap_or(defaults.max_key_size),
            max_value_size: overrides
                .max_value_size
                .or(file.max_value_size)
                .unwrap_or(defaults.max_value_size),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default)]
    tree: TreeSection,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read CLI config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse CLI config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("cowtree").join("cli.toml"))
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
