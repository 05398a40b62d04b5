//! Multi-source config loading: YAML file, then environment overrides.

use std::path::{Path, PathBuf};

use crate::config::schema::DagConfig;
use crate::error::{DagError, Result};
use crate::types::IdKind;

pub const CONFIG_FILE_NAME: &str = "dagstore.yaml";

pub const ENV_MAX_DEPTH: &str = "DAGSTORE_MAX_DEPTH";
pub const ENV_MAX_PATHS: &str = "DAGSTORE_MAX_PATHS";
pub const ENV_BUSY_TIMEOUT_MS: &str = "DAGSTORE_BUSY_TIMEOUT_MS";
pub const ENV_ID_KIND: &str = "DAGSTORE_ID_KIND";

impl DagConfig {
    /// Parse a YAML document. An empty document yields the defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: DagConfig = serde_yaml::from_str(yaml)
            .map_err(|e| DagError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Load from the per-user config location when the file exists, fall
    /// back to defaults otherwise, then apply environment overrides.
    pub fn discover() -> Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path)?,
            _ => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// `<config dir>/dagstore/dagstore.yaml` for the current user.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "dagstore")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Apply `DAGSTORE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Unset keys leave fields alone.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_DEPTH) {
            self.max_depth = parse_env(ENV_MAX_DEPTH, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_PATHS) {
            self.max_paths = parse_env(ENV_MAX_PATHS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BUSY_TIMEOUT_MS) {
            self.connection.busy_timeout_ms = parse_env(ENV_BUSY_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_ID_KIND) {
            self.id_kind = IdKind::from_str_loose(&raw).ok_or_else(|| {
                DagError::Config(format!("{ENV_ID_KIND}: unknown id kind `{raw}`"))
            })?;
        }
        self.validate()
    }

    /// Reject bounds that would make every traversal empty.
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(DagError::Config("max_depth must be at least 1".into()));
        }
        if self.max_paths == 0 {
            return Err(DagError::Config("max_paths must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| DagError::Config(format!("{key}: `{raw}` is not a valid number")))
}
