//! Configuration data structures for dagstore.
//!
//! Defines the YAML config format: traversal bounds, connection tuning, and
//! the node id type. Every field has a default so an empty document is a
//! valid config.

use serde::{Deserialize, Serialize};

use crate::types::IdKind;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for a graph.
///
/// Loaded from a YAML file and then overridden by `DAGSTORE_*` environment
/// variables (see [`crate::config::loader`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagConfig {
    /// Depth bound applied when a [`FilterSpec`](crate::filter::FilterSpec)
    /// does not carry its own.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Result cap for all-paths enumeration when the caller gives none.
    #[serde(default = "default_max_paths")]
    pub max_paths: usize,

    /// Identity type of the `nodes.id` column.
    #[serde(default)]
    pub id_kind: IdKind,

    /// SQLite connection tuning.
    #[serde(default)]
    pub connection: ConnectionConfig,
}

impl Default for DagConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_paths: default_max_paths(),
            id_kind: IdKind::default(),
            connection: ConnectionConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// How long a writer waits for the database lock before giving up.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default)]
    pub journal_mode: JournalMode,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: JournalMode::default(),
        }
    }
}

/// SQLite `journal_mode` pragma values that make sense for a graph store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    #[default]
    Wal,
    Delete,
    Memory,
}

impl JournalMode {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "wal" => Some(Self::Wal),
            "delete" => Some(Self::Delete),
            "memory" | "mem" => Some(Self::Memory),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
            Self::Memory => "MEMORY",
        }
    }
}

impl std::fmt::Display for JournalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_max_depth() -> u32 {
    20
}

fn default_max_paths() -> usize {
    1000
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq as pa_eq;
    use test_case::test_case;

    #[test]
    fn test_default_config() {
        let config = DagConfig::default();
        assert_eq!(config.max_depth, 20);
        assert_eq!(config.max_paths, 1000);
        assert_eq!(config.id_kind, IdKind::BigInteger);
        assert_eq!(config.connection.busy_timeout_ms, 5000);
        assert_eq!(config.connection.journal_mode, JournalMode::Wal);
    }

    #[test]
    fn config_empty_yaml_uses_defaults() {
        let config: DagConfig = serde_yaml::from_str("{}").unwrap();
        pa_eq!(config, DagConfig::default());
    }

    #[test]
    fn test_full_yaml_config() {
        let yaml = r#"
max_depth: 8
max_paths: 50
id_kind: uuid
connection:
  busy_timeout_ms: 250
  journal_mode: memory
"#;
        let config: DagConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.max_depth, 8);
        assert_eq!(config.max_paths, 50);
        assert_eq!(config.id_kind, IdKind::Uuid);
        assert_eq!(config.connection.busy_timeout_ms, 250);
        assert_eq!(config.connection.journal_mode, JournalMode::Memory);
    }

    #[test]
    fn test_serde_yaml_roundtrip() {
        let config = DagConfig {
            max_depth: 3,
            id_kind: IdKind::Integer,
            ..DagConfig::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: DagConfig = serde_yaml::from_str(&yaml).unwrap();
        pa_eq!(back, config);
    }

    #[test]
    fn test_invalid_yaml_returns_error() {
        let result: Result<DagConfig, _> = serde_yaml::from_str("max_depth: [not, a, number]");
        assert!(result.is_err());
    }

    #[test_case("wal", Some(JournalMode::Wal) ; "wal lowercase")]
    #[test_case("WAL", Some(JournalMode::Wal) ; "wal uppercase")]
    #[test_case(" delete ", Some(JournalMode::Delete) ; "delete padded")]
    #[test_case("mem", Some(JournalMode::Memory) ; "memory short")]
    #[test_case("truncate", None ; "unsupported mode")]
    fn journal_mode_from_str_loose(input: &str, expected: Option<JournalMode>) {
        pa_eq!(JournalMode::from_str_loose(input), expected);
    }

    #[test]
    fn journal_mode_display_is_pragma_value() {
        assert_eq!(JournalMode::Wal.to_string(), "WAL");
        assert_eq!(JournalMode::Delete.to_string(), "DELETE");
    }
}
