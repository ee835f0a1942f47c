//! Service configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::Result;

/// Default redirect address substituted when a Redirect entry has no
/// stored target.
pub const DEFAULT_REDIRECT: &str = "172.16.15.140";

/// Configuration for a [`DomainIndex`](crate::DomainIndex).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the append-only update journal. `None` disables
    /// durability; the index then lives purely in memory.
    pub journal_path: Option<PathBuf>,
    /// Address substituted for Redirect entries without an explicit
    /// target.
    pub default_redirect: String,
}

impl Config {
    /// In-memory configuration with no journal.
    pub fn in_memory() -> Self {
        Self {
            journal_path: None,
            default_redirect: DEFAULT_REDIRECT.to_string(),
        }
    }

    /// Configuration journaling to `path`.
    pub fn with_journal(path: impl Into<PathBuf>) -> Self {
        Self {
            journal_path: Some(path.into()),
            default_redirect: DEFAULT_REDIRECT.to_string(),
        }
    }

    /// Load a configuration from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&text)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.journal_path.is_none());
        assert_eq!(config.default_redirect, DEFAULT_REDIRECT);
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "journal_path: /var/lib/blockidx/domain.journal\ndefault_redirect: 192.0.2.1"
        )
        .unwrap();

        let config = Config::from_yaml_file(file.path()).unwrap();
        assert_eq!(
            config.journal_path.as_deref(),
            Some(Path::new("/var/lib/blockidx/domain.journal"))
        );
        assert_eq!(config.default_redirect, "192.0.2.1");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_redirect: 192.0.2.9").unwrap();

        let config = Config::from_yaml_file(file.path()).unwrap();
        assert!(config.journal_path.is_none());
        assert_eq!(config.default_redirect, "192.0.2.9");
    }
}
