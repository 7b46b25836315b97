//! `avbag.yaml`.

use anyhow::{Context, Result};
use avbag_core::SourcesConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Must exist and be empty when a conversion starts.
    pub staging_dir: PathBuf,
    #[serde(default)]
    pub keep_input: bool,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("invalid configuration: {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("failed to parse configuration YAML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
staging_dir: /var/opt/avbag/staging
keep_input: true
sources:
  archive_dir: /data/darkarchive
  streaming_dir: /data/springfield
  csv: /data/sources.csv
logging:
  level: debug
  format: json
"#;

    #[test]
    fn full_config_parses() {
        let config = Config::from_yaml(FULL).unwrap();
        assert_eq!(config.staging_dir, PathBuf::from("/var/opt/avbag/staging"));
        assert!(config.keep_input);
        assert_eq!(config.sources.csv, PathBuf::from("/data/sources.csv"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn logging_and_keep_input_are_optional() {
        let config = Config::from_yaml(
            "staging_dir: s\nsources:\n  archive_dir: a\n  streaming_dir: b\n  csv: c.csv\n",
        )
        .unwrap();
        assert!(!config.keep_input);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_yaml(&format!("{FULL}unexpected: 1\n")).unwrap_err();
        assert!(format!("{err:#}").contains("unknown field `unexpected`"));
        assert!(Config::from_yaml(
            "staging_dir: s\nsources:\n  archive_dir: a\n  streaming_dir: b\n  csv: c\n  extra: d\n"
        )
        .is_err());
    }

    #[test]
    fn sources_are_required() {
        let err = Config::from_yaml("staging_dir: s\n").unwrap_err();
        assert!(format!("{err:#}").contains("missing field `sources`"));
    }
}
