//! Translator configuration and its TOML loader.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tunables for one [`crate::Translator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Maximum nesting of the selection tree.
    pub max_selection_depth: usize,
    /// Maximum nesting of `where` arguments.
    pub max_filter_depth: usize,
    /// Maximum nesting of mutation input trees.
    pub max_mutation_depth: usize,
    /// Maximum number of elements accepted by `_IN` comparators.
    pub max_in_list: usize,
    /// Sort nulls after values for descending keys.
    pub nulls_last: bool,
    /// Limit applied to unbounded list fields when the entity declares none.
    pub default_limit: Option<u64>,
    /// Emit runtime validation and cardinality guards.
    pub runtime_guards: bool,
    /// Message raised by authorization guards.
    pub forbidden_message: String,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            max_selection_depth: 32,
            max_filter_depth: 32,
            max_mutation_depth: 16,
            max_in_list: 10_000,
            nulls_last: true,
            default_limit: None,
            runtime_guards: true,
            forbidden_message: "Forbidden".to_string(),
        }
    }
}

impl TranslatorConfig {
    /// Parses a `[translator]` table (or a bare table) from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let raw = parse_raw(text).map_err(|source| ConfigError::Parse { path: None, source })?;
        RawTranslator::into_config(raw)
    }

    /// Reads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw = parse_raw(&contents).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })?;
        RawTranslator::into_config(raw)
    }

    /// Checks invariants the translator relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_selection_depth", self.max_selection_depth),
            ("max_filter_depth", self.max_filter_depth),
            ("max_mutation_depth", self.max_mutation_depth),
            ("max_in_list", self.max_in_list),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        if self.default_limit == Some(0) {
            return Err(ConfigError::Invalid {
                field: "default_limit",
                reason: "must be greater than zero when set".into(),
            });
        }
        if self.forbidden_message.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "forbidden_message",
                reason: "cannot be empty".into(),
            });
        }
        if self.forbidden_message.contains('"') || self.forbidden_message.contains('\\') {
            return Err(ConfigError::Invalid {
                field: "forbidden_message",
                reason: "cannot contain quotes or backslashes".into(),
            });
        }
        Ok(())
    }
}

fn parse_raw(text: &str) -> Result<RawTranslator, toml::de::Error> {
    let mut table: toml::Table = toml::from_str(text)?;
    match table.remove("translator") {
        Some(section) => section.try_into(),
        None => toml::Value::Table(table).try_into(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTranslator {
    max_selection_depth: Option<usize>,
    max_filter_depth: Option<usize>,
    max_mutation_depth: Option<usize>,
    max_in_list: Option<usize>,
    nulls_last: Option<bool>,
    default_limit: Option<u64>,
    runtime_guards: Option<bool>,
    forbidden_message: Option<String>,
}

impl RawTranslator {
    fn into_config(raw: Self) -> Result<TranslatorConfig, ConfigError> {
        let defaults = TranslatorConfig::default();
        let config = TranslatorConfig {
            max_selection_depth: raw
                .max_selection_depth
                .unwrap_or(defaults.max_selection_depth),
            max_filter_depth: raw.max_filter_depth.unwrap_or(defaults.max_filter_depth),
            max_mutation_depth: raw
                .max_mutation_depth
                .unwrap_or(defaults.max_mutation_depth),
            max_in_list: raw.max_in_list.unwrap_or(defaults.max_in_list),
            nulls_last: raw.nulls_last.unwrap_or(defaults.nulls_last),
            default_limit: raw.default_limit.or(defaults.default_limit),
            runtime_guards: raw.runtime_guards.unwrap_or(defaults.runtime_guards),
            forbidden_message: raw.forbidden_message.unwrap_or(defaults.forbidden_message),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Failures while loading a [`TranslatorConfig`].
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error("failed to read translator config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse translator config{}: {source}", display_path(.path))]
    Parse {
        path: Option<PathBuf>,
        source: toml::de::Error,
    },
    #[error("translator config field '{field}' {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" {}", path.display()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = TranslatorConfig::from_toml_str("max_filter_depth = 4\n").expect("parse");
        assert_eq!(config.max_filter_depth, 4);
        assert_eq!(config.max_selection_depth, 32);
        assert!(config.runtime_guards);
    }

    #[test]
    fn translator_table_is_honoured() {
        let text = "[translator]\nnulls_last = false\ndefault_limit = 50\n";
        let config = TranslatorConfig::from_toml_str(text).expect("parse");
        assert!(!config.nulls_last);
        assert_eq!(config.default_limit, Some(50));
    }

    #[test]
    fn zero_depth_is_rejected() {
        let err = TranslatorConfig::from_toml_str("max_selection_depth = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "max_selection_depth",
                ..
            }
        ));
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[translator]\nforbidden_message = \"Denied\"").expect("write");
        let config = TranslatorConfig::load(file.path()).expect("load");
        assert_eq!(config.forbidden_message, "Denied");
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = TranslatorConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
