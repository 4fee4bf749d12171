//! Embedder configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! [logging]
//! filter = "duplex::bridge=trace,warn"
//! ansi = false
//!
//! [[runtimes]]
//! name = "ruby"
//! tag = 0
//!
//! [[runtimes]]
//! name = "python"
//! tag = 1
//!
//! # A guest string may be passed where native code expects `Path`
//! [[aliases]]
//! guest = "string"
//! native = "Path"
//! ```

use std::path::Path;

use duplex_sdk::{NativeType, RuntimeTag};
use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level configuration document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Logging setup
    pub logging: LoggingConfig,
    /// Named guest runtimes
    pub runtimes: Vec<RuntimeConfig>,
    /// Guest/native type equivalences
    pub aliases: Vec<AliasConfig>,
}

/// `[logging]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing-subscriber` env-filter directive
    pub filter: String,
    /// Colored output
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
            ansi: true,
        }
    }
}

/// One `[[runtimes]]` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Adapter name
    pub name: String,
    /// Numeric runtime tag
    pub tag: u16,
}

/// One `[[aliases]]` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AliasConfig {
    /// Type presented by the guest value
    pub guest: String,
    /// Native parameter type it may stand for
    pub native: String,
}

impl BridgeConfig {
    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }

    /// Tag of a named runtime
    pub fn runtime_tag(&self, name: &str) -> Option<RuntimeTag> {
        self.runtimes
            .iter()
            .find(|r| r.name == name)
            .map(|r| RuntimeTag::new(r.tag))
    }

    /// Parsed type aliases, as (guest, native) pairs
    pub fn type_aliases(&self) -> Result<Vec<(NativeType, NativeType)>, ConfigError> {
        self.aliases
            .iter()
            .map(|a| -> Result<(NativeType, NativeType), ConfigError> {
                Ok((a.guest.parse()?, a.native.parse()?))
            })
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (i, rt) in self.runtimes.iter().enumerate() {
            if let Some(dup) = self.runtimes[..i]
                .iter()
                .find(|other| other.name == rt.name || other.tag == rt.tag)
            {
                return Err(ConfigError::Parse(format!(
                    "runtimes `{}' and `{}' clash (tag {})",
                    dup.name, rt.name, rt.tag
                )));
            }
        }
        self.type_aliases().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [logging]
        filter = "debug"

        [[runtimes]]
        name = "ruby"
        tag = 0

        [[runtimes]]
        name = "python"
        tag = 1

        [[aliases]]
        guest = "string"
        native = "Path"
    "#;

    #[test]
    fn test_parse_sample() {
        let config = BridgeConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.logging.filter, "debug");
        assert!(config.logging.ansi);
        assert_eq!(config.runtime_tag("python"), Some(RuntimeTag::new(1)));
        assert_eq!(config.runtime_tag("lua"), None);
        assert_eq!(
            config.type_aliases().unwrap(),
            vec![(NativeType::Str, NativeType::named("Path"))]
        );
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config.logging.filter, "warn");
        assert!(config.runtimes.is_empty());
    }

    #[test]
    fn test_clashing_runtimes_rejected() {
        let source = r#"
            [[runtimes]]
            name = "a"
            tag = 3
            [[runtimes]]
            name = "b"
            tag = 3
        "#;
        assert!(matches!(
            BridgeConfig::from_toml_str(source),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_bad_alias_type_rejected() {
        let source = "[[aliases]]\nguest = \"array<\"\nnative = \"i32\"\n";
        assert!(matches!(
            BridgeConfig::from_toml_str(source),
            Err(ConfigError::InvalidType(_))
        ));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = BridgeConfig::from_path(file.path()).unwrap();
        assert_eq!(config.runtimes.len(), 2);

        assert!(matches!(
            BridgeConfig::from_path("/nonexistent/duplex.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
