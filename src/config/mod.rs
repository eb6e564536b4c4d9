//! Configuration management.
//!
//! Settings come from an optional TOML file overlaid with `BIBCITE_*`
//! environment variables (sections separated by `__`).
//!
//! # Configuration File Format
//!
//! ```toml
//! [service]
//! host = "localhost"
//! port = 23119
//! rpc_path = "/better-bibtex/json-rpc"
//! export_path = "/better-bibtex/collection"
//! timeout_seconds = 30
//! connect_timeout_seconds = 5
//!
//! [resolver]
//! ambiguity = "first_match"   # or "reject"
//! library_cache_ttl_seconds = 30
//!
//! [references]
//! frontmatter_field = "zotero_collection"
//! export_format = "json"
//! default_mode = "references"
//! attachment_concurrency = 4
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::library::{AmbiguityPolicy, ExportFormat};
use crate::models::ViewMode;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub references: ReferencesConfig,
}

/// Where the Better BibTeX service listens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_rpc_path")]
    pub rpc_path: String,

    #[serde(default = "default_export_path")]
    pub export_path: String,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            rpc_path: default_rpc_path(),
            export_path: default_export_path(),
            timeout_seconds: default_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

impl ServiceConfig {
    /// `http://host:port`
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    23119
}

fn default_rpc_path() -> String {
    "/better-bibtex/json-rpc".to_string()
}

fn default_export_path() -> String {
    "/better-bibtex/collection".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    5
}

/// Collection path resolution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub ambiguity: AmbiguityPolicy,

    /// How long a library snapshot may be reused (0 = always refetch)
    #[serde(default = "default_library_ttl")]
    pub library_cache_ttl_seconds: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ambiguity: AmbiguityPolicy::default(),
            library_cache_ttl_seconds: default_library_ttl(),
        }
    }
}

impl ResolverConfig {
    pub fn library_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.library_cache_ttl_seconds)
    }
}

fn default_library_ttl() -> u64 {
    30
}

/// Reference view settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencesConfig {
    /// Frontmatter key holding the collection path
    #[serde(default = "default_frontmatter_field")]
    pub frontmatter_field: String,

    #[serde(default)]
    pub export_format: ExportFormat,

    #[serde(default)]
    pub default_mode: ViewMode,

    /// Maximum in-flight attachment requests per refresh
    #[serde(default = "default_attachment_concurrency")]
    pub attachment_concurrency: usize,
}

impl Default for ReferencesConfig {
    fn default() -> Self {
        Self {
            frontmatter_field: default_frontmatter_field(),
            export_format: ExportFormat::default(),
            default_mode: ViewMode::default(),
            attachment_concurrency: default_attachment_concurrency(),
        }
    }
}

fn default_frontmatter_field() -> String {
    "zotero_collection".to_string()
}

fn default_attachment_concurrency() -> usize {
    4
}

impl Config {
    /// Write this configuration as TOML
    pub fn save(&self, path: &Path) -> Result<(), ConfigFileError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigFileError::Serialize(e.to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ConfigFileError::Io(e.to_string()))?;
            }
        }

        std::fs::write(path, content).map_err(|e| ConfigFileError::Io(e.to_string()))
    }
}

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}

/// Load configuration from an optional file plus the environment
pub fn load_config(path: Option<&Path>) -> Result<Config, config::ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix("BIBCITE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize()
}

/// Default location of the user config file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("bibcite").join("config.toml"))
}

/// Find a config file: `./bibcite.toml` first, then the user config dir
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("bibcite.toml");
    if local.is_file() {
        return Some(local);
    }

    default_config_path().filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.base_url(), "http://localhost:23119");
        assert_eq!(config.service.rpc_path, "/better-bibtex/json-rpc");
        assert_eq!(config.resolver.ambiguity, AmbiguityPolicy::FirstMatch);
        assert_eq!(config.references.frontmatter_field, "zotero_collection");
        assert_eq!(config.references.attachment_concurrency, 4);
    }

    #[test]
    fn test_config_file_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bibcite.toml");

        std::fs::write(
            &path,
            r#"
[service]
port = 24119

[resolver]
ambiguity = "reject"
library_cache_ttl_seconds = 0

[references]
default_mode = "bibliography"
export_format = "jzon"
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.service.port, 24119);
        assert_eq!(config.service.host, "localhost");
        assert_eq!(config.resolver.ambiguity, AmbiguityPolicy::Reject);
        assert_eq!(config.resolver.library_cache_ttl(), Duration::ZERO);
        assert_eq!(config.references.default_mode, ViewMode::Bibliography);
        assert_eq!(
            config.references.export_format,
            ExportFormat::BetterBibtexJson
        );
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.references.attachment_concurrency = 8;
        config.save(&path).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_file_nonexistent() {
        let result = load_config(Some(Path::new("/nonexistent/bibcite.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_file_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("invalid.toml");
        std::fs::write(&path, "invalid = toml = content").unwrap();

        assert!(load_config(Some(&path)).is_err());
    }
}
