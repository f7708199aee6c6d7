//! Format-agnostic config loading and saving

use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;

use crate::{ConfigFormat, Error, Result, io};

/// Largest config document the store will read, in bytes.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 4 * 1024 * 1024;

/// Format-agnostic configuration store.
///
/// Detects the format from the file extension and handles
/// serialization/deserialization transparently.
#[derive(Debug, Clone, Copy)]
pub struct ConfigStore {
    max_file_size: u64,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl ConfigStore {
    /// Create a new ConfigStore with the default size limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ConfigStore that rejects files larger than `max_file_size`.
    pub fn with_max_file_size(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Load a document from a file.
    ///
    /// Format is detected from file extension:
    /// - `.yaml`, `.yml` -> YAML
    /// - `.toml` -> TOML
    /// - `.json` -> JSON
    pub fn load<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let format = detect(path)?;
        let content = io::read_text(path, self.max_file_size)?;
        self.parse(&content, format, path)
    }

    /// Parse `content` as `format`. `origin` is only used for error messages.
    ///
    /// YAML documents holding nothing but comments (such as a lone
    /// `# @package _global_` header) parse as null.
    pub fn parse<T: DeserializeOwned>(
        &self,
        content: &str,
        format: ConfigFormat,
        origin: &Path,
    ) -> Result<T> {
        let parse_error = |message: String| Error::ConfigParse {
            path: origin.to_path_buf(),
            format: format.name().into(),
            message,
        };

        match format {
            ConfigFormat::Yaml => {
                let content = if is_blank_yaml(content) { "~" } else { content };
                serde_yaml::from_str(content).map_err(|e| parse_error(e.to_string()))
            }
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| parse_error(e.to_string())),
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| parse_error(e.to_string()))
            }
        }
    }

    /// Render `value` in `format`. `target` is only used for error messages.
    pub fn render<T: Serialize>(
        &self,
        value: &T,
        format: ConfigFormat,
        target: &Path,
    ) -> Result<String> {
        let serialize_error = |message: String| Error::ConfigSerialize {
            path: target.to_path_buf(),
            format: format.name().into(),
            message,
        };

        match format {
            ConfigFormat::Yaml => {
                serde_yaml::to_string(value).map_err(|e| serialize_error(e.to_string()))
            }
            ConfigFormat::Toml => {
                toml::to_string_pretty(value).map_err(|e| serialize_error(e.to_string()))
            }
            ConfigFormat::Json => serde_json::to_string_pretty(value)
                .map(|mut s| {
                    s.push('\n');
                    s
                })
                .map_err(|e| serialize_error(e.to_string())),
        }
    }

    /// Save a document to a file.
    ///
    /// Format is determined from file extension. Uses atomic write to
    /// prevent corruption.
    pub fn save<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let format = detect(path)?;
        let content = self.render(value, format, path)?;
        tracing::debug!(?path, %format, "Writing config document");
        io::write_atomic(path, content.as_bytes())
    }
}

fn detect(path: &Path) -> Result<ConfigFormat> {
    ConfigFormat::from_path(path).ok_or_else(|| Error::UnsupportedFormat {
        extension: path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default(),
    })
}

fn is_blank_yaml(content: &str) -> bool {
    content.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#') || line == "---"
    })
}
