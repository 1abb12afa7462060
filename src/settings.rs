use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid filename pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Raw shape of `config.json`.
#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    url: String,
    #[serde(rename = "Filename", alias = "filename", default)]
    filename: String,
    #[serde(default)]
    cron: String,
    cmd: String,
    args: String,
}

/// Read-only application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub url: String,
    pub filename_pattern: Option<Regex>,
    pub cron_expression: String,
    pub command: String,
    pub args_template: String,
}

impl AppConfig {
    /// Loads `config.json` from the current working directory.
    pub fn load() -> Result<Self, ConfigError> {
        let dir = std::env::current_dir().map_err(|source| ConfigError::Read {
            path: PathBuf::from(CONFIG_FILE),
            source,
        })?;
        Self::load_from(dir.join(CONFIG_FILE))
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let filename_pattern = if raw.filename.is_empty() {
            None
        } else {
            Some(Regex::new(&raw.filename)?)
        };

        Ok(Self {
            url: raw.url,
            filename_pattern,
            cron_expression: raw.cron.trim().to_string(),
            command: raw.cmd,
            args_template: raw.args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_full_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"{
                "url": "https://example.com/daily.jpg",
                "Filename": "/([^/]+\\.jpg)$",
                "cron": "0 0 8 * * *",
                "cmd": "feh",
                "args": "--bg-fill=%s"
            }"#,
        );

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.url, "https://example.com/daily.jpg");
        assert_eq!(config.cron_expression, "0 0 8 * * *");
        assert_eq!(config.command, "feh");
        assert_eq!(config.args_template, "--bg-fill=%s");

        let pattern = config.filename_pattern.unwrap();
        let caps = pattern.captures("https://example.com/a/b/pic.jpg").unwrap();
        assert_eq!(&caps[1], "pic.jpg");
    }

    #[test]
    fn test_optional_fields_default_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"{"url": "http://x/img.png", "cmd": "echo", "args": "%s"}"#,
        );

        let config = AppConfig::load_from(&path).unwrap();
        assert!(config.filename_pattern.is_none());
        assert!(config.cron_expression.is_empty());
    }

    #[test]
    fn test_empty_pattern_is_not_compiled() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"{"url": "u", "Filename": "", "cron": "", "cmd": "echo", "args": "%s"}"#,
        );
        assert!(AppConfig::load_from(&path).unwrap().filename_pattern.is_none());
    }

    #[test]
    fn test_lowercase_filename_alias() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"{"url": "u", "filename": "(\\d+)", "cmd": "echo", "args": "%s"}"#,
        );
        assert!(AppConfig::load_from(&path).unwrap().filename_pattern.is_some());
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let err = AppConfig::load_from(dir.path().join(CONFIG_FILE)).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_json_is_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "{ not json");
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_required_field_is_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, r#"{"url": "u", "cmd": "echo"}"#);
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_bad_pattern_is_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"{"url": "u", "Filename": "([a-z", "cmd": "echo", "args": "%s"}"#,
        );
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Pattern(_)));
    }
}
