//! Service configuration read from `STERITRACK_*` environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Root directory of the local blob store.
    pub storage_dir: PathBuf,
    /// Base URL used to build public download links for stored photos.
    pub public_url: String,
    /// OCR endpoint. Image analysis skips OCR when unset.
    pub ocr_url: Option<String>,
    pub ocr_timeout: Duration,
    /// Maximum accepted JSON body size in bytes.
    pub json_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = var("STERITRACK_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or("STERITRACK_PORT", var("STERITRACK_PORT"), 8080u16)?;
        let ocr_timeout_secs = parse_or(
            "STERITRACK_OCR_TIMEOUT_SECS",
            var("STERITRACK_OCR_TIMEOUT_SECS"),
            30u64,
        )?;
        let json_limit_mb = parse_or(
            "STERITRACK_JSON_LIMIT_MB",
            var("STERITRACK_JSON_LIMIT_MB"),
            10usize,
        )?;
        let public_url = var("STERITRACK_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://{}:{}", host, port))
            .trim_end_matches('/')
            .to_string();

        Ok(Config {
            database_path: var("STERITRACK_DB")
                .unwrap_or_else(|| "steritrack.sqlite".to_string())
                .into(),
            storage_dir: var("STERITRACK_STORAGE_DIR")
                .unwrap_or_else(|| "./blobs".to_string())
                .into(),
            ocr_url: var("STERITRACK_OCR_URL"),
            ocr_timeout: Duration::from_secs(ocr_timeout_secs),
            json_limit: json_limit_mb * 1024 * 1024,
            host,
            port,
            public_url,
        })
    }

    pub fn address(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_path, PathBuf::from("steritrack.sqlite"));
        assert_eq!(config.public_url, "http://127.0.0.1:8080");
        assert!(config.ocr_url.is_none());
        assert_eq!(config.ocr_timeout, Duration::from_secs(30));
        assert_eq!(config.json_limit, 10 * 1024 * 1024);
    }

    #[test]
    fn test_overrides_and_trailing_slash() {
        let config = config_from(&[
            ("STERITRACK_PORT", "9000"),
            ("STERITRACK_PUBLIC_URL", "https://cssd.example.org/"),
            ("STERITRACK_OCR_URL", "http://ocr:5000/read"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.public_url, "https://cssd.example.org");
        assert_eq!(config.ocr_url.as_deref(), Some("http://ocr:5000/read"));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = config_from(&[("STERITRACK_OCR_URL", "  ")]).unwrap();
        assert!(config.ocr_url.is_none());
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = config_from(&[("STERITRACK_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("STERITRACK_PORT"));
    }
}
