use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::structuring::{DEFAULT_MAX_ATTEMPTS, GEMINI_DEFAULT_BASE_URL, MAX_ATTEMPTS_LIMIT};

/// Application-level constants
pub const APP_NAME: &str = "MedAnnotator";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-lite";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_VISION_MODEL: &str = "medgemma:4b";
pub const DEFAULT_STRUCTURING_MODEL: &str = "medgemma:4b";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 600;

/// Get the application data directory
/// ~/MedAnnotator/ on all platforms
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default database location inside the data directory.
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("annotations.db")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,medannotator_lib=info,reqwest=warn,hyper=warn"
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Runtime settings, built once at startup and passed by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_path: PathBuf,

    /// Gemini is used for structuring, summary and enhancement when a key is set.
    pub google_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub gemini_timeout_secs: u64,

    pub ollama_base_url: String,
    pub vision_model: String,
    /// Text model on Ollama, used when no Gemini key is configured.
    pub structuring_model: String,
    pub ollama_timeout_secs: u64,

    /// When set, images are analyzed by the remote service instead of Ollama.
    pub remote_analysis_url: Option<String>,
    pub remote_timeout_secs: u64,

    pub max_attempts: u32,
    pub enable_enhancement: bool,
    pub enable_summary: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            google_api_key: None,
            gemini_base_url: GEMINI_DEFAULT_BASE_URL.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
            ollama_base_url: DEFAULT_OLLAMA_URL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            structuring_model: DEFAULT_STRUCTURING_MODEL.to_string(),
            ollama_timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
            remote_analysis_url: None,
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            enable_enhancement: false,
            enable_summary: true,
        }
    }
}

impl AppConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`. Unset and blank variables keep their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(path) = get("MEDANNOTATOR_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }

        config.google_api_key = get("GOOGLE_API_KEY");
        if let Some(url) = get("MEDANNOTATOR_GEMINI_URL") {
            config.gemini_base_url = url;
        }
        if let Some(model) = get("GEMINI_MODEL") {
            config.gemini_model = model;
        }
        if let Some(value) = get("MEDANNOTATOR_GEMINI_TIMEOUT") {
            config.gemini_timeout_secs = parse_number("MEDANNOTATOR_GEMINI_TIMEOUT", &value)?;
        }

        if let Some(url) = get("MEDANNOTATOR_OLLAMA_URL") {
            config.ollama_base_url = url;
        }
        if let Some(model) = get("MEDANNOTATOR_VISION_MODEL") {
            config.vision_model = model;
        }
        if let Some(model) = get("MEDANNOTATOR_STRUCTURING_MODEL") {
            config.structuring_model = model;
        }
        if let Some(value) = get("MEDANNOTATOR_OLLAMA_TIMEOUT") {
            config.ollama_timeout_secs = parse_number("MEDANNOTATOR_OLLAMA_TIMEOUT", &value)?;
        }

        config.remote_analysis_url = get("MEDANNOTATOR_REMOTE_URL");
        if let Some(value) = get("MEDANNOTATOR_REMOTE_TIMEOUT") {
            config.remote_timeout_secs = parse_number("MEDANNOTATOR_REMOTE_TIMEOUT", &value)?;
        }

        if let Some(value) = get("MEDANNOTATOR_MAX_ATTEMPTS") {
            let attempts: u32 = parse_number("MEDANNOTATOR_MAX_ATTEMPTS", &value)?;
            config.max_attempts = attempts.clamp(1, MAX_ATTEMPTS_LIMIT);
        }
        if let Some(value) = get("MEDANNOTATOR_ENABLE_ENHANCEMENT") {
            config.enable_enhancement = parse_flag("MEDANNOTATOR_ENABLE_ENHANCEMENT", &value)?;
        }
        if let Some(value) = get("MEDANNOTATOR_ENABLE_SUMMARY") {
            config.enable_summary = parse_flag("MEDANNOTATOR_ENABLE_SUMMARY", &value)?;
        }

        Ok(config)
    }

    pub fn uses_gemini(&self) -> bool {
        self.google_api_key.is_some()
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir();
        if let Some(home) = dirs::home_dir() {
            assert!(dir.starts_with(home));
        }
        assert!(dir.ends_with("MedAnnotator"));
    }

    #[test]
    fn defaults_without_environment() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.max_attempts, 2);
        assert!(!config.enable_enhancement);
        assert!(config.enable_summary);
        assert!(!config.uses_gemini());
        assert!(config.database_path.starts_with(app_data_dir()));
    }

    #[test]
    fn reads_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GOOGLE_API_KEY", "k-123"),
            ("GEMINI_MODEL", "gemini-2.0-flash"),
            ("MEDANNOTATOR_DB_PATH", "/tmp/a.db"),
            ("MEDANNOTATOR_REMOTE_URL", "https://gpu.example/"),
            ("MEDANNOTATOR_MAX_ATTEMPTS", "3"),
            ("MEDANNOTATOR_ENABLE_ENHANCEMENT", "true"),
            ("MEDANNOTATOR_ENABLE_SUMMARY", "off"),
        ]))
        .unwrap();

        assert!(config.uses_gemini());
        assert_eq!(config.gemini_model, "gemini-2.0-flash");
        assert_eq!(config.database_path, PathBuf::from("/tmp/a.db"));
        assert_eq!(config.remote_analysis_url.as_deref(), Some("https://gpu.example/"));
        assert_eq!(config.max_attempts, 3);
        assert!(config.enable_enhancement);
        assert!(!config.enable_summary);
    }

    #[test]
    fn max_attempts_clamped() {
        let high = AppConfig::from_lookup(lookup(&[("MEDANNOTATOR_MAX_ATTEMPTS", "50")])).unwrap();
        assert_eq!(high.max_attempts, MAX_ATTEMPTS_LIMIT);
        let zero = AppConfig::from_lookup(lookup(&[("MEDANNOTATOR_MAX_ATTEMPTS", "0")])).unwrap();
        assert_eq!(zero.max_attempts, 1);
    }

    #[test]
    fn blank_values_keep_defaults() {
        let config = AppConfig::from_lookup(lookup(&[("GOOGLE_API_KEY", "  ")])).unwrap();
        assert!(config.google_api_key.is_none());
    }

    #[test]
    fn invalid_values_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("MEDANNOTATOR_MAX_ATTEMPTS", "two")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "MEDANNOTATOR_MAX_ATTEMPTS",
                value: "two".into()
            }
        );
        assert!(AppConfig::from_lookup(lookup(&[("MEDANNOTATOR_ENABLE_SUMMARY", "maybe")])).is_err());
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }
}
