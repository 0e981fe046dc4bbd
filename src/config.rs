//! Configuration management for `comfortcast`
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::error::ComfortError;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComfortConfig {
    /// Geocoding and forecast service settings
    #[serde(default)]
    pub weather: WeatherConfig,
    /// Model artifact settings
    #[serde(default)]
    pub model: ModelConfig,
    /// Offline dataset locations
    #[serde(default)]
    pub training: TrainingConfig,
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Weather service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Base URL of the geocoding directory
    #[serde(default = "default_geocoding_url")]
    pub geocoding_url: String,
    /// Base URL of the forecast service
    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,
    /// Timeout for a single HTTP attempt, in seconds
    #[serde(default = "default_weather_timeout")]
    pub timeout_seconds: u32,
    /// Deadline for one adapter call including retries, in seconds
    #[serde(default = "default_call_deadline")]
    pub call_deadline_seconds: u32,
    /// Retries for transient failures (connection errors, 5xx, 429)
    #[serde(default = "default_weather_max_retries")]
    pub max_retries: u32,
}

/// Model artifact settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Artifact written by `train` and loaded by `serve`
    #[serde(default = "default_model_path")]
    pub path: PathBuf,
}

/// Dataset locations for the offline stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Historical weather CSV read by the labeling stage
    #[serde(default = "default_raw_dataset")]
    pub raw_dataset: PathBuf,
    /// Labeled CSV written by labeling and read by fitting
    #[serde(default = "default_scored_dataset")]
    pub scored_dataset: PathBuf,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// OTLP/HTTP collector endpoint; export is disabled when unset
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

// Default value functions
fn default_geocoding_url() -> String {
    "https://geocoding-api.open-meteo.com/v1".to_string()
}

fn default_forecast_url() -> String {
    "https://api.open-meteo.com/v1".to_string()
}

fn default_weather_timeout() -> u32 {
    10
}

fn default_call_deadline() -> u32 {
    30
}

fn default_weather_max_retries() -> u32 {
    2
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/comfort_model.bin")
}

fn default_raw_dataset() -> PathBuf {
    PathBuf::from("data/historical_weather_master.csv")
}

fn default_scored_dataset() -> PathBuf {
    PathBuf::from("data/historical_weather_scored.csv")
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            geocoding_url: default_geocoding_url(),
            forecast_url: default_forecast_url(),
            timeout_seconds: default_weather_timeout(),
            call_deadline_seconds: default_call_deadline(),
            max_retries: default_weather_max_retries(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            raw_dataset: default_raw_dataset(),
            scored_dataset: default_scored_dataset(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            otlp_endpoint: None,
        }
    }
}

impl Default for ComfortConfig {
    fn default() -> Self {
        Self {
            weather: WeatherConfig::default(),
            model: ModelConfig::default(),
            training: TrainingConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ComfortConfig {
    /// Load configuration from `config_path`, or from `config.toml` when it exists,
    /// overlaid by environment variables
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        match config_path {
            Some(path) => {
                if !path.is_file() {
                    return Err(ComfortError::config(format!(
                        "Configuration file {} does not exist",
                        path.display()
                    ))
                    .into());
                }
                builder = builder.add_source(
                    File::from(path).format(config::FileFormat::Toml),
                );
            }
            None => {
                let default_file = PathBuf::from("config.toml");
                if default_file.exists() {
                    builder = builder.add_source(
                        File::from(default_file)
                            .required(false)
                            .format(config::FileFormat::Toml),
                    );
                }
            }
        }

        // COMFORTCAST_WEATHER__MAX_RETRIES=3 overrides weather.max_retries
        builder = builder.add_source(
            Environment::with_prefix("COMFORTCAST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: ComfortConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Apply default values to empty configuration fields
    pub fn apply_defaults(&mut self) {
        if self.weather.geocoding_url.is_empty() {
            self.weather.geocoding_url = default_geocoding_url();
        }
        if self.weather.forecast_url.is_empty() {
            self.weather.forecast_url = default_forecast_url();
        }
        if self.weather.timeout_seconds == 0 {
            self.weather.timeout_seconds = default_weather_timeout();
        }
        if self.weather.call_deadline_seconds == 0 {
            self.weather.call_deadline_seconds = default_call_deadline();
        }
        if self.model.path.as_os_str().is_empty() {
            self.model.path = default_model_path();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.weather.timeout_seconds > 300 {
            return Err(
                ComfortError::config("Weather API timeout cannot exceed 300 seconds").into(),
            );
        }

        if self.weather.call_deadline_seconds < self.weather.timeout_seconds {
            return Err(ComfortError::config(
                "Weather call deadline cannot be shorter than the per-request timeout",
            )
            .into());
        }

        if self.weather.max_retries > 10 {
            return Err(ComfortError::config("Weather API max retries cannot exceed 10").into());
        }

        Ok(())
    }

    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(ComfortError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(ComfortError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        for (name, url) in [
            ("geocoding", &self.weather.geocoding_url),
            ("forecast", &self.weather.forecast_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ComfortError::config(format!(
                    "Weather {name} URL must be a valid HTTP or HTTPS URL"
                ))
                .into());
            }
        }

        if let Some(endpoint) = &self.logging.otlp_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(
                    ComfortError::config("OTLP endpoint must be an HTTP or HTTPS URL").into(),
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config() {
        let config = ComfortConfig::default();
        assert_eq!(config.weather.forecast_url, "https://api.open-meteo.com/v1");
        assert_eq!(
            config.weather.geocoding_url,
            "https://geocoding-api.open-meteo.com/v1"
        );
        assert_eq!(config.model.path, PathBuf::from("models/comfort_model.bin"));
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.otlp_endpoint.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = ComfortConfig::default();
        config.logging.level = "invalid".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_config_validation_numeric_ranges() {
        let mut config = ComfortConfig::default();
        config.weather.timeout_seconds = 500;
        config.weather.call_deadline_seconds = 600;
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("timeout cannot exceed"));

        let mut config = ComfortConfig::default();
        config.weather.call_deadline_seconds = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_bad_urls() {
        let mut config = ComfortConfig::default();
        config.weather.forecast_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = ComfortConfig::default();
        config.logging.otlp_endpoint = Some("localhost:4318".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_defaults_fills_empty_values() {
        let mut config = ComfortConfig::default();
        config.weather.forecast_url.clear();
        config.weather.timeout_seconds = 0;
        config.logging.format.clear();
        config.apply_defaults();
        assert_eq!(config.weather.forecast_url, default_forecast_url());
        assert_eq!(config.weather.timeout_seconds, 10);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comfortcast.toml");
        fs::write(
            &path,
            r#"
[weather]
max_retries = 4

[model]
path = "/srv/models/comfort.bin"

[server]
port = 9090
"#,
        )
        .unwrap();

        let config = ComfortConfig::load_from_path(Some(path)).unwrap();
        assert_eq!(config.weather.max_retries, 4);
        assert_eq!(config.weather.timeout_seconds, 10);
        assert_eq!(config.model.path, PathBuf::from("/srv/models/comfort.bin"));
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_explicit_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.toml");

        let err = ComfortConfig::load_from_path(Some(path)).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
