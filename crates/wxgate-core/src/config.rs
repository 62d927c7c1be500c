use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Environment variable that overrides `api.api_key` from the config file.
pub const API_KEY_ENV: &str = "OPENWEATHERMAP_API_KEY";

const API_KEY_PLACEHOLDER: &str = "YOUR_OPENWEATHERMAP_API_KEY";
const VALID_UNITS: &[&str] = &["standard", "metric", "imperial"];
/// The geocoding endpoint refuses limits above this.
const MAX_SEARCH_LIMIT: u32 = 5;
/// One year; longer cache lifetimes are rejected.
pub const MAX_TTL_SECONDS: u64 = 365 * 24 * 3600;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream provider settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Response cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Retry policy for upstream requests
    #[serde(default)]
    pub retry: RetrySettings,
}

/// OpenWeatherMap endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL for the weather and forecast endpoints (must end with `/`)
    pub base_url: String,

    /// Base URL for the geocoding endpoints (must end with `/`)
    pub geo_url: String,

    /// API key sent as `appid`. Prefer setting `OPENWEATHERMAP_API_KEY`.
    pub api_key: String,

    /// Unit system requested from the provider
    #[serde(default = "default_units")]
    pub units: String,

    /// Maximum number of matches returned by city search
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_units() -> String {
    "metric".to_string()
}

fn default_search_limit() -> u32 {
    MAX_SEARCH_LIMIT
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openweathermap.org/data/2.5/".to_string(),
            geo_url: "https://api.openweathermap.org/geo/1.0/".to_string(),
            api_key: API_KEY_PLACEHOLDER.to_string(),
            units: default_units(),
            search_limit: default_search_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    /// Check if an API key is configured (not empty or the placeholder)
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.api_key.starts_with("YOUR_")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of cached current conditions and forecasts, in seconds
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Upper bound on stored entries (0 = unbounded)
    #[serde(default)]
    pub max_entries: usize,
}

fn default_ttl_seconds() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            max_entries: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: u32,
    /// Delay before the first retry; doubles each attempt
    pub initial_delay_ms: u64,
    /// Cap on the delay between retries
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from `path`, writing defaults there if it doesn't exist.
    ///
    /// `OPENWEATHERMAP_API_KEY` overrides the key from the file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Io(format!("reading {}: {}", path.display(), e)))?;
            toml::from_str::<Config>(&contents)
                .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?
        } else {
            tracing::info!("No config at {}, writing defaults", path.display());
            let config = Self::default();
            config.save_to(path)?;
            config
        };

        Ok(config.with_api_key_override(std::env::var(API_KEY_ENV).ok()))
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated(path: Option<&Path>) -> Result<(Self, ValidationResult), ConfigError> {
        let config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()));
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Replace the API key when `key` holds a non-blank value
    pub fn with_api_key_override(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.api.api_key = key.trim().to_string();
        }
        self
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.api.base_url, "api.base_url", &mut result);
        self.validate_url(&self.api.geo_url, "api.geo_url", &mut result);

        if !self.api.has_api_key() {
            result.add_warning(
                "api.api_key",
                format!("No API key configured; set {} or api.api_key", API_KEY_ENV),
            );
        }

        if !VALID_UNITS.contains(&self.api.units.as_str()) {
            result.add_error(
                "api.units",
                format!(
                    "Unknown unit system '{}', expected one of: {}",
                    self.api.units,
                    VALID_UNITS.join(", ")
                ),
            );
        }

        if self.api.search_limit == 0 {
            result.add_error("api.search_limit", "Search limit must be greater than 0");
        } else if self.api.search_limit > MAX_SEARCH_LIMIT {
            result.add_warning(
                "api.search_limit",
                format!("Provider returns at most {} matches", MAX_SEARCH_LIMIT),
            );
        }

        if self.api.timeout_secs == 0 {
            result.add_error("api.timeout_secs", "Timeout must be greater than 0");
        }

        if self.cache.ttl_seconds == 0 {
            result.add_warning("cache.ttl_seconds", "Caching disabled (0 seconds)");
        } else if self.cache.ttl_seconds > MAX_TTL_SECONDS {
            result.add_error(
                "cache.ttl_seconds",
                format!("Cache lifetime must be at most {} seconds", MAX_TTL_SECONDS),
            );
        } else if self.cache.ttl_seconds > 86_400 {
            result.add_warning(
                "cache.ttl_seconds",
                "Cache lifetime is more than 24 hours",
            );
        }

        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            result.add_warning(
                "retry.max_delay_ms",
                "Maximum retry delay is below the initial delay",
            );
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                // Endpoint names are appended directly to the base
                if !url_str.ends_with('/') {
                    result.add_error(field_name, "URL must end with '/'");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::Io(format!("creating {}: {}", parent.display(), e))
            })?;
        }

        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        std::fs::write(path, contents)
            .map_err(|e| ConfigError::Io(format!("writing {}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join("wxgate");

        Ok(config_dir.join("config.toml"))
    }
}
