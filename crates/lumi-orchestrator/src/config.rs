//! Configuration types for the Lumi server.
//!
//! Everything is read from `lumi.json` (camelCase keys). Every field has a
//! default, so a missing file or an empty object is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lumi_content::cache::DEFAULT_STALE_MARKERS;
use lumi_content::{AvailabilityConfig, CacheValidity, GenerationSettings, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::error::{LumiError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "lumi.json";

/// Default model for the Gemini provider.
fn default_model() -> String {
    lumi_content::generative::gemini::DEFAULT_MODEL.to_string()
}

/// Default API base URL.
fn default_base_url() -> String {
    lumi_content::generative::gemini::DEFAULT_BASE_URL.to_string()
}

/// Default environment variable holding the API key.
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

/// Default per-call timeout in seconds.
const fn default_timeout_seconds() -> u64 {
    8
}

/// Default attempts when rate limited.
const fn default_max_attempts() -> u32 {
    3
}

/// Default delay between rate-limited attempts.
const fn default_rate_limit_delay_seconds() -> u64 {
    5
}

const fn default_max_output_tokens() -> u32 {
    lumi_content::generative::DEFAULT_MAX_OUTPUT_TOKENS
}

const fn default_temperature() -> f32 {
    lumi_content::generative::DEFAULT_TEMPERATURE
}

/// Default cooldown window after a generative failure.
const fn default_cooldown_seconds() -> u32 {
    lumi_content::availability::DEFAULT_COOLDOWN_SECONDS
}

/// Default interval of the availability probe.
const fn default_probe_interval_seconds() -> u64 {
    lumi_content::availability::DEFAULT_PROBE_INTERVAL_SECONDS
}

fn default_stale_markers() -> Vec<String> {
    DEFAULT_STALE_MARKERS.iter().map(ToString::to_string).collect()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    3000
}

/// Default directory for persisted documents.
fn default_data_dir() -> String {
    ".lumi".to_string()
}

/// Default ratio at which a learner has mastered a level.
const fn default_mastery_threshold() -> f64 {
    0.8
}

/// Main configuration for the Lumi server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Generative service settings.
    #[serde(default)]
    pub generative: GenerativeConfig,

    /// Circuit breaker timing.
    #[serde(default)]
    pub availability: AvailabilitySettings,

    /// Cache validity rules.
    #[serde(default)]
    pub cache: CacheSettings,

    /// HTTP listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// Directory for the JSON document store.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Optional curriculum file replacing the built-in one.
    #[serde(default)]
    pub curriculum: Option<String>,

    /// Score ratio at or above which the final level forces `NEXT_TOPIC`.
    #[serde(default = "default_mastery_threshold")]
    pub mastery_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generative: GenerativeConfig::default(),
            availability: AvailabilitySettings::default(),
            cache: CacheSettings::default(),
            server: ServerConfig::default(),
            data_dir: default_data_dir(),
            curriculum: None,
            mastery_threshold: default_mastery_threshold(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            LumiError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `lumi.json` from a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `LumiError::ConfigParseError` if the file cannot be read or
    /// parsed, and `LumiError::ConfigValidationError` if a value is out of
    /// range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(LumiError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| LumiError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `LumiError::ConfigValidationError` naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let generative = &self.generative;

        if generative.timeout_seconds == 0 {
            return Err(LumiError::config_validation(
                "generative.timeoutSeconds must be greater than 0",
                "Set generative.timeoutSeconds to at least 1 in your lumi.json",
            ));
        }

        if generative.max_attempts == 0 {
            return Err(LumiError::config_validation(
                "generative.maxAttempts must be greater than 0",
                "Set generative.maxAttempts to at least 1 in your lumi.json",
            ));
        }

        if generative.max_output_tokens == 0 {
            return Err(LumiError::config_validation(
                "generative.maxOutputTokens must be greater than 0",
                "Remove generative.maxOutputTokens to use the default of 1000",
            ));
        }

        if !(0.0..=2.0).contains(&generative.temperature) {
            return Err(LumiError::config_validation(
                format!(
                    "generative.temperature must be between 0 and 2, got {}",
                    generative.temperature
                ),
                "Use a temperature such as 0.7 in your lumi.json",
            ));
        }

        if generative.provider == Provider::Gemini {
            if generative.model.trim().is_empty() {
                return Err(LumiError::config_validation(
                    "generative.model must not be empty",
                    "Set generative.model, for example \"gemini-1.5-flash\"",
                ));
            }
            if generative.api_key_env.trim().is_empty() {
                return Err(LumiError::config_validation(
                    "generative.apiKeyEnv must not be empty",
                    "Name the environment variable that holds your API key, for example \"GEMINI_API_KEY\"",
                ));
            }
        }

        if self.availability.cooldown_seconds == 0 {
            return Err(LumiError::config_validation(
                "availability.cooldownSeconds must be greater than 0",
                "Set availability.cooldownSeconds to at least 1 in your lumi.json",
            ));
        }

        if self.availability.probe_interval_seconds == 0 {
            return Err(LumiError::config_validation(
                "availability.probeIntervalSeconds must be greater than 0",
                "Set availability.probeIntervalSeconds to at least 1 in your lumi.json",
            ));
        }

        if !(self.mastery_threshold > 0.0 && self.mastery_threshold <= 1.0) {
            return Err(LumiError::config_validation(
                format!(
                    "masteryThreshold must be in (0, 1], got {}",
                    self.mastery_threshold
                ),
                "Use a ratio such as 0.8 in your lumi.json",
            ));
        }

        if self.data_dir.trim().is_empty() {
            return Err(LumiError::config_validation(
                "dataDir must not be empty",
                "Provide a directory for stored sessions in your lumi.json (for example \".lumi\")",
            ));
        }

        Ok(())
    }

    /// Reads the API key from the configured environment variable.
    ///
    /// Returns `None` for the offline provider or when the variable is unset
    /// or blank.
    pub fn api_key(&self) -> Option<String> {
        if self.generative.provider == Provider::Offline {
            return None;
        }
        std::env::var(&self.generative.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// Retry policy for the generative tier.
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(self.generative.timeout_seconds),
            max_attempts: self.generative.max_attempts,
            rate_limit_delay: Duration::from_secs(self.generative.rate_limit_delay_seconds),
        }
    }

    /// Sampling parameters for completions.
    pub const fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            max_output_tokens: self.generative.max_output_tokens,
            temperature: self.generative.temperature,
        }
    }

    /// Monitor timing.
    pub fn availability_config(&self) -> AvailabilityConfig {
        AvailabilityConfig {
            cooldown_seconds: self.availability.cooldown_seconds,
            probe_interval: Duration::from_secs(self.availability.probe_interval_seconds),
            ..AvailabilityConfig::default()
        }
    }

    /// Cache validity rule built from the configured markers.
    pub fn cache_validity(&self) -> CacheValidity {
        CacheValidity::new(self.cache.stale_markers.iter().cloned())
    }

    /// Data directory as a path.
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

/// Supported generative providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Provider {
    /// Google Gemini (default).
    #[default]
    Gemini,
    /// No remote service; every request resolves locally.
    Offline,
}

impl Provider {
    /// Parses a string into a `Provider`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gemini" => Some(Self::Gemini),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Provider {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid provider '{s}': expected one of 'gemini', 'offline'"
            ))
        })
    }
}

impl Serialize for Provider {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::Gemini => "gemini",
            Self::Offline => "offline",
        };
        serializer.serialize_str(s)
    }
}

/// Generative service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerativeConfig {
    /// Which backend to call.
    #[serde(default)]
    pub provider: Provider,

    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Hard bound on a single call, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Attempts when rate limited.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between rate-limited attempts, in seconds.
    #[serde(default = "default_rate_limit_delay_seconds")]
    pub rate_limit_delay_seconds: u64,

    /// Completion length budget.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_seconds: default_timeout_seconds(),
            max_attempts: default_max_attempts(),
            rate_limit_delay_seconds: default_rate_limit_delay_seconds(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Availability monitor timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySettings {
    /// Cooldown after an error, in seconds.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u32,

    /// How often the probe runs while cooling down, in seconds.
    #[serde(default = "default_probe_interval_seconds")]
    pub probe_interval_seconds: u64,
}

impl Default for AvailabilitySettings {
    fn default() -> Self {
        Self {
            cooldown_seconds: default_cooldown_seconds(),
            probe_interval_seconds: default_probe_interval_seconds(),
        }
    }
}

/// Cache validity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSettings {
    /// Substrings that mark a cached explanation as stale.
    #[serde(default = "default_stale_markers")]
    pub stale_markers: Vec<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            stale_markers: default_stale_markers(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
