use crate::audio::AudioSource;
use crate::window::WindowConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

pub const DEFAULT_ENTRY_BASE: &str = "https://www.merriam-webster.com/dictionary/";

/// What happens to a payload or lookup failure once it has been logged.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Log and keep showing whatever was on the card.
    #[default]
    Silent,
    /// Log and hand the message to the host as well.
    Surface,
}

/// How lookup responses that resolve out of order are treated.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StalePolicy {
    /// Drop responses to requests that have since been superseded.
    #[default]
    Discard,
    /// Apply every response as it arrives; the last one to resolve wins.
    LastWins,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardConfig {
    pub window: WindowConfig,
    pub audio: AudioSource,
    /// Prefix of the "open full entry" link; the word is appended.
    pub entry_base_url: String,
    pub errors: ErrorPolicy,
    pub stale: StalePolicy,
    /// How many times an unknown word may be replaced by the service's first
    /// spelling suggestion. Zero disables following suggestions.
    pub max_suggestion_hops: u8,
    /// Ask the service for pronunciations when the entry came without any.
    pub enrich_pronunciations: bool,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            audio: AudioSource::default(),
            entry_base_url: DEFAULT_ENTRY_BASE.to_string(),
            errors: ErrorPolicy::default(),
            stale: StalePolicy::default(),
            max_suggestion_hops: 1,
            enrich_pronunciations: true,
        }
    }
}

impl CardConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "could not read config: {err}"),
            ConfigError::Parse(err) => write!(f, "invalid config: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        ConfigError::Parse(value)
    }
}
