//! Configuration loading for the TTS coordinator.
//!
//! Layers three sources, lowest to highest precedence: compiled-in
//! defaults, the engine's legacy `KEY = VALUE` speech configuration file,
//! and `TTSD_`-prefixed environment variables.

pub mod file;
pub mod settings;
pub mod speech;

pub use file::{load_speech_config_file, parse_speech_config_file};
pub use settings::{load_settings, LoggingSettings, ServerSettings, Settings};
pub use speech::{SpeechConfig, SpeechConfigPatch, DEFAULT_RATE, MAX_VOLUME};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
