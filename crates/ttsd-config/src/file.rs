use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::{ConfigError, SpeechConfigPatch};

/// Matches `loadConfigurationsFromFile`'s line grammar: leading whitespace,
/// a `key`, `=`, then a value that runs up to the first space (trailing
/// content after a space is a comment and is discarded).
static LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([a-zA-Z0-9_-]+)\s*=\s*([^ ]+).*$").expect("valid regex"));

/// Parse the engine's legacy `KEY = VALUE` configuration file into a patch
/// ready to be applied over a [`crate::SpeechConfig`] default.
pub fn parse_speech_config_file(contents: &str) -> SpeechConfigPatch {
    let mut patch = SpeechConfigPatch::default();

    for line in contents.lines() {
        let Some(caps) = LINE.captures(line) else {
            continue;
        };
        let key_raw = caps[1].to_string();
        let key = key_raw.to_ascii_lowercase();
        let value = caps[2].to_string();

        match key.as_str() {
            "endpoint" | "ttsendpoint" => patch.endpoint = Some(value),
            "secureendpoint" | "ttsendpointsecured" => patch.secure_endpoint = Some(value),
            "language" => patch.language = Some(value),
            "voice" => patch.voice = Some(value),
            "volume" => match value.parse::<i64>() {
                Ok(v) => patch.volume = Some(v),
                Err(_) => warn!(value, "ignoring non-numeric volume in config file"),
            },
            "rate" => match value.parse::<i64>() {
                Ok(v) => patch.rate = Some(v),
                Err(_) => warn!(value, "ignoring non-numeric rate in config file"),
            },
            "preemptivespeak" | "preemptive" => match value.parse::<bool>() {
                Ok(v) => patch.preemptive = Some(v),
                Err(_) => warn!(value, "ignoring non-boolean preemptive flag in config file"),
            },
            _ => {
                debug!(key = %key_raw, value, "storing unrecognized config key as extra");
                // Preserve the original case: `voice_for_<lang>` keys are
                // looked up again with the language tag's original casing
                // (e.g. `voice_for_en-US`), so lowercasing here would break
                // the round trip.
                patch.extras.insert(key_raw, value);
            }
        }
    }

    patch
}

/// Read and parse a configuration file from disk; a missing file is not an
/// error, it simply yields an empty patch (defaults apply).
pub fn load_speech_config_file(path: &Path) -> Result<SpeechConfigPatch, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "configuration file not present, using defaults");
        return Ok(SpeechConfigPatch::default());
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
    Ok(parse_speech_config_file(&contents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_keys() {
        let patch = parse_speech_config_file(
            "endpoint = http://localhost:9999/tts\nvolume = 80 # comment\nrate=30\n",
        );
        assert_eq!(patch.endpoint.as_deref(), Some("http://localhost:9999/tts"));
        assert_eq!(patch.volume, Some(80));
        assert_eq!(patch.rate, Some(30));
    }

    #[test]
    fn unknown_keys_become_extras() {
        let patch = parse_speech_config_file("apikey = abc123\n");
        assert_eq!(patch.extras.get("apikey").map(String::as_str), Some("abc123"));
    }

    #[test]
    fn ignores_malformed_lines() {
        let patch = parse_speech_config_file("not a valid line\n= missingkey\n");
        assert!(patch.endpoint.is_none());
        assert!(patch.extras.is_empty());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let patch = load_speech_config_file(Path::new("/nonexistent/tts.conf")).unwrap();
        assert!(patch.endpoint.is_none());
    }
}
