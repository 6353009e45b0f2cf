use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_RATE: u8 = 50;
pub const MAX_VOLUME: u8 = 100;

/// Synthesis configuration shared by the Manager (as the default) and every
/// `Session` (as its effective, possibly session-overridden, copy).
///
/// Setters validate and log rather than returning an error, matching the
/// engine's "best effort, never block the caller on a bad number" stance —
/// an out-of-range value is ignored and the prior value is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub endpoint: String,
    pub secure_endpoint: String,
    pub language: String,
    pub voice: String,
    pub volume: u8,
    pub rate: u8,
    pub preemptive: bool,
    pub extras: HashMap<String, String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            secure_endpoint: String::new(),
            language: "en-US".to_string(),
            voice: String::new(),
            volume: MAX_VOLUME,
            rate: DEFAULT_RATE,
            preemptive: false,
            extras: HashMap::new(),
        }
    }
}

impl SpeechConfig {
    pub fn set_volume(&mut self, volume: i64) {
        if (1..=MAX_VOLUME as i64).contains(&volume) {
            self.volume = volume as u8;
        } else {
            warn!(volume, "volume out of range, ignoring (valid range is 1..=100)");
        }
    }

    pub fn set_rate(&mut self, rate: i64) {
        if (1..=100).contains(&rate) {
            self.rate = rate as u8;
        } else {
            warn!(rate, "rate out of range, ignoring (valid range is 1..=100)");
        }
    }

    pub fn set_preemptive(&mut self, preemptive: bool) {
        self.preemptive = preemptive;
    }

    /// Resolved voice: the explicit `voice` field if set, else the
    /// language-keyed default in `extras` (`voice_for_<language>`), else
    /// empty — matching `TTSConfiguration::voice`'s resolution order.
    pub fn voice(&self) -> &str {
        if !self.voice.is_empty() {
            return &self.voice;
        }
        self.voice_for_language(&self.language).unwrap_or("")
    }

    /// Look up the configured default voice for an arbitrary language tag,
    /// independent of this configuration's own `language` field. Used by
    /// `Manager::list_voices`.
    pub fn voice_for_language(&self, language: &str) -> Option<&str> {
        self.extras
            .get(&format!("voice_for_{language}"))
            .map(String::as_str)
    }

    /// Every configured `voice_for_<lang>` entry, as (language, voice)
    /// pairs, for `Manager::list_voices("*")`.
    pub fn all_language_voices(&self) -> Vec<(&str, &str)> {
        self.extras
            .iter()
            .filter_map(|(k, v)| k.strip_prefix("voice_for_").map(|lang| (lang, v.as_str())))
            .collect()
    }

    /// If one endpoint is set and the other isn't, mirror it across —
    /// ported from the engine's behavior of treating a single configured
    /// endpoint as valid for both secure and non-secure requests.
    pub fn backfill_endpoints(&mut self) {
        if self.endpoint.is_empty() && !self.secure_endpoint.is_empty() {
            self.endpoint = self.secure_endpoint.clone();
        } else if self.secure_endpoint.is_empty() && !self.endpoint.is_empty() {
            self.secure_endpoint = self.endpoint.clone();
        }
    }

    pub fn is_valid(&self) -> bool {
        (!self.endpoint.is_empty() || !self.secure_endpoint.is_empty()) && !self.language.is_empty()
    }

    /// Apply a partial update (as received over the external API), only
    /// touching fields the caller actually set.
    pub fn update_with(&mut self, patch: &SpeechConfigPatch) {
        if let Some(ref v) = patch.endpoint {
            if !v.is_empty() {
                self.endpoint = v.clone();
            }
        }
        if let Some(ref v) = patch.secure_endpoint {
            if !v.is_empty() {
                self.secure_endpoint = v.clone();
            }
        }
        if let Some(ref v) = patch.language {
            if !v.is_empty() {
                self.language = v.clone();
            }
        }
        if let Some(ref v) = patch.voice {
            if !v.is_empty() {
                self.voice = v.clone();
            }
        }
        if let Some(v) = patch.volume {
            self.set_volume(v);
        }
        if let Some(v) = patch.rate {
            self.set_rate(v);
        }
        if let Some(v) = patch.preemptive {
            self.set_preemptive(v);
        }
        for (k, v) in &patch.extras {
            self.extras.insert(k.clone(), v.clone());
        }
        self.backfill_endpoints();
    }
}

/// Sparse update to a [`SpeechConfig`], as sent by `setConfiguration` or
/// parsed out of the `KEY = VALUE` configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechConfigPatch {
    pub endpoint: Option<String>,
    pub secure_endpoint: Option<String>,
    pub language: Option<String>,
    pub voice: Option<String>,
    pub volume: Option<i64>,
    pub rate: Option<i64>,
    pub preemptive: Option<bool>,
    #[serde(default)]
    pub extras: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid_once_endpoint_set() {
        let mut config = SpeechConfig::default();
        assert!(!config.is_valid());
        config.endpoint = "http://localhost/tts".to_string();
        assert!(config.is_valid());
    }

    #[test]
    fn volume_out_of_range_is_ignored_and_preserves_prior_value() {
        let mut config = SpeechConfig::default();
        config.set_volume(60);
        config.set_volume(150);
        assert_eq!(config.volume, 60);
        config.set_volume(0);
        assert_eq!(config.volume, 60);
        config.set_volume(-5);
        assert_eq!(config.volume, 60);
    }

    #[test]
    fn backfill_mirrors_single_endpoint() {
        let mut config = SpeechConfig::default();
        config.secure_endpoint = "https://tts.example/".to_string();
        config.backfill_endpoints();
        assert_eq!(config.endpoint, "https://tts.example/");
    }

    #[test]
    fn update_with_only_touches_provided_fields() {
        let mut config = SpeechConfig::default();
        config.voice = "carol".to_string();
        let patch = SpeechConfigPatch {
            rate: Some(80),
            ..Default::default()
        };
        config.update_with(&patch);
        assert_eq!(config.rate, 80);
        assert_eq!(config.voice, "carol");
    }

    #[test]
    fn voice_falls_back_to_language_default() {
        let mut config = SpeechConfig::default();
        config.language = "hi-IN".to_string();
        config
            .extras
            .insert("voice_for_hi-IN".to_string(), "lekha".to_string());
        assert_eq!(config.voice(), "lekha");
    }

    #[test]
    fn all_language_voices_lists_every_entry() {
        let mut config = SpeechConfig::default();
        config.extras.insert("voice_for_en-US".to_string(), "amy".to_string());
        config.extras.insert("voice_for_hi-IN".to_string(), "lekha".to_string());
        config.extras.insert("unrelated".to_string(), "x".to_string());
        let mut pairs = config.all_language_voices();
        pairs.sort();
        assert_eq!(pairs, vec![("en-US", "amy"), ("hi-IN", "lekha")]);
    }
}
