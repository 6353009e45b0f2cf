//! `Manager::listVoices`: resolves against the *configured* default
//! [`SpeechConfig`] rather than a live catalog fetched from the remote TTS
//! service — the engine has no such catalog endpoint, it only ever reports
//! back the voices an operator has wired up via `voice_for_<lang>` extras.
//! Ported from `TTSManager::listVoices`.

use ttsd_config::SpeechConfig;

/// `language`:
/// - `None` or empty: the single voice configured for `config`'s own
///   `language` (i.e. `config.voice()`), if any.
/// - `Some("*")`: every configured `voice_for_<lang>` value, across all
///   languages.
/// - `Some(lang)`: the voice configured for that specific language, if any.
pub fn list_voices(config: &SpeechConfig, language: Option<&str>) -> Vec<String> {
    match language {
        None => single_or_empty(config.voice()),
        Some("") => single_or_empty(config.voice()),
        Some("*") => {
            let mut voices: Vec<String> = config
                .all_language_voices()
                .into_iter()
                .map(|(_, voice)| voice.to_string())
                .collect();
            voices.sort();
            voices.dedup();
            voices
        }
        Some(lang) => single_or_empty(config.voice_for_language(lang).unwrap_or_default()),
    }
}

fn single_or_empty(voice: &str) -> Vec<String> {
    if voice.is_empty() {
        Vec::new()
    } else {
        vec![voice.to_string()]
    }
}
