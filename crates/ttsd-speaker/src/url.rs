use ttsd_config::SpeechConfig;
use ttsd_core::SpeechItem;

use crate::sanitize::{percent_encode, sanitize_string};

/// Build the request URL for a queued speech, the Rust analogue of
/// `TTSSpeaker::constructURL`: pick the secure or plain endpoint based on
/// the item's `secure` flag, then append `voice`/`language`/`rate`/`text`
/// directly to it, in that order. The endpoint is expected to already
/// terminate with `?` or `&` (it's a URL template, not a bare origin), so
/// no separator is inserted here, matching the original's
/// `tts_request.append("voice=...")` straight onto the configured
/// endpoint. `rate` is already clamped to `1..=100` by
/// [`SpeechConfig::set_rate`]. `volume` has no place in the request URL —
/// the original never sends it to the TTS endpoint.
pub fn construct_url(config: &SpeechConfig, item: &SpeechItem) -> String {
    let base = if item.secure {
        &config.secure_endpoint
    } else {
        &config.endpoint
    };

    let sanitized = sanitize_string(&item.text);
    let encoded_text = percent_encode(&sanitized);
    let encoded_voice = percent_encode(config.voice());

    format!(
        "{base}voice={voice}&language={language}&rate={rate}&text={text}",
        base = base,
        voice = encoded_voice,
        language = percent_encode(&config.language),
        rate = config.rate,
        text = encoded_text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SpeechConfig {
        let mut c = SpeechConfig::default();
        c.endpoint = "http://tts.local/synthesize?".to_string();
        c.secure_endpoint = "https://tts.local/synthesize?".to_string();
        c.voice = "carol".to_string();
        c.language = "en-US".to_string();
        c
    }

    #[test]
    fn uses_secure_endpoint_when_flagged() {
        let item = SpeechItem::new(1, 1, "hello", true);
        let url = construct_url(&config(), &item);
        assert!(url.starts_with("https://tts.local/synthesize?voice=carol"));
    }

    #[test]
    fn uses_plain_endpoint_by_default() {
        let item = SpeechItem::new(1, 1, "hello", false);
        let url = construct_url(&config(), &item);
        assert!(url.starts_with("http://tts.local/synthesize?voice=carol"));
    }

    #[test]
    fn text_is_last_and_sanitized_and_encoded() {
        let item = SpeechItem::new(1, 1, "it costs $ 5", false);
        let url = construct_url(&config(), &item);
        assert!(url.ends_with("&text=it%20costs%20dollar%205"));
    }

    #[test]
    fn parameters_appear_in_voice_language_rate_text_order_with_no_volume() {
        let mut c = config();
        c.voice = "amy".to_string();
        c.language = "en-US".to_string();
        c.rate = 50;
        let item = SpeechItem::new(1, 1, "hello.", false);
        let url = construct_url(&c, &item);
        assert!(url.contains("voice=amy&language=en-US&rate=50&text=hello."));
        assert!(!url.contains("volume="));
    }
}
