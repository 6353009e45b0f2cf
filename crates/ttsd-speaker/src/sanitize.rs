//! Text sanitization ahead of URL construction, ported from the engine's
//! `sanitizeString`/`constructURL` pipeline: isolated symbols get spelled
//! out, runs of punctuation collapse to their leading mark, stray quotes
//! are stripped, and the remainder is percent-encoded.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters dropped when they immediately follow another punctuation
/// mark (`replaceSuccesivePunctuation`'s "silent" set).
const SILENT_PUNCTUATION: &[char] = &['?', '!', ':', ';', '-', '(', ')'];

/// Symbols replaced with their spoken word when they appear isolated
/// (bounded by whitespace or punctuation on both sides), in the order the
/// engine applies them.
const ISOLATED_REPLACEMENTS: &[(char, &str)] = &[
    ('$', "dollar"),
    ('#', "pound"),
    ('&', "and"),
    ('|', "bar"),
    ('/', "or"),
];

fn is_boundary(c: Option<char>) -> bool {
    match c {
        None => true,
        Some(c) => c.is_whitespace() || c.is_ascii_punctuation(),
    }
}

fn replace_if_isolated(subject: &str, search: char, replace: &str) -> String {
    let chars: Vec<char> = subject.chars().collect();
    let mut out = String::with_capacity(subject.len());

    for (i, &c) in chars.iter().enumerate() {
        if c == search {
            let before = if i == 0 { None } else { Some(chars[i - 1]) };
            let after = chars.get(i + 1).copied();
            if is_boundary(before) && is_boundary(after) {
                out.push(' ');
                out.push_str(replace);
                out.push(' ');
                continue;
            }
        }
        out.push(c);
    }

    out
}

fn is_silent_punctuation(c: char) -> bool {
    SILENT_PUNCTUATION.contains(&c)
}

fn replace_successive_punctuation(subject: &str) -> String {
    let mut out = String::with_capacity(subject.len());
    let mut prev_was_punctuation = false;

    for c in subject.chars() {
        let is_punct = c.is_ascii_punctuation();
        if is_punct && prev_was_punctuation && is_silent_punctuation(c) {
            // drop: this mark is silent following another punctuation mark
        } else {
            out.push(c);
        }
        prev_was_punctuation = is_punct;
    }

    out
}

/// Strip stray `"` characters the way `curl_easy_escape` callers must
/// before handing text to the URL encoder, since an unmatched quote would
/// otherwise survive percent-encoding as `%22` and read oddly in logs.
fn curl_sanitize(input: &str) -> String {
    input.chars().filter(|&c| c != '"').collect()
}

/// Full sanitization pass: isolated-symbol substitution, successive
/// punctuation collapse, then stray-quote stripping. Does not percent-encode
/// — that happens separately in [`crate::url::construct_url`] so callers can
/// inspect the human-readable sanitized text (e.g. for `willSpeak` events).
pub fn sanitize_string(input: &str) -> String {
    let mut text = input.to_string();
    for &(symbol, replacement) in ISOLATED_REPLACEMENTS {
        text = replace_if_isolated(&text, symbol, replacement);
    }
    text = replace_successive_punctuation(&text);
    curl_sanitize(&text)
}

/// Characters left unescaped beyond the baseline controls, matching what
/// `curl_easy_escape` percent-encodes (everything not alphanumeric or
/// `-_.~`).
const QUERY_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'$')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b',')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'=')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b']')
    .add(b'<')
    .add(b'>')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^')
    .add(b'`');

pub fn percent_encode(input: &str) -> String {
    utf8_percent_encode(input, QUERY_ENCODE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolated_dollar_sign_is_spelled_out() {
        let out = sanitize_string("it costs $ 5");
        assert!(out.contains("dollar"));
    }

    #[test]
    fn embedded_symbol_in_a_word_is_untouched() {
        let out = sanitize_string("a/b");
        assert_eq!(out, "a/b");
    }

    #[test]
    fn successive_punctuation_collapses() {
        let out = replace_successive_punctuation("wait,- really?!");
        assert_eq!(out, "wait, really?");
    }

    #[test]
    fn stray_quotes_are_stripped() {
        let out = sanitize_string("she said \"hello\"");
        assert!(!out.contains('"'));
    }

    #[test]
    fn percent_encode_escapes_reserved_characters() {
        let out = percent_encode("hello world & more");
        assert_eq!(out, "hello%20world%20%26%20more");
    }
}
