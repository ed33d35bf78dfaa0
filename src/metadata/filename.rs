//! Artist/title guesses from file names.
//!
//! Used as the last search strategy when a track has no usable tags.
//! Recognises `Artist - Title`, `Artist – Title` and `Artist | Title`
//! after stripping common download noise: leading track numbers,
//! bitrate/format tags, technical bracketed segments and underscores.

use std::path::Path;

/// Artist and title recovered from a file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameGuess {
    pub artist: String,
    pub title: String,
}

/// Separators tried in order. Spaced forms come first so hyphenated
/// names like `Jay-Z - Song` split in the right place.
const SEPARATORS: [&str; 9] = [" - ", " – ", " — ", " | ", "–", "—", "|", "-", " _ "];

/// Parse a file name (with or without directory and extension).
///
/// Returns `None` when no separator is found or either side is empty.
pub fn parse_filename(name: &str) -> Option<FilenameGuess> {
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let cleaned = clean_stem(&stem);
    if cleaned.is_empty() {
        return None;
    }

    for sep in SEPARATORS {
        if let Some((artist, title)) = cleaned.split_once(sep) {
            let artist = collapse_whitespace(artist);
            let title = collapse_whitespace(title);
            if !artist.is_empty() && !title.is_empty() {
                return Some(FilenameGuess { artist, title });
            }
        }
    }

    tracing::debug!("Could not parse file name {:?} for artist/title", name);
    None
}

/// Remove download noise from a file stem.
fn clean_stem(stem: &str) -> String {
    let spaced = stem.replace('_', " ");
    let without_number = strip_track_number(spaced.trim());
    let without_brackets = strip_technical_brackets(without_number);

    let kept: Vec<&str> = without_brackets
        .split_whitespace()
        .filter(|token| !is_quality_token(token))
        .collect();
    kept.join(" ")
}

/// Strip `01. `, `02-`, `3 - ` prefixes. A bare number followed only by a
/// space is kept unless zero-padded, so `50 Cent - ...` survives.
fn strip_track_number(s: &str) -> &str {
    let digits = s.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 || digits > 3 {
        return s;
    }

    let rest = &s[digits..];
    let sep_len: usize = rest
        .chars()
        .take_while(|c| matches!(c, '.' | '-' | ' '))
        .map(char::len_utf8)
        .sum();
    if sep_len == 0 || sep_len == rest.len() {
        return s;
    }

    let sep = &rest[..sep_len];
    let zero_padded = s.starts_with('0') && digits > 1;
    if sep.contains('.') || sep.contains('-') || zero_padded {
        &rest[sep_len..]
    } else {
        s
    }
}

/// Drop `[...]`/`(...)`/`{...}` segments holding technical info (digits or
/// format words). Descriptive segments like `(Radio Edit)` stay.
fn strip_technical_brackets(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find(['[', '(', '{']) {
        let open = rest[start..].chars().next().unwrap_or('[');
        let close = match open {
            '[' => ']',
            '(' => ')',
            _ => '}',
        };
        out.push_str(&rest[..start]);

        let Some(len) = rest[start..].find(close) else {
            out.push_str(&rest[start..]);
            return out;
        };
        let segment = &rest[start..start + len + 1];
        let inner = &segment[1..segment.len() - 1];
        if !is_technical(inner) {
            out.push_str(segment);
        }
        rest = &rest[start + len + 1..];
    }

    out.push_str(rest);
    out
}

fn is_technical(inner: &str) -> bool {
    inner.chars().any(|c| c.is_ascii_digit())
        || (!inner.trim().is_empty() && inner.split_whitespace().all(is_quality_token))
}

/// Bitrate and format markers: `320kbps`, `320k`, `mp3`, `flac`, `320`.
fn is_quality_token(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    if matches!(lower.as_str(), "mp3" | "flac" | "kbps" | "hq") {
        return true;
    }
    let number = lower
        .strip_suffix("kbps")
        .or_else(|| lower.strip_suffix('k'))
        .unwrap_or(&lower);
    matches!(number, "128" | "192" | "256" | "320")
        || (lower.ends_with("kbps") && !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn word() -> impl Strategy<Value = String> {
        prop::string::string_regex("[A-Za-z][a-z]{1,8}").unwrap()
    }

    fn phrase() -> impl Strategy<Value = String> {
        prop::collection::vec(word(), 1..4).prop_map(|w| w.join(" "))
    }

    proptest! {
        /// `Artist - Title.mp3` always splits back into its parts
        #[test]
        fn spaced_hyphen_roundtrips(artist in phrase(), title in phrase()) {
            prop_assume!(artist.split_whitespace().all(|t| !is_quality_token(t)));
            prop_assume!(title.split_whitespace().all(|t| !is_quality_token(t)));

            let parsed = parse_filename(&format!("{artist} - {title}.mp3"));
            prop_assert_eq!(parsed, Some(FilenameGuess { artist, title }));
        }

        /// Parsing never yields empty fields or stray whitespace
        #[test]
        fn parsed_fields_are_trimmed(name in "[ A-Za-z0-9_.|()\\[\\]-]{0,40}") {
            if let Some(g) = parse_filename(&name) {
                prop_assert!(!g.artist.is_empty());
                prop_assert!(!g.title.is_empty());
                prop_assert_eq!(g.artist.trim(), g.artist.as_str());
                prop_assert_eq!(g.title.trim(), g.title.as_str());
            }
        }
    }
}
