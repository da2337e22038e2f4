use std::borrow::Cow;

const REDACTED: &str = "[REDACTED]";

/// Markers followed by a credential. Prefix markers (`sk-`) are redacted
/// together with the token; key markers (`api_key=`) keep nothing either.
const SECRET_MARKERS: [&str; 9] = [
    "sk-ant-",
    "sk-",
    "Authorization: Bot ",
    "Authorization: Bearer ",
    "x-api-key: ",
    "api_key=",
    "\"api_key\":\"",
    "\"token\":\"",
    "access_token=",
];

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '+' | '/' | '=')
}

fn token_end(input: &str, from: usize) -> usize {
    input[from..]
        .char_indices()
        .find(|(_, c)| !is_secret_char(*c))
        .map_or(input.len(), |(i, _)| from + i)
}

/// Word-like markers only count at the start of a token: `risk-based` is not a key.
fn continues_word(input: &str, start: usize, marker: &str) -> bool {
    let word_marker = marker.starts_with(|c: char| c.is_ascii_alphanumeric());
    word_marker
        && input[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
}

fn redact_marker(scrubbed: &mut String, marker: &str) {
    let mut search_from = 0;
    while let Some(rel) = scrubbed[search_from..].find(marker) {
        let start = search_from + rel;
        let value_start = start + marker.len();
        let end = token_end(scrubbed, value_start);

        // A bare marker, or one glued to a preceding word, is ordinary prose.
        if end == value_start || continues_word(scrubbed, start, marker) {
            search_from = value_start;
            continue;
        }

        scrubbed.replace_range(start..end, REDACTED);
        search_from = start + REDACTED.len();
    }
}

/// Redact credential-looking tokens before provider text reaches users or logs.
pub fn scrub_secret_patterns(input: &str) -> Cow<'_, str> {
    if !SECRET_MARKERS.iter().any(|marker| input.contains(marker)) {
        return Cow::Borrowed(input);
    }

    let mut scrubbed = input.to_string();
    for marker in SECRET_MARKERS {
        redact_marker(&mut scrubbed, marker);
    }
    Cow::Owned(scrubbed)
}

/// First `max_chars` characters of `input`, never splitting a code point.
pub fn char_prefix(input: &str, max_chars: usize) -> &str {
    input
        .char_indices()
        .nth(max_chars)
        .map_or(input, |(end, _)| &input[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_borrowed() {
        let out = scrub_secret_patterns("bad request");
        assert!(matches!(out, Cow::Borrowed("bad request")));
    }

    #[test]
    fn anthropic_key_is_redacted() {
        let out = scrub_secret_patterns("invalid x-api-key sk-ant-api03-abcDEF_123 provided");
        assert_eq!(out, "invalid x-api-key [REDACTED] provided");
    }

    #[test]
    fn bot_token_header_is_redacted() {
        let out = scrub_secret_patterns("Authorization: Bot MTIz.abc.def rejected");
        assert!(!out.contains("MTIz"));
        assert!(out.contains(REDACTED));
    }

    #[test]
    fn bare_marker_is_left_alone() {
        let out = scrub_secret_patterns("use sk- keys only");
        assert_eq!(out, "use sk- keys only");
    }

    #[test]
    fn marker_inside_a_word_is_left_alone() {
        let out = scrub_secret_patterns("a risk-based check and task-list rejected sk-live123");
        assert_eq!(out, "a risk-based check and task-list rejected [REDACTED]");
    }

    #[test]
    fn json_token_value_is_redacted() {
        let out = scrub_secret_patterns(r#"{"token":"abc123","ok":false}"#);
        assert_eq!(out, r#"{[REDACTED]","ok":false}"#);
    }

    #[test]
    fn char_prefix_respects_code_points() {
        assert_eq!(char_prefix("héllo", 2), "hé");
        assert_eq!(char_prefix("short", 300), "short");
        assert_eq!(char_prefix("", 3), "");
    }
}
