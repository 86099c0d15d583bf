//! Prompt-safe normalization for free text pulled from the directory.
//!
//! Review text and business names end up embedded in model prompts and JSON
//! payloads, so anything that could break quoting or layout is normalized.

use std::sync::LazyLock;

use regex::Regex;

/// Strip control characters, normalize smart punctuation, collapse
/// whitespace, and replace double quotes with single quotes.
pub fn sanitize_text(input: &str) -> String {
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let mapped: String = input
        .chars()
        .filter_map(|ch| match ch {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => Some('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' | '"' => Some('\''),
            '\u{2010}'..='\u{2015}' | '\u{2212}' => Some('-'),
            '\u{2026}' => Some('.'),
            '\u{00A0}' | '\u{2007}' | '\u{202F}' => Some(' '),
            '\t' | '\n' | '\r' => Some(' '),
            c if c.is_control() => None,
            '\u{200B}'..='\u{200D}' | '\u{FEFF}' => None,
            c => Some(c),
        })
        .collect();

    WS_RE.replace_all(mapped.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_smart_punctuation() {
        assert_eq!(
            sanitize_text("\u{201C}Best crew\u{201D} \u{2014} they\u{2019}re great"),
            "'Best crew' - they're great"
        );
    }

    #[test]
    fn strips_control_and_collapses_whitespace() {
        assert_eq!(sanitize_text("  Great\u{0007} job\n\n\tfast   service  "), "Great job fast service");
    }

    #[test]
    fn replaces_double_quotes() {
        assert_eq!(sanitize_text(r#"They said "on time" and were"#), "They said 'on time' and were");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(sanitize_text(" \u{200B} "), "");
    }
}
