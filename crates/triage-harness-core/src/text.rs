//! Small text helpers shared by ranking, routing and rendering.

use std::collections::BTreeSet;

/// Split text into a set of lower-cased word tokens.
///
/// Words are maximal runs of alphanumerics, `_` and `-`, so identifiers
/// such as `NoValidHost` or `nova-compute` survive intact. The set is
/// ordered, which keeps every consumer deterministic.
pub fn word_tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// The first `max_chars` characters of `text` (char-boundary safe).
pub fn prefix_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
