//! Parser for free-text oracle replies.
//!
//! Replies are expected to look like
//!
//! ```text
//! Thought: the scheduler rejected every host
//! Action: search_docs(query="NoValidHost scheduler filters", service="nova")
//! ```
//!
//! or to contain a `Final:` line. Markers are matched case-insensitively
//! at the start of a word, so `transaction:` is not an `Action:` marker.
//! `Final:` wins over `Action:` when both occur.
//! Nothing here fails: unusable text becomes [`Directive::Unrecognized`].

/// What the oracle asked the controller to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Answer text following the `Final:` marker.
    Final(String),
    /// A documentation search request.
    Action {
        query: String,
        service: Option<String>,
    },
    /// Neither marker was present.
    Unrecognized,
}

/// A reply split into its optional thought and its directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub thought: Option<String>,
    pub directive: Directive,
}

const THOUGHT: &str = "thought:";
const ACTION: &str = "action:";
const FINAL: &str = "final:";
const OBSERVATION: &str = "observation:";

/// Parse one oracle reply.
///
/// `fallback_query` is used when an `Action:` carries no usable
/// `query="..."` argument and the action line itself is a tool call.
pub fn parse_reply(reply: &str, fallback_query: &str) -> ParsedReply {
    let thought = find_marker(reply, THOUGHT, 0).and_then(|pos| {
        let start = pos + THOUGHT.len();
        let end = [ACTION, FINAL, OBSERVATION]
            .iter()
            .filter_map(|m| find_marker(reply, m, start))
            .min()
            .unwrap_or(reply.len());
        non_empty(reply[start..end].trim())
    });

    let directive = if let Some(pos) = find_marker(reply, FINAL, 0) {
        Directive::Final(reply[pos + FINAL.len()..].trim().to_string())
    } else if let Some(pos) = find_marker(reply, ACTION, 0) {
        parse_action(&reply[pos + ACTION.len()..], fallback_query)
    } else {
        Directive::Unrecognized
    };

    ParsedReply { thought, directive }
}

/// Extract the text after a `Final:` marker, or the whole trimmed reply
/// when the marker is missing.
pub fn final_text(reply: &str) -> String {
    match find_marker(reply, FINAL, 0) {
        Some(pos) => reply[pos + FINAL.len()..].trim().to_string(),
        None => reply.trim().to_string(),
    }
}

fn parse_action(rest: &str, fallback_query: &str) -> Directive {
    let line = rest.lines().next().unwrap_or("").trim();

    let query = quoted_arg(rest, "query=")
        .or_else(|| (!line.is_empty() && !line.contains('(')).then(|| line.to_string()))
        .unwrap_or_else(|| fallback_query.to_string());

    let service = quoted_arg(rest, "service=").filter(|s| {
        let lower = s.to_ascii_lowercase();
        !(lower.is_empty() || lower == "none" || lower == "null")
    });

    Directive::Action { query, service }
}

/// The first double-quoted string after `key` in `text`.
fn quoted_arg(text: &str, key: &str) -> Option<String> {
    let key_pos = find_ci(text, key, 0)?;
    let after = &text[key_pos + key.len()..];
    let open = after.find('"')?;
    let value = &after[open + 1..];
    let close = value.find('"')?;
    Some(value[..close].trim().to_string())
}

/// ASCII case-insensitive search for `needle` at or after byte `from`.
///
/// `needle` must be ASCII, so any match starts on a char boundary.
fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    if from > hay.len() || pat.len() > hay.len() - from {
        return None;
    }
    hay[from..]
        .windows(pat.len())
        .position(|w| w.eq_ignore_ascii_case(pat))
        .map(|p| p + from)
}

/// Like [`find_ci`], but only accepts a match that starts a word: at the
/// beginning of the text or after a byte that is not part of an
/// identifier. Non-ASCII bytes count as word bytes.
fn find_marker(haystack: &str, marker: &str, from: usize) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let mut from = from;
    while let Some(pos) = find_ci(haystack, marker, from) {
        let starts_word = pos == 0 || {
            let prev = bytes[pos - 1];
            prev.is_ascii() && !prev.is_ascii_alphanumeric() && prev != b'_'
        };
        if starts_word {
            return Some(pos);
        }
        from = pos + 1;
    }
    None
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
