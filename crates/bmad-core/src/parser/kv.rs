//! Line-level helpers shared by the text parsers.

use std::collections::{BTreeMap, HashSet};

use crate::error::{Error, Result};

/// Bucket used when deduplicating entries whose key is empty.
pub const EMPTY_BUCKET: &str = "__empty__";

/// Strip one matched pair of surrounding single or double quotes.
pub fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Split `key: value` on the first `:`. Both halves are trimmed and the
/// value loses one matched pair of quotes.
pub fn split_kv(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    Some((key.trim(), strip_quotes(value.trim())))
}

/// Wrap `value` in double quotes, escaping backslashes, quotes and line
/// breaks so it stays on one line.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Inverse of [`quote`] for double-quoted values. Unknown escapes are kept
/// verbatim; anything else is handled like [`strip_quotes`].
pub fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return strip_quotes(value).to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// [`split_kv`] with the value passed through [`unquote`].
pub fn split_kv_unquoted(line: &str) -> Option<(&str, String)> {
    let (key, value) = line.split_once(':')?;
    Some((key.trim(), unquote(value.trim())))
}

/// Case-insensitive `true`/`false`; anything else names the key.
pub fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::parse(format!(
            "{key} must be boolean, got \"{value}\""
        ))),
    }
}

/// Nested lines are indented by at least two spaces or one tab.
pub fn is_nested(line: &str) -> bool {
    line.starts_with("  ") || line.starts_with('\t')
}

/// Lines of the indented block under the first `heading:` line. Stops at the
/// first line that is empty, has no `:`, or is not nested.
pub fn nested_block<'a>(text: &'a str, heading: &str) -> Option<Vec<&'a str>> {
    let mut lines = text.lines().map(|l| l.trim_end_matches('\r'));
    lines.by_ref().find(|l| l.trim().starts_with(heading))?;
    Some(
        lines
            .take_while(|l| !l.trim().is_empty() && l.contains(':') && is_nested(l))
            .collect(),
    )
}

/// Keep the first map per distinct value of `key`; maps without the key
/// (or with an empty value) share one bucket.
pub fn dedup_by_key(
    items: Vec<BTreeMap<String, String>>,
    key: &str,
) -> Vec<BTreeMap<String, String>> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let k = item
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .unwrap_or(EMPTY_BUCKET)
                .to_string();
            seen.insert(k)
        })
        .collect()
}
