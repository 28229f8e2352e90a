//! Parser for `.env`-style content fetched from the remote container.

use std::collections::HashMap;

use tracing::warn;

/// Parses `KEY=VALUE` lines into a map.
///
/// Blank lines and `#` comments are skipped. A value keeps everything
/// after the first `=`, trimmed, with one matching pair of surrounding
/// quotes removed. Lines without `=` or with an empty key are skipped
/// with a warning; a bad line never fails the whole document.
pub fn parse_env_content(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            warn!(line = idx + 1, "ignoring env line without '='");
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            warn!(line = idx + 1, "ignoring env line with empty key");
            continue;
        }
        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    vars
}

/// Removes one pair of matching surrounding quotes, if present.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}
