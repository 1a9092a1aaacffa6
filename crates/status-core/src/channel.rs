//! Channel name extraction

use once_cell::sync::Lazy;
use regex::Regex;

// `<technology>/<name>-<suffix>`, anchored at the start only
static CHANNEL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w*/(\S*)-\w*").unwrap());

/// Short display name for a raw channel identifier.
///
/// `SIP/201-00000a1b` becomes `201`. Anything that does not look like a
/// channel identifier is returned unchanged.
pub fn display_name(raw_channel: &str) -> &str {
    CHANNEL_REGEX
        .captures(raw_channel)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw_channel)
}
