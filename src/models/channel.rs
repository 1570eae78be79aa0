//! Channel naming rules and pattern matching.

use crate::error::{HarnessError, HarnessResult};

/// Longest channel name accepted by the harness.
pub const MAX_CHANNEL_LEN: usize = 255;

/// Validate a channel name: non-empty after trimming, bounded length, no whitespace.
pub fn validate_channel(name: &str) -> HarnessResult<()> {
    if name.trim().is_empty() {
        return Err(HarnessError::InvalidChannel(
            "channel name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_CHANNEL_LEN {
        return Err(HarnessError::InvalidChannel(format!(
            "channel name longer than {} bytes",
            MAX_CHANNEL_LEN
        )));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(HarnessError::InvalidChannel(format!(
            "channel name contains whitespace: {:?}",
            name
        )));
    }
    Ok(())
}

/// Glob match with `*` wildcards only (e.g. `test:*`, `*:demo`).
pub fn channel_matches(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }
    let mut rest = name;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(idx) => rest = &rest[idx + part.len()..],
                None => return false,
            }
        }
    }
    true
}
