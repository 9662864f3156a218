//! Session keys are operator-chosen and double as credential directory
//! names, so they are restricted to a filesystem-safe alphabet.

use crate::error::{Error, Result};

pub const MAX_KEY_LEN: usize = 64;

/// Key used when a start request leaves the key blank.
pub const DEFAULT_KEY: &str = "session";

/// Validate a session key: 1-64 chars of `[A-Za-z0-9_.-]`, not starting with
/// `.` (rules out `.` and `..`).
pub fn validate(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidKey("key must not be empty".into()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(Error::InvalidKey(format!(
            "key must be at most {MAX_KEY_LEN} characters"
        )));
    }
    if key.starts_with('.') {
        return Err(Error::InvalidKey(format!("{key}: must not start with '.'")));
    }
    if let Some(bad) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(Error::InvalidKey(format!("{key}: invalid character {bad:?}")));
    }
    Ok(())
}

/// Trim the key, fall back to [`DEFAULT_KEY`] when blank, then validate.
pub fn resolve(raw: Option<&str>) -> Result<String> {
    let key = raw.map(str::trim).filter(|k| !k.is_empty()).unwrap_or(DEFAULT_KEY);
    validate(key)?;
    Ok(key.to_owned())
}
