//! Item invariants: trimmed, bounded names and the anonymous owner sentinel.

use std::fmt;

use super::error::DomainError;

/// Owner recorded for items created without an explicit user.
pub const ANONYMOUS_USER_ID: &str = "anonymous";

/// Upper bound on item names when no configuration overrides it.
pub const DEFAULT_NAME_MAX_LEN: usize = 100;

/// A validated item name: trimmed, non-empty, at most `max_len` characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemName(String);

impl ItemName {
    pub fn parse(raw: &str, max_len: usize) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("Name is required"));
        }

        let len = trimmed.chars().count();
        if len > max_len {
            return Err(DomainError::validation(format!(
                "Name must be at most {max_len} characters (got {len})"
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ItemName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize an optional owner: blank or missing means anonymous.
pub fn normalize_user_id(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(ANONYMOUS_USER_ID)
        .to_string()
}
