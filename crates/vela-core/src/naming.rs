//! Deterministic names for revisions and name validation.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CoreError, Result};

// DNS-1123 subdomain, the shape every object name must have.
static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("Invalid name regex")
});

const MAX_NAME_LEN: usize = 253;

/// Name of revision `revision` of `base`, e.g. `myapp-v3`.
pub fn revision_name(base: &str, revision: i64) -> String {
    format!("{base}-v{revision}")
}

/// Parses the sequence number out of a name built by [`revision_name`].
pub fn extract_revision(name: &str) -> Result<i64> {
    let (_, suffix) = name
        .rsplit_once("-v")
        .ok_or_else(|| CoreError::invalid_revision_name(name))?;
    match suffix.parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CoreError::invalid_revision_name(name)),
    }
}

/// Validates an object name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || !NAME_REGEX.is_match(name) {
        return Err(CoreError::invalid_name(name));
    }
    Ok(())
}
