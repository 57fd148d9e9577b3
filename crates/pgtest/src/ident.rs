//! Database identifier validation and quoting.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ProvisionError, Result};

/// PostgreSQL truncates identifiers longer than `NAMEDATALEN - 1` bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

fn safe_identifier() -> &'static Regex {
    static SAFE: OnceLock<Regex> = OnceLock::new();
    SAFE.get_or_init(|| Regex::new(r"^[A-Za-z0-9\-_]+$").expect("static regex"))
}

/// Check that `name` can be used as a database name.
///
/// Accepts ASCII letters, digits, `-` and `_`, up to 63 bytes.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ProvisionError::invalid_name(name, "name is empty"));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(ProvisionError::invalid_name(
            name,
            "name is longer than 63 bytes",
        ));
    }
    if !safe_identifier().is_match(name) {
        return Err(ProvisionError::invalid_name(
            name,
            "only letters, digits, '-' and '_' are allowed",
        ));
    }
    Ok(())
}

/// Quote `name` for use as an SQL identifier.
///
/// Embedded double quotes are doubled and anything from the first NUL byte
/// on is dropped.
pub fn quote_identifier(name: &str) -> String {
    let name = name.split('\0').next().unwrap_or_default();
    format!("\"{}\"", name.replace('"', "\"\""))
}
