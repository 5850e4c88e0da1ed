//! Object key validation.
//!
//! Keys are `/`-separated strings relative to the store root (bucket, prefix
//! or directory). They are never allowed to escape that root.

use crate::error::{ErrorKind, Result};

/// Normalize the segments of `key`, rejecting anything that would leave the
/// store root. Empty and `.` segments are dropped, `..` pops a segment.
fn normalize(key: &str) -> Result<Vec<&str>> {
    // Null bytes get through string handling just fine but truncate keys in
    // anything C-based underneath a backend.
    if key.contains('\0') {
        exn::bail!(ErrorKind::InvalidKey(key.to_string()));
    }
    let mut segments = Vec::new();
    for segment in key.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                if segments.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidKey(key.to_string()));
                }
            },
            other => segments.push(other),
        }
    }
    Ok(segments)
}

/// Validates an object key for security and correctness.
///
/// # Examples
///
/// ```
/// use strata_storage::validate_key;
/// assert_eq!(validate_key("data/2024/a.csv").unwrap(), "data/2024/a.csv");
/// assert_eq!(validate_key("/data//./b/../a.csv").unwrap(), "data/a.csv");
/// assert!(validate_key("../etc/passwd").is_err());
/// assert!(validate_key("").is_err());
/// ```
pub fn validate_key(key: &str) -> Result<String> {
    let segments = normalize(key)?;
    if segments.is_empty() {
        exn::bail!(ErrorKind::InvalidKey(key.to_string()));
    }
    Ok(segments.join("/"))
}

/// Validates a listing prefix.
///
/// Unlike keys, prefixes may be empty (list everything) and keep a trailing
/// `/`, which matters for string-prefix listing: `data/` and `data` do not
/// select the same keys.
///
/// ```
/// use strata_storage::validate_prefix;
/// assert_eq!(validate_prefix("").unwrap(), "");
/// assert_eq!(validate_prefix("data/").unwrap(), "data/");
/// assert_eq!(validate_prefix("./data/part-").unwrap(), "data/part-");
/// ```
pub fn validate_prefix(prefix: &str) -> Result<String> {
    let segments = normalize(prefix)?;
    let mut normalized = segments.join("/");
    if !normalized.is_empty() && prefix.ends_with('/') {
        normalized.push('/');
    }
    Ok(normalized)
}
