//! Key-value store key grammar: 1-128 characters from `[A-Za-z0-9._-]`
//! with no `..`, checked before any filesystem call.

/// Maximum key length in bytes.
pub const MAX_KEY_LEN: usize = 128;

/// Validate a KV key. Returns the key on success so call sites can
/// chain into the file path build.
pub fn validate_kv_key(key: &str) -> Result<&str, String> {
    if key.is_empty() {
        return Err("key must not be empty".into());
    }
    if key.len() > MAX_KEY_LEN {
        return Err(format!("key exceeds {MAX_KEY_LEN} characters"));
    }
    if key.contains("..") {
        return Err("key must not contain '..'".into());
    }
    for b in key.bytes() {
        if !(b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-') {
            return Err(format!(
                "key contains invalid character '{}'",
                char::from(b).escape_default()
            ));
        }
    }
    Ok(key)
}
