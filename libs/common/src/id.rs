use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = focal_common::id::prefixed_ulid("call");
/// assert!(id.starts_with("call_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes across the Focal client.
pub mod prefix {
    pub const USER: &str = "usr";
    pub const CONVERSATION: &str = "conv";
    pub const NOTIFICATION: &str = "ntf";
    pub const CALL: &str = "call";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_ulid_format() {
        let id = prefixed_ulid(prefix::CALL);
        assert!(id.starts_with("call_"));
        // ULID is 26 chars, plus prefix + underscore
        assert_eq!(id.len(), 5 + 26);
    }

    #[test]
    fn uniqueness() {
        let a = prefixed_ulid(prefix::USER);
        let b = prefixed_ulid(prefix::USER);
        assert_ne!(a, b);
    }
}
