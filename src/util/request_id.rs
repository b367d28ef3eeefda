//! Request ids for correlating executor attempts in logs and on the wire.

use uuid::Uuid;

/// Header carrying the request id to backends and back from relay callers.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest caller-supplied id accepted verbatim.
const MAX_ID_LEN: usize = 128;

/// Identifier attached to one logical `execute()` call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// A fresh random (v4) id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Reuse a caller's header value if it is sane, otherwise generate one.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v)
                if !v.is_empty()
                    && v.len() <= MAX_ID_LEN
                    && v.chars().all(|c| c.is_ascii_graphic()) =>
            {
                Self(v.to_string())
            }
            _ => Self::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique_uuids() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_from_header() {
        assert_eq!(RequestId::from_header(Some("chat-7")).as_str(), "chat-7");
        assert_eq!(RequestId::from_header(Some(" chat-7 ")).as_str(), "chat-7");

        let generated = RequestId::from_header(Some("has space"));
        assert_ne!(generated.as_str(), "has space");
        assert_eq!(generated.as_str().len(), 36);

        assert_eq!(RequestId::from_header(None).as_str().len(), 36);
        assert_eq!(RequestId::from_header(Some(&"x".repeat(200))).as_str().len(), 36);
    }

    #[test]
    fn test_display() {
        assert_eq!(RequestId::from_string("abc").to_string(), "abc");
    }
}
