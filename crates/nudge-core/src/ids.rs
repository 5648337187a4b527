//! Branded identifier types.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CoreError;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(
    /// Opaque, stable identifier of one logical conversation.
    ///
    /// Client-supplied or server-issued. Never empty.
    SessionId
);

branded_id!(
    /// Identity of one physical output channel.
    ///
    /// Two channels registered for the same session always differ here, which
    /// is what the registry compares on deregistration.
    ChannelId
);

impl SessionId {
    /// Validate a client-supplied identifier.
    pub fn parse(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(CoreError::EmptySessionId);
        }
        Ok(Self(raw))
    }

    /// Issue a fresh server-side identifier.
    pub fn generate() -> Self {
        Self(format!("sess_{}", Uuid::now_v7()))
    }
}

impl std::str::FromStr for SessionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl ChannelId {
    /// Allocate a new unique channel id.
    pub fn new() -> Self {
        Self(format!("chan_{}", Uuid::now_v7()))
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_value_verbatim() {
        let id = SessionId::parse("abc").unwrap();
        assert_eq!(id.as_str(), "abc");
    }

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(SessionId::parse(""), Err(CoreError::EmptySessionId));
    }

    #[test]
    fn parse_rejects_whitespace_only() {
        assert_eq!(SessionId::parse("  \t"), Err(CoreError::EmptySessionId));
    }

    #[test]
    fn from_str_validates() {
        assert!("".parse::<SessionId>().is_err());
        let id: SessionId = "sess-1".parse().unwrap();
        assert_eq!(id.to_string(), "sess-1");
    }

    #[test]
    fn generated_session_id_has_prefix() {
        let id = SessionId::generate();
        assert!(id.as_str().starts_with("sess_"), "got: {id}");
    }

    #[test]
    fn channel_ids_are_unique() {
        let a = ChannelId::new();
        let b = ChannelId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("chan_"));
    }

    #[test]
    fn serializes_transparently() {
        let id = SessionId::parse("abc").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }
}
