//! Externally resolved user identity.

use serde::{Deserialize, Serialize};

/// Sentinel user id for unauthenticated clients.
pub const ANONYMOUS_USER_ID: &str = "anonymous";

/// Who is on the other end of a session.
///
/// Resolved outside the core; the core never authenticates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Authenticated user id, or [`ANONYMOUS_USER_ID`].
    pub user_id: String,
    /// Label used to personalise messages. Cosmetic only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Identity {
    /// An authenticated identity.
    pub fn new(user_id: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name,
        }
    }

    /// The unauthenticated identity.
    pub fn anonymous() -> Self {
        Self {
            user_id: ANONYMOUS_USER_ID.to_owned(),
            display_name: None,
        }
    }

    /// Whether this is the anonymous sentinel.
    pub fn is_anonymous(&self) -> bool {
        self.user_id == ANONYMOUS_USER_ID
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::anonymous()
    }
}
