//! Newtype IDs for type-safe entity references.
//!
//! Directory resource names and Slack object IDs are all plain strings on the
//! wire. The `define_id!` macro wraps them so a group resource name can never
//! be passed where a membership resource name or a Slack user ID is expected.

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use gatekeeper_core::define_id;
/// define_id!(ChannelId);
/// define_id!(TeamId);
///
/// let channel = ChannelId::new("C123");
/// let team = TeamId::new("T123");
///
/// // These are different types, so this won't compile:
/// // let _: ChannelId = team;
/// assert_eq!(channel.as_str(), "C123");
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from anything string-like.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the underlying string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Whether the ID is the empty string.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Directory resource names (e.g. `groups/abc`, `groups/abc/memberships/xyz`)
define_id!(GroupId);
define_id!(MembershipId);
define_id!(OperationName);

// Slack object IDs
define_id!(UserId);
define_id!(ChannelId);
define_id!(UserGroupId);

/// Identifier of one approval workflow instance.
///
/// Generated when a requester starts `add member` and carried in every
/// interactive element of that workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh random request ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a request ID from its string form.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_id_round_trip_through_serde() {
        let id = MembershipId::new("groups/g1/memberships/m1");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"groups/g1/memberships/m1\"");

        let back: MembershipId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn test_request_id_parse_and_display() {
        let id = RequestId::generate();
        let parsed = RequestId::parse(&id.to_string()).expect("valid uuid");
        assert_eq!(parsed, id);
        assert!(RequestId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_empty_id() {
        assert!(UserId::new("").is_empty());
        assert!(!UserId::new("U123").is_empty());
    }
}
