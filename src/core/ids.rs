//! Identifier types for stored records.
//!
//! Record ids are strongly-typed UUID newtypes. They use `UUIDv7` so that
//! rows inserted close together in time stay close together in the index,
//! and so that ids sort in creation order when timestamps tie.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declare a UUID newtype with a consistent API.
macro_rules! define_record_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl Default for $name {
            #[inline]
            fn default() -> Self {
                Self::new()
            }
        }

        impl $name {
            /// Create a new time-ordered identifier.
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wrap an existing UUID.
            #[inline]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Borrow the underlying UUID.
            #[inline]
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            #[inline]
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            #[inline]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s.trim())?))
            }
        }
    };
}

define_record_id!(
    /// Identifier of a stored conversation.
    ConversationId
);

define_record_id!(
    /// Identifier of a stored preference document.
    ///
    /// Assigned by the first write for an owner and kept by every later merge.
    PreferenceId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_display_roundtrip() {
        let id = ConversationId::new();
        let parsed: ConversationId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("not-a-uuid".parse::<ConversationId>().is_err());
        assert!("".parse::<PreferenceId>().is_err());
    }

    #[test]
    fn test_ids_are_v7() {
        let id = PreferenceId::new();
        assert_eq!(id.as_uuid().get_version_num(), 7);
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = ConversationId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
