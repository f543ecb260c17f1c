//! Owner identities for conversations and preferences.
//!
//! A record belongs to exactly one owner: an authenticated user or an
//! anonymous guest. The two raw optional ids a request carries are turned
//! into an [`Owner`] once, by [`crate::core::identity::resolve`], and the
//! stores only ever see the tagged value.

use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::core::errors::{StoreError, StoreResult};

/// Which of the two identity namespaces an owner id lives in.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OwnerKind {
    /// Authenticated user id.
    User,
    /// Client-generated guest id.
    Guest,
}

impl OwnerKind {
    /// Stable storage identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Guest => "guest",
        }
    }

    /// JSON field name used on the wire.
    #[must_use]
    pub const fn field_name(self) -> &'static str {
        match self {
            Self::User => "userId",
            Self::Guest => "guestId",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "guest" => Ok(Self::Guest),
            other => Err(StoreError::validation(format!("unknown owner kind {other:?}"))),
        }
    }
}

/// The single identity a record belongs to.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Owner {
    /// Owned by an authenticated user.
    User(String),
    /// Owned by an anonymous guest.
    Guest(String),
}

impl Owner {
    /// Build a user owner.
    ///
    /// # Errors
    /// Returns a validation error if the id is empty or whitespace.
    pub fn user(id: impl Into<String>) -> StoreResult<Self> {
        Self::from_parts(OwnerKind::User, id)
    }

    /// Build a guest owner.
    ///
    /// # Errors
    /// Returns a validation error if the id is empty or whitespace.
    pub fn guest(id: impl Into<String>) -> StoreResult<Self> {
        Self::from_parts(OwnerKind::Guest, id)
    }

    /// Build an owner from its kind and raw id.
    ///
    /// # Errors
    /// Returns a validation error if the id is empty or whitespace.
    pub fn from_parts(kind: OwnerKind, id: impl Into<String>) -> StoreResult<Self> {
        let id = id.into();
        let id = id.trim();
        if id.is_empty() {
            return Err(StoreError::validation(format!(
                "{} must not be empty",
                kind.field_name()
            )));
        }
        Ok(match kind {
            OwnerKind::User => Self::User(id.to_string()),
            OwnerKind::Guest => Self::Guest(id.to_string()),
        })
    }

    /// Identity namespace of this owner.
    #[must_use]
    pub const fn kind(&self) -> OwnerKind {
        match self {
            Self::User(_) => OwnerKind::User,
            Self::Guest(_) => OwnerKind::Guest,
        }
    }

    /// Raw owner id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::User(id) | Self::Guest(id) => id,
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Serialized as a single `userId` or `guestId` entry, so it can be flattened
/// into the record that carries it.
impl Serialize for Owner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.kind().field_name(), self.id())?;
        map.end()
    }
}

/// Owners a read or wipe applies to. Records owned by any of them match.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OwnerFilter {
    owners: Vec<Owner>,
}

impl OwnerFilter {
    /// Filter matching a single owner.
    #[must_use]
    pub fn single(owner: Owner) -> Self {
        Self {
            owners: vec![owner],
        }
    }

    /// Filter matching either a user or a guest.
    #[must_use]
    pub fn either(user: Owner, guest: Owner) -> Self {
        Self {
            owners: vec![user, guest],
        }
    }

    /// Owners covered by this filter.
    #[must_use]
    pub fn owners(&self) -> &[Owner] {
        &self.owners
    }

    /// Whether a record owned by `owner` matches.
    #[must_use]
    pub fn matches(&self, owner: &Owner) -> bool {
        self.owners.contains(owner)
    }
}

impl From<Owner> for OwnerFilter {
    fn from(owner: Owner) -> Self {
        Self::single(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_ids_rejected() {
        assert!(matches!(Owner::user(""), Err(StoreError::Validation(_))));
        assert!(matches!(Owner::guest("   "), Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_ids_are_trimmed() {
        let owner = Owner::guest("  g1 ").unwrap();
        assert_eq!(owner.id(), "g1");
        assert_eq!(owner.kind(), OwnerKind::Guest);
    }

    #[test]
    fn test_serializes_as_single_field() {
        let user = serde_json::to_value(Owner::user("u1").unwrap()).unwrap();
        assert_eq!(user, serde_json::json!({ "userId": "u1" }));
        let guest = serde_json::to_value(Owner::guest("g1").unwrap()).unwrap();
        assert_eq!(guest, serde_json::json!({ "guestId": "g1" }));
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in [OwnerKind::User, OwnerKind::Guest] {
            assert_eq!(kind.as_str().parse::<OwnerKind>().unwrap(), kind);
        }
        assert!("admin".parse::<OwnerKind>().is_err());
    }

    #[test]
    fn test_filter_matches_either_owner() {
        let user = Owner::user("u1").unwrap();
        let guest = Owner::guest("g1").unwrap();
        let filter = OwnerFilter::either(user.clone(), guest.clone());
        assert!(filter.matches(&user));
        assert!(filter.matches(&guest));
        assert!(!filter.matches(&Owner::guest("u1").unwrap()));
    }
}
