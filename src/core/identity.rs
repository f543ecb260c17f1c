//! Identity resolution for inbound requests.
//!
//! A request may claim a user id, a guest id, or both (a client that just
//! authenticated still holds its guest id). Resolution rejects requests that
//! claim neither, and reports a transitional request as such instead of
//! picking a winner: precedence is the caller's decision.

use crate::core::errors::{StoreError, StoreResult};
use crate::core::owner::{Owner, OwnerFilter};

/// Outcome of resolving a request's claimed identities.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResolvedIdentity {
    /// Exactly one identity was claimed.
    Single(Owner),
    /// Both a user and a guest id were claimed.
    Transitional {
        /// Authenticated user owner.
        user: Owner,
        /// Guest owner held before authentication.
        guest: Owner,
    },
}

impl ResolvedIdentity {
    /// Read filter covering every claimed identity.
    #[must_use]
    pub fn filter(&self) -> OwnerFilter {
        match self {
            Self::Single(owner) => OwnerFilter::single(owner.clone()),
            Self::Transitional { user, guest } => OwnerFilter::either(user.clone(), guest.clone()),
        }
    }

    /// Owner for writes when the authenticated identity takes precedence.
    #[must_use]
    pub fn prefer_user(self) -> Owner {
        match self {
            Self::Single(owner) | Self::Transitional { user: owner, .. } => owner,
        }
    }
}

/// Resolve the claimed `userId` / `guestId` of a request.
///
/// Blank ids count as absent.
///
/// # Errors
/// Returns a validation error if neither id is present.
pub fn resolve(user_id: Option<&str>, guest_id: Option<&str>) -> StoreResult<ResolvedIdentity> {
    let user = present(user_id).map(Owner::user).transpose()?;
    let guest = present(guest_id).map(Owner::guest).transpose()?;

    match (user, guest) {
        (Some(user), Some(guest)) => Ok(ResolvedIdentity::Transitional { user, guest }),
        (Some(owner), None) | (None, Some(owner)) => Ok(ResolvedIdentity::Single(owner)),
        (None, None) => Err(StoreError::validation(
            "either userId or guestId is required",
        )),
    }
}

fn present(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neither_identity_is_rejected() {
        assert!(matches!(resolve(None, None), Err(StoreError::Validation(_))));
        assert!(matches!(
            resolve(Some(""), Some("  ")),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_single_identity() {
        let resolved = resolve(None, Some("g1")).unwrap();
        assert_eq!(resolved, ResolvedIdentity::Single(Owner::guest("g1").unwrap()));

        let resolved = resolve(Some("u1"), Some("")).unwrap();
        assert_eq!(resolved, ResolvedIdentity::Single(Owner::user("u1").unwrap()));
    }

    #[test]
    fn test_both_identities_are_not_merged() {
        let resolved = resolve(Some("u1"), Some("g1")).unwrap();
        let filter = resolved.filter();
        assert_eq!(filter.owners().len(), 2);
        assert!(filter.matches(&Owner::guest("g1").unwrap()));
        assert_eq!(resolved.prefer_user(), Owner::user("u1").unwrap());
    }
}
