//! Authorization capability for privileged vault operations.
//!
//! Strategy migration, model-id updates, and authority rotation are gated
//! by an explicit [`Authority`]. There is no default-allow implementation:
//! a vault always has some concrete set of identities that may act on it.

use std::collections::BTreeSet;

use crate::types::Address;

/// Answers "may this caller perform a privileged operation?".
pub trait Authority: Send + Sync {
    /// `true` if `caller` is inside the authority set.
    fn is_authorized(&self, caller: &Address) -> bool;

    /// Short human-readable description, recorded in change notifications.
    fn describe(&self) -> String;
}

/// A single owner identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleOwner {
    owner: Address,
}

impl SingleOwner {
    /// Creates an authority that admits exactly `owner`.
    pub fn new(owner: impl Into<Address>) -> Self {
        Self {
            owner: owner.into(),
        }
    }

    /// The owner identity.
    pub fn owner(&self) -> &Address {
        &self.owner
    }
}

impl Authority for SingleOwner {
    fn is_authorized(&self, caller: &Address) -> bool {
        !caller.is_empty() && *caller == self.owner
    }

    fn describe(&self) -> String {
        format!("owner({})", self.owner)
    }
}

/// Any member of a fixed set may act (e.g. a rotation of operators, or a
/// governance executor alongside a guardian).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthoritySet {
    members: BTreeSet<Address>,
}

impl AuthoritySet {
    /// Builds the set, dropping empty identities.
    pub fn new(members: impl IntoIterator<Item = Address>) -> Self {
        Self {
            members: members.into_iter().filter(|m| !m.is_empty()).collect(),
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// `true` if nobody is authorized.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Authority for AuthoritySet {
    fn is_authorized(&self, caller: &Address) -> bool {
        self.members.contains(caller)
    }

    fn describe(&self) -> String {
        let names: Vec<&str> = self.members.iter().map(Address::as_str).collect();
        format!("any-of[{}]", names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_owner_admits_only_owner() {
        let auth = SingleOwner::new("gov");
        assert!(auth.is_authorized(&Address::from("gov")));
        assert!(!auth.is_authorized(&Address::from("mallory")));
    }

    #[test]
    fn empty_owner_admits_nobody() {
        let auth = SingleOwner::new("");
        assert!(!auth.is_authorized(&Address::from("")));
    }

    #[test]
    fn authority_set_admits_any_member() {
        let auth = AuthoritySet::new(vec![
            Address::from("a"),
            Address::from("b"),
            Address::from(""),
        ]);
        assert_eq!(auth.len(), 2);
        assert!(auth.is_authorized(&Address::from("a")));
        assert!(auth.is_authorized(&Address::from("b")));
        assert!(!auth.is_authorized(&Address::from("")));
        assert_eq!(auth.describe(), "any-of[a,b]");
    }
}
