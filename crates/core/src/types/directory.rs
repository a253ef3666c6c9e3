//! Identity directory records as seen by Gatekeeper.
//!
//! Groups and memberships are captured in a [`DirectorySnapshot`] by the
//! background refresh loop. A [`GrantRecord`] tracks a membership this system
//! created and still has to revoke.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::email::Email;
use super::expiration::Expiration;
use super::id::{GroupId, MembershipId, OperationName};

/// Role held by a member of a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MembershipRole {
    /// Role name, e.g. `MEMBER`, `MANAGER`, `OWNER`.
    pub name: String,
}

impl MembershipRole {
    /// The plain `MEMBER` role granted by approved requests.
    #[must_use]
    pub fn member() -> Self {
        Self {
            name: "MEMBER".to_owned(),
        }
    }
}

/// One membership of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Directory-assigned resource name.
    pub id: MembershipId,
    /// Key of the member entity, usually an email address.
    pub member_key: String,
    /// Roles held by the member.
    pub roles: Vec<MembershipRole>,
    /// Operation that created the membership, when this system created it.
    pub created_by: Option<OperationName>,
}

/// A group together with its members at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Directory resource name (`groups/...`).
    pub id: GroupId,
    /// Human readable name shown in the selection menu.
    pub display_name: String,
    /// Members in directory order.
    pub memberships: Vec<Membership>,
}

impl Group {
    /// Whether `email` already holds a membership in this group.
    #[must_use]
    pub fn has_member(&self, email: &Email) -> bool {
        self.memberships
            .iter()
            .any(|m| email.matches_member_key(&m.member_key))
    }
}

/// The full set of groups at one point in time.
///
/// Built off to the side by the refresh loop and swapped in whole, so a
/// reader never sees groups from two different cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    /// Groups in directory order.
    pub groups: Vec<Group>,
    /// When the refresh that produced this snapshot started.
    pub captured_at: DateTime<Utc>,
}

impl DirectorySnapshot {
    /// Create a snapshot captured now.
    #[must_use]
    pub fn new(groups: Vec<Group>) -> Self {
        Self {
            groups,
            captured_at: Utc::now(),
        }
    }

    /// Groups `email` could be added to, in snapshot order.
    #[must_use]
    pub fn eligible_groups(&self, email: &Email) -> Vec<(GroupId, String)> {
        self.groups
            .iter()
            .filter(|g| !g.has_member(email))
            .map(|g| (g.id.clone(), g.display_name.clone()))
            .collect()
    }

    /// Look up a group by resource name.
    #[must_use]
    pub fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| &g.id == id)
    }

    /// Total number of memberships across all groups.
    #[must_use]
    pub fn membership_count(&self) -> usize {
        self.groups.iter().map(|g| g.memberships.len()).sum()
    }
}

/// A membership created by this system that is waiting to be revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRecord {
    /// Membership to delete when the grant expires.
    pub membership_id: MembershipId,
    /// Lifetime of the grant.
    pub expiration: Expiration,
    /// When the record was inserted; the TTL counts from here.
    pub enqueued_at: DateTime<Utc>,
}

impl GrantRecord {
    /// Create a record enqueued now.
    #[must_use]
    pub fn new(membership_id: MembershipId, expiration: Expiration) -> Self {
        Self {
            membership_id,
            expiration,
            enqueued_at: Utc::now(),
        }
    }

    /// Wall-clock time at which the grant is due for revocation.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        let hours = i64::try_from(self.expiration.hours()).unwrap_or(i64::MAX);
        self.enqueued_at + chrono::Duration::hours(hours)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn membership(group: &str, key: &str) -> Membership {
        Membership {
            id: MembershipId::new(format!("{group}/memberships/{key}")),
            member_key: key.to_owned(),
            roles: vec![MembershipRole::member()],
            created_by: None,
        }
    }

    fn group(id: &str, name: &str, members: &[&str]) -> Group {
        Group {
            id: GroupId::new(id),
            display_name: name.to_owned(),
            memberships: members.iter().map(|m| membership(id, m)).collect(),
        }
    }

    #[test]
    fn test_eligible_groups_excludes_existing_membership() {
        let snapshot = DirectorySnapshot::new(vec![
            group("groups/g1", "G1", &["alice@x.com"]),
            group("groups/g2", "G2", &[]),
        ]);

        let alice = Email::parse("alice@x.com").unwrap();
        assert_eq!(
            snapshot.eligible_groups(&alice),
            vec![(GroupId::new("groups/g2"), "G2".to_owned())]
        );
    }

    #[test]
    fn test_eligible_groups_preserves_order() {
        let snapshot = DirectorySnapshot::new(vec![
            group("groups/b", "B", &[]),
            group("groups/a", "A", &["bob@x.com"]),
            group("groups/c", "C", &[]),
        ]);

        let carol = Email::parse("carol@x.com").unwrap();
        let names: Vec<_> = snapshot
            .eligible_groups(&carol)
            .into_iter()
            .map(|(_, name)| name)
            .collect();
        assert_eq!(names, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_membership_count_and_lookup() {
        let snapshot = DirectorySnapshot::new(vec![
            group("groups/g1", "G1", &["a@x.com", "b@x.com"]),
            group("groups/g2", "G2", &["c@x.com"]),
        ]);
        assert_eq!(snapshot.membership_count(), 3);
        assert_eq!(
            snapshot.group(&GroupId::new("groups/g2")).map(|g| g.display_name.as_str()),
            Some("G2")
        );
        assert!(snapshot.group(&GroupId::new("groups/missing")).is_none());
    }

    #[test]
    fn test_grant_expires_at() {
        let record = GrantRecord::new(MembershipId::new("m"), Expiration::SixHours);
        assert_eq!(record.expires_at() - record.enqueued_at, chrono::Duration::hours(6));
    }
}
