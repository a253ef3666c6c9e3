//! Cloud Identity REST resources.
//!
//! Only the fields the bot reads are modelled. Unknown fields are ignored.
//!
//! See: <https://cloud.google.com/identity/docs/reference/rest/v1beta1/groups>

use gatekeeper_core::{GroupId, Membership, MembershipId, MembershipRole};
use serde::{Deserialize, Serialize};

/// A group as returned by `groups.list`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResource {
    /// Resource name, `groups/{id}`.
    pub name: GroupId,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl GroupResource {
    /// Name to show in selection menus.
    #[must_use]
    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.name.to_string())
    }
}

/// Identifier of a member entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityKey {
    pub id: String,
}

/// Role entry on a membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleResource {
    pub name: String,
}

/// A membership as returned by `memberships.list` and operation results.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipResource {
    /// Resource name, `groups/{id}/memberships/{id}`.
    pub name: MembershipId,
    #[serde(default)]
    pub preferred_member_key: Option<EntityKey>,
    #[serde(default)]
    pub member_key: Option<EntityKey>,
    #[serde(default)]
    pub roles: Vec<RoleResource>,
}

impl From<MembershipResource> for Membership {
    fn from(resource: MembershipResource) -> Self {
        let member_key = resource
            .preferred_member_key
            .or(resource.member_key)
            .map(|k| k.id)
            .unwrap_or_default();
        Self {
            id: resource.name,
            member_key,
            roles: resource
                .roles
                .into_iter()
                .map(|r| MembershipRole { name: r.name })
                .collect(),
            created_by: None,
        }
    }
}

/// Body of `memberships.create`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMembershipRequest {
    pub preferred_member_key: EntityKey,
    pub roles: Vec<RoleResource>,
}

/// A long-running operation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Operation {
    /// Operation resource name. Empty when the call completed inline.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    /// Result on success.
    #[serde(default)]
    pub response: Option<serde_json::Value>,
    /// Status on failure.
    #[serde(default)]
    pub error: Option<OperationStatus>,
}

/// Error status of a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OperationStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// One page of `groups.list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPage {
    #[serde(default)]
    pub groups: Vec<GroupResource>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// One page of `memberships.list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipPage {
    #[serde(default)]
    pub memberships: Vec<MembershipResource>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Google API error envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: OperationStatus,
}
