//! Cloud Identity REST client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gatekeeper_core::{Email, GroupId, Membership, MembershipId, MembershipRole, OperationName};
use gcp_auth::TokenProvider;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::error::DirectoryError;
use super::types::{
    CreateMembershipRequest, EntityKey, ErrorEnvelope, GroupPage, GroupResource, MembershipPage,
    Operation, RoleResource,
};
use super::Directory;

/// Cloud Identity API base URL.
const CLOUD_IDENTITY_BASE: &str = "https://cloudidentity.googleapis.com/v1beta1";

/// OAuth scope for reading and editing groups.
const GROUPS_SCOPE: &str = "https://www.googleapis.com/auth/cloud-identity.groups";

/// Cloud Identity client authenticated with application default credentials.
#[derive(Clone)]
pub struct CloudIdentityClient {
    client: Client,
    token_provider: Arc<dyn TokenProvider>,
    base_url: String,
}

// TokenProvider doesn't implement Debug
impl std::fmt::Debug for CloudIdentityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudIdentityClient")
            .field("token_provider", &"<TokenProvider>")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl CloudIdentityClient {
    /// Discover credentials from the environment and build a client.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Auth`] if no credentials are available.
    pub async fn from_environment() -> Result<Self, DirectoryError> {
        let token_provider = gcp_auth::provider()
            .await
            .map_err(|e| DirectoryError::Auth(format!("Failed to initialize GCP auth: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DirectoryError::Request(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            token_provider,
            base_url: CLOUD_IDENTITY_BASE.to_string(),
        })
    }

    async fn access_token(&self) -> Result<String, DirectoryError> {
        let token = self
            .token_provider
            .token(&[GROUPS_SCOPE])
            .await
            .map_err(|e| DirectoryError::Auth(format!("Failed to get GCP access token: {e}")))?;
        Ok(token.as_str().to_string())
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, DirectoryError> {
        let token = self.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;
        decode(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, DirectoryError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| DirectoryError::Request(e.to_string()))?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        return Err(DirectoryError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(serde_json::from_str(&body)?)
}

#[async_trait]
impl Directory for CloudIdentityClient {
    #[instrument(skip(self))]
    async fn list_groups(&self, parent: &str) -> Result<Vec<GroupResource>, DirectoryError> {
        let mut groups = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(self.url("groups"))
                .query(&[("parent", parent)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: GroupPage = self.send(request).await?;
            groups.extend(page.groups);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = groups.len(), "Listed groups");
        Ok(groups)
    }

    #[instrument(skip(self), fields(group = %group))]
    async fn list_memberships(&self, group: &GroupId) -> Result<Vec<Membership>, DirectoryError> {
        let mut memberships = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(self.url(&format!("{group}/memberships")));
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: MembershipPage = self.send(request).await?;
            memberships.extend(page.memberships.into_iter().map(Membership::from));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(memberships)
    }

    #[instrument(skip(self, member, roles), fields(group = %group))]
    async fn create_membership(
        &self,
        group: &GroupId,
        member: &Email,
        roles: &[MembershipRole],
    ) -> Result<Operation, DirectoryError> {
        let body = CreateMembershipRequest {
            preferred_member_key: EntityKey {
                id: member.to_string(),
            },
            roles: roles
                .iter()
                .map(|r| RoleResource {
                    name: r.name.clone(),
                })
                .collect(),
        };

        let request = self
            .client
            .post(self.url(&format!("{group}/memberships")))
            .json(&body);
        self.send(request).await
    }

    #[instrument(skip(self), fields(membership = %membership))]
    async fn delete_membership(
        &self,
        membership: &MembershipId,
    ) -> Result<Operation, DirectoryError> {
        let request = self.client.delete(self.url(membership.as_str()));
        self.send(request).await
    }

    #[instrument(skip(self), fields(operation = %name))]
    async fn get_operation(&self, name: &OperationName) -> Result<Operation, DirectoryError> {
        let request = self.client.get(self.url(name.as_str()));
        self.send(request).await
    }
}
