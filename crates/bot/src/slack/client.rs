//! Slack Web API client.
//!
//! Provides methods for posting channel and ephemeral messages, answering
//! interactions via their response URL, and the user lookups the approval
//! flow needs.

use async_trait::async_trait;
use gatekeeper_core::{ChannelId, Email, UserGroupId, UserId};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, error, instrument, warn};

use super::error::SlackError;
use super::transport::{ChatTransport, ResponseAction};
use super::types::{ApiResponse, Message, UserGroupUsersResponse, UserInfoResponse};

/// Slack Web API base URL.
const SLACK_API_BASE: &str = "https://slack.com/api";

/// Slack API client.
#[derive(Clone)]
pub struct SlackClient {
    /// HTTP client.
    client: Client,
    /// Bot token for authentication.
    bot_token: SecretString,
    /// Web API base URL.
    base_url: String,
}

impl std::fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackClient")
            .field("bot_token", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    #[serde(flatten)]
    message: &'a Message,
}

#[derive(Serialize)]
struct ResponseMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    replace_original: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delete_original: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_type: Option<&'static str>,
    #[serde(flatten)]
    message: Option<&'a Message>,
}

impl<'a> ResponseMessage<'a> {
    fn from_response(response: &'a ResponseAction) -> Self {
        match response {
            ResponseAction::Replace(message) => Self {
                replace_original: Some(true),
                delete_original: None,
                response_type: None,
                message: Some(message),
            },
            ResponseAction::Delete => Self {
                replace_original: None,
                delete_original: Some(true),
                response_type: None,
                message: None,
            },
            ResponseAction::Ephemeral(message) => Self {
                replace_original: Some(false),
                delete_original: None,
                response_type: Some("ephemeral"),
                message: Some(message),
            },
        }
    }
}

impl SlackClient {
    /// Create a new Slack client.
    #[must_use]
    pub fn new(bot_token: SecretString) -> Self {
        Self::with_base_url(bot_token, SLACK_API_BASE)
    }

    /// Create a client against a different API base (used by tests).
    #[must_use]
    pub fn with_base_url(bot_token: SecretString, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            bot_token,
            base_url: base_url.into(),
        }
    }

    async fn call_api<T: Serialize + Sync>(
        &self,
        method: &str,
        body: &T,
    ) -> Result<ApiResponse, SlackError> {
        let response = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(self.bot_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| SlackError::Request(e.to_string()))?;

        let result: ApiResponse = response
            .json()
            .await
            .map_err(|e| SlackError::Response(e.to_string()))?;

        if !result.ok {
            error!(method, error = ?result.error, "Slack API error");
            return Err(SlackError::Api(
                result.error.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }

        Ok(result)
    }
}

#[async_trait]
impl ChatTransport for SlackClient {
    #[instrument(skip(self, message), fields(channel = %channel))]
    async fn post_message(&self, channel: &ChannelId, message: Message) -> Result<(), SlackError> {
        let body = PostMessage {
            channel: channel.as_str(),
            user: None,
            message: &message,
        };
        self.call_api("chat.postMessage", &body).await?;
        debug!("Message posted to Slack");
        Ok(())
    }

    #[instrument(skip(self, message), fields(channel = %channel, user = %user))]
    async fn post_ephemeral(
        &self,
        channel: &ChannelId,
        user: &UserId,
        message: Message,
    ) -> Result<(), SlackError> {
        let body = PostMessage {
            channel: channel.as_str(),
            user: Some(user.as_str()),
            message: &message,
        };
        self.call_api("chat.postEphemeral", &body).await?;
        debug!("Ephemeral message posted to Slack");
        Ok(())
    }

    #[instrument(skip(self, response_url, response))]
    async fn respond(&self, response_url: &str, response: ResponseAction) -> Result<(), SlackError> {
        let message = ResponseMessage::from_response(&response);

        let response = self
            .client
            .post(response_url)
            .json(&message)
            .send()
            .await
            .map_err(|e| SlackError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SlackError::Response(format!(
                "Response URL returned {status}: {body}"
            )));
        }

        debug!("Responded to Slack response_url");
        Ok(())
    }

    #[instrument(skip(self), fields(user = %user))]
    async fn user_email(&self, user: &UserId) -> Result<Option<Email>, SlackError> {
        let result: UserInfoResponse = self
            .client
            .get(format!("{}/users.info", self.base_url))
            .bearer_auth(self.bot_token.expose_secret())
            .query(&[("user", user.as_str())])
            .send()
            .await
            .map_err(|e| SlackError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| SlackError::Response(e.to_string()))?;

        if !result.ok {
            return Err(SlackError::Api(
                result.error.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }

        let email = result
            .user
            .and_then(|u| u.profile.email)
            .and_then(|raw| match Email::parse(&raw) {
                Ok(email) => Some(email),
                Err(e) => {
                    warn!(error = %e, "User profile email is not usable");
                    None
                }
            });

        Ok(email)
    }

    #[instrument(skip(self), fields(usergroup = %group))]
    async fn usergroup_members(&self, group: &UserGroupId) -> Result<Vec<UserId>, SlackError> {
        let result: UserGroupUsersResponse = self
            .client
            .get(format!("{}/usergroups.users.list", self.base_url))
            .bearer_auth(self.bot_token.expose_secret())
            .query(&[("usergroup", group.as_str())])
            .send()
            .await
            .map_err(|e| SlackError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| SlackError::Response(e.to_string()))?;

        if !result.ok {
            return Err(SlackError::Api(
                result.error.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }

        Ok(result.users.into_iter().map(UserId::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slack::types::AttachmentColor;

    #[test]
    fn test_debug_redacts_token() {
        let client = SlackClient::new(SecretString::from("xoxb-secret".to_string()));
        let debug = format!("{client:?}");
        assert!(!debug.contains("xoxb-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_response_message_shapes() {
        let delete = ResponseAction::Delete;
        let json = serde_json::to_value(ResponseMessage::from_response(&delete)).expect("json");
        assert_eq!(json, serde_json::json!({"delete_original": true}));

        let ephemeral = ResponseAction::Ephemeral(Message::notice("nope", AttachmentColor::Danger));
        let json = serde_json::to_value(ResponseMessage::from_response(&ephemeral)).expect("json");
        assert_eq!(json["response_type"], "ephemeral");
        assert_eq!(json["replace_original"], false);
        assert_eq!(json["attachments"][0]["text"], "nope");

        let replace = ResponseAction::Replace(Message::default().with_text("hi"));
        let json = serde_json::to_value(ResponseMessage::from_response(&replace)).expect("json");
        assert_eq!(json["replace_original"], true);
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn test_post_message_flattens_content() {
        let message = Message::default().with_text("hello");
        let body = PostMessage {
            channel: "C1",
            user: Some("U1"),
            message: &message,
        };
        let json = serde_json::to_value(&body).expect("json");
        assert_eq!(json["channel"], "C1");
        assert_eq!(json["user"], "U1");
        assert_eq!(json["text"], "hello");
    }
}
