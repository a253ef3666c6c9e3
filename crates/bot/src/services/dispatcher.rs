//! Inbound event dispatcher.
//!
//! HTTP handlers only verify and parse Slack callbacks; they push an
//! [`InboundEvent`] onto one ordered channel. A single [`Dispatcher`] task
//! consumes it and applies each transition in arrival order.

use gatekeeper_core::{ChannelId, Expiration, GroupId, UserId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::workflow::{Interaction, WorkflowError, WorkflowService};
use crate::slack::messages::{ADD_USER_BLOCK_ID, action};
use crate::slack::{InteractionPayload, SlackError};

/// Capacity of the inbound event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Create the inbound event queue.
#[must_use]
pub fn event_channel() -> (mpsc::Sender<InboundEvent>, mpsc::Receiver<InboundEvent>) {
    mpsc::channel(EVENT_QUEUE_CAPACITY)
}

/// A parsed Slack callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// The bot was mentioned.
    Mention {
        user: UserId,
        channel: ChannelId,
        text: String,
    },
    /// A button was clicked or a select changed.
    Action(ActionEvent),
}

/// Current values of the request prompt's inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selections {
    pub user: Option<UserId>,
    pub group: Option<(GroupId, String)>,
    pub expiration: Option<Expiration>,
}

/// The routed action of a `block_actions` callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEvent {
    pub action_id: String,
    /// Button value: a request ID or an encoded approval payload.
    pub value: String,
    pub interaction: Interaction,
    pub selections: Selections,
}

impl TryFrom<InteractionPayload> for ActionEvent {
    type Error = SlackError;

    /// Only the last action is kept; it is the element the user just touched.
    fn try_from(payload: InteractionPayload) -> Result<Self, Self::Error> {
        let action = payload
            .actions
            .last()
            .ok_or_else(|| SlackError::InvalidPayload("No actions in payload".into()))?;

        let channel = payload
            .channel
            .as_ref()
            .map(|c| c.id.clone())
            .or_else(|| payload.container.as_ref().and_then(|c| c.channel_id.clone()))
            .ok_or_else(|| SlackError::InvalidPayload("No channel in payload".into()))?;

        let response_url = payload
            .response_url
            .clone()
            .ok_or_else(|| SlackError::InvalidPayload("No response_url in payload".into()))?;

        let selections = payload
            .state
            .as_ref()
            .map(|state| {
                let selected = |action_id| {
                    state
                        .value(ADD_USER_BLOCK_ID, action_id)
                        .and_then(|v| v.selected_option.as_ref())
                };
                Selections {
                    user: state
                        .value(ADD_USER_BLOCK_ID, action::SELECT_USER)
                        .and_then(|v| v.selected_user.clone())
                        .map(UserId::from),
                    group: selected(action::SELECT_GROUP)
                        .map(|o| (GroupId::new(o.value.clone()), o.text.text.clone())),
                    expiration: selected(action::SELECT_EXPIRATION)
                        .and_then(|o| Expiration::parse(&o.value).ok()),
                }
            })
            .unwrap_or_default();

        Ok(Self {
            action_id: action.action_id.clone(),
            value: action.value.clone().unwrap_or_default(),
            interaction: Interaction {
                actor: UserId::new(payload.user.id.clone()),
                channel: ChannelId::new(channel),
                response_url,
            },
            selections,
        })
    }
}

/// Command recognized in a mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    AddMember,
    Unknown,
}

/// Parse mention text such as `<@U0BOT> add member`.
///
/// Leading user mentions are skipped; the next two tokens are significant.
#[must_use]
pub fn parse_command(text: &str) -> Command {
    let mut tokens = text.split_whitespace().skip_while(|t| t.starts_with("<@"));
    match (tokens.next(), tokens.next()) {
        (Some(verb), Some(noun))
            if verb.eq_ignore_ascii_case("add") && noun.eq_ignore_ascii_case("member") =>
        {
            Command::AddMember
        }
        _ => Command::Unknown,
    }
}

/// Consumes the inbound event queue.
#[derive(Debug)]
pub struct Dispatcher {
    workflow: WorkflowService,
    events: mpsc::Receiver<InboundEvent>,
}

impl Dispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub const fn new(workflow: WorkflowService, events: mpsc::Receiver<InboundEvent>) -> Self {
        Self { workflow, events }
    }

    /// Process events until every sender is dropped.
    pub async fn run(mut self) {
        info!("Event dispatcher started");
        while let Some(event) = self.events.recv().await {
            // Completions run detached; nothing to wait for here
            let _ = self.dispatch(event).await;
        }
        info!("Event dispatcher stopped");
    }

    /// Apply one event.
    ///
    /// Returns the handle of the detached approval completion, if one was
    /// started.
    #[instrument(skip(self, event))]
    pub async fn dispatch(&self, event: InboundEvent) -> Option<JoinHandle<()>> {
        match event {
            InboundEvent::Mention {
                user,
                channel,
                text,
            } => {
                let result = match parse_command(&text) {
                    Command::AddMember => self.workflow.start(user, channel).await.map(|_| ()),
                    Command::Unknown => {
                        debug!(text = %text, "Unrecognized command");
                        self.workflow.send_usage_hint(&user, &channel).await
                    }
                };
                log_outcome("mention", result);
                None
            }
            InboundEvent::Action(event) => self.dispatch_action(event).await,
        }
    }

    async fn dispatch_action(&self, event: ActionEvent) -> Option<JoinHandle<()>> {
        let ActionEvent {
            action_id,
            value,
            interaction,
            selections,
        } = event;
        let workflow = &self.workflow;

        let result = match action_id.as_str() {
            action::SUBMIT_SELECTING_USER => {
                workflow
                    .submit_nominee(&value, &interaction, selections.user)
                    .await
            }
            action::SUBMIT_ADDING_USER => {
                workflow
                    .submit_group_and_expiration(
                        &value,
                        &interaction,
                        selections.group,
                        selections.expiration,
                    )
                    .await
            }
            action::ALLOW_ADDING_USER => match workflow.approve(&value, &interaction).await {
                Ok(claim) => {
                    let workflow = workflow.clone();
                    return Some(tokio::spawn(async move {
                        log_outcome(
                            action::ALLOW_ADDING_USER,
                            workflow.complete_approval(claim).await.map(|_| ()),
                        );
                    }));
                }
                Err(e) => Err(e),
            },
            action::DENY_ADDING_USER => workflow.deny(&value, &interaction).await,
            action::CANCEL => workflow.cancel(&value, &interaction).await,
            action::SELECT_USER | action::SELECT_GROUP | action::SELECT_EXPIRATION => Ok(()),
            other => {
                warn!(action_id = %other, "Ignoring unknown action");
                Ok(())
            }
        };

        log_outcome(&action_id, result);
        None
    }
}

fn log_outcome(action: &str, result: Result<(), WorkflowError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_user_error() => info!(action, error = %e, "Action rejected"),
        Err(e @ (WorkflowError::Decode(_) | WorkflowError::Mismatch(_))) => {
            warn!(action, error = %e, "Discarded invalid request");
        }
        Err(e) => error!(action, error = %e, "Action failed"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("<@U0BOT> add member"), Command::AddMember);
        assert_eq!(parse_command("  <@U0BOT>   add   member  please"), Command::AddMember);
        assert_eq!(parse_command("<@U0BOT> Add Member"), Command::AddMember);
        assert_eq!(parse_command("<@U0BOT> remove member"), Command::Unknown);
        assert_eq!(parse_command("<@U0BOT> add"), Command::Unknown);
        assert_eq!(parse_command("<@U0BOT>"), Command::Unknown);
        assert_eq!(parse_command(""), Command::Unknown);
    }

    fn payload(json: &str) -> InteractionPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_action_event_uses_last_action_and_state() {
        let event = ActionEvent::try_from(payload(
            r#"{
                "type": "block_actions",
                "user": {"id": "U_REQ"},
                "channel": {"id": "C1"},
                "response_url": "https://hooks.slack.com/actions/1",
                "actions": [
                    {"action_id": "select-group", "type": "static_select"},
                    {"action_id": "submit-adding-user", "type": "button", "value": "req-1"}
                ],
                "state": {"values": {"add-user": {
                    "select-group": {"type": "static_select", "selected_option": {"value": "groups/g2", "text": {"type": "plain_text", "text": "G2"}}},
                    "select-expiration": {"type": "static_select", "selected_option": {"value": "6", "text": {"type": "plain_text", "text": "6h"}}}
                }}}
            }"#,
        ))
        .unwrap();

        assert_eq!(event.action_id, "submit-adding-user");
        assert_eq!(event.value, "req-1");
        assert_eq!(event.interaction.actor.as_str(), "U_REQ");
        assert_eq!(event.interaction.channel.as_str(), "C1");
        assert_eq!(
            event.selections.group,
            Some((GroupId::new("groups/g2"), "G2".to_string()))
        );
        assert_eq!(event.selections.expiration, Some(Expiration::SixHours));
        assert!(event.selections.user.is_none());
    }

    #[test]
    fn test_action_event_falls_back_to_container_channel() {
        let event = ActionEvent::try_from(payload(
            r#"{
                "type": "block_actions",
                "user": {"id": "U_REQ"},
                "container": {"type": "message", "channel_id": "C9"},
                "response_url": "https://hooks.slack.com/actions/1",
                "actions": [{"action_id": "cancel", "type": "button", "value": "r"}]
            }"#,
        ))
        .unwrap();
        assert_eq!(event.interaction.channel.as_str(), "C9");
        assert_eq!(event.selections, Selections::default());
    }

    #[test]
    fn test_action_event_rejects_incomplete_payloads() {
        let no_actions = payload(
            r#"{"type": "block_actions", "user": {"id": "U"}, "channel": {"id": "C"}, "response_url": "u", "actions": []}"#,
        );
        assert!(matches!(
            ActionEvent::try_from(no_actions),
            Err(SlackError::InvalidPayload(_))
        ));

        let no_url = payload(
            r#"{"type": "block_actions", "user": {"id": "U"}, "channel": {"id": "C"}, "actions": [{"action_id": "cancel", "type": "button"}]}"#,
        );
        assert!(ActionEvent::try_from(no_url).is_err());
    }

    #[test]
    fn test_unknown_expiration_is_treated_as_missing() {
        let event = ActionEvent::try_from(payload(
            r#"{
                "type": "block_actions",
                "user": {"id": "U"},
                "channel": {"id": "C"},
                "response_url": "u",
                "actions": [{"action_id": "submit-adding-user", "type": "button", "value": "r"}],
                "state": {"values": {"add-user": {
                    "select-expiration": {"type": "static_select", "selected_option": {"value": "48", "text": {"type": "plain_text", "text": "48h"}}}
                }}}
            }"#,
        ))
        .unwrap();
        assert!(event.selections.expiration.is_none());
    }
}
