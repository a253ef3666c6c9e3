//! Slack callback handlers.
//!
//! Both endpoints verify the request signature, parse the callback into an
//! [`InboundEvent`] and enqueue it. Slack is acknowledged right away; the
//! dispatcher does the actual work.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use gatekeeper_core::{ChannelId, UserId};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, instrument};

use crate::error::AppError;
use crate::services::{ActionEvent, InboundEvent};
use crate::slack::{CallbackEvent, EventEnvelope, InteractionPayload};
use crate::state::AppState;

const TIMESTAMP_HEADER: &str = "X-Slack-Request-Timestamp";
const SIGNATURE_HEADER: &str = "X-Slack-Signature";
const RETRY_HEADER: &str = "X-Slack-Retry-Num";

/// Create Slack webhook routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/slack/events", post(handle_event))
        .route("/slack/interactions", post(handle_interaction))
}

/// Handle an Events API callback.
#[instrument(skip(state, headers, body))]
async fn handle_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, AppError> {
    verify(&state, &headers, &body)?;

    let envelope: EventEnvelope = serde_json::from_str(&body)
        .map_err(|e| AppError::BadRequest(format!("Failed to parse event: {e}")))?;

    match envelope {
        EventEnvelope::UrlVerification { challenge } => {
            debug!("Answering URL verification");
            Ok(Json(serde_json::json!({ "challenge": challenge })).into_response())
        }
        EventEnvelope::EventCallback {
            event:
                CallbackEvent::AppMention {
                    user,
                    channel,
                    text,
                },
        } => {
            // Slack redelivers when we were slow; the first delivery was queued
            if headers.contains_key(RETRY_HEADER) {
                debug!("Ignoring redelivered mention");
                return Ok(StatusCode::OK.into_response());
            }
            enqueue(
                &state,
                InboundEvent::Mention {
                    user: UserId::new(user),
                    channel: ChannelId::new(channel),
                    text,
                },
            )?;
            Ok(StatusCode::OK.into_response())
        }
        EventEnvelope::EventCallback {
            event: CallbackEvent::Other,
        }
        | EventEnvelope::Other => Ok(StatusCode::OK.into_response()),
    }
}

/// Handle an interactivity callback (button clicks, select changes).
#[instrument(skip(state, headers, body))]
async fn handle_interaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, AppError> {
    verify(&state, &headers, &body)?;

    let payload = decode_form_payload(&body)?;
    let payload: InteractionPayload = serde_json::from_str(&payload)
        .map_err(|e| AppError::BadRequest(format!("Failed to parse payload: {e}")))?;

    if payload.interaction_type != "block_actions" {
        debug!(interaction_type = %payload.interaction_type, "Ignoring interaction");
        return Ok(StatusCode::OK);
    }

    enqueue(&state, InboundEvent::Action(ActionEvent::try_from(payload)?))?;
    Ok(StatusCode::OK)
}

/// Check the signature headers against the raw body.
fn verify(state: &AppState, headers: &HeaderMap, body: &str) -> Result<(), AppError> {
    let timestamp = headers
        .get(TIMESTAMP_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing timestamp header".into()))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing signature header".into()))?;

    state.verifier().verify(timestamp, body, signature)?;
    debug!("Slack signature verified");
    Ok(())
}

/// Extract the JSON document from a `payload=...` form body.
fn decode_form_payload(body: &str) -> Result<String, AppError> {
    let encoded = body
        .split('&')
        .find_map(|pair| pair.strip_prefix("payload="))
        .ok_or_else(|| AppError::BadRequest("Invalid payload format".into()))?;

    // Form encoding turns spaces into '+'; a literal plus arrives as %2B
    let encoded = encoded.replace('+', "%20");
    urlencoding::decode(&encoded)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| AppError::BadRequest(format!("Failed to decode payload: {e}")))
}

fn enqueue(state: &AppState, event: InboundEvent) -> Result<(), AppError> {
    state.events().try_send(event).map_err(|e| match e {
        TrySendError::Full(_) => AppError::Unavailable("Event queue is full".into()),
        TrySendError::Closed(_) => AppError::Unavailable("Event queue is closed".into()),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_form_payload() {
        let body = "payload=%7B%22type%22%3A%22block_actions%22%2C%22text%22%3A%22a+b%2Bc%22%7D";
        assert_eq!(
            decode_form_payload(body).unwrap(),
            r#"{"type":"block_actions","text":"a b+c"}"#
        );
    }

    #[test]
    fn test_decode_form_payload_finds_field_among_others() {
        let body = "team=T1&payload=%7B%7D";
        assert_eq!(decode_form_payload(body).unwrap(), "{}");
    }

    #[test]
    fn test_decode_form_payload_requires_payload_field() {
        assert!(matches!(
            decode_form_payload("token=abc"),
            Err(AppError::BadRequest(_))
        ));
    }
}
