//! Translates [`CanonicalOutboundMessage`] into Web API calls.
//!
//! | delivery mode        | wire call                              |
//! |----------------------|----------------------------------------|
//! | `Standard`           | `chat.postMessage`                     |
//! | `Ephemeral`          | `chat.postEphemeral`                   |
//! | `InteractiveReplace` | POST to the turn's response URL        |
//! | `Update`             | `chat.update`                          |
//! | `Delete`             | `chat.delete`                          |
//!
//! Required fields are validated before any network call, and a cancelled
//! turn never issues a write.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use turnwire_core::{CanonicalOutboundMessage, DeliveryError, DeliveryMode};

use crate::{
    api::{
        ApiError, ApiResponse, DeleteRequest, OpenDialogRequest, PostEphemeralRequest,
        PostMessageRequest, ResponseUrlBody, ResponseUrlPoster, UpdateRequest,
    },
    credentials::CredentialHandle,
    dialog::SlackDialog,
};

/// The wire call a message maps to.
#[derive(Clone, Debug, PartialEq)]
pub enum WireRequest {
    PostMessage(PostMessageRequest),
    PostEphemeral(PostEphemeralRequest),
    ResponseUrl { url: String, body: ResponseUrlBody },
    Update(UpdateRequest),
    Delete(DeleteRequest),
}

impl WireRequest {
    pub fn method(&self) -> &'static str {
        match self {
            Self::PostMessage(_) => "chat.postMessage",
            Self::PostEphemeral(_) => "chat.postEphemeral",
            Self::ResponseUrl { .. } => "response_url",
            Self::Update(_) => "chat.update",
            Self::Delete(_) => "chat.delete",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryResult {
    /// Platform id of the written message. Response-URL posts report none.
    pub message_id: Option<String>,
    pub conversation_id: String,
    pub ts: Option<String>,
}

pub struct OutboundFormatter {
    response_url: Arc<dyn ResponseUrlPoster>,
}

impl OutboundFormatter {
    pub fn new(response_url: Arc<dyn ResponseUrlPoster>) -> Self {
        Self { response_url }
    }

    /// Validates the message and picks its wire call without sending anything.
    pub fn format(message: &CanonicalOutboundMessage) -> Result<WireRequest, DeliveryError> {
        message.validate()?;

        let channel = message.conversation_id.clone();
        let text = message.text.clone();
        let attachments = message.attachments.clone();
        let request = match message.delivery_mode {
            DeliveryMode::Standard => WireRequest::PostMessage(PostMessageRequest {
                channel,
                text,
                attachments,
                thread_ts: message.thread_id.clone(),
            }),
            DeliveryMode::Ephemeral => WireRequest::PostEphemeral(PostEphemeralRequest {
                channel,
                user: required(
                    message.target_user_id.as_deref(),
                    DeliveryError::MissingTargetUser,
                )?,
                text,
                attachments,
                thread_ts: message.thread_id.clone(),
            }),
            DeliveryMode::InteractiveReplace => WireRequest::ResponseUrl {
                url: required(message.response_url.as_deref(), DeliveryError::MissingResponseUrl)?,
                body: ResponseUrlBody {
                    text,
                    attachments,
                    response_type: message.response_visibility,
                    // Visibility set means a slash-command reply, which adds a
                    // message instead of replacing one.
                    replace_original: message.response_visibility.is_none(),
                    thread_ts: message.thread_id.clone(),
                },
            },
            DeliveryMode::Update => WireRequest::Update(UpdateRequest {
                channel,
                ts: existing_message(message)?,
                text,
                attachments,
            }),
            DeliveryMode::Delete => WireRequest::Delete(DeleteRequest {
                channel,
                ts: existing_message(message)?,
            }),
        };
        Ok(request)
    }

    pub async fn dispatch(
        &self,
        message: &CanonicalOutboundMessage,
        credential: &CredentialHandle,
    ) -> Result<DeliveryResult, DeliveryError> {
        self.dispatch_until_cancelled(message, credential, &CancellationToken::new()).await
    }

    /// Sends one message. The token is checked after validation and right
    /// before the wire call.
    pub async fn dispatch_until_cancelled(
        &self,
        message: &CanonicalOutboundMessage,
        credential: &CredentialHandle,
        cancel: &CancellationToken,
    ) -> Result<DeliveryResult, DeliveryError> {
        let request = Self::format(message)?;
        if cancel.is_cancelled() {
            debug!(
                event_name = "egress.slack.cancelled",
                method = request.method(),
                conversation_id = %message.conversation_id,
                "skipping delivery for cancelled turn"
            );
            return Err(DeliveryError::Cancelled);
        }

        let method = request.method();
        let result = self.send(request, credential, &message.conversation_id).await;
        match &result {
            Ok(delivered) => debug!(
                event_name = "egress.slack.delivered",
                method,
                conversation_id = %delivered.conversation_id,
                message_id = delivered.message_id.as_deref().unwrap_or("none"),
                "outbound message delivered"
            ),
            Err(error) => warn!(
                event_name = "egress.slack.failed",
                method,
                conversation_id = %message.conversation_id,
                error = %error,
                "outbound message failed"
            ),
        }
        result
    }

    async fn send(
        &self,
        request: WireRequest,
        credential: &CredentialHandle,
        conversation_id: &str,
    ) -> Result<DeliveryResult, DeliveryError> {
        let client = credential.client();
        match request {
            WireRequest::PostMessage(request) => {
                let response = client.post_message(&request).await.map_err(delivery_error)?;
                accepted(response, request.channel, false)
            }
            WireRequest::PostEphemeral(request) => {
                let response = client.post_ephemeral(&request).await.map_err(delivery_error)?;
                accepted(response, request.channel, true)
            }
            WireRequest::Update(request) => {
                let response = client.update(&request).await.map_err(delivery_error)?;
                accepted(response, request.channel, false)
            }
            WireRequest::Delete(request) => {
                let response = client.delete(&request).await.map_err(delivery_error)?;
                accepted(response, request.channel, false)
            }
            WireRequest::ResponseUrl { url, body } => {
                self.response_url.post(&url, &body).await.map_err(delivery_error)?;
                Ok(DeliveryResult {
                    conversation_id: conversation_id.to_owned(),
                    ..DeliveryResult::default()
                })
            }
        }
    }

    pub async fn open_dialog(
        &self,
        trigger_id: Option<&str>,
        dialog: &SlackDialog,
        credential: &CredentialHandle,
        cancel: &CancellationToken,
    ) -> Result<(), DeliveryError> {
        let trigger_id = required(trigger_id, DeliveryError::MissingTriggerId)?;
        if cancel.is_cancelled() {
            return Err(DeliveryError::Cancelled);
        }

        let request = OpenDialogRequest { trigger_id, dialog: dialog.to_value() };
        let response = credential.client().open_dialog(&request).await.map_err(delivery_error)?;
        if !response.ok {
            return Err(remote_rejected(response.error));
        }
        debug!(
            event_name = "egress.slack.dialog_opened",
            callback_id = dialog.callback_id(),
            "dialog opened"
        );
        Ok(())
    }
}

fn existing_message(message: &CanonicalOutboundMessage) -> Result<String, DeliveryError> {
    required(message.existing_message_id.as_deref(), DeliveryError::MissingTargetMessage)
}

fn required(value: Option<&str>, error: DeliveryError) -> Result<String, DeliveryError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value.to_owned()),
        _ => Err(error),
    }
}

fn accepted(
    response: ApiResponse,
    requested_channel: String,
    ephemeral: bool,
) -> Result<DeliveryResult, DeliveryError> {
    if !response.ok {
        return Err(remote_rejected(response.error));
    }
    let ts = if ephemeral { response.message_ts.or(response.ts) } else { response.ts };
    Ok(DeliveryResult {
        message_id: ts.clone(),
        conversation_id: response.channel.unwrap_or(requested_channel),
        ts,
    })
}

fn remote_rejected(error: Option<String>) -> DeliveryError {
    DeliveryError::RemoteRejected(error.unwrap_or_else(|| "unknown_error".to_owned()))
}

fn delivery_error(error: ApiError) -> DeliveryError {
    match error {
        ApiError::Status(status) => DeliveryError::RemoteRejected(format!("http_{status}")),
        other => DeliveryError::Transport(other.to_string()),
    }
}
