use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::turn::CanonicalTurn;
use crate::errors::DeliveryError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Standard,
    Ephemeral,
    InteractiveReplace,
    Update,
    Delete,
}

/// `response_type` for replies posted to a response URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseVisibility {
    InChannel,
    Ephemeral,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalOutboundMessage {
    pub conversation_id: String,
    pub thread_id: Option<String>,
    pub text: String,
    /// Opaque render blocks, forwarded in order.
    pub attachments: Vec<Value>,
    pub delivery_mode: DeliveryMode,
    pub target_user_id: Option<String>,
    pub existing_message_id: Option<String>,
    pub response_url: Option<String>,
    pub response_visibility: Option<ResponseVisibility>,
}

impl CanonicalOutboundMessage {
    pub fn new(
        conversation_id: impl Into<String>,
        text: impl Into<String>,
        delivery_mode: DeliveryMode,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            thread_id: None,
            text: text.into(),
            attachments: Vec::new(),
            delivery_mode,
            target_user_id: None,
            existing_message_id: None,
            response_url: None,
            response_visibility: None,
        }
    }

    /// A standard post into the turn's conversation.
    pub fn reply(turn: &CanonicalTurn, text: impl Into<String>) -> Self {
        Self::new(turn.conversation_id.clone(), text, DeliveryMode::Standard)
    }

    /// A standard post threaded under the originating message.
    pub fn reply_in_thread(turn: &CanonicalTurn, text: impl Into<String>) -> Self {
        let mut message = Self::reply(turn, text);
        message.thread_id = turn.reply_thread();
        message
    }

    /// Visible only to the sender of the turn.
    pub fn reply_ephemeral(turn: &CanonicalTurn, text: impl Into<String>) -> Self {
        let mut message = Self::new(turn.conversation_id.clone(), text, DeliveryMode::Ephemeral);
        message.target_user_id = Some(turn.sender_id.clone());
        message.thread_id = turn.thread_id.clone();
        message
    }

    /// Replaces the originating interactive message through its response URL.
    pub fn reply_interactive(turn: &CanonicalTurn, text: impl Into<String>) -> Self {
        let mut message =
            Self::new(turn.conversation_id.clone(), text, DeliveryMode::InteractiveReplace);
        message.target_user_id = Some(turn.sender_id.clone());
        message.thread_id = turn.thread_id.clone();
        message.response_url = turn.response_url.clone();
        message
    }

    /// Response-URL reply to a slash command, shown to the whole channel.
    pub fn reply_public(turn: &CanonicalTurn, text: impl Into<String>) -> Self {
        let mut message = Self::reply_interactive(turn, text);
        message.response_visibility = Some(ResponseVisibility::InChannel);
        message
    }

    /// Response-URL reply to a slash command, shown only to the invoking user.
    pub fn reply_private(turn: &CanonicalTurn, text: impl Into<String>) -> Self {
        let mut message = Self::reply_interactive(turn, text);
        message.response_visibility = Some(ResponseVisibility::Ephemeral);
        message
    }

    pub fn update(
        conversation_id: impl Into<String>,
        existing_message_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let mut message = Self::new(conversation_id, text, DeliveryMode::Update);
        message.existing_message_id = Some(existing_message_id.into());
        message
    }

    pub fn delete(
        conversation_id: impl Into<String>,
        existing_message_id: impl Into<String>,
    ) -> Self {
        let mut message = Self::new(conversation_id, "", DeliveryMode::Delete);
        message.existing_message_id = Some(existing_message_id.into());
        message
    }

    pub fn with_attachment(mut self, attachment: Value) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Checks the per-mode required fields before any wire call is attempted.
    pub fn validate(&self) -> Result<(), DeliveryError> {
        match self.delivery_mode {
            DeliveryMode::Standard => Ok(()),
            DeliveryMode::Ephemeral => {
                require(self.target_user_id.as_deref(), DeliveryError::MissingTargetUser)
            }
            DeliveryMode::InteractiveReplace => {
                require(self.target_user_id.as_deref(), DeliveryError::MissingTargetUser)?;
                require(self.response_url.as_deref(), DeliveryError::MissingResponseUrl)
            }
            DeliveryMode::Update | DeliveryMode::Delete => {
                require(self.existing_message_id.as_deref(), DeliveryError::MissingTargetMessage)
            }
        }
    }
}

fn require(value: Option<&str>, error: DeliveryError) -> Result<(), DeliveryError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(()),
        _ => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CanonicalOutboundMessage, DeliveryMode, ResponseVisibility};
    use crate::domain::turn::{CanonicalTurn, EventTag, TurnKind};
    use crate::errors::DeliveryError;

    fn slash_turn() -> CanonicalTurn {
        let mut turn =
            CanonicalTurn::new("T-TRIGGER", TurnKind::SlashCommand, EventTag::SlashCommand);
        turn.conversation_id = "C1".to_owned();
        turn.sender_id = "U1".to_owned();
        turn.response_url = Some("https://hooks.slack.com/commands/T1/1/abc".to_owned());
        turn
    }

    #[test]
    fn update_and_delete_require_existing_message() {
        let mut update = CanonicalOutboundMessage::update("C1", "1.0", "edited");
        assert_eq!(update.validate(), Ok(()));

        update.existing_message_id = Some(String::new());
        assert_eq!(update.validate(), Err(DeliveryError::MissingTargetMessage));

        let mut delete = CanonicalOutboundMessage::delete("C1", "1.0");
        delete.existing_message_id = None;
        assert_eq!(delete.validate(), Err(DeliveryError::MissingTargetMessage));
    }

    #[test]
    fn ephemeral_requires_target_user() {
        let message = CanonicalOutboundMessage::new("C1", "psst", DeliveryMode::Ephemeral);
        assert_eq!(message.validate(), Err(DeliveryError::MissingTargetUser));

        let turn = slash_turn();
        assert_eq!(CanonicalOutboundMessage::reply_ephemeral(&turn, "psst").validate(), Ok(()));
    }

    #[test]
    fn interactive_replace_requires_response_url() {
        let mut turn = slash_turn();
        let public = CanonicalOutboundMessage::reply_public(&turn, "done");
        assert_eq!(public.validate(), Ok(()));
        assert_eq!(public.response_visibility, Some(ResponseVisibility::InChannel));
        assert_eq!(public.target_user_id.as_deref(), Some("U1"));

        turn.response_url = None;
        let private = CanonicalOutboundMessage::reply_private(&turn, "done");
        assert_eq!(private.response_visibility, Some(ResponseVisibility::Ephemeral));
        assert_eq!(private.validate(), Err(DeliveryError::MissingResponseUrl));
    }

    #[test]
    fn attachments_keep_insertion_order() {
        let message = CanonicalOutboundMessage::new("C1", "cards", DeliveryMode::Standard)
            .with_attachment(json!({ "title": "first" }))
            .with_attachment(json!({ "title": "second" }));

        assert_eq!(message.attachments[0]["title"], "first");
        assert_eq!(message.attachments[1]["title"], "second");
    }
}
