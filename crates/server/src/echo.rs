use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;
use turnwire_core::{
    CanonicalOutboundMessage, DeliveryError, DialogFieldError, EventTag, ResponseScratchpad,
};
use turnwire_slack::{
    dialog::{SlackDialog, TextElement, TextSubtype},
    BotError, BotLogic, TurnContext,
};

pub const FEEDBACK_CALLBACK_ID: &str = "echo-feedback";

/// Echoes messages addressed to it, answers slash commands through their
/// response URL and demonstrates a dialog round trip.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoBot;

#[async_trait]
impl BotLogic for EchoBot {
    async fn on_turn(
        &self,
        ctx: &TurnContext,
        scratchpad: &mut ResponseScratchpad,
    ) -> Result<(), BotError> {
        let turn = ctx.turn();
        let text = turn.text.as_deref().unwrap_or_default().trim();

        match &turn.tag {
            EventTag::SlashCommand if text == "feedback" => {
                let dialog = SlackDialog::new("Feedback", FEEDBACK_CALLBACK_ID, "Send")
                    .text(TextElement::new("Email", "email").subtype(TextSubtype::Email))
                    .textarea(TextElement::new("Comment", "comment"));
                if let Err(error) = ctx.open_dialog(&dialog).await {
                    warn!(event_name = "echo.dialog.failed", error = %error, "dialog not opened");
                    scratchpad.set_http_body("could not open the feedback form");
                }
            }
            EventTag::SlashCommand => {
                let command = turn.command.as_deref().unwrap_or_default();
                let echo = format!("{command} {text}").trim().to_owned();
                match ctx.send(&CanonicalOutboundMessage::reply_public(turn, echo.as_str())).await {
                    Ok(_) => {}
                    // No response URL on the command: answer in the HTTP body instead.
                    Err(DeliveryError::MissingResponseUrl) => scratchpad.set_http_body(echo),
                    Err(error) => {
                        warn!(
                            event_name = "echo.reply.failed",
                            correlation_id = %turn.turn_id,
                            error = %error,
                            "slash command reply not delivered"
                        );
                    }
                }
            }
            EventTag::Interactive(kind) if kind == "dialog_submission" => {
                scratchpad.dialog_errors(&submission_errors(turn.raw_payload.get("submission")));
            }
            EventTag::DirectMessage | EventTag::DirectMention if !text.is_empty() => {
                // Delivery failures are logged; the webhook still answers 200.
                if let Err(error) = ctx.reply_in_thread(text).await {
                    warn!(
                        event_name = "echo.reply.failed",
                        correlation_id = %turn.turn_id,
                        error = %error,
                        "echo reply not delivered"
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn submission_errors(submission: Option<&Value>) -> Vec<DialogFieldError> {
    let field = |name: &str| {
        submission.and_then(|fields| fields.get(name)).and_then(Value::as_str).unwrap_or("").trim()
    };

    let mut errors = Vec::new();
    if !field("email").contains('@') {
        errors.push(DialogFieldError::new("email", "Enter a valid email address"));
    }
    if field("comment").is_empty() {
        errors.push(DialogFieldError::new("comment", "Comment cannot be empty"));
    }
    errors
}
