//! Classifies a verified webhook body and normalizes it into a
//! [`CanonicalTurn`].
//!
//! Four shapes are recognized, checked in this order:
//!
//! | shape              | marker                                   |
//! |--------------------|------------------------------------------|
//! | URL verification   | `type == "url_verification"`             |
//! | interactive        | a `payload` field holding encoded JSON   |
//! | event callback     | `type == "event_callback"`               |
//! | slash command      | a `command` field                        |
//!
//! Bodies arrive either as JSON or form-encoded; form bodies are flattened
//! into string fields before classification. Anything that matches no shape,
//! or matches one but fails its schema, is a malformed payload.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use turnwire_core::{
    ActivityType, CanonicalTurn, EventTag, RawPayload, RejectionError, TurnKind,
};
use uuid::Uuid;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyEncoding {
    Json,
    Form,
}

impl BodyEncoding {
    /// Uses the declared content type when it is one of the two known
    /// encodings, else sniffs the first non-whitespace byte.
    pub fn detect(content_type: Option<&str>, raw_body: &[u8]) -> Self {
        if let Some(content_type) = content_type {
            let content_type = content_type.trim().to_ascii_lowercase();
            if content_type.starts_with(FORM_CONTENT_TYPE) {
                return Self::Form;
            }
            if content_type.starts_with(JSON_CONTENT_TYPE) {
                return Self::Json;
            }
        }
        match raw_body.iter().find(|byte| !byte.is_ascii_whitespace()) {
            Some(b'{') => Self::Json,
            _ => Self::Form,
        }
    }
}

/// A classified turn plus the bits the dispatcher needs before bot logic
/// sees it.
#[derive(Clone, Debug)]
pub struct ClassifiedPayload {
    pub turn: CanonicalTurn,
    /// Set only for URL verification.
    pub challenge: Option<String>,
    verification_token: Option<SecretString>,
}

impl ClassifiedPayload {
    pub fn kind(&self) -> TurnKind {
        self.turn.kind()
    }

    /// Kinds whose payloads embed the legacy verification token.
    pub fn requires_token_check(&self) -> bool {
        matches!(
            self.kind(),
            TurnKind::EventCallback | TurnKind::InteractivePayload | TurnKind::SlashCommand
        )
    }

    /// A payload without a token never matches a configured one.
    pub fn token_matches(&self, expected: &SecretString) -> bool {
        match &self.verification_token {
            Some(token) => digest_eq(token.expose_secret(), expected.expose_secret()),
            None => false,
        }
    }
}

// Comparing digests keeps the comparison time independent of the token prefix.
fn digest_eq(left: &str, right: &str) -> bool {
    Sha256::digest(left.as_bytes()) == Sha256::digest(right.as_bytes())
}

pub fn classify(
    raw_body: &[u8],
    encoding: BodyEncoding,
) -> Result<ClassifiedPayload, RejectionError> {
    let malformed = |reason: &str| RejectionError::MalformedPayload {
        body_len: raw_body.len(),
        reason: reason.to_owned(),
    };

    let mut envelope = match encoding {
        BodyEncoding::Json => match serde_json::from_slice::<Value>(raw_body) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => return Err(malformed("json body is not an object")),
            Err(_) => return Err(malformed("body is not valid json")),
        },
        BodyEncoding::Form => form_fields(raw_body),
    };

    let envelope_type = envelope.get("type").and_then(Value::as_str).map(str::to_owned);
    if envelope_type.as_deref() == Some("url_verification") {
        return url_verification(envelope).map_err(malformed);
    }
    if let Some(payload) = envelope.remove("payload") {
        return interactive(payload).map_err(malformed);
    }
    if envelope_type.as_deref() == Some("event_callback") {
        return event_callback(envelope).map_err(malformed);
    }
    if envelope.contains_key("command") {
        return slash_command(envelope).map_err(malformed);
    }
    Err(malformed("payload matches no known kind"))
}

fn form_fields(raw_body: &[u8]) -> Map<String, Value> {
    url::form_urlencoded::parse(raw_body)
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect()
}

#[derive(Deserialize)]
struct UrlVerificationBody {
    challenge: String,
}

fn url_verification(mut envelope: Map<String, Value>) -> Result<ClassifiedPayload, &'static str> {
    let verification_token = take_token(&mut envelope);
    let body: UrlVerificationBody = from_fields(&envelope)
        .ok_or("url_verification envelope does not match schema")?;

    let mut turn = CanonicalTurn::new(
        generated_id(),
        TurnKind::UrlVerification,
        EventTag::Event("url_verification".to_owned()),
    );
    turn.raw_payload = RawPayload::new(envelope);
    Ok(ClassifiedPayload { turn, challenge: Some(body.challenge), verification_token })
}

#[derive(Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Default, Deserialize)]
struct MessageRef {
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

#[derive(Default, Deserialize)]
struct ContainerRef {
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    message_ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

#[derive(Deserialize)]
struct InteractiveBody {
    #[serde(rename = "type")]
    callback_type: String,
    #[serde(default)]
    team: Option<IdRef>,
    #[serde(default)]
    user: Option<IdRef>,
    #[serde(default)]
    channel: Option<IdRef>,
    #[serde(default)]
    trigger_id: Option<String>,
    #[serde(default)]
    response_url: Option<String>,
    #[serde(default)]
    action_ts: Option<String>,
    #[serde(default)]
    message: Option<MessageRef>,
    #[serde(default)]
    container: Option<ContainerRef>,
}

fn interactive(payload: Value) -> Result<ClassifiedPayload, &'static str> {
    let mut fields = match payload {
        Value::String(encoded) => match serde_json::from_str::<Value>(&encoded) {
            Ok(Value::Object(fields)) => fields,
            _ => return Err("interactive payload is not an encoded json object"),
        },
        Value::Object(fields) => fields,
        _ => return Err("interactive payload is not an encoded json object"),
    };
    let verification_token = take_token(&mut fields);
    let body: InteractiveBody =
        from_fields(&fields).ok_or("interactive payload does not match schema")?;

    let message = body.message.unwrap_or_default();
    let container = body.container.unwrap_or_default();
    let sender_id = body.user.map(|user| user.id).unwrap_or_default();
    let conversation_id = body
        .channel
        .map(|channel| channel.id)
        .and_then(non_blank)
        .or_else(|| container.channel_id.and_then(non_blank))
        .or_else(|| non_blank(sender_id.clone()))
        .ok_or("interactive payload names no conversation")?;
    let trigger_id = body.trigger_id.and_then(non_blank);
    let turn_id = first_present([
        trigger_id.clone(),
        body.action_ts,
        message.ts,
        container.message_ts,
    ]);

    let mut turn = CanonicalTurn::new(
        turn_id,
        TurnKind::InteractivePayload,
        EventTag::Interactive(body.callback_type),
    );
    turn.conversation_id = conversation_id;
    turn.sender_id = sender_id;
    turn.team_id = body.team.map(|team| team.id).unwrap_or_default();
    turn.thread_id = message.thread_ts.or(container.thread_ts).and_then(non_blank);
    turn.response_url = body.response_url.and_then(non_blank);
    turn.trigger_id = trigger_id;
    turn.raw_payload = RawPayload::new(fields);
    Ok(ClassifiedPayload { turn, challenge: None, verification_token })
}

#[derive(Deserialize)]
struct EventCallbackBody {
    #[serde(default)]
    team_id: Option<String>,
    #[serde(default)]
    event_id: Option<String>,
    event: Map<String, Value>,
}

#[derive(Deserialize)]
struct EventBody {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    user: Option<Value>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    channel: Option<Value>,
    #[serde(default)]
    item: Option<Value>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    event_ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    team: Option<Value>,
    #[serde(default)]
    channel_type: Option<String>,
}

fn event_callback(mut envelope: Map<String, Value>) -> Result<ClassifiedPayload, &'static str> {
    let verification_token = take_token(&mut envelope);
    let body: EventCallbackBody =
        from_fields(&envelope).ok_or("event_callback envelope does not match schema")?;
    let event: EventBody =
        from_fields(&body.event).ok_or("event_callback event does not match schema")?;

    let bot_id = event.bot_id.and_then(non_blank);
    let user_id = id_of(event.user.as_ref());
    let is_bot_sender = bot_id.is_some();
    let sender_id = bot_id.or(user_id.clone()).unwrap_or_default();
    // Channel-less events (team_join, app_uninstalled, ...) address the user directly.
    let conversation_id = id_of(event.channel.as_ref())
        .or_else(|| event.item.as_ref().and_then(|item| id_of(item.get("channel"))))
        .or(user_id)
        .ok_or("event_callback event names no conversation")?;
    let team_id = body
        .team_id
        .and_then(non_blank)
        .or_else(|| id_of(event.team.as_ref()))
        .unwrap_or_default();
    let is_plain_message = event.event_type == "message" && event.subtype.is_none();

    let mut turn = CanonicalTurn::new(
        first_present([event.ts, event.event_ts, body.event_id]),
        TurnKind::EventCallback,
        if is_plain_message { EventTag::Message } else { EventTag::Event(event.event_type) },
    );
    if is_plain_message {
        turn.activity = ActivityType::Message;
        turn.text = Some(event.text.unwrap_or_default());
    }
    turn.conversation_id = conversation_id;
    turn.sender_id = sender_id;
    turn.is_bot_sender = is_bot_sender;
    turn.team_id = team_id;
    turn.thread_id = event.thread_ts.and_then(non_blank);
    turn.channel_type = event.channel_type.and_then(non_blank);
    turn.raw_payload = RawPayload::new(body.event);
    Ok(ClassifiedPayload { turn, challenge: None, verification_token })
}

#[derive(Deserialize)]
struct SlashCommandBody {
    command: String,
    channel_id: String,
    user_id: String,
    #[serde(default)]
    team_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    trigger_id: Option<String>,
    #[serde(default)]
    response_url: Option<String>,
}

fn slash_command(mut fields: Map<String, Value>) -> Result<ClassifiedPayload, &'static str> {
    let verification_token = take_token(&mut fields);
    let body: SlashCommandBody =
        from_fields(&fields).ok_or("slash command does not match schema")?;
    if body.command.trim().is_empty() || body.channel_id.trim().is_empty() {
        return Err("slash command is missing command or channel");
    }

    let trigger_id = body.trigger_id.and_then(non_blank);
    let mut turn = CanonicalTurn::new(
        first_present([trigger_id.clone()]),
        TurnKind::SlashCommand,
        EventTag::SlashCommand,
    );
    turn.conversation_id = body.channel_id;
    turn.sender_id = body.user_id;
    turn.team_id = body.team_id.unwrap_or_default();
    turn.text = Some(body.text.unwrap_or_default());
    turn.command = Some(body.command);
    turn.response_url = body.response_url.and_then(non_blank);
    turn.trigger_id = trigger_id;
    turn.raw_payload = RawPayload::new(fields);
    Ok(ClassifiedPayload { turn, challenge: None, verification_token })
}

fn from_fields<T: serde::de::DeserializeOwned>(fields: &Map<String, Value>) -> Option<T> {
    T::deserialize(Value::Object(fields.clone())).ok()
}

/// Removes the token so it never reaches bot logic through `raw_payload`.
fn take_token(fields: &mut Map<String, Value>) -> Option<SecretString> {
    match fields.remove("token") {
        Some(Value::String(token)) if !token.is_empty() => Some(SecretString::from(token)),
        _ => None,
    }
}

/// Ids appear either as bare strings or as objects with an `id` field.
fn id_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(id) => non_blank(id.clone()),
        Value::Object(fields) => {
            fields.get("id").and_then(Value::as_str).map(str::to_owned).and_then(non_blank)
        }
        _ => None,
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn first_present<const N: usize>(candidates: [Option<String>; N]) -> String {
    candidates.into_iter().flatten().find_map(non_blank).unwrap_or_else(generated_id)
}

fn generated_id() -> String {
    Uuid::new_v4().to_string()
}
