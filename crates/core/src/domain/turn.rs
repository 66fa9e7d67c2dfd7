use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The closed set of inbound shapes the platform delivers to the webhook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    UrlVerification,
    EventCallback,
    InteractivePayload,
    SlashCommand,
}

impl TurnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UrlVerification => "url_verification",
            Self::EventCallback => "event_callback",
            Self::InteractivePayload => "interactive_payload",
            Self::SlashCommand => "slash_command",
        }
    }
}

/// Whether message-only handlers and dialogs may react to the turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Message,
    Event,
}

/// Finer-grained label for routing inside bot logic.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTag {
    Message,
    DirectMessage,
    DirectMention,
    Mention,
    BotMessage,
    SlashCommand,
    /// Interactive callback, labelled with the callback's own `type`.
    Interactive(String),
    /// Any other Events API event, labelled with the nested event `type`.
    Event(String),
}

impl EventTag {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::DirectMessage => "direct_message",
            Self::DirectMention => "direct_mention",
            Self::Mention => "mention",
            Self::BotMessage => "bot_message",
            Self::SlashCommand => "slash_command",
            Self::Interactive(kind) | Self::Event(kind) => kind,
        }
    }
}

/// Platform fields preserved verbatim for downstream consumers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPayload(Map<String, Value>);

impl RawPayload {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One inbound event normalized away from its wire shape.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CanonicalTurn {
    pub turn_id: String,
    kind: TurnKind,
    pub activity: ActivityType,
    pub tag: EventTag,
    pub conversation_id: String,
    pub sender_id: String,
    pub is_bot_sender: bool,
    /// Bot user id for the team, attached once credentials are resolved.
    pub recipient_id: Option<String>,
    pub team_id: String,
    pub thread_id: Option<String>,
    pub text: Option<String>,
    /// Event channel type (`im`, `channel`, `group`, `mpim`) when the event names one.
    pub channel_type: Option<String>,
    /// Slash command name, including the leading `/`.
    pub command: Option<String>,
    pub raw_payload: RawPayload,
    pub response_url: Option<String>,
    pub trigger_id: Option<String>,
}

impl CanonicalTurn {
    pub fn new(turn_id: impl Into<String>, kind: TurnKind, tag: EventTag) -> Self {
        Self {
            turn_id: turn_id.into(),
            kind,
            activity: ActivityType::Event,
            tag,
            conversation_id: String::new(),
            sender_id: String::new(),
            is_bot_sender: false,
            recipient_id: None,
            team_id: String::new(),
            thread_id: None,
            text: None,
            channel_type: None,
            command: None,
            raw_payload: RawPayload::default(),
            response_url: None,
            trigger_id: None,
        }
    }

    /// Kind is fixed at construction.
    pub fn kind(&self) -> TurnKind {
        self.kind
    }

    pub fn is_message(&self) -> bool {
        self.activity == ActivityType::Message
    }

    pub fn is_direct_channel(&self) -> bool {
        self.channel_type.as_deref() == Some("im")
    }

    /// Re-tags a bot-originated turn as a non-actionable event. Any bot sender
    /// is suppressed, including this bot's own echoes.
    pub fn suppress_bot_sender(&mut self) -> bool {
        if !self.is_bot_sender {
            return false;
        }
        self.tag = EventTag::BotMessage;
        self.activity = ActivityType::Event;
        true
    }

    /// Thread to reply into: the turn's own thread, else the turn id (message ts).
    pub fn reply_thread(&self) -> Option<String> {
        match &self.thread_id {
            Some(thread) => Some(thread.clone()),
            None if self.kind == TurnKind::EventCallback && !self.turn_id.is_empty() => {
                Some(self.turn_id.clone())
            }
            None => None,
        }
    }
}
