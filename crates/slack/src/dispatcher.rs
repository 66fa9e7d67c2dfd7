//! Per-request pipeline from raw webhook bytes to the HTTP answer.
//!
//! ```text
//! Received -> Verified -> Classified -> CredentialResolved -> Dispatched -> Responded
//!     |           |            |                 |
//!   401         400          403/200           500
//! ```
//!
//! URL verification is answered straight after classification. Every other
//! kind runs the token check, resolves credentials, tags the message type and
//! hands a [`TurnContext`] to [`BotLogic`]. The HTTP response is whatever the
//! bot left in its [`ResponseScratchpad`].

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use turnwire_core::{
    domain::scratchpad::CONTENT_TYPE_TEXT, CanonicalOutboundMessage, CanonicalTurn,
    CredentialError, DeliveryError, RejectionError, ResponseScratchpad, TurnKind,
};

use crate::{
    credentials::{CredentialHandle, CredentialResolver},
    dialog::SlackDialog,
    events::{classify, BodyEncoding},
    middleware::tag_message_type,
    outbound::{DeliveryResult, OutboundFormatter},
    signature::{SignatureHeaders, SignatureVerifier},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    Received,
    Verified,
    Classified,
    CredentialResolved,
    Dispatched,
    Responded,
    Rejected401,
    Rejected403,
    RejectedMalformed,
}

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error("bot logic failed: {0}")]
    Logic(String),
}

/// Application code invoked once per accepted turn.
#[async_trait]
pub trait BotLogic: Send + Sync {
    async fn on_turn(
        &self,
        ctx: &TurnContext,
        scratchpad: &mut ResponseScratchpad,
    ) -> Result<(), BotError>;
}

/// Ignores every turn; the platform gets an empty 200.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopBot;

#[async_trait]
impl BotLogic for NoopBot {
    async fn on_turn(&self, _: &TurnContext, _: &mut ResponseScratchpad) -> Result<(), BotError> {
        Ok(())
    }
}

/// Everything bot logic may use while handling one turn.
pub struct TurnContext {
    turn: CanonicalTurn,
    credential: Arc<CredentialHandle>,
    formatter: Arc<OutboundFormatter>,
    cancel: CancellationToken,
}

impl TurnContext {
    pub fn new(
        turn: CanonicalTurn,
        credential: Arc<CredentialHandle>,
        formatter: Arc<OutboundFormatter>,
        cancel: CancellationToken,
    ) -> Self {
        Self { turn, credential, formatter, cancel }
    }

    pub fn turn(&self) -> &CanonicalTurn {
        &self.turn
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that fires when the inbound request is abandoned. Clone it into
    /// background work that should stop with the turn.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn send(
        &self,
        message: &CanonicalOutboundMessage,
    ) -> Result<DeliveryResult, DeliveryError> {
        self.formatter.dispatch_until_cancelled(message, &self.credential, &self.cancel).await
    }

    pub async fn reply(
        &self,
        text: impl Into<String> + Send,
    ) -> Result<DeliveryResult, DeliveryError> {
        self.send(&CanonicalOutboundMessage::reply(&self.turn, text)).await
    }

    pub async fn reply_in_thread(
        &self,
        text: impl Into<String> + Send,
    ) -> Result<DeliveryResult, DeliveryError> {
        self.send(&CanonicalOutboundMessage::reply_in_thread(&self.turn, text)).await
    }

    pub async fn open_dialog(&self, dialog: &SlackDialog) -> Result<(), DeliveryError> {
        self.formatter
            .open_dialog(self.turn.trigger_id.as_deref(), dialog, &self.credential, &self.cancel)
            .await
    }
}

/// One inbound webhook, borrowed from the HTTP layer.
#[derive(Clone, Copy, Debug)]
pub struct InboundRequest<'a> {
    pub body: &'a [u8],
    pub content_type: Option<&'a str>,
    pub signature: SignatureHeaders<'a>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl WebhookResponse {
    fn text(status: u16, body: impl Into<String>) -> Self {
        Self { status, content_type: CONTENT_TYPE_TEXT, body: body.into() }
    }

    fn from_scratchpad(scratchpad: &ResponseScratchpad) -> Self {
        Self {
            status: scratchpad.status(),
            content_type: scratchpad.content_type(),
            body: scratchpad.body().to_owned(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DispatchOutcome {
    /// States visited, in order. The last one is terminal.
    pub states: Vec<DispatchState>,
    pub kind: Option<TurnKind>,
    pub response: WebhookResponse,
}

impl DispatchOutcome {
    pub fn final_state(&self) -> Option<DispatchState> {
        self.states.last().copied()
    }

    pub fn reached(&self, state: DispatchState) -> bool {
        self.states.contains(&state)
    }
}

const BOT_FAILURE_BODY: &str = "internal error";

pub struct TurnDispatcher {
    verifier: SignatureVerifier,
    verification_token: Option<SecretString>,
    resolver: Arc<CredentialResolver>,
    formatter: Arc<OutboundFormatter>,
}

impl TurnDispatcher {
    pub fn new(
        verifier: SignatureVerifier,
        verification_token: Option<SecretString>,
        resolver: Arc<CredentialResolver>,
        formatter: Arc<OutboundFormatter>,
    ) -> Self {
        Self { verifier, verification_token, resolver, formatter }
    }

    pub fn signature_enforced(&self) -> bool {
        self.verifier.is_enforced()
    }

    pub fn multi_tenant(&self) -> bool {
        self.resolver.is_multi_tenant()
    }

    pub async fn process(
        &self,
        request: InboundRequest<'_>,
        bot: &dyn BotLogic,
    ) -> DispatchOutcome {
        let mut states = vec![DispatchState::Received];

        if !self.verifier.verify(request.body, &request.signature) {
            return reject(states, None, &RejectionError::SignatureInvalid, None);
        }
        states.push(DispatchState::Verified);

        let encoding = BodyEncoding::detect(request.content_type, request.body);
        let classified = match classify(request.body, encoding) {
            Ok(classified) => classified,
            Err(rejection) => return reject(states, None, &rejection, None),
        };
        states.push(DispatchState::Classified);
        let kind = classified.kind();
        let correlation_id = classified.turn.turn_id.clone();

        if kind == TurnKind::UrlVerification {
            info!(
                event_name = "ingress.slack.url_verification",
                correlation_id = %correlation_id,
                "answering url verification challenge"
            );
            states.push(DispatchState::Responded);
            let challenge = classified.challenge.unwrap_or_default();
            return DispatchOutcome {
                states,
                kind: Some(kind),
                response: WebhookResponse::text(200, challenge),
            };
        }

        if let Some(expected) = &self.verification_token {
            if classified.requires_token_check() && !classified.token_matches(expected) {
                return reject(
                    states,
                    Some(kind),
                    &RejectionError::TokenMismatch,
                    Some(&correlation_id),
                );
            }
        }

        let mut turn = classified.turn;
        let (credential, bot_user_id) = match self.credentials_for(&turn.team_id).await {
            Ok(resolved) => resolved,
            Err(rejection) => {
                let mut outcome = reject(states, Some(kind), &rejection, Some(&correlation_id));
                outcome.states.push(DispatchState::Responded);
                return outcome;
            }
        };
        states.push(DispatchState::CredentialResolved);

        tag_message_type(&mut turn, Some(bot_user_id.as_str()));
        turn.recipient_id = Some(bot_user_id);
        debug!(
            event_name = "ingress.slack.turn_classified",
            correlation_id = %correlation_id,
            team_id = %turn.team_id,
            kind = kind.as_str(),
            tag = turn.tag.as_str(),
            "turn ready for bot logic"
        );

        let cancel = CancellationToken::new();
        // Dropping this future (client disconnect, shutdown) cancels the turn.
        let _cancel_on_drop = cancel.clone().drop_guard();
        let team_id = turn.team_id.clone();
        let ctx = TurnContext::new(turn, credential, Arc::clone(&self.formatter), cancel);
        let mut scratchpad = ResponseScratchpad::new();
        states.push(DispatchState::Dispatched);

        let response = match bot.on_turn(&ctx, &mut scratchpad).await {
            Ok(()) => WebhookResponse::from_scratchpad(&scratchpad),
            Err(error) => {
                warn!(
                    event_name = "ingress.slack.bot_failed",
                    correlation_id = %correlation_id,
                    team_id = %team_id,
                    error = %error,
                    "bot logic returned an error"
                );
                WebhookResponse::text(500, BOT_FAILURE_BODY)
            }
        };
        states.push(DispatchState::Responded);
        info!(
            event_name = "ingress.slack.responded",
            correlation_id = %correlation_id,
            team_id = %team_id,
            kind = kind.as_str(),
            status = response.status,
            "webhook answered"
        );
        DispatchOutcome { states, kind: Some(kind), response }
    }

    async fn credentials_for(
        &self,
        team_id: &str,
    ) -> Result<(Arc<CredentialHandle>, String), RejectionError> {
        let credential = self.resolver.resolve(team_id).await?;
        let bot_user_id = credential
            .bot_user_id()
            .map(str::to_owned)
            .ok_or_else(|| CredentialError::IdentityLookupFailed { team_id: team_id.to_owned() })?;
        Ok((credential, bot_user_id))
    }
}

fn reject(
    mut states: Vec<DispatchState>,
    kind: Option<TurnKind>,
    rejection: &RejectionError,
    correlation_id: Option<&str>,
) -> DispatchOutcome {
    let terminal = match rejection {
        RejectionError::SignatureInvalid => Some(DispatchState::Rejected401),
        RejectionError::TokenMismatch => Some(DispatchState::Rejected403),
        RejectionError::MalformedPayload { .. } => Some(DispatchState::RejectedMalformed),
        RejectionError::Credential(_) => None,
    };
    let body_len = match rejection {
        RejectionError::MalformedPayload { body_len, .. } => *body_len,
        _ => 0,
    };
    warn!(
        event_name = "ingress.slack.rejected",
        correlation_id = correlation_id.unwrap_or("unclassified"),
        error_class = rejection.error_class(),
        status = rejection.status_code(),
        body_len,
        error = %rejection,
        "webhook rejected"
    );
    states.extend(terminal);
    DispatchOutcome {
        states,
        kind,
        response: WebhookResponse::text(rejection.status_code(), rejection.user_message()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;
    use turnwire_core::{
        domain::scratchpad::CONTENT_TYPE_JSON, DialogFieldError, EventTag, ResponseScratchpad,
        TurnKind,
    };

    use super::{
        BotError, BotLogic, DispatchState, InboundRequest, NoopBot, TurnContext, TurnDispatcher,
    };
    use crate::credentials::{CredentialResolver, InMemoryTokenStore};
    use crate::outbound::OutboundFormatter;
    use crate::signature::{compute_signature, SignatureHeaders, SignatureVerifier};
    use crate::testing::{ApiCall, RecordingResponseUrl, ScriptedSlackApi};

    const SECRET: &str = "signing-secret";
    const TOKEN: &str = "legacy-token";

    #[derive(Default)]
    struct RecordingBot {
        seen: Mutex<Vec<(TurnKind, EventTag, Option<String>, Option<String>)>>,
    }

    #[async_trait]
    impl BotLogic for RecordingBot {
        async fn on_turn(
            &self,
            ctx: &TurnContext,
            _scratchpad: &mut ResponseScratchpad,
        ) -> Result<(), BotError> {
            let turn = ctx.turn();
            self.seen.lock().await.push((
                turn.kind(),
                turn.tag.clone(),
                turn.text.clone(),
                turn.recipient_id.clone(),
            ));
            Ok(())
        }
    }

    struct ReplyingBot;

    #[async_trait]
    impl BotLogic for ReplyingBot {
        async fn on_turn(
            &self,
            ctx: &TurnContext,
            scratchpad: &mut ResponseScratchpad,
        ) -> Result<(), BotError> {
            if ctx.turn().is_message() {
                ctx.reply_in_thread("pong").await?;
            }
            scratchpad.set_http_status(200);
            Ok(())
        }
    }

    struct ValidatingBot;

    #[async_trait]
    impl BotLogic for ValidatingBot {
        async fn on_turn(
            &self,
            _ctx: &TurnContext,
            scratchpad: &mut ResponseScratchpad,
        ) -> Result<(), BotError> {
            scratchpad.dialog_errors(&[DialogFieldError::new("email", "required")]);
            Ok(())
        }
    }

    struct FailingBot;

    #[async_trait]
    impl BotLogic for FailingBot {
        async fn on_turn(
            &self,
            _ctx: &TurnContext,
            _scratchpad: &mut ResponseScratchpad,
        ) -> Result<(), BotError> {
            Err(BotError::Logic("database on fire: secret detail".to_owned()))
        }
    }

    struct Harness {
        dispatcher: TurnDispatcher,
        api: Arc<ScriptedSlackApi>,
    }

    fn single_tenant(secret: Option<&str>, token: Option<&str>) -> Harness {
        let api = Arc::new(ScriptedSlackApi::default());
        let resolver =
            CredentialResolver::single_tenant_with_identity(Arc::clone(&api) as _, "UBOT");
        let dispatcher = TurnDispatcher::new(
            SignatureVerifier::new(secret.map(|secret| secret.to_owned().into()), 300),
            token.map(|token| token.to_owned().into()),
            Arc::new(resolver),
            Arc::new(OutboundFormatter::new(Arc::new(RecordingResponseUrl::default()))),
        );
        Harness { dispatcher, api }
    }

    fn now() -> String {
        chrono::Utc::now().timestamp().to_string()
    }

    fn message_event(text: &str) -> String {
        json!({
            "token": TOKEN,
            "team_id": "T1",
            "type": "event_callback",
            "event": {
                "type": "message",
                "channel": "C1",
                "user": "U1",
                "text": text,
                "ts": "1730000000.000200",
                "channel_type": "channel"
            }
        })
        .to_string()
    }

    async fn send_signed(
        harness: &Harness,
        body: &str,
        content_type: &str,
        bot: &dyn BotLogic,
    ) -> super::DispatchOutcome {
        let timestamp = now();
        let signature = compute_signature(SECRET, &timestamp, body.as_bytes());
        let request = InboundRequest {
            body: body.as_bytes(),
            content_type: Some(content_type),
            signature: SignatureHeaders {
                timestamp: Some(&timestamp),
                signature: Some(&signature),
            },
        };
        harness.dispatcher.process(request, bot).await
    }

    #[tokio::test]
    async fn url_verification_echoes_challenge_as_plain_text() {
        let harness = single_tenant(Some(SECRET), Some(TOKEN));
        let body = json!({ "type": "url_verification", "challenge": "abc123" }).to_string();

        let outcome = send_signed(&harness, &body, "application/json", &NoopBot).await;

        assert_eq!(outcome.response.status, 200);
        assert_eq!(outcome.response.content_type, "text/plain");
        assert_eq!(outcome.response.body, "abc123");
        assert_eq!(outcome.kind, Some(TurnKind::UrlVerification));
        assert!(!outcome.reached(DispatchState::CredentialResolved));
        assert_eq!(outcome.final_state(), Some(DispatchState::Responded));
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_before_classification() {
        let harness = single_tenant(Some(SECRET), None);
        let body = message_event("hi");
        let timestamp = now();
        let signature = compute_signature("wrong-secret", &timestamp, body.as_bytes());
        let bot = RecordingBot::default();

        let outcome = harness
            .dispatcher
            .process(
                InboundRequest {
                    body: body.as_bytes(),
                    content_type: Some("application/json"),
                    signature: SignatureHeaders {
                        timestamp: Some(&timestamp),
                        signature: Some(&signature),
                    },
                },
                &bot,
            )
            .await;

        assert_eq!(outcome.response.status, 401);
        assert_eq!(outcome.states, vec![DispatchState::Received, DispatchState::Rejected401]);
        assert_eq!(outcome.kind, None);
        assert!(bot.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unsigned_requests_pass_when_no_secret_is_configured() {
        let harness = single_tenant(None, None);
        let body = message_event("hi");
        let bot = RecordingBot::default();

        let outcome = harness
            .dispatcher
            .process(
                InboundRequest {
                    body: body.as_bytes(),
                    content_type: Some("application/json"),
                    signature: SignatureHeaders::default(),
                },
                &bot,
            )
            .await;

        assert_eq!(outcome.response.status, 200);
        assert!(!harness.dispatcher.signature_enforced());
        assert_eq!(bot.seen.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_payload_is_malformed_and_never_reaches_bot() {
        let harness = single_tenant(Some(SECRET), None);
        let bot = RecordingBot::default();

        let outcome =
            send_signed(&harness, r#"{"type":"mystery"}"#, "application/json", &bot).await;

        assert_eq!(outcome.response.status, 400);
        assert_eq!(outcome.response.body, "unrecognized payload");
        assert_eq!(outcome.final_state(), Some(DispatchState::RejectedMalformed));
        assert!(bot.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn interactive_form_body_with_wrong_token_is_forbidden() {
        let harness = single_tenant(Some(SECRET), Some(TOKEN));
        let payload = json!({
            "type": "block_actions",
            "token": "someone-else",
            "team": { "id": "T1" },
            "user": { "id": "U1" },
            "channel": { "id": "C1" },
            "trigger_id": "trig-1",
            "response_url": "https://hooks.slack.com/actions/T1/1/abc"
        });
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("payload", &payload.to_string())
            .finish();
        let bot = RecordingBot::default();

        let outcome =
            send_signed(&harness, &body, "application/x-www-form-urlencoded", &bot).await;

        assert_eq!(outcome.response.status, 403);
        assert_eq!(outcome.kind, Some(TurnKind::InteractivePayload));
        assert_eq!(outcome.final_state(), Some(DispatchState::Rejected403));
        assert!(bot.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn slash_command_reaches_bot_and_answers_empty_ok() {
        let harness = single_tenant(Some(SECRET), None);
        let body = json!({
            "command": "/ping",
            "channel_id": "C1",
            "user_id": "U1",
            "trigger_id": "T1",
            "text": "hi"
        })
        .to_string();
        let bot = RecordingBot::default();

        let outcome = send_signed(&harness, &body, "application/json", &bot).await;

        assert_eq!(outcome.response.status, 200);
        assert_eq!(outcome.response.body, "");
        assert!(outcome.reached(DispatchState::Dispatched));
        let seen = bot.seen.lock().await;
        assert_eq!(seen[0].0, TurnKind::SlashCommand);
        assert_eq!(seen[0].1, EventTag::SlashCommand);
        assert_eq!(seen[0].2.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn direct_mention_is_tagged_and_recipient_attached() {
        let harness = single_tenant(Some(SECRET), Some(TOKEN));
        let bot = RecordingBot::default();

        let outcome =
            send_signed(&harness, &message_event("<@UBOT> status"), "application/json", &bot)
                .await;

        assert_eq!(outcome.response.status, 200);
        let seen = bot.seen.lock().await;
        assert_eq!(seen[0].1, EventTag::DirectMention);
        assert_eq!(seen[0].2.as_deref(), Some("status"));
        assert_eq!(seen[0].3.as_deref(), Some("UBOT"));
    }

    #[tokio::test]
    async fn bot_reply_goes_through_formatter() {
        let harness = single_tenant(Some(SECRET), Some(TOKEN));

        let outcome =
            send_signed(&harness, &message_event("ping"), "application/json", &ReplyingBot).await;

        assert_eq!(outcome.response.status, 200);
        let calls = harness.api.calls().await;
        let [ApiCall::PostMessage(request)] = calls.as_slice() else {
            panic!("expected one postMessage, got {calls:?}");
        };
        assert_eq!(request.text, "pong");
        assert_eq!(request.thread_ts.as_deref(), Some("1730000000.000200"));
    }

    #[tokio::test]
    async fn dialog_errors_become_json_response() {
        let harness = single_tenant(Some(SECRET), None);
        let payload = json!({
            "type": "dialog_submission",
            "team": { "id": "T1" },
            "user": { "id": "U1" },
            "channel": { "id": "C1" },
            "submission": { "email": "" },
            "response_url": "https://hooks.slack.com/app/T1/1/abc"
        });
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("payload", &payload.to_string())
            .finish();

        let outcome =
            send_signed(&harness, &body, "application/x-www-form-urlencoded", &ValidatingBot)
                .await;

        assert_eq!(outcome.response.status, 200);
        assert_eq!(outcome.response.content_type, CONTENT_TYPE_JSON);
        let parsed: serde_json::Value =
            serde_json::from_str(&outcome.response.body).expect("json body");
        assert_eq!(parsed["errors"][0]["name"], "email");
    }

    #[tokio::test]
    async fn bot_failure_is_generic_500() {
        let harness = single_tenant(Some(SECRET), None);

        let outcome =
            send_signed(&harness, &message_event("boom"), "application/json", &FailingBot).await;

        assert_eq!(outcome.response.status, 500);
        assert!(!outcome.response.body.contains("secret detail"));
        assert_eq!(outcome.final_state(), Some(DispatchState::Responded));
    }

    #[tokio::test]
    async fn multi_tenant_unknown_team_is_500_without_bot_call() {
        let resolver = CredentialResolver::multi_tenant(
            Arc::new(InMemoryTokenStore::new()),
            Arc::new(crate::credentials::HttpClientFactory::new(
                reqwest::Client::new(),
                "https://slack.com/api/",
            )),
        );
        let dispatcher = TurnDispatcher::new(
            SignatureVerifier::new(Some(SECRET.to_owned().into()), 300),
            None,
            Arc::new(resolver),
            Arc::new(OutboundFormatter::new(Arc::new(RecordingResponseUrl::default()))),
        );
        let harness = Harness { dispatcher, api: Arc::new(ScriptedSlackApi::default()) };
        let bot = RecordingBot::default();

        let outcome =
            send_signed(&harness, &message_event("hello"), "application/json", &bot).await;

        assert_eq!(outcome.response.status, 500);
        assert_eq!(outcome.response.body, "credentials unavailable");
        assert!(harness.dispatcher.multi_tenant());
        assert!(!outcome.reached(DispatchState::CredentialResolved));
        assert!(bot.seen.lock().await.is_empty());
    }

    struct SharedClient(Arc<ScriptedSlackApi>);

    impl crate::credentials::ApiClientFactory for SharedClient {
        fn client_for_token(
            &self,
            _token: &secrecy::SecretString,
        ) -> Result<Arc<dyn crate::api::SlackApi>, crate::api::ApiError> {
            Ok(Arc::clone(&self.0) as _)
        }
    }

    #[tokio::test]
    async fn multi_tenant_turn_carries_installed_bot_identity() {
        use crate::credentials::{Installation, InstallationStore};

        let api = Arc::new(ScriptedSlackApi::default());
        let store = Arc::new(InMemoryTokenStore::new());
        for (team_id, bot_user_id) in [("T1", Some("UTEAMBOT")), ("T2", None)] {
            store
                .save(Installation {
                    team_id: team_id.to_owned(),
                    bot_token: format!("xoxb-{team_id}").into(),
                    bot_user_id: bot_user_id.map(str::to_owned),
                })
                .await;
        }
        let resolver =
            CredentialResolver::multi_tenant(store, Arc::new(SharedClient(Arc::clone(&api))));
        let dispatcher = TurnDispatcher::new(
            SignatureVerifier::new(Some(SECRET.to_owned().into()), 300),
            None,
            Arc::new(resolver.with_team_cache()),
            Arc::new(OutboundFormatter::new(Arc::new(RecordingResponseUrl::default()))),
        );
        let harness = Harness { dispatcher, api };
        let bot = RecordingBot::default();

        let installed =
            send_signed(&harness, &message_event("<@UTEAMBOT> hi"), "application/json", &bot)
                .await;
        let anonymous = send_signed(
            &harness,
            &message_event("hi").replace("\"T1\"", "\"T2\""),
            "application/json",
            &bot,
        )
        .await;

        assert_eq!(installed.response.status, 200);
        assert_eq!(anonymous.response.status, 500);
        let seen = bot.seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, EventTag::DirectMention);
        assert_eq!(seen[0].3.as_deref(), Some("UTEAMBOT"));
    }

    #[tokio::test]
    async fn cancellation_token_fires_once_turn_completes() {
        struct CapturingBot {
            token: Mutex<Option<tokio_util::sync::CancellationToken>>,
        }

        #[async_trait]
        impl BotLogic for CapturingBot {
            async fn on_turn(
                &self,
                ctx: &TurnContext,
                _scratchpad: &mut ResponseScratchpad,
            ) -> Result<(), BotError> {
                assert!(!ctx.is_cancelled());
                *self.token.lock().await = Some(ctx.cancellation_token());
                Ok(())
            }
        }

        let harness = single_tenant(Some(SECRET), None);
        let bot = CapturingBot { token: Mutex::new(None) };
        send_signed(&harness, &message_event("hi"), "application/json", &bot).await;

        let token = bot.token.lock().await.clone().expect("token captured");
        assert!(token.is_cancelled());
    }
}
