use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use turnwire_slack::{
    signature::{SignatureHeaders, SIGNATURE_HEADER, TIMESTAMP_HEADER},
    BotLogic, InboundRequest, TurnDispatcher, WebhookResponse,
};

#[derive(Clone)]
pub struct WebhookState {
    pub dispatcher: Arc<TurnDispatcher>,
    pub bot: Arc<dyn BotLogic>,
}

pub fn router(path: &str, state: WebhookState) -> Router {
    Router::new().route(path, post(receive)).with_state(state)
}

pub async fn receive(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = InboundRequest {
        body: &body,
        content_type: header_value(&headers, header::CONTENT_TYPE.as_str()),
        signature: SignatureHeaders {
            timestamp: header_value(&headers, TIMESTAMP_HEADER),
            signature: header_value(&headers, SIGNATURE_HEADER),
        },
    };

    let outcome = state.dispatcher.process(request, state.bot.as_ref()).await;
    into_response(outcome.response)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn into_response(response: WebhookResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, response.content_type)], response.body).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;
    use turnwire_slack::{
        credentials::CredentialResolver,
        outbound::OutboundFormatter,
        signature::{compute_signature, SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER},
        testing::{RecordingResponseUrl, ScriptedSlackApi},
        TurnDispatcher,
    };

    use super::{router, WebhookState};
    use crate::echo::EchoBot;

    const SECRET: &str = "signing-secret";

    #[derive(Default)]
    struct Fakes {
        api: Arc<ScriptedSlackApi>,
        responses: Arc<RecordingResponseUrl>,
    }

    impl Fakes {
        fn app(&self) -> axum::Router {
            let resolver =
                CredentialResolver::single_tenant_with_identity(self.api.clone(), "UBOT");
            let dispatcher = TurnDispatcher::new(
                SignatureVerifier::new(Some(SECRET.to_owned().into()), 300),
                None,
                Arc::new(resolver),
                Arc::new(OutboundFormatter::new(self.responses.clone())),
            );
            router(
                "/api/messages",
                WebhookState { dispatcher: Arc::new(dispatcher), bot: Arc::new(EchoBot) },
            )
        }
    }

    fn signed_request(body: &str, content_type: &str) -> Request<Body> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = compute_signature(SECRET, &timestamp, body.as_bytes());
        Request::post("/api/messages")
            .header(header::CONTENT_TYPE, content_type)
            .header(TIMESTAMP_HEADER, timestamp)
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(body.to_owned()))
            .expect("request")
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    #[tokio::test]
    async fn url_verification_round_trips_through_http() {
        let body = r#"{"type":"url_verification","challenge":"abc123"}"#;

        let response = Fakes::default()
            .app()
            .oneshot(signed_request(body, "application/json"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("text/plain")
        );
        assert_eq!(body_text(response).await, "abc123");
    }

    #[tokio::test]
    async fn unsigned_request_gets_401() {
        let request = Request::post("/api/messages")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"type":"url_verification","challenge":"abc123"}"#))
            .expect("request");

        let response = Fakes::default().app().oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(response).await, "invalid request signature");
    }

    #[tokio::test]
    async fn form_encoded_slash_command_is_echoed_to_response_url() {
        let fakes = Fakes::default();
        let body = concat!(
            "command=%2Fecho&text=hello+world&channel_id=C1&user_id=U1&team_id=T1",
            "&trigger_id=trig",
            "&response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2FT1%2F1%2Fabc",
        );

        let response = fakes
            .app()
            .oneshot(signed_request(body, "application/x-www-form-urlencoded"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "");
        let posts = fakes.responses.posts().await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "https://hooks.slack.com/commands/T1/1/abc");
        assert_eq!(posts[0].1.text, "/echo hello world");
    }

    #[tokio::test]
    async fn direct_mention_is_echoed_in_thread() {
        let fakes = Fakes::default();
        let body = serde_json::json!({
            "team_id": "T1",
            "type": "event_callback",
            "event": {
                "type": "app_mention",
                "channel": "C1",
                "user": "U1",
                "text": "<@UBOT> hi",
                "ts": "1.0"
            }
        })
        .to_string();
        let message = serde_json::json!({
            "team_id": "T1",
            "type": "event_callback",
            "event": {
                "type": "message",
                "channel": "C1",
                "user": "U1",
                "text": "<@UBOT> hi",
                "ts": "2.0"
            }
        })
        .to_string();

        let router = fakes.app();
        let ignored = router
            .clone()
            .oneshot(signed_request(&body, "application/json"))
            .await
            .expect("response");
        assert_eq!(ignored.status(), StatusCode::OK);
        let answered =
            router.oneshot(signed_request(&message, "application/json")).await.expect("response");
        assert_eq!(answered.status(), StatusCode::OK);

        let posts = fakes.api.posts().await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].text, "hi");
        assert_eq!(posts[0].thread_ts.as_deref(), Some("2.0"));
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let request = Request::post("/elsewhere").body(Body::empty()).expect("request");

        let response = Fakes::default().app().oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
