use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::warn;
use turnwire_slack::oauth::{OAuthError, OAuthInstaller};

#[derive(Debug, Default, Deserialize)]
pub struct AuthCallback {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

pub fn router(installer: Arc<OAuthInstaller>) -> Router {
    Router::new()
        .route("/install", get(install))
        .route("/install/auth", get(complete_install))
        .with_state(installer)
}

pub async fn install(State(installer): State<Arc<OAuthInstaller>>) -> Redirect {
    Redirect::temporary(&installer.install_link())
}

pub async fn complete_install(
    State(installer): State<Arc<OAuthInstaller>>,
    Query(callback): Query<AuthCallback>,
) -> Response {
    if let Some(error) = callback.error {
        warn!(event_name = "oauth.install.denied", reason = %error, "install was not approved");
        return (StatusCode::FORBIDDEN, "installation was not approved").into_response();
    }

    match installer.validate_oauth_code(callback.code.as_deref().unwrap_or("")).await {
        Ok(installation) => (
            StatusCode::OK,
            format!("installed for team {}", installation.team_id),
        )
            .into_response(),
        Err(OAuthError::MissingCode) => {
            (StatusCode::BAD_REQUEST, "missing authorization code").into_response()
        }
        Err(error) => {
            warn!(event_name = "oauth.install.failed", error = %error, "install failed");
            (StatusCode::UNAUTHORIZED, "installation failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;
    use turnwire_core::config::OAuthCredentials;
    use turnwire_slack::{
        api::{OAuthAccess, TeamRef},
        credentials::{InMemoryTokenStore, TokenStore},
        oauth::OAuthInstaller,
        testing::ScriptedSlackApi,
    };

    use super::router;

    fn app() -> axum::Router {
        let api = ScriptedSlackApi::default().with_access(OAuthAccess {
            ok: false,
            error: Some("invalid_code".to_owned()),
            ..OAuthAccess::default()
        });
        app_with(api, Arc::new(InMemoryTokenStore::new()))
    }

    fn app_with(api: ScriptedSlackApi, store: Arc<InMemoryTokenStore>) -> axum::Router {
        let credentials = OAuthCredentials {
            client_id: "123.456".to_owned(),
            client_secret: "shh".to_owned().into(),
            redirect_uri: "https://bot.example.com/install/auth".to_owned(),
            scopes: vec!["chat:write".to_owned()],
        };
        let installer = OAuthInstaller::new(credentials, Arc::new(api), store);
        router(Arc::new(installer))
    }

    #[tokio::test]
    async fn install_redirects_to_authorize_url() {
        let request = Request::get("/install").body(Body::empty()).expect("request");

        let response = app().oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        assert!(location.starts_with("https://slack.com/oauth/v2/authorize?client_id=123.456"));
    }

    #[tokio::test]
    async fn callback_without_code_is_bad_request() {
        let request = Request::get("/install/auth").body(Body::empty()).expect("request");

        let response = app().oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejected_code_is_unauthorized() {
        let request =
            Request::get("/install/auth?code=stale").body(Body::empty()).expect("request");

        let response = app().oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn denied_install_is_forbidden() {
        let request =
            Request::get("/install/auth?error=access_denied").body(Body::empty()).expect("request");

        let response = app().oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn accepted_code_records_installation() {
        let store = Arc::new(InMemoryTokenStore::new());
        let api = ScriptedSlackApi::default().with_access(OAuthAccess {
            ok: true,
            access_token: Some("xoxb-installed".to_owned()),
            bot_user_id: Some("UBOT".to_owned()),
            team: Some(TeamRef { id: "T1".to_owned(), name: None }),
            ..OAuthAccess::default()
        });
        let request =
            Request::get("/install/auth?code=fresh").body(Body::empty()).expect("request");

        let response = app_with(api, Arc::clone(&store)).oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.bot_user_for_team("T1").await.as_deref(), Some("UBOT"));
    }
}
