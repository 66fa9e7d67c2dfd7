use std::sync::Arc;

use secrecy::SecretString;
use thiserror::Error;
use tracing::{info, warn};
use turnwire_core::config::OAuthCredentials;
use url::Url;

use crate::{
    api::{OAuthExchange, SlackApi},
    credentials::{Installation, InstallationStore},
};

pub const AUTHORIZE_URL: &str = "https://slack.com/oauth/v2/authorize";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OAuthError {
    #[error("authorization code is missing")]
    MissingCode,
    #[error("oauth exchange rejected: {0}")]
    Rejected(String),
    #[error("oauth exchange response lacks {0}")]
    IncompleteResponse(&'static str),
    #[error("oauth exchange transport failure: {0}")]
    Transport(String),
}

/// OAuth v2 install flow for multi-tenant deployments.
pub struct OAuthInstaller {
    credentials: OAuthCredentials,
    api: Arc<dyn SlackApi>,
    installations: Arc<dyn InstallationStore>,
}

impl OAuthInstaller {
    pub fn new(
        credentials: OAuthCredentials,
        api: Arc<dyn SlackApi>,
        installations: Arc<dyn InstallationStore>,
    ) -> Self {
        Self { credentials, api, installations }
    }

    /// Link a workspace admin follows to install the app.
    pub fn install_link(&self) -> String {
        install_link(&self.credentials)
    }

    /// Trades the redirect's `code` for a bot token and records the install.
    pub async fn validate_oauth_code(&self, code: &str) -> Result<Installation, OAuthError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(OAuthError::MissingCode);
        }

        let exchange = OAuthExchange {
            client_id: self.credentials.client_id.clone(),
            client_secret: self.credentials.client_secret.clone(),
            redirect_uri: self.credentials.redirect_uri.clone(),
            code: code.to_owned(),
        };
        let access = self
            .api
            .exchange_oauth_code(&exchange)
            .await
            .map_err(|error| OAuthError::Transport(error.to_string()))?;
        if !access.ok {
            let reason = access.error.unwrap_or_else(|| "unknown_error".to_owned());
            warn!(
                event_name = "oauth.exchange.rejected",
                reason = %reason,
                "oauth exchange rejected"
            );
            return Err(OAuthError::Rejected(reason));
        }

        let team_id = access
            .team
            .map(|team| team.id)
            .filter(|id| !id.trim().is_empty())
            .ok_or(OAuthError::IncompleteResponse("team id"))?;
        let bot_token = access
            .access_token
            .filter(|token| !token.trim().is_empty())
            .map(SecretString::from)
            .ok_or(OAuthError::IncompleteResponse("access token"))?;

        let installation =
            Installation { team_id, bot_token, bot_user_id: access.bot_user_id };
        self.installations.save(installation.clone()).await;
        info!(
            event_name = "oauth.install.completed",
            team_id = %installation.team_id,
            "workspace installed"
        );
        Ok(installation)
    }
}

pub fn install_link(credentials: &OAuthCredentials) -> String {
    let mut link = match Url::parse(AUTHORIZE_URL) {
        Ok(link) => link,
        Err(_) => return AUTHORIZE_URL.to_owned(),
    };
    link.query_pairs_mut()
        .append_pair("client_id", &credentials.client_id)
        .append_pair("scope", &credentials.scopes.join(","))
        .append_pair("redirect_uri", &credentials.redirect_uri);
    link.into()
}
