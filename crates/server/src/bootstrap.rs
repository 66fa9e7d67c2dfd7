use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tracing::info;
use turnwire_core::{
    config::{AppConfig, ConfigError, LoadOptions, TenancyMode},
    CredentialError,
};
use turnwire_slack::{
    api::{ApiError, HttpResponseUrlPoster, HttpSlackApi},
    credentials::{CredentialResolver, HttpClientFactory, InMemoryTokenStore},
    oauth::OAuthInstaller,
    outbound::OutboundFormatter,
    signature::SignatureVerifier,
    TurnDispatcher,
};

pub struct Application {
    pub config: AppConfig,
    pub dispatcher: Arc<TurnDispatcher>,
    /// Present only in multi-tenant mode.
    pub installer: Option<Arc<OAuthInstaller>>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("slack api client setup failed: {0}")]
    Api(#[from] ApiError),
    #[error("slack bot token was rejected at startup: {0}")]
    Credential(#[from] CredentialError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let tenancy = config.slack.tenancy()?;
    let base_url = config.slack.api_base_url.clone();
    let http = reqwest::Client::builder()
        .build()
        .map_err(|error| ApiError::Transport(error.to_string()))?;

    let (resolver, installer) = match tenancy {
        TenancyMode::SingleTenant { bot_token } => {
            let client = HttpSlackApi::new(http, &base_url, Some(bot_token))?;
            (CredentialResolver::single_tenant(Arc::new(client)).await?, None)
        }
        TenancyMode::MultiTenant(credentials) => {
            let store = Arc::new(InMemoryTokenStore::new());
            let factory = HttpClientFactory::new(http.clone(), base_url.clone());
            let mut resolver =
                CredentialResolver::multi_tenant(Arc::clone(&store) as _, Arc::new(factory));
            if config.slack.cache_team_credentials {
                resolver = resolver.with_team_cache();
            }
            let oauth_client = HttpSlackApi::new(http, &base_url, None)?;
            let installer = OAuthInstaller::new(credentials, Arc::new(oauth_client), store);
            (resolver, Some(Arc::new(installer)))
        }
    };

    let poster =
        HttpResponseUrlPoster::new(Duration::from_secs(config.slack.response_url_timeout_secs))?;
    let verifier = SignatureVerifier::new(
        config.slack.signing_secret.clone(),
        config.slack.signature_tolerance_secs,
    );
    let dispatcher = TurnDispatcher::new(
        verifier,
        config.slack.verification_token.clone(),
        Arc::new(resolver),
        Arc::new(OutboundFormatter::new(Arc::new(poster))),
    );

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        tenancy = if installer.is_some() { "multi_tenant" } else { "single_tenant" },
        signature_verification = dispatcher.signature_enforced(),
        "dispatcher initialized"
    );
    Ok(Application { config, dispatcher: Arc::new(dispatcher), installer })
}

#[cfg(test)]
mod tests {
    use turnwire_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_without_slack_credentials() {
        let result = bootstrap(LoadOptions::default()).await;

        let message = result.err().expect("bootstrap should fail").to_string();
        assert!(message.contains("missing Slack API credentials"));
    }

    #[tokio::test]
    async fn bootstrap_rejects_app_level_token_as_bot_token() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                slack_bot_token: Some("xapp-1-A111-222".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("bootstrap should fail").to_string();
        assert!(message.contains("xoxb-"));
    }

    #[tokio::test]
    async fn multi_tenant_bootstrap_needs_no_network() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                slack_client_id: Some("123.456".to_string()),
                slack_client_secret: Some("client-secret".to_string()),
                slack_redirect_uri: Some("https://bot.example.com/install/auth".to_string()),
                slack_scopes: Some(vec!["chat:write".to_string(), "commands".to_string()]),
                slack_signing_secret: Some("signing-secret".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("multi-tenant bootstrap should succeed offline");

        assert!(app.dispatcher.multi_tenant());
        assert!(app.dispatcher.signature_enforced());
        let installer = app.installer.expect("installer");
        assert!(installer.install_link().contains("client_id=123.456"));
    }
}
