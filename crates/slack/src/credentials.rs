//! Maps a team id to the API client and bot identity used for that team.
//!
//! Single-tenant deployments hold one client built from the static bot token
//! and learn the bot identity once at startup. Multi-tenant deployments look
//! both up per team through a [`TokenStore`], optionally caching the result.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use turnwire_core::CredentialError;

use crate::api::{ApiError, HttpSlackApi, SlackApi};

/// Credentials granted to the bot by one workspace install.
#[derive(Clone)]
pub struct Installation {
    pub team_id: String,
    pub bot_token: SecretString,
    pub bot_user_id: Option<String>,
}

impl std::fmt::Debug for Installation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installation")
            .field("team_id", &self.team_id)
            .field("bot_token", &"[REDACTED]")
            .field("bot_user_id", &self.bot_user_id)
            .finish()
    }
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn token_for_team(&self, team_id: &str) -> Option<SecretString>;
    async fn bot_user_for_team(&self, team_id: &str) -> Option<String>;
}

#[async_trait]
pub trait InstallationStore: Send + Sync {
    async fn save(&self, installation: Installation);
}

/// Process-local installs, lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    installations: RwLock<HashMap<String, Installation>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn remove(&self, team_id: &str) -> Option<Installation> {
        self.installations.write().await.remove(team_id)
    }

    pub async fn len(&self) -> usize {
        self.installations.read().await.len()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn token_for_team(&self, team_id: &str) -> Option<SecretString> {
        self.installations.read().await.get(team_id).map(|install| install.bot_token.clone())
    }

    async fn bot_user_for_team(&self, team_id: &str) -> Option<String> {
        self.installations.read().await.get(team_id).and_then(|install| install.bot_user_id.clone())
    }
}

#[async_trait]
impl InstallationStore for InMemoryTokenStore {
    async fn save(&self, installation: Installation) {
        self.installations.write().await.insert(installation.team_id.clone(), installation);
    }
}

/// Builds a wire client for a per-team token.
pub trait ApiClientFactory: Send + Sync {
    fn client_for_token(&self, token: &SecretString) -> Result<Arc<dyn SlackApi>, ApiError>;
}

#[derive(Clone, Debug)]
pub struct HttpClientFactory {
    http: Client,
    base_url: String,
}

impl HttpClientFactory {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }
}

impl ApiClientFactory for HttpClientFactory {
    fn client_for_token(&self, token: &SecretString) -> Result<Arc<dyn SlackApi>, ApiError> {
        let client = HttpSlackApi::new(self.http.clone(), &self.base_url, Some(token.clone()))?;
        Ok(Arc::new(client))
    }
}

/// A resolved client for one team.
#[derive(Clone)]
pub struct CredentialHandle {
    team_id: Option<String>,
    client: Arc<dyn SlackApi>,
    bot_user_id: Option<String>,
}

impl CredentialHandle {
    pub fn new(client: Arc<dyn SlackApi>) -> Self {
        Self { team_id: None, client, bot_user_id: None }
    }

    pub fn client(&self) -> &dyn SlackApi {
        self.client.as_ref()
    }

    /// `None` for the static single-tenant handle.
    pub fn team_id(&self) -> Option<&str> {
        self.team_id.as_deref()
    }

    pub fn bot_user_id(&self) -> Option<&str> {
        self.bot_user_id.as_deref()
    }
}

impl std::fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHandle")
            .field("team_id", &self.team_id)
            .field("bot_user_id", &self.bot_user_id)
            .finish_non_exhaustive()
    }
}

/// A cached handle plus the store record it was built from.
struct CachedHandle {
    token: SecretString,
    handle: Arc<CredentialHandle>,
}

impl CachedHandle {
    fn matches(&self, token: &SecretString, bot_user_id: Option<&str>) -> bool {
        self.token.expose_secret() == token.expose_secret()
            && self.handle.bot_user_id() == bot_user_id
    }
}

enum Tenancy {
    Single(Arc<CredentialHandle>),
    Multi {
        store: Arc<dyn TokenStore>,
        factory: Arc<dyn ApiClientFactory>,
        cache: Option<RwLock<HashMap<String, CachedHandle>>>,
    },
}

pub struct CredentialResolver {
    tenancy: Tenancy,
}

impl CredentialResolver {
    /// Asks the platform who the static token belongs to. Failure here is
    /// fatal: a single-tenant bot with an unknown identity cannot classify
    /// mentions.
    pub async fn single_tenant(client: Arc<dyn SlackApi>) -> Result<Self, CredentialError> {
        let identity = client.test_auth().await.map_err(|error| {
            warn!(event_name = "credentials.identity.failed", error = %error, "auth.test failed");
            CredentialError::IdentityLookupFailed { team_id: String::new() }
        })?;

        let team_id = identity.team_id.clone().unwrap_or_default();
        let bot_user_id = match identity.user_id {
            Some(user_id) if identity.ok && !user_id.trim().is_empty() => user_id,
            _ => {
                warn!(
                    event_name = "credentials.identity.failed",
                    error = identity.error.as_deref().unwrap_or("missing user_id"),
                    "auth.test rejected the bot token"
                );
                return Err(CredentialError::IdentityLookupFailed { team_id });
            }
        };

        info!(
            event_name = "credentials.identity.resolved",
            team_id = %team_id,
            bot_user_id = %bot_user_id,
            "single-tenant bot identity resolved"
        );
        Ok(Self::single_tenant_with_identity(client, bot_user_id))
    }

    pub fn single_tenant_with_identity(
        client: Arc<dyn SlackApi>,
        bot_user_id: impl Into<String>,
    ) -> Self {
        let handle =
            CredentialHandle { team_id: None, client, bot_user_id: Some(bot_user_id.into()) };
        Self { tenancy: Tenancy::Single(Arc::new(handle)) }
    }

    pub fn multi_tenant(store: Arc<dyn TokenStore>, factory: Arc<dyn ApiClientFactory>) -> Self {
        Self { tenancy: Tenancy::Multi { store, factory, cache: None } }
    }

    /// Reuses per-team clients while the stored token and bot identity are
    /// unchanged. The store is still consulted on every resolve.
    pub fn with_team_cache(mut self) -> Self {
        if let Tenancy::Multi { cache, .. } = &mut self.tenancy {
            *cache = Some(RwLock::new(HashMap::new()));
        }
        self
    }

    pub fn is_multi_tenant(&self) -> bool {
        matches!(self.tenancy, Tenancy::Multi { .. })
    }

    pub async fn resolve(&self, team_id: &str) -> Result<Arc<CredentialHandle>, CredentialError> {
        let (store, factory, cache) = match &self.tenancy {
            Tenancy::Single(handle) => return Ok(Arc::clone(handle)),
            Tenancy::Multi { store, factory, cache } => (store, factory, cache),
        };
        if team_id.trim().is_empty() {
            return Err(CredentialError::MissingTeam);
        }

        let token = match store.token_for_team(team_id).await {
            Some(token) if !token.expose_secret().trim().is_empty() => token,
            _ => {
                if let Some(cache) = cache {
                    cache.write().await.remove(team_id);
                }
                debug!(
                    event_name = "credentials.token.missing",
                    team_id = %team_id,
                    "no bot token stored for team"
                );
                return Err(token_lookup_failed(team_id));
            }
        };
        let bot_user_id =
            store.bot_user_for_team(team_id).await.filter(|user_id| !user_id.trim().is_empty());

        if let Some(cache) = cache {
            if let Some(cached) = cache.read().await.get(team_id) {
                if cached.matches(&token, bot_user_id.as_deref()) {
                    return Ok(Arc::clone(&cached.handle));
                }
            }
        }

        let client = factory.client_for_token(&token).map_err(|error| {
            warn!(
                event_name = "credentials.client.failed",
                team_id = %team_id,
                error = %error,
                "could not build api client for team"
            );
            token_lookup_failed(team_id)
        })?;
        let handle = Arc::new(CredentialHandle {
            team_id: Some(team_id.to_owned()),
            client,
            bot_user_id,
        });

        if let Some(cache) = cache {
            let mut cached = cache.write().await;
            // A concurrent resolve may have cached the same install already.
            if let Some(existing) = cached.get(team_id) {
                if existing.matches(&token, handle.bot_user_id()) {
                    return Ok(Arc::clone(&existing.handle));
                }
            }
            debug!(
                event_name = "credentials.cache.refreshed",
                team_id = %team_id,
                "cached client for team replaced"
            );
            cached.insert(team_id.to_owned(), CachedHandle { token, handle: Arc::clone(&handle) });
        }
        Ok(handle)
    }
}

fn token_lookup_failed(team_id: &str) -> CredentialError {
    CredentialError::TokenLookupFailed { team_id: team_id.to_owned() }
}
