use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "https://slack.com/api/";
pub const DEFAULT_WEBHOOK_PATH: &str = "/api/messages";
const RESERVED_PATHS: &[&str] = &["/health", "/install", "/install/auth"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: Option<SecretString>,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub redirect_uri: Option<String>,
    pub scopes: Vec<String>,
    pub verification_token: Option<SecretString>,
    pub signing_secret: Option<SecretString>,
    pub api_base_url: String,
    pub signature_tolerance_secs: u64,
    pub response_url_timeout_secs: u64,
    pub cache_team_credentials: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub webhook_path: String,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// OAuth application credentials required to serve more than one workspace.
#[derive(Clone, Debug)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

/// How API credentials are obtained for an inbound turn.
#[derive(Clone, Debug)]
pub enum TenancyMode {
    /// One workspace, one static bot token.
    SingleTenant { bot_token: SecretString },
    /// Tokens are looked up per team; OAuth credentials drive installation.
    MultiTenant(OAuthCredentials),
}

impl TenancyMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SingleTenant { .. } => "single_tenant",
            Self::MultiTenant(_) => "multi_tenant",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub slack_bot_token: Option<String>,
    pub slack_client_id: Option<String>,
    pub slack_client_secret: Option<String>,
    pub slack_redirect_uri: Option<String>,
    pub slack_scopes: Option<Vec<String>>,
    pub slack_verification_token: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub slack_api_base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                bot_token: None,
                client_id: None,
                client_secret: None,
                redirect_uri: None,
                scopes: Vec::new(),
                verification_token: None,
                signing_secret: None,
                api_base_url: DEFAULT_API_BASE_URL.to_string(),
                signature_tolerance_secs: 300,
                response_url_timeout_secs: 10,
                cache_team_credentials: false,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3978,
                webhook_path: DEFAULT_WEBHOOK_PATH.to_string(),
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl SlackConfig {
    /// Resolves the tenancy mode. A bot token always selects single-tenant mode.
    pub fn tenancy(&self) -> Result<TenancyMode, ConfigError> {
        if let Some(bot_token) = &self.bot_token {
            let exposed = bot_token.expose_secret();
            if exposed.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "slack.bot_token is configured but blank".to_string(),
                ));
            }
            if !exposed.starts_with("xoxb-") {
                let hint = if exposed.starts_with("xapp-") {
                    " (hint: you may have used an app-level token instead of the bot token)"
                } else {
                    ""
                };
                return Err(ConfigError::Validation(format!(
                    "slack.bot_token must start with `xoxb-`{hint}"
                )));
            }
            return Ok(TenancyMode::SingleTenant { bot_token: bot_token.clone() });
        }

        let client_id = non_blank(self.client_id.as_deref());
        let client_secret = self
            .client_secret
            .as_ref()
            .filter(|secret| !secret.expose_secret().trim().is_empty());
        let redirect_uri = non_blank(self.redirect_uri.as_deref());
        let scopes: Vec<String> = self
            .scopes
            .iter()
            .map(|scope| scope.trim().to_string())
            .filter(|scope| !scope.is_empty())
            .collect();

        let mut missing = Vec::new();
        if client_id.is_none() {
            missing.push("slack.client_id");
        }
        if client_secret.is_none() {
            missing.push("slack.client_secret");
        }
        if redirect_uri.is_none() {
            missing.push("slack.redirect_uri");
        }
        if scopes.is_empty() {
            missing.push("slack.scopes");
        }

        match (client_id, client_secret, redirect_uri) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) if missing.is_empty() => {
                Ok(TenancyMode::MultiTenant(OAuthCredentials {
                    client_id: client_id.to_string(),
                    client_secret: client_secret.clone(),
                    redirect_uri: redirect_uri.to_string(),
                    scopes,
                }))
            }
            _ => Err(ConfigError::Validation(format!(
                "missing Slack API credentials: provide slack.bot_token, or all of client_id, \
                 client_secret, redirect_uri and scopes (missing: {})",
                missing.join(", ")
            ))),
        }
    }

    /// OAuth credentials when they are fully configured, regardless of tenancy mode.
    pub fn oauth_credentials(&self) -> Option<OAuthCredentials> {
        let without_token = SlackConfig { bot_token: None, ..self.clone() };
        match without_token.tenancy() {
            Ok(TenancyMode::MultiTenant(credentials)) => Some(credentials),
            _ => None,
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("turnwire.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = Some(secret_value(bot_token));
            }
            if let Some(client_id) = slack.client_id {
                self.slack.client_id = Some(client_id);
            }
            if let Some(client_secret) = slack.client_secret {
                self.slack.client_secret = Some(secret_value(client_secret));
            }
            if let Some(redirect_uri) = slack.redirect_uri {
                self.slack.redirect_uri = Some(redirect_uri);
            }
            if let Some(scopes) = slack.scopes {
                self.slack.scopes = scopes;
            }
            if let Some(verification_token) = slack.verification_token {
                self.slack.verification_token = Some(secret_value(verification_token));
            }
            if let Some(signing_secret) = slack.signing_secret {
                self.slack.signing_secret = Some(secret_value(signing_secret));
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
            if let Some(signature_tolerance_secs) = slack.signature_tolerance_secs {
                self.slack.signature_tolerance_secs = signature_tolerance_secs;
            }
            if let Some(response_url_timeout_secs) = slack.response_url_timeout_secs {
                self.slack.response_url_timeout_secs = response_url_timeout_secs;
            }
            if let Some(cache_team_credentials) = slack.cache_team_credentials {
                self.slack.cache_team_credentials = cache_team_credentials;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(webhook_path) = server.webhook_path {
                self.server.webhook_path = webhook_path;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TURNWIRE_SLACK_BOT_TOKEN") {
            self.slack.bot_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("TURNWIRE_SLACK_CLIENT_ID") {
            self.slack.client_id = Some(value);
        }
        if let Some(value) = read_env("TURNWIRE_SLACK_CLIENT_SECRET") {
            self.slack.client_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("TURNWIRE_SLACK_REDIRECT_URI") {
            self.slack.redirect_uri = Some(value);
        }
        if let Some(value) = read_env("TURNWIRE_SLACK_SCOPES") {
            self.slack.scopes = split_scopes(&value);
        }
        if let Some(value) = read_env("TURNWIRE_SLACK_VERIFICATION_TOKEN") {
            self.slack.verification_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("TURNWIRE_SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("TURNWIRE_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }
        if let Some(value) = read_env("TURNWIRE_SLACK_SIGNATURE_TOLERANCE_SECS") {
            self.slack.signature_tolerance_secs =
                parse_u64("TURNWIRE_SLACK_SIGNATURE_TOLERANCE_SECS", &value)?;
        }
        if let Some(value) = read_env("TURNWIRE_SLACK_RESPONSE_URL_TIMEOUT_SECS") {
            self.slack.response_url_timeout_secs =
                parse_u64("TURNWIRE_SLACK_RESPONSE_URL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TURNWIRE_SLACK_CACHE_TEAM_CREDENTIALS") {
            self.slack.cache_team_credentials =
                parse_bool("TURNWIRE_SLACK_CACHE_TEAM_CREDENTIALS", &value)?;
        }

        if let Some(value) = read_env("TURNWIRE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TURNWIRE_SERVER_PORT") {
            self.server.port = parse_u16("TURNWIRE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TURNWIRE_SERVER_WEBHOOK_PATH") {
            self.server.webhook_path = value;
        }
        if let Some(value) = read_env("TURNWIRE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TURNWIRE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("TURNWIRE_LOGGING_LEVEL").or_else(|| read_env("TURNWIRE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TURNWIRE_LOGGING_FORMAT").or_else(|| read_env("TURNWIRE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = Some(secret_value(bot_token));
        }
        if let Some(client_id) = overrides.slack_client_id {
            self.slack.client_id = Some(client_id);
        }
        if let Some(client_secret) = overrides.slack_client_secret {
            self.slack.client_secret = Some(secret_value(client_secret));
        }
        if let Some(redirect_uri) = overrides.slack_redirect_uri {
            self.slack.redirect_uri = Some(redirect_uri);
        }
        if let Some(scopes) = overrides.slack_scopes {
            self.slack.scopes = scopes;
        }
        if let Some(verification_token) = overrides.slack_verification_token {
            self.slack.verification_token = Some(secret_value(verification_token));
        }
        if let Some(signing_secret) = overrides.slack_signing_secret {
            self.slack.signing_secret = Some(secret_value(signing_secret));
        }
        if let Some(api_base_url) = overrides.slack_api_base_url {
            self.slack.api_base_url = api_base_url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("turnwire.toml"), PathBuf::from("config/turnwire.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    slack.tenancy()?;

    // A present-but-blank secret contradicts the intent to verify requests.
    if let Some(secret) = &slack.signing_secret {
        if secret.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "slack.signing_secret is configured but blank; remove it to run without \
                 signature verification"
                    .to_string(),
            ));
        }
    }
    if let Some(token) = &slack.verification_token {
        if token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "slack.verification_token is configured but blank".to_string(),
            ));
        }
    }

    validate_http_url("slack.api_base_url", &slack.api_base_url)?;
    if let Some(redirect_uri) = &slack.redirect_uri {
        validate_http_url("slack.redirect_uri", redirect_uri)?;
    }

    if slack.response_url_timeout_secs == 0 || slack.response_url_timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "slack.response_url_timeout_secs must be in range 1..=60".to_string(),
        ));
    }
    if slack.signature_tolerance_secs > 3_600 {
        return Err(ConfigError::Validation(
            "slack.signature_tolerance_secs must be at most 3600 (0 disables the replay window)"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(value.trim())
        .map_err(|error| ConfigError::Validation(format!("{key} is not a valid URL: {error}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if !server.webhook_path.starts_with('/') {
        return Err(ConfigError::Validation(
            "server.webhook_path must start with `/`".to_string(),
        ));
    }

    // Route captures and wildcards would turn the webhook into a pattern.
    let literal = server
        .webhook_path
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '/' | '-' | '_' | '.' | '~'));
    if !literal {
        return Err(ConfigError::Validation(
            "server.webhook_path may only contain letters, digits, `/`, `-`, `_`, `.` and `~`"
                .to_string(),
        ));
    }

    let path = server.webhook_path.trim_end_matches('/');
    if RESERVED_PATHS.contains(&path) {
        return Err(ConfigError::Validation(format!(
            "server.webhook_path `{}` collides with a built-in route",
            server.webhook_path
        )));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn split_scopes(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|scope| !scope.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    bot_token: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
    scopes: Option<Vec<String>>,
    verification_token: Option<String>,
    signing_secret: Option<String>,
    api_base_url: Option<String>,
    signature_tolerance_secs: Option<u64>,
    response_url_timeout_secs: Option<u64>,
    cache_team_credentials: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    webhook_path: Option<String>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
