use thiserror::Error;

/// Failures while turning a team id into a usable API handle.
///
/// Variants carry the team id only; token values never appear in errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("team id is required to resolve credentials in multi-tenant mode")]
    MissingTeam,
    #[error("no API token available for team `{team_id}`")]
    TokenLookupFailed { team_id: String },
    #[error("bot identity could not be resolved for team `{team_id}`")]
    IdentityLookupFailed { team_id: String },
}

/// Failures of an outbound reply. These are reported to bot logic and never
/// change the status of the inbound HTTP response on their own.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("update/delete requires the id of an existing message")]
    MissingTargetMessage,
    #[error("ephemeral and interactive replies require a target user")]
    MissingTargetUser,
    #[error("interactive replace requires a response url from the originating turn")]
    MissingResponseUrl,
    #[error("opening a dialog requires a trigger id")]
    MissingTriggerId,
    #[error("turn was cancelled before the reply was sent")]
    Cancelled,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("platform rejected the request: {0}")]
    RemoteRejected(String),
}

/// Reasons an inbound webhook is turned away before bot logic runs.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RejectionError {
    #[error("request signature verification failed")]
    SignatureInvalid,
    #[error("verification token did not match")]
    TokenMismatch,
    #[error("malformed payload ({body_len} bytes): {reason}")]
    MalformedPayload { body_len: usize, reason: String },
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl RejectionError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::SignatureInvalid => 401,
            Self::TokenMismatch => 403,
            Self::MalformedPayload { .. } => 400,
            Self::Credential(_) => 500,
        }
    }

    /// Response body sent to the caller. Fixed strings so nothing from the
    /// request or the credential store is reflected back.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::SignatureInvalid => "invalid request signature",
            Self::TokenMismatch => "invalid verification token",
            Self::MalformedPayload { .. } => "unrecognized payload",
            Self::Credential(_) => "credentials unavailable",
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::SignatureInvalid => "signature_invalid",
            Self::TokenMismatch => "token_mismatch",
            Self::MalformedPayload { .. } => "malformed_payload",
            Self::Credential(CredentialError::MissingTeam) => "credential_missing_team",
            Self::Credential(CredentialError::TokenLookupFailed { .. }) => {
                "credential_token_lookup_failed"
            }
            Self::Credential(CredentialError::IdentityLookupFailed { .. }) => {
                "credential_identity_lookup_failed"
            }
        }
    }
}
