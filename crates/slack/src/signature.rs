use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::{debug, warn};

pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SIGNATURE_HEADER: &str = "x-slack-signature";

const SIGNATURE_VERSION: &str = "v0";
const SIGNATURE_PREFIX: &str = "v0=";

type HmacSha256 = Hmac<Sha256>;

/// Header values as received; absent headers stay `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SignatureHeaders<'a> {
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
}

/// Checks `v0={hex}` HMAC-SHA256 signatures over `v0:{timestamp}:{raw body}`.
/// Runs over the exact bytes received, before any parsing.
pub struct SignatureVerifier {
    signing_secret: Option<SecretString>,
    tolerance_secs: u64,
}

impl SignatureVerifier {
    /// `tolerance_secs == 0` turns the replay window off.
    pub fn new(signing_secret: Option<SecretString>, tolerance_secs: u64) -> Self {
        if signing_secret.is_none() {
            warn!(
                event_name = "security.signature.disabled",
                "no signing secret configured; inbound requests will not be authenticated"
            );
        }
        Self { signing_secret, tolerance_secs }
    }

    pub fn is_enforced(&self) -> bool {
        self.signing_secret.is_some()
    }

    pub fn verify(&self, raw_body: &[u8], headers: &SignatureHeaders<'_>) -> bool {
        self.verify_at(raw_body, headers, Utc::now().timestamp())
    }

    /// Same as [`verify`](Self::verify) with an explicit clock, in unix seconds.
    pub fn verify_at(&self, raw_body: &[u8], headers: &SignatureHeaders<'_>, now: i64) -> bool {
        let Some(secret) = self.signing_secret.as_ref() else {
            return true;
        };
        let (Some(timestamp), Some(signature)) = (headers.timestamp, headers.signature) else {
            debug!(
                event_name = "security.signature.missing_header",
                has_timestamp = headers.timestamp.is_some(),
                has_signature = headers.signature.is_some(),
                "signed request headers missing"
            );
            return false;
        };

        if self.tolerance_secs > 0 && !within_window(timestamp, now, self.tolerance_secs) {
            debug!(
                event_name = "security.signature.stale",
                tolerance_secs = self.tolerance_secs,
                "request timestamp outside replay window"
            );
            return false;
        }

        let Some(provided) = decode_signature(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) else {
            return false;
        };
        update_base_string(&mut mac, timestamp, raw_body);
        mac.verify_slice(&provided).is_ok()
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("enforced", &self.is_enforced())
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

/// Produces the header value a correctly signed request would carry.
pub fn compute_signature(signing_secret: &str, timestamp: &str, raw_body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(signing_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    update_base_string(&mut mac, timestamp, raw_body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

fn update_base_string(mac: &mut HmacSha256, timestamp: &str, raw_body: &[u8]) {
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(raw_body);
}

fn within_window(timestamp: &str, now: i64, tolerance_secs: u64) -> bool {
    let Ok(sent_at) = timestamp.trim().parse::<i64>() else {
        return false;
    };
    now.abs_diff(sent_at) <= tolerance_secs
}

/// Only the canonical lowercase form is accepted, so every distinct header
/// string maps to a distinct digest.
fn decode_signature(signature: &str) -> Option<Vec<u8>> {
    let digest = signature.strip_prefix(SIGNATURE_PREFIX)?;
    if !digest.bytes().all(|byte| matches!(byte, b'0'..=b'9' | b'a'..=b'f')) {
        return None;
    }
    hex::decode(digest).ok()
}
