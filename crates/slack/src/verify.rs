use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_VERSION: &str = "v0";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SIGNATURE_HEADER: &str = "x-slack-signature";
/// Requests further than this from the local clock are treated as replays.
pub const MAX_CLOCK_SKEW_SECS: i64 = 5 * 60;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature or timestamp header is missing")]
    MissingHeaders,
    #[error("request timestamp is not a unix timestamp")]
    InvalidTimestamp,
    #[error("request timestamp is outside the accepted window")]
    StaleTimestamp,
    #[error("signature header is malformed")]
    Malformed,
    #[error("signature does not match request body")]
    Mismatch,
}

#[derive(Clone)]
pub struct SignatureVerifier {
    signing_secret: SecretString,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(signing_secret: SecretString) -> Self {
        Self { signing_secret }
    }

    /// Checks `v0=hex(hmac_sha256(secret, "v0:{timestamp}:{body}"))` against
    /// `signature` in constant time, after rejecting stale timestamps.
    pub fn verify(
        &self,
        timestamp: &str,
        body: &[u8],
        signature: &str,
        now_unix: i64,
    ) -> Result<(), SignatureError> {
        let timestamp = timestamp.trim();
        let signature = signature.trim();
        if timestamp.is_empty() || signature.is_empty() {
            return Err(SignatureError::MissingHeaders);
        }

        let issued_at = timestamp.parse::<i64>().map_err(|_| SignatureError::InvalidTimestamp)?;
        if (now_unix - issued_at).abs() > MAX_CLOCK_SKEW_SECS {
            return Err(SignatureError::StaleTimestamp);
        }

        let digest = signature
            .strip_prefix(SIGNATURE_VERSION)
            .and_then(|rest| rest.strip_prefix('='))
            .ok_or(SignatureError::Malformed)?;
        let provided = hex::decode(digest).map_err(|_| SignatureError::Malformed)?;

        let mac = self.mac_for(timestamp, body)?;
        mac.verify_slice(&provided).map_err(|_| SignatureError::Mismatch)
    }

    /// Produces the header value Slack would send for `body` at `timestamp`.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
        let mac = self.mac_for(timestamp, body)?;
        Ok(format!("{SIGNATURE_VERSION}={}", hex::encode(mac.finalize().into_bytes())))
    }

    fn mac_for(&self, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.expose_secret().as_bytes())
            .map_err(|_| SignatureError::Malformed)?;
        mac.update(SIGNATURE_VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        Ok(mac)
    }
}
