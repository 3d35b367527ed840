use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use log::warn;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sentinel subject used by test sends; never persisted or matched against
/// real contacts.
pub const TEST_SUBJECT: &str = "test";

/// Claims bound into an unsubscribe token. `iat` is informational only;
/// tokens carry no expiry in this design.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnsubscribeClaims {
    pub sub: String,
    pub iat: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("signature mismatch")]
    BadSignature,
}

/// Stateless, tamper-evident unsubscribe tokens:
/// `base64url(JSON{sub, iat}) . base64url(HMAC-SHA256(payload))`.
/// Avoids a database round trip per outbound link.
#[derive(Clone)]
pub struct UnsubscribeTokenCodec {
    secret: Option<String>,
}

impl UnsubscribeTokenCodec {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    /// Mint a token for a subject. Without a signing secret this fails safe
    /// by returning None (the caller omits the unsubscribe link) rather than
    /// emitting an unverifiable token.
    pub fn encode(&self, subject: &str) -> Option<String> {
        self.encode_at(subject, Utc::now().timestamp_millis())
    }

    pub fn encode_at(&self, subject: &str, issued_at_ms: i64) -> Option<String> {
        let Some(secret) = &self.secret else {
            warn!("UNSUBSCRIBE_SECRET not configured, omitting unsubscribe token");
            return None;
        };

        let claims = UnsubscribeClaims {
            sub: subject.to_string(),
            iat: issued_at_ms,
        };
        let json = serde_json::to_vec(&claims).ok()?;
        let payload = URL_SAFE_NO_PAD.encode(json);

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Some(format!("{payload}.{signature}"))
    }

    /// Verify a token and return its claims. Total: malformed or tampered
    /// input yields a typed error, never a panic.
    pub fn verify(&self, token: &str) -> Result<UnsubscribeClaims, TokenError> {
        let secret = self.secret.as_deref().ok_or(TokenError::BadSignature)?;

        let (payload, signature) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::BadSignature)?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> UnsubscribeTokenCodec {
        UnsubscribeTokenCodec::new(Some("unit-test-secret".to_string()))
    }

    #[test]
    fn round_trip_preserves_subject() {
        let codec = codec();
        let token = codec.encode_at("a4c135b0-0000-0000-0000-000000000001", 1700000000000).unwrap();
        let claims = codec.verify(&token).unwrap();
        assert_eq!(claims.sub, "a4c135b0-0000-0000-0000-000000000001");
        assert_eq!(claims.iat, 1700000000000);
    }

    #[test]
    fn flipped_signature_byte_fails() {
        let codec = codec();
        let token = codec.encode_at("abc", 0).unwrap();
        let (payload, sig) = token.rsplit_once('.').unwrap();
        let mut bytes = URL_SAFE_NO_PAD.decode(sig).unwrap();
        bytes[0] ^= 0x01;
        let tampered = format!("{payload}.{}", URL_SAFE_NO_PAD.encode(bytes));
        assert_eq!(codec.verify(&tampered), Err(TokenError::BadSignature));
    }

    #[test]
    fn tampered_payload_fails() {
        let codec = codec();
        let token = codec.encode_at("abc", 0).unwrap();
        let (_, sig) = token.rsplit_once('.').unwrap();
        let other_payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"xyz","iat":0}"#);
        let tampered = format!("{other_payload}.{sig}");
        assert_eq!(codec.verify(&tampered), Err(TokenError::BadSignature));
    }

    #[test]
    fn missing_separator_is_malformed_not_a_panic() {
        assert_eq!(codec().verify("no-separator-here"), Err(TokenError::Malformed));
        assert_eq!(codec().verify(""), Err(TokenError::Malformed));
    }

    #[test]
    fn garbage_base64_is_malformed() {
        assert_eq!(codec().verify("!!!.???"), Err(TokenError::Malformed));
    }

    #[test]
    fn no_secret_means_no_token() {
        let codec = UnsubscribeTokenCodec::new(None);
        assert!(codec.encode("abc").is_none());
        assert!(codec.verify("anything.atall").is_err());
    }
}
