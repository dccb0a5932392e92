use crate::errors::ServiceError;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Hex-encoded HMAC-SHA256 of `message` under `secret`.
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature against HMAC-SHA256(`secret`, `message`).
pub fn verify_hmac_hex(secret: &[u8], message: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&signature).is_ok()
}

/// Shared-secret scheme: `x-timestamp` plus `x-signature`, the hex
/// HMAC-SHA256 of `"{timestamp}.{body}"`, accepted within a tolerance window.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: u64,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// Produces the header values a sender attaches to `body` at `timestamp`.
    pub fn sign(&self, timestamp: i64, body: &[u8]) -> String {
        hmac_sha256_hex(self.secret.as_bytes(), &signed_payload(timestamp, body))
    }

    pub fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), ServiceError> {
        self.verify_at(headers, body, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(&self, headers: &HeaderMap, body: &[u8], now: i64) -> Result<(), ServiceError> {
        let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
        let (Some(timestamp), Some(signature)) = (header(TIMESTAMP_HEADER), header(SIGNATURE_HEADER))
        else {
            return Err(ServiceError::Unauthorized(
                "missing webhook signature headers".to_string(),
            ));
        };

        let timestamp: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| ServiceError::Unauthorized("malformed webhook timestamp".to_string()))?;
        if now.abs_diff(timestamp) > self.tolerance_secs {
            warn!(timestamp, now, "webhook timestamp outside tolerance");
            return Err(ServiceError::Unauthorized(
                "webhook timestamp outside tolerance".to_string(),
            ));
        }

        if !verify_hmac_hex(
            self.secret.as_bytes(),
            &signed_payload(timestamp, body),
            signature,
        ) {
            warn!("webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
        Ok(())
    }
}

fn signed_payload(timestamp: i64, body: &[u8]) -> Vec<u8> {
    let mut payload = format!("{}.", timestamp).into_bytes();
    payload.extend_from_slice(body);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(timestamp: i64, signature: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_str(&timestamp.to_string()).unwrap());
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(signature).unwrap());
        headers
    }

    #[test]
    fn accepts_valid_signature() {
        let verifier = SignatureVerifier::new("whsec", 300);
        let body = br#"{"order_id":"x"}"#;
        let signature = verifier.sign(1_700_000_000, body);
        assert!(verifier
            .verify_at(&headers(1_700_000_000, &signature), body, 1_700_000_100)
            .is_ok());
    }

    #[test]
    fn rejects_tampered_body() {
        let verifier = SignatureVerifier::new("whsec", 300);
        let signature = verifier.sign(1_700_000_000, b"original");
        assert!(verifier
            .verify_at(&headers(1_700_000_000, &signature), b"tampered", 1_700_000_000)
            .is_err());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let verifier = SignatureVerifier::new("whsec", 300);
        let signature = verifier.sign(1_700_000_000, b"body");
        let err = verifier
            .verify_at(&headers(1_700_000_000, &signature), b"body", 1_700_000_301)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn rejects_missing_headers_and_garbage() {
        let verifier = SignatureVerifier::new("whsec", 300);
        assert!(verifier.verify_at(&HeaderMap::new(), b"body", 0).is_err());
        assert!(verifier.verify_at(&headers(0, "not-hex"), b"body", 0).is_err());
    }

    #[test]
    fn hmac_hex_round_trips() {
        let signature = hmac_sha256_hex(b"key", b"message");
        assert_eq!(signature.len(), 64);
        assert!(verify_hmac_hex(b"key", b"message", &signature));
        assert!(!verify_hmac_hex(b"other", b"message", &signature));
    }
}
