//! Credential verification.
//!
//! A scanned payload is either a bare ticket token (legacy tickets and
//! manual entry) or a JSON object `{token, signature, meta}` whose signature
//! is an HMAC-SHA256 over the token, computed with a pre-shared secret and
//! transported base64-encoded. Signatures are compared in constant time.

use crate::error::ScanError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// A structured signed payload as carried in a QR code or NFC tag.
#[derive(Debug, Deserialize)]
struct SignedPayload {
    token: String,
    signature: String,
    #[serde(default)]
    meta: serde_json::Map<String, serde_json::Value>,
}

/// The outcome of successful verification: the ticket token plus whatever
/// metadata the issuer embedded in the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCredential {
    /// The verified (or legacy plain) ticket token
    pub token: String,
    /// Issuer metadata carried alongside the token
    pub meta: serde_json::Map<String, serde_json::Value>,
}

/// Verifies the cryptographic signature of scanned payloads.
///
/// Construction fails without a signing secret: a gate that cannot verify
/// signatures must not start and silently wave unsigned credentials through.
#[derive(Clone)]
pub struct CredentialVerifier {
    key: Vec<u8>,
}

impl std::fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("CredentialVerifier").finish_non_exhaustive()
    }
}

impl CredentialVerifier {
    /// Create a verifier over the pre-shared signing secret.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Configuration`] when the secret is empty.
    pub fn new(secret: &str) -> Result<Self, ScanError> {
        if secret.trim().is_empty() {
            return Err(ScanError::Configuration(
                "signing secret must not be empty".to_string(),
            ));
        }
        Ok(Self {
            key: secret.as_bytes().to_vec(),
        })
    }

    /// Verify a raw scanned payload and extract the ticket token.
    ///
    /// Bare strings (not JSON) are the legacy/manual-entry path and pass
    /// through without a signature requirement. Structured payloads must
    /// carry a valid HMAC-SHA256 signature over the token.
    ///
    /// # Errors
    ///
    /// - [`ScanError::CredentialInvalid`] on malformed structure, undecodable
    ///   or mismatching signature, or an empty payload.
    /// - [`ScanError::Configuration`] when the HMAC primitive rejects the key.
    pub fn verify(&self, raw: &str) -> Result<VerifiedCredential, ScanError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ScanError::CredentialInvalid("empty payload".to_string()));
        }

        let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
            // Not JSON: plain ticket identifier (legacy / manual entry)
            return Ok(VerifiedCredential {
                token: trimmed.to_string(),
                meta: serde_json::Map::new(),
            });
        };

        match value {
            serde_json::Value::Object(_) => {
                let payload: SignedPayload =
                    serde_json::from_str(trimmed).map_err(|e| {
                        ScanError::CredentialInvalid(format!("malformed signed payload: {e}"))
                    })?;
                self.check_signature(&payload)?;
                Ok(VerifiedCredential {
                    token: payload.token,
                    meta: payload.meta,
                })
            },
            // A JSON string is still just a quoted token
            serde_json::Value::String(token) if !token.trim().is_empty() => {
                Ok(VerifiedCredential {
                    token: token.trim().to_string(),
                    meta: serde_json::Map::new(),
                })
            },
            _ => Err(ScanError::CredentialInvalid(
                "payload is neither a token nor a signed object".to_string(),
            )),
        }
    }

    /// Compute the base64 signature for a token.
    ///
    /// Used by issuers (and tests) to mint signed payloads.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Configuration`] when the HMAC primitive rejects
    /// the key.
    pub fn sign(&self, token: &str) -> Result<String, ScanError> {
        Ok(BASE64.encode(self.tag(token)?))
    }

    fn check_signature(&self, payload: &SignedPayload) -> Result<(), ScanError> {
        if payload.token.is_empty() {
            return Err(ScanError::CredentialInvalid("empty token".to_string()));
        }

        let presented = BASE64.decode(&payload.signature).map_err(|_| {
            ScanError::CredentialInvalid("signature is not valid base64".to_string())
        })?;

        let expected = self.tag(&payload.token)?;

        // Timing-safe comparison: a byte-wise early exit would leak how much
        // of a forged signature matches.
        if !constant_time_eq::constant_time_eq(&expected, &presented) {
            return Err(ScanError::CredentialInvalid(
                "signature mismatch".to_string(),
            ));
        }
        Ok(())
    }

    fn tag(&self, token: &str) -> Result<Vec<u8>, ScanError> {
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| {
            ScanError::Configuration("HMAC-SHA256 rejected the signing key".to_string())
        })?;
        mac.update(token.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    fn verifier() -> CredentialVerifier {
        CredentialVerifier::new("gate-secret").unwrap()
    }

    fn signed_payload(verifier: &CredentialVerifier, token: &str) -> String {
        let signature = verifier.sign(token).unwrap();
        serde_json::json!({
            "token": token,
            "signature": signature,
            "meta": { "issuer": "box-office" }
        })
        .to_string()
    }

    #[test]
    fn empty_secret_is_a_configuration_error() {
        assert!(matches!(
            CredentialVerifier::new("  "),
            Err(ScanError::Configuration(_))
        ));
    }

    #[test]
    fn bare_string_passes_as_legacy_token() {
        let cred = verifier().verify("TKT-12345").unwrap();
        assert_eq!(cred.token, "TKT-12345");
        assert!(cred.meta.is_empty());
    }

    #[test]
    fn valid_signature_verifies_and_carries_meta() {
        let v = verifier();
        let cred = v.verify(&signed_payload(&v, "TKT-777")).unwrap();
        assert_eq!(cred.token, "TKT-777");
        assert_eq!(
            cred.meta.get("issuer").and_then(|v| v.as_str()),
            Some("box-office")
        );
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let v = verifier();
        let payload = serde_json::json!({
            "token": "TKT-777",
            "signature": BASE64.encode(b"not the real signature"),
        })
        .to_string();
        assert!(matches!(
            v.verify(&payload),
            Err(ScanError::CredentialInvalid(_))
        ));
    }

    #[test]
    fn signature_from_wrong_secret_is_rejected() {
        let issuer = CredentialVerifier::new("other-secret").unwrap();
        let payload = signed_payload(&issuer, "TKT-777");
        assert!(matches!(
            verifier().verify(&payload),
            Err(ScanError::CredentialInvalid(_))
        ));
    }

    #[test]
    fn object_missing_fields_is_malformed_not_legacy() {
        let result = verifier().verify(r#"{"token": "TKT-1"}"#);
        assert!(matches!(result, Err(ScanError::CredentialInvalid(_))));
    }

    #[test]
    fn undecodable_signature_is_rejected() {
        let payload = r#"{"token": "TKT-1", "signature": "%%% not base64 %%%"}"#;
        assert!(matches!(
            verifier().verify(payload),
            Err(ScanError::CredentialInvalid(_))
        ));
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(matches!(
            verifier().verify("   "),
            Err(ScanError::CredentialInvalid(_))
        ));
    }
}
