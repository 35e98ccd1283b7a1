//! Signature integrity properties for the credential verifier.
//!
//! Run with: `cargo test --test credential_test`

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use gatecheck::{CredentialVerifier, ScanError};
use proptest::prelude::*;

fn payload(token: &str, signature: &str) -> String {
    serde_json::json!({
        "token": token,
        "signature": signature,
        "meta": {}
    })
    .to_string()
}

proptest! {
    /// For all tokens and secrets, a correctly-signed payload verifies and
    /// yields the original token.
    #[test]
    fn signed_payload_roundtrips(
        token in "[A-Za-z0-9_-]{1,64}",
        secret in "[!-~]{1,64}",
    ) {
        let verifier = CredentialVerifier::new(&secret).unwrap();
        let signature = verifier.sign(&token).unwrap();

        let credential = verifier.verify(&payload(&token, &signature)).unwrap();
        prop_assert_eq!(credential.token, token);
    }

    /// Mutating any byte of the signature makes verification fail.
    #[test]
    fn any_flipped_signature_byte_fails(
        token in "[A-Za-z0-9_-]{1,64}",
        secret in "[!-~]{1,64}",
        flip in any::<(usize, u8)>(),
    ) {
        let verifier = CredentialVerifier::new(&secret).unwrap();
        let signature = verifier.sign(&token).unwrap();

        let mut bytes = BASE64.decode(&signature).unwrap();
        let (index, xor) = flip;
        let xor = if xor == 0 { 1 } else { xor }; // guarantee a real change
        let at = index % bytes.len();
        bytes[at] ^= xor;
        let tampered = BASE64.encode(&bytes);

        let result = verifier.verify(&payload(&token, &tampered));
        prop_assert!(matches!(result, Err(ScanError::CredentialInvalid(_))));
    }

    /// A signature minted under a different secret never verifies.
    #[test]
    fn cross_secret_signature_fails(
        token in "[A-Za-z0-9_-]{1,64}",
        secret_a in "[!-~]{1,64}",
        secret_b in "[!-~]{1,64}",
    ) {
        prop_assume!(secret_a != secret_b);
        let issuer = CredentialVerifier::new(&secret_a).unwrap();
        let gate = CredentialVerifier::new(&secret_b).unwrap();

        let signature = issuer.sign(&token).unwrap();
        let result = gate.verify(&payload(&token, &signature));
        prop_assert!(matches!(result, Err(ScanError::CredentialInvalid(_))));
    }

    /// Bare tokens (the legacy/manual path) pass through untouched.
    #[test]
    fn bare_tokens_pass_through(token in "[A-Za-z0-9_-]{1,64}") {
        let verifier = CredentialVerifier::new("secret").unwrap();
        let credential = verifier.verify(&token).unwrap();
        prop_assert_eq!(credential.token, token);
    }
}

#[test]
fn missing_secret_refuses_to_construct() {
    assert!(matches!(
        CredentialVerifier::new(""),
        Err(ScanError::Configuration(_))
    ));
}
