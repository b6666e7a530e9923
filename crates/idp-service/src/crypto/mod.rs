use crate::errors::IdpError;
use base64::{engine::general_purpose, Engine as _};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::{
    rand::{SecureRandom, SystemRandom},
    signature::{Ed25519KeyPair, KeyPair},
};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use tracing::instrument;

use common::jwt::MAX_JWT_SIZE_BYTES;

/// Generate an EdDSA (Ed25519) keypair using the system CSPRNG.
///
/// Returns `(public_key_pem, private_key_pkcs8)`. The PKCS#8 document is the
/// only copy of the private material; it never leaves the key store.
#[instrument(skip_all)]
pub fn generate_signing_key() -> Result<(String, Vec<u8>), IdpError> {
    let rng = SystemRandom::new();

    let pkcs8_bytes = Ed25519KeyPair::generate_pkcs8(&rng)
        .map_err(|e| IdpError::Crypto(format!("Keypair generation failed: {e}")))?;

    let key_pair = Ed25519KeyPair::from_pkcs8(pkcs8_bytes.as_ref())
        .map_err(|e| IdpError::Crypto(format!("Keypair parsing failed: {e}")))?;

    let public_key_bytes = key_pair.public_key().as_ref();

    // PEM wrapper over the base64 of the raw public key bytes
    let public_key_pem = format!(
        "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----",
        general_purpose::STANDARD.encode(public_key_bytes)
    );

    Ok((public_key_pem, pkcs8_bytes.as_ref().to_vec()))
}

/// Sign a claims structure as a JWT with an EdDSA private key.
///
/// The `kid` goes into the JWT header so relying parties can select the
/// matching verification key during rotation.
#[instrument(skip_all)]
pub fn sign_jwt<T: Serialize>(
    claims: &T,
    private_key_pkcs8: &[u8],
    key_id: &str,
) -> Result<String, IdpError> {
    // Validate the private key format before handing it to jsonwebtoken
    let _key_pair = Ed25519KeyPair::from_pkcs8(private_key_pkcs8)
        .map_err(|e| IdpError::Crypto(format!("Invalid private key format: {e}")))?;

    let encoding_key = EncodingKey::from_ed_der(private_key_pkcs8);

    let mut header = Header::new(Algorithm::EdDSA);
    header.typ = Some("JWT".to_string());
    header.kid = Some(key_id.to_string());

    let token = encode(&header, claims, &encoding_key)
        .map_err(|e| IdpError::Crypto(format!("JWT signing operation failed: {e}")))?;

    Ok(token)
}

/// Verify a JWT against an EdDSA public key in PEM form.
///
/// Issuer-side verification for tokens the provider itself minted (refresh
/// grants). Checks size before parsing, the signature, and `exp`. Audience
/// and issuer claims are the caller's to check; this function has no
/// knowledge of which claims structure `T` carries.
#[instrument(skip_all)]
pub fn verify_jwt<T: DeserializeOwned>(token: &str, public_key_pem: &str) -> Result<T, IdpError> {
    // Size check BEFORE any parsing or cryptographic operations
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "idp.crypto",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(IdpError::InvalidToken(
            "The token is invalid or expired".to_string(),
        ));
    }

    let public_key_bytes =
        common::jwt::decode_ed25519_public_key_pem(public_key_pem).map_err(|e| {
            tracing::debug!(target: "idp.crypto", error = %e, "Failed to decode public key PEM");
            IdpError::Crypto("Invalid public key format".to_string())
        })?;

    let decoding_key = DecodingKey::from_ed_der(&public_key_bytes);

    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.validate_exp = true;
    validation.validate_aud = false;

    let token_data = decode::<T>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(target: "idp.crypto", error = %e, "Token verification failed");
        IdpError::InvalidToken("The token is invalid or expired".to_string())
    })?;

    Ok(token_data.claims)
}

/// Generate a random URL-safe token of `num_bytes` entropy, base64url encoded.
///
/// Used for authorization codes (32 bytes = 256 bits).
#[instrument(skip_all)]
pub fn generate_url_safe_token(num_bytes: usize) -> Result<String, IdpError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; num_bytes];
    rng.fill(&mut bytes)
        .map_err(|e| IdpError::Crypto(format!("Random generation failed: {e}")))?;

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Compute the PKCE S256 code challenge for a verifier (RFC 7636 §4.2).
///
/// `base64url(sha256(ascii(verifier)))`, without padding.
#[must_use]
pub fn pkce_s256_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Constant-time comparison of a computed PKCE challenge against the stored one.
#[must_use]
pub fn challenges_match(computed: &str, stored: &str) -> bool {
    ring::constant_time::verify_slices_are_equal(computed.as_bytes(), stored.as_bytes()).is_ok()
}
