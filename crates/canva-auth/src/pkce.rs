//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636
//!
//! Generates the code verifier, the S256 challenge, and the CSRF state token
//! used during the authorization flow. The verifier is kept server-side and
//! sent during token exchange; the challenge travels in the authorization URL
//! so Canva can check that the exchange came from whoever started the flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Generate a cryptographically random PKCE code verifier.
///
/// 32 random bytes encoded as URL-safe base64 without padding, which gives
/// 43 characters: the RFC 7636 minimum length.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate the opaque state token correlating a callback with its flow.
///
/// 32 random bytes, hex-encoded (64 characters). Independent of the PKCE pair.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Build the Canva authorization URL for a flow.
pub fn build_authorization_url(
    config: &ClientConfig,
    state: &str,
    challenge: &str,
) -> Result<String> {
    let scope = config.scope_param();
    let url = Url::parse_with_params(
        &config.authorize_endpoint,
        &[
            ("code_challenge_method", "s256"),
            ("response_type", "code"),
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("code_challenge", challenge),
            ("state", state),
        ],
    )
    .map_err(|e| Error::InvalidEndpoint(format!("{}: {e}", config.authorize_endpoint)))?;
    Ok(url.into())
}
