//! Proof Key for Code Exchange (RFC 7636) and anti-forgery state values

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// A PKCE verifier and its S256 challenge
#[derive(Clone)]
pub struct PkceCodes {
    code_verifier: String,
    code_challenge: String,
}

impl PkceCodes {
    /// Generates a fresh verifier from 32 random bytes
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Computes the challenge for a known verifier
    pub fn from_verifier(code_verifier: String) -> Self {
        let digest = Sha256::digest(code_verifier.as_bytes());
        let code_challenge = URL_SAFE_NO_PAD.encode(digest);
        Self {
            code_verifier,
            code_challenge,
        }
    }

    /// The secret verifier, sent only on the code exchange
    pub fn code_verifier(&self) -> &str {
        &self.code_verifier
    }

    /// The challenge, sent on the authorization request
    pub fn code_challenge(&self) -> &str {
        &self.code_challenge
    }

    /// The challenge method
    pub fn code_challenge_method(&self) -> &'static str {
        "S256"
    }
}

impl std::fmt::Debug for PkceCodes {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PkceCodes")
            .field("code_verifier", &"***PKCE VERIFIER***")
            .field("code_challenge", &self.code_challenge)
            .finish()
    }
}

/// Generates an unguessable `state` value for the authorization request
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
