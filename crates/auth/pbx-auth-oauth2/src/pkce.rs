//! PKCE challenge and per-attempt state generation.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, thread_rng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// PKCE code verifier and derived S256 challenge.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

impl PkceChallenge {
    /// Generate a new PKCE challenge from 256 bits of randomness.
    pub fn new() -> Self {
        let code_verifier = Self::generate_code_verifier();
        let code_challenge = Self::challenge_for(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: "S256".to_string(),
        }
    }

    fn generate_code_verifier() -> String {
        let mut rng = thread_rng();
        let bytes: Vec<u8> = (0..32).map(|_| rng.r#gen::<u8>()).collect();
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// `BASE64URL(SHA256(verifier))`, reproducible only from the verifier.
    pub fn challenge_for(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

/// Ephemeral state for one authorization attempt: the anti-forgery `state`
/// token plus the PKCE pair. Lives only in the attempt cookies and is
/// destroyed on callback or expiry.
#[derive(Debug, Clone)]
pub struct AuthAttempt {
    pub state: String,
    pub pkce: PkceChallenge,
}

impl Default for AuthAttempt {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthAttempt {
    pub fn new() -> Self {
        Self {
            state: Uuid::new_v4().to_string(),
            pkce: PkceChallenge::new(),
        }
    }
}
