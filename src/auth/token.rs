// Access token signing/verification and opaque refresh secrets

use crate::auth::{clock::Clock, error::AuthError};
use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::sync::Arc;
use uuid::Uuid;

/// Type tag carried by every access token
pub const ACCESS_TOKEN_TYPE: &str = "access";

/// Raw refresh secrets are this many random bytes before hex encoding
const REFRESH_TOKEN_BYTES: usize = 48;

/// The only signing algorithm this service issues or accepts
const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub iat: i64,
    pub exp: i64,
    pub typ: String,
}

/// Token service for JWT operations
///
/// Stateless apart from the signing key: issuing and verifying never touch
/// storage and are safe to run concurrently.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// Create a new TokenService with secret key and access-token lifetime
    pub fn new(secret: &str, access_token_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_ttl,
            clock,
        }
    }

    /// Issue an access token for `user_id`, returning it with its lifetime in seconds
    pub fn issue_access(&self, user_id: Uuid) -> Result<(String, i64), AuthError> {
        let now = self.clock.now().timestamp();
        let ttl = self.access_token_ttl.num_seconds();

        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now
                .checked_add(ttl)
                .ok_or_else(|| AuthError::TokenGenerationError("access token expiry overflows".to_string()))?,
            typ: ACCESS_TOKEN_TYPE.to_string(),
        };

        let token = encode(&Header::new(SIGNING_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenGenerationError(e.to_string()))?;

        Ok((token, ttl))
    }

    /// Verify an access token and return the user it was issued to
    ///
    /// Rejects other algorithms, other type tags, and tokens whose expiry is
    /// not in the future according to this service's clock.
    pub fn verify_access(&self, token: &str) -> Result<Uuid, AuthError> {
        let claims = self.decode_claims(token)?;

        if claims.typ != ACCESS_TOKEN_TYPE {
            return Err(AuthError::InvalidToken);
        }
        if claims.exp <= self.clock.now().timestamp() {
            return Err(AuthError::ExpiredToken);
        }

        Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        // Expiry is checked against the injected clock instead
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }
}

/// Generate an opaque refresh secret (96 hex chars)
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    to_hex(&bytes)
}

/// Hash a refresh secret using SHA-256
///
/// The digest is the only form in which refresh tokens are stored or looked up.
pub fn hash_refresh_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    to_hex(&digest)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
            let _ = write!(acc, "{:02x}", b);
            acc
        })
}
