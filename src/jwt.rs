//! Signed credential generation and validation.
//!
//! Dual-token system: short-lived access tokens (stateless, never persisted)
//! and long-lived refresh tokens (persisted on the account record and rotated
//! on every use). Each kind is signed with its own secret and carries its own
//! lifetime, both supplied at construction.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Token kind for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived access token - stateless, never stored server-side
    Access,
    /// Long-lived refresh token - single slot per account, rotated on use
    Refresh,
}

/// Claims embedded in a signed token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (account UUID)
    pub sub: String,
    /// Username at issue time
    pub username: String,
    /// Token kind
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Unique token id, set on refresh tokens only. Guarantees two rotations
    /// within the same second still produce distinct token strings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// A freshly issued token with its expiry metadata.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The signed token string
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token lifetime in seconds
    pub ttl_secs: u64,
}

struct KindKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

/// Configuration for credential operations. Immutable after construction;
/// passed in explicitly rather than read from ambient state.
pub struct JwtConfig {
    access: KindKeys,
    refresh: KindKeys,
}

impl JwtConfig {
    /// Create a new credential configuration with distinct secrets and
    /// lifetimes for each token kind.
    pub fn new(
        access_secret: &[u8],
        access_ttl_secs: u64,
        refresh_secret: &[u8],
        refresh_ttl_secs: u64,
    ) -> Self {
        Self {
            access: KindKeys {
                encoding: EncodingKey::from_secret(access_secret),
                decoding: DecodingKey::from_secret(access_secret),
                ttl_secs: access_ttl_secs,
            },
            refresh: KindKeys {
                encoding: EncodingKey::from_secret(refresh_secret),
                decoding: DecodingKey::from_secret(refresh_secret),
                ttl_secs: refresh_ttl_secs,
            },
        }
    }

    fn keys(&self, kind: TokenKind) -> &KindKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Issue a signed token of the given kind for an account.
    pub fn issue(
        &self,
        kind: TokenKind,
        account_uuid: &str,
        username: &str,
    ) -> Result<IssuedToken, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::Clock)?
            .as_secs();

        let keys = self.keys(kind);
        let exp = now + keys.ttl_secs;

        let claims = Claims {
            sub: account_uuid.to_string(),
            username: username.to_string(),
            kind,
            iat: now,
            exp,
            jti: match kind {
                TokenKind::Access => None,
                TokenKind::Refresh => Some(uuid::Uuid::new_v4().to_string()),
            },
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &keys.encoding)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            expires_at: exp,
            ttl_secs: keys.ttl_secs,
        })
    }

    /// Validate and decode an access token.
    pub fn verify_access(&self, token: &str) -> Result<Claims, JwtError> {
        self.verify(TokenKind::Access, token)
    }

    /// Validate and decode a refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, JwtError> {
        self.verify(TokenKind::Refresh, token)
    }

    /// Expiry is re-checked against the wall clock on every call, never cached.
    fn verify(&self, kind: TokenKind, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data =
            jsonwebtoken::decode::<Claims>(token, &self.keys(kind).decoding, &validation).map_err(
                |e| {
                    use jsonwebtoken::errors::ErrorKind;
                    match e.kind() {
                        ErrorKind::ExpiredSignature => JwtError::Expired,
                        ErrorKind::InvalidSignature => JwtError::SignatureInvalid,
                        _ => JwtError::Malformed,
                    }
                },
            )?;

        if token_data.claims.kind != kind {
            return Err(JwtError::WrongKind);
        }

        Ok(token_data.claims)
    }
}

/// Errors that can occur during credential operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error signing the token
    Encoding(jsonwebtoken::errors::Error),
    /// The token's expiry has passed
    Expired,
    /// The token is not a well-formed signed token
    Malformed,
    /// The signature does not match the configured secret
    SignatureInvalid,
    /// Wrong token kind (e.g., a refresh token presented as an access token)
    WrongKind,
    /// System clock error
    Clock,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to sign token: {}", e),
            JwtError::Expired => write!(f, "Token has expired"),
            JwtError::Malformed => write!(f, "Malformed token"),
            JwtError::SignatureInvalid => write!(f, "Token signature mismatch"),
            JwtError::WrongKind => write!(f, "Wrong token kind"),
            JwtError::Clock => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for JwtError {}
