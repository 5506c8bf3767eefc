//! Issuing and verifying signed credentials (HS256 JWT)

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::AuthConfig,
    error::AppError,
    models::principal::{Principal, Role, Subject},
};

/// Opaque signed token as handed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A freshly signed credential and the instant it stops being accepted
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub credential: Credential,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Token has expired")]
    ExpiredToken,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Signing key is unavailable")]
    KeyUnavailable,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::KeyUnavailable | TokenError::Signing(_) => AppError::Internal(err.to_string()),
            _ => AppError::Authentication(err.to_string()),
        }
    }
}

/// JWT claims carried by a credential
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    pid: i64,
    roles: Vec<Role>,
    iss: String,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl: Duration,
}

impl TokenService {
    /// Build the service from the auth settings. An empty secret is refused.
    pub fn new(config: &AuthConfig) -> Result<Self, TokenError> {
        if config.jwt_secret.trim().is_empty() {
            return Err(TokenError::KeyUnavailable);
        }

        let secret = config.jwt_secret.as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.jwt_issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = config.leeway_seconds;

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            issuer: config.jwt_issuer.clone(),
            ttl: Duration::minutes(config.token_ttl_minutes),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a credential for `subject` valid for the configured window
    pub fn issue(&self, subject: &Subject, roles: &[Role]) -> Result<IssuedToken, TokenError> {
        self.issue_at(subject, roles, Utc::now())
    }

    /// Same as [`issue`](Self::issue) with an explicit issue time
    pub fn issue_at(
        &self,
        subject: &Subject,
        roles: &[Role],
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let claims = Claims {
            sub: subject.name.clone(),
            pid: subject.person_id,
            roles: roles.to_vec(),
            iss: self.issuer.clone(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };

        // reported expiry is exactly the signed claim
        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| TokenError::Signing(format!("expiry {} out of range", claims.exp)))?;

        let credential = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map(Credential)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            credential,
            expires_at,
        })
    }

    /// Check signature, then expiry, and rebuild the principal.
    pub fn verify(&self, credential: &Credential) -> Result<Principal, TokenError> {
        let data = decode::<Claims>(credential.as_str(), &self.decoding, &self.validation).map_err(|e| {
            let err = classify(e.kind());
            tracing::debug!("Rejected credential: {}", err);
            err
        })?;

        let claims = data.claims;
        Ok(Principal::new(Subject::new(claims.pid, claims.sub), claims.roles))
    }
}

fn classify(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::ExpiredSignature => TokenError::ExpiredToken,
        // a token signed with another algorithm is not our signature
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
        other => TokenError::Malformed(format!("{:?}", other)),
    }
}
