// Access/refresh credential pairs: issuing, verification, rotation.
//
// Access and refresh tokens are HS256 JWTs signed with distinct secrets
// and carrying a `type` claim; a token presented under the wrong secret
// or with the wrong type claim is rejected. Refresh verification also
// re-resolves the user so tokens for deleted accounts stop working.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::bail;
use chrono::Duration;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use corkboard_common::types::UserPublic;

use crate::auth::password;
use crate::config::ServerConfig;
use crate::store::{Store, StoreError};

pub const MIN_SECRET_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user: UserPublic,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid credential")]
    InvalidCredential,
    #[error("credential has expired")]
    ExpiredCredential,
    #[error("credential type not valid for this operation")]
    WrongCredentialType,
    #[error("account no longer exists")]
    UserGone,
    #[error("user lookup failed: {0}")]
    Lookup(#[source] StoreError),
    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("system clock is before the unix epoch")]
    Clock,
}

#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub password_pepper: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenConfig {
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            access_secret: config.access_token_secret.clone(),
            refresh_secret: config.refresh_token_secret.clone(),
            password_pepper: config.password_pepper.clone(),
            access_ttl: Duration::minutes(config.access_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_ttl_days),
        }
    }
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[derive(Clone)]
pub struct TokenService {
    access: KeyPair,
    refresh: KeyPair,
    validation: Validation,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    pepper: String,
    users: Store,
}

impl TokenService {
    pub fn new(config: TokenConfig, users: Store) -> anyhow::Result<Self> {
        if config.access_secret.len() < MIN_SECRET_LENGTH {
            bail!("access token secret must be at least {MIN_SECRET_LENGTH} characters long");
        }
        if config.refresh_secret.len() < MIN_SECRET_LENGTH {
            bail!("refresh token secret must be at least {MIN_SECRET_LENGTH} characters long");
        }
        if config.access_secret == config.refresh_secret {
            bail!("access and refresh token secrets must differ");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            access: KeyPair::from_secret(&config.access_secret),
            refresh: KeyPair::from_secret(&config.refresh_secret),
            validation,
            access_ttl_seconds: config.access_ttl.num_seconds(),
            refresh_ttl_seconds: config.refresh_ttl.num_seconds(),
            pepper: config.password_pepper,
            users,
        })
    }

    pub fn issue(&self, user: &UserPublic) -> Result<TokenPair, TokenError> {
        self.issue_at(user, current_unix_timestamp()?)
    }

    fn issue_at(&self, user: &UserPublic, issued_at: i64) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.sign(user, TokenKind::Access, issued_at)?,
            refresh_token: self.sign(user, TokenKind::Refresh, issued_at)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let claims = self.verify(token, &self.access.decoding)?;
        if claims.kind != TokenKind::Access {
            return Err(TokenError::WrongCredentialType);
        }
        Ok(claims)
    }

    /// Verifies a refresh token and re-resolves its user, so a token
    /// referencing a deleted account fails with [`TokenError::UserGone`].
    pub async fn verify_refresh(&self, token: &str) -> Result<UserPublic, TokenError> {
        let claims = self.verify(token, &self.refresh.decoding)?;
        if claims.kind != TokenKind::Refresh {
            return Err(TokenError::WrongCredentialType);
        }

        self.users
            .user_public_by_id(claims.user.id)
            .await
            .map_err(TokenError::Lookup)?
            .ok_or(TokenError::UserGone)
    }

    /// Exchanges a valid refresh token for a fresh credential pair,
    /// returning the re-resolved user alongside it.
    ///
    /// Rotation is stateless: no revocation list exists, so the previous
    /// refresh token stays valid until its own expiry.
    pub async fn rotate(&self, refresh_token: &str) -> Result<(TokenPair, UserPublic), TokenError> {
        let user = self.verify_refresh(refresh_token).await?;
        let pair = self.issue(&user)?;
        Ok((pair, user))
    }

    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    pub fn hash_password(&self, plain: &str) -> Result<String, TokenError> {
        password::hash_password(plain, &self.pepper)
            .map_err(|error| TokenError::Hashing(error.to_string()))
    }

    pub fn verify_password(&self, plain: &str, hash: &str) -> bool {
        password::verify_password(plain, &self.pepper, hash)
    }

    fn sign(&self, user: &UserPublic, kind: TokenKind, issued_at: i64) -> Result<String, TokenError> {
        let (key, ttl_seconds) = match kind {
            TokenKind::Access => (&self.access.encoding, self.access_ttl_seconds),
            TokenKind::Refresh => (&self.refresh.encoding, self.refresh_ttl_seconds),
        };

        let claims = TokenClaims {
            user: user.clone(),
            kind,
            iat: issued_at,
            exp: issued_at + ttl_seconds,
        };

        encode(&Header::new(Algorithm::HS256), &claims, key).map_err(TokenError::Signing)
    }

    fn verify(&self, token: &str, key: &DecodingKey) -> Result<TokenClaims, TokenError> {
        decode::<TokenClaims>(token, key, &self.validation).map(|data| data.claims).map_err(
            |error| match error.kind() {
                ErrorKind::ExpiredSignature => TokenError::ExpiredCredential,
                _ => TokenError::InvalidCredential,
            },
        )
    }
}

fn current_unix_timestamp() -> Result<i64, TokenError> {
    let duration = SystemTime::now().duration_since(UNIX_EPOCH).map_err(|_| TokenError::Clock)?;
    i64::try_from(duration.as_secs()).map_err(|_| TokenError::Clock)
}
