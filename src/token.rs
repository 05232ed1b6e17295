//! Session tokens and the refresh cookie
//!
//! Access tokens are short-lived HS256 JWTs sent as `Authorization: Bearer`.
//! A separate, longer-lived refresh token travels only in an HTTP-only,
//! `SameSite=Strict` cookie and is exchanged at `/api/refresh` for a new pair.
//! Nothing is stored server-side: validity is re-derived from the signature
//! and claims on every call.

use std::time::Duration;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Utc};
use cookie::time::{Duration as CookieDuration, OffsetDateTime};
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthConfig;
use crate::model::User;

/// `typ` claim of access tokens
pub const ACCESS_TOKEN_TYPE: &str = "JWT";
/// `typ` claim of refresh tokens
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The `Authorization` header is absent or not `Bearer <token>`
    #[error("invalid Authorization header: {0}")]
    MalformedHeader(&'static str),

    #[error("token has expired")]
    Expired,

    #[error("invalid token signature")]
    InvalidSignature,

    /// The token header names an algorithm other than HS256
    #[error("unexpected signing algorithm: {0}")]
    UnexpectedAlgorithm(String),

    #[error("invalid token issuer")]
    InvalidIssuer,

    /// Undecodable token, missing or wrong claims
    #[error("invalid token: {0}")]
    Malformed(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl TokenError {
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            TokenError::UnexpectedAlgorithm(err.to_string())
        }
        ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
        _ => TokenError::Malformed(err.to_string()),
    }
}

/// Claims of an access token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    /// Subject: the user id, stringified
    pub sub: String,
    /// The user's email at issuance
    pub name: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub typ: String,
}

impl AccessClaims {
    /// The user id carried in `sub`
    pub fn user_id(&self) -> Result<u64, TokenError> {
        parse_subject(&self.sub)
    }
}

/// Claims of a refresh token; deliberately minimal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub typ: String,
}

impl RefreshClaims {
    pub fn user_id(&self) -> Result<u64, TokenError> {
        parse_subject(&self.sub)
    }
}

fn parse_subject(sub: &str) -> Result<u64, TokenError> {
    sub.parse()
        .map_err(|_| TokenError::Malformed("subject is not a user id".to_string()))
}

/// Result of a successful token pair generation
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Extracts the token from an `Authorization` header value
///
/// Accepts exactly `"Bearer <token>"`. A missing header, another scheme, a
/// missing token or extra space-separated parts all fail with
/// [`TokenError::MalformedHeader`].
pub fn extract_bearer(header: Option<&str>) -> Result<&str, TokenError> {
    let value = header.ok_or(TokenError::MalformedHeader("missing Authorization header"))?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(TokenError::MalformedHeader("expected `Bearer <token>`")),
    }
}

/// Issues and verifies signed tokens and builds the refresh cookie
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_validation: Validation,
    refresh_validation: Validation,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    cookie_name: String,
    cookie_path: String,
    cookie_domain: String,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        let mut access_validation = Validation::new(SIGNING_ALGORITHM);
        access_validation.leeway = 0;
        access_validation.set_issuer(&[config.jwt_issuer.as_str()]);
        access_validation.set_audience(&[config.jwt_audience.as_str()]);
        access_validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        let mut refresh_validation = Validation::new(SIGNING_ALGORITHM);
        refresh_validation.leeway = 0;
        refresh_validation.validate_aud = false;
        refresh_validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_validation,
            refresh_validation,
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
            cookie_name: config.cookie_name.clone(),
            cookie_path: config.cookie_path.clone(),
            cookie_domain: config.cookie_domain.clone(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Mints an access token and a refresh token for `user`
    pub fn issue(&self, user: &User) -> Result<TokenPair, TokenError> {
        let now = Utc::now();
        let access_exp = now + chrono::Duration::seconds(self.access_ttl.as_secs() as i64);
        let refresh_exp = now + chrono::Duration::seconds(self.refresh_ttl.as_secs() as i64);

        let access_claims = AccessClaims {
            sub: user.id.to_string(),
            name: user.email.clone(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: access_exp.timestamp(),
            typ: ACCESS_TOKEN_TYPE.to_string(),
        };

        let refresh_claims = RefreshClaims {
            sub: user.id.to_string(),
            iat: now.timestamp(),
            exp: refresh_exp.timestamp(),
            typ: REFRESH_TOKEN_TYPE.to_string(),
        };

        Ok(TokenPair {
            access_token: self.sign(&access_claims)?,
            refresh_token: self.sign(&refresh_claims)?,
            access_expires_at: access_exp,
            refresh_expires_at: refresh_exp,
        })
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        encode(&Header::new(SIGNING_ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verifies an access token and returns its claims
    ///
    /// Checks, in order:
    /// 1. The header declares HS256
    /// 2. Signature
    /// 3. Expiry (no leeway), issuer and audience
    /// 4. The token is an access token
    pub fn verify(&self, token: &str) -> Result<AccessClaims, TokenError> {
        ensure_algorithm(token)?;

        let claims = decode::<AccessClaims>(token, &self.decoding_key, &self.access_validation)
            .map_err(classify)?
            .claims;

        ensure_not_expired(claims.exp)?;
        if claims.typ != ACCESS_TOKEN_TYPE {
            return Err(TokenError::Malformed("not an access token".to_string()));
        }
        Ok(claims)
    }

    /// Verifies a refresh token; access tokens are rejected
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        ensure_algorithm(token)?;

        let claims = decode::<RefreshClaims>(token, &self.decoding_key, &self.refresh_validation)
            .map_err(classify)?
            .claims;

        ensure_not_expired(claims.exp)?;
        if claims.typ != REFRESH_TOKEN_TYPE {
            return Err(TokenError::Malformed("not a refresh token".to_string()));
        }
        Ok(claims)
    }

    /// Reads the bearer token from request headers and verifies it
    pub fn verify_header(&self, headers: &HeaderMap) -> Result<AccessClaims, TokenError> {
        let header = headers
            .get(AUTHORIZATION)
            .map(|value| {
                value
                    .to_str()
                    .map_err(|_| TokenError::MalformedHeader("header is not valid text"))
            })
            .transpose()?;

        self.verify(extract_bearer(header)?)
    }

    /// HTTP-only, `Secure`, `SameSite=Strict` cookie carrying a refresh token
    pub fn refresh_cookie(&self, token: String) -> Cookie<'static> {
        let max_age = CookieDuration::seconds(self.refresh_ttl.as_secs() as i64);
        self.cookie(token)
            .max_age(max_age)
            .expires(OffsetDateTime::now_utc() + max_age)
            .build()
    }

    /// Same cookie scope with an empty value, expired at the Unix epoch
    pub fn expired_cookie(&self) -> Cookie<'static> {
        self.cookie(String::new())
            .max_age(CookieDuration::ZERO)
            .expires(OffsetDateTime::UNIX_EPOCH)
            .build()
    }

    fn cookie(&self, value: String) -> cookie::CookieBuilder<'static> {
        let builder = Cookie::build((self.cookie_name.clone(), value))
            .path(self.cookie_path.clone())
            .http_only(true)
            .secure(true)
            .same_site(SameSite::Strict);

        if self.cookie_domain.is_empty() {
            builder
        } else {
            builder.domain(self.cookie_domain.clone())
        }
    }
}

/// jsonwebtoken only rejects `exp < now`; a token is already dead at `exp`
fn ensure_not_expired(exp: i64) -> Result<(), TokenError> {
    if exp <= Utc::now().timestamp() {
        return Err(TokenError::Expired);
    }
    Ok(())
}

fn ensure_algorithm(token: &str) -> Result<(), TokenError> {
    let header = decode_header(token).map_err(classify)?;
    if header.alg != SIGNING_ALGORITHM {
        return Err(TokenError::UnexpectedAlgorithm(format!("{:?}", header.alg)));
    }
    Ok(())
}
