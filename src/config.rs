//! Process configuration
//!
//! Settings are read once at startup from the environment (after `.env` has
//! been loaded by `dotenvy`) and shared read-only for the lifetime of the
//! process.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while reading configuration from the environment
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is unset or empty
    #[error("missing required environment variable `{0}`")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed into the expected type
    #[error("invalid value for `{key}`: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Token and refresh-cookie settings
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Shared HMAC secret used to sign every token
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    /// Lifetime of access tokens
    pub access_ttl: Duration,
    /// Lifetime of refresh tokens and of the refresh cookie
    pub refresh_ttl: Duration,
    pub cookie_name: String,
    pub cookie_path: String,
    /// Cookie domain; an empty string leaves the attribute off
    pub cookie_domain: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_issuer: "byteurl".to_string(),
            jwt_audience: "byteurl".to_string(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(24 * 60 * 60),
            cookie_name: "refresh_token".to_string(),
            cookie_path: "/".to_string(),
            cookie_domain: "localhost".to_string(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Port the HTTP server listens on
    pub port: u16,
    /// File path of the embedded database
    pub database_path: String,
    /// The single origin allowed by the CORS middleware
    pub cors_origin: String,
    /// Number of characters in generated short codes
    pub short_code_length: usize,
    pub auth: AuthConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_path: "data.db".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
            short_code_length: 10,
            auth: AuthConfig::default(),
        }
    }
}

impl AppConfig {
    /// Builds the configuration from environment variables
    ///
    /// # Environment Variables
    ///
    /// - `PORT` - Server port number (default: 8080)
    /// - `DATABASE_URL` - Path to database file (default: "data.db")
    /// - `CORS_ORIGIN` - Allowed origin (default: "http://localhost:3000")
    /// - `SHORT_CODE_LENGTH` - Generated code length (default: 10)
    /// - `JWT_SECRET` - Signing secret (required)
    /// - `JWT_ISSUER` / `JWT_AUDIENCE` - Token issuer and audience (default: "byteurl")
    /// - `JWT_ACCESS_TTL_SECS` / `JWT_REFRESH_TTL_SECS` - Token lifetimes (default: 900 / 86400)
    /// - `COOKIE_NAME` / `COOKIE_PATH` / `COOKIE_DOMAIN` - Refresh cookie scope
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();
        let auth_defaults = defaults.auth;

        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let auth = AuthConfig {
            jwt_secret,
            jwt_issuer: env_or("JWT_ISSUER", auth_defaults.jwt_issuer),
            jwt_audience: env_or("JWT_AUDIENCE", auth_defaults.jwt_audience),
            access_ttl: Duration::from_secs(env_parse(
                "JWT_ACCESS_TTL_SECS",
                auth_defaults.access_ttl.as_secs(),
            )?),
            refresh_ttl: Duration::from_secs(env_parse(
                "JWT_REFRESH_TTL_SECS",
                auth_defaults.refresh_ttl.as_secs(),
            )?),
            cookie_name: env_or("COOKIE_NAME", auth_defaults.cookie_name),
            cookie_path: env_or("COOKIE_PATH", auth_defaults.cookie_path),
            cookie_domain: env_or("COOKIE_DOMAIN", auth_defaults.cookie_domain),
        };

        Ok(Self {
            port: env_parse("PORT", defaults.port)?,
            database_path: env_or("DATABASE_URL", defaults.database_path),
            cors_origin: env_or("CORS_ORIGIN", defaults.cors_origin),
            short_code_length: env_parse("SHORT_CODE_LENGTH", defaults.short_code_length)?,
            auth,
        })
    }
}

fn env_or(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn env_parse<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        assert_eq!(env_parse("BYTEURL_TEST_UNSET_PORT", 8080u16).unwrap(), 8080);
        assert_eq!(env_or("BYTEURL_TEST_UNSET_PATH", "data.db".to_string()), "data.db");
    }

    #[test]
    fn numeric_values_are_parsed_or_rejected() {
        env::set_var("BYTEURL_TEST_GOOD_LEN", " 12 ");
        env::set_var("BYTEURL_TEST_BAD_LEN", "twelve");

        assert_eq!(env_parse("BYTEURL_TEST_GOOD_LEN", 10usize).unwrap(), 12);
        assert!(matches!(
            env_parse("BYTEURL_TEST_BAD_LEN", 10usize),
            Err(ConfigError::Invalid { key: "BYTEURL_TEST_BAD_LEN", .. })
        ));
    }
}
