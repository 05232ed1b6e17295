//! Data models for the URL shortener application
//!
//! Stored records ([`User`], [`Link`], [`RedirectHistory`]) and the request and
//! response bodies of the HTTP API. Stored records are persisted as JSON, so
//! their serde shape is also their storage shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account
///
/// Contains the password hash, so it is never returned to clients directly;
/// handlers convert it into a [`UserResponse`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when registering a user; the store assigns the rest
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// A shortened link owned by a user
///
/// `id` is only unique together with `user_id`: every user's first link has
/// id 1. `shorten_url` is unique across all users.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: u64,
    pub user_id: u64,
    pub title: String,
    pub original_url: String,

    /// The generated short code used in `/api/redirect/{code}`
    pub shorten_url: String,

    /// Number of redirects served for this link
    #[serde(default)]
    pub clicks: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when inserting a link; id, counters and timestamps are
/// assigned by the store
#[derive(Debug, Clone)]
pub struct LinkDraft {
    pub title: String,
    pub original_url: String,
    pub shorten_url: String,
}

/// One recorded visit of a short link
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RedirectHistory {
    /// Position within the owning link's history, starting at 1
    pub id: u64,
    pub link_id: u64,
    pub device: String,
    pub browser: String,
    pub ip_address: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

/// Visitor details reported by the client after a redirect
///
/// # Example
/// ```json
/// {
///   "device": "desktop",
///   "browser": "Firefox",
///   "ipAddress": "203.0.113.7",
///   "location": "Berlin, DE"
/// }
/// ```
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Visit {
    pub device: String,
    pub browser: String,
    pub ip_address: String,
    pub location: String,
}

/// A link together with its full redirect history
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LinkWithHistory {
    #[serde(flatten)]
    pub link: Link,
    pub redirect_history: Vec<RedirectHistory>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdateNameRequest {
    pub name: String,
}

/// Request payload for creating or editing a link
///
/// # Example
/// ```json
/// {
///   "title": "Blog",
///   "originalUrl": "https://example.com"
/// }
/// ```
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub title: String,
    pub original_url: String,
}

/// Public view of a user, with the access token issued for this session
#[derive(Serialize, Debug)]
pub struct UserResponse {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub token: String,
}

impl UserResponse {
    pub fn new(user: &User, token: String) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            token,
        }
    }
}

/// Body returned by login and signup: `{"user": {...}}`
#[derive(Serialize, Debug)]
pub struct AuthResponse {
    pub user: UserResponse,
}
