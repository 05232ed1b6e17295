//! Request middleware: bearer authentication and CORS

use axum::{
    extract::{Request, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
            ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
            VARY,
        },
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::state::AppState;
use crate::token::AccessClaims;

/// The caller identity established by [`require_auth`]
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: u64,
    pub claims: AccessClaims,
}

impl AuthUser {
    /// Fails with 403 when a path names a user other than the caller
    pub fn ensure_owner(&self, user_id: u64) -> Result<(), AppError> {
        if self.id == user_id {
            Ok(())
        } else {
            tracing::warn!(caller = self.id, target = user_id, "cross-user access refused");
            Err(AppError::Forbidden(
                "you can only access your own resources".to_string(),
            ))
        }
    }
}

/// Middleware guarding the admin routes
///
/// Verifies the `Authorization: Bearer` access token and stores the caller
/// as an [`AuthUser`] request extension. Any header or token problem ends
/// the request with 401. Every response, rejected or not, varies on
/// `Authorization`.
pub async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = match authenticate(&state, request) {
        Ok(request) => next.run(request).await,
        Err(err) => err.into_response(),
    };
    response
        .headers_mut()
        .append(VARY, HeaderValue::from_static("Authorization"));
    response
}

fn authenticate(state: &AppState, mut request: Request) -> Result<Request, AppError> {
    let claims = state.tokens.verify_header(request.headers())?;
    let id = claims.user_id()?;
    request.extensions_mut().insert(AuthUser { id, claims });
    Ok(request)
}

/// Answers preflight requests and marks every response with the allowed origin
pub async fn cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let origin = HeaderValue::from_str(&state.config.cors_origin).ok();

    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Authorization, Content-Type"),
        );
        headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("600"));
        allow_origin(headers, origin);
        return response;
    }

    let mut response = next.run(request).await;
    allow_origin(response.headers_mut(), origin);
    response
}

fn allow_origin(headers: &mut HeaderMap, origin: Option<HeaderValue>) {
    if let Some(origin) = origin {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(
            ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.append(VARY, HeaderValue::from_static("Origin"));
    }
}
