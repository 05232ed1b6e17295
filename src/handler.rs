//! HTTP request handlers for the link shortener API
//!
//! Handlers stay thin: they extract the request, call the account, link or
//! token services on [`AppState`] and shape the JSON response. Every
//! failure is an [`AppError`] rendered as `{"error": ..., "code": ...}`.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use axum_extra::extract::{CookieJar, WithRejection};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::model::{
    AuthResponse, Link, LinkRequest, LinkWithHistory, LoginRequest, SignupRequest,
    UpdateNameRequest, User, UserResponse, Visit,
};
use crate::state::AppState;

type JsonBody<T> = WithRejection<Json<T>, AppError>;
type PathParam<T> = WithRejection<Path<T>, AppError>;

/// Runs CPU-heavy work (argon2) off the async worker threads
async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(format!("blocking task failed: {e}")))?
}

/// Service banner for `GET /api`
pub async fn home() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "byteurl link shortener API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Issues a token pair for `user`: the access token in the body, the refresh
/// token in the cookie jar
fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: &User,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let pair = state.tokens.issue(user)?;
    let jar = jar.add(state.tokens.refresh_cookie(pair.refresh_token));
    let body = AuthResponse {
        user: UserResponse::new(user, pair.access_token),
    };
    Ok((jar, Json(body)))
}

/// Logs a user in
///
/// # Request Body
///
/// ```json
/// { "email": "ann@example.com", "password": "longenough1" }
/// ```
///
/// # Response
///
/// - **200 OK** - `{"user": {"id", "name", "email", "token"}}` plus the refresh cookie
/// - **400 Bad Request** - Malformed email
/// - **401 Unauthorized** - Unknown email or wrong password
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(payload), _): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let accounts = state.accounts.clone();
    let user = blocking(move || accounts.login(&payload.email, &payload.password)).await?;
    start_session(&state, jar, &user)
}

/// Registers a user and logs them in
///
/// # Response
///
/// - **200 OK** - Same body and cookie as login
/// - **400 Bad Request** - Name, email or password rejected
/// - **409 Conflict** - Email already registered
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(payload), _): JsonBody<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let accounts = state.accounts.clone();
    let user = blocking(move || {
        accounts.signup(&payload.name, &payload.email, &payload.password)
    })
    .await?;
    start_session(&state, jar, &user)
}

/// Exchanges the refresh cookie for a new access token and a rotated cookie
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let token = jar
        .get(state.tokens.cookie_name())
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::authentication("missing refresh token"))?;

    let claims = state.tokens.verify_refresh(&token)?;
    let user = match state.accounts.user(claims.user_id()?) {
        Ok(user) => user,
        Err(AppError::NotFound(_)) => {
            return Err(AppError::authentication("refresh token subject no longer exists"));
        }
        Err(err) => return Err(err),
    };

    let pair = state.tokens.issue(&user)?;
    let jar = jar.add(state.tokens.refresh_cookie(pair.refresh_token));
    Ok((jar, Json(json!({ "token": pair.access_token }))))
}

/// Clears the refresh cookie; access tokens simply run out
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    (
        jar.add(state.tokens.expired_cookie()),
        Json(json!({ "message": "logged out" })),
    )
}

pub async fn get_user_name(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Path(user_id), _): PathParam<u64>,
) -> Result<Json<Value>, AppError> {
    auth.ensure_owner(user_id)?;
    let user = state.accounts.user(user_id)?;
    Ok(Json(json!({ "name": user.name })))
}

pub async fn update_user_name(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Path(user_id), _): PathParam<u64>,
    WithRejection(Json(payload), _): JsonBody<UpdateNameRequest>,
) -> Result<Json<Value>, AppError> {
    auth.ensure_owner(user_id)?;
    let user = state.accounts.update_name(user_id, &payload.name)?;
    Ok(Json(json!({ "name": user.name })))
}

pub async fn list_links(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Path(user_id), _): PathParam<u64>,
) -> Result<Json<Vec<Link>>, AppError> {
    auth.ensure_owner(user_id)?;
    Ok(Json(state.links.list(user_id)?))
}

/// Creates a link with a generated short code
///
/// # Request Body
///
/// ```json
/// { "title": "Blog", "originalUrl": "https://example.com" }
/// ```
///
/// # Response
///
/// - **200 OK** - The stored link, `clicks` at 0
/// - **400 Bad Request** - Title shorter than 3 characters or invalid URL
/// - **403 Forbidden** - Path user is not the caller
pub async fn create_link(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Path(user_id), _): PathParam<u64>,
    WithRejection(Json(payload), _): JsonBody<LinkRequest>,
) -> Result<Json<Link>, AppError> {
    auth.ensure_owner(user_id)?;
    let link = state
        .links
        .create(user_id, &payload.title, &payload.original_url)?;
    Ok(Json(link))
}

pub async fn list_links_with_history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Path(user_id), _): PathParam<u64>,
) -> Result<Json<Vec<LinkWithHistory>>, AppError> {
    auth.ensure_owner(user_id)?;
    Ok(Json(state.links.list_with_history(user_id)?))
}

pub async fn get_link(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Path((user_id, link_id)), _): PathParam<(u64, u64)>,
) -> Result<Json<Link>, AppError> {
    auth.ensure_owner(user_id)?;
    Ok(Json(state.links.get(user_id, link_id)?))
}

pub async fn update_link(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Path((user_id, link_id)), _): PathParam<(u64, u64)>,
    WithRejection(Json(payload), _): JsonBody<LinkRequest>,
) -> Result<Json<Link>, AppError> {
    auth.ensure_owner(user_id)?;
    let link = state
        .links
        .update(user_id, link_id, &payload.title, &payload.original_url)?;
    Ok(Json(link))
}

/// Deletes a link along with its redirect history
///
/// # Response
///
/// - **200 OK** - `{"message": "link deleted", "deleted_id": <linkId>}`
/// - **404 Not Found** - The caller has no link with that id
pub async fn delete_link(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Path((user_id, link_id)), _): PathParam<(u64, u64)>,
) -> Result<Json<Value>, AppError> {
    auth.ensure_owner(user_id)?;
    state.links.delete(user_id, link_id)?;
    Ok(Json(json!({ "message": "link deleted", "deleted_id": link_id })))
}

/// Resolves a short code and counts the visit
///
/// The front-end performs the actual navigation, so the destination is
/// returned as JSON rather than as a 3xx.
///
/// # Response
///
/// - **200 OK** - `{"originalUrl": "https://..."}`
/// - **404 Not Found** - Unknown short code
pub async fn redirect(
    State(state): State<AppState>,
    WithRejection(Path(code), _): PathParam<String>,
) -> Result<Json<Value>, AppError> {
    let link = state.links.resolve(&code)?;
    let link = state.links.record_click(&link)?;
    tracing::debug!(code = %code, clicks = link.clicks, "short code resolved");
    Ok(Json(json!({ "originalUrl": link.original_url })))
}

/// Appends a visitor record to the link's redirect history
pub async fn record_visit(
    State(state): State<AppState>,
    WithRejection(Path(code), _): PathParam<String>,
    WithRejection(Json(visit), _): JsonBody<Visit>,
) -> Result<Json<Value>, AppError> {
    let link = state.links.resolve(&code)?;
    state.links.record_redirect_history(&link, visit)?;
    Ok(Json(json!({ "message": "success" })))
}
