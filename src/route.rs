//! Route definitions for the link shortener API
//!
//! This module wires every HTTP route to its handler and layers the auth
//! and CORS middleware.

use axum::routing::{get, post};
use axum::{middleware, Router};

use crate::handler::{
    create_link, delete_link, get_link, get_user_name, home, list_links,
    list_links_with_history, login, logout, record_visit, redirect, refresh, signup,
    update_link, update_user_name,
};
use crate::middleware::{cors, require_auth};
use crate::state::AppState;

/// Creates the application router
///
/// # Route Definitions
///
/// - `GET /api`, `GET /api/` - Service banner
/// - `POST /api/login`, `POST /api/signup` - Start a session
/// - `GET /api/refresh`, `GET /api/logout` - Rotate or clear the refresh cookie
/// - `/api/admin/users/{id}/...` - Profile and link management (bearer token)
/// - `GET /api/redirect/{short}` - Resolve a short code and count the click
/// - `POST /api/redirect/{short}` - Record visitor details
pub fn create_app(state: AppState) -> Router {
    // Routes that require a valid access token
    let admin_routes = Router::new()
        .route("/users/{id}", get(get_user_name).patch(update_user_name))
        .route(
            "/users/{id}/links",
            get(list_links).post(create_link).put(create_link),
        )
        .route("/users/{id}/history", get(list_links_with_history))
        .route(
            "/users/{id}/links/{link_id}",
            get(get_link).patch(update_link).delete(delete_link),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let api_routes = Router::new()
        .route("/login", post(login))
        .route("/signup", post(signup))
        .route("/refresh", get(refresh))
        .route("/logout", get(logout))
        .route("/redirect/{short}", get(redirect).post(record_visit))
        .nest("/admin", admin_routes);

    Router::new()
        .route("/api", get(home))
        .route("/api/", get(home))
        .nest("/api", api_routes)
        // Outermost, so preflight requests never reach the auth check
        .layer(middleware::from_fn_with_state(state.clone(), cors))
        .with_state(state)
}
