//! Library exports for the link shortener service
//!
//! The binary in `main.rs` and the integration tests build on these modules.

pub mod account;
pub mod config;
pub mod database;
pub mod error;
pub mod handler;
pub mod links;
pub mod middleware;
pub mod model;
pub mod password;
pub mod route;
pub mod shortcode;
pub mod state;
pub mod store;
pub mod token;
