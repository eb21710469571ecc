//! HTTP API: axum router, auth middleware and JSON handlers.

pub mod admin;
pub mod auth;
pub mod cookies;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod transfer;

pub use error::{ApiError, ErrorBody};
pub use server::{ApiServer, AppState};
