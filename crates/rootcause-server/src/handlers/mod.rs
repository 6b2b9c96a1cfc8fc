//! HTTP route handlers for the investigation server.

pub mod investigations;
pub mod runs;

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}
