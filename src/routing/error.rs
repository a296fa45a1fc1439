//! Routing errors.

use axum::http::header::InvalidHeaderValue;
use thiserror::Error;

/// Caller misuse of a resolved route.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("request headers were already finalized for forwarding")]
    AlreadyFinalized,

    #[error("header value cannot be forwarded: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
}
