//! # AppError
//!
//! Centralized error handling for the rusty-feed crates.
//! Maps backend and client-side failures to actionable error types.

use thiserror::Error;

/// The primary error type for all rf-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource missing on the backend (404, or an empty lookup)
    #[error("not found: {0}")]
    NotFound(String),

    /// Validation/business rejection (e.g., blocked account, response
    /// without a token)
    #[error("validation error: {0}")]
    Validation(String),

    /// Auth failure (expired or invalid token, 401 from the backend)
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The operation requires a signed-in identity and none is held
    #[error("no identity: {0}")]
    NoIdentity(String),

    /// Infrastructure failure (network down, malformed response body)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AppError::Unauthorized(_))
    }
}

/// A specialized Result type for rusty-feed logic.
pub type Result<T> = std::result::Result<T, AppError>;
