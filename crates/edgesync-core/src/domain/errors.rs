//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! mostly validation failures when constructing newtypes.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid object key
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Invalid content hash (expected 32 lowercase hex characters)
    #[error("Invalid content hash: {0}")]
    InvalidHash(String),

    /// Path is not within the scan root
    #[error("Path not within scan root: {0}")]
    PathNotInRoot(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
