//! edgesync Cloud - Object store and CDN adapters
//!
//! Provides implementations of the edgesync-core ports for:
//! - S3-compatible object stores (Tencent COS, MinIO, AWS S3)
//! - EdgeOne CDN cache purges
//!
//! ## Modules
//!
//! - [`s3`] - [`IObjectStore`](edgesync_core::ports::IObjectStore) over the AWS S3 SDK
//! - [`purge`] - [`ICdnPurger`](edgesync_core::ports::ICdnPurger) over the EdgeOne API with TC3 signing

pub mod purge;
pub mod s3;

use edgesync_core::config::StoreConfig;
use thiserror::Error;

pub use purge::EdgeOnePurger;
pub use s3::S3ObjectStore;

/// Errors raised by the cloud adapters
#[derive(Debug, Error)]
pub enum CloudError {
    /// No secret id / key was configured
    #[error("Missing credentials: set store.secret_id and store.secret_key or EDGESYNC_SECRET_ID and EDGESYNC_SECRET_KEY")]
    MissingCredentials,

    /// A required configuration value is empty
    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),

    /// An endpoint could not be parsed
    #[error("Invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    /// An object store operation failed
    #[error("{op} {key} failed: {message}")]
    Store {
        op: &'static str,
        key: String,
        message: String,
    },

    /// The provider API returned an error object
    #[error("API error {code}: {message}")]
    Api {
        code: String,
        message: String,
        request_id: Option<String>,
    },

    /// A request could not be signed
    #[error("Request signing failed: {0}")]
    Signing(String),

    /// The response could not be interpreted
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Reading a local file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// API credentials shared by the store and purge adapters
#[derive(Clone)]
pub struct Credentials {
    pub secret_id: String,
    pub secret_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    /// Take credentials from the store section of the configuration
    ///
    /// # Errors
    /// Returns [`CloudError::MissingCredentials`] if either half is unset or empty
    pub fn from_store(config: &StoreConfig) -> Result<Self, CloudError> {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        match (non_empty(&config.secret_id), non_empty(&config.secret_key)) {
            (Some(secret_id), Some(secret_key)) => Ok(Self {
                secret_id,
                secret_key,
                session_token: non_empty(&config.session_token),
            }),
            _ => Err(CloudError::MissingCredentials),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
