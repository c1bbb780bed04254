//! EdgeOne cache purge client
//!
//! Calls the EdgeOne `CreatePurgeTask` action (API version 2022-09-01)
//! over HTTPS with TC3-HMAC-SHA256 request signing. A target ending in `/`
//! is purged as a prefix, anything else as a single URL.

use chrono::{TimeZone, Utc};
use edgesync_core::{
    config::CdnConfig,
    ports::cdn::{ICdnPurger, PurgeKind, PurgeReceipt},
};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use url::Url;

use crate::{CloudError, Credentials};

const SERVICE: &str = "teo";
const ACTION: &str = "CreatePurgeTask";
const API_VERSION: &str = "2022-09-01";
const ALGORITHM: &str = "TC3-HMAC-SHA256";
const CONTENT_TYPE: &str = "application/json; charset=utf-8";
const SIGNED_HEADERS: &str = "content-type;host;x-tc-action";

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PurgeRequest<'a> {
    zone_id: &'a str,
    #[serde(rename = "Type")]
    kind: &'static str,
    method: &'static str,
    targets: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Response")]
    response: PurgeResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PurgeResponse {
    job_id: Option<String>,
    request_id: Option<String>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiError {
    code: String,
    message: String,
}

fn purge_type(kind: PurgeKind) -> &'static str {
    match kind {
        PurgeKind::Prefix => "purge_prefix",
        PurgeKind::Url => "purge_url",
    }
}

// ============================================================================
// TC3 signing
// ============================================================================

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CloudError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| CloudError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Authorization header value for a TC3-signed POST to `/`
///
/// `action` is lowercased into the canonical headers, as the signature
/// scheme requires.
pub fn tc3_authorization(
    secret_id: &str,
    secret_key: &str,
    host: &str,
    action: &str,
    payload: &[u8],
    timestamp: i64,
) -> Result<String, CloudError> {
    let date = Utc
        .timestamp_opt(timestamp, 0)
        .single()
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string();

    let canonical_headers = format!(
        "content-type:{CONTENT_TYPE}\nhost:{host}\nx-tc-action:{}\n",
        action.to_lowercase()
    );
    let canonical_request = format!(
        "POST\n/\n\n{canonical_headers}\n{SIGNED_HEADERS}\n{}",
        sha256_hex(payload)
    );

    let scope = format!("{date}/{SERVICE}/tc3_request");
    let string_to_sign = format!(
        "{ALGORITHM}\n{timestamp}\n{scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let secret_date = hmac_sha256(format!("TC3{secret_key}").as_bytes(), date.as_bytes())?;
    let secret_service = hmac_sha256(&secret_date, SERVICE.as_bytes())?;
    let secret_signing = hmac_sha256(&secret_service, b"tc3_request")?;
    let signature = hex::encode(hmac_sha256(&secret_signing, string_to_sign.as_bytes())?);

    Ok(format!(
        "{ALGORITHM} Credential={secret_id}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}"
    ))
}

// ============================================================================
// EdgeOnePurger
// ============================================================================

/// EdgeOne `CreatePurgeTask` client
pub struct EdgeOnePurger {
    client: Client,
    endpoint: String,
    host: String,
    region: String,
    credentials: Credentials,
}

impl EdgeOnePurger {
    /// Create a purger for `config.endpoint`
    ///
    /// # Errors
    /// Returns [`CloudError::InvalidEndpoint`] if the endpoint has no host
    pub fn new(config: &CdnConfig, credentials: Credentials) -> Result<Self, CloudError> {
        Self::with_base_url(&config.endpoint, &config.region, credentials)
    }

    /// Create a purger against a custom endpoint (useful for testing)
    ///
    /// # Errors
    /// Returns [`CloudError::InvalidEndpoint`] if `endpoint` is not a URL with a host
    pub fn with_base_url(
        endpoint: &str,
        region: &str,
        credentials: Credentials,
    ) -> Result<Self, CloudError> {
        let invalid = |reason: String| CloudError::InvalidEndpoint {
            url: endpoint.to_string(),
            reason,
        };
        let url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host".to_string()))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            host,
            region: region.to_string(),
            credentials,
        })
    }

    async fn create_purge_task(&self, target: &str, zone_id: &str) -> Result<PurgeReceipt, CloudError> {
        let kind = PurgeKind::for_target(target);
        let payload = serde_json::to_vec(&PurgeRequest {
            zone_id,
            kind: purge_type(kind),
            method: "invalidate",
            targets: [target],
        })
        .map_err(|e| CloudError::InvalidResponse(e.to_string()))?;

        let timestamp = Utc::now().timestamp();
        let authorization = tc3_authorization(
            &self.credentials.secret_id,
            &self.credentials.secret_key,
            &self.host,
            ACTION,
            &payload,
            timestamp,
        )?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Authorization", authorization)
            .header("Content-Type", CONTENT_TYPE)
            .header("Host", &self.host)
            .header("X-TC-Action", ACTION)
            .header("X-TC-Version", API_VERSION)
            .header("X-TC-Timestamp", timestamp.to_string());
        if !self.region.is_empty() {
            request = request.header("X-TC-Region", &self.region);
        }
        if let Some(token) = &self.credentials.session_token {
            request = request.header("X-TC-Token", token);
        }

        debug!(kind = purge_type(kind), "Sending purge request");
        let response = request.body(payload).send().await?;
        let status = response.status();
        let text = response.text().await?;

        let envelope: Envelope = serde_json::from_str(&text).map_err(|e| {
            CloudError::InvalidResponse(format!("HTTP {status}: {e}"))
        })?;
        let body = envelope.response;

        if let Some(err) = body.error {
            return Err(CloudError::Api {
                code: err.code,
                message: err.message,
                request_id: body.request_id,
            });
        }
        if !status.is_success() {
            return Err(CloudError::InvalidResponse(format!("HTTP {status}")));
        }

        Ok(PurgeReceipt {
            job_id: body.job_id,
            request_id: body.request_id,
        })
    }
}

#[async_trait::async_trait]
impl ICdnPurger for EdgeOnePurger {
    #[instrument(skip(self))]
    async fn purge(&self, target: &str, zone_id: &str) -> anyhow::Result<PurgeReceipt> {
        let receipt = self.create_purge_task(target, zone_id).await?;
        info!(job_id = ?receipt.job_id, "Cache purge submitted");
        Ok(receipt)
    }
}
