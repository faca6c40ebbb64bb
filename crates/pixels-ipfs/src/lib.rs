//! NFT.Storage blob publisher for the Pixels daily snapshot service.
//!
//! Uploads each snapshot artifact as a raw blob and returns the IPFS
//! content identifier the service assigns to it.

use async_trait::async_trait;
use pixels_core::config::PublisherConfig;
use pixels_core::source::{BlobPublisher, ContentId, PublishError};

/// [`BlobPublisher`] that stores blobs through the NFT.Storage HTTP API.
///
/// Sends `POST {api_url}/upload` with the raw bytes as the body.
pub struct NftStoragePublisher {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl NftStoragePublisher {
    /// Create a publisher from configuration.
    ///
    /// A missing token is not an error here; uploads fail with
    /// [`PublishError::MissingToken`] instead, so a run that crosses no day
    /// boundary never needs one.
    pub fn from_config(config: &PublisherConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            token: config.token.clone().filter(|t| !t.is_empty()),
        }
    }

    /// Whether an API token is configured.
    pub const fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

#[async_trait]
impl BlobPublisher for NftStoragePublisher {
    async fn store_blob(&self, bytes: &[u8]) -> Result<ContentId, PublishError> {
        let token = self.token.as_deref().ok_or(PublishError::MissingToken)?;
        let url = format!("{}/upload", self.api_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| PublishError::Transport(format!("upload request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(format!("response parse failed: {e}")))?;

        let cid = parse_upload_response(&json)?;
        tracing::debug!(cid = %cid, bytes = bytes.len(), "Stored blob");
        Ok(cid)
    }
}

/// Extract the content identifier from an upload response of the form
/// `{"ok": true, "value": {"cid": "..."}}`.
///
/// # Errors
///
/// Returns [`PublishError::InvalidResponse`] when `ok` is not `true` or the
/// `cid` is missing or empty.
pub fn parse_upload_response(json: &serde_json::Value) -> Result<ContentId, PublishError> {
    if json.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
        let detail = json
            .get("error")
            .map_or_else(|| json.to_string(), ToString::to_string);
        return Err(PublishError::InvalidResponse(format!(
            "upload not acknowledged: {detail}"
        )));
    }

    json.get("value")
        .and_then(|v| v.get("cid"))
        .and_then(serde_json::Value::as_str)
        .filter(|cid| !cid.is_empty())
        .map(ContentId::new)
        .ok_or_else(|| PublishError::InvalidResponse("response missing value.cid".to_owned()))
}
