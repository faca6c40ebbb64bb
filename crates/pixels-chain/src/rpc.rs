//! Minimal JSON-RPC 2.0 client over HTTP.
//!
//! Only what the feed needs: one request per call, no batching, no retries.
//! A failed call aborts the run; the next run retries from the checkpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use pixels_core::source::FeedError;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcErrorObject {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

/// JSON-RPC response envelope.
#[derive(Debug, Deserialize)]
pub struct RpcResponse<T> {
    /// Present on success.
    pub result: Option<T>,
    /// Present on failure.
    pub error: Option<RpcErrorObject>,
}

impl<T> RpcResponse<T> {
    /// Convert the envelope into the call result.
    ///
    /// A response carrying neither `result` nor `error` yields `Ok(None)`,
    /// which is how nodes answer lookups for unknown blocks.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Rpc`] when the node reported an error.
    pub fn into_result(self) -> Result<Option<T>, FeedError> {
        match self.error {
            Some(err) => Err(FeedError::Rpc {
                code: err.code,
                message: err.message,
            }),
            None => Ok(self.result),
        }
    }
}

/// HTTP JSON-RPC client bound to a single endpoint.
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create a client for the endpoint at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Invoke `method` with `params` and deserialize the `result` field.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Transport`] for network and HTTP status failures,
    /// [`FeedError::Rpc`] for JSON-RPC errors, and [`FeedError::Malformed`]
    /// if the body does not deserialize.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, FeedError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| FeedError::Transport(format!("{method} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(FeedError::Transport(format!(
                "{method} returned {status}: {error_body}"
            )));
        }

        let envelope: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| FeedError::Malformed(format!("{method} response parse failed: {e}")))?;

        tracing::trace!(method, id, "RPC call completed");
        envelope.into_result()
    }
}

/// Parse a `0x`-prefixed hex quantity.
///
/// # Errors
///
/// Returns [`FeedError::Malformed`] if the string is not a hex number that
/// fits `u64`.
pub fn parse_quantity(value: &str) -> Result<u64, FeedError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| FeedError::Malformed(format!("quantity {value:?} lacks 0x prefix")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| FeedError::Malformed(format!("invalid quantity {value:?}: {e}")))
}

/// Format a number as a `0x`-prefixed hex quantity.
pub fn format_quantity(value: u64) -> String {
    format!("{value:#x}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn quantities_round_trip_through_hex() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0xc8").unwrap(), 200);
        assert_eq!(format_quantity(200), "0xc8");
        assert_eq!(format_quantity(0), "0x0");
    }

    #[test]
    fn quantity_requires_prefix_and_hex_digits() {
        assert!(matches!(parse_quantity("200"), Err(FeedError::Malformed(_))));
        assert!(matches!(parse_quantity("0xzz"), Err(FeedError::Malformed(_))));
        assert!(matches!(
            parse_quantity("0x1ffffffffffffffff"),
            Err(FeedError::Malformed(_))
        ));
    }

    #[test]
    fn envelope_with_result() {
        let envelope: RpcResponse<String> =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#).unwrap();
        assert_eq!(envelope.into_result().unwrap().as_deref(), Some("0x10"));
    }

    #[test]
    fn envelope_with_null_result() {
        let envelope: RpcResponse<String> =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert_eq!(envelope.into_result().unwrap(), None);
    }

    #[test]
    fn envelope_with_error() {
        let envelope: RpcResponse<String> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32005,"message":"query returned more than 10000 results"}}"#,
        )
        .unwrap();
        let err = envelope.into_result().unwrap_err();
        assert!(matches!(err, FeedError::Rpc { code: -32005, .. }));
    }
}
