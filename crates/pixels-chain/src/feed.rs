//! [`EventFeed`] backed by an Ethereum JSON-RPC node.

use async_trait::async_trait;
use pixels_core::config::ChainConfig;
use pixels_core::source::{EventFeed, FeedError};
use pixels_types::{BlockNumber, ChangeEvent};
use serde::Deserialize;
use serde_json::json;

use crate::abi::decode_pixels_changed_hex;
use crate::rpc::{RpcClient, format_quantity, parse_quantity};

/// Log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    /// Block the log was emitted in; `null` for pending logs.
    pub block_number: Option<String>,
    /// ABI-encoded event data.
    pub data: String,
    /// Position within the block.
    #[serde(default)]
    pub log_index: Option<String>,
    /// Set when a reorg retracted the log.
    #[serde(default)]
    pub removed: bool,
}

impl RpcLog {
    /// Decode into a [`ChangeEvent`].
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Malformed`] for a pending log or undecodable
    /// data, and [`FeedError::EventShape`] when the decoded arrays disagree.
    pub fn to_event(&self) -> Result<ChangeEvent, FeedError> {
        let block = self
            .block_number
            .as_deref()
            .ok_or_else(|| FeedError::Malformed("log has no block number".to_owned()))?;
        let block_number = BlockNumber(parse_quantity(block)?);
        let decoded = decode_pixels_changed_hex(&self.data)?;
        Ok(ChangeEvent::from_parallel(
            block_number,
            &decoded.pixels,
            &decoded.colors,
            self.removed,
        )?)
    }
}

#[derive(Debug, Deserialize)]
struct RpcBlockHeader {
    timestamp: String,
}

/// Split `[from, to]` into ascending inclusive windows of at most `range`
/// blocks. A zero `range` is treated as one.
pub fn block_windows(from: u64, to: u64, range: u64) -> Vec<(u64, u64)> {
    let span = range.saturating_sub(1);
    let mut windows = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(span).min(to);
        windows.push((start, end));
        match end.checked_add(1) {
            Some(next) => start = next,
            None => break,
        }
    }
    windows
}

/// Event feed reading `PixelsChanged` logs from one contract.
pub struct RpcEventFeed {
    client: RpcClient,
    contract_address: String,
    event_topic: String,
    max_block_range: u64,
}

impl RpcEventFeed {
    /// Build a feed from chain configuration.
    pub fn from_config(config: &ChainConfig) -> Self {
        Self {
            client: RpcClient::new(config.rpc_url.clone()),
            contract_address: config.contract_address.clone(),
            event_topic: config.event_topic.clone(),
            max_block_range: config.max_block_range,
        }
    }

    async fn logs_in_window(&self, from: u64, to: u64) -> Result<Vec<RpcLog>, FeedError> {
        let filter = json!([{
            "address": self.contract_address,
            "topics": [self.event_topic],
            "fromBlock": format_quantity(from),
            "toBlock": format_quantity(to),
        }]);
        let logs: Option<Vec<RpcLog>> = self.client.call("eth_getLogs", filter).await?;
        Ok(logs.unwrap_or_default())
    }
}

#[async_trait]
impl EventFeed for RpcEventFeed {
    async fn block_number(&self) -> Result<BlockNumber, FeedError> {
        let head: Option<String> = self.client.call("eth_blockNumber", json!([])).await?;
        let head =
            head.ok_or_else(|| FeedError::Malformed("eth_blockNumber returned null".to_owned()))?;
        Ok(BlockNumber(parse_quantity(&head)?))
    }

    async fn block_timestamp(&self, block: BlockNumber) -> Result<u64, FeedError> {
        let header: Option<RpcBlockHeader> = self
            .client
            .call(
                "eth_getBlockByNumber",
                json!([format_quantity(block.into_inner()), false]),
            )
            .await?;
        let header = header.ok_or(FeedError::BlockNotFound(block))?;
        parse_quantity(&header.timestamp)
    }

    async fn events(
        &self,
        from: BlockNumber,
        to: BlockNumber,
    ) -> Result<Vec<ChangeEvent>, FeedError> {
        let mut events = Vec::new();
        for (start, end) in block_windows(from.into_inner(), to.into_inner(), self.max_block_range)
        {
            let logs = self.logs_in_window(start, end).await?;
            tracing::debug!(from = start, to = end, logs = logs.len(), "Fetched logs");
            for log in &logs {
                events.push(log.to_event()?);
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use crate::abi::tests::encode;
    use pixels_types::PixelChange;

    fn log_json(block: &str, data: &[u8], removed: bool) -> String {
        format!(
            r#"{{"address":"0x01419a742ec2675c7d65e5f3104ef632bb957851","blockNumber":"{block}","data":"0x{}","logIndex":"0x0","removed":{removed},"topics":["0x88fa72deb3dad67a99a3c0d9bd632c3f02f9f8287461a949687e0a925ab957b1"]}}"#,
            hex::encode(data)
        )
    }

    #[test]
    fn windows_cover_range_exactly() {
        assert_eq!(
            block_windows(100, 250, 100),
            vec![(100, 199), (200, 250)]
        );
        assert_eq!(block_windows(5, 5, 1000), vec![(5, 5)]);
        assert_eq!(block_windows(0, 2, 1), vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn empty_window_list_when_range_is_inverted() {
        assert!(block_windows(10, 9, 100).is_empty());
    }

    #[test]
    fn windows_stop_at_u64_max() {
        assert_eq!(
            block_windows(u64::MAX - 1, u64::MAX, 1),
            vec![(u64::MAX - 1, u64::MAX - 1), (u64::MAX, u64::MAX)]
        );
    }

    #[test]
    fn log_decodes_into_change_event() {
        let log: RpcLog =
            serde_json::from_str(&log_json("0x96", &encode(&[5, 9], &[2, 15]), false)).unwrap();
        let event = log.to_event().unwrap();
        assert_eq!(event.block_number, BlockNumber(150));
        assert!(!event.removed);
        assert_eq!(
            event.changes,
            vec![
                PixelChange { pixel: 5, color: 2 },
                PixelChange { pixel: 9, color: 15 },
            ]
        );
    }

    #[test]
    fn removed_flag_is_carried() {
        let log: RpcLog =
            serde_json::from_str(&log_json("0x1", &encode(&[1], &[1]), true)).unwrap();
        assert!(log.to_event().unwrap().removed);
    }

    #[test]
    fn mismatched_arrays_are_a_shape_error() {
        let log: RpcLog =
            serde_json::from_str(&log_json("0x1", &encode(&[1, 2], &[1]), false)).unwrap();
        assert!(matches!(
            log.to_event(),
            Err(FeedError::EventShape { .. })
        ));
    }

    #[test]
    fn pixel_index_beyond_u32_is_a_shape_error() {
        let log: RpcLog = serde_json::from_str(&log_json(
            "0x1",
            &encode(&[u64::from(u32::MAX) + 1], &[1]),
            false,
        ))
        .unwrap();
        assert!(matches!(
            log.to_event(),
            Err(FeedError::EventShape { .. })
        ));
    }

    #[test]
    fn pending_log_is_malformed() {
        let log = RpcLog {
            block_number: None,
            data: format!("0x{}", hex::encode(encode(&[1], &[1]))),
            log_index: None,
            removed: false,
        };
        assert!(matches!(log.to_event(), Err(FeedError::Malformed(_))));
    }
}
