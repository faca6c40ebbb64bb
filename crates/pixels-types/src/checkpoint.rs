//! The persisted reconciliation checkpoint.

use serde::{Deserialize, Serialize};

use crate::ids::BlockNumber;

/// Last processed block plus the canvas state as of that block.
///
/// Serialized with camelCase keys: `{"blockNumber": n, "pixels": [..]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Chain head observed by the run that wrote this checkpoint.
    pub block_number: BlockNumber,
    /// Row-major palette indices, one per canvas cell.
    pub pixels: Vec<u8>,
}

impl Checkpoint {
    /// Checkpoint used on the very first run: block 0, every cell colour 0.
    pub fn genesis(cell_count: usize) -> Self {
        Self {
            block_number: BlockNumber(0),
            pixels: vec![0; cell_count],
        }
    }
}
