//! Collaborator traits: the event feed, blob publisher, checkpoint store and
//! local artifact sink.
//!
//! The reconciler only ever talks to these traits. Production implementations
//! live in `pixels-chain` (JSON-RPC feed), `pixels-ipfs` (NFT.Storage) and
//! `pixels-store` (filesystem); the reconciler tests use in-memory fakes.
//!
//! Traits are object safe via `async-trait` and consumed as `&dyn Trait`.

use std::path::PathBuf;

use async_trait::async_trait;
use pixels_types::{BlockNumber, ChangeEvent, Checkpoint, Day, EventShapeError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by an [`EventFeed`].
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The request never produced a usable response (network, HTTP status).
    #[error("feed transport error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error object.
    #[error("feed RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The node answered, but the payload is not what the contract emits.
    #[error("malformed feed data: {0}")]
    Malformed(String),

    /// A log decoded to parallel arrays that do not line up.
    #[error("malformed event: {source}")]
    EventShape {
        /// The underlying shape error.
        #[from]
        source: EventShapeError,
    },

    /// A block the feed was asked about does not exist.
    #[error("block {0} not found")]
    BlockNotFound(BlockNumber),
}

/// Errors surfaced by a [`BlobPublisher`].
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// No API token is configured.
    #[error("blob publisher token is not configured")]
    MissingToken,

    /// The upload request failed before a response arrived.
    #[error("publish transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("publisher returned {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The service answered successfully but without a content identifier.
    #[error("invalid publisher response: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by a [`CheckpointStore`] or [`ArtifactSink`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing a file failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A persisted checkpoint could not be parsed.
    #[error("corrupt checkpoint at {}: {source}", path.display())]
    Corrupt {
        /// The checkpoint file.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// A checkpoint could not be serialized.
    #[error("failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Content identifiers
// ---------------------------------------------------------------------------

/// Opaque reference returned by a [`BlobPublisher`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentId(String);

impl ContentId {
    /// Wrap an identifier string.
    pub fn new(cid: impl Into<String>) -> Self {
        Self(cid.into())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `ipfs://` URI referencing this identifier.
    pub fn uri(&self) -> String {
        format!("ipfs://{}", self.0)
    }
}

impl core::fmt::Display for ContentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Ordered source of pixel change events keyed by block number.
#[async_trait]
pub trait EventFeed: Send + Sync {
    /// Current chain head.
    async fn block_number(&self) -> Result<BlockNumber, FeedError>;

    /// Unix timestamp of `block`.
    async fn block_timestamp(&self, block: BlockNumber) -> Result<u64, FeedError>;

    /// All change events in `[from, to]`, in ascending block order.
    ///
    /// Retracted entries may be included with `removed = true`.
    async fn events(
        &self,
        from: BlockNumber,
        to: BlockNumber,
    ) -> Result<Vec<ChangeEvent>, FeedError>;
}

/// Content-addressed durable blob storage.
#[async_trait]
pub trait BlobPublisher: Send + Sync {
    /// Store `bytes` and return their content identifier.
    async fn store_blob(&self, bytes: &[u8]) -> Result<ContentId, PublishError>;
}

/// Load/save of the single persisted checkpoint record.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The last saved checkpoint, or `None` on the first run.
    async fn load(&self) -> Result<Option<Checkpoint>, StoreError>;

    /// Replace the saved checkpoint. Must be all-or-nothing.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;
}

/// Local, day-indexed storage for emitted snapshot artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Write the encoded image for `day`.
    async fn write_image(&self, day: Day, bytes: &[u8]) -> Result<PathBuf, StoreError>;

    /// Write the metadata text for `day`.
    async fn write_metadata(&self, day: Day, text: &str) -> Result<PathBuf, StoreError>;

    /// Write the URI of the published metadata for `day`.
    async fn write_metadata_reference(&self, day: Day, uri: &str) -> Result<PathBuf, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_id_uri_uses_ipfs_scheme() {
        let cid = ContentId::new("bafy123");
        assert_eq!(cid.uri(), "ipfs://bafy123");
        assert_eq!(cid.to_string(), "bafy123");
        assert_eq!(cid.as_str(), "bafy123");
    }
}
