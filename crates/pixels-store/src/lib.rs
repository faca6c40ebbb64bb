//! Local filesystem storage for the Pixels daily snapshot service.
//!
//! ```text
//! public/
//!   cache.json                     <- FileCheckpointStore
//!   canvasNFT/                     <- LocalArtifactStore
//!     {day}-image.png
//!     {day}-metadata.json
//!     {day}-metadata-ipfs.txt
//! ```
//!
//! # Modules
//!
//! - [`checkpoint_store`] -- Atomic JSON checkpoint file
//! - [`artifact_store`] -- Per-day snapshot artifact files

pub mod artifact_store;
pub mod checkpoint_store;

// Re-export primary types for convenience.
pub use artifact_store::LocalArtifactStore;
pub use checkpoint_store::FileCheckpointStore;
