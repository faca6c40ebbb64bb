//! Shared type definitions for the Pixels daily snapshot service.
//!
//! Every crate in the workspace speaks in terms of the types defined here:
//! block numbers and day indices coming off the chain, the pixel change
//! events replayed against the canvas, and the persisted checkpoint.
//!
//! # Modules
//!
//! - [`ids`] -- Newtype wrappers for block numbers and day indices
//! - [`events`] -- Pixel change events delivered by the event feed
//! - [`checkpoint`] -- The persisted `{blockNumber, pixels}` record

pub mod checkpoint;
pub mod events;
pub mod ids;

// Re-export all public types at crate root for convenience.
pub use checkpoint::Checkpoint;
pub use events::{ChangeEvent, EventShapeError, PixelChange};
pub use ids::{BlockNumber, Day};
