//! Ethereum JSON-RPC event feed for the Pixels daily snapshot service.
//!
//! Reads `PixelsChanged(uint256[],bytes)` logs emitted by the pixels
//! contract and turns them into [`ChangeEvent`]s for the reconciler.
//!
//! # Modules
//!
//! - [`rpc`] -- JSON-RPC 2.0 transport and hex quantity helpers
//! - [`abi`] -- Decoding of the event's ABI-encoded data
//! - [`feed`] -- [`RpcEventFeed`], the [`EventFeed`] implementation
//!
//! [`ChangeEvent`]: pixels_types::ChangeEvent
//! [`EventFeed`]: pixels_core::source::EventFeed

pub mod abi;
pub mod feed;
pub mod rpc;

pub use feed::RpcEventFeed;
