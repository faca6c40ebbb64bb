//! Canvas replay, day clock, snapshot emission, and reconciliation for the
//! Pixels daily snapshot service.
//!
//! This crate owns the incremental reconciliation algorithm: load the
//! checkpoint, replay newly observed pixel change events, emit one snapshot
//! for every day boundary crossed, and save the new checkpoint only after
//! every snapshot has been published.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `pixels-config.yaml` into
//!   strongly-typed structs.
//! - [`palette`] -- Colour lookup table.
//! - [`clock`] -- Block timestamp to day index mapping.
//! - [`canvas`] -- Mutable canvas state and immutable snapshots of it.
//! - [`snapshot`] -- PNG rendering, metadata and publication per day.
//! - [`source`] -- Collaborator traits (event feed, publisher, stores).
//! - [`reconcile`] -- The orchestrating [`Reconciler`].
//!
//! [`Reconciler`]: reconcile::Reconciler

pub mod canvas;
pub mod clock;
pub mod config;
pub mod palette;
pub mod reconcile;
pub mod snapshot;
pub mod source;
