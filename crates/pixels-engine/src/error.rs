//! Error types for the snapshot engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup and the reconciliation run.

/// Top-level error for the snapshot engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: pixels_core::config::ConfigError,
    },

    /// Day clock initialization failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: pixels_core::clock::ClockError,
    },

    /// The reconciliation run failed; the checkpoint was not advanced.
    #[error("reconcile error: {source}")]
    Reconcile {
        /// The underlying reconcile error.
        #[from]
        source: pixels_core::reconcile::ReconcileError,
    },

    /// The log filter could not be built from the configured level.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the filter failure.
        message: String,
    },
}
