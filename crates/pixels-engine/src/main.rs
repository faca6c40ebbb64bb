//! Daily snapshot binary for the Pixels canvas.
//!
//! One invocation performs one incremental reconciliation: it resumes from
//! the saved checkpoint, replays every pixel change up to the chain head,
//! publishes a snapshot for each day boundary crossed, and then saves the
//! new checkpoint. It is meant to be run periodically (cron, systemd timer).
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `pixels-config.yaml` (or `PIXELS_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Validate configuration and build the palette and day clock
//! 4. Create the event feed, blob publisher and local stores
//! 5. Run the reconciler once
//! 6. Log the result

mod error;

use std::path::PathBuf;

use pixels_chain::RpcEventFeed;
use pixels_core::clock::DayClock;
use pixels_core::config::{LoggingConfig, PixelsConfig};
use pixels_core::reconcile::{ReconcileOutcome, ReconcileSummary, Reconciler};
use pixels_core::snapshot::SnapshotEmitter;
use pixels_ipfs::NftStoragePublisher;
use pixels_store::{FileCheckpointStore, LocalArtifactStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "pixels-config.yaml";

/// Environment variable that overrides the configuration file path.
const CONFIG_PATH_ENV: &str = "PIXELS_CONFIG";

/// Where the configuration came from, reported once logging is up.
enum ConfigSource {
    File(PathBuf),
    Defaults(PathBuf),
}

/// Application entry point for the snapshot engine.
///
/// # Errors
///
/// Returns an error if any initialization step or the reconciliation run
/// fails. The process then exits with a non-zero status and the checkpoint
/// is left as it was.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let (config, source) = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging)?;
    info!("pixels-engine starting");
    match &source {
        ConfigSource::File(path) => info!(path = %path.display(), "Configuration loaded"),
        ConfigSource::Defaults(path) => {
            info!(path = %path.display(), "Config file not found, using defaults");
        }
    }

    // 3. Validate and derive runtime values.
    let palette = config.validate()?;
    let clock = DayClock::from_config(&config.clock)?;
    info!(
        width = config.canvas.width,
        height = config.canvas.height,
        colors = palette.len(),
        epoch = clock.epoch(),
        day_length_seconds = clock.day_length_seconds(),
        "Canvas configured"
    );

    // 4. Collaborators.
    let feed = RpcEventFeed::from_config(&config.chain);
    let publisher = NftStoragePublisher::from_config(&config.publisher);
    if !publisher.has_token() {
        warn!("NFT_STORAGE_TOKEN is not set; publishing a snapshot will fail");
    }
    let checkpoints = FileCheckpointStore::new(config.storage.checkpoint_path());
    let artifacts = LocalArtifactStore::new(config.storage.snapshot_path());
    info!(
        rpc_url = config.chain.rpc_url,
        contract = config.chain.contract_address,
        checkpoint = %checkpoints.path().display(),
        snapshots = %artifacts.dir().display(),
        "Collaborators ready"
    );

    // 5. Run once.
    let emitter = SnapshotEmitter::new(&palette, &publisher, &artifacts);
    let reconciler = Reconciler::new(config.canvas, &palette, clock, &feed, &checkpoints, emitter);
    let summary = reconciler.run().await?;

    // 6. Report.
    log_summary(&summary);
    Ok(())
}

/// Resolve the configuration path from `PIXELS_CONFIG`, falling back to
/// [`DEFAULT_CONFIG_PATH`].
fn config_path(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    lookup(CONFIG_PATH_ENV)
        .filter(|p| !p.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load configuration from the resolved path.
///
/// A missing file yields defaults (with environment overrides applied); a
/// file that exists but does not parse is an error.
fn load_config() -> Result<(PixelsConfig, ConfigSource), EngineError> {
    let path = config_path(|key| std::env::var(key).ok());
    if path.exists() {
        let config = PixelsConfig::from_file(&path)?;
        Ok((config, ConfigSource::File(path)))
    } else {
        let mut config = PixelsConfig::default();
        config.apply_env_overrides();
        Ok((config, ConfigSource::Defaults(path)))
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured level is used.
fn init_tracing(logging: &LoggingConfig) -> Result<(), EngineError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level).map_err(|e| EngineError::Logging {
            message: format!("invalid log level {:?}: {e}", logging.level),
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn log_summary(summary: &ReconcileSummary) {
    match summary.outcome {
        ReconcileOutcome::ChainBehindCheckpoint => {
            warn!(
                checkpoint_block = %summary.from_block,
                head = %summary.to_block,
                "Run skipped, checkpoint unchanged"
            );
        }
        ReconcileOutcome::Advanced => {
            for record in &summary.snapshots {
                info!(
                    day = %record.day,
                    image = %record.image_cid.uri(),
                    metadata = %record.metadata_cid.uri(),
                    "Snapshot published"
                );
            }
            info!(
                from_block = %summary.from_block,
                to_block = %summary.to_block,
                start_day = ?summary.start_day,
                end_day = ?summary.end_day,
                events_applied = summary.events_applied,
                events_retracted = summary.events_retracted,
                pixels_written = summary.pixels_written,
                snapshots = summary.snapshots.len(),
                "pixels-engine finished"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_defaults_to_working_directory_file() {
        assert_eq!(config_path(|_| None), PathBuf::from("pixels-config.yaml"));
    }

    #[test]
    fn config_path_honours_override() {
        let path = config_path(|key| (key == "PIXELS_CONFIG").then(|| "/etc/pixels.yaml".to_owned()));
        assert_eq!(path, PathBuf::from("/etc/pixels.yaml"));
    }

    #[test]
    fn empty_override_is_ignored() {
        assert_eq!(
            config_path(|_| Some(String::new())),
            PathBuf::from("pixels-config.yaml")
        );
    }
}
