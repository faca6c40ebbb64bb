//! Configuration loading and typed config structures for the Pixels service.
//!
//! The configuration lives in `pixels-config.yaml`. This module defines
//! strongly-typed structs that mirror the YAML structure, and provides a
//! loader that reads and validates the file. Every field has a default equal
//! to the production deployment, so an absent file (or an absent section)
//! reproduces the live canvas exactly.
//!
//! The loaded [`PixelsConfig`] is immutable once validated. Components take
//! the pieces they need (canvas dimensions, palette, clock) as explicit
//! constructor arguments rather than reading globals, which is what lets the
//! tests drive the reconciler with tiny synthetic canvases.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::palette::{ColorPalette, PaletteError};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The palette section could not be turned into a colour table.
    #[error("invalid palette: {source}")]
    Palette {
        /// The underlying palette error.
        #[from]
        source: PaletteError,
    },

    /// A value is out of its permitted range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PixelsConfig {
    /// Canvas dimensions.
    #[serde(default)]
    pub canvas: CanvasConfig,

    /// Ordered colour table; index 0 is the initial colour of every cell.
    #[serde(default = "default_palette")]
    pub palette: Vec<PaletteEntry>,

    /// Day boundary settings.
    #[serde(default)]
    pub clock: ClockConfig,

    /// Chain connection and contract settings.
    #[serde(default)]
    pub chain: ChainConfig,

    /// Local filesystem layout.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Blob publisher settings.
    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for PixelsConfig {
    fn default() -> Self {
        Self {
            canvas: CanvasConfig::default(),
            palette: default_palette(),
            clock: ClockConfig::default(),
            chain: ChainConfig::default(),
            storage: StorageConfig::default(),
            publisher: PublisherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PixelsConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override secrets and endpoints:
    /// - `RPC_URL` overrides `chain.rpc_url`
    /// - `NFT_STORAGE_TOKEN` overrides `publisher.token`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, applying environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Override endpoint and token settings with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Override endpoint and token settings from an arbitrary key lookup.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("RPC_URL") {
            self.chain.rpc_url = val;
        }
        if let Some(val) = lookup("NFT_STORAGE_TOKEN") {
            self.publisher.token = Some(val);
        }
    }

    /// Check every range constraint and build the colour table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero canvas dimensions, a zero day
    /// length or a non-positive block range, and [`ConfigError::Palette`] if
    /// the palette cannot be parsed.
    pub fn validate(&self) -> Result<ColorPalette, ConfigError> {
        self.canvas.cell_count()?;

        if self.clock.day_length_seconds == 0 {
            return Err(ConfigError::Invalid {
                reason: "clock.day_length_seconds must be at least 1".to_owned(),
            });
        }
        if self.chain.max_block_range == 0 {
            return Err(ConfigError::Invalid {
                reason: "chain.max_block_range must be at least 1".to_owned(),
            });
        }

        Ok(ColorPalette::from_entries(&self.palette)?)
    }
}

/// Canvas dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CanvasConfig {
    /// Cells per row.
    #[serde(default = "default_canvas_side")]
    pub width: u32,

    /// Number of rows.
    #[serde(default = "default_canvas_side")]
    pub height: u32,
}

impl CanvasConfig {
    /// Total number of cells, `width * height`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if either dimension is zero or the
    /// product does not fit a `u32` grid offset.
    pub fn cell_count(&self) -> Result<usize, ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "canvas dimensions must be non-zero (got {}x{})",
                    self.width, self.height
                ),
            });
        }
        let cells = self
            .width
            .checked_mul(self.height)
            .ok_or_else(|| ConfigError::Invalid {
                reason: format!("canvas {}x{} exceeds u32 cell range", self.width, self.height),
            })?;
        usize::try_from(cells).map_err(|_err| ConfigError::Invalid {
            reason: "canvas cell count exceeds usize range".to_owned(),
        })
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: default_canvas_side(),
            height: default_canvas_side(),
        }
    }
}

/// One named palette colour, written as `#RRGGBB`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaletteEntry {
    /// Human-readable colour name.
    pub name: String,
    /// Hex colour code, e.g. `#1D2B53`.
    pub hex: String,
}

impl PaletteEntry {
    fn new(name: &str, hex: &str) -> Self {
        Self {
            name: name.to_owned(),
            hex: hex.to_owned(),
        }
    }
}

/// Day boundary configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ClockConfig {
    /// Unix timestamp of contract creation; the start of day 1.
    #[serde(default = "default_epoch_timestamp")]
    pub epoch_timestamp: i64,

    /// Length of one day in seconds.
    #[serde(default = "default_day_length_seconds")]
    pub day_length_seconds: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            epoch_timestamp: default_epoch_timestamp(),
            day_length_seconds: default_day_length_seconds(),
        }
    }
}

/// Chain connection and contract configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Address of the pixels contract.
    #[serde(default = "default_contract_address")]
    pub contract_address: String,

    /// `topic0` of the `PixelsChanged` event.
    #[serde(default = "default_event_topic")]
    pub event_topic: String,

    /// Maximum blocks covered by one `eth_getLogs` request.
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            contract_address: default_contract_address(),
            event_topic: default_event_topic(),
            max_block_range: default_max_block_range(),
        }
    }
}

/// Local filesystem layout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Root directory for all local output.
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,

    /// Checkpoint file name, relative to `public_dir`.
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: String,

    /// Snapshot artifact directory, relative to `public_dir`.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,
}

impl StorageConfig {
    /// Full path of the checkpoint file.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.public_dir.join(&self.checkpoint_file)
    }

    /// Full path of the snapshot artifact directory.
    pub fn snapshot_path(&self) -> PathBuf {
        self.public_dir.join(&self.snapshot_dir)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_dir: default_public_dir(),
            checkpoint_file: default_checkpoint_file(),
            snapshot_dir: default_snapshot_dir(),
        }
    }
}

/// Blob publisher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublisherConfig {
    /// Base URL of the NFT.Storage API.
    #[serde(default = "default_publisher_api_url")]
    pub api_url: String,

    /// API token. Usually supplied via `NFT_STORAGE_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            api_url: default_publisher_api_url(),
            token: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const fn default_canvas_side() -> u32 {
    256
}

fn default_palette() -> Vec<PaletteEntry> {
    vec![
        PaletteEntry::new("Black", "#000000"),
        PaletteEntry::new("Dark Blue", "#1D2B53"),
        PaletteEntry::new("Dark Purple", "#7E2553"),
        PaletteEntry::new("Dark Green", "#008751"),
        PaletteEntry::new("Brown", "#AB5236"),
        PaletteEntry::new("Dark Grey", "#5F574F"),
        PaletteEntry::new("Light Grey", "#C2C3C7"),
        PaletteEntry::new("White", "#FFF1E8"),
        PaletteEntry::new("Red", "#FF004D"),
        PaletteEntry::new("Orange", "#FFA300"),
        PaletteEntry::new("Yellow", "#FFEC27"),
        PaletteEntry::new("Green", "#00E436"),
        PaletteEntry::new("Blue", "#29ADFF"),
        PaletteEntry::new("Lavender", "#83769C"),
        PaletteEntry::new("Pink", "#FF77A8"),
        PaletteEntry::new("Light Peach", "#FFCCAA"),
    ]
}

const fn default_epoch_timestamp() -> i64 {
    1_643_649_762
}

const fn default_day_length_seconds() -> u64 {
    86_400
}

fn default_rpc_url() -> String {
    "http://localhost:8545".to_owned()
}

fn default_contract_address() -> String {
    "0x01419A742Ec2675c7d65e5f3104ef632bb957851".to_owned()
}

/// keccak-256 of `PixelsChanged(uint256[],bytes)`.
fn default_event_topic() -> String {
    "0x88fa72deb3dad67a99a3c0d9bd632c3f02f9f8287461a949687e0a925ab957b1".to_owned()
}

const fn default_max_block_range() -> u64 {
    5_000
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_checkpoint_file() -> String {
    "cache.json".to_owned()
}

fn default_snapshot_dir() -> String {
    "canvasNFT".to_owned()
}

fn default_publisher_api_url() -> String {
    "https://api.nft.storage".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_canvas() {
        let config = PixelsConfig::default();
        assert_eq!(config.canvas.width, 256);
        assert_eq!(config.canvas.height, 256);
        assert_eq!(config.canvas.cell_count().unwrap(), 65_536);
        assert_eq!(config.palette.len(), 16);
        assert_eq!(config.clock.epoch_timestamp, 1_643_649_762);
        assert_eq!(config.clock.day_length_seconds, 86_400);
        assert_eq!(
            config.storage.checkpoint_path(),
            PathBuf::from("public").join("cache.json")
        );
        assert_eq!(
            config.storage.snapshot_path(),
            PathBuf::from("public").join("canvasNFT")
        );
    }

    #[test]
    fn empty_yaml_yields_defaults() {
        let mut config: PixelsConfig = serde_yml::from_str("{}").unwrap();
        config.apply_overrides_from(|_| None);
        assert_eq!(config, PixelsConfig::default());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = "
canvas:
  width: 4
clock:
  day_length_seconds: 10
";
        let config: PixelsConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.canvas.width, 4);
        assert_eq!(config.canvas.height, 256);
        assert_eq!(config.clock.day_length_seconds, 10);
        assert_eq!(config.clock.epoch_timestamp, 1_643_649_762);
    }

    #[test]
    fn overrides_apply_rpc_url_and_token() {
        let mut config = PixelsConfig::default();
        config.apply_overrides_from(|key| match key {
            "RPC_URL" => Some("https://rpc.example".to_owned()),
            "NFT_STORAGE_TOKEN" => Some("secret".to_owned()),
            _ => None,
        });
        assert_eq!(config.chain.rpc_url, "https://rpc.example");
        assert_eq!(config.publisher.token.as_deref(), Some("secret"));
    }

    #[test]
    fn validate_accepts_defaults() {
        let palette = PixelsConfig::default().validate().unwrap();
        assert_eq!(palette.len(), 16);
    }

    #[test]
    fn validate_rejects_zero_dimensions() {
        let mut config = PixelsConfig::default();
        config.canvas.height = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn validate_rejects_zero_day_length() {
        let mut config = PixelsConfig::default();
        config.clock.day_length_seconds = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn validate_rejects_bad_palette_hex() {
        let mut config = PixelsConfig::default();
        config.palette = vec![PaletteEntry::new("Broken", "#12")];
        assert!(matches!(config.validate(), Err(ConfigError::Palette { .. })));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let result = PixelsConfig::parse("canvas: [not, a, map]");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn shipped_config_file_matches_defaults() {
        let yaml = include_str!("../../../pixels-config.yaml");
        let config: PixelsConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.canvas, PixelsConfig::default().canvas);
        assert_eq!(config.palette, default_palette());
        assert_eq!(config.clock, ClockConfig::default());
        assert_eq!(config.chain, ChainConfig::default());
        assert_eq!(config.storage, StorageConfig::default());
        assert_eq!(config.publisher, PublisherConfig::default());
        assert_eq!(config.logging, LoggingConfig::default());
    }
}
