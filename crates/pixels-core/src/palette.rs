//! Fixed colour lookup table.
//!
//! Canvas cells store a palette index rather than a colour. The palette maps
//! each index to an RGB triple; rendering always emits an opaque alpha.

use crate::config::PaletteEntry;

/// Maximum number of entries: colour indices travel on chain as single bytes.
pub const MAX_PALETTE_LEN: usize = 256;

/// Errors raised while building a palette from configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaletteError {
    /// No colours were configured.
    #[error("palette must contain at least one colour")]
    Empty,

    /// More colours than a byte index can address.
    #[error("palette has {len} colours, at most {MAX_PALETTE_LEN} are addressable")]
    TooLarge {
        /// Number of configured colours.
        len: usize,
    },

    /// A hex code is not of the form `#RRGGBB`.
    #[error("colour {name:?} has invalid hex code {hex:?}")]
    InvalidHex {
        /// Name of the offending entry.
        name: String,
        /// The hex string as configured.
        hex: String,
    },
}

/// An opaque RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// The colour as RGBA with alpha fixed at `0xFF`.
    pub const fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 0xFF]
    }

    fn parse_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        let bytes = hex::decode(digits).ok()?;
        match bytes.as_slice() {
            &[r, g, b] => Some(Self { r, g, b }),
            _ => None,
        }
    }
}

/// Ordered colour table indexed by the byte stored in each canvas cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorPalette {
    colors: Vec<Rgb>,
}

impl ColorPalette {
    /// Build a palette from configured entries, preserving their order.
    ///
    /// # Errors
    ///
    /// Returns [`PaletteError`] if the list is empty, longer than
    /// [`MAX_PALETTE_LEN`], or contains an unparsable hex code.
    pub fn from_entries(entries: &[PaletteEntry]) -> Result<Self, PaletteError> {
        if entries.is_empty() {
            return Err(PaletteError::Empty);
        }
        if entries.len() > MAX_PALETTE_LEN {
            return Err(PaletteError::TooLarge { len: entries.len() });
        }

        let colors = entries
            .iter()
            .map(|entry| {
                Rgb::parse_hex(&entry.hex).ok_or_else(|| PaletteError::InvalidHex {
                    name: entry.name.clone(),
                    hex: entry.hex.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { colors })
    }

    /// Build a palette directly from RGB values (mainly for tests).
    ///
    /// # Errors
    ///
    /// Same length constraints as [`ColorPalette::from_entries`].
    pub fn from_rgb(colors: Vec<Rgb>) -> Result<Self, PaletteError> {
        if colors.is_empty() {
            return Err(PaletteError::Empty);
        }
        if colors.len() > MAX_PALETTE_LEN {
            return Err(PaletteError::TooLarge { len: colors.len() });
        }
        Ok(Self { colors })
    }

    /// Look up the colour for a palette index.
    pub fn get(&self, index: u8) -> Option<Rgb> {
        self.colors.get(usize::from(index)).copied()
    }

    /// Whether `index` addresses a colour in this palette.
    pub fn contains(&self, index: u8) -> bool {
        usize::from(index) < self.colors.len()
    }

    /// Number of colours.
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Always `false`: construction rejects empty palettes.
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}
