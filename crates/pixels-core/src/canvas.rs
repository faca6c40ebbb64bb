//! Mutable canvas state and its immutable snapshots.
//!
//! [`CanvasState`] is the reconciler's private working copy of the grid. It is
//! only ever mutated through [`CanvasState::apply_pixel`] and
//! [`CanvasState::apply_event`], both of which reject writes that fall
//! outside the grid or the palette. Rendering never sees the live buffer:
//! [`CanvasState::snapshot`] hands out an owned [`CanvasSnapshot`] copy.

use pixels_types::{ChangeEvent, Checkpoint};

use crate::config::CanvasConfig;
use crate::palette::ColorPalette;

/// Errors raised by canvas mutations and checkpoint restoration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanvasError {
    /// A pixel offset outside `0..width*height`.
    #[error("pixel index {index} outside canvas of {cells} cells")]
    PixelOutOfBounds {
        /// The offending offset.
        index: u32,
        /// Number of cells in the canvas.
        cells: usize,
    },

    /// A colour index not present in the palette.
    #[error("color index {color} outside palette of {palette_len} colors")]
    ColorOutOfRange {
        /// The offending colour index.
        color: u8,
        /// Number of palette entries.
        palette_len: usize,
    },

    /// A restored pixel buffer does not match the canvas dimensions.
    #[error("pixel buffer has {actual} cells, canvas requires {expected}")]
    SizeMismatch {
        /// `width * height`.
        expected: usize,
        /// Length of the supplied buffer.
        actual: usize,
    },

    /// The configured dimensions are unusable.
    #[error("invalid canvas dimensions {width}x{height}")]
    InvalidDimensions {
        /// Configured width.
        width: u32,
        /// Configured height.
        height: u32,
    },
}

/// Fixed-size grid of palette indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasState {
    width: u32,
    height: u32,
    palette_len: usize,
    pixels: Vec<u8>,
}

impl CanvasState {
    /// Create a canvas with every cell set to palette index 0.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidDimensions`] if the dimensions are zero
    /// or their product overflows.
    pub fn new(dimensions: CanvasConfig, palette: &ColorPalette) -> Result<Self, CanvasError> {
        let cells = cell_count(dimensions)?;
        Ok(Self {
            width: dimensions.width,
            height: dimensions.height,
            palette_len: palette.len(),
            pixels: vec![0; cells],
        })
    }

    /// Restore a canvas from a persisted pixel buffer.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::SizeMismatch`] if the buffer length differs from
    /// `width * height`, and [`CanvasError::ColorOutOfRange`] if any cell holds
    /// an index the palette does not contain.
    pub fn from_pixels(
        dimensions: CanvasConfig,
        palette: &ColorPalette,
        pixels: Vec<u8>,
    ) -> Result<Self, CanvasError> {
        let expected = cell_count(dimensions)?;
        if pixels.len() != expected {
            return Err(CanvasError::SizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        if let Some(&color) = pixels.iter().find(|&&c| !palette.contains(c)) {
            return Err(CanvasError::ColorOutOfRange {
                color,
                palette_len: palette.len(),
            });
        }
        Ok(Self {
            width: dimensions.width,
            height: dimensions.height,
            palette_len: palette.len(),
            pixels,
        })
    }

    /// Restore a canvas from a checkpoint's pixel buffer.
    ///
    /// # Errors
    ///
    /// See [`CanvasState::from_pixels`].
    pub fn from_checkpoint(
        dimensions: CanvasConfig,
        palette: &ColorPalette,
        checkpoint: Checkpoint,
    ) -> Result<Self, CanvasError> {
        Self::from_pixels(dimensions, palette, checkpoint.pixels)
    }

    /// Set one cell to a palette index.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::PixelOutOfBounds`] or
    /// [`CanvasError::ColorOutOfRange`]; the canvas is unchanged on error.
    pub fn apply_pixel(&mut self, index: u32, color: u8) -> Result<(), CanvasError> {
        self.check(index, color)?;
        let cells = self.pixels.len();
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| self.pixels.get_mut(i))
            .ok_or(CanvasError::PixelOutOfBounds { index, cells })?;
        *slot = color;
        Ok(())
    }

    /// Apply every change of `event` in its internal order.
    ///
    /// Later writes to the same cell override earlier ones. The whole event is
    /// checked before any cell is written, so a malformed event leaves the
    /// canvas untouched. Returns the number of cells written.
    ///
    /// # Errors
    ///
    /// Returns the first [`CanvasError`] found among the event's changes.
    pub fn apply_event(&mut self, event: &ChangeEvent) -> Result<usize, CanvasError> {
        for change in &event.changes {
            self.check(change.pixel, change.color)?;
        }
        for change in &event.changes {
            self.apply_pixel(change.pixel, change.color)?;
        }
        Ok(event.changes.len())
    }

    fn check(&self, index: u32, color: u8) -> Result<(), CanvasError> {
        if usize::from(color) >= self.palette_len {
            return Err(CanvasError::ColorOutOfRange {
                color,
                palette_len: self.palette_len,
            });
        }
        let in_bounds = usize::try_from(index).is_ok_and(|i| i < self.pixels.len());
        if !in_bounds {
            return Err(CanvasError::PixelOutOfBounds {
                index,
                cells: self.pixels.len(),
            });
        }
        Ok(())
    }

    /// Palette index of one cell.
    pub fn pixel(&self, index: u32) -> Option<u8> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.pixels.get(i))
            .copied()
    }

    /// Owned copy of the current grid for rendering.
    pub fn snapshot(&self) -> CanvasSnapshot {
        CanvasSnapshot {
            width: self.width,
            height: self.height,
            pixels: self.pixels.clone().into_boxed_slice(),
        }
    }

    /// Read-only view of the live buffer.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Consume the canvas, returning its buffer for checkpointing.
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Cells per row.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of rows.
    pub const fn height(&self) -> u32 {
        self.height
    }
}

/// Immutable copy of the canvas at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasSnapshot {
    width: u32,
    height: u32,
    pixels: Box<[u8]>,
}

impl CanvasSnapshot {
    /// Cells per row.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of rows.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Row-major palette indices.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

fn cell_count(dimensions: CanvasConfig) -> Result<usize, CanvasError> {
    dimensions
        .cell_count()
        .map_err(|_err| CanvasError::InvalidDimensions {
            width: dimensions.width,
            height: dimensions.height,
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pixels_types::{BlockNumber, PixelChange};

    use super::*;
    use crate::palette::Rgb;

    fn palette(len: usize) -> ColorPalette {
        ColorPalette::from_rgb(vec![Rgb { r: 0, g: 0, b: 0 }; len]).unwrap()
    }

    fn dims(width: u32, height: u32) -> CanvasConfig {
        CanvasConfig { width, height }
    }

    fn event(changes: &[(u32, u8)]) -> ChangeEvent {
        ChangeEvent {
            block_number: BlockNumber(1),
            changes: changes
                .iter()
                .map(|&(pixel, color)| PixelChange { pixel, color })
                .collect(),
            removed: false,
        }
    }

    #[test]
    fn new_canvas_is_zeroed() {
        let canvas = CanvasState::new(dims(3, 2), &palette(4)).unwrap();
        assert_eq!(canvas.pixels(), &[0; 6]);
        assert_eq!(canvas.width(), 3);
        assert_eq!(canvas.height(), 2);
    }

    #[test]
    fn apply_pixel_writes_cell() {
        let mut canvas = CanvasState::new(dims(4, 4), &palette(4)).unwrap();
        canvas.apply_pixel(10, 2).unwrap();
        assert_eq!(canvas.pixel(10), Some(2));
        assert_eq!(canvas.pixels().iter().filter(|&&c| c != 0).count(), 1);
    }

    #[test]
    fn apply_pixel_rejects_out_of_bounds() {
        let mut canvas = CanvasState::new(dims(2, 2), &palette(4)).unwrap();
        assert_eq!(
            canvas.apply_pixel(4, 1),
            Err(CanvasError::PixelOutOfBounds { index: 4, cells: 4 })
        );
    }

    #[test]
    fn apply_pixel_rejects_unknown_color() {
        let mut canvas = CanvasState::new(dims(2, 2), &palette(4)).unwrap();
        assert_eq!(
            canvas.apply_pixel(0, 4),
            Err(CanvasError::ColorOutOfRange {
                color: 4,
                palette_len: 4
            })
        );
    }

    #[test]
    fn later_change_in_event_overrides_earlier() {
        let mut canvas = CanvasState::new(dims(4, 4), &palette(8)).unwrap();
        let written = canvas.apply_event(&event(&[(5, 1), (6, 3), (5, 7)])).unwrap();
        assert_eq!(written, 3);
        assert_eq!(canvas.pixel(5), Some(7));
        assert_eq!(canvas.pixel(6), Some(3));
    }

    #[test]
    fn malformed_event_leaves_canvas_untouched() {
        let mut canvas = CanvasState::new(dims(2, 2), &palette(4)).unwrap();
        let result = canvas.apply_event(&event(&[(0, 1), (9, 1)]));
        assert!(result.is_err());
        assert_eq!(canvas.pixels(), &[0; 4]);
    }

    #[test]
    fn snapshot_does_not_alias_live_buffer() {
        let mut canvas = CanvasState::new(dims(2, 2), &palette(4)).unwrap();
        let before = canvas.snapshot();
        canvas.apply_pixel(1, 3).unwrap();
        assert_eq!(before.pixels(), &[0, 0, 0, 0]);
        assert_eq!(canvas.snapshot().pixels(), &[0, 3, 0, 0]);
    }

    #[test]
    fn restore_checks_length_and_palette() {
        let pal = palette(2);
        assert_eq!(
            CanvasState::from_pixels(dims(2, 2), &pal, vec![0; 3]),
            Err(CanvasError::SizeMismatch {
                expected: 4,
                actual: 3
            })
        );
        assert_eq!(
            CanvasState::from_pixels(dims(2, 2), &pal, vec![0, 1, 2, 0]),
            Err(CanvasError::ColorOutOfRange {
                color: 2,
                palette_len: 2
            })
        );
        let canvas = CanvasState::from_pixels(dims(2, 2), &pal, vec![0, 1, 1, 0]).unwrap();
        assert_eq!(canvas.into_pixels(), vec![0, 1, 1, 0]);
    }

    #[test]
    fn restore_from_checkpoint() {
        let checkpoint = Checkpoint {
            block_number: BlockNumber(9),
            pixels: vec![1, 0, 0, 1],
        };
        let canvas = CanvasState::from_checkpoint(dims(2, 2), &palette(2), checkpoint).unwrap();
        assert_eq!(canvas.pixel(3), Some(1));
    }
}
