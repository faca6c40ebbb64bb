//! Pixel change events as delivered by the event feed.
//!
//! On chain, a `PixelsChanged` log carries two parallel arrays: token ids
//! (grid offsets) and a packed byte string of colour indices. The feed
//! adapter zips them into explicit [`PixelChange`] pairs through
//! [`ChangeEvent::from_parallel`], so nothing downstream ever has to keep
//! two indices in step.

use serde::{Deserialize, Serialize};

use crate::ids::BlockNumber;

/// Errors raised while assembling a [`ChangeEvent`] from raw log fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventShapeError {
    /// The pixel index and colour arrays differ in length.
    #[error("event at block {block_number}: {pixels} pixel indices but {colors} colors")]
    LengthMismatch {
        /// Block the event was emitted in.
        block_number: BlockNumber,
        /// Number of pixel indices in the log.
        pixels: usize,
        /// Number of colour bytes in the log.
        colors: usize,
    },

    /// A pixel index does not fit the grid offset type.
    #[error("event at block {block_number}: pixel index {index} out of range")]
    IndexOverflow {
        /// Block the event was emitted in.
        block_number: BlockNumber,
        /// The offending raw index.
        index: u64,
    },
}

/// A single `(pixel offset, colour index)` write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelChange {
    /// Row-major offset into the canvas grid.
    pub pixel: u32,
    /// Index into the colour palette.
    pub color: u8,
}

/// One feed record describing a batch of pixel colour updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Block the event was emitted in.
    pub block_number: BlockNumber,
    /// Pixel writes in the order they appear in the log.
    pub changes: Vec<PixelChange>,
    /// Feed-level retraction marker. Retracted events are never applied.
    pub removed: bool,
}

impl ChangeEvent {
    /// Build an event from the raw parallel arrays of a log.
    ///
    /// # Errors
    ///
    /// Returns [`EventShapeError::LengthMismatch`] when the arrays differ in
    /// length and [`EventShapeError::IndexOverflow`] when an index does not
    /// fit a `u32` grid offset.
    pub fn from_parallel(
        block_number: BlockNumber,
        pixel_indices: &[u64],
        colors: &[u8],
        removed: bool,
    ) -> Result<Self, EventShapeError> {
        if pixel_indices.len() != colors.len() {
            return Err(EventShapeError::LengthMismatch {
                block_number,
                pixels: pixel_indices.len(),
                colors: colors.len(),
            });
        }

        let changes = pixel_indices
            .iter()
            .zip(colors)
            .map(|(&index, &color)| {
                let pixel = u32::try_from(index)
                    .map_err(|_err| EventShapeError::IndexOverflow { block_number, index })?;
                Ok(PixelChange { pixel, color })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            block_number,
            changes,
            removed,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn zips_parallel_arrays_in_order() {
        let event = ChangeEvent::from_parallel(BlockNumber(7), &[10, 3, 10], &[2, 5, 9], false)
            .unwrap();
        assert_eq!(
            event.changes,
            vec![
                PixelChange { pixel: 10, color: 2 },
                PixelChange { pixel: 3, color: 5 },
                PixelChange { pixel: 10, color: 9 },
            ]
        );
        assert!(!event.removed);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let err = ChangeEvent::from_parallel(BlockNumber(7), &[1, 2], &[3], false).unwrap_err();
        assert_eq!(
            err,
            EventShapeError::LengthMismatch {
                block_number: BlockNumber(7),
                pixels: 2,
                colors: 1,
            }
        );
    }

    #[test]
    fn rejects_index_wider_than_grid_offset() {
        let too_big = u64::from(u32::MAX) + 1;
        let err = ChangeEvent::from_parallel(BlockNumber(1), &[too_big], &[0], false).unwrap_err();
        assert!(matches!(err, EventShapeError::IndexOverflow { index, .. } if index == too_big));
    }
}
