//! ABI decoding of `PixelsChanged(uint256[] pixelsToken, bytes colors)` log data.
//!
//! Both parameters are dynamic, so the data starts with two head words that
//! hold byte offsets to the tails:
//!
//! ```text
//! [0x00] offset of pixelsToken     -> [len][word]*len
//! [0x20] offset of colors          -> [len][bytes, right-padded to 32]
//! ```

use pixels_core::source::FeedError;

/// Size of one ABI word.
pub const WORD: usize = 32;

/// Decoded log payload: pixel indices and colors in event order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelsChangedData {
    /// Pixel indices, as `uint256` values narrowed to `u64`.
    pub pixels: Vec<u64>,
    /// One palette index per changed pixel.
    pub colors: Vec<u8>,
}

/// Decode the hex `data` field of a `PixelsChanged` log.
///
/// # Errors
///
/// Returns [`FeedError::Malformed`] for invalid hex or any offset, length or
/// value that falls outside the data.
pub fn decode_pixels_changed_hex(data: &str) -> Result<PixelsChangedData, FeedError> {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    let bytes = hex::decode(digits)
        .map_err(|e| FeedError::Malformed(format!("log data is not hex: {e}")))?;
    decode_pixels_changed(&bytes)
}

/// Decode raw `PixelsChanged` log data.
///
/// # Errors
///
/// Returns [`FeedError::Malformed`] when the data is truncated or a value
/// does not fit the target type.
pub fn decode_pixels_changed(data: &[u8]) -> Result<PixelsChangedData, FeedError> {
    let pixels_offset = read_usize(data, 0, "pixelsToken offset")?;
    let colors_offset = read_usize(data, WORD, "colors offset")?;

    let pixel_count = read_usize(data, pixels_offset, "pixelsToken length")?;
    let mut pixels = Vec::with_capacity(pixel_count.min(data.len() / WORD));
    let mut cursor = pixels_offset;
    for _ in 0..pixel_count {
        cursor = advance(cursor, WORD)?;
        pixels.push(read_u64(data, cursor, "pixel index")?);
    }

    let color_len = read_usize(data, colors_offset, "colors length")?;
    let start = advance(colors_offset, WORD)?;
    let end = advance(start, color_len)?;
    let colors = data
        .get(start..end)
        .ok_or_else(|| truncated("colors bytes", start))?
        .to_vec();

    Ok(PixelsChangedData { pixels, colors })
}

fn word(data: &[u8], at: usize, what: &str) -> Result<[u8; WORD], FeedError> {
    let end = advance(at, WORD)?;
    data.get(at..end)
        .and_then(|slice| <[u8; WORD]>::try_from(slice).ok())
        .ok_or_else(|| truncated(what, at))
}

fn read_u64(data: &[u8], at: usize, what: &str) -> Result<u64, FeedError> {
    let word = word(data, at, what)?;
    let (Some(high), Some(low)) = (word.first_chunk::<24>(), word.last_chunk::<8>()) else {
        return Err(truncated(what, at));
    };
    if high.iter().any(|&b| b != 0) {
        return Err(FeedError::Malformed(format!(
            "{what} at byte {at} does not fit in 64 bits"
        )));
    }
    Ok(u64::from_be_bytes(*low))
}

fn read_usize(data: &[u8], at: usize, what: &str) -> Result<usize, FeedError> {
    let value = read_u64(data, at, what)?;
    usize::try_from(value)
        .map_err(|e| FeedError::Malformed(format!("{what} {value} exceeds address space: {e}")))
}

fn advance(at: usize, by: usize) -> Result<usize, FeedError> {
    at.checked_add(by)
        .ok_or_else(|| FeedError::Malformed("log data offset overflow".to_owned()))
}

fn truncated(what: &str, at: usize) -> FeedError {
    FeedError::Malformed(format!("log data truncated reading {what} at byte {at}"))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation
)]
pub(crate) mod tests {
    use super::*;

    fn word_of(value: u64) -> Vec<u8> {
        let mut out = vec![0_u8; WORD - 8];
        out.extend_from_slice(&value.to_be_bytes());
        out
    }

    /// Standard ABI encoding of `(uint256[], bytes)`.
    pub(crate) fn encode(pixels: &[u64], colors: &[u8]) -> Vec<u8> {
        let pixels_offset = 2 * WORD;
        let colors_offset = pixels_offset + WORD * (1 + pixels.len());
        let mut out = Vec::new();
        out.extend(word_of(pixels_offset as u64));
        out.extend(word_of(colors_offset as u64));
        out.extend(word_of(pixels.len() as u64));
        for &p in pixels {
            out.extend(word_of(p));
        }
        out.extend(word_of(colors.len() as u64));
        out.extend_from_slice(colors);
        let padding = (WORD - colors.len() % WORD) % WORD;
        out.extend(std::iter::repeat_n(0_u8, padding));
        out
    }

    #[test]
    fn decodes_single_change() {
        let data = encode(&[5], &[2]);
        let decoded = decode_pixels_changed(&data).unwrap();
        assert_eq!(decoded.pixels, vec![5]);
        assert_eq!(decoded.colors, vec![2]);
    }

    #[test]
    fn decodes_many_changes_in_order() {
        let data = encode(&[65_535, 0, 300], &[15, 1, 7]);
        let decoded = decode_pixels_changed(&data).unwrap();
        assert_eq!(decoded.pixels, vec![65_535, 0, 300]);
        assert_eq!(decoded.colors, vec![15, 1, 7]);
    }

    #[test]
    fn decodes_empty_arrays() {
        let decoded = decode_pixels_changed(&encode(&[], &[])).unwrap();
        assert!(decoded.pixels.is_empty());
        assert!(decoded.colors.is_empty());
    }

    #[test]
    fn decodes_hex_with_prefix() {
        let data = format!("0x{}", hex::encode(encode(&[1, 2], &[3, 4])));
        let decoded = decode_pixels_changed_hex(&data).unwrap();
        assert_eq!(decoded.pixels, vec![1, 2]);
        assert_eq!(decoded.colors, vec![3, 4]);
    }

    #[test]
    fn length_mismatch_is_left_to_event_construction() {
        let decoded = decode_pixels_changed(&encode(&[1, 2], &[3])).unwrap();
        assert_eq!(decoded.pixels.len(), 2);
        assert_eq!(decoded.colors.len(), 1);
    }

    #[test]
    fn truncated_data_is_rejected() {
        let mut data = encode(&[1, 2, 3], &[1, 2, 3]);
        data.truncate(3 * WORD + 10);
        assert!(matches!(
            decode_pixels_changed(&data),
            Err(FeedError::Malformed(_))
        ));
    }

    #[test]
    fn oversized_offset_is_rejected() {
        let mut data = encode(&[1], &[1]);
        data[0] = 0xff;
        assert!(matches!(
            decode_pixels_changed(&data),
            Err(FeedError::Malformed(_))
        ));
    }

    #[test]
    fn pixel_index_beyond_u64_is_rejected() {
        let mut data = encode(&[1], &[1]);
        // high byte of the first pixel word
        data[3 * WORD] = 1;
        assert!(matches!(
            decode_pixels_changed(&data),
            Err(FeedError::Malformed(_))
        ));
    }

    #[test]
    fn non_hex_data_is_rejected() {
        assert!(matches!(
            decode_pixels_changed_hex("0xnothex"),
            Err(FeedError::Malformed(_))
        ));
    }
}
