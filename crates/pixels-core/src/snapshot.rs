//! Daily snapshot rendering and publication.
//!
//! For one completed day, [`SnapshotEmitter::emit`] runs the following
//! sequence and stops at the first failure:
//!
//! ```text
//! CanvasSnapshot --render--> PNG bytes --> {day}-image.png
//!                                      \-> publish --> image cid
//! metadata(day, image cid) ------------> {day}-metadata.json
//!                                      \-> publish --> metadata cid
//! ipfs://{metadata cid} ---------------> {day}-metadata-ipfs.txt
//! ```
//!
//! Rendering is deterministic: identical pixels always produce identical PNG
//! bytes, so re-emitting a day after a failed run republishes the same
//! content-addressed blobs.

use std::io::Cursor;
use std::path::PathBuf;

use image::{ImageFormat, RgbaImage};
use pixels_types::Day;
use serde::Serialize;
use tracing::{debug, info};

use crate::canvas::CanvasSnapshot;
use crate::palette::ColorPalette;
use crate::source::{ArtifactSink, BlobPublisher, ContentId, PublishError, StoreError};

/// Fixed description attached to every snapshot.
pub const SNAPSHOT_DESCRIPTION: &str = "The pixels daily snapshot";

/// Errors that abort emission of a day's snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// A cell holds an index the palette does not contain.
    #[error("pixel {pixel} has color index {color} outside the palette")]
    UnknownColor {
        /// Offset of the cell.
        pixel: usize,
        /// The unknown colour index.
        color: u8,
    },

    /// The raw buffer does not match the snapshot dimensions.
    #[error("image buffer does not match {width}x{height}")]
    BufferSize {
        /// Snapshot width.
        width: u32,
        /// Snapshot height.
        height: u32,
    },

    /// PNG encoding failed.
    #[error("PNG encoding failed: {source}")]
    Encode {
        /// The underlying image error.
        #[from]
        source: image::ImageError,
    },

    /// Metadata could not be serialized.
    #[error("metadata serialization failed: {source}")]
    Metadata {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// Publishing the image or the metadata failed.
    #[error("publishing {artifact} for day {day} failed: {source}")]
    Publish {
        /// Day being emitted.
        day: Day,
        /// Which artifact failed (`image` or `metadata`).
        artifact: &'static str,
        /// The underlying publisher error.
        source: PublishError,
    },

    /// Writing a local artifact failed.
    #[error("writing snapshot artifact failed: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },
}

/// Metadata record published alongside each snapshot image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotMetadata {
    /// `Pixels Day #{day}`.
    pub name: String,
    /// Always [`SNAPSHOT_DESCRIPTION`].
    pub description: String,
    /// `ipfs://` URI of the published image.
    pub image_data: String,
}

impl SnapshotMetadata {
    /// Build the metadata record for `day` pointing at `image`.
    pub fn new(day: Day, image: &ContentId) -> Self {
        Self {
            name: format!("Pixels Day #{day}"),
            description: SNAPSHOT_DESCRIPTION.to_owned(),
            image_data: image.uri(),
        }
    }

    /// Pretty-printed JSON text (two-space indentation, declaration key order).
    ///
    /// # Errors
    ///
    /// Returns the serializer error; cannot happen for this plain struct.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Everything produced for one emitted day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    /// The completed day.
    pub day: Day,
    /// Content identifier of the PNG.
    pub image_cid: ContentId,
    /// Content identifier of the metadata text.
    pub metadata_cid: ContentId,
    /// Local path of the PNG.
    pub image_path: PathBuf,
    /// Local path of the metadata text.
    pub metadata_path: PathBuf,
    /// Local path of the file holding the metadata URI.
    pub reference_path: PathBuf,
}

/// Render a canvas snapshot to PNG bytes (RGBA8, opaque alpha).
///
/// # Errors
///
/// Returns [`SnapshotError::UnknownColor`] for cells outside the palette and
/// [`SnapshotError::Encode`] if PNG encoding fails.
pub fn render_png(canvas: &CanvasSnapshot, palette: &ColorPalette) -> Result<Vec<u8>, SnapshotError> {
    let mut raw = Vec::with_capacity(canvas.pixels().len().saturating_mul(4));
    for (pixel, &color) in canvas.pixels().iter().enumerate() {
        let rgb = palette
            .get(color)
            .ok_or(SnapshotError::UnknownColor { pixel, color })?;
        raw.extend_from_slice(&rgb.to_rgba());
    }

    let image = RgbaImage::from_raw(canvas.width(), canvas.height(), raw).ok_or(
        SnapshotError::BufferSize {
            width: canvas.width(),
            height: canvas.height(),
        },
    )?;

    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

/// Renders, stores and publishes daily snapshots.
pub struct SnapshotEmitter<'a> {
    palette: &'a ColorPalette,
    publisher: &'a dyn BlobPublisher,
    artifacts: &'a dyn ArtifactSink,
}

impl<'a> SnapshotEmitter<'a> {
    /// Create an emitter writing through `artifacts` and publishing through
    /// `publisher`.
    pub fn new(
        palette: &'a ColorPalette,
        publisher: &'a dyn BlobPublisher,
        artifacts: &'a dyn ArtifactSink,
    ) -> Self {
        Self {
            palette,
            publisher,
            artifacts,
        }
    }

    /// Emit the snapshot for `day` from `canvas`.
    ///
    /// Either every step succeeds and a [`SnapshotRecord`] is returned, or the
    /// day counts as not emitted. Local files written before a failure are
    /// left in place; they are overwritten when the day is retried.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] from rendering, local writes, or publishing.
    pub async fn emit(&self, canvas: &CanvasSnapshot, day: Day) -> Result<SnapshotRecord, SnapshotError> {
        info!(%day, "Generating canvas snapshot");

        let png = render_png(canvas, self.palette)?;
        let image_path = self.artifacts.write_image(day, &png).await?;
        debug!(%day, bytes = png.len(), path = %image_path.display(), "Wrote snapshot image");

        let image_cid = self
            .publisher
            .store_blob(&png)
            .await
            .map_err(|source| SnapshotError::Publish {
                day,
                artifact: "image",
                source,
            })?;

        let metadata = SnapshotMetadata::new(day, &image_cid).to_json()?;
        let metadata_path = self.artifacts.write_metadata(day, &metadata).await?;

        let metadata_cid = self
            .publisher
            .store_blob(metadata.as_bytes())
            .await
            .map_err(|source| SnapshotError::Publish {
                day,
                artifact: "metadata",
                source,
            })?;

        let reference_path = self
            .artifacts
            .write_metadata_reference(day, &metadata_cid.uri())
            .await?;

        info!(
            %day,
            image_cid = %image_cid,
            metadata_cid = %metadata_cid,
            "Published canvas snapshot"
        );

        Ok(SnapshotRecord {
            day,
            image_cid,
            metadata_cid,
            image_path,
            metadata_path,
            reference_path,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
pub(crate) mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::canvas::CanvasState;
    use crate::config::CanvasConfig;
    use crate::palette::Rgb;

    /// Publisher that derives identifiers from content and can be told to fail.
    #[derive(Default)]
    pub(crate) struct MemoryPublisher {
        pub(crate) blobs: Mutex<Vec<Vec<u8>>>,
        pub(crate) fail_on_call: Option<usize>,
    }

    #[async_trait]
    impl BlobPublisher for MemoryPublisher {
        async fn store_blob(&self, bytes: &[u8]) -> Result<ContentId, PublishError> {
            let mut blobs = self.blobs.lock().unwrap();
            if self.fail_on_call == Some(blobs.len()) {
                return Err(PublishError::Transport("connection reset".to_owned()));
            }
            blobs.push(bytes.to_vec());
            let sum: u64 = bytes.iter().map(|&b| u64::from(b)).sum();
            Ok(ContentId::new(format!("cid-{}-{sum}", bytes.len())))
        }
    }

    /// Artifact sink that keeps files in memory keyed by name.
    #[derive(Default)]
    pub(crate) struct MemoryArtifacts {
        pub(crate) files: Mutex<BTreeMap<String, Vec<u8>>>,
    }

    impl MemoryArtifacts {
        fn put(&self, name: String, bytes: &[u8]) -> PathBuf {
            self.files.lock().unwrap().insert(name.clone(), bytes.to_vec());
            PathBuf::from(name)
        }

        pub(crate) fn text(&self, name: &str) -> Option<String> {
            self.files
                .lock()
                .unwrap()
                .get(name)
                .map(|b| String::from_utf8(b.clone()).unwrap())
        }
    }

    #[async_trait]
    impl ArtifactSink for MemoryArtifacts {
        async fn write_image(&self, day: Day, bytes: &[u8]) -> Result<PathBuf, StoreError> {
            Ok(self.put(format!("{day}-image.png"), bytes))
        }

        async fn write_metadata(&self, day: Day, text: &str) -> Result<PathBuf, StoreError> {
            Ok(self.put(format!("{day}-metadata.json"), text.as_bytes()))
        }

        async fn write_metadata_reference(&self, day: Day, uri: &str) -> Result<PathBuf, StoreError> {
            Ok(self.put(format!("{day}-metadata-ipfs.txt"), uri.as_bytes()))
        }
    }

    fn palette() -> ColorPalette {
        ColorPalette::from_rgb(vec![
            Rgb { r: 0, g: 0, b: 0 },
            Rgb { r: 0xFF, g: 0, b: 0 },
            Rgb { r: 0, g: 0xFF, b: 0x10 },
        ])
        .unwrap()
    }

    fn canvas(pixels: Vec<u8>) -> CanvasSnapshot {
        CanvasState::from_pixels(CanvasConfig { width: 2, height: 2 }, &palette(), pixels)
            .unwrap()
            .snapshot()
    }

    #[test]
    fn metadata_text_layout() {
        let text = SnapshotMetadata::new(Day(4), &ContentId::new("bafyimage"))
            .to_json()
            .unwrap();
        assert_eq!(
            text,
            "{\n  \"name\": \"Pixels Day #4\",\n  \"description\": \"The pixels daily snapshot\",\n  \"image_data\": \"ipfs://bafyimage\"\n}"
        );
    }

    #[test]
    fn png_decodes_to_palette_colours() {
        let png = render_png(&canvas(vec![0, 1, 2, 0]), &palette()).unwrap();
        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .unwrap()
            .to_rgba8();
        assert_eq!(decoded.dimensions(), (2, 2));
        assert_eq!(decoded.get_pixel(0, 0).0, [0, 0, 0, 0xFF]);
        assert_eq!(decoded.get_pixel(1, 0).0, [0xFF, 0, 0, 0xFF]);
        assert_eq!(decoded.get_pixel(0, 1).0, [0, 0xFF, 0x10, 0xFF]);
        assert_eq!(decoded.get_pixel(1, 1).0, [0, 0, 0, 0xFF]);
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = render_png(&canvas(vec![2, 1, 0, 1]), &palette()).unwrap();
        let b = render_png(&canvas(vec![2, 1, 0, 1]), &palette()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_colour_is_rejected() {
        let small = ColorPalette::from_rgb(vec![Rgb { r: 0, g: 0, b: 0 }]).unwrap();
        let err = render_png(&canvas(vec![0, 0, 2, 0]), &small).unwrap_err();
        assert!(matches!(err, SnapshotError::UnknownColor { pixel: 2, color: 2 }));
    }

    #[tokio::test]
    async fn emit_writes_three_artifacts_and_publishes_twice() {
        let palette = palette();
        let publisher = MemoryPublisher::default();
        let artifacts = MemoryArtifacts::default();
        let emitter = SnapshotEmitter::new(&palette, &publisher, &artifacts);

        let record = emitter.emit(&canvas(vec![0, 1, 0, 0]), Day(7)).await.unwrap();

        assert_eq!(record.day, Day(7));
        assert_eq!(publisher.blobs.lock().unwrap().len(), 2);
        assert_eq!(artifacts.files.lock().unwrap().len(), 3);

        let metadata = artifacts.text("7-metadata.json").unwrap();
        assert!(metadata.contains("\"name\": \"Pixels Day #7\""));
        assert!(metadata.contains(&format!("\"image_data\": \"{}\"", record.image_cid.uri())));
        assert_eq!(
            artifacts.text("7-metadata-ipfs.txt").unwrap(),
            record.metadata_cid.uri()
        );
        assert_eq!(record.reference_path, PathBuf::from("7-metadata-ipfs.txt"));
    }

    #[tokio::test]
    async fn metadata_publish_failure_fails_the_day() {
        let palette = palette();
        let publisher = MemoryPublisher {
            fail_on_call: Some(1),
            ..MemoryPublisher::default()
        };
        let artifacts = MemoryArtifacts::default();
        let emitter = SnapshotEmitter::new(&palette, &publisher, &artifacts);

        let err = emitter.emit(&canvas(vec![0; 4]), Day(2)).await.unwrap_err();

        assert!(matches!(
            err,
            SnapshotError::Publish {
                artifact: "metadata",
                ..
            }
        ));
        assert!(artifacts.text("2-metadata-ipfs.txt").is_none());
    }
}
