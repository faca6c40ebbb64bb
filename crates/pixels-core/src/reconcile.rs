//! Incremental reconciliation: replay new change events and emit one snapshot
//! per completed day.
//!
//! A run moves the canvas from the checkpointed block to the current chain
//! head:
//!
//! 1. Load the checkpoint (or start from an all-zero canvas at block 0).
//! 2. Read the chain head. A head behind the checkpoint is a no-op run.
//! 3. Fetch every event in `[checkpoint block, head]`.
//! 4. Replay events in feed order. Before the first event of a later day is
//!    applied, every day from the current day up to (excluding) the event's
//!    day is emitted from the canvas as it stands, so a day's snapshot never
//!    contains the next day's writes.
//! 5. Flush the days between the last event and the chain head's day.
//! 6. Save the new checkpoint. Nothing is persisted if any earlier step
//!    failed, so the next run re-derives the same window.
//!
//! The window's lower bound is inclusive: the checkpointed block is scanned
//! again. Its events were the last ones applied by the previous run, so
//! replaying them in order rewrites the same cells with the same colours and
//! stays within the checkpoint's day.

use std::collections::BTreeMap;

use pixels_types::{BlockNumber, ChangeEvent, Checkpoint, Day};
use tracing::{debug, info, warn};

use crate::canvas::{CanvasError, CanvasState};
use crate::clock::DayClock;
use crate::config::CanvasConfig;
use crate::palette::ColorPalette;
use crate::snapshot::{SnapshotEmitter, SnapshotError, SnapshotRecord};
use crate::source::{CheckpointStore, EventFeed, FeedError, StoreError};

/// Errors that abort a reconciliation run before the checkpoint is saved.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The event feed failed.
    #[error("feed error: {source}")]
    Feed {
        /// The underlying feed error.
        #[from]
        source: FeedError,
    },

    /// Loading or saving the checkpoint failed.
    #[error("checkpoint error: {source}")]
    Checkpoint {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },

    /// The checkpoint or an event does not fit the canvas.
    #[error("canvas error: {source}")]
    Canvas {
        /// The underlying canvas error.
        #[from]
        source: CanvasError,
    },

    /// Emitting a day's snapshot failed.
    #[error("snapshot error: {source}")]
    Snapshot {
        /// The underlying snapshot error.
        #[from]
        source: SnapshotError,
    },

    /// The feed delivered an event from an earlier block than its predecessor.
    #[error("event at block {block} arrived after block {previous}")]
    OutOfOrderEvent {
        /// Block of the preceding event (or the window start).
        previous: BlockNumber,
        /// Block of the offending event.
        block: BlockNumber,
    },

    /// The feed delivered an event beyond the requested window.
    #[error("event at block {block} is beyond the chain head {head}")]
    EventBeyondHead {
        /// Block of the offending event.
        block: BlockNumber,
        /// Upper bound of the requested window.
        head: BlockNumber,
    },

    /// A block's timestamp maps to a day before one already replayed.
    #[error("block {block} falls in day {day}, before the current day {current}")]
    DayRegression {
        /// The offending block (an event block or the chain head).
        block: BlockNumber,
        /// Day of `block`.
        day: Day,
        /// Day already reached by the run.
        current: Day,
    },
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Events were replayed and the checkpoint now points at the chain head.
    Advanced,
    /// The chain head was behind the checkpoint; nothing was done.
    ChainBehindCheckpoint,
}

/// Result of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// How the run ended.
    pub outcome: ReconcileOutcome,
    /// Block the checkpoint pointed at when the run started.
    pub from_block: BlockNumber,
    /// Chain head observed by the run.
    pub to_block: BlockNumber,
    /// Day of `from_block` (`None` for a no-op run).
    pub start_day: Option<Day>,
    /// Day of `to_block` (`None` for a no-op run).
    pub end_day: Option<Day>,
    /// Events replayed against the canvas.
    pub events_applied: usize,
    /// Retracted events skipped.
    pub events_retracted: usize,
    /// Individual cell writes performed.
    pub pixels_written: usize,
    /// Snapshots emitted, in day order.
    pub snapshots: Vec<SnapshotRecord>,
}

impl ReconcileSummary {
    fn chain_behind(from_block: BlockNumber, to_block: BlockNumber) -> Self {
        Self {
            outcome: ReconcileOutcome::ChainBehindCheckpoint,
            from_block,
            to_block,
            start_day: None,
            end_day: None,
            events_applied: 0,
            events_retracted: 0,
            pixels_written: 0,
            snapshots: Vec::new(),
        }
    }
}

/// Per-run cache of block number to day, so each block timestamp is
/// fetched at most once.
struct BlockDays<'a> {
    feed: &'a dyn EventFeed,
    clock: DayClock,
    days: BTreeMap<BlockNumber, Day>,
}

impl<'a> BlockDays<'a> {
    fn new(feed: &'a dyn EventFeed, clock: DayClock) -> Self {
        Self {
            feed,
            clock,
            days: BTreeMap::new(),
        }
    }

    async fn day_of(&mut self, block: BlockNumber) -> Result<Day, FeedError> {
        if let Some(&day) = self.days.get(&block) {
            return Ok(day);
        }
        let timestamp = self.feed.block_timestamp(block).await?;
        let day = self.clock.day_of(timestamp);
        self.days.insert(block, day);
        Ok(day)
    }
}

/// Orchestrates one incremental run.
pub struct Reconciler<'a> {
    dimensions: CanvasConfig,
    palette: &'a ColorPalette,
    clock: DayClock,
    feed: &'a dyn EventFeed,
    checkpoints: &'a dyn CheckpointStore,
    emitter: SnapshotEmitter<'a>,
}

impl<'a> Reconciler<'a> {
    /// Wire a reconciler from its configuration and collaborators.
    pub fn new(
        dimensions: CanvasConfig,
        palette: &'a ColorPalette,
        clock: DayClock,
        feed: &'a dyn EventFeed,
        checkpoints: &'a dyn CheckpointStore,
        emitter: SnapshotEmitter<'a>,
    ) -> Self {
        Self {
            dimensions,
            palette,
            clock,
            feed,
            checkpoints,
            emitter,
        }
    }

    /// Run one reconciliation pass.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] on any feed, canvas, snapshot or store
    /// failure. The checkpoint is left untouched in every error case.
    pub async fn run(&self) -> Result<ReconcileSummary, ReconcileError> {
        let checkpoint = self.load_checkpoint().await?;
        let cache_block = checkpoint.block_number;
        let mut canvas = CanvasState::from_checkpoint(self.dimensions, self.palette, checkpoint)?;

        let head = self.feed.block_number().await?;
        if head < cache_block {
            warn!(
                checkpoint_block = %cache_block,
                head = %head,
                "Chain head is behind the checkpoint, skipping run"
            );
            return Ok(ReconcileSummary::chain_behind(cache_block, head));
        }

        let events = self.feed.events(cache_block, head).await?;

        let mut days = BlockDays::new(self.feed, self.clock);
        let start_day = days.day_of(cache_block).await?;
        let end_day = days.day_of(head).await?;

        info!(
            from_block = %cache_block,
            to_block = %head,
            from_day = %start_day,
            to_day = %end_day,
            events = events.len(),
            "Reconciling pixel changes"
        );

        let mut summary = ReconcileSummary {
            outcome: ReconcileOutcome::Advanced,
            from_block: cache_block,
            to_block: head,
            start_day: Some(start_day),
            end_day: Some(end_day),
            events_applied: 0,
            events_retracted: 0,
            pixels_written: 0,
            snapshots: Vec::new(),
        };

        let mut cache_day = start_day;
        let mut previous_block = cache_block;

        for event in &events {
            check_order(event, previous_block, head)?;
            previous_block = event.block_number;

            if event.removed {
                debug!(block = %event.block_number, "Skipping retracted event");
                summary.events_retracted = summary.events_retracted.saturating_add(1);
                continue;
            }

            let event_day = days.day_of(event.block_number).await?;
            check_day(event.block_number, event_day, cache_day)?;
            if event_day != cache_day {
                self.flush_days(cache_day, event_day, &canvas, &mut summary.snapshots)
                    .await?;
            }

            let written = canvas.apply_event(event)?;
            for change in &event.changes {
                debug!(
                    block = %event.block_number,
                    pixel = change.pixel,
                    color = change.color,
                    "Pixel set"
                );
            }
            summary.events_applied = summary.events_applied.saturating_add(1);
            summary.pixels_written = summary.pixels_written.saturating_add(written);

            cache_day = event_day;
        }

        check_day(head, end_day, cache_day)?;
        if cache_day != end_day {
            self.flush_days(cache_day, end_day, &canvas, &mut summary.snapshots)
                .await?;
        }

        let next = Checkpoint {
            block_number: head,
            pixels: canvas.into_pixels(),
        };
        self.checkpoints.save(&next).await?;

        info!(
            block = %head,
            events_applied = summary.events_applied,
            pixels_written = summary.pixels_written,
            snapshots = summary.snapshots.len(),
            "Checkpoint saved"
        );

        Ok(summary)
    }

    async fn load_checkpoint(&self) -> Result<Checkpoint, ReconcileError> {
        if let Some(checkpoint) = self.checkpoints.load().await? {
            debug!(block = %checkpoint.block_number, "Loaded checkpoint");
            return Ok(checkpoint);
        }
        info!("Checkpoint not found, starting from an empty canvas");
        let cells = self
            .dimensions
            .cell_count()
            .map_err(|_err| CanvasError::InvalidDimensions {
                width: self.dimensions.width,
                height: self.dimensions.height,
            })?;
        Ok(Checkpoint::genesis(cells))
    }

    /// Emit every day in `[from, to)` from the canvas as it stands now.
    ///
    /// The canvas is captured once; all gap days share the same image.
    async fn flush_days(
        &self,
        from: Day,
        to: Day,
        canvas: &CanvasState,
        out: &mut Vec<SnapshotRecord>,
    ) -> Result<(), ReconcileError> {
        info!(
            %from,
            %to,
            boundary = ?self.clock.day_start(to),
            "Day boundary crossed"
        );
        let snapshot = canvas.snapshot();
        for day in Day::range(from, to) {
            out.push(self.emitter.emit(&snapshot, day).await?);
        }
        Ok(())
    }
}

fn check_day(block: BlockNumber, day: Day, current: Day) -> Result<(), ReconcileError> {
    if day < current {
        return Err(ReconcileError::DayRegression {
            block,
            day,
            current,
        });
    }
    Ok(())
}

fn check_order(
    event: &ChangeEvent,
    previous: BlockNumber,
    head: BlockNumber,
) -> Result<(), ReconcileError> {
    if event.block_number < previous {
        return Err(ReconcileError::OutOfOrderEvent {
            previous,
            block: event.block_number,
        });
    }
    if event.block_number > head {
        return Err(ReconcileError::EventBeyondHead {
            block: event.block_number,
            head,
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use image::ImageFormat;
    use pixels_types::PixelChange;

    use super::*;
    use crate::palette::Rgb;
    use crate::snapshot::tests::{MemoryArtifacts, MemoryPublisher};

    // Test chain: block `b` has timestamp `1050 + 2b`; epoch 1000, day 100s.
    // Each day spans 50 blocks: day 1 = [0, 25), day 3 = [75, 125),
    // day 4 = [125, 175), day 5 = [175, 225), day 6 = [225, 275).
    const EPOCH: i64 = 1_000;
    const DAY_LENGTH: u64 = 100;

    const DIMS: CanvasConfig = CanvasConfig { width: 4, height: 4 };

    struct MemoryFeed {
        head: u64,
        events: Vec<ChangeEvent>,
        timestamp_overrides: BTreeMap<u64, u64>,
        event_queries: AtomicUsize,
        timestamp_queries: AtomicUsize,
    }

    impl MemoryFeed {
        fn new(head: u64, events: Vec<ChangeEvent>) -> Self {
            Self {
                head,
                events,
                timestamp_overrides: BTreeMap::new(),
                event_queries: AtomicUsize::new(0),
                timestamp_queries: AtomicUsize::new(0),
            }
        }

        fn with_timestamp(mut self, block: u64, timestamp: u64) -> Self {
            self.timestamp_overrides.insert(block, timestamp);
            self
        }
    }

    #[async_trait]
    impl EventFeed for MemoryFeed {
        async fn block_number(&self) -> Result<BlockNumber, FeedError> {
            Ok(BlockNumber(self.head))
        }

        async fn block_timestamp(&self, block: BlockNumber) -> Result<u64, FeedError> {
            self.timestamp_queries.fetch_add(1, Ordering::SeqCst);
            let block = block.into_inner();
            Ok(self
                .timestamp_overrides
                .get(&block)
                .copied()
                .unwrap_or(1_050 + 2 * block))
        }

        async fn events(
            &self,
            from: BlockNumber,
            to: BlockNumber,
        ) -> Result<Vec<ChangeEvent>, FeedError> {
            self.event_queries.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .events
                .iter()
                .filter(|e| e.block_number >= from && e.block_number <= to)
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct MemoryCheckpoints {
        stored: Mutex<Option<Checkpoint>>,
        saves: AtomicUsize,
    }

    impl MemoryCheckpoints {
        fn with(checkpoint: Checkpoint) -> Self {
            Self {
                stored: Mutex::new(Some(checkpoint)),
                saves: AtomicUsize::new(0),
            }
        }

        fn current(&self) -> Option<Checkpoint> {
            self.stored.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CheckpointStore for MemoryCheckpoints {
        async fn load(&self) -> Result<Option<Checkpoint>, StoreError> {
            Ok(self.current())
        }

        async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.stored.lock().unwrap() = Some(checkpoint.clone());
            Ok(())
        }
    }

    fn palette() -> ColorPalette {
        ColorPalette::from_rgb(vec![
            Rgb { r: 0, g: 0, b: 0 },
            Rgb { r: 10, g: 20, b: 30 },
            Rgb { r: 200, g: 100, b: 50 },
            Rgb { r: 1, g: 2, b: 3 },
        ])
        .unwrap()
    }

    fn clock() -> DayClock {
        DayClock::new(EPOCH, DAY_LENGTH).unwrap()
    }

    fn event(block: u64, changes: &[(u32, u8)]) -> ChangeEvent {
        ChangeEvent {
            block_number: BlockNumber(block),
            changes: changes
                .iter()
                .map(|&(pixel, color)| PixelChange { pixel, color })
                .collect(),
            removed: false,
        }
    }

    fn zeroed(block: u64) -> Checkpoint {
        Checkpoint {
            block_number: BlockNumber(block),
            pixels: vec![0; 16],
        }
    }

    /// Decode a stored snapshot image back into palette indices.
    fn snapshot_indices(artifacts: &MemoryArtifacts, day: u64, palette: &ColorPalette) -> Vec<u8> {
        let files = artifacts.files.lock().unwrap();
        let png = files.get(&format!("{day}-image.png")).unwrap();
        let image = image::load_from_memory_with_format(png, ImageFormat::Png)
            .unwrap()
            .to_rgba8();
        image
            .pixels()
            .map(|p| {
                (0..u8::try_from(palette.len()).unwrap())
                    .find(|&i| palette.get(i).unwrap().to_rgba() == p.0)
                    .unwrap()
            })
            .collect()
    }

    struct Harness {
        palette: ColorPalette,
        publisher: MemoryPublisher,
        artifacts: MemoryArtifacts,
        checkpoints: MemoryCheckpoints,
    }

    impl Harness {
        fn new(checkpoints: MemoryCheckpoints) -> Self {
            Self {
                palette: palette(),
                publisher: MemoryPublisher::default(),
                artifacts: MemoryArtifacts::default(),
                checkpoints,
            }
        }

        async fn run(&self, feed: &MemoryFeed) -> Result<ReconcileSummary, ReconcileError> {
            let emitter = SnapshotEmitter::new(&self.palette, &self.publisher, &self.artifacts);
            Reconciler::new(
                DIMS,
                &self.palette,
                clock(),
                feed,
                &self.checkpoints,
                emitter,
            )
            .run()
            .await
        }
    }

    fn emitted_days(summary: &ReconcileSummary) -> Vec<u64> {
        summary.snapshots.iter().map(|s| s.day.into_inner()).collect()
    }

    #[tokio::test]
    async fn single_event_then_trailing_day() {
        // Checkpoint in day 3, event in day 4, head in day 5.
        let harness = Harness::new(MemoryCheckpoints::with(zeroed(100)));
        let feed = MemoryFeed::new(200, vec![event(150, &[(10, 2)])]);

        let summary = harness.run(&feed).await.unwrap();

        assert_eq!(summary.outcome, ReconcileOutcome::Advanced);
        assert_eq!(summary.start_day, Some(Day(3)));
        assert_eq!(summary.end_day, Some(Day(5)));
        assert_eq!(emitted_days(&summary), vec![3, 4]);

        let day3 = snapshot_indices(&harness.artifacts, 3, &harness.palette);
        assert_eq!(day3, vec![0; 16]);
        let day4 = snapshot_indices(&harness.artifacts, 4, &harness.palette);
        let mut expected = vec![0; 16];
        expected[10] = 2;
        assert_eq!(day4, expected);

        let checkpoint = harness.checkpoints.current().unwrap();
        assert_eq!(checkpoint.block_number, BlockNumber(200));
        assert_eq!(checkpoint.pixels, expected);
    }

    #[tokio::test]
    async fn rerun_without_new_events_is_idempotent() {
        let harness = Harness::new(MemoryCheckpoints::with(zeroed(100)));
        let feed = MemoryFeed::new(200, vec![event(150, &[(10, 2)])]);

        harness.run(&feed).await.unwrap();
        let after_first = harness.checkpoints.current().unwrap();
        let blobs_after_first = harness.publisher.blobs.lock().unwrap().len();

        let second = harness.run(&feed).await.unwrap();

        assert!(second.snapshots.is_empty());
        assert_eq!(harness.checkpoints.current().unwrap(), after_first);
        assert_eq!(harness.publisher.blobs.lock().unwrap().len(), blobs_after_first);
    }

    #[tokio::test]
    async fn gap_days_are_each_emitted_once() {
        // Events in day 3 and day 6; head in day 6.
        let harness = Harness::new(MemoryCheckpoints::with(zeroed(80)));
        let feed = MemoryFeed::new(260, vec![event(90, &[(1, 1)]), event(240, &[(2, 3)])]);

        let summary = harness.run(&feed).await.unwrap();

        assert_eq!(emitted_days(&summary), vec![3, 4, 5]);
        let mut expected = vec![0; 16];
        expected[1] = 1;
        for day in [3, 4, 5] {
            assert_eq!(
                snapshot_indices(&harness.artifacts, day, &harness.palette),
                expected,
                "day {day}"
            );
        }
        assert_eq!(summary.events_applied, 2);
        assert_eq!(harness.checkpoints.current().unwrap().pixels[2], 3);
    }

    #[tokio::test]
    async fn elapsed_days_without_events_are_flushed() {
        let mut start = zeroed(100);
        start.pixels[5] = 3;
        let harness = Harness::new(MemoryCheckpoints::with(start.clone()));
        // Head at block 300 is day 7.
        let feed = MemoryFeed::new(300, Vec::new());

        let summary = harness.run(&feed).await.unwrap();

        assert_eq!(emitted_days(&summary), vec![3, 4, 5, 6]);
        assert_eq!(
            snapshot_indices(&harness.artifacts, 6, &harness.palette),
            start.pixels
        );
        assert_eq!(
            harness.checkpoints.current().unwrap(),
            Checkpoint {
                block_number: BlockNumber(300),
                pixels: start.pixels,
            }
        );
    }

    #[tokio::test]
    async fn same_day_events_emit_nothing() {
        let harness = Harness::new(MemoryCheckpoints::with(zeroed(130)));
        let feed = MemoryFeed::new(170, vec![event(140, &[(0, 1)]), event(160, &[(0, 2)])]);

        let summary = harness.run(&feed).await.unwrap();

        assert!(summary.snapshots.is_empty());
        assert_eq!(harness.checkpoints.current().unwrap().pixels[0], 2);
    }

    #[tokio::test]
    async fn repeated_pixel_in_one_event_keeps_last_color() {
        let harness = Harness::new(MemoryCheckpoints::with(zeroed(130)));
        let feed = MemoryFeed::new(140, vec![event(135, &[(7, 1), (7, 2)])]);

        let summary = harness.run(&feed).await.unwrap();

        assert_eq!(summary.pixels_written, 2);
        assert_eq!(harness.checkpoints.current().unwrap().pixels[7], 2);
    }

    #[tokio::test]
    async fn publish_failure_leaves_checkpoint_untouched() {
        let start = zeroed(100);
        let mut harness = Harness::new(MemoryCheckpoints::with(start.clone()));
        // Day 3 publishes image + metadata (calls 0, 1); day 4 image is call 2.
        harness.publisher.fail_on_call = Some(2);
        let feed = MemoryFeed::new(260, vec![event(150, &[(4, 1)])]);

        let result = harness.run(&feed).await;

        assert!(matches!(result, Err(ReconcileError::Snapshot { .. })));
        assert_eq!(harness.checkpoints.saves.load(Ordering::SeqCst), 0);
        assert_eq!(harness.checkpoints.current().unwrap(), start);
    }

    #[tokio::test]
    async fn chain_behind_checkpoint_is_a_no_op() {
        let start = zeroed(100);
        let harness = Harness::new(MemoryCheckpoints::with(start.clone()));
        let feed = MemoryFeed::new(50, vec![event(40, &[(1, 1)])]);

        let summary = harness.run(&feed).await.unwrap();

        assert_eq!(summary.outcome, ReconcileOutcome::ChainBehindCheckpoint);
        assert!(summary.snapshots.is_empty());
        assert_eq!(feed.event_queries.load(Ordering::SeqCst), 0);
        assert_eq!(harness.checkpoints.saves.load(Ordering::SeqCst), 0);
        assert_eq!(harness.checkpoints.current().unwrap(), start);
    }

    #[tokio::test]
    async fn retracted_events_are_ignored() {
        let harness = Harness::new(MemoryCheckpoints::with(zeroed(100)));
        let mut retracted = event(150, &[(3, 3)]);
        retracted.removed = true;
        // A retracted event in a later day must not trigger a flush either.
        let feed = MemoryFeed::new(160, vec![retracted]);

        let summary = harness.run(&feed).await.unwrap();

        assert_eq!(summary.events_retracted, 1);
        assert_eq!(summary.events_applied, 0);
        assert_eq!(emitted_days(&summary), vec![3]);
        assert_eq!(harness.checkpoints.current().unwrap().pixels, vec![0; 16]);
    }

    #[tokio::test]
    async fn first_run_starts_from_genesis() {
        let harness = Harness::new(MemoryCheckpoints::default());
        let feed = MemoryFeed::new(10, vec![event(5, &[(15, 1)])]);

        let summary = harness.run(&feed).await.unwrap();

        assert_eq!(summary.from_block, BlockNumber(0));
        assert!(summary.snapshots.is_empty());
        let checkpoint = harness.checkpoints.current().unwrap();
        assert_eq!(checkpoint.block_number, BlockNumber(10));
        assert_eq!(checkpoint.pixels[15], 1);
    }

    #[tokio::test]
    async fn rescanned_boundary_block_is_harmless() {
        let mut start = zeroed(150);
        start.pixels[10] = 2;
        let harness = Harness::new(MemoryCheckpoints::with(start.clone()));
        let feed = MemoryFeed::new(150, vec![event(150, &[(10, 2)])]);

        let summary = harness.run(&feed).await.unwrap();

        assert!(summary.snapshots.is_empty());
        assert_eq!(harness.checkpoints.current().unwrap(), start);
    }

    #[tokio::test]
    async fn out_of_order_events_abort() {
        let start = zeroed(100);
        let harness = Harness::new(MemoryCheckpoints::with(start.clone()));
        let feed = MemoryFeed::new(200, vec![event(160, &[(1, 1)]), event(120, &[(2, 1)])]);

        let result = harness.run(&feed).await;

        assert!(matches!(
            result,
            Err(ReconcileError::OutOfOrderEvent {
                previous: BlockNumber(160),
                block: BlockNumber(120),
            })
        ));
        assert_eq!(harness.checkpoints.current().unwrap(), start);
    }

    #[tokio::test]
    async fn malformed_pixel_aborts_run() {
        let start = zeroed(100);
        let harness = Harness::new(MemoryCheckpoints::with(start.clone()));
        let feed = MemoryFeed::new(110, vec![event(105, &[(16, 1)])]);

        let result = harness.run(&feed).await;

        assert!(matches!(
            result,
            Err(ReconcileError::Canvas {
                source: CanvasError::PixelOutOfBounds { index: 16, .. }
            })
        ));
        assert_eq!(harness.checkpoints.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn corrupt_checkpoint_length_aborts_run() {
        let harness = Harness::new(MemoryCheckpoints::with(Checkpoint {
            block_number: BlockNumber(1),
            pixels: vec![0; 3],
        }));
        let feed = MemoryFeed::new(2, Vec::new());

        let result = harness.run(&feed).await;

        assert!(matches!(
            result,
            Err(ReconcileError::Canvas {
                source: CanvasError::SizeMismatch { .. }
            })
        ));
    }

    #[tokio::test]
    async fn block_timestamps_are_fetched_once_per_block() {
        let harness = Harness::new(MemoryCheckpoints::with(zeroed(100)));
        let feed = MemoryFeed::new(
            200,
            vec![
                event(150, &[(1, 1)]),
                event(150, &[(2, 1)]),
                event(150, &[(3, 1)]),
            ],
        );

        harness.run(&feed).await.unwrap();

        // Blocks 100, 200 and 150.
        assert_eq!(feed.timestamp_queries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn event_timestamp_in_an_earlier_day_aborts_the_run() {
        // Block 160 reports a day-3 timestamp after block 150 reached day 4.
        let harness = Harness::new(MemoryCheckpoints::with(zeroed(100)));
        let feed = MemoryFeed::new(
            300,
            vec![event(150, &[(1, 1)]), event(160, &[(2, 2)])],
        )
        .with_timestamp(160, 1_250);

        let err = harness.run(&feed).await.unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::DayRegression {
                block: BlockNumber(160),
                day: Day(3),
                current: Day(4),
            }
        ));
        let published: Vec<String> = harness
            .artifacts
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|name| name.ends_with("-image.png"))
            .cloned()
            .collect();
        assert_eq!(published, vec!["3-image.png".to_owned()]);
        assert_eq!(harness.checkpoints.saves.load(Ordering::SeqCst), 0);
        assert_eq!(harness.checkpoints.current(), Some(zeroed(100)));
    }

    #[tokio::test]
    async fn head_timestamp_in_an_earlier_day_aborts_the_run() {
        // The last event reaches day 4 but the head reports day 3.
        let harness = Harness::new(MemoryCheckpoints::with(zeroed(100)));
        let feed = MemoryFeed::new(200, vec![event(150, &[(1, 1)])]).with_timestamp(200, 1_250);

        let err = harness.run(&feed).await.unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::DayRegression {
                block: BlockNumber(200),
                day: Day(3),
                current: Day(4),
            }
        ));
        assert_eq!(harness.checkpoints.saves.load(Ordering::SeqCst), 0);
    }
}
