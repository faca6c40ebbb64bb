//! Day clock: maps block timestamps to day indices.
//!
//! Day 0 covers all time strictly before the contract epoch. Day `n` (n >= 1)
//! is the `n`-th window of `day_length` seconds starting at the epoch, so the
//! epoch instant itself falls in day 1.
//!
//! The mapping is pure and monotonic non-decreasing in the timestamp. All
//! arithmetic is done in `i128`, which cannot overflow for any `u64`
//! timestamp and `i64` epoch.

use std::num::NonZeroU64;

use chrono::{DateTime, Utc};
use pixels_types::Day;

use crate::config::ClockConfig;

/// Errors that can occur when building a [`DayClock`].
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// The configured day length is zero.
    #[error("day length must be at least one second")]
    ZeroDayLength,
}

/// Convert a block timestamp to a day index.
///
/// Returns `max(floor((timestamp - epoch) / day_length) + 1, 0)`.
pub fn timestamp_to_day(timestamp: u64, epoch: i64, day_length: NonZeroU64) -> Day {
    let elapsed = i128::from(timestamp).saturating_sub(i128::from(epoch));
    let day = elapsed
        .div_euclid(i128::from(day_length.get()))
        .saturating_add(1)
        .max(0);
    Day(u64::try_from(day).unwrap_or(u64::MAX))
}

/// Day boundary calculator configured with an epoch and a day length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayClock {
    epoch: i64,
    day_length: NonZeroU64,
}

impl DayClock {
    /// Create a clock from an epoch timestamp and a day length in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::ZeroDayLength`] if `day_length_seconds` is 0.
    pub fn new(epoch: i64, day_length_seconds: u64) -> Result<Self, ClockError> {
        let day_length = NonZeroU64::new(day_length_seconds).ok_or(ClockError::ZeroDayLength)?;
        Ok(Self { epoch, day_length })
    }

    /// Create a clock from the `clock` configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::ZeroDayLength`] if the configured day length is 0.
    pub fn from_config(config: &ClockConfig) -> Result<Self, ClockError> {
        Self::new(config.epoch_timestamp, config.day_length_seconds)
    }

    /// Day index containing `timestamp`.
    pub fn day_of(&self, timestamp: u64) -> Day {
        timestamp_to_day(timestamp, self.epoch, self.day_length)
    }

    /// The epoch timestamp (start of day 1).
    pub const fn epoch(&self) -> i64 {
        self.epoch
    }

    /// Length of one day in seconds.
    pub const fn day_length_seconds(&self) -> u64 {
        self.day_length.get()
    }

    /// Wall-clock instant at which `day` begins, for logging.
    ///
    /// Day 0 has no start; returns `None` for it and for instants outside
    /// `chrono`'s representable range.
    pub fn day_start(&self, day: Day) -> Option<DateTime<Utc>> {
        let offset_days = i128::from(day.into_inner()).checked_sub(1)?;
        if offset_days < 0 {
            return None;
        }
        let seconds = offset_days
            .checked_mul(i128::from(self.day_length.get()))?
            .checked_add(i128::from(self.epoch))?;
        DateTime::from_timestamp(i64::try_from(seconds).ok()?, 0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    const EPOCH: i64 = 1_643_649_762;
    const DAY: u64 = 86_400;

    fn clock() -> DayClock {
        DayClock::new(EPOCH, DAY).unwrap()
    }

    fn ts(offset: i64) -> u64 {
        u64::try_from(EPOCH + offset).unwrap()
    }

    #[test]
    fn before_epoch_is_day_zero() {
        let clock = clock();
        assert_eq!(clock.day_of(0), Day(0));
        assert_eq!(clock.day_of(ts(-1)), Day(0));
        assert_eq!(clock.day_of(ts(-86_400 * 3)), Day(0));
    }

    #[test]
    fn epoch_instant_is_day_one() {
        let clock = clock();
        assert_eq!(clock.day_of(ts(0)), Day(1));
        assert_eq!(clock.day_of(ts(86_399)), Day(1));
        assert_eq!(clock.day_of(ts(86_400)), Day(2));
    }

    #[test]
    fn unit_day_length_boundaries() {
        let one = NonZeroU64::new(1).unwrap();
        assert_eq!(timestamp_to_day(99, 100, one), Day(0));
        assert_eq!(timestamp_to_day(100, 100, one), Day(1));
        assert_eq!(timestamp_to_day(101, 100, one), Day(2));
    }

    #[test]
    fn mapping_is_monotonic() {
        let clock = DayClock::new(1_000, 7).unwrap();
        let mut previous = Day(0);
        for t in 900..1_200 {
            let day = clock.day_of(t);
            assert!(day >= previous, "day went backwards at t={t}");
            previous = day;
        }
    }

    #[test]
    fn negative_epoch_is_supported() {
        let clock = DayClock::new(-10, 10).unwrap();
        assert_eq!(clock.day_of(0), Day(2));
    }

    #[test]
    fn extreme_timestamp_does_not_overflow() {
        let clock = DayClock::new(i64::MIN, 1).unwrap();
        assert_eq!(clock.day_of(u64::MAX), Day(u64::MAX));
    }

    #[test]
    fn zero_day_length_rejected() {
        assert!(matches!(DayClock::new(0, 0), Err(ClockError::ZeroDayLength)));
    }

    #[test]
    fn day_start_maps_back_to_epoch() {
        let clock = clock();
        assert_eq!(clock.day_start(Day(0)), None);
        assert_eq!(clock.day_start(Day(1)).unwrap().timestamp(), EPOCH);
        assert_eq!(
            clock.day_start(Day(3)).unwrap().timestamp(),
            EPOCH + 2 * 86_400
        );
        assert_eq!(clock.day_of(ts(2 * 86_400)), Day(3));
    }
}
