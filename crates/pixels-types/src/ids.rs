//! Strongly-typed integer wrappers for chain positions and day indices.
//!
//! Block numbers and days are both plain `u64` counters on the wire. Keeping
//! them in distinct newtypes stops a block number from being handed to code
//! expecting a day (and vice versa) at compile time.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around `u64` with standard derives.
macro_rules! define_counter {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Wrap a raw counter value.
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Return the inner `u64` value.
            pub const fn into_inner(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

define_counter! {
    /// Height of a block on the chain.
    BlockNumber
}

define_counter! {
    /// Day index derived from a block timestamp.
    ///
    /// Day 0 covers everything strictly before the contract epoch; day `n`
    /// (n >= 1) is the `n`-th fixed-length window starting at the epoch.
    Day
}

impl Day {
    /// Iterate the half-open range of days `[from, to)` in ascending order.
    ///
    /// Yields nothing when `to <= from`.
    pub fn range(from: Self, to: Self) -> impl Iterator<Item = Self> {
        (from.0..to.0).map(Self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn day_range_is_half_open() {
        let days: Vec<Day> = Day::range(Day(3), Day(6)).collect();
        assert_eq!(days, vec![Day(3), Day(4), Day(5)]);
    }

    #[test]
    fn day_range_empty_when_not_increasing() {
        assert_eq!(Day::range(Day(4), Day(4)).count(), 0);
        assert_eq!(Day::range(Day(5), Day(2)).count(), 0);
    }

    #[test]
    fn block_number_serializes_as_plain_integer() {
        let json = serde_json::to_string(&BlockNumber(1234)).unwrap();
        assert_eq!(json, "1234");
        let back: BlockNumber = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BlockNumber(1234));
    }
}
