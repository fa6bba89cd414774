// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! DDS duration with a distinguished "infinite" value.
//!
//! Blocking operations (`wait_for_acknowledgments`, reliable `write` with a
//! full history) accept a [`DdsDuration`]; QoS policies (deadline, lease,
//! latency budget) store one. Comparisons treat INFINITE as greater than any
//! finite value, which is what the RxO compatibility rules need.

use std::time::Duration;

/// Seconds value reserved for the infinite duration (DDS v1.4 Sec.2.3.2).
const DURATION_INFINITE_SEC: i32 = 0x7FFF_FFFF;
/// Fraction value reserved for the infinite duration.
const DURATION_INFINITE_NSEC: u32 = 0xFFFF_FFFF;

/// DDS duration (seconds + nanoseconds) with an explicit infinite encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdsDuration {
    sec: i32,
    nanosec: u32,
}

impl DdsDuration {
    /// The distinguished infinite duration.
    pub const INFINITE: DdsDuration = DdsDuration {
        sec: DURATION_INFINITE_SEC,
        nanosec: DURATION_INFINITE_NSEC,
    };

    /// Zero-length duration.
    pub const ZERO: DdsDuration = DdsDuration { sec: 0, nanosec: 0 };

    /// Build from explicit seconds + nanoseconds.
    #[must_use]
    pub fn new(sec: i32, nanosec: u32) -> Self {
        Self { sec, nanosec }
    }

    /// Build from milliseconds.
    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        let sec = (millis / 1_000).min(i32::MAX as u64 - 1) as i32;
        let nanosec = ((millis % 1_000) * 1_000_000) as u32;
        Self { sec, nanosec }
    }

    /// Build from whole seconds.
    #[must_use]
    pub fn from_secs(sec: u32) -> Self {
        Self {
            sec: sec.min(i32::MAX as u32 - 1) as i32,
            nanosec: 0,
        }
    }

    /// Returns `true` for the distinguished infinite value.
    #[must_use]
    pub fn is_infinite(&self) -> bool {
        self.sec == DURATION_INFINITE_SEC && self.nanosec == DURATION_INFINITE_NSEC
    }

    /// Seconds component (meaningless for INFINITE).
    #[must_use]
    pub fn sec(&self) -> i32 {
        self.sec
    }

    /// Nanoseconds component (meaningless for INFINITE).
    #[must_use]
    pub fn nanosec(&self) -> u32 {
        self.nanosec
    }

    /// Total nanoseconds, saturating. INFINITE maps to `u64::MAX`.
    #[must_use]
    pub fn as_nanos(&self) -> u64 {
        if self.is_infinite() {
            return u64::MAX;
        }
        (self.sec.max(0) as u64)
            .saturating_mul(1_000_000_000)
            .saturating_add(u64::from(self.nanosec))
    }

    /// Convert to `std::time::Duration`; `None` for INFINITE.
    #[must_use]
    pub fn to_std(&self) -> Option<Duration> {
        if self.is_infinite() {
            None
        } else {
            Some(Duration::new(self.sec.max(0) as u64, self.nanosec))
        }
    }
}

impl From<Duration> for DdsDuration {
    fn from(d: Duration) -> Self {
        Self {
            sec: d.as_secs().min(i32::MAX as u64 - 1) as i32,
            nanosec: d.subsec_nanos(),
        }
    }
}

impl PartialOrd for DdsDuration {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DdsDuration {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // INFINITE compares greater than every finite value and equal to itself.
        match (self.is_infinite(), other.is_infinite()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => self.as_nanos().cmp(&other.as_nanos()),
        }
    }
}

impl Default for DdsDuration {
    fn default() -> Self {
        Self::INFINITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infinite_is_greatest() {
        let finite = DdsDuration::from_secs(1_000_000);
        assert!(DdsDuration::INFINITE > finite);
        assert!(finite < DdsDuration::INFINITE);
        assert_eq!(DdsDuration::INFINITE, DdsDuration::INFINITE);
    }

    #[test]
    fn test_finite_ordering() {
        assert!(DdsDuration::from_millis(100) < DdsDuration::from_millis(200));
        assert!(DdsDuration::from_millis(1_500) > DdsDuration::from_secs(1));
        assert_eq!(DdsDuration::from_millis(2_000), DdsDuration::from_secs(2));
    }

    #[test]
    fn test_std_round_trip() {
        let d = DdsDuration::from_millis(1_234);
        assert_eq!(d.to_std(), Some(Duration::from_millis(1_234)));
        assert_eq!(DdsDuration::INFINITE.to_std(), None);
    }
}
