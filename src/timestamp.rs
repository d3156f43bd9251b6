//! MS-DOS timestamp handling.
//!
//! This module provides the [`DosDateTime`] type for the modification time
//! stored in zip local and central directory headers. Zip stores it as a
//! pair of 16-bit MS-DOS values:
//!
//! - date: `(year - 1980) << 9 | month << 5 | day`
//! - time: `hour << 11 | minute << 5 | second / 2`
//!
//! The format has no time zone; this crate always interprets it as UTC so
//! that archives written on different machines are identical.
//!
//! # Precision
//!
//! DOS timestamps have a 2-second resolution and cover the years 1980 to
//! 2107. Times outside that range are clamped when converting.
//!
//! # Example
//!
//! ```rust
//! use zfile::DosDateTime;
//! use std::time::{Duration, UNIX_EPOCH};
//!
//! // 2001-09-09 01:46:40 UTC
//! let time = UNIX_EPOCH + Duration::from_secs(1_000_000_000);
//! let dos = DosDateTime::from_system_time(time);
//! assert_eq!(dos.year(), 2001);
//! assert_eq!(dos.month(), 9);
//! assert_eq!(dos.as_system_time(), time);
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds between the Unix epoch and 1980-01-01 00:00:00 UTC.
const DOS_EPOCH_UNIX_SECS: u64 = 315_532_800;

const SECONDS_PER_DAY: u64 = 86_400;

/// A zip modification timestamp in MS-DOS format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DosDateTime {
    // Date first so the derived ordering is chronological.
    date: u16,
    time: u16,
}

impl DosDateTime {
    /// The all-zero timestamp written when timestamps are disabled.
    pub const ZERO: DosDateTime = DosDateTime { date: 0, time: 0 };

    /// 1980-01-01 00:00:00, the earliest representable instant.
    pub const MIN: DosDateTime = DosDateTime {
        date: (1 << 5) | 1,
        time: 0,
    };

    /// Creates a timestamp from the raw header fields.
    #[inline]
    pub const fn from_raw(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    /// Returns the raw DOS date field.
    #[inline]
    pub const fn raw_date(&self) -> u16 {
        self.date
    }

    /// Returns the raw DOS time field.
    #[inline]
    pub const fn raw_time(&self) -> u16 {
        self.time
    }

    /// Returns the current time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Converts a `SystemTime`, clamping to the representable range and
    /// rounding down to an even second.
    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs(),
            Err(_) => return Self::MIN,
        };
        if secs < DOS_EPOCH_UNIX_SECS {
            return Self::MIN;
        }

        let days = secs / SECONDS_PER_DAY;
        let rem = secs % SECONDS_PER_DAY;
        let (year, month, day) = civil_from_days(days as i64);
        if year > 2107 {
            return Self::from_raw(
                (127 << 9) | (12 << 5) | 31,
                (23 << 11) | (59 << 5) | 29,
            );
        }

        let hour = (rem / 3600) as u16;
        let minute = ((rem % 3600) / 60) as u16;
        let second = (rem % 60) as u16;

        Self {
            date: (((year - 1980) as u16) << 9) | ((month as u16) << 5) | day as u16,
            time: (hour << 11) | (minute << 5) | (second / 2),
        }
    }

    /// Converts to a `SystemTime`.
    ///
    /// Out-of-range fields (month 0, day 0) found in real archives are
    /// clamped to 1 rather than rejected.
    pub fn as_system_time(&self) -> SystemTime {
        let year = self.year() as i64;
        let month = self.month().max(1) as u32;
        let day = self.day().max(1) as u32;
        let days = days_from_civil(year, month.min(12), day);
        let secs = (days.max(0) as u64) * SECONDS_PER_DAY
            + self.hour() as u64 * 3600
            + self.minute() as u64 * 60
            + self.second() as u64;
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    /// Returns the year (1980-2107).
    pub fn year(&self) -> u16 {
        1980 + (self.date >> 9)
    }

    /// Returns the month (1-12 for valid timestamps).
    pub fn month(&self) -> u8 {
        ((self.date >> 5) & 0x0f) as u8
    }

    /// Returns the day of month (1-31 for valid timestamps).
    pub fn day(&self) -> u8 {
        (self.date & 0x1f) as u8
    }

    /// Returns the hour (0-23).
    pub fn hour(&self) -> u8 {
        (self.time >> 11) as u8
    }

    /// Returns the minute (0-59).
    pub fn minute(&self) -> u8 {
        ((self.time >> 5) & 0x3f) as u8
    }

    /// Returns the second, always even (0-58).
    pub fn second(&self) -> u8 {
        ((self.time & 0x1f) * 2) as u8
    }
}

impl Default for DosDateTime {
    /// Returns 1980-01-01 00:00:00.
    fn default() -> Self {
        Self::MIN
    }
}

impl From<SystemTime> for DosDateTime {
    fn from(time: SystemTime) -> Self {
        Self::from_system_time(time)
    }
}

impl From<DosDateTime> for SystemTime {
    fn from(ts: DosDateTime) -> SystemTime {
        ts.as_system_time()
    }
}

// Proleptic Gregorian conversions (days relative to 1970-01-01).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y.rem_euclid(400);
    let m = month as i64;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dos_epoch() {
        let ts =
            DosDateTime::from_system_time(UNIX_EPOCH + Duration::from_secs(DOS_EPOCH_UNIX_SECS));
        assert_eq!(ts, DosDateTime::MIN);
        assert_eq!(ts.year(), 1980);
        assert_eq!(ts.month(), 1);
        assert_eq!(ts.day(), 1);
        assert_eq!(
            ts.as_system_time(),
            UNIX_EPOCH + Duration::from_secs(DOS_EPOCH_UNIX_SECS)
        );
    }

    #[test]
    fn test_before_dos_epoch_clamps() {
        assert_eq!(DosDateTime::from_system_time(UNIX_EPOCH), DosDateTime::MIN);
    }

    #[test]
    fn test_known_fields() {
        // 2024-02-29 13:37:42 UTC
        let secs = 1_709_213_862;
        let ts = DosDateTime::from_system_time(UNIX_EPOCH + Duration::from_secs(secs));
        assert_eq!(ts.year(), 2024);
        assert_eq!(ts.month(), 2);
        assert_eq!(ts.day(), 29);
        assert_eq!(ts.hour(), 13);
        assert_eq!(ts.minute(), 37);
        assert_eq!(ts.second(), 42);
        assert_eq!(ts.as_system_time(), UNIX_EPOCH + Duration::from_secs(secs));
    }

    #[test]
    fn test_odd_seconds_round_down() {
        let ts = DosDateTime::from_system_time(UNIX_EPOCH + Duration::from_secs(1_000_000_001));
        assert_eq!(ts.second() % 2, 0);
        assert_eq!(
            ts.as_system_time(),
            UNIX_EPOCH + Duration::from_secs(1_000_000_000)
        );
    }

    #[test]
    fn test_raw_roundtrip() {
        let ts = DosDateTime::from_raw(0x5821, 0x6b3c);
        assert_eq!(ts.raw_date(), 0x5821);
        assert_eq!(ts.raw_time(), 0x6b3c);
    }

    #[test]
    fn test_zero_fields_do_not_panic() {
        let ts = DosDateTime::ZERO;
        assert_eq!(ts.year(), 1980);
        assert_eq!(
            ts.as_system_time(),
            UNIX_EPOCH + Duration::from_secs(DOS_EPOCH_UNIX_SECS)
        );
    }
}
