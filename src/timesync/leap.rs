//! # Leap Seconds
//!
//! GPS time runs ahead of UTC by the number of leap seconds inserted since the
//! GPS epoch (1980-01-06). The offset is announced externally, so it lives in a
//! table that configuration can replace.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GnssLoggerError, Result};

/// UNIX timestamp of the GPS epoch, 1980-01-06T00:00:00Z
pub const GPS_EPOCH_UNIX_SECONDS: i64 = 315_964_800;

/// One step of the GPS−UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct LeapSecondEntry {
    /// First UTC day on which `seconds` applies
    pub effective: NaiveDate,

    /// GPS−UTC in seconds from that day on
    pub seconds: i32,
}

/// Leap seconds announced up to the time of writing
const BUILTIN: &[(i32, u32, u32, i32)] = &[
    (1981, 7, 1, 1),
    (1982, 7, 1, 2),
    (1983, 7, 1, 3),
    (1985, 7, 1, 4),
    (1988, 1, 1, 5),
    (1990, 1, 1, 6),
    (1991, 1, 1, 7),
    (1992, 7, 1, 8),
    (1993, 7, 1, 9),
    (1994, 7, 1, 10),
    (1996, 1, 1, 11),
    (1997, 7, 1, 12),
    (1999, 1, 1, 13),
    (2006, 1, 1, 14),
    (2009, 1, 1, 15),
    (2012, 7, 1, 16),
    (2015, 7, 1, 17),
    (2017, 1, 1, 18),
];

/// Built-in leap second entries
pub fn default_leap_seconds() -> Vec<LeapSecondEntry> {
    BUILTIN
        .iter()
        .filter_map(|&(y, m, d, seconds)| {
            NaiveDate::from_ymd_opt(y, m, d).map(|effective| LeapSecondEntry { effective, seconds })
        })
        .collect()
}

/// Lookup table from UTC date to GPS−UTC offset
#[derive(Debug, Clone, PartialEq)]
pub struct LeapSecondTable {
    entries: Vec<LeapSecondEntry>,
}

impl Default for LeapSecondTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LeapSecondTable {
    /// Table with the built-in entries
    pub fn builtin() -> Self {
        Self {
            entries: default_leap_seconds(),
        }
    }

    /// Build a table from configured entries
    ///
    /// Entries are sorted by date. Two entries for the same day are rejected.
    pub fn new(mut entries: Vec<LeapSecondEntry>) -> Result<Self> {
        entries.sort_by_key(|e| e.effective);

        if let Some(pair) = entries.windows(2).find(|w| w[0].effective == w[1].effective) {
            return Err(GnssLoggerError::Configuration(format!(
                "duplicate leap second entry for {}",
                pair[0].effective
            )));
        }

        Ok(Self { entries })
    }

    /// GPS−UTC offset in effect at `at`
    ///
    /// Instants before the first entry use an offset of 0.
    pub fn gps_minus_utc(&self, at: DateTime<Utc>) -> i32 {
        let day = at.date_naive();
        self.entries
            .iter()
            .rev()
            .find(|e| e.effective <= day)
            .map(|e| e.seconds)
            .unwrap_or(0)
    }

    /// Seconds since the GPS epoch for a UTC instant
    pub fn utc_to_gps_seconds(&self, utc: DateTime<Utc>) -> f64 {
        let whole = utc.timestamp() - GPS_EPOCH_UNIX_SECONDS + self.gps_minus_utc(utc) as i64;
        whole as f64 + utc.timestamp_subsec_nanos() as f64 * 1e-9
    }

    /// Configured entries, sorted by date
    pub fn entries(&self) -> &[LeapSecondEntry] {
        &self.entries
    }
}
