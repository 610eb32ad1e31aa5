//! # Time Correlation
//!
//! Pairs the local wall clock with receiver-reported satellite time.
//!
//! This module handles:
//! - Building one correlation record per NAV-PVT with a usable fix and time
//! - Converting UTC to GPS week / time of week through the leap second table
//! - The CSV row format of the correlation file

pub mod leap;

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{GnssLoggerError, Result};
use crate::ubx::protocol::{FixType, SECONDS_PER_WEEK};
use crate::ubx::PositionVelocityTime;
use leap::LeapSecondTable;

/// Header row of the correlation file
pub const CSV_HEADER: &str = "system_time,gps_time,gps_week,gps_tow,offset_seconds,num_satellites";

/// One local-clock / device-time pairing
#[derive(Debug, Clone, PartialEq)]
pub struct TimeCorrelationRecord {
    /// Local wall clock when the frame was fully decoded, UNIX seconds
    pub local_wall_clock: f64,

    /// Device UTC time, RFC 3339
    pub device_time: String,

    /// GPS week number
    pub gps_week: u16,

    /// GPS time of week in seconds (millisecond resolution)
    pub time_of_week_seconds: f64,

    /// Local wall clock minus device UTC time
    pub offset_seconds: f64,

    /// Satellites used in the fix
    pub satellites_used: u8,
}

impl TimeCorrelationRecord {
    /// Render as one CSV data row (no trailing newline)
    pub fn to_csv_row(&self) -> String {
        format!(
            "{:.6},{},{},{:.3},{:.6},{}",
            self.local_wall_clock,
            self.device_time,
            self.gps_week,
            self.time_of_week_seconds,
            self.offset_seconds,
            self.satellites_used
        )
    }

    /// Parse a CSV data row produced by [`to_csv_row`](Self::to_csv_row)
    pub fn from_csv_row(row: &str) -> Result<Self> {
        let fields: Vec<&str> = row.trim_end().split(',').collect();
        if fields.len() != 6 {
            return Err(GnssLoggerError::Parse(format!(
                "expected 6 fields in correlation row, got {}",
                fields.len()
            )));
        }

        fn field<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
            value
                .parse()
                .map_err(|_| GnssLoggerError::Parse(format!("invalid {} value '{}'", name, value)))
        }

        Ok(Self {
            local_wall_clock: field("system_time", fields[0])?,
            device_time: fields[1].to_string(),
            gps_week: field("gps_week", fields[2])?,
            time_of_week_seconds: field("gps_tow", fields[3])?,
            offset_seconds: field("offset_seconds", fields[4])?,
            satellites_used: field("num_satellites", fields[5])?,
        })
    }
}

/// Produces correlation records from NAV-PVT messages
#[derive(Debug, Clone)]
pub struct TimeCorrelationRecorder {
    leap_seconds: LeapSecondTable,
    min_interval: Duration,
    last_recorded: Option<DateTime<Utc>>,
}

impl TimeCorrelationRecorder {
    /// Create a recorder
    ///
    /// # Arguments
    ///
    /// * `leap_seconds` - GPS−UTC offset table
    /// * `min_interval` - Minimum local time between records; zero records every fix
    pub fn new(leap_seconds: LeapSecondTable, min_interval: Duration) -> Self {
        Self {
            leap_seconds,
            min_interval,
            last_recorded: None,
        }
    }

    /// Correlate one NAV-PVT with the local clock reading taken when it was decoded
    ///
    /// Returns `None` when the receiver has no fix or no valid UTC time.
    pub fn correlate(&self, pvt: &PositionVelocityTime, local: DateTime<Utc>) -> Option<TimeCorrelationRecord> {
        if pvt.fix_type == FixType::NoFix {
            return None;
        }
        let utc = pvt.utc_time?;

        let local_wall_clock = local.timestamp_micros() as f64 / 1e6;
        let device_seconds = utc.timestamp_micros() as f64 / 1e6;

        // iTOW is exact; the week comes from UTC, and rounding absorbs a stale leap table
        let time_of_week_seconds = pvt.time_of_week();
        let gps_seconds = self.leap_seconds.utc_to_gps_seconds(utc);
        let week = ((gps_seconds - time_of_week_seconds) / SECONDS_PER_WEEK).round();
        if !(0.0..=u16::MAX as f64).contains(&week) {
            return None;
        }

        Some(TimeCorrelationRecord {
            local_wall_clock,
            device_time: utc.to_rfc3339_opts(SecondsFormat::Micros, false),
            gps_week: week as u16,
            time_of_week_seconds,
            offset_seconds: local_wall_clock - device_seconds,
            satellites_used: pvt.satellites_used,
        })
    }

    /// Like [`correlate`](Self::correlate), honoring the minimum interval
    pub fn record(&mut self, pvt: &PositionVelocityTime, local: DateTime<Utc>) -> Option<TimeCorrelationRecord> {
        if let Some(last) = self.last_recorded {
            let elapsed = local.signed_duration_since(last).to_std().unwrap_or_default();
            if elapsed < self.min_interval {
                return None;
            }
        }

        let record = self.correlate(pvt, local)?;
        self.last_recorded = Some(local);
        Some(record)
    }
}
