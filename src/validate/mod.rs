//! # Log Validation Module
//!
//! Replays a closed raw log through the same frame decoder the live path uses
//! and decides whether the log holds what offline post-processing needs.
//!
//! Verdict policy:
//! - FAIL without raw observations (RXM-RAWX) or ephemeris (RXM-SFRBX)
//! - FAIL on a missing, empty, corrupt or truncated file
//! - WARN when the raw observation rate is under 95% of the expected rate
//! - WARN when under 90% of position solutions are 3D or better
//! - WARN when no more than 5 satellites were ever seen

pub mod report;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::timesync::leap::LeapSecondTable;
use crate::ubx::protocol::DEFAULT_MAX_PAYLOAD_LEN;
use crate::ubx::{message_name, DecodedMessage, FrameDecoder, RawFrame};
pub use report::{ValidationReport, Verdict};

/// Raw observation rate below this share of the expected rate is a warning
pub const RATE_TOLERANCE: f64 = 0.95;

/// Minimum share of 3D-or-better position solutions, in percent
pub const MIN_3D_FIX_PERCENT: f64 = 90.0;

/// Fewer satellites than this at best is a warning
pub const MIN_SATELLITES: u8 = 6;

pub const NO_RAW_OBSERVATIONS: &str =
    "no raw observation messages (RXM-RAWX) found; required for post-processing";
pub const NO_EPHEMERIS: &str =
    "no ephemeris subframe messages (RXM-SFRBX) found; required for post-processing";

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Offline log validator
#[derive(Debug, Clone)]
pub struct Validator {
    expected_rate_hz: f64,
    leap_seconds: LeapSecondTable,
    max_payload_len: usize,
}

/// Running totals while replaying a log
#[derive(Debug, Default)]
struct Tally {
    frames: u64,
    message_counts: BTreeMap<String, u64>,
    raw_observations: u64,
    ephemeris: u64,
    positions: u64,
    positions_3d: u64,
    fix_types: BTreeMap<String, u64>,
    carrier_solutions: BTreeMap<String, u64>,
    max_satellites: u8,
    first_gps_time: Option<f64>,
    last_gps_time: Option<f64>,
}

impl Tally {
    fn observe_time(&mut self, gps_seconds: f64) {
        self.first_gps_time = Some(self.first_gps_time.map_or(gps_seconds, |t| t.min(gps_seconds)));
        self.last_gps_time = Some(self.last_gps_time.map_or(gps_seconds, |t| t.max(gps_seconds)));
    }

    fn add(&mut self, frame: &RawFrame, message: Option<&DecodedMessage>, leap_seconds: &LeapSecondTable) {
        self.frames += 1;
        *self
            .message_counts
            .entry(message_name(frame.class(), frame.id()))
            .or_default() += 1;

        match message {
            Some(DecodedMessage::RawObservation(raw)) => {
                self.raw_observations += 1;
                self.max_satellites = self.max_satellites.max(raw.observation_count);
                self.observe_time(raw.gps_seconds());
            }
            Some(DecodedMessage::EphemerisSubframe(_)) => self.ephemeris += 1,
            Some(DecodedMessage::PositionVelocityTime(pvt)) => {
                self.positions += 1;
                if pvt.fix_type.is_3d_or_better() {
                    self.positions_3d += 1;
                }
                *self.fix_types.entry(pvt.fix_type.label().to_string()).or_default() += 1;
                *self
                    .carrier_solutions
                    .entry(pvt.carrier_solution.label().to_string())
                    .or_default() += 1;
                self.max_satellites = self.max_satellites.max(pvt.satellites_used);
                if let Some(utc) = pvt.utc_time {
                    self.observe_time(leap_seconds.utc_to_gps_seconds(utc));
                }
            }
            _ => {}
        }
    }
}

impl Validator {
    /// Create a validator
    ///
    /// # Arguments
    ///
    /// * `expected_rate_hz` - Configured raw observation rate
    /// * `leap_seconds` - Table used to put NAV-PVT UTC times on the GPS scale
    pub fn new(expected_rate_hz: f64, leap_seconds: LeapSecondTable) -> Self {
        Self {
            expected_rate_hz,
            leap_seconds,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut validator = Self::new(config.validation.expected_rate_hz, config.leap_second_table()?);
        validator.max_payload_len = config.decoder.max_payload_len;
        Ok(validator)
    }

    /// Validate a log file
    ///
    /// Never fails: unreadable input produces a FAIL report with the cause.
    pub fn validate_file<P: AsRef<Path>>(&self, path: P) -> ValidationReport {
        let path = path.as_ref();
        let label = path.display().to_string();
        info!("Validating {}", label);

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return ValidationReport::unreadable(
                    &label,
                    0,
                    format!("file not found: {}", label),
                    self.expected_rate_hz,
                );
            }
            Err(e) => {
                return ValidationReport::unreadable(
                    &label,
                    0,
                    format!("cannot open file: {}", e),
                    self.expected_rate_hz,
                );
            }
        };

        let file_size = file.metadata().map(|m| m.len()).unwrap_or(0);
        self.validate_reader(&label, file_size, file)
    }

    /// Validate a log held in memory
    pub fn validate_bytes(&self, label: &str, data: &[u8]) -> ValidationReport {
        self.validate_reader(label, data.len() as u64, data)
    }

    fn validate_reader<R: Read>(&self, label: &str, file_size: u64, mut reader: R) -> ValidationReport {
        if file_size == 0 {
            return ValidationReport::unreadable(label, 0, "file is empty".to_string(), self.expected_rate_hz);
        }

        let mut decoder = FrameDecoder::with_max_payload_len(self.max_payload_len);
        let mut tally = Tally::default();
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            let n = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return ValidationReport::unreadable(
                        label,
                        file_size,
                        format!("read error: {}", e),
                        self.expected_rate_hz,
                    );
                }
            };

            decoder.push(&chunk[..n]);
            for (frame, message) in decoder.frames() {
                tally.add(&frame, message.as_ref(), &self.leap_seconds);
            }
        }

        // End of input: anything still buffered is an unfinished frame. Frames
        // after a corrupt length field are recovered by stepping past it.
        let skipped_bytes = decoder.stats().skipped_bytes;
        let mut truncated_bytes = decoder.pending_len() as u64;
        let mut recovered_frames = 0u64;
        while decoder.skip_incomplete() {
            let before = recovered_frames;
            for (frame, message) in decoder.frames() {
                recovered_frames += 1;
                tally.add(&frame, message.as_ref(), &self.leap_seconds);
            }
            if recovered_frames > before {
                truncated_bytes = decoder.pending_len() as u64;
            }
        }

        let stats = decoder.stats();
        let mut corrupt_frames = stats.corrupt_frames;
        if recovered_frames > 0 {
            // the stalled header was itself corrupt
            corrupt_frames += 1;
        }

        debug!(
            "Replayed {} frames, {} corrupt, {} skipped bytes, {} truncated bytes",
            tally.frames, corrupt_frames, skipped_bytes, truncated_bytes
        );

        self.build_report(label, file_size, tally, corrupt_frames, skipped_bytes, truncated_bytes)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_report(
        &self,
        label: &str,
        file_size: u64,
        tally: Tally,
        corrupt_frames: u64,
        skipped_bytes: u64,
        truncated_bytes: u64,
    ) -> ValidationReport {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let duration = match (tally.first_gps_time, tally.last_gps_time) {
            (Some(first), Some(last)) => Some(last - first),
            _ => None,
        };
        let rate_of = |count: u64| duration.filter(|d| *d > 0.0).map(|d| count as f64 / d);
        let raw_rate = rate_of(tally.raw_observations);
        let position_rate = rate_of(tally.positions);

        let fix_3d_percent = (tally.positions > 0)
            .then(|| 100.0 * tally.positions_3d as f64 / tally.positions as f64);

        // Errors
        if tally.raw_observations == 0 {
            errors.push(NO_RAW_OBSERVATIONS.to_string());
        }
        if tally.ephemeris == 0 {
            errors.push(NO_EPHEMERIS.to_string());
        }
        if corrupt_frames > 0 {
            errors.push(format!(
                "{} corrupt frame(s) failed checksum or length validation",
                corrupt_frames
            ));
        }
        if truncated_bytes > 0 {
            errors.push(format!("log ends with a truncated frame ({} bytes)", truncated_bytes));
        }

        // Warnings
        if tally.raw_observations > 0 {
            match raw_rate {
                Some(rate) if rate < RATE_TOLERANCE * self.expected_rate_hz => warnings.push(format!(
                    "RXM-RAWX rate is {:.1} Hz (expected ~{:.0} Hz)",
                    rate, self.expected_rate_hz
                )),
                Some(_) => {}
                None => warnings.push(
                    "RXM-RAWX rate cannot be computed: log covers zero duration".to_string(),
                ),
            }
        }

        match fix_3d_percent {
            Some(percent) if percent < MIN_3D_FIX_PERCENT => warnings.push(format!(
                "only {:.1}% of NAV-PVT solutions are 3D or better (expected at least {:.0}%)",
                percent, MIN_3D_FIX_PERCENT
            )),
            Some(_) => {}
            None => warnings.push("no NAV-PVT messages found; fix quality unknown".to_string()),
        }

        if tally.max_satellites < MIN_SATELLITES {
            warnings.push(format!(
                "low satellite count (max: {}); at least {} are needed for good post-processing results",
                tally.max_satellites, MIN_SATELLITES
            ));
        }

        let verdict = if !errors.is_empty() {
            Verdict::Fail
        } else if !warnings.is_empty() {
            Verdict::Warn
        } else {
            Verdict::Pass
        };

        ValidationReport {
            path: label.to_string(),
            file_size,
            total_frames: tally.frames,
            message_counts: tally.message_counts,
            corrupt_frames,
            skipped_bytes,
            truncated_bytes,
            first_gps_time: tally.first_gps_time,
            last_gps_time: tally.last_gps_time,
            duration_seconds: duration,
            raw_observation_count: tally.raw_observations,
            ephemeris_count: tally.ephemeris,
            position_count: tally.positions,
            raw_observation_rate_hz: raw_rate,
            position_rate_hz: position_rate,
            expected_rate_hz: self.expected_rate_hz,
            fix_types: tally.fix_types,
            carrier_solutions: tally.carrier_solutions,
            fix_3d_or_better_percent: fix_3d_percent,
            max_satellites: tally.max_satellites,
            warnings,
            errors,
            verdict,
        }
    }
}
