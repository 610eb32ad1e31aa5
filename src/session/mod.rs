//! # Session Log
//!
//! Two append-only files per run:
//! - `<prefix>_<YYYYmmdd_HHMMSS>.ubx`: every validated frame, byte-identical
//!   to the wire, so any UBX tool can replay it
//! - `<prefix>_<YYYYmmdd_HHMMSS>_timesync.csv`: one time correlation record per
//!   line after a header row, flushed as each record arrives
//!
//! Frames are written with a single synchronous call each, so a task that owns
//! the log can only be cancelled between frames.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::error::{GnssLoggerError, Result};
use crate::timesync::{TimeCorrelationRecord, CSV_HEADER};
use crate::ubx::RawFrame;

/// Raw log buffer size
const RAW_BUFFER_SIZE: usize = 64 * 1024;

/// Paths of the two files that make up a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub raw: PathBuf,
    pub correlation: PathBuf,
}

impl SessionPaths {
    /// Derive both paths from the session start time
    ///
    /// A numeric suffix is added when a session with the same name exists.
    pub fn for_start(dir: &Path, prefix: &str, started: DateTime<Local>) -> Self {
        let stamp = started.format("%Y%m%d_%H%M%S").to_string();
        let mut base = format!("{}_{}", prefix, stamp);
        let mut n = 1;

        while dir.join(format!("{}.ubx", base)).exists() {
            base = format!("{}_{}_{}", prefix, stamp, n);
            n += 1;
        }

        Self {
            raw: dir.join(format!("{}.ubx", base)),
            correlation: dir.join(format!("{}_timesync.csv", base)),
        }
    }
}

/// Totals written during a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTotals {
    pub frames: u64,
    pub raw_bytes: u64,
    pub records: u64,
}

/// Writer for the raw and correlation files of one run
#[derive(Debug)]
pub struct SessionLog {
    paths: SessionPaths,
    raw: BufWriter<File>,
    correlation: BufWriter<File>,
    totals: SessionTotals,
    flush_interval: Duration,
    last_flush: Instant,
    closed: bool,
}

impl SessionLog {
    /// Create both files in `dir` (created if missing)
    ///
    /// # Errors
    ///
    /// Returns a storage error if the directory or either file cannot be created
    pub fn create(dir: &Path, prefix: &str, started: DateTime<Local>, flush_interval: Duration) -> Result<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| GnssLoggerError::storage(&format!("Failed to create {}", dir.display()), e))?;

        let paths = SessionPaths::for_start(dir, prefix, started);
        let raw = open_new(&paths.raw)?;
        let correlation = open_new(&paths.correlation)?;

        let mut log = Self {
            paths,
            raw: BufWriter::with_capacity(RAW_BUFFER_SIZE, raw),
            correlation: BufWriter::new(correlation),
            totals: SessionTotals::default(),
            flush_interval,
            last_flush: Instant::now(),
            closed: false,
        };

        writeln!(log.correlation, "{}", CSV_HEADER)
            .and_then(|_| log.correlation.flush())
            .map_err(|e| GnssLoggerError::storage("Failed to write correlation header", e))?;

        info!("Logging UBX to: {}", log.paths.raw.display());
        info!("Time sync logging to: {}", log.paths.correlation.display());
        Ok(log)
    }

    /// Append one validated frame, verbatim
    pub fn append_frame(&mut self, frame: &RawFrame) -> Result<()> {
        self.ensure_open()?;

        self.raw
            .write_all(frame.as_bytes())
            .map_err(|e| GnssLoggerError::storage("Failed to write raw log", e))?;
        self.totals.frames += 1;
        self.totals.raw_bytes += frame.len() as u64;

        if self.last_flush.elapsed() >= self.flush_interval {
            self.raw
                .flush()
                .map_err(|e| GnssLoggerError::storage("Failed to flush raw log", e))?;
            self.last_flush = Instant::now();
        }

        Ok(())
    }

    /// Append one correlation record and flush it
    pub fn append_record(&mut self, record: &TimeCorrelationRecord) -> Result<()> {
        self.ensure_open()?;

        writeln!(self.correlation, "{}", record.to_csv_row())
            .and_then(|_| self.correlation.flush())
            .map_err(|e| GnssLoggerError::storage("Failed to write correlation log", e))?;
        self.totals.records += 1;
        Ok(())
    }

    /// Flush both files to the operating system
    pub fn flush(&mut self) -> Result<()> {
        self.raw
            .flush()
            .map_err(|e| GnssLoggerError::storage("Failed to flush raw log", e))?;
        self.correlation
            .flush()
            .map_err(|e| GnssLoggerError::storage("Failed to flush correlation log", e))?;
        self.last_flush = Instant::now();
        Ok(())
    }

    /// Flush and fsync both files
    ///
    /// Further appends fail. Calling `close` again is a no-op.
    pub fn close(&mut self) -> Result<SessionTotals> {
        if self.closed {
            return Ok(self.totals);
        }
        self.closed = true;

        self.flush()?;
        self.raw
            .get_ref()
            .sync_all()
            .map_err(|e| GnssLoggerError::storage("Failed to sync raw log", e))?;
        self.correlation
            .get_ref()
            .sync_all()
            .map_err(|e| GnssLoggerError::storage("Failed to sync correlation log", e))?;

        info!(
            "Log files closed: {} ({} frames, {} bytes), {} ({} records)",
            self.paths.raw.display(),
            self.totals.frames,
            self.totals.raw_bytes,
            self.paths.correlation.display(),
            self.totals.records
        );
        Ok(self.totals)
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    pub fn totals(&self) -> SessionTotals {
        self.totals
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(GnssLoggerError::Storage("session log already closed".to_string()));
        }
        Ok(())
    }
}

impl Drop for SessionLog {
    fn drop(&mut self) {
        if !self.closed {
            debug!("Session log dropped without close, flushing");
            if let Err(e) = self.flush() {
                warn!("Final flush failed: {}", e);
            }
        }
    }
}

fn open_new(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| GnssLoggerError::storage(&format!("Failed to create {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ubx::encoder::encode_frame;
    use crate::ubx::FrameDecoder;

    fn frame(sv: u8) -> RawFrame {
        let mut decoder = FrameDecoder::new();
        decoder.push(&encode_frame(0x02, 0x13, &[0x00, sv, 0x00, 0x00]));
        decoder.next_frame().unwrap().0
    }

    fn record() -> TimeCorrelationRecord {
        TimeCorrelationRecord {
            local_wall_clock: 1_767_614_400.5,
            device_time: "2026-01-05T12:00:00.250000+00:00".to_string(),
            gps_week: 2400,
            time_of_week_seconds: 129_618.25,
            offset_seconds: 0.25,
            satellites_used: 9,
        }
    }

    #[test]
    fn test_session_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::create(dir.path(), "gps_log", Local::now(), Duration::ZERO).unwrap();

        let raw = log.paths().raw.file_name().unwrap().to_string_lossy().to_string();
        let csv = log.paths().correlation.file_name().unwrap().to_string_lossy().to_string();
        assert!(raw.starts_with("gps_log_") && raw.ends_with(".ubx"));
        assert_eq!(csv, raw.replace(".ubx", "_timesync.csv"));
    }

    #[test]
    fn test_second_session_same_second_gets_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let started = Local::now();
        let first = SessionLog::create(dir.path(), "gps_log", started, Duration::ZERO).unwrap();
        let second = SessionLog::create(dir.path(), "gps_log", started, Duration::ZERO).unwrap();
        assert_ne!(first.paths().raw, second.paths().raw);
    }

    #[test]
    fn test_frames_written_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SessionLog::create(dir.path(), "t", Local::now(), Duration::from_secs(60)).unwrap();

        let frames = [frame(1), frame(2), frame(3)];
        for f in &frames {
            log.append_frame(f).unwrap();
        }
        let totals = log.close().unwrap();

        let expected: Vec<u8> = frames.iter().flat_map(|f| f.as_bytes().to_vec()).collect();
        assert_eq!(fs::read(&log.paths().raw).unwrap(), expected);
        assert_eq!(totals.frames, 3);
        assert_eq!(totals.raw_bytes, expected.len() as u64);
    }

    #[test]
    fn test_correlation_rows_visible_before_close() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SessionLog::create(dir.path(), "t", Local::now(), Duration::from_secs(60)).unwrap();
        log.append_record(&record()).unwrap();

        let contents = fs::read_to_string(&log.paths().correlation).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], record().to_csv_row());
    }

    #[test]
    fn test_append_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SessionLog::create(dir.path(), "t", Local::now(), Duration::ZERO).unwrap();
        log.close().unwrap();

        assert!(matches!(log.append_frame(&frame(1)), Err(GnssLoggerError::Storage(_))));
        assert!(log.close().is_ok());
    }

    #[test]
    fn test_drop_flushes_buffered_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let mut log = SessionLog::create(dir.path(), "t", Local::now(), Duration::from_secs(60)).unwrap();
            log.append_frame(&frame(4)).unwrap();
            log.paths().raw.clone()
        };
        assert_eq!(fs::read(path).unwrap(), frame(4).as_bytes());
    }

    #[test]
    fn test_unwritable_directory_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"x").unwrap();

        let result = SessionLog::create(&blocker, "t", Local::now(), Duration::ZERO);
        assert!(matches!(result, Err(GnssLoggerError::Storage(_))));
    }
}
