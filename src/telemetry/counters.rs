//! Lock-free session counters shared by the receive, relay and status flows

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use crate::timesync::TimeCorrelationRecord;
use crate::ubx::{CarrierSolution, DecoderStats, FixType, PositionVelocityTime};

/// Counters updated by the live flows
///
/// Every field is an atomic so the status reporter can read without ever
/// holding up the decode or relay paths. Floating point values are stored as
/// their bit patterns.
#[derive(Debug, Default)]
pub struct SessionCounters {
    frames: AtomicU64,
    bytes_logged: AtomicU64,
    corrupt_frames: AtomicU64,
    skipped_bytes: AtomicU64,
    correlation_records: AtomicU64,

    relay_enabled: AtomicBool,
    relay_connected: AtomicBool,
    relay_bytes: AtomicU64,
    relay_chunks: AtomicU64,
    relay_write_errors: AtomicU64,
    relay_reconnects: AtomicU64,

    input_stalled: AtomicBool,

    has_position: AtomicBool,
    fix_type: AtomicU8,
    carrier_solution: AtomicU8,
    satellites: AtomicU8,
    lat_bits: AtomicU64,
    lon_bits: AtomicU64,
    height_bits: AtomicU64,

    has_offset: AtomicBool,
    offset_bits: AtomicU64,
}

/// Point-in-time copy of [`SessionCounters`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CountersSnapshot {
    pub frames: u64,
    pub bytes_logged: u64,
    pub corrupt_frames: u64,
    pub skipped_bytes: u64,
    pub correlation_records: u64,
    pub relay_enabled: bool,
    pub relay_connected: bool,
    pub relay_bytes: u64,
    pub relay_chunks: u64,
    pub relay_write_errors: u64,
    pub relay_reconnects: u64,
    pub input_stalled: bool,
    pub position: Option<PositionSummary>,
    pub last_offset_seconds: Option<f64>,
}

/// Latest position solution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSummary {
    pub fix_type: FixType,
    pub carrier_solution: CarrierSolution,
    pub satellites: u8,
    pub lat: f64,
    pub lon: f64,
    pub height: f64,
}

impl SessionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one frame written to the raw log
    pub fn record_frame(&self, len: usize) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes_logged.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Mirror the decoder's corruption totals
    pub fn update_decoder_stats(&self, stats: &DecoderStats) {
        self.corrupt_frames.store(stats.corrupt_frames, Ordering::Relaxed);
        self.skipped_bytes.store(stats.skipped_bytes, Ordering::Relaxed);
    }

    pub fn record_position(&self, pvt: &PositionVelocityTime) {
        self.fix_type.store(pvt.fix_type.as_u8(), Ordering::Relaxed);
        self.carrier_solution.store(pvt.carrier_solution.as_u8(), Ordering::Relaxed);
        self.satellites.store(pvt.satellites_used, Ordering::Relaxed);
        self.lat_bits.store(pvt.lat.to_bits(), Ordering::Relaxed);
        self.lon_bits.store(pvt.lon.to_bits(), Ordering::Relaxed);
        self.height_bits.store(pvt.height.to_bits(), Ordering::Relaxed);
        self.has_position.store(true, Ordering::Release);
    }

    pub fn record_correlation(&self, record: &TimeCorrelationRecord) {
        self.correlation_records.fetch_add(1, Ordering::Relaxed);
        self.offset_bits.store(record.offset_seconds.to_bits(), Ordering::Relaxed);
        self.has_offset.store(true, Ordering::Release);
    }

    pub fn set_relay_enabled(&self, enabled: bool) {
        self.relay_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_relay_connected(&self, connected: bool) {
        self.relay_connected.store(connected, Ordering::Relaxed);
    }

    /// Count one correction chunk written to the receiver
    pub fn record_relay_chunk(&self, len: usize) {
        self.relay_chunks.fetch_add(1, Ordering::Relaxed);
        self.relay_bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_relay_write_error(&self) {
        self.relay_write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_relay_reconnect(&self) {
        self.relay_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_input_stalled(&self, stalled: bool) {
        self.input_stalled.store(stalled, Ordering::Relaxed);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn relay_bytes(&self) -> u64 {
        self.relay_bytes.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let position = self.has_position.load(Ordering::Acquire).then(|| PositionSummary {
            fix_type: FixType::from(self.fix_type.load(Ordering::Relaxed)),
            carrier_solution: CarrierSolution::from(self.carrier_solution.load(Ordering::Relaxed)),
            satellites: self.satellites.load(Ordering::Relaxed),
            lat: f64::from_bits(self.lat_bits.load(Ordering::Relaxed)),
            lon: f64::from_bits(self.lon_bits.load(Ordering::Relaxed)),
            height: f64::from_bits(self.height_bits.load(Ordering::Relaxed)),
        });

        let last_offset_seconds = self
            .has_offset
            .load(Ordering::Acquire)
            .then(|| f64::from_bits(self.offset_bits.load(Ordering::Relaxed)));

        CountersSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            bytes_logged: self.bytes_logged.load(Ordering::Relaxed),
            corrupt_frames: self.corrupt_frames.load(Ordering::Relaxed),
            skipped_bytes: self.skipped_bytes.load(Ordering::Relaxed),
            correlation_records: self.correlation_records.load(Ordering::Relaxed),
            relay_enabled: self.relay_enabled.load(Ordering::Relaxed),
            relay_connected: self.relay_connected.load(Ordering::Relaxed),
            relay_bytes: self.relay_bytes.load(Ordering::Relaxed),
            relay_chunks: self.relay_chunks.load(Ordering::Relaxed),
            relay_write_errors: self.relay_write_errors.load(Ordering::Relaxed),
            relay_reconnects: self.relay_reconnects.load(Ordering::Relaxed),
            input_stalled: self.input_stalled.load(Ordering::Relaxed),
            position,
            last_offset_seconds,
        }
    }
}
