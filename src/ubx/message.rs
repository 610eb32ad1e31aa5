//! # UBX Message Decoding
//!
//! Best-effort decoding of the few UBX payloads the logger cares about
//! (NAV-PVT, RXM-RAWX, RXM-SFRBX, NAV-SAT, NAV-STATUS). Everything else is
//! reported as [`DecodedMessage::Unknown`]. Observation and ephemeris payloads
//! stay opaque: only counts and identifiers are extracted.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::debug;

use super::protocol::*;
use crate::error::{GnssLoggerError, Result};

/// Position, velocity and time solution (NAV-PVT)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionVelocityTime {
    /// GPS time of week of the navigation epoch in milliseconds
    pub itow_ms: u32,

    /// UTC time of the solution, when the receiver flags date and time valid
    pub utc_time: Option<DateTime<Utc>>,

    /// Fix type
    pub fix_type: FixType,

    /// Receiver considers the fix within accuracy limits
    pub gnss_fix_ok: bool,

    /// RTK carrier solution status
    pub carrier_solution: CarrierSolution,

    /// Satellites used in the solution
    pub satellites_used: u8,

    /// Latitude in degrees
    pub lat: f64,

    /// Longitude in degrees
    pub lon: f64,

    /// Height above ellipsoid in meters
    pub height: f64,
}

impl PositionVelocityTime {
    /// GPS time of week in seconds
    pub fn time_of_week(&self) -> f64 {
        self.itow_ms as f64 / 1000.0
    }
}

/// Raw measurement epoch (RXM-RAWX)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawObservation {
    /// GPS week number of the receiver clock
    pub gps_week: u16,

    /// Receiver time of week in seconds
    pub time_of_week: f64,

    /// GPS leap seconds reported by the receiver
    pub leap_seconds: i8,

    /// Number of measurement blocks in the payload
    pub observation_count: u8,
}

impl RawObservation {
    /// Seconds since the GPS epoch
    pub fn gps_seconds(&self) -> f64 {
        self.gps_week as f64 * SECONDS_PER_WEEK + self.time_of_week
    }
}

/// Broadcast navigation subframe (RXM-SFRBX)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EphemerisSubframe {
    /// GNSS identifier (0 = GPS, 2 = Galileo, ...)
    pub gnss_id: u8,

    /// Satellite identifier within the constellation
    pub satellite_id: u8,
}

/// Satellite information (NAV-SAT)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SatelliteInfo {
    pub itow_ms: u32,
    pub satellite_count: u8,
}

/// Receiver navigation status (NAV-STATUS)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverStatus {
    pub itow_ms: u32,
    pub gps_fix: FixType,
    pub fix_ok: bool,
}

/// Decoded view of a frame
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    PositionVelocityTime(PositionVelocityTime),
    RawObservation(RawObservation),
    EphemerisSubframe(EphemerisSubframe),
    SatelliteInfo(SatelliteInfo),
    ReceiverStatus(ReceiverStatus),
    Unknown { class: u8, id: u8, length: u16 },
}

/// Human-readable name for a class/id pair
///
/// Used as the key of per-message counts in validation reports.
pub fn message_name(class: u8, id: u8) -> String {
    match (class, id) {
        (UBX_CLASS_NAV, UBX_NAV_PVT) => "NAV-PVT".to_string(),
        (UBX_CLASS_NAV, UBX_NAV_SAT) => "NAV-SAT".to_string(),
        (UBX_CLASS_NAV, UBX_NAV_STATUS) => "NAV-STATUS".to_string(),
        (UBX_CLASS_RXM, UBX_RXM_RAWX) => "RXM-RAWX".to_string(),
        (UBX_CLASS_RXM, UBX_RXM_SFRBX) => "RXM-SFRBX".to_string(),
        _ => format!("UBX-0x{:02X}-0x{:02X}", class, id),
    }
}

/// Decode a validated frame into a typed message
///
/// Returns `None` when the class/id is modelled but the payload is too short
/// to decode. The frame itself is still valid and must still be logged.
pub fn decode_message(frame: &RawFrame) -> Option<DecodedMessage> {
    let payload = frame.payload();

    let decoded = match (frame.class(), frame.id()) {
        (UBX_CLASS_NAV, UBX_NAV_PVT) => decode_nav_pvt(payload).map(DecodedMessage::PositionVelocityTime),
        (UBX_CLASS_RXM, UBX_RXM_RAWX) => decode_rxm_rawx(payload).map(DecodedMessage::RawObservation),
        (UBX_CLASS_RXM, UBX_RXM_SFRBX) => decode_rxm_sfrbx(payload).map(DecodedMessage::EphemerisSubframe),
        (UBX_CLASS_NAV, UBX_NAV_SAT) => decode_nav_sat(payload).map(DecodedMessage::SatelliteInfo),
        (UBX_CLASS_NAV, UBX_NAV_STATUS) => decode_nav_status(payload).map(DecodedMessage::ReceiverStatus),
        (class, id) => Ok(DecodedMessage::Unknown {
            class,
            id,
            length: frame.payload_len() as u16,
        }),
    };

    match decoded {
        Ok(message) => Some(message),
        Err(e) => {
            debug!("Undecodable {}: {}", message_name(frame.class(), frame.id()), e);
            None
        }
    }
}

fn too_short(name: &str, len: usize) -> GnssLoggerError {
    GnssLoggerError::FrameCorruption(format!("{} payload too short: {} bytes", name, len))
}

fn u16_le(p: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([p[at], p[at + 1]])
}

fn u32_le(p: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([p[at], p[at + 1], p[at + 2], p[at + 3]])
}

fn i32_le(p: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([p[at], p[at + 1], p[at + 2], p[at + 3]])
}

fn f64_le(p: &[u8], at: usize) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&p[at..at + 8]);
    f64::from_le_bytes(raw)
}

/// Decode a NAV-PVT payload (92 bytes)
pub fn decode_nav_pvt(payload: &[u8]) -> Result<PositionVelocityTime> {
    if payload.len() < NAV_PVT_PAYLOAD_SIZE {
        return Err(too_short("NAV-PVT", payload.len()));
    }

    let itow_ms = u32_le(payload, 0);
    let valid = payload[11];
    let nano = i32_le(payload, 16);
    let flags = payload[21];

    let utc_time = if valid & NAV_PVT_VALID_DATE != 0 && valid & NAV_PVT_VALID_TIME != 0 {
        utc_from_parts(
            u16_le(payload, 4),
            payload[6],
            payload[7],
            payload[8],
            payload[9],
            payload[10],
            nano,
        )
    } else {
        None
    };

    Ok(PositionVelocityTime {
        itow_ms,
        utc_time,
        fix_type: FixType::from(payload[20]),
        gnss_fix_ok: flags & 0x01 != 0,
        carrier_solution: CarrierSolution::from((flags >> 6) & 0x03),
        satellites_used: payload[23],
        lon: i32_le(payload, 24) as f64 / 10_000_000.0,
        lat: i32_le(payload, 28) as f64 / 10_000_000.0,
        height: i32_le(payload, 32) as f64 / 1000.0,
    })
}

/// Build a UTC instant from NAV-PVT calendar fields
///
/// `nano` is signed and may pull the instant into the previous second.
/// A leap second (`sec == 60`) has no unambiguous instant and yields `None`.
fn utc_from_parts(year: u16, month: u8, day: u8, hour: u8, min: u8, sec: u8, nano: i32) -> Option<DateTime<Utc>> {
    let naive = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?
        .and_hms_opt(hour as u32, min as u32, sec as u32)?;
    Some(naive.and_utc() + Duration::nanoseconds(nano as i64))
}

/// Decode an RXM-RAWX payload header
pub fn decode_rxm_rawx(payload: &[u8]) -> Result<RawObservation> {
    if payload.len() < RXM_RAWX_HEADER_SIZE {
        return Err(too_short("RXM-RAWX", payload.len()));
    }

    let observation_count = payload[11];
    let expected = RXM_RAWX_HEADER_SIZE + observation_count as usize * RXM_RAWX_MEAS_SIZE;
    if payload.len() < expected {
        return Err(GnssLoggerError::FrameCorruption(format!(
            "RXM-RAWX declares {} measurements but carries {} bytes (expected {})",
            observation_count,
            payload.len(),
            expected
        )));
    }

    Ok(RawObservation {
        time_of_week: f64_le(payload, 0),
        gps_week: u16_le(payload, 8),
        leap_seconds: payload[10] as i8,
        observation_count,
    })
}

/// Decode an RXM-SFRBX payload header
pub fn decode_rxm_sfrbx(payload: &[u8]) -> Result<EphemerisSubframe> {
    if payload.len() < 2 {
        return Err(too_short("RXM-SFRBX", payload.len()));
    }

    Ok(EphemerisSubframe {
        gnss_id: payload[0],
        satellite_id: payload[1],
    })
}

/// Decode a NAV-SAT payload header
pub fn decode_nav_sat(payload: &[u8]) -> Result<SatelliteInfo> {
    if payload.len() < NAV_SAT_HEADER_SIZE {
        return Err(too_short("NAV-SAT", payload.len()));
    }

    Ok(SatelliteInfo {
        itow_ms: u32_le(payload, 0),
        satellite_count: payload[5],
    })
}

/// Decode a NAV-STATUS payload
pub fn decode_nav_status(payload: &[u8]) -> Result<ReceiverStatus> {
    if payload.len() < NAV_STATUS_PAYLOAD_SIZE {
        return Err(too_short("NAV-STATUS", payload.len()));
    }

    Ok(ReceiverStatus {
        itow_ms: u32_le(payload, 0),
        gps_fix: FixType::from(payload[4]),
        fix_ok: payload[5] & 0x01 != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ubx::decoder::FrameDecoder;
    use crate::ubx::encoder::encode_frame;
    use chrono::{Datelike, TimeZone, Timelike};

    fn nav_pvt_payload() -> Vec<u8> {
        let mut p = vec![0u8; NAV_PVT_PAYLOAD_SIZE];
        p[0..4].copy_from_slice(&315_000_500u32.to_le_bytes()); // iTOW
        p[4..6].copy_from_slice(&2026u16.to_le_bytes());
        p[6] = 1; // month
        p[7] = 5; // day
        p[8] = 14; // hour
        p[9] = 23; // min
        p[10] = 15; // sec
        p[11] = NAV_PVT_VALID_DATE | NAV_PVT_VALID_TIME;
        p[16..20].copy_from_slice(&500_000_000i32.to_le_bytes()); // nano
        p[20] = 3; // 3D fix
        p[21] = 0x01 | (2 << 6); // gnssFixOK, carrSoln fixed
        p[23] = 12; // numSV
        p[24..28].copy_from_slice(&(-1_224_194_000i32).to_le_bytes());
        p[28..32].copy_from_slice(&377_749_000i32.to_le_bytes());
        p[32..36].copy_from_slice(&12_345i32.to_le_bytes());
        p
    }

    fn frame_of(class: u8, id: u8, payload: &[u8]) -> RawFrame {
        let mut decoder = FrameDecoder::new();
        decoder.push(&encode_frame(class, id, payload));
        decoder.next_frame().expect("frame should decode").0
    }

    #[test]
    fn test_decode_nav_pvt() {
        let pvt = decode_nav_pvt(&nav_pvt_payload()).unwrap();

        assert_eq!(pvt.itow_ms, 315_000_500);
        assert_eq!(pvt.fix_type, FixType::Fix3D);
        assert!(pvt.gnss_fix_ok);
        assert_eq!(pvt.carrier_solution, CarrierSolution::Fixed);
        assert_eq!(pvt.satellites_used, 12);
        assert!((pvt.lat - 37.7749).abs() < 1e-7);
        assert!((pvt.lon - (-122.4194)).abs() < 1e-7);
        assert!((pvt.height - 12.345).abs() < 1e-9);
        assert!((pvt.time_of_week() - 315_000.5).abs() < 1e-9);

        let utc = pvt.utc_time.unwrap();
        assert_eq!((utc.year(), utc.month(), utc.day()), (2026, 1, 5));
        assert_eq!((utc.hour(), utc.minute(), utc.second()), (14, 23, 15));
        assert_eq!(utc.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_decode_nav_pvt_negative_nano() {
        let mut p = nav_pvt_payload();
        p[16..20].copy_from_slice(&(-250_000_000i32).to_le_bytes());
        let utc = decode_nav_pvt(&p).unwrap().utc_time.unwrap();
        let expected = Utc.with_ymd_and_hms(2026, 1, 5, 14, 23, 14).unwrap() + Duration::milliseconds(750);
        assert_eq!(utc, expected);
    }

    #[test]
    fn test_decode_nav_pvt_invalid_time_flags() {
        let mut p = nav_pvt_payload();
        p[11] = NAV_PVT_VALID_DATE; // time not valid
        assert!(decode_nav_pvt(&p).unwrap().utc_time.is_none());
    }

    #[test]
    fn test_decode_nav_pvt_leap_second_has_no_instant() {
        let mut p = nav_pvt_payload();
        p[10] = 60;
        assert!(decode_nav_pvt(&p).unwrap().utc_time.is_none());
    }

    #[test]
    fn test_decode_nav_pvt_too_short() {
        assert!(decode_nav_pvt(&[0u8; 40]).is_err());
    }

    #[test]
    fn test_decode_rxm_rawx() {
        let mut p = vec![0u8; RXM_RAWX_HEADER_SIZE + 2 * RXM_RAWX_MEAS_SIZE];
        p[0..8].copy_from_slice(&345_600.1f64.to_le_bytes());
        p[8..10].copy_from_slice(&2400u16.to_le_bytes());
        p[10] = 18;
        p[11] = 2;

        let raw = decode_rxm_rawx(&p).unwrap();
        assert_eq!(raw.gps_week, 2400);
        assert_eq!(raw.time_of_week, 345_600.1);
        assert_eq!(raw.leap_seconds, 18);
        assert_eq!(raw.observation_count, 2);
        assert_eq!(raw.gps_seconds(), 2400.0 * SECONDS_PER_WEEK + 345_600.1);
    }

    #[test]
    fn test_decode_rxm_rawx_count_exceeds_payload() {
        let mut p = vec![0u8; RXM_RAWX_HEADER_SIZE + RXM_RAWX_MEAS_SIZE];
        p[11] = 5;
        assert!(decode_rxm_rawx(&p).is_err());
    }

    #[test]
    fn test_decode_rxm_sfrbx() {
        let sub = decode_rxm_sfrbx(&[0x00, 0x07, 0x00, 0x0A]).unwrap();
        assert_eq!(sub.gnss_id, 0);
        assert_eq!(sub.satellite_id, 7);
        assert!(decode_rxm_sfrbx(&[0x00]).is_err());
    }

    #[test]
    fn test_decode_nav_status() {
        let mut p = vec![0u8; NAV_STATUS_PAYLOAD_SIZE];
        p[4] = 2;
        p[5] = 0x01;
        let status = decode_nav_status(&p).unwrap();
        assert_eq!(status.gps_fix, FixType::Fix2D);
        assert!(status.fix_ok);
    }

    #[test]
    fn test_decode_message_dispatch() {
        let frame = frame_of(UBX_CLASS_NAV, UBX_NAV_PVT, &nav_pvt_payload());
        assert!(matches!(decode_message(&frame), Some(DecodedMessage::PositionVelocityTime(_))));

        let mut sat = vec![0u8; NAV_SAT_HEADER_SIZE];
        sat[5] = 21;
        let frame = frame_of(UBX_CLASS_NAV, UBX_NAV_SAT, &sat);
        match decode_message(&frame) {
            Some(DecodedMessage::SatelliteInfo(info)) => assert_eq!(info.satellite_count, 21),
            other => panic!("Expected SatelliteInfo, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_message_unknown() {
        let frame = frame_of(0x0A, 0x04, &[1, 2, 3]);
        assert_eq!(
            decode_message(&frame),
            Some(DecodedMessage::Unknown { class: 0x0A, id: 0x04, length: 3 })
        );
    }

    #[test]
    fn test_decode_message_short_known_payload_is_none() {
        let frame = frame_of(UBX_CLASS_NAV, UBX_NAV_PVT, &[0u8; 10]);
        assert!(decode_message(&frame).is_none());
    }

    #[test]
    fn test_message_names() {
        assert_eq!(message_name(0x01, 0x07), "NAV-PVT");
        assert_eq!(message_name(0x02, 0x15), "RXM-RAWX");
        assert_eq!(message_name(0x02, 0x13), "RXM-SFRBX");
        assert_eq!(message_name(0x0A, 0x04), "UBX-0x0A-0x04");
    }
}
