//! # UBX Frame Encoder
//!
//! Wraps a class/id/payload triple into a complete UBX frame, plus builders
//! for the message types the logger decodes. The builders produce synthetic
//! receiver streams for replay and testing.

use chrono::{Datelike, Timelike};

use super::checksum::fletcher8;
use super::message::PositionVelocityTime;
use super::protocol::*;
use crate::error::{GnssLoggerError, Result};

/// Encode a complete UBX frame
///
/// # Arguments
///
/// * `class` - Message class
/// * `id` - Message id
/// * `payload` - Payload bytes (at most 65535)
///
/// # Returns
///
/// * `Vec<u8>` - Sync + class + id + length + payload + checksum
///
/// # Panics
///
/// Panics if the payload does not fit the 16-bit length field. Use
/// [`try_encode_frame`] for untrusted sizes.
///
/// # Examples
///
/// ```
/// use gnss_logger::ubx::encoder::encode_frame;
///
/// let frame = encode_frame(0x02, 0x13, &[0x00, 0x05]);
/// assert_eq!(frame, vec![0xB5, 0x62, 0x02, 0x13, 0x02, 0x00, 0x00, 0x05, 0x1C, 0x78]);
/// ```
pub fn encode_frame(class: u8, id: u8, payload: &[u8]) -> Vec<u8> {
    match try_encode_frame(class, id, payload) {
        Ok(frame) => frame,
        Err(e) => panic!("{}", e),
    }
}

/// Encode a complete UBX frame, rejecting oversized payloads
pub fn try_encode_frame(class: u8, id: u8, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > UBX_MAX_PAYLOAD_SIZE {
        return Err(GnssLoggerError::FrameCorruption(format!(
            "Payload size {} exceeds maximum {}",
            payload.len(),
            UBX_MAX_PAYLOAD_SIZE
        )));
    }

    let mut frame = Vec::with_capacity(UBX_MIN_FRAME_SIZE + payload.len());
    frame.push(UBX_SYNC_1);
    frame.push(UBX_SYNC_2);
    frame.push(class);
    frame.push(id);
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);

    // Checksum covers class, id, length and payload
    let (ck_a, ck_b) = fletcher8(&frame[2..]);
    frame.push(ck_a);
    frame.push(ck_b);

    Ok(frame)
}

/// Encode a NAV-PVT frame carrying `pvt`
///
/// Velocity and accuracy fields are zero. Date and time are flagged valid only
/// when `pvt.utc_time` is set.
pub fn encode_nav_pvt(pvt: &PositionVelocityTime) -> Vec<u8> {
    let mut p = vec![0u8; NAV_PVT_PAYLOAD_SIZE];
    p[0..4].copy_from_slice(&pvt.itow_ms.to_le_bytes());

    if let Some(utc) = pvt.utc_time {
        p[4..6].copy_from_slice(&(utc.year() as u16).to_le_bytes());
        p[6] = utc.month() as u8;
        p[7] = utc.day() as u8;
        p[8] = utc.hour() as u8;
        p[9] = utc.minute() as u8;
        p[10] = utc.second() as u8;
        p[11] = NAV_PVT_VALID_DATE | NAV_PVT_VALID_TIME;
        p[16..20].copy_from_slice(&(utc.nanosecond().min(999_999_999) as i32).to_le_bytes());
    }

    p[20] = pvt.fix_type.as_u8();
    p[21] = u8::from(pvt.gnss_fix_ok) | (pvt.carrier_solution.as_u8() & 0x03) << 6;
    p[23] = pvt.satellites_used;
    p[24..28].copy_from_slice(&((pvt.lon * 1e7).round() as i32).to_le_bytes());
    p[28..32].copy_from_slice(&((pvt.lat * 1e7).round() as i32).to_le_bytes());
    p[32..36].copy_from_slice(&((pvt.height * 1000.0).round() as i32).to_le_bytes());

    encode_frame(UBX_CLASS_NAV, UBX_NAV_PVT, &p)
}

/// Encode an RXM-RAWX frame with `observation_count` zeroed measurement blocks
pub fn encode_rxm_rawx(gps_week: u16, time_of_week: f64, leap_seconds: i8, observation_count: u8) -> Vec<u8> {
    let mut p = vec![0u8; RXM_RAWX_HEADER_SIZE + observation_count as usize * RXM_RAWX_MEAS_SIZE];
    p[0..8].copy_from_slice(&time_of_week.to_le_bytes());
    p[8..10].copy_from_slice(&gps_week.to_le_bytes());
    p[10] = leap_seconds as u8;
    p[11] = observation_count;
    p[13] = 1; // version

    encode_frame(UBX_CLASS_RXM, UBX_RXM_RAWX, &p)
}

/// Encode an RXM-SFRBX frame with ten zeroed data words
pub fn encode_rxm_sfrbx(gnss_id: u8, satellite_id: u8) -> Vec<u8> {
    const WORDS: u8 = 10;
    let mut p = vec![0u8; RXM_SFRBX_HEADER_SIZE + WORDS as usize * 4];
    p[0] = gnss_id;
    p[1] = satellite_id;
    p[4] = WORDS;
    p[6] = 2; // version

    encode_frame(UBX_CLASS_RXM, UBX_RXM_SFRBX, &p)
}
