//! Synthetic receiver streams shared by the integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use gnss_logger::timesync::leap::LeapSecondTable;
use gnss_logger::ubx::encoder::{encode_nav_pvt, encode_rxm_rawx, encode_rxm_sfrbx};
use gnss_logger::ubx::protocol::SECONDS_PER_WEEK;
use gnss_logger::ubx::{CarrierSolution, FixType, PositionVelocityTime};

/// Start of every synthetic session: Monday of GPS week 2400, noon UTC
pub fn session_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap()
}

/// GPS week and time of week for an instant `offset_ms` after the session start
pub fn gps_time(offset_ms: i64) -> (u16, f64) {
    let utc = session_start() + Duration::milliseconds(offset_ms);
    let gps = LeapSecondTable::builtin().utc_to_gps_seconds(utc);
    let week = (gps / SECONDS_PER_WEEK).floor();
    (week as u16, gps - week * SECONDS_PER_WEEK)
}

pub fn rawx_at(offset_ms: i64, satellites: u8) -> Vec<u8> {
    let (week, tow) = gps_time(offset_ms);
    encode_rxm_rawx(week, tow, 18, satellites)
}

pub fn pvt_at(offset_ms: i64, fix_type: FixType, satellites: u8) -> Vec<u8> {
    let (_, tow) = gps_time(offset_ms);
    encode_nav_pvt(&PositionVelocityTime {
        itow_ms: (tow * 1000.0).round() as u32,
        utc_time: Some(session_start() + Duration::milliseconds(offset_ms)),
        fix_type,
        gnss_fix_ok: fix_type != FixType::NoFix,
        carrier_solution: CarrierSolution::None,
        satellites_used: satellites,
        lat: 37.7749,
        lon: -122.4194,
        height: 12.34,
    })
}

pub fn sfrbx(satellite_id: u8) -> Vec<u8> {
    encode_rxm_sfrbx(0, satellite_id)
}

/// Ten seconds of receiver output: RXM-RAWX at 10 Hz, NAV-PVT at 5 Hz and
/// one RXM-SFRBX every two seconds, all 3D fixes with 12 satellites
pub fn ten_second_session(include_raw: bool) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    for i in 0..100i64 {
        let offset_ms = i * 100;
        if include_raw {
            frames.push(rawx_at(offset_ms, 12));
        }
        if i % 2 == 0 {
            frames.push(pvt_at(offset_ms, FixType::Fix3D, 12));
        }
        if i % 20 == 0 {
            frames.push(sfrbx((i / 20) as u8 + 1));
        }
    }
    frames
}

/// 100 frames where every tenth one is RXM-SFRBX, the rest alternating
/// RXM-RAWX and NAV-PVT
pub fn hundred_frames() -> Vec<Vec<u8>> {
    (0..100i64)
        .map(|i| {
            if i % 10 == 9 {
                sfrbx((i / 10) as u8 + 1)
            } else if i % 2 == 0 {
                rawx_at(i * 100, 12)
            } else {
                pvt_at(i * 100, FixType::Fix3D, 12)
            }
        })
        .collect()
}

pub fn concat(frames: &[Vec<u8>]) -> Vec<u8> {
    frames.iter().flatten().copied().collect()
}
