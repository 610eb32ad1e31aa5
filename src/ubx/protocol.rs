//! # UBX Protocol Constants and Types
//!
//! Core protocol definitions for the u-blox UBX binary protocol.
//!
//! Frame layout:
//! ```text
//! 0xB5 0x62 | class | id | length (u16 LE) | payload | CK_A | CK_B
//! ```

use bytes::Bytes;

/// First UBX sync byte
pub const UBX_SYNC_1: u8 = 0xB5;

/// Second UBX sync byte
pub const UBX_SYNC_2: u8 = 0x62;

/// Sync(2) + class(1) + id(1) + length(2)
pub const UBX_HEADER_SIZE: usize = 6;

/// CK_A + CK_B
pub const UBX_CHECKSUM_SIZE: usize = 2;

/// Smallest possible frame (empty payload)
pub const UBX_MIN_FRAME_SIZE: usize = UBX_HEADER_SIZE + UBX_CHECKSUM_SIZE;

/// Largest payload the length field can express
pub const UBX_MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Default payload bound used by the stream decoder
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 8192;

/// Navigation message class
pub const UBX_CLASS_NAV: u8 = 0x01;

/// Receiver manager message class
pub const UBX_CLASS_RXM: u8 = 0x02;

/// NAV-STATUS message id
pub const UBX_NAV_STATUS: u8 = 0x03;

/// NAV-PVT message id
pub const UBX_NAV_PVT: u8 = 0x07;

/// NAV-SAT message id
pub const UBX_NAV_SAT: u8 = 0x35;

/// RXM-SFRBX message id
pub const UBX_RXM_SFRBX: u8 = 0x13;

/// RXM-RAWX message id
pub const UBX_RXM_RAWX: u8 = 0x15;

/// NAV-PVT payload size
pub const NAV_PVT_PAYLOAD_SIZE: usize = 92;

/// RXM-RAWX fixed header size (per-measurement blocks follow)
pub const RXM_RAWX_HEADER_SIZE: usize = 16;

/// RXM-RAWX per-measurement block size
pub const RXM_RAWX_MEAS_SIZE: usize = 32;

/// RXM-SFRBX fixed header size (data words follow)
pub const RXM_SFRBX_HEADER_SIZE: usize = 8;

/// NAV-SAT fixed header size
pub const NAV_SAT_HEADER_SIZE: usize = 8;

/// NAV-STATUS payload size
pub const NAV_STATUS_PAYLOAD_SIZE: usize = 16;

/// NAV-PVT `valid` flag: UTC date is valid
pub const NAV_PVT_VALID_DATE: u8 = 0x01;

/// NAV-PVT `valid` flag: UTC time of day is valid
pub const NAV_PVT_VALID_TIME: u8 = 0x02;

/// Seconds in one GPS week
pub const SECONDS_PER_WEEK: f64 = 604_800.0;

/// One checksum-validated UBX frame
///
/// Holds the complete wire bytes (sync through checksum) so the frame can be
/// written to the raw log byte-identical to what the receiver sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    bytes: Bytes,
}

impl RawFrame {
    /// Wrap complete frame bytes
    ///
    /// The caller guarantees the bytes form one complete frame whose checksum
    /// has been verified.
    pub(crate) fn from_validated(bytes: Bytes) -> Self {
        debug_assert!(bytes.len() >= UBX_MIN_FRAME_SIZE);
        Self { bytes }
    }

    /// Message class
    pub fn class(&self) -> u8 {
        self.bytes[2]
    }

    /// Message id
    pub fn id(&self) -> u8 {
        self.bytes[3]
    }

    /// Payload length from the header
    pub fn payload_len(&self) -> usize {
        u16::from_le_bytes([self.bytes[4], self.bytes[5]]) as usize
    }

    /// Payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.bytes[UBX_HEADER_SIZE..UBX_HEADER_SIZE + self.payload_len()]
    }

    /// Complete wire bytes, sync through checksum
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Total frame length on the wire
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Frames always carry at least a header and checksum
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Receiver-reported position solution quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FixType {
    NoFix,
    DeadReckoning,
    Fix2D,
    Fix3D,
    GnssDeadReckoning,
    TimeOnly,
    Reserved(u8),
}

impl FixType {
    /// Raw protocol value
    pub fn as_u8(self) -> u8 {
        match self {
            Self::NoFix => 0,
            Self::DeadReckoning => 1,
            Self::Fix2D => 2,
            Self::Fix3D => 3,
            Self::GnssDeadReckoning => 4,
            Self::TimeOnly => 5,
            Self::Reserved(v) => v,
        }
    }

    /// 3D fix, with or without dead reckoning
    pub fn is_3d_or_better(self) -> bool {
        matches!(self, Self::Fix3D | Self::GnssDeadReckoning)
    }

    /// Display name used in status lines and reports
    pub fn label(self) -> &'static str {
        match self {
            Self::NoFix => "NO FIX",
            Self::DeadReckoning => "DEAD RECKONING",
            Self::Fix2D => "2D FIX",
            Self::Fix3D => "3D FIX",
            Self::GnssDeadReckoning => "GNSS+DR",
            Self::TimeOnly => "TIME ONLY",
            Self::Reserved(_) => "UNKNOWN",
        }
    }
}

impl From<u8> for FixType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::NoFix,
            1 => Self::DeadReckoning,
            2 => Self::Fix2D,
            3 => Self::Fix3D,
            4 => Self::GnssDeadReckoning,
            5 => Self::TimeOnly,
            v => Self::Reserved(v),
        }
    }
}

/// Carrier-phase range solution status (RTK)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CarrierSolution {
    None,
    Float,
    Fixed,
    Reserved(u8),
}

impl CarrierSolution {
    /// Raw protocol value
    pub fn as_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Float => 1,
            Self::Fixed => 2,
            Self::Reserved(v) => v,
        }
    }

    /// Display name used in reports
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "No carrier",
            Self::Float => "Float solution",
            Self::Fixed => "Fixed solution",
            Self::Reserved(_) => "UNKNOWN",
        }
    }
}

impl From<u8> for CarrierSolution {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Float,
            2 => Self::Fixed,
            v => Self::Reserved(v),
        }
    }
}
