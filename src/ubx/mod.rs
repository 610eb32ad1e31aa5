//! # UBX Protocol Module
//!
//! Implementation of the u-blox UBX binary protocol as far as the logger needs it.
//!
//! This module handles:
//! - Stream framing with resynchronization after corruption
//! - Fletcher-8 checksum calculation
//! - Best-effort decoding of NAV-PVT, RXM-RAWX, RXM-SFRBX, NAV-SAT and NAV-STATUS
//! - Frame encoding for synthetic streams

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod message;
pub mod checksum;

pub use decoder::{DecoderStats, FrameDecoder};
pub use message::{decode_message, message_name, DecodedMessage, PositionVelocityTime, RawObservation};
pub use protocol::{CarrierSolution, FixType, RawFrame};
