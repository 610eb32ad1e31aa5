//! # UBX Stream Decoder
//!
//! Incremental, push-model frame decoder. Callers feed arbitrary-sized chunks
//! in arrival order and pull validated frames out.
//!
//! ```text
//! Seeking --sync--> ReadingHeader --len ok--> ReadingPayload --complete--> Verifying
//!    ^                    |                                                   |
//!    +---- drop 1 byte ---+ (length too large)        checksum bad: drop 1 ---+
//!    +------------------------------------------ checksum ok: emit frame -----+
//! ```
//!
//! On any failure only the byte at the original sync position is dropped, so a
//! false sync match inside payload data never swallows the valid frames that
//! follow it.

use bytes::{Buf, BytesMut};
use tracing::debug;

use super::checksum::verify;
use super::message::{decode_message, DecodedMessage};
use super::protocol::*;

/// Running decoder counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Checksum-validated frames emitted
    pub frames: u64,

    /// Frames rejected for a bad checksum or an oversized length
    pub corrupt_frames: u64,

    /// Subset of `corrupt_frames` rejected for their length field
    pub oversized_frames: u64,

    /// Bytes discarded while searching for sync
    pub skipped_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Seeking,
    ReadingHeader,
    ReadingPayload { payload_len: usize },
    Verifying { payload_len: usize },
}

/// Incremental UBX frame decoder
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    state: DecodeState,
    max_payload_len: usize,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder with the default payload bound
    pub fn new() -> Self {
        Self::with_max_payload_len(DEFAULT_MAX_PAYLOAD_LEN)
    }

    /// Create a decoder that treats longer payloads as corrupt
    ///
    /// The bound is clamped to what the 16-bit length field can express.
    pub fn with_max_payload_len(max_payload_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            state: DecodeState::Seeking,
            max_payload_len: max_payload_len.min(UBX_MAX_PAYLOAD_SIZE),
            stats: DecoderStats::default(),
        }
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pull the next validated frame, if one is complete
    ///
    /// Returns `None` when more input is needed. The decoded message is `None`
    /// only for modelled message types whose payload could not be decoded.
    pub fn next_frame(&mut self) -> Option<(RawFrame, Option<DecodedMessage>)> {
        loop {
            match self.state {
                DecodeState::Seeking => match find_sync(&self.buffer) {
                    Some(pos) => {
                        self.skip(pos);
                        self.state = DecodeState::ReadingHeader;
                    }
                    None => {
                        // A trailing first sync byte may pair with the next chunk
                        let keep = usize::from(self.buffer.last() == Some(&UBX_SYNC_1));
                        let discard = self.buffer.len() - keep;
                        self.skip(discard);
                        return None;
                    }
                },

                DecodeState::ReadingHeader => {
                    if self.buffer.len() < UBX_HEADER_SIZE {
                        return None;
                    }

                    let payload_len = u16::from_le_bytes([self.buffer[4], self.buffer[5]]) as usize;
                    if payload_len > self.max_payload_len {
                        debug!(
                            "Rejecting frame 0x{:02X}/0x{:02X}: length {} exceeds {}",
                            self.buffer[2], self.buffer[3], payload_len, self.max_payload_len
                        );
                        self.stats.oversized_frames += 1;
                        self.resync();
                        continue;
                    }

                    self.state = DecodeState::ReadingPayload { payload_len };
                }

                DecodeState::ReadingPayload { payload_len } => {
                    if self.buffer.len() < UBX_HEADER_SIZE + payload_len + UBX_CHECKSUM_SIZE {
                        return None;
                    }
                    self.state = DecodeState::Verifying { payload_len };
                }

                DecodeState::Verifying { payload_len } => {
                    let end = UBX_HEADER_SIZE + payload_len;
                    if !verify(&self.buffer[2..end], self.buffer[end], self.buffer[end + 1]) {
                        debug!(
                            "Checksum mismatch on frame 0x{:02X}/0x{:02X} ({} byte payload)",
                            self.buffer[2], self.buffer[3], payload_len
                        );
                        self.resync();
                        continue;
                    }

                    let bytes = self.buffer.split_to(end + UBX_CHECKSUM_SIZE).freeze();
                    self.state = DecodeState::Seeking;
                    self.stats.frames += 1;

                    let frame = RawFrame::from_validated(bytes);
                    let message = decode_message(&frame);
                    return Some((frame, message));
                }
            }
        }
    }

    /// Iterate over every frame currently decodable
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { decoder: self }
    }

    /// Counters accumulated since creation
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Bytes buffered but not yet part of an emitted frame
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop buffered bytes and return to sync search
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = DecodeState::Seeking;
    }

    /// Give up on the buffered partial frame once input has ended
    ///
    /// Drops the byte at the sync position so frames hidden behind a corrupt
    /// length field can still be found. Returns `false` when nothing is
    /// buffered.
    pub fn skip_incomplete(&mut self) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        self.skip(1);
        self.state = DecodeState::Seeking;
        true
    }

    fn skip(&mut self, count: usize) {
        self.buffer.advance(count);
        self.stats.skipped_bytes += count as u64;
    }

    /// Drop the byte at the sync position and search again from the next one
    fn resync(&mut self) {
        self.stats.corrupt_frames += 1;
        self.skip(1);
        self.state = DecodeState::Seeking;
    }
}

/// Iterator returned by [`FrameDecoder::frames`]
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = (RawFrame, Option<DecodedMessage>);

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_frame()
    }
}

fn find_sync(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w[0] == UBX_SYNC_1 && w[1] == UBX_SYNC_2)
}
