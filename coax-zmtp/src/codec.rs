//! ZMTP frame codec.
//!
//! Wire layout of one frame:
//!
//! ```text
//! [flags:1][size:1][payload]            short frame (size <= 255)
//! [flags:1][size:8 BE][payload]         long frame
//! ```
//!
//! Flag bits: 0x01 MORE, 0x02 LONG, 0x04 COMMAND; bits 3-7 are reserved
//! and must be zero.

use bytes::{Buf, Bytes, BytesMut};
use coax_core::error::{Error, Result};
use smallvec::SmallVec;

/// MORE bit: another frame of the same multipart unit follows.
pub const FLAG_MORE: u8 = 0x01;
/// LONG bit: 8-byte length field.
pub const FLAG_LONG: u8 = 0x02;
/// COMMAND bit: frame carries a protocol command.
pub const FLAG_COMMAND: u8 = 0x04;

/// Reserved flag bits, must be zero on the wire.
pub const FLAG_RESERVED: u8 = 0xF8;

/// Largest payload length the protocol allows (max signed 64-bit value).
pub const MAX_FRAME_LEN: u64 = i64::MAX as u64;

/// A single decoded ZMTP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub flags: u8,
    pub payload: Bytes,
}

impl Frame {
    /// Create a data frame.
    pub fn data(payload: Bytes, more: bool) -> Self {
        let mut flags = 0;
        if more {
            flags |= FLAG_MORE;
        }
        if payload.len() > 255 {
            flags |= FLAG_LONG;
        }
        Self { flags, payload }
    }

    /// Create a command frame.
    pub fn command(payload: Bytes) -> Self {
        let mut flags = FLAG_COMMAND;
        if payload.len() > 255 {
            flags |= FLAG_LONG;
        }
        Self { flags, payload }
    }

    #[inline]
    pub const fn more(&self) -> bool {
        (self.flags & FLAG_MORE) != 0
    }

    #[inline]
    pub const fn is_command(&self) -> bool {
        (self.flags & FLAG_COMMAND) != 0
    }

    /// Encode this frame to wire bytes.
    pub fn encode(&self) -> Bytes {
        let is_long = self.payload.len() > 255;
        let header_len = if is_long { 9 } else { 2 };
        let mut out = BytesMut::with_capacity(header_len + self.payload.len());

        if is_long {
            out.extend_from_slice(&[self.flags | FLAG_LONG]);
            out.extend_from_slice(&(self.payload.len() as u64).to_be_bytes());
        } else {
            out.extend_from_slice(&[self.flags & !FLAG_LONG]);
            out.extend_from_slice(&[self.payload.len() as u8]);
        }

        out.extend_from_slice(&self.payload);
        out.freeze()
    }
}

/// One logical unit read off the wire: a chain of frames linked by the
/// MORE bit. The unit is a command if any frame in the chain set the
/// COMMAND bit.
#[derive(Debug)]
pub struct WireUnit {
    pub is_command: bool,
    pub frames: Vec<Bytes>,
}

/// Stateful incremental decoder over a receive buffer.
///
/// `decode_frame` yields single frames; `decode_unit` assembles complete
/// multipart units. Both return `Ok(None)` when the buffer does not yet
/// hold enough bytes, leaving partial input untouched for the next read.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: SmallVec<[Bytes; 4]>,
    pending_command: bool,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a single frame from `src`.
    pub fn decode_frame(src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < 2 {
            return Ok(None);
        }

        let flags = src[0];
        if (flags & FLAG_RESERVED) != 0 {
            return Err(Error::unexpected_frame(format!(
                "reserved flag bits set: {flags:#04x}"
            )));
        }

        let is_long = (flags & FLAG_LONG) != 0;
        let header_len = if is_long { 9 } else { 2 };
        if src.len() < header_len {
            return Ok(None);
        }

        let body_len = if is_long {
            let size = (&src[1..9]).get_u64();
            if size > MAX_FRAME_LEN {
                return Err(Error::FrameOverflow(size));
            }
            usize::try_from(size).map_err(|_| Error::FrameOverflow(size))?
        } else {
            src[1] as usize
        };

        if src.len() < header_len + body_len {
            // Make sure the next read can complete the frame in one go.
            src.reserve(header_len + body_len - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        let payload = src.split_to(body_len).freeze();
        Ok(Some(Frame { flags, payload }))
    }

    /// Decode a complete multipart unit from `src`.
    ///
    /// Frames are accumulated across calls, so feeding the buffer
    /// incrementally is fine; order within the unit is wire order.
    pub fn decode_unit(&mut self, src: &mut BytesMut) -> Result<Option<WireUnit>> {
        loop {
            let Some(frame) = Self::decode_frame(src)? else {
                return Ok(None);
            };

            self.pending_command |= frame.is_command();
            let more = frame.more();
            self.pending.push(frame.payload);

            if !more {
                let frames = std::mem::take(&mut self.pending).into_vec();
                let is_command = std::mem::take(&mut self.pending_command);
                return Ok(Some(WireUnit { is_command, frames }));
            }
        }
    }

    /// True while a multipart unit is partially assembled.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(payload_len: usize, more: bool, command: bool) {
        let payload = Bytes::from(vec![0xAB; payload_len]);
        let frame = if command {
            Frame::command(payload.clone())
        } else {
            Frame::data(payload.clone(), more)
        };

        let mut buf = BytesMut::from(&frame.encode()[..]);
        let decoded = FrameDecoder::decode_frame(&mut buf).unwrap().unwrap();

        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded.is_command(), command);
        if !command {
            assert_eq!(decoded.more(), more);
        }
        assert!(buf.is_empty(), "decoder must consume the whole frame");
    }

    #[test]
    fn test_round_trip_all_sizes_and_flags() {
        for len in [0, 1, 255, 256, 65536] {
            for more in [false, true] {
                round_trip(len, more, false);
            }
            round_trip(len, false, true);
        }
    }

    #[test]
    fn test_long_flag_threshold() {
        let short = Frame::data(Bytes::from(vec![0; 255]), false).encode();
        assert_eq!(short.len(), 2 + 255);

        let long = Frame::data(Bytes::from(vec![0; 256]), false).encode();
        assert_eq!(long.len(), 9 + 256);
        assert_eq!(long[0] & FLAG_LONG, FLAG_LONG);
    }

    #[test]
    fn test_incremental_decode() {
        let frame = Frame::data(Bytes::from_static(b"hello world"), false);
        let encoded = frame.encode();

        let mut buf = BytesMut::new();
        for chunk in encoded.chunks(3) {
            buf.extend_from_slice(chunk);
            if buf.len() < encoded.len() {
                assert!(FrameDecoder::decode_frame(&mut buf).unwrap().is_none());
            }
        }
        let decoded = FrameDecoder::decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.payload, Bytes::from_static(b"hello world"));
    }

    #[test]
    fn test_reserved_bits_rejected() {
        let mut buf = BytesMut::from(&[0x85u8, 0x00][..]);
        assert!(matches!(
            FrameDecoder::decode_frame(&mut buf),
            Err(Error::UnexpectedFrame(_))
        ));
    }

    #[test]
    fn test_frame_overflow() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[FLAG_LONG]);
        buf.extend_from_slice(&u64::MAX.to_be_bytes());
        assert!(matches!(
            FrameDecoder::decode_frame(&mut buf),
            Err(Error::FrameOverflow(_))
        ));
    }

    #[test]
    fn test_multipart_unit_assembly() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&Frame::data(Bytes::from_static(b"A"), true).encode());
        buf.extend_from_slice(&Frame::data(Bytes::from_static(b"B"), true).encode());

        let mut decoder = FrameDecoder::new();
        assert!(decoder.decode_unit(&mut buf).unwrap().is_none());
        assert!(decoder.has_partial());

        buf.extend_from_slice(&Frame::data(Bytes::from_static(b"C"), false).encode());
        let unit = decoder.decode_unit(&mut buf).unwrap().unwrap();
        assert!(!unit.is_command);
        assert_eq!(unit.frames, vec![
            Bytes::from_static(b"A"),
            Bytes::from_static(b"B"),
            Bytes::from_static(b"C"),
        ]);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_command_bit_taints_whole_chain() {
        // COMMAND on any frame of the chain marks the unit as a command.
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&Frame::data(Bytes::from_static(b"A"), true).encode());
        let mut tail = Frame::command(Bytes::from_static(b"B"));
        tail.flags &= !FLAG_MORE;
        buf.extend_from_slice(&tail.encode());

        let mut decoder = FrameDecoder::new();
        let unit = decoder.decode_unit(&mut buf).unwrap().unwrap();
        assert!(unit.is_command);
        assert_eq!(unit.frames.len(), 2);
    }
}
