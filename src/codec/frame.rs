//! Length-prefixed record framing.
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes of
//! JSON payload: `[u32 length][payload]`. The payload is decoded straight into
//! [`LogRecord`], so anything outside its fixed field list is rejected rather
//! than materialised.

use crate::types::{ExtraValue, LogRecord};
use crate::{RelayError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Size of the length prefix in bytes
pub const PREFIX_LEN: usize = 4;

/// Default upper bound on a single payload (16 MiB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Encode a record into a complete frame (prefix + payload)
pub fn encode(record: &LogRecord) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    FrameCodec::default().encode(record, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode one complete frame.
///
/// `frame` must hold exactly one prefix and the payload it declares.
pub fn decode(frame: &[u8]) -> Result<LogRecord> {
    decode_with_limit(frame, MAX_FRAME_SIZE)
}

/// Decode one complete frame, rejecting payloads larger than `max_frame_size`
pub fn decode_with_limit(frame: &[u8], max_frame_size: usize) -> Result<LogRecord> {
    if frame.len() < PREFIX_LEN {
        return Err(RelayError::MalformedFrame(format!(
            "frame has {} bytes, shorter than the {}-byte length prefix",
            frame.len(),
            PREFIX_LEN
        )));
    }

    let declared = read_prefix(frame);
    check_limit(declared, max_frame_size)?;

    let payload = &frame[PREFIX_LEN..];
    if payload.len() != declared {
        return Err(RelayError::MalformedFrame(format!(
            "length prefix declares {} payload bytes, got {}",
            declared,
            payload.len()
        )));
    }

    decode_payload(payload)
}

/// Parse a payload (without prefix) into a record
pub fn decode_payload(payload: &[u8]) -> Result<LogRecord> {
    serde_json::from_slice(payload).map_err(|e| RelayError::UnsupportedPayload(e.to_string()))
}

fn read_prefix(buf: &[u8]) -> usize {
    let mut prefix = [0u8; PREFIX_LEN];
    prefix.copy_from_slice(&buf[..PREFIX_LEN]);
    u32::from_be_bytes(prefix) as usize
}

fn check_limit(declared: usize, max_frame_size: usize) -> Result<()> {
    if declared > max_frame_size {
        return Err(RelayError::MalformedFrame(format!(
            "declared payload of {} bytes exceeds maximum {}",
            declared, max_frame_size
        )));
    }
    Ok(())
}

/// Streaming codec for use with `FramedRead` / `FramedWrite`
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Create a codec with a custom payload limit
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Configured payload limit
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = LogRecord;
    type Error = RelayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<LogRecord>> {
        if src.len() < PREFIX_LEN {
            return Ok(None);
        }

        let declared = read_prefix(&src[..]);
        check_limit(declared, self.max_frame_size)?;

        let total = PREFIX_LEN + declared;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(PREFIX_LEN);
        let payload = src.split_to(declared);
        decode_payload(&payload).map(Some)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<LogRecord>> {
        match self.decode(buf)? {
            Some(record) => Ok(Some(record)),
            None if buf.is_empty() => Ok(None),
            None => {
                let pending = buf.len();
                buf.clear();
                Err(RelayError::ConnectionClosedEarly { pending })
            }
        }
    }
}

impl<'a> Encoder<&'a LogRecord> for FrameCodec {
    type Error = RelayError;

    fn encode(&mut self, record: &'a LogRecord, dst: &mut BytesMut) -> Result<()> {
        // JSON has no inf/NaN; serde_json would silently write them as null.
        if let Some((key, _)) = record
            .extra
            .iter()
            .find(|(_, v)| matches!(v, ExtraValue::Float(f) if !f.is_finite()))
        {
            return Err(RelayError::UnsupportedPayload(format!(
                "extra {:?} holds a non-finite float",
                key
            )));
        }

        let payload = serde_json::to_vec(record)?;
        check_limit(payload.len(), self.max_frame_size)?;

        dst.reserve(PREFIX_LEN + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}
