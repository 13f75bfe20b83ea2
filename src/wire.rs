//! Fixed-width little-endian primitives and length-prefixed fields.
//!
//! Encoders append to a caller-owned buffer. The [`Decoder`] walks a
//! borrowed slice and never reads past its end.

use crate::error::{Error, Result};
use crate::fcall::MsgType;
use std::convert::TryInto;

/// Fail with a format error if `value` does not fit under `max`.
pub fn check_range(field: &'static str, value: u64, max: u64) -> Result<()> {
    if value > max {
        return Err(Error::format(
            field,
            format!("value {} exceeds maximum {}", value, max),
        ));
    }
    Ok(())
}

pub fn encode_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

pub fn encode_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes()[..]);
}

pub fn encode_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes()[..]);
}

pub fn encode_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes()[..]);
}

/// Opaque bytes with no length prefix.
pub fn encode_raw(buf: &mut Vec<u8>, v: &[u8]) {
    buf.extend_from_slice(v);
}

/// String with a 2-byte length prefix and no terminator.
pub fn encode_str(buf: &mut Vec<u8>, field: &'static str, v: &str) -> Result<()> {
    check_range(field, v.len() as u64, u16::MAX as u64)?;
    encode_u16(buf, v.len() as u16);
    buf.extend_from_slice(v.as_bytes());
    Ok(())
}

/// Opaque data with a 4-byte length prefix.
pub fn encode_data(buf: &mut Vec<u8>, field: &'static str, v: &[u8]) -> Result<()> {
    check_range(field, v.len() as u64, u32::MAX as u64)?;
    encode_u32(buf, v.len() as u32);
    buf.extend_from_slice(v);
    Ok(())
}

/// Read cursor over one message payload.
pub struct Decoder<'b> {
    buf: &'b [u8],
    pos: usize,
}

impl<'b> Decoder<'b> {
    pub fn new(buf: &'b [u8]) -> Decoder<'b> {
        Decoder { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Take exactly `n` bytes.
    pub fn decode_raw(&mut self, field: &'static str, n: usize) -> Result<&'b [u8]> {
        if self.remaining() < n {
            return Err(Error::Truncated {
                field,
                needed: n,
                available: self.remaining(),
            });
        }
        let v = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(v)
    }

    fn decode_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N]> {
        let bytes = self.decode_raw(field, N)?;
        // decode_raw returned exactly N bytes.
        Ok(bytes.try_into().unwrap_or([0; N]))
    }

    pub fn decode_u8(&mut self, field: &'static str) -> Result<u8> {
        Ok(self.decode_array::<1>(field)?[0])
    }

    pub fn decode_u16(&mut self, field: &'static str) -> Result<u16> {
        Ok(u16::from_le_bytes(self.decode_array(field)?))
    }

    pub fn decode_u32(&mut self, field: &'static str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.decode_array(field)?))
    }

    pub fn decode_u64(&mut self, field: &'static str) -> Result<u64> {
        Ok(u64::from_le_bytes(self.decode_array(field)?))
    }

    pub fn decode_str(&mut self, field: &'static str) -> Result<String> {
        let n = self.decode_u16(field)? as usize;
        let bytes = self.decode_raw(field, n)?;
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_owned()),
            Err(err) => Err(Error::format(field, format!("invalid utf-8: {}", err))),
        }
    }

    pub fn decode_data(&mut self, field: &'static str) -> Result<&'b [u8]> {
        let n = self.decode_u32(field)? as usize;
        self.decode_raw(field, n)
    }

    /// Check that the payload of `kind` was consumed exactly.
    pub fn finish(self, kind: MsgType) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(Error::TrailingBytes { kind, extra }),
        }
    }
}
