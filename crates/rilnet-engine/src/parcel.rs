//! Parcel reader/writer.
//!
//! RIL parcels are little-endian: `i32` scalars, and strings encoded as
//! an `i32` byte length followed by that many UTF-8 bytes. Length `-1`
//! is the null string. The transport's outer framing (length prefix,
//! request serials) never reaches this layer.

use bytes::{Buf, BufMut, BytesMut};

use rilnet_core::{Error, Result};

/// Sequential reader over a received parcel payload.
pub struct Parcel<'a> {
    buf: &'a [u8],
}

impl<'a> Parcel<'a> {
    /// Start reading at the beginning of `payload`.
    pub fn new(payload: &'a [u8]) -> Self {
        Parcel { buf: payload }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Read one little-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32> {
        if self.buf.len() < 4 {
            return Err(Error::Malformed(format!(
                "need 4 bytes for int32, have {}",
                self.buf.len()
            )));
        }
        Ok(self.buf.get_i32_le())
    }

    /// Read one length-prefixed UTF-8 string.
    ///
    /// Returns `None` for the null string (length `-1`).
    pub fn read_string(&mut self) -> Result<Option<String>> {
        let len = self.read_i32()?;
        if len == -1 {
            return Ok(None);
        }
        if len < 0 {
            return Err(Error::Malformed(format!("bad string length {len}")));
        }
        let len = len as usize;
        if self.buf.len() < len {
            return Err(Error::Malformed(format!(
                "string length {len} exceeds remaining {}",
                self.buf.len()
            )));
        }
        let s = std::str::from_utf8(&self.buf[..len])
            .map_err(|e| Error::Malformed(format!("invalid UTF-8 in string: {e}")))?
            .to_owned();
        self.buf.advance(len);
        Ok(Some(s))
    }
}

/// Builder for outgoing parcel payloads.
#[derive(Default)]
pub struct ParcelWriter {
    buf: BytesMut,
}

impl ParcelWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        ParcelWriter {
            buf: BytesMut::new(),
        }
    }

    /// Create a writer with a capacity hint.
    pub fn with_capacity(capacity: usize) -> Self {
        ParcelWriter {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Append one little-endian `i32`.
    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32_le(value);
        self
    }

    /// Append one length-prefixed UTF-8 string.
    pub fn put_string(&mut self, value: &str) -> &mut Self {
        self.buf.put_i32_le(value.len() as i32);
        self.buf.put_slice(value.as_bytes());
        self
    }

    /// Append the null string.
    pub fn put_null_string(&mut self) -> &mut Self {
        self.buf.put_i32_le(-1);
        self
    }

    /// Finish and return the encoded payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}
