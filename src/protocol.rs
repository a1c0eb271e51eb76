//! Length-prefixed request/response framing.
//!
//! Request:  `[MAGIC, len_hi, len_lo]` followed by `len` bytes of UTF-8 script text.
//! Response: `[MAGIC, error, len_hi, len_lo]` followed by `len` bytes of text.

use std::io::{Read, Write};

use crate::{byte_buffer::BytesBuffer, error::ProtocolError};

/// sentinel at offset 0 of every frame
pub const MAGIC: u8 = b'G';

pub const REQUEST_HEADER_LEN: usize = 3;
pub const RESPONSE_HEADER_LEN: usize = 4;

/// largest body a 16-bit length field can describe
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

fn check_magic(found: u8) -> Result<(), ProtocolError> {
    if found != MAGIC {
        return Err(ProtocolError::BadMagic {
            found,
            expected: MAGIC,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub length: u16,
}

impl RequestHeader {
    pub fn decode(buf: &mut BytesBuffer) -> Result<Self, ProtocolError> {
        let magic = buf.get_u8().ok_or(ProtocolError::Incomplete)?;
        check_magic(magic)?;
        let length = buf.get_u16().ok_or(ProtocolError::Incomplete)?;
        Ok(Self { length })
    }

    pub fn encode(&self, buf: &mut BytesBuffer) {
        buf.put_u8(MAGIC);
        buf.put_u16(self.length);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub is_error: bool,
    pub length: u16,
}

impl ResponseHeader {
    pub fn decode(buf: &mut BytesBuffer) -> Result<Self, ProtocolError> {
        let magic = buf.get_u8().ok_or(ProtocolError::Incomplete)?;
        check_magic(magic)?;
        let flag = buf.get_u8().ok_or(ProtocolError::Incomplete)?;
        let length = buf.get_u16().ok_or(ProtocolError::Incomplete)?;
        Ok(Self {
            is_error: flag != 0,
            length,
        })
    }

    pub fn encode(&self, buf: &mut BytesBuffer) {
        buf.put_u8(MAGIC);
        buf.put_u8(u8::from(self.is_error));
        buf.put_u16(self.length);
    }
}

/// One script command as sent by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: String,
}

impl Request {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let body = self.command.as_bytes();
        let length =
            u16::try_from(body.len()).map_err(|_| ProtocolError::CommandTooLong(body.len()))?;

        let mut buf = BytesBuffer::new(REQUEST_HEADER_LEN + body.len());
        RequestHeader { length }.encode(&mut buf);
        buf.put_u8_slice(body);
        Ok(buf.into_vec())
    }

    /// Take one complete request off the front of `buf`.
    ///
    /// Returns `None` while the frame is still partial; `buf` is then left
    /// as it was so more bytes can be appended and the call retried.
    pub fn decode(buf: &mut BytesBuffer) -> Result<Option<Self>, ProtocolError> {
        if buf.remaining() < REQUEST_HEADER_LEN {
            return Ok(None);
        }
        let start = buf.position();
        let header = RequestHeader::decode(buf)?;

        let Some(body) = buf.get_slice(usize::from(header.length)) else {
            buf.rewind(start);
            return Ok(None);
        };
        let command = String::from_utf8(body.to_vec())?;
        buf.compact();
        Ok(Some(Self { command }))
    }

    pub fn write_to(&self, writer: &mut impl Write) -> Result<(), ProtocolError> {
        writer.write_all(&self.encode()?)?;
        writer.flush()?;
        Ok(())
    }
}

/// The server's answer to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    is_error: bool,
    body: String,
    truncated_from: Option<usize>,
}

impl Response {
    /// Build a response, cutting `body` down to the frame limit if needed.
    ///
    /// The cut falls on a char boundary so the body stays valid UTF-8.
    pub fn new(is_error: bool, body: impl Into<String>) -> Self {
        let mut body = body.into();
        let mut truncated_from = None;
        if body.len() > MAX_PAYLOAD_LEN {
            let mut cut = MAX_PAYLOAD_LEN;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            truncated_from = Some(body.len());
            body.truncate(cut);
        }
        Self {
            is_error,
            body,
            truncated_from,
        }
    }

    pub fn success(body: impl Into<String>) -> Self {
        Self::new(false, body)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(true, message)
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Original body length, if it had to be truncated.
    pub fn truncated_from(&self) -> Option<usize> {
        self.truncated_from
    }

    pub fn encode(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        let mut buf = BytesBuffer::new(RESPONSE_HEADER_LEN + body.len());
        ResponseHeader {
            is_error: self.is_error,
            // `new` guarantees the body fits
            length: body.len() as u16,
        }
        .encode(&mut buf);
        buf.put_u8_slice(body);
        buf.into_vec()
    }

    pub fn read_from(reader: &mut impl Read) -> Result<Self, ProtocolError> {
        let mut buf = BytesBuffer::new(RESPONSE_HEADER_LEN);
        buf.read_exact_from(reader, RESPONSE_HEADER_LEN)?;
        let header = ResponseHeader::decode(&mut buf)?;

        let length = usize::from(header.length);
        buf.read_exact_from(reader, length)?;
        let body = buf.get_slice(length).ok_or(ProtocolError::Incomplete)?;

        Ok(Self::new(
            header.is_error,
            String::from_utf8_lossy(body).into_owned(),
        ))
    }
}
