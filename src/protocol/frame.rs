//! Request and response framing.
//!
//! ```text
//! request:  | total_length u32 | request_id u16 | opcode u8       | payload |
//! response: | total_length u32 | request_id u16 | result_code i32 | payload |
//! ```
//!
//! `total_length` counts every byte after itself.

use super::request::Request;
use super::response::Response;
use super::wire::{WireReader, WireWriter};
use crate::error::ProtocolError;

/// Maximum `total_length` accepted in either direction (16 MB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Bytes of a request frame up to and including the opcode.
pub const REQUEST_HEADER_LEN: usize = 7;

/// Bytes of a response frame up to and including the result code.
pub const RESPONSE_HEADER_LEN: usize = 10;

const LENGTH_FIELD: usize = 4;

/// Fixed header of a request frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub total_length: u32,
    pub request_id: u16,
    /// Raw opcode byte; validated by the dispatcher.
    pub opcode: u8,
}

impl RequestHeader {
    pub fn decode(buf: &[u8; REQUEST_HEADER_LEN]) -> Result<Self, ProtocolError> {
        let mut r = WireReader::new(buf);
        let header = Self {
            total_length: r.get_u32()?,
            request_id: r.get_u16()?,
            opcode: r.get_u8()?,
        };
        check_length(header.total_length, REQUEST_HEADER_LEN - LENGTH_FIELD)?;
        Ok(header)
    }

    /// Bytes of operation payload that follow the header.
    pub fn payload_len(&self) -> usize {
        self.total_length as usize - (REQUEST_HEADER_LEN - LENGTH_FIELD)
    }
}

/// Fixed header of a response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub total_length: u32,
    pub request_id: u16,
    pub result_code: i32,
}

impl ResponseHeader {
    pub fn decode(buf: &[u8; RESPONSE_HEADER_LEN]) -> Result<Self, ProtocolError> {
        let mut r = WireReader::new(buf);
        let header = Self {
            total_length: r.get_u32()?,
            request_id: r.get_u16()?,
            result_code: r.get_i32()?,
        };
        check_length(header.total_length, RESPONSE_HEADER_LEN - LENGTH_FIELD)?;
        Ok(header)
    }

    /// Bytes of result payload that follow the header.
    pub fn payload_len(&self) -> usize {
        self.total_length as usize - (RESPONSE_HEADER_LEN - LENGTH_FIELD)
    }
}

fn check_length(total_length: u32, fixed: usize) -> Result<(), ProtocolError> {
    if (total_length as usize) < fixed {
        return Err(ProtocolError::FrameTooShort(total_length));
    }
    if total_length as usize > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(total_length as usize));
    }
    Ok(())
}

/// Back-fill the length field and hand out the frame bytes.
fn finish(mut w: WireWriter) -> Result<Vec<u8>, ProtocolError> {
    let total = w.len() - LENGTH_FIELD;
    if total > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(total));
    }
    w.patch_u32(0, total as u32);
    Ok(w.into_bytes())
}

/// Encode a complete request frame.
pub fn encode_request(request_id: u16, request: &Request) -> Result<Vec<u8>, ProtocolError> {
    let mut w = WireWriter::with_capacity(REQUEST_HEADER_LEN + 2 + request.path().len() + 10);
    w.put_u32(0)
        .put_u16(request_id)
        .put_u8(request.opcode().into());
    request.encode_payload(&mut w)?;
    finish(w)
}

/// Encode a complete response frame.
///
/// `Err(errno)` produces a payload-less frame carrying `-errno`.
pub fn encode_response(
    request_id: u16,
    result: &Result<Response, i32>,
) -> Result<Vec<u8>, ProtocolError> {
    let mut w = WireWriter::with_capacity(RESPONSE_HEADER_LEN + 64);
    w.put_u32(0).put_u16(request_id);
    match result {
        Ok(response) => {
            w.put_i32(response.result_code());
            response.encode_payload(&mut w)?;
        }
        Err(errno) => {
            w.put_i32(-errno.abs());
        }
    }
    finish(w)
}
