//! Wire protocol for hyperfuse.
//!
//! A single byte stream carries request frames from the client and
//! response frames from the server. Each request carries a 16-bit
//! request id that the server echoes, so responses may arrive in any
//! order.
//!
//! # Frame Format
//!
//! ```text
//! request:  | total_length u32 | request_id u16 | opcode u8       | payload |
//! response: | total_length u32 | request_id u16 | result_code i32 | payload |
//! ```
//!
//! All integers are big-endian. Strings are a `u16` length followed by the
//! raw bytes. A negative `result_code` is `-errno` and carries no payload.
//!
//! | opcode | request payload                               | response payload      |
//! |--------|-----------------------------------------------|-----------------------|
//! | 1      | path                                          | 13 x u32 attributes   |
//! | 2      | path                                          | back-to-back names    |
//! | 3      | path, fh u16, size u32, offset u32            | raw bytes             |
//! | 4      | path, flags u16                               | fh u16                |
//! | 5      | path, size u32                                | (empty)               |

mod frame;
mod request;
mod response;
mod types;
mod wire;

pub use frame::{
    encode_request, encode_response, RequestHeader, ResponseHeader, MAX_FRAME_SIZE,
    REQUEST_HEADER_LEN, RESPONSE_HEADER_LEN,
};
pub use request::{Opcode, Request};
pub use response::{decode_entries, Response};
pub use types::{FileAttr, FileHandle};
pub use wire::{WireError, WireReader, WireWriter};

/// Convert a host path to its wire form by stripping leading slashes.
///
/// `/foo/bar` becomes `foo/bar` and `/` becomes the empty string.
pub fn wire_path(path: &[u8]) -> &[u8] {
    let start = path.iter().position(|b| *b != b'/').unwrap_or(path.len());
    &path[start..]
}
