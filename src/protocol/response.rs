//! Response payloads, decoded by the operation that produced them.

use super::request::Opcode;
use super::types::{FileAttr, FileHandle};
use super::wire::{WireError, WireReader, WireWriter};
use crate::error::ProtocolError;

/// A successful response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Attr(FileAttr),
    /// Entry names in the order the server sent them.
    Entries(Vec<Vec<u8>>),
    Opened(FileHandle),
    /// File content; the byte count is the data length.
    Data(Vec<u8>),
    Truncated,
}

impl Response {
    /// Decode a non-error response payload for `op`.
    pub fn decode(op: Opcode, payload: &[u8]) -> Result<Self, ProtocolError> {
        match op {
            Opcode::Getattr => {
                expect_len(op, FileAttr::WIRE_SIZE, payload)?;
                let mut r = WireReader::new(payload);
                Ok(Response::Attr(FileAttr::decode(&mut r)?))
            }
            Opcode::Readdir => {
                let mut names = Vec::new();
                decode_entries(payload, |name| names.push(name.to_vec()))?;
                Ok(Response::Entries(names))
            }
            Opcode::Open => {
                expect_len(op, 2, payload)?;
                let mut r = WireReader::new(payload);
                Ok(Response::Opened(FileHandle(r.get_u16()?)))
            }
            Opcode::Read => Ok(Response::Data(payload.to_vec())),
            Opcode::Truncate => {
                expect_len(op, 0, payload)?;
                Ok(Response::Truncated)
            }
        }
    }

    /// Result code the server reports for this response.
    ///
    /// A read reports its byte count, everything else reports 0.
    pub fn result_code(&self) -> i32 {
        match self {
            Response::Data(data) => data.len() as i32,
            _ => 0,
        }
    }

    /// Append the response payload.
    pub fn encode_payload(&self, w: &mut WireWriter) -> Result<(), WireError> {
        match self {
            Response::Attr(attr) => attr.encode(w),
            Response::Entries(names) => {
                for name in names {
                    w.put_string(name)?;
                }
            }
            Response::Opened(fh) => {
                w.put_u16(fh.0);
            }
            Response::Data(data) => {
                w.put_bytes(data);
            }
            Response::Truncated => {}
        }
        Ok(())
    }
}

fn expect_len(op: Opcode, expected: usize, payload: &[u8]) -> Result<(), ProtocolError> {
    if payload.len() != expected {
        return Err(ProtocolError::PayloadLength {
            op,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

/// Decode back-to-back length-prefixed names until the payload is exhausted.
///
/// `sink` is invoked once per name, in order. There is no count field; a
/// name whose declared length runs past the end of the payload is an error.
pub fn decode_entries<F>(payload: &[u8], mut sink: F) -> Result<usize, ProtocolError>
where
    F: FnMut(&[u8]),
{
    let mut r = WireReader::new(payload);
    let mut count = 0;
    while !r.is_empty() {
        sink(r.get_string()?);
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_names(names: &[&[u8]]) -> Vec<u8> {
        let mut w = WireWriter::new();
        Response::Entries(names.iter().map(|n| n.to_vec()).collect())
            .encode_payload(&mut w)
            .unwrap();
        w.into_bytes()
    }

    #[test]
    fn test_entries_decode_in_order() {
        let payload = encode_names(&[b"a", b"b", b"c"]);
        let mut seen = Vec::new();
        let count = decode_entries(&payload, |name| seen.push(name.to_vec())).unwrap();
        assert_eq!(count, 3);
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_entries_preserve_count_and_order() {
        let names: Vec<Vec<u8>> = (0..50).map(|i| format!("entry-{i}").into_bytes()).collect();
        let refs: Vec<&[u8]> = names.iter().map(|n| n.as_slice()).collect();
        let payload = encode_names(&refs);

        match Response::decode(Opcode::Readdir, &payload).unwrap() {
            Response::Entries(decoded) => assert_eq!(decoded, names),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_empty_listing() {
        assert_eq!(
            Response::decode(Opcode::Readdir, &[]).unwrap(),
            Response::Entries(Vec::new())
        );
    }

    #[test]
    fn test_truncated_entry_is_error() {
        let mut payload = encode_names(&[b"ok"]);
        payload.extend_from_slice(&[0, 9, b'x']);
        assert!(matches!(
            decode_entries(&payload, |_| {}),
            Err(ProtocolError::Wire(WireError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_attr_payload_must_be_exact() {
        let err = Response::decode(Opcode::Getattr, &[0u8; 51]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::PayloadLength {
                op: Opcode::Getattr,
                expected: 52,
                actual: 51
            }
        );
    }

    #[test]
    fn test_open_and_truncate() {
        assert_eq!(
            Response::decode(Opcode::Open, &[0, 10]).unwrap(),
            Response::Opened(FileHandle(10))
        );
        assert_eq!(
            Response::decode(Opcode::Truncate, &[]).unwrap(),
            Response::Truncated
        );
        assert!(Response::decode(Opcode::Truncate, &[1]).is_err());
    }

    #[test]
    fn test_read_result_code_is_length() {
        let data = Response::decode(Opcode::Read, b"hello\n").unwrap();
        assert_eq!(data.result_code(), 6);
        assert_eq!(Response::Truncated.result_code(), 0);
    }
}
