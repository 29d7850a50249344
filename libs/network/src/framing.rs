//! Stream framing
//!
//! `LengthPrefixed` frames carry a 4-byte big-endian length before each
//! payload, so one payload is always one envelope. `SingleRead` treats
//! whatever a single socket read returns as one envelope; it exists for
//! peers that write raw envelopes and is only reliable for payloads that
//! arrive in one segment.
//!
//! The blocking helpers at the bottom frame the inter-process channel
//! between a monitor and its relay worker process.

use crate::{Result, TransportError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

/// Size of the length prefix
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest payload a length prefix can describe
pub const MAX_FRAME_LEN: usize = u32::MAX as usize;

/// How envelopes are delimited on the TCP stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    #[default]
    LengthPrefixed,
    SingleRead,
}

impl Framing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framing::LengthPrefixed => "length_prefixed",
            Framing::SingleRead => "single_read",
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framing {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "length_prefixed" => Ok(Framing::LengthPrefixed),
            "single_read" => Ok(Framing::SingleRead),
            other => Err(TransportError::configuration(
                format!("unknown framing '{other}'"),
                Some("framing"),
            )),
        }
    }
}

/// Encode the length prefix for a payload
pub fn frame_header(len: usize) -> Result<[u8; FRAME_HEADER_LEN]> {
    let len = u32::try_from(len).map_err(|_| {
        TransportError::protocol(format!(
            "payload of {len} bytes exceeds frame limit {MAX_FRAME_LEN}"
        ))
    })?;
    Ok(len.to_be_bytes())
}

/// Write one length-prefixed frame to a blocking writer
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let header = frame_header(payload.len())?;
    writer
        .write_all(&header)
        .and_then(|_| writer.write_all(payload))
        .and_then(|_| writer.flush())
        .map_err(|e| TransportError::from_io("Failed to write frame", None, e))
}

/// Read one length-prefixed frame from a blocking reader
///
/// Returns `Ok(None)` on a clean end of stream at a frame boundary.
pub fn read_frame<R: Read>(reader: &mut R, max_size: usize) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(TransportError::from_io("Failed to read frame length", None, e)),
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > max_size {
        return Err(TransportError::protocol(format!(
            "Frame size {len} exceeds maximum {max_size}"
        )));
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .map_err(|e| TransportError::from_io("Failed to read frame body", None, e))?;
    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_framing_names() {
        assert_eq!("single-read".parse::<Framing>().unwrap(), Framing::SingleRead);
        assert_eq!(
            "LENGTH_PREFIXED".parse::<Framing>().unwrap(),
            Framing::LengthPrefixed
        );
        assert!("chunked".parse::<Framing>().is_err());
        assert_eq!(Framing::default().to_string(), "length_prefixed");
    }

    #[test]
    fn test_blocking_frames_preserve_boundaries() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"first").unwrap();
        write_frame(&mut wire, b"").unwrap();
        write_frame(&mut wire, b"third").unwrap();
        assert_eq!(&wire[..4], &[0, 0, 0, 5]);

        let mut reader = Cursor::new(wire);
        assert_eq!(read_frame(&mut reader, 64).unwrap().as_deref(), Some(&b"first"[..]));
        assert_eq!(read_frame(&mut reader, 64).unwrap().as_deref(), Some(&b""[..]));
        assert_eq!(read_frame(&mut reader, 64).unwrap().as_deref(), Some(&b"third"[..]));
        assert_eq!(read_frame(&mut reader, 64).unwrap(), None);
    }

    #[test]
    fn test_blocking_frame_limits() {
        let mut wire = Vec::new();
        write_frame(&mut wire, &[7u8; 32]).unwrap();
        let err = read_frame(&mut Cursor::new(&wire), 16).unwrap_err();
        assert_eq!(err.category(), "protocol");

        // Truncated body is a lost connection, not a clean end
        wire.truncate(10);
        let err = read_frame(&mut Cursor::new(&wire), 64).unwrap_err();
        assert!(err.is_fatal());
    }
}
