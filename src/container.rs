use flate2::read::DeflateDecoder;
use log::debug;
use std::io::Read;
use thiserror::Error;

/// Literal token carried by the container's first line. Files written by
/// other firmware revisions use a different token and are rejected up
/// front rather than mis-decoded.
pub const HEADER_TOKEN: &str = "PGF/3.1";

/// Reserved field between the header line and the payload terminator.
const RESERVED_LEN: usize = 4;

/// Fatal container failures. There is no partial-file recovery: a bad
/// wrapper means nothing downstream can be trusted.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("not a pageset container (expected header line {expected:?}, found {found:?})")]
    BadHeader { expected: &'static str, found: String },

    #[error("reserved field is not terminated by a CRLF pair")]
    BadReservedTerminator,

    #[error("container truncated before the compressed payload")]
    Truncated,

    #[error("DEFLATE payload is corrupt: {0}")]
    Deflate(#[from] std::io::Error),
}

/// Strip the text wrapper and inflate the payload into a flat buffer.
///
/// Wrapper layout: one text line ending in CRLF identifying the format
/// version, 4 reserved bytes, a CRLF pair, then a raw DEFLATE stream to
/// end of input.
pub fn unwrap_container(bytes: &[u8]) -> Result<Vec<u8>, ContainerError> {
    let line_end = bytes
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or(ContainerError::Truncated)?;
    let line = &bytes[..line_end];
    if line != HEADER_TOKEN.as_bytes() {
        return Err(ContainerError::BadHeader {
            expected: HEADER_TOKEN,
            found: String::from_utf8_lossy(&line[..line.len().min(32)]).into_owned(),
        });
    }

    let reserved_start = line_end + 2;
    let payload_start = reserved_start + RESERVED_LEN + 2;
    if bytes.len() < payload_start {
        return Err(ContainerError::Truncated);
    }
    if &bytes[reserved_start + RESERVED_LEN..payload_start] != b"\r\n" {
        return Err(ContainerError::BadReservedTerminator);
    }

    let mut buf = Vec::new();
    DeflateDecoder::new(&bytes[payload_start..]).read_to_end(&mut buf)?;
    debug!(
        "container unwrapped: {} compressed bytes -> {} byte buffer",
        bytes.len() - payload_start,
        buf.len()
    );
    Ok(buf)
}
