//! The request loop: one JSONL request in, one envelope out.

use std::io::{self, BufRead, Read, Write};

use tracing::{debug, warn};

use stowage_config::Limits;

use super::errors::DispatchError;
use super::request::Request;
use super::response::ResponseWriter;
use super::router::{DISPATCH_TARGET, route};
use crate::broker::Broker;

/// Allowance for everything in a request line other than written content.
pub const BASE_REQUEST_BYTES: u64 = 64 * 1024 * 1024;

/// Longest request line accepted under `limits`.
#[must_use]
pub const fn request_limit(limits: &Limits) -> u64 {
    BASE_REQUEST_BYTES.saturating_add(limits.max_write_bytes())
}

/// One unit read from the input.
enum Frame {
    End,
    Oversized(u64),
    Line(Vec<u8>),
}

/// Serves requests from `input` until end of input, writing one envelope
/// per request to `output`.
///
/// Malformed, empty and oversized lines are answered with an
/// `INVALID_REQUEST` envelope and the loop continues. Returns the number of
/// replies written.
///
/// # Errors
///
/// Returns [`DispatchError`] when reading the input or writing a reply
/// fails; the loop cannot continue past a broken stream.
pub fn serve<R: BufRead, W: Write>(
    broker: &Broker,
    input: &mut R,
    output: &mut W,
    limit: u64,
) -> Result<u64, DispatchError> {
    let mut writer = ResponseWriter::new(output);
    let mut handled: u64 = 0;
    loop {
        let envelope = match read_frame(input, limit)? {
            Frame::End => break,
            Frame::Oversized(size) => {
                warn!(target: DISPATCH_TARGET, size, limit, "request too large");
                DispatchError::request_too_large(size, limit).to_envelope()
            }
            Frame::Line(bytes) => match Request::parse(&bytes) {
                Ok(request) => route(broker, &request),
                Err(error) => {
                    warn!(target: DISPATCH_TARGET, %error, "malformed request");
                    error.to_envelope()
                }
            },
        };
        writer.write_envelope(&envelope)?;
        handled = handled.saturating_add(1);
    }
    debug!(target: DISPATCH_TARGET, handled, "input closed");
    Ok(handled)
}

/// Reads the next line, reading at most `limit + 1` bytes into memory. The
/// rest of an oversized line is skipped.
fn read_frame<R: BufRead>(input: &mut R, limit: u64) -> io::Result<Frame> {
    let mut line = Vec::new();
    let read = input
        .by_ref()
        .take(limit.saturating_add(1))
        .read_until(b'\n', &mut line)?;
    if read == 0 {
        return Ok(Frame::End);
    }
    if line.last() == Some(&b'\n') {
        return Ok(Frame::Line(line));
    }
    let size = u64::try_from(read).unwrap_or(u64::MAX);
    if size <= limit {
        return Ok(Frame::Line(line));
    }
    let skipped = input.skip_until(b'\n')?;
    Ok(Frame::Oversized(
        size.saturating_add(u64::try_from(skipped).unwrap_or(u64::MAX)),
    ))
}
