//! Response serialisation for the dispatch loop.

use std::io::Write;

use super::errors::DispatchError;
use crate::envelope::Envelope;

/// Writes one envelope per line and flushes after each, so the host sees
/// every reply as soon as it is complete.
pub struct ResponseWriter<W: Write> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Wraps `writer`.
    #[must_use]
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialises `envelope` as a single JSONL line.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when serialisation or the write fails.
    pub fn write_envelope(&mut self, envelope: &Envelope) -> Result<(), DispatchError> {
        serde_json::to_writer(&mut self.writer, envelope)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
