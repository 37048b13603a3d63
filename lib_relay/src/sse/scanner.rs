//! # Frame Scanner
//!
//! Reads an upstream body line by line and groups lines into frames.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

/// Read buffer and line buffer size. Verbose payloads put a whole JSON
/// document on one `data:` line, so a single line must fit without regrowing.
pub const LINE_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Longest accepted line, terminator included. A longer line fails the read
/// with `InvalidData`, which ends the connection.
pub const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// The lines of one frame, in arrival order, without line terminators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame {
    lines: Vec<String>,
}

impl RawFrame {
    /// Wraps already-split lines.
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    /// The lines of this frame.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Consumes the frame.
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    /// `true` when no line was collected.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Lazily produces `RawFrame`s from one connection's byte stream.
///
/// A scanner lives exactly as long as its connection; reconnecting means
/// building a new one.
pub struct FrameScanner<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
    pending: Vec<String>,
    max_line: usize,
}

impl<R: AsyncRead + Unpin> FrameScanner<R> {
    /// Wraps `inner` with a `LINE_BUFFER_CAPACITY` read buffer.
    pub fn new(inner: R) -> Self {
        Self::with_capacity(LINE_BUFFER_CAPACITY, inner)
    }

    /// Wraps `inner` with a custom buffer size.
    pub fn with_capacity(capacity: usize, inner: R) -> Self {
        Self {
            reader: BufReader::with_capacity(capacity, inner),
            line: Vec::with_capacity(capacity),
            pending: Vec::new(),
            max_line: MAX_LINE_LENGTH,
        }
    }

    /// Overrides `MAX_LINE_LENGTH`. Zero is raised to one.
    pub fn with_max_line_length(mut self, max_line: usize) -> Self {
        self.max_line = max_line.max(1);
        self
    }

    /// Returns the next non-empty frame.
    ///
    /// `Ok(None)` means the remote closed the stream; `Err` is a read failure.
    /// Either way the scanner is finished. Lines collected after the last blank
    /// line are discarded at end of stream, since the frame was never closed.
    /// A line longer than the maximum line length is a read error.
    pub async fn next_frame(&mut self) -> io::Result<Option<RawFrame>> {
        loop {
            self.line.clear();
            let read = (&mut self.reader)
                .take(self.max_line as u64)
                .read_until(b'\n', &mut self.line)
                .await?;
            if read == self.max_line && self.line.last() != Some(&b'\n') {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line exceeds {} bytes", self.max_line),
                ));
            }
            if read == 0 {
                if !self.pending.is_empty() {
                    tracing::debug!(
                        lines = self.pending.len(),
                        "Discarding unterminated frame at end of stream"
                    );
                    self.pending.clear();
                }
                return Ok(None);
            }

            let text = strip_line_ending(&self.line);
            if text.is_empty() {
                if self.pending.is_empty() {
                    continue;
                }
                return Ok(Some(RawFrame::new(std::mem::take(&mut self.pending))));
            }

            self.pending.push(String::from_utf8_lossy(text).into_owned());
        }
    }
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
