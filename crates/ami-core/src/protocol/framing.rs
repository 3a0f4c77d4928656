//! Stream framing: turns the raw byte stream into delimited frames.
//!
//! The manager interface has no length prefix.  A message ends at the first
//! empty line, so the splitter scans for the `CRLFCRLF` delimiter and keeps
//! whatever follows the last delimiter for the next read.
//!
//! ```text
//! read #1: "Response: Success\r\nActionID: 1\r\n\r\nEvent: Ha"
//!           └────────────── frame 1 ──────────┘        └ buffered
//! read #2: "ngup\r\nChannel: SIP/1\r\n\r\n"
//!           frame 2 = "Event: Hangup\r\nChannel: SIP/1"
//! ```
//!
//! Bytes are buffered rather than text so that a multi-byte UTF-8 sequence
//! cut by a read boundary is reassembled before decoding.  A delimiter cut in
//! half is handled the same way.
//!
//! The splitter also serves the single greeting line the server sends
//! before any message (see [`FrameSplitter::next_line`]).

use thiserror::Error;

use crate::protocol::message::{EOL, EOM};

/// Default cap on bytes buffered without finding a delimiter (1 MiB).
pub const DEFAULT_MAX_BUFFERED_BYTES: usize = 1024 * 1024;

/// Errors raised by the frame splitter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The peer sent more than the allowed amount without a delimiter.
    #[error("frame buffer overflow: {buffered} bytes without a delimiter (max: {max})")]
    BufferOverflow { buffered: usize, max: usize },
}

/// Incremental splitter holding the undelimited tail of the stream.
#[derive(Debug, Clone)]
pub struct FrameSplitter {
    buffer: Vec<u8>,
    max_buffered: usize,
}

impl FrameSplitter {
    /// Creates a splitter with [`DEFAULT_MAX_BUFFERED_BYTES`].
    pub fn new() -> Self {
        Self::with_max_buffered(DEFAULT_MAX_BUFFERED_BYTES)
    }

    /// Creates a splitter refusing to buffer more than `max_buffered` bytes
    /// of an unterminated frame.
    pub fn with_max_buffered(max_buffered: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_buffered,
        }
    }

    /// Appends `bytes` and returns every frame completed by them, in stream
    /// order, without the delimiter.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::BufferOverflow`] when the remaining tail is
    /// larger than the configured maximum.  The stream cannot be resynced
    /// after that, so callers should treat it as fatal.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ami_core::protocol::FrameSplitter;
    ///
    /// let mut splitter = FrameSplitter::new();
    /// assert!(splitter.feed(b"Event: Hangup\r\n").unwrap().is_empty());
    /// let frames = splitter.feed(b"\r\nEvent: Newchannel").unwrap();
    /// assert_eq!(frames, vec!["Event: Hangup".to_string()]);
    /// assert_eq!(splitter.remainder(), "Event: Newchannel");
    /// ```
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<String>, FramingError> {
        self.push(bytes);
        self.frames()
    }

    /// Appends `bytes` without extracting frames.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Extracts every complete frame currently buffered.
    ///
    /// # Errors
    ///
    /// Same as [`FrameSplitter::feed`].
    pub fn frames(&mut self) -> Result<Vec<String>, FramingError> {
        let delimiter = EOM.as_bytes();
        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(pos) = find(&self.buffer[start..], delimiter) {
            let end = start + pos;
            frames.push(String::from_utf8_lossy(&self.buffer[start..end]).into_owned());
            start = end + delimiter.len();
        }
        self.buffer.drain(..start);
        self.check_limit()?;
        Ok(frames)
    }

    /// Removes and returns the first CRLF-terminated line, if buffered.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::BufferOverflow`] when no line terminator has
    /// been seen and the buffer is over the limit.
    pub fn next_line(&mut self) -> Result<Option<String>, FramingError> {
        let Some(pos) = find(&self.buffer, EOL.as_bytes()) else {
            self.check_limit()?;
            return Ok(None);
        };
        let line = String::from_utf8_lossy(&self.buffer[..pos]).into_owned();
        self.buffer.drain(..pos + EOL.len());
        Ok(Some(line))
    }

    /// The buffered, not yet delimited tail.
    pub fn remainder(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }

    /// Number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Discards the buffered tail.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn check_limit(&self) -> Result<(), FramingError> {
        if self.buffer.len() > self.max_buffered {
            return Err(FramingError::BufferOverflow {
                buffered: self.buffer.len(),
                max: self.max_buffered,
            });
        }
        Ok(())
    }
}

impl Default for FrameSplitter {
    fn default() -> Self {
        Self::new()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
