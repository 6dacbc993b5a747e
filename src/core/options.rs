//! Purpose: Caller-tunable knobs for opening a package database.
//! Exports: `OpenOptions`, `Utf8Policy`, `DEFAULT_MAX_STREAM_LEN`.
//! Invariants: Defaults decode every well-formed package without configuration.

/// Upper bound on bytes read from any single stream.
pub const DEFAULT_MAX_STREAM_LEN: u64 = 256 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Utf8Policy {
    /// Replace invalid sequences with U+FFFD.
    #[default]
    Lossy,
    /// Reject the string pool when any entry is not valid UTF-8.
    Strict,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenOptions {
    pub max_stream_len: u64,
    pub utf8: Utf8Policy,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            max_stream_len: DEFAULT_MAX_STREAM_LEN,
            utf8: Utf8Policy::Lossy,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_stream_len(mut self, max_stream_len: u64) -> Self {
        self.max_stream_len = max_stream_len;
        self
    }

    pub fn with_utf8(mut self, utf8: Utf8Policy) -> Self {
        self.utf8 = utf8;
        self
    }
}
