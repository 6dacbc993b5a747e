// Error model shared by the decoder, the facade, and the CLI.
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    Io,
    NotFound,
    ContainerCorrupt,
    StreamNotFound,
    MalformedStringPool,
    RowSizeMismatch,
    UnsupportedColumnWidth,
    InvalidStringRef,
    MalformedSchema,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    path: Option<PathBuf>,
    stream: Option<String>,
    table: Option<String>,
    offset: Option<u64>,
    length: Option<u64>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            path: None,
            stream: None,
            table: None,
            offset: None,
            length: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Decoded (human-readable) name of the stream involved, if any.
    pub fn stream(&self) -> Option<&str> {
        self.stream.as_deref()
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn length(&self) -> Option<u64> {
        self.length
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(table) = &self.table {
            write!(f, " (table: {table})")?;
        }
        if let Some(stream) = &self.stream {
            write!(f, " (stream: {stream})")?;
        }
        if let Some(offset) = self.offset {
            write!(f, " (offset: {offset})")?;
        }
        if let Some(length) = self.length {
            write!(f, " (len: {length})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Io => 4,
        ErrorKind::ContainerCorrupt => 5,
        ErrorKind::StreamNotFound => 6,
        ErrorKind::MalformedStringPool => 7,
        ErrorKind::RowSizeMismatch => 8,
        ErrorKind::UnsupportedColumnWidth => 9,
        ErrorKind::InvalidStringRef => 10,
        ErrorKind::MalformedSchema => 11,
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, to_exit_code};

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Internal, 1),
            (ErrorKind::Usage, 2),
            (ErrorKind::NotFound, 3),
            (ErrorKind::Io, 4),
            (ErrorKind::ContainerCorrupt, 5),
            (ErrorKind::StreamNotFound, 6),
            (ErrorKind::MalformedStringPool, 7),
            (ErrorKind::RowSizeMismatch, 8),
            (ErrorKind::UnsupportedColumnWidth, 9),
            (ErrorKind::InvalidStringRef, 10),
            (ErrorKind::MalformedSchema, 11),
        ];

        for (kind, code) in cases {
            assert_eq!(to_exit_code(kind), code);
        }
    }

    #[test]
    fn display_includes_context_fields() {
        let err = Error::new(ErrorKind::RowSizeMismatch)
            .with_message("table length is not a multiple of row size")
            .with_table("Property")
            .with_length(7);
        let text = err.to_string();
        assert!(text.starts_with("RowSizeMismatch: table length"));
        assert!(text.contains("(table: Property)"));
        assert!(text.contains("(len: 7)"));
        assert!(err.stream().is_none());
    }
}
