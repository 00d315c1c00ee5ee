use std::fmt;
use std::io;

use thiserror::Error;

use crate::common::io_error_msg;

/// Which header line the decoder was looking for when parsing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    Filename,
    Size,
    Digest,
    Separator,
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HeaderField::Filename => "filename",
            HeaderField::Size => "size",
            HeaderField::Digest => "digest",
            HeaderField::Separator => "blank separator",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{}", io_error_msg(.0))]
    Io(io::Error),

    #[error("malformed header: {field} line: {detail}")]
    MalformedHeader {
        field: HeaderField,
        detail: &'static str,
    },

    /// `offset` counts codec symbols (line separators excluded) preceding
    /// the batch or symbol that failed to decode.
    #[error("invalid input at symbol {offset}")]
    InvalidEncoding { offset: u64 },

    #[error("refusing to write to unsafe filename {0:?}")]
    UnsafeFilename(String),

    #[error("input changed while encoding: hashed {expected} bytes, encoded {actual}")]
    InputChanged { expected: u64, actual: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn truncated(field: HeaderField) -> Self {
        Error::MalformedHeader {
            field,
            detail: "unexpected end of input",
        }
    }

    /// True when the error is a write into a closed pipe, which the CLI
    /// treats as a clean exit.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == io::ErrorKind::BrokenPipe)
    }
}

// Not `#[from]`: the message already renders the OS error, so it is not
// exposed again as a source.
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
