use crate::chunk::ByteRange;
use crate::ConfigBuilderError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error definition for possible errors in this crate
#[derive(Debug, Error)]
pub enum ChunkdlError {
    /// Represents problems with network connectivity
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Returned when the metadata request didn't answer with a success status
    #[error("Server responded with status {0}")]
    UnexpectedStatus(u16),
    /// Returned when the content length is missing or couldn't be parsed
    #[error("Missing or invalid content-length")]
    MissingSize,
    /// Returned when the server doesn't advertise `Accept-Ranges: bytes`
    #[error("Server does not support range requests, cannot download in chunks")]
    RangeUnsupported,
    /// Returned when the chunk count or another setting is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Returned when the url couldn't be parsed
    #[error("Failed to parse URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Returned after the join barrier when at least one chunk failed
    #[error("{} chunk(s) failed: {}", .0.len(), ChunkErrors(.0))]
    ChunkFetch(Vec<ChunkError>),
    /// Returned when the fetch phase outlived the configured deadline
    #[error("Download did not finish within {0:?}")]
    DeadlineExceeded(Duration),
    /// Returned when a result names a chunk index the table has no slot for
    #[error("No result slot for chunk {0}")]
    SlotOutOfRange(usize),
    /// Returned when a chunk's slot already holds bytes
    #[error("Result slot for chunk {0} is already filled")]
    SlotFilled(usize),
    /// Returned when writing a table whose slots are not all filled
    #[error("Refusing to write incomplete result, missing chunks {0:?}")]
    IncompleteResult(Vec<usize>),
    /// Destination create/write failure
    #[error("Failed to write {}: {source}", .path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ChunkdlError {
    pub(crate) fn fs(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::FileSystem { path, source }
    }
    /// Indices of the failed chunks, empty for any other error
    pub fn failed_chunks(&self) -> Vec<usize> {
        match self {
            Self::ChunkFetch(errs) => errs.iter().map(|e| e.index).collect(),
            _ => Vec::new(),
        }
    }
}

impl From<ConfigBuilderError> for ChunkdlError {
    fn from(e: ConfigBuilderError) -> Self {
        Self::InvalidConfiguration(e.to_string())
    }
}

/// Failure of a single chunk task
#[derive(Debug, Error)]
#[error("chunk {index} ({range}): {kind}")]
pub struct ChunkError {
    pub index: usize,
    pub range: ByteRange,
    #[source]
    pub kind: ChunkErrorKind,
}

impl ChunkError {
    pub(crate) fn new(range: ByteRange, kind: impl Into<ChunkErrorKind>) -> Self {
        Self {
            index: range.index,
            range,
            kind: kind.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChunkErrorKind {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),
    #[error("expected {expected} bytes, received {received}")]
    LengthMismatch { expected: u64, received: u64 },
    #[error("task aborted: {0}")]
    Aborted(String),
}

struct ChunkErrors<'a>(&'a [ChunkError]);

impl fmt::Display for ChunkErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

/// Alias for Result<T, chunkdl::ChunkdlError>
pub type Result<T> = std::result::Result<T, ChunkdlError>;
