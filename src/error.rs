//! Error types for bampage

use thiserror::Error;

/// Result type alias for bampage operations
pub type Result<T> = std::result::Result<T, BampageError>;

/// Error types that can occur in bampage
#[derive(Debug, Error)]
pub enum BampageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed BAM binary structure
    #[error("Invalid BAM format in {file} at offset {offset:#x}: {msg}")]
    InvalidFormat {
        /// File being parsed
        file: String,
        /// Virtual file offset where the error occurred
        offset: u64,
        /// Error message
        msg: String,
    },

    /// Malformed SAM text
    #[error("Invalid SAM format at line {line}: {msg}")]
    InvalidSamFormat {
        /// Line number where error occurred
        line: usize,
        /// Error message
        msg: String,
    },

    /// A range query was requested but no usable region index exists
    #[error("No region index available for {file}: {msg}")]
    IndexUnavailable {
        /// BAM file the query targeted
        file: String,
        /// Why the index could not be used
        msg: String,
    },

    /// Compression/decompression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Invalid range or region
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Mutation attempted on a read-only virtual collection
    #[error("Unsupported operation on read-only virtual sequence list: {0}")]
    UnsupportedOperation(&'static str),

    /// Access to a virtual sequence after its owning parser released its file handle
    #[error("Parser has been closed; virtual sequence data is no longer readable")]
    ResourceDisposed,
}
