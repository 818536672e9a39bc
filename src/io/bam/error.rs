//! BAM record decode error types.
//!
//! Structured error variants for the binary record decoder, so failures can
//! be matched on precisely and carry the offset and field context needed to
//! locate a bad record.

use std::{error, fmt, io};

/// Errors that can occur while decoding BAM binary structures.
#[derive(Debug)]
pub enum BamDecodeError {
    /// I/O error occurred during reading
    Io(io::Error),

    /// Invalid reference sequence ID (must be -1 or >= 0)
    InvalidReferenceId {
        /// The invalid reference ID value
        value: i32,
        /// Which field had the invalid ID ("read" or "mate")
        field: &'static str,
    },

    /// Invalid read name length (must be >= 1)
    InvalidReadNameLength {
        /// The invalid length value
        length: u8,
        /// Offset in the record where the error occurred
        offset: usize,
    },

    /// Missing NUL terminator in a string field
    MissingNulTerminator {
        /// Which field was missing the terminator
        field: &'static str,
        /// Offset in the record where the error occurred
        offset: usize,
    },

    /// Invalid UTF-8 in a string field
    InvalidUtf8 {
        /// Which field had invalid UTF-8
        field: &'static str,
        /// The underlying UTF-8 error
        source: std::string::FromUtf8Error,
    },

    /// Invalid optional tag type code
    InvalidTagType {
        /// The tag name
        tag: [u8; 2],
        /// The invalid type code
        type_code: u8,
    },

    /// Duplicate optional tag (spec violation)
    DuplicateTag {
        /// The duplicate tag name
        tag: [u8; 2],
    },

    /// Invalid array tag subtype
    InvalidArraySubtype {
        /// The tag name
        tag: [u8; 2],
        /// The invalid subtype code
        subtype: u8,
    },

    /// CIGAR operation count too large for the record
    CigarCountOverflow {
        /// The count value
        count: usize,
    },

    /// Invalid CIGAR operation code (must be 0-8)
    InvalidCigarOp {
        /// The invalid operation code
        value: u32,
    },

    /// Negative sequence length
    NegativeSequenceLength {
        /// The negative length value
        length: i32,
    },

    /// A 4-bit code outside the configured sequence encoding's alphabet
    SymbolOutOfAlphabet {
        /// The rejected 4-bit code
        code: u8,
        /// Base index within the sequence
        position: usize,
        /// Name of the encoding that rejected it
        encoding: &'static str,
    },

    /// Insufficient data for parsing
    UnexpectedEof {
        /// What was being parsed
        context: &'static str,
        /// Expected number of bytes
        expected: usize,
        /// Actual number of bytes available
        actual: usize,
    },

    /// Invalid BAM magic bytes
    InvalidMagic {
        /// The actual bytes found
        actual: [u8; 4],
    },

    /// Generic invalid data error with context
    InvalidData {
        /// Description of what was invalid
        message: String,
    },
}

impl error::Error for BamDecodeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::InvalidUtf8 { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for BamDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),

            Self::InvalidReferenceId { value, field } => {
                write!(
                    f,
                    "Invalid {} reference ID: {} (must be -1 or >= 0)",
                    field, value
                )
            }

            Self::InvalidReadNameLength { length, offset } => {
                write!(
                    f,
                    "Invalid read name length at offset {}: {} (must be >= 1)",
                    offset, length
                )
            }

            Self::MissingNulTerminator { field, offset } => {
                write!(f, "Missing NUL terminator in {} at offset {}", field, offset)
            }

            Self::InvalidUtf8 { field, source } => {
                write!(f, "Invalid UTF-8 in {}: {}", field, source)
            }

            Self::InvalidTagType { tag, type_code } => {
                write!(
                    f,
                    "Invalid type code {:?} for tag {}{}",
                    *type_code as char, tag[0] as char, tag[1] as char
                )
            }

            Self::DuplicateTag { tag } => {
                write!(f, "Duplicate tag: {}{}", tag[0] as char, tag[1] as char)
            }

            Self::InvalidArraySubtype { tag, subtype } => {
                write!(
                    f,
                    "Invalid array subtype {:?} for tag {}{}",
                    *subtype as char, tag[0] as char, tag[1] as char
                )
            }

            Self::CigarCountOverflow { count } => {
                write!(f, "CIGAR operation count too large: {}", count)
            }

            Self::InvalidCigarOp { value } => {
                write!(f, "Invalid CIGAR operation code: {}", value)
            }

            Self::NegativeSequenceLength { length } => {
                write!(f, "Invalid negative sequence length: {}", length)
            }

            Self::SymbolOutOfAlphabet {
                code,
                position,
                encoding,
            } => {
                write!(
                    f,
                    "Encoded value {} at base {} is not in the {} alphabet",
                    code, position, encoding
                )
            }

            Self::UnexpectedEof {
                context,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Unexpected end of data while parsing {}: expected {} bytes, got {}",
                    context, expected, actual
                )
            }

            Self::InvalidMagic { actual } => {
                write!(
                    f,
                    "Invalid BAM magic bytes: expected [BAM\\x01], got {:?}",
                    actual
                )
            }

            Self::InvalidData { message } => {
                write!(f, "Invalid data: {}", message)
            }
        }
    }
}

impl From<io::Error> for BamDecodeError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<BamDecodeError> for io::Error {
    fn from(e: BamDecodeError) -> Self {
        match e {
            BamDecodeError::Io(io_err) => io_err,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
