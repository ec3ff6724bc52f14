//! Error types for JPEG decoding.

use core::fmt;

/// The error type for JPEG decoding operations.
///
/// Every error records the byte offset (into the original input) at which the
/// problem was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// The byte offset at which the error was detected.
    pub offset: usize,
}

impl DecodeError {
    pub(crate) fn new(kind: impl Into<ErrorKind>, offset: usize) -> Self {
        Self {
            kind: kind.into(),
            offset,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at byte {})", self.kind, self.offset)
    }
}

impl std::error::Error for DecodeError {}

/// The kind of a JPEG decoding error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Errors related to the overall stream structure.
    Format(FormatError),
    /// Errors related to marker segments.
    Marker(MarkerError),
    /// Errors related to Huffman and quantization tables.
    Table(TableError),
    /// Errors related to entropy-coded scan data.
    Scan(ScanError),
}

/// Errors related to the overall stream structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// The data does not start with an SOI marker.
    BadMagic,
    /// The data ended before the decoder was done.
    Truncated,
}

/// Errors related to marker segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerError {
    /// A marker segment length was inconsistent with its content.
    BadLength,
    /// An unknown marker without a length was encountered.
    Unexpected(u8),
    /// The frame type is not baseline sequential.
    UnsupportedSof(u8),
    /// A frame parameter is outside the supported range.
    BadFrameHeader,
    /// A scan header referenced an unknown component or table.
    BadScanHeader,
    /// A scan appeared before the frame header.
    MissingSof,
}

/// Errors related to Huffman and quantization tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// A Huffman specification does not describe a valid prefix code.
    MalformedHuffmanTable,
    /// A scan referenced a Huffman table slot that was never defined.
    MissingHuffmanTable,
    /// A component referenced a quantization table slot that was never
    /// defined.
    MissingQuantTable,
    /// A quantization table used an invalid element precision.
    BadQuantPrecision,
}

/// Errors related to entropy-coded scan data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanError {
    /// No Huffman code matched the next 16 bits of the scan.
    HuffmanCodeNotFound,
    /// The entropy-coded data ended early.
    TruncatedScan,
    /// A coefficient ran past the end of its block.
    BadCoefficientRun,
    /// The decoder lost sync at a restart interval and could not recover.
    ResyncFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(e) => write!(f, "{e}"),
            Self::Marker(e) => write!(f, "{e}"),
            Self::Table(e) => write!(f, "{e}"),
            Self::Scan(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic => write!(f, "missing SOI marker"),
            Self::Truncated => write!(f, "unexpected end of data"),
        }
    }
}

impl fmt::Display for MarkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLength => write!(f, "invalid marker segment length"),
            Self::Unexpected(m) => write!(f, "unexpected marker 0xFF{m:02X}"),
            Self::UnsupportedSof(m) => write!(f, "unsupported frame type 0xFF{m:02X}"),
            Self::BadFrameHeader => write!(f, "invalid frame header"),
            Self::BadScanHeader => write!(f, "invalid scan header"),
            Self::MissingSof => write!(f, "scan appeared before frame header"),
        }
    }
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedHuffmanTable => write!(f, "malformed Huffman table"),
            Self::MissingHuffmanTable => write!(f, "missing Huffman table"),
            Self::MissingQuantTable => write!(f, "missing quantization table"),
            Self::BadQuantPrecision => write!(f, "invalid quantization table precision"),
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HuffmanCodeNotFound => write!(f, "no Huffman code matches the scan data"),
            Self::TruncatedScan => write!(f, "entropy-coded data ended early"),
            Self::BadCoefficientRun => write!(f, "coefficient run past end of block"),
            Self::ResyncFailed => write!(f, "failed to resynchronize at restart marker"),
        }
    }
}

impl From<FormatError> for ErrorKind {
    fn from(e: FormatError) -> Self {
        Self::Format(e)
    }
}

impl From<MarkerError> for ErrorKind {
    fn from(e: MarkerError) -> Self {
        Self::Marker(e)
    }
}

impl From<TableError> for ErrorKind {
    fn from(e: TableError) -> Self {
        Self::Table(e)
    }
}

impl From<ScanError> for ErrorKind {
    fn from(e: ScanError) -> Self {
        Self::Scan(e)
    }
}

/// Result type for JPEG decoding operations.
pub type Result<T> = core::result::Result<T, DecodeError>;

macro_rules! bail {
    ($kind:expr, $offset:expr) => {
        return Err(crate::error::DecodeError::new($kind, $offset))
    };
}

macro_rules! err {
    ($kind:expr, $offset:expr) => {
        Err(crate::error::DecodeError::new($kind, $offset))
    };
}

pub(crate) use bail;
pub(crate) use err;
