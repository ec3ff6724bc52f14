//! Error types for JPEG 2000 decoding.

use core::fmt;

/// The error type for JPEG 2000 decoding operations.
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

/// The kind of a JPEG 2000 decoding error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Errors related to JP2 file format and box parsing.
    Format(FormatError),
    /// Errors related to codestream markers.
    Marker(MarkerError),
    /// Errors related to image dimensions and validation.
    Validation(ValidationError),
    /// Errors related to packet and code-block decoding.
    Decoding(DecodingError),
}

/// Errors related to JP2 file format and box parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// Invalid JP2 signature.
    BadMagic,
    /// Invalid or malformed JP2 box.
    InvalidBox,
    /// Missing codestream data.
    MissingCodestream,
    /// Unexpected end of data.
    Truncated,
}

/// Errors related to codestream markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerError {
    /// Invalid marker encountered.
    Invalid,
    /// Expected a specific marker.
    Expected(&'static str),
    /// Missing a required marker.
    Missing(&'static str),
    /// Failed to read or parse a marker segment.
    ParseFailure(&'static str),
    /// A feature signalled by a marker is not implemented.
    Unsupported(&'static str),
}

/// Errors related to image dimensions and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid image dimensions.
    InvalidDimensions,
    /// Image parameters exceed supported limits.
    LimitExceeded(&'static str),
    /// Invalid progression order.
    InvalidProgressionOrder,
    /// Invalid transformation type.
    InvalidTransformation,
    /// Invalid quantization parameters.
    InvalidQuantization,
    /// Invalid tile index or tile layout.
    InvalidTile,
}

/// Errors related to packet and code-block decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodingError {
    /// A packet header could not be parsed.
    MalformedPacket,
    /// A tag tree read was out of bounds or inconsistent.
    BadTagTree,
    /// A code-block declared more coding passes than its bit-planes allow.
    TooManyCodingPasses,
    /// A code-block body ran past the end of the packet.
    TierBoundaryMismatch,
    /// Unexpected end of data.
    UnexpectedEof,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(e) => write!(f, "{e}"),
            Self::Marker(e) => write!(f, "{e}"),
            Self::Validation(e) => write!(f, "{e}"),
            Self::Decoding(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic => write!(f, "invalid JP2 or codestream signature"),
            Self::InvalidBox => write!(f, "invalid JP2 box"),
            Self::MissingCodestream => write!(f, "missing codestream data"),
            Self::Truncated => write!(f, "unexpected end of data"),
        }
    }
}

impl fmt::Display for MarkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => write!(f, "invalid marker"),
            Self::Expected(marker) => write!(f, "expected {marker} marker"),
            Self::Missing(marker) => write!(f, "missing {marker} marker"),
            Self::ParseFailure(marker) => write!(f, "failed to parse {marker} marker"),
            Self::Unsupported(what) => write!(f, "unsupported feature: {what}"),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions => write!(f, "invalid image dimensions"),
            Self::LimitExceeded(what) => write!(f, "{what} exceeds supported limits"),
            Self::InvalidProgressionOrder => write!(f, "invalid progression order"),
            Self::InvalidTransformation => write!(f, "invalid transformation type"),
            Self::InvalidQuantization => write!(f, "invalid quantization parameters"),
            Self::InvalidTile => write!(f, "invalid tile layout"),
        }
    }
}

impl fmt::Display for DecodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedPacket => write!(f, "malformed packet header"),
            Self::BadTagTree => write!(f, "inconsistent tag tree"),
            Self::TooManyCodingPasses => {
                write!(f, "code-block contains too many coding passes")
            }
            Self::TierBoundaryMismatch => {
                write!(f, "code-block body ran past the end of its packet")
            }
            Self::UnexpectedEof => write!(f, "unexpected end of data"),
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

impl From<ValidationError> for ErrorKind {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<DecodingError> for ErrorKind {
    fn from(e: DecodingError) -> Self {
        Self::Decoding(e)
    }
}

/// Result type for JPEG 2000 decoding operations.
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
