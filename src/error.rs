use std::fmt::{Debug, Display};

/// Outcome of every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The complete error surface of the codec.
///
/// Structural errors are raised unconditionally while decoding; the
/// `UnknownSimpleType`, `UnknownTag`, `InappropriateTagForType` and
/// `DuplicateObjectKeys` variants belong to strict-mode validation profiles
/// layered on top of the decoder. `Json*` variants are raised only by the
/// JSON converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// the input ended before the current item was complete
    UnexpectedEof,
    /// the input ended inside an indefinite-length item, before its break byte
    BreakMissingAtEof,
    /// a break byte appeared where no indefinite-length container is open
    UnexpectedBreak,
    /// reserved bits in a major-type-7 initial byte
    UnknownType,
    /// an item of the wrong major type, e.g. a non-string chunk inside a chunked string
    IllegalType,
    /// lower five bits of an item header were 28..=30
    IllegalNumber,
    /// a simple value below 32 encoded in the two-byte form
    IllegalSimple,
    /// extra bytes were left after the top-level item
    TrailingGarbage,
    /// a simple value outside the well-known set (strict mode)
    UnknownSimpleType,
    /// a tag number not permitted by the active strict profile
    UnknownTag,
    /// a tag applied to an item of the wrong type (strict mode)
    InappropriateTagForType,
    /// a map contained the same key twice (strict mode)
    DuplicateObjectKeys,
    /// a text string (or chunk thereof) contained invalid UTF-8
    InvalidUtf8TextString,
    /// the output buffer is too small, or an allocation failed
    OutOfMemory,
    /// an encoded length exceeds what this host can address
    DataTooLarge,
    /// the underlying byte source or output sink failed
    Io,
    /// a map key was not a text string and key stringification was not requested
    JsonObjectKeyNotString,
    /// nesting deeper than the configured conversion limit
    JsonNestingTooDeep,
    /// the conversion needs a facility not available in this build
    JsonNotImplemented,
    /// invariant violation inside the codec itself
    InternalError,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Error::UnexpectedEof => "unexpected end of input",
            Error::BreakMissingAtEof => "break missing at end of input",
            Error::UnexpectedBreak => "unexpected break byte",
            Error::UnknownType => "unknown type in major type 7",
            Error::IllegalType => "item of illegal type here",
            Error::IllegalNumber => "reserved additional-information value",
            Error::IllegalSimple => "illegal encoding of simple value",
            Error::TrailingGarbage => "garbage after the end of the document",
            Error::UnknownSimpleType => "unknown simple value",
            Error::UnknownTag => "unknown tag",
            Error::InappropriateTagForType => "inappropriate tag for this type",
            Error::DuplicateObjectKeys => "duplicate keys in map",
            Error::InvalidUtf8TextString => "invalid UTF-8 in text string",
            Error::OutOfMemory => "out of memory",
            Error::DataTooLarge => "data is larger than this host can handle",
            Error::Io => "input/output error",
            Error::JsonObjectKeyNotString => "conversion to JSON requires string map keys",
            Error::JsonNestingTooDeep => "conversion to JSON exceeded nesting limit",
            Error::JsonNotImplemented => "conversion to JSON feature not implemented",
            Error::InternalError => "internal error",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(_: std::io::Error) -> Self {
        Error::Io
    }
}

impl From<std::fmt::Error> for Error {
    fn from(_: std::fmt::Error) -> Self {
        Error::Io
    }
}
