use crate::{
    constants::*,
    error::{Error, Result},
    input::{Input, SliceInput},
};
use half::f16;
use std::convert::TryFrom;

pub(crate) const FLAG_NEGATIVE: u8 = 0x01;
pub(crate) const FLAG_TOO_LARGE: u8 = 0x02;
pub(crate) const FLAG_UNKNOWN_LENGTH: u8 = 0x04;

/// Number of follow bytes implied by an additional-information value.
pub(crate) fn header_bytes(info: u8) -> usize {
    match info {
        VALUE_IN_NEXT_BYTE => 1,
        VALUE_IN_2_BYTES => 2,
        VALUE_IN_4_BYTES => 4,
        VALUE_IN_8_BYTES => 8,
        _ => 0,
    }
}

/// Classified kind of the item under a [`Cursor`](struct.Cursor.html).
///
/// The two integer major types surface as one `Integer` kind; the sign lives
/// in [`Cursor::is_negative`](struct.Cursor.html#method.is_negative). The
/// well-known simple values and the three float widths get kinds of their
/// own. `Invalid` marks an exhausted cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Integer,
    ByteString,
    TextString,
    Array,
    Dict,
    Tag,
    Simple,
    Bool,
    Null,
    Undefined,
    HalfFloat,
    Float,
    Double,
    Invalid,
}

impl Kind {
    pub(crate) fn is_fixed(self) -> bool {
        matches!(
            self,
            Kind::Integer
                | Kind::Tag
                | Kind::Simple
                | Kind::Bool
                | Kind::Null
                | Kind::Undefined
                | Kind::HalfFloat
                | Kind::Float
                | Kind::Double
        )
    }

    /// The initial-byte style type code used by the JSON metadata contract.
    pub(crate) fn type_code(self) -> u8 {
        match self {
            Kind::Integer => TYPE_INTEGER,
            Kind::ByteString => TYPE_BYTES,
            Kind::TextString => TYPE_STR,
            Kind::Array => TYPE_ARRAY,
            Kind::Dict => TYPE_DICT,
            Kind::Tag => TYPE_TAG,
            Kind::Simple => TYPE_SIMPLE,
            Kind::Bool => TYPE_BOOL,
            Kind::Null => TYPE_NULL,
            Kind::Undefined => TYPE_UNDEFINED,
            Kind::HalfFloat => TYPE_FLOAT16,
            Kind::Float => TYPE_FLOAT32,
            Kind::Double => TYPE_FLOAT64,
            Kind::Invalid => 0xff,
        }
    }
}

/// Decoder state positioned at exactly one item.
///
/// Cursors are plain values: copying one yields an independent position over
/// the same parser session, and none of them own any part of the input. All
/// operations on a cursor go through the [`Parser`](struct.Parser.html) it
/// was created from.
#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    pub(crate) offset: usize,
    /// items expected from this position in the enclosing container;
    /// `u32::MAX` means indefinite, stop at the break byte
    pub(crate) remaining: u32,
    /// inline-decoded header value, up to 16 bits
    pub(crate) extra: u16,
    pub(crate) kind: Kind,
    pub(crate) flags: u8,
}

impl Cursor {
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Byte offset of the item's initial byte in the stream.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// True once the enclosing container (or the document) is exhausted.
    pub fn at_end(&self) -> bool {
        self.remaining == 0
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, Kind::Array | Kind::Dict)
    }

    /// Whether the item encodes a negative integer.
    pub fn is_negative(&self) -> bool {
        self.flags & FLAG_NEGATIVE != 0
    }

    /// False for strings, arrays and dicts in indefinite-length encoding.
    pub fn is_length_known(&self) -> bool {
        self.flags & FLAG_UNKNOWN_LENGTH == 0
    }
}

/// Strict-mode switches for the decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParseOptions {
    /// Reject simple values outside the well-known set (booleans, null,
    /// undefined and the float markers).
    pub reject_unknown_simple: bool,
}

/// Parser session over an [`Input`](trait.Input.html).
///
/// The session owns the byte source and caches the first decode error:
/// once a structural error has been detected, every further operation
/// returns it unchanged. Cursors reference the session only by being passed
/// into its methods, which keeps them freely copyable.
///
/// ```
/// use cbor_stream::Parser;
///
/// let (mut parser, mut cursor) = Parser::from_slice(&[0x83, 0x01, 0x02, 0x03])?;
/// let mut items = parser.enter_container(&cursor)?;
/// let mut sum = 0;
/// while !items.at_end() {
///     sum += parser.u64(&items)?;
///     parser.advance_fixed(&mut items)?;
/// }
/// parser.leave_container(&mut cursor, &items)?;
/// parser.finish(&cursor)?;
/// assert_eq!(sum, 6);
/// # Ok::<(), cbor_stream::Error>(())
/// ```
#[derive(Clone)]
pub struct Parser<I> {
    pub(crate) input: I,
    options: ParseOptions,
    error: Option<Error>,
}

impl<'a> Parser<SliceInput<'a>> {
    /// Parse a document held entirely in memory.
    pub fn from_slice(data: &'a [u8]) -> Result<(Self, Cursor)> {
        Self::new(SliceInput::new(data))
    }
}

impl<I: Input> Parser<I> {
    /// Bind a byte source and preparse the first item. The document is one
    /// top-level value; empty input fails immediately.
    pub fn new(input: I) -> Result<(Self, Cursor)> {
        Self::with_options(input, ParseOptions::default())
    }

    pub fn with_options(input: I, options: ParseOptions) -> Result<(Self, Cursor)> {
        let mut parser = Self {
            input,
            options,
            error: None,
        };
        let mut cursor = Cursor {
            offset: 0,
            remaining: 1,
            extra: 0,
            kind: Kind::Invalid,
            flags: 0,
        };
        parser.preparse(&mut cursor)?;
        Ok((parser, cursor))
    }

    /// The first decode error encountered in this session, if any.
    pub fn error(&self) -> Option<Error> {
        self.error
    }

    pub(crate) fn fail<T>(&mut self, e: Error) -> Result<T> {
        if self.error.is_none() {
            self.error = Some(e);
        }
        Err(e)
    }

    pub(crate) fn guard(&self) -> Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub(crate) fn read_u8(&mut self, pos: usize) -> Result<u8> {
        let mut b = [0u8; 1];
        self.input.read_bytes(pos, &mut b)?;
        Ok(b[0])
    }

    pub(crate) fn transfer(&mut self, pos: usize, len: usize) -> Result<&[u8]> {
        self.input.transfer_bytes(pos, len)
    }

    /// Classify the item at the cursor position and decode up to 16 bits of
    /// its header; wider payloads stay on the wire and are fetched lazily.
    fn preparse(&mut self, it: &mut Cursor) -> Result<()> {
        if !self.input.can_read_bytes(it.offset, 1) {
            let e = if it.remaining == u32::MAX {
                Error::BreakMissingAtEof
            } else {
                Error::UnexpectedEof
            };
            it.kind = Kind::Invalid;
            return self.fail(e);
        }
        let initial = self.read_u8(it.offset)?;
        let major = initial >> 5;
        let info = initial & 31;
        it.flags &= !(FLAG_NEGATIVE | FLAG_TOO_LARGE | FLAG_UNKNOWN_LENGTH);
        it.extra = info as u16;

        match major {
            MAJOR_POS => it.kind = Kind::Integer,
            MAJOR_NEG => {
                it.kind = Kind::Integer;
                it.flags |= FLAG_NEGATIVE;
            }
            MAJOR_BYTES | MAJOR_STR | MAJOR_ARRAY | MAJOR_DICT => {
                it.kind = match major {
                    MAJOR_BYTES => Kind::ByteString,
                    MAJOR_STR => Kind::TextString,
                    MAJOR_ARRAY => Kind::Array,
                    _ => Kind::Dict,
                };
                if info == INDEFINITE_SIZE {
                    it.flags |= FLAG_UNKNOWN_LENGTH;
                    return Ok(());
                }
            }
            MAJOR_TAG => it.kind = Kind::Tag,
            _ => match info {
                LIT_FALSE => {
                    it.kind = Kind::Bool;
                    it.extra = 0;
                }
                LIT_TRUE => {
                    it.kind = Kind::Bool;
                    it.extra = 1;
                }
                LIT_NULL => it.kind = Kind::Null,
                LIT_UNDEFINED => it.kind = Kind::Undefined,
                LIT_FLOAT16 => it.kind = Kind::HalfFloat,
                LIT_FLOAT32 => it.kind = Kind::Float,
                LIT_FLOAT64 => it.kind = Kind::Double,
                LIT_SIMPLE => it.kind = Kind::Simple,
                28..=30 => {
                    it.kind = Kind::Invalid;
                    return self.fail(Error::UnknownType);
                }
                INDEFINITE_SIZE => {
                    it.kind = Kind::Invalid;
                    return self.fail(Error::UnexpectedBreak);
                }
                _ => {
                    // unassigned one-byte simple value
                    it.kind = Kind::Simple;
                    if self.options.reject_unknown_simple {
                        return self.fail(Error::UnknownSimpleType);
                    }
                }
            },
        }

        let follow = header_bytes(info);
        if follow == 0 {
            if info >= 28 {
                // 28..=30 on a non-simple major type
                it.kind = Kind::Invalid;
                return self.fail(Error::IllegalNumber);
            }
            return Ok(());
        }
        if !self.input.can_read_bytes(it.offset + 1, follow) {
            it.kind = Kind::Invalid;
            return self.fail(Error::UnexpectedEof);
        }
        match follow {
            1 => it.extra = self.read_u8(it.offset + 1)? as u16,
            2 => {
                let mut b = [0u8; 2];
                self.input.read_bytes(it.offset + 1, &mut b)?;
                it.extra = u16::from_be_bytes(b);
            }
            _ => it.flags |= FLAG_TOO_LARGE,
        }
        if it.kind == Kind::Simple && info == LIT_SIMPLE && it.extra < 32 {
            it.kind = Kind::Invalid;
            return self.fail(Error::IllegalSimple);
        }
        if it.kind == Kind::Simple && self.options.reject_unknown_simple {
            return self.fail(Error::UnknownSimpleType);
        }
        Ok(())
    }

    /// The full header value, reading the 4- or 8-byte follow form from the
    /// wire if the inline 16 bits did not hold it.
    fn header_value(&mut self, it: &Cursor) -> Result<u64> {
        if it.flags & FLAG_TOO_LARGE == 0 {
            return Ok(it.extra as u64);
        }
        let initial = self.read_u8(it.offset)?;
        match initial & 31 {
            VALUE_IN_4_BYTES => {
                let mut b = [0u8; 4];
                self.input.read_bytes(it.offset + 1, &mut b)?;
                Ok(u32::from_be_bytes(b) as u64)
            }
            VALUE_IN_8_BYTES => {
                let mut b = [0u8; 8];
                self.input.read_bytes(it.offset + 1, &mut b)?;
                Ok(u64::from_be_bytes(b))
            }
            _ => self.fail(Error::InternalError),
        }
    }

    /// Account for one consumed item: decrement `remaining` or swallow the
    /// break of an indefinite container, then preparse the next position.
    ///
    /// A tag header does not count against `remaining`; the tag and the item
    /// it wraps form a single value of the enclosing container.
    pub(crate) fn preparse_next(&mut self, it: &mut Cursor) -> Result<()> {
        if it.remaining != u32::MAX {
            if it.kind != Kind::Tag {
                it.remaining -= 1;
                if it.remaining == 0 {
                    it.kind = Kind::Invalid;
                    return Ok(());
                }
            }
        } else {
            if !self.input.can_read_bytes(it.offset, 1) {
                it.kind = Kind::Invalid;
                return self.fail(Error::BreakMissingAtEof);
            }
            if self.read_u8(it.offset)? == STOP_BYTE {
                if it.kind == Kind::Tag {
                    // a break here would leave the tag without its value
                    it.kind = Kind::Invalid;
                    return self.fail(Error::UnexpectedBreak);
                }
                it.offset += 1;
                self.input.advance_bytes(1);
                it.remaining = 0;
                it.kind = Kind::Invalid;
                return Ok(());
            }
        }
        self.preparse(it)
    }

    /// Step over the initial byte plus its follow bytes.
    fn skip_header(&mut self, it: &mut Cursor) -> Result<()> {
        let initial = self.read_u8(it.offset)?;
        let size = 1 + header_bytes(initial & 31);
        it.offset += size;
        self.input.advance_bytes(size);
        Ok(())
    }

    /// Constant-time advance, valid for integers, tags, simple values and
    /// floats. The new position is the old one plus the exact encoded size
    /// of the skipped item.
    pub fn advance_fixed(&mut self, it: &mut Cursor) -> Result<()> {
        self.guard()?;
        if !it.kind.is_fixed() || it.remaining == 0 {
            return Err(Error::IllegalType);
        }
        self.skip_header(it)?;
        self.preparse_next(it)
    }

    /// Advance over any item. Strings are skipped chunk by chunk and
    /// containers are entered and drained recursively, so this runs in O(n)
    /// of the skipped item's encoded size.
    pub fn advance(&mut self, it: &mut Cursor) -> Result<()> {
        self.guard()?;
        match it.kind {
            Kind::ByteString | Kind::TextString => {
                let end = self.skip_string(it)?;
                it.offset = end;
                self.preparse_next(it)
            }
            Kind::Array | Kind::Dict => {
                let mut child = self.enter_container(it)?;
                while !child.at_end() {
                    self.advance(&mut child)?;
                }
                self.leave_container(it, &child)
            }
            Kind::Invalid => Err(Error::IllegalType),
            _ => self.advance_fixed(it),
        }
    }

    /// Walk past a string item without materializing it, returning the
    /// offset just behind it (including the break for the chunked form).
    fn skip_string(&mut self, it: &Cursor) -> Result<usize> {
        let mut walk = crate::strings::StringIter::new(self, it)?;
        while walk.next_span(self)?.is_some() {}
        Ok(walk.end_offset())
    }

    /// Produce a child cursor positioned at the first element of an array
    /// or dict. Dicts count keys and values separately, so the child starts
    /// with twice the declared number of pairs.
    pub fn enter_container(&mut self, it: &Cursor) -> Result<Cursor> {
        self.guard()?;
        if !it.is_container() {
            return Err(Error::IllegalType);
        }
        let mut child = *it;
        if it.flags & FLAG_UNKNOWN_LENGTH != 0 {
            child.remaining = u32::MAX;
        } else {
            let len = self.header_value(it)?;
            let len = if it.kind == Kind::Dict {
                len.checked_mul(2).ok_or(Error::DataTooLarge)?
            } else {
                len
            };
            if len >= u64::from(u32::MAX) {
                return self.fail(Error::DataTooLarge);
            }
            child.remaining = len as u32;
        }
        self.skip_header(&mut child)?;
        if child.remaining == 0 {
            child.kind = Kind::Invalid;
            return Ok(child);
        }
        if child.remaining == u32::MAX {
            if !self.input.can_read_bytes(child.offset, 1) {
                child.kind = Kind::Invalid;
                return self.fail(Error::BreakMissingAtEof);
            }
            if self.read_u8(child.offset)? == STOP_BYTE {
                child.offset += 1;
                self.input.advance_bytes(1);
                child.remaining = 0;
                child.kind = Kind::Invalid;
                return Ok(child);
            }
        }
        self.preparse(&mut child)?;
        Ok(child)
    }

    /// Resume the parent cursor behind a fully consumed container. The
    /// child must be at its end; its position already lies past the
    /// container's last byte (and past the break when indefinite).
    pub fn leave_container(&mut self, it: &mut Cursor, child: &Cursor) -> Result<()> {
        self.guard()?;
        if !child.at_end() {
            return Err(Error::InternalError);
        }
        it.offset = child.offset;
        self.preparse_next(it)
    }

    /// Check that the document ends exactly at the cursor position. Valid
    /// once the top-level cursor is at its end.
    pub fn finish(&mut self, it: &Cursor) -> Result<()> {
        self.guard()?;
        if !it.at_end() {
            return Err(Error::InternalError);
        }
        if self.input.can_read_bytes(it.offset, 1) {
            return self.fail(Error::TrailingGarbage);
        }
        Ok(())
    }

    /// The 64-bit magnitude of an integer item, before sign interpretation.
    /// For negative items this is the encoded value, i.e. `-1 - n` is the
    /// represented number.
    pub fn raw_u64(&mut self, it: &Cursor) -> Result<u64> {
        self.guard()?;
        if it.kind != Kind::Integer {
            return Err(Error::IllegalType);
        }
        self.header_value(it)
    }

    /// Extract an unsigned integer item.
    pub fn u64(&mut self, it: &Cursor) -> Result<u64> {
        self.guard()?;
        if it.kind != Kind::Integer || it.is_negative() {
            return Err(Error::IllegalType);
        }
        self.header_value(it)
    }

    /// Extract an integer item into `i64`, failing with
    /// [`Error::DataTooLarge`](enum.Error.html) when the magnitude does not
    /// fit.
    pub fn i64(&mut self, it: &Cursor) -> Result<i64> {
        self.guard()?;
        if it.kind != Kind::Integer {
            return Err(Error::IllegalType);
        }
        let v = self.header_value(it)?;
        if it.is_negative() {
            if v > i64::MAX as u64 {
                return Err(Error::DataTooLarge);
            }
            Ok(-1 - v as i64)
        } else {
            i64::try_from(v).map_err(|_| Error::DataTooLarge)
        }
    }

    /// The tag number of a tag item. Exactly one item follows it.
    pub fn tag(&mut self, it: &Cursor) -> Result<u64> {
        self.guard()?;
        if it.kind != Kind::Tag {
            return Err(Error::IllegalType);
        }
        self.header_value(it)
    }

    pub fn boolean(&mut self, it: &Cursor) -> Result<bool> {
        self.guard()?;
        if it.kind != Kind::Bool {
            return Err(Error::IllegalType);
        }
        Ok(it.extra != 0)
    }

    /// The code of a simple value (one- or two-byte form).
    pub fn simple(&mut self, it: &Cursor) -> Result<u8> {
        self.guard()?;
        if it.kind != Kind::Simple {
            return Err(Error::IllegalType);
        }
        Ok(it.extra as u8)
    }

    pub fn f16(&mut self, it: &Cursor) -> Result<f16> {
        self.guard()?;
        if it.kind != Kind::HalfFloat {
            return Err(Error::IllegalType);
        }
        Ok(f16::from_bits(it.extra))
    }

    pub fn f32(&mut self, it: &Cursor) -> Result<f32> {
        self.guard()?;
        if it.kind != Kind::Float {
            return Err(Error::IllegalType);
        }
        let v = self.header_value(it)?;
        Ok(f32::from_bits(v as u32))
    }

    pub fn f64(&mut self, it: &Cursor) -> Result<f64> {
        self.guard()?;
        if it.kind != Kind::Double {
            return Err(Error::IllegalType);
        }
        let v = self.header_value(it)?;
        Ok(f64::from_bits(v))
    }

    /// Any of the three float widths, widened to `f64`. The half-float form
    /// maps onto the canonical wider value.
    pub fn float(&mut self, it: &Cursor) -> Result<f64> {
        match it.kind {
            Kind::HalfFloat => Ok(self.f16(it)?.to_f64()),
            Kind::Float => Ok(self.f32(it)? as f64),
            Kind::Double => self.f64(it),
            _ => {
                self.guard()?;
                Err(Error::IllegalType)
            }
        }
    }

    /// Declared element count of an array, `None` for indefinite length.
    pub fn array_length(&mut self, it: &Cursor) -> Result<Option<u64>> {
        self.guard()?;
        if it.kind != Kind::Array {
            return Err(Error::IllegalType);
        }
        if !it.is_length_known() {
            return Ok(None);
        }
        self.header_value(it).map(Some)
    }

    /// Declared pair count of a dict, `None` for indefinite length.
    pub fn dict_length(&mut self, it: &Cursor) -> Result<Option<u64>> {
        self.guard()?;
        if it.kind != Kind::Dict {
            return Err(Error::IllegalType);
        }
        if !it.is_length_known() {
            return Ok(None);
        }
        self.header_value(it).map(Some)
    }
}
