//! Materialization helpers for byte and text strings.
//!
//! A string item is either a single definite-size run of bytes or a sequence
//! of same-major-type chunks terminated by a break. [`StringIter`] walks
//! either form chunk by chunk; everything else here — length calculation,
//! copying into a caller buffer, duplicating into owned storage — composes
//! on top of that walk.

use crate::{
    constants::*,
    decode::{header_bytes, Cursor, Kind, Parser},
    error::{Error, Result},
    input::Input,
};
use smallvec::SmallVec;
use std::convert::TryFrom;

/// Read a full item header at `pos`, returning its value and encoded size.
fn header_at<I: Input>(parser: &mut Parser<I>, pos: usize) -> Result<(u64, usize)> {
    let initial = parser.read_u8(pos)?;
    let info = initial & 31;
    if (28..=31).contains(&info) {
        return parser.fail(Error::IllegalNumber);
    }
    let follow = header_bytes(info);
    if follow == 0 {
        return Ok((info as u64, 1));
    }
    if !parser.input.can_read_bytes(pos + 1, follow) {
        return parser.fail(Error::UnexpectedEof);
    }
    let mut b = [0u8; 8];
    parser.input.read_bytes(pos + 1, &mut b[..follow])?;
    let mut value = 0u64;
    for byte in &b[..follow] {
        value = value << 8 | *byte as u64;
    }
    Ok((value, 1 + follow))
}

enum WalkState {
    /// definite-size string, positioned at the item header
    Single,
    /// chunked string, positioned at the next chunk header
    Chunks,
    Done,
}

/// Chunk walker over one string item.
///
/// Yields each chunk once; a definite-size string is a single chunk, a
/// chunked string yields its fragments in order and stops at the break.
/// The walker does not move the [`Cursor`](struct.Cursor.html) it was
/// created from — advancing past the string is the caller's business (or
/// that of [`Parser::copy_string`](struct.Parser.html#method.copy_string),
/// which does it on success).
///
/// ```
/// use cbor_stream::{Parser, StringIter};
///
/// // (_ h'0102', h'030405')
/// let bytes = [0x5f, 0x42, 0x01, 0x02, 0x43, 0x03, 0x04, 0x05, 0xff];
/// let (mut parser, cursor) = Parser::from_slice(&bytes)?;
/// let mut chunks = StringIter::new(&mut parser, &cursor)?;
/// let mut sizes = Vec::new();
/// while let Some(chunk) = chunks.next(&mut parser)? {
///     sizes.push(chunk.len());
/// }
/// assert_eq!(sizes, [2, 3]);
/// # Ok::<(), cbor_stream::Error>(())
/// ```
pub struct StringIter {
    major: u8,
    pos: usize,
    state: WalkState,
}

impl StringIter {
    pub fn new<I: Input>(parser: &mut Parser<I>, it: &Cursor) -> Result<Self> {
        parser.guard()?;
        let major = match it.kind() {
            Kind::ByteString => MAJOR_BYTES,
            Kind::TextString => MAJOR_STR,
            _ => return Err(Error::IllegalType),
        };
        Ok(if it.is_length_known() {
            Self {
                major,
                pos: it.offset(),
                state: WalkState::Single,
            }
        } else {
            Self {
                major,
                pos: it.offset() + 1,
                state: WalkState::Chunks,
            }
        })
    }

    /// The next chunk as a borrowed slice, or `None` once the string is
    /// exhausted.
    pub fn next<'p, I: Input>(&mut self, parser: &'p mut Parser<I>) -> Result<Option<&'p [u8]>> {
        match self.next_span(parser)? {
            Some((pos, len)) => parser.transfer(pos, len).map(Some),
            None => Ok(None),
        }
    }

    /// The next chunk as a `(position, length)` span without touching the
    /// payload bytes; used for skipping and length calculation.
    pub(crate) fn next_span<I: Input>(
        &mut self,
        parser: &mut Parser<I>,
    ) -> Result<Option<(usize, usize)>> {
        match self.state {
            WalkState::Done => Ok(None),
            WalkState::Single => {
                let span = self.read_chunk(parser)?;
                self.state = WalkState::Done;
                Ok(Some(span))
            }
            WalkState::Chunks => {
                if !parser.input.can_read_bytes(self.pos, 1) {
                    return parser.fail(Error::BreakMissingAtEof);
                }
                let initial = parser.read_u8(self.pos)?;
                if initial == STOP_BYTE {
                    self.pos += 1;
                    self.state = WalkState::Done;
                    return Ok(None);
                }
                if initial >> 5 != self.major || initial & 31 == INDEFINITE_SIZE {
                    return parser.fail(Error::IllegalType);
                }
                self.read_chunk(parser).map(Some)
            }
        }
    }

    fn read_chunk<I: Input>(&mut self, parser: &mut Parser<I>) -> Result<(usize, usize)> {
        let (value, header) = header_at(parser, self.pos)?;
        let len = usize::try_from(value).map_err(|_| Error::DataTooLarge)?;
        let payload = self.pos + header;
        if !parser.input.can_read_bytes(payload, len) {
            return parser.fail(Error::UnexpectedEof);
        }
        self.pos = payload + len;
        Ok((payload, len))
    }

    /// Offset just past the string, including the break byte of the chunked
    /// form. Meaningful once the walk has returned `None`.
    pub(crate) fn end_offset(&self) -> usize {
        self.pos
    }
}

impl<I: Input> Parser<I> {
    /// Total payload length of the string under the cursor.
    ///
    /// O(1) for the definite form, O(chunks) for the chunked form. The
    /// cursor does not move. Summation overflow reports
    /// [`Error::DataTooLarge`](enum.Error.html).
    pub fn string_length(&mut self, it: &Cursor) -> Result<usize> {
        let mut walk = StringIter::new(self, it)?;
        let mut total = 0usize;
        while let Some((_, len)) = walk.next_span(self)? {
            total = total.checked_add(len).ok_or(Error::DataTooLarge)?;
        }
        Ok(total)
    }

    /// Copy the string under the cursor into `dst`.
    ///
    /// Returns the number of payload bytes copied and advances the cursor
    /// past the string, including the break of the chunked form. When the
    /// buffer has room after the payload, one zero byte is written behind it
    /// (not counted in the returned length). A too-small buffer fails with
    /// [`Error::OutOfMemory`](enum.Error.html) and leaves the cursor in
    /// place; use [`string_length`](#method.string_length) for sizing.
    pub fn copy_string(&mut self, it: &mut Cursor, dst: &mut [u8]) -> Result<usize> {
        let mut walk = StringIter::new(self, it)?;
        let mut copied = 0usize;
        while let Some((pos, len)) = walk.next_span(self)? {
            if copied + len > dst.len() {
                return Err(Error::OutOfMemory);
            }
            let chunk = self.transfer(pos, len)?;
            dst[copied..copied + len].copy_from_slice(chunk);
            copied += len;
        }
        if copied < dst.len() {
            dst[copied] = 0;
        }
        let start = it.offset;
        it.offset = walk.end_offset();
        self.input.advance_bytes(it.offset - start);
        self.preparse_next(it)?;
        Ok(copied)
    }

    /// Duplicate the string under the cursor into fresh owned storage and
    /// advance past it. Small strings stay inline in the returned buffer.
    pub fn dup_string(&mut self, it: &mut Cursor) -> Result<SmallVec<[u8; 16]>> {
        let total = self.string_length(it)?;
        let mut out = SmallVec::with_capacity(total);
        let mut walk = StringIter::new(self, it)?;
        while let Some((pos, len)) = walk.next_span(self)? {
            out.extend_from_slice(self.transfer(pos, len)?);
        }
        let start = it.offset;
        it.offset = walk.end_offset();
        self.input.advance_bytes(it.offset - start);
        self.preparse_next(it)?;
        Ok(out)
    }

    /// Compare the text string under the cursor against `expected` without
    /// materializing it. The cursor does not move.
    pub fn text_string_equals(&mut self, it: &Cursor, expected: &str) -> Result<bool> {
        self.guard()?;
        if it.kind() != Kind::TextString {
            return Err(Error::IllegalType);
        }
        let mut rest = expected.as_bytes();
        let mut walk = StringIter::new(self, it)?;
        while let Some((pos, len)) = walk.next_span(self)? {
            let chunk = self.transfer(pos, len)?;
            if rest.len() < chunk.len() || &rest[..chunk.len()] != chunk {
                return Ok(false);
            }
            rest = &rest[chunk.len()..];
        }
        Ok(rest.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Parser;

    #[test]
    fn definite_length_and_copy() {
        let bytes = [0x45, 1, 2, 3, 4, 5];
        let (mut p, mut c) = Parser::from_slice(&bytes).unwrap();
        assert_eq!(p.string_length(&c).unwrap(), 5);

        let mut buf = [0xaau8; 8];
        let copied = p.copy_string(&mut c, &mut buf).unwrap();
        assert_eq!(copied, 5);
        assert_eq!(&buf[..5], &[1, 2, 3, 4, 5]);
        // terminating zero byte, not counted
        assert_eq!(buf[5], 0);
        assert!(c.at_end());
        p.finish(&c).unwrap();
    }

    #[test]
    fn chunked_string() {
        let bytes = [0x5f, 0x42, 1, 2, 0x43, 3, 4, 5, 0xff];
        let (mut p, mut c) = Parser::from_slice(&bytes).unwrap();
        assert_eq!(p.string_length(&c).unwrap(), 5);

        let mut buf = [0u8; 5];
        assert_eq!(p.copy_string(&mut c, &mut buf).unwrap(), 5);
        assert_eq!(buf, [1, 2, 3, 4, 5]);
        assert!(c.at_end());
    }

    #[test]
    fn zero_length_chunk_between_chunks() {
        let bytes = [0x5f, 0x41, 7, 0x40, 0x41, 8, 0xff];
        let (mut p, mut c) = Parser::from_slice(&bytes).unwrap();
        assert_eq!(p.string_length(&c).unwrap(), 2);
        assert_eq!(p.dup_string(&mut c).unwrap().as_slice(), &[7, 8]);
    }

    #[test]
    fn empty_chunked_string() {
        let bytes = [0x7f, 0xff];
        let (mut p, mut c) = Parser::from_slice(&bytes).unwrap();
        assert_eq!(p.string_length(&c).unwrap(), 0);
        let mut buf = [0u8; 1];
        assert_eq!(p.copy_string(&mut c, &mut buf).unwrap(), 0);
        assert!(c.at_end());
    }

    #[test]
    fn wrong_chunk_type() {
        // text chunk inside a byte string
        let bytes = [0x5f, 0x61, b'a', 0xff];
        let (mut p, c) = Parser::from_slice(&bytes).unwrap();
        assert_eq!(p.string_length(&c), Err(Error::IllegalType));
        // and the session is poisoned
        assert_eq!(p.error(), Some(Error::IllegalType));
    }

    #[test]
    fn buffer_too_small() {
        let bytes = [0x43, 1, 2, 3];
        let (mut p, mut c) = Parser::from_slice(&bytes).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(p.copy_string(&mut c, &mut buf), Err(Error::OutOfMemory));
        // cursor still on the string, a big enough buffer succeeds
        let mut buf = [0u8; 3];
        assert_eq!(p.copy_string(&mut c, &mut buf).unwrap(), 3);
    }

    #[test]
    fn equals_across_chunks() {
        let bytes = [0x7f, 0x65, b's', b't', b'r', b'e', b'a', 0x64, b'm', b'i', b'n', b'g', 0xff];
        let (mut p, c) = Parser::from_slice(&bytes).unwrap();
        assert_eq!(p.text_string_equals(&c, "streaming").unwrap(), true);
        assert_eq!(p.text_string_equals(&c, "streamin").unwrap(), false);
        assert_eq!(p.text_string_equals(&c, "streaming!").unwrap(), false);
    }

    #[test]
    fn missing_break() {
        let bytes = [0x5f, 0x41, 7];
        let (mut p, c) = Parser::from_slice(&bytes).unwrap();
        assert_eq!(p.string_length(&c), Err(Error::BreakMissingAtEof));
    }
}
