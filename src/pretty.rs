//! Diagnostic notation output (RFC 7049 §6).
//!
//! The output is meant for humans; it is not parseable by this crate and
//! not stable across versions.

use crate::{
    decode::{Cursor, Kind, Parser},
    error::{Error, Result},
    input::Input,
    strings::StringIter,
};
use std::fmt::Write;

/// Switches for the diagnostic formatter.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrettyOptions {
    /// Show the chunks of an indefinite-length string individually as
    /// `(_ h'..', h'..')` instead of merging them.
    pub show_fragments: bool,
    /// Use the numeric encoding indicators `_1`/`_2` from RFC 7049 §6
    /// instead of the textual `f16`/`f` suffixes.
    pub numeric_indicators: bool,
}

/// Format the item under the cursor and advance past it.
///
/// Works for any successfully decodable item; the only conversion failure of
/// its own making is [`Error::InvalidUtf8TextString`](enum.Error.html).
/// Failures of the output sink surface as [`Error::Io`](enum.Error.html).
pub fn write_pretty<I: Input, W: Write>(
    parser: &mut Parser<I>,
    it: &mut Cursor,
    out: &mut W,
    options: PrettyOptions,
) -> Result<()> {
    item_to_pretty(parser, it, out, options)
}

/// Pretty-print a whole in-memory document.
///
/// ```
/// assert_eq!(cbor_stream::pretty::to_string(&[0x83, 1, 2, 3])?, "[1, 2, 3]");
/// # Ok::<(), cbor_stream::Error>(())
/// ```
pub fn to_string(bytes: &[u8]) -> Result<String> {
    let (mut parser, mut cursor) = Parser::from_slice(bytes)?;
    let mut out = String::new();
    write_pretty(&mut parser, &mut cursor, &mut out, PrettyOptions::default())?;
    parser.finish(&cursor)?;
    Ok(out)
}

fn container_to_pretty<I: Input, W: Write>(
    parser: &mut Parser<I>,
    it: &mut Cursor,
    out: &mut W,
    dict: bool,
    options: PrettyOptions,
) -> Result<()> {
    let mut first = true;
    while !it.at_end() {
        if !first {
            out.write_str(", ")?;
        }
        first = false;
        item_to_pretty(parser, it, out, options)?;
        if dict {
            out.write_str(": ")?;
            item_to_pretty(parser, it, out, options)?;
        }
    }
    Ok(())
}

fn item_to_pretty<I: Input, W: Write>(
    parser: &mut Parser<I>,
    it: &mut Cursor,
    out: &mut W,
    options: PrettyOptions,
) -> Result<()> {
    match it.kind() {
        Kind::Array | Kind::Dict => {
            let dict = it.kind() == Kind::Dict;
            out.write_char(if dict { '{' } else { '[' })?;
            if !it.is_length_known() {
                out.write_str("_ ")?;
            }
            let mut child = parser.enter_container(it)?;
            container_to_pretty(parser, &mut child, out, dict, options)?;
            parser.leave_container(it, &child)?;
            out.write_char(if dict { '}' } else { ']' })?;
            Ok(())
        }
        Kind::Integer => {
            let v = parser.raw_u64(it)?;
            if it.is_negative() {
                // the represented number is -1 - v; the magnitude 2^64 does
                // not fit u64, so spell that single case out
                match v.checked_add(1) {
                    Some(m) => write!(out, "-{}", m)?,
                    None => out.write_str("-18446744073709551616")?,
                }
            } else {
                write!(out, "{}", v)?;
            }
            parser.advance_fixed(it)
        }
        Kind::ByteString | Kind::TextString => string_to_pretty(parser, it, out, options),
        Kind::Tag => {
            let tag = parser.tag(it)?;
            write!(out, "{}(", tag)?;
            parser.advance_fixed(it)?;
            item_to_pretty(parser, it, out, options)?;
            out.write_char(')')?;
            Ok(())
        }
        Kind::Simple => {
            write!(out, "simple({})", parser.simple(it)?)?;
            parser.advance_fixed(it)
        }
        Kind::Bool => {
            out.write_str(if parser.boolean(it)? { "true" } else { "false" })?;
            parser.advance_fixed(it)
        }
        Kind::Null => {
            out.write_str("null")?;
            parser.advance_fixed(it)
        }
        Kind::Undefined => {
            out.write_str("undefined")?;
            parser.advance_fixed(it)
        }
        Kind::HalfFloat | Kind::Float | Kind::Double => {
            let suffix = match it.kind() {
                Kind::HalfFloat => {
                    if options.numeric_indicators {
                        "_1"
                    } else {
                        "f16"
                    }
                }
                Kind::Float => {
                    if options.numeric_indicators {
                        "_2"
                    } else {
                        "f"
                    }
                }
                _ => "",
            };
            let value = parser.float(it)?;
            write_float(out, value, suffix)?;
            parser.advance_fixed(it)
        }
        Kind::Invalid => Err(Error::UnknownType),
    }
}

fn string_to_pretty<I: Input, W: Write>(
    parser: &mut Parser<I>,
    it: &mut Cursor,
    out: &mut W,
    options: PrettyOptions,
) -> Result<()> {
    let text = it.kind() == Kind::TextString;
    let fragments = options.show_fragments && !it.is_length_known();
    let open = if text { "\"" } else { "h'" };
    let close = if text { '"' } else { '\'' };

    if fragments {
        out.write_str("(_ ")?;
    } else {
        out.write_str(open)?;
    }
    let mut first = true;
    let mut walk = StringIter::new(parser, it)?;
    while let Some((pos, len)) = walk.next_span(parser)? {
        if fragments {
            if !first {
                out.write_str(", ")?;
            }
            out.write_str(open)?;
        }
        first = false;
        let chunk = parser.transfer(pos, len)?;
        if text {
            let chunk = std::str::from_utf8(chunk).map_err(|_| Error::InvalidUtf8TextString)?;
            escape_text(chunk, out)?;
        } else {
            for byte in chunk {
                write!(out, "{:02x}", byte)?;
            }
        }
        if fragments {
            out.write_char(close)?;
        }
    }
    if fragments {
        out.write_char(')')?;
    } else {
        out.write_char(close)?;
    }
    let start = it.offset();
    it.offset = walk.end_offset();
    parser.input.advance_bytes(it.offset - start);
    parser.preparse_next(it)
}

/// C-style escaping with `\uXXXX` for everything beyond printable ASCII,
/// using surrogate pairs above U+FFFF.
fn escape_text<W: Write>(s: &str, out: &mut W) -> Result<()> {
    for c in s.chars() {
        match c {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '\u{8}' => out.write_str("\\b")?,
            '\u{c}' => out.write_str("\\f")?,
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '\t' => out.write_str("\\t")?,
            ' '..='~' => out.write_char(c)?,
            c if (c as u32) < 0x10000 => write!(out, "\\u{:04X}", c as u32)?,
            c => {
                let v = c as u32 - 0x10000;
                write!(out, "\\u{:04X}\\u{:04X}", 0xd800 + (v >> 10), 0xdc00 + (v & 0x3ff))?;
            }
        }
    }
    Ok(())
}

/// Floats print as a decimal integer with a trailing dot when the value is
/// integral and its magnitude fits 64 bits, otherwise in full precision.
/// NaN and the infinities come out as the bare words with no suffix.
fn write_float<W: Write>(out: &mut W, value: f64, suffix: &str) -> Result<()> {
    if value.is_nan() {
        out.write_str("nan")?;
        return Ok(());
    }
    if value.is_infinite() {
        out.write_str(if value < 0.0 { "-inf" } else { "inf" })?;
        return Ok(());
    }
    let magnitude = value.abs();
    if magnitude == magnitude.trunc() && magnitude < 18446744073709551616.0 {
        let sign = if value.is_sign_negative() { "-" } else { "" };
        write!(out, "{}{}.{}", sign, magnitude as u64, suffix)?;
        return Ok(());
    }
    if magnitude < 1e-6 || magnitude > 1e16 {
        write!(out, "{:e}{}", value, suffix)?;
    } else {
        write!(out, "{}{}", value, suffix)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pretty_with(bytes: &[u8], options: PrettyOptions) -> Result<String> {
        let (mut parser, mut cursor) = Parser::from_slice(bytes)?;
        let mut out = String::new();
        write_pretty(&mut parser, &mut cursor, &mut out, options)?;
        Ok(out)
    }

    #[test]
    fn fragments_shown_on_request() {
        let bytes = [0x5f, 0x42, 1, 2, 0x43, 3, 4, 5, 0xff];
        assert_eq!(to_string(&bytes).unwrap(), "h'0102030405'");
        let opts = PrettyOptions {
            show_fragments: true,
            ..Default::default()
        };
        assert_eq!(pretty_with(&bytes, opts).unwrap(), "(_ h'0102', h'030405')");
    }

    #[test]
    fn numeric_indicators() {
        let opts = PrettyOptions {
            numeric_indicators: true,
            ..Default::default()
        };
        assert_eq!(pretty_with(&[0xf9, 0x3c, 0x00], opts).unwrap(), "1._1");
        assert_eq!(
            pretty_with(&[0xfa, 0x3f, 0xc0, 0x00, 0x00], opts).unwrap(),
            "1.5_2"
        );
        assert_eq!(pretty_with(&[0xf9, 0x3c, 0x00], PrettyOptions::default()).unwrap(), "1.f16");
    }

    #[test]
    fn escapes() {
        // "a\"b\\c\nd"
        let bytes = [0x67, b'a', b'"', b'b', b'\\', b'c', b'\n', b'd'];
        assert_eq!(to_string(&bytes).unwrap(), r#""a\"b\\c\nd""#);
        // U+00FC and U+10151 (surrogate pair)
        let bytes = [0x66, 0xc3, 0xbc, 0xf0, 0x90, 0x85, 0x91];
        assert_eq!(to_string(&bytes).unwrap(), "\"\\u00FC\\uD800\\uDD51\"");
    }

    #[test]
    fn invalid_utf8() {
        let bytes = [0x62, 0xc3, 0x28];
        assert_eq!(to_string(&bytes), Err(Error::InvalidUtf8TextString));
    }
}
