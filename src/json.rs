//! Lossy CBOR→JSON conversion.
//!
//! The output is minified. JSON cannot carry everything CBOR can, so the
//! mapping documents its losses: numbers beyond 2⁵³ lose precision, NaN and
//! the infinities become `null`, byte strings become base-N text, simple
//! values and `undefined` become marker strings, and tags are dropped unless
//! one of the conversion options keeps them. With
//! [`JsonOptions::add_metadata`](struct.JsonOptions.html) every such loss
//! leaves a `$cbor` companion member from which the original form can be
//! reconstructed.

use crate::{
    constants::*,
    decode::{Cursor, Kind, Parser},
    error::{Error, Result},
    input::Input,
    pretty::{write_pretty, PrettyOptions},
    strings::StringIter,
};
use std::fmt::Write;

/// Switches for the JSON converter.
#[derive(Debug, Clone, Copy)]
pub struct JsonOptions {
    /// Emit `$cbor` / `$keycbordump` companion members recording what the
    /// conversion lost.
    pub add_metadata: bool,
    /// Render tags as `{"tag<n>": value}` objects instead of dropping them.
    pub tags_to_objects: bool,
    /// Render non-text map keys through the diagnostic printer instead of
    /// failing with `JsonObjectKeyNotString`.
    pub stringify_keys: bool,
    /// Force base64url output for every byte string, ignoring the
    /// formatting tags 22 and 23 and the negative-bignum prefix.
    pub byte_strings_to_base64url: bool,
    /// Maximum container/tag nesting before `JsonNestingTooDeep`.
    pub max_nesting: usize,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            add_metadata: false,
            tags_to_objects: false,
            stringify_keys: false,
            byte_strings_to_base64url: false,
            max_nesting: 1024,
        }
    }
}

/// What the conversion of one value lost, for the metadata members.
#[derive(Default)]
struct Status {
    /// innermost tag of a dropped tag chain
    tag: Option<u64>,
    not_native: bool,
    precision_lost: bool,
    was_nan: bool,
    was_infinite: bool,
    was_negative: bool,
    original: u64,
    type_code: u8,
}

impl Status {
    fn clear(&mut self) {
        *self = Self::default();
    }

    fn lossy(&self) -> bool {
        self.not_native
            || self.precision_lost
            || self.was_nan
            || self.was_infinite
            || self.was_negative
    }

    fn any(&self) -> bool {
        self.tag.is_some() || self.lossy()
    }
}

/// Convert the item under the cursor and advance past it.
pub fn write_json<I: Input, W: Write>(
    parser: &mut Parser<I>,
    it: &mut Cursor,
    out: &mut W,
    options: JsonOptions,
) -> Result<()> {
    let mut status = Status::default();
    value_to_json(parser, it, out, options, options.max_nesting, &mut status)
}

/// Convert a whole in-memory document.
///
/// ```
/// use cbor_stream::json::{self, JsonOptions};
///
/// let cbor = [0xa1, 0x63, b'f', b'o', b'o', 0x82, 0x01, 0xf5];
/// assert_eq!(json::to_string(&cbor, JsonOptions::default())?, r#"{"foo":[1,true]}"#);
/// # Ok::<(), cbor_stream::Error>(())
/// ```
pub fn to_string(bytes: &[u8], options: JsonOptions) -> Result<String> {
    let (mut parser, mut cursor) = Parser::from_slice(bytes)?;
    let mut out = String::new();
    write_json(&mut parser, &mut cursor, &mut out, options)?;
    parser.finish(&cursor)?;
    Ok(out)
}

fn value_to_json<I: Input, W: Write>(
    parser: &mut Parser<I>,
    it: &mut Cursor,
    out: &mut W,
    options: JsonOptions,
    depth: usize,
    status: &mut Status,
) -> Result<()> {
    if depth == 0 {
        return Err(Error::JsonNestingTooDeep);
    }
    status.clear();
    status.type_code = it.kind().type_code();

    match it.kind() {
        Kind::Array => {
            let mut child = parser.enter_container(it)?;
            out.write_char('[')?;
            let mut first = true;
            while !child.at_end() {
                if !first {
                    out.write_char(',')?;
                }
                first = false;
                value_to_json(parser, &mut child, out, options, depth - 1, status)?;
            }
            out.write_char(']')?;
            parser.leave_container(it, &child)?;
            status.clear();
            Ok(())
        }
        Kind::Dict => {
            let mut child = parser.enter_container(it)?;
            out.write_char('{')?;
            let mut first = true;
            while !child.at_end() {
                if !first {
                    out.write_char(',')?;
                }
                first = false;
                let key_kind = child.kind();
                let key = if key_kind == Kind::TextString {
                    escaped_text_key(parser, &mut child)?
                } else if options.stringify_keys {
                    stringified_key(parser, &mut child)?
                } else {
                    return Err(Error::JsonObjectKeyNotString);
                };
                write!(out, "\"{}\":", key)?;
                value_to_json(parser, &mut child, out, options, depth - 1, status)?;
                if options.add_metadata {
                    if key_kind != Kind::TextString {
                        write!(out, ",\"{}$keycbordump\":true", key)?;
                    }
                    if status.any() {
                        write!(out, ",\"{}$cbor\":{{", key)?;
                        write_metadata(out, status)?;
                        out.write_char('}')?;
                    }
                }
            }
            out.write_char('}')?;
            parser.leave_container(it, &child)?;
            status.clear();
            Ok(())
        }
        Kind::Integer => {
            let v = parser.raw_u64(it)?;
            if it.is_negative() {
                let num = -(v as f64) - 1.0;
                if num as i128 != -1i128 - v as i128 {
                    status.precision_lost = true;
                    status.was_negative = true;
                    status.original = v;
                }
                write!(out, "{:.0}", num)?;
            } else {
                let num = v as f64;
                if num as u128 != v as u128 {
                    status.precision_lost = true;
                    status.original = v;
                }
                write!(out, "{:.0}", num)?;
            }
            parser.advance_fixed(it)
        }
        Kind::ByteString => {
            status.not_native = true;
            let data = parser.dup_string(it)?;
            write!(
                out,
                "\"{}\"",
                base64::encode_config(&data[..], base64::URL_SAFE_NO_PAD)
            )?;
            Ok(())
        }
        Kind::TextString => escaped_string_to_json(parser, it, out),
        Kind::Tag => tagged_value_to_json(parser, it, out, options, depth - 1, status),
        Kind::Simple => {
            let v = parser.simple(it)?;
            status.not_native = true;
            status.original = v as u64;
            write!(out, "\"simple({})\"", v)?;
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
            status.not_native = true;
            out.write_str("\"undefined\"")?;
            parser.advance_fixed(it)
        }
        Kind::HalfFloat | Kind::Float | Kind::Double => {
            if it.kind() != Kind::Double {
                // the width distinction is lost in JSON
                status.not_native = true;
            }
            let value = parser.float(it)?;
            if value.is_nan() {
                status.was_nan = true;
                out.write_str("null")?;
            } else if value.is_infinite() {
                status.was_infinite = true;
                status.was_negative = value < 0.0;
                out.write_str("null")?;
            } else {
                let magnitude = value.abs();
                if magnitude == magnitude.trunc() && magnitude < 18446744073709551616.0 {
                    // integral doubles print in integer form at full precision
                    status.not_native = true;
                    let sign = if value < 0.0 { "-" } else { "" };
                    write!(out, "{}{}", sign, magnitude as u64)?;
                } else if magnitude < 1e-6 || magnitude > 1e16 {
                    write!(out, "{:e}", value)?;
                } else {
                    write!(out, "{}", value)?;
                }
            }
            parser.advance_fixed(it)
        }
        Kind::Invalid => Err(Error::UnknownType),
    }
}

fn tagged_value_to_json<I: Input, W: Write>(
    parser: &mut Parser<I>,
    it: &mut Cursor,
    out: &mut W,
    options: JsonOptions,
    depth: usize,
    status: &mut Status,
) -> Result<()> {
    if options.tags_to_objects {
        let tag = parser.tag(it)?;
        parser.advance_fixed(it)?;
        write!(out, "{{\"tag{}\":", tag)?;
        value_to_json(parser, it, out, options, depth, status)?;
        if options.add_metadata && status.any() {
            write!(out, ",\"tag{}$cbor\":{{", tag)?;
            write_metadata(out, status)?;
            out.write_char('}')?;
        }
        out.write_char('}')?;
        status.clear();
        status.not_native = true;
        status.type_code = TYPE_TAG;
        return Ok(());
    }

    // drop the chain, remembering the innermost tag
    let mut tag = parser.tag(it)?;
    let mut depth = depth;
    parser.advance_fixed(it)?;
    while it.kind() == Kind::Tag {
        if depth == 0 {
            return Err(Error::JsonNestingTooDeep);
        }
        depth -= 1;
        tag = parser.tag(it)?;
        parser.advance_fixed(it)?;
    }

    if it.kind() == Kind::ByteString && !options.byte_strings_to_base64url {
        // the byte-string formatting tags pick the base-N alphabet
        let rendered = match tag {
            TAG_BIGNUM_NEG => {
                let data = parser.dup_string(it)?;
                Some(format!(
                    "~{}",
                    base64::encode_config(&data[..], base64::URL_SAFE_NO_PAD)
                ))
            }
            TAG_EXPECTED_BASE64 => {
                let data = parser.dup_string(it)?;
                Some(base64::encode_config(&data[..], base64::STANDARD))
            }
            TAG_EXPECTED_BASE16 => {
                let data = parser.dup_string(it)?;
                let mut hex = String::with_capacity(data.len() * 2);
                for byte in &data[..] {
                    write!(hex, "{:02x}", byte)?;
                }
                Some(hex)
            }
            _ => None,
        };
        if let Some(rendered) = rendered {
            write!(out, "\"{}\"", rendered)?;
            status.clear();
            status.not_native = true;
            status.tag = Some(tag);
            status.type_code = TYPE_BYTES;
            return Ok(());
        }
    }

    value_to_json(parser, it, out, options, depth, status)?;
    status.tag = Some(tag);
    Ok(())
}

/// The members of a `$cbor` metadata object: the dropped tag, the original
/// type code, and the original value where the conversion lost it.
fn write_metadata<W: Write>(out: &mut W, status: &Status) -> Result<()> {
    if let Some(tag) = status.tag {
        write!(out, "\"tag\":\"{}\"", tag)?;
        if !status.lossy() {
            return Ok(());
        }
        out.write_char(',')?;
    }
    write!(out, "\"t\":{}", status.type_code)?;
    if status.was_nan {
        out.write_str(",\"v\":\"nan\"")?;
    }
    if status.was_infinite {
        let sign = if status.was_negative { "-" } else { "" };
        write!(out, ",\"v\":\"{}inf\"", sign)?;
    }
    if status.precision_lost {
        let sign = if status.was_negative { '-' } else { '+' };
        write!(out, ",\"v\":\"{}{:x}\"", sign, status.original)?;
    }
    if status.type_code == TYPE_SIMPLE {
        write!(out, ",\"v\":{}", status.original)?;
    }
    Ok(())
}

/// Stream a text string out as an escaped JSON string, advancing the cursor.
fn escaped_string_to_json<I: Input, W: Write>(
    parser: &mut Parser<I>,
    it: &mut Cursor,
    out: &mut W,
) -> Result<()> {
    out.write_char('"')?;
    let mut walk = StringIter::new(parser, it)?;
    while let Some((pos, len)) = walk.next_span(parser)? {
        let chunk = parser.transfer(pos, len)?;
        let chunk = std::str::from_utf8(chunk).map_err(|_| Error::InvalidUtf8TextString)?;
        escape_json(chunk, out)?;
    }
    out.write_char('"')?;
    let start = it.offset();
    it.offset = walk.end_offset();
    parser.input.advance_bytes(it.offset - start);
    parser.preparse_next(it)
}

/// Materialize a text-string key in escaped form, advancing the cursor.
fn escaped_text_key<I: Input>(parser: &mut Parser<I>, it: &mut Cursor) -> Result<String> {
    let mut key = String::new();
    escaped_string_to_json(parser, it, &mut key)?;
    // strip the quotes added by the string writer
    key.pop();
    key.remove(0);
    Ok(key)
}

/// Render a non-text key through the diagnostic printer and escape that,
/// advancing the cursor.
fn stringified_key<I: Input>(parser: &mut Parser<I>, it: &mut Cursor) -> Result<String> {
    let mut pretty = String::new();
    write_pretty(parser, it, &mut pretty, PrettyOptions::default())?;
    let mut key = String::with_capacity(pretty.len());
    escape_json(&pretty, &mut key)?;
    Ok(key)
}

/// RFC 8259 string escaping: the two mandatory characters plus all controls,
/// with the C-style shorthands where they exist.
fn escape_json<W: Write>(s: &str, out: &mut W) -> Result<()> {
    for c in s.chars() {
        match c {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '\u{8}' => out.write_str("\\b")?,
            '\t' => out.write_str("\\t")?,
            '\n' => out.write_str("\\n")?,
            '\u{c}' => out.write_str("\\f")?,
            '\r' => out.write_str("\\r")?,
            c if (c as u32) < 0x20 => write!(out, "\\u{:04x}", c as u32)?,
            c => out.write_char(c)?,
        }
    }
    Ok(())
}
