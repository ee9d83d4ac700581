use crate::{
    constants::*,
    error::{Error, Result},
};
use half::f16;

/// Pack one item header in its shortest form, returning the number of bytes used.
pub(crate) fn pack_info(buf: &mut [u8; 9], major: u8, value: u64) -> usize {
    if value < 24 {
        buf[0] = major << 5 | (value as u8);
        1
    } else if value < 0x100 {
        buf[0] = major << 5 | VALUE_IN_NEXT_BYTE;
        buf[1] = value as u8;
        2
    } else if value < 0x1_0000 {
        buf[0] = major << 5 | VALUE_IN_2_BYTES;
        buf[1..3].copy_from_slice(&(value as u16).to_be_bytes());
        3
    } else if value < 0x1_0000_0000 {
        buf[0] = major << 5 | VALUE_IN_4_BYTES;
        buf[1..5].copy_from_slice(&(value as u32).to_be_bytes());
        5
    } else {
        buf[0] = major << 5 | VALUE_IN_8_BYTES;
        buf[1..9].copy_from_slice(&value.to_be_bytes());
        9
    }
}

/// Single-pass CBOR writer over a caller-supplied buffer.
///
/// The encoder never allocates; all output goes into the slice handed to
/// [`new`](#method.new). Every write emits the canonical shortest header
/// form. When a write no longer fits, the encoder keeps a ledger of the
/// shortfall instead of aborting: the failing write and every write after it
/// return [`Error::OutOfMemory`](enum.Error.html) while
/// [`extra_bytes_needed`](#method.extra_bytes_needed) accumulates the exact
/// number of additional bytes a retry requires.
///
/// ```
/// use cbor_stream::Encoder;
///
/// let mut buf = [0u8; 16];
/// let mut enc = Encoder::new(&mut buf);
/// let array = enc.begin_array(Some(3));
/// enc.write_pos(1)?;
/// enc.write_pos(2)?;
/// enc.write_pos(3)?;
/// enc.end_container(array)?;
/// assert_eq!(enc.as_slice(), [0x83, 1, 2, 3]);
/// # Ok::<(), cbor_stream::Error>(())
/// ```
///
/// Sizing a buffer by dry run:
///
/// ```
/// use cbor_stream::Encoder;
///
/// let mut buf = [0u8; 1];
/// let mut enc = Encoder::new(&mut buf);
/// assert!(enc.write_pos(256).is_err());
/// // one byte of capacity plus the shortfall covers the three-byte item
/// assert_eq!(enc.extra_bytes_needed(), 2);
/// ```
pub struct Encoder<'a> {
    buf: &'a mut [u8],
    pos: usize,
    needed: usize,
    allow_reserved_simple: bool,
}

/// Token for an open array or dict, produced by
/// [`Encoder::begin_array`](struct.Encoder.html#method.begin_array) and
/// [`Encoder::begin_dict`](struct.Encoder.html#method.begin_dict).
///
/// The encoder's write position is borrowed by the container while it is
/// open; handing the token back to
/// [`end_container`](struct.Encoder.html#method.end_container) closes it and
/// emits the break byte for the indefinite-length form.
#[must_use = "open containers must be closed with end_container"]
pub struct Container {
    indefinite: bool,
}

impl<'a> Encoder<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buf: buffer,
            pos: 0,
            needed: 0,
            allow_reserved_simple: false,
        }
    }

    /// Permit [`write_simple`](#method.write_simple) to emit the reserved
    /// codes 24..=31 (float markers and break).
    pub fn with_reserved_simple(mut self) -> Self {
        self.allow_reserved_simple = true;
        self
    }

    /// Bytes placed in the buffer so far. Unaffected by overrun.
    pub fn bytes_written(&self) -> usize {
        self.pos
    }

    /// Additional capacity required on top of the original buffer for all
    /// writes attempted so far to succeed. Zero while everything fits.
    pub fn extra_bytes_needed(&self) -> usize {
        self.needed
    }

    /// The encoded output written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    fn append(&mut self, data: &[u8]) -> Result<()> {
        if self.needed > 0 {
            self.needed += data.len();
            return Err(Error::OutOfMemory);
        }
        let room = self.buf.len() - self.pos;
        if data.len() > room {
            // the leftover capacity is forfeited; a retry needs `room + needed`
            self.needed = data.len() - room;
            return Err(Error::OutOfMemory);
        }
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
        Ok(())
    }

    fn write_info(&mut self, major: u8, value: u64) -> Result<()> {
        let mut tmp = [0u8; 9];
        let n = pack_info(&mut tmp, major, value);
        self.append(&tmp[..n])
    }

    /// Write an unsigned value of up to 64 bits.
    pub fn write_pos(&mut self, value: u64) -> Result<()> {
        self.write_info(MAJOR_POS, value)
    }

    /// Write a negative value of up to 64 bits — the represented number is
    /// `-1 - value`, so the full range down to −2⁶⁴ is reachable.
    pub fn write_neg(&mut self, value: u64) -> Result<()> {
        self.write_info(MAJOR_NEG, value)
    }

    /// Write a signed value, choosing the unsigned or negative wire form.
    pub fn write_int(&mut self, value: i64) -> Result<()> {
        if value < 0 {
            self.write_neg(!value as u64)
        } else {
            self.write_pos(value as u64)
        }
    }

    /// Write a simple value.
    ///
    /// Codes 24..=31 collide with the float markers and the break byte and
    /// are refused unless the encoder was built
    /// [`with_reserved_simple`](#method.with_reserved_simple). Codes above 31
    /// use the two-byte form.
    pub fn write_simple(&mut self, value: u8) -> Result<()> {
        if !self.allow_reserved_simple && (24..=31).contains(&value) {
            return Err(Error::IllegalSimple);
        }
        self.write_info(MAJOR_LIT, value as u64)
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        let lit = if value { LIT_TRUE } else { LIT_FALSE };
        self.write_info(MAJOR_LIT, lit as u64)
    }

    pub fn write_null(&mut self) -> Result<()> {
        self.write_info(MAJOR_LIT, LIT_NULL as u64)
    }

    pub fn write_undefined(&mut self) -> Result<()> {
        self.write_info(MAJOR_LIT, LIT_UNDEFINED as u64)
    }

    /// Write a tag header; the caller must write exactly one item after it.
    pub fn write_tag(&mut self, tag: u64) -> Result<()> {
        self.write_info(MAJOR_TAG, tag)
    }

    pub fn write_f16(&mut self, value: f16) -> Result<()> {
        let mut tmp = [0u8; 3];
        tmp[0] = MAJOR_LIT << 5 | LIT_FLOAT16;
        tmp[1..].copy_from_slice(&value.to_be_bytes());
        self.append(&tmp)
    }

    /// Narrow a single-precision value to half precision and write it.
    ///
    /// Narrowing is never done implicitly; this is the only place where the
    /// library converts between float widths on the way out.
    pub fn write_f16_from_f32(&mut self, value: f32) -> Result<()> {
        self.write_f16(f16::from_f32(value))
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        let mut tmp = [0u8; 5];
        tmp[0] = MAJOR_LIT << 5 | LIT_FLOAT32;
        tmp[1..].copy_from_slice(&value.to_be_bytes());
        self.append(&tmp)
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        let mut tmp = [0u8; 9];
        tmp[0] = MAJOR_LIT << 5 | LIT_FLOAT64;
        tmp[1..].copy_from_slice(&value.to_be_bytes());
        self.append(&tmp)
    }

    /// Write a definite-size byte string.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        let header = self.write_info(MAJOR_BYTES, value.len() as u64);
        // the payload is tallied even when the header already overran
        let payload = self.append(value);
        header.and(payload)
    }

    /// Write a definite-size text string. UTF-8 validity is guaranteed by
    /// the `&str` type; no further checks are made.
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        let header = self.write_info(MAJOR_STR, value.len() as u64);
        let payload = self.append(value.as_bytes());
        header.and(payload)
    }

    /// Open an array of `length` items, or of indefinite length for `None`.
    ///
    /// An overrun while writing the header is recorded in the ledger and
    /// reported by the following writes and by `end_container`, so a
    /// measurement pass can keep going and still close the container.
    pub fn begin_array(&mut self, length: Option<u64>) -> Container {
        self.begin_container(MAJOR_ARRAY, length)
    }

    /// Open a dict of `length` key–value pairs, or of indefinite length for
    /// `None`. Every pair is written as a key item followed by a value item.
    pub fn begin_dict(&mut self, length: Option<u64>) -> Container {
        self.begin_container(MAJOR_DICT, length)
    }

    fn begin_container(&mut self, major: u8, length: Option<u64>) -> Container {
        let _ = match length {
            Some(len) => self.write_info(major, len),
            None => self.append(&[major << 5 | INDEFINITE_SIZE]),
        };
        Container {
            indefinite: length.is_none(),
        }
    }

    /// Close a container opened on this encoder, emitting the break byte if
    /// it was opened with indefinite length.
    pub fn end_container(&mut self, container: Container) -> Result<()> {
        if container.indefinite {
            self.append(&[STOP_BYTE])?;
        } else if self.needed > 0 {
            return Err(Error::OutOfMemory);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(f: impl FnOnce(&mut Encoder)) -> Vec<u8> {
        let mut buf = [0u8; 64];
        let mut enc = Encoder::new(&mut buf);
        f(&mut enc);
        enc.as_slice().to_vec()
    }

    #[test]
    fn shortest_headers() {
        assert_eq!(encoded(|e| e.write_pos(0).unwrap()), [0x00]);
        assert_eq!(encoded(|e| e.write_pos(23).unwrap()), [0x17]);
        assert_eq!(encoded(|e| e.write_pos(24).unwrap()), [0x18, 24]);
        assert_eq!(encoded(|e| e.write_pos(255).unwrap()), [0x18, 255]);
        assert_eq!(encoded(|e| e.write_pos(256).unwrap()), [0x19, 1, 0]);
        assert_eq!(encoded(|e| e.write_pos(65535).unwrap()), [0x19, 0xff, 0xff]);
        assert_eq!(encoded(|e| e.write_pos(65536).unwrap()), [0x1a, 0, 1, 0, 0]);
        assert_eq!(
            encoded(|e| e.write_pos(u32::MAX as u64).unwrap()),
            [0x1a, 0xff, 0xff, 0xff, 0xff]
        );
        assert_eq!(
            encoded(|e| e.write_pos(u32::MAX as u64 + 1).unwrap()),
            [0x1b, 0, 0, 0, 1, 0, 0, 0, 0]
        );
        assert_eq!(
            encoded(|e| e.write_pos(u64::MAX).unwrap()),
            [0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn signed() {
        assert_eq!(encoded(|e| e.write_int(-1).unwrap()), [0x20]);
        assert_eq!(encoded(|e| e.write_int(-100).unwrap()), [0x38, 0x63]);
        assert_eq!(encoded(|e| e.write_int(42).unwrap()), [0x18, 42]);
        assert_eq!(
            encoded(|e| e.write_int(i64::MIN).unwrap()),
            [0x3b, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
        assert_eq!(
            encoded(|e| e.write_neg(u64::MAX).unwrap()),
            [0x3b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn simple_values() {
        assert_eq!(encoded(|e| e.write_bool(false).unwrap()), [0xf4]);
        assert_eq!(encoded(|e| e.write_bool(true).unwrap()), [0xf5]);
        assert_eq!(encoded(|e| e.write_null().unwrap()), [0xf6]);
        assert_eq!(encoded(|e| e.write_undefined().unwrap()), [0xf7]);
        assert_eq!(encoded(|e| e.write_simple(16).unwrap()), [0xf0]);
        assert_eq!(encoded(|e| e.write_simple(255).unwrap()), [0xf8, 0xff]);

        let mut buf = [0u8; 4];
        let mut enc = Encoder::new(&mut buf);
        assert_eq!(enc.write_simple(25), Err(Error::IllegalSimple));
        assert_eq!(enc.write_simple(31), Err(Error::IllegalSimple));
        let mut enc = Encoder::new(&mut buf).with_reserved_simple();
        assert!(enc.write_simple(25).is_ok());
    }

    #[test]
    fn floats() {
        assert_eq!(
            encoded(|e| e.write_f16(f16::from_f32(1.0)).unwrap()),
            [0xf9, 0x3c, 0x00]
        );
        assert_eq!(
            encoded(|e| e.write_f16_from_f32(1.5).unwrap()),
            [0xf9, 0x3e, 0x00]
        );
        assert_eq!(
            encoded(|e| e.write_f32(100000.0).unwrap()),
            [0xfa, 0x47, 0xc3, 0x50, 0x00]
        );
        assert_eq!(
            encoded(|e| e.write_f64(1.1).unwrap()),
            [0xfb, 0x3f, 0xf1, 0x99, 0x99, 0x99, 0x99, 0x99, 0x9a]
        );
    }

    #[test]
    fn strings_and_tags() {
        assert_eq!(
            encoded(|e| e.write_bytes(&[1, 2, 3, 4]).unwrap()),
            [0x44, 1, 2, 3, 4]
        );
        assert_eq!(
            encoded(|e| e.write_str("IETF").unwrap()),
            [0x64, b'I', b'E', b'T', b'F']
        );
        assert_eq!(
            encoded(|e| {
                e.write_tag(1).unwrap();
                e.write_pos(1363896240).unwrap();
            }),
            [0xc1, 0x1a, 0x51, 0x4b, 0x67, 0xb0]
        );
    }

    #[test]
    fn containers() {
        assert_eq!(
            encoded(|e| {
                let a = e.begin_array(None);
                e.end_container(a).unwrap();
            }),
            [0x9f, 0xff]
        );
        assert_eq!(
            encoded(|e| {
                let d = e.begin_dict(Some(1));
                e.write_str("foo").unwrap();
                e.write_pos(1).unwrap();
                e.end_container(d).unwrap();
            }),
            [0xa1, 0x63, b'f', b'o', b'o', 0x01]
        );
        assert_eq!(
            encoded(|e| {
                let d = e.begin_dict(None);
                e.write_str("foo").unwrap();
                e.write_pos(1).unwrap();
                e.end_container(d).unwrap();
            }),
            [0xbf, 0x63, b'f', b'o', b'o', 0x01, 0xff]
        );
    }

    #[test]
    fn overrun_ledger() {
        let mut buf = [0u8; 1];
        let mut enc = Encoder::new(&mut buf);
        assert_eq!(enc.write_pos(256), Err(Error::OutOfMemory));
        assert_eq!(enc.bytes_written(), 0);
        assert_eq!(enc.extra_bytes_needed(), 2);

        // later writes keep counting in full
        assert_eq!(enc.write_pos(1), Err(Error::OutOfMemory));
        assert_eq!(enc.extra_bytes_needed(), 3);
    }

    #[test]
    fn overrun_with_partial_output() {
        let mut buf = [0u8; 4];
        let mut enc = Encoder::new(&mut buf);
        let a = enc.begin_array(Some(2));
        enc.write_pos(1).unwrap();
        assert_eq!(enc.write_bytes(&[1, 2, 3, 4]), Err(Error::OutOfMemory));
        assert_eq!(enc.end_container(a), Err(Error::OutOfMemory));
        // the string header still fit, the four payload bytes had one byte of room
        assert_eq!(enc.bytes_written(), 3);
        assert_eq!(enc.extra_bytes_needed(), 3);

        // a buffer larger by the shortfall makes the same sequence fit
        let mut buf = [0u8; 7];
        let mut enc = Encoder::new(&mut buf);
        let a = enc.begin_array(Some(2));
        enc.write_pos(1).unwrap();
        enc.write_bytes(&[1, 2, 3, 4]).unwrap();
        enc.end_container(a).unwrap();
        assert_eq!(enc.as_slice(), [0x82, 0x01, 0x44, 1, 2, 3, 4]);
    }

    #[test]
    fn measurement_spans_containers() {
        let mut buf = [0u8; 0];
        let mut enc = Encoder::new(&mut buf);
        let a = enc.begin_array(None);
        let _ = enc.write_str("hello");
        let _ = enc.write_pos(1000);
        assert_eq!(enc.end_container(a), Err(Error::OutOfMemory));
        // 1 (array header) + 6 (string) + 3 (integer) + 1 (break)
        assert_eq!(enc.extra_bytes_needed(), 11);
    }
}
