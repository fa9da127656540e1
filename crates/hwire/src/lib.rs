//! # Hwire
//!
//! The byte-level vocabulary spoken by an `hrpc` peer.
//!
//! ## Philosophy
//!
//! - **Ordered fields**: No tags on primitives, no self-description. Reader and
//!   writer agree on the field order, the stream carries only the data.
//! - **Big-Endian**: Every fixed-width integer and float is network order.
//! - **Bounded**: Decoders are zero-copy, bounds-checked views. A short buffer is
//!   an error, never a panic.
//!
//! ## Format
//!
//! - **Scalars**: `[Data: N]` (big-endian)
//! - **VInt / VLong**: Hadoop zero-compressed encoding, 1 to 9 bytes
//! - **Text**: `[Len: vint][UTF-8: Len]`
//! - **String**: `[Len: i32][UTF-8: Len]`, `Len = -1` encodes an absent string
//! - **Byte Array**: `[Len: vint][Data: Len]`
//! - **Value**: `[TypeCode: 1b][Body]`, see [`value`]

pub mod value;

#[cfg(test)]
mod tests;

pub use value::Cell;
pub use value::Get;
pub use value::Put;
pub use value::RowResult;
pub use value::TypeCode;
pub use value::Value;

/// Hwire serialization and deserialization errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Buffer exhausted while reading.
    UnexpectedEnd,
    /// String data is not valid UTF-8.
    InvalidUtf8,
    /// Byte does not correspond to a registered `TypeCode`.
    UnknownTypeCode(u8),
    /// A decoded length or count is negative or does not fit the target width.
    InvalidLength(i64),
    /// Blob length exceeds what the length prefix can express.
    BlobTooLarge(usize),
    /// The nested depth of a value exceeded the safety limit.
    RecursionLimitExceeded,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownTypeCode(b) => write!(f, "Unknown type code: {:#04x}", b),
            Error::InvalidLength(n) => write!(f, "Invalid length prefix: {}", n),
            Error::BlobTooLarge(n) => write!(f, "Blob of {} bytes is too large to encode", n),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for Hwire operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An append-only, big-endian encoder.
///
/// Fixed-width writes cannot fail. Writes that carry a length prefix return
/// `Error::BlobTooLarge` when the payload outgrows its prefix.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Creates a new encoder with default capacity.
    pub fn new() -> Self {
        Self { buf: Vec::with_capacity(256) }
    }

    /// Consumes the encoder and returns the final byte vector.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Returns a view of the current buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn u8(&mut self, v: u8) { self.buf.push(v); }
    /// Encodes a boolean as a single `0`/`1` byte.
    pub fn bool(&mut self, v: bool) { self.buf.push(v as u8); }
    pub fn i8(&mut self, v: i8) { self.buf.push(v as u8); }
    pub fn i16(&mut self, v: i16) { self.buf.extend_from_slice(&v.to_be_bytes()); }
    pub fn i32(&mut self, v: i32) { self.buf.extend_from_slice(&v.to_be_bytes()); }
    pub fn u32(&mut self, v: u32) { self.buf.extend_from_slice(&v.to_be_bytes()); }
    pub fn i64(&mut self, v: i64) { self.buf.extend_from_slice(&v.to_be_bytes()); }
    pub fn f32(&mut self, v: f32) { self.buf.extend_from_slice(&v.to_be_bytes()); }
    pub fn f64(&mut self, v: f64) { self.buf.extend_from_slice(&v.to_be_bytes()); }

    /// Appends raw bytes with no length prefix.
    pub fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// Encodes an i64 in Hadoop's zero-compressed format.
    ///
    /// Values in `-112..=127` take one byte. Anything else writes a marker byte
    /// carrying sign and width, followed by the magnitude in big-endian order.
    pub fn vlong(&mut self, v: i64) {
        if (-112..=127).contains(&v) {
            self.buf.push(v as i8 as u8);
            return;
        }

        let mut magnitude = v;
        let mut marker: i32 = -112;
        if magnitude < 0 {
            magnitude ^= -1;
            marker = -120;
        }

        let mut tmp = magnitude;
        while tmp != 0 {
            tmp >>= 8;
            marker -= 1;
        }
        self.buf.push(marker as i8 as u8);

        let width = if marker < -120 { -(marker + 120) } else { -(marker + 112) };
        for idx in (1..=width).rev() {
            let shift = (idx - 1) * 8;
            self.buf.push(((magnitude >> shift) & 0xFF) as u8);
        }
    }

    /// Encodes an i32 in Hadoop's zero-compressed format.
    pub fn vint(&mut self, v: i32) {
        self.vlong(v as i64);
    }

    /// Encodes a UTF-8 string with a vint length prefix (Hadoop `Text`).
    pub fn text(&mut self, v: &str) -> Result<()> {
        let len = i32::try_from(v.len()).map_err(|_| Error::BlobTooLarge(v.len()))?;
        self.vint(len);
        self.buf.extend_from_slice(v.as_bytes());
        Ok(())
    }

    /// Encodes an optional UTF-8 string with an i32 length prefix.
    ///
    /// `None` is written as length `-1` with no body.
    pub fn string(&mut self, v: Option<&str>) -> Result<()> {
        match v {
            None => self.i32(-1),
            Some(s) => {
                let len = i32::try_from(s.len()).map_err(|_| Error::BlobTooLarge(s.len()))?;
                self.i32(len);
                self.buf.extend_from_slice(s.as_bytes());
            }
        }
        Ok(())
    }

    /// Encodes a byte blob with a vint length prefix.
    pub fn byte_array(&mut self, v: &[u8]) -> Result<()> {
        let len = i32::try_from(v.len()).map_err(|_| Error::BlobTooLarge(v.len()))?;
        self.vint(len);
        self.buf.extend_from_slice(v);
        Ok(())
    }

    /// Encodes an element count as an i32.
    pub fn count(&mut self, n: usize) -> Result<()> {
        let n = i32::try_from(n).map_err(|_| Error::BlobTooLarge(n))?;
        self.i32(n);
        Ok(())
    }

    /// Writes a 4-byte placeholder and returns its offset for `patch_u32`.
    pub fn reserve_u32(&mut self) -> usize {
        let pos = self.buf.len();
        self.buf.extend_from_slice(&[0, 0, 0, 0]);
        pos
    }

    /// Overwrites a placeholder previously returned by `reserve_u32`.
    ///
    /// # Panics
    /// Panics if `pos` was not produced by `reserve_u32` on this encoder.
    pub fn patch_u32(&mut self, pos: usize, v: u32) {
        self.buf[pos..pos + 4].copy_from_slice(&v.to_be_bytes());
    }

    /// Encodes a tagged value, see [`value::encode_value`].
    pub fn value(&mut self, v: &Value) -> Result<()> {
        value::encode_value(self, v)
    }
}

/// A zero-copy, bounds-checked cursor over a byte slice.
///
/// Reading advances the internal cursor. Every read method mirrors the
/// `Encoder` method of the same name.
///
/// # Errors
/// All read operations return `Error::UnexpectedEnd` if the buffer is exhausted.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over the slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Returns the remaining bytes in the view.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Consumes and returns the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.buf.len() { return Err(Error::UnexpectedEnd); }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> { Ok(self.array::<1>()?[0]) }
    /// Decodes a boolean; any non-zero byte is `true`.
    pub fn bool(&mut self) -> Result<bool> { Ok(self.u8()? != 0) }
    pub fn i8(&mut self) -> Result<i8> { Ok(self.u8()? as i8) }
    pub fn i16(&mut self) -> Result<i16> { Ok(i16::from_be_bytes(self.array()?)) }
    pub fn i32(&mut self) -> Result<i32> { Ok(i32::from_be_bytes(self.array()?)) }
    pub fn u32(&mut self) -> Result<u32> { Ok(u32::from_be_bytes(self.array()?)) }
    pub fn i64(&mut self) -> Result<i64> { Ok(i64::from_be_bytes(self.array()?)) }
    pub fn f32(&mut self) -> Result<f32> { Ok(f32::from_be_bytes(self.array()?)) }
    pub fn f64(&mut self) -> Result<f64> { Ok(f64::from_be_bytes(self.array()?)) }

    /// Decodes a Hadoop zero-compressed i64.
    pub fn vlong(&mut self) -> Result<i64> {
        let first = self.i8()?;
        let width = vint_width(first);
        if width == 1 {
            return Ok(first as i64);
        }

        let mut magnitude: i64 = 0;
        for _ in 0..width - 1 {
            magnitude = (magnitude << 8) | self.u8()? as i64;
        }

        if is_negative_vint(first) {
            Ok(magnitude ^ -1)
        } else {
            Ok(magnitude)
        }
    }

    /// Decodes a Hadoop zero-compressed i32.
    pub fn vint(&mut self) -> Result<i32> {
        let v = self.vlong()?;
        i32::try_from(v).map_err(|_| Error::InvalidLength(v))
    }

    /// Decodes a vint-prefixed UTF-8 string.
    pub fn text(&mut self) -> Result<&'a str> {
        let len = self.vint()?;
        let bytes = self.take(to_len(len)?)?;
        std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }

    /// Decodes an i32-prefixed UTF-8 string; `-1` yields `None`.
    pub fn string(&mut self) -> Result<Option<&'a str>> {
        let len = self.i32()?;
        if len == -1 {
            return Ok(None);
        }
        let bytes = self.take(to_len(len)?)?;
        std::str::from_utf8(bytes).map(Some).map_err(|_| Error::InvalidUtf8)
    }

    /// Decodes a vint-prefixed byte blob.
    pub fn byte_array(&mut self) -> Result<&'a [u8]> {
        let len = self.vint()?;
        self.take(to_len(len)?)
    }

    /// Decodes an i32 element count.
    pub fn count(&mut self) -> Result<usize> {
        let n = self.i32()?;
        to_len(n)
    }

    /// Decodes a tagged value, see [`value::decode_value`].
    pub fn value(&mut self) -> Result<Value> {
        value::decode_value(self)
    }
}

fn to_len(n: i32) -> Result<usize> {
    usize::try_from(n).map_err(|_| Error::InvalidLength(n as i64))
}

/// Total encoded width (marker included) of a vint whose first byte is `first`.
fn vint_width(first: i8) -> usize {
    if first >= -112 {
        1
    } else if first < -120 {
        (-119 - first as i32) as usize
    } else {
        (-111 - first as i32) as usize
    }
}

fn is_negative_vint(first: i8) -> bool {
    first < -120 || (-112..0).contains(&first)
}
