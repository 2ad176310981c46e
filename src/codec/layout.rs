//! Binary layout descriptors and bounds-checked field access
//!
//! Driver structures are never reinterpreted in place. Every read goes
//! through [`FieldReader`], which checks `offset + width` against the
//! buffer before touching it, and every write goes through [`FieldWriter`]
//! into a buffer of the declared size.

use crate::error::FormatError;
use byteorder::{ByteOrder, LittleEndian};

// ============================================================================
// Layout Descriptors
// ============================================================================

/// One field of a fixed layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
}

impl Field {
    pub const fn new(name: &'static str, offset: usize, width: usize) -> Self {
        Self { name, offset, width }
    }

    pub const fn end(&self) -> usize {
        self.offset + self.width
    }
}

/// Immutable description of a fixed-size structure (little-endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub name: &'static str,
    pub size: usize,
    pub fields: &'static [Field],
}

impl Layout {
    pub const fn new(name: &'static str, size: usize, fields: &'static [Field]) -> Self {
        Self { name, size, fields }
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check that fields are ordered, non-overlapping and inside `size`
    pub fn is_consistent(&self) -> bool {
        let mut end = 0;
        for field in self.fields {
            if field.width == 0 || field.offset < end {
                return false;
            }
            end = field.end();
        }
        end <= self.size
    }
}

// ============================================================================
// Field Reader
// ============================================================================

/// Offset-addressed reader over an untrusted byte slice
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a> {
    data: &'a [u8],
}

impl<'a> FieldReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Create a reader after checking the buffer covers `layout`
    pub fn for_layout(data: &'a [u8], layout: &Layout) -> Result<Self, FormatError> {
        if data.len() < layout.size {
            return Err(FormatError::Truncated {
                needed: layout.size,
                available: data.len(),
            });
        }
        Ok(Self { data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow `len` bytes at `offset`
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], FormatError> {
        let end = offset.checked_add(len).ok_or(FormatError::Truncated {
            needed: usize::MAX,
            available: self.data.len(),
        })?;
        self.data.get(offset..end).ok_or(FormatError::Truncated {
            needed: end,
            available: self.data.len(),
        })
    }

    pub fn u8(&self, offset: usize) -> Result<u8, FormatError> {
        Ok(self.bytes(offset, 1)?[0])
    }

    pub fn u16(&self, offset: usize) -> Result<u16, FormatError> {
        Ok(LittleEndian::read_u16(self.bytes(offset, 2)?))
    }

    pub fn u32(&self, offset: usize) -> Result<u32, FormatError> {
        Ok(LittleEndian::read_u32(self.bytes(offset, 4)?))
    }

    pub fn i32(&self, offset: usize) -> Result<i32, FormatError> {
        Ok(LittleEndian::read_i32(self.bytes(offset, 4)?))
    }

    pub fn u64(&self, offset: usize) -> Result<u64, FormatError> {
        Ok(LittleEndian::read_u64(self.bytes(offset, 8)?))
    }

    pub fn i64(&self, offset: usize) -> Result<i64, FormatError> {
        Ok(LittleEndian::read_i64(self.bytes(offset, 8)?))
    }

    pub fn u128(&self, offset: usize) -> Result<u128, FormatError> {
        Ok(LittleEndian::read_u128(self.bytes(offset, 16)?))
    }

    /// Decode UTF-16LE text of exactly `byte_len` bytes at `offset`
    ///
    /// Driver buffers do not null-terminate embedded names, so the length
    /// pair is the only bound. A trailing odd byte is ignored.
    pub fn utf16(&self, offset: usize, byte_len: usize) -> Result<String, FormatError> {
        let raw = self.bytes(offset, byte_len)?;
        let units: Vec<u16> = raw.chunks_exact(2).map(LittleEndian::read_u16).collect();
        Ok(String::from_utf16_lossy(&units))
    }
}

// ============================================================================
// Field Writer
// ============================================================================

/// Offset-addressed writer producing an exact structure image
///
/// Offsets come from layout constants; writing past the declared size is a
/// programming error and panics like any slice overrun.
#[derive(Debug, Clone)]
pub struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    pub fn new(size: usize) -> Self {
        Self { buf: vec![0u8; size] }
    }

    pub fn for_layout(layout: &Layout) -> Self {
        Self::new(layout.size)
    }

    pub fn put_u8(&mut self, offset: usize, value: u8) -> &mut Self {
        self.buf[offset] = value;
        self
    }

    pub fn put_u16(&mut self, offset: usize, value: u16) -> &mut Self {
        LittleEndian::write_u16(&mut self.buf[offset..offset + 2], value);
        self
    }

    pub fn put_u32(&mut self, offset: usize, value: u32) -> &mut Self {
        LittleEndian::write_u32(&mut self.buf[offset..offset + 4], value);
        self
    }

    pub fn put_i32(&mut self, offset: usize, value: i32) -> &mut Self {
        LittleEndian::write_i32(&mut self.buf[offset..offset + 4], value);
        self
    }

    pub fn put_u64(&mut self, offset: usize, value: u64) -> &mut Self {
        LittleEndian::write_u64(&mut self.buf[offset..offset + 8], value);
        self
    }

    pub fn put_i64(&mut self, offset: usize, value: i64) -> &mut Self {
        LittleEndian::write_i64(&mut self.buf[offset..offset + 8], value);
        self
    }

    pub fn put_u128(&mut self, offset: usize, value: u128) -> &mut Self {
        LittleEndian::write_u128(&mut self.buf[offset..offset + 16], value);
        self
    }

    pub fn put_bytes(&mut self, offset: usize, bytes: &[u8]) -> &mut Self {
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
        self
    }

    /// Write `text` as UTF-16LE, returning the byte length written
    pub fn put_utf16(&mut self, offset: usize, text: &str) -> usize {
        let mut pos = offset;
        for unit in text.encode_utf16() {
            LittleEndian::write_u16(&mut self.buf[pos..pos + 2], unit);
            pos += 2;
        }
        pos - offset
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

// ============================================================================
// Fixed Records
// ============================================================================

/// A structure whose byte layout and size are statically known
pub trait FixedRecord: Sized {
    const LAYOUT: &'static Layout;

    /// Extract fields; the reader is guaranteed to cover `LAYOUT.size`
    fn read(r: &FieldReader<'_>) -> Result<Self, FormatError>;

    /// Write fields into a zeroed buffer of `LAYOUT.size`
    fn write(&self, w: &mut FieldWriter);

    fn encode(&self) -> Vec<u8> {
        let mut w = FieldWriter::for_layout(Self::LAYOUT);
        self.write(&mut w);
        w.into_bytes()
    }
}

/// Decode a fixed record from the start of `bytes`
pub fn decode<T: FixedRecord>(bytes: &[u8]) -> Result<T, FormatError> {
    let reader = FieldReader::for_layout(bytes, T::LAYOUT)?;
    T::read(&reader)
}

/// Decode a packed array of fixed records
///
/// A partial trailing entry is `Truncated`, not dropped.
pub fn decode_array<T: FixedRecord>(bytes: &[u8]) -> Result<Vec<T>, FormatError> {
    let size = T::LAYOUT.size;
    let tail = bytes.len() % size;
    if tail != 0 {
        return Err(FormatError::Truncated {
            needed: bytes.len() - tail + size,
            available: bytes.len(),
        });
    }
    bytes.chunks_exact(size).map(decode::<T>).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_rejects_out_of_bounds_reads() {
        let data = [1u8, 2, 3];
        let r = FieldReader::new(&data);
        assert_eq!(r.u16(1).unwrap(), 0x0302);
        assert_eq!(
            r.u32(0),
            Err(FormatError::Truncated { needed: 4, available: 3 })
        );
        assert!(r.u64(usize::MAX - 2).is_err());
    }

    #[test]
    fn utf16_uses_length_not_terminator() {
        let mut w = FieldWriter::new(16);
        let written = w.put_utf16(0, "ab\0cd");
        let bytes = w.into_bytes();

        let r = FieldReader::new(&bytes);
        assert_eq!(r.utf16(0, written).unwrap(), "ab\0cd");
        assert_eq!(r.utf16(0, 4).unwrap(), "ab");
    }

    #[derive(Debug, PartialEq)]
    struct Pair(u32, u32);

    const PAIR: Layout = Layout::new("PAIR", 8, &[Field::new("a", 0, 4), Field::new("b", 4, 4)]);

    impl FixedRecord for Pair {
        const LAYOUT: &'static Layout = &PAIR;

        fn read(r: &FieldReader<'_>) -> Result<Self, FormatError> {
            Ok(Pair(r.u32(0)?, r.u32(4)?))
        }

        fn write(&self, w: &mut FieldWriter) {
            w.put_u32(0, self.0).put_u32(4, self.1);
        }
    }

    #[test]
    fn array_with_partial_tail_is_truncated() {
        let mut bytes = Pair(1, 2).encode();
        bytes.extend(Pair(3, 4).encode());
        assert_eq!(decode_array::<Pair>(&bytes).unwrap(), vec![Pair(1, 2), Pair(3, 4)]);
        assert!(decode_array::<Pair>(&[]).unwrap().is_empty());

        bytes.extend([0u8; 3]);
        assert_eq!(
            decode_array::<Pair>(&bytes),
            Err(FormatError::Truncated { needed: 24, available: 19 })
        );
    }

    #[test]
    fn layout_consistency() {
        const FIELDS: &[Field] = &[Field::new("a", 0, 4), Field::new("b", 4, 8)];
        const OVERLAP: &[Field] = &[Field::new("a", 0, 8), Field::new("b", 4, 4)];
        assert!(Layout::new("ok", 12, FIELDS).is_consistent());
        assert!(!Layout::new("short", 8, FIELDS).is_consistent());
        assert!(!Layout::new("overlap", 16, OVERLAP).is_consistent());
        assert_eq!(Layout::new("ok", 12, FIELDS).field("b").map(|f| f.offset), Some(4));
    }
}
