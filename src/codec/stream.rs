//! Variable-length record stream decoding
//!
//! Many control calls return a buffer holding zero or more self-describing
//! records: each one carries its own length and a version or type tag. A
//! [`RecordFamily`] describes where those live; [`RecordStream`] walks the
//! buffer one record at a time.

use crate::codec::layout::FieldReader;
use crate::error::FormatError;
use std::marker::PhantomData;

/// Where the framing fields of a record family live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framing {
    /// Bytes to skip before the first record
    pub header_len: usize,
    /// Offset of the 4-byte signed record length, relative to the record
    pub length_offset: usize,
    /// Offset of the 2-byte tag, relative to the record
    pub tag_offset: usize,
}

impl Framing {
    /// Bytes needed to read both the length and the tag
    pub const fn prefix_len(&self) -> usize {
        let length_end = self.length_offset + 4;
        let tag_end = self.tag_offset + 2;
        if length_end > tag_end {
            length_end
        } else {
            tag_end
        }
    }
}

/// A family of tagged records sharing one framing
pub trait RecordFamily {
    type Record;

    /// Family name used in diagnostics
    const NAME: &'static str;
    const FRAMING: Framing;

    /// Decode one record; `record` spans exactly the declared length
    ///
    /// Unrecognised tags must return [`FormatError::UnknownVariant`].
    fn decode_record(tag: u16, record: &[u8]) -> Result<Self::Record, FormatError>;
}

/// Lazy, single-pass decoder over one response buffer
///
/// Yields `Err` for a record it cannot decode and carries on with the next
/// one. A broken frame (a length running past the buffer) ends the stream
/// after reporting it.
pub struct RecordStream<'a, F: RecordFamily> {
    data: &'a [u8],
    cursor: usize,
    done: bool,
    _family: PhantomData<F>,
}

impl<'a, F: RecordFamily> RecordStream<'a, F> {
    pub fn new(data: &'a [u8]) -> Self {
        let header_len = F::FRAMING.header_len;
        Self {
            data,
            cursor: header_len,
            done: data.len() <= header_len,
            _family: PhantomData,
        }
    }

    /// Byte offset of the next record
    pub fn position(&self) -> usize {
        self.cursor
    }

    fn fail(&mut self, err: FormatError) -> Option<Result<F::Record, FormatError>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<'a, F: RecordFamily> Iterator for RecordStream<'a, F> {
    type Item = Result<F::Record, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.cursor >= self.data.len() {
            self.done = true;
            return None;
        }

        let framing = F::FRAMING;
        let remaining = &self.data[self.cursor..];
        let reader = FieldReader::new(remaining);

        let length = match reader.i32(framing.length_offset) {
            Ok(length) => length,
            Err(err) => return self.fail(err),
        };
        if length <= 0 {
            self.done = true;
            return None;
        }

        let length = length as usize;
        if length > remaining.len() {
            return self.fail(FormatError::Truncated {
                needed: length,
                available: remaining.len(),
            });
        }
        if length < framing.prefix_len() {
            return self.fail(FormatError::Truncated {
                needed: framing.prefix_len(),
                available: length,
            });
        }

        let record = &remaining[..length];
        let tag = match FieldReader::new(record).u16(framing.tag_offset) {
            Ok(tag) => tag,
            Err(err) => return self.fail(err),
        };

        self.cursor += length;
        Some(F::decode_record(tag, record))
    }
}

/// Decode every record in `data`, failing on the first bad one
pub fn decode_stream<F: RecordFamily>(data: &[u8]) -> Result<Vec<F::Record>, FormatError> {
    RecordStream::<F>::new(data).collect()
}

/// Decode every record, setting aside the ones that fail
///
/// Framing errors still end the stream; they show up in the second list.
pub fn decode_stream_lenient<F: RecordFamily>(data: &[u8]) -> (Vec<F::Record>, Vec<FormatError>) {
    let mut records = Vec::new();
    let mut rejected = Vec::new();
    for item in RecordStream::<F>::new(data) {
        match item {
            Ok(record) => records.push(record),
            Err(err) => rejected.push(err),
        }
    }
    (records, rejected)
}
