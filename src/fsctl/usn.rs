//! USN change journal structures and queries
//!
//! Covers both ways of reading the journal: `FSCTL_ENUM_USN_DATA` walks
//! the MFT by file reference number, `FSCTL_READ_USN_JOURNAL` replays
//! changes from a USN onwards. Both return an 8-byte continuation value
//! followed by a run of version-tagged USN records.

use crate::codec::invoke::ControlResponse;
use crate::codec::layout::{Field, FieldReader, FieldWriter, FixedRecord, Layout};
use crate::codec::paging::{Page, PagedQuery};
use crate::codec::stream::{decode_stream_lenient, Framing, RecordFamily};
use crate::codec::control_code::ControlCode;
use crate::error::FormatError;
use crate::registry::{FSCTL_ENUM_USN_DATA, FSCTL_READ_USN_JOURNAL};
use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// Layouts
// ============================================================================

pub const USN_JOURNAL_DATA_V0: Layout = Layout::new(
    "USN_JOURNAL_DATA_V0",
    0x38,
    &[
        Field::new("UsnJournalID", 0x00, 8),
        Field::new("FirstUsn", 0x08, 8),
        Field::new("NextUsn", 0x10, 8),
        Field::new("LowestValidUsn", 0x18, 8),
        Field::new("MaxUsn", 0x20, 8),
        Field::new("MaximumSize", 0x28, 8),
        Field::new("AllocationDelta", 0x30, 8),
    ],
);

pub const MFT_ENUM_DATA_V1: Layout = Layout::new(
    "MFT_ENUM_DATA_V1",
    28,
    &[
        Field::new("StartFileReferenceNumber", 0, 8),
        Field::new("LowUsn", 8, 8),
        Field::new("HighUsn", 16, 8),
        Field::new("MinMajorVersion", 24, 2),
        Field::new("MaxMajorVersion", 26, 2),
    ],
);

pub const READ_USN_JOURNAL_DATA_V0: Layout = Layout::new(
    "READ_USN_JOURNAL_DATA_V0",
    40,
    &[
        Field::new("StartUsn", 0, 8),
        Field::new("ReasonMask", 8, 4),
        Field::new("ReturnOnlyOnClose", 12, 4),
        Field::new("Timeout", 16, 8),
        Field::new("BytesToWaitFor", 24, 8),
        Field::new("UsnJournalID", 32, 8),
    ],
);

/// Fixed part of a version 2 record; the name follows at `FileNameOffset`
pub const USN_RECORD_V2: Layout = Layout::new(
    "USN_RECORD_V2",
    60,
    &[
        Field::new("RecordLength", 0, 4),
        Field::new("MajorVersion", 4, 2),
        Field::new("MinorVersion", 6, 2),
        Field::new("FileReferenceNumber", 8, 8),
        Field::new("ParentFileReferenceNumber", 16, 8),
        Field::new("Usn", 24, 8),
        Field::new("TimeStamp", 32, 8),
        Field::new("Reason", 40, 4),
        Field::new("SourceInfo", 44, 4),
        Field::new("SecurityId", 48, 4),
        Field::new("FileAttributes", 52, 4),
        Field::new("FileNameLength", 56, 2),
        Field::new("FileNameOffset", 58, 2),
    ],
);

/// Fixed part of a version 3 record (128-bit file references)
pub const USN_RECORD_V3: Layout = Layout::new(
    "USN_RECORD_V3",
    76,
    &[
        Field::new("RecordLength", 0, 4),
        Field::new("MajorVersion", 4, 2),
        Field::new("MinorVersion", 6, 2),
        Field::new("FileReferenceNumber", 8, 16),
        Field::new("ParentFileReferenceNumber", 24, 16),
        Field::new("Usn", 40, 8),
        Field::new("TimeStamp", 48, 8),
        Field::new("Reason", 56, 4),
        Field::new("SourceInfo", 60, 4),
        Field::new("SecurityId", 64, 4),
        Field::new("FileAttributes", 68, 4),
        Field::new("FileNameLength", 72, 2),
        Field::new("FileNameOffset", 74, 2),
    ],
);

// ============================================================================
// Journal Data
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsnJournalData {
    pub usn_journal_id: u64,
    pub first_usn: i64,
    pub next_usn: i64,
    pub lowest_valid_usn: i64,
    pub max_usn: i64,
    pub maximum_size: u64,
    pub allocation_delta: u64,
}

impl FixedRecord for UsnJournalData {
    const LAYOUT: &'static Layout = &USN_JOURNAL_DATA_V0;

    fn read(r: &FieldReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            usn_journal_id: r.u64(0x00)?,
            first_usn: r.i64(0x08)?,
            next_usn: r.i64(0x10)?,
            lowest_valid_usn: r.i64(0x18)?,
            max_usn: r.i64(0x20)?,
            maximum_size: r.u64(0x28)?,
            allocation_delta: r.u64(0x30)?,
        })
    }

    fn write(&self, w: &mut FieldWriter) {
        w.put_u64(0x00, self.usn_journal_id)
            .put_i64(0x08, self.first_usn)
            .put_i64(0x10, self.next_usn)
            .put_i64(0x18, self.lowest_valid_usn)
            .put_i64(0x20, self.max_usn)
            .put_u64(0x28, self.maximum_size)
            .put_u64(0x30, self.allocation_delta);
    }
}

// ============================================================================
// Input Buffers
// ============================================================================

/// Input for `FSCTL_ENUM_USN_DATA`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MftEnumData {
    pub start_file_reference_number: u64,
    pub low_usn: i64,
    pub high_usn: i64,
    pub min_major_version: u16,
    pub max_major_version: u16,
}

impl FixedRecord for MftEnumData {
    const LAYOUT: &'static Layout = &MFT_ENUM_DATA_V1;

    fn read(r: &FieldReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            start_file_reference_number: r.u64(0)?,
            low_usn: r.i64(8)?,
            high_usn: r.i64(16)?,
            min_major_version: r.u16(24)?,
            max_major_version: r.u16(26)?,
        })
    }

    fn write(&self, w: &mut FieldWriter) {
        w.put_u64(0, self.start_file_reference_number)
            .put_i64(8, self.low_usn)
            .put_i64(16, self.high_usn)
            .put_u16(24, self.min_major_version)
            .put_u16(26, self.max_major_version);
    }
}

/// Input for `FSCTL_READ_USN_JOURNAL`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadUsnJournalData {
    pub start_usn: i64,
    pub reason_mask: u32,
    pub return_only_on_close: bool,
    /// Only used when `bytes_to_wait_for` is non-zero
    pub timeout: u64,
    pub bytes_to_wait_for: u64,
    pub usn_journal_id: u64,
}

impl FixedRecord for ReadUsnJournalData {
    const LAYOUT: &'static Layout = &READ_USN_JOURNAL_DATA_V0;

    fn read(r: &FieldReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            start_usn: r.i64(0)?,
            reason_mask: r.u32(8)?,
            return_only_on_close: r.u32(12)? != 0,
            timeout: r.u64(16)?,
            bytes_to_wait_for: r.u64(24)?,
            usn_journal_id: r.u64(32)?,
        })
    }

    fn write(&self, w: &mut FieldWriter) {
        w.put_i64(0, self.start_usn)
            .put_u32(8, self.reason_mask)
            .put_u32(12, self.return_only_on_close as u32)
            .put_u64(16, self.timeout)
            .put_u64(24, self.bytes_to_wait_for)
            .put_u64(32, self.usn_journal_id);
    }
}

// ============================================================================
// USN Records
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsnRecordV2 {
    pub minor_version: u16,
    pub file_reference_number: u64,
    pub parent_file_reference_number: u64,
    pub usn: i64,
    pub timestamp: i64,
    pub reason: u32,
    pub source_info: u32,
    pub security_id: u32,
    pub file_attributes: u32,
    pub file_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsnRecordV3 {
    pub minor_version: u16,
    pub file_reference_number: u128,
    pub parent_file_reference_number: u128,
    pub usn: i64,
    pub timestamp: i64,
    pub reason: u32,
    pub source_info: u32,
    pub security_id: u32,
    pub file_attributes: u32,
    pub file_name: String,
}

/// A change journal record, by major version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UsnRecord {
    V2(UsnRecordV2),
    V3(UsnRecordV3),
}

/// Read the name through its offset/length pair, bounded by the record
fn read_name(
    r: &FieldReader<'_>,
    length_at: usize,
    offset_at: usize,
) -> Result<String, FormatError> {
    let length = r.u16(length_at)? as usize;
    let offset = r.u16(offset_at)? as usize;
    r.utf16(offset, length)
}

/// Records are padded to 8-byte alignment
fn record_len(header: usize, name: &str) -> usize {
    (header + name.encode_utf16().count() * 2).next_multiple_of(8)
}

impl UsnRecordV2 {
    pub const MAJOR_VERSION: u16 = 2;

    /// Parse one record; `data` spans exactly `RecordLength` bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, FormatError> {
        let r = FieldReader::for_layout(data, &USN_RECORD_V2)?;
        Ok(Self {
            minor_version: r.u16(6)?,
            file_reference_number: r.u64(8)?,
            parent_file_reference_number: r.u64(16)?,
            usn: r.i64(24)?,
            timestamp: r.i64(32)?,
            reason: r.u32(40)?,
            source_info: r.u32(44)?,
            security_id: r.u32(48)?,
            file_attributes: r.u32(52)?,
            file_name: read_name(&r, 56, 58)?,
        })
    }

    /// Build the on-disk image, name included
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = USN_RECORD_V2.size;
        let length = record_len(header, &self.file_name);
        let mut w = FieldWriter::new(length);
        let name_len = w.put_utf16(header, &self.file_name);
        w.put_u32(0, length as u32)
            .put_u16(4, Self::MAJOR_VERSION)
            .put_u16(6, self.minor_version)
            .put_u64(8, self.file_reference_number)
            .put_u64(16, self.parent_file_reference_number)
            .put_i64(24, self.usn)
            .put_i64(32, self.timestamp)
            .put_u32(40, self.reason)
            .put_u32(44, self.source_info)
            .put_u32(48, self.security_id)
            .put_u32(52, self.file_attributes)
            .put_u16(56, name_len as u16)
            .put_u16(58, header as u16);
        w.into_bytes()
    }
}

impl UsnRecordV3 {
    pub const MAJOR_VERSION: u16 = 3;

    pub fn from_bytes(data: &[u8]) -> Result<Self, FormatError> {
        let r = FieldReader::for_layout(data, &USN_RECORD_V3)?;
        Ok(Self {
            minor_version: r.u16(6)?,
            file_reference_number: r.u128(8)?,
            parent_file_reference_number: r.u128(24)?,
            usn: r.i64(40)?,
            timestamp: r.i64(48)?,
            reason: r.u32(56)?,
            source_info: r.u32(60)?,
            security_id: r.u32(64)?,
            file_attributes: r.u32(68)?,
            file_name: read_name(&r, 72, 74)?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let header = USN_RECORD_V3.size;
        let length = record_len(header, &self.file_name);
        let mut w = FieldWriter::new(length);
        let name_len = w.put_utf16(header, &self.file_name);
        w.put_u32(0, length as u32)
            .put_u16(4, Self::MAJOR_VERSION)
            .put_u16(6, self.minor_version)
            .put_u128(8, self.file_reference_number)
            .put_u128(24, self.parent_file_reference_number)
            .put_i64(40, self.usn)
            .put_i64(48, self.timestamp)
            .put_u32(56, self.reason)
            .put_u32(60, self.source_info)
            .put_u32(64, self.security_id)
            .put_u32(68, self.file_attributes)
            .put_u16(72, name_len as u16)
            .put_u16(74, header as u16);
        w.into_bytes()
    }
}

impl UsnRecord {
    pub fn major_version(&self) -> u16 {
        match self {
            UsnRecord::V2(_) => UsnRecordV2::MAJOR_VERSION,
            UsnRecord::V3(_) => UsnRecordV3::MAJOR_VERSION,
        }
    }

    pub fn usn(&self) -> i64 {
        match self {
            UsnRecord::V2(r) => r.usn,
            UsnRecord::V3(r) => r.usn,
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            UsnRecord::V2(r) => &r.file_name,
            UsnRecord::V3(r) => &r.file_name,
        }
    }

    /// File reference widened to 128 bits
    pub fn file_reference_number(&self) -> u128 {
        match self {
            UsnRecord::V2(r) => r.file_reference_number as u128,
            UsnRecord::V3(r) => r.file_reference_number,
        }
    }

    pub fn parent_file_reference_number(&self) -> u128 {
        match self {
            UsnRecord::V2(r) => r.parent_file_reference_number as u128,
            UsnRecord::V3(r) => r.parent_file_reference_number,
        }
    }

    /// MFT record number (lower 48 bits of the reference)
    pub fn file_record_number(&self) -> u64 {
        self.file_reference_number() as u64 & 0x0000_FFFF_FFFF_FFFF
    }

    pub fn parent_record_number(&self) -> u64 {
        self.parent_file_reference_number() as u64 & 0x0000_FFFF_FFFF_FFFF
    }

    pub fn reason(&self) -> u32 {
        match self {
            UsnRecord::V2(r) => r.reason,
            UsnRecord::V3(r) => r.reason,
        }
    }

    pub fn file_attributes(&self) -> u32 {
        match self {
            UsnRecord::V2(r) => r.file_attributes,
            UsnRecord::V3(r) => r.file_attributes,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.file_attributes() & file_attributes::DIRECTORY != 0
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        let raw = match self {
            UsnRecord::V2(r) => r.timestamp,
            UsnRecord::V3(r) => r.timestamp,
        };
        filetime_to_datetime(raw)
    }

    pub fn change_reason(&self) -> ChangeReason {
        ChangeReason::from_usn_reason(self.reason())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            UsnRecord::V2(r) => r.to_bytes(),
            UsnRecord::V3(r) => r.to_bytes(),
        }
    }
}

/// Framing of a USN output buffer: 8-byte continuation, then records
/// with `RecordLength` at 0 and `MajorVersion` at 4
pub struct UsnFamily;

impl RecordFamily for UsnFamily {
    type Record = UsnRecord;

    const NAME: &'static str = "USN_RECORD";
    const FRAMING: Framing = Framing {
        header_len: 8,
        length_offset: 0,
        tag_offset: 4,
    };

    fn decode_record(tag: u16, record: &[u8]) -> Result<UsnRecord, FormatError> {
        match tag {
            UsnRecordV2::MAJOR_VERSION => UsnRecordV2::from_bytes(record).map(UsnRecord::V2),
            UsnRecordV3::MAJOR_VERSION => UsnRecordV3::from_bytes(record).map(UsnRecord::V3),
            _ => Err(FormatError::UnknownVariant {
                family: Self::NAME,
                tag,
            }),
        }
    }
}

/// Split a USN output buffer into its continuation value and records
fn decode_usn_page(payload: &[u8]) -> Result<(u64, Vec<UsnRecord>, Vec<FormatError>), FormatError> {
    let next = FieldReader::new(payload).u64(0)?;
    let (records, rejected) = decode_stream_lenient::<UsnFamily>(payload);
    Ok((next, records, rejected))
}

// ============================================================================
// Paged Queries
// ============================================================================

/// Walk every USN record on the volume (`FSCTL_ENUM_USN_DATA`)
///
/// Cursor is the file reference number to resume from.
#[derive(Debug, Clone)]
pub struct EnumUsnData {
    pub low_usn: i64,
    pub high_usn: i64,
    pub min_major_version: u16,
    pub max_major_version: u16,
    pub page_size: usize,
}

impl PagedQuery for EnumUsnData {
    type Cursor = u64;
    type Record = UsnRecord;

    const NAME: &'static str = "FSCTL_ENUM_USN_DATA";

    fn control_code(&self) -> ControlCode {
        FSCTL_ENUM_USN_DATA
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn encode_input(&self, cursor: &u64) -> Vec<u8> {
        MftEnumData {
            start_file_reference_number: *cursor,
            low_usn: self.low_usn,
            high_usn: self.high_usn,
            min_major_version: self.min_major_version,
            max_major_version: self.max_major_version,
        }
        .encode()
    }

    fn decode_page(
        &mut self,
        _cursor: &u64,
        response: &ControlResponse,
    ) -> Result<Page<UsnRecord, u64>, FormatError> {
        let (next_frn, records, rejected) = decode_usn_page(&response.payload)?;
        let finished = next_frn == 0 || (records.is_empty() && rejected.is_empty());

        Ok(Page {
            records,
            rejected,
            next: (!finished).then_some(next_frn),
        })
    }
}

/// Replay journal changes from a USN (`FSCTL_READ_USN_JOURNAL`)
///
/// Never waits for new records: the query ends at the first empty page.
#[derive(Debug, Clone)]
pub struct ReadUsnJournal {
    pub usn_journal_id: u64,
    pub reason_mask: u32,
    pub return_only_on_close: bool,
    pub page_size: usize,
}

impl PagedQuery for ReadUsnJournal {
    type Cursor = i64;
    type Record = UsnRecord;

    const NAME: &'static str = "FSCTL_READ_USN_JOURNAL";

    fn control_code(&self) -> ControlCode {
        FSCTL_READ_USN_JOURNAL
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn encode_input(&self, cursor: &i64) -> Vec<u8> {
        ReadUsnJournalData {
            start_usn: *cursor,
            reason_mask: self.reason_mask,
            return_only_on_close: self.return_only_on_close,
            timeout: 0,
            bytes_to_wait_for: 0,
            usn_journal_id: self.usn_journal_id,
        }
        .encode()
    }

    fn decode_page(
        &mut self,
        _cursor: &i64,
        response: &ControlResponse,
    ) -> Result<Page<UsnRecord, i64>, FormatError> {
        let (next_usn, records, rejected) = decode_usn_page(&response.payload)?;
        let finished = records.is_empty() && rejected.is_empty();

        Ok(Page {
            records,
            rejected,
            next: (!finished).then_some(next_usn as i64),
        })
    }
}

// ============================================================================
// Change Reasons
// ============================================================================

/// Type of change that occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeReason {
    Created,
    Deleted,
    Modified,
    RenamedFrom,
    RenamedTo,
    AttributeChange,
    SecurityChange,
    Other(u32),
}

impl ChangeReason {
    /// Pick the most significant change from a reason mask
    pub fn from_usn_reason(reason: u32) -> Self {
        if (reason & usn_reason::FILE_CREATE) != 0 {
            ChangeReason::Created
        } else if (reason & usn_reason::FILE_DELETE) != 0 {
            ChangeReason::Deleted
        } else if (reason & usn_reason::RENAME_OLD_NAME) != 0 {
            ChangeReason::RenamedFrom
        } else if (reason & usn_reason::RENAME_NEW_NAME) != 0 {
            ChangeReason::RenamedTo
        } else if (reason & usn_reason::SECURITY_CHANGE) != 0 {
            ChangeReason::SecurityChange
        } else if (reason & usn_reason::BASIC_INFO_CHANGE) != 0 {
            ChangeReason::AttributeChange
        } else if (reason
            & (usn_reason::DATA_OVERWRITE | usn_reason::DATA_EXTEND | usn_reason::DATA_TRUNCATION))
            != 0
        {
            ChangeReason::Modified
        } else {
            ChangeReason::Other(reason)
        }
    }
}

// USN Reason flags
pub mod usn_reason {
    pub const DATA_OVERWRITE: u32 = 0x00000001;
    pub const DATA_EXTEND: u32 = 0x00000002;
    pub const DATA_TRUNCATION: u32 = 0x00000004;
    pub const NAMED_DATA_OVERWRITE: u32 = 0x00000010;
    pub const NAMED_DATA_EXTEND: u32 = 0x00000020;
    pub const NAMED_DATA_TRUNCATION: u32 = 0x00000040;
    pub const FILE_CREATE: u32 = 0x00000100;
    pub const FILE_DELETE: u32 = 0x00000200;
    pub const EA_CHANGE: u32 = 0x00000400;
    pub const SECURITY_CHANGE: u32 = 0x00000800;
    pub const RENAME_OLD_NAME: u32 = 0x00001000;
    pub const RENAME_NEW_NAME: u32 = 0x00002000;
    pub const INDEXABLE_CHANGE: u32 = 0x00004000;
    pub const BASIC_INFO_CHANGE: u32 = 0x00008000;
    pub const HARD_LINK_CHANGE: u32 = 0x00010000;
    pub const COMPRESSION_CHANGE: u32 = 0x00020000;
    pub const ENCRYPTION_CHANGE: u32 = 0x00040000;
    pub const OBJECT_ID_CHANGE: u32 = 0x00080000;
    pub const REPARSE_POINT_CHANGE: u32 = 0x00100000;
    pub const STREAM_CHANGE: u32 = 0x00200000;
    pub const CLOSE: u32 = 0x80000000;

    pub const ALL: u32 = 0xFFFFFFFF;
}

pub mod file_attributes {
    pub const READONLY: u32 = 0x00000001;
    pub const HIDDEN: u32 = 0x00000002;
    pub const SYSTEM: u32 = 0x00000004;
    pub const DIRECTORY: u32 = 0x00000010;
    pub const ARCHIVE: u32 = 0x00000020;
    pub const NORMAL: u32 = 0x00000080;
    pub const SPARSE_FILE: u32 = 0x00000200;
    pub const REPARSE_POINT: u32 = 0x00000400;
    pub const COMPRESSED: u32 = 0x00000800;
}

// ============================================================================
// FILETIME conversion
// ============================================================================

/// Convert Windows FILETIME (100-nanosecond intervals since 1601) to UTC
///
/// Values before the Unix epoch clamp to it.
pub fn filetime_to_datetime(filetime: i64) -> DateTime<Utc> {
    // Difference between 1601 and 1970 in 100-nanosecond intervals
    const EPOCH_DIFF: i64 = 116_444_736_000_000_000;

    let since_epoch = filetime.saturating_sub(EPOCH_DIFF).max(0);
    let secs = since_epoch / 10_000_000;
    let nanos = (since_epoch % 10_000_000) as u32 * 100;
    DateTime::from_timestamp(secs, nanos).unwrap_or_default()
}
