//! Filesystem statistics (FSCTL_FILESYSTEM_GET_STATISTICS)
//!
//! The driver returns one record per processor. Each record is a common
//! FILESYSTEM_STATISTICS header followed by a filesystem-specific block
//! chosen by `FileSystemType`, padded out to `SizeOfCompleteStructure`.

use crate::codec::control_code::ControlCode;
use crate::codec::invoke::{ControlResponse, Sizing};
use crate::codec::layout::{decode, Field, FieldReader, FieldWriter, FixedRecord, Layout};
use crate::codec::paging::{Page, PagedQuery};
use crate::codec::stream::{decode_stream_lenient, Framing, RecordFamily};
use crate::error::FormatError;
use crate::registry::FSCTL_FILESYSTEM_GET_STATISTICS;
use serde::Serialize;

pub const FILESYSTEM_STATISTICS_TYPE_NTFS: u16 = 1;
pub const FILESYSTEM_STATISTICS_TYPE_FAT: u16 = 2;
pub const FILESYSTEM_STATISTICS_TYPE_EXFAT: u16 = 3;

/// Per-processor records are padded to this alignment
const RECORD_ALIGNMENT: usize = 64;

// ============================================================================
// Common Header
// ============================================================================

pub const FILESYSTEM_STATISTICS: Layout = Layout::new(
    "FILESYSTEM_STATISTICS",
    56,
    &[
        Field::new("FileSystemType", 0, 2),
        Field::new("Version", 2, 2),
        Field::new("SizeOfCompleteStructure", 4, 4),
        Field::new("UserFileReads", 8, 4),
        Field::new("UserFileReadBytes", 12, 4),
        Field::new("UserDiskReads", 16, 4),
        Field::new("UserFileWrites", 20, 4),
        Field::new("UserFileWriteBytes", 24, 4),
        Field::new("UserDiskWrites", 28, 4),
        Field::new("MetaDataReads", 32, 4),
        Field::new("MetaDataReadBytes", 36, 4),
        Field::new("MetaDataDiskReads", 40, 4),
        Field::new("MetaDataWrites", 44, 4),
        Field::new("MetaDataWriteBytes", 48, 4),
        Field::new("MetaDataDiskWrites", 52, 4),
    ],
);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileSystemStatistics {
    pub file_system_type: u16,
    pub version: u16,
    pub size_of_complete_structure: u32,
    pub user_file_reads: u32,
    pub user_file_read_bytes: u32,
    pub user_disk_reads: u32,
    pub user_file_writes: u32,
    pub user_file_write_bytes: u32,
    pub user_disk_writes: u32,
    pub meta_data_reads: u32,
    pub meta_data_read_bytes: u32,
    pub meta_data_disk_reads: u32,
    pub meta_data_writes: u32,
    pub meta_data_write_bytes: u32,
    pub meta_data_disk_writes: u32,
}

impl FixedRecord for FileSystemStatistics {
    const LAYOUT: &'static Layout = &FILESYSTEM_STATISTICS;

    fn read(r: &FieldReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            file_system_type: r.u16(0)?,
            version: r.u16(2)?,
            size_of_complete_structure: r.u32(4)?,
            user_file_reads: r.u32(8)?,
            user_file_read_bytes: r.u32(12)?,
            user_disk_reads: r.u32(16)?,
            user_file_writes: r.u32(20)?,
            user_file_write_bytes: r.u32(24)?,
            user_disk_writes: r.u32(28)?,
            meta_data_reads: r.u32(32)?,
            meta_data_read_bytes: r.u32(36)?,
            meta_data_disk_reads: r.u32(40)?,
            meta_data_writes: r.u32(44)?,
            meta_data_write_bytes: r.u32(48)?,
            meta_data_disk_writes: r.u32(52)?,
        })
    }

    fn write(&self, w: &mut FieldWriter) {
        w.put_u16(0, self.file_system_type)
            .put_u16(2, self.version)
            .put_u32(4, self.size_of_complete_structure)
            .put_u32(8, self.user_file_reads)
            .put_u32(12, self.user_file_read_bytes)
            .put_u32(16, self.user_disk_reads)
            .put_u32(20, self.user_file_writes)
            .put_u32(24, self.user_file_write_bytes)
            .put_u32(28, self.user_disk_writes)
            .put_u32(32, self.meta_data_reads)
            .put_u32(36, self.meta_data_read_bytes)
            .put_u32(40, self.meta_data_disk_reads)
            .put_u32(44, self.meta_data_writes)
            .put_u32(48, self.meta_data_write_bytes)
            .put_u32(52, self.meta_data_disk_writes);
    }
}

// ============================================================================
// NTFS
// ============================================================================

pub const NTFS_STATISTICS: Layout = Layout::new(
    "NTFS_STATISTICS",
    212,
    &[
        Field::new("LogFileFullExceptions", 0, 4),
        Field::new("OtherExceptions", 4, 4),
        Field::new("MftReads", 8, 4),
        Field::new("MftReadBytes", 12, 4),
        Field::new("MftWrites", 16, 4),
        Field::new("MftWriteBytes", 20, 4),
        Field::new("MftWritesUserLevel", 24, 8),
        Field::new("MftWritesFlushForLogFileFull", 32, 2),
        Field::new("MftWritesLazyWriter", 34, 2),
        Field::new("MftWritesUserRequest", 36, 2),
        Field::new("Mft2Writes", 40, 4),
        Field::new("Mft2WriteBytes", 44, 4),
        Field::new("Mft2WritesUserLevel", 48, 8),
        Field::new("Mft2WritesFlushForLogFileFull", 56, 2),
        Field::new("Mft2WritesLazyWriter", 58, 2),
        Field::new("Mft2WritesUserRequest", 60, 2),
        Field::new("RootIndexReads", 64, 4),
        Field::new("RootIndexReadBytes", 68, 4),
        Field::new("RootIndexWrites", 72, 4),
        Field::new("RootIndexWriteBytes", 76, 4),
        Field::new("BitmapReads", 80, 4),
        Field::new("BitmapReadBytes", 84, 4),
        Field::new("BitmapWrites", 88, 4),
        Field::new("BitmapWriteBytes", 92, 4),
        Field::new("BitmapWritesFlushForLogFileFull", 96, 2),
        Field::new("BitmapWritesLazyWriter", 98, 2),
        Field::new("BitmapWritesUserRequest", 100, 2),
        Field::new("BitmapWritesUserLevel", 102, 6),
        Field::new("MftBitmapReads", 108, 4),
        Field::new("MftBitmapReadBytes", 112, 4),
        Field::new("MftBitmapWrites", 116, 4),
        Field::new("MftBitmapWriteBytes", 120, 4),
        Field::new("MftBitmapWritesFlushForLogFileFull", 124, 2),
        Field::new("MftBitmapWritesLazyWriter", 126, 2),
        Field::new("MftBitmapWritesUserRequest", 128, 2),
        Field::new("MftBitmapWritesUserLevel", 130, 8),
        Field::new("UserIndexReads", 140, 4),
        Field::new("UserIndexReadBytes", 144, 4),
        Field::new("UserIndexWrites", 148, 4),
        Field::new("UserIndexWriteBytes", 152, 4),
        Field::new("LogFileReads", 156, 4),
        Field::new("LogFileReadBytes", 160, 4),
        Field::new("LogFileWrites", 164, 4),
        Field::new("LogFileWriteBytes", 168, 4),
        Field::new("Allocate", 172, 40),
    ],
);

/// Writes broken down by the user-level operation that caused them
///
/// The bitmap block has no `Flush` counter; it reads as 0 there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserLevelWrites {
    pub write: u16,
    pub create: u16,
    pub set_info: u16,
    pub flush: u16,
}

impl UserLevelWrites {
    fn read(r: &FieldReader<'_>, offset: usize, with_flush: bool) -> Result<Self, FormatError> {
        Ok(Self {
            write: r.u16(offset)?,
            create: r.u16(offset + 2)?,
            set_info: r.u16(offset + 4)?,
            flush: if with_flush { r.u16(offset + 6)? } else { 0 },
        })
    }

    fn write(&self, w: &mut FieldWriter, offset: usize, with_flush: bool) {
        w.put_u16(offset, self.write)
            .put_u16(offset + 2, self.create)
            .put_u16(offset + 4, self.set_info);
        if with_flush {
            w.put_u16(offset + 6, self.flush);
        }
    }
}

/// Writes of one metadata stream, by cause
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSources {
    pub flush_for_log_file_full: u16,
    pub lazy_writer: u16,
    pub user_request: u16,
}

impl WriteSources {
    fn read(r: &FieldReader<'_>, offset: usize) -> Result<Self, FormatError> {
        Ok(Self {
            flush_for_log_file_full: r.u16(offset)?,
            lazy_writer: r.u16(offset + 2)?,
            user_request: r.u16(offset + 4)?,
        })
    }

    fn write(&self, w: &mut FieldWriter, offset: usize) {
        w.put_u16(offset, self.flush_for_log_file_full)
            .put_u16(offset + 2, self.lazy_writer)
            .put_u16(offset + 4, self.user_request);
    }
}

/// Read/write counters shared by several metadata streams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IoCounters {
    pub reads: u32,
    pub read_bytes: u32,
    pub writes: u32,
    pub write_bytes: u32,
}

impl IoCounters {
    fn read(r: &FieldReader<'_>, offset: usize) -> Result<Self, FormatError> {
        Ok(Self {
            reads: r.u32(offset)?,
            read_bytes: r.u32(offset + 4)?,
            writes: r.u32(offset + 8)?,
            write_bytes: r.u32(offset + 12)?,
        })
    }

    fn write(&self, w: &mut FieldWriter, offset: usize) {
        w.put_u32(offset, self.reads)
            .put_u32(offset + 4, self.read_bytes)
            .put_u32(offset + 8, self.writes)
            .put_u32(offset + 12, self.write_bytes);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AllocateStatistics {
    pub calls: u32,
    pub clusters: u32,
    pub hints: u32,
    pub runs_returned: u32,
    pub hints_honored: u32,
    pub hints_clusters: u32,
    pub cache: u32,
    pub cache_clusters: u32,
    pub cache_miss: u32,
    pub cache_miss_clusters: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NtfsStatistics {
    pub log_file_full_exceptions: u32,
    pub other_exceptions: u32,
    pub mft: IoCounters,
    pub mft_writes_user_level: UserLevelWrites,
    pub mft_write_sources: WriteSources,
    pub mft2_writes: u32,
    pub mft2_write_bytes: u32,
    pub mft2_writes_user_level: UserLevelWrites,
    pub mft2_write_sources: WriteSources,
    pub root_index: IoCounters,
    pub bitmap: IoCounters,
    pub bitmap_write_sources: WriteSources,
    pub bitmap_writes_user_level: UserLevelWrites,
    pub mft_bitmap: IoCounters,
    pub mft_bitmap_write_sources: WriteSources,
    pub mft_bitmap_writes_user_level: UserLevelWrites,
    pub user_index: IoCounters,
    pub log_file: IoCounters,
    pub allocate: AllocateStatistics,
}

impl FixedRecord for NtfsStatistics {
    const LAYOUT: &'static Layout = &NTFS_STATISTICS;

    fn read(r: &FieldReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            log_file_full_exceptions: r.u32(0)?,
            other_exceptions: r.u32(4)?,
            mft: IoCounters::read(r, 8)?,
            mft_writes_user_level: UserLevelWrites::read(r, 24, true)?,
            mft_write_sources: WriteSources::read(r, 32)?,
            mft2_writes: r.u32(40)?,
            mft2_write_bytes: r.u32(44)?,
            mft2_writes_user_level: UserLevelWrites::read(r, 48, true)?,
            mft2_write_sources: WriteSources::read(r, 56)?,
            root_index: IoCounters::read(r, 64)?,
            bitmap: IoCounters::read(r, 80)?,
            bitmap_write_sources: WriteSources::read(r, 96)?,
            bitmap_writes_user_level: UserLevelWrites::read(r, 102, false)?,
            mft_bitmap: IoCounters::read(r, 108)?,
            mft_bitmap_write_sources: WriteSources::read(r, 124)?,
            mft_bitmap_writes_user_level: UserLevelWrites::read(r, 130, true)?,
            user_index: IoCounters::read(r, 140)?,
            log_file: IoCounters::read(r, 156)?,
            allocate: AllocateStatistics {
                calls: r.u32(172)?,
                clusters: r.u32(176)?,
                hints: r.u32(180)?,
                runs_returned: r.u32(184)?,
                hints_honored: r.u32(188)?,
                hints_clusters: r.u32(192)?,
                cache: r.u32(196)?,
                cache_clusters: r.u32(200)?,
                cache_miss: r.u32(204)?,
                cache_miss_clusters: r.u32(208)?,
            },
        })
    }

    fn write(&self, w: &mut FieldWriter) {
        w.put_u32(0, self.log_file_full_exceptions)
            .put_u32(4, self.other_exceptions)
            .put_u32(40, self.mft2_writes)
            .put_u32(44, self.mft2_write_bytes);
        self.mft.write(w, 8);
        self.mft_writes_user_level.write(w, 24, true);
        self.mft_write_sources.write(w, 32);
        self.mft2_writes_user_level.write(w, 48, true);
        self.mft2_write_sources.write(w, 56);
        self.root_index.write(w, 64);
        self.bitmap.write(w, 80);
        self.bitmap_write_sources.write(w, 96);
        self.bitmap_writes_user_level.write(w, 102, false);
        self.mft_bitmap.write(w, 108);
        self.mft_bitmap_write_sources.write(w, 124);
        self.mft_bitmap_writes_user_level.write(w, 130, true);
        self.user_index.write(w, 140);
        self.log_file.write(w, 156);

        let a = &self.allocate;
        w.put_u32(172, a.calls)
            .put_u32(176, a.clusters)
            .put_u32(180, a.hints)
            .put_u32(184, a.runs_returned)
            .put_u32(188, a.hints_honored)
            .put_u32(192, a.hints_clusters)
            .put_u32(196, a.cache)
            .put_u32(200, a.cache_clusters)
            .put_u32(204, a.cache_miss)
            .put_u32(208, a.cache_miss_clusters);
    }
}

// ============================================================================
// FAT / exFAT
// ============================================================================

const FAT_COUNTERS: &[Field] = &[
    Field::new("CreateHits", 0, 4),
    Field::new("SuccessfulCreates", 4, 4),
    Field::new("FailedCreates", 8, 4),
    Field::new("NonCachedReads", 12, 4),
    Field::new("NonCachedReadBytes", 16, 4),
    Field::new("NonCachedWrites", 20, 4),
    Field::new("NonCachedWriteBytes", 24, 4),
    Field::new("NonCachedDiskReads", 28, 4),
    Field::new("NonCachedDiskWrites", 32, 4),
];

pub const FAT_STATISTICS: Layout = Layout::new("FAT_STATISTICS", 36, FAT_COUNTERS);
pub const EXFAT_STATISTICS: Layout = Layout::new("EXFAT_STATISTICS", 36, FAT_COUNTERS);

/// FAT and exFAT report the same nine counters under different type tags
macro_rules! fat_statistics {
    ($name:ident, $layout:ident) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
        pub struct $name {
            pub create_hits: u32,
            pub successful_creates: u32,
            pub failed_creates: u32,
            pub non_cached_reads: u32,
            pub non_cached_read_bytes: u32,
            pub non_cached_writes: u32,
            pub non_cached_write_bytes: u32,
            pub non_cached_disk_reads: u32,
            pub non_cached_disk_writes: u32,
        }

        impl FixedRecord for $name {
            const LAYOUT: &'static Layout = &$layout;

            fn read(r: &FieldReader<'_>) -> Result<Self, FormatError> {
                Ok(Self {
                    create_hits: r.u32(0)?,
                    successful_creates: r.u32(4)?,
                    failed_creates: r.u32(8)?,
                    non_cached_reads: r.u32(12)?,
                    non_cached_read_bytes: r.u32(16)?,
                    non_cached_writes: r.u32(20)?,
                    non_cached_write_bytes: r.u32(24)?,
                    non_cached_disk_reads: r.u32(28)?,
                    non_cached_disk_writes: r.u32(32)?,
                })
            }

            fn write(&self, w: &mut FieldWriter) {
                w.put_u32(0, self.create_hits)
                    .put_u32(4, self.successful_creates)
                    .put_u32(8, self.failed_creates)
                    .put_u32(12, self.non_cached_reads)
                    .put_u32(16, self.non_cached_read_bytes)
                    .put_u32(20, self.non_cached_writes)
                    .put_u32(24, self.non_cached_write_bytes)
                    .put_u32(28, self.non_cached_disk_reads)
                    .put_u32(32, self.non_cached_disk_writes);
            }
        }
    };
}

fat_statistics!(FatStatistics, FAT_STATISTICS);
fat_statistics!(ExFatStatistics, EXFAT_STATISTICS);

// ============================================================================
// Per-processor Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FsSpecificStatistics {
    Ntfs(NtfsStatistics),
    Fat(FatStatistics),
    ExFat(ExFatStatistics),
}

impl FsSpecificStatistics {
    pub fn file_system_type(&self) -> u16 {
        match self {
            FsSpecificStatistics::Ntfs(_) => FILESYSTEM_STATISTICS_TYPE_NTFS,
            FsSpecificStatistics::Fat(_) => FILESYSTEM_STATISTICS_TYPE_FAT,
            FsSpecificStatistics::ExFat(_) => FILESYSTEM_STATISTICS_TYPE_EXFAT,
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            FsSpecificStatistics::Ntfs(s) => s.encode(),
            FsSpecificStatistics::Fat(s) => s.encode(),
            FsSpecificStatistics::ExFat(s) => s.encode(),
        }
    }
}

/// Statistics gathered by one processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSystemStatisticsRecord {
    pub common: FileSystemStatistics,
    pub specific: FsSpecificStatistics,
}

impl FileSystemStatisticsRecord {
    /// Build the padded per-processor image, fixing up type and size
    pub fn to_bytes(&self) -> Vec<u8> {
        let specific = self.specific.encode();
        let size = (FILESYSTEM_STATISTICS.size + specific.len()).next_multiple_of(RECORD_ALIGNMENT);

        let common = FileSystemStatistics {
            file_system_type: self.specific.file_system_type(),
            size_of_complete_structure: size as u32,
            ..self.common.clone()
        };

        let mut w = FieldWriter::new(size);
        w.put_bytes(0, &common.encode())
            .put_bytes(FILESYSTEM_STATISTICS.size, &specific);
        w.into_bytes()
    }
}

/// Framing of a statistics buffer: no header, `SizeOfCompleteStructure`
/// at 4 and `FileSystemType` at 0
pub struct StatisticsFamily;

impl RecordFamily for StatisticsFamily {
    type Record = FileSystemStatisticsRecord;

    const NAME: &'static str = "FILESYSTEM_STATISTICS";
    const FRAMING: Framing = Framing {
        header_len: 0,
        length_offset: 4,
        tag_offset: 0,
    };

    fn decode_record(tag: u16, record: &[u8]) -> Result<Self::Record, FormatError> {
        let body = record.get(FILESYSTEM_STATISTICS.size..).unwrap_or_default();
        let specific = match tag {
            FILESYSTEM_STATISTICS_TYPE_NTFS => FsSpecificStatistics::Ntfs(decode(body)?),
            FILESYSTEM_STATISTICS_TYPE_FAT => FsSpecificStatistics::Fat(decode(body)?),
            FILESYSTEM_STATISTICS_TYPE_EXFAT => FsSpecificStatistics::ExFat(decode(body)?),
            _ => {
                return Err(FormatError::UnknownVariant {
                    family: Self::NAME,
                    tag,
                })
            }
        };

        Ok(FileSystemStatisticsRecord {
            common: decode(record)?,
            specific,
        })
    }
}

/// `FSCTL_FILESYSTEM_GET_STATISTICS` as a single-page query
///
/// The driver gives no size hint, so the buffer doubles from
/// `initial_size` until every processor's record fits.
#[derive(Debug, Clone)]
pub struct FileSystemStatisticsQuery {
    pub initial_size: usize,
}

impl PagedQuery for FileSystemStatisticsQuery {
    type Cursor = ();
    type Record = FileSystemStatisticsRecord;

    const NAME: &'static str = "FSCTL_FILESYSTEM_GET_STATISTICS";

    fn control_code(&self) -> ControlCode {
        FSCTL_FILESYSTEM_GET_STATISTICS
    }

    fn page_size(&self) -> usize {
        self.initial_size
    }

    fn sizing(&self) -> Sizing {
        Sizing::Doubling
    }

    fn encode_input(&self, _cursor: &()) -> Vec<u8> {
        Vec::new()
    }

    fn decode_page(
        &mut self,
        _cursor: &(),
        response: &ControlResponse,
    ) -> Result<Page<FileSystemStatisticsRecord, ()>, FormatError> {
        let (records, rejected) = decode_stream_lenient::<StatisticsFamily>(&response.payload);
        Ok(Page {
            records,
            rejected,
            next: None,
        })
    }
}
