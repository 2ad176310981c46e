//! Filesystem and disk control structures
//!
//! This module provides the record families decoded by the codec:
//! - USN change journal enumeration and replay
//! - Per-processor filesystem statistics
//! - Retrieval pointer extents and allocated ranges
//! - Fixed volume, disk and bitmap structures

pub mod extents;
pub mod stats;
pub mod usn;
pub mod volume;

pub use extents::{
    build_extent_map, AllocatedRange, AllocatedRanges, Extent, ExtentMapBuilder, RetrievalPointers,
};
pub use stats::{
    ExFatStatistics, FatStatistics, FileSystemStatistics, FileSystemStatisticsQuery,
    FileSystemStatisticsRecord, FsSpecificStatistics, NtfsStatistics, StatisticsFamily,
};
pub use usn::{
    ChangeReason, EnumUsnData, MftEnumData, ReadUsnJournal, ReadUsnJournalData, UsnFamily,
    UsnJournalData, UsnRecord, UsnRecordV2, UsnRecordV3,
};
pub use volume::{
    CompressionFormat, DiskGeometry, LengthInformation, MoveFileData, NtfsFileRecord,
    NtfsFileRecordInput, NtfsVolumeData, RetrievalPointerBase, StartingLcn, VolumeBitmap,
    ZeroDataRange,
};
