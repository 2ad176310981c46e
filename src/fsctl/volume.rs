//! Fixed-size volume and disk structures

use crate::codec::bitmap;
use crate::codec::layout::{Field, FieldReader, FieldWriter, FixedRecord, Layout};
use crate::error::FormatError;
use serde::Serialize;

// ============================================================================
// NTFS Volume Data (FSCTL_GET_NTFS_VOLUME_DATA)
// ============================================================================

pub const NTFS_VOLUME_DATA_BUFFER: Layout = Layout::new(
    "NTFS_VOLUME_DATA_BUFFER",
    0x60,
    &[
        Field::new("VolumeSerialNumber", 0x00, 8),
        Field::new("NumberSectors", 0x08, 8),
        Field::new("TotalClusters", 0x10, 8),
        Field::new("FreeClusters", 0x18, 8),
        Field::new("TotalReserved", 0x20, 8),
        Field::new("BytesPerSector", 0x28, 4),
        Field::new("BytesPerCluster", 0x2C, 4),
        Field::new("BytesPerFileRecordSegment", 0x30, 4),
        Field::new("ClustersPerFileRecordSegment", 0x34, 4),
        Field::new("MftValidDataLength", 0x38, 8),
        Field::new("MftStartLcn", 0x40, 8),
        Field::new("Mft2StartLcn", 0x48, 8),
        Field::new("MftZoneStart", 0x50, 8),
        Field::new("MftZoneEnd", 0x58, 8),
    ],
);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NtfsVolumeData {
    pub volume_serial_number: u64,
    pub number_sectors: u64,
    pub total_clusters: u64,
    pub free_clusters: u64,
    pub total_reserved: u64,
    pub bytes_per_sector: u32,
    pub bytes_per_cluster: u32,
    pub bytes_per_file_record_segment: u32,
    pub clusters_per_file_record_segment: u32,
    pub mft_valid_data_length: u64,
    pub mft_start_lcn: u64,
    pub mft2_start_lcn: u64,
    pub mft_zone_start: u64,
    pub mft_zone_end: u64,
}

impl NtfsVolumeData {
    /// Byte offset of the MFT on disk
    pub fn mft_byte_offset(&self) -> u64 {
        self.mft_start_lcn.saturating_mul(self.bytes_per_cluster as u64)
    }

    /// Estimate total MFT records
    pub fn estimated_mft_records(&self) -> u64 {
        match self.bytes_per_file_record_segment {
            0 => 0,
            size => self.mft_valid_data_length / size as u64,
        }
    }
}

impl FixedRecord for NtfsVolumeData {
    const LAYOUT: &'static Layout = &NTFS_VOLUME_DATA_BUFFER;

    fn read(r: &FieldReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            volume_serial_number: r.u64(0x00)?,
            number_sectors: r.u64(0x08)?,
            total_clusters: r.u64(0x10)?,
            free_clusters: r.u64(0x18)?,
            total_reserved: r.u64(0x20)?,
            bytes_per_sector: r.u32(0x28)?,
            bytes_per_cluster: r.u32(0x2C)?,
            bytes_per_file_record_segment: r.u32(0x30)?,
            clusters_per_file_record_segment: r.u32(0x34)?,
            mft_valid_data_length: r.u64(0x38)?,
            mft_start_lcn: r.u64(0x40)?,
            mft2_start_lcn: r.u64(0x48)?,
            mft_zone_start: r.u64(0x50)?,
            mft_zone_end: r.u64(0x58)?,
        })
    }

    fn write(&self, w: &mut FieldWriter) {
        w.put_u64(0x00, self.volume_serial_number)
            .put_u64(0x08, self.number_sectors)
            .put_u64(0x10, self.total_clusters)
            .put_u64(0x18, self.free_clusters)
            .put_u64(0x20, self.total_reserved)
            .put_u32(0x28, self.bytes_per_sector)
            .put_u32(0x2C, self.bytes_per_cluster)
            .put_u32(0x30, self.bytes_per_file_record_segment)
            .put_u32(0x34, self.clusters_per_file_record_segment)
            .put_u64(0x38, self.mft_valid_data_length)
            .put_u64(0x40, self.mft_start_lcn)
            .put_u64(0x48, self.mft2_start_lcn)
            .put_u64(0x50, self.mft_zone_start)
            .put_u64(0x58, self.mft_zone_end);
    }
}

// ============================================================================
// Retrieval Pointer Base (FSCTL_GET_RETRIEVAL_POINTER_BASE)
// ============================================================================

pub const RETRIEVAL_POINTER_BASE: Layout = Layout::new(
    "RETRIEVAL_POINTER_BASE",
    8,
    &[Field::new("FileAreaOffset", 0, 8)],
);

/// Sector offset of cluster 0 relative to the start of the volume
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetrievalPointerBase {
    pub file_area_offset: u64,
}

impl FixedRecord for RetrievalPointerBase {
    const LAYOUT: &'static Layout = &RETRIEVAL_POINTER_BASE;

    fn read(r: &FieldReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            file_area_offset: r.u64(0)?,
        })
    }

    fn write(&self, w: &mut FieldWriter) {
        w.put_u64(0, self.file_area_offset);
    }
}

// ============================================================================
// NTFS File Record (FSCTL_GET_NTFS_FILE_RECORD)
// ============================================================================

pub const NTFS_FILE_RECORD_INPUT_BUFFER: Layout = Layout::new(
    "NTFS_FILE_RECORD_INPUT_BUFFER",
    8,
    &[Field::new("FileReferenceNumber", 0, 8)],
);

pub const NTFS_FILE_RECORD_OUTPUT_HEADER: Layout = Layout::new(
    "NTFS_FILE_RECORD_OUTPUT_BUFFER",
    12,
    &[
        Field::new("FileReferenceNumber", 0, 8),
        Field::new("FileRecordLength", 8, 4),
    ],
);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NtfsFileRecordInput {
    pub file_reference_number: u64,
}

impl FixedRecord for NtfsFileRecordInput {
    const LAYOUT: &'static Layout = &NTFS_FILE_RECORD_INPUT_BUFFER;

    fn read(r: &FieldReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            file_reference_number: r.u64(0)?,
        })
    }

    fn write(&self, w: &mut FieldWriter) {
        w.put_u64(0, self.file_reference_number);
    }
}

/// Raw MFT record returned by the driver
///
/// The driver returns the nearest in-use record at or below the requested
/// one, so `file_reference_number` may differ from what was asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NtfsFileRecord {
    pub file_reference_number: u64,
    pub record: Vec<u8>,
}

impl NtfsFileRecord {
    /// Decode the header plus exactly `FileRecordLength` bytes of record
    pub fn from_bytes(data: &[u8]) -> Result<Self, FormatError> {
        let r = FieldReader::for_layout(data, &NTFS_FILE_RECORD_OUTPUT_HEADER)?;
        let file_reference_number = r.u64(0)?;
        let length = r.u32(8)? as usize;
        let record = r.bytes(NTFS_FILE_RECORD_OUTPUT_HEADER.size, length)?.to_vec();

        Ok(Self {
            file_reference_number,
            record,
        })
    }

    /// Record number (lower 48 bits)
    pub fn record_number(&self) -> u64 {
        self.file_reference_number & 0x0000_FFFF_FFFF_FFFF
    }
}

// ============================================================================
// Volume Bitmap (FSCTL_GET_VOLUME_BITMAP)
// ============================================================================

pub const STARTING_LCN_INPUT_BUFFER: Layout = Layout::new(
    "STARTING_LCN_INPUT_BUFFER",
    8,
    &[Field::new("StartingLcn", 0, 8)],
);

/// Header of VOLUME_BITMAP_BUFFER; the packed bits follow at offset 16
pub const VOLUME_BITMAP_BUFFER: Layout = Layout::new(
    "VOLUME_BITMAP_BUFFER",
    16,
    &[
        Field::new("StartingLcn", 0, 8),
        Field::new("BitmapSize", 8, 8),
    ],
);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartingLcn {
    pub starting_lcn: u64,
}

impl FixedRecord for StartingLcn {
    const LAYOUT: &'static Layout = &STARTING_LCN_INPUT_BUFFER;

    fn read(r: &FieldReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            starting_lcn: r.u64(0)?,
        })
    }

    fn write(&self, w: &mut FieldWriter) {
        w.put_u64(0, self.starting_lcn);
    }
}

/// Cluster allocation state from `starting_lcn` onwards
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VolumeBitmap {
    pub starting_lcn: u64,
    /// One entry per cluster, `true` when allocated
    pub clusters: Vec<bool>,
}

impl VolumeBitmap {
    /// Output size needed for the whole bitmap, read from a partial response
    pub fn required_size(partial: &[u8]) -> Option<usize> {
        let bitmap_size = FieldReader::new(partial).u64(8).ok()?;
        let bytes = usize::try_from(bitmap_size.div_ceil(8)).ok()?;
        bytes.checked_add(VOLUME_BITMAP_BUFFER.size)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, FormatError> {
        let r = FieldReader::for_layout(data, &VOLUME_BITMAP_BUFFER)?;
        let starting_lcn = r.u64(0)?;
        let bitmap_size = r.u64(8)?;
        let bit_count = usize::try_from(bitmap_size).map_err(|_| FormatError::Truncated {
            needed: usize::MAX,
            available: data.len(),
        })?;

        Ok(Self {
            starting_lcn,
            clusters: bitmap::unpack(&data[VOLUME_BITMAP_BUFFER.size..], bit_count)?,
        })
    }

    pub fn cluster_count(&self) -> u64 {
        self.clusters.len() as u64
    }

    pub fn is_allocated(&self, lcn: u64) -> Option<bool> {
        let index = usize::try_from(lcn.checked_sub(self.starting_lcn)?).ok()?;
        self.clusters.get(index).copied()
    }

    pub fn free_clusters(&self) -> u64 {
        self.clusters.iter().filter(|&&used| !used).count() as u64
    }
}

// ============================================================================
// Compression
// ============================================================================

pub const COMPRESSION_STATE: Layout = Layout::new(
    "COMPRESSION_STATE",
    2,
    &[Field::new("CompressionFormat", 0, 2)],
);

/// Compression state of a file or directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompressionFormat {
    None,
    Default,
    Lznt1,
    Xpress,
    XpressHuff,
    Other(u16),
}

impl CompressionFormat {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Default,
            2 => Self::Lznt1,
            3 => Self::Xpress,
            4 => Self::XpressHuff,
            other => Self::Other(other),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Default => 1,
            Self::Lznt1 => 2,
            Self::Xpress => 3,
            Self::XpressHuff => 4,
            Self::Other(value) => value,
        }
    }
}

// ============================================================================
// Zero Data / Sparse (input only)
// ============================================================================

pub const FILE_ZERO_DATA_INFORMATION: Layout = Layout::new(
    "FILE_ZERO_DATA_INFORMATION",
    16,
    &[
        Field::new("FileOffset", 0, 8),
        Field::new("BeyondFinalZero", 8, 8),
    ],
);

/// Byte range to zero: `[file_offset, beyond_final_zero)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZeroDataRange {
    pub file_offset: i64,
    pub beyond_final_zero: i64,
}

impl FixedRecord for ZeroDataRange {
    const LAYOUT: &'static Layout = &FILE_ZERO_DATA_INFORMATION;

    fn read(r: &FieldReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            file_offset: r.i64(0)?,
            beyond_final_zero: r.i64(8)?,
        })
    }

    fn write(&self, w: &mut FieldWriter) {
        w.put_i64(0, self.file_offset).put_i64(8, self.beyond_final_zero);
    }
}

pub const FILE_SET_SPARSE_BUFFER: Layout =
    Layout::new("FILE_SET_SPARSE_BUFFER", 1, &[Field::new("SetSparse", 0, 1)]);

// ============================================================================
// Move File (FSCTL_MOVE_FILE, input only)
// ============================================================================

/// `FileHandle` is pointer-sized; the 8-byte fields stay 8-aligned either way
const HANDLE_WIDTH: usize = std::mem::size_of::<usize>();

pub const MOVE_FILE_DATA: Layout = Layout::new(
    "MOVE_FILE_DATA",
    32,
    &[
        Field::new("FileHandle", 0, HANDLE_WIDTH),
        Field::new("StartingVcn", 8, 8),
        Field::new("StartingLcn", 16, 8),
        Field::new("ClusterCount", 24, 4),
    ],
);

/// Relocate `cluster_count` clusters of an open file to `starting_lcn`
///
/// Sent to the volume handle; `file_handle` is the raw handle of the file
/// being moved, opened on the same volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveFileData {
    pub file_handle: usize,
    pub starting_vcn: u64,
    pub starting_lcn: u64,
    pub cluster_count: u32,
}

impl FixedRecord for MoveFileData {
    const LAYOUT: &'static Layout = &MOVE_FILE_DATA;

    fn read(r: &FieldReader<'_>) -> Result<Self, FormatError> {
        let file_handle = match HANDLE_WIDTH {
            8 => r.u64(0)? as usize,
            _ => r.u32(0)? as usize,
        };
        Ok(Self {
            file_handle,
            starting_vcn: r.u64(8)?,
            starting_lcn: r.u64(16)?,
            cluster_count: r.u32(24)?,
        })
    }

    fn write(&self, w: &mut FieldWriter) {
        match HANDLE_WIDTH {
            8 => w.put_u64(0, self.file_handle as u64),
            _ => w.put_u32(0, self.file_handle as u32),
        };
        w.put_u64(8, self.starting_vcn)
            .put_u64(16, self.starting_lcn)
            .put_u32(24, self.cluster_count);
    }
}

// ============================================================================
// Disk Geometry (IOCTL_DISK_GET_DRIVE_GEOMETRY / IOCTL_DISK_GET_LENGTH_INFO)
// ============================================================================

pub const DISK_GEOMETRY: Layout = Layout::new(
    "DISK_GEOMETRY",
    24,
    &[
        Field::new("Cylinders", 0, 8),
        Field::new("MediaType", 8, 4),
        Field::new("TracksPerCylinder", 12, 4),
        Field::new("SectorsPerTrack", 16, 4),
        Field::new("BytesPerSector", 20, 4),
    ],
);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiskGeometry {
    pub cylinders: i64,
    pub media_type: u32,
    pub tracks_per_cylinder: u32,
    pub sectors_per_track: u32,
    pub bytes_per_sector: u32,
}

impl DiskGeometry {
    /// Capacity implied by the geometry (may be below the true disk length)
    pub fn capacity(&self) -> u64 {
        (self.cylinders.max(0) as u64)
            .saturating_mul(self.tracks_per_cylinder as u64)
            .saturating_mul(self.sectors_per_track as u64)
            .saturating_mul(self.bytes_per_sector as u64)
    }
}

impl FixedRecord for DiskGeometry {
    const LAYOUT: &'static Layout = &DISK_GEOMETRY;

    fn read(r: &FieldReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            cylinders: r.i64(0)?,
            media_type: r.u32(8)?,
            tracks_per_cylinder: r.u32(12)?,
            sectors_per_track: r.u32(16)?,
            bytes_per_sector: r.u32(20)?,
        })
    }

    fn write(&self, w: &mut FieldWriter) {
        w.put_i64(0, self.cylinders)
            .put_u32(8, self.media_type)
            .put_u32(12, self.tracks_per_cylinder)
            .put_u32(16, self.sectors_per_track)
            .put_u32(20, self.bytes_per_sector);
    }
}

pub const GET_LENGTH_INFORMATION: Layout =
    Layout::new("GET_LENGTH_INFORMATION", 8, &[Field::new("Length", 0, 8)]);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LengthInformation {
    pub length: i64,
}

impl FixedRecord for LengthInformation {
    const LAYOUT: &'static Layout = &GET_LENGTH_INFORMATION;

    fn read(r: &FieldReader<'_>) -> Result<Self, FormatError> {
        Ok(Self { length: r.i64(0)? })
    }

    fn write(&self, w: &mut FieldWriter) {
        w.put_i64(0, self.length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::layout::decode;

    #[test]
    fn volume_data_round_trip() {
        let data = NtfsVolumeData {
            volume_serial_number: 0x1234_5678_9ABC_DEF0,
            number_sectors: 1_000_000,
            total_clusters: 125_000,
            free_clusters: 4_000,
            total_reserved: 12,
            bytes_per_sector: 512,
            bytes_per_cluster: 4096,
            bytes_per_file_record_segment: 1024,
            clusters_per_file_record_segment: 0,
            mft_valid_data_length: 1024 * 300,
            mft_start_lcn: 786_432,
            mft2_start_lcn: 2,
            mft_zone_start: 786_432,
            mft_zone_end: 800_000,
        };

        let bytes = data.encode();
        assert_eq!(bytes.len(), 0x60);
        assert_eq!(&bytes[0x28..0x2C], &512u32.to_le_bytes());

        let decoded: NtfsVolumeData = decode(&bytes).unwrap();
        assert_eq!(decoded, data);
        assert_eq!(decoded.estimated_mft_records(), 300);
        assert_eq!(decoded.mft_byte_offset(), 786_432 * 4096);
    }

    #[test]
    fn short_buffers_are_truncated_not_panics() {
        let bytes = NtfsVolumeData::default().encode();
        for len in 0..bytes.len() {
            assert_eq!(
                decode::<NtfsVolumeData>(&bytes[..len]),
                Err(FormatError::Truncated { needed: 0x60, available: len })
            );
        }
        assert!(decode::<DiskGeometry>(&[0u8; 23]).is_err());
    }

    #[test]
    fn file_record_is_bounded_by_its_length() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x0003_0000_0000_0010u64.to_le_bytes());
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(b"FILE-and-slack");

        let record = NtfsFileRecord::from_bytes(&data).unwrap();
        assert_eq!(record.record, b"FILE");
        assert_eq!(record.record_number(), 0x10);

        data[8] = 200;
        assert!(matches!(
            NtfsFileRecord::from_bytes(&data),
            Err(FormatError::Truncated { .. })
        ));
    }

    #[test]
    fn layouts_are_consistent() {
        for layout in [
            &NTFS_VOLUME_DATA_BUFFER,
            &RETRIEVAL_POINTER_BASE,
            &NTFS_FILE_RECORD_OUTPUT_HEADER,
            &FILE_ZERO_DATA_INFORMATION,
            &DISK_GEOMETRY,
            &GET_LENGTH_INFORMATION,
            &STARTING_LCN_INPUT_BUFFER,
            &VOLUME_BITMAP_BUFFER,
            &COMPRESSION_STATE,
            &FILE_SET_SPARSE_BUFFER,
            &MOVE_FILE_DATA,
        ] {
            assert!(layout.is_consistent(), "{}", layout.name);
        }
    }

    #[test]
    fn bitmap_header_sizes_the_buffer() {
        let mut partial = vec![0u8; 16];
        partial[8..16].copy_from_slice(&17u64.to_le_bytes());
        assert_eq!(VolumeBitmap::required_size(&partial), Some(19));
        assert_eq!(VolumeBitmap::required_size(&partial[..8]), None);

        let mut full = partial.clone();
        full[0..8].copy_from_slice(&1000u64.to_le_bytes());
        full.extend_from_slice(&[0b1011_0001, 0b0000_0001, 0b0000_0000]);
        let bitmap = VolumeBitmap::from_bytes(&full).unwrap();

        assert_eq!(bitmap.cluster_count(), 17);
        assert_eq!(bitmap.is_allocated(1000), Some(true));
        assert_eq!(bitmap.is_allocated(1001), Some(false));
        assert_eq!(bitmap.is_allocated(1008), Some(true));
        assert_eq!(bitmap.is_allocated(1017), None);
        assert_eq!(bitmap.is_allocated(999), None);
        assert_eq!(bitmap.free_clusters(), 12);
    }

    #[test]
    fn bitmap_shorter_than_its_size_is_truncated() {
        let mut data = vec![0u8; 16];
        data[8..16].copy_from_slice(&64u64.to_le_bytes());
        data.extend_from_slice(&[0xFF; 4]);
        assert_eq!(
            VolumeBitmap::from_bytes(&data),
            Err(FormatError::Truncated { needed: 8, available: 4 })
        );
    }

    #[test]
    fn geometry_capacity() {
        let geometry = DiskGeometry {
            cylinders: 1024,
            media_type: 12,
            tracks_per_cylinder: 255,
            sectors_per_track: 63,
            bytes_per_sector: 512,
        };
        assert_eq!(decode::<DiskGeometry>(&geometry.encode()).unwrap(), geometry);
        assert_eq!(geometry.capacity(), 1024 * 255 * 63 * 512);
    }

    #[test]
    fn hostile_sizes_saturate() {
        let geometry = DiskGeometry {
            cylinders: i64::MAX,
            media_type: 12,
            tracks_per_cylinder: u32::MAX,
            sectors_per_track: u32::MAX,
            bytes_per_sector: u32::MAX,
        };
        assert_eq!(geometry.capacity(), u64::MAX);

        let data = NtfsVolumeData {
            mft_start_lcn: u64::MAX / 2,
            bytes_per_cluster: 4096,
            ..Default::default()
        };
        assert_eq!(data.mft_byte_offset(), u64::MAX);
    }

    #[test]
    fn move_file_input_layout() {
        let input = MoveFileData {
            file_handle: 0x1A4,
            starting_vcn: 16,
            starting_lcn: 0x0001_0000,
            cluster_count: 8,
        };
        let bytes = input.encode();

        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[0..4], &0x1A4u32.to_le_bytes());
        assert_eq!(&bytes[8..16], &16u64.to_le_bytes());
        assert_eq!(&bytes[16..24], &0x0001_0000u64.to_le_bytes());
        assert_eq!(&bytes[24..28], &8u32.to_le_bytes());
        assert_eq!(&bytes[28..32], &[0u8; 4]);
        assert_eq!(decode::<MoveFileData>(&bytes).unwrap(), input);
    }
}
