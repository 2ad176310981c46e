//! Device facade
//!
//! [`Device`] owns an operation invoker and a [`CodecConfig`] and exposes
//! one method per supported operation. Every method takes `&mut self`, so
//! calls on one handle are serialised by the borrow checker.

use crate::codec::invoke::{
    invoke_with_growth, Completion, ControlRequest, ControlResponse, DeviceControl, Sizing,
    ERROR_HANDLE_EOF,
};
use crate::codec::layout::{decode, FieldReader, FixedRecord};
use crate::codec::paging::{enumerate, Enumerated};
use crate::codec::control_code::ControlCode;
use crate::config::CodecConfig;
use crate::error::{DevCtlError, Result};
use crate::fsctl::extents::{AllocatedRange, AllocatedRanges, Extent, RetrievalPointers};
use crate::fsctl::stats::{FileSystemStatisticsQuery, FileSystemStatisticsRecord};
use crate::fsctl::usn::{EnumUsnData, ReadUsnJournal, UsnJournalData, UsnRecord};
use crate::fsctl::volume::{
    CompressionFormat, DiskGeometry, LengthInformation, MoveFileData, NtfsFileRecord,
    NtfsFileRecordInput, NtfsVolumeData, RetrievalPointerBase, StartingLcn, VolumeBitmap,
    ZeroDataRange, NTFS_FILE_RECORD_OUTPUT_HEADER,
};
use crate::registry::*;

/// A device handle plus the codec settings used to talk to it
pub struct Device<D> {
    inner: D,
    config: CodecConfig,
}

impl<D: DeviceControl> Device<D> {
    /// Wrap an invoker with the default configuration
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            config: CodecConfig::default(),
        }
    }

    pub fn with_config(inner: D, config: CodecConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { inner, config })
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn get_ref(&self) -> &D {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut D {
        &mut self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }

    // ========================================================================
    // Generic Calls
    // ========================================================================

    /// Issue one call, growing the output buffer as `sizing` dictates
    ///
    /// Status 38 only ends paged queries. On a single call it is returned
    /// as a platform error.
    pub fn invoke(
        &mut self,
        code: ControlCode,
        input: Option<&[u8]>,
        initial_size: usize,
        sizing: Sizing,
    ) -> Result<ControlResponse> {
        let request = ControlRequest {
            code,
            input,
            output_size: initial_size,
        };
        let attempts = self.config.max_size_attempts;
        let response = invoke_with_growth(&mut self.inner, request, sizing, attempts)?;
        if response.completion == Completion::EndOfData {
            return Err(DevCtlError::from_win32(code, ERROR_HANDLE_EOF));
        }
        Ok(response)
    }

    /// Issue a call whose output is a single fixed structure
    pub fn query_fixed<T: FixedRecord>(
        &mut self,
        code: ControlCode,
        input: Option<&[u8]>,
    ) -> Result<T> {
        let response = self.invoke(code, input, T::LAYOUT.size, Sizing::Doubling)?;
        Ok(decode(&response.payload)?)
    }

    /// Issue an input-only command
    pub fn command(&mut self, code: ControlCode, input: &[u8]) -> Result<()> {
        self.invoke(code, Some(input), 0, Sizing::Doubling).map(|_| ())
    }

    // ========================================================================
    // Fixed Queries
    // ========================================================================

    pub fn ntfs_volume_data(&mut self) -> Result<NtfsVolumeData> {
        self.query_fixed(FSCTL_GET_NTFS_VOLUME_DATA, None)
    }

    /// Query the change journal; fails with status 1178 when it is not active
    pub fn query_usn_journal(&mut self) -> Result<UsnJournalData> {
        self.query_fixed(FSCTL_QUERY_USN_JOURNAL, None)
    }

    pub fn retrieval_pointer_base(&mut self) -> Result<RetrievalPointerBase> {
        self.query_fixed(FSCTL_GET_RETRIEVAL_POINTER_BASE, None)
    }

    pub fn drive_geometry(&mut self) -> Result<DiskGeometry> {
        self.query_fixed(IOCTL_DISK_GET_DRIVE_GEOMETRY, None)
    }

    pub fn length_info(&mut self) -> Result<LengthInformation> {
        self.query_fixed(IOCTL_DISK_GET_LENGTH_INFO, None)
    }

    pub fn compression(&mut self) -> Result<CompressionFormat> {
        let response = self.invoke(FSCTL_GET_COMPRESSION, None, 2, Sizing::Doubling)?;
        let format = FieldReader::new(&response.payload).u16(0)?;
        Ok(CompressionFormat::from_u16(format))
    }

    /// Fetch the MFT record at or below `file_reference_number`
    ///
    /// The driver returns the closest in-use record, so check the
    /// reference in the result before trusting it.
    pub fn ntfs_file_record(
        &mut self,
        file_reference_number: u64,
        bytes_per_record: u32,
    ) -> Result<NtfsFileRecord> {
        let input = NtfsFileRecordInput { file_reference_number }.encode();
        let initial = NTFS_FILE_RECORD_OUTPUT_HEADER.size + bytes_per_record as usize;
        let response = self.invoke(
            FSCTL_GET_NTFS_FILE_RECORD,
            Some(&input),
            initial,
            Sizing::Doubling,
        )?;
        Ok(NtfsFileRecord::from_bytes(&response.payload)?)
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub fn set_compression(&mut self, format: CompressionFormat) -> Result<()> {
        self.command(FSCTL_SET_COMPRESSION, &format.as_u16().to_le_bytes())
    }

    pub fn set_sparse(&mut self, sparse: bool) -> Result<()> {
        self.command(FSCTL_SET_SPARSE, &[sparse as u8])
    }

    /// Zero `length` bytes starting at `offset`, deallocating where possible
    pub fn set_zero_data(&mut self, offset: i64, length: i64) -> Result<()> {
        let range = ZeroDataRange {
            file_offset: offset,
            beyond_final_zero: offset.saturating_add(length),
        };
        self.command(FSCTL_SET_ZERO_DATA, &range.encode())
    }

    /// Move `cluster_count` clusters of a file to `starting_lcn`
    ///
    /// Issued against the volume; `file_handle` is the raw handle value of
    /// the file being moved.
    pub fn move_file(
        &mut self,
        file_handle: usize,
        starting_vcn: u64,
        starting_lcn: u64,
        cluster_count: u32,
    ) -> Result<()> {
        let input = MoveFileData {
            file_handle,
            starting_vcn,
            starting_lcn,
            cluster_count,
        };
        self.command(FSCTL_MOVE_FILE, &input.encode())
    }

    // ========================================================================
    // Paginated Queries
    // ========================================================================

    /// Enumerate every USN record with a USN in `[low_usn, high_usn]`
    pub fn enum_usn_data(&mut self, low_usn: i64, high_usn: i64) -> Enumerated<UsnRecord> {
        let mut query = EnumUsnData {
            low_usn,
            high_usn,
            min_major_version: self.config.usn_min_major_version,
            max_major_version: self.config.usn_max_major_version,
            page_size: self.config.usn_page_size,
        };
        enumerate(&mut self.inner, &mut query, 0, &self.config)
    }

    /// Replay journal records from `start_usn` until the journal is drained
    pub fn read_usn_journal(
        &mut self,
        usn_journal_id: u64,
        start_usn: i64,
        reason_mask: u32,
    ) -> Enumerated<UsnRecord> {
        let mut query = ReadUsnJournal {
            usn_journal_id,
            reason_mask,
            return_only_on_close: false,
            page_size: self.config.usn_page_size,
        };
        enumerate(&mut self.inner, &mut query, start_usn, &self.config)
    }

    /// Extent map of the open file from `start_vcn` onwards
    pub fn retrieval_pointers(&mut self, start_vcn: u64) -> Enumerated<Extent> {
        let mut query = RetrievalPointers::new(self.config.extent_page_size);
        enumerate(&mut self.inner, &mut query, start_vcn, &self.config)
    }

    /// Allocated ranges of the open file within `[offset, offset + length)`
    pub fn allocated_ranges(&mut self, offset: i64, length: i64) -> Enumerated<AllocatedRange> {
        let mut query = AllocatedRanges {
            end: offset.saturating_add(length),
            page_size: self.config.range_page_size,
        };
        enumerate(&mut self.inner, &mut query, offset, &self.config)
    }

    // ========================================================================
    // Sized Queries
    // ========================================================================

    /// Per-processor filesystem statistics
    pub fn filesystem_statistics(&mut self) -> Enumerated<FileSystemStatisticsRecord> {
        let mut query = FileSystemStatisticsQuery {
            initial_size: self.config.statistics_initial_size,
        };
        enumerate(&mut self.inner, &mut query, (), &self.config)
    }

    /// Allocation bitmap of the volume from `start_lcn` onwards
    pub fn volume_bitmap(&mut self, start_lcn: u64) -> Result<VolumeBitmap> {
        let input = StartingLcn { starting_lcn: start_lcn }.encode();
        let response = self.invoke(
            FSCTL_GET_VOLUME_BITMAP,
            Some(&input),
            self.config.bitmap_probe_size,
            Sizing::Embedded(VolumeBitmap::required_size),
        )?;
        Ok(VolumeBitmap::from_bytes(&response.payload)?)
    }
}
