//! Device facade against a scripted invoker
//!
//! These tests drive every multi-call protocol end to end without a real
//! volume: buffer growth, cursor resumption, end-of-data handling and the
//! way partial results survive a failure.

mod common;

use common::{pointers_page, ranges_page, usn_page, v2_record, v3_record, ScriptedDevice};
use devctl::error::ERROR_JOURNAL_NOT_ACTIVE;
use devctl::fsctl::stats::{FileSystemStatistics, FsSpecificStatistics, NtfsStatistics};
use devctl::registry::*;
use devctl::{
    CodecConfig, DevCtlError, Device, Extent, FileSystemStatisticsRecord, FormatError,
    UnknownVariantPolicy,
};

// ============================================================================
// Buffer Growth
// ============================================================================

#[test]
fn volume_bitmap_resizes_once_from_embedded_size() {
    let mut header = Vec::new();
    header.extend_from_slice(&0u64.to_le_bytes());
    header.extend_from_slice(&1000u64.to_le_bytes());

    let mut partial = header.clone();
    partial.resize(128, 0xFF);

    let mut full = header;
    full.extend(std::iter::repeat(0xFF).take(10));
    full.resize(16 + 125, 0);

    let device = ScriptedDevice::new().more_data(partial).success(full);
    let mut device = Device::new(device);

    let bitmap = device.volume_bitmap(0).unwrap();
    assert_eq!(bitmap.cluster_count(), 1000);
    assert_eq!(bitmap.free_clusters(), 920);
    assert_eq!(bitmap.is_allocated(79), Some(true));
    assert_eq!(bitmap.is_allocated(80), Some(false));

    let scripted = device.get_ref();
    assert_eq!(scripted.capacities(), vec![128, 141]);
    assert!(scripted.calls.iter().all(|c| c.code == FSCTL_GET_VOLUME_BITMAP));
    assert_eq!(scripted.calls[0].input_u64(0), 0);
}

#[test]
fn statistics_double_until_every_processor_fits() {
    let record = FileSystemStatisticsRecord {
        common: FileSystemStatistics {
            version: 1,
            user_file_reads: 42,
            ..Default::default()
        },
        specific: FsSpecificStatistics::Ntfs(NtfsStatistics::default()),
    };
    let mut payload = record.to_bytes();
    payload.extend(record.to_bytes());
    assert_eq!(payload.len(), 640);

    let device = ScriptedDevice::new().more_data(Vec::new()).success(payload);
    let mut device = Device::new(device);

    let stats = device.filesystem_statistics();
    assert!(stats.is_complete());
    assert_eq!(stats.pages, 1);
    assert_eq!(stats.records.len(), 2);
    assert_eq!(stats.records[1].common.user_file_reads, 42);
    assert_eq!(device.get_ref().capacities(), vec![16 * 1024, 32 * 1024]);
}

#[test]
fn growth_stops_at_attempt_cap() {
    let device = ScriptedDevice::new()
        .respond(122, Vec::new())
        .respond(122, Vec::new())
        .respond(122, Vec::new());
    let mut device = Device::new(device);

    let stats = device.filesystem_statistics();
    assert!(stats.records.is_empty());
    assert!(matches!(
        stats.error,
        Some(DevCtlError::SizeNegotiationFailed { attempts: 2, .. })
    ));
    assert_eq!(device.get_ref().calls.len(), 2);
}

// ============================================================================
// Change Journal
// ============================================================================

#[test]
fn enum_usn_data_follows_file_reference_cursor() {
    let device = ScriptedDevice::new()
        .success(usn_page(0x100, &[v2_record(0x10, 1, "a.txt"), v2_record(0x20, 2, "b.txt")]))
        .success(usn_page(0x200, &[v3_record(0x30, 3, "c.txt")]));
    let mut device = Device::new(device);

    let result = device.enum_usn_data(0, i64::MAX);
    assert!(result.is_complete());
    assert_eq!(result.pages, 2);

    let names: Vec<_> = result.records.iter().map(|r| r.file_name()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    assert_eq!(result.records[2].major_version(), 3);

    // Third call gets ERROR_HANDLE_EOF from the exhausted script
    let calls = &device.get_ref().calls;
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].input_u64(0), 0);
    assert_eq!(calls[1].input_u64(0), 0x100);
    assert_eq!(calls[2].input_u64(0), 0x200);
    assert_eq!(calls[0].input_i64(16), i64::MAX);
    assert!(calls.iter().all(|c| c.code == FSCTL_ENUM_USN_DATA && c.capacity == 64 * 1024));
}

#[test]
fn read_journal_stops_on_empty_page() {
    let device = ScriptedDevice::new()
        .success(usn_page(500, &[v2_record(0x10, 300, "x"), v2_record(0x11, 400, "y")]))
        .success(usn_page(500, &[]));
    let mut device = Device::new(device);

    let result = device.read_usn_journal(0xABCD, 300, u32::MAX);
    assert!(result.is_complete());
    assert_eq!(result.records.len(), 2);
    assert_eq!(result.pages, 2);

    let calls = &device.get_ref().calls;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].input_i64(0), 300);
    assert_eq!(calls[1].input_i64(0), 500);
    assert_eq!(calls[1].input_u64(32), 0xABCD);
}

#[test]
fn journal_not_active_is_reported() {
    let device = ScriptedDevice::new()
        .respond(ERROR_JOURNAL_NOT_ACTIVE, Vec::new())
        .respond(ERROR_JOURNAL_NOT_ACTIVE, Vec::new());
    let mut device = Device::new(device);

    let err = device.query_usn_journal().unwrap_err();
    assert!(err.is_journal_not_active());

    let result = device.read_usn_journal(1, 0, u32::MAX);
    assert!(result.records.is_empty());
    assert!(result.error.is_some_and(|e| e.is_journal_not_active()));
}

#[test]
fn unknown_record_versions_become_diagnostics() {
    let mut v4 = v2_record(0x20, 2, "future");
    v4[4..6].copy_from_slice(&4u16.to_le_bytes());
    let page = usn_page(0, &[v2_record(0x10, 1, "a"), v4, v2_record(0x30, 3, "b")]);

    let mut device = Device::new(ScriptedDevice::new().success(page.clone()));
    let result = device.enum_usn_data(0, i64::MAX);
    assert!(result.is_complete());
    assert_eq!(result.records.len(), 2);
    assert_eq!(
        result.diagnostics,
        vec![FormatError::UnknownVariant { family: "USN_RECORD", tag: 4 }]
    );

    let config = CodecConfig::default().with_unknown_variants(UnknownVariantPolicy::Fail);
    let mut strict = Device::with_config(ScriptedDevice::new().success(page), config).unwrap();
    let result = strict.enum_usn_data(0, i64::MAX);
    assert_eq!(result.records.len(), 2);
    assert!(matches!(
        result.error,
        Some(DevCtlError::Format(FormatError::UnknownVariant { tag: 4, .. }))
    ));
}

#[test]
fn page_limit_keeps_what_was_read() {
    let device = ScriptedDevice::new()
        .success(usn_page(0x100, &[v2_record(0x10, 1, "a")]))
        .success(usn_page(0x200, &[v2_record(0x20, 2, "b")]))
        .success(usn_page(0x300, &[v2_record(0x30, 3, "c")]));
    let config = CodecConfig::default().with_max_pages(Some(2));
    let mut device = Device::with_config(device, config).unwrap();

    let result = device.enum_usn_data(0, i64::MAX);
    assert_eq!(result.records.len(), 2);
    assert_eq!(device.get_ref().calls.len(), 2);

    let err = result.error.unwrap();
    assert!(matches!(err, DevCtlError::PageLimitExceeded(2)));
    assert!(err.is_recoverable());
}

// ============================================================================
// Extents
// ============================================================================

#[test]
fn retrieval_pointers_resume_after_more_data() {
    let device = ScriptedDevice::new()
        .more_data(pointers_page(0, &[(10, 100), (20, -1)]))
        .success(pointers_page(20, &[(35, 500)]));
    let mut device = Device::new(device);

    let result = device.retrieval_pointers(0);
    assert!(result.is_complete());
    assert_eq!(
        result.records,
        vec![
            Extent { vcn: 0, cluster_count: 10, lcn: Some(100) },
            Extent { vcn: 10, cluster_count: 10, lcn: None },
            Extent { vcn: 20, cluster_count: 15, lcn: Some(500) },
        ]
    );

    let calls = &device.get_ref().calls;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].input_u64(0), 20);
}

#[test]
fn allocated_ranges_resume_at_last_end() {
    let device = ScriptedDevice::new()
        .more_data(ranges_page(&[(0, 4096), (65536, 4096)]))
        .success(ranges_page(&[(131072, 8192)]));
    let mut device = Device::new(device);

    let result = device.allocated_ranges(0, 1_000_000);
    assert!(result.is_complete());
    assert_eq!(result.records.len(), 3);
    assert_eq!(result.records[2].end(), 139264);

    let calls = &device.get_ref().calls;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].input_i64(8), 1_000_000);
    assert_eq!(calls[1].input_i64(0), 69632);
    assert_eq!(calls[1].input_i64(8), 1_000_000 - 69632);
}

// ============================================================================
// Fixed Queries and Commands
// ============================================================================

#[test]
fn short_fixed_response_is_truncated() {
    let mut device = Device::new(ScriptedDevice::new().success(vec![0u8; 40]));

    match device.ntfs_volume_data() {
        Err(DevCtlError::Format(FormatError::Truncated { needed, available })) => {
            assert_eq!(needed, 0x60);
            assert_eq!(available, 40);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(device.get_ref().capacities(), vec![0x60]);
}

#[test]
fn file_record_is_bounded_by_reported_length() {
    let mut payload = Vec::new();
    payload.extend_from_slice(&40u64.to_le_bytes());
    payload.extend_from_slice(&1024u32.to_le_bytes());
    payload.extend(std::iter::repeat(0xAB).take(1024));

    let mut device = Device::new(ScriptedDevice::new().success(payload));
    let record = device.ntfs_file_record(42, 1024).unwrap();

    assert_eq!(record.file_reference_number, 40);
    assert_eq!(record.record.len(), 1024);

    let call = &device.get_ref().calls[0];
    assert_eq!(call.code, FSCTL_GET_NTFS_FILE_RECORD);
    assert_eq!(call.capacity, 12 + 1024);
    assert_eq!(call.input_u64(0), 42);
}

#[test]
fn commands_send_packed_input_without_output() {
    let device = ScriptedDevice::new().success(Vec::new()).success(Vec::new());
    let mut device = Device::new(device);

    device.set_sparse(true).unwrap();
    device.set_zero_data(4096, 8192).unwrap();

    let calls = &device.get_ref().calls;
    assert_eq!(calls[0].code, FSCTL_SET_SPARSE);
    assert_eq!(calls[0].input.as_deref(), Some(&[1u8][..]));
    assert_eq!(calls[1].code, FSCTL_SET_ZERO_DATA);
    assert_eq!(calls[1].input_i64(0), 4096);
    assert_eq!(calls[1].input_i64(8), 12288);
    assert!(calls.iter().all(|c| c.capacity == 0));
}

#[test]
fn move_file_sends_move_file_data() {
    let mut device = Device::new(ScriptedDevice::new().success(Vec::new()));

    device.move_file(0x1A4, 16, 90_000, 8).unwrap();

    let call = &device.get_ref().calls[0];
    assert_eq!(call.code, FSCTL_MOVE_FILE);
    assert_eq!(call.capacity, 0);
    assert_eq!(call.input.as_ref().map(Vec::len), Some(32));
    assert_eq!(call.input_u64(8), 16);
    assert_eq!(call.input_u64(16), 90_000);

    let input = call.input.as_deref().unwrap();
    assert_eq!(input[24..28], 8u32.to_le_bytes());
    assert_eq!(input[..4], 0x1A4u32.to_le_bytes());
}

#[test]
fn end_of_data_on_single_call_is_platform_error() {
    let device = ScriptedDevice::new()
        .respond(38, Vec::new())
        .respond(38, Vec::new())
        .respond(38, Vec::new())
        .respond(38, Vec::new());
    let mut device = Device::new(device);

    let err = device.ntfs_volume_data().unwrap_err();
    assert_eq!(err.platform_status(), Some(38));

    let err = device.compression().unwrap_err();
    assert_eq!(err.platform_status(), Some(38));

    let err = device.volume_bitmap(0).unwrap_err();
    assert_eq!(err.platform_status(), Some(38));

    let err = device.set_sparse(true).unwrap_err();
    assert_eq!(err.platform_status(), Some(38));

    assert_eq!(device.get_ref().calls.len(), 4);
}

#[test]
fn platform_status_passes_through() {
    let mut device = Device::new(ScriptedDevice::new().respond(5, Vec::new()));

    let err = device.set_sparse(false).unwrap_err();
    assert_eq!(err.platform_status(), Some(5));
    assert!(!err.is_recoverable());
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let config = CodecConfig::default().with_max_size_attempts(0);
    assert!(matches!(
        Device::with_config(ScriptedDevice::new(), config),
        Err(DevCtlError::ConfigError(_))
    ));
}
