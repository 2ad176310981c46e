//! Control code registry
//!
//! Every operation the crate knows about, as plain data: its symbolic
//! name, packed control code and the layouts of its input and output.
//! Variable-length outputs name the layout of their fixed header.

use crate::codec::control_code::{Access, ControlCode, DeviceType, Method};
use crate::codec::layout::Layout;
use crate::fsctl::{extents, stats, usn, volume};

// ============================================================================
// Filesystem Control Codes
// ============================================================================

pub const FSCTL_FILESYSTEM_GET_STATISTICS: ControlCode =
    ControlCode::new(DeviceType::FILE_SYSTEM, 24, Method::Buffered, Access::Any);
pub const FSCTL_GET_NTFS_VOLUME_DATA: ControlCode =
    ControlCode::new(DeviceType::FILE_SYSTEM, 25, Method::Buffered, Access::Any);
pub const FSCTL_GET_NTFS_FILE_RECORD: ControlCode =
    ControlCode::new(DeviceType::FILE_SYSTEM, 26, Method::Buffered, Access::Any);
pub const FSCTL_GET_VOLUME_BITMAP: ControlCode =
    ControlCode::new(DeviceType::FILE_SYSTEM, 27, Method::Neither, Access::Any);
pub const FSCTL_GET_RETRIEVAL_POINTERS: ControlCode =
    ControlCode::new(DeviceType::FILE_SYSTEM, 28, Method::Neither, Access::Any);
pub const FSCTL_GET_COMPRESSION: ControlCode =
    ControlCode::new(DeviceType::FILE_SYSTEM, 15, Method::Buffered, Access::Any);
pub const FSCTL_SET_COMPRESSION: ControlCode =
    ControlCode::new(DeviceType::FILE_SYSTEM, 16, Method::Buffered, Access::ReadWrite);
pub const FSCTL_MOVE_FILE: ControlCode =
    ControlCode::new(DeviceType::FILE_SYSTEM, 29, Method::Buffered, Access::Any);
pub const FSCTL_ENUM_USN_DATA: ControlCode =
    ControlCode::new(DeviceType::FILE_SYSTEM, 44, Method::Neither, Access::Any);
pub const FSCTL_READ_USN_JOURNAL: ControlCode =
    ControlCode::new(DeviceType::FILE_SYSTEM, 46, Method::Neither, Access::Any);
pub const FSCTL_SET_SPARSE: ControlCode =
    ControlCode::new(DeviceType::FILE_SYSTEM, 49, Method::Buffered, Access::Any);
pub const FSCTL_SET_ZERO_DATA: ControlCode =
    ControlCode::new(DeviceType::FILE_SYSTEM, 50, Method::Buffered, Access::Write);
pub const FSCTL_QUERY_ALLOCATED_RANGES: ControlCode =
    ControlCode::new(DeviceType::FILE_SYSTEM, 51, Method::Neither, Access::Read);
pub const FSCTL_QUERY_USN_JOURNAL: ControlCode =
    ControlCode::new(DeviceType::FILE_SYSTEM, 61, Method::Buffered, Access::Any);
pub const FSCTL_GET_RETRIEVAL_POINTER_BASE: ControlCode =
    ControlCode::new(DeviceType::FILE_SYSTEM, 141, Method::Buffered, Access::Any);

// ============================================================================
// Disk Control Codes
// ============================================================================

pub const IOCTL_DISK_GET_DRIVE_GEOMETRY: ControlCode =
    ControlCode::new(DeviceType::DISK, 0, Method::Buffered, Access::Any);
pub const IOCTL_DISK_GET_LENGTH_INFO: ControlCode =
    ControlCode::new(DeviceType::DISK, 0x17, Method::Buffered, Access::Read);

// ============================================================================
// Operation Table
// ============================================================================

/// One supported control operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub name: &'static str,
    pub code: ControlCode,
    pub input: Option<&'static Layout>,
    pub output: Option<&'static Layout>,
}

const fn op(
    name: &'static str,
    code: ControlCode,
    input: Option<&'static Layout>,
    output: Option<&'static Layout>,
) -> Operation {
    Operation {
        name,
        code,
        input,
        output,
    }
}

pub const OPERATIONS: &[Operation] = &[
    op(
        "FSCTL_FILESYSTEM_GET_STATISTICS",
        FSCTL_FILESYSTEM_GET_STATISTICS,
        None,
        Some(&stats::FILESYSTEM_STATISTICS),
    ),
    op(
        "FSCTL_GET_NTFS_VOLUME_DATA",
        FSCTL_GET_NTFS_VOLUME_DATA,
        None,
        Some(&volume::NTFS_VOLUME_DATA_BUFFER),
    ),
    op(
        "FSCTL_GET_NTFS_FILE_RECORD",
        FSCTL_GET_NTFS_FILE_RECORD,
        Some(&volume::NTFS_FILE_RECORD_INPUT_BUFFER),
        Some(&volume::NTFS_FILE_RECORD_OUTPUT_HEADER),
    ),
    op(
        "FSCTL_GET_VOLUME_BITMAP",
        FSCTL_GET_VOLUME_BITMAP,
        Some(&volume::STARTING_LCN_INPUT_BUFFER),
        Some(&volume::VOLUME_BITMAP_BUFFER),
    ),
    op(
        "FSCTL_GET_RETRIEVAL_POINTERS",
        FSCTL_GET_RETRIEVAL_POINTERS,
        Some(&extents::STARTING_VCN_INPUT_BUFFER),
        Some(&extents::RETRIEVAL_POINTERS_BUFFER),
    ),
    op(
        "FSCTL_GET_COMPRESSION",
        FSCTL_GET_COMPRESSION,
        None,
        Some(&volume::COMPRESSION_STATE),
    ),
    op(
        "FSCTL_SET_COMPRESSION",
        FSCTL_SET_COMPRESSION,
        Some(&volume::COMPRESSION_STATE),
        None,
    ),
    op(
        "FSCTL_MOVE_FILE",
        FSCTL_MOVE_FILE,
        Some(&volume::MOVE_FILE_DATA),
        None,
    ),
    op(
        "FSCTL_ENUM_USN_DATA",
        FSCTL_ENUM_USN_DATA,
        Some(&usn::MFT_ENUM_DATA_V1),
        Some(&usn::USN_RECORD_V2),
    ),
    op(
        "FSCTL_READ_USN_JOURNAL",
        FSCTL_READ_USN_JOURNAL,
        Some(&usn::READ_USN_JOURNAL_DATA_V0),
        Some(&usn::USN_RECORD_V2),
    ),
    op(
        "FSCTL_SET_SPARSE",
        FSCTL_SET_SPARSE,
        Some(&volume::FILE_SET_SPARSE_BUFFER),
        None,
    ),
    op(
        "FSCTL_SET_ZERO_DATA",
        FSCTL_SET_ZERO_DATA,
        Some(&volume::FILE_ZERO_DATA_INFORMATION),
        None,
    ),
    op(
        "FSCTL_QUERY_ALLOCATED_RANGES",
        FSCTL_QUERY_ALLOCATED_RANGES,
        Some(&extents::FILE_ALLOCATED_RANGE_BUFFER),
        Some(&extents::FILE_ALLOCATED_RANGE_BUFFER),
    ),
    op(
        "FSCTL_QUERY_USN_JOURNAL",
        FSCTL_QUERY_USN_JOURNAL,
        None,
        Some(&usn::USN_JOURNAL_DATA_V0),
    ),
    op(
        "FSCTL_GET_RETRIEVAL_POINTER_BASE",
        FSCTL_GET_RETRIEVAL_POINTER_BASE,
        None,
        Some(&volume::RETRIEVAL_POINTER_BASE),
    ),
    op(
        "IOCTL_DISK_GET_DRIVE_GEOMETRY",
        IOCTL_DISK_GET_DRIVE_GEOMETRY,
        None,
        Some(&volume::DISK_GEOMETRY),
    ),
    op(
        "IOCTL_DISK_GET_LENGTH_INFO",
        IOCTL_DISK_GET_LENGTH_INFO,
        None,
        Some(&volume::GET_LENGTH_INFORMATION),
    ),
];

/// Look up an operation by symbolic name
pub fn operation(name: &str) -> Option<&'static Operation> {
    OPERATIONS.iter().find(|op| op.name == name)
}

/// Look up an operation by packed code
pub fn operation_for_code(code: ControlCode) -> Option<&'static Operation> {
    OPERATIONS.iter().find(|op| op.code == code)
}
