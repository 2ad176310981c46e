//! Windows operation invoker
//!
//! Safe wrappers around `CreateFileW` and `DeviceIoControl`: an owned
//! handle that closes on drop, and a [`DeviceControl`] implementation
//! that reports the raw Win32 status instead of failing.

use crate::codec::control_code::ControlCode;
use crate::codec::invoke::{DeviceControl, RawResponse, STATUS_SUCCESS};
use crate::error::{DevCtlError, Result};
use crate::logging;
use std::ffi::{c_void, OsStr};
use std::os::windows::ffi::OsStrExt;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, FILE_FLAGS_AND_ATTRIBUTES, FILE_SHARE_MODE, OPEN_EXISTING,
};
use windows::Win32::System::IO::DeviceIoControl;

pub const GENERIC_READ: u32 = 0x80000000;
pub const GENERIC_WRITE: u32 = 0x40000000;
pub const FILE_SHARE_READ: u32 = 0x00000001;
pub const FILE_SHARE_WRITE: u32 = 0x00000002;
pub const FILE_SHARE_DELETE: u32 = 0x00000004;
pub const FILE_FLAG_BACKUP_SEMANTICS: u32 = 0x02000000;

// ============================================================================
// Owned Handle
// ============================================================================

/// RAII wrapper for a volume, disk or file handle
pub struct VolumeHandle {
    handle: HANDLE,
    path: String,
}

impl VolumeHandle {
    /// Open a volume by drive letter (`\\.\C:`)
    pub fn open_volume(drive_letter: char) -> Result<Self> {
        Self::open(&format!("\\\\.\\{}:", drive_letter), GENERIC_READ, 0)
    }

    /// Open a physical drive (`\\.\PhysicalDriveN`)
    pub fn open_physical_drive(index: u32) -> Result<Self> {
        Self::open(&format!("\\\\.\\PhysicalDrive{}", index), GENERIC_READ, 0)
    }

    /// Open a file or directory for extent and sparse queries
    ///
    /// Write access is needed for the set-* commands.
    pub fn open_file(path: &str, writable: bool) -> Result<Self> {
        let access = if writable { GENERIC_READ | GENERIC_WRITE } else { GENERIC_READ };
        Self::open(path, access, FILE_FLAG_BACKUP_SEMANTICS)
    }

    /// Open any device path with the given access and flags
    pub fn open(path: &str, access: u32, flags: u32) -> Result<Self> {
        let wide_path: Vec<u16> = OsStr::new(path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let handle = unsafe {
            CreateFileW(
                PCWSTR::from_raw(wide_path.as_ptr()),
                access,
                FILE_SHARE_MODE(FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE),
                None,
                OPEN_EXISTING,
                FILE_FLAGS_AND_ATTRIBUTES(flags),
                HANDLE::default(),
            )
        };

        match handle {
            Ok(h) if !h.is_invalid() => {
                logging::log_open(path);
                Ok(Self {
                    handle: h,
                    path: path.to_string(),
                })
            }
            Ok(_) => Err(DevCtlError::VolumeOpenError(
                path.to_string(),
                std::io::Error::last_os_error(),
            )),
            Err(e) => Err(DevCtlError::VolumeOpenError(path.to_string(), e.into())),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn as_raw(&self) -> HANDLE {
        self.handle
    }

    /// Handle value as carried in `MOVE_FILE_DATA`
    pub fn raw_value(&self) -> usize {
        self.handle.0 as usize
    }
}

impl Drop for VolumeHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

// ============================================================================
// IOCTL Operations
// ============================================================================

impl DeviceControl for VolumeHandle {
    fn device_io_control(
        &mut self,
        code: ControlCode,
        input: Option<&[u8]>,
        output_capacity: usize,
    ) -> RawResponse {
        let mut output = vec![0u8; output_capacity];
        let mut bytes_returned: u32 = 0;

        let (in_ptr, in_size) = match input {
            Some(buf) if !buf.is_empty() => (Some(buf.as_ptr() as *const c_void), buf.len() as u32),
            _ => (None, 0),
        };
        let out_ptr = if output.is_empty() {
            None
        } else {
            Some(output.as_mut_ptr() as *mut c_void)
        };

        let result = unsafe {
            DeviceIoControl(
                self.handle,
                code.as_u32(),
                in_ptr,
                in_size,
                out_ptr,
                output_capacity as u32,
                Some(&mut bytes_returned as *mut u32),
                None,
            )
        };

        let status = match result {
            Ok(()) => STATUS_SUCCESS,
            // ERROR_MORE_DATA still fills the buffer and sets bytes_returned
            Err(_) => std::io::Error::last_os_error()
                .raw_os_error()
                .map(|code| code as u32)
                .unwrap_or(u32::MAX),
        };

        output.truncate((bytes_returned as usize).min(output_capacity));
        RawResponse::new(status, output)
    }
}
