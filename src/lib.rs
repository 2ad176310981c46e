//! devctl - Typed codec for volume and filesystem device control requests
//!
//! Turns the packed buffers exchanged with `DeviceIoControl` into typed
//! records and back, and drives the calls that need more than one round
//! trip: growing an output buffer until the driver is satisfied, and
//! paging through results with a resume cursor.
//!
//! # Features
//!
//! - **Control Codes**: Pack and unpack device/function/method/access
//! - **Fixed Records**: Bounds-checked decoding of fixed structures
//! - **Record Streams**: USN records and per-processor statistics with unknown-variant reporting
//! - **Pagination**: Change journal, MFT enumeration, extents and allocated ranges
//! - **Bitmaps**: Volume allocation bitmap expansion
//!
//! The decoding side is platform independent. On Windows, [`winapi::VolumeHandle`]
//! supplies the real invoker; anywhere else a [`DeviceControl`] mock can be used.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(windows)]
//! fn main() -> devctl::Result<()> {
//!     use devctl::{winapi::VolumeHandle, Device};
//!
//!     let mut device = Device::new(VolumeHandle::open_volume('C')?);
//!     let journal = device.query_usn_journal()?;
//!
//!     let changes = device.read_usn_journal(journal.usn_journal_id, journal.first_usn, u32::MAX);
//!     for record in &changes.records {
//!         println!("{} {:?}", record.file_name(), record.change_reason());
//!     }
//!     if let Some(err) = changes.error {
//!         eprintln!("stopped early: {}", err);
//!     }
//!     Ok(())
//! }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```

pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod fsctl;
pub mod logging;
pub mod registry;
#[cfg(windows)]
pub mod winapi;

// Re-export main types
pub use codec::{
    ControlCode, DeviceControl, Enumerated, FixedRecord, Layout, Page, PagedQuery, RawResponse,
    RecordFamily, Sizing,
};
pub use config::{CodecConfig, UnknownVariantPolicy};
pub use device::Device;
pub use error::{DevCtlError, FormatError, Result};
pub use registry::{operation, operation_for_code, Operation, OPERATIONS};

// Re-export record types that callers will want directly
pub use fsctl::{
    ChangeReason, Extent, FileSystemStatisticsRecord, NtfsVolumeData, UsnJournalData, UsnRecord,
    VolumeBitmap,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
