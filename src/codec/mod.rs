//! Request/response codec
//!
//! This module provides the format-independent machinery:
//! - Control code packing
//! - Fixed layouts with bounds-checked field readers
//! - Output buffer size negotiation
//! - Variable-length record streams
//! - Paginated enumeration
//! - Bitmap expansion

pub mod bitmap;
pub mod control_code;
pub mod invoke;
pub mod layout;
pub mod paging;
pub mod stream;

pub use bitmap::unpack;
pub use control_code::{Access, ControlCode, DeviceType, Method};
pub use invoke::{
    invoke_with_growth, negotiate, Completion, ControlRequest, ControlResponse, DeviceControl,
    Negotiation, RawResponse, Sizing,
};
pub use layout::{decode, decode_array, Field, FieldReader, FieldWriter, FixedRecord, Layout};
pub use paging::{enumerate, Enumerated, Page, PagedQuery};
pub use stream::{decode_stream, decode_stream_lenient, Framing, RecordFamily, RecordStream};
