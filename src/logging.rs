//! Logging helpers for the codec
//!
//! Thin wrappers over the `log` facade so every component reports the same
//! fields in the same shape. The library never installs a logger; hosts
//! pick one (fern, env_logger, ...) and filter on the `devctl` target.

use crate::codec::control_code::ControlCode;
use crate::error::DevCtlError;
use log::{debug, trace, warn};
use std::fmt::Debug;

const TARGET: &str = "devctl";

/// Log a device or file handle being opened
pub fn log_open(path: &str) {
    debug!(target: TARGET, "Opened {}", path);
}

/// Log a single call to the operation invoker
pub fn log_invocation(code: ControlCode, capacity: usize, status: u32, returned: usize) {
    trace!(
        target: TARGET,
        "DeviceIoControl({}) capacity={} status={} returned={}",
        code, capacity, status, returned
    );
}

/// Log an output buffer resize
pub fn log_resize(code: ControlCode, from: usize, to: usize) {
    debug!(target: TARGET, "Growing output buffer for {}: {} -> {} bytes", code, from, to);
}

/// Log a record that was skipped because its tag is unknown
pub fn log_unknown_variant(family: &str, tag: u16) {
    warn!(target: TARGET, "Skipping {} record with unknown tag {}", family, tag);
}

/// Log one decoded page of a paginated query
pub fn log_page<C: Debug>(query: &str, page: usize, records: usize, cursor: &C) {
    debug!(
        target: TARGET,
        "{} page {}: {} records from cursor {:?}",
        query, page, records, cursor
    );
}

/// Log the end of a paginated query
pub fn log_enumeration_end(query: &str, records: usize, pages: usize, error: Option<&DevCtlError>) {
    match error {
        None => debug!(
            target: TARGET,
            "{} finished: {} records in {} pages",
            query, records, pages
        ),
        Some(err) => warn!(
            target: TARGET,
            "{} stopped after {} records in {} pages: {}",
            query, records, pages, err
        ),
    }
}
