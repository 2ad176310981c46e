//! Buffer-growth invoker
//!
//! Wraps the raw operation invoker with the output-size negotiation
//! protocol. Deciding what a status means is a pure step ([`negotiate`]);
//! [`invoke_with_growth`] only re-issues the call while that step asks for
//! a larger buffer, and never more than the configured number of times.

use crate::codec::control_code::ControlCode;
use crate::error::{DevCtlError, Result};
use crate::logging;
use serde::Serialize;

// ============================================================================
// Status Codes
// ============================================================================

pub const STATUS_SUCCESS: u32 = 0;
/// `ERROR_HANDLE_EOF`: nothing left to enumerate
pub const ERROR_HANDLE_EOF: u32 = 38;
/// `ERROR_INSUFFICIENT_BUFFER`: output buffer cannot hold even a header
pub const ERROR_INSUFFICIENT_BUFFER: u32 = 122;
/// `ERROR_MORE_DATA`: output was filled and more is available
pub const ERROR_MORE_DATA: u32 = 234;

// ============================================================================
// Invoker Seam
// ============================================================================

/// Input to one privileged call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest<'a> {
    pub code: ControlCode,
    pub input: Option<&'a [u8]>,
    pub output_size: usize,
}

/// What the operation invoker hands back
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawResponse {
    pub status: u32,
    /// Bytes written by the driver; never longer than the requested size
    pub payload: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u32, payload: Vec<u8>) -> Self {
        Self { status, payload }
    }

    pub fn success(payload: Vec<u8>) -> Self {
        Self::new(STATUS_SUCCESS, payload)
    }
}

/// The operation invoker: performs one control call against an owned handle
pub trait DeviceControl {
    fn device_io_control(
        &mut self,
        code: ControlCode,
        input: Option<&[u8]>,
        output_capacity: usize,
    ) -> RawResponse;
}

impl<F> DeviceControl for F
where
    F: FnMut(ControlCode, Option<&[u8]>, usize) -> RawResponse,
{
    fn device_io_control(
        &mut self,
        code: ControlCode,
        input: Option<&[u8]>,
        output_capacity: usize,
    ) -> RawResponse {
        self(code, input, output_capacity)
    }
}

// ============================================================================
// Negotiation
// ============================================================================

/// How a family learns the output size it needs
#[derive(Debug, Clone, Copy)]
pub enum Sizing {
    /// The partial response embeds the required size
    Embedded(fn(&[u8]) -> Option<usize>),
    /// No size hint; double the buffer
    Doubling,
    /// `ERROR_MORE_DATA` is a valid partial page, handled by pagination
    Paged,
}

/// Successful outcome of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Completion {
    Complete,
    /// A partial page; the caller continues from a cursor
    MoreData,
    /// End-of-data sentinel; the payload carries nothing useful
    EndOfData,
}

/// Response after size negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    pub completion: Completion,
    pub payload: Vec<u8>,
    /// Output size of the call that produced this response
    pub capacity: usize,
}

/// Decision taken on a single raw response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    Done(Completion),
    NeedsLargerBuffer { required: usize },
}

/// Interpret `response` for a call issued with `capacity` bytes of output
pub fn negotiate(
    code: ControlCode,
    response: &RawResponse,
    capacity: usize,
    sizing: Sizing,
) -> Result<Negotiation> {
    let grow = |hint: Option<usize>| {
        let doubled = capacity.saturating_mul(2).max(1);
        let required = match hint {
            Some(required) if required > capacity => required,
            _ => doubled,
        };
        Negotiation::NeedsLargerBuffer { required }
    };

    match (response.status, sizing) {
        (STATUS_SUCCESS, _) => Ok(Negotiation::Done(Completion::Complete)),
        (ERROR_HANDLE_EOF, _) => Ok(Negotiation::Done(Completion::EndOfData)),
        (ERROR_MORE_DATA, Sizing::Paged) => Ok(Negotiation::Done(Completion::MoreData)),
        (ERROR_MORE_DATA | ERROR_INSUFFICIENT_BUFFER, Sizing::Embedded(required_size)) => {
            Ok(grow(required_size(&response.payload)))
        }
        (ERROR_MORE_DATA | ERROR_INSUFFICIENT_BUFFER, _) => Ok(grow(None)),
        (status, _) => Err(DevCtlError::from_win32(code, status)),
    }
}

/// Issue a call, growing the output buffer until the driver is satisfied
///
/// `max_attempts` counts every call made, including the first.
pub fn invoke_with_growth<D: DeviceControl + ?Sized>(
    device: &mut D,
    request: ControlRequest<'_>,
    sizing: Sizing,
    max_attempts: usize,
) -> Result<ControlResponse> {
    let mut capacity = request.output_size;
    let mut attempts = 0;

    while attempts < max_attempts {
        attempts += 1;
        let response = device.device_io_control(request.code, request.input, capacity);
        logging::log_invocation(request.code, capacity, response.status, response.payload.len());

        match negotiate(request.code, &response, capacity, sizing)? {
            Negotiation::Done(completion) => {
                let mut payload = response.payload;
                payload.truncate(capacity);
                return Ok(ControlResponse {
                    completion,
                    payload,
                    capacity,
                });
            }
            Negotiation::NeedsLargerBuffer { required } => {
                logging::log_resize(request.code, capacity, required);
                capacity = required;
            }
        }
    }

    Err(DevCtlError::SizeNegotiationFailed {
        code: request.code,
        attempts,
        capacity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{FSCTL_FILESYSTEM_GET_STATISTICS, FSCTL_GET_VOLUME_BITMAP};

    fn size_at_zero(payload: &[u8]) -> Option<usize> {
        payload
            .get(0..4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
    }

    #[test]
    fn resizes_once_from_embedded_size() {
        let mut calls = Vec::new();
        let mut device = |_: ControlCode, _: Option<&[u8]>, capacity: usize| {
            calls.push(capacity);
            if capacity < 300 {
                RawResponse::new(ERROR_MORE_DATA, 300u32.to_le_bytes().to_vec())
            } else {
                RawResponse::success(vec![7u8; capacity])
            }
        };

        let request = ControlRequest {
            code: FSCTL_GET_VOLUME_BITMAP,
            input: None,
            output_size: 16,
        };
        let response =
            invoke_with_growth(&mut device, request, Sizing::Embedded(size_at_zero), 2).unwrap();

        assert_eq!(calls, vec![16, 300]);
        assert_eq!(response.completion, Completion::Complete);
        assert_eq!(response.payload, vec![7u8; 300]);
        assert_eq!(response.capacity, 300);
    }

    #[test]
    fn doubling_gives_up_at_attempt_cap() {
        let mut calls = 0;
        let mut device = |_: ControlCode, _: Option<&[u8]>, _: usize| {
            calls += 1;
            RawResponse::new(ERROR_INSUFFICIENT_BUFFER, Vec::new())
        };

        let request = ControlRequest {
            code: FSCTL_FILESYSTEM_GET_STATISTICS,
            input: None,
            output_size: 512,
        };
        let err = invoke_with_growth(&mut device, request, Sizing::Doubling, 2).unwrap_err();

        assert_eq!(calls, 2);
        match err {
            DevCtlError::SizeNegotiationFailed { attempts, capacity, .. } => {
                assert_eq!(attempts, 2);
                assert_eq!(capacity, 2048);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn paged_more_data_is_not_resized() {
        let response = RawResponse::new(ERROR_MORE_DATA, vec![0; 32]);
        let decision = negotiate(FSCTL_GET_VOLUME_BITMAP, &response, 32, Sizing::Paged).unwrap();
        assert_eq!(decision, Negotiation::Done(Completion::MoreData));
    }

    #[test]
    fn end_of_data_and_platform_errors() {
        let eof = RawResponse::new(ERROR_HANDLE_EOF, Vec::new());
        assert_eq!(
            negotiate(FSCTL_GET_VOLUME_BITMAP, &eof, 8, Sizing::Doubling).unwrap(),
            Negotiation::Done(Completion::EndOfData)
        );

        let denied = RawResponse::new(5, Vec::new());
        let err = negotiate(FSCTL_GET_VOLUME_BITMAP, &denied, 8, Sizing::Doubling).unwrap_err();
        assert_eq!(err.platform_status(), Some(5));
    }

    #[test]
    fn embedded_hint_not_larger_falls_back_to_doubling() {
        let response = RawResponse::new(ERROR_MORE_DATA, 8u32.to_le_bytes().to_vec());
        let decision =
            negotiate(FSCTL_GET_VOLUME_BITMAP, &response, 64, Sizing::Embedded(size_at_zero))
                .unwrap();
        assert_eq!(decision, Negotiation::NeedsLargerBuffer { required: 128 });
    }
}
