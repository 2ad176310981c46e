//! Scripted invoker shared by the integration tests
//!
//! Stands in for a volume handle: every call is recorded and answered
//! from a queue of canned responses. Once the script runs out the device
//! reports end of data.

#![allow(dead_code)]

use devctl::codec::invoke::{ERROR_HANDLE_EOF, ERROR_MORE_DATA};
use devctl::codec::{ControlCode, DeviceControl, RawResponse};
use devctl::fsctl::usn::{UsnRecordV2, UsnRecordV3};
use std::collections::VecDeque;

/// One call as seen by the device
#[derive(Debug, Clone)]
pub struct Call {
    pub code: ControlCode,
    pub input: Option<Vec<u8>>,
    pub capacity: usize,
}

impl Call {
    pub fn input_u64(&self, offset: usize) -> u64 {
        let input = self.input.as_deref().unwrap_or_default();
        u64::from_le_bytes(input[offset..offset + 8].try_into().unwrap())
    }

    pub fn input_i64(&self, offset: usize) -> i64 {
        self.input_u64(offset) as i64
    }
}

#[derive(Debug, Default)]
pub struct ScriptedDevice {
    responses: VecDeque<RawResponse>,
    pub calls: Vec<Call>,
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, status: u32, payload: Vec<u8>) -> Self {
        self.responses.push_back(RawResponse::new(status, payload));
        self
    }

    pub fn success(self, payload: Vec<u8>) -> Self {
        self.respond(0, payload)
    }

    pub fn more_data(self, payload: Vec<u8>) -> Self {
        self.respond(ERROR_MORE_DATA, payload)
    }

    pub fn capacities(&self) -> Vec<usize> {
        self.calls.iter().map(|c| c.capacity).collect()
    }
}

impl DeviceControl for ScriptedDevice {
    fn device_io_control(
        &mut self,
        code: ControlCode,
        input: Option<&[u8]>,
        output_capacity: usize,
    ) -> RawResponse {
        self.calls.push(Call {
            code,
            input: input.map(<[u8]>::to_vec),
            capacity: output_capacity,
        });

        let mut response = self
            .responses
            .pop_front()
            .unwrap_or_else(|| RawResponse::new(ERROR_HANDLE_EOF, Vec::new()));
        response.payload.truncate(output_capacity);
        response
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn v2_record(frn: u64, usn: i64, name: &str) -> Vec<u8> {
    UsnRecordV2 {
        file_reference_number: frn,
        parent_file_reference_number: 5,
        usn,
        reason: 0x100,
        file_name: name.to_string(),
        ..Default::default()
    }
    .to_bytes()
}

pub fn v3_record(frn: u128, usn: i64, name: &str) -> Vec<u8> {
    UsnRecordV3 {
        file_reference_number: frn,
        parent_file_reference_number: 5,
        usn,
        reason: 0x200,
        file_name: name.to_string(),
        ..Default::default()
    }
    .to_bytes()
}

/// A USN output buffer: continuation value then packed records
pub fn usn_page(next: u64, records: &[Vec<u8>]) -> Vec<u8> {
    let mut page = next.to_le_bytes().to_vec();
    for record in records {
        page.extend_from_slice(record);
    }
    page
}

/// A retrieval pointers buffer from `(NextVcn, Lcn)` pairs
pub fn pointers_page(starting_vcn: u64, extents: &[(u64, i64)]) -> Vec<u8> {
    let mut page = Vec::with_capacity(16 + extents.len() * 16);
    page.extend_from_slice(&(extents.len() as u32).to_le_bytes());
    page.extend_from_slice(&[0u8; 4]);
    page.extend_from_slice(&starting_vcn.to_le_bytes());
    for (next_vcn, lcn) in extents {
        page.extend_from_slice(&next_vcn.to_le_bytes());
        page.extend_from_slice(&lcn.to_le_bytes());
    }
    page
}

/// Packed `FILE_ALLOCATED_RANGE_BUFFER` entries
pub fn ranges_page(ranges: &[(i64, i64)]) -> Vec<u8> {
    ranges
        .iter()
        .flat_map(|(offset, length)| offset.to_le_bytes().into_iter().chain(length.to_le_bytes()))
        .collect()
}
