//! File extent maps and allocated ranges
//!
//! `FSCTL_GET_RETRIEVAL_POINTERS` describes a file as a run of boundaries:
//! each entry gives the VCN where the *next* extent starts and the LCN
//! where the current one lives. Lengths are recovered by differencing
//! consecutive boundaries, which is what [`ExtentMapBuilder`] does.

use crate::codec::control_code::ControlCode;
use crate::codec::invoke::{Completion, ControlResponse};
use crate::codec::layout::{decode_array, Field, FieldReader, FieldWriter, FixedRecord, Layout};
use crate::codec::paging::{Page, PagedQuery};
use crate::error::FormatError;
use crate::registry::{FSCTL_GET_RETRIEVAL_POINTERS, FSCTL_QUERY_ALLOCATED_RANGES};
use serde::Serialize;

// ============================================================================
// Layouts
// ============================================================================

pub const STARTING_VCN_INPUT_BUFFER: Layout = Layout::new(
    "STARTING_VCN_INPUT_BUFFER",
    8,
    &[Field::new("StartingVcn", 0, 8)],
);

/// Header of RETRIEVAL_POINTERS_BUFFER; extents follow at offset 16
pub const RETRIEVAL_POINTERS_BUFFER: Layout = Layout::new(
    "RETRIEVAL_POINTERS_BUFFER",
    16,
    &[
        Field::new("ExtentCount", 0, 4),
        Field::new("StartingVcn", 8, 8),
    ],
);

pub const RETRIEVAL_POINTERS_EXTENT: Layout = Layout::new(
    "RETRIEVAL_POINTERS_EXTENT",
    16,
    &[Field::new("NextVcn", 0, 8), Field::new("Lcn", 8, 8)],
);

pub const FILE_ALLOCATED_RANGE_BUFFER: Layout = Layout::new(
    "FILE_ALLOCATED_RANGE_BUFFER",
    16,
    &[Field::new("FileOffset", 0, 8), Field::new("Length", 8, 8)],
);

/// Input for `FSCTL_GET_RETRIEVAL_POINTERS`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartingVcn {
    pub starting_vcn: u64,
}

impl FixedRecord for StartingVcn {
    const LAYOUT: &'static Layout = &STARTING_VCN_INPUT_BUFFER;

    fn read(r: &FieldReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            starting_vcn: r.u64(0)?,
        })
    }

    fn write(&self, w: &mut FieldWriter) {
        w.put_u64(0, self.starting_vcn);
    }
}

// ============================================================================
// Extents
// ============================================================================

/// LCN the driver reports for a run with no clusters behind it
pub const SPARSE_LCN: i64 = -1;

/// A contiguous run of clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Extent {
    /// First virtual cluster of the run
    pub vcn: u64,
    pub cluster_count: u64,
    /// First logical cluster on the volume; `None` for sparse or
    /// compressed-away runs
    pub lcn: Option<u64>,
}

impl Extent {
    pub fn next_vcn(&self) -> u64 {
        self.vcn + self.cluster_count
    }

    pub fn is_sparse(&self) -> bool {
        self.lcn.is_none()
    }

    /// Map a VCN inside this run to its LCN
    pub fn lcn_for(&self, vcn: u64) -> Option<u64> {
        if vcn < self.vcn || vcn >= self.next_vcn() {
            return None;
        }
        self.lcn.map(|lcn| lcn + (vcn - self.vcn))
    }
}

/// Turns a sequence of `NextVcn` boundaries into extents
///
/// State carries over between pages: the first extent of a page starts
/// where the last extent of the previous page ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtentMapBuilder {
    next_start: u64,
}

impl ExtentMapBuilder {
    pub fn starting_at(vcn: u64) -> Self {
        Self { next_start: vcn }
    }

    /// VCN the next extent will start at
    pub fn next_vcn(&self) -> u64 {
        self.next_start
    }

    pub fn push(&mut self, next_vcn: u64, lcn: i64) -> Result<Extent, FormatError> {
        let start = self.next_start;
        if next_vcn <= start {
            return Err(FormatError::OutOfOrder {
                field: "NextVcn",
                previous: start,
                next: next_vcn,
            });
        }

        self.next_start = next_vcn;
        Ok(Extent {
            vcn: start,
            cluster_count: next_vcn - start,
            lcn: u64::try_from(lcn).ok(),
        })
    }
}

/// Build an extent map from `(NextVcn, Lcn)` boundaries
pub fn build_extent_map(
    starting_vcn: u64,
    boundaries: &[(u64, i64)],
) -> Result<Vec<Extent>, FormatError> {
    let mut builder = ExtentMapBuilder::starting_at(starting_vcn);
    boundaries
        .iter()
        .map(|&(next_vcn, lcn)| builder.push(next_vcn, lcn))
        .collect()
}

/// Find the LCN backing `vcn` in an extent map
pub fn lookup_lcn(extents: &[Extent], vcn: u64) -> Option<u64> {
    extents.iter().find_map(|extent| extent.lcn_for(vcn))
}

// ============================================================================
// Retrieval Pointers Query
// ============================================================================

/// Paged `FSCTL_GET_RETRIEVAL_POINTERS`; cursor is the VCN to resume at
#[derive(Debug, Clone)]
pub struct RetrievalPointers {
    pub page_size: usize,
    builder: Option<ExtentMapBuilder>,
}

impl RetrievalPointers {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            builder: None,
        }
    }
}

impl PagedQuery for RetrievalPointers {
    type Cursor = u64;
    type Record = Extent;

    const NAME: &'static str = "FSCTL_GET_RETRIEVAL_POINTERS";

    fn control_code(&self) -> ControlCode {
        FSCTL_GET_RETRIEVAL_POINTERS
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn encode_input(&self, cursor: &u64) -> Vec<u8> {
        StartingVcn { starting_vcn: *cursor }.encode()
    }

    fn decode_page(
        &mut self,
        _cursor: &u64,
        response: &ControlResponse,
    ) -> Result<Page<Extent, u64>, FormatError> {
        let r = FieldReader::for_layout(&response.payload, &RETRIEVAL_POINTERS_BUFFER)?;
        let extent_count = r.u32(0)? as usize;
        let starting_vcn = r.u64(8)?;

        // ExtentCount is driver-supplied; check it against the payload before allocating
        let needed = extent_count
            .checked_mul(RETRIEVAL_POINTERS_EXTENT.size)
            .and_then(|len| len.checked_add(RETRIEVAL_POINTERS_BUFFER.size))
            .unwrap_or(usize::MAX);
        if needed > r.len() {
            return Err(FormatError::Truncated {
                needed,
                available: r.len(),
            });
        }

        let builder = self
            .builder
            .get_or_insert_with(|| ExtentMapBuilder::starting_at(starting_vcn));

        let mut records = Vec::with_capacity(extent_count);
        for i in 0..extent_count {
            let offset = RETRIEVAL_POINTERS_BUFFER.size + i * RETRIEVAL_POINTERS_EXTENT.size;
            records.push(builder.push(r.u64(offset)?, r.i64(offset + 8)?)?);
        }

        let more = response.completion == Completion::MoreData && !records.is_empty();
        Ok(Page {
            records,
            rejected: Vec::new(),
            next: more.then(|| builder.next_vcn()),
        })
    }
}

// ============================================================================
// Allocated Ranges
// ============================================================================

/// Byte range of a sparse file that has storage behind it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AllocatedRange {
    pub file_offset: i64,
    pub length: i64,
}

impl AllocatedRange {
    pub fn end(&self) -> i64 {
        self.file_offset.saturating_add(self.length)
    }
}

impl FixedRecord for AllocatedRange {
    const LAYOUT: &'static Layout = &FILE_ALLOCATED_RANGE_BUFFER;

    fn read(r: &FieldReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            file_offset: r.i64(0)?,
            length: r.i64(8)?,
        })
    }

    fn write(&self, w: &mut FieldWriter) {
        w.put_i64(0, self.file_offset).put_i64(8, self.length);
    }
}

/// Paged `FSCTL_QUERY_ALLOCATED_RANGES` over `[cursor, end)`
#[derive(Debug, Clone)]
pub struct AllocatedRanges {
    /// Exclusive end of the queried byte range
    pub end: i64,
    pub page_size: usize,
}

impl PagedQuery for AllocatedRanges {
    type Cursor = i64;
    type Record = AllocatedRange;

    const NAME: &'static str = "FSCTL_QUERY_ALLOCATED_RANGES";

    fn control_code(&self) -> ControlCode {
        FSCTL_QUERY_ALLOCATED_RANGES
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn encode_input(&self, cursor: &i64) -> Vec<u8> {
        AllocatedRange {
            file_offset: *cursor,
            length: self.end.saturating_sub(*cursor),
        }
        .encode()
    }

    fn decode_page(
        &mut self,
        _cursor: &i64,
        response: &ControlResponse,
    ) -> Result<Page<AllocatedRange, i64>, FormatError> {
        let records: Vec<AllocatedRange> = decode_array(&response.payload)?;
        let next = match (response.completion, records.last()) {
            (Completion::MoreData, Some(last)) if last.end() < self.end => Some(last.end()),
            _ => None,
        };

        Ok(Page {
            records,
            rejected: Vec::new(),
            next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pointers(starting_vcn: u64, boundaries: &[(u64, i64)]) -> Vec<u8> {
        let mut w = FieldWriter::new(16 + boundaries.len() * 16);
        w.put_u32(0, boundaries.len() as u32).put_u64(8, starting_vcn);
        for (i, &(next_vcn, lcn)) in boundaries.iter().enumerate() {
            w.put_u64(16 + i * 16, next_vcn).put_i64(24 + i * 16, lcn);
        }
        w.into_bytes()
    }

    fn response(completion: Completion, payload: Vec<u8>) -> ControlResponse {
        ControlResponse {
            completion,
            capacity: payload.len(),
            payload,
        }
    }

    #[test]
    fn boundaries_become_extents() {
        let extents = build_extent_map(50, &[(100, 1000), (150, 2000), (300, 3000)]).unwrap();
        let spans: Vec<(u64, u64)> = extents.iter().map(|e| (e.vcn, e.cluster_count)).collect();
        assert_eq!(spans, vec![(50, 50), (100, 50), (150, 150)]);
        assert_eq!(lookup_lcn(&extents, 160), Some(3010));
        assert_eq!(lookup_lcn(&extents, 300), None);
    }

    #[test]
    fn sparse_runs_have_no_lcn() {
        let extents = build_extent_map(0, &[(16, 500), (32, SPARSE_LCN)]).unwrap();
        assert_eq!(extents[0].lcn, Some(500));
        assert!(extents[1].is_sparse());
        assert_eq!(extents[1].lcn_for(20), None);
    }

    #[test]
    fn non_increasing_boundary_is_out_of_order() {
        assert_eq!(
            build_extent_map(0, &[(10, 1), (10, 2)]),
            Err(FormatError::OutOfOrder { field: "NextVcn", previous: 10, next: 10 })
        );
        assert!(build_extent_map(100, &[(50, 1)]).is_err());
    }

    #[test]
    fn builder_persists_across_pages() {
        let mut query = RetrievalPointers::new(48);

        let first = query
            .decode_page(&0, &response(Completion::MoreData, pointers(50, &[(100, 7), (150, 9)])))
            .unwrap();
        assert_eq!(first.next, Some(150));

        // A later page reports its own StartingVcn; the map continues from 150
        let second = query
            .decode_page(&150, &response(Completion::Complete, pointers(150, &[(300, 11)])))
            .unwrap();
        assert_eq!(second.records, vec![Extent { vcn: 150, cluster_count: 150, lcn: Some(11) }]);
        assert_eq!(second.next, None);
    }

    #[test]
    fn extent_count_beyond_payload_is_truncated() {
        let mut payload = pointers(0, &[(8, 1)]);
        payload[0] = 2;
        let mut query = RetrievalPointers::new(32);
        assert!(matches!(
            query.decode_page(&0, &response(Completion::MoreData, payload)),
            Err(FormatError::Truncated { .. })
        ));
    }

    #[test]
    fn huge_extent_count_is_truncated_without_allocating() {
        let mut payload = pointers(0, &[]);
        payload[0..4].copy_from_slice(&u32::MAX.to_le_bytes());
        let mut query = RetrievalPointers::new(32);

        match query.decode_page(&0, &response(Completion::MoreData, payload)) {
            Err(FormatError::Truncated { needed, available }) => {
                assert!(needed > u32::MAX as usize);
                assert_eq!(available, 16);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn partial_range_entry_is_truncated() {
        let mut query = AllocatedRanges { end: 1 << 20, page_size: 32 };
        let mut payload = AllocatedRange { file_offset: 0, length: 4096 }.encode();
        payload.extend([0u8; 8]);
        assert!(matches!(
            query.decode_page(&0, &response(Completion::MoreData, payload)),
            Err(FormatError::Truncated { needed: 32, available: 24 })
        ));
    }

    #[test]
    fn allocated_ranges_resume_after_last_range() {
        let mut query = AllocatedRanges { end: 1 << 20, page_size: 32 };

        let input = query.encode_input(&4096);
        assert_eq!(&input[0..8], &4096i64.to_le_bytes());
        assert_eq!(&input[8..16], &((1i64 << 20) - 4096).to_le_bytes());

        let mut payload = AllocatedRange { file_offset: 0, length: 4096 }.encode();
        payload.extend(AllocatedRange { file_offset: 65536, length: 8192 }.encode());

        let page = query.decode_page(&0, &response(Completion::MoreData, payload.clone())).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.next, Some(65536 + 8192));

        let last = query.decode_page(&0, &response(Completion::Complete, payload)).unwrap();
        assert_eq!(last.next, None);
    }
}
