//! Paginated query orchestration
//!
//! Drives a [`PagedQuery`] from an initial cursor until the driver reports
//! end of data, the query says it is finished, or the cursor stops moving.
//! Records gathered before a failure are always handed back with it.

use crate::codec::control_code::ControlCode;
use crate::codec::invoke::{
    invoke_with_growth, Completion, ControlRequest, ControlResponse, DeviceControl, Sizing,
};
use crate::config::{CodecConfig, UnknownVariantPolicy};
use crate::error::{DevCtlError, FormatError, Result};
use crate::logging;
use std::fmt::Debug;

/// Records decoded from one response
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R, C> {
    pub records: Vec<R>,
    /// Records the decoder could not interpret
    pub rejected: Vec<FormatError>,
    /// Where the next call should resume, or `None` when finished
    pub next: Option<C>,
}

impl<R, C> Page<R, C> {
    pub fn finished(records: Vec<R>) -> Self {
        Self {
            records,
            rejected: Vec::new(),
            next: None,
        }
    }
}

/// A control call that returns its results over several invocations
pub trait PagedQuery {
    type Cursor: Clone + PartialEq + Debug;
    type Record;

    const NAME: &'static str;

    fn control_code(&self) -> ControlCode;

    /// Output buffer size for each call
    fn page_size(&self) -> usize;

    fn sizing(&self) -> Sizing {
        Sizing::Paged
    }

    /// Build the input buffer that resumes at `cursor`
    fn encode_input(&self, cursor: &Self::Cursor) -> Vec<u8>;

    /// Decode one response issued at `cursor`
    fn decode_page(
        &mut self,
        cursor: &Self::Cursor,
        response: &ControlResponse,
    ) -> std::result::Result<Page<Self::Record, Self::Cursor>, FormatError>;
}

/// Outcome of an enumeration: everything decoded, plus how it ended
#[derive(Debug)]
pub struct Enumerated<T> {
    pub records: Vec<T>,
    /// Number of calls that returned data
    pub pages: usize,
    /// Unknown variants passed over under [`UnknownVariantPolicy::Report`]
    pub diagnostics: Vec<FormatError>,
    /// Set when enumeration stopped early
    pub error: Option<DevCtlError>,
}

impl<T> Enumerated<T> {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            pages: 0,
            diagnostics: Vec::new(),
            error: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Drop partial results if enumeration failed
    pub fn into_result(self) -> Result<Vec<T>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.records),
        }
    }
}

/// Run `query` from `start` until the driver runs out of data
pub fn enumerate<D, Q>(
    device: &mut D,
    query: &mut Q,
    start: Q::Cursor,
    config: &CodecConfig,
) -> Enumerated<Q::Record>
where
    D: DeviceControl + ?Sized,
    Q: PagedQuery,
{
    let mut out = Enumerated::new();
    let mut cursor = start;

    loop {
        if config.max_pages.is_some_and(|max| out.pages >= max) {
            out.error = Some(DevCtlError::PageLimitExceeded(out.pages));
            break;
        }

        let input = query.encode_input(&cursor);
        let request = ControlRequest {
            code: query.control_code(),
            input: Some(&input),
            output_size: query.page_size(),
        };

        let attempts = config.max_size_attempts;
        let response = match invoke_with_growth(device, request, query.sizing(), attempts) {
            Ok(response) => response,
            Err(err) => {
                out.error = Some(err);
                break;
            }
        };

        if response.completion == Completion::EndOfData {
            break;
        }

        let page = match query.decode_page(&cursor, &response) {
            Ok(page) => page,
            Err(err) => {
                out.error = Some(err.into());
                break;
            }
        };

        out.pages += 1;
        logging::log_page(Q::NAME, out.pages, page.records.len(), &cursor);
        out.records.extend(page.records);

        if let Some(err) = absorb_rejected(&mut out.diagnostics, page.rejected, config) {
            out.error = Some(err.into());
            break;
        }

        match page.next {
            Some(next) if next != cursor => cursor = next,
            _ => break,
        }
    }

    logging::log_enumeration_end(Q::NAME, out.records.len(), out.pages, out.error.as_ref());
    out
}

/// Keep tolerable rejections as diagnostics; return the first fatal one
fn absorb_rejected(
    diagnostics: &mut Vec<FormatError>,
    rejected: Vec<FormatError>,
    config: &CodecConfig,
) -> Option<FormatError> {
    for err in rejected {
        match (&err, config.unknown_variants) {
            (FormatError::UnknownVariant { family, tag }, UnknownVariantPolicy::Report) => {
                logging::log_unknown_variant(family, *tag);
                diagnostics.push(err);
            }
            _ => return Some(err),
        }
    }
    None
}
