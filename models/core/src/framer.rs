//! Splitting image payloads into fixed size output report pages.

use log::trace;

use crate::{DeckError, Result, Transport};

/// Output report id used by every model for image pages
pub const IMAGE_REPORT_ID: u8 = 2;

/// Position of one page within a multi-page transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Zero based page counter
    pub index: u16,
    /// Set on the final page only
    pub last: bool,
    /// Number of payload bytes carried by this page
    pub size: u16,
}

/// Send `payload` as a sequence of output reports.
///
/// Each report is `header` followed by the next chunk of payload, zero padded to the
/// transport's output report length. `update` fills the model specific page fields into
/// the header before every write. Stops after the page marked last; an empty payload
/// still produces a single (last) page.
pub fn send_pages<T, F>(
    transport: &T,
    report_id: u8,
    header: &mut [u8],
    payload: &[u8],
    mut update: F,
) -> Result<()>
where
    T: Transport + ?Sized,
    F: FnMut(&mut [u8], Page),
{
    let report_len = transport.report_lengths().output;
    if header.len() >= report_len {
        return Err(DeckError::ReportBufferOverflow(
            "page header does not fit in the output report",
        ));
    }
    let capacity = report_len - header.len();

    let mut start = 0;
    let mut index = 0u16;
    loop {
        let end = (start + capacity).min(payload.len());
        let last = end == payload.len();
        let chunk = &payload[start..end];

        update(
            header,
            Page {
                index,
                last,
                size: chunk.len() as u16,
            },
        );

        let mut report = Vec::with_capacity(report_len);
        report.extend_from_slice(header);
        report.extend_from_slice(chunk);
        report.resize(report_len, 0);

        trace!("writing page {index} ({} bytes, last: {last})", chunk.len());
        transport.set_output_report(report_id, &report)?;

        if last {
            return Ok(());
        }
        start = end;
        index = index.wrapping_add(1);
    }
}
