//! The narrow HID capability every device model is driven through.

use crate::Result;

/// Fixed report lengths of a device interface, excluding the leading report id byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLengths {
    pub feature: usize,
    pub input: usize,
    pub output: usize,
}

/// Raw report exchange with one HID interface.
///
/// Methods take `&self` so the input polling loop can block on
/// [`Transport::get_input_report`] while other tasks write images.
/// Report payloads never include the report id byte.
pub trait Transport: Send + Sync {
    fn vendor_id(&self) -> u16;
    fn product_id(&self) -> u16;
    fn serial_number(&self) -> String;
    fn product(&self) -> String;

    fn report_lengths(&self) -> ReportLengths;

    /// Open the interface for exclusive use
    fn open(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
    fn is_open(&self) -> bool;

    fn get_feature_report(&self, id: u8) -> Result<Vec<u8>>;
    fn set_feature_report(&self, id: u8, data: &[u8]) -> Result<()>;

    /// Block until the next input report arrives, returning its id and payload
    fn get_input_report(&self) -> Result<(u8, Vec<u8>)>;
    fn set_output_report(&self, id: u8, data: &[u8]) -> Result<()>;

    /// Zeroed feature report payload of the interface's fixed length
    fn feature_payload(&self) -> Vec<u8> {
        vec![0u8; self.report_lengths().feature]
    }
}
