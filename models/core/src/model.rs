//! Core Model trait and related types.

use crate::features::{HasDials, HasInfoBar, HasTouchPoints, HasTouchStrip};
use crate::{KeyId, ReportLengths, Result, Surface, Transport};

/// Elgato USB vendor id shared by every supported model
pub const ELGATO_VENDOR_ID: u16 = 0x0fd9;

/// Location of a group of controls within the primary input report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputRange {
    /// Offset of the first control's state byte, not counting the report id
    pub offset: usize,
    pub count: usize,
}

impl InputRange {
    pub const fn new(offset: usize, count: usize) -> Self {
        Self { offset, count }
    }

    /// One past the last state byte
    pub const fn end(&self) -> usize {
        self.offset + self.count
    }
}

/// Static information about a model for detection and geometry queries
#[derive(Debug, Clone, Copy)]
pub struct ModelInfo {
    /// Short identifier such as `"mk2"`
    pub id: &'static str,
    pub name: &'static str,
    pub product_id: u16,
    pub keys: InputRange,
    pub key_surface: Surface,
    pub reports: ReportLengths,
}

/// Core model trait - object-safe for `&'static dyn Model`
///
/// Every supported piece of hardware is a unit struct implementing this trait. Optional
/// hardware is exposed through the `as_*` methods; each capability trait carries the
/// geometry, encoding and sender together, so a model either has all of them or none.
pub trait Model: Send + Sync {
    fn info(&self) -> &'static ModelInfo;

    /// Send an encoded key image
    fn send_key_image(&self, transport: &dyn Transport, key: KeyId, data: &[u8]) -> Result<()>;

    /// Reboot the device. The interface disappears afterwards.
    fn reset(&self, transport: &dyn Transport) -> Result<()>;

    /// Set display brightness in percent, already clamped to 0..=100
    fn set_brightness(&self, transport: &dyn Transport, percent: u8) -> Result<()>;

    fn firmware_version(&self, transport: &dyn Transport) -> Result<String>;

    // === Opt-in capabilities ===

    fn as_info_bar(&self) -> Option<&dyn HasInfoBar> {
        None
    }
    fn as_touch_points(&self) -> Option<&dyn HasTouchPoints> {
        None
    }
    fn as_dials(&self) -> Option<&dyn HasDials> {
        None
    }
    fn as_touch_strip(&self) -> Option<&dyn HasTouchStrip> {
        None
    }
}

impl std::fmt::Debug for dyn Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model").field("id", &self.info().id).finish()
    }
}

/// Read a NUL terminated string from a feature report, starting at `offset`
pub fn parse_version(buf: &[u8], offset: usize) -> String {
    let tail = buf.get(offset..).unwrap_or_default();
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    String::from_utf8_lossy(&tail[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_stops_at_nul() {
        let buf = b"\x05\x0c\x00\x00\x001.00.012\x00\x00garbage";
        assert_eq!(parse_version(buf, 5), "1.00.012");
        assert_eq!(parse_version(b"\x00\x001.2", 2), "1.2");
        assert_eq!(parse_version(b"abc", 10), "");
    }
}
