//! Error type shared by every device model and the driver itself.

use crate::{DialId, KeyId, Rect, TouchPointId};

/// Errors that can occur during device operations
#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    /// Listing connected devices failed
    #[error("device enumeration failed: {0}")]
    EnumerationFailed(String),

    /// The transport refused to open
    #[error("device failed to open: {0}")]
    OpenFailed(String),

    /// The transport refused to close
    #[error("device failed to close: {0}")]
    CloseFailed(String),

    #[error("device is already open")]
    AlreadyOpen,

    /// Returned by every operation except `open` on a closed device
    #[error("device is closed")]
    AlreadyClosed,

    #[error("device hardware does not include an info bar")]
    InfoBarNotSupported,

    #[error("device hardware does not include touch points")]
    TouchPointNotSupported,

    #[error("device hardware does not include a touch strip")]
    TouchStripNotSupported,

    #[error("device hardware does not include dials")]
    DialNotSupported,

    #[error("key is not valid: {0}")]
    InvalidKey(KeyId),

    #[error("touch point is not valid: {0}")]
    InvalidTouchPoint(TouchPointId),

    #[error("dial is not valid: {0}")]
    InvalidDial(DialId),

    /// Rectangle would not fit the touch strip display
    #[error("invalid rectangle, would not fit the touch strip display: {0}")]
    TouchStripRectInvalid(Rect),

    #[error("image is not valid: {0}")]
    ImageInvalid(&'static str),

    /// A report would not fit the transport's fixed report length
    #[error("report buffer overflow: {0}")]
    ReportBufferOverflow(&'static str),

    #[error("got unexpected report id: {0}")]
    UnexpectedReportId(u8),

    /// More than one device matched an empty serial number
    #[error("more than one device found: {0:?}")]
    MoreThanOneDeviceFound(Vec<String>),

    #[error("no device found: {0:?}")]
    NoDeviceFound(String),

    /// Vendor or product id is not in the model registry
    #[error("device not supported: {vendor_id:04x}:{product_id:04x}")]
    NotSupported { vendor_id: u16, product_id: u16 },

    /// HID communication error
    #[error("hid error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// Image decoding or encoding error
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DeckError>;
