//! Protocol bindings for the Stream Deck +.
//!
//! Keys: 8, 120x120 pixels, JPEG.
//! Dials: 4 rotary encoders with push switches.
//! Touch strip: 800x100 pixels, JPEG, updatable in sub-rectangles.

use streamdeck_core::{
    send_pages, HasDials, HasTouchStrip, ImageFormat, InputRange, KeyId, Model, ModelInfo, Page,
    Rect, Result, Surface, Transform, Transport, IMAGE_REPORT_ID,
};
use streamdeck_v2_protocol as protocol;

pub mod consts {
    /// USB Product ID
    pub const PRODUCT_ID: u16 = 0x0084;
    /// Size of the touch strip page header
    pub const TOUCH_STRIP_HEADER_LEN: usize = 15;
}

/// Static model info for detection
pub static INFO: ModelInfo = ModelInfo {
    id: "plus",
    name: "Stream Deck +",
    product_id: consts::PRODUCT_ID,
    keys: InputRange::new(3, 8),
    key_surface: Surface {
        rect: Rect::sized(120, 120),
        format: ImageFormat::Jpeg,
        transform: Transform::empty(),
    },
    reports: protocol::REPORT_LENGTHS,
};

pub static TOUCH_STRIP: Surface = Surface {
    rect: Rect::sized(800, 100),
    format: ImageFormat::Jpeg,
    transform: Transform::empty(),
};

/// Dial bytes within the dial input report
pub const DIALS: InputRange = InputRange::new(4, 4);

/// Header for the pages of a touch strip image covering `rect`
///
/// Layout: command, x, y, width, height (little-endian u16 each), then per page the last
/// flag, page index, a reserved byte and the payload size.
pub fn touch_strip_header(rect: Rect) -> [u8; consts::TOUCH_STRIP_HEADER_LEN] {
    let mut hdr = [0u8; consts::TOUCH_STRIP_HEADER_LEN];
    hdr[0] = protocol::cmd::TOUCH_STRIP_IMAGE;
    hdr[1..3].copy_from_slice(&(rect.x as u16).to_le_bytes());
    hdr[3..5].copy_from_slice(&(rect.y as u16).to_le_bytes());
    hdr[5..7].copy_from_slice(&(rect.width as u16).to_le_bytes());
    hdr[7..9].copy_from_slice(&(rect.height as u16).to_le_bytes());
    hdr
}

fn update_touch_strip_header(hdr: &mut [u8], page: Page) {
    hdr[9] = page.last as u8;
    hdr[10] = page.index as u8;
    hdr[11] = 0;
    hdr[12..14].copy_from_slice(&page.size.to_le_bytes());
}

/// Stream Deck +
pub struct Plus;

impl Model for Plus {
    fn info(&self) -> &'static ModelInfo {
        &INFO
    }

    fn send_key_image(&self, transport: &dyn Transport, key: KeyId, data: &[u8]) -> Result<()> {
        protocol::send_key_image(transport, key, data)
    }

    fn reset(&self, transport: &dyn Transport) -> Result<()> {
        protocol::reset(transport)
    }

    fn set_brightness(&self, transport: &dyn Transport, percent: u8) -> Result<()> {
        protocol::set_brightness(transport, percent)
    }

    fn firmware_version(&self, transport: &dyn Transport) -> Result<String> {
        protocol::firmware_version(transport)
    }

    fn as_dials(&self) -> Option<&dyn HasDials> {
        Some(self)
    }

    fn as_touch_strip(&self) -> Option<&dyn HasTouchStrip> {
        Some(self)
    }
}

impl HasDials for Plus {
    fn dials(&self) -> InputRange {
        DIALS
    }
}

impl HasTouchStrip for Plus {
    fn touch_strip_surface(&self) -> &'static Surface {
        &TOUCH_STRIP
    }

    fn send_touch_strip_image(
        &self,
        transport: &dyn Transport,
        data: &[u8],
        rect: Rect,
    ) -> Result<()> {
        send_pages(
            transport,
            IMAGE_REPORT_ID,
            &mut touch_strip_header(rect),
            data,
            update_touch_strip_header,
        )
    }
}
