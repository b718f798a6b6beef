//! Protocol bindings for the Stream Deck Mini.
//!
//! The Mini predates the v2 protocol: key images are rotated 24 bit bitmaps sent in pages
//! with a 15 byte header, and every command travels on its own feature report.
//!
//! Keys: 6, 80x80 pixels.

use streamdeck_core::{
    parse_version, send_pages, ImageFormat, InputRange, KeyId, Model, ModelInfo, Page, Rect,
    ReportLengths, Result, Surface, Transform, Transport, IMAGE_REPORT_ID,
};

pub mod consts {
    /// USB Product ID
    pub const PRODUCT_ID: u16 = 0x0063;
    /// Reset command feature report
    pub const RESET_REPORT_ID: u8 = 11;
    /// Brightness command feature report
    pub const BRIGHTNESS_REPORT_ID: u8 = 5;
    /// Firmware version feature report
    pub const FIRMWARE_REPORT_ID: u8 = 4;
    /// Offset of the version string within the firmware report
    pub const FIRMWARE_OFFSET: usize = 4;
    /// Size of the key image page header
    pub const HEADER_LEN: usize = 15;
}

/// Static model info for detection
pub static INFO: ModelInfo = ModelInfo {
    id: "mini",
    name: "Stream Deck Mini",
    product_id: consts::PRODUCT_ID,
    keys: InputRange::new(0, 6),
    key_surface: Surface {
        rect: Rect::sized(80, 80),
        format: ImageFormat::Bmp,
        transform: Transform::ROTATE_90.union(Transform::FLIP_HORIZONTAL),
    },
    reports: ReportLengths {
        feature: 16,
        input: 16,
        output: 1023,
    },
};

/// Header for the pages of a key image
pub fn key_image_header(key: KeyId) -> [u8; consts::HEADER_LEN] {
    let mut hdr = [0u8; consts::HEADER_LEN];
    hdr[0] = 0x01;
    hdr[4] = key.0;
    hdr
}

fn update_page_header(hdr: &mut [u8], page: Page) {
    hdr[1] = page.index as u8;
    hdr[3] = page.last as u8;
}

/// Stream Deck Mini
pub struct Mini;

impl Model for Mini {
    fn info(&self) -> &'static ModelInfo {
        &INFO
    }

    fn send_key_image(&self, transport: &dyn Transport, key: KeyId, data: &[u8]) -> Result<()> {
        send_pages(
            transport,
            IMAGE_REPORT_ID,
            &mut key_image_header(key),
            data,
            update_page_header,
        )
    }

    fn reset(&self, transport: &dyn Transport) -> Result<()> {
        let mut payload = transport.feature_payload();
        payload[0] = 0x63;
        transport.set_feature_report(consts::RESET_REPORT_ID, &payload)
    }

    fn set_brightness(&self, transport: &dyn Transport, percent: u8) -> Result<()> {
        let mut payload = transport.feature_payload();
        payload[..5].copy_from_slice(&[0x55, 0xaa, 0xd1, 0x01, percent]);
        transport.set_feature_report(consts::BRIGHTNESS_REPORT_ID, &payload)
    }

    fn firmware_version(&self, transport: &dyn Transport) -> Result<String> {
        let buf = transport.get_feature_report(consts::FIRMWARE_REPORT_ID)?;
        Ok(parse_version(&buf, consts::FIRMWARE_OFFSET))
    }
}
