//! Report layouts for v2 devices.
//!
//! Image page header (7 bytes):
//! - Byte 0: Command (0x07 key image, 0x0B info bar)
//! - Byte 1: Key index (zero based)
//! - Byte 2: 1 on the last page
//! - Bytes 3-4: Payload size (little-endian)
//! - Byte 5: Page index
//! - Byte 6: Reserved (0)

use streamdeck_core::{
    parse_version, send_pages, KeyId, Page, Result, Transport, IMAGE_REPORT_ID,
};

/// Command identifiers
pub mod cmd {
    /// Key image page
    pub const KEY_IMAGE: u8 = 0x07;
    /// Info bar image page
    pub const INFO_BAR_IMAGE: u8 = 0x0B;
    /// Touch strip image page
    pub const TOUCH_STRIP_IMAGE: u8 = 0x0C;
    /// Reset, sent on the command feature report
    pub const RESET: u8 = 0x02;
    /// Touch point color, sent on the command feature report
    pub const TOUCH_POINT_COLOR: u8 = 0x06;
    /// Brightness, sent on the command feature report
    pub const BRIGHTNESS: u8 = 0x08;
}

/// Feature report carrying commands
pub const COMMAND_REPORT_ID: u8 = 3;
/// Feature report carrying the firmware version
pub const FIRMWARE_REPORT_ID: u8 = 5;
/// Offset of the version string within the firmware report
pub const FIRMWARE_OFFSET: usize = 5;

/// Size of the image page header
pub const HEADER_LEN: usize = 7;

/// Header for the pages of a key image
pub fn key_image_header(key: KeyId) -> [u8; HEADER_LEN] {
    let mut hdr = [0u8; HEADER_LEN];
    hdr[0] = cmd::KEY_IMAGE;
    hdr[1] = key.index() as u8;
    hdr
}

/// Header for the pages of an info bar image
pub fn info_bar_header() -> [u8; HEADER_LEN] {
    let mut hdr = [0u8; HEADER_LEN];
    hdr[0] = cmd::INFO_BAR_IMAGE;
    hdr
}

/// Fill in the per page fields of a 7 byte header
pub fn update_page_header(hdr: &mut [u8], page: Page) {
    hdr[2] = page.last as u8;
    hdr[3..5].copy_from_slice(&page.size.to_le_bytes());
    hdr[5] = page.index as u8;
}

/// Send an encoded key image
pub fn send_key_image(transport: &dyn Transport, key: KeyId, data: &[u8]) -> Result<()> {
    send_pages(
        transport,
        IMAGE_REPORT_ID,
        &mut key_image_header(key),
        data,
        update_page_header,
    )
}

/// Send an encoded info bar image
pub fn send_info_bar_image(transport: &dyn Transport, data: &[u8]) -> Result<()> {
    send_pages(
        transport,
        IMAGE_REPORT_ID,
        &mut info_bar_header(),
        data,
        update_page_header,
    )
}

/// Send a command on the command feature report
fn command(transport: &dyn Transport, args: &[u8]) -> Result<()> {
    let mut payload = transport.feature_payload();
    payload[..args.len()].copy_from_slice(args);
    transport.set_feature_report(COMMAND_REPORT_ID, &payload)
}

pub fn reset(transport: &dyn Transport) -> Result<()> {
    command(transport, &[cmd::RESET])
}

pub fn set_brightness(transport: &dyn Transport, percent: u8) -> Result<()> {
    command(transport, &[cmd::BRIGHTNESS, percent])
}

/// Set the color of a touch point. `index` is the position of the touch point counted
/// after the keys.
pub fn set_touch_point_color(transport: &dyn Transport, index: u8, rgb: [u8; 3]) -> Result<()> {
    let [r, g, b] = rgb;
    command(transport, &[cmd::TOUCH_POINT_COLOR, index, r, g, b])
}

pub fn firmware_version(transport: &dyn Transport) -> Result<String> {
    let buf = transport.get_feature_report(FIRMWARE_REPORT_ID)?;
    Ok(parse_version(&buf, FIRMWARE_OFFSET))
}

#[cfg(test)]
mod tests {
    use streamdeck_core::mock::MockTransport;

    use super::*;
    use crate::REPORT_LENGTHS;

    fn transport() -> MockTransport {
        let t = MockTransport::new(0x0fd9, 0x0080, REPORT_LENGTHS);
        t.open().unwrap();
        t
    }

    #[test]
    fn key_image_pages() {
        let t = transport();
        let data = vec![0xAB; 1016 + 10];
        send_key_image(&t, KeyId(4), &data).unwrap();

        let out = t.outputs();
        assert_eq!(out.len(), 2);
        let (id, first) = &out[0];
        assert_eq!(*id, IMAGE_REPORT_ID);
        assert_eq!(&first[..HEADER_LEN], &[0x07, 3, 0, 0xF8, 0x03, 0, 0]);
        assert_eq!(first.len(), 1023);
        let (_, second) = &out[1];
        assert_eq!(&second[..HEADER_LEN], &[0x07, 3, 1, 10, 0, 1, 0]);
        assert_eq!(&second[HEADER_LEN..HEADER_LEN + 10], &[0xAB; 10]);
        assert!(second[HEADER_LEN + 10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn info_bar_header_has_no_key() {
        let t = transport();
        send_info_bar_image(&t, &[1, 2, 3]).unwrap();
        let out = t.outputs();
        assert_eq!(&out[0].1[..HEADER_LEN], &[0x0B, 0, 1, 3, 0, 0, 0]);
    }

    #[test]
    fn commands() {
        let t = transport();
        reset(&t).unwrap();
        set_brightness(&t, 42).unwrap();
        set_touch_point_color(&t, 9, [10, 20, 30]).unwrap();

        let features = t.features();
        assert_eq!(features.len(), 3);
        assert!(features.iter().all(|(id, p)| *id == 3 && p.len() == 31));
        assert_eq!(&features[0].1[..2], &[0x02, 0]);
        assert_eq!(&features[1].1[..3], &[0x08, 42, 0]);
        assert_eq!(&features[2].1[..6], &[0x06, 9, 10, 20, 30, 0]);
    }

    #[test]
    fn firmware() {
        let t = transport();
        t.set_feature_response(5, b"\x0c\x00\x00\x00\x001.05.008\x00".to_vec());
        assert_eq!(firmware_version(&t).unwrap(), "1.05.008");
    }
}
