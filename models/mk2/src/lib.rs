//! Protocol bindings for the Stream Deck MK.2, and the 2018 Stream Deck revision sharing its layout.
//!
//! Keys: 15, 72x72 pixels, JPEG.

use streamdeck_core::{
    ImageFormat, InputRange, KeyId, Model, ModelInfo, Rect, Result, Surface, Transform,
    Transport,
};
use streamdeck_v2_protocol as protocol;

pub mod consts {
    /// USB Product ID
    pub const PRODUCT_ID: u16 = 0x0080;
    /// Product ID of the earlier revision speaking the same protocol
    pub const ALIAS_PRODUCT_ID: u16 = 0x006d;
}

/// Static model info for detection
pub static INFO: ModelInfo = ModelInfo {
    id: "mk2",
    name: "Stream Deck MK.2",
    product_id: consts::PRODUCT_ID,
    keys: InputRange::new(3, 15),
    key_surface: Surface {
        rect: Rect::sized(72, 72),
        format: ImageFormat::Jpeg,
        transform: Transform::FLIP_HORIZONTAL.union(Transform::FLIP_VERTICAL),
    },
    reports: protocol::REPORT_LENGTHS,
};

/// Stream Deck MK.2
pub struct Mk2;

impl Model for Mk2 {
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
}

#[cfg(test)]
mod tests {
    use streamdeck_core::mock::MockTransport;
    use streamdeck_core::ELGATO_VENDOR_ID;

    use super::*;

    #[test]
    fn geometry() {
        assert_eq!(INFO.keys.end(), 18);
        assert!(INFO.key_surface.rect.is_square());
        assert!(Mk2.as_dials().is_none());
        assert!(Mk2.as_touch_strip().is_none());
    }

    #[test]
    fn key_image_uses_zero_based_key() {
        let t = MockTransport::new(ELGATO_VENDOR_ID, consts::PRODUCT_ID, INFO.reports);
        t.open().unwrap();
        Mk2.send_key_image(&t, KeyId(15), &[0xff; 4]).unwrap();
        let out = t.outputs();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1[..7], [0x07, 14, 1, 4, 0, 0, 0]);
    }
}
